//! Keel Aiven Provider
//!
//! Manages Aiven data services and Flink tables through the Aiven REST API.
//!
//! ## Module Structure
//!
//! - `client` - REST client and the `AivenApi` seam
//! - `plan_params` - Service plan disk limits and disk size checks
//! - `provider` - AivenProvider implementation
//! - `resources` - Resource type definitions
//! - `schemas` - Service and Flink table schemas
//! - `units` - Byte size parsing and formatting
//! - `utils` - Identifiers and user config conversion
//! - `waiter` - Polls a service until it is RUNNING

pub mod client;
pub mod plan_params;
pub mod provider;
pub mod resources;
pub mod schemas;
pub mod units;
pub mod utils;
pub mod waiter;

mod flink_table;
mod service;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types
pub use client::{AivenApi, AivenClient, ClientError};
pub use provider::AivenProvider;
pub use units::{human_readable_byte_size, parse_ram_in_bytes};
pub use utils::{build_resource_id, split_resource_id};

use keel_core::provider::{BoxFuture, Provider, ProviderResult};
use keel_core::resource::{Resource, ResourceId, State};

use resources::resource_types;

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for AivenProvider {
    fn name(&self) -> &'static str {
        "aiven"
    }

    fn resource_types(&self) -> Vec<Box<dyn keel_core::provider::ResourceType>> {
        resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(|s| s.to_string());
        Box::pin(async move { self.read_resource(&id, identifier.as_deref()).await })
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.lookup_data_source(&resource).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(&resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&id, &identifier, &from, &to).await })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.delete_resource(&id, &identifier).await })
    }

    fn import(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.import_resource(&id, &identifier).await })
    }

    fn validate_change(
        &self,
        desired: &Resource,
        current: &State,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        let desired = desired.clone();
        let current = current.clone();
        Box::pin(async move { self.check_change(&desired, &current).await })
    }
}
