//! Aiven provider implementation
//!
//! Routes resource operations to the service family or to flink tables and
//! owns the API client shared by both.

use std::env;
use std::sync::Arc;

use keel_core::parser::ProviderConfig;
use keel_core::provider::{ProviderError, ProviderResult};
use keel_core::resource::{Resource, ResourceId, State, Value};

use crate::client::{AivenApi, AivenClient, ClientError, DEFAULT_API_URL};
use crate::resources::is_service_type;
use crate::waiter::WaitSettings;

/// Environment variable read when the provider block sets no token
pub const TOKEN_ENV: &str = "AIVEN_TOKEN";

pub const FLINK_TABLE: &str = "flink_table";

/// Aiven Provider
pub struct AivenProvider {
    api: Arc<dyn AivenApi>,
    wait: WaitSettings,
}

impl AivenProvider {
    /// Create a provider talking HTTP to `api_url`
    pub fn new(token: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self::with_api(Arc::new(AivenClient::new(token, api_url)))
    }

    /// Create a provider on top of any [`AivenApi`] implementation
    pub fn with_api(api: Arc<dyn AivenApi>) -> Self {
        Self {
            api,
            wait: WaitSettings::default(),
        }
    }

    pub fn with_wait_settings(mut self, wait: WaitSettings) -> Self {
        self.wait = wait;
        self
    }

    /// Build the provider from a `provider aiven { ... }` block
    ///
    /// `api_token` falls back to the `AIVEN_TOKEN` environment variable and
    /// `api_url` to the public API.
    pub fn from_config(config: Option<&ProviderConfig>) -> Result<Self, String> {
        let attribute = |key: &str| {
            config
                .and_then(|c| c.attributes.get(key))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let token = attribute("api_token")
            .or_else(|| env::var(TOKEN_ENV).ok().filter(|s| !s.is_empty()))
            .ok_or_else(|| {
                format!(
                    "Aiven API token is not set: declare api_token in the provider block or set {}",
                    TOKEN_ENV
                )
            })?;
        let api_url = attribute("api_url").unwrap_or_else(|| DEFAULT_API_URL.to_string());

        log::debug!("using Aiven API at {}", api_url);
        Ok(Self::new(token, api_url))
    }

    pub(crate) fn api(&self) -> &dyn AivenApi {
        self.api.as_ref()
    }

    pub(crate) fn wait_settings(&self) -> WaitSettings {
        self.wait
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    pub async fn read_resource(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> ProviderResult<State> {
        let Some(identifier) = identifier else {
            return Ok(State::not_found(id.clone()));
        };
        match id.resource_type.as_str() {
            FLINK_TABLE => self.read_flink_table(id, identifier, None).await,
            t if is_service_type(t) => self.read_service(id, identifier, None).await,
            t => Err(unsupported(t, id)),
        }
    }

    pub async fn lookup_data_source(&self, resource: &Resource) -> ProviderResult<State> {
        match resource.id.resource_type.as_str() {
            t if is_service_type(t) => self.read_service_data_source(resource).await,
            t => Err(ProviderError::new(format!("{} has no data source", t))
                .for_resource(resource.id.clone())),
        }
    }

    pub async fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        match resource.id.resource_type.as_str() {
            FLINK_TABLE => self.create_flink_table(resource).await,
            t if is_service_type(t) => self.create_service(resource).await,
            t => Err(unsupported(t, &resource.id)),
        }
    }

    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        match id.resource_type.as_str() {
            FLINK_TABLE => Err(ProviderError::new(
                "flink tables cannot be updated in place, every attribute forces replacement",
            )
            .for_resource(id.clone())),
            t if is_service_type(t) => self.update_service(id, identifier, from, to).await,
            t => Err(unsupported(t, id)),
        }
    }

    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        match id.resource_type.as_str() {
            FLINK_TABLE => self.delete_flink_table(id, identifier).await,
            t if is_service_type(t) => self.delete_service(id, identifier).await,
            t => Err(unsupported(t, id)),
        }
    }

    pub async fn import_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        match id.resource_type.as_str() {
            FLINK_TABLE => self.import_flink_table(id, identifier).await,
            t if is_service_type(t) => self.import_service(id, identifier).await,
            t => Err(unsupported(t, id)),
        }
    }

    pub async fn check_change(&self, desired: &Resource, current: &State) -> ProviderResult<()> {
        if desired.is_data_source() || !is_service_type(&desired.id.resource_type) {
            return Ok(());
        }
        self.validate_service_change(desired, current)
            .await
            .map_err(|e| e.for_resource(desired.id.clone()))
    }
}

fn unsupported(resource_type: &str, id: &ResourceId) -> ProviderError {
    ProviderError::new(format!("Unsupported resource type: {}", resource_type)).for_resource(id.clone())
}

/// Wrap an API error, keeping it as the cause
pub(crate) fn api_error(context: impl std::fmt::Display, err: ClientError) -> ProviderError {
    ProviderError::new(format!("{}: {}", context, err)).with_cause(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(attrs: &[(&str, &str)]) -> ProviderConfig {
        ProviderConfig {
            name: "aiven".to_string(),
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn config_token_is_used() {
        assert!(AivenProvider::from_config(Some(&config(&[("api_token", "secret")]))).is_ok());
        assert!(
            AivenProvider::from_config(Some(&config(&[
                ("api_token", "secret"),
                ("api_url", "http://localhost:8080/v1"),
            ])))
            .is_ok()
        );
    }

    #[test]
    fn missing_token_is_reported() {
        // SAFETY: no other test reads AIVEN_TOKEN concurrently
        unsafe { env::remove_var(TOKEN_ENV) };
        let err = AivenProvider::from_config(Some(&config(&[("api_token", "")])))
            .err()
            .unwrap();
        assert!(err.contains("AIVEN_TOKEN"));
    }

    #[tokio::test]
    async fn unknown_types_are_rejected() {
        let provider = AivenProvider::with_api(Arc::new(crate::testing::MockApi::new()));
        let id = ResourceId::new("vpc", "main");
        let err = provider.read_resource(&id, Some("a/b")).await.unwrap_err();
        assert!(err.message.contains("Unsupported resource type"));

        let state = provider
            .read_resource(&ResourceId::new("pg", "db"), None)
            .await
            .unwrap();
        assert!(!state.exists);
    }
}
