//! Resource type definitions for the Aiven provider
//!
//! Each service type is both a resource (`aiven.pg`) and a data source
//! (`read aiven.pg`). The deprecated `aiven.service` takes its type from the
//! `service_type` attribute.

use keel_core::provider::ResourceType;
use keel_core::schema::ResourceSchema;

use crate::schemas::{GENERIC_SERVICE, SERVICE_TYPES, flink_table, service};

/// Service resource or data source for one service type
pub struct ServiceType {
    name: &'static str,
    data_source: bool,
}

impl ServiceType {
    pub fn resource(name: &'static str) -> Self {
        Self {
            name,
            data_source: false,
        }
    }

    pub fn data_source(name: &'static str) -> Self {
        Self {
            name,
            data_source: true,
        }
    }
}

impl ResourceType for ServiceType {
    fn name(&self) -> &'static str {
        self.name
    }

    fn schema(&self) -> ResourceSchema {
        match (self.name == GENERIC_SERVICE, self.data_source) {
            (true, false) => service::generic_service_schema(),
            (true, true) => service::generic_service_data_source_schema(),
            (false, false) => service::service_schema(self.name),
            (false, true) => service::service_data_source_schema(self.name),
        }
    }

    fn is_data_source(&self) -> bool {
        self.data_source
    }
}

pub struct FlinkTableType;

impl ResourceType for FlinkTableType {
    fn name(&self) -> &'static str {
        "flink_table"
    }

    fn schema(&self) -> ResourceSchema {
        flink_table::flink_table_schema()
    }
}

/// Returns all resource types and data sources supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    let mut types: Vec<Box<dyn ResourceType>> = Vec::new();
    for name in SERVICE_TYPES.iter().copied().chain([GENERIC_SERVICE]) {
        types.push(Box::new(ServiceType::resource(name)));
        types.push(Box::new(ServiceType::data_source(name)));
    }
    types.push(Box::new(FlinkTableType));
    types
}

/// Whether `resource_type` belongs to the service family
pub fn is_service_type(resource_type: &str) -> bool {
    resource_type == GENERIC_SERVICE || SERVICE_TYPES.iter().any(|t| *t == resource_type)
}
