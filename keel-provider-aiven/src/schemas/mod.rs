//! Aiven resource schema definitions

pub mod flink_table;
pub mod service;

use keel_core::schema::ResourceSchema;

/// Service types managed through the service resource family
pub const SERVICE_TYPES: &[&str] = &[
    "pg",
    "cassandra",
    "elasticsearch",
    "grafana",
    "influxdb",
    "redis",
    "mysql",
    "kafka",
    "kafka_connect",
    "kafka_mirrormaker",
    "m3db",
    "m3aggregator",
    "opensearch",
    "flink",
];

/// Name of the deprecated resource that takes an explicit `service_type`
pub const GENERIC_SERVICE: &str = "service";

/// Returns all resource schemas (data sources excluded)
pub fn all_schemas() -> Vec<ResourceSchema> {
    let mut schemas: Vec<ResourceSchema> = SERVICE_TYPES
        .iter()
        .map(|t| service::service_schema(t))
        .collect();
    schemas.push(service::generic_service_schema());
    schemas.push(flink_table::flink_table_schema());
    schemas
}

/// Returns all data source schemas
pub fn all_data_source_schemas() -> Vec<ResourceSchema> {
    let mut schemas: Vec<ResourceSchema> = SERVICE_TYPES
        .iter()
        .map(|t| service::service_data_source_schema(t))
        .collect();
    schemas.push(service::generic_service_data_source_schema());
    schemas
}
