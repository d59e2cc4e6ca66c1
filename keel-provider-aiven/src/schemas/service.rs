//! Service resource schema definitions
//!
//! Every service type shares the same common attributes. Each type adds a
//! computed block named after the type holding server provided values, and a
//! free-form `<type>_user_config` block.

use keel_core::provider::Timeouts;
use keel_core::resource::Value;
use keel_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::{GENERIC_SERVICE, SERVICE_TYPES};
use crate::units::parse_ram_in_bytes;
use crate::utils::{split_resource_id, user_config_unchanged};

/// Human readable byte size such as "90GiB"
pub fn byte_size() -> AttributeType {
    AttributeType::Custom {
        name: "ByteSize".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| match value {
            Value::String(s) => parse_ram_in_bytes(s).map(|_| ()),
            _ => Err("Expected string".to_string()),
        },
    }
}

/// Project VPC reference in `<project>/<vpc_id>` form
pub fn project_vpc_id() -> AttributeType {
    AttributeType::Custom {
        name: "ProjectVpcId".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| match value {
            Value::String(s) => split_resource_id(s, 2).map(|_| ()),
            _ => Err("Expected string".to_string()),
        },
    }
}

/// Unset disk space means the plan default, equal byte counts are no change
fn disk_space_unchanged(old: Option<&Value>, new: &Value) -> bool {
    let Some(new) = new.as_str() else {
        return false;
    };
    if new.is_empty() {
        return true;
    }
    match (old.and_then(Value::as_str).map(parse_ram_in_bytes), parse_ram_in_bytes(new)) {
        (Some(Ok(old)), Ok(new)) => old == new,
        _ => false,
    }
}

fn unset(_old: Option<&Value>, new: &Value) -> bool {
    new.as_str().is_some_and(str::is_empty)
}

fn computed(name: &str, attr_type: AttributeType, description: &str) -> AttributeSchema {
    AttributeSchema::new(name, attr_type)
        .computed()
        .with_description(description)
}

fn common_attributes() -> Vec<AttributeSchema> {
    vec![
        AttributeSchema::new("project", AttributeType::String)
            .required()
            .force_new()
            .with_description("Identifies the project this resource belongs to"),
        AttributeSchema::new("cloud_name", AttributeType::String)
            .optional()
            .with_description(
                "Defines where the cloud provider and region where the service is hosted in. \
                 Changing the value triggers a potentially lengthy migration of the service.",
            ),
        AttributeSchema::new("plan", AttributeType::String)
            .optional()
            .with_description(
                "Defines what kind of computing resources are allocated for the service, \
                 e.g. `hobbyist`, `startup-4` or `business-8`",
            ),
        AttributeSchema::new("service_name", AttributeType::String)
            .required()
            .force_new()
            .with_description(
                "Specifies the actual name of the service. The name cannot be changed later \
                 without destroying and re-creating the service.",
            ),
        computed(
            "service_type",
            AttributeType::String,
            "Aiven internal service type code",
        ),
        AttributeSchema::new("project_vpc_id", project_vpc_id())
            .optional()
            .with_description(
                "Specifies the VPC the service should run in, as `<project>/<vpc_id>`. \
                 Moving a service to or from a VPC triggers a migration.",
            ),
        AttributeSchema::new("maintenance_window_dow", AttributeType::String)
            .optional()
            .with_description(
                "Day of week when maintenance operations should be performed. One monday, tuesday, wednesday, etc.",
            )
            .with_diff_suppress(unset),
        AttributeSchema::new("maintenance_window_time", AttributeType::String)
            .optional()
            .with_description(
                "Time of day when maintenance operations should be performed. UTC time in HH:mm:ss format.",
            )
            .with_diff_suppress(unset),
        AttributeSchema::new("termination_protection", AttributeType::Bool)
            .optional()
            .with_description(
                "Prevents the service from being deleted. It is recommended to set this to `true` \
                 for all production services.",
            ),
        AttributeSchema::new("disk_space", byte_size())
            .optional()
            .with_description(
                "The disk space of the service, possible values depend on the service type, \
                 the cloud provider and the project. Reducing will result in the service rebalancing.",
            )
            .with_diff_suppress(disk_space_unchanged),
        computed(
            "disk_space_default",
            AttributeType::String,
            "The default disk space of the service. It is also the minimum value for `disk_space`",
        ),
        computed(
            "disk_space_step",
            AttributeType::String,
            "`disk_space` needs to increment from `disk_space_default` by increments of this size",
        ),
        computed(
            "disk_space_cap",
            AttributeType::String,
            "The maximum disk space of the service",
        ),
        computed(
            "service_uri",
            AttributeType::String,
            "URI for connecting to the service. Service specific info is under the block named after the service type.",
        )
        .sensitive(),
        computed(
            "service_host",
            AttributeType::String,
            "The hostname of the service",
        ),
        computed("service_port", AttributeType::Int, "The port of the service"),
        computed(
            "service_password",
            AttributeType::String,
            "Password used for connecting to the service, if applicable",
        )
        .sensitive(),
        computed(
            "service_username",
            AttributeType::String,
            "Username used for connecting to the service, if applicable",
        ),
        computed(
            "state",
            AttributeType::String,
            "Service state. One of `POWEROFF`, `REBALANCING`, `REBUILDING` or `RUNNING`.",
        ),
        AttributeSchema::new(
            "service_integrations",
            types::block_list(vec![
                AttributeSchema::new("integration_type", AttributeType::String)
                    .required()
                    .with_description(
                        "Type of the service integration. The only supported value at the moment is `read_replica`",
                    ),
                AttributeSchema::new("source_service_name", AttributeType::String)
                    .required()
                    .with_description("Name of the source service"),
            ]),
        )
        .optional()
        .with_description(
            "Service integrations to specify when creating a service. Not applied after initial service creation",
        ),
        computed(
            "components",
            types::block_list(vec![
                computed("component", AttributeType::String, "Service component name"),
                computed(
                    "host",
                    AttributeType::String,
                    "DNS name for connecting to the service component",
                ),
                computed(
                    "kafka_authentication_method",
                    AttributeType::String,
                    "Kafka authentication method. This is a value specific to the 'kafka' service component",
                )
                .optional(),
                computed(
                    "port",
                    AttributeType::Int,
                    "Port number for connecting to the service component",
                ),
                computed("route", AttributeType::String, "Network access route"),
                computed(
                    "ssl",
                    AttributeType::Bool,
                    "Whether the endpoint is encrypted or accepts plaintext",
                ),
                computed("usage", AttributeType::String, "DNS usage name"),
            ]),
            "Service component information objects",
        ),
        Timeouts::schema_attribute(),
    ]
}

/// Computed block with the server provided values of a service type
pub fn type_block(service_type: &str) -> AttributeSchema {
    let string = |name: &str, description: &str| computed(name, AttributeType::String, description);

    let (description, fields, optional) = match service_type {
        "pg" => (
            "PostgreSQL specific server provided values",
            vec![
                string("replica_uri", "PostgreSQL replica URI for services with a replica").sensitive(),
                string("uri", "PostgreSQL master connection URI")
                    .optional()
                    .sensitive(),
                string("dbname", "Primary PostgreSQL database name"),
                string("host", "PostgreSQL master node host IP or name"),
                string("password", "PostgreSQL admin user password").sensitive(),
                computed("port", AttributeType::Int, "PostgreSQL port"),
                string(
                    "sslmode",
                    "PostgreSQL sslmode setting (currently always \"require\")",
                ),
                string("user", "PostgreSQL admin user name"),
            ],
            true,
        ),
        "kafka" => (
            "Kafka specific server provided values",
            ["access_cert", "access_key", "connect_uri", "rest_uri", "schema_registry_uri"]
                .iter()
                .zip([
                    "The Kafka client certificate",
                    "The Kafka client certificate key",
                    "The Kafka Connect URI, if any",
                    "The Kafka REST URI, if any",
                    "The Schema Registry URI, if any",
                ])
                .map(|(name, desc)| string(*name, desc).optional().sensitive())
                .collect(),
            true,
        ),
        "elasticsearch" => (
            "Elasticsearch specific server provided values",
            vec![string("kibana_uri", "URI for Kibana frontend").sensitive()],
            false,
        ),
        "opensearch" => (
            "Opensearch specific server provided values",
            vec![
                string(
                    "opensearch_dashboards_uri",
                    "URI for Opensearch dashboard frontend",
                )
                .sensitive(),
            ],
            false,
        ),
        "influxdb" => (
            "InfluxDB specific server provided values",
            vec![string("database_name", "Name of the default InfluxDB database")],
            false,
        ),
        "flink" => (
            "Flink specific server provided values",
            vec![
                computed(
                    "host_ports",
                    AttributeType::List(Box::new(AttributeType::String)),
                    "Host and Port of a Flink server",
                )
                .optional(),
            ],
            true,
        ),
        "cassandra" => ("Cassandra specific server provided values", vec![], false),
        "grafana" => ("Grafana specific server provided values", vec![], false),
        "redis" => ("Redis specific server provided values", vec![], false),
        "mysql" => ("MySQL specific server provided values", vec![], false),
        "kafka_connect" => ("Kafka Connect specific server provided values", vec![], false),
        "kafka_mirrormaker" => (
            "Kafka MirrorMaker 2 specific server provided values",
            vec![],
            false,
        ),
        "m3db" => ("M3 specific server provided values", vec![], false),
        "m3aggregator" => ("M3 aggregator specific server provided values", vec![], false),
        _ => ("Server provided values", vec![], false),
    };

    let mut block = computed(service_type, types::block_list(fields), description);
    if optional {
        block = block.optional();
    }
    if service_type == "kafka" {
        block = block.sensitive();
    }
    block
}

/// Free-form `<type>_user_config` block
pub fn user_config_attribute(service_type: &str) -> AttributeSchema {
    AttributeSchema::new(format!("{}_user_config", service_type), AttributeType::Any)
        .optional()
        .with_description(format!("{} user configurable settings", service_type))
        .with_diff_suppress(user_config_unchanged)
}

fn with_attributes(mut schema: ResourceSchema, attributes: Vec<AttributeSchema>) -> ResourceSchema {
    for attr in attributes {
        schema = schema.attribute(attr);
    }
    schema
}

/// Schema for `aiven.<service_type>`
pub fn service_schema(service_type: &str) -> ResourceSchema {
    let mut schema = with_attributes(ResourceSchema::new(service_type), common_attributes())
        .attribute(type_block(service_type))
        .attribute(user_config_attribute(service_type))
        .with_description(format!(
            "The {} resource allows the creation and management of Aiven {} services.",
            service_type, service_type
        ));
    if service_type == "elasticsearch" {
        schema = schema
            .with_deprecation_message("Elasticsearch service is deprecated, please use aiven_opensearch");
    }
    schema
}

/// Schema for the deprecated `aiven.service`, which carries every type block
pub fn generic_service_schema() -> ResourceSchema {
    let mut schema = with_attributes(ResourceSchema::new(GENERIC_SERVICE), common_attributes())
        .attribute(
            AttributeSchema::new("service_type", types::string_enum(SERVICE_TYPES))
                .required()
                .force_new()
                .with_description("Service type code"),
        )
        .with_description("The Service resource allows the creation and management of Aiven Services.")
        .with_deprecation_message("Please use the specific service resources instead of this resource.");
    for service_type in SERVICE_TYPES {
        schema = schema
            .attribute(type_block(service_type))
            .attribute(user_config_attribute(service_type));
    }
    schema
}

const LOOKUP_KEYS: &[&str] = &["project", "service_name"];

/// Schema for `read aiven.<service_type>`
pub fn service_data_source_schema(service_type: &str) -> ResourceSchema {
    let mut schema = service_schema(service_type).as_data_source(LOOKUP_KEYS);
    schema.attributes.remove(Timeouts::ATTRIBUTE);
    schema.with_description(format!(
        "The {} data source provides information about the existing Aiven {} service.",
        service_type, service_type
    ))
}

/// Schema for the deprecated `read aiven.service`
pub fn generic_service_data_source_schema() -> ResourceSchema {
    let mut schema = generic_service_schema().as_data_source(LOOKUP_KEYS);
    schema.attributes.remove(Timeouts::ATTRIBUTE);
    schema
        .with_description("The Service datasource provides information about specific Aiven Services.")
        .with_deprecation_message("Please use the specific service datasources instead of this datasource.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    fn pg_attrs() -> HashMap<String, Value> {
        [
            ("project".to_string(), s("acme")),
            ("service_name".to_string(), s("orders-db")),
            ("cloud_name".to_string(), s("google-europe-west1")),
            ("plan".to_string(), s("startup-4")),
            ("disk_space".to_string(), s("90GiB")),
        ]
        .into()
    }

    #[test]
    fn typed_schema_accepts_common_attributes() {
        assert!(service_schema("pg").validate(&pg_attrs()).is_ok());
    }

    #[test]
    fn service_type_is_computed_on_typed_resources() {
        let mut attrs = pg_attrs();
        attrs.insert("service_type".to_string(), s("pg"));
        assert!(service_schema("pg").validate(&attrs).is_err());
    }

    #[test]
    fn invalid_disk_space_is_rejected() {
        let mut attrs = pg_attrs();
        attrs.insert("disk_space".to_string(), s("lots"));
        let errors = service_schema("pg").validate(&attrs).unwrap_err();
        assert!(errors[0].to_string().contains("disk_space"));
    }

    #[test]
    fn project_vpc_id_needs_two_parts() {
        let mut attrs = pg_attrs();
        attrs.insert("project_vpc_id".to_string(), s("vpc-123"));
        assert!(service_schema("pg").validate(&attrs).is_err());
        attrs.insert("project_vpc_id".to_string(), s("acme/vpc-123"));
        assert!(service_schema("pg").validate(&attrs).is_ok());
    }

    #[test]
    fn generic_schema_requires_known_service_type() {
        let schema = generic_service_schema();
        assert!(schema.validate(&pg_attrs()).is_err());

        let mut attrs = pg_attrs();
        attrs.insert("service_type".to_string(), s("pg"));
        assert!(schema.validate(&attrs).is_ok());

        attrs.insert("service_type".to_string(), s("oracle"));
        assert!(schema.validate(&attrs).is_err());

        assert!(schema.is_force_new("service_type"));
        assert!(schema.get("kafka_user_config").is_some());
        assert!(schema.deprecation_message.is_some());
    }

    #[test]
    fn sensitive_values_are_flagged() {
        let schema = service_schema("pg");
        let sensitive = schema.sensitive_attributes();
        assert!(sensitive.contains(&"service_uri"));
        assert!(sensitive.contains(&"service_password"));
        assert!(service_schema("kafka").get("kafka").unwrap().sensitive);
    }

    #[test]
    fn elasticsearch_is_deprecated() {
        assert!(service_schema("elasticsearch").deprecation_message.is_some());
        assert!(service_schema("opensearch").deprecation_message.is_none());
    }

    #[test]
    fn disk_space_suppression() {
        assert!(disk_space_unchanged(Some(&s("80GiB")), &s("")));
        assert!(disk_space_unchanged(Some(&s("80GiB")), &s("81920MiB")));
        assert!(!disk_space_unchanged(Some(&s("80GiB")), &s("90GiB")));
        assert!(!disk_space_unchanged(None, &s("90GiB")));
    }

    #[test]
    fn maintenance_window_suppressed_when_unset() {
        let schema = service_schema("pg");
        assert!(schema.suppresses_diff("maintenance_window_dow", Some(&s("sunday")), &s("")));
        assert!(!schema.suppresses_diff("maintenance_window_dow", Some(&s("sunday")), &s("monday")));
    }

    #[test]
    fn data_source_requires_lookup_keys_only() {
        let schema = service_data_source_schema("pg");
        assert!(schema.get("project").unwrap().required);
        assert!(schema.get("service_name").unwrap().required);
        assert!(schema.is_computed_only("plan"));
        assert!(schema.get(Timeouts::ATTRIBUTE).is_none());

        let attrs: HashMap<String, Value> = [
            ("project".to_string(), s("acme")),
            ("service_name".to_string(), s("orders-db")),
        ]
        .into();
        assert!(schema.validate(&attrs).is_ok());
    }

    #[test]
    fn generic_data_source_is_deprecated() {
        let schema = generic_service_data_source_schema();
        assert_eq!(
            schema.deprecation_message.as_deref(),
            Some("Please use the specific service datasources instead of this datasource.")
        );
        assert!(schema.is_computed_only("service_type"));
    }
}
