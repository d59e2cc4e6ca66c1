//! Flink table schema definition

use keel_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

pub const CONNECTOR_TYPES: &[&str] = &["kafka", "upsert_kafka"];

pub const KAFKA_FORMATS: &[&str] = &[
    "avro",
    "avro-confluent",
    "debezium-avro-confluent",
    "debezium-json",
    "json",
];

fn input(name: &str, attr_type: AttributeType, description: &str) -> AttributeSchema {
    AttributeSchema::new(name, attr_type)
        .force_new()
        .with_description(format!("{} Changing this forces a new resource.", description))
}

/// Schema for `aiven.flink_table`; every input forces replacement
pub fn flink_table_schema() -> ResourceSchema {
    ResourceSchema::new("flink_table")
        .with_description("The Flink Table resource allows the creation and management of Aiven Tables.")
        .attribute(
            input("project", AttributeType::String, "Identifies the project this resource belongs to.")
                .required(),
        )
        .attribute(
            input(
                "service_name",
                AttributeType::String,
                "Specifies the name of the Flink service this table belongs to.",
            )
            .required(),
        )
        .attribute(
            input("table_name", AttributeType::String, "Specifies the name of the table.").required(),
        )
        .attribute(
            input(
                "integration_id",
                AttributeType::String,
                "The id of the service integration that is used with this table. It must have the service integration type `flink`.",
            )
            .required(),
        )
        .attribute(
            input(
                "jdbc_table",
                AttributeType::String,
                "Name of the jdbc table that is to be connected to this table. Valid if the service integration id refers to a mysql or postgres service.",
            )
            .optional(),
        )
        .attribute(
            input(
                "connector_type",
                types::string_enum(CONNECTOR_TYPES),
                "When used as a source, upsert Kafka connectors update values that use an existing key and delete values that are null.",
            )
            .optional(),
        )
        .attribute(
            input(
                "kafka_topic",
                AttributeType::String,
                "Name of the kafka topic that is to be connected to this table. Valid if the service integration id refers to a kafka service.",
            )
            .optional(),
        )
        .attribute(
            input("kafka_key_format", types::string_enum(KAFKA_FORMATS), "Kafka Key Format.")
                .optional(),
        )
        .attribute(
            input(
                "kafka_value_format",
                types::string_enum(KAFKA_FORMATS),
                "Kafka Value Format.",
            )
            .optional(),
        )
        .attribute(
            input(
                "like_options",
                AttributeType::String,
                "LIKE statement for table creation.",
            )
            .optional(),
        )
        .attribute(
            input(
                "partitioned_by",
                AttributeType::String,
                "A column from the `schema_sql` field to partition this table by.",
            )
            .optional(),
        )
        .attribute(
            input(
                "schema_sql",
                AttributeType::String,
                "The SQL statement to create the table.",
            )
            .required(),
        )
        .attribute(
            AttributeSchema::new("table_id", AttributeType::String)
                .computed()
                .with_description("The Table ID of the flink table in the flink service."),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::resource::Value;
    use std::collections::HashMap;

    fn attrs() -> HashMap<String, Value> {
        [
            ("project", "acme"),
            ("service_name", "stream"),
            ("table_name", "orders"),
            ("integration_id", "int-1"),
            ("schema_sql", "id INT, amount DOUBLE"),
            ("kafka_value_format", "debezium-json"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
    }

    #[test]
    fn every_input_forces_replacement() {
        let schema = flink_table_schema();
        for (name, attr) in &schema.attributes {
            if name != "table_id" {
                assert!(attr.force_new, "{} should force replacement", name);
            }
        }
        assert!(schema.is_computed_only("table_id"));
    }

    #[test]
    fn formats_are_validated() {
        let schema = flink_table_schema();
        assert!(schema.validate(&attrs()).is_ok());

        let mut bad = attrs();
        bad.insert("connector_type".to_string(), Value::String("jdbc".to_string()));
        assert!(schema.validate(&bad).is_err());
    }
}
