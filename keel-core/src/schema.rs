//! Schema - Define type schemas for resources
//!
//! Providers define schemas for each resource type, enabling type validation at
//! parse time and schema-aware diffing at plan time.

use std::collections::HashMap;
use std::fmt;

use crate::resource::Value;

/// Predicate deciding whether a change from `old` to `new` should be ignored
pub type DiffSuppressFn = fn(old: Option<&Value>, new: &Value) -> bool;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// List
    List(Box<AttributeType>),
    /// Map
    Map(Box<AttributeType>),
    /// Nested block with a fixed set of fields
    Block(Vec<AttributeSchema>),
    /// Free-form value, accepted as declared
    Any,
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            // References resolve at apply time; their type is checked by the target schema
            (_, Value::ResourceRef(_, _)) => Ok(()),
            (AttributeType::Any, _) => Ok(()),
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { validate, base, .. }, v) => {
                base.validate(v)?;
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Block(fields), Value::Map(map)) => {
                for field in fields {
                    if field.required && !map.contains_key(&field.name) {
                        return Err(TypeError::MissingRequired {
                            name: field.name.clone(),
                        });
                    }
                }
                for (k, v) in map {
                    match fields.iter().find(|f| &f.name == k) {
                        Some(field) => field.attr_type.validate(v).map_err(|e| {
                            TypeError::MapValueError {
                                key: k.clone(),
                                inner: Box::new(e),
                            }
                        })?,
                        None => return Err(TypeError::UnknownAttribute { name: k.clone() }),
                    }
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Block(_) => "Block".to_string(),
            AttributeType::Any => "Any".to_string(),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("Attribute '{name}' is computed and cannot be set")]
    ComputedAttribute { name: String },

    #[error("Attribute '{name}': {inner}")]
    InAttribute { name: String, inner: Box<TypeError> },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
            Value::ResourceRef(binding, attr) => format!("ResourceRef({}.{})", binding, attr),
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    /// Set by the provider from the remote side
    pub computed: bool,
    /// Together with `computed`: may be declared, otherwise filled in remotely
    pub optional: bool,
    /// Value should be masked in output
    pub sensitive: bool,
    /// A change to this attribute requires replacing the resource
    pub force_new: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
    /// Provider-side property name when it differs from the DSL name
    pub provider_name: Option<String>,
    pub diff_suppress: Option<DiffSuppressFn>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            computed: false,
            optional: false,
            sensitive: false,
            force_new: false,
            default: None,
            description: None,
            provider_name: None,
            diff_suppress: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }

    pub fn with_diff_suppress(mut self, f: DiffSuppressFn) -> Self {
        self.diff_suppress = Some(f);
        self
    }

    /// Computed attributes that the user may not declare
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
    pub deprecation_message: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
            deprecation_message: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_deprecation_message(mut self, message: impl Into<String>) -> Self {
        self.deprecation_message = Some(message.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.get(name)
    }

    /// Whether a change to the named attribute forces replacement
    pub fn is_force_new(&self, name: &str) -> bool {
        self.get(name).is_some_and(|a| a.force_new)
    }

    /// Whether the named attribute is ignored when diffing declared values
    pub fn is_computed_only(&self, name: &str) -> bool {
        self.get(name).is_some_and(AttributeSchema::is_computed_only)
    }

    /// Whether the change `old -> new` on the named attribute should be ignored
    pub fn suppresses_diff(&self, name: &str, old: Option<&Value>, new: &Value) -> bool {
        self.get(name)
            .and_then(|a| a.diff_suppress)
            .is_some_and(|f| f(old, new))
    }

    /// Names of sensitive attributes
    pub fn sensitive_attributes(&self) -> Vec<&str> {
        self.attributes
            .values()
            .filter(|a| a.sensitive)
            .map(|a| a.name.as_str())
            .collect()
    }

    /// Validate resource attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        // Check required attributes
        for (name, schema) in &self.attributes {
            if schema.required && !attributes.contains_key(name) && schema.default.is_none() {
                errors.push(TypeError::MissingRequired { name: name.clone() });
            }
        }

        // Type check each attribute; internal attributes start with '_'
        for (name, value) in attributes {
            if name.starts_with('_') {
                continue;
            }
            match self.attributes.get(name) {
                Some(schema) if schema.is_computed_only() => {
                    errors.push(TypeError::ComputedAttribute { name: name.clone() });
                }
                Some(schema) => {
                    if let Err(e) = schema.attr_type.validate(value) {
                        errors.push(TypeError::InAttribute {
                            name: name.clone(),
                            inner: Box::new(e),
                        });
                    }
                }
                None => errors.push(TypeError::UnknownAttribute { name: name.clone() }),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Derive a data source schema: every attribute is computed except the
    /// lookup keys, which become required.
    pub fn as_data_source(&self, required: &[&str]) -> ResourceSchema {
        let attributes = self
            .attributes
            .iter()
            .map(|(name, attr)| {
                let mut attr = attr.clone();
                attr.default = None;
                attr.force_new = false;
                attr.diff_suppress = None;
                if required.iter().any(|r| r == name) {
                    attr.required = true;
                    attr.computed = false;
                    attr.optional = false;
                } else {
                    attr.required = false;
                    attr.computed = true;
                    attr.optional = false;
                }
                (name.clone(), attr)
            })
            .collect();

        ResourceSchema {
            resource_type: self.resource_type.clone(),
            attributes,
            description: self.description.clone(),
            deprecation_message: self.deprecation_message.clone(),
        }
    }
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// Repeated nested block (`name { ... }` declared zero or more times)
    pub fn block_list(fields: Vec<AttributeSchema>) -> AttributeType {
        AttributeType::List(Box::new(AttributeType::Block(fields)))
    }

    /// Enum over string values
    pub fn string_enum(values: &[&str]) -> AttributeType {
        AttributeType::Enum(values.iter().map(|s| s.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integration_block() -> AttributeType {
        types::block_list(vec![
            AttributeSchema::new("integration_type", AttributeType::String).required(),
            AttributeSchema::new("source_service_name", AttributeType::String).required(),
        ])
    }

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::String("hello".to_string())).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
        assert!(
            t.validate(&Value::ResourceRef("db".to_string(), "service_name".to_string()))
                .is_ok()
        );
    }

    #[test]
    fn validate_enum_type() {
        let t = types::string_enum(&["kafka", "upsert_kafka"]);
        assert!(t.validate(&Value::String("kafka".to_string())).is_ok());
        assert!(t.validate(&Value::String("jdbc".to_string())).is_err());
    }

    #[test]
    fn validate_block_list() {
        let t = integration_block();
        let ok = Value::List(vec![Value::Map(
            [
                (
                    "integration_type".to_string(),
                    Value::String("read_replica".to_string()),
                ),
                (
                    "source_service_name".to_string(),
                    Value::String("db".to_string()),
                ),
            ]
            .into_iter()
            .collect(),
        )]);
        assert!(t.validate(&ok).is_ok());

        let missing = Value::List(vec![Value::Map(
            [(
                "integration_type".to_string(),
                Value::String("read_replica".to_string()),
            )]
            .into_iter()
            .collect(),
        )]);
        assert!(matches!(
            t.validate(&missing),
            Err(TypeError::ListItemError { index: 0, .. })
        ));
    }

    #[test]
    fn custom_type_checks_base_first() {
        let t = AttributeType::Custom {
            name: "NonEmpty".to_string(),
            base: Box::new(AttributeType::String),
            validate: |v| match v {
                Value::String(s) if !s.is_empty() => Ok(()),
                _ => Err("must not be empty".to_string()),
            },
        };
        assert!(t.validate(&Value::String("x".to_string())).is_ok());
        assert!(matches!(
            t.validate(&Value::String(String::new())),
            Err(TypeError::ValidationFailed { .. })
        ));
        assert!(matches!(
            t.validate(&Value::Int(1)),
            Err(TypeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn validate_resource_schema() {
        let schema = ResourceSchema::new("pg")
            .attribute(AttributeSchema::new("project", AttributeType::String).required())
            .attribute(AttributeSchema::new("plan", AttributeType::String))
            .attribute(AttributeSchema::new("state", AttributeType::String).computed());

        let mut attrs = HashMap::new();
        attrs.insert("project".to_string(), Value::String("p".to_string()));
        attrs.insert("plan".to_string(), Value::String("startup-4".to_string()));
        attrs.insert("_binding".to_string(), Value::String("db".to_string()));
        assert!(schema.validate(&attrs).is_ok());

        attrs.insert("state".to_string(), Value::String("RUNNING".to_string()));
        attrs.insert("colour".to_string(), Value::String("blue".to_string()));
        let errors = schema.validate(&attrs).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, TypeError::ComputedAttribute { name } if name == "state"))
        );
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, TypeError::UnknownAttribute { name } if name == "colour"))
        );
    }

    #[test]
    fn missing_required_attribute() {
        let schema = ResourceSchema::new("pg")
            .attribute(AttributeSchema::new("service_name", AttributeType::String).required());

        let result = schema.validate(&HashMap::new());
        assert!(matches!(
            result.unwrap_err()[0],
            TypeError::MissingRequired { .. }
        ));
    }

    #[test]
    fn optional_computed_may_be_declared() {
        let attr = AttributeSchema::new("kafka", AttributeType::Any)
            .computed()
            .optional();
        assert!(!attr.is_computed_only());
    }

    #[test]
    fn data_source_schema_marks_everything_computed() {
        let schema = ResourceSchema::new("opensearch")
            .attribute(
                AttributeSchema::new("project", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("service_name", AttributeType::String).required())
            .attribute(AttributeSchema::new("plan", AttributeType::String));

        let ds = schema.as_data_source(&["project", "service_name"]);
        assert!(ds.get("project").unwrap().required);
        assert!(!ds.is_force_new("project"));
        assert!(ds.is_computed_only("plan"));

        let mut attrs = HashMap::new();
        attrs.insert("project".to_string(), Value::String("p".to_string()));
        attrs.insert("service_name".to_string(), Value::String("s".to_string()));
        assert!(ds.validate(&attrs).is_ok());
    }

    #[test]
    fn diff_suppress_hook() {
        let schema = ResourceSchema::new("pg").attribute(
            AttributeSchema::new("maintenance_window_dow", AttributeType::String)
                .with_diff_suppress(|_, new| new.as_str() == Some("")),
        );
        assert!(schema.suppresses_diff(
            "maintenance_window_dow",
            Some(&Value::String("sunday".to_string())),
            &Value::String(String::new())
        ));
        assert!(!schema.suppresses_diff(
            "maintenance_window_dow",
            None,
            &Value::String("monday".to_string())
        ));
    }
}
