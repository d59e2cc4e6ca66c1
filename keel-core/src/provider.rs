//! Provider - Trait abstracting resource operations
//!
//! A Provider defines operations for a specific service platform.
//! It is responsible for converting Effects into actual API calls.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}.{}] {}", id.resource_type, id.name, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resource_id: None,
            cause: None,
        }
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-operation time limits for long-running remote changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        let twenty_minutes = Duration::from_secs(20 * 60);
        Self {
            create: twenty_minutes,
            update: twenty_minutes,
            delete: twenty_minutes,
        }
    }
}

impl Timeouts {
    /// Name of the resource-level block overriding the defaults
    pub const ATTRIBUTE: &'static str = "timeouts";

    /// Schema for `timeouts { create = "30m" update = "30m" delete = "5m" }`
    pub fn schema_attribute() -> AttributeSchema {
        let duration = AttributeType::Custom {
            name: "Duration".to_string(),
            base: Box::new(AttributeType::String),
            validate: |v| match v {
                Value::String(s) => parse_duration(s).map(|_| ()),
                _ => Ok(()),
            },
        };
        AttributeSchema::new(
            Self::ATTRIBUTE,
            types::block_list(vec![
                AttributeSchema::new("create", duration.clone()),
                AttributeSchema::new("update", duration.clone()),
                AttributeSchema::new("delete", duration),
            ]),
        )
        .with_description("Overrides for operation timeouts")
        .with_diff_suppress(|_, _| true)
    }

    /// Apply overrides declared on a resource
    pub fn for_resource(self, resource: &Resource) -> Result<Self, String> {
        let mut timeouts = self;
        let Some(block) = resource
            .attributes
            .get(Self::ATTRIBUTE)
            .and_then(Value::as_list)
            .and_then(|l| l.first())
            .and_then(Value::as_map)
        else {
            return Ok(timeouts);
        };

        if let Some(s) = block.get("create").and_then(Value::as_str) {
            timeouts.create = parse_duration(s)?;
        }
        if let Some(s) = block.get("update").and_then(Value::as_str) {
            timeouts.update = parse_duration(s)?;
        }
        if let Some(s) = block.get("delete").and_then(Value::as_str) {
            timeouts.delete = parse_duration(s)?;
        }
        Ok(timeouts)
    }
}

/// Longest accepted operation timeout
pub const MAX_DURATION: Duration = Duration::from_secs(30 * 24 * 3600);

/// Parse durations such as "90s", "20m", "1h30m", up to [`MAX_DURATION`]
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total = 0u64;
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let n: u64 = digits
            .parse()
            .map_err(|_| format!("invalid duration '{}'", s))?;
        digits.clear();
        let unit = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return Err(format!("invalid duration unit '{}' in '{}'", c, s)),
        };
        total = n
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| format!("duration too large: '{}'", s))?;
    }
    if !digits.is_empty() {
        return Err(format!("missing unit in duration '{}'", s));
    }
    let duration = Duration::from_secs(total);
    if duration > MAX_DURATION {
        return Err(format!(
            "duration too large: '{}' exceeds {} hours",
            s,
            MAX_DURATION.as_secs() / 3600
        ));
    }
    Ok(duration)
}

/// Definition of resource types that a Provider can handle
pub trait ResourceType: Send + Sync {
    /// Resource type name (e.g., "pg")
    fn name(&self) -> &'static str;

    /// Attribute schema for this resource type
    fn schema(&self) -> ResourceSchema;

    /// Default operation timeouts
    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    /// Whether this type is read with `read <provider>.<type> { ... }`
    fn is_data_source(&self) -> bool {
        false
    }
}

/// Main Provider trait
///
/// Each service platform provider implements this trait.
/// All operations are async and involve side effects.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "aiven")
    fn name(&self) -> &'static str;

    /// List of resource types and data sources this Provider can handle
    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// Get the current state of a resource
    ///
    /// Returns `State::not_found()` if the resource does not exist or no
    /// identifier is known yet.
    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Look up an existing object by the keys declared on a data source
    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Create a resource
    ///
    /// Returns State with identifier set to the remote ID
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Update a resource in place
    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Delete a resource
    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>>;

    /// Adopt an existing remote object identified by `identifier`
    fn import(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>>;

    /// Reject a planned change before anything is submitted
    fn validate_change(
        &self,
        _desired: &Resource,
        _current: &State,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        (**self).resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read(id, identifier)
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read_data_source(resource)
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).create(resource)
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).update(id, identifier, from, to)
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        (**self).delete(id, identifier)
    }

    fn import(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).import(id, identifier)
    }

    fn validate_change(
        &self,
        desired: &Resource,
        current: &State,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        (**self).validate_change(desired, current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Mock Provider for testing
    struct MockProvider;

    impl Provider for MockProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
            vec![]
        }

        fn read(
            &self,
            id: &ResourceId,
            _identifier: Option<&str>,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            Box::pin(async move { Ok(State::not_found(id)) })
        }

        fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            let id = resource.id.clone();
            Box::pin(async move { Err(ProviderError::new("not found").for_resource(id)) })
        }

        fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            let id = resource.id.clone();
            let attrs = resource.attributes.clone();
            Box::pin(async move { Ok(State::existing(id, attrs).with_identifier("mock-id-123")) })
        }

        fn update(
            &self,
            id: &ResourceId,
            _identifier: &str,
            _from: &State,
            to: &Resource,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            let attrs = to.attributes.clone();
            Box::pin(async move { Ok(State::existing(id, attrs)) })
        }

        fn delete(&self, _id: &ResourceId, _identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn import(
            &self,
            id: &ResourceId,
            identifier: &str,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let state = State::existing(id.clone(), Default::default()).with_identifier(identifier);
            Box::pin(async move { Ok(state) })
        }
    }

    #[tokio::test]
    async fn mock_provider_read_returns_not_found() {
        let provider = MockProvider;
        let id = ResourceId::new("test", "example");
        let state = provider.read(&id, None).await.unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn mock_provider_create_returns_existing() {
        let provider = MockProvider;
        let resource = Resource::new("test", "example");
        let state = provider.create(&resource).await.unwrap();
        assert!(state.exists);
        assert_eq!(state.identifier, Some("mock-id-123".to_string()));
    }

    #[tokio::test]
    async fn boxed_provider_delegates() {
        let provider: Box<dyn Provider> = Box::new(MockProvider);
        let id = ResourceId::new("test", "example");
        let state = provider.import(&id, "p/s").await.unwrap();
        assert_eq!(state.identifier.as_deref(), Some("p/s"));

        let resource = Resource::new("test", "example");
        assert!(provider.validate_change(&resource, &state).await.is_ok());
    }

    #[test]
    fn provider_error_display_includes_resource() {
        let err = ProviderError::new("boom").for_resource(ResourceId::new("pg", "db"));
        assert_eq!(err.to_string(), "[pg.db] boom");
    }

    #[test]
    fn parse_durations() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("20m").unwrap(), Duration::from_secs(1200));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert!(parse_duration("20").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn oversized_durations_are_rejected() {
        assert!(
            parse_duration("9999999999999999h")
                .unwrap_err()
                .starts_with("duration too large")
        );
        assert!(
            parse_duration("9300000000000000000s")
                .unwrap_err()
                .starts_with("duration too large")
        );
        assert_eq!(parse_duration("720h").unwrap(), MAX_DURATION);
        assert!(parse_duration("720h1s").is_err());
    }

    #[test]
    fn oversized_timeout_fails_validation() {
        let timeouts = Value::List(vec![Value::Map(std::collections::HashMap::from([(
            "create".to_string(),
            Value::String("9999999999999999h".to_string()),
        )]))]);
        let attr = Timeouts::schema_attribute();
        assert!(attr.attr_type.validate(&timeouts).is_err());
    }

    #[test]
    fn timeouts_block_overrides_defaults() {
        let resource = Resource::new("pg", "db").with_attribute(
            Timeouts::ATTRIBUTE,
            Value::List(vec![Value::Map(
                [("create".to_string(), Value::String("30m".to_string()))]
                    .into_iter()
                    .collect(),
            )]),
        );
        let timeouts = Timeouts::default().for_resource(&resource).unwrap();
        assert_eq!(timeouts.create, Duration::from_secs(1800));
        assert_eq!(timeouts.update, Duration::from_secs(1200));
    }
}
