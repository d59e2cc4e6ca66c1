//! Interpreter - Execute Effects using a Provider
//!
//! The Interpreter executes Effects contained in a Plan in order,
//! collecting the results. This is where side effects actually occur.
//!
//! References between resources (`db.service_name`) are resolved right before
//! each Effect runs, against the attributes of every binding known so far:
//! those seeded from existing state plus the results of Effects already applied.

use std::collections::HashMap;

use crate::effect::Effect;
use crate::plan::Plan;
use crate::provider::{Provider, ProviderError, ProviderResult};
use crate::resource::{Resource, State, Value};

/// binding name -> attributes known for that binding
pub type BindingMap = HashMap<String, HashMap<String, Value>>;

/// Result of executing each Effect
#[derive(Debug)]
pub enum EffectOutcome {
    /// Read succeeded
    Read { state: State },
    /// Create succeeded
    Created { state: State },
    /// Update succeeded
    Updated { state: State },
    /// Delete and create succeeded
    Replaced { state: State },
    /// Delete succeeded
    Deleted,
    /// Skipped (e.g., dry-run)
    Skipped { reason: String },
}

impl EffectOutcome {
    /// Resulting state, for outcomes that produce one
    pub fn state(&self) -> Option<&State> {
        match self {
            EffectOutcome::Read { state }
            | EffectOutcome::Created { state }
            | EffectOutcome::Updated { state }
            | EffectOutcome::Replaced { state } => Some(state),
            EffectOutcome::Deleted | EffectOutcome::Skipped { .. } => None,
        }
    }
}

/// Result of executing the entire Plan
#[derive(Debug)]
pub struct ApplyResult {
    pub outcomes: Vec<Result<EffectOutcome, ProviderError>>,
    pub success_count: usize,
    pub failure_count: usize,
}

impl ApplyResult {
    pub fn is_success(&self) -> bool {
        self.failure_count == 0
    }
}

/// Interpreter configuration
#[derive(Debug, Clone, Default)]
pub struct InterpreterConfig {
    /// If true, skip actual side effects
    pub dry_run: bool,
    /// Continue on error
    pub continue_on_error: bool,
}

/// Interpreter that executes Effects using a Provider
pub struct Interpreter<P: Provider> {
    provider: P,
    config: InterpreterConfig,
    bindings: BindingMap,
}

impl<P: Provider> Interpreter<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            config: InterpreterConfig::default(),
            bindings: BindingMap::new(),
        }
    }

    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    /// Seed reference resolution with attributes of already existing resources
    pub fn with_bindings(mut self, bindings: BindingMap) -> Self {
        self.bindings = bindings;
        self
    }

    /// Execute a Plan, interpreting all Effects and causing side effects
    pub async fn apply(&self, plan: &Plan) -> ApplyResult {
        let mut bindings = self.bindings.clone();
        let mut outcomes = Vec::new();
        let mut success_count = 0;
        let mut failure_count = 0;

        for effect in plan.effects() {
            log::debug!("applying {} {}", effect.kind(), effect.resource_id());
            let result = self
                .execute_effect(effect, &bindings)
                .await
                .map_err(|e| {
                    if e.resource_id.is_some() {
                        e
                    } else {
                        e.for_resource(effect.resource_id().clone())
                    }
                });

            match &result {
                Ok(outcome) => {
                    success_count += 1;
                    if let (Some(resource), Some(state)) = (effect.desired(), outcome.state()) {
                        record_binding(&mut bindings, resource, state);
                    }
                }
                Err(_) => {
                    failure_count += 1;
                    if !self.config.continue_on_error {
                        outcomes.push(result);
                        break;
                    }
                }
            }

            outcomes.push(result);
        }

        ApplyResult {
            outcomes,
            success_count,
            failure_count,
        }
    }

    /// Execute a single Effect
    async fn execute_effect(
        &self,
        effect: &Effect,
        bindings: &BindingMap,
    ) -> ProviderResult<EffectOutcome> {
        if self.config.dry_run {
            return Ok(EffectOutcome::Skipped {
                reason: "dry-run mode".to_string(),
            });
        }

        match effect {
            Effect::Read(resource) => {
                let resolved = resolve_resource(resource, bindings)?;
                let state = self.provider.read_data_source(&resolved).await?;
                Ok(EffectOutcome::Read { state })
            }
            Effect::Create(resource) => {
                let resolved = resolve_resource(resource, bindings)?;
                let state = self.provider.create(&resolved).await?;
                Ok(EffectOutcome::Created { state })
            }
            Effect::Update { id, from, to } => {
                let resolved = resolve_resource(to, bindings)?;
                let identifier = from.identifier.as_deref().ok_or_else(|| {
                    ProviderError::new("cannot update a resource without an identifier")
                })?;
                let state = self
                    .provider
                    .update(id, identifier, from, &resolved)
                    .await?;
                Ok(EffectOutcome::Updated { state })
            }
            Effect::Replace { id, from, to } => {
                let resolved = resolve_resource(to, bindings)?;
                if let Some(identifier) = from.identifier.as_deref() {
                    self.provider.delete(id, identifier).await?;
                }
                let state = self.provider.create(&resolved).await?;
                Ok(EffectOutcome::Replaced { state })
            }
            Effect::Delete { id, identifier } => {
                self.provider.delete(id, identifier).await?;
                Ok(EffectOutcome::Deleted)
            }
        }
    }
}

/// Remember the attributes of a resource under its binding name
pub fn record_binding(bindings: &mut BindingMap, resource: &Resource, state: &State) {
    let Some(binding) = resource.binding() else {
        return;
    };
    let mut attrs = resource.attributes.clone();
    attrs.extend(state.attributes.clone());
    bindings.insert(binding.to_string(), attrs);
}

/// Replace every reference in a resource with the value it points to
pub fn resolve_resource(resource: &Resource, bindings: &BindingMap) -> ProviderResult<Resource> {
    let mut resolved = resource.clone();
    for value in resolved.attributes.values_mut() {
        *value = resolve_value(value, bindings)?;
    }
    Ok(resolved)
}

/// Resolve references inside a value
pub fn resolve_value(value: &Value, bindings: &BindingMap) -> ProviderResult<Value> {
    match value {
        Value::ResourceRef(binding, attr) => bindings
            .get(binding)
            .and_then(|attrs| attrs.get(attr))
            .filter(|v| !v.has_unresolved_ref())
            .cloned()
            .ok_or_else(|| {
                ProviderError::new(format!("unresolved reference {}.{}", binding, attr))
            }),
        Value::List(items) => Ok(Value::List(
            items
                .iter()
                .map(|v| resolve_value(v, bindings))
                .collect::<ProviderResult<_>>()?,
        )),
        Value::Map(map) => Ok(Value::Map(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), resolve_value(v, bindings)?)))
                .collect::<ProviderResult<_>>()?,
        )),
        other => Ok(other.clone()),
    }
}

/// Resolve whatever can already be resolved, leaving the rest as references
pub fn resolve_known(value: &Value, bindings: &BindingMap) -> Value {
    match value {
        Value::ResourceRef(binding, attr) => bindings
            .get(binding)
            .and_then(|attrs| attrs.get(attr))
            .filter(|v| !v.has_unresolved_ref())
            .cloned()
            .unwrap_or_else(|| value.clone()),
        Value::List(items) => Value::List(items.iter().map(|v| resolve_known(v, bindings)).collect()),
        Value::Map(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_known(v, bindings)))
                .collect(),
        ),
        other => other.clone(),
    }
}
