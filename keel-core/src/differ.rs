//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the "desired state" declared in DSL with the "current state" fetched
//! from the Provider, and generates a list of required Effects (Plan).

use std::collections::HashMap;

use crate::effect::Effect;
use crate::plan::Plan;
use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::ResourceSchema;

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// A force-new attribute changed -> delete and recreate
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(desired: &Resource, current: &State, schema: Option<&ResourceSchema>) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let mut changed =
        find_changed_attributes(&desired.attributes, &current.attributes, schema);
    changed.sort();

    if changed.is_empty() {
        return Diff::NoChange(desired.id.clone());
    }

    let replace = schema.is_some_and(|s| changed.iter().any(|attr| s.is_force_new(attr)));
    if replace {
        log::debug!("{} requires replacement: {}", desired.id, changed.join(", "));
        Diff::Replace {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    }
}

/// Find changed attributes between desired and current state
fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
    schema: Option<&ResourceSchema>,
) -> Vec<String> {
    let mut changed = Vec::new();

    for (key, desired_value) in desired {
        // Skip internal attributes (starting with _)
        if key.starts_with('_') {
            continue;
        }
        if let Some(schema) = schema {
            if schema.is_computed_only(key) {
                continue;
            }
            if schema.suppresses_diff(key, current.get(key), desired_value) {
                continue;
            }
        }

        match current.get(key) {
            Some(current_value) if value_matches(desired_value, current_value) => {}
            _ => changed.push(key.clone()),
        }
    }

    changed
}

/// Declared values match when every declared key of a map agrees with the
/// observed value; the remote side may report more keys than were declared.
fn value_matches(desired: &Value, current: &Value) -> bool {
    match (desired, current) {
        (Value::Map(d), Value::Map(c)) => d
            .iter()
            .all(|(k, v)| c.get(k).is_some_and(|cv| value_matches(v, cv))),
        (Value::List(d), Value::List(c)) => {
            d.len() == c.len() && d.iter().zip(c).all(|(dv, cv)| value_matches(dv, cv))
        }
        _ => desired == current,
    }
}

/// Compute Diff for multiple resources and generate a Plan
///
/// `current_states` may hold states for resources that are no longer declared;
/// those that still exist remotely are planned for deletion.
pub fn create_plan(
    desired: &[Resource],
    current_states: &HashMap<ResourceId, State>,
    schemas: &HashMap<String, ResourceSchema>,
) -> Plan {
    let mut plan = Plan::new();

    for resource in desired {
        if resource.is_data_source() {
            plan.add(Effect::Read(resource.clone()));
            continue;
        }

        let current = current_states
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        match diff(resource, &current, schemas.get(&resource.id.resource_type)) {
            Diff::Create(r) => plan.add(Effect::Create(r)),
            Diff::Update { id, from, to, .. } => plan.add(Effect::Update { id, from, to }),
            Diff::Replace { id, from, to, .. } => plan.add(Effect::Replace { id, from, to }),
            Diff::NoChange(_) => {}
        }
    }

    let mut orphans: Vec<&State> = current_states
        .values()
        .filter(|s| s.exists && !desired.iter().any(|r| r.id == s.id))
        .collect();
    orphans.sort_by_key(|s| s.id.to_string());

    for state in orphans {
        if let Some(identifier) = &state.identifier {
            plan.add(Effect::Delete {
                id: state.id.clone(),
                identifier: identifier.clone(),
            });
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeSchema, AttributeType};

    fn pg_schema() -> ResourceSchema {
        ResourceSchema::new("pg")
            .attribute(
                AttributeSchema::new("project", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("plan", AttributeType::String))
            .attribute(AttributeSchema::new("state", AttributeType::String).computed())
            .attribute(
                AttributeSchema::new("maintenance_window_dow", AttributeType::String)
                    .with_diff_suppress(|_, new| new.as_str() == Some("")),
            )
    }

    fn existing(attrs: &[(&str, Value)]) -> State {
        State::existing(
            ResourceId::new("pg", "db"),
            attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
        .with_identifier("p/db")
    }

    #[test]
    fn diff_create_when_not_exists() {
        let desired = Resource::new("pg", "db");
        let current = State::not_found(ResourceId::new("pg", "db"));

        let result = diff(&desired, &current, None);
        assert!(matches!(result, Diff::Create(_)));
    }

    #[test]
    fn diff_no_change_when_same() {
        let desired = Resource::new("pg", "db")
            .with_attribute("plan", Value::String("startup-4".to_string()));
        let current = existing(&[
            ("plan", Value::String("startup-4".to_string())),
            ("state", Value::String("RUNNING".to_string())),
        ]);

        let result = diff(&desired, &current, Some(&pg_schema()));
        assert!(matches!(result, Diff::NoChange(_)));
    }

    #[test]
    fn diff_update_when_different() {
        let desired = Resource::new("pg", "db")
            .with_attribute("plan", Value::String("business-4".to_string()));
        let current = existing(&[("plan", Value::String("startup-4".to_string()))]);

        match diff(&desired, &current, Some(&pg_schema())) {
            Diff::Update {
                changed_attributes, ..
            } => {
                assert_eq!(changed_attributes, vec!["plan".to_string()]);
            }
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[test]
    fn diff_replace_on_force_new_change() {
        let desired = Resource::new("pg", "db")
            .with_attribute("project", Value::String("other".to_string()));
        let current = existing(&[("project", Value::String("p".to_string()))]);

        assert!(matches!(
            diff(&desired, &current, Some(&pg_schema())),
            Diff::Replace { .. }
        ));
    }

    #[test]
    fn diff_suppress_and_computed_are_ignored() {
        let desired = Resource::new("pg", "db")
            .with_attribute("maintenance_window_dow", Value::String(String::new()))
            .with_attribute("state", Value::String("POWEROFF".to_string()));
        let current = existing(&[
            ("maintenance_window_dow", Value::String("sunday".to_string())),
            ("state", Value::String("RUNNING".to_string())),
        ]);

        assert!(matches!(
            diff(&desired, &current, Some(&pg_schema())),
            Diff::NoChange(_)
        ));
    }

    #[test]
    fn declared_map_keys_are_a_subset() {
        let declared = Value::List(vec![Value::Map(
            [("pg_version".to_string(), Value::String("15".to_string()))]
                .into_iter()
                .collect(),
        )]);
        let observed = Value::List(vec![Value::Map(
            [
                ("pg_version".to_string(), Value::String("15".to_string())),
                ("backup_hour".to_string(), Value::Int(3)),
            ]
            .into_iter()
            .collect(),
        )]);
        assert!(value_matches(&declared, &observed));
        assert!(!value_matches(&observed, &declared));
    }

    #[test]
    fn create_plan_from_resources() {
        let resources = vec![
            Resource::new("pg", "new-db"),
            Resource::new("pg", "db").with_attribute("plan", Value::String("hobbyist".to_string())),
            Resource::new("opensearch", "logs").with_read_only(true),
        ];

        let mut current_states = HashMap::new();
        current_states.insert(
            ResourceId::new("pg", "db"),
            existing(&[("plan", Value::String("startup-4".to_string()))]),
        );
        current_states.insert(
            ResourceId::new("kafka", "gone"),
            State::existing(ResourceId::new("kafka", "gone"), HashMap::new())
                .with_identifier("p/gone"),
        );

        let mut schemas = HashMap::new();
        schemas.insert("pg".to_string(), pg_schema());

        let plan = create_plan(&resources, &current_states, &schemas);

        assert_eq!(plan.effects().len(), 4);
        assert!(matches!(plan.effects()[0], Effect::Create(_)));
        assert!(matches!(plan.effects()[1], Effect::Update { .. }));
        assert!(matches!(plan.effects()[2], Effect::Read(_)));
        assert!(matches!(
            &plan.effects()[3],
            Effect::Delete { identifier, .. } if identifier == "p/gone"
        ));
    }
}
