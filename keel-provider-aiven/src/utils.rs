//! Helpers for identifiers and value conversion between the DSL and the API

use std::collections::HashMap;

use keel_core::resource::{Resource, Value};

/// Join identifier parts with '/'
pub fn build_resource_id(parts: &[&str]) -> String {
    parts.join("/")
}

/// Split an identifier into exactly `n` '/'-separated parts
pub fn split_resource_id(id: &str, n: usize) -> Result<Vec<&str>, String> {
    let parts: Vec<&str> = id.split('/').collect();
    if parts.len() != n || parts.iter().any(|p| p.is_empty()) {
        return Err(format!(
            "invalid resource id '{}', expected {} parts separated by '/'",
            id, n
        ));
    }
    Ok(parts)
}

/// Convert an API value into a DSL value
///
/// Nulls are dropped. Integers stay integers, other numbers become strings.
/// Objects become maps.
pub fn json_to_value(json: &serde_json::Value) -> Option<Value> {
    match json {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::Number(n) => Some(match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::String(n.to_string()),
        }),
        serde_json::Value::String(s) => Some(Value::String(s.clone())),
        serde_json::Value::Array(items) => {
            Some(Value::List(items.iter().filter_map(json_to_value).collect()))
        }
        serde_json::Value::Object(map) => Some(Value::Map(
            map.iter()
                .filter_map(|(k, v)| json_to_value(v).map(|v| (k.clone(), v)))
                .collect(),
        )),
    }
}

/// Convert a resolved DSL value into an API value
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
        Value::ResourceRef(_, _) => serde_json::Value::Null,
    }
}

/// The single map of a `name { ... }` block, or a map literal
fn block_map(value: &Value) -> Option<&HashMap<String, Value>> {
    match value {
        Value::Map(map) => Some(map),
        Value::List(items) if items.len() == 1 => items[0].as_map(),
        _ => None,
    }
}

fn user_config_value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::List(items) if items.len() == 1 && items[0].as_map().is_some() => {
            user_config_value_to_json(&items[0])
        }
        Value::Map(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), user_config_value_to_json(v)))
                .collect(),
        ),
        Value::List(items) => {
            serde_json::Value::Array(items.iter().map(user_config_value_to_json).collect())
        }
        other => value_to_json(other),
    }
}

/// Convert a declared `<type>_user_config` block into the API object
///
/// Nested blocks declared once become nested objects.
pub fn user_config_to_json(value: Option<&Value>) -> serde_json::Map<String, serde_json::Value> {
    match value.map(user_config_value_to_json) {
        Some(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    }
}

fn user_config_value_from_json(json: &serde_json::Value, declared: Option<&Value>) -> Option<Value> {
    match json {
        serde_json::Value::Object(map) => {
            let declared_map = declared.and_then(block_map);
            let fields: HashMap<String, Value> = map
                .iter()
                .filter_map(|(k, v)| {
                    let hint = declared_map.and_then(|d| d.get(k));
                    user_config_value_from_json(v, hint).map(|v| (k.clone(), v))
                })
                .collect();
            match declared {
                Some(Value::Map(_)) => Some(Value::Map(fields)),
                _ => Some(Value::List(vec![Value::Map(fields)])),
            }
        }
        serde_json::Value::Array(items) => Some(Value::List(
            items
                .iter()
                .filter_map(|item| user_config_value_from_json(item, None))
                .collect(),
        )),
        other => json_to_value(other),
    }
}

/// Convert an API user config into the block form declared in the DSL
///
/// `declared`, when known, decides whether nested objects are rendered as
/// blocks or map literals, and the order of `ip_filter` entries.
pub fn user_config_from_json(
    map: &serde_json::Map<String, serde_json::Value>,
    declared: Option<&Value>,
) -> Value {
    let value = user_config_value_from_json(&serde_json::Value::Object(map.clone()), declared)
        .unwrap_or_else(|| Value::List(vec![Value::Map(HashMap::new())]));
    match declared {
        Some(declared) => normalize_ip_filter(&value, declared),
        None => value,
    }
}

/// Reorder the observed `ip_filter` entries to follow the declared order
///
/// Entries that were not declared keep their relative order after the
/// declared ones.
pub fn normalize_ip_filter(observed: &Value, declared: &Value) -> Value {
    let (Some(observed_map), Some(declared_map)) = (block_map(observed), block_map(declared))
    else {
        return observed.clone();
    };
    let (Some(Value::List(observed_filters)), Some(Value::List(declared_filters))) =
        (observed_map.get("ip_filter"), declared_map.get("ip_filter"))
    else {
        return observed.clone();
    };

    let mut ordered: Vec<Value> = declared_filters
        .iter()
        .filter(|d| observed_filters.contains(d))
        .cloned()
        .collect();
    ordered.extend(
        observed_filters
            .iter()
            .filter(|o| !declared_filters.contains(o))
            .cloned(),
    );

    let mut map = observed_map.clone();
    map.insert("ip_filter".to_string(), Value::List(ordered));
    match observed {
        Value::Map(_) => Value::Map(map),
        _ => Value::List(vec![Value::Map(map)]),
    }
}

fn user_config_matches(declared: &Value, observed: &Value) -> bool {
    if let (Some(d), Some(o)) = (block_map(declared), block_map(observed))
        && (declared.as_map().is_some() || observed.as_map().is_some())
    {
        return d
            .iter()
            .all(|(k, v)| o.get(k).is_some_and(|ov| user_config_matches(v, ov)));
    }
    match (declared, observed) {
        (Value::Map(d), Value::Map(o)) => d
            .iter()
            .all(|(k, v)| o.get(k).is_some_and(|ov| user_config_matches(v, ov))),
        (Value::List(d), Value::List(o)) => {
            d.len() == o.len() && d.iter().zip(o).all(|(dv, ov)| user_config_matches(dv, ov))
        }
        _ => declared == observed,
    }
}

/// Diff suppression for `<type>_user_config`
///
/// The API reports every option including defaults and may reorder
/// `ip_filter`, so a declared config matches when each declared option agrees.
pub fn user_config_unchanged(old: Option<&Value>, new: &Value) -> bool {
    old.is_some_and(|old| user_config_matches(new, &normalize_ip_filter(old, new)))
}

/// Copy declared attributes that the API does not report into `attributes`
pub fn merge_declared(attributes: &mut HashMap<String, Value>, resource: &Resource) {
    for (key, value) in &resource.attributes {
        if key.starts_with('_') {
            continue;
        }
        attributes
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}
