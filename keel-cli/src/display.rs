//! Plan and value rendering

use std::collections::HashMap;

use colored::Colorize;

use keel_core::differ::{Diff, diff};
use keel_core::effect::Effect;
use keel_core::plan::Plan;
use keel_core::resource::{Resource, State, Value};
use keel_core::schema::ResourceSchema;

pub fn print_plan(plan: &Plan, schemas: &HashMap<String, ResourceSchema>) {
    if plan.mutation_count() == 0 {
        println!("{}", "No changes. Services are up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();
    for effect in plan.effects() {
        let schema = schemas.get(&effect.resource_id().resource_type);
        print_effect(effect, schema);
    }
    println!();
    println!("{}", plan.summary().to_string().bold());
}

fn print_effect(effect: &Effect, schema: Option<&ResourceSchema>) {
    match effect {
        Effect::Read(r) => {
            println!("  {} {}", "<=".cyan().bold(), address(r).cyan());
        }
        Effect::Create(r) => {
            println!("  {} {}", "+".green().bold(), address(r));
            for key in declared_keys(r) {
                println!(
                    "      {}: {}",
                    key,
                    display_value(schema, key, &r.attributes[key]).green()
                );
            }
        }
        Effect::Update { from, to, .. } => {
            println!("  {} {}", "~".yellow().bold(), address(to));
            print_changes(from, to, schema);
        }
        Effect::Replace { from, to, .. } => {
            println!(
                "  {} {} {}",
                "-/+".magenta().bold(),
                address(to),
                "(must be replaced)".magenta()
            );
            print_changes(from, to, schema);
        }
        Effect::Delete { id, identifier } => {
            println!(
                "  {} {}.{} ({})",
                "-".red().bold(),
                id.resource_type,
                id.name,
                identifier
            );
        }
    }
}

fn print_changes(from: &State, to: &Resource, schema: Option<&ResourceSchema>) {
    let changed = match diff(to, from, schema) {
        Diff::Update {
            changed_attributes, ..
        }
        | Diff::Replace {
            changed_attributes, ..
        } => changed_attributes,
        _ => Vec::new(),
    };
    for key in &changed {
        let old = from
            .attributes
            .get(key)
            .map(|v| display_value(schema, key, v))
            .unwrap_or_else(|| "(unset)".to_string());
        let new = display_value(schema, key, &to.attributes[key]);
        let marker = if schema.is_some_and(|s| s.is_force_new(key)) {
            " # forces replacement".magenta().to_string()
        } else {
            String::new()
        };
        println!(
            "      {}: {} => {}{}",
            key,
            old.red(),
            new.green(),
            marker
        );
    }
}

fn address(resource: &Resource) -> String {
    format!("{}.{}", resource.id.resource_type, resource.id.name)
}

fn declared_keys(resource: &Resource) -> Vec<&str> {
    let mut keys: Vec<&str> = resource
        .attributes
        .keys()
        .map(String::as_str)
        .filter(|k| !k.starts_with('_'))
        .collect();
    keys.sort();
    keys
}

fn display_value(schema: Option<&ResourceSchema>, key: &str, value: &Value) -> String {
    if schema.and_then(|s| s.get(key)).is_some_and(|a| a.sensitive) {
        return "(sensitive)".to_string();
    }
    format_value(value)
}

pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let items: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Map(map) => {
            let mut entries: Vec<_> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            entries.sort();
            format!("{{{}}}", entries.join(", "))
        }
        Value::ResourceRef(binding, attr) => format!("{}.{} (known after apply)", binding, attr),
    }
}
