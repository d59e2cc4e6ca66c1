//! Parser - Parse .keel files
//!
//! Convert DSL to resources using pest

use pest::Parser;
use pest::iterators::{Pair, Pairs};
use pest_derive::Parser;
use std::collections::HashMap;
use std::env;

use crate::resource::{Resource, ResourceId, Value};

#[derive(Parser)]
#[grammar = "parser/keel.pest"]
struct KeelParser;

/// Parse error
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Syntax error: {0}")]
    Syntax(#[from] Box<pest::error::Error<Rule>>),

    #[error("Invalid expression at line {line}: {message}")]
    InvalidExpression { line: usize, message: String },

    #[error("Undefined variable at line {line}: {name}")]
    UndefinedVariable { line: usize, name: String },

    #[error("Environment variable not set: {0}")]
    EnvVarNotSet(String),

    #[error("Invalid resource type at line {line}: {name}")]
    InvalidResourceType { line: usize, name: String },

    #[error("Duplicate binding at line {line}: {name}")]
    DuplicateBinding { line: usize, name: String },
}

/// Provider configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub attributes: HashMap<String, Value>,
}

/// Backend configuration for state storage
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Backend type (e.g., "local")
    pub backend_type: String,
    /// Backend-specific attributes
    pub attributes: HashMap<String, Value>,
}

/// Parse result
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub providers: Vec<ProviderConfig>,
    /// Resources and data sources, in declaration order
    pub resources: Vec<Resource>,
    pub variables: HashMap<String, Value>,
    /// Backend configuration for state storage
    pub backend: Option<BackendConfig>,
}

impl ParsedFile {
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }
}

/// Parse context (variable scope)
#[derive(Default)]
struct ParseContext {
    variables: HashMap<String, Value>,
    /// Names bound to resources so far
    resource_bindings: HashMap<String, ResourceId>,
}

impl ParseContext {
    fn is_bound(&self, name: &str) -> bool {
        self.variables.contains_key(name) || self.resource_bindings.contains_key(name)
    }
}

fn line_of(pair: &Pair<Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

/// Next inner pair; the grammar guarantees presence, but a malformed tree is
/// reported instead of panicking.
fn next_pair<'a>(
    pairs: &mut Pairs<'a, Rule>,
    line: usize,
    what: &str,
) -> Result<Pair<'a, Rule>, ParseError> {
    pairs.next().ok_or_else(|| ParseError::InvalidExpression {
        line,
        message: format!("expected {}", what),
    })
}

/// Parse a .keel file
pub fn parse(input: &str) -> Result<ParsedFile, ParseError> {
    let pairs = KeelParser::parse(Rule::file, input).map_err(Box::new)?;

    let mut ctx = ParseContext::default();
    let mut parsed = ParsedFile::default();

    for pair in pairs.flat_map(|p| p.into_inner()) {
        if pair.as_rule() != Rule::statement {
            continue;
        }
        for stmt in pair.into_inner() {
            match stmt.as_rule() {
                Rule::backend_block => {
                    let (backend_type, attributes) = parse_named_block(stmt, &ctx)?;
                    parsed.backend = Some(BackendConfig {
                        backend_type,
                        attributes,
                    });
                }
                Rule::provider_block => {
                    let (name, attributes) = parse_named_block(stmt, &ctx)?;
                    parsed.providers.push(ProviderConfig { name, attributes });
                }
                Rule::let_binding => parse_let_binding(stmt, &mut ctx, &mut parsed)?,
                _ => {}
            }
        }
    }

    parsed.variables = ctx.variables;
    Ok(parsed)
}

/// Parse and resolve references between declared attributes
pub fn parse_and_resolve(input: &str) -> Result<ParsedFile, ParseError> {
    let mut parsed = parse(input)?;
    resolve_resource_refs(&mut parsed);
    Ok(parsed)
}

/// `backend <type> { ... }` and `provider <name> { ... }`
fn parse_named_block(
    pair: Pair<Rule>,
    ctx: &ParseContext,
) -> Result<(String, HashMap<String, Value>), ParseError> {
    let line = line_of(&pair);
    let mut inner = pair
        .into_inner()
        .filter(|p| !matches!(p.as_rule(), Rule::backend_kw | Rule::provider_kw));
    let name = inner
        .next()
        .ok_or_else(|| ParseError::InvalidExpression {
            line,
            message: "expected block name".to_string(),
        })?
        .as_str()
        .to_string();

    let mut attributes = HashMap::new();
    for attr_pair in inner {
        if attr_pair.as_rule() == Rule::attribute {
            let (key, value) = parse_attribute(attr_pair, ctx)?;
            attributes.insert(key, value);
        }
    }

    Ok((name, attributes))
}

fn parse_let_binding(
    pair: Pair<Rule>,
    ctx: &mut ParseContext,
    parsed: &mut ParsedFile,
) -> Result<(), ParseError> {
    let line = line_of(&pair);
    let mut inner = pair.into_inner();
    let _let_kw = next_pair(&mut inner, line, "let")?;
    let name = next_pair(&mut inner, line, "binding name")?.as_str().to_string();
    let value_pair = next_pair(&mut inner, line, "binding value")?;

    if ctx.is_bound(&name) {
        return Err(ParseError::DuplicateBinding { line, name });
    }

    match value_pair.as_rule() {
        Rule::resource_expr => {
            let resource = parse_resource_expr(value_pair, ctx, &name)?;
            ctx.resource_bindings
                .insert(name.clone(), resource.id.clone());
            parsed.resources.push(resource);
        }
        _ => {
            let value = parse_expression(value_pair, ctx)?;
            ctx.variables.insert(name, value);
        }
    }
    Ok(())
}

fn parse_resource_expr(
    pair: Pair<Rule>,
    ctx: &ParseContext,
    binding_name: &str,
) -> Result<Resource, ParseError> {
    let line = line_of(&pair);
    let mut inner = pair.into_inner().peekable();

    let read_only = inner
        .peek()
        .is_some_and(|p| p.as_rule() == Rule::read_kw);
    if read_only {
        inner.next();
    }

    let namespaced_type = inner
        .next()
        .ok_or_else(|| ParseError::InvalidExpression {
            line,
            message: "expected resource type".to_string(),
        })?
        .as_str()
        .to_string();

    // aiven.pg -> provider "aiven", type "pg"
    let Some((provider, resource_type)) = namespaced_type.split_once('.') else {
        return Err(ParseError::InvalidResourceType {
            line,
            name: namespaced_type,
        });
    };
    if resource_type.contains('.') {
        return Err(ParseError::InvalidResourceType {
            line,
            name: namespaced_type.clone(),
        });
    }

    let mut attributes = parse_block_contents(inner, ctx)?;

    // Add provider information to attributes
    attributes.insert("_provider".to_string(), Value::String(provider.to_string()));
    attributes.insert("_type".to_string(), Value::String(namespaced_type.clone()));
    // Save binding name (for reference)
    attributes.insert(
        "_binding".to_string(),
        Value::String(binding_name.to_string()),
    );

    Ok(Resource {
        id: ResourceId::new(resource_type, binding_name),
        attributes,
        read_only,
    })
}

/// Parse block contents (attributes and nested blocks)
/// Nested blocks with the same name are collected into a list
fn parse_block_contents<'a>(
    pairs: impl Iterator<Item = Pair<'a, Rule>>,
    ctx: &ParseContext,
) -> Result<HashMap<String, Value>, ParseError> {
    let mut attributes: HashMap<String, Value> = HashMap::new();
    let mut nested_blocks: HashMap<String, Vec<Value>> = HashMap::new();

    for content_pair in pairs {
        if content_pair.as_rule() != Rule::block_content {
            continue;
        }
        let line = line_of(&content_pair);
        let inner = next_pair(&mut content_pair.into_inner(), line, "block content")?;
        match inner.as_rule() {
            Rule::attribute => {
                let (key, value) = parse_attribute(inner, ctx)?;
                attributes.insert(key, value);
            }
            Rule::nested_block => {
                let mut block_inner = inner.into_inner();
                let block_name = next_pair(&mut block_inner, line, "block name")?
                    .as_str()
                    .to_string();
                let block_attrs = parse_block_contents(block_inner, ctx)?;

                // Add to the list of blocks with this name
                nested_blocks
                    .entry(block_name)
                    .or_default()
                    .push(Value::Map(block_attrs));
            }
            _ => {}
        }
    }

    // Convert nested blocks to list attributes
    for (name, blocks) in nested_blocks {
        attributes.insert(name, Value::List(blocks));
    }

    Ok(attributes)
}

fn parse_attribute(pair: Pair<Rule>, ctx: &ParseContext) -> Result<(String, Value), ParseError> {
    let line = line_of(&pair);
    let mut inner = pair.into_inner();
    let key = next_pair(&mut inner, line, "attribute name")?
        .as_str()
        .to_string();
    let value = parse_expression(next_pair(&mut inner, line, "attribute value")?, ctx)?;
    Ok((key, value))
}

fn parse_expression(pair: Pair<Rule>, ctx: &ParseContext) -> Result<Value, ParseError> {
    let line = line_of(&pair);
    let inner = if pair.as_rule() == Rule::expression {
        next_pair(&mut pair.into_inner(), line, "expression")?
    } else {
        pair
    };

    match inner.as_rule() {
        Rule::env_var => {
            let var_name = parse_string(next_pair(&mut inner.into_inner(), line, "string")?);
            env::var(&var_name).map(Value::String).map_err(|_| ParseError::EnvVarNotSet(var_name))
        }
        Rule::list => {
            let items: Result<Vec<Value>, ParseError> = inner
                .into_inner()
                .map(|item| parse_expression(item, ctx))
                .collect();
            Ok(Value::List(items?))
        }
        Rule::map => {
            let mut map = HashMap::new();
            for entry in inner.into_inner() {
                if entry.as_rule() == Rule::map_entry {
                    let mut entry_inner = entry.into_inner();
                    let key_pair = next_pair(&mut entry_inner, line, "map key")?;
                    let key = match key_pair.as_rule() {
                        Rule::string => parse_string(key_pair),
                        _ => key_pair.as_str().to_string(),
                    };
                    let value =
                        parse_expression(next_pair(&mut entry_inner, line, "map value")?, ctx)?;
                    map.insert(key, value);
                }
            }
            Ok(Value::Map(map))
        }
        Rule::boolean => Ok(Value::Bool(inner.as_str() == "true")),
        Rule::number => inner
            .as_str()
            .parse()
            .map(Value::Int)
            .map_err(|e| ParseError::InvalidExpression {
                line,
                message: format!("invalid number '{}': {}", inner.as_str(), e),
            }),
        Rule::string => Ok(Value::String(parse_string(inner))),
        Rule::reference => {
            let (binding, attr) =
                inner
                    .as_str()
                    .split_once('.')
                    .ok_or_else(|| ParseError::InvalidExpression {
                        line,
                        message: format!("invalid reference '{}'", inner.as_str()),
                    })?;
            if ctx.resource_bindings.contains_key(binding) {
                // Resolved later, from declared attributes or observed state
                Ok(Value::ResourceRef(binding.to_string(), attr.to_string()))
            } else if ctx.variables.contains_key(binding) {
                Err(ParseError::InvalidExpression {
                    line,
                    message: format!(
                        "'{}' is not a resource, cannot access attribute '{}'",
                        binding, attr
                    ),
                })
            } else {
                Err(ParseError::UndefinedVariable {
                    line,
                    name: binding.to_string(),
                })
            }
        }
        Rule::variable_ref => {
            let name = inner.as_str();
            ctx.variables
                .get(name)
                .cloned()
                .ok_or_else(|| ParseError::UndefinedVariable {
                    line,
                    name: name.to_string(),
                })
        }
        _ => Err(ParseError::InvalidExpression {
            line,
            message: format!("unexpected '{}'", inner.as_str()),
        }),
    }
}

fn parse_string(pair: Pair<Rule>) -> String {
    let s = pair.as_str();
    // Remove quotes
    let inner = &s[1..s.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(c @ ('"' | '\\')) => out.push(c),
            // Unknown escapes are kept as written
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Resolve resource references in a ParsedFile
/// This replaces ResourceRef values with the attribute values declared on the
/// referenced resources. References to attributes that are only known once the
/// resource exists are kept and resolved at apply time.
pub fn resolve_resource_refs(parsed: &mut ParsedFile) {
    // Build a map of binding_name -> attributes for quick lookup
    let binding_map: HashMap<String, HashMap<String, Value>> = parsed
        .resources
        .iter()
        .filter_map(|r| Some((r.binding()?.to_string(), r.attributes.clone())))
        .collect();

    for resource in &mut parsed.resources {
        for value in resource.attributes.values_mut() {
            *value = resolve_value(value, &binding_map);
        }
    }
}

fn resolve_value(value: &Value, binding_map: &HashMap<String, HashMap<String, Value>>) -> Value {
    match value {
        Value::ResourceRef(binding_name, attr_name) => {
            match binding_map
                .get(binding_name)
                .and_then(|attributes| attributes.get(attr_name))
            {
                // Bindings may only refer backwards, so this terminates
                Some(attr_value) => resolve_value(attr_value, binding_map),
                None => value.clone(),
            }
        }
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|item| resolve_value(item, binding_map))
                .collect(),
        ),
        Value::Map(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, binding_map)))
                .collect(),
        ),
        _ => value.clone(),
    }
}
