use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;

use keel_core::differ::create_plan;
use keel_core::effect::Effect;
use keel_core::interpreter::{BindingMap, EffectOutcome, Interpreter, record_binding, resolve_known};
use keel_core::parser::{self, ParsedFile};
use keel_core::plan::Plan;
use keel_core::provider::Provider;
use keel_core::resource::{Resource, ResourceId, State};
use keel_core::schema::ResourceSchema;
use keel_provider_aiven::AivenProvider;
use keel_provider_aiven::resources::resource_types;
use keel_state::{LockInfo, StateBackend, StateFile, create_backend};

mod display;

use display::print_plan;

const PROVIDER: &str = "aiven";

#[derive(Parser)]
#[command(name = "keel")]
#[command(about = "Declarative management of Aiven data services", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration file
    Validate {
        /// Path to .keel file
        #[arg(default_value = "main.keel")]
        file: PathBuf,
    },
    /// Show execution plan without applying changes
    Plan {
        /// Path to .keel file
        #[arg(default_value = "main.keel")]
        file: PathBuf,
    },
    /// Apply changes to reach the desired state
    Apply {
        /// Path to .keel file
        #[arg(default_value = "main.keel")]
        file: PathBuf,
    },
    /// Destroy every resource recorded in state
    Destroy {
        /// Path to .keel file
        #[arg(default_value = "main.keel")]
        file: PathBuf,

        /// Skip confirmation prompt
        #[arg(long)]
        auto_approve: bool,
    },
    /// Bring an existing remote object under management
    Import {
        /// Binding name of the resource in the configuration
        address: String,
        /// Remote identifier, e.g. my-project/orders-db
        identifier: String,

        /// Path to .keel file
        #[arg(long, default_value = "main.keel")]
        file: PathBuf,
    },
    /// Inspect recorded state
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
    /// Remove a lock left behind by an interrupted run
    ForceUnlock {
        lock_id: String,

        /// Path to .keel file
        #[arg(long, default_value = "main.keel")]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum StateCommands {
    /// List managed resources
    List {
        /// Path to .keel file
        #[arg(default_value = "main.keel")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Plan { file } => run_plan(&file).await,
        Commands::Apply { file } => run_apply(&file).await,
        Commands::Destroy { file, auto_approve } => run_destroy(&file, auto_approve).await,
        Commands::Import {
            address,
            identifier,
            file,
        } => run_import(&file, &address, &identifier).await,
        Commands::State {
            command: StateCommands::List { file },
        } => run_state_list(&file).await,
        Commands::ForceUnlock { lock_id, file } => run_force_unlock(&file, &lock_id).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Resource and data source schemas, keyed by type name
struct Schemas {
    resources: HashMap<String, ResourceSchema>,
    data_sources: HashMap<String, ResourceSchema>,
}

impl Schemas {
    fn load() -> Self {
        let mut resources = HashMap::new();
        let mut data_sources = HashMap::new();
        for resource_type in resource_types() {
            let target = if resource_type.is_data_source() {
                &mut data_sources
            } else {
                &mut resources
            };
            target.insert(resource_type.name().to_string(), resource_type.schema());
        }
        Self {
            resources,
            data_sources,
        }
    }

    fn for_resource(&self, resource: &Resource) -> Option<&ResourceSchema> {
        let schemas = if resource.is_data_source() {
            &self.data_sources
        } else {
            &self.resources
        };
        schemas.get(&resource.id.resource_type)
    }
}

fn load_config(file: &Path) -> Result<ParsedFile, String> {
    let content = fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;
    parser::parse_and_resolve(&content).map_err(|e| format!("Parse error: {}", e))
}

fn validate_resources(resources: &[Resource], schemas: &Schemas) -> Result<(), String> {
    let mut all_errors = Vec::new();

    for resource in resources {
        let address = format!("{}.{}", resource.id.resource_type, resource.id.name);
        let provider = resource
            .attributes
            .get("_provider")
            .and_then(|v| v.as_str())
            .unwrap_or(PROVIDER);
        if provider != PROVIDER {
            all_errors.push(format!("{}: unknown provider '{}'", address, provider));
            continue;
        }

        let Some(schema) = schemas.for_resource(resource) else {
            let kind = if resource.is_data_source() {
                "data source"
            } else {
                "resource type"
            };
            all_errors.push(format!(
                "{}: unknown {} {}.{}",
                address, kind, PROVIDER, resource.id.resource_type
            ));
            continue;
        };

        if let Some(message) = &schema.deprecation_message {
            eprintln!("{} {}: {}", "Warning:".yellow().bold(), address, message);
        }
        if let Err(errors) = schema.validate(&resource.attributes) {
            for error in errors {
                all_errors.push(format!("{}: {}", address, error));
            }
        }
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(all_errors.join("\n"))
    }
}

fn load_validated(file: &Path) -> Result<(ParsedFile, Schemas), String> {
    let parsed = load_config(file)?;
    let schemas = Schemas::load();
    validate_resources(&parsed.resources, &schemas)?;
    Ok((parsed, schemas))
}

fn create_provider(parsed: &ParsedFile) -> Result<AivenProvider, String> {
    AivenProvider::from_config(parsed.provider(PROVIDER))
}

fn open_backend(parsed: &ParsedFile) -> Result<Box<dyn StateBackend>, String> {
    create_backend(parsed.backend.as_ref()).map_err(|e| e.to_string())
}

async fn read_state_file(backend: &dyn StateBackend) -> Result<StateFile, String> {
    Ok(backend
        .read_state()
        .await
        .map_err(|e| e.to_string())?
        .unwrap_or_default())
}

fn run_validate(file: &Path) -> Result<(), String> {
    println!("{}", "Validating...".cyan());
    let (parsed, _) = load_validated(file)?;

    println!(
        "{}",
        format!(
            "✓ {} resources validated successfully.",
            parsed.resources.len()
        )
        .green()
        .bold()
    );
    for resource in &parsed.resources {
        let marker = if resource.is_data_source() { " (read)" } else { "" };
        println!(
            "  • {}.{}{}",
            resource.id.resource_type, resource.id.name, marker
        );
    }
    Ok(())
}

/// Re-read every recorded resource
///
/// Recorded attributes are kept as a base and overridden by what the provider
/// reports. Resources that no longer exist are left out.
async fn refresh(
    provider: &AivenProvider,
    state_file: &StateFile,
) -> Result<HashMap<ResourceId, State>, String> {
    let mut current = HashMap::new();
    for (id, recorded) in state_file.states() {
        let observed = provider
            .read(&id, recorded.identifier.as_deref())
            .await
            .map_err(|e| format!("Failed to read state: {}", e))?;
        if !observed.exists {
            log::info!("{} no longer exists", id);
            continue;
        }
        let mut attributes = recorded.attributes;
        attributes.extend(observed.attributes);
        let identifier = observed.identifier.or(recorded.identifier);
        let mut state = State::existing(id.clone(), attributes);
        state.identifier = identifier;
        current.insert(id, state);
    }
    Ok(current)
}

struct PlannedChanges {
    plan: Plan,
    bindings: BindingMap,
    current: HashMap<ResourceId, State>,
}

/// Refresh state, resolve what can be resolved and diff against the configuration
async fn build_plan(
    provider: &AivenProvider,
    parsed: &ParsedFile,
    schemas: &Schemas,
    state_file: &StateFile,
) -> Result<PlannedChanges, String> {
    let current = refresh(provider, state_file).await?;

    // Bindings only point to earlier declarations
    let mut bindings = BindingMap::new();
    let mut desired = Vec::with_capacity(parsed.resources.len());
    for resource in &parsed.resources {
        let mut resolved = resource.clone();
        for value in resolved.attributes.values_mut() {
            *value = resolve_known(value, &bindings);
        }

        if resolved.is_data_source() {
            if !resolved.attributes.values().any(|v| v.has_unresolved_ref()) {
                let state = provider
                    .read_data_source(&resolved)
                    .await
                    .map_err(|e| format!("Failed to read {}: {}", resolved.id, e))?;
                record_binding(&mut bindings, &resolved, &state);
            }
        } else if let Some(state) = current.get(&resolved.id) {
            record_binding(&mut bindings, &resolved, state);
        }
        desired.push(resolved);
    }

    let plan = create_plan(&desired, &current, &schemas.resources);

    let mut errors = Vec::new();
    for effect in plan.effects() {
        let check = match effect {
            Effect::Create(r) | Effect::Replace { to: r, .. } => {
                provider
                    .validate_change(r, &State::not_found(r.id.clone()))
                    .await
            }
            Effect::Update { from, to, .. } => provider.validate_change(to, from).await,
            Effect::Read(_) | Effect::Delete { .. } => Ok(()),
        };
        if let Err(e) = check {
            errors.push(e.to_string());
        }
    }
    if !errors.is_empty() {
        return Err(errors.join("\n"));
    }

    Ok(PlannedChanges {
        plan,
        bindings,
        current,
    })
}

async fn run_plan(file: &Path) -> Result<(), String> {
    let (parsed, schemas) = load_validated(file)?;
    let provider = create_provider(&parsed)?;
    let backend = open_backend(&parsed)?;
    let state_file = read_state_file(backend.as_ref()).await?;

    let planned = build_plan(&provider, &parsed, &schemas, &state_file).await?;
    print_plan(&planned.plan, &schemas.resources);
    Ok(())
}

async fn run_apply(file: &Path) -> Result<(), String> {
    let (parsed, schemas) = load_validated(file)?;
    let provider = create_provider(&parsed)?;
    let backend = open_backend(&parsed)?;

    let lock = backend
        .acquire_lock("apply")
        .await
        .map_err(|e| e.to_string())?;
    let result = apply_locked(provider, &parsed, &schemas, backend.as_ref()).await;
    release_after(backend.as_ref(), &lock, result).await
}

/// Release `lock` once a locked run finished
///
/// The run's own error is reported first when both fail.
async fn release_after<T>(
    backend: &dyn StateBackend,
    lock: &LockInfo,
    result: Result<T, String>,
) -> Result<T, String> {
    let released = backend
        .release_lock(lock)
        .await
        .map_err(|e| format!("Failed to release lock {}: {}", lock.id, e));
    match (result, released) {
        (Err(e), Err(unlock)) => Err(format!("{}\n{}", e, unlock)),
        (result, released) => released.and(result),
    }
}

async fn apply_locked(
    provider: AivenProvider,
    parsed: &ParsedFile,
    schemas: &Schemas,
    backend: &dyn StateBackend,
) -> Result<(), String> {
    let mut state_file = read_state_file(backend).await?;
    let planned = build_plan(&provider, parsed, schemas, &state_file).await?;

    // Forget what disappeared outside of Keel
    let vanished: Vec<ResourceId> = state_file
        .states()
        .into_keys()
        .filter(|id| !planned.current.contains_key(id))
        .collect();
    for id in &vanished {
        state_file.remove_resource(id);
    }

    if planned.plan.mutation_count() == 0 {
        print_plan(&planned.plan, &schemas.resources);
        if !vanished.is_empty() {
            state_file.increment_serial();
            backend
                .write_state(&state_file)
                .await
                .map_err(|e| e.to_string())?;
        }
        return Ok(());
    }

    print_plan(&planned.plan, &schemas.resources);
    println!();
    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let interpreter = Interpreter::new(provider).with_bindings(planned.bindings);
    let result = interpreter.apply(&planned.plan).await;

    for (effect, outcome) in planned.plan.effects().iter().zip(&result.outcomes) {
        let label = format!(
            "{} {}.{}",
            effect.kind(),
            effect.resource_id().resource_type,
            effect.resource_id().name
        );
        match outcome {
            Ok(EffectOutcome::Deleted) => {
                state_file.remove_resource(effect.resource_id());
                println!("  {} {}", "✓".green(), label);
            }
            Ok(EffectOutcome::Read { .. }) => {}
            Ok(outcome) => {
                if let Some(state) = outcome.state() {
                    state_file.record(PROVIDER, state);
                }
                println!("  {} {}", "✓".green(), label);
            }
            Err(e) => println!("  {} {} - {}", "✗".red(), label, e),
        }
    }

    state_file.increment_serial();
    backend
        .write_state(&state_file)
        .await
        .map_err(|e| e.to_string())?;

    println!();
    if result.is_success() {
        println!(
            "{}",
            format!(
                "Apply complete! {} changes applied.",
                planned.plan.mutation_count()
            )
            .green()
            .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Apply failed. {} succeeded, {} failed.",
            result.success_count, result.failure_count
        ))
    }
}

/// Deletions for every recorded resource, newest first
fn destroy_plan(state_file: &StateFile) -> Plan {
    let mut plan = Plan::new();
    for recorded in state_file.resources.iter().rev() {
        if let Some(identifier) = &recorded.identifier {
            plan.add(Effect::Delete {
                id: ResourceId::new(&recorded.resource_type, &recorded.name),
                identifier: identifier.clone(),
            });
        }
    }
    plan
}

fn confirm(question: &str) -> Result<bool, String> {
    println!("{}", question.yellow().bold());
    println!(
        "  {}",
        "This action cannot be undone. Type 'yes' to confirm.".yellow()
    );
    print!("\n  Enter a value: ");
    std::io::Write::flush(&mut std::io::stdout()).map_err(|e| e.to_string())?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .map_err(|e| e.to_string())?;
    println!();
    Ok(input.trim() == "yes")
}

async fn run_destroy(file: &Path, auto_approve: bool) -> Result<(), String> {
    let parsed = load_config(file)?;
    let provider = create_provider(&parsed)?;
    let backend = open_backend(&parsed)?;

    let lock = backend
        .acquire_lock("destroy")
        .await
        .map_err(|e| e.to_string())?;
    let result = destroy_locked(provider, backend.as_ref(), auto_approve).await;
    release_after(backend.as_ref(), &lock, result).await
}

async fn destroy_locked(
    provider: AivenProvider,
    backend: &dyn StateBackend,
    auto_approve: bool,
) -> Result<(), String> {
    let mut state_file = read_state_file(backend).await?;
    let plan = destroy_plan(&state_file);
    if plan.is_empty() {
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    }

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    for effect in plan.effects() {
        let id = effect.resource_id();
        println!("  {} {}.{}", "-".red().bold(), id.resource_type, id.name);
    }
    println!();
    println!("Plan: {} to destroy.", plan.effects().len().to_string().red());
    println!();

    if !auto_approve && !confirm("Do you really want to destroy all resources?")? {
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();

    let result = Interpreter::new(provider).apply(&plan).await;
    for (effect, outcome) in plan.effects().iter().zip(&result.outcomes) {
        let id = effect.resource_id();
        match outcome {
            Ok(_) => {
                state_file.remove_resource(id);
                println!("  {} delete {}.{}", "✓".green(), id.resource_type, id.name);
            }
            Err(e) => println!(
                "  {} delete {}.{} - {}",
                "✗".red(),
                id.resource_type,
                id.name,
                e
            ),
        }
    }

    state_file.increment_serial();
    backend
        .write_state(&state_file)
        .await
        .map_err(|e| e.to_string())?;

    println!();
    if result.is_success() {
        println!(
            "{}",
            format!(
                "Destroy complete! {} resources destroyed.",
                result.success_count
            )
            .green()
            .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Destroy failed. {} succeeded, {} failed.",
            result.success_count, result.failure_count
        ))
    }
}

async fn run_import(file: &Path, address: &str, identifier: &str) -> Result<(), String> {
    let (parsed, _) = load_validated(file)?;
    let resource = parsed
        .resources
        .iter()
        .find(|r| r.id.name == address)
        .ok_or_else(|| format!("No resource bound to '{}' in {}", address, file.display()))?;
    if resource.is_data_source() {
        return Err(format!("{} is a data source and cannot be imported", address));
    }

    let provider = create_provider(&parsed)?;
    let backend = open_backend(&parsed)?;
    let lock = backend
        .acquire_lock("import")
        .await
        .map_err(|e| e.to_string())?;
    let result = import_locked(&provider, backend.as_ref(), &resource.id, identifier).await;
    release_after(backend.as_ref(), &lock, result).await
}

async fn import_locked(
    provider: &AivenProvider,
    backend: &dyn StateBackend,
    id: &ResourceId,
    identifier: &str,
) -> Result<(), String> {
    let mut state_file = read_state_file(backend).await?;
    if let Some(existing) = state_file.find_resource(id) {
        return Err(format!(
            "{} is already managed (identifier {})",
            id,
            existing.identifier.as_deref().unwrap_or("unknown")
        ));
    }

    let state = provider
        .import(id, identifier)
        .await
        .map_err(|e| format!("Import failed: {}", e))?;
    state_file.record(PROVIDER, &state);
    state_file.increment_serial();
    backend
        .write_state(&state_file)
        .await
        .map_err(|e| e.to_string())?;

    println!(
        "{}",
        format!("Imported {} from {}.", id, identifier).green().bold()
    );
    Ok(())
}

async fn run_state_list(file: &Path) -> Result<(), String> {
    let parsed = load_config(file)?;
    let backend = open_backend(&parsed)?;
    let state_file = read_state_file(backend.as_ref()).await?;

    if state_file.resources.is_empty() {
        println!("{}", "No resources in state.".yellow());
        return Ok(());
    }
    for recorded in &state_file.resources {
        println!(
            "{}.{}  {}",
            recorded.resource_type,
            recorded.name,
            recorded.identifier.as_deref().unwrap_or("-").dimmed()
        );
    }
    Ok(())
}

async fn run_force_unlock(file: &Path, lock_id: &str) -> Result<(), String> {
    let parsed = load_config(file)?;
    let backend = open_backend(&parsed)?;
    backend
        .force_unlock(lock_id)
        .await
        .map_err(|e| e.to_string())?;
    println!("{}", format!("Lock {} released.", lock_id).green());
    Ok(())
}
