//! Graphform CLI entrypoint.
//!
//! This is the main entrypoint for the graphform command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use graphform::cli::{Cli, Commands, LogFormat, OutputFormatter, PlanArgs, StateCommands};
use graphform::config::{Config, ConfigParser, find_config_file};
use graphform::engine::{GraphType, RefreshStats};
use graphform::error::{ConfigError, EngineError, PlanError, Result};
use graphform::plans::{Plan, PlanMode};
use graphform::providers::ProviderRegistry;
use graphform::states::{LocalStateStore, State, StateStore, generate_holder_id};
use graphform::{Context, Diagnostics};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_format);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system. `RUST_LOG` overrides the default level.
fn init_logging(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let paths = Paths::resolve(cli.config.as_deref(), cli.state.as_deref())?;

    match cli.command {
        Commands::Validate => cmd_validate(&paths, &formatter).await,
        Commands::Plan { args, out } => cmd_plan(&paths, &args, out.as_deref(), &formatter).await,
        Commands::Apply { plan_file, args, yes } => {
            cmd_apply(&paths, plan_file.as_deref(), &args, yes, &formatter).await
        }
        Commands::Graph { kind, args } => cmd_graph(&paths, kind, &args).await,
        Commands::State { command } => cmd_state(&paths, command, &formatter).await,
    }
}

/// Validate configuration.
async fn cmd_validate(paths: &Paths, formatter: &OutputFormatter) -> Result<()> {
    info!("Validating configuration: {}", paths.config.display());
    let context = load_context(paths)?;
    let diags = context.validate().await;
    report(&diags, formatter);
    if diags.has_errors() {
        return Err(EngineError::validation(
            format!("{} error(s) in configuration", diags.errors().count()),
            None,
        ));
    }

    let config = context.config();
    eprintln!("Configuration is valid!");
    eprintln!("\nConfiguration summary:");
    eprintln!("  Root module: {}", paths.config.display());
    eprintln!("  Modules: {}", config.modules().len());
    eprintln!("  Resources: {}", config.resources().len());
    Ok(())
}

/// Compute and show a plan.
async fn cmd_plan(
    paths: &Paths,
    args: &PlanArgs,
    out: Option<&Path>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let context = load_context(paths)?;
    let store = paths.store();
    let prior = store.load().await?.unwrap_or_default();

    let plan = plan_and_report(&context, &prior, args, formatter).await?;

    if let Some(path) = out {
        plan.save(path).await?;
        eprintln!("\nSaved the plan to: {}", path.display());
    }
    Ok(())
}

/// Apply a saved plan, or plan and apply.
async fn cmd_apply(
    paths: &Paths,
    plan_file: Option<&Path>,
    args: &PlanArgs,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let context = load_context(paths)?;
    let store = paths.store();

    let lock = store.acquire_lock(&generate_holder_id(), "apply").await?;
    debug!("Acquired state lock {}", lock.lock_id);

    let result = apply_locked(&context, &store, plan_file, args, auto_approve, formatter).await;

    if let Err(e) = store.release_lock(&lock.lock_id).await {
        warn!("Failed to release state lock {}: {e}", lock.lock_id);
    }
    result
}

async fn apply_locked(
    context: &Context,
    store: &LocalStateStore,
    plan_file: Option<&Path>,
    args: &PlanArgs,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let plan = if let Some(path) = plan_file {
        info!("Loading plan from: {}", path.display());
        let plan = Plan::load(path).await?;
        eprintln!("{}", formatter.format_plan(&plan));
        plan
    } else {
        let prior = store.load().await?.unwrap_or_default();
        let plan = plan_and_report(context, &prior, args, formatter).await?;

        if !plan.has_changes() && plan.mode != PlanMode::RefreshOnly {
            eprintln!("No changes to apply.");
            return Ok(());
        }

        // Confirm
        if !auto_approve && !confirm("Do you want to apply this plan? [y/N]: ")? {
            eprintln!("Apply cancelled.");
            return Ok(());
        }
        plan
    };

    let (state, diags) = context.apply(&plan).await;
    report(&diags, formatter);

    // Partial results are still recorded.
    store.save(&state).await?;

    if diags.has_errors() {
        return Err(PlanError::Errored.into());
    }

    let (add, change, destroy) = plan.summary_counts();
    eprintln!("\nApply complete! Resources: {add} added, {change} changed, {destroy} destroyed.");
    if !state.root_outputs.is_empty() {
        eprintln!("\nOutputs:");
        for (name, value) in &state.root_outputs {
            eprintln!("  {name} = {value}");
        }
    }
    Ok(())
}

/// Print a graph in DOT format.
async fn cmd_graph(paths: &Paths, kind: GraphType, args: &PlanArgs) -> Result<()> {
    let context = load_context(paths)?;
    let prior = paths.store().load().await?.unwrap_or_default();
    let graph = context.graph(kind, &prior, args.to_options()).await?;
    println!("{}", graph.to_dot());
    Ok(())
}

/// State management commands.
async fn cmd_state(paths: &Paths, command: StateCommands, formatter: &OutputFormatter) -> Result<()> {
    let store = paths.store();

    match command {
        StateCommands::Show => match store.load().await? {
            Some(state) => println!("{}", formatter.format_state(&state)),
            None => eprintln!("No state found at {}.", store.state_path().display()),
        },
        StateCommands::List => {
            let state = store.load().await?.unwrap_or_default();
            print!("{}", formatter.format_state_list(&state));
        }
        StateCommands::Lock { holder } => {
            let holder = holder.unwrap_or_else(generate_holder_id);
            let lock = store.acquire_lock(&holder, "manual").await?;
            eprintln!("{}", formatter.format_lock(&lock));
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                store.force_unlock().await?;
                eprintln!("State forcefully unlocked.");
            } else if let Some(id) = lock_id {
                store.release_lock(&id).await?;
                eprintln!("State unlocked.");
            } else {
                eprintln!("Please provide --lock-id or use --force");
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolved configuration and state locations.
struct Paths {
    config: PathBuf,
    state: PathBuf,
}

impl Paths {
    /// Uses the explicit paths or searches upwards for a root module. The
    /// state file defaults to a sibling of the root module file.
    fn resolve(config: Option<&Path>, state: Option<&Path>) -> Result<Self> {
        let config = config.map_or_else(|| find_config_file("."), |path| Ok(path.to_path_buf()))?;
        let state = state.map_or_else(
            || LocalStateStore::in_dir(config_dir(&config)).state_path().to_path_buf(),
            Path::to_path_buf,
        );
        Ok(Self { config, state })
    }

    fn store(&self) -> LocalStateStore {
        LocalStateStore::new(&self.state)
    }
}

fn config_dir(config: &Path) -> &Path {
    config
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Loads the module tree and builds an engine context with the builtin providers.
fn load_context(paths: &Paths) -> Result<Context> {
    debug!("Loading configuration from: {}", paths.config.display());
    if !paths.config.exists() {
        return Err(ConfigError::FileNotFound {
            path: paths.config.clone(),
        }
        .into());
    }
    let config: Config = ConfigParser::new()
        .with_base_path(config_dir(&paths.config))
        .load_file(&paths.config)?;
    Ok(Context::new(config, ProviderRegistry::with_builtin()))
}

/// Plans with refresh statistics and prints the result.
async fn plan_and_report(
    context: &Context,
    prior: &State,
    args: &PlanArgs,
    formatter: &OutputFormatter,
) -> Result<Plan> {
    let stats = Arc::new(RefreshStats::new());
    let options = args.to_options().with_refresh_stats(Arc::clone(&stats));

    let (plan, diags) = context.plan(prior, options).await;
    report(&diags, formatter);
    if plan.errored {
        return Err(PlanError::Errored.into());
    }

    eprintln!("{}", formatter.format_refresh_counts(&stats.counts()));
    if formatter.is_json() {
        println!("{}", formatter.format_plan(&plan));
    } else {
        eprintln!("{}", formatter.format_plan(&plan));
    }
    Ok(plan)
}

/// Prints diagnostics, if any.
fn report(diags: &Diagnostics, formatter: &OutputFormatter) {
    if diags.is_empty() {
        return;
    }
    eprint!("{}", formatter.format_diagnostics(diags));
}

/// Asks for confirmation on stderr.
fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}
