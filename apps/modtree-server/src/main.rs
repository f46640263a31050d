use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use modtree::{Catalog, Request, RunOptions, ShutdownOptions};
use runtime::{AppConfig, CliArgs};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod demo;

/// Modtree Server - boots a configured module tree
#[derive(Parser)]
#[command(name = "modtree-server")]
#[command(about = "Modtree Server - boots a configured module tree")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print current configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot the module tree and wait for shutdown
    Run,
    /// Boot the module tree once and report success
    Check,
    /// Print the booted module tree as JSON
    Tree,
    /// Run one action of the status controller against a module
    Dispatch {
        /// Module path below the root, e.g. `shop/cart`; empty for the root
        module: String,
        /// Action name, e.g. `ping`
        action: String,
        /// Request parameter as key=value; the value is parsed as JSON when possible
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
        /// Request body as JSON
        #[arg(long)]
        body: Option<String>,
    },
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // CLI args passed down to config/app
    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // Load configuration (normalized home_dir is applied inside)
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;

    // Apply CLI overrides (verbosity)
    config.apply_cli_overrides(&args);

    // Print config and exit if requested
    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    // Initialize logging
    let logging_config = config.logging.as_ref().cloned().unwrap_or_default();
    runtime::init_logging_from_config(&logging_config, Path::new(&config.home_dir));
    tracing::info!("Modtree Server starting");

    let catalog = Arc::new(Catalog::discover()?);
    tracing::debug!(
        components = ?catalog.component_names(),
        modules = ?catalog.module_names(),
        "classes discovered"
    );

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(config, catalog).await,
        Commands::Check => check_config(config, catalog).await,
        Commands::Tree => print_tree(config, catalog).await,
        Commands::Dispatch {
            module,
            action,
            params,
            body,
        } => dispatch(config, catalog, &module, &action, params, body).await,
    }
}

async fn run_server(config: AppConfig, catalog: Arc<Catalog>) -> Result<()> {
    let run_options = RunOptions {
        root_id: config.root_id,
        root: config.app,
        catalog,
        shutdown: ShutdownOptions::Signals,
    };

    modtree::run(run_options).await?;
    Ok(())
}

async fn check_config(config: AppConfig, catalog: Arc<Catalog>) -> Result<()> {
    tracing::info!("Checking configuration...");

    let root = modtree::boot(&config.root_id, config.app, catalog)
        .await
        .context("module tree failed to boot")?;

    tracing::info!("Configuration is valid");
    println!("Configuration check passed");
    println!(
        "Root '{}': {} component(s), {} child module(s)",
        root.id(),
        root.own_components().len(),
        root.children().len()
    );
    Ok(())
}

async fn print_tree(config: AppConfig, catalog: Arc<Catalog>) -> Result<()> {
    let root = modtree::boot(&config.root_id, config.app, catalog).await?;
    println!("{}", serde_json::to_string_pretty(&root.describe())?);
    Ok(())
}

async fn dispatch(
    config: AppConfig,
    catalog: Arc<Catalog>,
    path: &str,
    action: &str,
    params: Vec<(String, Value)>,
    body: Option<String>,
) -> Result<()> {
    let root = modtree::boot(&config.root_id, config.app, catalog).await?;
    let module = root
        .find(path)
        .with_context(|| format!("no module at '{path}'"))?;

    let body = match body {
        Some(raw) => serde_json::from_str(&raw).context("--body must be JSON")?,
        None => Value::Null,
    };
    let request = Request::new(params.into_iter().collect::<Map<_, _>>(), body);

    let controller = Arc::new(demo::StatusController::new(module.clone()));
    let response = module.dispatcher(controller).execute(action, &request).await?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
