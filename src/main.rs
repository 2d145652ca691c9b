use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use clap::Parser;
use sales_oracle::{
    AppState, build_app,
    config::{self, OracleConfig},
    models::{ForecastInput, ForecastRequest, FormDefaults, InfluenceLevel},
    observability,
    services::{self, ModelBundle},
};
use validator::Validate;

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "sales-oracle.toml";

/// CLI arguments for the sales forecast service
#[derive(Parser, Debug)]
#[command(version, about = "Future sales forecasting service", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./sales-oracle.toml if it exists,
    /// otherwise built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the HTTP server (default)
    Serve,
    /// Produce a single forecast and print it
    Predict(PredictArgs),
    /// List the regions the models were trained on
    Regions,
    /// Write a default configuration file
    Init {
        /// Path to create the config file (defaults to ./sales-oracle.toml)
        #[arg(short, long)]
        output: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

#[derive(clap::Args, Debug)]
struct PredictArgs {
    /// Customer identifier
    #[arg(long, default_value_t = FormDefaults::default().customer_id)]
    customer_id: u64,
    /// Date to forecast (YYYY-MM-DD, defaults to today)
    #[arg(long)]
    date: Option<NaiveDate>,
    /// Expected daily sales percentage (0-100)
    #[arg(long, default_value_t = FormDefaults::default().daily_sales_pct)]
    daily_sales_pct: f64,
    /// Projected market share (0-1)
    #[arg(long, default_value_t = FormDefaults::default().market_share)]
    market_share: f64,
    /// Expected political impact: Low, Medium or High
    #[arg(long, default_value_t = InfluenceLevel::Low)]
    political: InfluenceLevel,
    /// Planned marketing intensity: Low, Medium or High
    #[arg(long, default_value_t = InfluenceLevel::Low)]
    marketing: InfluenceLevel,
    /// Planned budget
    #[arg(long, default_value_t = FormDefaults::default().budget)]
    budget: f64,
    /// Type of machinery
    #[arg(long, default_value = FormDefaults::default().machinery_type)]
    machinery_type: String,
    /// Target region (defaults to the first known region)
    #[arg(long)]
    region: Option<String>,
    /// Print the base forecasts and features as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Init { output, force }) => {
            run_init(output, force);
        }
        Some(Command::Predict(predict)) => {
            run_predict(args.config.as_deref(), predict);
        }
        Some(Command::Regions) => {
            run_regions(args.config.as_deref());
        }
        Some(Command::Serve) | None => {
            run_server(args.config.as_deref()).await;
        }
    }
}

/// Resolve the config path. `None` means "use built-in defaults".
fn resolve_config_path(explicit_path: Option<&str>) -> Result<Option<PathBuf>, String> {
    if let Some(path) = explicit_path {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(format!("Config file not found: {}", path.display()));
        }
        return Ok(Some(path));
    }

    let cwd_config = PathBuf::from(DEFAULT_CONFIG_FILE);
    if cwd_config.exists() {
        return Ok(Some(cwd_config));
    }

    Ok(None)
}

/// Load config and initialize tracing, exiting on failure.
fn load_config(explicit_config_path: Option<&str>) -> OracleConfig {
    let config_path = match resolve_config_path(explicit_config_path) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let config = match &config_path {
        Some(path) => match OracleConfig::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config from {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => OracleConfig::default(),
    };

    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    match &config_path {
        Some(path) => tracing::debug!(config_file = %path.display(), "Loaded configuration"),
        None => tracing::debug!("No config file found, using built-in defaults"),
    }

    config
}

/// Load every model artifact, exiting on failure.
fn load_models(config: &OracleConfig) -> ModelBundle {
    match ModelBundle::load(&config.models) {
        Ok(models) => models,
        Err(e) => {
            tracing::error!(artifact = e.label(), error = %e, "Failed to load model artifacts");
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

/// Write a default configuration file
fn run_init(output: Option<String>, force: bool) {
    let output_path = output
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    if output_path.exists() && !force {
        eprintln!(
            "Config file already exists: {}\nUse --force to overwrite.",
            output_path.display()
        );
        std::process::exit(1);
    }

    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create directory {}: {}", parent.display(), e);
        std::process::exit(1);
    }

    if let Err(e) = std::fs::write(&output_path, config::default_config_toml()) {
        eprintln!("Failed to write config file: {}", e);
        std::process::exit(1);
    }

    println!("Created config file: {}", output_path.display());
    println!();
    println!("Place the exported model artifacts in the configured artifact_dir, then run:");
    println!("  sales-oracle serve");
}

/// List known regions, one per line
fn run_regions(explicit_config_path: Option<&str>) {
    let config = load_config(explicit_config_path);
    let models = load_models(&config);

    for region in models.regions() {
        println!("{}", region);
    }
}

/// Produce one forecast from command-line inputs
fn run_predict(explicit_config_path: Option<&str>, args: PredictArgs) {
    let config = load_config(explicit_config_path);
    let models = load_models(&config);

    let region = match args.region {
        Some(region) => region,
        None => match models.regions().first() {
            Some(first) => first.clone(),
            None => {
                eprintln!("Region encoder has no known regions");
                std::process::exit(1);
            }
        },
    };

    let request = ForecastRequest {
        customer_id: args.customer_id,
        date: args.date.unwrap_or_else(|| Local::now().date_naive()),
        daily_sales_pct: args.daily_sales_pct,
        market_share: args.market_share,
        political: args.political,
        marketing: args.marketing,
        budget: args.budget,
        machinery_type: args.machinery_type,
        region,
    };

    if let Err(errors) = request.validate() {
        eprintln!("Invalid input: {}", errors);
        std::process::exit(1);
    }

    if !models.region.contains(&request.region) {
        eprintln!(
            "Unknown region '{}'. Known regions: {}",
            request.region,
            models.regions().join(", ")
        );
        std::process::exit(1);
    }

    let input = ForecastInput::from(request);
    let outcome = match services::predict_future_sales(&models, &input) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Forecast failed: {}", e);
            std::process::exit(1);
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&outcome) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to serialize forecast: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        println!("{:.2}", outcome.forecast);
    }
}

async fn run_server(explicit_config_path: Option<&str>) {
    let config = load_config(explicit_config_path);

    tracing::info!(
        artifact_dir = %config.models.artifact_dir.display(),
        "Starting sales forecast service"
    );

    let models = load_models(&config);
    let state = AppState::new(config.clone(), models);
    let app = build_app(&config, state);

    let bind_addr = config.server.bind_address();
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on http://{}", bind_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }

    tracing::info!("Shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining in-flight requests");
}
