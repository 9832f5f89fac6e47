//! `routeforge-server` — runs the HTTP/SSE transport, applies pending
//! migrations, or validates a route definition file offline.

use clap::{Parser, Subcommand};
use routeforge::api::{create_router, AppState};
use routeforge::compiler::{CompilerConfig, RouteCompiler};
use routeforge::config::AppConfig;
use routeforge::domain::RouteDefinition;
use routeforge::events::EventBus;
use routeforge::executor::{Executor, ExecutorConfig};
use routeforge::registry::RouteRegistry;
use routeforge::saga::{AccountStore, SagaCoordinator};
use routeforge::store::RouteStore;
use sqlx::sqlite::SqlitePoolOptions;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "routeforge-server", version, about = "Dynamic integration-route engine with saga orchestration")]
struct Cli {
    /// Path to a TOML config file; overrides CONFIG_PATH and the default search location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP/SSE server.
    Serve,
    /// Apply pending database migrations and exit.
    Migrate,
    /// Parse and validate a route definition file without deploying it.
    Route {
        #[command(subcommand)]
        action: RouteAction,
    },
}

#[derive(Subcommand)]
enum RouteAction {
    Validate {
        /// Path to a JSON route definition file.
        file: PathBuf,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    match &cli.config {
        Some(path) => Ok(AppConfig::from_file(path)?),
        None => Ok(AppConfig::load()?),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Migrate => migrate(config).await,
        Commands::Route { action: RouteAction::Validate { file } } => validate_route(&file).await,
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let pool = SqlitePoolOptions::new().max_connections(5).connect(&config.database.url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let store = RouteStore::new(pool.clone(), config.routes.schema_version);
    let events = EventBus::new((&config.sse).into());
    events.spawn_background_tasks();

    let saga = SagaCoordinator::new(AccountStore::new(pool));
    let executor = Arc::new(Executor::new(saga, events.clone(), ExecutorConfig::default()));
    let compiler = RouteCompiler::new((&config.routes).into());
    let registry = RouteRegistry::new(compiler, executor, store);
    registry.reload().await?;

    let state = AppState { registry, events, default_tenant_id: config.tenant.default_id.clone() };
    let router = create_router(state);

    tracing::info!(addr = %config.server.bind_addr, "starting routeforge-server");
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

async fn migrate(config: AppConfig) -> anyhow::Result<()> {
    let pool = SqlitePoolOptions::new().connect(&config.database.url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("migrations applied");
    Ok(())
}

async fn validate_route(file: &PathBuf) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)?;
    let def: RouteDefinition = serde_json::from_str(&content)?;
    let compiler = RouteCompiler::new(CompilerConfig::default());
    compiler.validate(&def)?;
    println!("route '{}' (tenant '{}') is valid", def.id, def.tenant_id);
    Ok(())
}
