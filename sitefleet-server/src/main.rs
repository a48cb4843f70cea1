//! # Sitefleet Server
//!
//! Provisions isolated per-tenant container stacks on a shared container
//! engine and exposes their lifecycle through an HTTP API.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use sitefleet_server::{
    create_app,
    infra::{
        config::{Config, ConfigLoad, ConfigLoader, ConfigLoaderOptions},
        startup::{ProdStartupHooks, StartupHooks, build_state},
    },
    persistence::PostgresSiteStore,
};
use sitefleet_core::{ContainerEngine, DeploymentCoordinator, InMemorySiteStore};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "sitefleet-server")]
#[command(about = "Provision and manage isolated per-tenant container stacks")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Path to the TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to a .env file applied before reading the environment
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(subcommand)]
    Db(DbCommand),
    #[command(subcommand)]
    Engine(EngineCommand),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Apply site store migrations and exit
    Migrate,
}

#[derive(Debug, Subcommand)]
enum EngineCommand {
    /// Report container engine connectivity and exit
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_runtime_config(&cli.serve)?;

    match cli.command {
        Some(Command::Db(DbCommand::Migrate)) => run_db_migrate(&config).await,
        Some(Command::Engine(EngineCommand::Check)) => {
            run_engine_check(config).await
        }
        None => run_server(config).await,
    }
}

fn load_runtime_config(args: &ServeArgs) -> anyhow::Result<Arc<Config>> {
    let ConfigLoad {
        mut config,
        warnings,
    } = ConfigLoader::with_options(ConfigLoaderOptions {
        config_path: args.config.clone(),
        env_file: args.env_file.clone(),
    })
    .load()
    .context("failed to load configuration")?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host.clone() {
        config.server.host = host;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "loaded configuration file");
    }
    warnings.log();

    let settings = &config.orchestrator;
    info!(
        orchestrator.port_base = settings.port_base,
        orchestrator.network_driver = %settings.network_driver,
        orchestrator.poll_interval = ?settings.health.poll_interval,
        orchestrator.unhealthy_threshold = settings.health.unhealthy_threshold,
        engine.program = %config.engine.program,
        engine.host = config.engine.host.as_deref().unwrap_or("default"),
        "orchestrator configuration in effect"
    );

    Ok(Arc::new(config))
}

async fn run_db_migrate(config: &Config) -> anyhow::Result<()> {
    let url = config
        .database
        .primary_url
        .as_deref()
        .context("DATABASE_URL must be set to run migrations")?;
    let store = PostgresSiteStore::connect(url)
        .await
        .context("failed to connect to PostgreSQL for migration")?;
    store.migrate().await.context("database migration failed")?;
    info!("Database migrations applied successfully");
    Ok(())
}

async fn run_engine_check(config: Arc<Config>) -> anyhow::Result<()> {
    let engine: Arc<dyn ContainerEngine> = Arc::new(config.engine.docker_cli());
    let coordinator = DeploymentCoordinator::new(
        engine,
        Arc::new(InMemorySiteStore::new()),
        config.orchestrator.clone(),
    );
    let connectivity = coordinator.check_engine_connectivity().await;
    println!("{}", serde_json::to_string_pretty(&connectivity)?);
    if !connectivity.reachable {
        anyhow::bail!("container engine unreachable");
    }
    Ok(())
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    let state = build_state(Arc::clone(&config)).await?;
    ProdStartupHooks.run(&state).await?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let coordinator = state.coordinator.clone();
    let router = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Starting Sitefleet server on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let in_flight = coordinator.in_flight();
    if !in_flight.is_empty() {
        warn!(
            count = in_flight.len(),
            "shutting down with deployments in flight; they will be marked failed on next start"
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
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
    info!("shutdown signal received");
}
