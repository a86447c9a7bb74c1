//! Edgeward - control plane for edge environments
//!
//! Tracks registered environments, agent check-ins and reverse tunnels.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgeward_auth::{server_fingerprint, CredentialIssuer};
use edgeward_control::{
    ControlConfig, EdgeJobDispatcher, EdgeKeyConfig, EdgeService, EnvironmentRegistry, PortRange,
    RangePortAllocator, TunnelCoordinator, TunnelSweeper,
};
use edgeward_store::{EnvironmentStore, SeaOrmStore, SettingsStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Edgeward - registry and tunnel coordination for edge agents
#[derive(Parser, Debug)]
#[command(name = "edgeward")]
#[command(about = "Edgeward - registry and tunnel coordination for edge agents")]
#[command(version)]
#[command(long_version = concat!(
    env!("EDGEWARD_GIT_TAG"),
    " (",
    env!("EDGEWARD_GIT_HASH"),
    ", built ",
    env!("EDGEWARD_BUILD_TIME"),
    ")"
))]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Database URL (postgres://..., sqlite://...?mode=rwc, sqlite::memory:)
    #[arg(
        long,
        global = true,
        env = "EDGEWARD_DATABASE_URL",
        default_value = "sqlite://./edgeward.db?mode=rwc"
    )]
    database_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the control plane until interrupted
    Serve(ServeArgs),

    /// Inspect registered environments
    Environments {
        #[command(subcommand)]
        command: EnvironmentCommands,
    },
}

#[derive(Subcommand, Debug)]
enum EnvironmentCommands {
    /// Print all environments with their latest heartbeat as JSON
    List,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Secret used to sign tunnel credentials
    #[arg(long, env = "EDGEWARD_TUNNEL_SECRET")]
    tunnel_secret: String,

    /// Keep-alive for active tunnels in seconds (persisted to settings)
    #[arg(long, env = "EDGEWARD_KEEP_ALIVE_SECS")]
    keep_alive_secs: Option<u32>,

    /// Interval between keep-alive sweeps in seconds
    #[arg(long, env = "EDGEWARD_SWEEP_INTERVAL_SECS", default_value = "10")]
    sweep_interval_secs: u64,

    /// Listener ports reserved for tunnels (START-END)
    #[arg(
        long,
        env = "EDGEWARD_TUNNEL_PORT_RANGE",
        default_value = "49152-65535",
        value_parser = parse_port_range
    )]
    tunnel_port_range: PortRange,

    /// Lifetime of issued tunnel credentials in seconds
    #[arg(long, env = "EDGEWARD_CREDENTIAL_TTL_SECS", default_value = "3600")]
    credential_ttl_secs: u64,

    /// API URL handed to agents in enrollment keys
    #[arg(long, env = "EDGEWARD_API_URL", default_value = "http://localhost:9000")]
    api_url: String,

    /// Tunnel server address handed to agents in enrollment keys
    #[arg(long, env = "EDGEWARD_TUNNEL_ADDR", default_value = "localhost:8000")]
    tunnel_addr: String,
}

fn parse_port_range(s: &str) -> Result<PortRange, String> {
    s.parse::<PortRange>()
}

impl ServeArgs {
    fn control_config(&self) -> ControlConfig {
        let defaults = ControlConfig::default();
        ControlConfig {
            keep_alive: self
                .keep_alive_secs
                .map(|secs| Duration::from_secs(u64::from(secs)))
                .unwrap_or(defaults.keep_alive),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            port_range: self.tunnel_port_range,
            credential_validity: Duration::from_secs(self.credential_ttl_secs),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let store = open_store(&cli.database_url).await?;

    match cli.command {
        Commands::Serve(args) => serve(store, args).await,
        Commands::Environments {
            command: EnvironmentCommands::List,
        } => list_environments(store).await,
    }
}

fn setup_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

async fn open_store(database_url: &str) -> Result<Arc<SeaOrmStore>> {
    let db = edgeward_store::connect(database_url)
        .await
        .with_context(|| format!("Failed to connect to database {}", database_url))?;

    edgeward_store::migrate(&db)
        .await
        .context("Failed to run database migrations")?;

    Ok(Arc::new(SeaOrmStore::new(db)))
}

async fn serve(store: Arc<SeaOrmStore>, args: ServeArgs) -> Result<()> {
    let config = args.control_config();

    info!("Starting Edgeward control plane");
    info!(
        "Tunnel ports: {}-{}",
        config.port_range.start, config.port_range.end
    );
    info!("Sweep interval: {}s", config.sweep_interval.as_secs());

    if let Some(secs) = args.keep_alive_secs {
        let mut settings = store.settings().await.context("Failed to load settings")?;
        settings.tunnel_keep_alive_secs = secs;
        store
            .update_settings(&settings)
            .await
            .context("Failed to persist keep-alive setting")?;
    }

    let environments: Arc<dyn EnvironmentStore> = store.clone();
    let registry = Arc::new(EnvironmentRegistry::new(environments));
    registry
        .initialize()
        .await
        .context("Failed to initialize environment registry")?;

    let credential_validity = chrono::Duration::from_std(config.credential_validity)
        .context("Credential TTL out of range")?;
    let credentials = Arc::new(CredentialIssuer::new(
        args.tunnel_secret.as_bytes(),
        credential_validity,
    ));
    let jobs = Arc::new(EdgeJobDispatcher::new());
    let tunnels = Arc::new(TunnelCoordinator::new(
        registry.clone(),
        Arc::new(RangePortAllocator::new(config.port_range)),
        credentials.clone(),
        jobs.clone(),
        config.keep_alive,
    ));

    let service = EdgeService::new(
        registry.clone(),
        tunnels.clone(),
        jobs,
        credentials,
        store,
        EdgeKeyConfig {
            api_url: args.api_url,
            tunnel_addr: args.tunnel_addr,
            fingerprint: server_fingerprint(args.tunnel_secret.as_bytes()),
        },
    )
    .await
    .context("Failed to start edge service")?;

    info!(
        environments = registry.count(),
        keep_alive_secs = service.tunnels().keep_alive_duration().as_secs(),
        "Edge service ready"
    );

    let (shutdown, sweeper) = TunnelSweeper::new(tunnels, config.sweep_interval).spawn();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");

    shutdown.notify_one();
    if let Err(e) = sweeper.await {
        warn!("Tunnel sweeper ended abnormally: {}", e);
    }

    Ok(())
}

async fn list_environments(store: Arc<SeaOrmStore>) -> Result<()> {
    let registry = EnvironmentRegistry::new(store);
    registry
        .initialize()
        .await
        .context("Failed to initialize environment registry")?;

    let environments = registry
        .list_environments()
        .await
        .context("Failed to list environments")?;

    println!("{}", serde_json::to_string_pretty(&environments)?);
    Ok(())
}
