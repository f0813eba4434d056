use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use deckflow::agent::{BriefAgent, DispatchAgent, OutlineAgent};
use deckflow::config::DatabaseConfig;
use deckflow::engine::{event_channel, AgentOrchestrator};
use deckflow::provider::ProviderClient;
use deckflow::relay::{Relay, RelayConfig};
use deckflow::server::{spawn_event_bridge, start_server, AppState};
use deckflow::store::Store;
use deckflow::{auth, Config};

#[derive(Parser)]
#[command(name = "deckflow")]
#[command(about = "Presentation generation orchestration service", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server and the socket relay
    Serve,

    /// Create the database file and schema, then exit
    InitDb,

    /// Mint a bearer token for a user id (development helper)
    Token {
        /// User id to embed in the token claim
        user_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::InitDb => init_db(config),
        Commands::Token { user_id } => {
            println!("{}", auth::sign_user_token(&config.auth.token_secret, &user_id));
            Ok(())
        }
    }
}

fn open_store(config: &Config) -> anyhow::Result<Store> {
    match &config.database {
        DatabaseConfig::Memory => {
            warn!("Using in-memory database; all state is lost on exit");
            Store::in_memory().context("opening in-memory database")
        }
        DatabaseConfig::Sqlite { path } => {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("creating {}", parent.display()))?;
                }
            }
            Store::open(path).with_context(|| format!("opening database at {path}"))
        }
    }
}

fn init_db(config: Config) -> anyhow::Result<()> {
    match &config.database {
        DatabaseConfig::Memory => {
            anyhow::bail!("database.type is 'memory'; nothing to initialize")
        }
        DatabaseConfig::Sqlite { path } => {
            let path = path.clone();
            open_store(&config)?;
            println!("Database initialized at {path}");
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    if config.webhook.secret.is_none() {
        warn!("No webhook secret configured; signature verification is disabled");
    }

    let store = Arc::new(open_store(&config)?);
    let provider =
        Arc::new(ProviderClient::new(config.provider.clone()).context("building provider client")?);

    let relay = Relay::start(
        RelayConfig {
            bind_addr: config.relay.bind_addr.clone(),
            auth_grace: Duration::from_secs(config.relay.auth_grace_secs),
        },
        config.auth.token_secret.clone(),
    )
    .await
    .context("starting relay")?;
    let relay_handle = relay.handle();

    let (events_tx, events_rx) = event_channel(256);
    spawn_event_bridge(events_rx, relay_handle.clone());

    let mut orchestrator = AgentOrchestrator::new()
        .with_max_parallel_steps(config.engine.max_parallel_steps)
        .with_history_limit(config.engine.history_limit)
        .with_events(events_tx);
    orchestrator.register(Arc::new(BriefAgent));
    orchestrator.register(Arc::new(OutlineAgent));
    orchestrator.register(Arc::new(DispatchAgent::new(
        Arc::clone(&provider),
        Arc::clone(&store),
        config.webhook.public_url.clone(),
    )));

    info!(
        agents = ?orchestrator.agent_names(),
        "Orchestrator ready"
    );

    let bind_addr = config.server.bind_addr.clone();
    let state = Arc::new(AppState {
        store,
        relay: relay_handle,
        provider,
        orchestrator: Arc::new(orchestrator),
        config: Arc::new(config),
    });

    let result = start_server(state, &bind_addr).await;
    relay.shutdown();
    result.context("serving API")
}
