use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use symtrack_core::{AppConfig, ChatModel, HealthChatOrchestrator};
use symtrack_server::state::{AppState, StreamRegistry};
use symtrack_store::HealthStore;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "symtrack-server", about = "Health symptom tracking chat backend")]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "symtrack-server.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("symtrack_server=info,symtrack_core=info,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(non_blocking))
        .init();

    let config = AppConfig::load(&args.config)?;
    let store = HealthStore::open(&config.database_path)?;
    let router = config.build_router()?;
    let model = ChatModel::new(router, config.model_policy.clone(), config.max_tokens);
    let orchestrator = Arc::new(HealthChatOrchestrator::new(store.clone(), model));

    let state = AppState {
        store,
        orchestrator,
        streams: Arc::new(StreamRegistry::default()),
    };

    let addr = std::env::var("SYMTRACK_BIND").unwrap_or_else(|_| config.bind.clone());
    symtrack_server::serve(state, &addr).await
}
