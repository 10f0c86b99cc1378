use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

use county_intake::channels::{Channel, CliChannel};
use county_intake::config::IntakeConfig;
use county_intake::intake::{Flow, InboundTurn, IntakeManager};
use county_intake::reference::CountyDirectory;
use county_intake::store::{LibSqlStore, MemoryStore, SessionStore};

/// Stderr logging, plus a daily-rotated file when a log directory is set.
/// The returned guard must live until exit so buffered file output is flushed.
fn init_tracing(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "intake.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = IntakeConfig::from_env()?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    // ── Reference data ───────────────────────────────────────────────────
    let directory = Arc::new(CountyDirectory::load(&config.counties_path)?);
    let flow = Arc::new(Flow::new(
        config.flow,
        directory,
        config.settings.clone(),
    )?);

    // ── Session store ────────────────────────────────────────────────────
    let store: Arc<dyn SessionStore> = match &config.db_path {
        Some(path) => Arc::new(LibSqlStore::new_local(path).await?),
        None => {
            tracing::info!("INTAKE_DB_PATH not set, conversation state is kept in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let variant = flow.variant();
    let manager = IntakeManager::new(flow, store);
    let conversation_id = config
        .conversation_id
        .clone()
        .unwrap_or_else(|| format!("cli-{}", Uuid::new_v4()));

    eprintln!("County intake v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Flow: {variant}");
    eprintln!("   Conversation: {conversation_id}");
    eprintln!("   Type anything to begin. /status shows progress, /quit exits.\n");

    let channel = CliChannel::new(conversation_id.as_str());
    let mut messages = channel.start().await?;

    while let Some(msg) = messages.next().await {
        match msg.content.as_str() {
            "/quit" => break,
            "/status" => {
                let status = manager.status(&conversation_id).await?;
                channel
                    .send_status(&serde_json::to_string_pretty(&status)?)
                    .await?;
                continue;
            }
            _ => {}
        }

        let inbound = InboundTurn::new(conversation_id.as_str(), msg.content.as_str())
            .with_message_id(msg.id.to_string());
        match manager.handle_turn(&inbound).await {
            Ok(reply) => channel.respond(&msg, &reply).await?,
            Err(e) => {
                tracing::error!(conversation_id = %conversation_id, error = %e, "Turn failed");
                channel.send_status(&format!("Error: {e}")).await?;
            }
        }
    }

    Ok(())
}
