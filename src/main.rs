// League engine entry point.
//
// Startup sequence:
// 1. Load config
// 2. Initialize tracing (log to file)
// 3. Open the document store
// 4. Restore the cached session, if any
// 5. Watch the active league's subtree until Ctrl+C
// 6. Cleanup on exit

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use fiveside::config;
use fiveside::session::Session;
use fiveside::store::{paths, SqliteStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config, 2. Initialize tracing (log to file)
    let config = config::load_config().context("failed to load configuration")?;
    init_tracing(&config.log_filter)?;
    info!("fiveside starting up");
    info!(
        "Draft limits: budget={}, squad={}, starters={}",
        config.limits.budget, config.limits.max_squad, config.limits.max_starters
    );

    // 3. Open the document store
    if let Some(parent) = std::path::Path::new(&config.db_path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create data directory {}", parent.display()))?;
    }
    let store: Arc<dyn Store> =
        Arc::new(SqliteStore::open(&config.db_path).context("failed to open document store")?);
    info!("Document store opened at {}", config.db_path);

    // 4. Restore the cached session, if any
    let mut session = Session::new(
        Arc::clone(&store),
        config.limits,
        &config.session_cache_path,
    );
    if session.restore() {
        info!(
            user = session.current_user().unwrap_or("-"),
            league = session.current_league().unwrap_or("-"),
            "session restored"
        );
    } else {
        info!("no cached session; starting fresh");
    }

    // 5. Watch the active league's subtree until Ctrl+C
    let watcher = session.current_league().map(|league_id| {
        let mut subscription = store.subscribe(&paths::league_prefix(league_id));
        let league_id = league_id.to_string();
        tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                info!(league = %league_id, path = %event.path, "league document changed");
            }
        })
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    // 6. Cleanup on exit
    if let Some(handle) = watcher {
        handle.abort();
    }
    info!("fiveside shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file under `logs/`.
fn init_tracing(filter: &str) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("fiveside.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
