//! Event Stash Server - Binary Entry Point
//!
//! Reads cluster events as JSON lines from stdin, keeps them in the buffer
//! and serves the stash API over HTTP until interrupted.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, info_span, warn};
use tracing_subscriber::EnvFilter;

use event_stash::api::{create_router, AppState};
use event_stash::collector::source::json_lines;
use event_stash::config::Config;
use event_stash::filter::{ObjectLookup, UnavailableObjectLookup};
use event_stash::{
    AppResult, EventBuffer, EventCollector, FileStashStorage, RingEventBuffer, StashManager,
};

fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let loaded = Config::load()?;
    match &loaded.source {
        Some(path) => info!(path = %path.display(), "loaded config"),
        None => warn!("no config file found, using defaults"),
    }

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let result = runtime.block_on(serve(loaded.config));
    // Stdin reads cannot be interrupted; don't wait on them forever
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn serve(config: Config) -> AppResult<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(true);
    })?;

    let lookup: Arc<dyn ObjectLookup> = Arc::new(UnavailableObjectLookup);
    if config.uses_labels() {
        warn!("label filters are configured but no object inventory is available, they will never match");
    }

    let buffer: Arc<dyn EventBuffer> = Arc::new(RingEventBuffer::new(config.buffer_size)?);
    let storage_span = info_span!("storage");
    let storage = FileStashStorage::open(&config.stash_dir, &config.stash_prefix, &storage_span)?;

    let manager = Arc::new(StashManager::new(
        config.manager_config(),
        Arc::clone(&buffer),
        Arc::new(storage),
        info_span!("stash"),
    )?);

    let plugin_span = info_span!("plugin");
    manager.register_completion_callback(move |stash| {
        info!(parent: &plugin_span, stash = %stash.name, status = %stash.status, "stash triggered");
        Ok(())
    });

    let mut collector = EventCollector::new(
        Arc::clone(&buffer),
        config.event_filter(Arc::clone(&lookup), info_span!("filter")),
        info_span!("collector"),
    );
    if let Some(trigger) = config.stash_trigger(lookup, info_span!("trigger")) {
        let manager = Arc::clone(&manager);
        collector = collector.with_action(trigger, move |_| {
            manager.trigger_detached();
        });
    }

    let collector_task = {
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let source = json_lines(BufReader::new(tokio::io::stdin()));
            collector
                .run(source, async move {
                    let _ = shutdown.changed().await;
                })
                .await
        })
    };

    let app = create_router(Arc::new(AppState::new(Arc::clone(&manager))));
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(
        port = config.port,
        buffer_size = config.buffer_size,
        max_stashes = config.max_stashes,
        stash_dir = %config.stash_dir.display(),
        "stash server listening"
    );

    let mut shutdown = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;

    match collector_task.await {
        Ok(report) => info!(exit = ?report.exit, added = report.stats.added, "collector stopped"),
        Err(e) => warn!(error = %e, "collector task failed"),
    }

    info!("shutdown complete");
    Ok(())
}
