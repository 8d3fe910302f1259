use std::sync::Arc;

use tracing::info;

use clubnight::calendar;
use clubnight::config::Config;
use clubnight::context::{self, AppContext, ContextFeeds};
use clubnight::engine::{Engine, EngineOptions};
use clubnight::inventory::{self, Inventory};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    clubnight::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;

    let engine = Arc::new(Engine::open(
        config.journal_path(),
        EngineOptions {
            claim_slots: config.strict_slots,
        },
    )?);

    let seed = match &config.seed_file {
        Some(path) => Inventory::load(path)?,
        None => Inventory::club_default(),
    };
    inventory::seed_if_empty(&engine, &seed).await?;

    let ctx = AppContext::new(config.cadence, config.permanent.clone(), calendar::today_utc()).shared();
    let feeds = ContextFeeds::from_hub(&engine.hub);
    let sync = tokio::spawn(context::run_sync(ctx.clone(), feeds));

    let compactor_engine = engine.clone();
    let threshold = config.compact_threshold;
    let compactor = tokio::spawn(async move {
        clubnight::compactor::run_compactor(compactor_engine, threshold).await;
    });

    info!("clubnight store ready");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  slot claims: {}", if config.strict_slots { "on" } else { "off" });
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));
    {
        let ctx = ctx.read().await;
        let cadence = ctx.cadence();
        info!("  cadence: every {} from {}, today {}", cadence.weekday, cadence.floor, ctx.today());
        let dates: Vec<String> = ctx.bookable_dates().iter().map(ToString::to_string).collect();
        info!("  bookable: {}", dates.join(", "));
        if let Some(p) = ctx.permanent() {
            info!("  permanent: table {} held by {}", p.table_id, p.holder_name);
        }
        info!("  game systems: {}", engine.game_systems().len());
    }

    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }

    info!("shutdown signal received");
    compactor.abort();
    sync.abort();
    // Final compaction so the next start replays the minimal event set.
    if let Err(e) = engine.compact_journal().await {
        tracing::warn!("final compaction failed: {e}");
    }
    info!("clubnight stopped");
    Ok(())
}
