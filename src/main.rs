use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::watch;

use feed_enricher::config::AppConfig;
use feed_enricher::digest::generator::parse_schedules;
use feed_enricher::digest::{DigestGenerator, DigestStore, SummaryStore, spawn_digest_schedule};
use feed_enricher::error::ConfigError;
use feed_enricher::feed::FeedService;
use feed_enricher::feed::miniflux::MinifluxClient;
use feed_enricher::llm::create_provider;
use feed_enricher::pipeline::{BatchController, DedupCache, EntryProcessor};
use feed_enricher::webhook::{WEBHOOK_PATH, WebhookState, webhook_routes};

#[tokio::main]
async fn main() -> feed_enricher::Result<()> {
    let config = AppConfig::load().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(false)
        .init();

    eprintln!("📰 Feed Enricher v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Agents: {}",
        config
            .agents
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    // ── Feed service ─────────────────────────────────────────────────────
    let miniflux = Arc::new(MinifluxClient::new(config.miniflux_config()?)?);
    miniflux.wait_until_reachable(Duration::from_secs(3)).await;
    let feed: Arc<dyn FeedService> = miniflux;

    // ── LLM ──────────────────────────────────────────────────────────────
    let llm = create_provider(&config.llm_config()?)?;

    // ── Pipeline ─────────────────────────────────────────────────────────
    let dedup = Arc::new(DedupCache::new(
        config.dedup_ttl(),
        config.batch.dedup_capacity,
    ));
    let mut processor = EntryProcessor::new(
        Arc::clone(&feed),
        Arc::clone(&llm),
        config.named_agents(),
        dedup,
    )
    .with_rule_precedence(config.batch.rule_precedence);

    // ── Digest ───────────────────────────────────────────────────────────
    let mut digest_task = None;
    let mut digest_parts = None;
    if let (Some(section), Some(settings)) = (&config.digest, config.digest_settings()) {
        let summaries = Arc::new(SummaryStore::new(&section.summary_file));
        let digests = Arc::new(DigestStore::new(&section.digest_file));
        processor = processor.with_summary_store(Arc::clone(&summaries), &section.source_agent);
        let schedules = parse_schedules(&section.schedule).map_err(|message| {
            ConfigError::InvalidValue {
                key: "digest.schedule".into(),
                message,
            }
        })?;
        eprintln!(
            "   Digest: {} ({} schedule(s))",
            section.url,
            schedules.len()
        );
        let generator = Arc::new(DigestGenerator::new(
            Arc::clone(&feed),
            Arc::clone(&llm),
            summaries,
            digests,
            settings,
        ));
        digest_parts = Some((generator, schedules));
    } else {
        eprintln!("   Digest: disabled");
    }

    let batch = Arc::new(BatchController::new(
        Arc::clone(&feed),
        Arc::new(processor),
        config.batch_config(),
    ));
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    if let Some((generator, schedules)) = digest_parts {
        if let Err(e) = generator.init_feed().await {
            tracing::error!(error = %e, "Failed to set up digest feed");
        }
        digest_task = Some(spawn_digest_schedule(
            generator,
            schedules,
            shutdown_tx.subscribe(),
        ));
    }

    // ── Webhook ──────────────────────────────────────────────────────────
    if let Some(secret) = config.miniflux.webhook_secret.clone() {
        let app = webhook_routes(WebhookState {
            batch: Arc::clone(&batch),
            secret: Arc::new(secret),
        });
        let listener = tokio::net::TcpListener::bind(&config.webhook.bind).await?;
        eprintln!("   Webhook: http://{}{}", config.webhook.bind, WEBHOOK_PATH);
        let mut stop = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stop.wait_for(|stopping| *stopping).await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Webhook server failed");
            }
        });
    }

    // ── Batch loop ───────────────────────────────────────────────────────
    let interval = config.poll_interval();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    eprintln!(
        "   Polling every {}s with {} worker(s)\n",
        interval.as_secs(),
        config.llm.max_workers
    );

    {
        let shutdown = batch.shutdown_flag();
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, finishing in-flight work");
                shutdown.store(true, Ordering::Relaxed);
                let _ = shutdown_tx.send(true);
            }
        });
    }

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if batch.is_shutting_down() {
                    break;
                }
                batch.run_batch().await;
            }
            _ = shutdown_rx.wait_for(|stopping| *stopping) => break,
        }
    }

    let _ = shutdown_tx.send(true);
    batch.close();
    if let Some(task) = digest_task {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Digest scheduler panicked");
        }
    }
    tracing::info!("Feed Enricher stopped");
    Ok(())
}
