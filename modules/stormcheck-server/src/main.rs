use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use stormcheck_common::Config;
use stormcheck_ingest::Ingestor;
use stormcheck_server::jobs::Jobs;
use stormcheck_server::notify::{NoopBackend, Notifier, NotifyBackend, WebhookBackend};
use stormcheck_server::routes::build_router;
use stormcheck_server::scheduler::{Intervals, Scheduler};
use stormcheck_server::summary::SummaryClient;
use stormcheck_server::AppState;
use stormcheck_store::Store;
use stormcheck_verify::{Engine, StaticAreaIndex};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("stormcheck=info".parse()?))
        .init();

    let config = Config::from_env();

    let store = Store::connect(&config.database_url).await?;
    info!("Database ready");

    let area_index = match &config.area_index_path {
        Some(path) => {
            let index = StaticAreaIndex::from_json_file(Path::new(path))?;
            info!(entries = index.len(), %path, "Loaded area index");
            index
        }
        None => {
            warn!("AREA_INDEX_PATH not set; exact-tier matching disabled");
            StaticAreaIndex::default()
        }
    };

    let engine = Arc::new(Engine::new(
        store.clone(),
        Arc::new(area_index),
        config.proximity_radius_miles,
        config.recheck_horizon_hours,
    ));

    let ingestor = Ingestor::new(store.clone(), &config.alert_feed_url, &config.report_feed_url);

    let backend: Box<dyn NotifyBackend> = match &config.webhook_url {
        Some(url) => Box::new(WebhookBackend::new(url)),
        None => Box::new(NoopBackend),
    };
    let notifier = Notifier::new(
        backend,
        config.hail_notify_threshold_in,
        config.wind_notify_threshold_mph,
    );

    let summarizer = config.anthropic_api_key.as_deref().map(SummaryClient::new);
    if summarizer.is_none() {
        info!("ANTHROPIC_API_KEY not set; alert summaries disabled");
    }

    let jobs = Jobs::new(store.clone(), ingestor, engine, notifier, summarizer);

    let scheduler = Scheduler::new(
        store.clone(),
        Arc::new(jobs),
        Intervals {
            alert_poll: Duration::from_secs(config.alert_poll_secs),
            report_poll: Duration::from_secs(config.report_poll_secs),
            verification: Duration::from_secs(config.verify_interval_secs),
        },
    );
    let scheduler_handle = scheduler.start();

    let state = Arc::new(AppState {
        store,
        scheduler: scheduler.clone(),
        admin_username: config.admin_username,
        admin_password: config.admin_password,
    });

    let app = build_router(state);

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("Stormcheck server starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server_handle = tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, app).await {
            error!(error = %error, "HTTP server exited");
        }
    });

    tokio::select! {
        _ = server_handle => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    scheduler.stop();
    scheduler_handle.abort();
    if !scheduler.wait_idle(Duration::from_secs(30)).await {
        warn!("Timed out waiting for in-flight operations to finish");
    }

    Ok(())
}
