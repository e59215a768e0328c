//! RPS Study Notifier — Binary Entrypoint
//! Loads configuration, logs into the study site, and polls until Ctrl-C.
//!
//! With `local_testing = true` the live site is replaced by a local HTML
//! fixture and the test webhook, and only a single check is made.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rps_study_notifier::config::AppConfig;
use rps_study_notifier::notify::{DiscordNotifier, NotificationSink};
use rps_study_notifier::page::fixture::FixtureSession;
use rps_study_notifier::page::http::HttpSession;
use rps_study_notifier::poll::{Credentials, PollLoop, PollSettings};
use rps_study_notifier::record::FileRecorder;
use rps_study_notifier::CheckOutcome;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rps_study_notifier=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default().context("loading configuration")?;
    cfg.validate()?;

    let settings = PollSettings::from_config(&cfg);
    let sink: Arc<dyn NotificationSink> = Arc::new(DiscordNotifier::from_config(&cfg));
    let recorder = Arc::new(FileRecorder::new(cfg.record_path.clone()));

    if cfg.local_testing {
        // validate() guarantees the fixture path.
        let path = cfg.fixture_path.clone().unwrap_or_default();
        tracing::info!(fixture = %path.display(), "local testing mode");
        let mut poll = PollLoop::new(settings, FixtureSession::new(path), sink, Utc::now())
            .with_recorder(recorder);
        match poll.single_shot(Utc::now()).await? {
            CheckOutcome::NoListing => tracing::info!("no study on local page"),
            other => tracing::info!(outcome = ?other, "local check done"),
        }
        return Ok(());
    }

    let session = HttpSession::new()?.with_timeout(cfg.site_timeout_secs);
    let mut poll = PollLoop::new(settings, session, sink, Utc::now()).with_recorder(recorder);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
        }
        signal_token.cancel();
    });

    let creds = Credentials::from_config(&cfg);
    let uptime = poll.run(&creds, shutdown).await?;
    tracing::info!(minutes = uptime.num_minutes(), "stopped");
    Ok(())
}
