//! # Poll loop
//! Drives the study-signup page: authenticate once, then check → sleep →
//! reload forever, notifying each distinct listing once per epoch.
//!
//! States: `Authenticating` (once) → `Polling` (steady) → `Terminating`
//! (on cancellation or fatal startup error). The session is closed on every
//! exit path out of `run`.
//!
//! Time-dependent steps (`check_listing`, `account_time`) take `now`
//! explicitly so tests can simulate the 21-minute epoch without sleeping.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::dedup::ListingDeduplicator;
use crate::epoch::{as_minutes, EpochClock};
use crate::listing::ListingRecord;
use crate::notify::{NotificationSink, WebhookMessage};
use crate::page::{PageSnapshot, PageSnapshotProvider, SiteSession};
use crate::record::AuditRecorder;

/// One-time metrics registration (so series show up once a recorder exists).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("poll_checks_total", "Listing checks performed.");
        describe_counter!(
            "listing_notifications_total",
            "Notifications sent for new listings."
        );
        describe_counter!(
            "listing_suppressed_total",
            "Listings seen again within the current epoch."
        );
        describe_counter!("seen_set_resets_total", "Epoch expiries that cleared the seen-set.");
        describe_counter!(
            "poll_errors_total",
            "Poll iterations that failed after all retries."
        );
        describe_gauge!("seen_set_size", "Identities remembered in the current epoch.");
    });
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(cfg.username.clone(), cfg.password.clone())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub login_url: String,
    /// Link placed in notifications.
    pub notify_url: String,
    pub poll_interval: Duration,
    pub epoch_mins: i64,
    pub uptime_checkpoint_mins: i64,
    pub send_notification: bool,
    pub record_studies: bool,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl PollSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            login_url: cfg.login_url(),
            notify_url: cfg.notify_url(),
            poll_interval: Duration::from_secs(cfg.poll_interval_mins.saturating_mul(60)),
            epoch_mins: i64::try_from(cfg.epoch_mins).unwrap_or(i64::MAX),
            uptime_checkpoint_mins: i64::try_from(cfg.uptime_checkpoint_mins).unwrap_or(i64::MAX),
            send_notification: cfg.send_notification,
            record_studies: cfg.record_studies,
            max_attempts: cfg.max_attempts.max(1),
            retry_backoff: Duration::from_millis(cfg.retry_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Authenticating,
    Polling,
    Terminating,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    NoListing,
    Notified(ListingRecord),
    /// Listing already notified in this epoch; transmission skipped.
    Suppressed(ListingRecord),
    NotificationsDisabled(ListingRecord),
}

/// Result of the post-sleep time accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Housekeeping {
    pub hour_elapsed: bool,
    /// Number of identities dropped if the epoch expired.
    pub epoch_reset: Option<usize>,
}

pub struct PollLoop<S: SiteSession> {
    settings: PollSettings,
    session: S,
    snapshots: PageSnapshotProvider,
    sink: Arc<dyn NotificationSink>,
    recorder: Option<Arc<dyn AuditRecorder>>,
    dedup: ListingDeduplicator,
    clock: EpochClock,
    state: PollState,
}

impl<S: SiteSession> PollLoop<S> {
    pub fn new(
        settings: PollSettings,
        session: S,
        sink: Arc<dyn NotificationSink>,
        now: DateTime<Utc>,
    ) -> Self {
        let clock =
            EpochClock::with_windows(now, settings.uptime_checkpoint_mins, settings.epoch_mins);
        Self {
            settings,
            session,
            snapshots: PageSnapshotProvider::default(),
            sink,
            recorder: None,
            dedup: ListingDeduplicator::new(),
            clock,
            state: PollState::Authenticating,
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn AuditRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn dedup(&self) -> &ListingDeduplicator {
        &self.dedup
    }

    pub fn clock(&self) -> &EpochClock {
        &self.clock
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Open the site, log in, and land on the listing view. No retry.
    pub async fn authenticate(&mut self, creds: &Credentials) -> Result<()> {
        self.state = PollState::Authenticating;
        let url = self.settings.login_url.clone();
        self.session
            .open(&url)
            .await
            .with_context(|| format!("opening login page {url}"))?;
        self.session
            .submit_credentials(&creds.username, &creds.password)
            .await
            .context("submitting credentials")?;
        self.session
            .navigate_to_listing_view()
            .await
            .context("opening study view")?;
        info!(session = self.session.name(), user = %creds.username, "authenticated");
        self.state = PollState::Polling;
        Ok(())
    }

    /// Inspect the currently loaded page and notify if it shows a new listing.
    /// The message is always built; only transmission is gated on novelty.
    pub async fn check_listing(&mut self, now: DateTime<Utc>) -> Result<CheckOutcome> {
        ensure_metrics_described();
        counter!("poll_checks_total").increment(1);

        let record = match self.snapshots.snapshot(&self.session)? {
            PageSnapshot::Empty => {
                debug!("no listing on page");
                return Ok(CheckOutcome::NoListing);
            }
            PageSnapshot::Listing(record) => record,
        };

        if !self.settings.send_notification {
            debug!(study = %record.identity, "listing found; notifications disabled");
            return Ok(CheckOutcome::NotificationsDisabled(record));
        }

        let msg = WebhookMessage::study_alert(&record, &self.settings.notify_url);
        if !self.dedup.is_new(&record.identity) {
            counter!("listing_suppressed_total").increment(1);
            debug!(study = %record.identity, "already notified this epoch");
            return Ok(CheckOutcome::Suppressed(record));
        }

        self.sink
            .send(&msg)
            .await
            .with_context(|| format!("sending notification via {}", self.sink.name()))?;

        // Mark before recording: a failed audit write must not cause a resend.
        self.dedup.mark_seen(record.identity.clone());
        self.clock.record_notification(now);
        counter!("listing_notifications_total").increment(1);
        gauge!("seen_set_size").set(self.dedup.len() as f64);

        if self.settings.record_studies {
            if let Some(rec) = &self.recorder {
                if let Err(e) = rec.append(&record, now).await {
                    warn!(error = ?e, study = %record.identity, "audit record failed");
                }
            }
        }

        info!(
            study = %record.identity,
            credits = %record.credits,
            minutes_since_start = as_minutes(self.clock.uptime(now)),
            "Study!"
        );
        Ok(CheckOutcome::Notified(record))
    }

    /// Hour signal and sliding epoch expiry; run after each sleep.
    pub fn account_time(&mut self, now: DateTime<Utc>) -> Housekeeping {
        let mut out = Housekeeping::default();

        if self.clock.check_hour(now) {
            out.hour_elapsed = true;
            info!(hours = self.clock.hours_elapsed(), "hour elapsed");
        }

        if self.clock.epoch_expired(now) {
            let dropped = self.dedup.reset();
            self.clock.restart_epoch(now);
            counter!("seen_set_resets_total").increment(1);
            gauge!("seen_set_size").set(0.0);
            if dropped > 0 {
                info!(dropped, "seen-set epoch expired");
            }
            out.epoch_reset = Some(dropped);
        }
        out
    }

    /// One polling step with bounded retry: optionally reload, then check.
    /// A reload that succeeded is not repeated when only the notify step fails.
    pub async fn poll_once(
        &mut self,
        reload: bool,
        shutdown: &CancellationToken,
    ) -> Result<CheckOutcome> {
        let mut needs_reload = reload;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let res = match self.reload_if(needs_reload).await {
                Ok(()) => {
                    needs_reload = false;
                    self.check_listing(Utc::now()).await
                }
                Err(e) => Err(e),
            };

            match res {
                Ok(outcome) => return Ok(outcome),
                Err(e) if attempt < self.settings.max_attempts => {
                    let backoff = self.settings.retry_backoff * (1u32 << (attempt - 1).min(16));
                    warn!(
                        attempt,
                        max = self.settings.max_attempts,
                        error = ?e,
                        "poll attempt failed; retrying"
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => return Err(anyhow!("cancelled during retry backoff")),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn reload_if(&mut self, reload: bool) -> Result<()> {
        if reload {
            self.session
                .reload()
                .await
                .context("reloading listing page")?;
        }
        Ok(())
    }

    /// Authenticate, then poll until `shutdown` is cancelled.
    /// Returns total uptime. The session is closed however this returns.
    pub async fn run(
        &mut self,
        creds: &Credentials,
        shutdown: CancellationToken,
    ) -> Result<ChronoDuration> {
        let result = self.run_inner(creds, &shutdown).await;

        self.state = PollState::Terminating;
        let uptime = self.clock.uptime(Utc::now());
        info!(
            minutes = as_minutes(uptime),
            "Minutes since program execution"
        );
        if let Err(e) = self.session.close().await {
            warn!(error = ?e, "closing session failed");
        }
        result.map(|()| uptime)
    }

    async fn run_inner(&mut self, creds: &Credentials, shutdown: &CancellationToken) -> Result<()> {
        self.authenticate(creds).await?;
        info!(
            interval_secs = self.settings.poll_interval.as_secs(),
            epoch_mins = self.settings.epoch_mins,
            notify = self.settings.send_notification,
            record = self.settings.record_studies,
            "polling started"
        );

        let mut reload = false;
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            if let Err(e) = self.poll_once(reload, shutdown).await {
                if shutdown.is_cancelled() {
                    return Ok(());
                }
                counter!("poll_errors_total").increment(1);
                warn!(error = ?e, "poll iteration failed; skipping");
            }
            reload = true;

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }

            self.account_time(Utc::now());
        }
    }

    /// Local-testing variant: open the page, check once, close.
    pub async fn single_shot(&mut self, now: DateTime<Utc>) -> Result<CheckOutcome> {
        let url = self.settings.login_url.clone();
        let result = match self.session.open(&url).await {
            Ok(()) => {
                self.state = PollState::Polling;
                self.check_listing(now).await
            }
            Err(e) => Err(e.context("opening local page")),
        };
        self.state = PollState::Terminating;
        if let Err(e) = self.session.close().await {
            warn!(error = ?e, "closing session failed");
        }
        result
    }
}
