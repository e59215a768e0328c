// src/epoch.rs
use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// Wall-clock bookkeeping for the poll loop.
/// - `uptime_checkpoint` drives the purely observational "hour elapsed" signal.
/// - `last_notified_at` drives the sliding seen-set epoch: it moves on every
///   notification and on every epoch reset, never backwards.
/// All methods take `now` explicitly so tests can simulate time.
#[derive(Debug, Clone)]
pub struct EpochClock {
    started_at: DateTime<Utc>,
    uptime_checkpoint: DateTime<Utc>,
    hours_elapsed: u32,
    last_notified_at: DateTime<Utc>,
    hour_window: ChronoDuration,
    epoch_window: ChronoDuration,
}

impl EpochClock {
    /// 60-minute hour signal, 21-minute epoch.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_windows(now, 60, 21)
    }

    /// Window lengths in minutes; negative values are treated as 0.
    pub fn with_windows(now: DateTime<Utc>, hour_mins: i64, epoch_mins: i64) -> Self {
        Self {
            started_at: now,
            uptime_checkpoint: now,
            hours_elapsed: 0,
            last_notified_at: now,
            hour_window: minutes_saturating(hour_mins),
            epoch_window: minutes_saturating(epoch_mins),
        }
    }

    pub fn record_notification(&mut self, now: DateTime<Utc>) {
        self.last_notified_at = self.last_notified_at.max(now);
    }

    /// Advance the uptime checkpoint if a full window has passed.
    /// Returns true when an hour signal fired.
    pub fn check_hour(&mut self, now: DateTime<Utc>) -> bool {
        if now.signed_duration_since(self.uptime_checkpoint) < self.hour_window {
            return false;
        }
        self.uptime_checkpoint = now;
        self.hours_elapsed += 1;
        true
    }

    /// True once the epoch window has passed since the last notification.
    pub fn epoch_expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_notified_at) >= self.epoch_window
    }

    pub fn restart_epoch(&mut self, now: DateTime<Utc>) {
        self.last_notified_at = self.last_notified_at.max(now);
    }

    pub fn uptime(&self, now: DateTime<Utc>) -> ChronoDuration {
        now.signed_duration_since(self.started_at)
    }

    pub fn hours_elapsed(&self) -> u32 {
        self.hours_elapsed
    }

    pub fn last_notified_at(&self) -> DateTime<Utc> {
        self.last_notified_at
    }
}

fn minutes_saturating(mins: i64) -> ChronoDuration {
    ChronoDuration::try_minutes(mins.max(0)).unwrap_or(ChronoDuration::MAX)
}

/// Minutes with two decimals, for console output.
pub fn as_minutes(d: ChronoDuration) -> f64 {
    (d.num_milliseconds() as f64 / 60_000.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap()
    }

    #[test]
    fn epoch_expires_after_window_without_notifications() {
        let clock = EpochClock::new(t0());
        assert!(!clock.epoch_expired(t0() + ChronoDuration::minutes(20)));
        assert!(clock.epoch_expired(t0() + ChronoDuration::minutes(21)));
    }

    #[test]
    fn notification_slides_the_epoch() {
        let mut clock = EpochClock::new(t0());
        clock.record_notification(t0() + ChronoDuration::minutes(15));
        assert!(!clock.epoch_expired(t0() + ChronoDuration::minutes(30)));
        assert!(clock.epoch_expired(t0() + ChronoDuration::minutes(36)));
    }

    #[test]
    fn notify_timestamp_never_moves_backwards() {
        let mut clock = EpochClock::new(t0());
        clock.record_notification(t0() + ChronoDuration::minutes(10));
        clock.record_notification(t0() + ChronoDuration::minutes(5));
        assert_eq!(clock.last_notified_at(), t0() + ChronoDuration::minutes(10));
    }

    #[test]
    fn hour_signal_resets_checkpoint() {
        let mut clock = EpochClock::new(t0());
        assert!(!clock.check_hour(t0() + ChronoDuration::minutes(59)));
        assert!(clock.check_hour(t0() + ChronoDuration::minutes(60)));
        assert_eq!(clock.hours_elapsed(), 1);
        assert!(!clock.check_hour(t0() + ChronoDuration::minutes(90)));
        assert!(clock.check_hour(t0() + ChronoDuration::minutes(120)));
        assert_eq!(clock.hours_elapsed(), 2);
    }

    #[test]
    fn uptime_is_cumulative() {
        let mut clock = EpochClock::new(t0());
        let later = t0() + ChronoDuration::minutes(135);
        clock.check_hour(later);
        assert_eq!(clock.uptime(later), ChronoDuration::minutes(135));
        assert_eq!(as_minutes(clock.uptime(later)), 135.0);
    }
}
