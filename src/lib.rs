// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod config;
pub mod dedup;
pub mod epoch;
pub mod listing;
pub mod page;
pub mod poll;
pub mod record;

// Notifications (Discord webhook + in-memory sink)
pub mod notify;

// ---- Re-exports for stable public API ----
pub use crate::config::AppConfig;
pub use crate::dedup::ListingDeduplicator;
pub use crate::epoch::EpochClock;
pub use crate::listing::{ListingIdentity, ListingRecord, UNKNOWN};
pub use crate::notify::{NotificationSink, WebhookMessage};
pub use crate::page::{PageSnapshot, SiteSession};
pub use crate::poll::{CheckOutcome, PollLoop, PollSettings, PollState};
