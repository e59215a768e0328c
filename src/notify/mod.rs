pub mod discord;

use anyhow::{bail, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::listing::ListingRecord;

pub use discord::DiscordNotifier;

pub const ALERT_TITLE: &str = "Study Up!";
pub const ALERT_COLOR: u32 = 0xFFA500;
pub const ALERT_AUTHOR: &str = "RPS Study Notification Bot";
pub const ALERT_MENTION: &str = "@everyone";

/// Chat message, built separately from sending so that the send gate can be
/// tested without touching extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookMessage {
    pub content: Option<String>,
    pub title: String,
    pub url: String,
    pub color: u32,
    pub author: Option<String>,
    /// (name, value), in display order
    pub fields: Vec<(String, String)>,
}

impl WebhookMessage {
    pub fn new(title: impl Into<String>, url: impl Into<String>, color: u32) -> Self {
        Self {
            content: None,
            title: title.into(),
            url: url.into(),
            color,
            author: None,
            fields: Vec::new(),
        }
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn author(mut self, name: impl Into<String>) -> Self {
        self.author = Some(name.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// The standard "new study" alert linking back to `site_url`.
    pub fn study_alert(record: &ListingRecord, site_url: &str) -> Self {
        Self::new(ALERT_TITLE, site_url, ALERT_COLOR)
            .content(ALERT_MENTION)
            .author(ALERT_AUTHOR)
            .field("Study:", record.identity.as_str())
            .field("Credits:", record.credits.as_str())
            .field("Description:", record.description.as_str())
            .field("Eligibility:", record.eligibility.as_str())
    }
}

/// Delivers a message to a chat channel. Dedup is the caller's job.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, msg: &WebhookMessage) -> Result<()>;
    fn name(&self) -> &'static str;
}

// --- Test helper ---
/// Keeps every sent message in memory. `fail_next(n)` makes the next `n`
/// sends error out.
#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<WebhookMessage>>,
    failures: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().map(|v| v.len()).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, msg: &WebhookMessage) -> Result<()> {
        let pending = self.failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.failures.store(pending - 1, Ordering::SeqCst);
            bail!("recording sink: injected failure");
        }
        match self.sent.lock() {
            Ok(mut v) => v.push(msg.clone()),
            Err(_) => bail!("recording sink mutex poisoned"),
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn study_alert_has_fixed_header_and_ordered_fields() {
        let rec = ListingRecord::from_raw("Memory Study", "(2)", "", "Open to all");
        let msg = WebhookMessage::study_alert(&rec, "https://ucalgary.sona-systems.com/default.aspx");

        assert_eq!(msg.title, "Study Up!");
        assert_eq!(msg.color, 0xFFA500);
        assert_eq!(msg.content.as_deref(), Some("@everyone"));
        assert_eq!(msg.author.as_deref(), Some("RPS Study Notification Bot"));
        let names: Vec<&str> = msg.fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["Study:", "Credits:", "Description:", "Eligibility:"]);
        assert_eq!(msg.fields[1].1, "2");
        assert_eq!(msg.fields[2].1, "Unknown");
    }

    #[tokio::test]
    async fn recording_sink_can_fail_on_demand() {
        let sink = RecordingSink::new();
        let msg = WebhookMessage::new("t", "u", 0);
        sink.fail_next(1);
        assert!(sink.send(&msg).await.is_err());
        assert!(sink.send(&msg).await.is_ok());
        assert_eq!(sink.sent_count(), 1);
    }
}
