use super::{NotificationSink, WebhookMessage};
use crate::config::AppConfig;
use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

#[derive(Clone)]
pub struct DiscordNotifier {
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordNotifier {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    /// One attempt per send: the poll loop already retries the whole
    /// check-and-notify step `max_attempts` times.
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(cfg.active_webhook().to_string())
            .with_timeout(cfg.webhook_timeout_secs)
            .with_retries(1)
    }

    pub async fn send_message(&self, msg: &WebhookMessage) -> Result<()> {
        let payload = DiscordWebhookPayload::from_message(msg);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    if let Err(e) = rsp.error_for_status_ref() {
                        if attempt < self.max_retries {
                            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1)))
                                .await;
                            continue;
                        }
                        return Err(anyhow!("Discord webhook HTTP error: {e}"));
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    return Err(anyhow!("Discord webhook request failed: {e}"));
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl NotificationSink for DiscordNotifier {
    async fn send(&self, msg: &WebhookMessage) -> Result<()> {
        self.send_message(msg).await
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

/// JSON body Discord expects for `msg`.
pub fn payload_json(msg: &WebhookMessage) -> serde_json::Value {
    serde_json::to_value(DiscordWebhookPayload::from_message(msg)).unwrap_or_default()
}

#[derive(Serialize)]
struct DiscordAuthor {
    name: String,
}

#[derive(Serialize)]
struct DiscordField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    url: String,
    color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<DiscordAuthor>,
    fields: Vec<DiscordField>,
}

#[derive(Serialize)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl DiscordWebhookPayload {
    fn from_message(msg: &WebhookMessage) -> Self {
        Self {
            content: msg.content.clone(),
            embeds: vec![DiscordEmbed {
                title: msg.title.clone(),
                url: msg.url.clone(),
                color: msg.color,
                author: msg.author.clone().map(|name| DiscordAuthor { name }),
                fields: msg
                    .fields
                    .iter()
                    .map(|(name, value)| DiscordField {
                        name: name.clone(),
                        value: value.clone(),
                        inline: false,
                    })
                    .collect(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::ListingRecord;

    #[test]
    fn payload_matches_discord_embed_shape() {
        let rec = ListingRecord::from_raw("Memory Study", "(2)", "Lab", "");
        let msg = WebhookMessage::study_alert(&rec, "https://example.test/default.aspx");
        let v = payload_json(&msg);

        assert_eq!(v["content"], "@everyone");
        let embed = &v["embeds"][0];
        assert_eq!(embed["title"], "Study Up!");
        assert_eq!(embed["url"], "https://example.test/default.aspx");
        assert_eq!(embed["color"], 0xFFA500);
        assert_eq!(embed["author"]["name"], "RPS Study Notification Bot");
        assert_eq!(embed["fields"][0]["name"], "Study:");
        assert_eq!(embed["fields"][0]["value"], "Memory Study");
        assert_eq!(embed["fields"][3]["value"], "Unknown");
        assert_eq!(embed["fields"].as_array().map(|a| a.len()), Some(4));
    }

    #[test]
    fn config_built_notifier_leaves_retries_to_the_poll_loop() {
        let cfg = AppConfig {
            webhook_url: "https://discord.test/hook".into(),
            max_attempts: 5,
            webhook_timeout_secs: 9,
            ..AppConfig::default()
        };
        let n = DiscordNotifier::from_config(&cfg);
        assert_eq!(n.max_retries, 1);
        assert_eq!(n.timeout, Duration::from_secs(9));
        assert_eq!(n.webhook, "https://discord.test/hook");
    }

    #[test]
    fn author_is_omitted_when_unset() {
        let v = payload_json(&WebhookMessage::new("t", "u", 1));
        assert!(v["embeds"][0].get("author").is_none());
        assert!(v["content"].is_null());
    }
}
