//! Demo that pushes one sample study alert to the test webhook
//! (stdout only when RPS_TEST_WEBHOOK_URL is not set).

use rps_study_notifier::notify::discord::payload_json;
use rps_study_notifier::notify::{DiscordNotifier, NotificationSink, WebhookMessage};
use rps_study_notifier::ListingRecord;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let record = ListingRecord::from_raw("Demo Memory Study", "(2)", "Online Study", "");
    let msg = WebhookMessage::study_alert(&record, "https://ucalgary.sona-systems.com/default.aspx");

    match std::env::var("RPS_TEST_WEBHOOK_URL") {
        Ok(url) if !url.trim().is_empty() => {
            let notifier = DiscordNotifier::new(url).with_retries(1);
            if let Err(e) = notifier.send(&msg).await {
                tracing::warn!(error = ?e, "demo send failed");
            }
        }
        _ => {
            let body = serde_json::to_string_pretty(&payload_json(&msg)).unwrap_or_default();
            println!("{body}");
        }
    }

    println!("notify-demo done");
}
