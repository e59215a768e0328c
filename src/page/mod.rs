// src/page/mod.rs
pub mod extract;
pub mod fixture;
pub mod http;
pub mod snapshot;

use anyhow::Result;

pub use snapshot::{PageSnapshot, PageSnapshotProvider};

/// Capability set the poll loop needs from the monitored site.
/// Implementations keep the last loaded page in memory; the query methods
/// read from it and never touch the network.
#[async_trait::async_trait]
pub trait SiteSession: Send {
    async fn open(&mut self, url: &str) -> Result<()>;
    async fn submit_credentials(&mut self, username: &str, password: &str) -> Result<()>;
    async fn navigate_to_listing_view(&mut self) -> Result<()>;
    /// Fetch the current page again, bypassing any cache.
    async fn reload(&mut self) -> Result<()>;
    /// Release the session. Must be safe to call more than once.
    async fn close(&mut self) -> Result<()>;

    /// Raw HTML of the last loaded page (empty before `open`).
    fn page_source(&self) -> &str;
    fn name(&self) -> &'static str;

    fn page_contains_text(&self, marker: &str) -> bool {
        extract::contains_text(self.page_source(), marker)
    }

    fn extract_field(&self, id_fragment: &str) -> Option<String> {
        extract::field_by_id_fragment(self.page_source(), id_fragment)
    }
}
