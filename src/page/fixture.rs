use anyhow::{Context, Result};
use std::path::PathBuf;

use super::SiteSession;

/// Local-testing stand-in for the live site: serves a static HTML file.
/// Credentials and navigation are accepted and ignored.
pub struct FixtureSession {
    path: PathBuf,
    page: String,
}

impl FixtureSession {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            page: String::new(),
        }
    }

    /// Build from in-memory HTML (tests).
    pub fn from_html(html: &str) -> Self {
        Self {
            path: PathBuf::new(),
            page: html.to_string(),
        }
    }

    async fn load(&mut self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        self.page = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading fixture page {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SiteSession for FixtureSession {
    async fn open(&mut self, _url: &str) -> Result<()> {
        self.load().await
    }

    async fn submit_credentials(&mut self, _username: &str, _password: &str) -> Result<()> {
        Ok(())
    }

    async fn navigate_to_listing_view(&mut self) -> Result<()> {
        Ok(())
    }

    async fn reload(&mut self) -> Result<()> {
        self.load().await
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn page_source(&self) -> &str {
        &self.page
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
