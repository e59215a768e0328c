// tests/common/mod.rs
// Scripted in-memory site session shared by the integration tests.
#![allow(dead_code)]

use anyhow::{bail, Result};
use rps_study_notifier::page::SiteSession;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub const LISTING_PAGE: &str = include_str!("../fixtures/study_listing.html");
pub const EMPTY_PAGE: &str = include_str!("../fixtures/no_studies.html");
pub const UNTITLED_PAGE: &str = include_str!("../fixtures/untitled_listing.html");
/// What an expired session gets redirected to.
pub const LOGIN_PAGE: &str = include_str!("../fixtures/login_form.html");

/// Serves `pages` in order: `open` shows the first, each `reload` advances
/// one step and then sticks on the last page.
pub struct ScriptedSession {
    pages: Vec<String>,
    idx: usize,
    opened: bool,
    pub fail_login: bool,
    pub fail_reloads: usize,
    pub closed: Arc<AtomicBool>,
    pub reloads: Arc<AtomicUsize>,
}

impl ScriptedSession {
    pub fn new(pages: &[&str]) -> Self {
        Self {
            pages: pages.iter().map(|p| p.to_string()).collect(),
            idx: 0,
            opened: false,
            fail_login: false,
            fail_reloads: 0,
            closed: Arc::new(AtomicBool::new(false)),
            reloads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replace what the page currently shows.
    pub fn show(&mut self, html: &str) {
        self.pages = vec![html.to_string()];
        self.idx = 0;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SiteSession for ScriptedSession {
    async fn open(&mut self, _url: &str) -> Result<()> {
        self.opened = true;
        self.idx = 0;
        Ok(())
    }

    async fn submit_credentials(&mut self, username: &str, _password: &str) -> Result<()> {
        if self.fail_login || username.is_empty() {
            bail!("username field not found");
        }
        Ok(())
    }

    async fn navigate_to_listing_view(&mut self) -> Result<()> {
        Ok(())
    }

    async fn reload(&mut self) -> Result<()> {
        if self.fail_reloads > 0 {
            self.fail_reloads -= 1;
            bail!("connection reset");
        }
        self.reloads.fetch_add(1, Ordering::SeqCst);
        if self.idx + 1 < self.pages.len() {
            self.idx += 1;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn page_source(&self) -> &str {
        if !self.opened {
            return "";
        }
        self.pages.get(self.idx).map(String::as_str).unwrap_or_default()
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
