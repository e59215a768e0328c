// src/page/snapshot.rs
use anyhow::{bail, Result};

use super::extract::{CREDITS_ID, ELIGIBILITY_ID, NO_STUDIES_MARKER, STUDY_INFO_ID, STUDY_TYPE_ID};
use super::SiteSession;
use crate::listing::ListingRecord;

/// What the monitored page shows right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSnapshot {
    Empty,
    Listing(ListingRecord),
}

/// Turns the session's current page into a `PageSnapshot`.
#[derive(Debug, Clone)]
pub struct PageSnapshotProvider {
    no_listing_marker: String,
}

impl Default for PageSnapshotProvider {
    fn default() -> Self {
        Self {
            no_listing_marker: NO_STUDIES_MARKER.to_string(),
        }
    }
}

impl PageSnapshotProvider {
    pub fn listing_present<S: SiteSession + ?Sized>(&self, session: &S) -> bool {
        !session.page_contains_text(&self.no_listing_marker)
    }

    /// Errors when the page has neither the empty marker nor a listing row,
    /// e.g. an expired-session login form or a maintenance page.
    /// An empty title element is still a listing (identity `"Unknown"`).
    pub fn snapshot<S: SiteSession + ?Sized>(&self, session: &S) -> Result<PageSnapshot> {
        if !self.listing_present(session) {
            return Ok(PageSnapshot::Empty);
        }

        // Title first: it is the dedup key.
        let Some(title) = session.extract_field(STUDY_INFO_ID) else {
            bail!("page is not the study list: no empty marker and no #{STUDY_INFO_ID} element");
        };
        // Optional fields: absent and empty both become "Unknown".
        let credits = session.extract_field(CREDITS_ID).unwrap_or_default();
        let description = session.extract_field(STUDY_TYPE_ID).unwrap_or_default();
        let eligibility = session.extract_field(ELIGIBILITY_ID).unwrap_or_default();

        let record = ListingRecord::from_raw(&title, &credits, &description, &eligibility);
        if record.identity.is_unknown() {
            tracing::warn!(
                session = session.name(),
                "listing has no title; using placeholder identity"
            );
        }
        Ok(PageSnapshot::Listing(record))
    }
}
