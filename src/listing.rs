//! listing.rs — study listing data model and field normalization.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder for any listing field the page left blank.
pub const UNKNOWN: &str = "Unknown";

/// Dedup key of a listing: its title text as shown on the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListingIdentity(String);

impl ListingIdentity {
    /// Builds an identity from raw title text; blank titles become `UNKNOWN`.
    pub fn from_raw(raw: &str) -> Self {
        Self(normalize_field(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the title was blank and got replaced by the placeholder.
    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN
    }
}

impl fmt::Display for ListingIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ListingIdentity {
    fn from(s: &str) -> Self {
        Self::from_raw(s)
    }
}

/// One listing as extracted on a single poll. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub identity: ListingIdentity,
    pub credits: String,
    pub description: String,
    pub eligibility: String,
}

impl ListingRecord {
    /// Normalizes raw extracted text. Credits lose their surrounding `()`.
    pub fn from_raw(title: &str, credits: &str, description: &str, eligibility: &str) -> Self {
        Self {
            identity: ListingIdentity::from_raw(title),
            credits: normalize_field(strip_parens(credits.trim())),
            description: normalize_field(description),
            eligibility: normalize_field(eligibility),
        }
    }
}

/// Trim and substitute `UNKNOWN` for blank text.
pub fn normalize_field(raw: &str) -> String {
    let t = raw.trim();
    if t.is_empty() {
        UNKNOWN.to_string()
    } else {
        t.to_string()
    }
}

fn strip_parens(s: &str) -> &str {
    s.trim_matches(|c| c == '(' || c == ')')
}
