// src/page/extract.rs
// Pure HTML helpers for the study-signup page. No I/O here.

use once_cell::sync::OnceCell;
use regex::Regex;
use scraper::{Html, Selector};

/// Text the site renders when there is nothing to sign up for.
pub const NO_STUDIES_MARKER: &str = "No studies are available at this time.";

// Element id fragments of the first listing row (ASP.NET prefixes the real ids).
pub const STUDY_INFO_ID: &str = "HyperlinkStudentStudyInfo";
pub const CREDITS_ID: &str = "LabelCredits";
pub const STUDY_TYPE_ID: &str = "LabelStudyType";
// sic, the site spells it this way
pub const ELIGIBILITY_ID: &str = "LabelIndvitation";

pub fn contains_text(html: &str, marker: &str) -> bool {
    html.contains(marker)
}

/// Text of the first element whose `id` contains `fragment`, whitespace-collapsed.
/// Returns `None` when no such element exists; an empty element yields `Some("")`.
pub fn field_by_id_fragment(html: &str, fragment: &str) -> Option<String> {
    let selector = Selector::parse(&format!("[id*='{fragment}']")).ok()?;
    let doc = Html::parse_document(html);
    doc.select(&selector)
        .next()
        .map(|el| collapse_ws(&el.text().collect::<String>()))
}

/// `href` of the element with exactly this id.
pub fn href_by_id(html: &str, id: &str) -> Option<String> {
    let selector = Selector::parse(&format!("[id='{id}']")).ok()?;
    let doc = Html::parse_document(html);
    doc.select(&selector)
        .next()
        .and_then(|el| el.value().attr("href"))
        .map(str::to_string)
}

/// Collapse runs of whitespace (incl. `&nbsp;` after decoding) and trim.
pub fn collapse_ws(s: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re = RE_WS.get_or_init(|| Regex::new(r"[\s\u{00A0}]+").expect("static regex"));
    re.replace_all(s, " ").trim().to_string()
}
