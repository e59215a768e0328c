// tests/fixture_session.rs
use chrono::Utc;
use rps_study_notifier::notify::RecordingSink;
use rps_study_notifier::page::fixture::FixtureSession;
use rps_study_notifier::page::{PageSnapshot, PageSnapshotProvider, SiteSession};
use rps_study_notifier::poll::{CheckOutcome, PollLoop, PollSettings, PollState};
use std::sync::Arc;

#[tokio::test]
async fn fixture_page_yields_first_listing() {
    let mut session = FixtureSession::new("tests/fixtures/study_listing.html");
    session.open("ignored").await.expect("fixture readable");

    let snap = PageSnapshotProvider::default().snapshot(&session).unwrap();
    let PageSnapshot::Listing(rec) = snap else {
        panic!("expected a listing, got {snap:?}");
    };
    assert_eq!(rec.identity.as_str(), "Memory Study");
    assert_eq!(rec.credits, "2");
    assert_eq!(rec.description, "Online Survey Study");
    assert_eq!(rec.eligibility, "Open to all participants");
}

#[tokio::test]
async fn no_studies_fixture_is_empty() {
    let mut session = FixtureSession::new("tests/fixtures/no_studies.html");
    session.open("ignored").await.unwrap();
    assert!(session.page_contains_text("No studies are available at this time."));
    assert_eq!(
        PageSnapshotProvider::default().snapshot(&session).unwrap(),
        PageSnapshot::Empty
    );
}

#[tokio::test]
async fn missing_fixture_is_an_error() {
    let mut session = FixtureSession::new("tests/fixtures/does_not_exist.html");
    let err = session.open("ignored").await.unwrap_err();
    assert!(format!("{err:#}").contains("does_not_exist.html"));
}

#[tokio::test]
async fn single_shot_checks_once_and_closes() {
    let sink = Arc::new(RecordingSink::new());
    let mut poll = PollLoop::new(
        PollSettings::default(),
        FixtureSession::new("tests/fixtures/study_listing.html"),
        sink.clone(),
        Utc::now(),
    );
    let out = poll.single_shot(Utc::now()).await.unwrap();
    assert!(matches!(out, CheckOutcome::Notified(_)), "{out:?}");
    assert_eq!(poll.state(), PollState::Terminating);
    assert_eq!(sink.sent_count(), 1);
}

#[tokio::test]
async fn login_form_is_neither_empty_nor_a_listing() {
    let mut session = FixtureSession::new("tests/fixtures/login_form.html");
    session.open("ignored").await.unwrap();
    let err = PageSnapshotProvider::default()
        .snapshot(&session)
        .unwrap_err();
    assert!(err.to_string().contains("HyperlinkStudentStudyInfo"), "{err:#}");
}

#[tokio::test]
async fn untitled_row_is_a_listing_with_unknown_fields() {
    let mut session = FixtureSession::new("tests/fixtures/untitled_listing.html");
    session.open("ignored").await.unwrap();
    let snap = PageSnapshotProvider::default().snapshot(&session).unwrap();
    let PageSnapshot::Listing(rec) = snap else {
        panic!("expected a listing, got {snap:?}");
    };
    assert!(rec.identity.is_unknown());
    assert_eq!(rec.credits, "Unknown");
    // No eligibility element at all on this row.
    assert_eq!(rec.eligibility, "Unknown");
}
