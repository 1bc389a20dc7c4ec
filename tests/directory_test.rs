//! In-memory contact directory behaviour

use call_activity_bridge::directory::{ContactDirectory, DirectoryStats, InMemoryDirectory};
use call_activity_bridge::error::DirectoryError;
use call_activity_bridge::models::{ActivityRecord, ActivityType, CallOutcome, Contact};
use chrono::Utc;

fn contact(id: &str, phone: &str) -> Contact {
    Contact {
        id: id.to_string(),
        opportunity_id: id.parse().ok(),
        phone: Some(phone.to_string()),
        ..Contact::default()
    }
}

fn record(opportunity_id: u64) -> ActivityRecord {
    ActivityRecord {
        opportunity_id,
        occurred_at: Utc::now(),
        activity_type: ActivityType::Call,
        outcome: CallOutcome::Busy,
        description: "Inbound call from +13135551234".to_string(),
        auth_token: "token".to_string(),
    }
}

#[tokio::test]
async fn test_e164_match_skips_fallback() {
    let directory = InMemoryDirectory::with_contacts([contact("1", "+13135551234")]);

    let found = directory.find_by_phone("+13135551234", "3135551234").await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(directory.lookups(), vec!["+13135551234".to_string()]);
}

#[tokio::test]
async fn test_last10_fallback_on_empty_result() {
    let directory = InMemoryDirectory::with_contacts([contact("2", "313-555-1234")]);

    let found = directory.find_by_phone("+13135551234", "3135551234").await.unwrap();

    assert_eq!(found[0].id, "2");
    assert_eq!(directory.lookups().len(), 2);
}

#[tokio::test]
async fn test_empty_directory_returns_no_candidates() {
    let directory = InMemoryDirectory::new();
    let found = directory.find_by_phone("+13135551234", "3135551234").await.unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_injected_failures_and_heal() {
    let directory = InMemoryDirectory::with_contacts([contact("1", "+13135551234")]);

    directory.fail_lookups("dns failure");
    directory.fail_writes("timeout");
    assert_eq!(
        directory.find_by_phone("+13135551234", "3135551234").await,
        Err(DirectoryError::Unavailable("dns failure".to_string()))
    );
    assert!(directory.create_activity(&record(1)).await.is_err());
    assert!(directory.activities().is_empty());

    directory.heal();
    assert!(directory.create_activity(&record(1)).await.is_ok());
    assert_eq!(directory.activities().len(), 1);
}

#[tokio::test]
async fn test_stats_and_clear() {
    let directory = InMemoryDirectory::with_contacts([contact("1", "+13135551234"), contact("2", "+12485550000")]);
    directory.add_contact(contact("3", "+17345550000"));
    directory.find_by_phone("+17345550000", "7345550000").await.unwrap();
    directory.create_activity(&record(3)).await.unwrap();

    assert_eq!(
        directory.stats(),
        DirectoryStats {
            contacts: 3,
            lookups: 1,
            client_activities: 1,
        }
    );

    directory.clear();
    assert_eq!(directory.stats(), DirectoryStats::default());
    assert!(directory.contacts().is_empty());
}
