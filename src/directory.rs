//! Contact directory seam and its in-memory stand-in.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::error::DirectoryError;
use crate::models::{ActivityRecord, Contact};

/// Phone lookup and activity creation against a CRM.
///
/// Implementations try `e164` first and only query `last10` when the first
/// query yields no candidates. Candidates are returned in directory order.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Candidates for a customer number, querying `last10` only when `e164` finds none
    async fn find_by_phone(&self, e164: &str, last10: &str) -> Result<Vec<Contact>, DirectoryError>;

    /// Write one call activity against `record.opportunity_id`
    async fn create_activity(&self, record: &ActivityRecord) -> Result<(), DirectoryError>;
}

/// Counters exposed by the in-memory directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryStats {
    /// Contacts currently stored
    pub contacts: usize,
    /// Queries answered, each fallback counted separately
    pub lookups: usize,
    /// Activities written
    pub client_activities: usize,
}

#[derive(Debug, Default)]
struct DirectoryState {
    contacts: Vec<Contact>,
    activities: Vec<ActivityRecord>,
    lookups: Vec<String>,
    lookup_failure: Option<String>,
    write_failure: Option<String>,
}

/// Deterministic in-memory directory for tests and offline runs.
///
/// A contact matches a query when the digits of its stored phone equal the
/// digits of the query, so contacts stored without a country code are only
/// found by the `last10` fallback, as in the live CRM.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    state: Mutex<DirectoryState>,
}

fn digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

impl InMemoryDirectory {
    /// Empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory seeded with `contacts`, kept in iteration order
    pub fn with_contacts(contacts: impl IntoIterator<Item = Contact>) -> Self {
        let directory = Self::new();
        for contact in contacts {
            directory.add_contact(contact);
        }
        directory
    }

    fn state(&self) -> MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a contact after the existing ones
    pub fn add_contact(&self, contact: Contact) {
        debug!(contact_id = %contact.id, "Adding contact to in-memory directory");
        self.state().contacts.push(contact);
    }

    /// Snapshot of stored contacts
    pub fn contacts(&self) -> Vec<Contact> {
        self.state().contacts.clone()
    }

    /// Activities written so far, in write order
    pub fn activities(&self) -> Vec<ActivityRecord> {
        self.state().activities.clone()
    }

    /// Queries received so far, including fallbacks
    pub fn lookups(&self) -> Vec<String> {
        self.state().lookups.clone()
    }

    /// Current counters
    pub fn stats(&self) -> DirectoryStats {
        let state = self.state();
        DirectoryStats {
            contacts: state.contacts.len(),
            lookups: state.lookups.len(),
            client_activities: state.activities.len(),
        }
    }

    /// Make every lookup fail with `message` until reset
    pub fn fail_lookups(&self, message: impl Into<String>) {
        self.state().lookup_failure = Some(message.into());
    }

    /// Make every activity write fail with `message` until reset
    pub fn fail_writes(&self, message: impl Into<String>) {
        self.state().write_failure = Some(message.into());
    }

    /// Stop injecting failures
    pub fn heal(&self) {
        let mut state = self.state();
        state.lookup_failure = None;
        state.write_failure = None;
    }

    /// Drop contacts, activities, lookups and injected failures
    pub fn clear(&self) {
        *self.state() = DirectoryState::default();
        info!("Cleared in-memory directory");
    }

    fn matches(contacts: &[Contact], query: &str) -> Vec<Contact> {
        let wanted = digits(query);
        if wanted.is_empty() {
            return Vec::new();
        }
        contacts
            .iter()
            .filter(|c| c.phone.as_deref().is_some_and(|p| digits(p) == wanted))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ContactDirectory for InMemoryDirectory {
    async fn find_by_phone(&self, e164: &str, last10: &str) -> Result<Vec<Contact>, DirectoryError> {
        let mut state = self.state();
        if let Some(message) = &state.lookup_failure {
            return Err(DirectoryError::Unavailable(message.clone()));
        }

        state.lookups.push(e164.to_string());
        let found = Self::matches(&state.contacts, e164);
        if !found.is_empty() {
            return Ok(found);
        }

        state.lookups.push(last10.to_string());
        Ok(Self::matches(&state.contacts, last10))
    }

    async fn create_activity(&self, record: &ActivityRecord) -> Result<(), DirectoryError> {
        let mut state = self.state();
        if let Some(message) = &state.write_failure {
            return Err(DirectoryError::Unavailable(message.clone()));
        }

        info!(
            opportunity_id = record.opportunity_id,
            outcome = %record.outcome,
            "Created client activity in in-memory directory"
        );
        state.activities.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digits() {
        assert_eq!(digits("+1 (313) 555-1234"), "13135551234");
        assert_eq!(digits("n/a"), "");
    }

    #[test]
    fn test_matches_preserves_insertion_order() {
        let contacts = vec![
            Contact { id: "b".into(), phone: Some("3135551234".into()), ..Contact::default() },
            Contact { id: "a".into(), phone: Some("313-555-1234".into()), ..Contact::default() },
            Contact { id: "c".into(), phone: Some("3135559999".into()), ..Contact::default() },
        ];
        let ids: Vec<_> = InMemoryDirectory::matches(&contacts, "3135551234")
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, ["b", "a"]);
    }
}
