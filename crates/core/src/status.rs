//! The status ledger.
//!
//! One [`Status`] row records the registration state of one item within one registration
//! authority. The ledger guarantees there is at most one row per `(item, authority)` pair:
//! [`StatusLedger::upsert`] updates the existing row in place, and [`StatusLedger::insert`]
//! refuses a second row for a pair that already has one.
//!
//! Each row keeps its own change history so that state transitions can be audited without a
//! separate revision store.

use chrono::{DateTime, NaiveDate, Utc};
use mdr_types::RegistrationState;
use mdr_uuid::{AuthorityId, ItemId, StatusId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Registration of one item by one authority.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Status {
    pub id: StatusId,
    pub item: ItemId,
    pub authority: AuthorityId,
    pub state: RegistrationState,
    pub registration_date: NaiveDate,
    #[serde(default)]
    pub change_details: String,
    #[serde(default = "default_in_dictionary")]
    pub in_dictionary: bool,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<StatusChange>,
}

fn default_in_dictionary() -> bool {
    true
}

impl Status {
    /// Builds a fresh row with no history.
    pub fn new(
        item: ItemId,
        authority: AuthorityId,
        state: RegistrationState,
        registration_date: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: StatusId::new(),
            item,
            authority,
            state,
            registration_date,
            change_details: String::new(),
            in_dictionary: true,
            created: now,
            modified: now,
            history: Vec::new(),
        }
    }

    pub fn state_name(&self) -> &'static str {
        self.state.label()
    }
}

/// One recorded transition of a [`Status`] row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    /// State before the change; `None` when the row was created by this change.
    pub from: Option<RegistrationState>,
    pub to: RegistrationState,
    pub registration_date: NaiveDate,
    #[serde(default)]
    pub changed_by: Option<UserId>,
    pub changed_at: DateTime<Utc>,
}

/// Values written by a single upsert.
#[derive(Clone, Debug)]
pub struct StatusUpdate {
    pub state: RegistrationState,
    pub registration_date: NaiveDate,
    pub change_details: Option<String>,
    pub changed_by: Option<UserId>,
}

/// Outcome of [`StatusLedger::upsert`].
#[derive(Clone, Debug, PartialEq)]
pub struct Upserted {
    pub status: Status,
    /// State held before the upsert, or `None` if the row was created.
    pub previous: Option<RegistrationState>,
}

impl Upserted {
    /// True when the upsert moved the pair into a different state, including the first
    /// transition out of "no status".
    pub fn state_changed(&self) -> bool {
        self.previous != Some(self.status.state)
    }
}

/// All status rows, indexed by `(item, authority)`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Status>", into = "Vec<Status>")]
pub struct StatusLedger {
    rows: Vec<Status>,
    index: HashMap<(ItemId, AuthorityId), usize>,
}

impl StatusLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Status> {
        self.rows.iter()
    }

    pub fn get(&self, item: ItemId, authority: AuthorityId) -> Option<&Status> {
        self.index.get(&(item, authority)).map(|&i| &self.rows[i])
    }

    pub fn contains(&self, item: ItemId, authority: AuthorityId) -> bool {
        self.index.contains_key(&(item, authority))
    }

    /// Every status of `item`, across all authorities.
    pub fn for_item(&self, item: ItemId) -> impl Iterator<Item = &Status> {
        self.rows.iter().filter(move |s| s.item == item)
    }

    /// Every status recorded by `authority`.
    pub fn for_authority(&self, authority: AuthorityId) -> impl Iterator<Item = &Status> {
        self.rows.iter().filter(move |s| s.authority == authority)
    }

    /// Creates or updates the row for `(item, authority)`.
    ///
    /// An existing row keeps its id and creation time; state, registration date and (when
    /// supplied) change details are overwritten, and the transition is appended to its
    /// history.
    pub fn upsert(&mut self, item: ItemId, authority: AuthorityId, update: StatusUpdate) -> Upserted {
        let now = Utc::now();
        let change = |from| StatusChange {
            from,
            to: update.state,
            registration_date: update.registration_date,
            changed_by: update.changed_by,
            changed_at: now,
        };

        if let Some(&i) = self.index.get(&(item, authority)) {
            let row = &mut self.rows[i];
            let previous = row.state;
            row.history.push(change(Some(previous)));
            row.state = update.state;
            row.registration_date = update.registration_date;
            if let Some(details) = update.change_details {
                row.change_details = details;
            }
            row.modified = now;
            return Upserted {
                status: row.clone(),
                previous: Some(previous),
            };
        }

        let mut row = Status::new(item, authority, update.state, update.registration_date);
        row.change_details = update.change_details.unwrap_or_default();
        row.history.push(change(None));
        self.push(row.clone());
        Upserted {
            status: row,
            previous: None,
        }
    }

    /// Adds a row without going through the upsert path.
    ///
    /// # Errors
    ///
    /// Returns the rejected row if the pair already has a status.
    pub fn insert(&mut self, status: Status) -> Result<(), Box<Status>> {
        if self.contains(status.item, status.authority) {
            return Err(Box::new(status));
        }
        self.push(status);
        Ok(())
    }

    fn push(&mut self, status: Status) {
        self.index
            .insert((status.item, status.authority), self.rows.len());
        self.rows.push(status);
    }
}

impl PartialEq for StatusLedger {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows
    }
}

impl TryFrom<Vec<Status>> for StatusLedger {
    type Error = String;

    fn try_from(rows: Vec<Status>) -> Result<Self, Self::Error> {
        let mut ledger = StatusLedger::new();
        for row in rows {
            ledger.insert(row).map_err(|dup| {
                format!(
                    "duplicate status for item {} in authority {}",
                    dup.item, dup.authority
                )
            })?;
        }
        Ok(ledger)
    }
}

impl From<StatusLedger> for Vec<Status> {
    fn from(ledger: StatusLedger) -> Self {
        ledger.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(state: RegistrationState, day: u32) -> StatusUpdate {
        StatusUpdate {
            state,
            registration_date: NaiveDate::from_ymd_opt(2024, 1, day).expect("valid date"),
            change_details: None,
            changed_by: None,
        }
    }

    #[test]
    fn test_upsert_twice_keeps_one_row_with_latest_values() {
        let mut ledger = StatusLedger::new();
        let (item, ra) = (ItemId::new(), AuthorityId::new());

        let first = ledger.upsert(item, ra, update(RegistrationState::Candidate, 1));
        assert_eq!(first.previous, None);
        assert!(first.state_changed());

        let second = ledger.upsert(item, ra, update(RegistrationState::Standard, 2));
        assert_eq!(second.previous, Some(RegistrationState::Candidate));
        assert_eq!(second.status.id, first.status.id);

        assert_eq!(ledger.len(), 1);
        let row = ledger.get(item, ra).expect("row");
        assert_eq!(row.state, RegistrationState::Standard);
        assert_eq!(row.registration_date.to_string(), "2024-01-02");
        assert_eq!(row.history.len(), 2);
        assert_eq!(row.history[1].from, Some(RegistrationState::Candidate));
    }

    #[test]
    fn test_upsert_same_state_is_not_a_change() {
        let mut ledger = StatusLedger::new();
        let (item, ra) = (ItemId::new(), AuthorityId::new());
        ledger.upsert(item, ra, update(RegistrationState::Recorded, 1));
        let again = ledger.upsert(item, ra, update(RegistrationState::Recorded, 5));
        assert!(!again.state_changed());
    }

    #[test]
    fn test_insert_rejects_duplicate_pair() {
        let mut ledger = StatusLedger::new();
        let (item, ra) = (ItemId::new(), AuthorityId::new());
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date");
        ledger
            .insert(Status::new(item, ra, RegistrationState::Incomplete, date))
            .expect("first insert");

        let rejected = ledger
            .insert(Status::new(item, ra, RegistrationState::Standard, date))
            .expect_err("duplicate pair");
        assert_eq!(rejected.state, RegistrationState::Standard);
        assert_eq!(ledger.len(), 1);

        ledger
            .insert(Status::new(item, AuthorityId::new(), RegistrationState::Standard, date))
            .expect("other authority");
        assert_eq!(ledger.for_item(item).count(), 2);
    }

    #[test]
    fn test_deserialize_rejects_duplicate_rows() {
        let (item, ra) = (ItemId::new(), AuthorityId::new());
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date");
        let rows = vec![
            Status::new(item, ra, RegistrationState::Incomplete, date),
            Status::new(item, ra, RegistrationState::Standard, date),
        ];
        let yaml = serde_yaml::to_string(&rows).expect("serialize rows");
        let err = serde_yaml::from_str::<StatusLedger>(&yaml).expect_err("duplicate rows");
        assert!(err.to_string().contains("duplicate status"));
    }
}
