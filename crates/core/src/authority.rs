//! Registration authorities.

use chrono::{DateTime, Utc};
use mdr_types::{NonEmptyText, RegistrationState};
use mdr_uuid::AuthorityId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A governance body that assigns registration states to items.
///
/// `locked_state` and `public_state` are thresholds: an item is locked (or public) with
/// respect to this authority when its status here is at or beyond the threshold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrationAuthority {
    pub id: AuthorityId,
    pub name: NonEmptyText,
    #[serde(default)]
    pub description: String,
    pub locked_state: RegistrationState,
    pub public_state: RegistrationState,
    /// What each state means for this authority, e.g. "Approved by a simple majority".
    #[serde(default)]
    pub state_descriptions: BTreeMap<RegistrationState, String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl RegistrationAuthority {
    pub(crate) fn new(
        name: NonEmptyText,
        locked_state: RegistrationState,
        public_state: RegistrationState,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: AuthorityId::new(),
            name,
            description: String::new(),
            locked_state,
            public_state,
            state_descriptions: BTreeMap::new(),
            created: now,
            modified: now,
        }
    }

    /// Authority-specific meaning of `state`, empty when none was recorded.
    pub fn describe_state(&self, state: RegistrationState) -> &str {
        self.state_descriptions
            .get(&state)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn is_public_state(&self, state: RegistrationState) -> bool {
        state.meets(self.public_state)
    }

    pub fn is_locked_state(&self, state: RegistrationState) -> bool {
        state.meets(self.locked_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_are_inclusive_comparisons() {
        let ra = RegistrationAuthority::new(
            NonEmptyText::new("Standards Council").expect("name"),
            RegistrationState::Candidate,
            RegistrationState::Recorded,
        );
        assert!(!ra.is_public_state(RegistrationState::Candidate));
        assert!(ra.is_public_state(RegistrationState::Recorded));
        assert!(ra.is_public_state(RegistrationState::Retired));
        assert!(ra.is_locked_state(RegistrationState::Candidate));
        assert!(!ra.is_locked_state(RegistrationState::Incomplete));
    }

    #[test]
    fn test_state_descriptions_serialize_by_state_key() {
        let mut ra = RegistrationAuthority::new(
            NonEmptyText::new("Standards Council").expect("name"),
            RegistrationState::Candidate,
            RegistrationState::Recorded,
        );
        ra.state_descriptions.insert(
            RegistrationState::Standard,
            "Approved by a simple majority".into(),
        );
        let yaml = serde_yaml::to_string(&ra).expect("serialize");
        assert!(yaml.contains("standard: Approved by a simple majority"));
        let back: RegistrationAuthority = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(
            back.describe_state(RegistrationState::Standard),
            "Approved by a simple majority"
        );
        assert_eq!(back.describe_state(RegistrationState::Preferred), "");
    }
}
