//! ISO/IEC 11179 registration states.
//!
//! The nine states form a total order. Comparisons against an authority's public and locked
//! thresholds drive visibility and edit rules, so the numeric value of each state is part of
//! the data model and must never be reordered.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Errors raised when converting external input into a [`RegistrationState`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StateError {
    #[error("registration state value out of range (0-8): {0}")]
    OutOfRange(i64),
    #[error("unknown registration state: {0}")]
    Unknown(String),
}

/// Registration lifecycle state of an item within one registration authority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationState {
    NotProgressed = 0,
    Incomplete = 1,
    Candidate = 2,
    Recorded = 3,
    Qualified = 4,
    Standard = 5,
    Preferred = 6,
    Superseded = 7,
    Retired = 8,
}

impl RegistrationState {
    /// Every state, in ascending order.
    pub const ALL: [RegistrationState; 9] = [
        Self::NotProgressed,
        Self::Incomplete,
        Self::Candidate,
        Self::Recorded,
        Self::Qualified,
        Self::Standard,
        Self::Preferred,
        Self::Superseded,
        Self::Retired,
    ];

    /// States treated as "published" by reporting queries.
    pub const PUBLISHED: [RegistrationState; 2] = [Self::Standard, Self::Preferred];

    /// Numeric value of the state (0-8).
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Converts a numeric value into a state.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::OutOfRange`] for anything outside `0..=8`.
    pub fn from_value(value: i64) -> Result<Self, StateError> {
        usize::try_from(value)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
            .ok_or(StateError::OutOfRange(value))
    }

    /// Machine key, as used in snapshots and on the wire.
    pub fn key(self) -> &'static str {
        match self {
            Self::NotProgressed => "notprogressed",
            Self::Incomplete => "incomplete",
            Self::Candidate => "candidate",
            Self::Recorded => "recorded",
            Self::Qualified => "qualified",
            Self::Standard => "standard",
            Self::Preferred => "preferred",
            Self::Superseded => "superseded",
            Self::Retired => "retired",
        }
    }

    /// Human readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::NotProgressed => "Not Progressed",
            Self::Incomplete => "Incomplete",
            Self::Candidate => "Candidate",
            Self::Recorded => "Recorded",
            Self::Qualified => "Qualified",
            Self::Standard => "Standard",
            Self::Preferred => "Preferred Standard",
            Self::Superseded => "Superseded",
            Self::Retired => "Retired",
        }
    }

    /// True when this state is at or beyond `threshold`.
    pub fn meets(self, threshold: RegistrationState) -> bool {
        self >= threshold
    }

    /// True for Standard and Preferred Standard.
    pub fn is_published(self) -> bool {
        Self::PUBLISHED.contains(&self)
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RegistrationState {
    type Err = StateError;

    /// Accepts a numeric value, a machine key or a label.
    ///
    /// Matching ignores case, spaces, hyphens and underscores, so `"Not Progressed"`,
    /// `"not-progressed"` and `"notprogressed"` are equivalent. `"Preferred Standard"` is
    /// accepted as an alias of `preferred`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(value) = trimmed.parse::<i64>() {
            return Self::from_value(value);
        }

        let folded: String = trimmed
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();

        Self::ALL
            .into_iter()
            .find(|state| {
                state.key() == folded
                    || state.label().replace(' ', "").to_lowercase() == folded
            })
            .ok_or_else(|| StateError::Unknown(trimmed.to_string()))
    }
}

/// Obligation of a data element within a data set specification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    Optional,
    #[default]
    Conditional,
    Mandatory,
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Optional => "Optional",
            Self::Conditional => "Conditional",
            Self::Mandatory => "Mandatory",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_are_ordered_by_value() {
        for pair in RegistrationState::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0].value() + 1, pair[1].value());
        }
        assert_eq!(RegistrationState::Retired.value(), 8);
    }

    #[test]
    fn from_value_rejects_out_of_range() {
        assert_eq!(
            RegistrationState::from_value(9),
            Err(StateError::OutOfRange(9))
        );
        assert_eq!(
            RegistrationState::from_value(-1),
            Err(StateError::OutOfRange(-1))
        );
        assert_eq!(
            RegistrationState::from_value(3),
            Ok(RegistrationState::Recorded)
        );
    }

    #[test]
    fn parses_keys_labels_and_numbers() {
        let cases = [
            ("notprogressed", RegistrationState::NotProgressed),
            ("Not Progressed", RegistrationState::NotProgressed),
            ("not-progressed", RegistrationState::NotProgressed),
            ("Preferred Standard", RegistrationState::Preferred),
            ("preferred", RegistrationState::Preferred),
            ("STANDARD", RegistrationState::Standard),
            ("5", RegistrationState::Standard),
        ];
        for (input, expected) in cases {
            assert_eq!(input.parse::<RegistrationState>(), Ok(expected), "{input}");
        }
        assert!(matches!(
            "approved".parse::<RegistrationState>(),
            Err(StateError::Unknown(_))
        ));
    }

    #[test]
    fn meets_is_a_threshold_comparison() {
        use RegistrationState::*;
        assert!(Standard.meets(Recorded));
        assert!(Recorded.meets(Recorded));
        assert!(!Candidate.meets(Recorded));
        assert!(Retired.meets(Recorded));
    }

    #[test]
    fn only_standard_and_preferred_are_published() {
        let published: Vec<_> = RegistrationState::ALL
            .into_iter()
            .filter(|s| s.is_published())
            .collect();
        assert_eq!(
            published,
            vec![RegistrationState::Standard, RegistrationState::Preferred]
        );
    }

    #[test]
    fn serialises_as_machine_key() {
        let yaml = serde_yaml::to_string(&RegistrationState::NotProgressed).expect("render");
        assert_eq!(yaml.trim(), "notprogressed");
        let parsed: RegistrationState = serde_yaml::from_str("preferred").expect("parse");
        assert_eq!(parsed, RegistrationState::Preferred);
    }

    #[test]
    fn cardinality_defaults_to_conditional() {
        assert_eq!(Cardinality::default(), Cardinality::Conditional);
    }
}
