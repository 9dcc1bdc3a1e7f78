//! Constants used throughout the registry core crate.

use mdr_types::RegistrationState;

/// Maximum length (in characters) of item, workgroup and authority names.
pub const NAME_MAX_LEN: usize = 100;

/// Maximum length (in characters) of a username.
pub const USERNAME_MAX_LEN: usize = 150;

/// Maximum length (in characters) of a status row's change details.
pub const CHANGE_DETAILS_MAX_LEN: usize = 100;

/// Default snapshot file when no explicit file is configured.
pub const DEFAULT_REGISTRY_FILE: &str = "registry.yaml";

/// Snapshot format version written by this crate.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Locked threshold given to new authorities unless configured otherwise.
pub const DEFAULT_LOCKED_STATE: RegistrationState = RegistrationState::Candidate;

/// Public threshold given to new authorities unless configured otherwise.
pub const DEFAULT_PUBLIC_STATE: RegistrationState = RegistrationState::Recorded;

/// State given to a manually inserted status row when none is supplied.
pub const DEFAULT_STATUS_STATE: RegistrationState = RegistrationState::Incomplete;

/// Window used by `was_modified_recently`, in hours.
pub const DEFAULT_RECENT_CHANGE_HOURS: i64 = 24;

/// Label used for the "previous state" of an item that had no status yet.
pub const UNREGISTERED_LABEL: &str = "Unregistered";

/// Notification verb sent when a favourited item is saved.
pub const VERB_FAVOURITE_CHANGED: &str = "changed a favourited item";

/// Notification verb sent when a favourited item changes registration state.
pub const VERB_FAVOURITE_STATUS_CHANGED: &str = "changed the status of a favourite item";
