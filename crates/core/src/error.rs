use mdr_types::{StateError, TextError};
use mdr_uuid::UuidError;

/// Kind of record referenced by a [`RegistryError::NotFound`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    Item,
    Vocabulary,
    Authority,
    Workgroup,
    User,
    Status,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RecordKind::Item => "item",
            RecordKind::Vocabulary => "vocabulary entry",
            RecordKind::Authority => "registration authority",
            RecordKind::Workgroup => "workgroup",
            RecordKind::User => "user",
            RecordKind::Status => "status",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(
        "This object \"{item}\" already has a status in Registration Authority \"{authority}\". Please update the existing status instead of creating a new one."
    )]
    Conflict { item: String, authority: String },

    #[error("permission denied: {user} may not {action}")]
    PermissionDenied { user: String, action: String },

    #[error("unknown role \"{role}\" for {owner}")]
    UnknownRole { owner: String, role: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid text: {0}")]
    Text(#[from] TextError),
    #[error("invalid registration state: {0}")]
    State(#[from] StateError),
    #[error("invalid identifier: {0}")]
    Identifier(#[from] UuidError),

    #[error("failed to read registry snapshot: {0}")]
    SnapshotRead(std::io::Error),
    #[error("failed to write registry snapshot: {0}")]
    SnapshotWrite(std::io::Error),
    #[error("registry snapshot schema mismatch at {path}: {message}")]
    SnapshotParse { path: String, message: String },
    #[error("failed to serialize registry snapshot: {0}")]
    SnapshotRender(serde_yaml::Error),

    #[error("notification delivery failed: {0}")]
    Notification(String),

    #[error("registry lock poisoned")]
    LockPoisoned,
}

impl RegistryError {
    pub(crate) fn not_found(kind: RecordKind, id: impl ToString) -> Self {
        RegistryError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub(crate) fn denied(user: impl ToString, action: impl ToString) -> Self {
        RegistryError::PermissionDenied {
            user: user.to_string(),
            action: action.to_string(),
        }
    }
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
