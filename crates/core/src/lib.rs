//! # MDR Core
//!
//! Core business logic for the metadata registry.
//!
//! This crate contains the registry's data model and governance rules:
//! - Registrable items (object classes, data elements, value domains, ...) and supporting
//!   vocabulary
//! - The status ledger recording each item's registration state per registration authority
//! - Registration authorities, workgroups and their role groups
//! - The permission evaluator deciding who may view, edit or register what
//! - Notification triggers for favourited items
//! - YAML snapshot persistence
//!
//! **No API concerns**: command-line parsing and HTTP serving belong in `mdr-cli` and
//! `api-rest`.

pub mod authority;
pub mod config;
pub mod constants;
pub mod error;
pub mod item;
pub mod notify;
pub mod permissions;
pub mod profile;
pub mod registration;
pub mod registry;
pub mod roles;
pub mod service;
pub mod snapshot;
pub mod status;
pub mod validation;
pub mod workgroup;

pub use authority::RegistrationAuthority;
pub use config::CoreConfig;
pub use error::{RecordKind, RegistryError, RegistryResult};
pub use item::{Concept, ConceptKind, ItemType, VocabularyEntry, VocabularyKind};
pub use notify::{MemorySink, Notification, NotificationSink, TracingSink};
pub use permissions::{AccessFacts, Action, Decision, Grounds, Requirement};
pub use profile::{User, UserProfile};
pub use registration::RegistrationRequest;
pub use registry::Registry;
pub use roles::{GroupOwner, OwnerKind, Permission, Role, RoleGroup, RoleGroups};
pub use service::RegistryService;
pub use snapshot::{MemoryStore, RegistryStore, YamlFileStore};
pub use status::{Status, StatusChange, StatusLedger};
pub use workgroup::Workgroup;

pub use mdr_types::{Cardinality, NonEmptyText, RegistrationState};
pub use mdr_uuid::{AuthorityId, ItemId, StatusId, UserId, VocabularyId, WorkgroupId};
