//! Users and their registry profiles.

use mdr_types::NonEmptyText;
use mdr_uuid::{AuthorityId, ItemId, UserId, WorkgroupId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An account as supplied by the authentication layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct User {
    pub id: UserId,
    pub username: NonEmptyText,
    #[serde(default)]
    pub is_superuser: bool,
}

impl User {
    pub(crate) fn new(username: NonEmptyText, is_superuser: bool) -> Self {
        Self {
            id: UserId::new(),
            username,
            is_superuser,
        }
    }
}

/// Registry-specific state of one user.
///
/// Created alongside the [`User`] by `Registry::add_user`; there is exactly one per user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserProfile {
    #[serde(default)]
    pub workgroups: BTreeSet<WorkgroupId>,
    /// Authorities the user is associated with; registrar rights still come from role groups.
    #[serde(default)]
    pub registration_authorities: BTreeSet<AuthorityId>,
    #[serde(default)]
    pub saved_active_workgroup: Option<WorkgroupId>,
    /// Favourited items. Favouriting subscribes the user to change notifications.
    #[serde(default)]
    pub favourites: BTreeSet<ItemId>,
}

impl UserProfile {
    pub fn is_favourite(&self, item: ItemId) -> bool {
        self.favourites.contains(&item)
    }

    /// Adds or removes `item` from the favourites. Returns `true` if it is now a favourite.
    pub fn toggle_favourite(&mut self, item: ItemId) -> bool {
        if self.favourites.remove(&item) {
            false
        } else {
            self.favourites.insert(item);
            true
        }
    }

    pub fn is_member(&self, workgroup: WorkgroupId) -> bool {
        self.workgroups.contains(&workgroup)
    }
}
