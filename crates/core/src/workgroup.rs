//! Workgroups: the unit of content ownership.
//!
//! Membership itself lives on each [`UserProfile`](crate::UserProfile); a workgroup records its
//! name and the registration authorities it submits to. Role groups are provisioned in
//! [`RoleGroups`](crate::RoleGroups) when the workgroup is created.

use chrono::{DateTime, Utc};
use mdr_types::NonEmptyText;
use mdr_uuid::{AuthorityId, WorkgroupId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Workgroup {
    pub id: WorkgroupId,
    pub name: NonEmptyText,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub authorities: BTreeSet<AuthorityId>,
    /// Archived workgroups keep their content but accept no new items.
    #[serde(default)]
    pub archived: bool,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Workgroup {
    pub(crate) fn new(name: NonEmptyText) -> Self {
        let now = Utc::now();
        Self {
            id: WorkgroupId::new(),
            name,
            description: String::new(),
            authorities: BTreeSet::new(),
            archived: false,
            created: now,
            modified: now,
        }
    }
}
