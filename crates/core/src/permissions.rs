//! The permission evaluator.
//!
//! Authorization is a pure function of an [`Action`] and the [`AccessFacts`] gathered about the
//! acting user and the item. The rules live in one table ([`requirements`]): an action is
//! allowed when the user is a superuser or when any one of the action's requirements holds.
//! Cascading registration, the CLI and the REST API all go through [`evaluate`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::{fmt, str::FromStr};

use crate::roles::Permission;
use crate::RegistryError;

/// Something a user may attempt on an item, workgroup or authority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    View,
    Create,
    Edit,
    /// Register the item, or change its registration state, in a given authority.
    ChangeStatus,
    /// Mark the item as ready for review by a registrar.
    RequestReview,
    Administrate,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::View,
        Action::Create,
        Action::Edit,
        Action::ChangeStatus,
        Action::RequestReview,
        Action::Administrate,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Edit => "edit",
            Action::ChangeStatus => "change_status",
            Action::RequestReview => "request_review",
            Action::Administrate => "administrate",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Action {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded = s.trim().to_lowercase().replace('-', "_");
        let folded = match folded.as_str() {
            "register" => "change_status",
            other => other,
        };
        Action::ALL
            .into_iter()
            .find(|a| a.key() == folded)
            .ok_or_else(|| RegistryError::InvalidInput(format!("unknown action: {s}")))
    }
}

/// Everything the evaluator needs to know about one (user, target) pair.
///
/// `workgroup_permissions` are the union of the user's role permissions in the item's workgroup
/// (or the target workgroup for `Create`). `authority_permissions` are the user's permissions in
/// the authority the action concerns, if any.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessFacts {
    pub is_superuser: bool,
    pub item_public: bool,
    pub item_locked: bool,
    pub workgroup_permissions: BTreeSet<Permission>,
    pub authority_permissions: BTreeSet<Permission>,
}

/// A single condition that can satisfy an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "requirement", content = "permission")]
pub enum Requirement {
    /// The item is public in at least one authority.
    PublicItem,
    /// The user holds the permission in the workgroup.
    InWorkgroup(Permission),
    /// The item is not locked and the user holds the permission in the workgroup.
    InWorkgroupWhenUnlocked(Permission),
    /// The user holds the permission in the authority.
    InAuthority(Permission),
}

impl Requirement {
    pub fn is_met(self, facts: &AccessFacts) -> bool {
        match self {
            Requirement::PublicItem => facts.item_public,
            Requirement::InWorkgroup(p) => facts.workgroup_permissions.contains(&p),
            Requirement::InWorkgroupWhenUnlocked(p) => {
                !facts.item_locked && facts.workgroup_permissions.contains(&p)
            }
            Requirement::InAuthority(p) => facts.authority_permissions.contains(&p),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::PublicItem => write!(f, "item is public"),
            Requirement::InWorkgroup(p) => write!(f, "{p} in the workgroup"),
            Requirement::InWorkgroupWhenUnlocked(p) => {
                write!(f, "{p} in the workgroup while unlocked")
            }
            Requirement::InAuthority(p) => write!(f, "{p} in the authority"),
        }
    }
}

/// The rule table: any one requirement suffices.
pub fn requirements(action: Action) -> &'static [Requirement] {
    use Permission as P;
    use Requirement::*;
    match action {
        Action::View => &[PublicItem, InWorkgroup(P::View)],
        Action::Create => &[InWorkgroup(P::Create)],
        Action::Edit => &[
            InWorkgroupWhenUnlocked(P::EditUnlocked),
            InWorkgroup(P::EditLocked),
        ],
        Action::ChangeStatus => &[InAuthority(P::Promote)],
        Action::RequestReview => &[InWorkgroup(P::Register)],
        Action::Administrate => &[InWorkgroup(P::Administrate)],
    }
}

/// Why a decision came out the way it did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "grounds")]
pub enum Grounds {
    Superuser,
    Satisfied { requirement: Requirement },
    NoRequirementMet,
}

impl fmt::Display for Grounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grounds::Superuser => write!(f, "superuser"),
            Grounds::Satisfied { requirement } => write!(f, "{requirement}"),
            Grounds::NoRequirementMet => write!(f, "no rule matched"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub allowed: bool,
    #[serde(flatten)]
    pub grounds: Grounds,
}

/// Decides whether `action` is allowed given `facts`.
pub fn evaluate(action: Action, facts: &AccessFacts) -> Decision {
    if facts.is_superuser {
        return Decision {
            action,
            allowed: true,
            grounds: Grounds::Superuser,
        };
    }

    match requirements(action).iter().find(|r| r.is_met(facts)) {
        Some(&requirement) => Decision {
            action,
            allowed: true,
            grounds: Grounds::Satisfied { requirement },
        },
        None => Decision {
            action,
            allowed: false,
            grounds: Grounds::NoRequirementMet,
        },
    }
}

pub fn allows(action: Action, facts: &AccessFacts) -> bool {
    evaluate(action, facts).allowed
}
