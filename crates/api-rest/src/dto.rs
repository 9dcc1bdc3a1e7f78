//! Request and response bodies.

use mdr_core::{Concept, Decision, Registry, RegistryResult, Status};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
}

/// One row of an item listing.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ItemSummary {
    pub id: String,
    pub item_type: String,
    pub name: String,
    pub workgroup: String,
}

impl From<&Concept> for ItemSummary {
    fn from(item: &Concept) -> Self {
        Self {
            id: item.id.to_string(),
            item_type: item.item_type().key().to_string(),
            name: item.name.to_string(),
            workgroup: item.workgroup.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListItemsRes {
    pub items: Vec<ItemSummary>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusRes {
    pub authority: String,
    pub authority_name: String,
    /// State key, e.g. `standard`.
    pub state: String,
    /// State label, e.g. `Preferred Standard`.
    pub state_label: String,
    pub registration_date: String,
    pub change_details: String,
}

impl StatusRes {
    pub fn build(registry: &Registry, status: &Status) -> RegistryResult<Self> {
        Ok(Self {
            authority: status.authority.to_string(),
            authority_name: registry.authority(status.authority)?.name.to_string(),
            state: status.state.key().to_string(),
            state_label: status.state_name().to_string(),
            registration_date: status.registration_date.to_string(),
            change_details: status.change_details.clone(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ItemRes {
    pub id: String,
    pub item_type: String,
    pub name: String,
    pub description: String,
    pub workgroup: String,
    pub version: String,
    pub superseded_by: Option<String>,
    pub ready_to_review: bool,
    pub statuses: Vec<StatusRes>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterReq {
    /// Registration authority ID.
    pub authority: String,
    /// State name or number, e.g. `standard` or `6`.
    pub state: String,
    /// `YYYY-MM-DD`; defaults to today.
    #[serde(default)]
    pub registration_date: Option<String>,
    #[serde(default)]
    pub cascade: bool,
    #[serde(default)]
    pub change_details: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DecisionRes {
    pub action: String,
    pub allowed: bool,
    pub grounds: String,
}

impl From<Decision> for DecisionRes {
    fn from(decision: Decision) -> Self {
        Self {
            action: decision.action.key().to_string(),
            allowed: decision.allowed,
            grounds: decision.grounds.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PermissionsRes {
    pub item: String,
    pub user: String,
    pub decisions: Vec<DecisionRes>,
}

#[derive(Debug, Deserialize)]
pub struct PermissionsQuery {
    /// Authority to evaluate status changes against.
    pub authority: Option<String>,
}

/// Body for adding a workgroup member. `user` is a username or user ID.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MemberReq {
    pub user: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RoleReq {
    pub role: String,
    pub user: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RolesRes {
    pub owner: String,
    pub user: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StandardEntry {
    pub id: String,
    pub name: String,
    pub state: String,
    pub registration_date: String,
}

impl From<&(Concept, Status)> for StandardEntry {
    fn from((item, status): &(Concept, Status)) -> Self {
        Self {
            id: item.id.to_string(),
            name: item.name.to_string(),
            state: status.state_name().to_string(),
            registration_date: status.registration_date.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StandardRes {
    pub data_set_specifications: Vec<StandardEntry>,
    pub packages: Vec<StandardEntry>,
}
