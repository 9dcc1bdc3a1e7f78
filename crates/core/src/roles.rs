//! Roles, permissions and role groups.
//!
//! Every workgroup and registration authority owns one group per role it declares. A group is
//! keyed by its owner's id and the role, never by name, so renaming the owner cannot leave a
//! group behind: the display name (`"<owner> <Role>"`) and the permission codenames
//! (`"<permission>_in_<owner>"`) are derived from the owner's current name whenever they are
//! read.

use mdr_uuid::{AuthorityId, UserId, WorkgroupId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::{fmt, str::FromStr};

/// Fine-grained capability granted by a role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    View,
    Create,
    EditUnlocked,
    EditLocked,
    Register,
    Administrate,
    Promote,
    ExtractDictionary,
    ManageDictionary,
    ViewRegistered,
}

impl Permission {
    pub fn key(self) -> &'static str {
        match self {
            Permission::View => "view",
            Permission::Create => "create",
            Permission::EditUnlocked => "edit_unlocked",
            Permission::EditLocked => "edit_locked",
            Permission::Register => "register",
            Permission::Administrate => "admin",
            Permission::Promote => "promote",
            Permission::ExtractDictionary => "extract_dict",
            Permission::ManageDictionary => "manage_dict",
            Permission::ViewRegistered => "view_registered",
        }
    }

    /// Human-readable name of this permission scoped to an owner.
    pub fn display_name(self, owner_name: &str) -> String {
        match self {
            Permission::View => format!("View content in workgroup {owner_name}"),
            Permission::Create => format!("Create content in workgroup {owner_name}"),
            Permission::EditUnlocked => format!("Edit Unlocked content in workgroup {owner_name}"),
            Permission::EditLocked => format!("Edit LOCKED content in workgroup {owner_name}"),
            Permission::Register => format!("Register content in workgroup {owner_name}"),
            Permission::Administrate => format!("Administrate workgroup {owner_name}"),
            Permission::Promote => format!("Promote content for {owner_name}"),
            Permission::ExtractDictionary => format!("Extract dictionary for {owner_name}"),
            Permission::ManageDictionary => format!("Manage dictionary for {owner_name}"),
            Permission::ViewRegistered => format!("View registered content for {owner_name}"),
        }
    }

    /// Codename of this permission scoped to an owner, e.g. `edit_unlocked_in_cancer_outcomes`.
    pub fn codename(self, owner_name: &str) -> String {
        format!("{}_in_{}", self.key(), slug(owner_name))
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

fn slug(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Whether an owner is a workgroup or a registration authority.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OwnerKind {
    Workgroup,
    Authority,
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OwnerKind::Workgroup => "workgroup",
            OwnerKind::Authority => "registration authority",
        })
    }
}

/// A named bundle of permissions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Editor,
    SuperEditor,
    Manager,
    Registrar,
}

impl Role {
    pub const WORKGROUP_ROLES: [Role; 4] =
        [Role::Viewer, Role::Editor, Role::SuperEditor, Role::Manager];
    pub const AUTHORITY_ROLES: [Role; 1] = [Role::Registrar];

    /// Roles declared by owners of `kind`.
    pub fn declared_by(kind: OwnerKind) -> &'static [Role] {
        match kind {
            OwnerKind::Workgroup => &Self::WORKGROUP_ROLES,
            OwnerKind::Authority => &Self::AUTHORITY_ROLES,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Viewer => "Viewer",
            Role::Editor => "Editor",
            Role::SuperEditor => "Super-Editor",
            Role::Manager => "Manager",
            Role::Registrar => "Registrar",
        }
    }

    /// Permissions held by members of this role.
    ///
    /// Viewer, Editor and Super-Editor are strict supersets in that order. Manager is purely
    /// administrative and grants no content permissions.
    pub fn permissions(self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Role::Viewer => &[View],
            Role::Editor => &[View, Create, EditUnlocked, Register],
            Role::SuperEditor => &[View, Create, EditUnlocked, EditLocked, Register],
            Role::Manager => &[Administrate],
            Role::Registrar => &[ExtractDictionary, ManageDictionary, Promote, ViewRegistered],
        }
    }

    /// Parses a role name as used by `giveRole`/`removeRole` callers.
    ///
    /// Matching ignores case, spaces, hyphens and underscores. Returns `None` for names that
    /// are not roles at all, or that are not declared by owners of `kind`.
    pub fn parse_for(name: &str, kind: OwnerKind) -> Option<Role> {
        let role = name.parse::<Role>().ok()?;
        Role::declared_by(kind).contains(&role).then_some(role)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        match folded.as_str() {
            "viewer" => Ok(Role::Viewer),
            "editor" => Ok(Role::Editor),
            "supereditor" => Ok(Role::SuperEditor),
            "manager" => Ok(Role::Manager),
            "registrar" => Ok(Role::Registrar),
            _ => Err(s.to_string()),
        }
    }
}

/// Entity that owns a role group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOwner {
    Workgroup(WorkgroupId),
    Authority(AuthorityId),
}

impl GroupOwner {
    pub fn kind(self) -> OwnerKind {
        match self {
            GroupOwner::Workgroup(_) => OwnerKind::Workgroup,
            GroupOwner::Authority(_) => OwnerKind::Authority,
        }
    }
}

impl From<WorkgroupId> for GroupOwner {
    fn from(id: WorkgroupId) -> Self {
        GroupOwner::Workgroup(id)
    }
}

impl From<AuthorityId> for GroupOwner {
    fn from(id: AuthorityId) -> Self {
        GroupOwner::Authority(id)
    }
}

/// Members of one role within one owner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGroup {
    pub owner: GroupOwner,
    pub role: Role,
    #[serde(default)]
    pub members: BTreeSet<UserId>,
}

impl RoleGroup {
    /// Display name, e.g. `"Cancer Outcomes Super-Editor"`.
    pub fn name(&self, owner_name: &str) -> String {
        format!("{} {}", owner_name, self.role.label())
    }

    /// Permission codenames granted by this group.
    pub fn codenames(&self, owner_name: &str) -> Vec<String> {
        self.role
            .permissions()
            .iter()
            .map(|p| p.codename(owner_name))
            .collect()
    }
}

/// Every role group in the registry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleGroups {
    groups: Vec<RoleGroup>,
}

impl RoleGroups {
    /// Creates the empty groups declared by `owner`'s kind. Existing groups are kept.
    pub fn provision(&mut self, owner: GroupOwner) {
        for &role in Role::declared_by(owner.kind()) {
            self.group_mut(owner, role);
        }
    }

    pub fn groups_of(&self, owner: GroupOwner) -> impl Iterator<Item = &RoleGroup> {
        self.groups.iter().filter(move |g| g.owner == owner)
    }

    pub fn members(&self, owner: GroupOwner, role: Role) -> BTreeSet<UserId> {
        self.groups
            .iter()
            .find(|g| g.owner == owner && g.role == role)
            .map(|g| g.members.clone())
            .unwrap_or_default()
    }

    /// Adds `user` to the group. Returns `true` if the user was not already a member.
    pub fn give(&mut self, owner: GroupOwner, role: Role, user: UserId) -> bool {
        self.group_mut(owner, role).members.insert(user)
    }

    /// Removes `user` from the group. Returns `true` if the user was a member.
    pub fn remove(&mut self, owner: GroupOwner, role: Role, user: UserId) -> bool {
        self.groups
            .iter_mut()
            .filter(|g| g.owner == owner && g.role == role)
            .any(|g| g.members.remove(&user))
    }

    /// Removes `user` from every group of `owner`. Returns the roles actually revoked.
    pub fn remove_all(&mut self, owner: GroupOwner, user: UserId) -> Vec<Role> {
        self.groups
            .iter_mut()
            .filter(|g| g.owner == owner)
            .filter_map(|g| g.members.remove(&user).then_some(g.role))
            .collect()
    }

    pub fn has_role(&self, owner: GroupOwner, role: Role, user: UserId) -> bool {
        self.groups
            .iter()
            .any(|g| g.owner == owner && g.role == role && g.members.contains(&user))
    }

    /// Roles `user` holds in `owner`.
    pub fn roles_of(&self, owner: GroupOwner, user: UserId) -> BTreeSet<Role> {
        self.groups
            .iter()
            .filter(|g| g.owner == owner && g.members.contains(&user))
            .map(|g| g.role)
            .collect()
    }

    /// Union of the permissions of every role `user` holds in `owner`.
    pub fn permissions_of(&self, owner: GroupOwner, user: UserId) -> BTreeSet<Permission> {
        self.roles_of(owner, user)
            .into_iter()
            .flat_map(|r| r.permissions().iter().copied())
            .collect()
    }

    fn group_mut(&mut self, owner: GroupOwner, role: Role) -> &mut RoleGroup {
        let idx = match self
            .groups
            .iter()
            .position(|g| g.owner == owner && g.role == role)
        {
            Some(idx) => idx,
            None => {
                self.groups.push(RoleGroup {
                    owner,
                    role,
                    members: BTreeSet::new(),
                });
                self.groups.len() - 1
            }
        };
        &mut self.groups[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_roles_are_supersets() {
        let viewer: BTreeSet<_> = Role::Viewer.permissions().iter().collect();
        let editor: BTreeSet<_> = Role::Editor.permissions().iter().collect();
        let super_editor: BTreeSet<_> = Role::SuperEditor.permissions().iter().collect();
        assert!(viewer.is_subset(&editor) && viewer != editor);
        assert!(editor.is_subset(&super_editor) && editor != super_editor);
        assert!(!Role::Manager.permissions().contains(&Permission::View));
    }

    #[test]
    fn test_parse_role_for_owner_kind() {
        assert_eq!(
            Role::parse_for("Super-Editor", OwnerKind::Workgroup),
            Some(Role::SuperEditor)
        );
        assert_eq!(
            Role::parse_for("super_editor", OwnerKind::Workgroup),
            Some(Role::SuperEditor)
        );
        assert_eq!(
            Role::parse_for("registrar", OwnerKind::Authority),
            Some(Role::Registrar)
        );
        assert_eq!(Role::parse_for("registrar", OwnerKind::Workgroup), None);
        assert_eq!(Role::parse_for("janitor", OwnerKind::Workgroup), None);
    }

    #[test]
    fn test_give_and_remove_union_permissions() {
        let wg = GroupOwner::Workgroup(WorkgroupId::new());
        let user = UserId::new();
        let mut groups = RoleGroups::default();
        groups.provision(wg);
        assert_eq!(groups.groups_of(wg).count(), 4);

        assert!(groups.give(wg, Role::Viewer, user));
        assert!(!groups.give(wg, Role::Viewer, user));
        groups.give(wg, Role::Manager, user);

        let perms = groups.permissions_of(wg, user);
        assert!(perms.contains(&Permission::View));
        assert!(perms.contains(&Permission::Administrate));
        assert!(!perms.contains(&Permission::Create));

        let revoked = groups.remove_all(wg, user);
        assert_eq!(revoked, vec![Role::Viewer, Role::Manager]);
        assert!(groups.roles_of(wg, user).is_empty());
        assert!(!groups.remove(wg, Role::Editor, user));
    }

    #[test]
    fn test_derived_names_and_codenames() {
        let group = RoleGroup {
            owner: GroupOwner::Workgroup(WorkgroupId::new()),
            role: Role::SuperEditor,
            members: BTreeSet::new(),
        };
        assert_eq!(group.name("Cancer Outcomes"), "Cancer Outcomes Super-Editor");
        assert_eq!(
            Permission::EditLocked.display_name("Cancer Outcomes"),
            "Edit LOCKED content in workgroup Cancer Outcomes"
        );
        assert!(group
            .codenames("Cancer Outcomes")
            .contains(&"edit_locked_in_cancer_outcomes".to_string()));
    }
}
