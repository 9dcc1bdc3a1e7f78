//! The registry aggregate.
//!
//! [`Registry`] owns every record (items, vocabulary, authorities, workgroups, users and their
//! profiles, the status ledger and the role groups) and keeps them mutually consistent. Its
//! operations validate input and references but do not check permissions: that is the job of
//! [`RegistryService`](crate::RegistryService), which asks the permission evaluator before
//! calling in here.
//!
//! Registration itself (status upserts, cascading and the published-content queries) lives in
//! `registration.rs`.

use chrono::{Duration, NaiveDate};
use mdr_types::{NonEmptyText, RegistrationState};
use mdr_uuid::{AuthorityId, ItemId, StatusId, UserId, VocabularyId, WorkgroupId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::constants::{CHANGE_DETAILS_MAX_LEN, DEFAULT_STATUS_STATE, VERB_FAVOURITE_CHANGED};
use crate::error::RecordKind;
use crate::item::{Concept, ConceptKind, ItemType, VocabularyEntry, VocabularyKind};
use crate::notify::{dispatch, Notification, NotificationSink};
use crate::permissions::{self, AccessFacts, Action, Decision};
use crate::roles::{GroupOwner, OwnerKind, Permission, Role, RoleGroups};
use crate::status::{Status, StatusLedger};
use crate::validation::{validate_name, validate_username};
use crate::{
    RegistrationAuthority, RegistryError, RegistryResult, User, UserProfile, Workgroup,
};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Registry {
    #[serde(default)]
    pub(crate) items: BTreeMap<ItemId, Concept>,
    #[serde(default)]
    pub(crate) vocabulary: BTreeMap<VocabularyId, VocabularyEntry>,
    #[serde(default)]
    pub(crate) authorities: BTreeMap<AuthorityId, RegistrationAuthority>,
    #[serde(default)]
    pub(crate) workgroups: BTreeMap<WorkgroupId, Workgroup>,
    #[serde(default)]
    pub(crate) users: BTreeMap<UserId, User>,
    #[serde(default)]
    pub(crate) profiles: BTreeMap<UserId, UserProfile>,
    #[serde(default)]
    pub(crate) statuses: StatusLedger,
    #[serde(default)]
    pub(crate) groups: RoleGroups,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // USERS & PROFILES
    // ========================================================================

    /// Creates a user together with their profile.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidInput`] if the username is malformed or already taken.
    pub fn add_user(&mut self, username: &str, is_superuser: bool) -> RegistryResult<UserId> {
        let username = validate_username(username)?;
        if self.user_by_name(username.as_str()).is_some() {
            return Err(RegistryError::InvalidInput(format!(
                "username already taken: {username}"
            )));
        }
        let user = User::new(username, is_superuser);
        let id = user.id;
        self.users.insert(id, user);
        self.profiles.insert(id, UserProfile::default());
        tracing::info!(user = %id, superuser = is_superuser, "user created");
        Ok(id)
    }

    pub fn user(&self, id: UserId) -> RegistryResult<&User> {
        self.users
            .get(&id)
            .ok_or_else(|| RegistryError::not_found(RecordKind::User, id))
    }

    pub fn user_by_name(&self, username: &str) -> Option<&User> {
        self.users
            .values()
            .find(|u| u.username.as_str() == username.trim())
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn profile(&self, id: UserId) -> RegistryResult<&UserProfile> {
        self.profiles
            .get(&id)
            .ok_or_else(|| RegistryError::not_found(RecordKind::User, id))
    }

    fn profile_mut(&mut self, id: UserId) -> RegistryResult<&mut UserProfile> {
        self.profiles
            .get_mut(&id)
            .ok_or_else(|| RegistryError::not_found(RecordKind::User, id))
    }

    /// Workgroups a user works in; every workgroup for a superuser.
    pub fn my_workgroups(&self, user: UserId) -> RegistryResult<Vec<WorkgroupId>> {
        if self.user(user)?.is_superuser {
            return Ok(self.workgroups.keys().copied().collect());
        }
        Ok(self.profile(user)?.workgroups.iter().copied().collect())
    }

    /// The saved active workgroup, falling back to the user's first workgroup.
    pub fn active_workgroup(&self, user: UserId) -> RegistryResult<Option<WorkgroupId>> {
        let profile = self.profile(user)?;
        if let Some(saved) = profile.saved_active_workgroup {
            return Ok(Some(saved));
        }
        Ok(self.my_workgroups(user)?.into_iter().next())
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidInput`] if the user is not a member of `workgroup`.
    pub fn set_active_workgroup(
        &mut self,
        user: UserId,
        workgroup: WorkgroupId,
    ) -> RegistryResult<()> {
        self.workgroup(workgroup)?;
        let is_superuser = self.user(user)?.is_superuser;
        let profile = self.profile_mut(user)?;
        if !is_superuser && !profile.is_member(workgroup) {
            return Err(RegistryError::InvalidInput(
                "the active workgroup must be one of the user's workgroups".into(),
            ));
        }
        profile.saved_active_workgroup = Some(workgroup);
        Ok(())
    }

    /// Authorities in which the user is a registrar; every authority for a superuser.
    pub fn registrar_authorities(&self, user: UserId) -> RegistryResult<Vec<AuthorityId>> {
        if self.user(user)?.is_superuser {
            return Ok(self.authorities.keys().copied().collect());
        }
        Ok(self
            .profile(user)?
            .registration_authorities
            .iter()
            .copied()
            .filter(|&ra| {
                self.groups
                    .permissions_of(ra.into(), user)
                    .contains(&Permission::Promote)
            })
            .collect())
    }

    pub fn is_registrar(&self, user: UserId) -> RegistryResult<bool> {
        Ok(!self.registrar_authorities(user)?.is_empty())
    }

    pub fn is_workgroup_manager(&self, user: UserId, workgroup: WorkgroupId) -> RegistryResult<bool> {
        Ok(self.user(user)?.is_superuser
            || self.groups.has_role(workgroup.into(), Role::Manager, user))
    }

    /// Flips `item` in the user's favourites. Returns `true` if it is now a favourite.
    pub fn toggle_favourite(&mut self, user: UserId, item: ItemId) -> RegistryResult<bool> {
        self.item(item)?;
        Ok(self.profile_mut(user)?.toggle_favourite(item))
    }

    /// Users who have favourited `item`.
    pub fn favourited_by(&self, item: ItemId) -> Vec<UserId> {
        self.profiles
            .iter()
            .filter(|(_, p)| p.is_favourite(item))
            .map(|(&id, _)| id)
            .collect()
    }

    // ========================================================================
    // REGISTRATION AUTHORITIES
    // ========================================================================

    /// Creates an authority and provisions its role groups.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidInput`] if the name is invalid or already used.
    pub fn add_authority(
        &mut self,
        name: &str,
        locked_state: RegistrationState,
        public_state: RegistrationState,
    ) -> RegistryResult<AuthorityId> {
        let name = validate_name(name)?;
        self.ensure_authority_name_free(&name, None)?;
        let ra = RegistrationAuthority::new(name, locked_state, public_state);
        let id = ra.id;
        self.authorities.insert(id, ra);
        self.groups.provision(id.into());
        tracing::info!(authority = %id, "registration authority created");
        Ok(id)
    }

    pub fn authority(&self, id: AuthorityId) -> RegistryResult<&RegistrationAuthority> {
        self.authorities
            .get(&id)
            .ok_or_else(|| RegistryError::not_found(RecordKind::Authority, id))
    }

    fn authority_mut(&mut self, id: AuthorityId) -> RegistryResult<&mut RegistrationAuthority> {
        self.authorities
            .get_mut(&id)
            .ok_or_else(|| RegistryError::not_found(RecordKind::Authority, id))
    }

    pub fn authority_by_name(&self, name: &str) -> Option<&RegistrationAuthority> {
        self.authorities
            .values()
            .find(|ra| ra.name.as_str() == name.trim())
    }

    pub fn authorities(&self) -> impl Iterator<Item = &RegistrationAuthority> {
        self.authorities.values()
    }

    /// Renames an authority. Role group names and permission codenames follow automatically.
    pub fn rename_authority(&mut self, id: AuthorityId, name: &str) -> RegistryResult<()> {
        let name = validate_name(name)?;
        self.ensure_authority_name_free(&name, Some(id))?;
        let ra = self.authority_mut(id)?;
        tracing::info!(authority = %id, from = %ra.name, to = %name, "registration authority renamed");
        ra.name = name;
        ra.modified = chrono::Utc::now();
        Ok(())
    }

    pub fn set_authority_thresholds(
        &mut self,
        id: AuthorityId,
        locked_state: RegistrationState,
        public_state: RegistrationState,
    ) -> RegistryResult<()> {
        let ra = self.authority_mut(id)?;
        ra.locked_state = locked_state;
        ra.public_state = public_state;
        ra.modified = chrono::Utc::now();
        Ok(())
    }

    pub fn set_state_description(
        &mut self,
        id: AuthorityId,
        state: RegistrationState,
        description: &str,
    ) -> RegistryResult<()> {
        let ra = self.authority_mut(id)?;
        ra.state_descriptions
            .insert(state, description.trim().to_string());
        ra.modified = chrono::Utc::now();
        Ok(())
    }

    /// Workgroups that submit content to `authority`.
    pub fn authority_workgroups(&self, authority: AuthorityId) -> Vec<&Workgroup> {
        self.workgroups
            .values()
            .filter(|wg| wg.authorities.contains(&authority))
            .collect()
    }

    fn ensure_authority_name_free(
        &self,
        name: &NonEmptyText,
        except: Option<AuthorityId>,
    ) -> RegistryResult<()> {
        match self.authority_by_name(name.as_str()) {
            Some(other) if Some(other.id) != except => Err(RegistryError::InvalidInput(format!(
                "a registration authority named \"{name}\" already exists"
            ))),
            _ => Ok(()),
        }
    }

    // ========================================================================
    // WORKGROUPS
    // ========================================================================

    /// Creates a workgroup and provisions its role groups.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidInput`] if the name is invalid or already used.
    pub fn add_workgroup(&mut self, name: &str) -> RegistryResult<WorkgroupId> {
        let name = validate_name(name)?;
        self.ensure_workgroup_name_free(&name, None)?;
        let wg = Workgroup::new(name);
        let id = wg.id;
        self.workgroups.insert(id, wg);
        self.groups.provision(id.into());
        tracing::info!(workgroup = %id, "workgroup created");
        Ok(id)
    }

    pub fn workgroup(&self, id: WorkgroupId) -> RegistryResult<&Workgroup> {
        self.workgroups
            .get(&id)
            .ok_or_else(|| RegistryError::not_found(RecordKind::Workgroup, id))
    }

    fn workgroup_mut(&mut self, id: WorkgroupId) -> RegistryResult<&mut Workgroup> {
        self.workgroups
            .get_mut(&id)
            .ok_or_else(|| RegistryError::not_found(RecordKind::Workgroup, id))
    }

    pub fn workgroup_by_name(&self, name: &str) -> Option<&Workgroup> {
        self.workgroups
            .values()
            .find(|wg| wg.name.as_str() == name.trim())
    }

    pub fn workgroups(&self) -> impl Iterator<Item = &Workgroup> {
        self.workgroups.values()
    }

    /// Renames a workgroup. Role group names and permission codenames follow automatically.
    ///
    /// Validation happens before anything is changed, so a failed rename leaves every derived
    /// name as it was.
    pub fn rename_workgroup(&mut self, id: WorkgroupId, name: &str) -> RegistryResult<()> {
        let name = validate_name(name)?;
        self.ensure_workgroup_name_free(&name, Some(id))?;
        let wg = self.workgroup_mut(id)?;
        tracing::info!(workgroup = %id, from = %wg.name, to = %name, "workgroup renamed");
        wg.name = name;
        wg.modified = chrono::Utc::now();
        Ok(())
    }

    /// Associates a workgroup with an authority it submits content to.
    pub fn link_workgroup_authority(
        &mut self,
        workgroup: WorkgroupId,
        authority: AuthorityId,
    ) -> RegistryResult<()> {
        self.authority(authority)?;
        self.workgroup_mut(workgroup)?.authorities.insert(authority);
        Ok(())
    }

    pub fn set_workgroup_archived(
        &mut self,
        workgroup: WorkgroupId,
        archived: bool,
    ) -> RegistryResult<()> {
        let wg = self.workgroup_mut(workgroup)?;
        wg.archived = archived;
        wg.modified = chrono::Utc::now();
        Ok(())
    }

    /// Makes `user` a member of `workgroup` and grants the Viewer role. Idempotent.
    pub fn add_user_to_workgroup(
        &mut self,
        workgroup: WorkgroupId,
        user: UserId,
    ) -> RegistryResult<()> {
        self.workgroup(workgroup)?;
        self.profile_mut(user)?.workgroups.insert(workgroup);
        self.groups.give(workgroup.into(), Role::Viewer, user);
        tracing::debug!(%workgroup, %user, "user added to workgroup");
        Ok(())
    }

    /// Removes `user` from `workgroup` and revokes every role they held in it.
    pub fn remove_user_from_workgroup(
        &mut self,
        workgroup: WorkgroupId,
        user: UserId,
    ) -> RegistryResult<()> {
        self.workgroup(workgroup)?;
        let profile = self.profile_mut(user)?;
        profile.workgroups.remove(&workgroup);
        if profile.saved_active_workgroup == Some(workgroup) {
            profile.saved_active_workgroup = None;
        }
        let revoked = self.groups.remove_all(workgroup.into(), user);
        tracing::debug!(%workgroup, %user, ?revoked, "user removed from workgroup");
        Ok(())
    }

    /// Members of `workgroup`, in id order.
    pub fn workgroup_members(&self, workgroup: WorkgroupId) -> Vec<UserId> {
        self.profiles
            .iter()
            .filter(|(_, p)| p.is_member(workgroup))
            .map(|(&id, _)| id)
            .collect()
    }

    pub fn managers(&self, workgroup: WorkgroupId) -> BTreeSet<UserId> {
        self.groups.members(workgroup.into(), Role::Manager)
    }

    pub fn super_editors(&self, workgroup: WorkgroupId) -> BTreeSet<UserId> {
        self.groups.members(workgroup.into(), Role::SuperEditor)
    }

    pub fn editors(&self, workgroup: WorkgroupId) -> BTreeSet<UserId> {
        self.groups.members(workgroup.into(), Role::Editor)
    }

    pub fn viewers(&self, workgroup: WorkgroupId) -> BTreeSet<UserId> {
        self.groups.members(workgroup.into(), Role::Viewer)
    }

    fn ensure_workgroup_name_free(
        &self,
        name: &NonEmptyText,
        except: Option<WorkgroupId>,
    ) -> RegistryResult<()> {
        match self.workgroup_by_name(name.as_str()) {
            Some(other) if Some(other.id) != except => Err(RegistryError::InvalidInput(format!(
                "a workgroup named \"{name}\" already exists"
            ))),
            _ => Ok(()),
        }
    }

    // ========================================================================
    // ROLE GROUPS
    // ========================================================================

    /// Current name of a role group owner.
    pub fn owner_name(&self, owner: GroupOwner) -> RegistryResult<&str> {
        Ok(match owner {
            GroupOwner::Workgroup(id) => self.workgroup(id)?.name.as_str(),
            GroupOwner::Authority(id) => self.authority(id)?.name.as_str(),
        })
    }

    /// Display names of every role group owned by `owner`, e.g. `"Cancer Outcomes Editor"`.
    pub fn group_names(&self, owner: GroupOwner) -> RegistryResult<Vec<String>> {
        let owner_name = self.owner_name(owner)?;
        Ok(self
            .groups
            .groups_of(owner)
            .map(|g| g.name(owner_name))
            .collect())
    }

    /// Permission codenames held by `user` through `owner`'s role groups.
    pub fn permission_codenames(
        &self,
        owner: GroupOwner,
        user: UserId,
    ) -> RegistryResult<BTreeSet<String>> {
        let owner_name = self.owner_name(owner)?;
        Ok(self
            .groups
            .permissions_of(owner, user)
            .into_iter()
            .map(|p| p.codename(owner_name))
            .collect())
    }

    pub fn roles_of(&self, owner: GroupOwner, user: UserId) -> BTreeSet<Role> {
        self.groups.roles_of(owner, user)
    }

    pub fn role_members(&self, owner: GroupOwner, role: Role) -> BTreeSet<UserId> {
        self.groups.members(owner, role)
    }

    /// Adds `user` to the `role` group of `owner`.
    ///
    /// A role name the owner does not declare is a caller bug but not an error: it is logged
    /// and nothing changes. Granting Registrar also records the authority on the user's
    /// profile.
    pub fn give_role(&mut self, owner: GroupOwner, role: &str, user: UserId) -> RegistryResult<()> {
        let Some(role) = self.resolve_role(owner, role, user)? else {
            return Ok(());
        };
        self.groups.give(owner, role, user);
        if let GroupOwner::Authority(ra) = owner {
            self.profile_mut(user)?.registration_authorities.insert(ra);
        }
        tracing::debug!(?owner, %role, %user, "role granted");
        Ok(())
    }

    /// Removes `user` from the `role` group of `owner`. Unknown roles and non-members are a
    /// no-op.
    pub fn remove_role(
        &mut self,
        owner: GroupOwner,
        role: &str,
        user: UserId,
    ) -> RegistryResult<()> {
        let Some(role) = self.resolve_role(owner, role, user)? else {
            return Ok(());
        };
        self.groups.remove(owner, role, user);
        if let GroupOwner::Authority(ra) = owner {
            if self.groups.roles_of(owner, user).is_empty() {
                self.profile_mut(user)?.registration_authorities.remove(&ra);
            }
        }
        tracing::debug!(?owner, %role, %user, "role removed");
        Ok(())
    }

    fn resolve_role(
        &self,
        owner: GroupOwner,
        role: &str,
        user: UserId,
    ) -> RegistryResult<Option<Role>> {
        let owner_name = self.owner_name(owner)?;
        self.user(user)?;
        let kind: OwnerKind = owner.kind();
        match Role::parse_for(role, kind) {
            Some(role) => Ok(Some(role)),
            None => {
                let err = RegistryError::UnknownRole {
                    owner: format!("{kind} \"{owner_name}\""),
                    role: role.to_string(),
                };
                tracing::warn!(error = %err, "ignoring role change");
                Ok(None)
            }
        }
    }

    // ========================================================================
    // VOCABULARY
    // ========================================================================

    pub fn add_vocabulary(
        &mut self,
        name: &str,
        description: &str,
        kind: VocabularyKind,
    ) -> RegistryResult<VocabularyId> {
        let name = validate_name(name)?;
        match &kind {
            VocabularyKind::UnitOfMeasure { measure, .. } => {
                let entry = self.vocabulary(*measure)?;
                if !matches!(entry.kind, VocabularyKind::Measure) {
                    return Err(RegistryError::InvalidInput(format!(
                        "\"{}\" is not a measure",
                        entry.name
                    )));
                }
            }
            VocabularyKind::GlossaryItem {
                alternate_definitions,
            } => {
                for &ra in alternate_definitions.keys() {
                    self.authority(ra)?;
                }
            }
            VocabularyKind::Measure | VocabularyKind::RepresentationClass => {}
        }
        let entry = VocabularyEntry::new(name, description.trim().to_string(), kind);
        let id = entry.id;
        self.vocabulary.insert(id, entry);
        Ok(id)
    }

    pub fn vocabulary(&self, id: VocabularyId) -> RegistryResult<&VocabularyEntry> {
        self.vocabulary
            .get(&id)
            .ok_or_else(|| RegistryError::not_found(RecordKind::Vocabulary, id))
    }

    pub fn vocabulary_entries(&self) -> impl Iterator<Item = &VocabularyEntry> {
        self.vocabulary.values()
    }

    // ========================================================================
    // ITEMS
    // ========================================================================

    /// Creates an item owned by `workgroup`.
    ///
    /// # Errors
    ///
    /// Fails if the workgroup is missing or archived, the name is invalid, or `kind`
    /// references items or vocabulary that do not exist.
    pub fn add_item(
        &mut self,
        workgroup: WorkgroupId,
        name: &str,
        description: &str,
        kind: ConceptKind,
    ) -> RegistryResult<ItemId> {
        let wg = self.workgroup(workgroup)?;
        if wg.archived {
            return Err(RegistryError::InvalidInput(format!(
                "workgroup \"{}\" is archived",
                wg.name
            )));
        }
        let name = validate_name(name)?;
        self.check_references(&kind)?;
        let item = Concept::new(name, description.trim().to_string(), workgroup, kind);
        let id = item.id;
        tracing::info!(item = %id, kind = %item.item_type(), %workgroup, "item created");
        self.items.insert(id, item);
        Ok(id)
    }

    pub fn item(&self, id: ItemId) -> RegistryResult<&Concept> {
        self.items
            .get(&id)
            .ok_or_else(|| RegistryError::not_found(RecordKind::Item, id))
    }

    pub fn item_by_name(&self, name: &str) -> Option<&Concept> {
        self.items.values().find(|i| i.name.as_str() == name.trim())
    }

    pub fn items(&self) -> impl Iterator<Item = &Concept> {
        self.items.values()
    }

    pub fn items_in_workgroup(&self, workgroup: WorkgroupId) -> Vec<&Concept> {
        self.items
            .values()
            .filter(|i| i.workgroup == workgroup)
            .collect()
    }

    /// Stores a modified copy of an existing item and notifies everyone who favourited it.
    ///
    /// # Errors
    ///
    /// Fails if the item does not exist, its workgroup does not exist or it references
    /// missing records. The stored item is unchanged on error.
    pub fn save_item(
        &mut self,
        mut item: Concept,
        actor: Option<UserId>,
        sink: &dyn NotificationSink,
    ) -> RegistryResult<()> {
        let existing = self.item(item.id)?;
        item.created = existing.created;
        self.workgroup(item.workgroup)?;
        self.check_references(&item.kind)?;
        if let Some(newer) = item.superseded_by {
            self.check_supersession(item.id, newer)?;
        }
        item.touch();
        let id = item.id;
        self.items.insert(id, item);
        tracing::debug!(item = %id, "item saved");

        for recipient in self.favourited_by(id) {
            dispatch(
                sink,
                &Notification {
                    recipient,
                    actor,
                    verb: VERB_FAVOURITE_CHANGED.to_string(),
                    target: id,
                    description: None,
                },
            );
        }
        Ok(())
    }

    /// Applies `change` to a copy of the item and saves it.
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryError::InvalidInput`] if `change` alters the item's id.
    pub fn update_item<F>(
        &mut self,
        id: ItemId,
        actor: Option<UserId>,
        sink: &dyn NotificationSink,
        change: F,
    ) -> RegistryResult<()>
    where
        F: FnOnce(&mut Concept) -> RegistryResult<()>,
    {
        let mut item = self.item(id)?.clone();
        change(&mut item)?;
        if item.id != id {
            return Err(RegistryError::InvalidInput(format!(
                "item {id} cannot be given a different id"
            )));
        }
        self.save_item(item, actor, sink)
    }

    /// Points a reference field of `id` at another item or a vocabulary entry.
    ///
    /// `target` is looked up among items first and vocabulary second.
    pub fn link(
        &mut self,
        id: ItemId,
        field: &str,
        target: &str,
        actor: Option<UserId>,
        sink: &dyn NotificationSink,
    ) -> RegistryResult<()> {
        if let Ok(target) = target.parse::<ItemId>() {
            let target_type = self.items.get(&target).map(Concept::item_type);
            if let Some(target_type) = target_type {
                return self.update_item(id, actor, sink, |item| {
                    item.kind.link_item(field, target, target_type)
                });
            }
        }
        if let Ok(target) = target.parse::<VocabularyId>() {
            if self.vocabulary(target).is_ok() {
                return self.update_item(id, actor, sink, |item| {
                    item.kind.link_vocabulary(field, target)
                });
            }
        }
        Err(RegistryError::not_found(RecordKind::Item, target))
    }

    /// Marks `old` as superseded by `newer`.
    pub fn supersede(
        &mut self,
        old: ItemId,
        newer: ItemId,
        actor: Option<UserId>,
        sink: &dyn NotificationSink,
    ) -> RegistryResult<()> {
        self.update_item(old, actor, sink, |item| {
            item.superseded_by = Some(newer);
            Ok(())
        })
    }

    /// Items that `id` supersedes.
    pub fn supersedes(&self, id: ItemId) -> Vec<ItemId> {
        self.items
            .values()
            .filter(|i| i.superseded_by == Some(id))
            .map(|i| i.id)
            .collect()
    }

    pub fn mark_ready_for_review(
        &mut self,
        id: ItemId,
        actor: Option<UserId>,
        sink: &dyn NotificationSink,
    ) -> RegistryResult<()> {
        self.update_item(id, actor, sink, |item| {
            item.ready_to_review = true;
            Ok(())
        })
    }

    /// Items built on `id` that `user` may view.
    ///
    /// For an object class these are the data element concepts that use it; every other
    /// variant has no related items.
    pub fn related_items(&self, id: ItemId, user: UserId) -> RegistryResult<Vec<ItemId>> {
        if self.item(id)?.item_type() != ItemType::ObjectClass {
            return Ok(Vec::new());
        }
        let mut related = Vec::new();
        for other in self.items.values() {
            let uses = matches!(
                &other.kind,
                ConceptKind::DataElementConcept(dec) if dec.object_class == Some(id)
            );
            if uses && self.can_view(user, other.id)? {
                related.push(other.id);
            }
        }
        Ok(related)
    }

    /// Whether `id` was modified within the configured recent-change window.
    pub fn was_modified_recently(&self, id: ItemId, window: Duration) -> RegistryResult<bool> {
        Ok(self.item(id)?.was_modified_recently(window))
    }

    fn check_references(&self, kind: &ConceptKind) -> RegistryResult<()> {
        for id in kind.referenced_items() {
            self.item(id)?;
        }
        for id in kind.referenced_vocabulary() {
            self.vocabulary(id)?;
        }
        Ok(())
    }

    fn check_supersession(&self, old: ItemId, newer: ItemId) -> RegistryResult<()> {
        if old == newer {
            return Err(RegistryError::InvalidInput(
                "an item cannot supersede itself".into(),
            ));
        }
        self.item(newer).map(|_| ())
    }

    // ========================================================================
    // STATUS LEDGER
    // ========================================================================

    pub fn statuses(&self) -> &StatusLedger {
        &self.statuses
    }

    pub fn status(&self, item: ItemId, authority: AuthorityId) -> Option<&Status> {
        self.statuses.get(item, authority)
    }

    pub fn statuses_for_item(&self, item: ItemId) -> Vec<&Status> {
        self.statuses.for_item(item).collect()
    }

    /// Adds a status row directly, outside the upsert path.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Conflict`] naming the item and authority if the pair already
    /// has a status.
    pub fn insert_status(
        &mut self,
        item: ItemId,
        authority: AuthorityId,
        state: Option<RegistrationState>,
        registration_date: NaiveDate,
        change_details: &str,
    ) -> RegistryResult<StatusId> {
        let item_name = self.item(item)?.name.to_string();
        let authority_name = self.authority(authority)?.name.to_string();
        let change_details = validate_change_details(change_details)?;

        let mut status = Status::new(
            item,
            authority,
            state.unwrap_or(DEFAULT_STATUS_STATE),
            registration_date,
        );
        status.change_details = change_details;
        let id = status.id;
        self.statuses
            .insert(status)
            .map_err(|_| RegistryError::Conflict {
                item: item_name,
                authority: authority_name,
            })?;
        Ok(id)
    }

    /// Human-readable summary, e.g. `"Person is Standard for Standards Council"`.
    pub fn describe_status(&self, status: &Status) -> RegistryResult<String> {
        Ok(format!(
            "{} is {} for {}",
            self.item(status.item)?.name,
            status.state.label(),
            self.authority(status.authority)?.name
        ))
    }

    /// True when the item has at least one status.
    pub fn is_registered(&self, item: ItemId) -> bool {
        self.statuses.for_item(item).next().is_some()
    }

    /// True when any of the item's statuses meets its authority's public threshold.
    pub fn is_public(&self, item: ItemId) -> bool {
        self.any_status_meets(item, |ra| ra.public_state)
    }

    /// True when any of the item's statuses meets its authority's locked threshold.
    pub fn is_locked(&self, item: ItemId) -> bool {
        self.any_status_meets(item, |ra| ra.locked_state)
    }

    fn any_status_meets<F>(&self, item: ItemId, threshold: F) -> bool
    where
        F: Fn(&RegistrationAuthority) -> RegistrationState,
    {
        self.statuses.for_item(item).any(|s| {
            self.authorities
                .get(&s.authority)
                .is_some_and(|ra| s.state.meets(threshold(ra)))
        })
    }

    /// Items an anonymous caller may view.
    pub fn public_items(&self) -> Vec<&Concept> {
        self.items
            .values()
            .filter(|i| permissions::allows(Action::View, &self.anonymous_facts(i)))
            .collect()
    }

    pub fn visible_items(&self, user: UserId) -> RegistryResult<Vec<&Concept>> {
        let mut visible = Vec::new();
        for item in self.items.values() {
            if self.can_view(user, item.id)? {
                visible.push(item);
            }
        }
        Ok(visible)
    }

    // ========================================================================
    // PERMISSIONS
    // ========================================================================

    /// Facts about `user` and `item` for the permission evaluator.
    ///
    /// `authority` selects the authority for status changes. Without one, the user's
    /// permissions are collected across every authority tied to the item through its statuses
    /// or its workgroup.
    pub fn item_access_facts(
        &self,
        user: UserId,
        item: ItemId,
        authority: Option<AuthorityId>,
    ) -> RegistryResult<AccessFacts> {
        let actor = self.user(user)?;
        let concept = self.item(item)?;
        let authority_permissions = match authority {
            Some(ra) => {
                self.authority(ra)?;
                self.groups.permissions_of(ra.into(), user)
            }
            None => self
                .statuses
                .for_item(item)
                .map(|s| s.authority)
                .chain(self.workgroup(concept.workgroup)?.authorities.iter().copied())
                .flat_map(|ra| self.groups.permissions_of(ra.into(), user))
                .collect(),
        };
        Ok(AccessFacts {
            is_superuser: actor.is_superuser,
            item_public: self.is_public(item),
            item_locked: self.is_locked(item),
            workgroup_permissions: self.groups.permissions_of(concept.workgroup.into(), user),
            authority_permissions,
        })
    }

    /// Facts about `item` for a caller without an account: only the item's own state counts.
    pub fn anonymous_access_facts(&self, item: ItemId) -> RegistryResult<AccessFacts> {
        Ok(self.anonymous_facts(self.item(item)?))
    }

    fn anonymous_facts(&self, item: &Concept) -> AccessFacts {
        AccessFacts {
            item_public: self.is_public(item.id),
            item_locked: self.is_locked(item.id),
            ..AccessFacts::default()
        }
    }

    /// Facts about `user` and a workgroup, for creating content or administrating it.
    pub fn workgroup_access_facts(
        &self,
        user: UserId,
        workgroup: WorkgroupId,
    ) -> RegistryResult<AccessFacts> {
        let actor = self.user(user)?;
        self.workgroup(workgroup)?;
        Ok(AccessFacts {
            is_superuser: actor.is_superuser,
            workgroup_permissions: self.groups.permissions_of(workgroup.into(), user),
            ..AccessFacts::default()
        })
    }

    /// Evaluates `action` by `user` on `item`.
    pub fn decide(
        &self,
        user: UserId,
        action: Action,
        item: ItemId,
        authority: Option<AuthorityId>,
    ) -> RegistryResult<Decision> {
        let facts = self.item_access_facts(user, item, authority)?;
        Ok(permissions::evaluate(action, &facts))
    }

    /// Evaluates `action` on `item` for `user`, or for an anonymous caller when `user` is
    /// `None`.
    pub fn decide_for(
        &self,
        user: Option<UserId>,
        action: Action,
        item: ItemId,
        authority: Option<AuthorityId>,
    ) -> RegistryResult<Decision> {
        match user {
            Some(user) => self.decide(user, action, item, authority),
            None => Ok(permissions::evaluate(
                action,
                &self.anonymous_access_facts(item)?,
            )),
        }
    }

    pub fn can_view(&self, user: UserId, item: ItemId) -> RegistryResult<bool> {
        Ok(self.decide(user, Action::View, item, None)?.allowed)
    }

    pub fn can_edit(&self, user: UserId, item: ItemId) -> RegistryResult<bool> {
        Ok(self.decide(user, Action::Edit, item, None)?.allowed)
    }

    /// Whether `user` may change the status of `item` in `authority`.
    pub fn can_change_status(
        &self,
        user: UserId,
        item: ItemId,
        authority: AuthorityId,
    ) -> RegistryResult<bool> {
        Ok(self
            .decide(user, Action::ChangeStatus, item, Some(authority))?
            .allowed)
    }

    /// Whether `user` may register `item` in some authority tied to it.
    pub fn can_register(&self, user: UserId, item: ItemId) -> RegistryResult<bool> {
        Ok(self.decide(user, Action::ChangeStatus, item, None)?.allowed)
    }

    pub fn can_request_review(&self, user: UserId, item: ItemId) -> RegistryResult<bool> {
        Ok(self.decide(user, Action::RequestReview, item, None)?.allowed)
    }

    pub fn can_create_in(&self, user: UserId, workgroup: WorkgroupId) -> RegistryResult<bool> {
        let facts = self.workgroup_access_facts(user, workgroup)?;
        Ok(permissions::allows(Action::Create, &facts))
    }

    pub fn can_administrate(&self, user: UserId, workgroup: WorkgroupId) -> RegistryResult<bool> {
        let facts = self.workgroup_access_facts(user, workgroup)?;
        Ok(permissions::allows(Action::Administrate, &facts))
    }

    pub fn item_type(&self, id: ItemId) -> RegistryResult<ItemType> {
        Ok(self.item(id)?.item_type())
    }
}

pub(crate) fn validate_change_details(details: &str) -> RegistryResult<String> {
    let details = details.trim();
    let len = details.chars().count();
    if len > CHANGE_DETAILS_MAX_LEN {
        return Err(RegistryError::InvalidInput(format!(
            "change details exceed {CHANGE_DETAILS_MAX_LEN} characters (got {len})"
        )));
    }
    Ok(details.to_string())
}
