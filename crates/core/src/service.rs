//! Permission-checked registry operations.
//!
//! [`RegistryService`] is what the CLI and the REST API talk to. Every operation names the
//! acting user, is authorized through the permission evaluator, and on success is persisted
//! through the configured [`RegistryStore`]. Writes are applied to a working copy that replaces
//! the shared registry only once the operation and the save have both succeeded, so a failed
//! operation leaves no partial changes behind. Notifications raised by a write are held back
//! until it commits and are dropped with it otherwise.

use chrono::NaiveDate;
use mdr_types::RegistrationState;
use mdr_uuid::{AuthorityId, ItemId, UserId, WorkgroupId};
use std::sync::{Arc, RwLock};

use crate::config::CoreConfig;
use crate::item::{Concept, ConceptKind, ItemType};
use crate::notify::{dispatch, MemorySink, NotificationSink};
use crate::permissions::{Action, Decision};
use crate::registration::RegistrationRequest;
use crate::registry::Registry;
use crate::roles::GroupOwner;
use crate::snapshot::RegistryStore;
use crate::status::Status;
use crate::{RegistryError, RegistryResult};

/// Shared, permission-checked access to one registry.
#[derive(Clone)]
pub struct RegistryService {
    cfg: Arc<CoreConfig>,
    registry: Arc<RwLock<Registry>>,
    store: Arc<dyn RegistryStore>,
    sink: Arc<dyn NotificationSink>,
}

impl RegistryService {
    /// Loads the registry from `store`, starting empty if nothing is stored yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored snapshot cannot be read or parsed.
    pub fn open(
        cfg: Arc<CoreConfig>,
        store: Arc<dyn RegistryStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> RegistryResult<Self> {
        let registry = store.load_or_default()?;
        Ok(Self {
            cfg,
            registry: Arc::new(RwLock::new(registry)),
            store,
            sink,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    /// Runs a read-only query against the current registry.
    pub fn read<T>(&self, query: impl FnOnce(&Registry) -> RegistryResult<T>) -> RegistryResult<T> {
        let registry = self
            .registry
            .read()
            .map_err(|_| RegistryError::LockPoisoned)?;
        query(&registry)
    }

    /// Applies `change` to a working copy, saves it and publishes it. Notifications are
    /// delivered after the new registry is in place.
    fn write<T>(
        &self,
        change: impl FnOnce(&mut Registry, &dyn NotificationSink) -> RegistryResult<T>,
    ) -> RegistryResult<T> {
        let pending = MemorySink::new();
        let out = {
            let mut registry = self
                .registry
                .write()
                .map_err(|_| RegistryError::LockPoisoned)?;
            let mut working = registry.clone();
            let out = change(&mut working, &pending)?;
            self.store.save(&working)?;
            *registry = working;
            out
        };
        for notification in pending.drain() {
            dispatch(self.sink.as_ref(), &notification);
        }
        Ok(out)
    }

    // ========================================================================
    // USERS
    // ========================================================================

    /// Creates a user.
    ///
    /// The very first user may be created without an actor; after that only superusers may
    /// create users.
    pub fn add_user(
        &self,
        actor: Option<UserId>,
        username: &str,
        is_superuser: bool,
    ) -> RegistryResult<UserId> {
        self.write(|reg, _| {
            if reg.users().next().is_some() {
                match actor {
                    Some(actor) => require_superuser(reg, actor, "create users")?,
                    None => return Err(RegistryError::denied("anonymous", "create users")),
                }
            }
            reg.add_user(username, is_superuser)
        })
    }

    pub fn toggle_favourite(&self, actor: UserId, item: ItemId) -> RegistryResult<bool> {
        self.write(|reg, _| {
            require_item(reg, actor, Action::View, item, None)?;
            reg.toggle_favourite(actor, item)
        })
    }

    pub fn set_active_workgroup(&self, actor: UserId, workgroup: WorkgroupId) -> RegistryResult<()> {
        self.write(|reg, _| reg.set_active_workgroup(actor, workgroup))
    }

    // ========================================================================
    // AUTHORITIES & WORKGROUPS
    // ========================================================================

    /// Creates a registration authority. Unset thresholds use the configured defaults.
    pub fn add_authority(
        &self,
        actor: UserId,
        name: &str,
        locked_state: Option<RegistrationState>,
        public_state: Option<RegistrationState>,
    ) -> RegistryResult<AuthorityId> {
        let locked = locked_state.unwrap_or(self.cfg.default_locked_state());
        let public = public_state.unwrap_or(self.cfg.default_public_state());
        self.write(|reg, _| {
            require_superuser(reg, actor, "create registration authorities")?;
            reg.add_authority(name, locked, public)
        })
    }

    pub fn rename_authority(&self, actor: UserId, id: AuthorityId, name: &str) -> RegistryResult<()> {
        self.write(|reg, _| {
            require_superuser(reg, actor, "rename registration authorities")?;
            reg.rename_authority(id, name)
        })
    }

    pub fn add_workgroup(&self, actor: UserId, name: &str) -> RegistryResult<WorkgroupId> {
        self.write(|reg, _| {
            require_superuser(reg, actor, "create workgroups")?;
            reg.add_workgroup(name)
        })
    }

    pub fn rename_workgroup(&self, actor: UserId, id: WorkgroupId, name: &str) -> RegistryResult<()> {
        self.write(|reg, _| {
            require_administrator(reg, actor, id)?;
            reg.rename_workgroup(id, name)
        })
    }

    pub fn link_workgroup_authority(
        &self,
        actor: UserId,
        workgroup: WorkgroupId,
        authority: AuthorityId,
    ) -> RegistryResult<()> {
        self.write(|reg, _| {
            require_superuser(reg, actor, "link workgroups to registration authorities")?;
            reg.link_workgroup_authority(workgroup, authority)
        })
    }

    pub fn add_user_to_workgroup(
        &self,
        actor: UserId,
        workgroup: WorkgroupId,
        user: UserId,
    ) -> RegistryResult<()> {
        self.write(|reg, _| {
            require_administrator(reg, actor, workgroup)?;
            reg.add_user_to_workgroup(workgroup, user)
        })
    }

    pub fn remove_user_from_workgroup(
        &self,
        actor: UserId,
        workgroup: WorkgroupId,
        user: UserId,
    ) -> RegistryResult<()> {
        self.write(|reg, _| {
            require_administrator(reg, actor, workgroup)?;
            reg.remove_user_from_workgroup(workgroup, user)
        })
    }

    /// Grants a role. Workgroup roles need administrative rights in the workgroup; authority
    /// roles need a superuser.
    pub fn give_role(
        &self,
        actor: UserId,
        owner: GroupOwner,
        role: &str,
        user: UserId,
    ) -> RegistryResult<()> {
        self.write(|reg, _| {
            require_role_admin(reg, actor, owner)?;
            reg.give_role(owner, role, user)
        })
    }

    pub fn remove_role(
        &self,
        actor: UserId,
        owner: GroupOwner,
        role: &str,
        user: UserId,
    ) -> RegistryResult<()> {
        self.write(|reg, _| {
            require_role_admin(reg, actor, owner)?;
            reg.remove_role(owner, role, user)
        })
    }

    // ========================================================================
    // ITEMS
    // ========================================================================

    pub fn create_item(
        &self,
        actor: UserId,
        workgroup: WorkgroupId,
        item_type: ItemType,
        name: &str,
        description: &str,
    ) -> RegistryResult<ItemId> {
        self.write(|reg, _| {
            if !reg.can_create_in(actor, workgroup)? {
                return Err(denied(reg, actor, "create content in this workgroup"));
            }
            reg.add_item(workgroup, name, description, ConceptKind::empty(item_type))
        })
    }

    pub fn item(&self, actor: UserId, id: ItemId) -> RegistryResult<Concept> {
        self.item_for(Some(actor), id)
    }

    /// The item, if `actor` (or an anonymous caller when `None`) may view it.
    pub fn item_for(&self, actor: Option<UserId>, id: ItemId) -> RegistryResult<Concept> {
        self.read_item(actor, id, |reg| Ok(reg.item(id)?.clone()))
    }

    /// Runs `query` once `actor` (or an anonymous caller when `None`) is allowed to view `id`.
    pub fn read_item<T>(
        &self,
        actor: Option<UserId>,
        id: ItemId,
        query: impl FnOnce(&Registry) -> RegistryResult<T>,
    ) -> RegistryResult<T> {
        self.read(|reg| {
            require_item_for(reg, actor, Action::View, id, None)?;
            query(reg)
        })
    }

    pub fn visible_items(&self, actor: UserId) -> RegistryResult<Vec<Concept>> {
        self.visible_items_for(Some(actor))
    }

    /// Items `actor` may view; anonymous callers get the public items.
    pub fn visible_items_for(&self, actor: Option<UserId>) -> RegistryResult<Vec<Concept>> {
        self.read(|reg| {
            let items = match actor {
                Some(actor) => reg.visible_items(actor)?,
                None => reg.public_items(),
            };
            Ok(items.into_iter().cloned().collect())
        })
    }

    pub fn public_items(&self) -> RegistryResult<Vec<Concept>> {
        self.visible_items_for(None)
    }

    /// Applies `change` to an item the actor may edit.
    ///
    /// Moving the item to another workgroup needs create rights there. Marking it ready for
    /// review needs the review permission, and pointing `superseded_by` at an item needs view
    /// rights on that item.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::PermissionDenied`] when any of those checks fails and
    /// [`RegistryError::InvalidInput`] when `change` alters the item's id.
    pub fn edit_item<F>(&self, actor: UserId, id: ItemId, change: F) -> RegistryResult<()>
    where
        F: FnOnce(&mut Concept) -> RegistryResult<()>,
    {
        self.write(|reg, sink| {
            require_item(reg, actor, Action::Edit, id, None)?;
            let before = reg.item(id)?.clone();
            let mut item = before.clone();
            change(&mut item)?;
            if item.id != id {
                return Err(RegistryError::InvalidInput(format!(
                    "item {id} cannot be given a different id"
                )));
            }
            if item.workgroup != before.workgroup && !reg.can_create_in(actor, item.workgroup)? {
                return Err(denied(reg, actor, "move content into this workgroup"));
            }
            if item.ready_to_review && !before.ready_to_review {
                require_item(reg, actor, Action::RequestReview, id, None)?;
            }
            if item.superseded_by != before.superseded_by {
                if let Some(newer) = item.superseded_by {
                    require_item(reg, actor, Action::View, newer, None)?;
                }
            }
            reg.save_item(item, Some(actor), sink)
        })
    }

    pub fn link(&self, actor: UserId, id: ItemId, field: &str, target: &str) -> RegistryResult<()> {
        self.write(|reg, sink| {
            require_item(reg, actor, Action::Edit, id, None)?;
            reg.link(id, field, target, Some(actor), sink)
        })
    }

    pub fn supersede(&self, actor: UserId, old: ItemId, newer: ItemId) -> RegistryResult<()> {
        self.write(|reg, sink| {
            require_item(reg, actor, Action::Edit, old, None)?;
            require_item(reg, actor, Action::View, newer, None)?;
            reg.supersede(old, newer, Some(actor), sink)
        })
    }

    pub fn request_review(&self, actor: UserId, id: ItemId) -> RegistryResult<()> {
        self.write(|reg, sink| {
            require_item(reg, actor, Action::RequestReview, id, None)?;
            reg.mark_ready_for_review(id, Some(actor), sink)
        })
    }

    /// Evaluates `action` by `user` on `item` without performing it.
    pub fn decide(
        &self,
        user: UserId,
        action: Action,
        item: ItemId,
        authority: Option<AuthorityId>,
    ) -> RegistryResult<Decision> {
        self.read(|reg| reg.decide(user, action, item, authority))
    }

    // ========================================================================
    // REGISTRATION
    // ========================================================================

    /// Registers `item` in `authority`, optionally cascading to its dependents.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::PermissionDenied`] unless the actor may change the item's
    /// status in `authority`.
    #[allow(clippy::too_many_arguments)]
    pub fn register(
        &self,
        actor: UserId,
        authority: AuthorityId,
        item: ItemId,
        state: RegistrationState,
        registration_date: Option<NaiveDate>,
        cascade: bool,
        change_details: Option<String>,
    ) -> RegistryResult<Status> {
        let mut request = RegistrationRequest::new(authority, item, state, actor).cascading(cascade);
        if let Some(date) = registration_date {
            request = request.on(date);
        }
        request.change_details = change_details;

        self.write(|reg, sink| {
            require_item(reg, actor, Action::ChangeStatus, item, Some(authority))?;
            reg.register(&request, sink)
        })
    }

    /// Statuses of an item the actor may view.
    pub fn statuses(&self, actor: UserId, item: ItemId) -> RegistryResult<Vec<Status>> {
        self.read(|reg| {
            require_item(reg, actor, Action::View, item, None)?;
            Ok(reg.statuses_for_item(item).into_iter().cloned().collect())
        })
    }

    pub fn standard_packages(&self, authority: AuthorityId) -> RegistryResult<Vec<(Concept, Status)>> {
        self.read(|reg| Ok(owned(reg.standard_packages(authority)?)))
    }

    pub fn standard_data_set_specifications(
        &self,
        authority: AuthorityId,
    ) -> RegistryResult<Vec<(Concept, Status)>> {
        self.read(|reg| Ok(owned(reg.standard_data_set_specifications(authority)?)))
    }
}

fn owned(pairs: Vec<(&Concept, &Status)>) -> Vec<(Concept, Status)> {
    pairs
        .into_iter()
        .map(|(item, status)| (item.clone(), status.clone()))
        .collect()
}

fn denied(reg: &Registry, actor: UserId, action: &str) -> RegistryError {
    let who = reg
        .user(actor)
        .map(|u| u.username.to_string())
        .unwrap_or_else(|_| actor.to_string());
    RegistryError::denied(who, action)
}

fn require_superuser(reg: &Registry, actor: UserId, action: &str) -> RegistryResult<()> {
    if reg.user(actor)?.is_superuser {
        Ok(())
    } else {
        Err(denied(reg, actor, action))
    }
}

fn require_administrator(reg: &Registry, actor: UserId, workgroup: WorkgroupId) -> RegistryResult<()> {
    if reg.can_administrate(actor, workgroup)? {
        Ok(())
    } else {
        Err(denied(reg, actor, "administrate this workgroup"))
    }
}

fn require_role_admin(reg: &Registry, actor: UserId, owner: GroupOwner) -> RegistryResult<()> {
    match owner {
        GroupOwner::Workgroup(wg) => require_administrator(reg, actor, wg),
        GroupOwner::Authority(ra) => {
            reg.authority(ra)?;
            require_superuser(reg, actor, "manage registration authority roles")
        }
    }
}

fn require_item(
    reg: &Registry,
    actor: UserId,
    action: Action,
    item: ItemId,
    authority: Option<AuthorityId>,
) -> RegistryResult<()> {
    require_item_for(reg, Some(actor), action, item, authority)
}

fn require_item_for(
    reg: &Registry,
    actor: Option<UserId>,
    action: Action,
    item: ItemId,
    authority: Option<AuthorityId>,
) -> RegistryResult<()> {
    let decision = reg.decide_for(actor, action, item, authority)?;
    if decision.allowed {
        return Ok(());
    }
    tracing::debug!(actor = ?actor, %item, %action, "permission denied");
    let what = format!("{action} item {item}");
    Err(match actor {
        Some(actor) => denied(reg, actor, &what),
        None => RegistryError::denied("anonymous", what),
    })
}
