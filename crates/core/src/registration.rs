//! Registration: status upserts, cascading and published-content queries.

use chrono::NaiveDate;
use mdr_types::RegistrationState;
use mdr_uuid::{AuthorityId, ItemId, UserId};
use std::collections::HashSet;

use crate::constants::{UNREGISTERED_LABEL, VERB_FAVOURITE_STATUS_CHANGED};
use crate::item::{Concept, ItemType};
use crate::notify::{dispatch, Notification, NotificationSink};
use crate::registry::{validate_change_details, Registry};
use crate::status::{Status, StatusUpdate, Upserted};
use crate::RegistryResult;

/// Parameters of one registration action.
#[derive(Clone, Debug)]
pub struct RegistrationRequest {
    pub authority: AuthorityId,
    pub item: ItemId,
    pub state: RegistrationState,
    /// User performing the registration. Cascaded dependents are only updated where this user
    /// may change their status.
    pub actor: UserId,
    pub registration_date: NaiveDate,
    pub change_details: Option<String>,
    pub cascade: bool,
}

impl RegistrationRequest {
    /// A non-cascading request dated today.
    pub fn new(
        authority: AuthorityId,
        item: ItemId,
        state: RegistrationState,
        actor: UserId,
    ) -> Self {
        Self {
            authority,
            item,
            state,
            actor,
            registration_date: chrono::Utc::now().date_naive(),
            change_details: None,
            cascade: false,
        }
    }

    pub fn on(mut self, registration_date: NaiveDate) -> Self {
        self.registration_date = registration_date;
        self
    }

    pub fn cascading(mut self, cascade: bool) -> Self {
        self.cascade = cascade;
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.change_details = Some(details.into());
        self
    }
}

impl Registry {
    /// Records `request.state` for the item in the authority and returns the resulting status.
    ///
    /// The row for `(item, authority)` is created or updated in place. When the request
    /// cascades, the same state and date are applied to every item the subject lists in
    /// `registry_cascade_items`, recursively. A dependent is skipped when the acting user may
    /// not change its status in this authority, when it does not exist, or when it was already
    /// visited during this call, so cycles terminate and each item is written at most once.
    /// A failure on a dependent is logged and does not undo earlier writes.
    ///
    /// Every item whose state actually changed notifies the profiles that favourited it.
    /// Delivery failures are logged and never undo the write.
    ///
    /// The caller is responsible for checking that the actor may change the status of the
    /// subject item itself.
    ///
    /// # Errors
    ///
    /// Fails if the authority, item or actor does not exist, or the change details are too
    /// long.
    pub fn register(
        &mut self,
        request: &RegistrationRequest,
        sink: &dyn NotificationSink,
    ) -> RegistryResult<Status> {
        self.authority(request.authority)?;
        self.user(request.actor)?;
        let change_details = request
            .change_details
            .as_deref()
            .map(validate_change_details)
            .transpose()?;

        let mut visited = HashSet::new();
        self.register_visiting(request, request.item, &change_details, sink, &mut visited)
    }

    fn register_visiting(
        &mut self,
        request: &RegistrationRequest,
        item: ItemId,
        change_details: &Option<String>,
        sink: &dyn NotificationSink,
        visited: &mut HashSet<ItemId>,
    ) -> RegistryResult<Status> {
        visited.insert(item);
        let dependents = self.item(item)?.registry_cascade_items();

        let upserted = self.statuses.upsert(
            item,
            request.authority,
            StatusUpdate {
                state: request.state,
                registration_date: request.registration_date,
                change_details: change_details.clone(),
                changed_by: Some(request.actor),
            },
        );
        tracing::info!(
            %item,
            authority = %request.authority,
            state = %request.state,
            previous = ?upserted.previous,
            "status recorded"
        );
        if upserted.state_changed() {
            self.notify_status_change(&upserted, request.actor, sink)?;
        }

        if request.cascade {
            for dependent in dependents {
                if visited.contains(&dependent) {
                    tracing::debug!(%dependent, "cascade skipped: already visited");
                    continue;
                }
                match self.can_change_status(request.actor, dependent, request.authority) {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::debug!(%dependent, "cascade skipped: no permission");
                        continue;
                    }
                    Err(err) => {
                        tracing::debug!(%dependent, error = %err, "cascade skipped");
                        continue;
                    }
                }
                if let Err(err) =
                    self.register_visiting(request, dependent, change_details, sink, visited)
                {
                    tracing::warn!(%dependent, error = %err, "cascaded registration failed");
                }
            }
        }

        Ok(upserted.status)
    }

    fn notify_status_change(
        &self,
        upserted: &Upserted,
        actor: UserId,
        sink: &dyn NotificationSink,
    ) -> RegistryResult<()> {
        let status = &upserted.status;
        let authority = self.authority(status.authority)?;
        let previous = upserted
            .previous
            .map(RegistrationState::label)
            .unwrap_or(UNREGISTERED_LABEL);
        let description = format!(
            "The state has gone from {previous} to {} in Registration Authority \"{}\"",
            status.state.label(),
            authority.name
        );
        for recipient in self.favourited_by(status.item) {
            dispatch(
                sink,
                &Notification {
                    recipient,
                    actor: Some(actor),
                    verb: VERB_FAVOURITE_STATUS_CHANGED.to_string(),
                    target: status.item,
                    description: Some(description.clone()),
                },
            );
        }
        Ok(())
    }

    /// Packages published (Standard or Preferred Standard) by `authority`.
    pub fn standard_packages(&self, authority: AuthorityId) -> RegistryResult<Vec<(&Concept, &Status)>> {
        self.standard_items(authority, ItemType::Package)
    }

    /// Data set specifications published (Standard or Preferred Standard) by `authority`.
    pub fn standard_data_set_specifications(
        &self,
        authority: AuthorityId,
    ) -> RegistryResult<Vec<(&Concept, &Status)>> {
        self.standard_items(authority, ItemType::DataSetSpecification)
    }

    /// Items of `item_type` with a published status in `authority`, each paired with that
    /// status.
    ///
    /// Results are ordered by the status's creation time, newest first, with the item id as a
    /// tie-breaker.
    fn standard_items(
        &self,
        authority: AuthorityId,
        item_type: ItemType,
    ) -> RegistryResult<Vec<(&Concept, &Status)>> {
        self.authority(authority)?;
        let mut found: Vec<(&Concept, &Status)> = self
            .statuses
            .for_authority(authority)
            .filter(|s| s.state.is_published())
            .filter_map(|s| self.items.get(&s.item).map(|item| (item, s)))
            .filter(|(item, _)| item.item_type() == item_type)
            .collect();
        found.sort_by(|(a, sa), (b, sb)| sb.created.cmp(&sa.created).then(a.id.cmp(&b.id)));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ConceptKind;
    use crate::notify::tests::FailingSink;
    use crate::notify::MemorySink;
    use crate::registry::tests::{add, date, fixture};

    fn link(registry: &mut Registry, item: ItemId, field: &str, target: ItemId) {
        registry
            .link(item, field, &target.to_string(), None, &MemorySink::new())
            .expect("link");
    }

    #[test]
    fn test_register_twice_keeps_one_row_with_latest_values() {
        let mut f = fixture();
        let sink = MemorySink::new();
        let item = add(&mut f.registry, f.wg, "Person", ItemType::ObjectClass);

        let req = RegistrationRequest::new(f.ra, item, RegistrationState::Candidate, f.registrar)
            .on(date(1));
        f.registry.register(&req, &sink).expect("first");
        let req = RegistrationRequest::new(f.ra, item, RegistrationState::Standard, f.registrar)
            .on(date(2));
        let status = f.registry.register(&req, &sink).expect("second");

        assert_eq!(f.registry.statuses().len(), 1);
        assert_eq!(status.state, RegistrationState::Standard);
        assert_eq!(status.registration_date, date(2));
        assert!(f.registry.is_registered(item));
        assert_eq!(
            f.registry.describe_status(&status).expect("describe"),
            "Person is Standard for Standards Council"
        );
    }

    #[test]
    fn test_public_threshold_example() {
        let mut f = fixture();
        let sink = MemorySink::new();
        let item = add(&mut f.registry, f.wg, "Person", ItemType::ObjectClass);

        let req = RegistrationRequest::new(f.ra, item, RegistrationState::Candidate, f.registrar);
        f.registry.register(&req, &sink).expect("candidate");
        assert!(!f.registry.is_public(item));
        assert!(f.registry.is_locked(item));

        let req = RegistrationRequest::new(f.ra, item, RegistrationState::Standard, f.registrar);
        f.registry.register(&req, &sink).expect("standard");
        assert!(f.registry.is_public(item));
    }

    #[test]
    fn test_public_in_any_authority_is_enough() {
        let mut f = fixture();
        let sink = MemorySink::new();
        let strict = f
            .registry
            .add_authority(
                "Strict Council",
                RegistrationState::Standard,
                RegistrationState::Standard,
            )
            .expect("authority");
        let item = add(&mut f.registry, f.wg, "Person", ItemType::ObjectClass);

        let req = RegistrationRequest::new(strict, item, RegistrationState::Recorded, f.admin);
        f.registry.register(&req, &sink).expect("strict");
        assert!(!f.registry.is_public(item));

        let req = RegistrationRequest::new(f.ra, item, RegistrationState::Recorded, f.admin);
        f.registry.register(&req, &sink).expect("lenient");
        assert!(f.registry.is_public(item));
    }

    #[test]
    fn test_cascade_registers_dependents() {
        let mut f = fixture();
        let sink = MemorySink::new();
        let oc = add(&mut f.registry, f.wg, "Person", ItemType::ObjectClass);
        let prop = add(&mut f.registry, f.wg, "Age", ItemType::Property);
        let dec = add(&mut f.registry, f.wg, "Person-Age", ItemType::DataElementConcept);
        link(&mut f.registry, dec, "object_class", oc);
        link(&mut f.registry, dec, "property", prop);

        let req = RegistrationRequest::new(f.ra, dec, RegistrationState::Standard, f.registrar)
            .on(date(3))
            .cascading(true);
        f.registry.register(&req, &sink).expect("register");

        for item in [dec, oc, prop] {
            let status = f.registry.status(item, f.ra).expect("status");
            assert_eq!(status.state, RegistrationState::Standard);
            assert_eq!(status.registration_date, date(3));
        }
    }

    #[test]
    fn test_cascade_reaches_nested_dependents() {
        let mut f = fixture();
        let sink = MemorySink::new();
        let oc = add(&mut f.registry, f.wg, "Person", ItemType::ObjectClass);
        let dec = add(&mut f.registry, f.wg, "Person-Age", ItemType::DataElementConcept);
        let vd = add(&mut f.registry, f.wg, "Years", ItemType::ValueDomain);
        let de = add(&mut f.registry, f.wg, "Person age", ItemType::DataElement);
        let dss = add(&mut f.registry, f.wg, "Demographics", ItemType::DataSetSpecification);
        link(&mut f.registry, dec, "object_class", oc);
        link(&mut f.registry, de, "data_element_concept", dec);
        link(&mut f.registry, de, "value_domain", vd);
        link(&mut f.registry, dss, "data_element", de);

        let req = RegistrationRequest::new(f.ra, dss, RegistrationState::Recorded, f.registrar)
            .cascading(true);
        f.registry.register(&req, &sink).expect("register");
        assert_eq!(f.registry.statuses().len(), 5);
    }

    #[test]
    fn test_cascade_skips_dependents_without_rights() {
        let mut f = fixture();
        let sink = MemorySink::new();
        let other_ra = f
            .registry
            .add_authority(
                "Other Council",
                RegistrationState::Candidate,
                RegistrationState::Recorded,
            )
            .expect("authority");
        let oc = add(&mut f.registry, f.wg, "Person", ItemType::ObjectClass);
        let dec = add(&mut f.registry, f.wg, "Person-Age", ItemType::DataElementConcept);
        link(&mut f.registry, dec, "object_class", oc);

        // Not a registrar in the other authority: the top item is written (no check at this
        // layer) but the dependent is left alone.
        let req = RegistrationRequest::new(other_ra, dec, RegistrationState::Standard, f.editor)
            .cascading(true);
        f.registry.register(&req, &sink).expect("register");
        assert!(f.registry.status(dec, other_ra).is_some());
        assert!(f.registry.status(oc, other_ra).is_none());
    }

    #[test]
    fn test_cascade_over_cycle_terminates_and_visits_each_item_once() {
        let mut f = fixture();
        let sink = MemorySink::new();
        let a = add(&mut f.registry, f.wg, "A", ItemType::DataElementConcept);
        let b = add(&mut f.registry, f.wg, "B", ItemType::DataElementConcept);
        // Build the cycle directly: the link helper would reject the wrong target type.
        for (from, to) in [(a, b), (b, a)] {
            let item = f.registry.items.get_mut(&from).expect("item");
            if let ConceptKind::DataElementConcept(dec) = &mut item.kind {
                dec.object_class = Some(to);
            }
        }

        let req = RegistrationRequest::new(f.ra, a, RegistrationState::Candidate, f.registrar)
            .cascading(true);
        f.registry.register(&req, &sink).expect("register");

        assert_eq!(f.registry.statuses().len(), 2);
        for item in [a, b] {
            assert_eq!(
                f.registry.status(item, f.ra).expect("status").history.len(),
                1
            );
        }
    }

    #[test]
    fn test_status_change_notifies_favouriting_profiles() {
        let mut f = fixture();
        let sink = MemorySink::new();
        let item = add(&mut f.registry, f.wg, "Person", ItemType::ObjectClass);
        f.registry
            .toggle_favourite(f.editor, item)
            .expect("favourite");

        let req = RegistrationRequest::new(f.ra, item, RegistrationState::Candidate, f.registrar);
        f.registry.register(&req, &sink).expect("register");
        let sent = sink.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, f.editor);
        assert_eq!(sent[0].actor, Some(f.registrar));
        assert_eq!(sent[0].verb, VERB_FAVOURITE_STATUS_CHANGED);
        assert_eq!(
            sent[0].description.as_deref(),
            Some(
                "The state has gone from Unregistered to Candidate in Registration Authority \"Standards Council\""
            )
        );

        // Same state again: nothing changed, nobody is told.
        f.registry.register(&req, &sink).expect("register again");
        assert!(sink.is_empty());
    }

    #[test]
    fn test_sink_failure_does_not_roll_back_status() {
        let mut f = fixture();
        let item = add(&mut f.registry, f.wg, "Person", ItemType::ObjectClass);
        f.registry
            .toggle_favourite(f.editor, item)
            .expect("favourite");

        let req = RegistrationRequest::new(f.ra, item, RegistrationState::Standard, f.registrar);
        f.registry
            .register(&req, &FailingSink)
            .expect("register despite sink failure");
        assert_eq!(
            f.registry.status(item, f.ra).map(|s| s.state),
            Some(RegistrationState::Standard)
        );
    }

    #[test]
    fn test_standard_packages_and_dss() {
        let mut f = fixture();
        let sink = MemorySink::new();
        let pkg = add(&mut f.registry, f.wg, "Core", ItemType::Package);
        let draft = add(&mut f.registry, f.wg, "Draft", ItemType::Package);
        let dss = add(&mut f.registry, f.wg, "Demographics", ItemType::DataSetSpecification);

        for (item, state) in [
            (pkg, RegistrationState::Preferred),
            (draft, RegistrationState::Candidate),
            (dss, RegistrationState::Standard),
        ] {
            let req = RegistrationRequest::new(f.ra, item, state, f.registrar);
            f.registry.register(&req, &sink).expect("register");
        }

        let packages = f.registry.standard_packages(f.ra).expect("packages");
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].0.id, pkg);
        assert_eq!(packages[0].1.state, RegistrationState::Preferred);

        let specs = f
            .registry
            .standard_data_set_specifications(f.ra)
            .expect("specs");
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].0.id, dss);
    }

    #[test]
    fn test_register_validates_references() {
        let mut f = fixture();
        let sink = MemorySink::new();
        let item = add(&mut f.registry, f.wg, "Person", ItemType::ObjectClass);
        let req = RegistrationRequest::new(
            AuthorityId::new(),
            item,
            RegistrationState::Standard,
            f.registrar,
        );
        assert!(f.registry.register(&req, &sink).is_err());

        let req = RegistrationRequest::new(f.ra, item, RegistrationState::Standard, f.registrar)
            .with_details("x".repeat(200));
        assert!(f.registry.register(&req, &sink).is_err());
        assert!(!f.registry.is_registered(item));
    }
}
