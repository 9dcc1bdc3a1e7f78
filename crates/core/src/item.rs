//! Registrable content and supporting vocabulary.
//!
//! Managed content ("concepts" in ISO/IEC 11179:3 terms) is represented by [`Concept`]: the
//! fields every concept shares, plus a [`ConceptKind`] payload carrying the variant-specific
//! fields. A single lookup by [`ItemId`] therefore always resolves to the concrete variant.
//!
//! Unmanaged vocabulary ([`VocabularyEntry`]) supports concepts but is never registered and
//! belongs to no workgroup.

use chrono::{DateTime, Duration, Utc};
use mdr_types::{Cardinality, NonEmptyText};
use mdr_uuid::{AuthorityId, ItemId, VocabularyId, WorkgroupId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::{fmt, str::FromStr};

use crate::RegistryError;

// ============================================================================
// CONCEPTS
// ============================================================================

/// A managed, registrable item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Concept {
    pub id: ItemId,
    pub name: NonEmptyText,
    #[serde(default)]
    pub description: String,
    /// Owning workgroup. Every concept belongs to exactly one.
    pub workgroup: WorkgroupId,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub ready_to_review: bool,
    #[serde(default)]
    pub short_name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub synonyms: String,
    #[serde(default)]
    pub references: String,
    /// Where this item was imported or migrated from, if anywhere.
    #[serde(default)]
    pub origin_uri: String,
    #[serde(default)]
    pub superseded_by: Option<ItemId>,
    pub kind: ConceptKind,
}

impl Concept {
    pub(crate) fn new(
        name: NonEmptyText,
        description: String,
        workgroup: WorkgroupId,
        kind: ConceptKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ItemId::new(),
            name,
            description,
            workgroup,
            created: now,
            modified: now,
            ready_to_review: false,
            short_name: String::new(),
            version: String::new(),
            synonyms: String::new(),
            references: String::new(),
            origin_uri: String::new(),
            superseded_by: None,
            kind,
        }
    }

    pub fn item_type(&self) -> ItemType {
        self.kind.item_type()
    }

    /// Items that are registered along with this one when a registration cascades.
    pub fn registry_cascade_items(&self) -> Vec<ItemId> {
        self.kind.registry_cascade_items()
    }

    /// True when the item was modified within `window` of now.
    pub fn was_modified_recently(&self, window: Duration) -> bool {
        self.modified >= Utc::now() - window
    }

    pub(crate) fn touch(&mut self) {
        self.modified = Utc::now();
    }
}

impl fmt::Display for Concept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Variant-specific payload of a [`Concept`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConceptKind {
    ObjectClass,
    Property,
    DataType,
    ConceptualDomain,
    ValueDomain(ValueDomain),
    DataElementConcept(DataElementConcept),
    DataElement(DataElement),
    DataElementDerivation(DataElementDerivation),
    DataSetSpecification(DataSetSpecification),
    Package(Package),
}

impl ConceptKind {
    /// An empty payload for the given item type.
    pub fn empty(item_type: ItemType) -> Self {
        match item_type {
            ItemType::ObjectClass => ConceptKind::ObjectClass,
            ItemType::Property => ConceptKind::Property,
            ItemType::DataType => ConceptKind::DataType,
            ItemType::ConceptualDomain => ConceptKind::ConceptualDomain,
            ItemType::ValueDomain => ConceptKind::ValueDomain(ValueDomain::default()),
            ItemType::DataElementConcept => {
                ConceptKind::DataElementConcept(DataElementConcept::default())
            }
            ItemType::DataElement => ConceptKind::DataElement(DataElement::default()),
            ItemType::DataElementDerivation => {
                ConceptKind::DataElementDerivation(DataElementDerivation::default())
            }
            ItemType::DataSetSpecification => {
                ConceptKind::DataSetSpecification(DataSetSpecification::default())
            }
            ItemType::Package => ConceptKind::Package(Package::default()),
        }
    }

    pub fn item_type(&self) -> ItemType {
        match self {
            ConceptKind::ObjectClass => ItemType::ObjectClass,
            ConceptKind::Property => ItemType::Property,
            ConceptKind::DataType => ItemType::DataType,
            ConceptKind::ConceptualDomain => ItemType::ConceptualDomain,
            ConceptKind::ValueDomain(_) => ItemType::ValueDomain,
            ConceptKind::DataElementConcept(_) => ItemType::DataElementConcept,
            ConceptKind::DataElement(_) => ItemType::DataElement,
            ConceptKind::DataElementDerivation(_) => ItemType::DataElementDerivation,
            ConceptKind::DataSetSpecification(_) => ItemType::DataSetSpecification,
            ConceptKind::Package(_) => ItemType::Package,
        }
    }

    /// Declared dependencies followed by a cascading registration.
    ///
    /// Unset references are omitted.
    pub fn registry_cascade_items(&self) -> Vec<ItemId> {
        match self {
            ConceptKind::DataElementConcept(dec) => {
                [dec.object_class, dec.property].into_iter().flatten().collect()
            }
            ConceptKind::DataElement(de) => [de.data_element_concept, de.value_domain]
                .into_iter()
                .flatten()
                .collect(),
            ConceptKind::DataSetSpecification(dss) => {
                dss.data_elements.iter().map(|inc| inc.data_element).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Every item this payload references, used to validate links and find dependants.
    pub fn referenced_items(&self) -> Vec<ItemId> {
        match self {
            ConceptKind::ValueDomain(vd) => {
                [vd.data_type, vd.conceptual_domain].into_iter().flatten().collect()
            }
            ConceptKind::DataElementConcept(dec) => {
                [dec.object_class, dec.property, dec.conceptual_domain]
                    .into_iter()
                    .flatten()
                    .collect()
            }
            ConceptKind::DataElementDerivation(der) => der
                .derives
                .into_iter()
                .chain(der.inputs.iter().copied())
                .collect(),
            ConceptKind::Package(pkg) => pkg.items.iter().copied().collect(),
            other => other.registry_cascade_items(),
        }
    }
}

/// Reference fields that can be set with [`ConceptKind::link_item`].
pub const ITEM_LINK_FIELDS: [&str; 10] = [
    "object_class",
    "property",
    "conceptual_domain",
    "data_type",
    "data_element_concept",
    "value_domain",
    "derives",
    "input",
    "data_element",
    "item",
];

impl ConceptKind {
    /// Points the reference `field` at `target`, whose type the caller has resolved.
    ///
    /// Single-valued fields are overwritten. `input`, `data_element` and `item` add to the
    /// derivation inputs, data set specification and package respectively; adding an existing
    /// member is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidInput`] if this variant has no such field or `target`
    /// has the wrong type for it.
    pub fn link_item(
        &mut self,
        field: &str,
        target: ItemId,
        target_type: ItemType,
    ) -> Result<(), RegistryError> {
        let this = self.item_type();
        let expect = |wanted: ItemType| {
            if target_type == wanted {
                Ok(Some(target))
            } else {
                Err(RegistryError::InvalidInput(format!(
                    "{field} of a {this} must be a {wanted}, not a {target_type}"
                )))
            }
        };

        match (self, field) {
            (ConceptKind::DataElementConcept(dec), "object_class") => {
                dec.object_class = expect(ItemType::ObjectClass)?
            }
            (ConceptKind::DataElementConcept(dec), "property") => {
                dec.property = expect(ItemType::Property)?
            }
            (ConceptKind::DataElementConcept(dec), "conceptual_domain") => {
                dec.conceptual_domain = expect(ItemType::ConceptualDomain)?
            }
            (ConceptKind::ValueDomain(vd), "conceptual_domain") => {
                vd.conceptual_domain = expect(ItemType::ConceptualDomain)?
            }
            (ConceptKind::ValueDomain(vd), "data_type") => {
                vd.data_type = expect(ItemType::DataType)?
            }
            (ConceptKind::DataElement(de), "data_element_concept") => {
                de.data_element_concept = expect(ItemType::DataElementConcept)?
            }
            (ConceptKind::DataElement(de), "value_domain") => {
                de.value_domain = expect(ItemType::ValueDomain)?
            }
            (ConceptKind::DataElementDerivation(der), "derives") => {
                der.derives = expect(ItemType::DataElement)?
            }
            (ConceptKind::DataElementDerivation(der), "input") => {
                expect(ItemType::DataElement)?;
                der.inputs.insert(target);
            }
            (ConceptKind::DataSetSpecification(dss), "data_element") => {
                expect(ItemType::DataElement)?;
                dss.add_data_element(target, InclusionDetails::default());
            }
            (ConceptKind::Package(pkg), "item") => {
                pkg.add_item(target);
            }
            (_, field) => {
                return Err(RegistryError::InvalidInput(format!(
                    "a {this} has no reference field named {field}"
                )))
            }
        }
        Ok(())
    }

    /// Points a vocabulary reference of a value domain at `target`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidInput`] if this is not a value domain or the field is not
    /// `unit_of_measure` or `representation_class`.
    pub fn link_vocabulary(&mut self, field: &str, target: VocabularyId) -> Result<(), RegistryError> {
        let this = self.item_type();
        match (self, field) {
            (ConceptKind::ValueDomain(vd), "unit_of_measure") => vd.unit_of_measure = Some(target),
            (ConceptKind::ValueDomain(vd), "representation_class") => {
                vd.representation_class = Some(target)
            }
            (_, field) => {
                return Err(RegistryError::InvalidInput(format!(
                    "a {this} has no vocabulary field named {field}"
                )))
            }
        }
        Ok(())
    }

    /// Vocabulary entries this payload references.
    pub fn referenced_vocabulary(&self) -> Vec<VocabularyId> {
        match self {
            ConceptKind::ValueDomain(vd) => [vd.unit_of_measure, vd.representation_class]
                .into_iter()
                .flatten()
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Discriminator for the concept variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    ObjectClass,
    Property,
    DataType,
    ConceptualDomain,
    ValueDomain,
    DataElementConcept,
    DataElement,
    DataElementDerivation,
    DataSetSpecification,
    Package,
}

impl ItemType {
    pub const ALL: [ItemType; 10] = [
        ItemType::ObjectClass,
        ItemType::Property,
        ItemType::DataType,
        ItemType::ConceptualDomain,
        ItemType::ValueDomain,
        ItemType::DataElementConcept,
        ItemType::DataElement,
        ItemType::DataElementDerivation,
        ItemType::DataSetSpecification,
        ItemType::Package,
    ];

    pub fn key(self) -> &'static str {
        match self {
            ItemType::ObjectClass => "object_class",
            ItemType::Property => "property",
            ItemType::DataType => "data_type",
            ItemType::ConceptualDomain => "conceptual_domain",
            ItemType::ValueDomain => "value_domain",
            ItemType::DataElementConcept => "data_element_concept",
            ItemType::DataElement => "data_element",
            ItemType::DataElementDerivation => "data_element_derivation",
            ItemType::DataSetSpecification => "data_set_specification",
            ItemType::Package => "package",
        }
    }

    pub fn verbose_name(self) -> &'static str {
        match self {
            ItemType::ObjectClass => "Object Class",
            ItemType::Property => "Property",
            ItemType::DataType => "Data Type",
            ItemType::ConceptualDomain => "Conceptual Domain",
            ItemType::ValueDomain => "Value Domain",
            ItemType::DataElementConcept => "Data Element Concept",
            ItemType::DataElement => "Data Element",
            ItemType::DataElementDerivation => "Data Element Derivation",
            ItemType::DataSetSpecification => "Data Set Specification",
            ItemType::Package => "Package",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verbose_name())
    }
}

impl FromStr for ItemType {
    type Err = RegistryError;

    /// Accepts the snake_case key (`data_element`), a kebab-case form (`data-element`) or the
    /// verbose name (`Data Element`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded = s.trim().to_lowercase().replace([' ', '-'], "_");
        ItemType::ALL
            .into_iter()
            .find(|t| t.key() == folded)
            .ok_or_else(|| RegistryError::InvalidInput(format!("unknown item type: {s}")))
    }
}

/// A value and its meaning, as listed by a value domain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueMeaning {
    pub value: String,
    pub meaning: String,
    pub order: u16,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueDomain {
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub maximum_length: u32,
    #[serde(default)]
    pub unit_of_measure: Option<VocabularyId>,
    #[serde(default)]
    pub data_type: Option<ItemId>,
    #[serde(default)]
    pub conceptual_domain: Option<ItemId>,
    #[serde(default)]
    pub representation_class: Option<VocabularyId>,
    #[serde(default)]
    pub permissible_values: Vec<ValueMeaning>,
    #[serde(default)]
    pub supplementary_values: Vec<ValueMeaning>,
}

impl ValueDomain {
    /// Adds a permissible value, keeping the list sorted by position.
    pub fn add_permissible_value(&mut self, value: ValueMeaning) {
        insert_ordered(&mut self.permissible_values, value);
    }

    /// Adds a supplementary value, keeping the list sorted by position.
    pub fn add_supplementary_value(&mut self, value: ValueMeaning) {
        insert_ordered(&mut self.supplementary_values, value);
    }
}

fn insert_ordered(values: &mut Vec<ValueMeaning>, value: ValueMeaning) {
    let idx = values.partition_point(|v| v.order <= value.order);
    values.insert(idx, value);
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataElementConcept {
    #[serde(default)]
    pub object_class: Option<ItemId>,
    #[serde(default)]
    pub property: Option<ItemId>,
    #[serde(default)]
    pub conceptual_domain: Option<ItemId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataElement {
    #[serde(default)]
    pub data_element_concept: Option<ItemId>,
    #[serde(default)]
    pub value_domain: Option<ItemId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataElementDerivation {
    #[serde(default)]
    pub derives: Option<ItemId>,
    #[serde(default)]
    pub inputs: BTreeSet<ItemId>,
    #[serde(default)]
    pub derivation_rule: String,
}

/// Inclusion details of one data element within a data set specification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DssInclusion {
    pub data_element: ItemId,
    #[serde(flatten)]
    pub details: InclusionDetails,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionDetails {
    #[serde(default = "default_max_occurrences")]
    pub maximum_occurrences: u32,
    #[serde(default)]
    pub cardinality: Cardinality,
    #[serde(default)]
    pub specific_information: String,
    #[serde(default)]
    pub conditional_obligation: String,
    #[serde(default)]
    pub order: Option<u16>,
    #[serde(default)]
    pub ordered: bool,
}

fn default_max_occurrences() -> u32 {
    1
}

impl Default for InclusionDetails {
    fn default() -> Self {
        Self {
            maximum_occurrences: default_max_occurrences(),
            cardinality: Cardinality::default(),
            specific_information: String::new(),
            conditional_obligation: String::new(),
            order: None,
            ordered: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSetSpecification {
    #[serde(default)]
    pub data_elements: Vec<DssInclusion>,
}

impl DataSetSpecification {
    /// Includes `data_element`, unless it is already included.
    ///
    /// Existing inclusion details are left untouched. Returns `true` when a new inclusion was
    /// created.
    pub fn add_data_element(&mut self, data_element: ItemId, details: InclusionDetails) -> bool {
        if self
            .data_elements
            .iter()
            .any(|inc| inc.data_element == data_element)
        {
            return false;
        }
        self.data_elements.push(DssInclusion {
            data_element,
            details,
        });
        true
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    #[serde(default)]
    pub items: BTreeSet<ItemId>,
}

impl Package {
    /// Adds `item` to the package. Returns `false` if it was already a member.
    pub fn add_item(&mut self, item: ItemId) -> bool {
        self.items.insert(item)
    }
}

// ============================================================================
// UNMANAGED VOCABULARY
// ============================================================================

/// Supporting vocabulary that is neither registered nor owned by a workgroup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VocabularyEntry {
    pub id: VocabularyId,
    pub name: NonEmptyText,
    #[serde(default)]
    pub description: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub kind: VocabularyKind,
}

impl VocabularyEntry {
    pub(crate) fn new(name: NonEmptyText, description: String, kind: VocabularyKind) -> Self {
        let now = Utc::now();
        Self {
            id: VocabularyId::new(),
            name,
            description,
            created: now,
            modified: now,
            kind,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VocabularyKind {
    Measure,
    UnitOfMeasure {
        measure: VocabularyId,
        #[serde(default)]
        symbol: String,
    },
    RepresentationClass,
    GlossaryItem {
        /// Alternative definitions, at most one per registration authority.
        #[serde(default)]
        alternate_definitions: BTreeMap<AuthorityId, String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concept(kind: ConceptKind) -> Concept {
        Concept::new(
            NonEmptyText::new("Test").expect("name"),
            String::new(),
            WorkgroupId::new(),
            kind,
        )
    }

    #[test]
    fn test_cascade_items_default_is_empty() {
        for item_type in [
            ItemType::ObjectClass,
            ItemType::Property,
            ItemType::ValueDomain,
            ItemType::Package,
        ] {
            assert!(concept(ConceptKind::empty(item_type))
                .registry_cascade_items()
                .is_empty());
        }
    }

    #[test]
    fn test_cascade_items_for_dec_and_de_skip_unset_references() {
        let oc = ItemId::new();
        let prop = ItemId::new();
        let dec = concept(ConceptKind::DataElementConcept(DataElementConcept {
            object_class: Some(oc),
            property: Some(prop),
            conceptual_domain: Some(ItemId::new()),
        }));
        assert_eq!(dec.registry_cascade_items(), vec![oc, prop]);

        let vd = ItemId::new();
        let de = concept(ConceptKind::DataElement(DataElement {
            data_element_concept: None,
            value_domain: Some(vd),
        }));
        assert_eq!(de.registry_cascade_items(), vec![vd]);
    }

    #[test]
    fn test_dss_add_data_element_is_get_or_create() {
        let de = ItemId::new();
        let mut dss = DataSetSpecification::default();
        let details = InclusionDetails {
            cardinality: Cardinality::Mandatory,
            ..Default::default()
        };
        assert!(dss.add_data_element(de, details));
        assert!(!dss.add_data_element(de, InclusionDetails::default()));
        assert_eq!(dss.data_elements.len(), 1);
        assert_eq!(dss.data_elements[0].details.cardinality, Cardinality::Mandatory);
        assert_eq!(dss.data_elements[0].details.maximum_occurrences, 1);

        let dss_item = concept(ConceptKind::DataSetSpecification(dss));
        assert_eq!(dss_item.registry_cascade_items(), vec![de]);
    }

    #[test]
    fn test_value_domain_keeps_values_ordered() {
        let mut vd = ValueDomain::default();
        for (value, meaning, order) in [("2", "Female", 2), ("1", "Male", 1), ("9", "Unknown", 9)]
        {
            vd.add_permissible_value(ValueMeaning {
                value: value.into(),
                meaning: meaning.into(),
                order,
            });
        }
        let orders: Vec<u16> = vd.permissible_values.iter().map(|v| v.order).collect();
        assert_eq!(orders, vec![1, 2, 9]);
    }

    #[test]
    fn test_link_item_checks_field_and_target_type() {
        let mut kind = ConceptKind::empty(ItemType::DataElementConcept);
        let oc = ItemId::new();
        kind.link_item("object_class", oc, ItemType::ObjectClass)
            .expect("object class link");
        assert_eq!(kind.registry_cascade_items(), vec![oc]);

        let err = kind
            .link_item("property", ItemId::new(), ItemType::ObjectClass)
            .expect_err("wrong target type");
        assert!(err.to_string().contains("must be a Property"));

        let err = kind
            .link_item("value_domain", ItemId::new(), ItemType::ValueDomain)
            .expect_err("no such field");
        assert!(matches!(err, RegistryError::InvalidInput(_)));
    }

    #[test]
    fn test_link_collection_fields_are_idempotent() {
        let mut pkg = ConceptKind::empty(ItemType::Package);
        let member = ItemId::new();
        pkg.link_item("item", member, ItemType::Property).expect("first add");
        pkg.link_item("item", member, ItemType::Property).expect("second add");
        assert_eq!(pkg.referenced_items(), vec![member]);

        let mut vd = ConceptKind::empty(ItemType::ValueDomain);
        let unit = VocabularyId::new();
        vd.link_vocabulary("unit_of_measure", unit).expect("unit link");
        assert_eq!(vd.referenced_vocabulary(), vec![unit]);
        assert!(pkg.link_vocabulary("unit_of_measure", unit).is_err());
    }

    #[test]
    fn test_item_type_parsing() {
        assert_eq!(
            "data_element".parse::<ItemType>().expect("key"),
            ItemType::DataElement
        );
        assert_eq!(
            "Data Element Concept".parse::<ItemType>().expect("verbose"),
            ItemType::DataElementConcept
        );
        assert_eq!(
            "value-domain".parse::<ItemType>().expect("kebab"),
            ItemType::ValueDomain
        );
        assert!("widget".parse::<ItemType>().is_err());
    }

    #[test]
    fn test_was_modified_recently() {
        let mut item = concept(ConceptKind::ObjectClass);
        assert!(item.was_modified_recently(Duration::days(1)));
        item.modified = Utc::now() - Duration::days(2);
        assert!(!item.was_modified_recently(Duration::days(1)));
    }
}
