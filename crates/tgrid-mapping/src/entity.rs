//! Entity mapping metadata and the capability traits built on it.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tgrid_types::{AssociationDescriptor, EntityKey, FieldValue, TypeResult, Value};

use crate::error::{MappingError, MappingResult};

fn yes() -> bool {
    true
}

/// How concurrent modification of an entity is detected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimisticLockStyle {
    /// No checks at all.
    None,
    /// Compare the version column.
    #[default]
    Version,
    /// Compare the stored value of every updated, versionable property.
    Dirty,
    /// Compare the stored value of every updatable, versionable property.
    All,
}

/// Column and value that tag rows of one entity in a shared table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discriminator {
    pub column: String,
    pub value: Value,
}

/// How an entity hierarchy is laid out over tables.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MappingStrategy {
    /// Every concrete entity owns its table.
    #[default]
    TablePerClass,
    /// The hierarchy shares one table; rows carry a discriminator.
    SingleTable {
        #[serde(default)]
        discriminator: Option<Discriminator>,
    },
}

/// One mapped property of an entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    pub columns: Vec<String>,
    /// Target entity when the property is a to-one reference. The columns
    /// then hold the target's identifier.
    #[serde(default)]
    pub references: Option<String>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default = "yes")]
    pub insertable: bool,
    #[serde(default = "yes")]
    pub updatable: bool,
    #[serde(default = "yes")]
    pub versionable: bool,
    #[serde(default)]
    pub lazy: bool,
    #[serde(default = "yes")]
    pub selectable: bool,
    #[serde(default = "yes")]
    pub nullable: bool,
}

impl PropertyDescriptor {
    /// A plain single-column property with default flags.
    pub fn basic(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: vec![column.into()],
            references: None,
            unique: false,
            insertable: true,
            updatable: true,
            versionable: true,
            lazy: false,
            selectable: true,
            nullable: true,
        }
    }

    /// A to-one reference to `target` stored in `columns`.
    pub fn to_one(name: impl Into<String>, columns: Vec<String>, target: impl Into<String>) -> Self {
        Self {
            columns,
            references: Some(target.into()),
            ..Self::basic(name, String::new())
        }
    }

    pub fn is_to_one(&self) -> bool {
        self.references.is_some()
    }

    /// Returns `true` if the property keeps a reverse index for lookup by unique key.
    pub fn has_reverse_index(&self) -> bool {
        self.is_to_one() || self.unique
    }
}

/// Entity definition as written in a mapping document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMapping {
    pub name: String,
    pub table: String,
    pub id_columns: Vec<String>,
    /// Name of the version property, if the entity is versioned.
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub optimistic_lock: OptimisticLockStyle,
    #[serde(default)]
    pub strategy: MappingStrategy,
    #[serde(default)]
    pub properties: Vec<PropertyDescriptor>,
}

/// Identifier handling of a mapped entity.
pub trait Identifiable {
    fn identifier_columns(&self) -> &[String];

    /// The record key locating the entity with identifier `id`.
    fn entity_key(&self, id: &FieldValue) -> TypeResult<EntityKey>;
}

/// Version handling of a mapped entity.
pub trait Versionable {
    /// The version column, if the entity is versioned.
    fn version_column(&self) -> Option<&str>;

    /// The version that follows `current`.
    ///
    /// Integers increment, timestamps move to now, and a missing version
    /// starts at 1. Anything else cannot be versioned.
    fn next_version(&self, current: &Value) -> MappingResult<Value>;
}

/// Discriminator handling of a mapping strategy.
pub trait DiscriminatorBearing {
    fn discriminator(&self) -> Option<&Discriminator>;
}

impl DiscriminatorBearing for MappingStrategy {
    fn discriminator(&self) -> Option<&Discriminator> {
        match self {
            Self::TablePerClass => None,
            Self::SingleTable { discriminator } => discriminator.as_ref(),
        }
    }
}

/// Immutable, validated metadata of one entity.
///
/// Built once from an [`EntityMapping`] and shared by reference.
#[derive(Clone, Debug)]
pub struct EntityMetadata {
    name: String,
    table: String,
    id_columns: Vec<String>,
    properties: Vec<PropertyDescriptor>,
    version_index: Option<usize>,
    optimistic_lock: OptimisticLockStyle,
    strategy: MappingStrategy,
    reverse_indexes: BTreeMap<String, Arc<AssociationDescriptor>>,
}

impl EntityMetadata {
    /// Validate an entity definition on its own.
    ///
    /// Cross-entity checks (reference targets, discriminator clashes) are
    /// done by [`MappingDocument::build`](crate::MappingDocument::build).
    pub fn from_mapping(mapping: EntityMapping) -> MappingResult<Self> {
        let EntityMapping {
            name,
            table,
            id_columns,
            version,
            optimistic_lock,
            strategy,
            properties,
        } = mapping;

        if id_columns.is_empty() {
            return Err(MappingError::invalid(&name, "no identifier columns"));
        }

        let mut seen = BTreeMap::new();
        for (i, p) in properties.iter().enumerate() {
            if seen.insert(p.name.as_str(), i).is_some() {
                return Err(MappingError::Duplicate {
                    kind: "property",
                    name: format!("{name}.{}", p.name),
                });
            }
            if p.columns.is_empty() || p.columns.iter().any(String::is_empty) {
                return Err(MappingError::invalid(
                    format!("{name}.{}", p.name),
                    "a property needs at least one named column",
                ));
            }
            if p.has_reverse_index() && p.columns.iter().any(|c| id_columns.contains(c)) {
                return Err(MappingError::invalid(
                    format!("{name}.{}", p.name),
                    "an indexed property cannot reuse identifier columns",
                ));
            }
        }

        let version_index = match &version {
            None => None,
            Some(v) => {
                let i = *seen.get(v.as_str()).ok_or_else(|| MappingError::UnknownProperty {
                    entity: name.clone(),
                    property: v.clone(),
                })?;
                if properties[i].columns.len() != 1 {
                    return Err(MappingError::invalid(
                        format!("{name}.{v}"),
                        "a version property must map exactly one column",
                    ));
                }
                Some(i)
            }
        };

        let mut reverse_indexes = BTreeMap::new();
        for p in properties.iter().filter(|p| p.has_reverse_index()) {
            let mut row_key = id_columns.clone();
            row_key.extend(p.columns.iter().cloned());
            let descriptor = AssociationDescriptor::new(table.clone(), p.columns.clone(), row_key)?;
            reverse_indexes.insert(p.name.clone(), Arc::new(descriptor));
        }

        Ok(Self {
            name,
            table,
            id_columns,
            properties,
            version_index,
            optimistic_lock,
            strategy,
            reverse_indexes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Properties in declaration order.
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn version_property(&self) -> Option<&PropertyDescriptor> {
        self.version_index.map(|i| &self.properties[i])
    }

    pub fn is_versioned(&self) -> bool {
        self.version_index.is_some()
    }

    pub fn optimistic_lock(&self) -> OptimisticLockStyle {
        self.optimistic_lock
    }

    /// Returns `true` if concurrent changes are detected by comparing old
    /// property values rather than a version column.
    pub fn uses_state_comparison(&self) -> bool {
        !self.is_versioned()
            && matches!(
                self.optimistic_lock,
                OptimisticLockStyle::Dirty | OptimisticLockStyle::All
            )
    }

    pub fn strategy(&self) -> &MappingStrategy {
        &self.strategy
    }

    /// Reverse-index descriptor of a to-one or unique property.
    pub fn reverse_index(&self, property: &str) -> Option<&Arc<AssociationDescriptor>> {
        self.reverse_indexes.get(property)
    }

    /// Every reverse-index descriptor, by property name.
    pub fn reverse_indexes(&self) -> impl Iterator<Item = (&str, &Arc<AssociationDescriptor>)> {
        self.reverse_indexes.iter().map(|(p, d)| (p.as_str(), d))
    }
}

impl Identifiable for EntityMetadata {
    fn identifier_columns(&self) -> &[String] {
        &self.id_columns
    }

    fn entity_key(&self, id: &FieldValue) -> TypeResult<EntityKey> {
        EntityKey::new(
            self.table.clone(),
            self.id_columns.clone(),
            id.to_columns(self.id_columns.len())?,
        )
    }
}

impl Versionable for EntityMetadata {
    fn version_column(&self) -> Option<&str> {
        self.version_property().map(|p| p.columns[0].as_str())
    }

    fn next_version(&self, current: &Value) -> MappingResult<Value> {
        match current {
            Value::Null => Ok(Value::Int(1)),
            Value::Int(n) => n
                .checked_add(1)
                .map(Value::Int)
                .ok_or_else(|| MappingError::unsupported(&self.name, "version overflow")),
            Value::Timestamp(_) => Ok(Value::Timestamp(Utc::now())),
            other => Err(MappingError::unsupported(
                &self.name,
                format!("cannot increment a {} version", other.kind()),
            )),
        }
    }
}

impl DiscriminatorBearing for EntityMetadata {
    fn discriminator(&self) -> Option<&Discriminator> {
        self.strategy.discriminator()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    fn book() -> EntityMapping {
        EntityMapping {
            name: "Book".into(),
            table: "book".into(),
            id_columns: names(&["id"]),
            version: Some("version".into()),
            optimistic_lock: OptimisticLockStyle::Version,
            strategy: MappingStrategy::TablePerClass,
            properties: vec![
                PropertyDescriptor::basic("title", "title"),
                PropertyDescriptor::basic("version", "version"),
                PropertyDescriptor::to_one("author", names(&["author_id"]), "Author"),
            ],
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    #[test]
    fn builds_reverse_index_for_to_one() {
        let meta = EntityMetadata::from_mapping(book()).unwrap();
        let d = meta.reverse_index("author").expect("to-one is indexed");
        assert_eq!(d.table(), "book");
        assert_eq!(d.owner_key_columns(), names(&["author_id"]).as_slice());
        assert_eq!(d.row_key_columns(), names(&["id", "author_id"]).as_slice());
        assert!(meta.reverse_index("title").is_none());
    }

    #[test]
    fn unique_property_is_indexed() {
        let mut m = book();
        m.properties[0].unique = true;
        let meta = EntityMetadata::from_mapping(m).unwrap();
        assert_eq!(meta.reverse_indexes().count(), 2);
    }

    #[test]
    fn rejects_missing_identifier() {
        let mut m = book();
        m.id_columns.clear();
        assert!(matches!(
            EntityMetadata::from_mapping(m),
            Err(MappingError::Invalid { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_property() {
        let mut m = book();
        m.properties.push(PropertyDescriptor::basic("title", "title2"));
        assert!(matches!(
            EntityMetadata::from_mapping(m),
            Err(MappingError::Duplicate { kind: "property", .. })
        ));
    }

    #[test]
    fn rejects_unknown_version_property() {
        let mut m = book();
        m.version = Some("revision".into());
        assert!(matches!(
            EntityMetadata::from_mapping(m),
            Err(MappingError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn rejects_composite_version() {
        let mut m = book();
        m.properties[1].columns = names(&["v1", "v2"]);
        assert!(EntityMetadata::from_mapping(m).is_err());
    }

    #[test]
    fn rejects_indexed_property_on_identifier_columns() {
        let mut m = book();
        m.properties[2].columns = names(&["id"]);
        assert!(EntityMetadata::from_mapping(m).is_err());
    }

    // -----------------------------------------------------------------------
    // Capabilities
    // -----------------------------------------------------------------------

    #[test]
    fn entity_key_from_identifier() {
        let meta = EntityMetadata::from_mapping(book()).unwrap();
        let key = meta.entity_key(&FieldValue::from(1)).unwrap();
        assert_eq!(key.to_string(), "book{id=1}");
        assert!(meta.entity_key(&FieldValue::Composite(vec![Value::Int(1), Value::Int(2)])).is_err());
    }

    #[test]
    fn next_version_arithmetic() {
        let meta = EntityMetadata::from_mapping(book()).unwrap();
        assert_eq!(meta.version_column(), Some("version"));
        assert_eq!(meta.next_version(&Value::Null).unwrap(), Value::Int(1));
        assert_eq!(meta.next_version(&Value::Int(41)).unwrap(), Value::Int(42));
        let before = Utc::now();
        match meta.next_version(&Value::Timestamp(before)).unwrap() {
            Value::Timestamp(t) => assert!(t >= before),
            other => panic!("expected timestamp, got {other:?}"),
        }
        assert!(matches!(
            meta.next_version(&Value::from("v1")),
            Err(MappingError::UnsupportedShape { .. })
        ));
        assert!(meta.next_version(&Value::Int(i64::MAX)).is_err());
    }

    #[test]
    fn discriminator_follows_strategy() {
        assert!(MappingStrategy::TablePerClass.discriminator().is_none());
        let single = MappingStrategy::SingleTable {
            discriminator: Some(Discriminator {
                column: "dtype".into(),
                value: Value::from("BOOK"),
            }),
        };
        assert_eq!(single.discriminator().map(|d| d.column.as_str()), Some("dtype"));
    }

    #[test]
    fn state_comparison_only_without_version() {
        let mut m = book();
        m.optimistic_lock = OptimisticLockStyle::All;
        assert!(!EntityMetadata::from_mapping(m.clone()).unwrap().uses_state_comparison());
        m.version = None;
        assert!(EntityMetadata::from_mapping(m).unwrap().uses_state_comparison());
    }
}
