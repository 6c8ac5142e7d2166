//! Collection mapping metadata.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tgrid_types::{AssociationDescriptor, AssociationKey, FieldValue, TypeResult};

use crate::entity::{EntityMetadata, Identifiable};
use crate::error::{MappingError, MappingResult};
use crate::row_key::{RowKeyBuilder, ShapeFlags};

fn yes() -> bool {
    true
}

/// The element side of a collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementMapping {
    pub columns: Vec<String>,
    /// Target entity when the elements are entity references.
    #[serde(default)]
    pub entity: Option<String>,
    /// The element is a read-only projection.
    #[serde(default)]
    pub formula: bool,
    #[serde(default = "yes")]
    pub updatable: bool,
}

/// The index (list position or map key) of an indexed collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMapping {
    pub columns: Vec<String>,
    #[serde(default)]
    pub formula: bool,
    /// Offset added to integer indexes when they are stored.
    #[serde(default)]
    pub base: i64,
}

/// Collection definition as written in a mapping document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMapping {
    /// Unique role name, conventionally `Owner.property`.
    pub role: String,
    /// Owning entity.
    pub owner: String,
    pub table: String,
    /// Columns referencing the owner's identifier.
    pub key_columns: Vec<String>,
    pub element: ElementMapping,
    #[serde(default)]
    pub index: Option<IndexMapping>,
    #[serde(default)]
    pub identifier_column: Option<String>,
    /// The rows live on the element entity's own records.
    #[serde(default)]
    pub one_to_many: bool,
    /// The non-owning side of a bidirectional association.
    #[serde(default)]
    pub inverse: bool,
    #[serde(default = "yes")]
    pub row_insert_enabled: bool,
    #[serde(default = "yes")]
    pub row_delete_enabled: bool,
}

/// A referenced entity, reduced to what locating its record needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity: String,
    pub table: String,
    pub id_columns: Vec<String>,
}

impl EntityRef {
    fn of(meta: &EntityMetadata) -> Self {
        Self {
            entity: meta.name().to_string(),
            table: meta.table().to_string(),
            id_columns: meta.identifier_columns().to_vec(),
        }
    }
}

/// Where the other side of an association is stored, fixed when the mapping is built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssociationShape {
    /// The association row is the target entity's own record.
    EmbeddedForeignKey { target: EntityRef },
    /// The association lives in its own table and is mirrored under the
    /// element's identifier.
    AssociationTable {
        target: EntityRef,
        mirror: Arc<AssociationDescriptor>,
    },
    /// Values or embeddables; there is no other side.
    NonEntity,
}

impl AssociationShape {
    pub fn name(&self) -> &'static str {
        match self {
            Self::EmbeddedForeignKey { .. } => "embedded-foreign-key",
            Self::AssociationTable { .. } => "association-table",
            Self::NonEntity => "non-entity",
        }
    }

    /// Returns `true` if row changes must be propagated to another record.
    pub fn needs_sync(&self) -> bool {
        !matches!(self, Self::NonEntity)
    }
}

/// How a stored row is located when it is updated or deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowLocatorKind {
    Identifier,
    Index,
    Element,
}

/// Immutable, validated metadata of one collection role.
#[derive(Clone, Debug)]
pub struct CollectionMetadata {
    mapping: CollectionMapping,
    flags: ShapeFlags,
    row_key: RowKeyBuilder,
    descriptor: Arc<AssociationDescriptor>,
    shape: AssociationShape,
}

impl CollectionMetadata {
    /// Validate a collection against its owner and (for entity elements) its target.
    pub fn from_mapping(
        mapping: CollectionMapping,
        owner: &EntityMetadata,
        target: Option<&EntityMetadata>,
    ) -> MappingResult<Self> {
        let role = mapping.role.clone();

        if mapping.key_columns.len() != owner.identifier_columns().len() {
            return Err(MappingError::invalid(
                &role,
                format!(
                    "{} key columns for an owner identifier of {}",
                    mapping.key_columns.len(),
                    owner.identifier_columns().len()
                ),
            ));
        }
        if mapping.element.columns.is_empty() {
            return Err(MappingError::invalid(&role, "no element columns"));
        }
        if let Some(index) = &mapping.index {
            if index.columns.is_empty() {
                return Err(MappingError::invalid(&role, "no index columns"));
            }
        }

        let flags = ShapeFlags {
            has_identifier: mapping.identifier_column.is_some(),
            has_index: mapping.index.is_some(),
            index_formula: mapping.index.as_ref().is_some_and(|i| i.formula),
            one_to_many: mapping.one_to_many,
            element_formula: mapping.element.formula,
        };

        let index_columns = mapping
            .index
            .as_ref()
            .map(|i| i.columns.clone())
            .unwrap_or_default();
        let row_key = RowKeyBuilder::for_collection(
            &mapping.table,
            &mapping.key_columns,
            mapping.identifier_column.as_deref(),
            &index_columns,
            &mapping.element.columns,
            flags,
        )
        .map_err(|_| {
            MappingError::unsupported(&role, "a formula element cannot be part of a row key")
        })?;

        let descriptor = match &mapping.identifier_column {
            Some(id) => AssociationDescriptor::identifier_keyed(
                mapping.table.clone(),
                mapping.key_columns.clone(),
                id.clone(),
            )?,
            None => AssociationDescriptor::new(
                mapping.table.clone(),
                mapping.key_columns.clone(),
                row_key.columns().to_vec(),
            )?
            .with_index_columns(row_key.index_columns().to_vec())?,
        };

        let shape = match (target, mapping.one_to_many) {
            (None, true) => {
                return Err(MappingError::unsupported(
                    &role,
                    "a one-to-many collection needs entity elements",
                ))
            }
            (None, false) => AssociationShape::NonEntity,
            (Some(target), one_to_many) => {
                if mapping.element.columns.len() != target.identifier_columns().len() {
                    return Err(MappingError::invalid(
                        &role,
                        format!(
                            "{} element columns for a {} identifier of {}",
                            mapping.element.columns.len(),
                            target.name(),
                            target.identifier_columns().len()
                        ),
                    ));
                }
                if one_to_many {
                    if mapping.table != target.table() {
                        return Err(MappingError::invalid(
                            &role,
                            format!(
                                "a one-to-many must use the table of {} ({})",
                                target.name(),
                                target.table()
                            ),
                        ));
                    }
                    AssociationShape::EmbeddedForeignKey {
                        target: EntityRef::of(target),
                    }
                } else {
                    AssociationShape::AssociationTable {
                        target: EntityRef::of(target),
                        mirror: Arc::new(mirror_descriptor(&mapping, &row_key)?),
                    }
                }
            }
        };

        Ok(Self {
            mapping,
            flags,
            row_key,
            descriptor: Arc::new(descriptor),
            shape,
        })
    }

    pub fn role(&self) -> &str {
        &self.mapping.role
    }

    pub fn owner(&self) -> &str {
        &self.mapping.owner
    }

    pub fn table(&self) -> &str {
        &self.mapping.table
    }

    pub fn key_columns(&self) -> &[String] {
        &self.mapping.key_columns
    }

    pub fn element(&self) -> &ElementMapping {
        &self.mapping.element
    }

    pub fn index(&self) -> Option<&IndexMapping> {
        self.mapping.index.as_ref()
    }

    pub fn identifier_column(&self) -> Option<&str> {
        self.mapping.identifier_column.as_deref()
    }

    pub fn is_one_to_many(&self) -> bool {
        self.mapping.one_to_many
    }

    pub fn is_inverse(&self) -> bool {
        self.mapping.inverse
    }

    pub fn row_insert_enabled(&self) -> bool {
        self.mapping.row_insert_enabled
    }

    pub fn row_delete_enabled(&self) -> bool {
        self.mapping.row_delete_enabled
    }

    pub fn flags(&self) -> ShapeFlags {
        self.flags
    }

    pub fn row_key(&self) -> &RowKeyBuilder {
        &self.row_key
    }

    pub fn descriptor(&self) -> &Arc<AssociationDescriptor> {
        &self.descriptor
    }

    pub fn shape(&self) -> &AssociationShape {
        &self.shape
    }

    /// How rows are located for update and delete.
    pub fn locator(&self) -> RowLocatorKind {
        if self.flags.has_identifier {
            RowLocatorKind::Identifier
        } else if self.flags.keyed_by_index() {
            RowLocatorKind::Index
        } else {
            RowLocatorKind::Element
        }
    }

    /// The association instance owned by the entity with identifier `owner_id`.
    pub fn association_key(&self, owner_id: &FieldValue) -> TypeResult<AssociationKey> {
        AssociationKey::new(
            Arc::clone(&self.descriptor),
            owner_id.to_columns(self.mapping.key_columns.len())?,
        )
    }
}

/// The descriptor of the mirrored side: the same table, owned by the element
/// columns. Its row key is the element columns followed by the remaining
/// row-key columns, which is also the row key the inverse collection of a
/// plain association table computes for itself.
fn mirror_descriptor(
    mapping: &CollectionMapping,
    row_key: &RowKeyBuilder,
) -> MappingResult<AssociationDescriptor> {
    let element = &mapping.element.columns;
    let mut row_columns = element.clone();
    for column in row_key.columns() {
        if !row_columns.contains(column) {
            row_columns.push(column.clone());
        }
    }
    Ok(AssociationDescriptor::new(
        mapping.table.clone(),
        element.clone(),
        row_columns,
    )?)
}

#[cfg(test)]
mod tests {
    use tgrid_types::Value;

    use super::*;
    use crate::entity::{EntityMapping, PropertyDescriptor};

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    fn entity(name: &str, table: &str) -> EntityMetadata {
        EntityMetadata::from_mapping(EntityMapping {
            name: name.into(),
            table: table.into(),
            id_columns: names(&["id"]),
            version: None,
            optimistic_lock: Default::default(),
            strategy: Default::default(),
            properties: vec![PropertyDescriptor::basic("name", "name")],
        })
        .unwrap()
    }

    fn mapping(table: &str, element: &[&str], entity: Option<&str>) -> CollectionMapping {
        CollectionMapping {
            role: "Owner.items".into(),
            owner: "Owner".into(),
            table: table.into(),
            key_columns: names(&["owner_id"]),
            element: ElementMapping {
                columns: names(element),
                entity: entity.map(str::to_string),
                formula: false,
                updatable: true,
            },
            index: None,
            identifier_column: None,
            one_to_many: false,
            inverse: false,
            row_insert_enabled: true,
            row_delete_enabled: true,
        }
    }

    // -----------------------------------------------------------------------
    // Shapes
    // -----------------------------------------------------------------------

    #[test]
    fn value_collection_has_no_other_side() {
        let owner = entity("Owner", "owner");
        let meta = CollectionMetadata::from_mapping(mapping("tags", &["tag"], None), &owner, None).unwrap();
        assert_eq!(meta.shape(), &AssociationShape::NonEntity);
        assert!(!meta.shape().needs_sync());
        assert_eq!(meta.locator(), RowLocatorKind::Element);
        assert_eq!(meta.descriptor().row_key_columns(), names(&["owner_id", "tag"]).as_slice());
    }

    #[test]
    fn one_to_many_embeds_foreign_key() {
        let owner = entity("Owner", "owner");
        let item = entity("Item", "item");
        let mut m = mapping("item", &["id"], Some("Item"));
        m.one_to_many = true;
        let meta = CollectionMetadata::from_mapping(m, &owner, Some(&item)).unwrap();
        match meta.shape() {
            AssociationShape::EmbeddedForeignKey { target } => {
                assert_eq!(target.table, "item");
                assert_eq!(target.id_columns, names(&["id"]));
            }
            other => panic!("unexpected shape {other:?}"),
        }
    }

    #[test]
    fn one_to_many_must_use_target_table() {
        let owner = entity("Owner", "owner");
        let item = entity("Item", "item");
        let mut m = mapping("owner_items", &["id"], Some("Item"));
        m.one_to_many = true;
        assert!(CollectionMetadata::from_mapping(m, &owner, Some(&item)).is_err());
    }

    #[test]
    fn one_to_many_of_values_is_unsupported() {
        let owner = entity("Owner", "owner");
        let mut m = mapping("tags", &["tag"], None);
        m.one_to_many = true;
        assert!(matches!(
            CollectionMetadata::from_mapping(m, &owner, None),
            Err(MappingError::UnsupportedShape { .. })
        ));
    }

    #[test]
    fn many_to_many_mirrors_by_element() {
        let owner = entity("Owner", "owner");
        let item = entity("Item", "item");
        let m = mapping("owner_item", &["item_id"], Some("Item"));
        let meta = CollectionMetadata::from_mapping(m, &owner, Some(&item)).unwrap();
        match meta.shape() {
            AssociationShape::AssociationTable { mirror, .. } => {
                assert_eq!(mirror.owner_key_columns(), names(&["item_id"]).as_slice());
                assert_eq!(mirror.row_key_columns(), names(&["item_id", "owner_id"]).as_slice());
            }
            other => panic!("unexpected shape {other:?}"),
        }
    }

    #[test]
    fn indexed_many_to_many_mirror_includes_element() {
        let owner = entity("Owner", "owner");
        let item = entity("Item", "item");
        let mut m = mapping("owner_item", &["item_id"], Some("Item"));
        m.index = Some(IndexMapping {
            columns: names(&["position"]),
            formula: false,
            base: 0,
        });
        let meta = CollectionMetadata::from_mapping(m, &owner, Some(&item)).unwrap();
        assert_eq!(meta.locator(), RowLocatorKind::Index);
        assert_eq!(meta.descriptor().row_key_index_columns(), &["position".to_string()]);
        match meta.shape() {
            AssociationShape::AssociationTable { mirror, .. } => assert_eq!(
                mirror.row_key_columns(),
                names(&["item_id", "owner_id", "position"]).as_slice()
            ),
            other => panic!("unexpected shape {other:?}"),
        }
    }

    #[test]
    fn identifier_keyed_collection() {
        let owner = entity("Owner", "owner");
        let mut m = mapping("tags", &["tag"], None);
        m.identifier_column = Some("row_id".into());
        let meta = CollectionMetadata::from_mapping(m, &owner, None).unwrap();
        assert!(meta.descriptor().is_identifier_keyed());
        assert_eq!(meta.locator(), RowLocatorKind::Identifier);
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    #[test]
    fn key_arity_must_match_owner() {
        let owner = entity("Owner", "owner");
        let mut m = mapping("tags", &["tag"], None);
        m.key_columns = names(&["a", "b"]);
        assert!(CollectionMetadata::from_mapping(m, &owner, None).is_err());
    }

    #[test]
    fn element_arity_must_match_target() {
        let owner = entity("Owner", "owner");
        let item = entity("Item", "item");
        let m = mapping("owner_item", &["a", "b"], Some("Item"));
        assert!(CollectionMetadata::from_mapping(m, &owner, Some(&item)).is_err());
    }

    #[test]
    fn formula_element_key_is_rejected_eagerly() {
        let owner = entity("Owner", "owner");
        let mut m = mapping("tags", &["tag"], None);
        m.element.formula = true;
        assert!(matches!(
            CollectionMetadata::from_mapping(m, &owner, None),
            Err(MappingError::UnsupportedShape { .. })
        ));
    }

    #[test]
    fn association_key_for_owner() {
        let owner = entity("Owner", "owner");
        let meta = CollectionMetadata::from_mapping(mapping("tags", &["tag"], None), &owner, None).unwrap();
        let key = meta.association_key(&FieldValue::from(3)).unwrap();
        assert_eq!(key.owner_values(), &[Value::Int(3)]);
    }
}
