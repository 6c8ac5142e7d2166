//! TOML mapping documents.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collection::{CollectionMapping, CollectionMetadata};
use crate::entity::{DiscriminatorBearing, EntityMapping, EntityMetadata, Identifiable};
use crate::error::{MappingError, MappingResult};
use crate::mappings::Mappings;

/// A mapping document: every entity and collection of one persistence unit.
///
/// ```toml
/// [[entities]]
/// name = "Author"
/// table = "author"
/// id_columns = ["id"]
///
/// [[entities.properties]]
/// name = "name"
/// columns = ["name"]
///
/// [[collections]]
/// role = "Author.books"
/// owner = "Author"
/// table = "book"
/// key_columns = ["author_id"]
/// one_to_many = true
/// element = { columns = ["id"], entity = "Book" }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingDocument {
    #[serde(default)]
    pub entities: Vec<EntityMapping>,
    #[serde(default)]
    pub collections: Vec<CollectionMapping>,
}

impl MappingDocument {
    pub fn from_toml_str(source: &str) -> MappingResult<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Read and parse a mapping document from disk.
    pub fn load(path: impl AsRef<Path>) -> MappingResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| MappingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), bytes = source.len(), "loading mapping document");
        Self::from_toml_str(&source)
    }

    /// Validate the document and freeze it into [`Mappings`].
    pub fn build(self) -> MappingResult<Mappings> {
        let mut entities: BTreeMap<String, Arc<EntityMetadata>> = BTreeMap::new();
        for mapping in self.entities {
            let name = mapping.name.clone();
            if entities.contains_key(&name) {
                return Err(MappingError::Duplicate {
                    kind: "entity",
                    name,
                });
            }
            let meta = EntityMetadata::from_mapping(mapping)?;
            entities.insert(name, Arc::new(meta));
        }

        check_references(&entities)?;
        check_discriminators(&entities)?;

        let mut collections: BTreeMap<String, Arc<CollectionMetadata>> = BTreeMap::new();
        for mapping in self.collections {
            let role = mapping.role.clone();
            if collections.contains_key(&role) {
                return Err(MappingError::Duplicate {
                    kind: "collection",
                    name: role,
                });
            }
            let owner = lookup(&entities, &role, &mapping.owner)?;
            let target = match &mapping.element.entity {
                Some(name) => Some(lookup(&entities, &role, name)?),
                None => None,
            };
            let meta = CollectionMetadata::from_mapping(mapping, owner, target.map(Arc::as_ref))?;
            collections.insert(role, Arc::new(meta));
        }

        debug!(
            entities = entities.len(),
            collections = collections.len(),
            "mappings built"
        );
        Ok(Mappings::new(entities, collections))
    }
}

fn lookup<'a>(
    entities: &'a BTreeMap<String, Arc<EntityMetadata>>,
    referenced_by: &str,
    name: &str,
) -> MappingResult<&'a Arc<EntityMetadata>> {
    entities.get(name).ok_or_else(|| MappingError::UnknownEntity {
        referenced_by: referenced_by.to_string(),
        name: name.to_string(),
    })
}

/// To-one properties must point at mapped entities with a matching identifier arity.
fn check_references(entities: &BTreeMap<String, Arc<EntityMetadata>>) -> MappingResult<()> {
    for meta in entities.values() {
        for p in meta.properties() {
            let Some(target) = &p.references else { continue };
            let referenced_by = format!("{}.{}", meta.name(), p.name);
            let target = lookup(entities, &referenced_by, target)?;
            if target.identifier_columns().len() != p.columns.len() {
                return Err(MappingError::invalid(
                    referenced_by,
                    format!(
                        "{} columns for a {} identifier of {}",
                        p.columns.len(),
                        target.name(),
                        target.identifier_columns().len()
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Entities sharing a table must be told apart by distinct discriminator values.
fn check_discriminators(entities: &BTreeMap<String, Arc<EntityMetadata>>) -> MappingResult<()> {
    let mut seen = BTreeSet::new();
    for meta in entities.values() {
        if let Some(d) = meta.discriminator() {
            if !seen.insert((meta.table(), d.column.as_str(), &d.value)) {
                return Err(MappingError::Duplicate {
                    kind: "discriminator value",
                    name: format!("{}.{}={}", meta.table(), d.column, d.value),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tgrid_types::Value;

    use super::*;
    use crate::collection::AssociationShape;
    use crate::entity::{MappingStrategy, OptimisticLockStyle};

    const LIBRARY: &str = r#"
[[entities]]
name = "Author"
table = "author"
id_columns = ["id"]

[[entities.properties]]
name = "name"
columns = ["name"]

[[entities]]
name = "Book"
table = "book"
id_columns = ["id"]
version = "version"

[entities.strategy]
kind = "single_table"
discriminator = { column = "dtype", value = "BOOK" }

[[entities.properties]]
name = "title"
columns = ["title"]
nullable = false

[[entities.properties]]
name = "version"
columns = ["version"]

[[entities.properties]]
name = "author"
columns = ["author_id"]
references = "Author"

[[collections]]
role = "Author.books"
owner = "Author"
table = "book"
key_columns = ["author_id"]
one_to_many = true
inverse = true
element = { columns = ["id"], entity = "Book" }

[[collections]]
role = "Book.tags"
owner = "Book"
table = "book_tags"
key_columns = ["book_id"]
element = { columns = ["tag"] }
"#;

    // -----------------------------------------------------------------------
    // Parsing
    // -----------------------------------------------------------------------

    #[test]
    fn parses_with_defaults() {
        let doc = MappingDocument::from_toml_str(LIBRARY).unwrap();
        assert_eq!(doc.entities.len(), 2);
        let author = &doc.entities[0];
        assert_eq!(author.strategy, MappingStrategy::TablePerClass);
        assert_eq!(author.optimistic_lock, OptimisticLockStyle::Version);
        let name = &author.properties[0];
        assert!(name.insertable && name.updatable && name.selectable && name.nullable);
        assert!(!name.lazy && !name.unique);
        let tags = &doc.collections[1];
        assert!(tags.row_insert_enabled && tags.element.updatable);
        assert!(tags.index.is_none());
    }

    #[test]
    fn parses_single_table_strategy() {
        let doc = MappingDocument::from_toml_str(LIBRARY).unwrap();
        let d = doc.entities[1].strategy.discriminator().unwrap();
        assert_eq!(d.column, "dtype");
        assert_eq!(d.value, Value::from("BOOK"));
    }

    #[test]
    fn malformed_document_is_rejected() {
        let err = MappingDocument::from_toml_str("[[entities]]\nname = 3").unwrap_err();
        assert!(matches!(err, MappingError::Toml(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(LIBRARY.as_bytes()).unwrap();
        let doc = MappingDocument::load(file.path()).unwrap();
        assert_eq!(doc.collections.len(), 2);
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = MappingDocument::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, MappingError::Io { .. }));
    }

    // -----------------------------------------------------------------------
    // Building
    // -----------------------------------------------------------------------

    #[test]
    fn builds_mappings() {
        let mappings = MappingDocument::from_toml_str(LIBRARY).unwrap().build().unwrap();
        assert_eq!(mappings.entity_count(), 2);
        assert_eq!(mappings.collection_count(), 2);
        let books = mappings.collection("Author.books").unwrap();
        assert!(matches!(books.shape(), AssociationShape::EmbeddedForeignKey { .. }));
        assert!(books.is_inverse());
    }

    #[test]
    fn rejects_duplicate_entity() {
        let mut doc = MappingDocument::from_toml_str(LIBRARY).unwrap();
        let copy = doc.entities[0].clone();
        doc.entities.push(copy);
        assert!(matches!(
            doc.build(),
            Err(MappingError::Duplicate { kind: "entity", .. })
        ));
    }

    #[test]
    fn rejects_duplicate_role() {
        let mut doc = MappingDocument::from_toml_str(LIBRARY).unwrap();
        let copy = doc.collections[1].clone();
        doc.collections.push(copy);
        assert!(matches!(
            doc.build(),
            Err(MappingError::Duplicate { kind: "collection", .. })
        ));
    }

    #[test]
    fn rejects_unknown_to_one_target() {
        let mut doc = MappingDocument::from_toml_str(LIBRARY).unwrap();
        doc.entities[1].properties[2].references = Some("Publisher".into());
        assert!(matches!(doc.build(), Err(MappingError::UnknownEntity { .. })));
    }

    #[test]
    fn rejects_to_one_arity_mismatch() {
        let mut doc = MappingDocument::from_toml_str(LIBRARY).unwrap();
        doc.entities[1].properties[2].columns = vec!["a".into(), "b".into()];
        assert!(matches!(doc.build(), Err(MappingError::Invalid { .. })));
    }

    #[test]
    fn rejects_unknown_owner() {
        let mut doc = MappingDocument::from_toml_str(LIBRARY).unwrap();
        doc.collections[1].owner = "Shelf".into();
        assert!(matches!(doc.build(), Err(MappingError::UnknownEntity { .. })));
    }

    #[test]
    fn rejects_clashing_discriminators() {
        let mut doc = MappingDocument::from_toml_str(LIBRARY).unwrap();
        let mut other = doc.entities[1].clone();
        other.name = "Novel".into();
        doc.entities.push(other);
        assert!(matches!(
            doc.build(),
            Err(MappingError::Duplicate { kind: "discriminator value", .. })
        ));
    }
}
