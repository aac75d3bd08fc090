//! Schema construction and validation.
//!
//! A [`Schema`] is built once, in two phases: every entity gets a shell
//! (name, channel, attributes) and a key first, then relationship edges are
//! wired by key. Relationships can therefore point at entities declared
//! later. Derived data (`references_to_me`, embedding templates) is computed
//! last, after validation.

use super::{
    Cardinality, Embedding, EntityAttribute, EntityDefinition, EntityKey, EntityMetadata,
    EntityRelationship, Ownership, RelationshipKind, RelationshipRef, SchemaDefinition,
};
use crate::error::{CoreError, CoreResult};
use crate::path::{child_key, ANY_INDEX};
use relstore_storage::{is_identifier, Channel};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// The immutable metadata graph of every entity.
#[derive(Debug, Clone)]
pub struct Schema {
    entities: Vec<EntityMetadata>,
    by_name: HashMap<String, EntityKey>,
}

impl Schema {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Builds a schema from a definition.
    pub fn from_definition(definition: SchemaDefinition) -> CoreResult<Self> {
        SchemaBuilder {
            definitions: definition.entities,
        }
        .build()
    }

    /// Parses and builds a JSON schema definition.
    pub fn from_json(text: &str) -> CoreResult<Self> {
        let definition: SchemaDefinition =
            serde_json::from_str(text).map_err(|e| CoreError::schema(e.to_string()))?;
        Self::from_definition(definition)
    }

    /// Returns the entity for `key`.
    ///
    /// # Panics
    ///
    /// Panics if `key` comes from another schema with fewer entities.
    #[must_use]
    pub fn entity(&self, key: EntityKey) -> &EntityMetadata {
        &self.entities[key.0]
    }

    /// Looks an entity up by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&EntityMetadata> {
        self.by_name.get(name).map(|k| self.entity(*k))
    }

    /// Looks an entity up by name, failing with a usage error.
    pub fn require(&self, name: &str) -> CoreResult<&EntityMetadata> {
        self.lookup(name)
            .ok_or_else(|| CoreError::usage(format!("unknown entity {name:?}")))
    }

    /// Iterates over the entities in declaration order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityMetadata> {
        self.entities.iter()
    }

    /// Resolves a relationship reference.
    #[must_use]
    pub fn relationship(&self, r: RelationshipRef) -> &EntityRelationship {
        &self.entity(r.entity).relationships[r.index]
    }
}

/// Collects entity definitions and builds a validated [`Schema`].
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    definitions: Vec<EntityDefinition>,
}

impl SchemaBuilder {
    /// Adds an entity definition.
    #[must_use]
    pub fn entity(mut self, definition: EntityDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Validates the definitions and builds the schema.
    pub fn build(self) -> CoreResult<Schema> {
        let (mut entities, by_name) = build_shells(&self.definitions)?;
        wire_relationships(&mut entities, &by_name, &self.definitions)?;
        check_internal_targets(&entities)?;
        check_acyclic(&entities)?;
        check_top_level_mapped_by(&entities)?;

        let embeddings = compute_embeddings(&entities);
        check_internal_mapped_by(&entities, &embeddings)?;
        for (target, embedding, _) in embeddings {
            entities[target.0].embeddings.push(embedding);
        }

        let mut incoming: Vec<Vec<RelationshipRef>> = vec![Vec::new(); entities.len()];
        for entity in &entities {
            for (index, rel) in entity.relationships.iter().enumerate() {
                incoming[rel.target.0].push(RelationshipRef {
                    entity: entity.key,
                    index,
                });
            }
        }
        for (entity, refs) in entities.iter_mut().zip(incoming) {
            entity.references_to_me = refs;
        }

        debug!(entities = entities.len(), "schema built");
        Ok(Schema { entities, by_name })
    }
}

fn build_shells(
    definitions: &[EntityDefinition],
) -> CoreResult<(Vec<EntityMetadata>, HashMap<String, EntityKey>)> {
    let mut entities = Vec::with_capacity(definitions.len());
    let mut by_name = HashMap::new();
    let mut channels = HashSet::new();

    for (index, def) in definitions.iter().enumerate() {
        if !is_identifier(&def.name) {
            return Err(CoreError::schema(format!("invalid entity name {:?}", def.name)));
        }
        let key = EntityKey(index);
        if by_name.insert(def.name.clone(), key).is_some() {
            return Err(CoreError::schema(format!("duplicate entity {:?}", def.name)));
        }

        let channel = if def.internal {
            None
        } else {
            let name = def.channel.clone().unwrap_or_else(|| def.name.clone());
            let channel = Channel::new(name.as_str())
                .map_err(|_| CoreError::schema(format!("invalid channel {name:?} for {}", def.name)))?;
            if !channels.insert(name.clone()) {
                return Err(CoreError::schema(format!("duplicate channel {name:?}")));
            }
            Some(channel)
        };

        let mut names = HashSet::new();
        let mut attributes = Vec::with_capacity(def.attributes.len());
        for attr in &def.attributes {
            check_field_name(&def.name, &attr.name, &mut names)?;
            attributes.push(EntityAttribute {
                name: attr.name.clone(),
                ty: attr.ty,
            });
        }
        for rel in &def.relationships {
            check_field_name(&def.name, &rel.name, &mut names)?;
        }

        entities.push(EntityMetadata {
            key,
            name: def.name.clone(),
            channel,
            internal: def.internal,
            attributes,
            relationships: Vec::new(),
            references_to_me: Vec::new(),
            embeddings: Vec::new(),
        });
    }
    Ok((entities, by_name))
}

fn check_field_name(entity: &str, name: &str, seen: &mut HashSet<String>) -> CoreResult<()> {
    if !is_identifier(name) {
        return Err(CoreError::schema(format!("invalid field name {entity}.{name:?}")));
    }
    if !seen.insert(name.to_string()) {
        return Err(CoreError::schema(format!("duplicate field {entity}.{name}")));
    }
    Ok(())
}

fn wire_relationships(
    entities: &mut [EntityMetadata],
    by_name: &HashMap<String, EntityKey>,
    definitions: &[EntityDefinition],
) -> CoreResult<()> {
    for (entity, def) in entities.iter_mut().zip(definitions) {
        for rel in &def.relationships {
            let target = *by_name.get(&rel.target).ok_or_else(|| {
                CoreError::schema(format!(
                    "{}.{} targets unknown entity {:?}",
                    def.name, rel.name, rel.target
                ))
            })?;
            let cardinality = if rel.array {
                Cardinality::Array
            } else {
                Cardinality::Single
            };
            let kind = match rel.ownership {
                Ownership::Association => RelationshipKind::Association(cardinality),
                Ownership::Composition => RelationshipKind::Composition(cardinality),
            };
            entity.relationships.push(EntityRelationship {
                name: rel.name.clone(),
                target,
                kind,
                mapped_by: rel.mapped_by.clone(),
            });
        }
    }
    Ok(())
}

fn check_internal_targets(entities: &[EntityMetadata]) -> CoreResult<()> {
    for entity in entities {
        for rel in &entity.relationships {
            if !entities[rel.target.0].internal {
                continue;
            }
            if !rel.is_composition() {
                return Err(CoreError::schema(format!(
                    "{}.{} targets internal entity {} and must be a composition",
                    entity.name, rel.name, entities[rel.target.0].name
                )));
            }
            if rel.mapped_by.is_some() {
                return Err(CoreError::schema(format!(
                    "{}.{} targets internal entity {} and cannot be mapped by a field",
                    entity.name, rel.name, entities[rel.target.0].name
                )));
            }
        }
    }
    Ok(())
}

fn check_acyclic(entities: &[EntityMetadata]) -> CoreResult<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        Active,
        Done,
    }

    fn visit(entities: &[EntityMetadata], marks: &mut [Mark], key: EntityKey) -> CoreResult<()> {
        match marks[key.0] {
            Mark::Done => return Ok(()),
            Mark::Active => {
                return Err(CoreError::schema(format!(
                    "internal entity {} embeds itself",
                    entities[key.0].name
                )))
            }
            Mark::Unvisited => {}
        }
        marks[key.0] = Mark::Active;
        for rel in &entities[key.0].relationships {
            if entities[rel.target.0].internal {
                visit(entities, marks, rel.target)?;
            }
        }
        marks[key.0] = Mark::Done;
        Ok(())
    }

    let mut marks = vec![Mark::Unvisited; entities.len()];
    for entity in entities {
        visit(entities, &mut marks, entity.key)?;
    }
    Ok(())
}

fn check_top_level_mapped_by(entities: &[EntityMetadata]) -> CoreResult<()> {
    for entity in entities.iter().filter(|e| !e.internal) {
        for rel in &entity.relationships {
            let Some(field) = &rel.mapped_by else {
                continue;
            };
            let target = &entities[rel.target.0];
            let back = target.relationship(field).ok_or_else(|| {
                CoreError::schema(format!(
                    "{}.{} is mapped by {}.{field}, which does not exist",
                    entity.name, rel.name, target.name
                ))
            })?;
            let valid = back.is_source_owned()
                && !back.is_array()
                && back.target == entity.key;
            if !valid {
                return Err(CoreError::schema(format!(
                    "{}.{field} must be a singular, source-owned relationship to {}",
                    target.name, entity.name
                )));
            }
        }
    }
    Ok(())
}

/// One embedding of an internal entity plus the owner of every template
/// segment, outermost first.
type EmbeddingChain = (EntityKey, Embedding, Vec<(String, EntityKey)>);

fn compute_embeddings(entities: &[EntityMetadata]) -> Vec<EmbeddingChain> {
    fn walk(
        entities: &[EntityMetadata],
        root: EntityKey,
        owner: EntityKey,
        prefix: &str,
        chain: &[(String, EntityKey)],
        out: &mut Vec<EmbeddingChain>,
    ) {
        for rel in &entities[owner.0].relationships {
            let target = &entities[rel.target.0];
            if !target.internal {
                continue;
            }
            let mut template = child_key(prefix, &rel.name);
            if rel.is_array() {
                template.push_str(ANY_INDEX);
            }
            let mut next_chain = chain.to_vec();
            next_chain.push((rel.name.clone(), owner));
            out.push((
                target.key,
                Embedding {
                    root,
                    template: template.clone(),
                },
                next_chain.clone(),
            ));
            walk(entities, root, target.key, &template, &next_chain, out);
        }
    }

    let mut out = Vec::new();
    for root in entities.iter().filter(|e| !e.internal) {
        walk(entities, root.key, root.key, "", &[], &mut out);
    }
    out
}

fn check_internal_mapped_by(
    entities: &[EntityMetadata],
    embeddings: &[EmbeddingChain],
) -> CoreResult<()> {
    for entity in entities.iter().filter(|e| e.internal) {
        for rel in &entity.relationships {
            let Some(field) = &rel.mapped_by else {
                continue;
            };
            if rel.is_array() {
                return Err(CoreError::schema(format!(
                    "{}.{} refers back to an owner and must be singular",
                    entity.name, rel.name
                )));
            }
            let reachable = embeddings
                .iter()
                .filter(|(key, _, _)| *key == entity.key)
                .any(|(_, _, chain)| {
                    chain
                        .iter()
                        .any(|(segment, owner)| segment == field && *owner == rel.target)
                });
            if !reachable {
                return Err(CoreError::schema(format!(
                    "{}.{} is mapped by {}.{field}, which does not embed it",
                    entity.name, rel.name, entities[rel.target.0].name
                )));
            }
        }
    }
    Ok(())
}
