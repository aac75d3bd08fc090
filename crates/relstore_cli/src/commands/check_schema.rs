//! Schema check command implementation.

use relstore_core::{EntityMetadata, Schema};
use serde::Serialize;
use std::path::Path;

/// One validated entity.
#[derive(Debug, Serialize)]
pub struct EntitySummary {
    /// Entity name.
    pub name: String,
    /// Channel name, for top-level entities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// `name: type` per attribute.
    pub attributes: Vec<String>,
    /// `name -> Target (kind)` per relationship.
    pub relationships: Vec<String>,
    /// `Entity.relationship` per relationship targeting this entity.
    pub referenced_by: Vec<String>,
    /// Path templates where this entity is embedded.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embedded_at: Vec<String>,
}

/// Runs the check-schema command.
pub fn run(file: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(file)?;
    let schema = Schema::from_json(&text)?;
    let entities = summarize(&schema);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&entities)?);
        }
        _ => {
            println!("{}: {} entities OK", file.display(), entities.len());
            for entity in &entities {
                print_entity(entity);
            }
        }
    }

    Ok(())
}

/// Describes every entity of `schema`.
pub fn summarize(schema: &Schema) -> Vec<EntitySummary> {
    schema.entities().map(|e| summary(schema, e)).collect()
}

fn summary(schema: &Schema, entity: &EntityMetadata) -> EntitySummary {
    let relationships = entity
        .relationships()
        .iter()
        .map(|r| {
            let kind = if r.is_composition() {
                "composition"
            } else {
                "association"
            };
            let array = if r.is_array() { "[]" } else { "" };
            let target = schema.entity(r.target()).name();
            match r.mapped_by() {
                Some(field) => format!("{} -> {target}{array} ({kind}, mapped by {field})", r.name()),
                None => format!("{} -> {target}{array} ({kind})", r.name()),
            }
        })
        .collect();
    let referenced_by = entity
        .references_to_me()
        .iter()
        .map(|r| {
            format!(
                "{}.{}",
                schema.entity(r.entity).name(),
                schema.relationship(*r).name()
            )
        })
        .collect();
    let embedded_at = entity
        .embeddings()
        .iter()
        .map(|e| format!("{}{}", schema.entity(e.root).name(), e.template))
        .collect();

    EntitySummary {
        name: entity.name().to_string(),
        channel: entity.channel().ok().map(|c| c.as_str().to_string()),
        attributes: entity
            .attributes()
            .iter()
            .map(|a| format!("{}: {}", a.name(), a.ty()))
            .collect(),
        relationships,
        referenced_by,
        embedded_at,
    }
}

fn print_entity(entity: &EntitySummary) {
    println!();
    match &entity.channel {
        Some(channel) => println!("{} (channel {channel})", entity.name),
        None => println!("{} (internal)", entity.name),
    }
    for attribute in &entity.attributes {
        println!("  attribute     {attribute}");
    }
    for relationship in &entity.relationships {
        println!("  relationship  {relationship}");
    }
    for reference in &entity.referenced_by {
        println!("  referenced by {reference}");
    }
    for place in &entity.embedded_at {
        println!("  embedded at   {place}");
    }
}
