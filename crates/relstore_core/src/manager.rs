//! Data manager: the entry point of relstore.

use crate::config::Config;
use crate::context::Context;
use crate::dao::Dao;
use crate::error::{CoreError, CoreResult};
use crate::metadata::Schema;
use crate::path::child_key;
use crate::query::{Restriction, Select, Source};
use crate::record::Record;
use crate::types::RecordId;
use relstore_storage::{CancelToken, EavStore, PurgeHandle, PurgeJob};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, info};

/// The main data manager handle.
///
/// A `DataManager` owns the store connection and the schema, and hands out
/// one [`Dao`] per entity. Every DAO, record and select it produces shares
/// the same connection, so the manager and everything derived from it stay
/// on one thread.
///
/// # Opening a Data Manager
///
/// ```rust,ignore
/// use relstore_core::{Config, DataManager, Schema};
///
/// let schema = Schema::from_json(include_str!("schema.json"))?;
///
/// // Open with default configuration
/// let manager = DataManager::open("my_data.db", schema.clone(), Config::default())?;
///
/// // Or in memory, for tests
/// let manager = DataManager::open_in_memory(schema, Config::default())?;
/// ```
///
/// # Saving and Querying
///
/// ```rust,ignore
/// let people = manager.dao("Person")?;
/// let alice = people.create();
/// alice.set_text("name", Some("Alice".into()))?;
/// people.save(&alice, false)?;
///
/// let names = manager
///     .select("Person")?
///     .field("name")
///     .filter(Filter::starts_with("name", "A"))
///     .values()?;
/// ```
pub struct DataManager {
    ctx: Rc<Context>,
}

impl std::fmt::Debug for DataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataManager")
            .field("location", self.ctx.store.location())
            .field("entities", &self.ctx.schema.entities().count())
            .finish()
    }
}

impl DataManager {
    /// Opens (or creates) a file-backed data manager.
    ///
    /// Every top-level entity's channel is created if it does not exist.
    pub fn open(
        path: impl AsRef<Path>,
        schema: impl Into<Arc<Schema>>,
        config: Config,
    ) -> CoreResult<Self> {
        let store = EavStore::open(path.as_ref(), config.store_config())?;
        Self::with_store(store, schema.into(), config)
    }

    /// Opens a data manager over a fresh in-memory store.
    pub fn open_in_memory(schema: impl Into<Arc<Schema>>, config: Config) -> CoreResult<Self> {
        let store = EavStore::open_in_memory()?;
        Self::with_store(store, schema.into(), config)
    }

    fn with_store(store: EavStore, schema: Arc<Schema>, config: Config) -> CoreResult<Self> {
        let mut channels = 0;
        for entity in schema.entities().filter(|e| !e.is_internal()) {
            store.ensure_channel(entity.channel()?)?;
            channels += 1;
        }
        info!(location = ?store.location(), channels, "data manager opened");
        Ok(Self {
            ctx: Rc::new(Context {
                store,
                schema,
                config,
            }),
        })
    }

    /// Returns the schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.ctx.schema
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &EavStore {
        &self.ctx.store
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    /// Returns the DAO for an entity.
    pub fn dao(&self, entity: &str) -> CoreResult<Dao> {
        let key = self.ctx.schema.require(entity)?.key();
        Ok(Dao::new(Rc::clone(&self.ctx), key))
    }

    /// Returns the DAO for a record's entity.
    pub fn dao_for(&self, record: &Record) -> CoreResult<Dao> {
        self.check_owned(record)?;
        Ok(Dao::new(Rc::clone(&self.ctx), record.entity_key()))
    }

    /// Starts a query over an entity.
    pub fn select(&self, entity: &str) -> CoreResult<Select> {
        self.dao(entity)?.select()
    }

    /// Starts a query over the records one relationship of `record` points
    /// to, as stored.
    ///
    /// Unsaved edits of the relationship are not visible; a record that was
    /// never saved has an empty view.
    pub fn select_view(&self, record: &Record, relationship: &str) -> CoreResult<Select> {
        self.check_owned(record)?;
        let holder = record.entity();
        let rel = holder.require_relationship(relationship)?;
        let target = rel.target();
        let persisted = record.id().filter(|_| !record.is_new());

        if self.ctx.entity(target).is_internal() {
            if record.is_internal() || !rel.is_array() {
                return Err(CoreError::usage(format!(
                    "{}.{} is not an embedded array of a top-level record",
                    holder.name(),
                    rel.name()
                )));
            }
            let source = Source::Internal {
                root: record.entity_key(),
                prefix: child_key("", rel.name()),
                owner: persisted.clone(),
            };
            let select = Select::new(Rc::clone(&self.ctx), target, source);
            return Ok(match persisted {
                Some(_) => select,
                None => select.restrict(Restriction::Ids(Vec::new())),
            });
        }

        let select = Select::new(Rc::clone(&self.ctx), target, Source::TopLevel);
        let restriction = match (rel.mapped_by(), persisted) {
            (Some(field), Some(id)) => Restriction::MappedBy {
                field: field.to_string(),
                id,
            },
            (Some(_), None) => Restriction::Ids(Vec::new()),
            (None, _) => {
                Restriction::Ids(record.inner.borrow().stored_ids(rel.name(), rel.is_array()))
            }
        };
        Ok(select.restrict(restriction))
    }

    /// Saves a record through its entity's DAO.
    pub fn save(&self, record: &Record, sync: bool) -> CoreResult<bool> {
        self.dao_for(record)?.save(record, sync)
    }

    /// Deletes a record through its entity's DAO.
    pub fn delete(&self, record: &Record, sync: bool) -> CoreResult<bool> {
        self.dao_for(record)?.delete(record, sync)
    }

    /// Starts removing every record of a top-level entity on a worker
    /// thread. Cancel or wait through the returned handle.
    pub fn purge_in_background(&self, entity: &str) -> CoreResult<PurgeHandle> {
        self.purge_with_token(entity, CancelToken::new())
    }

    /// Like [`purge_in_background`](Self::purge_in_background), observing an
    /// existing cancellation token.
    pub fn purge_with_token(&self, entity: &str, token: CancelToken) -> CoreResult<PurgeHandle> {
        let metadata = self.ctx.schema.require(entity)?;
        let channel = metadata.channel()?.clone();
        let name = metadata.name().to_string();
        let job = PurgeJob::new(
            self.ctx.store.location().clone(),
            self.ctx.store.config().clone(),
            channel,
        )
        .on_stage(move |stage| debug!(entity = %name, ?stage, "purge stage"));
        info!(entity, "purge started");
        Ok(job.spawn(token)?)
    }

    /// Ids of locally deleted records the remote source has not yet been
    /// told about.
    pub fn pending_deletions(&self, entity: &str) -> CoreResult<Vec<RecordId>> {
        let channel = self.ctx.schema.require(entity)?.channel()?;
        Ok(self
            .ctx
            .store
            .tombstones(channel)?
            .into_iter()
            .map(RecordId::from)
            .collect())
    }

    /// Forgets a pending deletion once the remote source has applied it.
    /// Returns `false` if there was none.
    pub fn acknowledge_deletion(&self, entity: &str, id: &RecordId) -> CoreResult<bool> {
        let channel = self.ctx.schema.require(entity)?.channel()?;
        Ok(self.ctx.store.clear_tombstone(channel, id.as_str())?)
    }

    fn check_owned(&self, record: &Record) -> CoreResult<()> {
        if !Rc::ptr_eq(&record.ctx, &self.ctx) {
            return Err(CoreError::usage(format!(
                "{} record belongs to another data manager",
                record.entity().name()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{AttributeType, EntityDefinition, RelationshipDefinition, ScalarKind};

    fn schema() -> Schema {
        Schema::builder()
            .entity(
                EntityDefinition::new("Team")
                    .attribute("name", AttributeType::Scalar(ScalarKind::Text))
                    .relationship(
                        RelationshipDefinition::association("members", "Person")
                            .array()
                            .mapped_by("team"),
                    ),
            )
            .entity(
                EntityDefinition::new("Person")
                    .attribute("name", AttributeType::Scalar(ScalarKind::Text))
                    .relationship(RelationshipDefinition::association("team", "Team")),
            )
            .build()
            .unwrap()
    }

    fn manager() -> DataManager {
        DataManager::open_in_memory(schema(), Config::default()).unwrap()
    }

    #[test]
    fn opening_creates_channels() {
        let manager = manager();
        let channels = manager.store().channels().unwrap();
        assert!(channels.contains(&"Team".to_string()));
        assert!(channels.contains(&"Person".to_string()));
    }

    #[test]
    fn unknown_entity_is_a_usage_error() {
        let err = manager().dao("Nope").unwrap_err();
        assert!(matches!(err, CoreError::Usage { .. }));
    }

    #[test]
    fn records_of_another_manager_are_rejected() {
        let a = manager();
        let b = manager();
        let record = a.dao("Person").unwrap().create();
        assert!(matches!(b.save(&record, false), Err(CoreError::Usage { .. })));
    }

    #[test]
    fn unsaved_holder_has_empty_mapped_by_view() {
        let manager = manager();
        let team = manager.dao("Team").unwrap().create();
        let view = manager.select_view(&team, "members").unwrap();
        assert!(view.records().unwrap().is_empty());
    }

    #[test]
    fn tombstones_follow_local_deletes() {
        let manager = manager();
        let people = manager.dao("Person").unwrap();
        let bob = people.create_with_id("remote-1").unwrap();
        bob.set_value("name", Some("Bob".into())).unwrap();
        assert!(people.save(&bob, true).unwrap());
        assert!(people.delete(&bob, false).unwrap());

        let pending = manager.pending_deletions("Person").unwrap();
        assert_eq!(pending, vec![RecordId::from("remote-1")]);
        assert!(manager.acknowledge_deletion("Person", &pending[0]).unwrap());
        assert!(manager.pending_deletions("Person").unwrap().is_empty());
    }
}
