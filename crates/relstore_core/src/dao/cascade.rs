//! One save or delete cascade: a transaction plus an undo journal.
//!
//! Every record a cascade mutates is snapshotted the first time it is
//! touched. If the cascade fails, or its commit is rejected, the snapshots
//! are replayed newest first so in-memory records match storage again.
//! Ids assigned during the cascade survive the rollback.

use crate::context::Context;
use crate::error::CoreResult;
use crate::metadata::EntityKey;
use crate::record::{Record, RecordState};
use crate::types::RecordId;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use tracing::{debug, warn};

pub(crate) struct Cascade {
    pub(crate) ctx: Rc<Context>,
    pub(crate) sync: bool,
    journal: Vec<(Rc<RefCell<RecordState>>, RecordState)>,
    touched: HashSet<*const RefCell<RecordState>>,
    pub(crate) saving: HashSet<(EntityKey, RecordId)>,
    pub(crate) deleting: HashSet<(EntityKey, RecordId)>,
    /// Composition targets dropped by a save, deleted once the owner's new
    /// row set no longer references them.
    pub(crate) deferred: Vec<(EntityKey, RecordId)>,
}

impl Cascade {
    fn new(ctx: Rc<Context>, sync: bool) -> Self {
        Self {
            ctx,
            sync,
            journal: Vec::new(),
            touched: HashSet::new(),
            saving: HashSet::new(),
            deleting: HashSet::new(),
            deferred: Vec::new(),
        }
    }

    /// Runs `f` inside a transaction.
    ///
    /// Returns `Ok(false)` when the commit was rejected, in which case every
    /// touched record has been restored.
    pub(crate) fn run<F>(ctx: &Rc<Context>, sync: bool, f: F) -> CoreResult<bool>
    where
        F: FnOnce(&mut Cascade) -> CoreResult<()>,
    {
        let mut cascade = Self::new(Rc::clone(ctx), sync);
        ctx.store.begin()?;

        if let Err(err) = f(&mut cascade) {
            if let Err(rollback) = ctx.store.rollback() {
                warn!(error = %rollback, "rollback after failed cascade");
            }
            cascade.restore();
            return Err(err);
        }

        match ctx.store.commit() {
            Ok(()) => {
                debug!(records = cascade.journal.len(), sync, "cascade committed");
                Ok(true)
            }
            Err(err) if err.is_commit_failure() => {
                warn!(error = %err, "cascade commit rejected");
                cascade.restore();
                Ok(false)
            }
            Err(err) => {
                cascade.restore();
                Err(err.into())
            }
        }
    }

    /// Snapshots `record` unless it was already touched by this cascade.
    pub(crate) fn touch(&mut self, record: &Record) {
        if self.touched.insert(Rc::as_ptr(&record.inner)) {
            let snapshot = record.inner.borrow().clone();
            self.journal.push((Rc::clone(&record.inner), snapshot));
        }
    }

    fn restore(&mut self) {
        for (state, snapshot) in self.journal.drain(..).rev() {
            state.borrow_mut().restore(snapshot);
        }
        self.touched.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::CoreError;
    use crate::metadata::{AttributeType, EntityDefinition, ScalarKind, Schema};
    use crate::types::StatusTags;
    use relstore_storage::EavStore;
    use std::sync::Arc;

    fn context() -> Rc<Context> {
        let schema = Schema::builder()
            .entity(
                EntityDefinition::new("Note")
                    .attribute("body", AttributeType::Scalar(ScalarKind::Text)),
            )
            .build()
            .unwrap();
        Rc::new(Context {
            store: EavStore::open_in_memory().unwrap(),
            schema: Arc::new(schema),
            config: Config::default(),
        })
    }

    fn note(ctx: &Rc<Context>) -> Record {
        let key = ctx.schema.require("Note").unwrap().key();
        Record::from_state(Rc::clone(ctx), RecordState::new(key, StatusTags::created_locally()))
    }

    #[test]
    fn failure_restores_touched_records() {
        let ctx = context();
        let record = note(&ctx);
        record.set_text("body", Some("before".into())).unwrap();

        let result = Cascade::run(&ctx, false, |cascade| {
            cascade.touch(&record);
            record.set_text("body", Some("after".into()))?;
            cascade.touch(&record);
            record.set_text("body", Some("later".into()))?;
            Err(CoreError::usage("boom"))
        });

        assert!(result.is_err());
        assert_eq!(record.text("body").unwrap().as_deref(), Some("before"));
        assert!(!ctx.store.in_transaction());
    }

    #[test]
    fn rejected_commit_reports_false() {
        let ctx = context();
        let record = note(&ctx);
        ctx.store.set_commit_guard(|| false);

        let committed = Cascade::run(&ctx, false, |cascade| {
            cascade.touch(&record);
            record.set_text("body", Some("x".into()))?;
            Ok(())
        })
        .unwrap();

        assert!(!committed);
        assert_eq!(record.text("body").unwrap(), None);
    }
}
