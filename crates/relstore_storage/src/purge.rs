//! Background bulk deletion of a channel.
//!
//! A [`PurgeJob`] removes every row of one channel (and its tombstones) on
//! a worker thread with a connection of its own. Between stages the worker
//! checks a [`CancelToken`]; once the commit has started the purge can no
//! longer be stopped, and a late cancellation is reported back through
//! [`PurgeOutcome::Completed::cancel_ignored`].

use crate::channel::Channel;
use crate::config::StoreConfig;
use crate::error::{StorageError, StorageResult};
use crate::store::{StoreLocation, TOMBSTONE_TABLE};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{info, warn};

/// Stage a purge worker is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeStage {
    /// Not started yet.
    Pending,
    /// Opening the worker connection.
    Opening,
    /// Counting rows to remove.
    Counting,
    /// Removing rows inside the open transaction.
    Deleting,
    /// Committing. Cancellation is ignored from here on.
    Committing,
    /// Done, successfully or not.
    Finished,
}

/// How a purge ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurgeOutcome {
    /// Every row was removed.
    Completed {
        /// Number of channel rows removed.
        rows_removed: usize,
        /// True if cancellation was requested after the point of no return.
        cancel_ignored: bool,
    },
    /// The worker stopped before committing; nothing was removed.
    Cancelled {
        /// Stage that observed the cancellation.
        stage: PurgeStage,
    },
}

/// Cooperative cancellation flag shared with a worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

type StageHook = Box<dyn Fn(PurgeStage) + Send>;

/// A bulk deletion of one channel.
pub struct PurgeJob {
    location: StoreLocation,
    config: StoreConfig,
    channel: Channel,
    stage_hook: Option<StageHook>,
}

impl PurgeJob {
    /// Describes a purge of `channel` at `location`.
    #[must_use]
    pub fn new(location: StoreLocation, config: StoreConfig, channel: Channel) -> Self {
        Self {
            location,
            config,
            channel,
            stage_hook: None,
        }
    }

    /// Registers a callback invoked on the worker thread at every stage change.
    #[must_use]
    pub fn on_stage(mut self, hook: impl Fn(PurgeStage) + Send + 'static) -> Self {
        self.stage_hook = Some(Box::new(hook));
        self
    }

    /// Starts the job on a worker thread.
    pub fn spawn(self, token: CancelToken) -> StorageResult<PurgeHandle> {
        let stage = Arc::new(Mutex::new(PurgeStage::Pending));
        let worker_stage = Arc::clone(&stage);
        let worker_token = token.clone();
        let worker = std::thread::Builder::new()
            .name(format!("relstore-purge-{}", self.channel))
            .spawn(move || self.run(&worker_token, &worker_stage))
            .map_err(|e| StorageError::Worker(e.to_string()))?;
        Ok(PurgeHandle {
            token,
            stage,
            worker,
        })
    }

    /// Runs the job on the calling thread.
    pub fn run(&self, token: &CancelToken, stage: &Mutex<PurgeStage>) -> StorageResult<PurgeOutcome> {
        let result = self.run_stages(token, stage);
        self.enter(stage, PurgeStage::Finished);
        result
    }

    fn run_stages(
        &self,
        token: &CancelToken,
        stage: &Mutex<PurgeStage>,
    ) -> StorageResult<PurgeOutcome> {
        self.enter(stage, PurgeStage::Opening);
        let conn = self.location.connect(&self.config)?;
        if token.is_cancelled() {
            return Ok(PurgeOutcome::Cancelled {
                stage: PurgeStage::Opening,
            });
        }

        self.enter(stage, PurgeStage::Counting);
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let rows = match self.count_rows(&conn) {
            Ok(rows) => rows,
            Err(err) => {
                rollback(&conn);
                return Err(err);
            }
        };
        if token.is_cancelled() {
            rollback(&conn);
            return Ok(PurgeOutcome::Cancelled {
                stage: PurgeStage::Counting,
            });
        }

        self.enter(stage, PurgeStage::Deleting);
        if let Err(err) = self.delete_rows(&conn, rows.is_some()) {
            rollback(&conn);
            return Err(err);
        }
        if token.is_cancelled() {
            rollback(&conn);
            return Ok(PurgeOutcome::Cancelled {
                stage: PurgeStage::Deleting,
            });
        }

        self.enter(stage, PurgeStage::Committing);
        if let Err(err) = conn.execute_batch("COMMIT") {
            rollback(&conn);
            return Err(StorageError::commit_failed(err.to_string()));
        }

        let rows_removed = rows.unwrap_or(0);
        let cancel_ignored = token.is_cancelled();
        info!(channel = %self.channel, rows_removed, cancel_ignored, "purge committed");
        Ok(PurgeOutcome::Completed {
            rows_removed,
            cancel_ignored,
        })
    }

    /// Returns `None` when the channel table does not exist.
    fn count_rows(&self, conn: &Connection) -> StorageResult<Option<usize>> {
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [self.channel.as_str()],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Ok(None);
        }
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.channel.quoted()),
            [],
            |row| row.get(0),
        )?;
        Ok(Some(usize::try_from(count).unwrap_or(0)))
    }

    fn delete_rows(&self, conn: &Connection, table_exists: bool) -> StorageResult<()> {
        if table_exists {
            conn.execute(&format!("DELETE FROM {}", self.channel.quoted()), [])?;
        }
        conn.execute(
            &format!("DELETE FROM {TOMBSTONE_TABLE} WHERE channel = ?1"),
            [self.channel.as_str()],
        )?;
        Ok(())
    }

    fn enter(&self, stage: &Mutex<PurgeStage>, next: PurgeStage) {
        *stage.lock() = next;
        if let Some(hook) = &self.stage_hook {
            hook(next);
        }
    }
}

fn rollback(conn: &Connection) {
    if let Err(err) = conn.execute_batch("ROLLBACK") {
        warn!(%err, "purge rollback failed");
    }
}

/// Handle to a running purge.
pub struct PurgeHandle {
    token: CancelToken,
    stage: Arc<Mutex<PurgeStage>>,
    worker: JoinHandle<StorageResult<PurgeOutcome>>,
}

impl PurgeHandle {
    /// Requests cancellation. Has no effect once the commit has started.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns the stage the worker is currently in.
    #[must_use]
    pub fn stage(&self) -> PurgeStage {
        *self.stage.lock()
    }

    /// Returns true once the worker thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Waits for the worker and returns its outcome.
    pub fn join(self) -> StorageResult<PurgeOutcome> {
        self.worker
            .join()
            .map_err(|_| StorageError::Worker("purge worker panicked".into()))?
    }
}

impl std::fmt::Debug for PurgeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurgeHandle")
            .field("stage", &self.stage())
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}
