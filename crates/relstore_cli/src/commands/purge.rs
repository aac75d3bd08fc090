//! Purge command implementation.

use super::open_existing;
use relstore_storage::{CancelToken, Channel, PurgeJob, PurgeOutcome};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Runs the purge command.
pub fn run(
    path: &Path,
    channel: &str,
    cancel_after_ms: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(path)?;
    let channel = Channel::new(channel)?;
    if !store.channels()?.iter().any(|c| c == channel.as_str()) {
        return Err(format!("No channel {channel} in {}", path.display()).into());
    }

    let token = CancelToken::new();
    let handle = PurgeJob::new(store.location().clone(), store.config().clone(), channel.clone())
        .on_stage(|stage| debug!(?stage, "purge stage"))
        .spawn(token.clone())?;
    // The worker needs the write lock; release ours.
    drop(store);

    if let Some(ms) = cancel_after_ms {
        std::thread::sleep(Duration::from_millis(ms));
        token.cancel();
    }

    match handle.join()? {
        PurgeOutcome::Completed {
            rows_removed,
            cancel_ignored,
        } => {
            println!("Purged {channel}: {rows_removed} rows removed");
            if cancel_ignored {
                println!("Cancellation arrived after the commit started and was ignored");
            }
        }
        PurgeOutcome::Cancelled { stage } => {
            println!("Purge of {channel} cancelled during {stage:?}; nothing removed");
        }
    }

    Ok(())
}
