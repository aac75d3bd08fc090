//! Inspect command implementation.

use super::open_existing;
use relstore_storage::{Channel, EavStore};
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// File size in bytes.
    pub file_size: u64,
    /// Per-channel statistics.
    pub channels: Vec<ChannelStats>,
}

/// Statistics for a single channel.
#[derive(Debug, Serialize)]
pub struct ChannelStats {
    /// Channel name.
    pub name: String,
    /// Number of distinct records.
    pub records: usize,
    /// Number of field rows.
    pub rows: usize,
    /// Deletions not yet acknowledged by the remote source.
    pub tombstones: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(path)?;
    let result = InspectResult {
        path: path.display().to_string(),
        file_size: std::fs::metadata(path)?.len(),
        channels: collect(&store)?,
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Gathers statistics for every channel of `store`.
pub fn collect(store: &EavStore) -> Result<Vec<ChannelStats>, Box<dyn std::error::Error>> {
    let mut stats = Vec::new();
    for name in store.channels()? {
        let channel = Channel::new(name.as_str())?;
        stats.push(ChannelStats {
            records: store.record_count(&channel)?,
            rows: store.row_count(&channel)?,
            tombstones: store.tombstones(&channel)?.len(),
            name,
        });
    }
    Ok(stats)
}

fn print_text_output(result: &InspectResult) {
    println!("relstore Store Inspection");
    println!("=========================");
    println!();
    println!("Path: {}", result.path);
    println!("Size: {}", format_size(result.file_size));
    println!();
    if result.channels.is_empty() {
        println!("No channels.");
        return;
    }
    println!("Channels:");
    for channel in &result.channels {
        println!(
            "  {:<24} {} records, {} rows, {} tombstones",
            channel.name, channel.records, channel.rows, channel.tombstones
        );
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relstore_storage::StoreConfig;
    use tempfile::TempDir;

    #[test]
    fn collects_counts_per_channel() {
        let dir = TempDir::new().unwrap();
        let store = EavStore::open(&dir.path().join("s.db"), StoreConfig::default()).unwrap();
        let notes = Channel::new("notes").unwrap();
        store.ensure_channel(&notes).unwrap();
        store
            .write_fields(
                &notes,
                "n1",
                &[
                    ("title".into(), Some("a".into())),
                    ("body".into(), None),
                ],
            )
            .unwrap();
        store.add_tombstone(&notes, "n0").unwrap();

        let stats = collect(&store).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].name, "notes");
        assert_eq!(stats[0].records, 1);
        assert_eq!(stats[0].rows, 2);
        assert_eq!(stats[0].tombstones, 1);
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(12), "12 bytes");
        assert_eq!(format_size(2048), "2.0 KB");
    }
}
