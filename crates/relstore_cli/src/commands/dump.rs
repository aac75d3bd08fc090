//! Dump command implementation.

use super::open_existing;
use relstore_storage::Channel;
use std::collections::BTreeMap;
use std::path::Path;

/// Runs the dump command.
pub fn run(
    path: &Path,
    channel: &str,
    id: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(path)?;
    let channel = Channel::new(channel)?;
    if !store.channels()?.iter().any(|c| c == channel.as_str()) {
        return Err(format!("No channel {channel} in {}", path.display()).into());
    }
    let rows = store.read_record(&channel, id)?;
    if rows.is_empty() {
        return Err(format!("No record {id} in channel {channel}").into());
    }

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        _ => {
            print_text_output(&channel, id, &rows);
        }
    }

    Ok(())
}

fn print_text_output(channel: &Channel, id: &str, rows: &BTreeMap<String, Option<String>>) {
    println!("{channel}/{id} ({} rows)", rows.len());
    let width = rows.keys().map(String::len).max().unwrap_or(0);
    for (name, value) in rows {
        match value {
            Some(value) => println!("  {name:<width$}  {value}"),
            None => println!("  {name:<width$}  NULL"),
        }
    }
}
