//! Bulk import of JSON-lines event files over a table-bound stream.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use sky_client::{Event, TableClient};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info};

/// One input line: `{"id": "...", "timestamp": "...", "data": {...}}`.
#[derive(Debug, Deserialize)]
struct ImportRecord {
    id: String,
    timestamp: String,
    #[serde(default)]
    data: Map<String, Value>,
}

fn parse_line(line: &str) -> Result<(String, Event)> {
    let record: ImportRecord = serde_json::from_str(line).context("invalid JSON record")?;
    let timestamp: DateTime<Utc> = sky_client::parse_timestamp(&record.timestamp)?;
    Ok((record.id, Event::new(timestamp, record.data)))
}

/// Stream every record from `input` into `table`. Blank lines are skipped.
/// Returns the number of events the server acknowledged.
pub async fn import<R: AsyncBufRead + Unpin>(table: &TableClient, input: R) -> Result<u64> {
    let mut stream = table.open_stream().await?;
    info!(table = table.name(), "Import started");

    let mut lines = input.lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let (id, event) = parse_line(&line).with_context(|| format!("line {line_no}"))?;
        stream.add_event(&id, &event).await?;
        if stream.event_count() % 10_000 == 0 {
            debug!(events = stream.event_count(), "Import progress");
        }
    }

    let count = stream.event_count();
    stream.close().await?;
    Ok(count)
}
