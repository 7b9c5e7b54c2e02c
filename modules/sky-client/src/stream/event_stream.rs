use tracing::info;

use crate::error::{Result, SkyError};
use crate::stream::writer::{StreamState, StreamWriter};
use crate::types::{Event, EventEnvelope};

/// A long-lived connection for appending events in bulk.
///
/// A stream is either bound to one table (opened from a
/// [`TableClient`](crate::TableClient), path `/tables/{name}/events`) or
/// table-agnostic (opened from a [`SkyClient`](crate::SkyClient), path
/// `/events`), in which case every event names its table.
///
/// Events are not acknowledged individually; only a successful
/// [`close`](Self::close) confirms the server accepted the whole stream.
/// After a failed append the connection is in an unknown state: close or
/// [`reconnect`](Self::reconnect) before appending again.
pub struct EventStream {
    writer: StreamWriter,
    table: Option<String>,
    event_count: u64,
}

impl EventStream {
    pub(crate) fn new(writer: StreamWriter, table: Option<String>) -> Self {
        Self {
            writer,
            table,
            event_count: 0,
        }
    }

    /// The table this stream is bound to, if any.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn state(&self) -> StreamState {
        self.writer.state()
    }

    /// Number of events appended since the stream was last (re)connected.
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Append an event for `object_id` on a table-bound stream.
    pub async fn add_event(&mut self, object_id: &str, event: &Event) -> Result<()> {
        if self.table.is_none() {
            return Err(SkyError::validation("Table required"));
        }
        self.append(object_id, None, event).await
    }

    /// Append an event for `object_id` in `table` on a table-agnostic stream.
    pub async fn add_table_event(&mut self, object_id: &str, table: &str, event: &Event) -> Result<()> {
        if let Some(bound) = &self.table {
            return Err(SkyError::validation(format!(
                "Stream is bound to table {bound}; use add_event"
            )));
        }
        self.append(object_id, Some(table), event).await
    }

    async fn append(&mut self, object_id: &str, table: Option<&str>, event: &Event) -> Result<()> {
        let payload = EventEnvelope::new(object_id, table, event)?.encode()?;
        self.writer.append(&payload).await?;
        self.event_count += 1;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await
    }

    /// Abandon the current body and start a new one on a fresh connection.
    /// Events appended before a failure are not guaranteed delivered.
    pub async fn reconnect(&mut self) -> Result<()> {
        self.event_count = 0;
        self.writer.reconnect().await
    }

    /// Send the terminating chunk and wait for the server to acknowledge.
    pub async fn close(mut self) -> Result<()> {
        self.writer.close().await?;
        info!(
            path = self.writer.path(),
            events = self.event_count,
            "Event stream acknowledged"
        );
        Ok(())
    }
}
