use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::Value;

use crate::client::{require_name, SkyClient};
use crate::error::Result;
use crate::stream::EventStream;
use crate::time::format_timestamp;
use crate::types::{Event, InsertMode, Property, Stats};

/// Operations scoped to one table.
#[derive(Debug, Clone)]
pub struct TableClient {
    client: SkyClient,
    name: String,
}

impl TableClient {
    pub(crate) fn new(client: SkyClient, name: String) -> Self {
        Self { client, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn path(&self, suffix: &str) -> Result<String> {
        require_name(&self.name, "Table name required")?;
        Ok(format!("/tables/{}{}", self.name, suffix))
    }

    fn property_path(&self, property: &str) -> Result<String> {
        require_name(property, "Property name required")?;
        self.path(&format!("/properties/{property}"))
    }

    fn events_path(&self, object_id: &str) -> Result<String> {
        require_name(object_id, "Object identifier required")?;
        self.path(&format!("/objects/{object_id}/events"))
    }

    fn event_path(&self, object_id: &str, timestamp: &DateTime<Utc>) -> Result<String> {
        Ok(format!(
            "{}/{}",
            self.events_path(object_id)?,
            format_timestamp(timestamp)
        ))
    }

    // --- Properties ---

    pub async fn get_properties(&self) -> Result<Vec<Property>> {
        let path = self.path("/properties")?;
        Ok(self.client.request(Method::GET, &path).await?.unwrap_or_default())
    }

    pub async fn get_property(&self, name: &str) -> Result<Option<Property>> {
        let path = self.property_path(name)?;
        self.client.request(Method::GET, &path).await
    }

    /// Create `property`; the returned copy carries the server-assigned id.
    pub async fn create_property(&self, property: &Property) -> Result<Property> {
        require_name(&property.name, "Property name required")?;
        let path = self.path("/properties")?;
        let created: Option<Property> = self.client.request_with(Method::POST, &path, property).await?;
        Ok(created.unwrap_or_else(|| property.clone()))
    }

    /// Rename or retype the property currently called `name`.
    pub async fn update_property(&self, name: &str, property: &Property) -> Result<Property> {
        let path = self.property_path(name)?;
        let updated: Option<Property> = self.client.request_with(Method::PATCH, &path, property).await?;
        Ok(updated.unwrap_or_else(|| property.clone()))
    }

    pub async fn delete_property(&self, name: &str) -> Result<()> {
        let path = self.property_path(name)?;
        self.client.execute(Method::DELETE, &path).await
    }

    // --- Events ---

    /// All events on an object's timeline, in timestamp order.
    pub async fn get_events(&self, object_id: &str) -> Result<Vec<Event>> {
        let path = self.events_path(object_id)?;
        Ok(self.client.request(Method::GET, &path).await?.unwrap_or_default())
    }

    pub async fn get_event(&self, object_id: &str, timestamp: &DateTime<Utc>) -> Result<Option<Event>> {
        let path = self.event_path(object_id, timestamp)?;
        self.client.request(Method::GET, &path).await
    }

    /// Store one event at its own timestamp, replacing or merging with any
    /// event already there.
    pub async fn insert_event(&self, object_id: &str, event: &Event, mode: InsertMode) -> Result<()> {
        let path = self.event_path(object_id, &event.timestamp())?;
        let _: Option<Value> = self.client.request_with(mode.method(), &path, event).await?;
        Ok(())
    }

    pub async fn delete_event(&self, object_id: &str, timestamp: &DateTime<Utc>) -> Result<()> {
        let path = self.event_path(object_id, timestamp)?;
        self.client.execute(Method::DELETE, &path).await
    }

    /// Remove every event on an object's timeline.
    pub async fn delete_events(&self, object_id: &str) -> Result<()> {
        let path = self.events_path(object_id)?;
        self.client.execute(Method::DELETE, &path).await
    }

    // --- Analysis ---

    pub async fn stats(&self) -> Result<Option<Stats>> {
        let path = self.path("/stats")?;
        self.client.request(Method::GET, &path).await
    }

    /// Run a query. The query document and the result are passed through
    /// untouched.
    pub async fn query(&self, query: &Value) -> Result<Value> {
        let path = self.path("/query")?;
        let result: Option<Value> = self.client.request_with(Method::POST, &path, query).await?;
        Ok(result.unwrap_or(Value::Null))
    }

    // --- Streaming ---

    /// Open an event stream bound to this table.
    pub async fn open_stream(&self) -> Result<EventStream> {
        let mut writer = self.client.stream_writer(self.path("/events")?);
        writer.reconnect().await?;
        Ok(EventStream::new(writer, Some(self.name.clone())))
    }

    /// Stream `(object_id, event)` pairs over one connection and close it.
    /// Returns the number of events acknowledged.
    pub async fn stream_events<'a, I>(&self, events: I) -> Result<u64>
    where
        I: IntoIterator<Item = (&'a str, &'a Event)>,
    {
        let mut stream = self.open_stream().await?;
        for (object_id, event) in events {
            stream.add_event(object_id, event).await?;
        }
        let count = stream.event_count();
        stream.close().await?;
        Ok(count)
    }
}
