use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{Result, SkyError};
use crate::stream::{EventStream, StreamWriter};
use crate::table::TableClient;
use crate::types::{Event, Table};

/// Handle to a Sky server. Cheap to clone; every call opens its own request,
/// and every stream its own socket.
#[derive(Debug, Clone)]
pub struct SkyClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl SkyClient {
    /// Client for `host` on the default port.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            config: ClientConfig::new(host),
            http: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    // --- Transport ---

    /// Send a request without a body and decode the response, if any.
    pub(crate) async fn request<R: DeserializeOwned>(&self, method: Method, path: &str) -> Result<Option<R>> {
        let body = self.send(method, path, None).await?;
        decode(&body)
    }

    /// Send `data` as JSON and decode the response, if any.
    pub(crate) async fn request_with<B, R>(&self, method: Method, path: &str, data: &B) -> Result<Option<R>>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let body = self.send(method, path, Some(serde_json::to_vec(data)?)).await?;
        decode(&body)
    }

    /// Send a request and discard whatever the server returns on success.
    pub(crate) async fn execute(&self, method: Method, path: &str) -> Result<()> {
        self.send(method, path, None).await.map(|_| ())
    }

    /// One round trip. Returns the raw body of a 200 response; any other
    /// status becomes [`SkyError::Server`].
    async fn send(&self, method: Method, path: &str, body: Option<Vec<u8>>) -> Result<Vec<u8>> {
        let url = format!("{}{}", self.config.base_url(), path);
        debug!(%method, %url, "Sky request");

        let mut req = self
            .http
            .request(method.clone(), &url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(body) = body {
            req = req.body(body);
        }

        let resp = req.send().await?;
        let status = resp.status();

        if status != StatusCode::OK {
            warn!(%method, %url, status = status.as_u16(), "Sky request failed");
            // An unreadable body falls back to the generic message.
            let bytes = resp.bytes().await.unwrap_or_default();
            let message = error_message(&bytes)
                .unwrap_or_else(|| format!("{} {} [{}]", method, url, status.as_u16()));
            return Err(SkyError::Server(message));
        }

        Ok(resp.bytes().await?.to_vec())
    }

    /// Liveness probe. True iff `GET /ping` succeeds; the body is ignored.
    pub async fn ping(&self) -> bool {
        self.execute(Method::GET, "/ping").await.is_ok()
    }

    // --- Tables ---

    /// Handle for table-scoped operations.
    pub fn table(&self, name: impl Into<String>) -> TableClient {
        TableClient::new(self.clone(), name.into())
    }

    pub async fn get_tables(&self) -> Result<Vec<Table>> {
        Ok(self.request(Method::GET, "/tables").await?.unwrap_or_default())
    }

    pub async fn get_table(&self, name: &str) -> Result<Option<Table>> {
        require_name(name, "Table name required")?;
        self.request(Method::GET, &format!("/tables/{name}")).await
    }

    /// Create `table` and return the server's copy of it.
    pub async fn create_table(&self, table: &Table) -> Result<Table> {
        require_name(&table.name, "Table name required")?;
        let created: Option<Table> = self.request_with(Method::POST, "/tables", table).await?;
        Ok(created.unwrap_or_else(|| table.clone()))
    }

    pub async fn delete_table(&self, name: &str) -> Result<()> {
        require_name(name, "Table name required")?;
        self.execute(Method::DELETE, &format!("/tables/{name}")).await
    }

    // --- Streaming ---

    /// Open a table-agnostic event stream on `/events`.
    pub async fn open_stream(&self) -> Result<EventStream> {
        let mut writer = self.stream_writer("/events");
        writer.reconnect().await?;
        Ok(EventStream::new(writer, None))
    }

    /// Stream `(object_id, table, event)` triples over one connection and
    /// close it. Returns the number of events acknowledged.
    pub async fn stream_events<'a, I>(&self, events: I) -> Result<u64>
    where
        I: IntoIterator<Item = (&'a str, &'a str, &'a Event)>,
    {
        let mut stream = self.open_stream().await?;
        for (object_id, table, event) in events {
            stream.add_table_event(object_id, table, event).await?;
        }
        let count = stream.event_count();
        stream.close().await?;
        Ok(count)
    }

    pub(crate) fn stream_writer(&self, path: impl Into<String>) -> StreamWriter {
        StreamWriter::new(&self.config, path)
    }
}

/// Decode a 200 body. An empty body means no data was returned.
fn decode<R: DeserializeOwned>(body: &[u8]) -> Result<Option<R>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(body)?))
}

/// Best-effort lookup of `{"message": "..."}` in an error body.
fn error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value.get("message")?.as_str().map(str::to_owned)
}

pub(crate) fn require_name(name: &str, message: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SkyError::validation(message));
    }
    Ok(())
}
