use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SkyError};

// --- Tables ---

/// A container for objects and their events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Response of `GET /tables/{name}/stats`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Stats {
    pub count: u64,
}

// --- Properties ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Integer,
    Float,
    Boolean,
    Factor,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::Boolean => "boolean",
            DataType::Factor => "factor",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = SkyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "string" => Ok(DataType::String),
            "integer" => Ok(DataType::Integer),
            "float" => Ok(DataType::Float),
            "boolean" => Ok(DataType::Boolean),
            "factor" => Ok(DataType::Factor),
            other => Err(SkyError::validation(format!("Unknown data type: {other}"))),
        }
    }
}

/// Part of a table's schema. The server assigns `id`: negative for transient
/// properties, positive for permanent ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub transient: bool,
    #[serde(rename = "dataType")]
    pub data_type: DataType,
}

impl Property {
    pub fn new(name: impl Into<String>, transient: bool, data_type: DataType) -> Self {
        Self {
            id: 0,
            name: name.into(),
            transient,
            data_type,
        }
    }
}

// --- Events ---

/// A timestamped hash of data on an object's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(with = "crate::time::iso8601")]
    timestamp: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_empty")]
    data: Map<String, Value>,
}

impl Event {
    pub fn new(timestamp: DateTime<Utc>, data: Map<String, Value>) -> Self {
        Self { timestamp, data }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Map<String, Value>, D::Error> {
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Wire record for one streamed event. `table` is present only on
/// table-agnostic streams.
#[derive(Debug, Serialize)]
pub(crate) struct EventEnvelope<'a> {
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    table: Option<&'a str>,
    #[serde(with = "crate::time::iso8601")]
    timestamp: DateTime<Utc>,
    data: &'a Map<String, Value>,
}

impl<'a> EventEnvelope<'a> {
    pub(crate) fn new(id: &'a str, table: Option<&'a str>, event: &'a Event) -> Result<Self> {
        if id.is_empty() {
            return Err(SkyError::validation("Object identifier required"));
        }
        if table.is_some_and(str::is_empty) {
            return Err(SkyError::validation("Table required"));
        }
        Ok(Self {
            id,
            table,
            timestamp: event.timestamp,
            data: &event.data,
        })
    }

    /// JSON object followed by a newline, one per chunk.
    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = serde_json::to_vec(self)?;
        buf.push(b'\n');
        Ok(buf)
    }
}

/// How `insert_event` combines a new event with one already stored at the
/// same timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Overwrite the stored event (`PUT`).
    Replace,
    /// Merge data into the stored event (`PATCH`).
    Merge,
}

impl InsertMode {
    pub fn method(&self) -> Method {
        match self {
            InsertMode::Replace => Method::PUT,
            InsertMode::Merge => Method::PATCH,
        }
    }
}

impl FromStr for InsertMode {
    type Err = SkyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "replace" => Ok(InsertMode::Replace),
            "merge" => Ok(InsertMode::Merge),
            other => Err(SkyError::validation(format!("Invalid insertion mode: {other}"))),
        }
    }
}
