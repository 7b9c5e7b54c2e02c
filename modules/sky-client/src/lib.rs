//! Client for the Sky event store.
//!
//! One-shot REST calls go through [`SkyClient`] and [`TableClient`]. Bulk
//! ingestion goes through an [`EventStream`], a single chunked `PATCH` request
//! that stays open while events are appended and is acknowledged once, on
//! close.
//!
//! ```no_run
//! # async fn run() -> sky_client::Result<()> {
//! use sky_client::{Event, SkyClient};
//!
//! let client = SkyClient::new("localhost");
//! let mut stream = client.table("users").open_stream().await?;
//! stream.add_event("xyz", &Event::new(chrono::Utc::now(), Default::default())).await?;
//! stream.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod stream;
pub mod table;
pub mod time;
pub mod types;

pub use client::SkyClient;
pub use config::{ClientConfig, DEFAULT_PORT};
pub use error::{Result, SkyError};
pub use stream::{EventStream, StreamState, StreamWriter};
pub use table::TableClient;
pub use time::{format_timestamp, parse_timestamp};
pub use types::{DataType, Event, InsertMode, Property, Stats, Table};
