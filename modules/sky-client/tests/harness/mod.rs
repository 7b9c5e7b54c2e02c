//! In-process fake Sky servers for integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sky_client::{ClientConfig, SkyClient};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

pub fn client_for(port: u16) -> SkyClient {
    let config = ClientConfig::new("127.0.0.1")
        .with_port(port)
        .with_request_timeout(Duration::from_secs(5))
        .with_stream_timeout(Duration::from_secs(5));
    SkyClient::from_config(config).expect("client should build")
}

/// A port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

// ---------------------------------------------------------------------------
// REST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body should be JSON")
    }
}

/// Canned reply: status code and raw body, or a verbatim response.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    /// Written as-is instead of a well-formed response, then the socket closes.
    pub raw: Option<String>,
}

impl Reply {
    pub fn ok(body: &str) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self { status, body: body.to_string(), raw: None }
    }

    pub fn raw(response: &str) -> Self {
        Self { status: 0, body: String::new(), raw: Some(response.to_string()) }
    }
}

/// HTTP server answering every request with the same reply and recording
/// what it received.
pub struct FakeHttpServer {
    pub port: u16,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl FakeHttpServer {
    pub async fn start(reply: Reply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let recorded = recorded.clone();
                let reply = reply.clone();
                tokio::spawn(async move {
                    serve_one(socket, &reply, &recorded).await;
                });
            }
        });

        Self { port, requests }
    }

    pub fn client(&self) -> SkyClient {
        client_for(self.port)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Read one request, record it, then answer. Recording first means a client
/// that has seen the response can always see the request.
async fn serve_one(socket: TcpStream, reply: &Reply, recorded: &Mutex<Vec<RecordedRequest>>) -> Option<()> {
    let mut reader = BufReader::new(socket);

    let mut line = String::new();
    reader.read_line(&mut line).await.ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut headers = Vec::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await.ok()? == 0 {
            break;
        }
        let header = line.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    let length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0; length];
    reader.read_exact(&mut body).await.ok()?;

    recorded.lock().unwrap().push(RecordedRequest {
        method,
        path,
        headers,
        body,
    });

    let response = reply.raw.clone().unwrap_or_else(|| format!(
        "HTTP/1.1 {} Fake\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        reply.status,
        reply.body.len(),
        reply.body
    ));
    let mut socket = reader.into_inner();
    socket.write_all(response.as_bytes()).await.ok()?;
    socket.shutdown().await.ok()
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

/// Everything the stream server read from one connection.
#[derive(Debug)]
pub struct StreamCapture {
    /// Request line and headers, including the blank line.
    pub header: String,
    /// Raw chunked body bytes.
    pub body: Vec<u8>,
    /// Decoded chunk payloads, excluding the terminating chunk.
    pub chunks: Vec<Vec<u8>>,
    /// Whether the terminating chunk arrived before the client hung up.
    pub terminated: bool,
}

impl StreamCapture {
    pub fn json_chunks(&self) -> Vec<serde_json::Value> {
        self.chunks
            .iter()
            .map(|c| serde_json::from_slice(c).expect("chunk should be JSON"))
            .collect()
    }
}

/// How the stream server answers a terminated body.
#[derive(Debug, Clone)]
pub enum StreamReply {
    Status(&'static str),
    /// Read the body but never answer.
    Stall,
    /// Write this response verbatim, then hold the socket open.
    Hold(&'static str),
}

/// Raw TCP server speaking just enough HTTP to accept chunked event streams.
pub struct FakeStreamServer {
    pub port: u16,
    captures: mpsc::UnboundedReceiver<StreamCapture>,
}

impl FakeStreamServer {
    pub async fn start(reply: StreamReply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, captures) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let tx = tx.clone();
                let reply = reply.clone();
                tokio::spawn(async move {
                    let capture = capture_stream(socket, &reply).await;
                    let _ = tx.send(capture);
                });
            }
        });

        Self { port, captures }
    }

    pub fn client(&self) -> SkyClient {
        client_for(self.port)
    }

    /// Next connection's capture, in the order connections finished.
    pub async fn next_capture(&mut self) -> StreamCapture {
        tokio::time::timeout(Duration::from_secs(5), self.captures.recv())
            .await
            .expect("stream server timed out")
            .expect("stream server stopped")
    }
}

async fn capture_stream(mut socket: TcpStream, reply: &StreamReply) -> StreamCapture {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];

    let (header_end, chunks) = loop {
        if let Some(end) = find(&raw, b"\r\n\r\n") {
            if let Some(chunks) = parse_chunked(&raw[end + 4..]) {
                break (end + 4, Some(chunks));
            }
        }
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => {
                let end = find(&raw, b"\r\n\r\n").map(|e| e + 4).unwrap_or(raw.len());
                break (end, None);
            }
            Ok(n) => raw.extend_from_slice(&buf[..n]),
        }
    };

    let terminated = chunks.is_some();
    if terminated {
        match reply {
            StreamReply::Status(status) => {
                let response = format!("HTTP/1.0 {status}\r\nContent-Type: application/json\r\n\r\n{{}}");
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
            StreamReply::Hold(response) => {
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.read(&mut buf).await;
            }
            StreamReply::Stall => {
                // Hold the socket open until the client gives up.
                let _ = socket.read(&mut buf).await;
            }
        }
    }

    StreamCapture {
        header: String::from_utf8_lossy(&raw[..header_end]).into_owned(),
        body: raw[header_end..].to_vec(),
        chunks: chunks.unwrap_or_else(|| parse_partial(&raw[header_end..])),
        terminated,
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Decode a complete chunked body; `None` until the terminating chunk and
/// its trailing CRLF have arrived.
pub fn parse_chunked(mut body: &[u8]) -> Option<Vec<Vec<u8>>> {
    let mut chunks = Vec::new();
    loop {
        let line_end = find(body, b"\r\n")?;
        let size = usize::from_str_radix(std::str::from_utf8(&body[..line_end]).ok()?, 16).ok()?;
        body = &body[line_end + 2..];
        if body.len() < size + 2 {
            return None;
        }
        if size == 0 {
            return (&body[..2] == b"\r\n").then_some(chunks);
        }
        chunks.push(body[..size].to_vec());
        body = &body[size + 2..];
    }
}

/// Decode whatever whole chunks arrived before the connection dropped.
fn parse_partial(mut body: &[u8]) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    while let Some(line_end) = find(body, b"\r\n") {
        let Some(size) = std::str::from_utf8(&body[..line_end])
            .ok()
            .and_then(|s| usize::from_str_radix(s, 16).ok())
        else {
            break;
        };
        let rest = &body[line_end + 2..];
        if size == 0 || rest.len() < size + 2 {
            break;
        }
        chunks.push(rest[..size].to_vec());
        body = &rest[size + 2..];
    }
    chunks
}
