use thiserror::Error;

pub type Result<T> = std::result::Result<T, SkyError>;

#[derive(Debug, Error)]
pub enum SkyError {
    /// The request never produced a response: DNS, connect, or timeout.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-200 response. Carries the server's `message` or a
    /// `"<method> <url> [<status>]"` fallback, displayed verbatim.
    #[error("{0}")]
    Server(String),

    /// The close handshake of an event stream was answered with a non-200 status.
    #[error("{status_line}")]
    Stream { status: u16, status_line: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Stream is not connected")]
    NotConnected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl SkyError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        SkyError::Validation(message.into())
    }
}

impl From<reqwest::Error> for SkyError {
    fn from(err: reqwest::Error) -> Self {
        SkyError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for SkyError {
    fn from(err: serde_json::Error) -> Self {
        SkyError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_displays_message_verbatim() {
        let err = SkyError::Server("Table not found".to_string());
        assert_eq!(err.to_string(), "Table not found");
    }

    #[test]
    fn stream_error_displays_status_line() {
        let err = SkyError::Stream {
            status: 500,
            status_line: "500 Internal Server Error".to_string(),
        };
        assert_eq!(err.to_string(), "500 Internal Server Error");
    }
}
