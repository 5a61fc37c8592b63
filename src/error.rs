use thiserror::Error;

/// Result type for webOS operations
pub type Result<T> = std::result::Result<T, WebOsError>;

/// Errors that can occur when talking to a webOS television
#[derive(Error, Debug)]
pub enum WebOsError {
    /// WebSocket connection error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection was closed before a reply arrived
    #[error("Connection closed")]
    ConnectionClosed,

    /// Request timed out waiting for response
    #[error("Request timeout")]
    Timeout,

    /// No control session is established
    #[error("Not connected")]
    NotConnected,

    /// The television has no valid pairing key for this client
    #[error("Pairing required, confirm the prompt on the television")]
    PairingRequired,

    /// The television replied with an error
    #[error("API error: {detail}")]
    ApiError {
        /// Error text reported by the television
        detail: String,
    },

    /// Invalid or unexpected payload from the television
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The pointer/button channel is not available
    #[error("Pointer input socket unavailable")]
    PointerUnavailable,

    /// MAC address could not be parsed
    #[error("Invalid MAC address: {0}")]
    InvalidMac(String),

    /// Input index outside the configured input list
    #[error("Unknown input index: {0}")]
    UnknownInput(usize),

    /// Input reference not in the configured input list
    #[error("Unknown input: {0}")]
    UnknownReference(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WebOsError {
    /// Whether the error is a routine network condition that reconnection
    /// resolves on its own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WebOsError::WebSocket(_)
                | WebOsError::ConnectionClosed
                | WebOsError::Timeout
                | WebOsError::NotConnected
                | WebOsError::Io(_)
        )
    }
}
