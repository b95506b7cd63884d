use thiserror::Error;

/// Top-level error type for the `acaad-api` crate.
///
/// Covers every failure mode of the wire surfaces: discovery and command
/// HTTP calls, document validation, and the SignalR event hub.
/// `acaad-core` maps these into its own error taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (DNS failure, reset connection, body read, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The server refused the connection or could not be negotiated with.
    #[error("Server at {url} is unreachable: {reason}")]
    ServerUnreachable { url: String, reason: String },

    /// The client could not be constructed from the transport config.
    #[error("Invalid transport configuration: {0}")]
    Configuration(String),

    // ── HTTP responses ──────────────────────────────────────────────
    /// Non-success HTTP status.
    #[error("Unexpected HTTP status from {url}: expected {expected}, got {actual}")]
    Status {
        url: String,
        expected: u16,
        actual: u16,
    },

    /// The discovery document does not follow the ACAAD OpenAPI extension.
    #[error("Response does not match the ACAAD schema: {message}")]
    Schema { message: String, body: String },

    // ── Event hub ───────────────────────────────────────────────────
    /// WebSocket connection failed after the upgrade.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed by the server with a close frame.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// SignalR handshake or protocol violation.
    #[error("Hub protocol error: {0}")]
    Handshake(String),
}

impl Error {
    /// Returns `true` if the remote host could not be reached at all.
    ///
    /// Discovery treats these as expected while servers are offline.
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::ServerUnreachable { .. } => true,
            Self::Transport(e) => e.is_connect(),
            _ => false,
        }
    }
}
