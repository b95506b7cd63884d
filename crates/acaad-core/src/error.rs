// ── Core error types ──
//
// Errors surfaced to the adapter's error hook. The public engine API
// never returns these; it reports them and answers with a boolean.
// The `From<acaad_api::Error>` impl translates transport-layer errors
// into the core taxonomy.

use strum::EnumDiscriminants;
use thiserror::Error;

/// Unified error type for the core crate.
///
/// [`ErrorKind`] is the fieldless discriminant used to group failures,
/// e.g. to tell unreachable hosts apart from real faults during a sync.
#[derive(Debug, Error, EnumDiscriminants)]
#[strum_discriminants(name(ErrorKind), derive(strum::Display, Hash))]
pub enum CoreError {
    // ── Call errors ──────────────────────────────────────────────────
    /// Generic network or adapter call failure.
    #[error("Callout failed: {message}")]
    Callout { message: String },

    /// Connection refused or negotiation failed. Expected while a server
    /// is offline.
    #[error("Server {host} is unreachable: {reason}")]
    ServerUnreachable { host: String, reason: String },

    // ── Response errors ──────────────────────────────────────────────
    #[error("Response failed schema validation: {message}")]
    ResponseSchema { message: String, body: String },

    #[error("Unexpected status code: expected {expected}, got {actual}")]
    ResponseStatusCode { expected: u16, actual: u16 },

    // ── Outcome errors ───────────────────────────────────────────────
    #[error("Outcome could not be parsed: {message}")]
    OutcomeNotParseable { message: String },

    #[error("Outcome is not valid JSON: {message}")]
    OutcomeNotJson { message: String },

    // ── Contract errors ──────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The server speaks a newer metadata dialect than this engine.
    #[error("Unsupported metadata: {message}")]
    VersionMismatch { message: String },

    // ── Terminal ─────────────────────────────────────────────────────
    /// The adapter's own error hook failed. Never reported again.
    #[error("Fatal error: {message}")]
    Fatal { message: String },

    #[error("Operation cancelled")]
    Cancelled,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        self.into()
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn not_parseable(message: impl Into<String>) -> Self {
        Self::OutcomeNotParseable {
            message: message.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<acaad_api::Error> for CoreError {
    fn from(err: acaad_api::Error) -> Self {
        match err {
            acaad_api::Error::ServerUnreachable { url, reason } => {
                CoreError::ServerUnreachable { host: url, reason }
            }
            acaad_api::Error::Transport(ref e) if e.is_connect() => CoreError::ServerUnreachable {
                host: e.url().map(ToString::to_string).unwrap_or_default(),
                reason: e.to_string(),
            },
            acaad_api::Error::Transport(e) => CoreError::Callout {
                message: e.to_string(),
            },
            acaad_api::Error::InvalidUrl(e) => CoreError::Configuration {
                message: format!("Invalid URL: {e}"),
            },
            acaad_api::Error::Configuration(message) => CoreError::Configuration { message },
            acaad_api::Error::Status {
                expected, actual, ..
            } => CoreError::ResponseStatusCode { expected, actual },
            acaad_api::Error::Schema { message, body } => {
                CoreError::ResponseSchema { message, body }
            }
            acaad_api::Error::WebSocketConnect(reason) => CoreError::Callout {
                message: format!("WebSocket connection failed: {reason}"),
            },
            acaad_api::Error::WebSocketClosed { code, reason } => CoreError::Callout {
                message: format!("WebSocket closed (code {code}): {reason}"),
            },
            acaad_api::Error::Handshake(reason) => CoreError::Callout {
                message: format!("Hub handshake failed: {reason}"),
            },
        }
    }
}
