// ACAAD REST client
//
// Wraps `reqwest::Client` with ACAAD URL construction and error
// classification. One client is shared across every configured host;
// the host is passed per call.

use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::host::Host;
use crate::openapi::{DISCOVERY_PATH, OpenApiDocument, OperationMethod};
use crate::trace::{TRACEPARENT_HEADER, TraceParent};
use crate::transport::TransportConfig;

/// HTTP client for discovery documents and component commands.
#[derive(Debug, Clone)]
pub struct AcaadClient {
    http: reqwest::Client,
}

impl AcaadClient {
    pub fn new(transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
        })
    }

    // ── Discovery ────────────────────────────────────────────────────

    /// Fetch and validate `GET /openapi/v1.json`.
    ///
    /// Refused connections map to [`Error::ServerUnreachable`]; a body
    /// that is empty or does not deserialize maps to [`Error::Schema`].
    pub async fn fetch_document(
        &self,
        host: &Host,
        trace: &TraceParent,
    ) -> Result<OpenApiDocument, Error> {
        let url = host.rest_url(DISCOVERY_PATH)?;
        debug!(host = %host.friendly_name, "GET {}", url);

        let resp = self.send(reqwest::Method::GET, url.clone(), trace).await?;
        let status = resp.status();
        if status != StatusCode::OK {
            return Err(Error::Status {
                url: url.to_string(),
                expected: StatusCode::OK.as_u16(),
                actual: status.as_u16(),
            });
        }

        let body = resp.text().await.map_err(Error::Transport)?;
        parse_document(&body)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Issue `METHOD scheme://address:rest_port/<path>` for a component
    /// operation. Any 2xx response is success; the body is ignored.
    pub async fn execute(
        &self,
        host: &Host,
        method: OperationMethod,
        path: &str,
        trace: &TraceParent,
    ) -> Result<(), Error> {
        let url = host.rest_url(path)?;
        debug!(host = %host.friendly_name, "{} {}", method, url);

        let resp = self.send(method.as_reqwest(), url.clone(), trace).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                expected: StatusCode::OK.as_u16(),
                actual: status.as_u16(),
            });
        }
        Ok(())
    }

    // ── Request helper ───────────────────────────────────────────────

    async fn send(
        &self,
        method: reqwest::Method,
        url: Url,
        trace: &TraceParent,
    ) -> Result<reqwest::Response, Error> {
        self.http
            .request(method, url.clone())
            .header(TRACEPARENT_HEADER, trace.to_header())
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    Error::ServerUnreachable {
                        url: url.to_string(),
                        reason: e.to_string(),
                    }
                } else {
                    Error::Transport(e)
                }
            })
    }
}

/// Deserialize a discovery document body.
pub fn parse_document(body: &str) -> Result<OpenApiDocument, Error> {
    if body.trim().is_empty() {
        return Err(Error::Schema {
            message: "empty response body".into(),
            body: String::new(),
        });
    }

    serde_json::from_str(body).map_err(|e| Error::Schema {
        message: e.to_string(),
        body: body.to_owned(),
    })
}
