// ── ACAAD host identity ──
//
// A `Host` names one remote ACAAD server. Two hosts are the same server
// when address and both ports match; the friendly name, scheme and auth
// reference are descriptive only.

use std::fmt;
use std::hash::{Hash, Hasher};

use secrecy::SecretString;
use url::Url;

use crate::error::Error;

/// Path of the SignalR hub relative to the push port.
pub const EVENT_HUB_PATH: &str = "events";

/// URL scheme used for REST calls. The push hub uses the matching
/// WebSocket scheme (`ws`/`wss`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    pub fn http(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    pub fn ws(self) -> &'static str {
        match self {
            Self::Http => "ws",
            Self::Https => "wss",
        }
    }
}

/// OAuth client-credentials reference for a host.
///
/// The engine never runs the token flow itself; embedders read this to
/// acquire tokens out of band.
#[derive(Debug, Clone)]
pub struct Authentication {
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub grants: Vec<String>,
}

/// A configured ACAAD server.
#[derive(Debug, Clone)]
pub struct Host {
    pub friendly_name: String,
    pub address: String,
    pub rest_port: u16,
    pub push_port: u16,
    pub scheme: Scheme,
    pub auth: Option<Authentication>,
}

impl Host {
    /// Create a plain-HTTP host whose push hub shares the REST port.
    pub fn new(friendly_name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            friendly_name: friendly_name.into(),
            address: address.into(),
            rest_port: port,
            push_port: port,
            scheme: Scheme::Http,
            auth: None,
        }
    }

    /// Override the push (SignalR) port.
    pub fn with_push_port(mut self, port: u16) -> Self {
        self.push_port = port;
        self
    }

    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_auth(mut self, auth: Authentication) -> Self {
        self.auth = Some(auth);
        self
    }

    /// `scheme://address:rest_port/`
    pub fn rest_base(&self) -> Result<Url, Error> {
        Ok(Url::parse(&format!(
            "{}://{}:{}/",
            self.scheme.http(),
            self.address,
            self.rest_port
        ))?)
    }

    /// Resolve a REST path against the base URL. A leading `/` is optional.
    pub fn rest_url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.rest_base()?.join(path.trim_start_matches('/'))?)
    }

    /// WebSocket URL of the push hub: `ws(s)://address:push_port/events`.
    pub fn push_url(&self) -> Result<Url, Error> {
        Ok(Url::parse(&format!(
            "{}://{}:{}/{EVENT_HUB_PATH}",
            self.scheme.ws(),
            self.address,
            self.push_port
        ))?)
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
            && self.rest_port == other.rest_port
            && self.push_port == other.push_port
    }
}

impl Eq for Host {}

impl Hash for Host {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
        self.rest_port.hash(state);
        self.push_port.hash(state);
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}:{}/{})",
            self.friendly_name, self.address, self.rest_port, self.push_port
        )
    }
}
