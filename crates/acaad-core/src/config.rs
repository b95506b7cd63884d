// ── Runtime engine configuration ──
//
// Connection tuning for discovery, commands and hub sessions. Never
// touches disk; embedders construct an `EngineConfig` (directly or via
// `acaad-config`) and hand it to `Engine::new`.

use std::time::Duration;

use acaad_api::{HubConfig, TlsMode, TransportConfig};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Whole-request timeout for discovery and commands.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Fixed delay between hub reconnect attempts.
    pub reconnect_interval: Duration,
    /// Interval of hub keep-alive pings.
    pub keepalive_interval: Duration,
    pub user_agent: Option<String>,
    /// Skip TLS verification for `https` hosts with self-signed certs.
    pub accept_invalid_certs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let hub = HubConfig::default();
        let transport = TransportConfig::default();
        Self {
            request_timeout: transport.timeout,
            connect_timeout: transport.connect_timeout,
            reconnect_interval: hub.reconnect_interval,
            keepalive_interval: hub.keepalive_interval,
            user_agent: None,
            accept_invalid_certs: false,
        }
    }
}

impl EngineConfig {
    pub fn transport(&self) -> TransportConfig {
        let mut transport = TransportConfig {
            timeout: self.request_timeout,
            connect_timeout: self.connect_timeout,
            ..TransportConfig::default()
        };
        if let Some(ref ua) = self.user_agent {
            transport.user_agent.clone_from(ua);
        }
        if self.accept_invalid_certs {
            transport.tls = TlsMode::DangerAcceptInvalid;
        }
        transport
    }

    pub fn hub(&self) -> HubConfig {
        HubConfig {
            reconnect_interval: self.reconnect_interval,
            keepalive_interval: self.keepalive_interval,
            ..HubConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_transport_and_hub() {
        let config = EngineConfig::default();
        assert_eq!(config.reconnect_interval, Duration::from_secs(5));
        assert_eq!(config.keepalive_interval, Duration::from_secs(15));
        assert_eq!(config.transport().tls, TlsMode::System);
    }

    #[test]
    fn overrides_reach_transport() {
        let config = EngineConfig {
            user_agent: Some("home-hub/2.1".into()),
            accept_invalid_certs: true,
            request_timeout: Duration::from_secs(3),
            ..EngineConfig::default()
        };
        let transport = config.transport();
        assert_eq!(transport.user_agent, "home-hub/2.1");
        assert_eq!(transport.tls, TlsMode::DangerAcceptInvalid);
        assert_eq!(transport.timeout, Duration::from_secs(3));
    }
}
