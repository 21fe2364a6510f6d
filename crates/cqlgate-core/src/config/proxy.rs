//! Listener and backend connection settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration of the client-facing listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Address to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Port to listen on for incoming CQL connections.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Maximum number of concurrent client connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Largest frame body accepted from a client or the backend.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Authenticator class announced in AUTHENTICATE.
    #[serde(default = "default_authenticator")]
    pub authenticator: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            listen_port: default_listen_port(),
            max_connections: default_max_connections(),
            max_frame_bytes: default_max_frame_bytes(),
            authenticator: default_authenticator(),
        }
    }
}

impl ProxyConfig {
    /// `host:port` to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen_addr, self.listen_port)
    }
}

/// Configuration of the shared backend cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Hostname of the backend node.
    #[serde(default = "default_host")]
    pub host: String,

    /// Native protocol port of the backend node.
    #[serde(default = "default_backend_port")]
    pub port: u16,

    /// Maximum backend connections checked out at once.
    #[serde(default = "default_backend_max_connections")]
    pub max_connections: usize,

    /// Idle connections kept per backend principal.
    #[serde(default = "default_max_idle")]
    pub max_idle_per_principal: usize,

    /// TCP connect and handshake timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Timeout of a single request/response round trip in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_backend_port(),
            max_connections: default_backend_max_connections(),
            max_idle_per_principal: default_max_idle(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl BackendConfig {
    /// `host:port` of the backend.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    9042
}

fn default_max_connections() -> usize {
    1024
}

fn default_max_frame_bytes() -> usize {
    256 * 1024 * 1024
}

fn default_authenticator() -> String {
    "org.apache.cassandra.auth.PasswordAuthenticator".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_backend_port() -> u16 {
    9043
}

fn default_backend_max_connections() -> usize {
    64
}

fn default_max_idle() -> usize {
    8
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_listen_next_to_backend() {
        let proxy = ProxyConfig::default();
        let backend = BackendConfig::default();
        assert_eq!(proxy.bind_address(), "0.0.0.0:9042");
        assert_eq!(backend.address(), "localhost:9043");
    }

    #[test]
    fn test_timeouts() {
        let backend = BackendConfig {
            connect_timeout_secs: 2,
            request_timeout_secs: 7,
            ..Default::default()
        };
        assert_eq!(backend.connect_timeout(), Duration::from_secs(2));
        assert_eq!(backend.request_timeout(), Duration::from_secs(7));
    }
}
