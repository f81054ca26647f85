use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// =============================================================================
// File config (figment-deserialized from defaults / hashchat.toml / env vars)
// =============================================================================
//
//   hashchat.toml:   [relay]
//                    outbound_queue = 64
//
//   env var:         HASHCHAT_RELAY__OUTBOUND_QUEUE=64   (double underscore = nesting)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub relay: RelayFileConfig,
}

/// Listener settings (lives under `[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Relay tunables (lives under `[relay]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayFileConfig {
    /// Frames a single connection may have queued before it is treated as stalled.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
    /// Upper bound on one frame write, in milliseconds. 0 disables the bound.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    #[serde(default = "default_max_message_kb")]
    pub max_message_kb: usize,
}

impl Default for RelayFileConfig {
    fn default() -> Self {
        Self {
            outbound_queue: default_outbound_queue(),
            send_timeout_ms: default_send_timeout_ms(),
            max_message_kb: default_max_message_kb(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    12345
}
fn default_outbound_queue() -> usize {
    256
}
fn default_send_timeout_ms() -> u64 {
    5000
}
fn default_max_message_kb() -> usize {
    1024
}

/// Build a figment that layers: defaults → config file → HASHCHAT_* env vars.
///
/// A missing config file is not an error; its layer is simply empty.
pub fn load_config(config_path: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_path))
        .merge(Env::prefixed("HASHCHAT_").split("__"))
}

// =============================================================================
// Runtime config structs (derived from FileConfig)
// =============================================================================

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_file(fc: &ServerFileConfig) -> Self {
        Self {
            host: fc.host.clone(),
            port: fc.port,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Capacity of each connection's outbound queue (always at least 1)
    pub outbound_queue: usize,
    /// Bound on a single frame write (None = unbounded)
    pub send_timeout: Option<Duration>,
    /// Largest frame accepted from a client
    pub max_message_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from_file(&RelayFileConfig::default())
    }
}

impl RelayConfig {
    pub fn from_file(fc: &RelayFileConfig) -> Self {
        Self {
            outbound_queue: fc.outbound_queue.max(1),
            send_timeout: if fc.send_timeout_ms == 0 {
                None
            } else {
                Some(Duration::from_millis(fc.send_timeout_ms))
            },
            max_message_bytes: fc.max_message_kb.max(1) * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ────────────────────────────────────────────────────────

    #[test]
    fn test_server_file_config_defaults() {
        let d = ServerFileConfig::default();
        assert_eq!(d.host, "127.0.0.1");
        assert_eq!(d.port, 12345);
    }

    #[test]
    fn test_relay_file_config_defaults() {
        let d = RelayFileConfig::default();
        assert_eq!(d.outbound_queue, 256);
        assert_eq!(d.send_timeout_ms, 5000);
        assert_eq!(d.max_message_kb, 1024);
    }

    // ── RelayConfig::from_file ──────────────────────────────────────────

    #[test]
    fn test_relay_config_from_file_defaults() {
        let rc = RelayConfig::default();
        assert_eq!(rc.outbound_queue, 256);
        assert_eq!(rc.send_timeout, Some(Duration::from_secs(5)));
        assert_eq!(rc.max_message_bytes, 1024 * 1024);
    }

    #[test]
    fn test_relay_config_zero_timeout_disables() {
        let fc = RelayFileConfig {
            send_timeout_ms: 0,
            ..Default::default()
        };
        assert!(RelayConfig::from_file(&fc).send_timeout.is_none());
    }

    #[test]
    fn test_relay_config_zero_queue_clamped() {
        let fc = RelayFileConfig {
            outbound_queue: 0,
            ..Default::default()
        };
        assert_eq!(RelayConfig::from_file(&fc).outbound_queue, 1);
    }

    #[test]
    fn test_server_config_bind_addr() {
        let sc = ServerConfig::from_file(&ServerFileConfig {
            host: "0.0.0.0".into(),
            port: 8080,
        });
        assert_eq!(sc.bind_addr(), "0.0.0.0:8080");
    }

    // ── load_config ─────────────────────────────────────────────────────

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(&tmp.path().join("hashchat.toml"))
            .extract()
            .unwrap();
        assert_eq!(fc.server.host, "127.0.0.1");
        assert_eq!(fc.server.port, 12345);
        assert_eq!(fc.relay.outbound_queue, 256);
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("hashchat.toml");
        std::fs::write(
            &path,
            "[server]\nhost = \"0.0.0.0\"\nport = 9000\n\n[relay]\noutbound_queue = 8\nsend_timeout_ms = 250\n",
        )
        .unwrap();
        let fc: FileConfig = load_config(&path).extract().unwrap();
        assert_eq!(fc.server.host, "0.0.0.0");
        assert_eq!(fc.server.port, 9000);
        assert_eq!(fc.relay.outbound_queue, 8);
        assert_eq!(fc.relay.send_timeout_ms, 250);
        assert_eq!(fc.relay.max_message_kb, 1024);
    }

    #[test]
    fn test_load_config_partial_section() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("hashchat.toml");
        std::fs::write(&path, "[server]\nport = 4000\n").unwrap();
        let fc: FileConfig = load_config(&path).extract().unwrap();
        assert_eq!(fc.server.host, "127.0.0.1");
        assert_eq!(fc.server.port, 4000);
    }
}
