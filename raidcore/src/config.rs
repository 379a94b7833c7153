//! `ServerConfig`: the immutable, load-once configuration record consumed
//! by the acceptor and handlers. Built from defaults, then overlaid by a
//! TOML file, then overlaid by explicit CLI flags (CLI wins).

use serde::{Deserialize, Serialize};

pub const DEFAULT_LISTEN_PORT: u16 = 8888;
pub const DEFAULT_HEARTBEAT_TIMEOUT_S: u64 = 30;
pub const DEFAULT_READ_TIMEOUT_S: u64 = 5;
pub const DEFAULT_RATE_MAX: u32 = 5;
pub const DEFAULT_RATE_WINDOW_S: u64 = 1;
pub const DEFAULT_RESPAWN_DELAY_S: u64 = 10;
pub const DEFAULT_BACKLOG: u32 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_port: u16,
    pub cert_path: String,
    pub key_path: String,
    pub ca_path: Option<String>,
    pub heartbeat_timeout_s: u64,
    pub read_timeout_s: u64,
    pub rate_max: u32,
    pub rate_window_s: u64,
    pub respawn_delay_s: u64,
    pub backlog: u32,
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            listen_port: DEFAULT_LISTEN_PORT,
            cert_path: String::new(),
            key_path: String::new(),
            ca_path: None,
            heartbeat_timeout_s: DEFAULT_HEARTBEAT_TIMEOUT_S,
            read_timeout_s: DEFAULT_READ_TIMEOUT_S,
            rate_max: DEFAULT_RATE_MAX,
            rate_window_s: DEFAULT_RATE_WINDOW_S,
            respawn_delay_s: DEFAULT_RESPAWN_DELAY_S,
            backlog: DEFAULT_BACKLOG,
        }
    }
}

/// Fields optionally supplied from a TOML file or CLI flags; `None` means
/// "not overridden at this layer". Merging proceeds defaults -> file ->
/// flags, each layer overwriting only the fields it sets.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigOverlay {
    pub listen_port: Option<u16>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
    pub ca_path: Option<String>,
    pub heartbeat_timeout_s: Option<u64>,
    pub read_timeout_s: Option<u64>,
    pub rate_max: Option<u32>,
    pub rate_window_s: Option<u64>,
    pub respawn_delay_s: Option<u64>,
    pub backlog: Option<u32>,
}

impl ServerConfig {
    pub fn apply_overlay(mut self, overlay: ConfigOverlay) -> ServerConfig {
        if let Some(v) = overlay.listen_port {
            self.listen_port = v;
        }
        if let Some(v) = overlay.cert_path {
            self.cert_path = v;
        }
        if let Some(v) = overlay.key_path {
            self.key_path = v;
        }
        if overlay.ca_path.is_some() {
            self.ca_path = overlay.ca_path;
        }
        if let Some(v) = overlay.heartbeat_timeout_s {
            self.heartbeat_timeout_s = v;
        }
        if let Some(v) = overlay.read_timeout_s {
            self.read_timeout_s = v;
        }
        if let Some(v) = overlay.rate_max {
            self.rate_max = v;
        }
        if let Some(v) = overlay.rate_window_s {
            self.rate_window_s = v;
        }
        if let Some(v) = overlay.respawn_delay_s {
            self.respawn_delay_s = v;
        }
        if let Some(v) = overlay.backlog {
            self.backlog = v;
        }
        self
    }

    /// Loads a TOML config file and overlays it on top of the defaults.
    pub fn from_toml_file(path: &str) -> Result<ServerConfig, serdeconv::Error> {
        let overlay: ConfigOverlay = serdeconv::from_toml_file(path)?;
        Ok(ServerConfig::default().apply_overlay(overlay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_port, 8888);
        assert_eq!(cfg.heartbeat_timeout_s, 30);
        assert_eq!(cfg.read_timeout_s, 5);
        assert_eq!(cfg.rate_max, 5);
        assert_eq!(cfg.rate_window_s, 1);
    }

    #[test]
    fn overlay_only_touches_set_fields() {
        let cfg = ServerConfig::default();
        let overlay = ConfigOverlay {
            listen_port: Some(9999),
            ..Default::default()
        };
        let merged = cfg.apply_overlay(overlay);
        assert_eq!(merged.listen_port, 9999);
        assert_eq!(merged.heartbeat_timeout_s, DEFAULT_HEARTBEAT_TIMEOUT_S);
    }

    #[test]
    fn layered_overlays_apply_in_order() {
        let file_layer = ConfigOverlay {
            listen_port: Some(7000),
            rate_max: Some(10),
            ..Default::default()
        };
        let cli_layer = ConfigOverlay {
            listen_port: Some(7001),
            ..Default::default()
        };
        let merged = ServerConfig::default()
            .apply_overlay(file_layer)
            .apply_overlay(cli_layer);
        // CLI wins over file for the field both set...
        assert_eq!(merged.listen_port, 7001);
        // ...but a field only the file layer set survives the CLI overlay.
        assert_eq!(merged.rate_max, 10);
    }
}
