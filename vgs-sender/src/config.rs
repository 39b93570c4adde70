//! Configuration for the demo sender group.

use std::path::Path;

use serde::{Deserialize, Serialize};
use vgs_core::{ConnectionInfo, SessionConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    pub relay: RelayAddress,
    pub scene: SceneConfig,
    /// Shared by every sender and announced to the relay at startup.
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayAddress {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Number of senders in the group; must match the relay.
    pub senders: u32,
    /// Frames to draw unless the viewer quits first.
    pub frames: u32,
    /// Points per sender on each frame's curve.
    pub points: u32,
    /// Also keep a file-only caption window.
    pub caption: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for RelayAddress {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 7300,
        }
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            senders: 1,
            frames: 100,
            points: 64,
            caption: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl SenderConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn relay_info(&self) -> ConnectionInfo {
        ConnectionInfo::new(self.relay.host.clone(), self.relay.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrips_through_toml() {
        let text = toml::to_string_pretty(&SenderConfig::default()).unwrap();
        let back: SenderConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.session, SessionConfig::default());
        assert_eq!(back.scene.frames, 100);
    }

    #[test]
    fn session_section_is_partial() {
        let cfg: SenderConfig = toml::from_str(
            "[session]\nbuffer_len = 512\n\n[session.sinks]\npeer = true\n",
        )
        .unwrap();
        assert_eq!(cfg.session.buffer_len, 512);
        assert!(cfg.session.sinks.peer);
        assert!(cfg.session.sinks.file);
        assert_eq!(cfg.relay_info().port(), 7300);
    }
}
