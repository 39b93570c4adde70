//! Configuration for the relay service.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub network: NetworkConfig,
    pub output: OutputConfig,
    pub peer: PeerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address senders connect to.
    pub listen: String,
    /// Number of senders in the run.
    pub senders: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory the metafile is created in.
    pub directory: PathBuf,
    /// File name used when the handshake leaves it empty.
    pub default_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Rendering-peer address used when the handshake names no display.
    pub address: String,
    /// Forward every k-th frame to the rendering peer.
    pub frame_stride: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:7300".into(),
            senders: 1,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            default_file: "vgs.meta".into(),
        }
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:7400".into(),
            frame_stride: 1,
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

impl RelayConfig {
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

    /// Stride clamped to at least 1.
    pub fn frame_stride(&self) -> u32 {
        self.peer.frame_stride.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&RelayConfig::default()).unwrap();
        assert!(text.contains("listen"));
        assert!(text.contains("frame_stride"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg: RelayConfig = toml::from_str("[network]\nsenders = 4\n").unwrap();
        assert_eq!(cfg.network.senders, 4);
        assert_eq!(cfg.network.listen, "127.0.0.1:7300");
        assert_eq!(cfg.frame_stride(), 1);
    }

    #[test]
    fn zero_stride_is_clamped() {
        let mut cfg = RelayConfig::default();
        cfg.peer.frame_stride = 0;
        assert_eq!(cfg.frame_stride(), 1);
    }

    #[test]
    fn missing_file_falls_back() {
        let cfg = RelayConfig::load(Path::new("/nonexistent/vgs-relay.toml"));
        assert_eq!(cfg.output.default_file, "vgs.meta");
    }
}
