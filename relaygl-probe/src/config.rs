//! Configuration for the readback probe.

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use relaygl_core::RelayConfig;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Readback pipeline settings shared by every window.
    pub relay: RelayConfig,
    pub network: NetworkConfig,
    /// Simulated application workload.
    pub probe: WorkloadConfig,
    pub logging: LoggingConfig,
}

/// Network transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Local address each sender socket binds to.
    pub bind: String,
    /// Start an in-process receiver and send frames to it when no
    /// client is configured.
    pub loopback_receiver: bool,
    /// Datagram payload size.
    pub mtu: usize,
}

/// Simulated application windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    pub windows: u32,
    /// Frames rendered per window.
    pub frames: u32,
    pub width: u32,
    pub height: u32,
    /// Grow the window through an external configure event every
    /// this many frames (0 = never).
    pub resize_every: u32,
    /// Render into stereo surfaces.
    pub stereo: bool,
    /// Whether the thin-client route is reachable at start.
    pub thin_route_up: bool,
    pub frame_interval_ms: u64,
}

/// Logging settings.
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
            bind: "127.0.0.1:0".into(),
            loopback_receiver: true,
            mtu: 1400,
        }
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            windows: 2,
            frames: 60,
            width: 320,
            height: 240,
            resize_every: 20,
            stereo: false,
            thin_route_up: true,
            frame_interval_ms: 16,
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

impl ProbeConfig {
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

    /// Write the default configuration to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Parsed sender bind address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.network.bind.parse()
    }
}

// ── Tests ────────────────────────────────────────────────────────
