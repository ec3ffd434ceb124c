//! Read-mostly configuration consumed by the readback pipeline.
//!
//! The configuration is published through a `tokio::sync::watch`
//! channel. Readers take a fresh snapshot at the start of every frame,
//! without touching any binding lock, so a concurrent update is simply
//! picked up on the next frame.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

// ── CompressMode ─────────────────────────────────────────────────

/// Delivery pipeline selected by a compression mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pipeline {
    /// Blit into a local destination window.
    LocalRelay,
    /// Hand the frame to a remote client.
    Network,
    /// Dedicated low-latency thin-client channel.
    ThinClient,
}

/// Compression / transport mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressMode {
    /// Uncompressed local relay.
    Proxy,
    /// Lossy network transport.
    Jpeg,
    /// Lossless network transport.
    Rgb,
    ThinDpcm,
    ThinRgb,
    ThinYuv,
}

impl CompressMode {
    pub const fn pipeline(self) -> Pipeline {
        match self {
            CompressMode::Proxy => Pipeline::LocalRelay,
            CompressMode::Jpeg | CompressMode::Rgb => Pipeline::Network,
            CompressMode::ThinDpcm | CompressMode::ThinRgb | CompressMode::ThinYuv => {
                Pipeline::ThinClient
            }
        }
    }

    /// Only the generic network transport can carry quad-buffered stereo.
    pub const fn carries_quad_stereo(self) -> bool {
        matches!(self.pipeline(), Pipeline::Network)
    }

    /// Wire tag carried in frame metadata.
    pub const fn wire_id(self) -> u8 {
        match self {
            CompressMode::Proxy => 0,
            CompressMode::Jpeg => 1,
            CompressMode::Rgb => 2,
            CompressMode::ThinDpcm => 3,
            CompressMode::ThinRgb => 4,
            CompressMode::ThinYuv => 5,
        }
    }

    pub const fn from_wire_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(CompressMode::Proxy),
            1 => Some(CompressMode::Jpeg),
            2 => Some(CompressMode::Rgb),
            3 => Some(CompressMode::ThinDpcm),
            4 => Some(CompressMode::ThinRgb),
            5 => Some(CompressMode::ThinYuv),
            _ => None,
        }
    }
}

// ── StereoMode ───────────────────────────────────────────────────

/// How stereo frames are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StereoMode {
    /// Deliver only the left eye.
    Left,
    /// Deliver only the right eye.
    Right,
    /// Quad-buffered hardware stereo.
    Quad,
    /// Red/cyan anaglyph.
    RedCyan,
}

impl StereoMode {
    pub const fn is_single_eye(self) -> bool {
        matches!(self, StereoMode::Left | StereoMode::Right)
    }
}

// ── Surface options ──────────────────────────────────────────────

/// Present path for surface swaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentPath {
    #[default]
    Swap,
    Vendor,
}

/// Surface allocation switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceOptions {
    /// Allocate invisible windows instead of off-screen buffers.
    pub use_window: bool,
    pub present: PresentPath,
}

// ── MovieConfig ──────────────────────────────────────────────────

/// Independent recording of delivered frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovieConfig {
    pub path: PathBuf,
    pub compress: CompressMode,
    pub quality: u8,
    pub subsamp: u8,
}

impl Default for MovieConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("relaygl.movie"),
            compress: CompressMode::Jpeg,
            quality: 95,
            subsamp: 1,
        }
    }
}

// ── RelayConfig ──────────────────────────────────────────────────

/// Everything the router reads at the start of a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Master switch for pixel readback.
    pub readback: bool,
    pub compress: CompressMode,
    /// Codec quality, 1..=100.
    pub quality: u8,
    /// Chroma subsampling factor.
    pub subsamp: u8,
    pub stereo: StereoMode,
    /// Drop a frame when the destination has not consumed the last one.
    pub spoil: bool,
    /// Remote client address for the network transport.
    pub client: Option<String>,
    /// Gamma correction factor. Negative values prefer hardware
    /// gamma-corrected visuals and otherwise apply `|gamma|`.
    pub gamma: f64,
    /// Publish solid-color samples for external test harnesses.
    pub autotest: bool,
    pub verbose: bool,
    pub movie: Option<MovieConfig>,
    pub surface: SurfaceOptions,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            readback: true,
            compress: CompressMode::Jpeg,
            quality: 95,
            subsamp: 1,
            stereo: StereoMode::Quad,
            spoil: true,
            client: None,
            gamma: 1.0,
            autotest: false,
            verbose: false,
            movie: None,
            surface: SurfaceOptions::default(),
        }
    }
}

impl RelayConfig {
    /// Whether the movie stream can reuse the live capture.
    pub fn movie_shares_capture(&self, compress: CompressMode) -> bool {
        match &self.movie {
            Some(m) => {
                m.compress == compress
                    && m.quality == self.quality
                    && m.subsamp == self.subsamp
                    && !self.spoil
            }
            None => false,
        }
    }
}

// ── ConfigHandle ─────────────────────────────────────────────────

/// Writer side of the configuration channel.
pub struct ConfigHandle {
    tx: watch::Sender<RelayConfig>,
}

impl ConfigHandle {
    pub fn new(config: RelayConfig) -> Self {
        let (tx, _rx) = watch::channel(config);
        Self { tx }
    }

    /// A reader for the router.
    pub fn subscribe(&self) -> ConfigReader {
        ConfigReader {
            rx: self.tx.subscribe(),
        }
    }

    /// Replace the published configuration.
    pub fn publish(&self, config: RelayConfig) {
        self.tx.send_replace(config);
    }

    /// Edit the published configuration in place.
    pub fn update(&self, edit: impl FnOnce(&mut RelayConfig)) {
        self.tx.send_modify(edit);
    }
}

/// Reader side of the configuration channel.
#[derive(Clone)]
pub struct ConfigReader {
    rx: watch::Receiver<RelayConfig>,
}

impl ConfigReader {
    /// Copy of the current configuration.
    pub fn snapshot(&self) -> RelayConfig {
        self.rx.borrow().clone()
    }
}

impl From<RelayConfig> for ConfigReader {
    /// A reader over a fixed configuration.
    fn from(config: RelayConfig) -> Self {
        ConfigHandle::new(config).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipelines_by_mode() {
        assert_eq!(CompressMode::Proxy.pipeline(), Pipeline::LocalRelay);
        assert_eq!(CompressMode::Rgb.pipeline(), Pipeline::Network);
        assert_eq!(CompressMode::ThinYuv.pipeline(), Pipeline::ThinClient);
        assert!(CompressMode::Jpeg.carries_quad_stereo());
        assert!(!CompressMode::Proxy.carries_quad_stereo());
        assert!(!CompressMode::ThinDpcm.carries_quad_stereo());
    }

    #[test]
    fn wire_ids_are_stable() {
        for mode in [
            CompressMode::Proxy,
            CompressMode::Jpeg,
            CompressMode::Rgb,
            CompressMode::ThinDpcm,
            CompressMode::ThinRgb,
            CompressMode::ThinYuv,
        ] {
            assert_eq!(CompressMode::from_wire_id(mode.wire_id()), Some(mode));
        }
        assert_eq!(CompressMode::from_wire_id(42), None);
    }

    #[test]
    fn movie_sharing_requires_matching_settings() {
        let mut cfg = RelayConfig {
            spoil: false,
            movie: Some(MovieConfig::default()),
            ..RelayConfig::default()
        };
        assert!(cfg.movie_shares_capture(CompressMode::Jpeg));
        assert!(!cfg.movie_shares_capture(CompressMode::Rgb));

        cfg.spoil = true;
        assert!(!cfg.movie_shares_capture(CompressMode::Jpeg));

        cfg.spoil = false;
        cfg.quality = 50;
        assert!(!cfg.movie_shares_capture(CompressMode::Jpeg));
    }

    #[test]
    fn readers_see_updates() {
        let handle = ConfigHandle::new(RelayConfig::default());
        let reader = handle.subscribe();
        assert!(reader.snapshot().spoil);
        handle.update(|c| c.spoil = false);
        assert!(!reader.snapshot().spoil);
    }
}
