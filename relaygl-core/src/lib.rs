//! # relaygl-core
//!
//! Off-screen surface binding, pixel readback and frame routing for a
//! virtualized rendering layer.
//!
//! This crate contains:
//! - **Platform**: `GraphicsPlatform` / `WindowingPlatform` traits and the in-memory `SoftPlatform`
//! - **Surfaces**: `PixelSurface` and the per-window `SurfaceBinding` state machine
//! - **Readback**: `ReadbackEngine` with buffer selection, gamma correction and anaglyph synthesis
//! - **Routing**: `TransportRouter` choosing local relay, network or thin-client delivery per frame
//! - **Sinks**: `MemoryBlitter`, `NetworkSink` + UDP `FrameTransport`, `MovieRecorder`, `LoopbackThinClient`
//! - **Error**: `RelayError`, a typed, `thiserror`-based error hierarchy

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod binding;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod flags;
pub mod frame;
pub mod gamma;
pub mod notice;
pub mod platform;
pub mod readback;
pub mod router;
pub mod sink;
pub mod surface;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use binding::{BindOutcome, BindingPhase, SurfaceBinding, SurfaceInfo};
pub use config::{
    CompressMode, ConfigHandle, ConfigReader, MovieConfig, Pipeline, PresentPath, RelayConfig,
    StereoMode, SurfaceOptions,
};
pub use error::{RelayError, Result};
pub use flags::FrameFlags;
pub use frame::{BufferRequest, FrameBuffer, FrameMeta};
pub use gamma::GammaTable;
pub use notice::NoticeLatches;
pub use platform::soft::SoftPlatform;
pub use platform::{
    BufferId, Drawable, EventChannel, FbConfig, GraphicsPlatform, PixelFormat, Rect,
    StructureEvent, WindowAttributes, WindowId, WindowingPlatform,
};
pub use readback::{ReadbackEngine, ReadbackSettings};
pub use router::{FrameOutcome, ReadbackRequest, SkipReason, TransportRouter};
pub use sink::{FrameSink, SinkFactory};
pub use surface::PixelSurface;

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
