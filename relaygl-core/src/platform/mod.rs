//! Narrow interfaces onto the graphics and windowing platforms.
//!
//! The pipeline never talks to a driver directly. Everything it needs
//! (surface allocation, pixel transfer, read-buffer selection, error
//! query, window attributes and structure events) goes through the
//! two traits below. [`soft::SoftPlatform`] implements both in memory.

pub mod soft;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

// ── Handles ──────────────────────────────────────────────────────

/// Opaque handle the graphics platform renders into or reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Drawable(pub u64);

/// Opaque framebuffer configuration handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FbConfig(pub u32);

/// Identity of an application window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

// ── BufferId ─────────────────────────────────────────────────────

/// Color buffer selector, mirroring the quad-buffer layout
/// (front/back × left/right).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferId {
    Front,
    Back,
    Left,
    Right,
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
}

impl BufferId {
    /// Left-eye counterpart of a front/back selector.
    pub const fn left_eye(self) -> Self {
        match self {
            BufferId::Back => BufferId::BackLeft,
            BufferId::Front => BufferId::FrontLeft,
            other => other,
        }
    }

    /// Right-eye counterpart of a front/back selector.
    pub const fn right_eye(self) -> Self {
        match self {
            BufferId::Back => BufferId::BackRight,
            BufferId::Front => BufferId::FrontRight,
            other => other,
        }
    }

    /// Whether the selector addresses a right-eye buffer.
    pub const fn is_right(self) -> bool {
        matches!(
            self,
            BufferId::Right | BufferId::FrontRight | BufferId::BackRight
        )
    }
}

// ── PixelFormat ──────────────────────────────────────────────────

/// Layout requested from a pixel transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgb,
    Bgr,
    Rgba,
    Bgra,
    Abgr,
    Argb,
    Red,
    Green,
    Blue,
    ColorIndex,
}

impl PixelFormat {
    /// Bytes written per pixel.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
            PixelFormat::Rgba | PixelFormat::Bgra | PixelFormat::Abgr | PixelFormat::Argb => 4,
            PixelFormat::Red | PixelFormat::Green | PixelFormat::Blue | PixelFormat::ColorIndex => {
                1
            }
        }
    }
}

/// A region of a drawable, origin at the bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn sized(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

// ── GraphicsPlatform ─────────────────────────────────────────────

/// Surface and pixel-transfer primitives of the rendering platform.
///
/// Errors follow the GL convention: calls record error codes which
/// are drained with [`next_error`](Self::next_error).
pub trait GraphicsPlatform: Send + Sync {
    /// Allocate an off-screen buffer. `None` when the platform is out
    /// of resources.
    fn create_pbuffer(&self, config: FbConfig, width: u32, height: u32) -> Option<Drawable>;
    fn destroy_pbuffer(&self, drawable: Drawable);

    /// Allocate an invisible window used as a stand-in surface.
    fn create_window(&self, config: FbConfig, width: u32, height: u32) -> Option<Drawable>;
    fn destroy_window(&self, drawable: Drawable);

    /// Whether surfaces of this configuration carry left/right buffers.
    fn config_is_stereo(&self, config: FbConfig) -> bool;

    fn swap_buffers(&self, drawable: Drawable);

    /// Present through the vendor path. Returns `false` when the
    /// vendor entry point is not available or nothing was presented.
    fn vendor_swap(&self, drawable: Drawable) -> bool;

    fn clear_color(&self) -> [f32; 4];
    fn set_clear_color(&self, rgba: [f32; 4]);
    /// Clear the color buffers of `drawable` to the current clear color.
    fn clear(&self, drawable: Drawable);

    fn read_buffer(&self) -> BufferId;
    fn set_read_buffer(&self, buffer: BufferId);
    fn draw_buffer(&self) -> BufferId;

    fn pack_alignment(&self) -> u32;
    fn set_pack_alignment(&self, alignment: u32);

    /// Transfer `rect` from the current read buffer of `drawable` into
    /// `dst`, one row every `pitch` bytes.
    fn read_pixels(
        &self,
        drawable: Drawable,
        rect: Rect,
        format: PixelFormat,
        pitch: usize,
        dst: &mut [u8],
    );

    /// Pop the oldest recorded error code.
    fn next_error(&self) -> Option<u32>;
}

// ── WindowingPlatform ────────────────────────────────────────────

/// Attributes of an application window and its visual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowAttributes {
    pub width: u32,
    pub height: u32,
    pub depth: u8,
    /// Direct (non-palette) color visual.
    pub true_color: bool,
    pub visual_id: u32,
    /// The application's own event subscription already includes
    /// structure-change notifications.
    pub structure_events: bool,
}

/// Notification delivered on a structure-event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureEvent {
    /// Window geometry changed.
    Configure {
        window: WindowId,
        width: u32,
        height: u32,
    },
    /// The window was destroyed.
    Destroy { window: WindowId },
}

/// A secondary connection subscribed to one window's structure events.
/// Dropping it closes the connection.
pub trait EventChannel: Send {
    /// Non-blocking poll for the next queued event.
    fn poll(&mut self) -> Option<StructureEvent>;
}

/// Window-system queries needed by a binding.
pub trait WindowingPlatform: Send + Sync {
    fn window_attributes(&self, window: WindowId) -> Result<WindowAttributes>;

    /// Whether the display applies gamma correction in hardware for
    /// its visuals.
    fn has_gamma_corrected_visuals(&self) -> bool;

    fn visual_is_stereo(&self, visual_id: u32) -> bool;

    /// Open a second connection selecting structure events on `window`.
    fn open_event_channel(&self, window: WindowId) -> Result<Box<dyn EventChannel>>;

    /// Flush and wait for the display connection.
    fn sync(&self);
}
