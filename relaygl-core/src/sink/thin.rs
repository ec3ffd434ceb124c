//! Loopback stand-in for the dedicated thin-client channel.
//!
//! The channel itself is an external device protocol. What the router
//! needs from it is a route that may disappear and come back, so the
//! loopback client only tracks that and counts what it delivers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::trace;

use crate::error::{RelayError, Result};
use crate::flags::FrameFlags;
use crate::frame::{BufferRequest, FrameBuffer, FrameMeta};
use crate::platform::WindowId;
use crate::sink::FrameSink;

/// Shared switch for the thin-client route.
#[derive(Debug, Clone)]
pub struct ThinRoute {
    up: Arc<AtomicBool>,
    delivered: Arc<AtomicU64>,
}

impl ThinRoute {
    pub fn new(up: bool) -> Self {
        Self {
            up: Arc::new(AtomicBool::new(up)),
            delivered: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    /// Frames delivered over this route by every client.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_up() {
            Ok(())
        } else {
            Err(RelayError::TransportUnavailable(
                "no route to thin client".into(),
            ))
        }
    }
}

impl Default for ThinRoute {
    fn default() -> Self {
        Self::new(true)
    }
}

pub struct LoopbackThinClient {
    window: WindowId,
    route: ThinRoute,
}

impl LoopbackThinClient {
    /// Open a client on `route`. Fails when the route is down.
    pub fn open(window: WindowId, route: ThinRoute) -> Result<Self> {
        route.check()?;
        Ok(Self { window, route })
    }
}

impl FrameSink for LoopbackThinClient {
    fn frame_ready(&self) -> bool {
        true
    }

    fn get_buffer(&mut self, request: &BufferRequest) -> Result<FrameBuffer> {
        self.route.check()?;
        let meta = FrameMeta::new(self.window, request.width, request.height);
        Ok(FrameBuffer::new(meta, 3, FrameFlags::BOTTOM_UP))
    }

    fn send_frame(&mut self, frame: FrameBuffer) -> Result<()> {
        self.route.check()?;
        trace!(window = %self.window, width = frame.width(), height = frame.height(), "thin-client frame");
        self.route.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
