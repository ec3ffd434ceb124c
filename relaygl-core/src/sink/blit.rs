//! Local relay into process memory.
//!
//! The blitter keeps the most recent frame in a slot shared with a
//! [`BlitView`]. Taking the frame from the view is what "displaying"
//! means here: until it happens the blitter reports it is not ready.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::flags::FrameFlags;
use crate::frame::{BufferRequest, FrameBuffer, FrameMeta};
use crate::lock_unpoisoned;
use crate::platform::WindowId;
use crate::sink::FrameSink;

struct BlitSlot {
    latest: Mutex<Option<FrameBuffer>>,
    consumed: AtomicBool,
    delivered: AtomicU64,
}

/// Viewer side of a [`MemoryBlitter`].
#[derive(Clone)]
pub struct BlitView {
    slot: Arc<BlitSlot>,
}

impl BlitView {
    /// Take the last delivered frame, marking it displayed.
    pub fn take_latest(&self) -> Option<FrameBuffer> {
        let frame = lock_unpoisoned(&self.slot.latest).take();
        self.slot.consumed.store(true, Ordering::SeqCst);
        frame
    }

    /// Frames delivered so far.
    pub fn delivered(&self) -> u64 {
        self.slot.delivered.load(Ordering::SeqCst)
    }
}

/// Destination-window stand-in with a fixed pixel layout.
pub struct MemoryBlitter {
    window: WindowId,
    pixel_size: usize,
    flags: FrameFlags,
    slot: Arc<BlitSlot>,
}

impl MemoryBlitter {
    /// A blitter whose frames use `pixel_size` bytes per pixel in the
    /// layout described by `flags`.
    pub fn new(window: WindowId, pixel_size: usize, flags: FrameFlags) -> Self {
        Self {
            window,
            pixel_size,
            flags,
            slot: Arc::new(BlitSlot {
                latest: Mutex::new(None),
                consumed: AtomicBool::new(true),
                delivered: AtomicU64::new(0),
            }),
        }
    }

    pub fn view(&self) -> BlitView {
        BlitView {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl FrameSink for MemoryBlitter {
    fn frame_ready(&self) -> bool {
        self.slot.consumed.load(Ordering::SeqCst)
    }

    fn get_buffer(&mut self, request: &BufferRequest) -> Result<FrameBuffer> {
        let meta = FrameMeta::new(self.window, request.width, request.height);
        Ok(FrameBuffer::new(meta, self.pixel_size, self.flags))
    }

    fn send_frame(&mut self, frame: FrameBuffer) -> Result<()> {
        *lock_unpoisoned(&self.slot.latest) = Some(frame);
        self.slot.consumed.store(false, Ordering::SeqCst);
        self.slot.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
