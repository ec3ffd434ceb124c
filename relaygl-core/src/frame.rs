//! Frame buffers handed out by sinks and filled by readback.
//!
//! A [`FrameBuffer`] is owned storage plus geometry, layout flags and
//! per-frame metadata. Sinks allocate them (so they can pick the pixel
//! layout their destination wants), the readback engine fills them,
//! and the sink takes them back on send.

use serde::{Deserialize, Serialize};

use crate::config::CompressMode;
use crate::error::{RelayError, Result};
use crate::flags::FrameFlags;
use crate::platform::{PixelFormat, WindowId};

/// Row padding used when a sink does not ask for a specific pitch.
const ROW_ALIGN: usize = 4;

// ── FrameMeta ────────────────────────────────────────────────────

/// Per-frame metadata travelling with the pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMeta {
    pub window: WindowId,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub subsamp: u8,
    pub compress: CompressMode,
    /// The destination should finish presenting before returning.
    pub sync: bool,
}

impl FrameMeta {
    pub fn new(window: WindowId, width: u32, height: u32) -> Self {
        Self {
            window,
            x: 0,
            y: 0,
            width,
            height,
            quality: 0,
            subsamp: 0,
            compress: CompressMode::Proxy,
            sync: false,
        }
    }
}

// ── BufferRequest ────────────────────────────────────────────────

/// What the router asks a sink for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRequest {
    pub window: WindowId,
    pub width: u32,
    pub height: u32,
    /// Preferred bytes per pixel; sinks with a fixed layout ignore it.
    pub pixel_size: usize,
    /// Preferred layout; sinks with a fixed layout ignore it.
    pub flags: FrameFlags,
    /// Allocate a right-eye plane for quad-buffered stereo.
    pub stereo: bool,
    /// The router is running with the spoil policy enabled.
    pub spoil: bool,
}

// ── FrameBuffer ──────────────────────────────────────────────────

/// Writable pixel storage for one frame.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    pub meta: FrameMeta,
    width: u32,
    height: u32,
    pitch: usize,
    pixel_size: usize,
    flags: FrameFlags,
    bits: Vec<u8>,
    right_bits: Option<Vec<u8>>,
}

impl FrameBuffer {
    /// Allocate a zeroed buffer with rows padded to 4 bytes.
    pub fn new(meta: FrameMeta, pixel_size: usize, flags: FrameFlags) -> Self {
        let pitch = (meta.width as usize * pixel_size).div_ceil(ROW_ALIGN) * ROW_ALIGN;
        Self::with_pitch(meta, pixel_size, flags, pitch)
    }

    /// Allocate a zeroed buffer with an explicit row pitch.
    pub fn with_pitch(meta: FrameMeta, pixel_size: usize, flags: FrameFlags, pitch: usize) -> Self {
        let pitch = pitch.max(meta.width as usize * pixel_size);
        Self {
            width: meta.width,
            height: meta.height,
            pitch,
            pixel_size,
            flags,
            bits: vec![0u8; pitch * meta.height as usize],
            right_bits: None,
            meta,
        }
    }

    /// Add a right-eye plane of the same geometry.
    pub fn with_right_eye(mut self) -> Self {
        self.right_bits = Some(vec![0u8; self.bits.len()]);
        self
    }

    /// A single-channel plane matching this frame's geometry and flags.
    pub fn plane(&self) -> FrameBuffer {
        FrameBuffer::with_pitch(self.meta, 1, self.flags, self.width as usize)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row pitch in bytes.
    pub fn pitch(&self) -> usize {
        self.pitch
    }

    pub fn pixel_size(&self) -> usize {
        self.pixel_size
    }

    pub fn flags(&self) -> FrameFlags {
        self.flags
    }

    pub fn insert_flags(&mut self, flags: FrameFlags) {
        self.flags |= flags;
    }

    pub fn is_stereo(&self) -> bool {
        self.right_bits.is_some()
    }

    pub fn bits(&self) -> &[u8] {
        &self.bits
    }

    pub fn bits_mut(&mut self) -> &mut [u8] {
        &mut self.bits
    }

    pub fn right_bits(&self) -> Option<&[u8]> {
        self.right_bits.as_deref()
    }

    pub fn right_bits_mut(&mut self) -> Option<&mut [u8]> {
        self.right_bits.as_deref_mut()
    }

    /// Split into the pixel planes, consuming the frame.
    pub fn into_parts(self) -> (FrameMeta, Vec<u8>, Option<Vec<u8>>) {
        (self.meta, self.bits, self.right_bits)
    }

    /// Bytes of the pixel at `(x, y)` in storage order.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let offset = y as usize * self.pitch + x as usize * self.pixel_size;
        &self.bits[offset..offset + self.pixel_size]
    }

    /// Transfer format matching this frame's pixel layout.
    pub fn transfer_format(&self) -> Result<PixelFormat> {
        let bgr = self.flags.contains(FrameFlags::BGR);
        let alpha_first = self.flags.contains(FrameFlags::ALPHA_FIRST);
        match self.pixel_size {
            1 => Ok(PixelFormat::ColorIndex),
            3 if bgr => Ok(PixelFormat::Bgr),
            3 => Ok(PixelFormat::Rgb),
            4 => Ok(match (bgr, alpha_first) {
                (true, false) => PixelFormat::Bgra,
                (true, true) => PixelFormat::Abgr,
                (false, true) => PixelFormat::Argb,
                (false, false) => PixelFormat::Rgba,
            }),
            pixel_size => Err(RelayError::UnsupportedFormat { pixel_size }),
        }
    }

    /// Merge three single-channel planes into this frame's red, green
    /// and blue channels.
    pub fn composite_anaglyph(
        &mut self,
        red: &FrameBuffer,
        green: &FrameBuffer,
        blue: &FrameBuffer,
    ) -> Result<()> {
        if self.pixel_size < 3 {
            return Err(RelayError::UnsupportedFormat {
                pixel_size: self.pixel_size,
            });
        }
        for plane in [red, green, blue] {
            if plane.pixel_size != 1 || plane.width < self.width || plane.height < self.height {
                return Err(RelayError::InvalidArgument(
                    "anaglyph plane does not match frame geometry",
                ));
            }
        }

        let (ro, go, bo) = self.flags.channel_offsets(self.pixel_size);
        let ps = self.pixel_size;
        for y in 0..self.height as usize {
            let row = &mut self.bits[y * self.pitch..];
            let r_row = &red.bits[y * red.pitch..];
            let g_row = &green.bits[y * green.pitch..];
            let b_row = &blue.bits[y * blue.pitch..];
            for x in 0..self.width as usize {
                let px = &mut row[x * ps..x * ps + ps];
                px[ro] = r_row[x];
                px[go] = g_row[x];
                px[bo] = b_row[x];
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(w: u32, h: u32) -> FrameMeta {
        FrameMeta::new(WindowId(1), w, h)
    }

    #[test]
    fn rows_are_padded() {
        let f = FrameBuffer::new(meta(5, 2), 3, FrameFlags::empty());
        assert_eq!(f.pitch(), 16);
        assert_eq!(f.bits().len(), 32);

        let plane = f.plane();
        assert_eq!(plane.pitch(), 5);
        assert_eq!(plane.pixel_size(), 1);
    }

    #[test]
    fn transfer_formats() {
        let fmt = |ps, flags| FrameBuffer::new(meta(1, 1), ps, flags).transfer_format();
        assert_eq!(fmt(3, FrameFlags::BGR).unwrap(), PixelFormat::Bgr);
        assert_eq!(fmt(3, FrameFlags::empty()).unwrap(), PixelFormat::Rgb);
        assert_eq!(fmt(4, FrameFlags::BGR).unwrap(), PixelFormat::Bgra);
        assert_eq!(
            fmt(4, FrameFlags::BGR | FrameFlags::ALPHA_FIRST).unwrap(),
            PixelFormat::Abgr
        );
        assert_eq!(fmt(4, FrameFlags::ALPHA_FIRST).unwrap(), PixelFormat::Argb);
        assert_eq!(fmt(1, FrameFlags::empty()).unwrap(), PixelFormat::ColorIndex);
        assert!(matches!(
            fmt(2, FrameFlags::empty()),
            Err(RelayError::UnsupportedFormat { pixel_size: 2 })
        ));
    }

    #[test]
    fn anaglyph_merges_channels() {
        let mut f = FrameBuffer::new(meta(2, 2), 4, FrameFlags::BGR);
        let mut r = f.plane();
        let mut g = f.plane();
        let mut b = f.plane();
        r.bits_mut().fill(200);
        g.bits_mut().fill(100);
        b.bits_mut().fill(50);

        f.composite_anaglyph(&r, &g, &b).unwrap();
        assert_eq!(f.pixel(1, 1), &[50, 100, 200, 0]);
    }

    #[test]
    fn anaglyph_rejects_index_frames() {
        let mut f = FrameBuffer::new(meta(2, 2), 1, FrameFlags::empty());
        let p = f.plane();
        assert!(f.composite_anaglyph(&p, &p, &p).is_err());
    }
}
