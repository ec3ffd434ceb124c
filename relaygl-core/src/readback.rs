//! Pixel capture from a bound surface.
//!
//! The [`ReadbackEngine`] owns no surface. It reads whatever drawable
//! the router hands it, leaving the platform's read-buffer selection
//! and pack alignment exactly as it found them.

use std::sync::Arc;

use tracing::{info, warn};

use crate::diagnostics;
use crate::error::{RelayError, Result};
use crate::frame::FrameBuffer;
use crate::gamma::{self, GammaTable};
use crate::platform::{BufferId, Drawable, GraphicsPlatform, PixelFormat, Rect, WindowId};

/// Per-frame knobs taken from the configuration snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadbackSettings {
    pub gamma: f64,
    /// The display corrects gamma in hardware for its visuals.
    pub hw_gamma_visuals: bool,
    pub autotest: bool,
    pub verbose: bool,
}

impl Default for ReadbackSettings {
    fn default() -> Self {
        Self {
            gamma: 1.0,
            hw_gamma_visuals: false,
            autotest: false,
            verbose: false,
        }
    }
}

impl ReadbackSettings {
    /// Whether samples must be rewritten in software.
    pub fn needs_software_gamma(&self) -> bool {
        let hardware = self.hw_gamma_visuals && self.gamma < 0.0;
        !hardware && !gamma::is_identity(self.gamma)
    }
}

/// Source of a pixel transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRegion {
    pub drawable: Drawable,
    pub rect: Rect,
    pub buffer: BufferId,
}

/// Autotest bookkeeping for one window.
pub struct AutotestSlot<'a> {
    pub window: WindowId,
    pub frames: &'a mut u64,
}

// ── ReadbackEngine ───────────────────────────────────────────────

pub struct ReadbackEngine {
    graphics: Arc<dyn GraphicsPlatform>,
    gamma: Option<GammaTable>,
    gamma_announced: bool,
}

impl ReadbackEngine {
    pub fn new(graphics: Arc<dyn GraphicsPlatform>) -> Self {
        Self {
            graphics,
            gamma: None,
            gamma_announced: false,
        }
    }

    /// Transfer `src` into `dst`, one row every `pitch` bytes.
    ///
    /// The read buffer and pack alignment are restored before returning,
    /// on success and on failure alike.
    pub fn capture(
        &self,
        src: ReadRegion,
        format: PixelFormat,
        pitch: usize,
        dst: &mut [u8],
    ) -> Result<()> {
        let g = &*self.graphics;
        let saved_buffer = g.read_buffer();
        let saved_alignment = g.pack_alignment();
        g.set_read_buffer(src.buffer);
        g.set_pack_alignment(pack_alignment_for(pitch));

        // Stale codes belong to somebody else.
        while g.next_error().is_some() {}

        g.read_pixels(src.drawable, src.rect, format, pitch, dst);

        let mut first = None;
        while let Some(code) = g.next_error() {
            first.get_or_insert(code);
        }

        g.set_pack_alignment(saved_alignment);
        g.set_read_buffer(saved_buffer);

        match first {
            Some(code) => {
                warn!(
                    drawable = src.drawable.0,
                    buffer = ?src.buffer,
                    "pixel transfer failed with error {code:#06x}"
                );
                Err(RelayError::PlatformError {
                    code,
                    context: "read pixels",
                })
            }
            None => Ok(()),
        }
    }

    /// Rewrite `bits` through the gamma lookup table, if required.
    pub fn apply_gamma(&mut self, bits: &mut [u8], settings: &ReadbackSettings) {
        if !settings.needs_software_gamma() {
            return;
        }
        if self
            .gamma
            .as_ref()
            .is_none_or(|t| t.factor() != settings.gamma)
        {
            self.gamma = Some(GammaTable::new(settings.gamma));
        }
        if settings.verbose && !self.gamma_announced {
            self.gamma_announced = true;
            info!(
                "using software gamma correction (correction factor={})",
                settings.gamma
            );
        }
        if let Some(table) = &self.gamma {
            table.apply(bits);
        }
    }

    /// Read one frame. A stereo frame takes its left plane from the
    /// left-eye counterpart of `buffer` and its right plane from the
    /// right-eye counterpart.
    pub fn read_frame(
        &mut self,
        drawable: Drawable,
        rect: Rect,
        frame: &mut FrameBuffer,
        buffer: BufferId,
        settings: &ReadbackSettings,
        mut autotest: Option<AutotestSlot<'_>>,
    ) -> Result<()> {
        let format = frame.transfer_format()?;
        let pitch = frame.pitch();
        let ps = frame.pixel_size();
        let stereo = frame.is_stereo();

        let left = if stereo { buffer.left_eye() } else { buffer };
        let region = ReadRegion {
            drawable,
            rect,
            buffer: left,
        };
        self.capture(region, format, pitch, frame.bits_mut())?;
        self.apply_gamma(frame.bits_mut(), settings);
        if let (true, Some(slot)) = (settings.autotest, autotest.as_mut()) {
            self.autotest_sample(region, frame.bits(), pitch, ps, slot);
        }

        if stereo {
            let region = ReadRegion {
                buffer: buffer.right_eye(),
                ..region
            };
            let mut right = vec![0u8; frame.bits().len()];
            self.capture(region, format, pitch, &mut right)?;
            self.apply_gamma(&mut right, settings);
            if let (true, Some(slot)) = (settings.autotest, autotest.as_mut()) {
                self.autotest_sample(region, &right, pitch, ps, slot);
            }
            if let Some(dst) = frame.right_bits_mut() {
                dst.copy_from_slice(&right);
            }
        }
        Ok(())
    }

    /// Compose a red/cyan anaglyph into `frame`: red from the left eye,
    /// green and blue from the right eye.
    pub fn synthesize_anaglyph(
        &mut self,
        drawable: Drawable,
        rect: Rect,
        frame: &mut FrameBuffer,
        buffer: BufferId,
        settings: &ReadbackSettings,
        autotest: Option<AutotestSlot<'_>>,
    ) -> Result<()> {
        let mut red = frame.plane();
        let mut green = frame.plane();
        let mut blue = frame.plane();

        for (plane, eye, format) in [
            (&mut red, buffer.left_eye(), PixelFormat::Red),
            (&mut green, buffer.right_eye(), PixelFormat::Green),
            (&mut blue, buffer.right_eye(), PixelFormat::Blue),
        ] {
            let region = ReadRegion {
                drawable,
                rect,
                buffer: eye,
            };
            let pitch = plane.pitch();
            self.capture(region, format, pitch, plane.bits_mut())?;
            self.apply_gamma(plane.bits_mut(), settings);
        }
        frame.composite_anaglyph(&red, &green, &blue)?;

        if let (true, Some(mut slot)) = (settings.autotest, autotest) {
            let region = ReadRegion {
                drawable,
                rect,
                buffer: buffer.left_eye(),
            };
            let (pitch, ps) = (frame.pitch(), frame.pixel_size());
            self.autotest_sample(region, frame.bits(), pitch, ps, &mut slot);
        }
        Ok(())
    }

    /// Publish the solid color of a captured region, or `-1` when the
    /// region is not uniform, plus the window's frame counter.
    pub fn autotest_sample(
        &self,
        src: ReadRegion,
        bits: &[u8],
        pitch: usize,
        pixel_size: usize,
        slot: &mut AutotestSlot<'_>,
    ) {
        let right = src.buffer.is_right();
        if !right {
            *slot.frames += 1;
        }

        let mut color = -1i64;
        if is_uniform(bits, src.rect.width, src.rect.height, pitch, pixel_size) {
            let mut rgb = [0u8; 3];
            let corner = ReadRegion {
                rect: Rect::sized(1, 1),
                ..src
            };
            if self.capture(corner, PixelFormat::Rgb, 3, &mut rgb).is_ok() {
                color = i64::from(rgb[0]) | i64::from(rgb[1]) << 8 | i64::from(rgb[2]) << 16;
            }
        }

        let key = if right {
            diagnostics::right_color_key(slot.window)
        } else {
            diagnostics::color_key(slot.window)
        };
        diagnostics::publish(key, color);
        diagnostics::publish(diagnostics::frame_key(slot.window), *slot.frames as i64);
    }
}

/// Largest of 8, 4, 2, 1 dividing `pitch`.
fn pack_alignment_for(pitch: usize) -> u32 {
    match pitch {
        p if p % 8 == 0 => 8,
        p if p % 4 == 0 => 4,
        p if p % 2 == 0 => 2,
        _ => 1,
    }
}

fn is_uniform(bits: &[u8], width: u32, height: u32, pitch: usize, ps: usize) -> bool {
    if width == 0 || height == 0 || bits.len() < ps {
        return false;
    }
    let first = &bits[..ps];
    let row_bytes = width as usize * ps;
    (0..height as usize).all(|y| {
        bits.get(y * pitch..y * pitch + row_bytes)
            .is_some_and(|row| row.chunks_exact(ps).all(|px| px == first))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::FrameFlags;
    use crate::frame::FrameMeta;
    use crate::platform::soft::{ERROR_INVALID_VALUE, SoftPlatform};
    use crate::platform::FbConfig;

    fn stereo_surface(w: u32, h: u32) -> (Arc<SoftPlatform>, Drawable) {
        let p = Arc::new(SoftPlatform::new());
        let cfg: FbConfig = p.add_config(true);
        let d = p.create_pbuffer(cfg, w, h).unwrap();
        (p, d)
    }

    fn frame(w: u32, h: u32, ps: usize, flags: FrameFlags) -> FrameBuffer {
        FrameBuffer::new(FrameMeta::new(WindowId(7), w, h), ps, flags)
    }

    #[test]
    fn alignment_follows_pitch() {
        assert_eq!(pack_alignment_for(16), 8);
        assert_eq!(pack_alignment_for(12), 4);
        assert_eq!(pack_alignment_for(6), 2);
        assert_eq!(pack_alignment_for(9), 1);
    }

    #[test]
    fn capture_restores_platform_state() {
        let (p, d) = stereo_surface(3, 2);
        p.fill(d, BufferId::BackRight, [1, 2, 3, 255]);
        p.set_read_buffer(BufferId::Front);
        p.set_pack_alignment(2);

        let engine = ReadbackEngine::new(p.clone());
        let mut dst = vec![0u8; 9 * 2];
        let region = ReadRegion {
            drawable: d,
            rect: Rect::sized(3, 2),
            buffer: BufferId::BackRight,
        };
        engine.capture(region, PixelFormat::Rgb, 9, &mut dst).unwrap();

        assert_eq!(&dst[..3], &[1, 2, 3]);
        assert_eq!(p.read_buffer(), BufferId::Front);
        assert_eq!(p.pack_alignment(), 2);
    }

    #[test]
    fn platform_errors_surface_and_state_is_restored() {
        let (p, d) = stereo_surface(2, 2);
        p.inject_error(0x0505);
        let engine = ReadbackEngine::new(p.clone());
        let mut dst = vec![0u8; 4];
        let region = ReadRegion {
            drawable: d,
            rect: Rect::sized(4, 4),
            buffer: BufferId::Back,
        };
        let err = engine
            .capture(region, PixelFormat::Rgba, 16, &mut dst)
            .unwrap_err();
        // The injected stale code is drained, the real one reported.
        assert!(matches!(
            err,
            RelayError::PlatformError {
                code: ERROR_INVALID_VALUE,
                ..
            }
        ));
        assert!(err.is_degradable());
        assert_eq!(p.read_buffer(), BufferId::Back);
        assert_eq!(p.next_error(), None);
    }

    #[test]
    fn gamma_skipped_for_identity_and_hardware() {
        let mut engine = ReadbackEngine::new(Arc::new(SoftPlatform::new()));
        let mut bits = vec![100u8; 5];

        engine.apply_gamma(&mut bits, &ReadbackSettings::default());
        assert_eq!(bits, vec![100; 5]);

        let hw = ReadbackSettings {
            gamma: -2.2,
            hw_gamma_visuals: true,
            ..ReadbackSettings::default()
        };
        engine.apply_gamma(&mut bits, &hw);
        assert_eq!(bits, vec![100; 5]);

        let sw = ReadbackSettings {
            gamma: -2.2,
            ..ReadbackSettings::default()
        };
        engine.apply_gamma(&mut bits, &sw);
        let expected = GammaTable::new(2.2).lookup(100);
        assert_eq!(bits, vec![expected; 5]);
    }

    #[test]
    fn stereo_frame_reads_both_eyes() {
        let (p, d) = stereo_surface(2, 2);
        p.fill(d, BufferId::BackLeft, [10, 20, 30, 0]);
        p.fill(d, BufferId::BackRight, [40, 50, 60, 0]);

        let mut engine = ReadbackEngine::new(p.clone());
        let mut f = frame(2, 2, 3, FrameFlags::empty()).with_right_eye();
        engine
            .read_frame(d, Rect::sized(2, 2), &mut f, BufferId::Back, &ReadbackSettings::default(), None)
            .unwrap();
        assert_eq!(f.pixel(0, 0), &[10, 20, 30]);
        assert_eq!(&f.right_bits().unwrap()[..3], &[40, 50, 60]);
    }

    #[test]
    fn anaglyph_red_plus_cyan_is_white() {
        let (p, d) = stereo_surface(4, 4);
        p.fill(d, BufferId::BackLeft, [255, 0, 0, 255]);
        p.fill(d, BufferId::BackRight, [0, 255, 255, 255]);

        let mut engine = ReadbackEngine::new(p.clone());
        let mut f = frame(4, 4, 3, FrameFlags::BGR);
        engine
            .synthesize_anaglyph(d, Rect::sized(4, 4), &mut f, BufferId::Back, &ReadbackSettings::default(), None)
            .unwrap();
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(f.pixel(x, y), &[255, 255, 255]);
            }
        }
    }

    #[test]
    fn anaglyph_channel_sources() {
        let (p, d) = stereo_surface(1, 1);
        p.fill(d, BufferId::BackLeft, [11, 22, 33, 0]);
        p.fill(d, BufferId::BackRight, [44, 55, 66, 0]);

        let mut engine = ReadbackEngine::new(p.clone());
        let mut f = frame(1, 1, 4, FrameFlags::empty());
        engine
            .synthesize_anaglyph(d, Rect::sized(1, 1), &mut f, BufferId::Back, &ReadbackSettings::default(), None)
            .unwrap();
        assert_eq!(&f.pixel(0, 0)[..3], &[11, 55, 66]);
    }

    #[test]
    fn autotest_publishes_color_and_counter() {
        let (p, d) = stereo_surface(3, 3);
        p.fill(d, BufferId::BackLeft, [0x10, 0x20, 0x30, 0xff]);
        p.fill(d, BufferId::BackRight, [1, 2, 3, 0xff]);
        p.set_pixel(d, BufferId::BackRight, 2, 2, [9, 9, 9, 9]);

        let window = WindowId(0x00ab_cd01);
        let settings = ReadbackSettings {
            autotest: true,
            ..ReadbackSettings::default()
        };
        let mut engine = ReadbackEngine::new(p.clone());
        let mut frames = 0u64;
        let mut f = frame(3, 3, 3, FrameFlags::empty()).with_right_eye();
        let slot = AutotestSlot {
            window,
            frames: &mut frames,
        };
        engine
            .read_frame(d, Rect::sized(3, 3), &mut f, BufferId::Back, &settings, Some(slot))
            .unwrap();

        assert_eq!(frames, 1);
        assert_eq!(diagnostics::lookup(&diagnostics::color_key(window)), Some(0x302010));
        assert_eq!(diagnostics::lookup(&diagnostics::right_color_key(window)), Some(-1));
        assert_eq!(diagnostics::lookup(&diagnostics::frame_key(window)), Some(1));
    }
}
