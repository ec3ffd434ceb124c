//! Off-screen pixel surfaces.
//!
//! A [`PixelSurface`] owns exactly one platform drawable. Its
//! dimensions never change: a resize always produces a new surface.

use std::sync::Arc;

use tracing::debug;

use crate::config::{PresentPath, SurfaceOptions};
use crate::error::{RelayError, Result};
use crate::platform::{Drawable, FbConfig, GraphicsPlatform};

/// Off-screen renderable buffer bound to one framebuffer configuration.
pub struct PixelSurface {
    platform: Arc<dyn GraphicsPlatform>,
    options: SurfaceOptions,
    width: u32,
    height: u32,
    /// `None` once the platform resource has been released.
    drawable: Option<Drawable>,
    drawable_id: Drawable,
    stereo: bool,
    cleared: bool,
}

impl PixelSurface {
    /// Allocate a `width × height` surface for `config`.
    pub fn create(
        platform: Arc<dyn GraphicsPlatform>,
        width: u32,
        height: u32,
        config: Option<FbConfig>,
        options: SurfaceOptions,
    ) -> Result<Self> {
        let config = match config {
            Some(c) if width >= 1 && height >= 1 => c,
            _ => return Err(RelayError::InvalidArgument("surface needs a config and a size")),
        };

        let drawable = if options.use_window {
            platform.create_window(config, width, height)
        } else {
            platform.create_pbuffer(config, width, height)
        }
        .ok_or_else(|| {
            RelayError::AllocationFailure(format!("could not create {width}x{height} surface"))
        })?;
        let stereo = platform.config_is_stereo(config);

        debug!(
            drawable = drawable.0,
            width, height, stereo, "created pixel surface"
        );
        Ok(Self {
            platform,
            options,
            width,
            height,
            drawable: Some(drawable),
            drawable_id: drawable,
            stereo,
            cleared: false,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn drawable(&self) -> Drawable {
        self.drawable_id
    }

    /// The surface carries left and right buffers.
    pub fn stereo(&self) -> bool {
        self.stereo
    }

    /// Clear to transparent black, once per surface lifetime. The
    /// platform clear color is restored afterwards.
    pub fn clear(&mut self) {
        if self.cleared {
            return;
        }
        self.cleared = true;
        let saved = self.platform.clear_color();
        self.platform.set_clear_color([0.0; 4]);
        self.platform.clear(self.drawable_id);
        self.platform.set_clear_color(saved);
    }

    /// Present through the configured path.
    pub fn swap(&self) {
        match self.options.present {
            PresentPath::Swap => self.platform.swap_buffers(self.drawable_id),
            PresentPath::Vendor => {
                if !self.platform.vendor_swap(self.drawable_id) {
                    debug!(drawable = self.drawable_id.0, "vendor present unavailable");
                }
            }
        }
    }

    /// Release the platform resource.
    pub fn destroy(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(drawable) = self.drawable.take() {
            if self.options.use_window {
                self.platform.destroy_window(drawable);
            } else {
                self.platform.destroy_pbuffer(drawable);
            }
            debug!(drawable = drawable.0, "destroyed pixel surface");
        }
    }
}

impl Drop for PixelSurface {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for PixelSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelSurface")
            .field("drawable", &self.drawable_id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stereo", &self.stereo)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::BufferId;
    use crate::platform::soft::{SoftPlatform, SurfaceKind};

    fn soft() -> (Arc<SoftPlatform>, FbConfig) {
        let p = Arc::new(SoftPlatform::new());
        let cfg = p.add_config(false);
        (p, cfg)
    }

    #[test]
    fn rejects_bad_arguments() {
        let (p, cfg) = soft();
        let opts = SurfaceOptions::default();
        for (w, h, c) in [(0, 10, Some(cfg)), (10, 0, Some(cfg)), (10, 10, None)] {
            let err = PixelSurface::create(p.clone(), w, h, c, opts).unwrap_err();
            assert!(matches!(err, RelayError::InvalidArgument(_)));
        }
        assert_eq!(p.live_surfaces(), 0);
    }

    #[test]
    fn allocation_failure_propagates() {
        let (p, cfg) = soft();
        p.fail_next_allocations(1);
        let err = PixelSurface::create(p, 8, 8, Some(cfg), SurfaceOptions::default()).unwrap_err();
        assert!(matches!(err, RelayError::AllocationFailure(_)));
    }

    #[test]
    fn window_stand_in_and_stereo_detection() {
        let p = Arc::new(SoftPlatform::new());
        let stereo = p.add_config(true);
        let opts = SurfaceOptions {
            use_window: true,
            ..SurfaceOptions::default()
        };
        let s = PixelSurface::create(p.clone(), 3, 2, Some(stereo), opts).unwrap();
        assert!(s.stereo());
        assert_eq!(p.surface_kind(s.drawable()), Some(SurfaceKind::Window));

        let d = s.drawable();
        drop(s);
        assert!(!p.is_live(d));
        assert_eq!(p.destroyed(), vec![d]);
    }

    #[test]
    fn clear_runs_once_and_restores_state() {
        let (p, cfg) = soft();
        let mut s = PixelSurface::create(p.clone(), 2, 2, Some(cfg), SurfaceOptions::default()).unwrap();
        p.fill(s.drawable(), BufferId::Back, [9, 9, 9, 9]);
        p.set_clear_color([1.0, 0.5, 0.25, 1.0]);

        s.clear();
        assert_eq!(p.pixel(s.drawable(), BufferId::Back, 1, 1), Some([0, 0, 0, 0]));
        assert_eq!(p.clear_color(), [1.0, 0.5, 0.25, 1.0]);

        p.fill(s.drawable(), BufferId::Back, [9, 9, 9, 9]);
        s.clear();
        assert_eq!(p.clear_count(s.drawable()), 1);
        assert_eq!(p.pixel(s.drawable(), BufferId::Back, 1, 1), Some([9, 9, 9, 9]));
    }

    #[test]
    fn swap_uses_configured_path() {
        let (p, cfg) = soft();
        let s = PixelSurface::create(p.clone(), 2, 2, Some(cfg), SurfaceOptions::default()).unwrap();
        s.swap();
        assert_eq!(p.swap_counts(s.drawable()), (1, 0));

        let vendor = SurfaceOptions {
            present: PresentPath::Vendor,
            ..SurfaceOptions::default()
        };
        let v = PixelSurface::create(p.clone(), 2, 2, Some(cfg), vendor).unwrap();
        v.swap();
        assert_eq!(p.swap_counts(v.drawable()), (0, 1));
    }

    #[test]
    fn destroy_releases_exactly_once() {
        let (p, cfg) = soft();
        let s = PixelSurface::create(p.clone(), 2, 2, Some(cfg), SurfaceOptions::default()).unwrap();
        let d = s.drawable();
        s.destroy();
        assert_eq!(p.destroyed(), vec![d]);
        assert_eq!(p.next_error(), None);
    }
}
