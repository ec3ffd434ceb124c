//! Per-window surface binding state machine.
//!
//! A [`SurfaceBinding`] owns the surface a window currently renders
//! into plus, after a resize, the surface it replaced. The replaced
//! ("retiring") surface is not destroyed until the consumer calls
//! [`cleanup`](SurfaceBinding::cleanup), so in-flight work that still
//! references it stays valid.
//!
//! ```text
//!  Unbound ──bind──► Bound(w,h) ──request_resize──► PendingResize(w,h)
//!                        ▲                                 │
//!                        └────── fetch_drawable_for_update ◄┘
//!
//!  any state ──mark_deleted──► Deleted (terminal)
//! ```
//!
//! Every operation except construction takes the binding's lock.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::config::SurfaceOptions;
use crate::error::{RelayError, Result};
use crate::lock_unpoisoned;
use crate::platform::{
    Drawable, EventChannel, FbConfig, GraphicsPlatform, StructureEvent, WindowId,
    WindowingPlatform,
};
use crate::surface::PixelSurface;

// ── BindingPhase ─────────────────────────────────────────────────

/// Observable state of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingPhase {
    /// No surface has been created yet.
    Unbound,
    /// A surface of this size is current.
    Bound { width: u32, height: u32 },
    /// A resize to this size will happen on the next update fetch.
    PendingResize { width: u32, height: u32 },
    /// The window was destroyed externally.
    Deleted,
}

impl fmt::Display for BindingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbound => write!(f, "Unbound"),
            Self::Bound { width, height } => write!(f, "Bound({width}x{height})"),
            Self::PendingResize { width, height } => write!(f, "PendingResize({width}x{height})"),
            Self::Deleted => write!(f, "Deleted"),
        }
    }
}

/// Result of [`SurfaceBinding::bind_or_resize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// The current surface already had the requested size.
    Unchanged,
    /// A new surface was created.
    Changed,
}

/// Copy of the current surface's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub drawable: Drawable,
    pub width: u32,
    pub height: u32,
    pub stereo: bool,
}

// ── State ────────────────────────────────────────────────────────

#[derive(Default)]
struct BindingState {
    current: Option<PixelSurface>,
    retiring: Option<PixelSurface>,
    pending: Option<(u32, u32)>,
    config: Option<FbConfig>,
    deleted: bool,
    events: Option<Box<dyn EventChannel>>,
    events_opened: bool,
    right_dirty: bool,
    autotest_frames: u64,
    synced: bool,
}

// ── SurfaceBinding ───────────────────────────────────────────────

/// Surface state for one application window.
pub struct SurfaceBinding {
    window: WindowId,
    graphics: Arc<dyn GraphicsPlatform>,
    windowing: Arc<dyn WindowingPlatform>,
    options: SurfaceOptions,
    true_color: bool,
    gamma_corrected_visuals: bool,
    stereo_visual: bool,
    /// The application's own subscription lacks structure events, so
    /// resizes must be observed through a secondary channel.
    needs_event_channel: bool,
    state: Mutex<BindingState>,
}

impl SurfaceBinding {
    /// Create an unbound binding for `window`, recording the window's
    /// visual capabilities.
    pub fn new(
        window: WindowId,
        graphics: Arc<dyn GraphicsPlatform>,
        windowing: Arc<dyn WindowingPlatform>,
        options: SurfaceOptions,
    ) -> Result<Self> {
        if window.0 == 0 {
            return Err(RelayError::InvalidArgument("window id must be non-zero"));
        }
        let attrs = windowing.window_attributes(window)?;
        let true_color = attrs.depth >= 24 && attrs.true_color;
        let gamma_corrected_visuals = windowing.has_gamma_corrected_visuals();
        let stereo_visual = windowing.visual_is_stereo(attrs.visual_id);

        debug!(
            %window,
            true_color,
            stereo_visual,
            structure_events = attrs.structure_events,
            "created surface binding"
        );
        Ok(Self {
            window,
            graphics,
            windowing,
            options,
            true_color,
            gamma_corrected_visuals,
            stereo_visual,
            needs_event_channel: !attrs.structure_events,
            state: Mutex::new(BindingState::default()),
        })
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    /// The window's visual supports direct color.
    pub fn true_color(&self) -> bool {
        self.true_color
    }

    pub fn gamma_corrected_visuals(&self) -> bool {
        self.gamma_corrected_visuals
    }

    /// The window's visual can display quad-buffered stereo.
    pub fn stereo_visual(&self) -> bool {
        self.stereo_visual
    }

    pub(crate) fn graphics(&self) -> &Arc<dyn GraphicsPlatform> {
        &self.graphics
    }

    pub(crate) fn windowing(&self) -> &Arc<dyn WindowingPlatform> {
        &self.windowing
    }

    pub fn phase(&self) -> BindingPhase {
        let st = lock_unpoisoned(&self.state);
        if st.deleted {
            return BindingPhase::Deleted;
        }
        match (&st.current, st.pending) {
            (_, Some((width, height))) => BindingPhase::PendingResize { width, height },
            (Some(s), None) => BindingPhase::Bound {
                width: s.width(),
                height: s.height(),
            },
            (None, None) => BindingPhase::Unbound,
        }
    }

    /// Whether the current surface carries left/right buffers.
    pub fn stereo(&self) -> bool {
        lock_unpoisoned(&self.state)
            .current
            .as_ref()
            .is_some_and(PixelSurface::stereo)
    }

    /// Size of the current surface.
    pub fn size(&self) -> Option<(u32, u32)> {
        lock_unpoisoned(&self.state)
            .current
            .as_ref()
            .map(PixelSurface::size)
    }

    // ── Operations ───────────────────────────────────────────────

    /// Make a `width × height` surface current.
    ///
    /// A surface of the same size is kept as is. Otherwise the previous
    /// surface becomes the retiring one; it is released by
    /// [`cleanup`](Self::cleanup), not here.
    pub fn bind_or_resize(
        &self,
        width: u32,
        height: u32,
        config: Option<FbConfig>,
    ) -> Result<BindOutcome> {
        if config.is_none() || width < 1 || height < 1 {
            return Err(RelayError::InvalidArgument("bind needs a config and a size"));
        }
        let mut st = self.live()?;
        self.bind_locked(&mut st, width, height, config)
    }

    /// Bind at the window's current geometry.
    pub fn init_from_window(&self, config: Option<FbConfig>) -> Result<BindOutcome> {
        self.windowing.sync();
        let attrs = self.windowing.window_attributes(self.window)?;
        self.bind_or_resize(attrs.width, attrs.height, config)
    }

    /// Record a resize to be performed on the next
    /// [`fetch_drawable_for_update`](Self::fetch_drawable_for_update).
    /// A zero dimension keeps the current surface's value for that axis.
    pub fn request_resize(&self, width: u32, height: u32) -> Result<()> {
        let mut st = self.live()?;
        Self::request_resize_locked(&mut st, width, height);
        Ok(())
    }

    /// Current drawable, without resizing.
    pub fn fetch_drawable(&self) -> Result<Drawable> {
        let st = self.live()?;
        Self::current_drawable(&st)
    }

    /// Current drawable after performing any pending resize.
    pub fn fetch_drawable_for_update(&self) -> Result<Drawable> {
        let mut st = self.live()?;
        if let Some((width, height)) = st.pending.take() {
            let config = st.config;
            if let Err(e) = self.bind_locked(&mut st, width, height, config) {
                st.pending = Some((width, height));
                return Err(e);
            }
        }
        Self::current_drawable(&st)
    }

    /// Destroy the retiring surface, if any.
    pub fn cleanup(&self) -> Result<()> {
        let mut st = self.live()?;
        if let Some(old) = st.retiring.take() {
            debug!(window = %self.window, drawable = old.drawable().0, "releasing retired surface");
            old.destroy();
        }
        Ok(())
    }

    /// One-shot clear of the current surface.
    pub fn clear(&self) -> Result<()> {
        let mut st = self.live()?;
        if let Some(s) = st.current.as_mut() {
            s.clear();
        }
        Ok(())
    }

    pub fn swap_buffers(&self) -> Result<()> {
        let st = self.live()?;
        if let Some(s) = st.current.as_ref() {
            s.swap();
        }
        Ok(())
    }

    /// The owning window was destroyed externally. Permanent.
    pub fn mark_deleted(&self) {
        lock_unpoisoned(&self.state).deleted = true;
        debug!(window = %self.window, "binding marked deleted");
    }

    /// A right-eye buffer was rendered since the last readback.
    pub fn mark_right_dirty(&self) {
        lock_unpoisoned(&self.state).right_dirty = true;
    }

    /// Poll the secondary event channel for geometry changes.
    ///
    /// The channel is opened on first use, and only when the window's
    /// own event subscription lacks structure notifications.
    pub fn check_external_resize(&self) -> Result<()> {
        let mut guard = self.live()?;
        if !self.needs_event_channel {
            return Ok(());
        }
        let st = &mut *guard;
        if !st.events_opened {
            st.events_opened = true;
            match self.windowing.open_event_channel(self.window) {
                Ok(channel) => {
                    debug!(window = %self.window, "selecting structure events on secondary channel");
                    st.events = Some(channel);
                }
                Err(e) => warn!(window = %self.window, "could not open event channel: {e}"),
            }
        }

        let mut resize = None;
        if let Some(channel) = st.events.as_mut() {
            while let Some(event) = channel.poll() {
                match event {
                    StructureEvent::Configure {
                        window,
                        width,
                        height,
                    } if window == self.window && width > 0 && height > 0 => {
                        resize = Some((width, height));
                    }
                    StructureEvent::Destroy { window } if window == self.window => {
                        st.deleted = true;
                    }
                    _ => {}
                }
            }
        }

        if st.deleted {
            return Err(RelayError::WindowDeleted);
        }
        if let Some((width, height)) = resize {
            Self::request_resize_locked(st, width, height);
        }
        Ok(())
    }

    /// Take the binding lock for a readback.
    pub(crate) fn lock(&self) -> Result<BindingGuard<'_>> {
        Ok(BindingGuard {
            binding: self,
            state: self.live()?,
        })
    }

    // ── Internal ─────────────────────────────────────────────────

    fn live(&self) -> Result<MutexGuard<'_, BindingState>> {
        let st = lock_unpoisoned(&self.state);
        if st.deleted {
            return Err(RelayError::WindowDeleted);
        }
        Ok(st)
    }

    fn bind_locked(
        &self,
        st: &mut BindingState,
        width: u32,
        height: u32,
        config: Option<FbConfig>,
    ) -> Result<BindOutcome> {
        if st
            .current
            .as_ref()
            .is_some_and(|s| s.size() == (width, height))
        {
            return Ok(BindOutcome::Unchanged);
        }

        let surface = PixelSurface::create(
            Arc::clone(&self.graphics),
            width,
            height,
            config,
            self.options,
        )?;
        st.config = config;
        if let Some(previous) = st.current.replace(surface) {
            if let Some(older) = st.retiring.replace(previous) {
                debug!(
                    window = %self.window,
                    drawable = older.drawable().0,
                    "retiring slot occupied, releasing older surface"
                );
                older.destroy();
            }
        }
        Ok(BindOutcome::Changed)
    }

    fn request_resize_locked(st: &mut BindingState, width: u32, height: u32) {
        let current = st.current.as_ref().map(PixelSurface::size);
        let width = match (width, current) {
            (0, Some((w, _))) => w,
            _ => width,
        };
        let height = match (height, current) {
            (0, Some((_, h))) => h,
            _ => height,
        };

        if current == Some((width, height)) || width == 0 || height == 0 {
            st.pending = None;
            return;
        }
        st.pending = Some((width, height));
    }

    fn current_drawable(st: &BindingState) -> Result<Drawable> {
        st.current
            .as_ref()
            .map(PixelSurface::drawable)
            .ok_or(RelayError::InvalidArgument("window is not bound to a surface"))
    }
}

impl Drop for SurfaceBinding {
    fn drop(&mut self) {
        let mut st = lock_unpoisoned(&self.state);
        if let Some(s) = st.current.take() {
            s.destroy();
        }
        if let Some(s) = st.retiring.take() {
            s.destroy();
        }
        st.events = None;
    }
}

// ── BindingGuard ─────────────────────────────────────────────────

/// Exclusive access to a live binding for the duration of a readback.
pub(crate) struct BindingGuard<'a> {
    binding: &'a SurfaceBinding,
    state: MutexGuard<'a, BindingState>,
}

impl BindingGuard<'_> {
    pub fn binding(&self) -> &SurfaceBinding {
        self.binding
    }

    pub fn surface(&self) -> Option<SurfaceInfo> {
        self.state.current.as_ref().map(|s| SurfaceInfo {
            drawable: s.drawable(),
            width: s.width(),
            height: s.height(),
            stereo: s.stereo(),
        })
    }

    /// Consume the right-dirty flag.
    pub fn take_right_dirty(&mut self) -> bool {
        std::mem::take(&mut self.state.right_dirty)
    }

    pub fn autotest_frames_mut(&mut self) -> &mut u64 {
        &mut self.state.autotest_frames
    }

    /// Synchronise the windowing platform before the first network frame.
    pub fn sync_once(&mut self) {
        if !self.state.synced {
            self.binding.windowing.sync();
            self.state.synced = true;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::WindowAttributes;
    use crate::platform::soft::SoftPlatform;

    const WIN: WindowId = WindowId(0x0060_0001);

    fn setup(structure_events: bool) -> (Arc<SoftPlatform>, FbConfig, SurfaceBinding) {
        let p = Arc::new(SoftPlatform::new());
        let cfg = p.add_config(false);
        p.add_window(
            WIN,
            WindowAttributes {
                width: 640,
                height: 480,
                depth: 24,
                true_color: true,
                visual_id: 0x21,
                structure_events,
            },
        );
        let b = SurfaceBinding::new(WIN, p.clone(), p.clone(), SurfaceOptions::default()).unwrap();
        (p, cfg, b)
    }

    #[test]
    fn bind_reports_requested_size() {
        let (_p, cfg, b) = setup(true);
        assert_eq!(b.phase(), BindingPhase::Unbound);
        assert_eq!(b.bind_or_resize(800, 600, Some(cfg)).unwrap(), BindOutcome::Changed);
        assert_eq!(b.size(), Some((800, 600)));
        assert_eq!(b.phase().to_string(), "Bound(800x600)");
    }

    #[test]
    fn same_size_bind_allocates_nothing() {
        let (p, cfg, b) = setup(true);
        b.bind_or_resize(10, 10, Some(cfg)).unwrap();
        let d = b.fetch_drawable().unwrap();
        assert_eq!(b.bind_or_resize(10, 10, Some(cfg)).unwrap(), BindOutcome::Unchanged);
        assert_eq!(b.fetch_drawable().unwrap(), d);
        assert_eq!(p.live_surfaces(), 1);
    }

    #[test]
    fn bind_validates_arguments() {
        let (_p, cfg, b) = setup(true);
        assert!(matches!(
            b.bind_or_resize(0, 5, Some(cfg)),
            Err(RelayError::InvalidArgument(_))
        ));
        assert!(matches!(
            b.bind_or_resize(5, 5, None),
            Err(RelayError::InvalidArgument(_))
        ));
    }

    #[test]
    fn rebind_retires_instead_of_destroying() {
        let (p, cfg, b) = setup(true);
        b.bind_or_resize(10, 10, Some(cfg)).unwrap();
        let first = b.fetch_drawable().unwrap();
        b.bind_or_resize(20, 20, Some(cfg)).unwrap();
        assert!(p.is_live(first));
        b.cleanup().unwrap();
        assert!(!p.is_live(first));
    }

    #[test]
    fn zero_axis_resize_keeps_current_value() {
        let (_p, cfg, b) = setup(true);
        b.bind_or_resize(300, 200, Some(cfg)).unwrap();
        b.request_resize(0, 400).unwrap();
        assert_eq!(
            b.phase(),
            BindingPhase::PendingResize {
                width: 300,
                height: 400
            }
        );
        b.request_resize(500, 0).unwrap();
        assert_eq!(
            b.phase(),
            BindingPhase::PendingResize {
                width: 500,
                height: 200
            }
        );
    }

    #[test]
    fn resize_to_current_size_cancels_pending() {
        let (p, cfg, b) = setup(true);
        b.bind_or_resize(300, 200, Some(cfg)).unwrap();
        let d = b.fetch_drawable().unwrap();
        b.request_resize(640, 480).unwrap();
        b.request_resize(300, 200).unwrap();
        assert_eq!(
            b.phase(),
            BindingPhase::Bound {
                width: 300,
                height: 200
            }
        );
        assert_eq!(b.fetch_drawable_for_update().unwrap(), d);
        assert_eq!(p.live_surfaces(), 1);
    }

    #[test]
    fn failed_update_keeps_request_pending() {
        let (p, cfg, b) = setup(true);
        b.bind_or_resize(10, 10, Some(cfg)).unwrap();
        b.request_resize(20, 20).unwrap();
        p.fail_next_allocations(1);
        assert!(matches!(
            b.fetch_drawable_for_update(),
            Err(RelayError::AllocationFailure(_))
        ));
        assert!(matches!(b.phase(), BindingPhase::PendingResize { .. }));
        b.fetch_drawable_for_update().unwrap();
        assert_eq!(b.size(), Some((20, 20)));
    }

    #[test]
    fn deleted_binding_rejects_everything() {
        let (_p, cfg, b) = setup(true);
        b.bind_or_resize(10, 10, Some(cfg)).unwrap();
        b.mark_deleted();
        assert_eq!(b.phase(), BindingPhase::Deleted);
        assert!(matches!(b.bind_or_resize(5, 5, Some(cfg)), Err(RelayError::WindowDeleted)));
        assert!(matches!(b.request_resize(5, 5), Err(RelayError::WindowDeleted)));
        assert!(matches!(b.fetch_drawable(), Err(RelayError::WindowDeleted)));
        assert!(matches!(b.fetch_drawable_for_update(), Err(RelayError::WindowDeleted)));
        assert!(matches!(b.cleanup(), Err(RelayError::WindowDeleted)));
        assert!(matches!(b.swap_buffers(), Err(RelayError::WindowDeleted)));
        assert!(matches!(b.clear(), Err(RelayError::WindowDeleted)));
        assert!(b.lock().is_err());
    }

    #[test]
    fn deleted_binding_rejects_resize_polls() {
        for structure_events in [true, false] {
            let (_p, cfg, b) = setup(structure_events);
            b.bind_or_resize(10, 10, Some(cfg)).unwrap();
            b.mark_deleted();
            assert!(matches!(
                b.check_external_resize(),
                Err(RelayError::WindowDeleted)
            ));
        }
    }

    #[test]
    fn external_resize_through_secondary_channel() {
        let (p, cfg, b) = setup(false);
        b.bind_or_resize(640, 480, Some(cfg)).unwrap();
        assert_eq!(p.channels_opened(), 0);

        b.check_external_resize().unwrap();
        assert_eq!(p.channels_opened(), 1);
        p.push_event(
            WIN,
            StructureEvent::Configure {
                window: WIN,
                width: 1024,
                height: 768,
            },
        );
        b.check_external_resize().unwrap();
        assert_eq!(
            b.phase(),
            BindingPhase::PendingResize {
                width: 1024,
                height: 768
            }
        );
        // The channel is opened once only.
        assert_eq!(p.channels_opened(), 1);
    }

    #[test]
    fn no_secondary_channel_when_primary_has_structure_events() {
        let (p, cfg, b) = setup(true);
        b.bind_or_resize(640, 480, Some(cfg)).unwrap();
        b.check_external_resize().unwrap();
        assert_eq!(p.channels_opened(), 0);
    }

    #[test]
    fn destroy_event_deletes_binding() {
        let (p, cfg, b) = setup(false);
        b.bind_or_resize(64, 64, Some(cfg)).unwrap();
        b.check_external_resize().unwrap();
        p.push_event(WIN, StructureEvent::Destroy { window: WIN });
        assert!(matches!(b.check_external_resize(), Err(RelayError::WindowDeleted)));
        assert_eq!(b.phase(), BindingPhase::Deleted);
    }

    #[test]
    fn drop_releases_surfaces_and_channel() {
        let (p, cfg, b) = setup(false);
        b.bind_or_resize(8, 8, Some(cfg)).unwrap();
        b.bind_or_resize(16, 16, Some(cfg)).unwrap();
        b.check_external_resize().unwrap();
        assert_eq!(p.live_surfaces(), 2);
        assert_eq!(p.open_channels(), 1);
        drop(b);
        assert_eq!(p.live_surfaces(), 0);
        assert_eq!(p.open_channels(), 0);
    }

    #[test]
    fn init_from_window_uses_window_geometry() {
        let (p, cfg, b) = setup(true);
        p.resize_window(WIN, 320, 240);
        b.init_from_window(Some(cfg)).unwrap();
        assert_eq!(b.size(), Some((320, 240)));
        assert_eq!(p.sync_count(), 1);
    }
}
