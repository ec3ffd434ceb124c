//! In-memory reference implementation of both platform traits.
//!
//! Surfaces are plain RGBA8 byte vectors, four per surface
//! (front/back × left/right), stored bottom row first. Surfaces are
//! shared by every binding in the process, while GL-like context state
//! (read buffer, draw buffer, pack alignment, clear color, error queue)
//! is kept per calling thread, the way a GL context is current on one
//! thread at a time.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use crate::error::{RelayError, Result};
use crate::lock_unpoisoned;
use crate::platform::{
    BufferId, Drawable, EventChannel, FbConfig, GraphicsPlatform, PixelFormat, Rect,
    StructureEvent, WindowAttributes, WindowId, WindowingPlatform,
};

/// Recorded when an argument is out of range.
pub const ERROR_INVALID_VALUE: u32 = 0x0501;
/// Recorded when an operation is illegal in the current state.
pub const ERROR_INVALID_OPERATION: u32 = 0x0502;

// ── Surfaces ─────────────────────────────────────────────────────

/// How a soft surface was allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    Pbuffer,
    Window,
}

struct SoftSurface {
    width: u32,
    height: u32,
    stereo: bool,
    kind: SurfaceKind,
    /// Indexed by [`buffer_index`]: front-left, front-right,
    /// back-left, back-right.
    buffers: [Vec<u8>; 4],
    clears: u32,
    swaps: u32,
    vendor_swaps: u32,
}

impl SoftSurface {
    fn new(width: u32, height: u32, stereo: bool, kind: SurfaceKind) -> Self {
        let len = width as usize * height as usize * 4;
        Self {
            width,
            height,
            stereo,
            kind,
            buffers: std::array::from_fn(|_| vec![0u8; len]),
            clears: 0,
            swaps: 0,
            vendor_swaps: 0,
        }
    }

    fn buffer(&self, id: BufferId) -> Option<&Vec<u8>> {
        buffer_index(id, self.stereo).map(|i| &self.buffers[i])
    }

    fn buffer_mut(&mut self, id: BufferId) -> Option<&mut Vec<u8>> {
        buffer_index(id, self.stereo).map(move |i| &mut self.buffers[i])
    }
}

/// Map a selector onto a physical buffer. Right-eye buffers exist only
/// on stereo surfaces.
fn buffer_index(id: BufferId, stereo: bool) -> Option<usize> {
    let index = match id {
        BufferId::Front | BufferId::FrontLeft => 0,
        BufferId::FrontRight => 1,
        BufferId::Back | BufferId::Left | BufferId::BackLeft => 2,
        BufferId::Right | BufferId::BackRight => 3,
    };
    if (index == 1 || index == 3) && !stereo {
        None
    } else {
        Some(index)
    }
}

fn encode_pixel(format: PixelFormat, px: &[u8], out: &mut [u8]) {
    let (r, g, b, a) = (px[0], px[1], px[2], px[3]);
    match format {
        PixelFormat::Rgb => out.copy_from_slice(&[r, g, b]),
        PixelFormat::Bgr => out.copy_from_slice(&[b, g, r]),
        PixelFormat::Rgba => out.copy_from_slice(&[r, g, b, a]),
        PixelFormat::Bgra => out.copy_from_slice(&[b, g, r, a]),
        PixelFormat::Abgr => out.copy_from_slice(&[a, b, g, r]),
        PixelFormat::Argb => out.copy_from_slice(&[a, r, g, b]),
        PixelFormat::Red | PixelFormat::ColorIndex => out[0] = r,
        PixelFormat::Green => out[0] = g,
        PixelFormat::Blue => out[0] = b,
    }
}

// ── State ────────────────────────────────────────────────────────

/// Per-thread context state.
struct ContextState {
    read_buffer: BufferId,
    draw_buffer: BufferId,
    pack_alignment: u32,
    clear_color: [f32; 4],
    errors: VecDeque<u32>,
}

impl Default for ContextState {
    fn default() -> Self {
        Self {
            read_buffer: BufferId::Back,
            draw_buffer: BufferId::Back,
            pack_alignment: 4,
            clear_color: [0.0; 4],
            errors: VecDeque::new(),
        }
    }
}

/// Context of the calling thread, created on first use.
fn current(contexts: &mut HashMap<ThreadId, ContextState>) -> &mut ContextState {
    contexts.entry(thread::current().id()).or_default()
}

struct GraphicsState {
    next_drawable: u64,
    next_config: u32,
    configs: HashMap<FbConfig, bool>,
    surfaces: HashMap<Drawable, SoftSurface>,
    destroyed: Vec<Drawable>,
    contexts: HashMap<ThreadId, ContextState>,
    fail_allocations: u32,
    vendor_present: bool,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            next_drawable: 0x0040_0001,
            next_config: 1,
            configs: HashMap::new(),
            surfaces: HashMap::new(),
            destroyed: Vec::new(),
            contexts: HashMap::new(),
            fail_allocations: 0,
            vendor_present: true,
        }
    }
}

impl GraphicsState {
    fn allocate(
        &mut self,
        config: FbConfig,
        width: u32,
        height: u32,
        kind: SurfaceKind,
    ) -> Option<Drawable> {
        if self.fail_allocations > 0 {
            self.fail_allocations -= 1;
            return None;
        }
        let stereo = *self.configs.get(&config)?;
        let drawable = Drawable(self.next_drawable);
        self.next_drawable += 1;
        self.surfaces
            .insert(drawable, SoftSurface::new(width, height, stereo, kind));
        Some(drawable)
    }

    fn release(&mut self, drawable: Drawable, kind: SurfaceKind) {
        let owned = self
            .surfaces
            .get(&drawable)
            .is_some_and(|s| s.kind == kind);
        if owned {
            self.surfaces.remove(&drawable);
            self.destroyed.push(drawable);
        } else {
            self.context().errors.push_back(ERROR_INVALID_OPERATION);
        }
    }

    fn context(&mut self) -> &mut ContextState {
        current(&mut self.contexts)
    }

    /// Copy `rect` out of the context's read buffer.
    fn transfer(
        &mut self,
        drawable: Drawable,
        rect: Rect,
        format: PixelFormat,
        pitch: usize,
        dst: &mut [u8],
    ) -> std::result::Result<(), u32> {
        let (read_buffer, alignment) = {
            let ctx = self.context();
            (ctx.read_buffer, ctx.pack_alignment as usize)
        };
        let surface = self
            .surfaces
            .get(&drawable)
            .ok_or(ERROR_INVALID_OPERATION)?;
        let src = surface.buffer(read_buffer).ok_or(ERROR_INVALID_OPERATION)?;

        let bpp = format.bytes_per_pixel();
        let row_bytes = rect.width as usize * bpp;
        if rect.x + rect.width > surface.width || rect.y + rect.height > surface.height {
            return Err(ERROR_INVALID_VALUE);
        }
        if pitch < row_bytes || pitch % alignment != 0 {
            return Err(ERROR_INVALID_VALUE);
        }
        if rect.width == 0 || rect.height == 0 {
            return Ok(());
        }
        if (rect.height as usize - 1) * pitch + row_bytes > dst.len() {
            return Err(ERROR_INVALID_VALUE);
        }

        let src_pitch = surface.width as usize * 4;
        for row in 0..rect.height as usize {
            let src_row = (rect.y as usize + row) * src_pitch;
            let dst_row = row * pitch;
            for col in 0..rect.width as usize {
                let s = src_row + (rect.x as usize + col) * 4;
                let d = dst_row + col * bpp;
                encode_pixel(format, &src[s..s + 4], &mut dst[d..d + bpp]);
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct WindowState {
    attributes: HashMap<WindowId, WindowAttributes>,
    queues: HashMap<WindowId, Arc<Mutex<VecDeque<StructureEvent>>>>,
    channels_opened: u32,
    gamma_corrected_visuals: bool,
    stereo_visuals: HashSet<u32>,
    syncs: u32,
}

// ── SoftPlatform ─────────────────────────────────────────────────

/// Software graphics + windowing platform.
#[derive(Default)]
pub struct SoftPlatform {
    graphics: Mutex<GraphicsState>,
    windows: Mutex<WindowState>,
    open_channels: Arc<AtomicU32>,
}

impl SoftPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a framebuffer configuration.
    pub fn add_config(&self, stereo: bool) -> FbConfig {
        let mut g = lock_unpoisoned(&self.graphics);
        let config = FbConfig(g.next_config);
        g.next_config += 1;
        g.configs.insert(config, stereo);
        config
    }

    /// Make the next `count` allocations fail.
    pub fn fail_next_allocations(&self, count: u32) {
        lock_unpoisoned(&self.graphics).fail_allocations = count;
    }

    pub fn set_vendor_present(&self, available: bool) {
        lock_unpoisoned(&self.graphics).vendor_present = available;
    }

    /// Select the calling thread's draw buffer.
    pub fn set_draw_buffer(&self, buffer: BufferId) {
        lock_unpoisoned(&self.graphics).context().draw_buffer = buffer;
    }

    /// Queue an error code as if a platform call had failed.
    pub fn inject_error(&self, code: u32) {
        lock_unpoisoned(&self.graphics).context().errors.push_back(code);
    }

    /// Paint a whole buffer with one RGBA color. Returns `false` if the
    /// surface or buffer does not exist.
    pub fn fill(&self, drawable: Drawable, buffer: BufferId, rgba: [u8; 4]) -> bool {
        let mut g = lock_unpoisoned(&self.graphics);
        let Some(buf) = g
            .surfaces
            .get_mut(&drawable)
            .and_then(|s| s.buffer_mut(buffer))
        else {
            return false;
        };
        for px in buf.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
        true
    }

    /// Paint one pixel (bottom-left origin).
    pub fn set_pixel(
        &self,
        drawable: Drawable,
        buffer: BufferId,
        x: u32,
        y: u32,
        rgba: [u8; 4],
    ) -> bool {
        let mut g = lock_unpoisoned(&self.graphics);
        let Some(surface) = g.surfaces.get_mut(&drawable) else {
            return false;
        };
        if x >= surface.width || y >= surface.height {
            return false;
        }
        let offset = (y as usize * surface.width as usize + x as usize) * 4;
        match surface.buffer_mut(buffer) {
            Some(buf) => {
                buf[offset..offset + 4].copy_from_slice(&rgba);
                true
            }
            None => false,
        }
    }

    pub fn pixel(&self, drawable: Drawable, buffer: BufferId, x: u32, y: u32) -> Option<[u8; 4]> {
        let g = lock_unpoisoned(&self.graphics);
        let surface = g.surfaces.get(&drawable)?;
        if x >= surface.width || y >= surface.height {
            return None;
        }
        let offset = (y as usize * surface.width as usize + x as usize) * 4;
        let buf = surface.buffer(buffer)?;
        let mut out = [0u8; 4];
        out.copy_from_slice(&buf[offset..offset + 4]);
        Some(out)
    }

    pub fn is_live(&self, drawable: Drawable) -> bool {
        lock_unpoisoned(&self.graphics).surfaces.contains_key(&drawable)
    }

    pub fn live_surfaces(&self) -> usize {
        lock_unpoisoned(&self.graphics).surfaces.len()
    }

    /// Drawables released so far, in release order.
    pub fn destroyed(&self) -> Vec<Drawable> {
        lock_unpoisoned(&self.graphics).destroyed.clone()
    }

    pub fn surface_size(&self, drawable: Drawable) -> Option<(u32, u32)> {
        lock_unpoisoned(&self.graphics)
            .surfaces
            .get(&drawable)
            .map(|s| (s.width, s.height))
    }

    pub fn surface_kind(&self, drawable: Drawable) -> Option<SurfaceKind> {
        lock_unpoisoned(&self.graphics)
            .surfaces
            .get(&drawable)
            .map(|s| s.kind)
    }

    pub fn clear_count(&self, drawable: Drawable) -> u32 {
        lock_unpoisoned(&self.graphics)
            .surfaces
            .get(&drawable)
            .map_or(0, |s| s.clears)
    }

    /// `(buffer swaps, vendor presents)` for a drawable.
    pub fn swap_counts(&self, drawable: Drawable) -> (u32, u32) {
        lock_unpoisoned(&self.graphics)
            .surfaces
            .get(&drawable)
            .map_or((0, 0), |s| (s.swaps, s.vendor_swaps))
    }

    // ── Windowing helpers ────────────────────────────────────────

    pub fn add_window(&self, window: WindowId, attributes: WindowAttributes) {
        lock_unpoisoned(&self.windows)
            .attributes
            .insert(window, attributes);
    }

    /// Change the geometry reported by `window_attributes`.
    pub fn resize_window(&self, window: WindowId, width: u32, height: u32) {
        if let Some(attrs) = lock_unpoisoned(&self.windows).attributes.get_mut(&window) {
            attrs.width = width;
            attrs.height = height;
        }
    }

    /// Deliver an event to the window's secondary channel. Returns
    /// `false` when no channel was ever opened for the window.
    pub fn push_event(&self, window: WindowId, event: StructureEvent) -> bool {
        let queue = lock_unpoisoned(&self.windows).queues.get(&window).cloned();
        match queue {
            Some(q) => {
                lock_unpoisoned(&q).push_back(event);
                true
            }
            None => false,
        }
    }

    pub fn set_gamma_corrected_visuals(&self, enabled: bool) {
        lock_unpoisoned(&self.windows).gamma_corrected_visuals = enabled;
    }

    pub fn add_stereo_visual(&self, visual_id: u32) {
        lock_unpoisoned(&self.windows)
            .stereo_visuals
            .insert(visual_id);
    }

    /// Total secondary channels ever opened.
    pub fn channels_opened(&self) -> u32 {
        lock_unpoisoned(&self.windows).channels_opened
    }

    /// Secondary channels currently open.
    pub fn open_channels(&self) -> u32 {
        self.open_channels.load(Ordering::SeqCst)
    }

    pub fn sync_count(&self) -> u32 {
        lock_unpoisoned(&self.windows).syncs
    }
}

impl GraphicsPlatform for SoftPlatform {
    fn create_pbuffer(&self, config: FbConfig, width: u32, height: u32) -> Option<Drawable> {
        lock_unpoisoned(&self.graphics).allocate(config, width, height, SurfaceKind::Pbuffer)
    }

    fn destroy_pbuffer(&self, drawable: Drawable) {
        lock_unpoisoned(&self.graphics).release(drawable, SurfaceKind::Pbuffer);
    }

    fn create_window(&self, config: FbConfig, width: u32, height: u32) -> Option<Drawable> {
        lock_unpoisoned(&self.graphics).allocate(config, width, height, SurfaceKind::Window)
    }

    fn destroy_window(&self, drawable: Drawable) {
        lock_unpoisoned(&self.graphics).release(drawable, SurfaceKind::Window);
    }

    fn config_is_stereo(&self, config: FbConfig) -> bool {
        lock_unpoisoned(&self.graphics)
            .configs
            .get(&config)
            .copied()
            .unwrap_or(false)
    }

    fn swap_buffers(&self, drawable: Drawable) {
        let mut guard = lock_unpoisoned(&self.graphics);
        let g = &mut *guard;
        match g.surfaces.get_mut(&drawable) {
            Some(s) => {
                s.buffers.swap(0, 2);
                s.buffers.swap(1, 3);
                s.swaps += 1;
            }
            None => current(&mut g.contexts).errors.push_back(ERROR_INVALID_OPERATION),
        }
    }

    fn vendor_swap(&self, drawable: Drawable) -> bool {
        let mut guard = lock_unpoisoned(&self.graphics);
        let g = &mut *guard;
        if !g.vendor_present {
            return false;
        }
        match g.surfaces.get_mut(&drawable) {
            Some(s) => {
                s.buffers.swap(0, 2);
                s.buffers.swap(1, 3);
                s.vendor_swaps += 1;
                true
            }
            None => {
                current(&mut g.contexts).errors.push_back(ERROR_INVALID_OPERATION);
                false
            }
        }
    }

    fn clear_color(&self) -> [f32; 4] {
        lock_unpoisoned(&self.graphics).context().clear_color
    }

    fn set_clear_color(&self, rgba: [f32; 4]) {
        lock_unpoisoned(&self.graphics).context().clear_color = rgba;
    }

    fn clear(&self, drawable: Drawable) {
        let mut guard = lock_unpoisoned(&self.graphics);
        let g = &mut *guard;
        let color = current(&mut g.contexts).clear_color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        match g.surfaces.get_mut(&drawable) {
            Some(s) => {
                for buf in s.buffers.iter_mut() {
                    for px in buf.chunks_exact_mut(4) {
                        px.copy_from_slice(&color);
                    }
                }
                s.clears += 1;
            }
            None => current(&mut g.contexts).errors.push_back(ERROR_INVALID_OPERATION),
        }
    }

    fn read_buffer(&self) -> BufferId {
        lock_unpoisoned(&self.graphics).context().read_buffer
    }

    fn set_read_buffer(&self, buffer: BufferId) {
        lock_unpoisoned(&self.graphics).context().read_buffer = buffer;
    }

    fn draw_buffer(&self) -> BufferId {
        lock_unpoisoned(&self.graphics).context().draw_buffer
    }

    fn pack_alignment(&self) -> u32 {
        lock_unpoisoned(&self.graphics).context().pack_alignment
    }

    fn set_pack_alignment(&self, alignment: u32) {
        let mut g = lock_unpoisoned(&self.graphics);
        let ctx = g.context();
        if matches!(alignment, 1 | 2 | 4 | 8) {
            ctx.pack_alignment = alignment;
        } else {
            ctx.errors.push_back(ERROR_INVALID_VALUE);
        }
    }

    fn read_pixels(
        &self,
        drawable: Drawable,
        rect: Rect,
        format: PixelFormat,
        pitch: usize,
        dst: &mut [u8],
    ) {
        let mut g = lock_unpoisoned(&self.graphics);
        if let Err(code) = g.transfer(drawable, rect, format, pitch, dst) {
            g.context().errors.push_back(code);
        }
    }

    fn next_error(&self) -> Option<u32> {
        lock_unpoisoned(&self.graphics).context().errors.pop_front()
    }
}

// ── Event channel ────────────────────────────────────────────────

struct SoftEventChannel {
    queue: Arc<Mutex<VecDeque<StructureEvent>>>,
    open: Arc<AtomicU32>,
}

impl EventChannel for SoftEventChannel {
    fn poll(&mut self) -> Option<StructureEvent> {
        lock_unpoisoned(&self.queue).pop_front()
    }
}

impl Drop for SoftEventChannel {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WindowingPlatform for SoftPlatform {
    fn window_attributes(&self, window: WindowId) -> Result<WindowAttributes> {
        lock_unpoisoned(&self.windows)
            .attributes
            .get(&window)
            .copied()
            .ok_or_else(|| RelayError::Other(format!("unknown window {window}")))
    }

    fn has_gamma_corrected_visuals(&self) -> bool {
        lock_unpoisoned(&self.windows).gamma_corrected_visuals
    }

    fn visual_is_stereo(&self, visual_id: u32) -> bool {
        lock_unpoisoned(&self.windows)
            .stereo_visuals
            .contains(&visual_id)
    }

    fn open_event_channel(&self, window: WindowId) -> Result<Box<dyn EventChannel>> {
        let mut w = lock_unpoisoned(&self.windows);
        if !w.attributes.contains_key(&window) {
            return Err(RelayError::Other(format!(
                "cannot open event channel: unknown window {window}"
            )));
        }
        w.channels_opened += 1;
        let queue = Arc::clone(w.queues.entry(window).or_default());
        self.open_channels.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SoftEventChannel {
            queue,
            open: Arc::clone(&self.open_channels),
        }))
    }

    fn sync(&self) {
        lock_unpoisoned(&self.windows).syncs += 1;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_respects_config_and_failures() {
        let p = SoftPlatform::new();
        let cfg = p.add_config(false);
        let d = p.create_pbuffer(cfg, 4, 2).unwrap();
        assert_eq!(p.surface_size(d), Some((4, 2)));
        assert_eq!(p.surface_kind(d), Some(SurfaceKind::Pbuffer));

        assert!(p.create_pbuffer(FbConfig(999), 4, 2).is_none());

        p.fail_next_allocations(1);
        assert!(p.create_pbuffer(cfg, 4, 2).is_none());
        assert!(p.create_pbuffer(cfg, 4, 2).is_some());
    }

    #[test]
    fn read_pixels_converts_layouts() {
        let p = SoftPlatform::new();
        let cfg = p.add_config(false);
        let d = p.create_pbuffer(cfg, 2, 1).unwrap();
        p.fill(d, BufferId::Back, [10, 20, 30, 40]);

        // A 6-byte row needs an alignment of 2.
        p.set_pack_alignment(2);
        let mut rgb = [0u8; 6];
        p.read_pixels(d, Rect::sized(2, 1), PixelFormat::Rgb, 6, &mut rgb);
        assert_eq!(p.next_error(), None);
        assert_eq!(rgb, [10, 20, 30, 10, 20, 30]);

        let mut bgr = [0u8; 6];
        p.read_pixels(d, Rect::sized(2, 1), PixelFormat::Bgr, 6, &mut bgr);
        assert_eq!(p.next_error(), None);
        assert_eq!(&bgr[..3], &[30, 20, 10]);

        let mut rgba = [0u8; 8];
        p.set_pack_alignment(4);
        p.read_pixels(d, Rect::sized(2, 1), PixelFormat::Rgba, 8, &mut rgba);
        assert_eq!(p.next_error(), None);
        assert_eq!(&rgba[4..], &[10, 20, 30, 40]);

        let mut green = [0u8; 2];
        p.set_pack_alignment(2);
        p.read_pixels(d, Rect::sized(2, 1), PixelFormat::Green, 2, &mut green);
        assert_eq!(p.next_error(), None);
        assert_eq!(green, [20, 20]);
    }

    #[test]
    fn misaligned_pitch_is_an_error() {
        let p = SoftPlatform::new();
        let cfg = p.add_config(false);
        let d = p.create_pbuffer(cfg, 3, 1).unwrap();
        let mut dst = [0u8; 9];
        // Default pack alignment is 4; a 9-byte pitch violates it.
        p.read_pixels(d, Rect::sized(3, 1), PixelFormat::Rgb, 9, &mut dst);
        assert_eq!(p.next_error(), Some(ERROR_INVALID_VALUE));
    }

    #[test]
    fn right_buffer_requires_stereo_surface() {
        let p = SoftPlatform::new();
        let mono = p.add_config(false);
        let d = p.create_pbuffer(mono, 1, 1).unwrap();
        assert!(!p.fill(d, BufferId::BackRight, [1, 2, 3, 4]));

        p.set_read_buffer(BufferId::BackRight);
        let mut dst = [0u8; 4];
        p.read_pixels(d, Rect::sized(1, 1), PixelFormat::Rgba, 4, &mut dst);
        assert_eq!(p.next_error(), Some(ERROR_INVALID_OPERATION));
    }

    #[test]
    fn context_state_is_per_thread() {
        let p = Arc::new(SoftPlatform::new());
        p.set_read_buffer(BufferId::FrontRight);
        p.set_pack_alignment(1);
        p.inject_error(ERROR_INVALID_OPERATION);

        let other = Arc::clone(&p);
        std::thread::spawn(move || {
            assert_eq!(other.read_buffer(), BufferId::Back);
            assert_eq!(other.pack_alignment(), 4);
            assert_eq!(other.next_error(), None);
            other.set_read_buffer(BufferId::BackLeft);
            other.inject_error(ERROR_INVALID_VALUE);
        })
        .join()
        .unwrap();

        assert_eq!(p.read_buffer(), BufferId::FrontRight);
        assert_eq!(p.pack_alignment(), 1);
        assert_eq!(p.next_error(), Some(ERROR_INVALID_OPERATION));
        assert_eq!(p.next_error(), None);
    }

    #[test]
    fn vendor_swap_of_unknown_drawable_fails() {
        let p = SoftPlatform::new();
        let cfg = p.add_config(false);
        let d = p.create_pbuffer(cfg, 1, 1).unwrap();
        assert!(p.vendor_swap(d));
        assert_eq!(p.swap_counts(d), (0, 1));

        assert!(!p.vendor_swap(Drawable(0xdead)));
        assert_eq!(p.next_error(), Some(ERROR_INVALID_OPERATION));

        p.set_vendor_present(false);
        assert!(!p.vendor_swap(d));
        assert_eq!(p.next_error(), None);
    }

    #[test]
    fn events_only_reach_open_channels() {
        let p = SoftPlatform::new();
        let win = WindowId(7);
        p.add_window(
            win,
            WindowAttributes {
                width: 10,
                height: 10,
                depth: 24,
                true_color: true,
                visual_id: 0x21,
                structure_events: false,
            },
        );
        let ev = StructureEvent::Configure {
            window: win,
            width: 20,
            height: 30,
        };
        assert!(!p.push_event(win, ev));

        let mut channel = p.open_event_channel(win).unwrap();
        assert_eq!(p.open_channels(), 1);
        assert!(p.push_event(win, ev));
        assert_eq!(channel.poll(), Some(ev));
        assert_eq!(channel.poll(), None);

        drop(channel);
        assert_eq!(p.open_channels(), 0);
        assert_eq!(p.channels_opened(), 1);
    }
}
