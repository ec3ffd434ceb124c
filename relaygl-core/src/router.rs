//! Per-frame pipeline selection.
//!
//! A [`TransportRouter`] belongs to one window. On every
//! [`readback`](TransportRouter::readback) it snapshots the
//! configuration, negotiates stereo, picks exactly one delivery
//! pipeline, captures the frame into a buffer from that pipeline's sink
//! and sends it. The whole frame runs under the binding's lock.
//!
//! ```text
//!   compress ──► Proxy ────────► local relay
//!            ├─► Jpeg / Rgb ───► network (+ movie record when shared)
//!            └─► Thin* ────────► thin client ──(no route)──► local relay
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::binding::{BindingGuard, SurfaceBinding, SurfaceInfo};
use crate::config::{CompressMode, ConfigReader, Pipeline, RelayConfig, StereoMode};
use crate::error::{RelayError, Result};
use crate::flags::FrameFlags;
use crate::frame::{BufferRequest, FrameBuffer, FrameMeta};
use crate::notice::NoticeLatches;
use crate::platform::{BufferId, Rect, WindowId};
use crate::readback::{AutotestSlot, ReadbackEngine, ReadbackSettings};
use crate::sink::{FrameSink, SinkFactory};

// ── Request / outcome ────────────────────────────────────────────

/// Parameters of one readback call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadbackRequest {
    /// Buffer the application rendered into.
    pub draw_buffer: BufferId,
    /// Apply the spoil policy to this frame.
    pub spoil_last: bool,
    /// The caller waits for presentation; forces the local relay.
    pub sync: bool,
}

impl Default for ReadbackRequest {
    fn default() -> Self {
        Self {
            draw_buffer: BufferId::Back,
            spoil_last: true,
            sync: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Readback is switched off in the configuration.
    Disabled,
    /// The binding has no surface yet.
    Unbound,
    /// A platform call failed; the frame was dropped.
    Degraded,
}

/// What happened to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Sent(Pipeline),
    /// The destination had not consumed the previous frame.
    Spoiled,
    /// The thin-client channel was down; the local relay delivered it.
    FellBack,
    Skipped(SkipReason),
}

// ── Frame plan ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StereoPlan {
    /// Read a single buffer.
    Mono(BufferId),
    /// Left and right planes.
    Quad,
    Anaglyph,
}

/// Everything needed to fill one sink buffer.
#[derive(Debug, Clone, Copy)]
struct Shot {
    window: WindowId,
    surface: SurfaceInfo,
    draw_buffer: BufferId,
    plan: StereoPlan,
    pixel_size: usize,
    flags: FrameFlags,
    compress: CompressMode,
    quality: u8,
    subsamp: u8,
    sync: bool,
    /// Drop the frame when the sink is not ready.
    check_ready: bool,
    spoil: bool,
}

// ── TransportRouter ──────────────────────────────────────────────

pub struct TransportRouter {
    binding: Arc<SurfaceBinding>,
    factory: Arc<dyn SinkFactory>,
    config: ConfigReader,
    notices: Arc<NoticeLatches>,
    engine: ReadbackEngine,
    local: Option<Box<dyn FrameSink>>,
    network: Option<Box<dyn FrameSink>>,
    movie: Option<Box<dyn FrameSink>>,
    thin: Option<Box<dyn FrameSink>>,
    /// Quad-buffered stereo could not be delivered once; every later
    /// quad request is served as an anaglyph.
    stereo_downgraded: bool,
}

impl TransportRouter {
    pub fn new(
        binding: Arc<SurfaceBinding>,
        factory: Arc<dyn SinkFactory>,
        config: ConfigReader,
    ) -> Self {
        let engine = ReadbackEngine::new(Arc::clone(binding.graphics()));
        Self {
            binding,
            factory,
            config,
            notices: NoticeLatches::global(),
            engine,
            local: None,
            network: None,
            movie: None,
            thin: None,
            stereo_downgraded: false,
        }
    }

    /// Use `notices` instead of the process-wide latches.
    pub fn with_notices(mut self, notices: Arc<NoticeLatches>) -> Self {
        self.notices = notices;
        self
    }

    pub fn binding(&self) -> &Arc<SurfaceBinding> {
        &self.binding
    }

    pub fn window(&self) -> WindowId {
        self.binding.window()
    }

    /// Quad-buffered stereo has been downgraded to anaglyph.
    pub fn stereo_downgraded(&self) -> bool {
        self.stereo_downgraded
    }

    /// The thin-client channel is currently open.
    pub fn thin_client_open(&self) -> bool {
        self.thin.is_some()
    }

    /// Capture the current frame and deliver it through the pipeline
    /// selected by the configuration.
    ///
    /// Fails with `WindowDeleted` after the window was destroyed. A
    /// failing platform call only drops the frame.
    pub fn readback(&mut self, request: ReadbackRequest) -> Result<FrameOutcome> {
        let cfg = self.config.snapshot();
        if !cfg.readback {
            return Ok(FrameOutcome::Skipped(SkipReason::Disabled));
        }

        let binding = Arc::clone(&self.binding);
        let mut guard = binding.lock()?;
        let Some(surface) = guard.surface() else {
            return Ok(FrameOutcome::Skipped(SkipReason::Unbound));
        };
        let window = binding.window();

        let mut compress = if request.sync {
            CompressMode::Proxy
        } else {
            cfg.compress
        };

        // ── Stereo negotiation ───────────────────────────────────
        let mut mode = cfg.stereo;
        let mut do_stereo = false;
        if surface.stereo && !mode.is_single_eye() {
            let right_dirty = guard.take_right_dirty();
            do_stereo = binding.graphics().draw_buffer().is_right() || right_dirty;
            if mode == StereoMode::Quad && self.stereo_downgraded {
                mode = StereoMode::RedCyan;
            }
            if do_stereo && mode == StereoMode::Quad {
                if !compress.carries_quad_stereo() {
                    if self.notices.quad_needs_network() {
                        warn!(
                            %window,
                            "quad-buffered stereo requires the network transport, using anaglyphic stereo instead"
                        );
                    }
                    mode = StereoMode::RedCyan;
                    self.stereo_downgraded = true;
                } else if !binding.stereo_visual() {
                    if self.notices.no_stereo_visual() {
                        warn!(
                            %window,
                            "no stereo visual on the destination, using anaglyphic stereo instead"
                        );
                    }
                    mode = StereoMode::RedCyan;
                    self.stereo_downgraded = true;
                }
            }
        }

        if !binding.true_color() {
            compress = CompressMode::Proxy;
        }

        let settings = ReadbackSettings {
            gamma: cfg.gamma,
            hw_gamma_visuals: binding.gamma_corrected_visuals(),
            autotest: cfg.autotest,
            verbose: cfg.verbose,
        };
        let mono = mono_buffer(request.draw_buffer, mode, surface.stereo);
        let plan = if !do_stereo {
            StereoPlan::Mono(mono)
        } else if mode == StereoMode::Quad {
            StereoPlan::Quad
        } else {
            StereoPlan::Anaglyph
        };
        let spoil_check = request.spoil_last && cfg.spoil;

        // ── Movie ────────────────────────────────────────────────
        let shares_movie = cfg.movie_shares_capture(compress);
        if let Some(movie) = cfg.movie.as_ref().filter(|_| !shares_movie) {
            let shot = Shot {
                window,
                surface,
                draw_buffer: request.draw_buffer,
                plan: if do_stereo { StereoPlan::Quad } else { StereoPlan::Mono(mono) },
                pixel_size: 3,
                flags: network_flags(movie.compress),
                compress: movie.compress,
                quality: movie.quality,
                subsamp: movie.subsamp,
                sync: false,
                check_ready: false,
                spoil: false,
            };
            let factory = &self.factory;
            let result = open_sink(&mut self.movie, || factory.movie(window, movie)).and_then(
                |sink| {
                    let slot = AutotestSlot {
                        window,
                        frames: guard.autotest_frames_mut(),
                    };
                    match capture(&mut self.engine, sink.as_mut(), &shot, &settings, Some(slot))? {
                        Some(frame) => sink.send_frame(frame),
                        None => Ok(()),
                    }
                },
            );
            match result {
                Err(e) if e.is_degradable() => warn!(%window, "movie frame dropped: {e}"),
                other => other?,
            }
        }

        // ── Dispatch ─────────────────────────────────────────────
        let pipeline = compress.pipeline();
        if pipeline != Pipeline::ThinClient && self.thin.take().is_some() {
            debug!(%window, "closing thin-client channel");
        }

        let base = Shot {
            window,
            surface,
            draw_buffer: request.draw_buffer,
            plan,
            pixel_size: 4,
            flags: FrameFlags::BGR,
            compress,
            quality: cfg.quality,
            subsamp: cfg.subsamp,
            sync: request.sync,
            check_ready: spoil_check,
            spoil: cfg.spoil,
        };

        let result = match pipeline {
            Pipeline::LocalRelay => self.send_local(&base, &settings, guard.autotest_frames_mut()),
            Pipeline::Network => {
                let shot = Shot {
                    pixel_size: 3,
                    flags: network_flags(compress),
                    ..base
                };
                self.send_network(&shot, &cfg, shares_movie, &settings, &mut guard)
            }
            Pipeline::ThinClient => {
                let shot = Shot {
                    pixel_size: 3,
                    flags: FrameFlags::empty(),
                    ..base
                };
                self.send_thin(&shot, &base, &settings, guard.autotest_frames_mut())
            }
        };

        match result {
            Err(e) if e.is_degradable() => {
                warn!(%window, "frame skipped: {e}");
                Ok(FrameOutcome::Skipped(SkipReason::Degraded))
            }
            other => other,
        }
    }

    // ── Pipelines ────────────────────────────────────────────────

    fn send_local(
        &mut self,
        shot: &Shot,
        settings: &ReadbackSettings,
        frames: &mut u64,
    ) -> Result<FrameOutcome> {
        let factory = &self.factory;
        let sink = open_sink(&mut self.local, || factory.local(shot.window))?;
        let slot = AutotestSlot {
            window: shot.window,
            frames,
        };
        match capture(&mut self.engine, sink.as_mut(), shot, settings, Some(slot))? {
            Some(frame) => {
                sink.send_frame(frame)?;
                Ok(FrameOutcome::Sent(Pipeline::LocalRelay))
            }
            None => Ok(FrameOutcome::Spoiled),
        }
    }

    fn send_network(
        &mut self,
        shot: &Shot,
        cfg: &RelayConfig,
        shares_movie: bool,
        settings: &ReadbackSettings,
        guard: &mut BindingGuard<'_>,
    ) -> Result<FrameOutcome> {
        let factory = &self.factory;
        let sink = open_sink(&mut self.network, || {
            factory.network(shot.window, cfg.client.as_deref(), cfg.movie.as_ref())
        })?;
        sink.record(shares_movie);

        // Recorded frames are never spoiled.
        let shot = Shot {
            check_ready: shot.check_ready && !shares_movie,
            ..*shot
        };
        let slot = AutotestSlot {
            window: shot.window,
            frames: guard.autotest_frames_mut(),
        };
        match capture(&mut self.engine, sink.as_mut(), &shot, settings, Some(slot))? {
            Some(frame) => {
                guard.sync_once();
                sink.send_frame(frame)?;
                Ok(FrameOutcome::Sent(Pipeline::Network))
            }
            None => Ok(FrameOutcome::Spoiled),
        }
    }

    fn send_thin(
        &mut self,
        shot: &Shot,
        fallback: &Shot,
        settings: &ReadbackSettings,
        frames: &mut u64,
    ) -> Result<FrameOutcome> {
        let attempt = {
            let factory = &self.factory;
            let engine = &mut self.engine;
            open_sink(&mut self.thin, || factory.thin_client(shot.window)).and_then(|sink| {
                let slot = AutotestSlot {
                    window: shot.window,
                    frames: &mut *frames,
                };
                match capture(engine, sink.as_mut(), shot, settings, Some(slot))? {
                    Some(frame) => {
                        sink.send_frame(frame)?;
                        Ok(FrameOutcome::Sent(Pipeline::ThinClient))
                    }
                    None => Ok(FrameOutcome::Spoiled),
                }
            })
        };

        match attempt {
            Ok(outcome) => {
                if outcome == FrameOutcome::Sent(Pipeline::ThinClient)
                    && self.notices.thin_client_restored()
                {
                    info!(window = %shot.window, "thin-client transport has been re-activated");
                }
                Ok(outcome)
            }
            Err(RelayError::TransportUnavailable(reason)) => {
                if self.notices.thin_client_lost() {
                    warn!(
                        window = %shot.window,
                        "could not use the thin-client transport ({reason}), temporarily switching to the local relay"
                    );
                }
                let fallback = Shot {
                    compress: CompressMode::Proxy,
                    ..*fallback
                };
                // Only a delivered frame counts as a fallback.
                match self.send_local(&fallback, settings, frames)? {
                    FrameOutcome::Sent(_) => Ok(FrameOutcome::FellBack),
                    other => Ok(other),
                }
            }
            Err(e) => Err(e),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// The sink in `slot`, opening it first if needed.
fn open_sink(
    slot: &mut Option<Box<dyn FrameSink>>,
    open: impl FnOnce() -> Result<Box<dyn FrameSink>>,
) -> Result<&mut Box<dyn FrameSink>> {
    let sink = match slot.take() {
        Some(sink) => sink,
        None => open()?,
    };
    Ok(slot.insert(sink))
}

/// Buffer read for a mono frame. Eye selection only applies to
/// surfaces that have both eyes.
fn mono_buffer(draw: BufferId, mode: StereoMode, surface_stereo: bool) -> BufferId {
    if !surface_stereo {
        return draw;
    }
    match mode {
        StereoMode::Left => draw.left_eye(),
        StereoMode::Right => draw.right_eye(),
        StereoMode::Quad | StereoMode::RedCyan => draw,
    }
}

/// Layout of network and movie frames: packed 3-byte pixels, bottom
/// row first, blue first on little-endian hosts unless the transport is
/// raw RGB.
fn network_flags(compress: CompressMode) -> FrameFlags {
    let mut flags = FrameFlags::BOTTOM_UP;
    if cfg!(target_endian = "little") && compress != CompressMode::Rgb {
        flags |= FrameFlags::BGR;
    }
    flags
}

/// Fill a buffer from `sink`, or `None` when the spoil policy drops the
/// frame.
fn capture(
    engine: &mut ReadbackEngine,
    sink: &mut dyn FrameSink,
    shot: &Shot,
    settings: &ReadbackSettings,
    autotest: Option<AutotestSlot<'_>>,
) -> Result<Option<FrameBuffer>> {
    if shot.check_ready && !sink.frame_ready() {
        return Ok(None);
    }

    let request = BufferRequest {
        window: shot.window,
        width: shot.surface.width,
        height: shot.surface.height,
        pixel_size: shot.pixel_size,
        flags: shot.flags,
        stereo: shot.plan == StereoPlan::Quad,
        spoil: shot.spoil,
    };
    let mut frame = sink.get_buffer(&request)?;
    frame.insert_flags(FrameFlags::BOTTOM_UP);

    let rect = Rect::sized(
        shot.surface.width.min(frame.width()),
        shot.surface.height.min(frame.height()),
    );
    let drawable = shot.surface.drawable;
    match shot.plan {
        StereoPlan::Anaglyph => engine.synthesize_anaglyph(
            drawable,
            rect,
            &mut frame,
            shot.draw_buffer,
            settings,
            autotest,
        )?,
        StereoPlan::Quad => {
            let buffer = if frame.is_stereo() {
                shot.draw_buffer
            } else {
                shot.draw_buffer.left_eye()
            };
            engine.read_frame(drawable, rect, &mut frame, buffer, settings, autotest)?;
        }
        StereoPlan::Mono(buffer) => {
            engine.read_frame(drawable, rect, &mut frame, buffer, settings, autotest)?;
        }
    }

    frame.meta = FrameMeta {
        window: shot.window,
        x: 0,
        y: 0,
        width: frame.width(),
        height: frame.height(),
        quality: shot.quality,
        subsamp: shot.subsamp,
        compress: shot.compress,
        sync: shot.sync,
    };
    Ok(Some(frame))
}
