//! Probe service core logic.
//!
//! Runs a set of simulated application windows on the software
//! platform. Each window renders, resizes and reads back frames on its
//! own blocking thread, exactly as an interposed application thread
//! would, while a local viewer drains the relay blitters and an
//! optional loopback receiver drains the network transport.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use relaygl_core::sink::{FrameTransport, NetworkRoute, StandardSinks, ThinRoute};
use relaygl_core::{
    BufferId, ConfigHandle, FbConfig, FrameOutcome, Pipeline, ReadbackRequest, RelayError,
    SoftPlatform, StructureEvent, SurfaceBinding, TransportRouter, WindowAttributes, WindowId,
};

use crate::config::ProbeConfig;

const FIRST_WINDOW: u64 = 0x0040_0001;

// ── Reports ──────────────────────────────────────────────────────

/// Per-window frame tally.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WindowReport {
    pub window: String,
    pub sent_local: u64,
    pub sent_network: u64,
    pub sent_thin: u64,
    pub fell_back: u64,
    pub spoiled: u64,
    pub skipped: u64,
    /// Frames the local viewer picked up.
    pub displayed: u64,
    pub resizes: u64,
    pub final_size: Option<(u32, u32)>,
    pub stereo_downgraded: bool,
    pub error: Option<String>,
}

impl WindowReport {
    fn tally(&mut self, outcome: FrameOutcome) {
        match outcome {
            FrameOutcome::Sent(Pipeline::LocalRelay) => self.sent_local += 1,
            FrameOutcome::Sent(Pipeline::Network) => self.sent_network += 1,
            FrameOutcome::Sent(Pipeline::ThinClient) => self.sent_thin += 1,
            FrameOutcome::FellBack => self.fell_back += 1,
            FrameOutcome::Spoiled => self.spoiled += 1,
            FrameOutcome::Skipped(_) => self.skipped += 1,
        }
    }
}

/// Summary of one probe run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProbeReport {
    pub windows: Vec<WindowReport>,
    /// Frames reassembled by the loopback receiver.
    pub network_frames_received: u64,
}

// ── ProbeService ─────────────────────────────────────────────────

pub struct ProbeService {
    config: ProbeConfig,
    running: Arc<AtomicBool>,
}

impl ProbeService {
    pub fn new(config: ProbeConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle used to stop the run from another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Drive every window to completion (or until stopped).
    pub async fn run(&self) -> Result<ProbeReport, Box<dyn std::error::Error + Send + Sync>> {
        self.running.store(true, Ordering::SeqCst);

        let received = Arc::new(AtomicU64::new(0));
        let default_client = if self.config.network.loopback_receiver {
            Some(self.spawn_receiver(Arc::clone(&received)).await?)
        } else {
            None
        };

        let route = NetworkRoute {
            runtime: Handle::current(),
            bind: self.config.bind_addr()?,
            default_client,
            mtu: Some(self.config.network.mtu),
        };
        let thin = ThinRoute::new(self.config.probe.thin_route_up);
        let sinks = Arc::new(StandardSinks::new(Some(route), thin));
        let relay = Arc::new(ConfigHandle::new(self.config.relay.clone()));
        let platform = Arc::new(SoftPlatform::new());
        let fb_config = platform.add_config(self.config.probe.stereo);

        info!(
            windows = self.config.probe.windows,
            frames = self.config.probe.frames,
            compress = ?self.config.relay.compress,
            "probe starting"
        );

        let mut handles = Vec::new();
        for i in 0..u64::from(self.config.probe.windows) {
            let window = WindowId(FIRST_WINDOW + i);
            let driver = WindowDriver {
                window,
                fb_config,
                platform: Arc::clone(&platform),
                sinks: Arc::clone(&sinks),
                relay: Arc::clone(&relay),
                config: self.config.clone(),
                running: Arc::clone(&self.running),
            };
            handles.push(tokio::task::spawn_blocking(move || driver.run()));
        }

        let mut report = ProbeReport::default();
        for handle in handles {
            match handle.await {
                Ok(window) => report.windows.push(window),
                Err(e) => error!("window thread panicked: {e}"),
            }
        }

        // Let the sender tasks flush their last frames.
        tokio::time::sleep(Duration::from_millis(50)).await;
        report.network_frames_received = received.load(Ordering::SeqCst);

        self.running.store(false, Ordering::SeqCst);
        info!("probe finished");
        Ok(report)
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Bind a receiver on loopback and count the frames it reassembles.
    async fn spawn_receiver(&self, received: Arc<AtomicU64>) -> std::io::Result<SocketAddr> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        let local = socket.local_addr()?;
        // The remote address is only used for sending.
        let transport = FrameTransport::new(socket, local).with_mtu(self.config.network.mtu);
        let running = Arc::clone(&self.running);

        tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                let next =
                    tokio::time::timeout(Duration::from_millis(200), transport.receive_frame())
                        .await;
                match next {
                    Ok(Ok(frame)) => {
                        received.fetch_add(1, Ordering::SeqCst);
                        debug!(
                            window = %frame.meta.window,
                            width = frame.meta.width,
                            height = frame.meta.height,
                            "received frame"
                        );
                    }
                    Ok(Err(e)) => warn!("receive error: {e}"),
                    Err(_) => {}
                }
            }
        });

        info!("loopback receiver on {local}");
        Ok(local)
    }
}

// ── WindowDriver ─────────────────────────────────────────────────

/// One simulated application window and its render thread.
struct WindowDriver {
    window: WindowId,
    fb_config: FbConfig,
    platform: Arc<SoftPlatform>,
    sinks: Arc<StandardSinks>,
    relay: Arc<ConfigHandle>,
    config: ProbeConfig,
    running: Arc<AtomicBool>,
}

impl WindowDriver {
    fn run(self) -> WindowReport {
        let mut report = WindowReport {
            window: self.window.to_string(),
            ..WindowReport::default()
        };
        match self.drive(&mut report) {
            Ok(()) => {}
            Err(RelayError::WindowDeleted) => {
                info!(window = %self.window, "window destroyed");
            }
            Err(e) => {
                warn!(window = %self.window, "window stopped: {e}");
                report.error = Some(e.to_string());
            }
        }
        report
    }

    fn drive(&self, report: &mut WindowReport) -> relaygl_core::Result<()> {
        let workload = &self.config.probe;
        self.platform.add_window(
            self.window,
            WindowAttributes {
                width: workload.width,
                height: workload.height,
                depth: 24,
                true_color: true,
                visual_id: 0x21,
                structure_events: false,
            },
        );

        let binding = Arc::new(SurfaceBinding::new(
            self.window,
            self.platform.clone(),
            self.platform.clone(),
            self.config.relay.surface,
        )?);
        binding.init_from_window(Some(self.fb_config))?;
        let mut router = TransportRouter::new(
            Arc::clone(&binding),
            self.sinks.clone(),
            self.relay.subscribe(),
        );

        let interval = Duration::from_millis(workload.frame_interval_ms);
        let (mut width, mut height) = (workload.width, workload.height);
        for n in 1..=workload.frames {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            if workload.resize_every > 0 && n % workload.resize_every == 0 {
                width += 16;
                height += 16;
                self.platform.resize_window(self.window, width, height);
                self.platform.push_event(
                    self.window,
                    StructureEvent::Configure {
                        window: self.window,
                        width,
                        height,
                    },
                );
                report.resizes += 1;
            }
            binding.check_external_resize()?;
            let drawable = binding.fetch_drawable_for_update()?;
            binding.cleanup()?;

            self.render(drawable, n, workload.stereo);
            if workload.stereo {
                binding.mark_right_dirty();
            }

            report.tally(router.readback(ReadbackRequest::default())?);
            binding.swap_buffers()?;

            let shown = self
                .sinks
                .blit_view(self.window)
                .and_then(|view| view.take_latest());
            if shown.is_some() {
                report.displayed += 1;
            }

            std::thread::sleep(interval);
        }

        report.final_size = binding.size();
        report.stereo_downgraded = router.stereo_downgraded();
        Ok(())
    }

    /// Paint a frame-dependent color; the right eye gets the inverse.
    fn render(&self, drawable: relaygl_core::Drawable, n: u32, stereo: bool) {
        let shade = (n % 256) as u8;
        let color = [shade, 255 - shade, (self.window.0 % 256) as u8, 255];
        if stereo {
            self.platform.fill(drawable, BufferId::BackLeft, color);
            self.platform.fill(
                drawable,
                BufferId::BackRight,
                [255 - color[0], 255 - color[1], 255 - color[2], 255],
            );
        } else {
            self.platform.fill(drawable, BufferId::Back, color);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
