//! The stock [`SinkFactory`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;

use tokio::runtime::Handle;
use tracing::debug;

use crate::config::MovieConfig;
use crate::error::{RelayError, Result};
use crate::flags::FrameFlags;
use crate::lock_unpoisoned;
use crate::platform::WindowId;
use crate::sink::blit::{BlitView, MemoryBlitter};
use crate::sink::movie::{self, MovieRecorder};
use crate::sink::net::{self, FrameTransport, NetworkSink};
use crate::sink::thin::{LoopbackThinClient, ThinRoute};
use crate::sink::{FrameSink, SinkFactory};

/// Where network sinks send their frames.
#[derive(Debug, Clone)]
pub struct NetworkRoute {
    /// Runtime the sender tasks are spawned on.
    pub runtime: Handle,
    /// Local address to bind each sender socket to.
    pub bind: SocketAddr,
    /// Destination used when the configuration names no client.
    pub default_client: Option<SocketAddr>,
    pub mtu: Option<usize>,
}

/// Memory blitters for the local relay, UDP senders for the network,
/// movie files on disk and a loopback thin client.
pub struct StandardSinks {
    blit_pixel_size: usize,
    blit_flags: FrameFlags,
    views: Mutex<HashMap<WindowId, BlitView>>,
    network: Option<NetworkRoute>,
    thin: ThinRoute,
}

impl StandardSinks {
    pub fn new(network: Option<NetworkRoute>, thin: ThinRoute) -> Self {
        Self {
            blit_pixel_size: 4,
            blit_flags: FrameFlags::BGR | FrameFlags::BOTTOM_UP,
            views: Mutex::new(HashMap::new()),
            network,
            thin,
        }
    }

    /// Layout of local relay frames.
    pub fn with_blit_layout(mut self, pixel_size: usize, flags: FrameFlags) -> Self {
        self.blit_pixel_size = pixel_size;
        self.blit_flags = flags;
        self
    }

    /// Viewer of the most recent blitter created for `window`.
    pub fn blit_view(&self, window: WindowId) -> Option<BlitView> {
        lock_unpoisoned(&self.views).get(&window).cloned()
    }

    pub fn thin_route(&self) -> &ThinRoute {
        &self.thin
    }

    fn resolve_client(&self, route: &NetworkRoute, client: Option<&str>) -> Result<SocketAddr> {
        match client {
            Some(c) => c.parse().map_err(|_| {
                RelayError::TransportUnavailable(format!("invalid client address '{c}'"))
            }),
            None => route.default_client.ok_or_else(|| {
                RelayError::TransportUnavailable("no network client configured".into())
            }),
        }
    }
}

impl SinkFactory for StandardSinks {
    fn local(&self, window: WindowId) -> Result<Box<dyn FrameSink>> {
        let blitter = MemoryBlitter::new(window, self.blit_pixel_size, self.blit_flags);
        lock_unpoisoned(&self.views).insert(window, blitter.view());
        Ok(Box::new(blitter))
    }

    fn network(
        &self,
        window: WindowId,
        client: Option<&str>,
        movie: Option<&MovieConfig>,
    ) -> Result<Box<dyn FrameSink>> {
        let route = self.network.as_ref().ok_or_else(|| {
            RelayError::TransportUnavailable("network transport not configured".into())
        })?;
        let remote = self.resolve_client(route, client)?;

        let socket = std::net::UdpSocket::bind(route.bind)?;
        socket.set_nonblocking(true)?;
        let socket = {
            let _guard = route.runtime.enter();
            tokio::net::UdpSocket::from_std(socket)?
        };
        let mut transport = FrameTransport::new(socket, remote);
        if let Some(mtu) = route.mtu {
            transport = transport.with_mtu(mtu);
        }

        let recorder = match movie {
            Some(m) => Some(MovieRecorder::create(
                window,
                &movie::window_path(&m.path, window),
            )?),
            None => None,
        };
        let (sink, queue) = NetworkSink::channel(window, recorder);
        route.runtime.spawn(net::run_sender(transport, queue));
        debug!(%window, %remote, "network sink opened");
        Ok(Box::new(sink))
    }

    fn movie(&self, window: WindowId, movie: &MovieConfig) -> Result<Box<dyn FrameSink>> {
        let recorder = MovieRecorder::create(window, &movie::window_path(&movie.path, window))?;
        Ok(Box::new(recorder))
    }

    fn thin_client(&self, window: WindowId) -> Result<Box<dyn FrameSink>> {
        Ok(Box::new(LoopbackThinClient::open(window, self.thin.clone())?))
    }
}
