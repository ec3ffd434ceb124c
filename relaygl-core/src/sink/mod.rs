//! Frame destinations.
//!
//! Every delivery pipeline ends in a [`FrameSink`]. The router asks the
//! sink for a writable [`FrameBuffer`], fills it through the readback
//! engine and hands it back with [`FrameSink::send_frame`]. Sinks are
//! created lazily, one per window and pipeline, through a
//! [`SinkFactory`].
//!
//! | Sink                  | Pipeline     | Destination                         |
//! |-----------------------|--------------|-------------------------------------|
//! | [`MemoryBlitter`]     | local relay  | in-process frame slot + viewer       |
//! | [`NetworkSink`]       | network      | async UDP sender task                |
//! | [`MovieRecorder`]     | movie        | bincode records appended to a file   |
//! | [`LoopbackThinClient`]| thin client  | toggleable loopback route            |

pub mod blit;
pub mod movie;
pub mod net;
pub mod standard;
pub mod thin;

pub use blit::{BlitView, MemoryBlitter};
pub use movie::{MovieReader, MovieRecord, MovieRecorder};
pub use net::{ChunkHeader, FrameHeader, FrameQueue, FrameTransport, NetworkSink, WireFrame};
pub use standard::{NetworkRoute, StandardSinks};
pub use thin::{LoopbackThinClient, ThinRoute};

use crate::config::MovieConfig;
use crate::error::Result;
use crate::frame::{BufferRequest, FrameBuffer};
use crate::platform::WindowId;

/// A destination that accepts captured frames.
pub trait FrameSink: Send {
    /// The destination has consumed the previously delivered frame.
    fn frame_ready(&self) -> bool;

    /// A writable buffer for the next frame.
    fn get_buffer(&mut self, request: &BufferRequest) -> Result<FrameBuffer>;

    /// Deliver a filled buffer.
    fn send_frame(&mut self, frame: FrameBuffer) -> Result<()>;

    /// Also append delivered frames to the sink's movie stream, if it
    /// has one.
    fn record(&mut self, _on: bool) {}
}

/// Creates the sinks of one process.
pub trait SinkFactory: Send + Sync {
    fn local(&self, window: WindowId) -> Result<Box<dyn FrameSink>>;

    /// `client` overrides the factory's default destination. When
    /// `movie` is given the sink can record its own frames.
    fn network(
        &self,
        window: WindowId,
        client: Option<&str>,
        movie: Option<&MovieConfig>,
    ) -> Result<Box<dyn FrameSink>>;

    fn movie(&self, window: WindowId, movie: &MovieConfig) -> Result<Box<dyn FrameSink>>;

    /// Fails with `TransportUnavailable` when the channel has no route.
    fn thin_client(&self, window: WindowId) -> Result<Box<dyn FrameSink>>;
}
