//! Network delivery: a bounded hand-off queue plus a chunked UDP
//! transport.
//!
//! [`NetworkSink`] runs on the caller's thread. It turns each filled
//! frame into a [`WireFrame`] and pushes it into a one-slot `mpsc`
//! queue. A sender task drains the queue and splits every frame into
//! MTU-sized datagrams. The sink is "ready" once the task has picked the
//! previous frame up, which is what the router's spoil policy checks.
//!
//! ## Wire format
//!
//! **Frame header packet** (44 bytes):
//! ```text
//! kind:           u8   (1)   b'H'
//! sequence:       u32  (4)
//! window:         u64  (8)
//! x, y:           u32  (4 + 4)
//! width, height:  u32  (4 + 4)
//! pitch:          u32  (4)
//! pixel_size:     u8   (1)
//! quality:        u8   (1)
//! subsamp:        u8   (1)
//! compress:       u8   (1)
//! flags:          u8   (1)
//! stereo:         u8   (1)
//! sync:           u8   (1)
//! total_chunks:   u32  (4)
//! ```
//!
//! **Chunk packet** (13 byte header + payload):
//! ```text
//! kind:           u8   (1)   b'C'
//! sequence:       u32  (4)
//! chunk_index:    u32  (4)
//! chunk_size:     u32  (4)
//! data:           [u8] (variable, ≤ MTU − 13)
//! ```
//!
//! A stereo frame's payload is the left plane followed by the right.
//! Every plane is `pitch * height` bytes, so a receiver knows the
//! payload size from the header alone and rejects headers announcing
//! more than [`MAX_FRAME_BYTES`] or more chunks than payload bytes.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::CompressMode;
use crate::error::{RelayError, Result};
use crate::flags::FrameFlags;
use crate::frame::{BufferRequest, FrameBuffer, FrameMeta};
use crate::platform::WindowId;
use crate::sink::FrameSink;
use crate::sink::movie::MovieRecorder;

// ── Constants ────────────────────────────────────────────────────

/// Maximum transmission unit minus IP (20) + UDP (8) headers.
const DEFAULT_MTU: usize = 1400;

/// Largest payload a receiver will reassemble.
pub const MAX_FRAME_BYTES: u64 = 256 * 1024 * 1024;

const KIND_FRAME: u8 = b'H';
const KIND_CHUNK: u8 = b'C';

fn le_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn le_u64(data: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(b)
}

// ── FrameHeader ──────────────────────────────────────────────────

/// Per-frame metadata sent as the first datagram of each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub sequence: u32,
    pub window: u64,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub pixel_size: u8,
    pub quality: u8,
    pub subsamp: u8,
    pub compress: u8,
    pub flags: u8,
    pub stereo: bool,
    pub sync: bool,
    pub total_chunks: u32,
}

impl FrameHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 44;

    /// Serialize to bytes (little-endian).
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = KIND_FRAME;
        buf[1..5].copy_from_slice(&self.sequence.to_le_bytes());
        buf[5..13].copy_from_slice(&self.window.to_le_bytes());
        buf[13..17].copy_from_slice(&self.x.to_le_bytes());
        buf[17..21].copy_from_slice(&self.y.to_le_bytes());
        buf[21..25].copy_from_slice(&self.width.to_le_bytes());
        buf[25..29].copy_from_slice(&self.height.to_le_bytes());
        buf[29..33].copy_from_slice(&self.pitch.to_le_bytes());
        buf[33] = self.pixel_size;
        buf[34] = self.quality;
        buf[35] = self.subsamp;
        buf[36] = self.compress;
        buf[37] = self.flags;
        buf[38] = self.stereo as u8;
        buf[39] = self.sync as u8;
        buf[40..44].copy_from_slice(&self.total_chunks.to_le_bytes());
        buf
    }

    /// Deserialize from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(RelayError::Other(format!(
                "FrameHeader too short: {} < {}",
                data.len(),
                Self::SIZE,
            )));
        }
        if data[0] != KIND_FRAME {
            return Err(RelayError::Other(format!(
                "not a frame header: kind {:#04x}",
                data[0]
            )));
        }
        Ok(Self {
            sequence: le_u32(data, 1),
            window: le_u64(data, 5),
            x: le_u32(data, 13),
            y: le_u32(data, 17),
            width: le_u32(data, 21),
            height: le_u32(data, 25),
            pitch: le_u32(data, 29),
            pixel_size: data[33],
            quality: data[34],
            subsamp: data[35],
            compress: data[36],
            flags: data[37],
            stereo: data[38] != 0,
            sync: data[39] != 0,
            total_chunks: le_u32(data, 40),
        })
    }

    /// Payload size announced by the header.
    pub fn payload_len(&self) -> u64 {
        let planes = if self.stereo { 2 } else { 1 };
        u64::from(self.pitch) * u64::from(self.height) * planes
    }

    /// Reject headers that cannot describe a frame this side will
    /// reassemble. Every chunk carries at least one byte.
    pub fn validate(&self) -> Result<()> {
        let len = self.payload_len();
        if len > MAX_FRAME_BYTES {
            return Err(RelayError::Other(format!(
                "frame payload too large: {len} bytes"
            )));
        }
        let chunks = u64::from(self.total_chunks);
        if chunks > len || (len > 0 && chunks == 0) {
            return Err(RelayError::Other(format!(
                "{chunks} chunks cannot carry {len} bytes"
            )));
        }
        Ok(())
    }
}

// ── ChunkHeader ──────────────────────────────────────────────────

/// Per-chunk metadata prepended to each data datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub sequence: u32,
    pub chunk_index: u32,
    pub chunk_size: u32,
}

impl ChunkHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 13;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = KIND_CHUNK;
        buf[1..5].copy_from_slice(&self.sequence.to_le_bytes());
        buf[5..9].copy_from_slice(&self.chunk_index.to_le_bytes());
        buf[9..13].copy_from_slice(&self.chunk_size.to_le_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || data[0] != KIND_CHUNK {
            return Err(RelayError::Other(format!(
                "not a chunk header ({} bytes)",
                data.len()
            )));
        }
        Ok(Self {
            sequence: le_u32(data, 1),
            chunk_index: le_u32(data, 5),
            chunk_size: le_u32(data, 9),
        })
    }
}

// ── WireFrame ────────────────────────────────────────────────────

/// A frame detached from its buffer, ready for the sender task.
#[derive(Debug, Clone, PartialEq)]
pub struct WireFrame {
    pub meta: FrameMeta,
    pub pitch: u32,
    pub pixel_size: u8,
    pub flags: FrameFlags,
    pub stereo: bool,
    pub payload: Bytes,
}

impl WireFrame {
    pub fn from_frame(frame: FrameBuffer) -> Self {
        let pitch = frame.pitch() as u32;
        let pixel_size = frame.pixel_size() as u8;
        let flags = frame.flags();
        let (meta, bits, right) = frame.into_parts();
        let stereo = right.is_some();
        let payload = match right {
            Some(right) => {
                let mut buf = BytesMut::with_capacity(bits.len() * 2);
                buf.extend_from_slice(&bits);
                buf.extend_from_slice(&right);
                buf.freeze()
            }
            None => Bytes::from(bits),
        };
        Self {
            meta,
            pitch,
            pixel_size,
            flags,
            stereo,
            payload,
        }
    }

    /// The left (or only) plane.
    pub fn left(&self) -> Bytes {
        if self.stereo {
            self.payload.slice(..self.payload.len() / 2)
        } else {
            self.payload.clone()
        }
    }

    /// The right plane of a stereo frame.
    pub fn right(&self) -> Option<Bytes> {
        self.stereo
            .then(|| self.payload.slice(self.payload.len() / 2..))
    }
}

// ── FrameTransport ───────────────────────────────────────────────

/// UDP transport for relayed frames.
///
/// The sender splits each [`WireFrame`] into MTU-sized chunks. The
/// receiver reassembles frames by sequence number.
pub struct FrameTransport {
    socket: UdpSocket,
    remote_addr: SocketAddr,
    sequence: AtomicU32,
    mtu: usize,
    bytes_sent: AtomicU64,
}

impl FrameTransport {
    /// Wrap an already-bound `UdpSocket` targeting `remote_addr`.
    pub fn new(socket: UdpSocket, remote_addr: SocketAddr) -> Self {
        Self {
            socket,
            remote_addr,
            sequence: AtomicU32::new(0),
            mtu: DEFAULT_MTU,
            bytes_sent: AtomicU64::new(0),
        }
    }

    /// Override the effective MTU. Values too small to carry a chunk
    /// header plus one byte are raised to that minimum.
    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu.max(ChunkHeader::SIZE + 1);
        self
    }

    /// Total bytes sent across all frames.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Send a frame as a sequence of UDP datagrams.
    pub async fn send_frame(&self, frame: &WireFrame) -> Result<()> {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let chunk_payload_max = self.mtu - ChunkHeader::SIZE;
        let total_chunks = frame.payload.len().div_ceil(chunk_payload_max);

        // 1. Frame header datagram.
        let header = FrameHeader {
            sequence: seq,
            window: frame.meta.window.0,
            x: frame.meta.x,
            y: frame.meta.y,
            width: frame.meta.width,
            height: frame.meta.height,
            pitch: frame.pitch,
            pixel_size: frame.pixel_size,
            quality: frame.meta.quality,
            subsamp: frame.meta.subsamp,
            compress: frame.meta.compress.wire_id(),
            flags: frame.flags.bits(),
            stereo: frame.stereo,
            sync: frame.meta.sync,
            total_chunks: total_chunks as u32,
        };
        let header_bytes = header.encode();
        self.socket
            .send_to(&header_bytes, self.remote_addr)
            .await?;

        // 2. Data chunk datagrams.
        let mut sent_total = header_bytes.len();
        let mut pkt = BytesMut::with_capacity(self.mtu);
        for (idx, chunk_data) in frame.payload.chunks(chunk_payload_max).enumerate() {
            let ch = ChunkHeader {
                sequence: seq,
                chunk_index: idx as u32,
                chunk_size: chunk_data.len() as u32,
            };
            pkt.clear();
            pkt.extend_from_slice(&ch.encode());
            pkt.extend_from_slice(chunk_data);

            self.socket.send_to(&pkt, self.remote_addr).await?;
            sent_total += pkt.len();
        }

        self.bytes_sent
            .fetch_add(sent_total as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Receive the next complete frame.
    ///
    /// Waits for a frame header and then collects all chunks belonging
    /// to that sequence number. Datagrams of other sequences are
    /// dropped.
    pub async fn receive_frame(&self) -> Result<WireFrame> {
        let mut buf = vec![0u8; self.mtu.max(FrameHeader::SIZE)];

        let header = loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            match FrameHeader::decode(&buf[..len]).and_then(|h| h.validate().map(|()| h)) {
                Ok(h) => break h,
                Err(e) if len > 0 && buf[0] == KIND_FRAME => debug!(%from, "dropping frame header: {e}"),
                Err(_) => {}
            }
        };

        let total = header.total_chunks;
        let expected = header.payload_len();
        let mut chunks: BTreeMap<u32, Bytes> = BTreeMap::new();
        let mut bytes = 0u64;

        while (chunks.len() as u64) < u64::from(total) {
            let (len, _) = self.socket.recv_from(&mut buf).await?;
            let Ok(ch) = ChunkHeader::decode(&buf[..len]) else {
                continue;
            };
            let data = &buf[ChunkHeader::SIZE..len];
            if ch.sequence != header.sequence
                || ch.chunk_index >= total
                || ch.chunk_size as usize != data.len()
                || chunks.contains_key(&ch.chunk_index)
            {
                continue;
            }
            bytes += data.len() as u64;
            if bytes > expected {
                return Err(RelayError::Other(format!(
                    "frame {} overflows its {expected}-byte payload",
                    header.sequence
                )));
            }
            chunks.insert(ch.chunk_index, Bytes::copy_from_slice(data));
        }
        if bytes != expected {
            return Err(RelayError::Other(format!(
                "frame {} carried {bytes} of {expected} bytes",
                header.sequence
            )));
        }

        let mut payload = BytesMut::with_capacity(expected as usize);
        for chunk in chunks.into_values() {
            payload.extend_from_slice(&chunk);
        }

        let compress = CompressMode::from_wire_id(header.compress).ok_or_else(|| {
            RelayError::Other(format!("unknown compression id {}", header.compress))
        })?;
        Ok(WireFrame {
            meta: FrameMeta {
                window: WindowId(header.window),
                x: header.x,
                y: header.y,
                width: header.width,
                height: header.height,
                quality: header.quality,
                subsamp: header.subsamp,
                compress,
                sync: header.sync,
            },
            pitch: header.pitch,
            pixel_size: header.pixel_size,
            flags: FrameFlags::from_bits_truncate(header.flags),
            stereo: header.stereo,
            payload: payload.freeze(),
        })
    }
}

// ── FrameQueue ───────────────────────────────────────────────────

/// Consumer side of a [`NetworkSink`].
pub struct FrameQueue {
    rx: mpsc::Receiver<WireFrame>,
    ready: Arc<AtomicBool>,
}

impl FrameQueue {
    /// Wait for the next frame. Taking it makes the sink ready again.
    pub async fn recv(&mut self) -> Option<WireFrame> {
        let frame = self.rx.recv().await;
        if frame.is_some() {
            self.ready.store(true, Ordering::SeqCst);
        }
        frame
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<WireFrame> {
        let frame = self.rx.try_recv().ok();
        if frame.is_some() {
            self.ready.store(true, Ordering::SeqCst);
        }
        frame
    }
}

/// Drain `queue` into `transport` until every sink handle is dropped.
pub async fn run_sender(transport: FrameTransport, mut queue: FrameQueue) {
    let remote = transport.remote_addr();
    debug!(%remote, "frame sender started");
    while let Some(frame) = queue.recv().await {
        if let Err(e) = transport.send_frame(&frame).await {
            warn!(%remote, window = %frame.meta.window, "frame send failed: {e}");
        }
    }
    debug!(%remote, bytes = transport.bytes_sent(), "frame sender stopped");
}

// ── NetworkSink ──────────────────────────────────────────────────

/// Producer side of the network pipeline.
///
/// [`send_frame`](FrameSink::send_frame) blocks while the queue is
/// full, so it must not be called from inside an async context.
pub struct NetworkSink {
    window: WindowId,
    tx: mpsc::Sender<WireFrame>,
    ready: Arc<AtomicBool>,
    recorder: Option<MovieRecorder>,
    recording: bool,
}

impl NetworkSink {
    /// A sink and its queue. At most one frame is ever in flight.
    pub fn channel(window: WindowId, recorder: Option<MovieRecorder>) -> (Self, FrameQueue) {
        let (tx, rx) = mpsc::channel(1);
        let ready = Arc::new(AtomicBool::new(true));
        let sink = Self {
            window,
            tx,
            ready: Arc::clone(&ready),
            recorder,
            recording: false,
        };
        (sink, FrameQueue { rx, ready })
    }

    /// Frames recorded through the attached movie stream.
    pub fn recorded(&self) -> u64 {
        self.recorder.as_ref().map_or(0, MovieRecorder::frames)
    }
}

impl FrameSink for NetworkSink {
    fn frame_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn get_buffer(&mut self, request: &BufferRequest) -> Result<FrameBuffer> {
        let meta = FrameMeta::new(self.window, request.width, request.height);
        let frame = FrameBuffer::new(meta, request.pixel_size, request.flags);
        Ok(if request.stereo {
            frame.with_right_eye()
        } else {
            frame
        })
    }

    fn send_frame(&mut self, frame: FrameBuffer) -> Result<()> {
        if self.recording {
            if let Some(recorder) = self.recorder.as_mut() {
                recorder.write(&frame)?;
            }
        }
        self.ready.store(false, Ordering::SeqCst);
        self.tx.blocking_send(WireFrame::from_frame(frame))?;
        Ok(())
    }

    fn record(&mut self, on: bool) {
        self.recording = on;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn request(stereo: bool) -> BufferRequest {
        BufferRequest {
            window: WindowId(0x51),
            width: 40,
            height: 30,
            pixel_size: 3,
            flags: FrameFlags::BGR | FrameFlags::BOTTOM_UP,
            stereo,
            spoil: true,
        }
    }

    #[test]
    fn frame_header_roundtrip() {
        let hdr = FrameHeader {
            sequence: 42,
            window: 0x0060_0001,
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
            pitch: 5760,
            pixel_size: 3,
            quality: 95,
            subsamp: 1,
            compress: CompressMode::Jpeg.wire_id(),
            flags: (FrameFlags::BGR | FrameFlags::BOTTOM_UP).bits(),
            stereo: true,
            sync: false,
            total_chunks: 8,
        };
        assert_eq!(FrameHeader::decode(&hdr.encode()).unwrap(), hdr);
    }

    #[test]
    fn headers_are_not_confused() {
        let ch = ChunkHeader {
            sequence: 7,
            chunk_index: 3,
            chunk_size: 1024,
        };
        let mut datagram = ch.encode().to_vec();
        datagram.resize(FrameHeader::SIZE + 10, 0);
        assert!(FrameHeader::decode(&datagram).is_err());
        assert_eq!(ChunkHeader::decode(&datagram).unwrap(), ch);
        assert!(ChunkHeader::decode(&[0u8; 4]).is_err());
    }

    fn header(pitch: u32, height: u32, stereo: bool, total_chunks: u32) -> FrameHeader {
        FrameHeader {
            sequence: 1,
            window: 0x51,
            x: 0,
            y: 0,
            width: pitch / 3,
            height,
            pitch,
            pixel_size: 3,
            quality: 95,
            subsamp: 1,
            compress: CompressMode::Rgb.wire_id(),
            flags: 0,
            stereo,
            sync: false,
            total_chunks,
        }
    }

    #[test]
    fn implausible_headers_are_rejected() {
        assert!(header(12, 4, false, 1).validate().is_ok());
        assert!(header(12, 4, true, 96).validate().is_ok());
        assert_eq!(header(12, 4, true, 1).payload_len(), 96);

        // More chunks than payload bytes.
        assert!(header(12, 4, false, u32::MAX).validate().is_err());
        assert!(header(12, 4, false, 0).validate().is_err());
        // Geometry beyond the reassembly limit.
        assert!(header(u32::MAX, u32::MAX, false, 1).validate().is_err());
        assert!(header(0, 0, false, 0).validate().is_ok());
    }

    fn chunk(sequence: u32, chunk_size: u32, data: &[u8]) -> Vec<u8> {
        let header = ChunkHeader {
            sequence,
            chunk_index: 0,
            chunk_size,
        };
        let mut datagram = header.encode().to_vec();
        datagram.extend_from_slice(data);
        datagram
    }

    #[tokio::test]
    async fn receiver_survives_hostile_datagrams() {
        let receiver_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let receiver_addr = receiver_sock.local_addr().unwrap();
        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let rx = FrameTransport::new(receiver_sock, receiver_addr);

        // Four billion chunks announced for a 12-byte frame.
        let mut hostile = header(12, 1, false, u32::MAX);
        hostile.sequence = 9;
        raw.send_to(&hostile.encode(), receiver_addr).await.unwrap();
        // A real header, then a chunk whose declared size disagrees
        // with its datagram, then the honest chunk.
        raw.send_to(&header(12, 1, false, 1).encode(), receiver_addr)
            .await
            .unwrap();
        raw.send_to(&chunk(1, 9999, &[0xee; 12]), receiver_addr)
            .await
            .unwrap();
        raw.send_to(&chunk(1, 12, &[7; 12]), receiver_addr)
            .await
            .unwrap();

        let got = tokio::time::timeout(std::time::Duration::from_secs(5), rx.receive_frame())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.meta.window, WindowId(0x51));
        assert_eq!(&got.payload[..], &[7u8; 12]);
    }

    #[test]
    fn sink_readiness_tracks_queue() {
        let (mut sink, mut queue) = NetworkSink::channel(WindowId(0x51), None);
        assert!(sink.frame_ready());

        let frame = sink.get_buffer(&request(false)).unwrap();
        sink.send_frame(frame).unwrap();
        assert!(!sink.frame_ready());

        let wire = queue.try_recv().unwrap();
        assert!(sink.frame_ready());
        assert_eq!(wire.meta.window, WindowId(0x51));
        assert_eq!(wire.pixel_size, 3);
        assert!(!wire.stereo);
    }

    #[test]
    fn stereo_payload_carries_both_planes() {
        let (mut sink, mut queue) = NetworkSink::channel(WindowId(0x51), None);
        let mut frame = sink.get_buffer(&request(true)).unwrap();
        frame.bits_mut().fill(1);
        if let Some(right) = frame.right_bits_mut() {
            right.fill(2);
        }
        let plane = frame.bits().len();
        sink.send_frame(frame).unwrap();

        let wire = queue.try_recv().unwrap();
        assert_eq!(wire.left().len(), plane);
        assert!(wire.left().iter().all(|&b| b == 1));
        assert!(wire.right().unwrap().iter().all(|&b| b == 2));
    }

    #[test]
    fn recv_waits_for_the_producer() {
        let (mut sink, mut queue) = NetworkSink::channel(WindowId(0x52), None);
        let frame = sink.get_buffer(&request(false)).unwrap();
        sink.send_frame(frame).unwrap();

        let wire = tokio_test::block_on(queue.recv()).unwrap();
        assert_eq!(wire.meta.window, WindowId(0x52));
        assert!(sink.frame_ready());

        drop(sink);
        assert!(tokio_test::block_on(queue.recv()).is_none());
    }

    #[test]
    fn closed_queue_is_reported() {
        let (mut sink, queue) = NetworkSink::channel(WindowId(1), None);
        drop(queue);
        let frame = sink.get_buffer(&request(false)).unwrap();
        assert!(matches!(sink.send_frame(frame), Err(RelayError::ChannelClosed)));
    }

    #[tokio::test]
    async fn udp_transport_send_receive() {
        let sender_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let receiver_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sender_addr = sender_sock.local_addr().unwrap();
        let receiver_addr = receiver_sock.local_addr().unwrap();

        let tx = FrameTransport::new(sender_sock, receiver_addr);
        let rx = FrameTransport::new(receiver_sock, sender_addr);

        let mut meta = FrameMeta::new(WindowId(0x77), 64, 32);
        meta.compress = CompressMode::Rgb;
        meta.quality = 80;
        let mut frame = FrameBuffer::new(meta, 3, FrameFlags::BOTTOM_UP);
        for (i, b) in frame.bits_mut().iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        let wire = WireFrame::from_frame(frame);
        let expected = wire.clone();

        let recv = tokio::spawn(async move { rx.receive_frame().await.unwrap() });
        // Several chunks at the default MTU.
        tx.send_frame(&wire).await.unwrap();

        let got = recv.await.unwrap();
        assert_eq!(got, expected);
        assert!(tx.bytes_sent() > expected.payload.len() as u64);
    }
}
