//! Movie recording.
//!
//! A movie is a plain sequence of bincode-encoded [`MovieRecord`]s.
//! Pixels are stored exactly as captured; compressing them is left to
//! whatever replays the file.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::flags::FrameFlags;
use crate::frame::{BufferRequest, FrameBuffer, FrameMeta};
use crate::platform::WindowId;
use crate::sink::FrameSink;

/// One recorded frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieRecord {
    pub meta: FrameMeta,
    pub pitch: u32,
    pub pixel_size: u8,
    pub flags: FrameFlags,
    pub pixels: Vec<u8>,
    pub right: Option<Vec<u8>>,
}

impl MovieRecord {
    fn from_frame(frame: &FrameBuffer) -> Self {
        Self {
            meta: frame.meta,
            pitch: frame.pitch() as u32,
            pixel_size: frame.pixel_size() as u8,
            flags: frame.flags(),
            pixels: frame.bits().to_vec(),
            right: frame.right_bits().map(<[u8]>::to_vec),
        }
    }
}

/// Per-window movie file: `<base>.<window id in hex>`.
pub fn window_path(base: &Path, window: WindowId) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{:x}", window.0));
    PathBuf::from(name)
}

// ── MovieRecorder ────────────────────────────────────────────────

pub struct MovieRecorder {
    window: WindowId,
    path: PathBuf,
    out: BufWriter<File>,
    frames: u64,
}

impl MovieRecorder {
    /// Create (or truncate) the movie file at `path`.
    pub fn create(window: WindowId, path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        debug!(%window, path = %path.display(), "recording movie");
        Ok(Self {
            window,
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            frames: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Append one frame and flush it to disk.
    pub fn write(&mut self, frame: &FrameBuffer) -> Result<()> {
        bincode::serialize_into(&mut self.out, &MovieRecord::from_frame(frame))?;
        self.out.flush()?;
        self.frames += 1;
        Ok(())
    }
}

impl FrameSink for MovieRecorder {
    fn frame_ready(&self) -> bool {
        true
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
        self.write(&frame)
    }
}

// ── MovieReader ──────────────────────────────────────────────────

/// Sequential reader over a movie file.
pub struct MovieReader {
    input: BufReader<File>,
}

impl MovieReader {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            input: BufReader::new(File::open(path)?),
        })
    }

    /// The next record, or `None` at a clean end of file.
    pub fn next_record(&mut self) -> Result<Option<MovieRecord>> {
        match bincode::deserialize_from(&mut self.input) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                let eof = matches!(&*e, bincode::ErrorKind::Io(io) if io.kind() == ErrorKind::UnexpectedEof);
                if eof { Ok(None) } else { Err(e.into()) }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompressMode;

    fn temp_movie(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("relaygl-{tag}-{}.movie", std::process::id()))
    }

    #[test]
    fn records_survive_a_reopen() {
        let path = temp_movie("recorder");
        let window = WindowId(0x42);
        let mut rec = MovieRecorder::create(window, &path).unwrap();

        let req = BufferRequest {
            window,
            width: 2,
            height: 1,
            pixel_size: 3,
            flags: FrameFlags::BOTTOM_UP,
            stereo: true,
            spoil: false,
        };
        let mut frame = rec.get_buffer(&req).unwrap();
        frame.meta.compress = CompressMode::Rgb;
        frame.bits_mut()[0] = 0xaa;
        rec.send_frame(frame).unwrap();
        assert_eq!(rec.frames(), 1);

        let mut reader = MovieReader::open(&path).unwrap();
        let record = reader.next_record().unwrap().unwrap();
        assert_eq!(record.meta.window, window);
        assert_eq!(record.meta.compress, CompressMode::Rgb);
        assert_eq!(record.flags, FrameFlags::BOTTOM_UP);
        assert_eq!(record.pixels[0], 0xaa);
        assert!(record.right.is_some());
        assert!(reader.next_record().unwrap().is_none());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn window_paths_are_distinct() {
        let base = Path::new("/tmp/out.movie");
        assert_eq!(
            window_path(base, WindowId(0x1f)),
            PathBuf::from("/tmp/out.movie.1f")
        );
        assert_ne!(window_path(base, WindowId(1)), window_path(base, WindowId(2)));
    }
}
