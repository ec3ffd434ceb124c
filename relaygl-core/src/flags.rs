//! Pixel layout flags shared by frames, sinks and the wire format.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Pixel layout flags carried by every [`FrameBuffer`](crate::frame::FrameBuffer).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FrameFlags: u8 {
        /// Channels are stored blue first.
        const BGR = 0x01;
        /// 4-byte pixels store alpha before the color channels.
        const ALPHA_FIRST = 0x02;
        /// Row 0 is the bottom row of the image.
        const BOTTOM_UP = 0x04;
    }
}

impl FrameFlags {
    /// Byte offsets of the red, green and blue channels inside one pixel.
    pub fn channel_offsets(self, pixel_size: usize) -> (usize, usize, usize) {
        let first = if pixel_size == 4 && self.contains(FrameFlags::ALPHA_FIRST) {
            1
        } else {
            0
        };
        if self.contains(FrameFlags::BGR) {
            (first + 2, first + 1, first)
        } else {
            (first, first + 1, first + 2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_follow_layout() {
        assert_eq!(FrameFlags::empty().channel_offsets(3), (0, 1, 2));
        assert_eq!(FrameFlags::BGR.channel_offsets(3), (2, 1, 0));
        assert_eq!(FrameFlags::BGR.channel_offsets(4), (2, 1, 0));
        assert_eq!(
            (FrameFlags::BGR | FrameFlags::ALPHA_FIRST).channel_offsets(4),
            (3, 2, 1)
        );
        assert_eq!(FrameFlags::ALPHA_FIRST.channel_offsets(4), (1, 2, 3));
        // Alpha-first is meaningless without an alpha byte.
        assert_eq!(FrameFlags::ALPHA_FIRST.channel_offsets(3), (0, 1, 2));
    }
}
