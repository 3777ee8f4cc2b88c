//! Stream reassembler for the serial-port transport.
//!
//! Socket reads arrive in arbitrary pieces: half a header, a frame and a
//! half, or several frames at once. The reassembler keeps one growing buffer
//! and cuts complete frames off its front.
//!
//! Resync policy: when the buffer does not start with the preamble, drop up
//! to the next `0xBA`. If there is none (or it sits in the last two bytes),
//! the whole buffer is dropped, so a preamble split across two reads is lost.

use log::{debug, warn};

use super::codec::{FRAME_OVERHEAD, Frame, LENGTH_OFFSET, PREAMBLE};

pub struct StreamReassembler {
    buffer: Vec<u8>,
    discarded_bytes: usize,
    dropped_frames: usize,
}

impl StreamReassembler {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            discarded_bytes: 0,
            dropped_frames: 0,
        }
    }

    /// Append socket bytes and return every frame that is now complete, in
    /// arrival order.
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(data);
        let mut frames = Vec::new();

        while self.buffer.len() >= FRAME_OVERHEAD {
            if self.buffer[..3] != PREAMBLE {
                match self.next_preamble_candidate() {
                    Some(offset) => {
                        debug!("SPP: resync, dropping {offset} bytes");
                        self.discard(offset);
                    }
                    None => {
                        warn!("SPP: no preamble in {} buffered bytes, dropping all", self.buffer.len());
                        let all = self.buffer.len();
                        self.discard(all);
                    }
                }
                continue;
            }

            let declared = u16::from_le_bytes([self.buffer[5], self.buffer[6]]) as usize;
            let frame_size = declared + LENGTH_OFFSET;
            if self.buffer.len() < frame_size {
                break;
            }

            match Frame::decode(&self.buffer[..frame_size]) {
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    warn!("SPP: dropping {frame_size}-byte frame: {e}");
                    self.dropped_frames += 1;
                }
            }
            self.buffer.drain(..frame_size);
        }

        frames
    }

    /// Discard any partial frame (used on disconnect).
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes thrown away while hunting for a preamble.
    pub fn discarded_bytes(&self) -> usize {
        self.discarded_bytes
    }

    /// Complete frames that failed to decode.
    pub fn dropped_frames(&self) -> usize {
        self.dropped_frames
    }

    fn next_preamble_candidate(&self) -> Option<usize> {
        let len = self.buffer.len();
        (1..len).find(|&i| i + 2 < len && self.buffer[i] == PREAMBLE[0])
    }

    fn discard(&mut self, n: usize) {
        self.buffer.drain(..n);
        self.discarded_bytes += n;
    }
}

impl Default for StreamReassembler {
    fn default() -> Self {
        Self::new()
    }
}
