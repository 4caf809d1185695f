//! Reblocking of driver callbacks into fixed-size [`AudioFrame`]s.
//!
//! cpal treats `BufferSize::Fixed` as a request: depending on the host the
//! callback may still be handed 480, 1024 or 4100 samples at a time.
//! [`BlockAssembler`] carries the remainder between callbacks so that the
//! socket only ever sees complete blocks, in capture order.
//!
//! # Example
//!
//! ```rust
//! use meet_audio_client::audio::{BlockAssembler, BLOCK_SIZE};
//!
//! let mut blocks = BlockAssembler::new();
//! assert!(blocks.push(&vec![1i16; BLOCK_SIZE - 10]).is_empty());
//!
//! let frames = blocks.push(&[2i16; 20]);
//! assert_eq!(frames.len(), 1);
//! assert_eq!(blocks.pending(), 10);
//! ```

use super::format::{AudioFrame, PcmFormat};

// ---------------------------------------------------------------------------
// BlockAssembler
// ---------------------------------------------------------------------------

/// FIFO accumulator that cuts an arbitrary sample stream into blocks of
/// exactly `BLOCK_SIZE × CHANNELS` samples.
///
/// A partial tail stays in the assembler until it is completed by the next
/// callback; it is never padded or emitted short.
#[derive(Debug)]
pub struct BlockAssembler {
    pending: Vec<i16>,
    block_len: usize,
}

impl BlockAssembler {
    pub fn new() -> Self {
        let block_len = PcmFormat::CAPTURE.samples_per_block();
        Self {
            pending: Vec::with_capacity(block_len),
            block_len,
        }
    }

    /// Append `data` and return every block that became complete, oldest
    /// first.
    pub fn push(&mut self, mut data: &[i16]) -> Vec<AudioFrame> {
        let mut frames = Vec::new();

        while !data.is_empty() {
            let want = self.block_len - self.pending.len();
            let take = want.min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.pending.len() == self.block_len {
                let block = std::mem::replace(&mut self.pending, Vec::with_capacity(self.block_len));
                // Length is exactly one block here.
                if let Some(frame) = AudioFrame::from_samples(block) {
                    frames.push(frame);
                }
            }
        }

        frames
    }

    /// Number of samples waiting for the next block.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl Default for BlockAssembler {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
