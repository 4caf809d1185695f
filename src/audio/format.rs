//! Fixed PCM wire format and the [`AudioFrame`] block type.
//!
//! Every frame sent to the backend is exactly one block of
//! **16 kHz, mono, signed 16-bit little-endian** samples:
//!
//! ```text
//! 4096 samples × 1 channel × 2 bytes = 8192 bytes
//! ```
//!
//! None of these values are configurable.

use byteorder::{ByteOrder, LittleEndian};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Capture sample rate in Hz.
pub const SAMPLE_RATE: u32 = 16_000;
/// Samples per block (and per websocket frame).
pub const BLOCK_SIZE: usize = 4096;
/// Mono capture.
pub const CHANNELS: u16 = 1;
/// `i16` samples.
pub const BYTES_PER_SAMPLE: usize = 2;
/// Size of one binary websocket frame.
pub const FRAME_BYTES: usize = BLOCK_SIZE * CHANNELS as usize * BYTES_PER_SAMPLE;

// ---------------------------------------------------------------------------
// PcmFormat
// ---------------------------------------------------------------------------

/// Description of the capture stream requested from the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub block_size: usize,
    pub channels: u16,
}

impl PcmFormat {
    /// The one format this client speaks.
    pub const CAPTURE: PcmFormat = PcmFormat {
        sample_rate: SAMPLE_RATE,
        block_size: BLOCK_SIZE,
        channels: CHANNELS,
    };

    /// `block_size × channels × bytes_per_sample`.
    ///
    /// ```
    /// use meet_audio_client::audio::PcmFormat;
    ///
    /// assert_eq!(PcmFormat::CAPTURE.bytes_per_block(), 8192);
    /// ```
    pub fn bytes_per_block(&self) -> usize {
        self.block_size * self.channels as usize * BYTES_PER_SAMPLE
    }

    /// Samples per block across all channels.
    pub fn samples_per_block(&self) -> usize {
        self.block_size * self.channels as usize
    }

    /// Build the cpal stream config for this format.
    pub fn stream_config(&self, buffer_size: cpal::BufferSize) -> cpal::StreamConfig {
        cpal::StreamConfig {
            channels: self.channels,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioFrame
// ---------------------------------------------------------------------------

/// Exactly one block of captured `i16` samples.
///
/// Constructed only with the full block length so that every frame on the
/// wire has the same size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Vec<i16>,
}

impl AudioFrame {
    /// Wrap `samples` as a frame.
    ///
    /// Returns `None` unless `samples.len() == BLOCK_SIZE`.
    pub fn from_samples(samples: Vec<i16>) -> Option<Self> {
        if samples.len() == BLOCK_SIZE * CHANNELS as usize {
            Some(Self { samples })
        } else {
            None
        }
    }

    /// An all-zero block.
    pub fn silence() -> Self {
        Self {
            samples: vec![0; BLOCK_SIZE * CHANNELS as usize],
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Raw little-endian bytes of the block, sample for sample.
    ///
    /// ```
    /// use meet_audio_client::audio::{AudioFrame, FRAME_BYTES};
    ///
    /// let bytes = AudioFrame::silence().to_le_bytes();
    /// assert_eq!(bytes.len(), FRAME_BYTES);
    /// assert!(bytes.iter().all(|&b| b == 0));
    /// ```
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.samples.len() * BYTES_PER_SAMPLE];
        LittleEndian::write_i16_into(&self.samples, &mut bytes);
        bytes
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
