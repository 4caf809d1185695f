//! Conversion of a device's native stream into 16 kHz mono `i16`.
//!
//! Used only when the input device cannot deliver the wire format
//! directly (CoreAudio always reports `f32`, WASAPI only the mix-format
//! channel count).  The steps mirror what the capture callback needs:
//!
//! 1. [`stereo_to_mono`]: average interleaved channels.
//! 2. [`StreamResampler`]: linear interpolation to 16 kHz, carrying its
//!    position across callbacks so block boundaries leave no seams.
//! 3. [`f32_to_i16`]: clamp and scale.
//!
//! [`DeviceConverter`] chains the three.

use super::format::SAMPLE_RATE;

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// * `channels == 1` returns the input unchanged.
/// * `channels == 0` returns an empty vector.
///
/// ```rust
/// use meet_audio_client::audio::stereo_to_mono;
///
/// let mono = stereo_to_mono(&[0.5_f32, -0.5, 0.2, 0.4], 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// f32_to_i16
// ---------------------------------------------------------------------------

/// Scale a `[-1.0, 1.0]` sample to `i16`, clamping out-of-range input.
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

// ---------------------------------------------------------------------------
// StreamResampler
// ---------------------------------------------------------------------------

/// Streaming linear-interpolation resampler to 16 kHz.
///
/// Unlike a one-shot resampler it keeps the unconsumed tail of each input
/// slice, so feeding a signal in pieces yields the same output as feeding
/// it whole.
#[derive(Debug)]
pub struct StreamResampler {
    source_rate: u32,
    /// Source samples advanced per output sample.
    step: f64,
    /// Read position of the next output sample inside `carry`.
    pos: f64,
    carry: Vec<f32>,
}

impl StreamResampler {
    pub fn new(source_rate: u32) -> Self {
        Self {
            source_rate,
            step: source_rate as f64 / SAMPLE_RATE as f64,
            pos: 0.0,
            carry: Vec::new(),
        }
    }

    /// Resample the next slice of mono input.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.source_rate == SAMPLE_RATE || self.source_rate == 0 {
            return input.to_vec();
        }

        self.carry.extend_from_slice(input);
        let mut out = Vec::with_capacity((input.len() as f64 / self.step).ceil() as usize);

        loop {
            let idx = self.pos as usize;
            if idx + 1 >= self.carry.len() {
                break;
            }
            let frac = (self.pos - idx as f64) as f32;
            out.push(self.carry[idx] * (1.0 - frac) + self.carry[idx + 1] * frac);
            self.pos += self.step;
        }

        let consumed = (self.pos as usize).min(self.carry.len());
        self.carry.drain(..consumed);
        self.pos -= consumed as f64;
        out
    }
}

// ---------------------------------------------------------------------------
// DeviceConverter
// ---------------------------------------------------------------------------

/// Downmix → resample → quantise for one device stream.
#[derive(Debug)]
pub struct DeviceConverter {
    channels: u16,
    resampler: StreamResampler,
}

impl DeviceConverter {
    pub fn new(source_rate: u32, channels: u16) -> Self {
        Self {
            channels,
            resampler: StreamResampler::new(source_rate),
        }
    }

    /// Convert one callback's worth of interleaved `f32` samples.
    pub fn process(&mut self, interleaved: &[f32]) -> Vec<i16> {
        let mono = stereo_to_mono(interleaved, self.channels);
        self.resampler
            .process(&mono)
            .into_iter()
            .map(f32_to_i16)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
