//! Audio side: microphone capture → fixed-size blocks → frame queue.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback (i16, mono, 16 kHz)
//!            │   or any other device format
//!            │   → DeviceConverter (downmix, resample, quantise)
//!            → BlockAssembler (4096-sample blocks)
//!            → AudioFrame (unbounded mpsc) → socket task
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use meet_audio_client::audio::{CaptureSource, CpalCapture, PcmFormat};
//!
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let mut stream = CpalCapture::new(None).open(PcmFormat::CAPTURE, tx).unwrap();
//!
//! while let Some(frame) = rx.blocking_recv() {
//!     println!("{} bytes", frame.to_le_bytes().len());
//! #   break;
//! }
//! stream.stop().unwrap();
//! ```

pub mod blocks;
pub mod capture;
pub mod convert;
pub mod format;

pub use blocks::BlockAssembler;
pub use capture::{
    CaptureError, CaptureSource, CaptureStream, CpalCapture, FrameReceiver, FrameSender,
};
pub use convert::{f32_to_i16, stereo_to_mono, DeviceConverter, StreamResampler};
pub use format::{
    AudioFrame, PcmFormat, BLOCK_SIZE, BYTES_PER_SAMPLE, CHANNELS, FRAME_BYTES, SAMPLE_RATE,
};

#[cfg(test)]
pub use capture::MockCapture;
