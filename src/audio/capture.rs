//! Microphone capture via `cpal`.
//!
//! [`CaptureSource`] is the seam the connection lifecycle opens streams
//! through; [`CpalCapture`] is the production implementation.  Devices that
//! offer 16 kHz mono `i16` are opened as-is; any other device is opened in
//! its default config and converted in the callback by a
//! [`DeviceConverter`].  Each callback is cut into fixed-size
//! [`AudioFrame`]s by a [`BlockAssembler`]
//! and the frames are pushed onto an unbounded tokio channel, so the audio
//! thread never blocks on the network.
//!
//! The [`CaptureStream`] handle returned by [`CaptureSource::open`] must be
//! stopped (or dropped) to release the device.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::Sample;
use thiserror::Error;
use tokio::sync::mpsc;

use super::blocks::BlockAssembler;
use super::convert::DeviceConverter;
use super::format::{AudioFrame, PcmFormat};

/// Producer half of the capture → socket queue.
pub type FrameSender = mpsc::UnboundedSender<AudioFrame>;
/// Consumer half, owned by the socket task.
pub type FrameReceiver = mpsc::UnboundedReceiver<AudioFrame>;

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while acquiring or releasing the input device.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("input device {0:?} not found")]
    DeviceNotFound(String),

    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query supported input configs: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("device {device:?} uses unsupported sample format {sample_format:?}")]
    UnsupportedFormat {
        device: String,
        sample_format: cpal::SampleFormat,
    },

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("failed to stop audio stream: {0}")]
    PauseStream(#[from] cpal::PauseStreamError),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A running capture stream.
pub trait CaptureStream {
    /// Stop capture and release the device.  No frames are delivered after
    /// this returns.
    fn stop(&mut self) -> Result<(), CaptureError>;
}

/// Something that can start delivering [`AudioFrame`]s.
pub trait CaptureSource {
    /// Open and start a stream in `format`, sending every complete block to
    /// `tx` in capture order.
    ///
    /// Capture begins before this returns.
    fn open(
        &self,
        format: PcmFormat,
        tx: FrameSender,
    ) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

// ---------------------------------------------------------------------------
// CpalCapture
// ---------------------------------------------------------------------------

/// Capture from a cpal input device.
///
/// # Example
///
/// ```rust,no_run
/// use meet_audio_client::audio::{CaptureSource, CpalCapture, PcmFormat};
///
/// let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
/// let capture = CpalCapture::new(None);
/// let mut stream = capture.open(PcmFormat::CAPTURE, tx).unwrap();
/// let first = rx.blocking_recv();
/// stream.stop().unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct CpalCapture {
    /// Input device name; `None` means the host default.
    device_name: Option<String>,
}

impl CpalCapture {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    fn select_device(&self) -> Result<cpal::Device, CaptureError> {
        let host = cpal::default_host();

        match &self.device_name {
            None => host.default_input_device().ok_or(CaptureError::NoDevice),
            Some(wanted) => host
                .input_devices()?
                .find(|d| d.name().map(|n| n == *wanted).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceNotFound(wanted.clone())),
        }
    }
}

impl CaptureSource for CpalCapture {
    fn open(
        &self,
        format: PcmFormat,
        tx: FrameSender,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let device = self.select_device()?;
        let device_name = device.name().unwrap_or_else(|_| "<unnamed>".into());

        let stream = match negotiate_buffer_size(&device, format)? {
            Some(buffer_size) => open_native(&device, &device_name, format, buffer_size, tx)?,
            None => open_converted(&device, &device_name, tx)?,
        };

        stream.play()?;
        Ok(Box::new(CpalStream {
            stream: Some(stream),
        }))
    }
}

/// Device speaks the wire format: blocks go out sample for sample.
fn open_native(
    device: &cpal::Device,
    device_name: &str,
    format: PcmFormat,
    buffer_size: cpal::BufferSize,
    tx: FrameSender,
) -> Result<cpal::Stream, CaptureError> {
    let config = format.stream_config(buffer_size);

    log::info!(
        "capture: opening {device_name:?} natively ({} Hz, {} ch, i16, buffer {:?})",
        config.sample_rate.0,
        config.channels,
        config.buffer_size
    );

    let mut blocks = BlockAssembler::new();
    let stream = device.build_input_stream(
        &config,
        move |data: &[i16], _: &cpal::InputCallbackInfo| {
            forward_block(&mut blocks, &tx, data);
        },
        log_stream_error,
        None,
    )?;
    Ok(stream)
}

/// Device only offers some other layout: open its default config and
/// convert to 16 kHz mono `i16` inside the callback.
fn open_converted(
    device: &cpal::Device,
    device_name: &str,
    tx: FrameSender,
) -> Result<cpal::Stream, CaptureError> {
    let supported = device.default_input_config()?;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    log::info!(
        "capture: opening {device_name:?} with conversion ({} Hz, {} ch, {sample_format:?} -> 16 kHz mono i16)",
        config.sample_rate.0,
        config.channels
    );

    match sample_format {
        cpal::SampleFormat::I8 => build_converted::<i8>(device, &config, tx),
        cpal::SampleFormat::I16 => build_converted::<i16>(device, &config, tx),
        cpal::SampleFormat::I32 => build_converted::<i32>(device, &config, tx),
        cpal::SampleFormat::I64 => build_converted::<i64>(device, &config, tx),
        cpal::SampleFormat::U8 => build_converted::<u8>(device, &config, tx),
        cpal::SampleFormat::U16 => build_converted::<u16>(device, &config, tx),
        cpal::SampleFormat::U32 => build_converted::<u32>(device, &config, tx),
        cpal::SampleFormat::U64 => build_converted::<u64>(device, &config, tx),
        cpal::SampleFormat::F32 => build_converted::<f32>(device, &config, tx),
        cpal::SampleFormat::F64 => build_converted::<f64>(device, &config, tx),
        other => Err(CaptureError::UnsupportedFormat {
            device: device_name.to_string(),
            sample_format: other,
        }),
    }
}

fn build_converted<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    tx: FrameSender,
) -> Result<cpal::Stream, CaptureError>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    let mut converter = DeviceConverter::new(config.sample_rate.0, config.channels);
    let mut blocks = BlockAssembler::new();
    let mut scratch: Vec<f32> = Vec::new();

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            scratch.clear();
            scratch.extend(data.iter().map(|&s| s.to_sample::<f32>()));
            let converted = converter.process(&scratch);
            forward_block(&mut blocks, &tx, &converted);
        },
        log_stream_error,
        None,
    )?;
    Ok(stream)
}

/// Body of every capture callback: cut `data` into blocks and queue each
/// complete one.
///
/// Send errors mean the connection has closed and the receiver is gone;
/// they are ignored.
fn forward_block(blocks: &mut BlockAssembler, tx: &FrameSender, data: &[i16]) {
    for frame in blocks.push(data) {
        let _ = tx.send(frame);
    }
}

fn log_stream_error(err: cpal::StreamError) {
    log::error!("cpal stream error: {err}");
}

/// Pick a driver buffer size for `format` on `device`.
///
/// `Ok(None)` when no supported config offers i16 / `channels` /
/// `sample_rate` natively, in which case the caller converts.  Otherwise
/// requests a fixed buffer of one block when the device advertises a range
/// containing it, and the driver default when it does not.
fn negotiate_buffer_size(
    device: &cpal::Device,
    format: PcmFormat,
) -> Result<Option<cpal::BufferSize>, CaptureError> {
    let mut chosen: Option<cpal::BufferSize> = None;

    for range in device.supported_input_configs()? {
        if range.channels() != format.channels
            || range.sample_format() != cpal::SampleFormat::I16
            || range.min_sample_rate().0 > format.sample_rate
            || range.max_sample_rate().0 < format.sample_rate
        {
            continue;
        }

        let size = choose_buffer_size(range.buffer_size(), format.block_size);
        if matches!(size, cpal::BufferSize::Fixed(_)) {
            return Ok(Some(size));
        }
        chosen.get_or_insert(size);
    }

    Ok(chosen)
}

/// `Fixed(block_size)` when `supported` covers it, otherwise `Default`.
fn choose_buffer_size(supported: &cpal::SupportedBufferSize, block_size: usize) -> cpal::BufferSize {
    match supported {
        cpal::SupportedBufferSize::Range { min, max }
            if (*min as usize..=*max as usize).contains(&block_size) =>
        {
            cpal::BufferSize::Fixed(block_size as cpal::FrameCount)
        }
        _ => cpal::BufferSize::Default,
    }
}

// ---------------------------------------------------------------------------
// CpalStream
// ---------------------------------------------------------------------------

/// Owns the live `cpal::Stream`.  Dropping it also stops capture.
struct CpalStream {
    stream: Option<cpal::Stream>,
}

impl CaptureStream for CpalStream {
    fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(stream) = self.stream.take() {
            // The stream is dropped (and the device released) even if pause fails.
            stream.pause()?;
            log::info!("capture: stream stopped");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockCapture (test only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::MockCapture;


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
