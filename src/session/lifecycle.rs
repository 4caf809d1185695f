//! Connection lifecycle handler.
//!
//! [`ConnectionLifecycle`] owns the capture source and, while streaming, the
//! capture-stream handle.  The socket loop calls [`on_open`] once the
//! handshake completes and [`on_close`] on every exit path; the handle is
//! released on the close transition and never outlives the connection.
//!
//! [`on_open`]: ConnectionLifecycle::on_open
//! [`on_close`]: ConnectionLifecycle::on_close

use thiserror::Error;
use tokio::sync::mpsc;

use crate::audio::{CaptureError, CaptureSource, CaptureStream, FrameReceiver, PcmFormat};

use super::state::SessionState;

// ---------------------------------------------------------------------------
// LifecycleError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The input device could not be acquired or released.
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// `on_open` was called when the lifecycle had already left `NotStarted`.
    #[error("cannot open capture: session is already {0}")]
    AlreadyOpened(SessionState),
}

// ---------------------------------------------------------------------------
// ConnectionLifecycle
// ---------------------------------------------------------------------------

/// Ties one capture stream to one websocket connection.
pub struct ConnectionLifecycle<C> {
    source: C,
    format: PcmFormat,
    state: SessionState,
    stream: Option<Box<dyn CaptureStream>>,
}

impl<C: CaptureSource> ConnectionLifecycle<C> {
    pub fn new(source: C) -> Self {
        Self {
            source,
            format: PcmFormat::CAPTURE,
            state: SessionState::NotStarted,
            stream: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Socket opened: start capture and hand back the frame queue.
    ///
    /// Capture begins immediately.  Device failures are returned as-is and
    /// leave the lifecycle in `NotStarted`.
    pub fn on_open(&mut self) -> Result<FrameReceiver, LifecycleError> {
        if self.state != SessionState::NotStarted {
            return Err(LifecycleError::AlreadyOpened(self.state));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let stream = self.source.open(self.format, tx)?;

        self.stream = Some(stream);
        self.state = SessionState::Streaming;
        log::info!(
            "session: capture started ({} Hz, {} samples/block)",
            self.format.sample_rate,
            self.format.block_size
        );
        Ok(rx)
    }

    /// Socket closed: stop and release capture.
    ///
    /// Safe to call in any state.  A close without a prior open never
    /// touches the device; it only moves the lifecycle to `Stopped`.
    pub fn on_close(&mut self) -> Result<(), LifecycleError> {
        let previous = std::mem::replace(&mut self.state, SessionState::Stopped);

        match previous {
            SessionState::Streaming => {
                if let Some(mut stream) = self.stream.take() {
                    stream.stop()?;
                }
                log::info!("session: capture released");
            }
            SessionState::NotStarted => {
                log::warn!("session: close received before open; nothing to release");
            }
            SessionState::Stopped => {
                log::debug!("session: close on stopped session ignored");
            }
        }

        Ok(())
    }
}

impl<C> Drop for ConnectionLifecycle<C> {
    fn drop(&mut self) {
        if !self.state.is_streaming() {
            return;
        }
        if let Some(mut stream) = self.stream.take() {
            match stream.stop() {
                Ok(()) => log::info!("session: capture released on drop"),
                Err(e) => log::warn!("session: failed to stop capture on drop: {e}"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
