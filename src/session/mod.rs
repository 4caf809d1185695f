//! Connection side: websocket loop and the capture lifecycle it drives.
//!
//! # Architecture
//!
//! ```text
//! Streamer::run(shutdown)
//!        │ connect_async(url)
//!        ▼
//! drive(socket, ConnectionLifecycle, shutdown)   ← owns the socket
//!        │
//!        ├─ on_open   → CaptureSource::open  → FrameReceiver
//!        ├─ frame     → Message::Binary
//!        └─ close     → on_close → CaptureStream::stop
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use meet_audio_client::audio::CpalCapture;
//! use meet_audio_client::session::Streamer;
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! let summary = rt
//!     .block_on(
//!         Streamer::new("ws://localhost:3000/audio", CpalCapture::new(None))
//!             .run(std::future::pending()),
//!     )
//!     .unwrap();
//! println!("{summary:?}");
//! ```

pub mod lifecycle;
pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use lifecycle::{ConnectionLifecycle, LifecycleError};
pub use runner::{drive, ClosedBy, SessionError, SessionSummary, Streamer};
pub use state::SessionState;
