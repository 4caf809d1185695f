//! Capture-stream lifecycle states.
//!
//! The state machine has no timers and no error-driven transitions; it
//! moves only on the connection's open and close events:
//!
//! ```text
//! NotStarted ──socket open──▶ Streaming ──socket close──▶ Stopped
//! NotStarted ──socket close─────────────────────────────▶ Stopped
//! ```

/// Status of the capture stream owned by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// The socket has not opened yet; no device is held.
    #[default]
    NotStarted,

    /// Capture is running and frames are being forwarded.
    Streaming,

    /// The socket closed and the capture stream has been released.
    Stopped,
}

impl SessionState {
    /// Returns `true` only while frames may be produced.
    ///
    /// ```
    /// use meet_audio_client::session::SessionState;
    ///
    /// assert!(!SessionState::NotStarted.is_streaming());
    /// assert!(SessionState::Streaming.is_streaming());
    /// assert!(!SessionState::Stopped.is_streaming());
    /// ```
    pub fn is_streaming(&self) -> bool {
        matches!(self, SessionState::Streaming)
    }

    /// Short label for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::NotStarted => "not-started",
            SessionState::Streaming => "streaming",
            SessionState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
