//! Websocket event loop. Connects, forwards captured frames, tears down.
//!
//! # Flow
//!
//! ```text
//! connect_async(url)                      ── failure → SessionError::Connect
//!   └─▶ lifecycle.on_open()               ── capture starts   [Streaming]
//!         loop (biased select):
//!           peer Close / end of stream    ── close event
//!           shutdown signal               ── send Close, close event
//!           AudioFrame from capture queue ── Message::Binary (8192 bytes)
//!   └─▶ lifecycle.on_close()              ── capture released [Stopped]
//! ```
//!
//! The socket is owned by this loop alone; the cpal callback only ever
//! touches the frame queue.  Errors are fatal: capture is released and the
//! error is returned to the caller.

use std::borrow::Cow;
use std::future::Future;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio_tungstenite::tungstenite::{
    self,
    protocol::{frame::coding::CloseCode, CloseFrame},
    Message,
};

use crate::audio::CaptureSource;

use super::lifecycle::{ConnectionLifecycle, LifecycleError};

// ---------------------------------------------------------------------------
// SessionError
// ---------------------------------------------------------------------------

/// Everything that ends a session abnormally.  None of these are retried.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("failed to send audio frame: {0}")]
    Send(#[source] tungstenite::Error),

    #[error("websocket read failed: {0}")]
    Receive(#[source] tungstenite::Error),
}

// ---------------------------------------------------------------------------
// SessionSummary
// ---------------------------------------------------------------------------

/// Why the loop returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClosedBy {
    /// The server sent a Close frame.
    Peer {
        code: Option<u16>,
        reason: String,
    },
    /// The connection ended without a Close frame.
    StreamEnded,
    /// The local shutdown signal fired and we sent a Close frame.
    Shutdown,
    /// The capture queue shut down underneath us.
    CaptureEnded,
}

/// What a finished session did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub closed_by: ClosedBy,
}

// ---------------------------------------------------------------------------
// Streamer
// ---------------------------------------------------------------------------

/// Streams one capture session to a websocket backend.
///
/// ```rust,no_run
/// use meet_audio_client::audio::CpalCapture;
/// use meet_audio_client::session::Streamer;
///
/// # async fn example() -> Result<(), meet_audio_client::session::SessionError> {
/// let streamer = Streamer::new("ws://localhost:3000/audio", CpalCapture::new(None));
/// let summary = streamer
///     .run(async {
///         let _ = tokio::signal::ctrl_c().await;
///     })
///     .await?;
/// println!("sent {} frames", summary.frames_sent);
/// # Ok(())
/// # }
/// ```
pub struct Streamer<C> {
    url: String,
    source: C,
}

impl<C: CaptureSource> Streamer<C> {
    pub fn new(url: impl Into<String>, source: C) -> Self {
        Self {
            url: url.into(),
            source,
        }
    }

    /// Connect and stream until the connection closes or `shutdown`
    /// resolves.
    ///
    /// The returned future is not `Send` (cpal streams are not on every
    /// platform); drive it with `Runtime::block_on`.
    pub async fn run<F>(self, shutdown: F) -> Result<SessionSummary, SessionError>
    where
        F: Future<Output = ()>,
    {
        log::info!("session: connecting to {}", self.url);

        let (socket, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|source| SessionError::Connect {
                url: self.url.clone(),
                source,
            })?;

        log::info!("session: connected to {}", self.url);
        drive(socket, ConnectionLifecycle::new(self.source), shutdown).await
    }
}

// ---------------------------------------------------------------------------
// drive
// ---------------------------------------------------------------------------

/// Run one open connection to completion.
///
/// Generic over the socket so it can be exercised against any websocket
/// `Stream + Sink`.  `lifecycle` must be `NotStarted`; the connection is
/// treated as already open.
pub async fn drive<S, C, F>(
    socket: S,
    mut lifecycle: ConnectionLifecycle<C>,
    shutdown: F,
) -> Result<SessionSummary, SessionError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>>
        + Sink<Message, Error = tungstenite::Error>
        + Unpin,
    C: CaptureSource,
    F: Future<Output = ()>,
{
    let (mut sink, mut incoming) = socket.split();
    let mut frames = lifecycle.on_open()?;

    tokio::pin!(shutdown);

    let mut frames_sent: u64 = 0;
    let mut bytes_sent: u64 = 0;

    let outcome: Result<ClosedBy, SessionError> = loop {
        tokio::select! {
            biased;

            msg = incoming.next() => match msg {
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), f.reason.into_owned()),
                        None => (None, String::new()),
                    };
                    log::info!("session: server closed connection (code {code:?}, reason {reason:?})");
                    break Ok(ClosedBy::Peer { code, reason });
                }
                Some(Ok(other)) => {
                    log::debug!("session: ignoring {} byte message from server", other.len());
                }
                Some(Err(e)) => break Err(SessionError::Receive(e)),
                None => {
                    log::info!("session: connection ended without close frame");
                    break Ok(ClosedBy::StreamEnded);
                }
            },

            _ = &mut shutdown => {
                log::info!("session: shutdown requested, closing connection");
                let close = Message::Close(Some(CloseFrame {
                    code: CloseCode::Normal,
                    reason: Cow::Borrowed("client shutdown"),
                }));
                if let Err(e) = sink.send(close).await {
                    log::warn!("session: failed to send close frame: {e}");
                }
                break Ok(ClosedBy::Shutdown);
            }

            frame = frames.recv() => match frame {
                Some(frame) => {
                    let payload = frame.to_le_bytes();
                    let len = payload.len() as u64;
                    if let Err(e) = sink.send(Message::Binary(payload)).await {
                        break Err(SessionError::Send(e));
                    }
                    frames_sent += 1;
                    bytes_sent += len;
                    log::debug!("session: sent frame #{frames_sent} ({len} bytes)");
                }
                None => {
                    log::warn!("session: capture queue closed while connected");
                    let _ = sink.send(Message::Close(None)).await;
                    break Ok(ClosedBy::CaptureEnded);
                }
            },
        }
    };

    // Stop capture before anything else so no further frames are produced;
    // whatever is still queued is dropped unsent.
    let released = lifecycle.on_close();
    drop(frames);

    if let Err(e) = sink.close().await {
        log::debug!("session: socket close: {e}");
    }

    let closed_by = outcome?;
    released?;

    let summary = SessionSummary {
        frames_sent,
        bytes_sent,
        closed_by,
    };
    log::info!(
        "session: finished, {} frames / {} bytes sent ({:?})",
        summary.frames_sent,
        summary.bytes_sent,
        summary.closed_by
    );
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use super::*;
    use crate::audio::{AudioFrame, CaptureError, MockCapture, BLOCK_SIZE, FRAME_BYTES};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    // -----------------------------------------------------------------------
    // Loopback server
    // -----------------------------------------------------------------------

    /// What the server side of a test connection observed.
    #[derive(Debug, Default)]
    struct Received {
        binary: Vec<Vec<u8>>,
        text: usize,
        client_close: Option<Option<u16>>,
    }

    /// How the loopback server behaves after accepting.
    enum ServerPlan {
        /// Read `n` binary frames, then close from the server side.
        CloseAfter(usize),
        /// Read `n` binary frames, fire the client's shutdown, then read on.
        ShutdownAfter(usize, oneshot::Sender<()>),
        /// Drop the TCP connection without a close handshake.
        Vanish,
        /// Read until the client closes; never close first.
        ReadAll,
    }

    async fn spawn_server(plan: ServerPlan) -> (String, tokio::task::JoinHandle<Received>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/audio", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let mut got = Received::default();

            let (threshold, mut trigger) = match plan {
                ServerPlan::Vanish => return got,
                ServerPlan::CloseAfter(n) => (n, None),
                ServerPlan::ReadAll => (usize::MAX, None),
                ServerPlan::ShutdownAfter(n, tx) => (n, Some(tx)),
            };

            if threshold == 0 {
                match trigger.take() {
                    Some(tx) => {
                        let _ = tx.send(());
                    }
                    None => ws.close(Some(server_close_frame())).await.unwrap(),
                }
            }

            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    Message::Binary(data) => {
                        got.binary.push(data);
                        if got.binary.len() == threshold {
                            match trigger.take() {
                                Some(tx) => {
                                    let _ = tx.send(());
                                }
                                None => ws.close(Some(server_close_frame())).await.unwrap(),
                            }
                        }
                    }
                    Message::Text(_) => got.text += 1,
                    Message::Close(frame) => {
                        got.client_close = Some(frame.map(|f| u16::from(f.code)));
                    }
                    _ => {}
                }
            }
            got
        });

        (url, handle)
    }

    fn server_close_frame() -> CloseFrame<'static> {
        CloseFrame {
            code: CloseCode::Normal,
            reason: Cow::Borrowed("done"),
        }
    }

    fn numbered_frame(n: i16) -> AudioFrame {
        AudioFrame::from_samples(vec![n; BLOCK_SIZE]).unwrap()
    }

    // -----------------------------------------------------------------------
    // BrokenSocket
    // -----------------------------------------------------------------------

    /// A connection whose peer is silent and whose every write fails.
    struct BrokenSocket;

    impl Stream for BrokenSocket {
        type Item = Result<Message, tungstenite::Error>;

        fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Poll::Pending
        }
    }

    impl Sink<Message> for BrokenSocket {
        type Error = tungstenite::Error;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), Self::Error> {
            Err(tungstenite::Error::ConnectionClosed)
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    /// N captured blocks → exactly N binary frames, byte-identical, in order.
    #[tokio::test]
    async fn frames_are_forwarded_in_capture_order() {
        let frames: Vec<AudioFrame> = (1..=5).map(numbered_frame).collect();
        let expected: Vec<Vec<u8>> = frames.iter().map(AudioFrame::to_le_bytes).collect();
        let mock = MockCapture::with_frames(frames);

        let (url, server) = spawn_server(ServerPlan::CloseAfter(5)).await;
        let summary = Streamer::new(url, mock.clone())
            .run(std::future::pending())
            .await
            .unwrap();
        let got = server.await.unwrap();

        assert_eq!(got.binary, expected);
        assert!(got.binary.iter().all(|b| b.len() == FRAME_BYTES));
        assert_eq!(got.text, 0);
        assert_eq!(summary.frames_sent, 5);
        assert_eq!(summary.bytes_sent, 5 * FRAME_BYTES as u64);
        assert_eq!(
            summary.closed_by,
            ClosedBy::Peer {
                code: Some(1000),
                reason: "done".into()
            }
        );
    }

    /// open → one all-zero block → one 8192-byte all-zero frame.
    #[tokio::test]
    async fn single_silent_block_becomes_one_zero_frame() {
        let mock = MockCapture::with_frames(vec![AudioFrame::silence()]);

        let (url, server) = spawn_server(ServerPlan::CloseAfter(1)).await;
        let summary = Streamer::new(url, mock)
            .run(std::future::pending())
            .await
            .unwrap();
        let got = server.await.unwrap();

        assert_eq!(got.binary.len(), 1);
        assert_eq!(got.binary[0].len(), 8192);
        assert!(got.binary[0].iter().all(|&b| b == 0));
        assert_eq!(summary.frames_sent, 1);
    }

    /// open → close with nothing captured → zero frames, capture released.
    #[tokio::test]
    async fn close_without_blocks_sends_nothing_and_releases_capture() {
        let mock = MockCapture::new();

        let (url, server) = spawn_server(ServerPlan::CloseAfter(0)).await;
        let summary = Streamer::new(url, mock.clone())
            .run(std::future::pending())
            .await
            .unwrap();
        let got = server.await.unwrap();

        assert!(got.binary.is_empty());
        assert_eq!(summary.frames_sent, 0);
        assert_eq!(mock.opens(), 1);
        assert_eq!(mock.stops(), 1);
        assert!(!mock.is_streaming());
    }

    /// Nothing captured after close reaches the wire.
    #[tokio::test]
    async fn no_frames_after_close() {
        let mock = MockCapture::with_frames(vec![numbered_frame(1), numbered_frame(2)]);

        let (url, server) = spawn_server(ServerPlan::CloseAfter(2)).await;
        Streamer::new(url, mock.clone())
            .run(std::future::pending())
            .await
            .unwrap();

        assert!(!mock.deliver(numbered_frame(3)));
        let got = server.await.unwrap();

        assert_eq!(got.binary.len(), 2);
        assert_eq!(mock.stops(), 1);
    }

    /// The shutdown signal closes the socket with a normal close code.
    #[tokio::test]
    async fn shutdown_sends_normal_close() {
        let (tx, rx) = oneshot::channel();
        let mock = MockCapture::with_frames(vec![numbered_frame(7)]);

        let (url, server) = spawn_server(ServerPlan::ShutdownAfter(1, tx)).await;
        let summary = Streamer::new(url, mock.clone())
            .run(async {
                let _ = rx.await;
            })
            .await
            .unwrap();
        let got = server.await.unwrap();

        assert_eq!(summary.closed_by, ClosedBy::Shutdown);
        assert_eq!(summary.frames_sent, 1);
        assert_eq!(got.client_close, Some(Some(1000)));
        assert_eq!(mock.stops(), 1);
    }

    /// A vanished peer ends the session and still releases capture.
    #[tokio::test]
    async fn dropped_connection_releases_capture() {
        let mock = MockCapture::new();

        let (url, server) = spawn_server(ServerPlan::Vanish).await;
        let result = Streamer::new(url, mock.clone())
            .run(std::future::pending())
            .await;
        server.await.unwrap();

        // Depending on timing the read side reports EOF or a reset.
        match result {
            Ok(summary) => assert_eq!(summary.closed_by, ClosedBy::StreamEnded),
            Err(e) => assert!(matches!(e, SessionError::Receive(_)), "{e}"),
        }
        assert_eq!(mock.stops(), 1);
    }

    /// A failed write is fatal, and capture is still released.
    #[tokio::test]
    async fn send_failure_is_fatal_and_releases_capture() {
        let mock = MockCapture::with_frames(vec![AudioFrame::silence()]);

        let err = drive(
            BrokenSocket,
            ConnectionLifecycle::new(mock.clone()),
            std::future::pending(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SessionError::Send(_)), "{err}");
        assert_eq!(mock.opens(), 1);
        assert_eq!(mock.stops(), 1);
        assert!(!mock.is_streaming());
    }

    /// Capture dying mid-session sends what was queued, then a bare Close.
    #[tokio::test]
    async fn capture_ending_closes_the_connection() {
        let mock = MockCapture::ending_after(vec![numbered_frame(1), numbered_frame(2)]);

        let (url, server) = spawn_server(ServerPlan::ReadAll).await;
        let summary = Streamer::new(url, mock.clone())
            .run(std::future::pending())
            .await
            .unwrap();
        let got = server.await.unwrap();

        assert_eq!(summary.closed_by, ClosedBy::CaptureEnded);
        assert_eq!(summary.frames_sent, 2);
        assert_eq!(got.binary.len(), 2);
        assert_eq!(got.client_close, Some(None));
        assert_eq!(mock.stops(), 1);
    }

    /// Capture errors keep their own message.
    #[test]
    fn lifecycle_errors_display_transparently() {
        let err = SessionError::from(LifecycleError::Capture(CaptureError::NoDevice));
        assert_eq!(
            err.to_string(),
            "no input device found on the default audio host"
        );
    }

    /// A device that cannot be opened fails the session.
    #[tokio::test]
    async fn capture_failure_is_fatal() {
        let (url, _server) = spawn_server(ServerPlan::CloseAfter(1)).await;

        let err = Streamer::new(url, MockCapture::failing())
            .run(std::future::pending())
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Lifecycle(LifecycleError::Capture(_))));
    }

    /// Nobody listening → connect error, capture never opened.
    #[tokio::test]
    async fn connect_failure_is_fatal_and_skips_capture() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mock = MockCapture::new();
        let err = Streamer::new(format!("ws://{addr}/audio"), mock.clone())
            .run(std::future::pending())
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Connect { .. }));
        assert_eq!(mock.opens(), 0);
    }
}
