//! Streams microphone audio to a websocket backend as raw PCM frames.
//!
//! * [`audio`] captures 16 kHz mono `i16` from cpal and cuts it into
//!   4096-sample [`audio::AudioFrame`]s.
//! * [`session`] owns the websocket connection and starts/stops capture on
//!   the connection's open/close events.
//! * [`config`] loads the backend URL and input device from `settings.toml`.

pub mod audio;
pub mod config;
pub mod session;
