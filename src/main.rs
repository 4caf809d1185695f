//! Application entry point: microphone → websocket audio client.
//!
//! # Startup sequence
//!
//! 1. Initialise logging (`RUST_LOG`, default `info`).
//! 2. Load [`AppConfig`] from disk (returns default when absent).
//! 3. Create a current-thread [`tokio`] runtime.
//! 4. Connect to the backend; on open start cpal capture and stream frames.
//! 5. Block the main thread until the server closes the connection or
//!    Ctrl-C is pressed.
//!
//! Connect, device and send failures are fatal and end the process with a
//! non-zero exit code.

use anyhow::Context;
use meet_audio_client::{audio::CpalCapture, config::AppConfig, session::Streamer};

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("meet-audio-client starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Tokio runtime. The session future holds the cpal stream, which is
    //    not Send everywhere, so it runs on this thread via block_on.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 4./5. Stream until close
    let capture = CpalCapture::new(config.audio.input_device.clone());
    let streamer = Streamer::new(config.server.url.clone(), capture);

    rt.block_on(streamer.run(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Ctrl-C handler unavailable ({e}); waiting for server close");
            std::future::pending::<()>().await;
        }
    }))?;

    Ok(())
}
