//! Minimal console client: connect to a live session endpoint, stream the
//! microphone, and print session events until the channel closes.
//!
//! ```sh
//! VOXLINK_ENDPOINT=wss://host/v1/live VOXLINK_API_KEY=... \
//!     cargo run --example live_console
//! ```

use anyhow::{Context, Result};
use voxlink_lib::SessionConfig;
use voxlink_lib::session::{LiveSession, SessionEvent};
use voxlink_lib::transport::ConnectionConfig;

#[tokio::main]
async fn main() -> Result<()> {
    voxlink_lib::utils::logging::init_logging();

    let endpoint = std::env::var("VOXLINK_ENDPOINT").context("VOXLINK_ENDPOINT not set")?;
    let api_key = std::env::var("VOXLINK_API_KEY").context("VOXLINK_API_KEY not set")?;

    let config = SessionConfig::default();
    let connection = ConnectionConfig::new(endpoint, config.capture_sample_rate);

    let mut session = LiveSession::new(config);
    let mut events = session.events();

    session.connect(&api_key, connection).await?;
    println!("Connected. Ctrl-C to hang up.");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::Disconnected) => {
                    println!("Session closed.");
                    break;
                }
                Ok(event) => println!("{:?}", event),
                Err(_) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                session.disconnect().await;
            }
        }
    }

    Ok(())
}
