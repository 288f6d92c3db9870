//! `hrms-listener` -- follows the notification channel for one session.
//!
//! Resolves the routing identity from a session token, opens the real-time
//! channel and logs every event pushed to that identity until interrupted.
//! Useful for checking server-side routing without a browser.
//!
//! # Environment variables
//!
//! | Variable                      | Required | Default | Description                              |
//! |-------------------------------|----------|---------|------------------------------------------|
//! | `REALTIME_WS_URL`             | yes      | --      | WebSocket endpoint, e.g. `ws://host:5000/ws` |
//! | `SESSION_TOKEN`               | yes      | --      | Session token issued by the auth service |
//! | `REALTIME_RECONNECT_ATTEMPTS` | no       | `5`     | Retries after a dropped connection       |
//! | `REALTIME_RECONNECT_DELAY_MS` | no       | `1000`  | Fixed delay between retries              |
//! | `RUST_LOG`                    | no       | `hrms_listener=info,hrms_realtime=info` | Log filter |

use anyhow::Context;
use hrms_realtime::{ChannelConfig, RealtimeChannel, RealtimeEvent};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hrms_listener=info,hrms_realtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ChannelConfig::from_env()?;
    let token = std::env::var("SESSION_TOKEN").context("SESSION_TOKEN must be set")?;

    tracing::info!(
        ws_url = %config.ws_url,
        reconnect_attempts = config.reconnect_attempts,
        reconnect_delay_ms = config.reconnect_delay_ms,
        "Starting hrms-listener",
    );

    let channel = RealtimeChannel::new(config);
    let Some(handle) = channel.connect(&token).await else {
        anyhow::bail!("session token does not resolve to a routable identity");
    };
    let mut events = handle.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, closing channel");
                break;
            }
            event = events.recv() => match event {
                Some(RealtimeEvent::Server(event)) => {
                    tracing::info!(
                        event = %event.event,
                        data = %event.data,
                        staleness = channel.staleness(),
                        "Server event",
                    );
                }
                Some(RealtimeEvent::Connected { identity }) => {
                    tracing::info!(identity = %identity, "Listening");
                }
                Some(RealtimeEvent::Disconnected) => {
                    tracing::warn!(state = ?channel.state(), "Connection lost");
                }
                Some(RealtimeEvent::ConnectionFailed { error }) => {
                    tracing::warn!(error = %error, "Live updates unavailable");
                }
                None => break,
            },
        }
    }

    channel.disconnect().await;
    Ok(())
}
