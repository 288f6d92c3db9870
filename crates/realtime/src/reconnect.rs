//! Bounded, fixed-delay reconnection.
//!
//! When the connection drops, the channel calls [`reconnect_loop`], which
//! waits a fixed delay before each attempt and gives up after
//! [`ReconnectConfig::max_attempts`] failures or when the
//! [`CancellationToken`] is triggered.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::{ChannelClient, ChannelConnection};

/// Retry budget and spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Attempts before giving up. Zero disables reconnection.
    pub max_attempts: u32,
    /// Delay before every attempt.
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

/// How a reconnection run ended.
pub enum ReconnectOutcome {
    Connected(ChannelConnection),
    /// Every attempt failed.
    Exhausted,
    Cancelled,
}

/// Try to reconnect up to `config.max_attempts` times.
pub async fn reconnect_loop(
    client: &ChannelClient,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
) -> ReconnectOutcome {
    for attempt in 1..=config.max_attempts {
        tokio::select! {
            _ = cancel.cancelled() => return ReconnectOutcome::Cancelled,
            _ = tokio::time::sleep(config.delay) => {}
        }

        tracing::info!(
            identity = %client.identity().key(),
            attempt,
            max_attempts = config.max_attempts,
            "Reconnecting to notification server",
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(identity = %client.identity().key(), "Reconnect cancelled");
                return ReconnectOutcome::Cancelled;
            }
            result = client.connect() => {
                match result {
                    Ok(conn) => {
                        tracing::info!(
                            identity = %client.identity().key(),
                            attempt,
                            "Reconnected to notification server",
                        );
                        return ReconnectOutcome::Connected(conn);
                    }
                    Err(e) => {
                        tracing::warn!(
                            identity = %client.identity().key(),
                            error = %e,
                            "Reconnect attempt {attempt} failed",
                        );
                    }
                }
            }
        }
    }

    tracing::warn!(
        identity = %client.identity().key(),
        max_attempts = config.max_attempts,
        "Giving up on the notification server",
    );
    ReconnectOutcome::Exhausted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{RoutingIdentity, SessionClaims, SessionSubject};

    fn unreachable_client() -> ChannelClient {
        let identity = RoutingIdentity::from_claims(&SessionClaims {
            sub: SessionSubject {
                role: "employee".into(),
                id: 1,
                company_id: 1,
            },
        })
        .unwrap();
        ChannelClient::new("ws://127.0.0.1:1/ws", identity)
    }

    #[test]
    fn default_policy() {
        let config = ReconnectConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.delay, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn cancellation_token_stops_reconnect() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = reconnect_loop(&unreachable_client(), &ReconnectConfig::default(), &cancel).await;
        assert!(matches!(result, ReconnectOutcome::Cancelled));
    }

    #[tokio::test]
    async fn zero_attempts_is_exhausted_immediately() {
        let config = ReconnectConfig {
            max_attempts: 0,
            delay: Duration::from_secs(60),
        };
        let result = reconnect_loop(&unreachable_client(), &config, &CancellationToken::new()).await;
        assert!(matches!(result, ReconnectOutcome::Exhausted));
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let config = ReconnectConfig {
            max_attempts: 2,
            delay: Duration::from_millis(10),
        };
        let result = reconnect_loop(&unreachable_client(), &config, &CancellationToken::new()).await;
        assert!(matches!(result, ReconnectOutcome::Exhausted));
    }
}
