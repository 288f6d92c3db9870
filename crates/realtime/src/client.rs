//! WebSocket client for the notification server.
//!
//! [`ChannelClient`] holds the endpoint and the routing identity of one
//! session. Call [`ChannelClient::connect`] to establish a live
//! [`ChannelConnection`].

use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::identity::RoutingIdentity;

/// Connection settings for one session.
pub struct ChannelClient {
    ws_url: String,
    identity: RoutingIdentity,
}

/// A live WebSocket connection to the notification server.
pub struct ChannelConnection {
    /// Unique id sent during the handshake, distinct per connection attempt.
    pub client_id: String,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl ChannelClient {
    pub fn new(ws_url: impl Into<String>, identity: RoutingIdentity) -> Self {
        Self {
            ws_url: ws_url.into(),
            identity,
        }
    }

    pub fn identity(&self) -> &RoutingIdentity {
        &self.identity
    }

    /// The handshake URL: the endpoint plus `user_id`, `company_id` and
    /// `client_id` query parameters the server routes by.
    pub fn connect_url(&self, client_id: &str) -> String {
        let separator = if self.ws_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}user_id={}&company_id={}&client_id={}",
            self.ws_url,
            separator,
            self.identity.key(),
            self.identity.company_id(),
            client_id,
        )
    }

    /// Connect to the notification server.
    pub async fn connect(&self) -> Result<ChannelConnection, ClientError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let url = self.connect_url(&client_id);

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            ClientError::Connection(format!(
                "Failed to connect to notification server at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(
            identity = %self.identity.key(),
            company_id = self.identity.company_id(),
            client_id = %client_id,
            "Connected to notification server at {}",
            self.ws_url,
        );

        Ok(ChannelConnection {
            client_id,
            ws_stream,
        })
    }
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{SessionClaims, SessionSubject};

    fn identity() -> RoutingIdentity {
        RoutingIdentity::from_claims(&SessionClaims {
            sub: SessionSubject {
                role: "light_admin".into(),
                id: 8,
                company_id: 21,
            },
        })
        .unwrap()
    }

    #[test]
    fn connect_url_carries_routing_parameters() {
        let client = ChannelClient::new("ws://localhost:5000/ws", identity());
        assert_eq!(
            client.connect_url("abc"),
            "ws://localhost:5000/ws?user_id=light_admin_8&company_id=21&client_id=abc"
        );
    }

    #[test]
    fn connect_url_extends_existing_query() {
        let client = ChannelClient::new("wss://hr.example.com/ws?v=2", identity());
        assert_eq!(
            client.connect_url("abc"),
            "wss://hr.example.com/ws?v=2&user_id=light_admin_8&company_id=21&client_id=abc"
        );
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let client = ChannelClient::new("ws://127.0.0.1:1/ws", identity());
        let result = client.connect().await;
        assert!(matches!(result, Err(ClientError::Connection(_))));
    }
}
