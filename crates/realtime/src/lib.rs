//! Real-time notification channel for the HRMS front-end.
//!
//! One live WebSocket connection per signed-in session, addressed on the
//! server by a routing identity derived from the session token:
//!
//! - [`identity`] -- session token decoding and `{role}_{id}` derivation.
//! - [`config`] -- endpoint and reconnect settings from the environment.
//! - [`client`] -- opens one WebSocket connection for an identity.
//! - [`reconnect`] -- bounded, fixed-delay reconnection.
//! - [`events`] -- server frames and the events fanned out to subscribers.
//! - [`channel`] -- [`RealtimeChannel`], the session-scoped context object
//!   that owns the connection, its state machine and the staleness token.

pub mod channel;
pub mod client;
pub mod config;
pub mod events;
pub mod identity;
pub mod reconnect;

pub use channel::{ChannelHandle, ConnectionState, RealtimeChannel, Subscription};
pub use config::ChannelConfig;
pub use events::{RealtimeEvent, ServerEvent};
pub use identity::{RoutingIdentity, SessionClaims, SessionSubject};
