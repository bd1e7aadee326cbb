//! Realtime notification client for the crowdfunding front end.
//!
//! A [`RealtimeClient`] keeps one STOMP session over a WebSocket to the broker,
//! lets consumers observe topics (campaign progress, pledge results), routes
//! inbound messages to them and sends commands such as pledge creation.
//!
//! ```no_run
//! use std::sync::Arc;
//! use crowdfund_realtime::{ClientConfig, RealtimeClient, storage::FileTokenStore, topics};
//!
//! # async fn run() -> Result<(), crowdfund_realtime::ClientError> {
//! let client = RealtimeClient::new(ClientConfig::default(), Arc::new(FileTokenStore::new("token")));
//! client.connect().await;
//! let mut state = client.watch_state();
//! let _ = state.wait_for(|s| *s == crowdfund_realtime::ConnectionState::Connected).await;
//! client.subscribe_to_topic(&topics::campaign_progress(42), |event| {
//!     println!("progress: {}", event.payload);
//! })?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod core;
pub mod storage;
pub mod transport;


pub use crate::client::{
    Binding, BindingState, ClientConfig, CloseReason, ConnectionState, DEFAULT_ENDPOINT, Heartbeat,
    RealtimeClient, ReconnectPolicy, SessionInfo,
};
pub use crate::core::topics;
pub use crate::core::{ClientError, CorrelationId, Event, FrameError, SubscriptionId};
