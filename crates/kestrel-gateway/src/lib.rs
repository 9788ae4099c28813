//! Single-endpoint client for the caching service: one websocket per server
//! role, many correlated subscriptions multiplexed over it.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod subscriptions;

pub use client::{CacheClient, LiveStream, QueryResult};
pub use config::{EndpointConfig, EndpointProvider, ReconnectPolicy, ServerRole};
pub use connection::{Connection, ConnectionState};
pub use error::GatewayError;
pub use frame::CacheRequest;
pub use subscriptions::{
    Subscription, SubscriptionHandle, SubscriptionId, SubscriptionMessage, SubscriptionState,
};
