//! # Message Broker
//!
//! An in-process publish/subscribe broker. Subscribers register interest in
//! messages by topic, by payload type, or both; publishers push messages that
//! are delivered synchronously to every matching, still-alive subscription.
//!
//! ## Core Concepts
//!
//! - **Topics**: exact names or unanchored regex patterns
//! - **Types**: a subscription's type filter accepts that type and its declared subtypes
//! - **Owners**: subscriptions hold their owner weakly and die with it
//! - **Snapshots**: handlers run outside the registry lock, in subscribe order
//!
//! ## Example
//!
//! ```ignore
//! use msgbus::{Broker, Selector};
//! use std::sync::Arc;
//!
//! let broker = Broker::new();
//! let me = Arc::new(Listener::default());
//!
//! broker.subscribe_topic(&me, "orders", |order: &Order| println!("{order:?}"));
//! broker.subscribe_signal(&me, "shutdown", || println!("bye"));
//! broker.subscribe_pattern(&me, "^audit\\.", |entry: &String| println!("{entry}"))?;
//!
//! broker.publish_object_to("orders", &Order { id: 1 })?;
//! broker.publish("shutdown")?;
//!
//! // Remove one topic, or everything the owner registered
//! broker.unsubscribe_where(&Selector::owner(&me).topic("orders"));
//! broker.unsubscribe_owner(&me);
//! ```

pub mod broker;
pub mod error;
pub mod handler;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use broker::{Broker, BrokerConfig};
pub use error::{BrokerError, Result};
pub use handler::{BoxError, Handler, HandlerOutput, HandlerResult};
pub use subscriptions::{
    Owner, Selector, SubscriptionGuard, SubscriptionHandle, SubscriptionId, TopicMatcher,
    TopicPattern,
};
pub use types::{Derived, DynPayload, MessageType, Payload};
