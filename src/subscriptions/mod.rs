//! Subscription registry and the types used to register and remove interest.
//!
//! A subscription combines:
//! - a topic matcher (any topic, an exact name, or an unanchored pattern)
//! - an optional type filter, accepting the filter type and its declared subtypes
//! - an arity-tagged handler
//! - an optional weakly held owner
//!
//! Subscriptions whose owner has been dropped are dead. They are never matched
//! again and are purged the next time the registry is touched.

mod registry;
mod types;

pub(crate) use registry::{Subscription, SubscriptionRegistry};
pub use types::{
    Owner, Selector, SubscriptionGuard, SubscriptionHandle, SubscriptionId, TopicMatcher,
    TopicPattern,
};
