//! Main Broker struct tying the registry, handlers and type registry together.

use crate::error::{BrokerError, Result};
use crate::handler::{Handler, HandlerOutput};
use crate::subscriptions::{
    Owner, Selector, Subscription, SubscriptionHandle, SubscriptionRegistry, TopicMatcher,
};
use crate::types::{DynPayload, MessageType, Payload};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};

/// Broker configuration.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    /// Name attached to every log event from this broker.
    pub label: String,

    /// Initial registry capacity (number of subscriptions).
    pub initial_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            label: "default".to_string(),
            initial_capacity: 64,
        }
    }
}

/// An in-process publish/subscribe broker.
///
/// Publishing is synchronous: matching handlers run on the publishing thread,
/// in subscribe order, after the registry lock has been released. A handler
/// may therefore subscribe, unsubscribe or publish itself.
///
/// The first handler error aborts the rest of that publish call and is
/// returned to the publisher; handlers already run keep their effects.
pub struct Broker {
    /// Broker configuration.
    config: BrokerConfig,

    /// Registered subscriptions. Handles keep a weak reference to it.
    registry: Arc<SubscriptionRegistry>,

    /// Declared type hierarchies, consulted by `publish_object`.
    types: RwLock<HashMap<TypeId, MessageType>>,
}

static GLOBAL: OnceLock<Broker> = OnceLock::new();

impl Broker {
    /// Create a broker with default configuration.
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    /// Create a broker with custom configuration.
    pub fn with_config(config: BrokerConfig) -> Self {
        let registry =
            SubscriptionRegistry::with_capacity(config.label.as_str(), config.initial_capacity);

        Self {
            config,
            registry: Arc::new(registry),
            types: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide shared broker, created on first use.
    pub fn global() -> &'static Broker {
        GLOBAL.get_or_init(|| {
            Broker::with_config(BrokerConfig {
                label: "global".to_string(),
                ..Default::default()
            })
        })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    // --- Type Registry ---

    /// Declare how `message_type` is published by [`publish_object`], so
    /// handlers on its supertypes receive it.
    ///
    /// [`publish_object`]: Broker::publish_object
    pub fn register_type(&self, message_type: MessageType) {
        debug!(
            broker = %self.config.label,
            message_type = message_type.name(),
            ancestors = message_type.ancestor_names().count(),
            "Registered message type"
        );
        self.types.write().insert(message_type.id(), message_type);
    }

    /// The registered identity of `T`, or `T` alone if none was registered.
    pub fn message_type<T: Any + Send + Sync>(&self) -> MessageType {
        self.types
            .read()
            .get(&TypeId::of::<T>())
            .cloned()
            .unwrap_or_else(MessageType::of::<T>)
    }

    // --- Subscribing ---

    /// Register `handler` for publishes accepted by both `matcher` and
    /// `type_filter`. This is the general form the other subscribe methods
    /// build on.
    pub fn subscribe(
        &self,
        owner: impl Into<Owner>,
        matcher: impl Into<TopicMatcher>,
        type_filter: Option<MessageType>,
        handler: Handler,
    ) -> SubscriptionHandle {
        let owner = owner.into();
        let matcher = matcher.into();
        let arity = handler.arity();
        let type_name = type_filter.as_ref().map(MessageType::name);
        let anonymous = owner.is_anonymous();

        let id = self.registry.add(Subscription::new(
            matcher.clone(),
            type_filter,
            handler,
            owner,
        ));

        debug!(
            broker = %self.config.label,
            subscription = %id,
            matcher = ?matcher,
            type_filter = ?type_name,
            arity,
            anonymous,
            "Subscribed"
        );

        SubscriptionHandle {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Receive every payload of type `T` (or a subtype), on any topic.
    pub fn subscribe_type<T, F, R>(
        &self,
        owner: impl Into<Owner>,
        handler: F,
    ) -> SubscriptionHandle
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> R + Send + Sync + 'static,
        R: HandlerOutput,
    {
        self.subscribe(
            owner,
            TopicMatcher::Any,
            Some(MessageType::of::<T>()),
            Handler::typed(handler),
        )
    }

    /// Receive payloads of type `T` published on exactly `topic`.
    pub fn subscribe_topic<T, F, R>(
        &self,
        owner: impl Into<Owner>,
        topic: &str,
        handler: F,
    ) -> SubscriptionHandle
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> R + Send + Sync + 'static,
        R: HandlerOutput,
    {
        self.subscribe(
            owner,
            TopicMatcher::named(topic),
            Some(MessageType::of::<T>()),
            Handler::typed(handler),
        )
    }

    /// Receive payloads of type `T` on any topic matching `pattern`.
    pub fn subscribe_pattern<T, F, R>(
        &self,
        owner: impl Into<Owner>,
        pattern: &str,
        handler: F,
    ) -> Result<SubscriptionHandle>
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> R + Send + Sync + 'static,
        R: HandlerOutput,
    {
        let matcher = TopicMatcher::pattern(pattern)?;
        Ok(self.subscribe(
            owner,
            matcher,
            Some(MessageType::of::<T>()),
            Handler::typed(handler),
        ))
    }

    /// Run `handler` on every publish to exactly `topic`, with or without a
    /// payload.
    pub fn subscribe_signal<F, R>(
        &self,
        owner: impl Into<Owner>,
        topic: &str,
        handler: F,
    ) -> SubscriptionHandle
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: HandlerOutput,
    {
        self.subscribe(
            owner,
            TopicMatcher::named(topic),
            None,
            Handler::nullary(handler),
        )
    }

    /// Run `handler` on every publish to a topic matching `pattern`.
    pub fn subscribe_signal_pattern<F, R>(
        &self,
        owner: impl Into<Owner>,
        pattern: &str,
        handler: F,
    ) -> Result<SubscriptionHandle>
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: HandlerOutput,
    {
        let matcher = TopicMatcher::pattern(pattern)?;
        Ok(self.subscribe(owner, matcher, None, Handler::nullary(handler)))
    }

    /// Receive any payload, whatever its type, on topics accepted by `matcher`.
    /// Publishes without a payload are not delivered.
    pub fn subscribe_dynamic<F, R>(
        &self,
        owner: impl Into<Owner>,
        matcher: impl Into<TopicMatcher>,
        handler: F,
    ) -> SubscriptionHandle
    where
        F: Fn(Payload<'_>) -> R + Send + Sync + 'static,
        R: HandlerOutput,
    {
        self.subscribe(
            owner,
            matcher,
            Some(MessageType::dynamic()),
            Handler::dynamic(handler),
        )
    }

    // --- Unsubscribing ---

    /// Remove the exact subscription behind `handle`. Returns whether it was
    /// still registered with this broker.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let own = handle
            .registry
            .upgrade()
            .is_some_and(|registry| Arc::ptr_eq(&registry, &self.registry));
        if !own {
            return false;
        }

        let removed = self.registry.remove(handle.id);
        if removed {
            debug!(broker = %self.config.label, subscription = %handle.id, "Unsubscribed");
        }
        removed
    }

    /// Remove every subscription owned by `owner`.
    pub fn unsubscribe_owner<S: Any + Send + Sync>(&self, owner: &Arc<S>) -> usize {
        self.unsubscribe_where(&Selector::owner(owner))
    }

    /// Remove every subscription picked by `selector`. Returns the count.
    pub fn unsubscribe_where(&self, selector: &Selector) -> usize {
        let removed = self.registry.remove_where(selector);
        debug!(broker = %self.config.label, ?selector, removed, "Unsubscribed by selector");
        removed
    }

    // --- Publishing ---

    /// Publish a topic without a payload. Reaches only untyped subscriptions.
    pub fn publish(&self, topic: &str) -> Result<()> {
        self.publish_message(Some(topic), None)
    }

    /// Publish `value` as `message_type`, optionally on a topic.
    pub fn publish_typed(
        &self,
        topic: Option<&str>,
        message_type: &MessageType,
        value: &DynPayload,
    ) -> Result<()> {
        self.publish_message(topic, Some(Payload::new(value, message_type)))
    }

    /// Publish `value` without a topic, typed as `T`'s registered identity.
    /// Reaches only subscriptions that accept any topic.
    pub fn publish_object<T: Any + Send + Sync>(&self, value: &T) -> Result<()> {
        let message_type = self.message_type::<T>();
        self.publish_typed(None, &message_type, value)
    }

    /// Publish `value` on `topic`, typed as `T`'s registered identity.
    pub fn publish_object_to<T: Any + Send + Sync>(&self, topic: &str, value: &T) -> Result<()> {
        let message_type = self.message_type::<T>();
        self.publish_typed(Some(topic), &message_type, value)
    }

    /// Deliver to every live subscription accepting `topic` and the payload's
    /// type, in subscribe order.
    ///
    /// The matching set is snapshotted first, so subscriptions removed while
    /// handlers run are still called for this publish.
    pub fn publish_message(
        &self,
        topic: Option<&str>,
        payload: Option<Payload<'_>>,
    ) -> Result<()> {
        let published = payload.map(|p| p.message_type());
        let matched = self.registry.snapshot(topic, published);

        trace!(
            broker = %self.config.label,
            topic,
            message_type = published.map(MessageType::name),
            matched = matched.len(),
            "Publishing"
        );

        for subscription in &matched {
            subscription
                .invoke(payload)
                .map_err(|source| BrokerError::Handler {
                    subscription: subscription.id(),
                    source,
                })?;
        }

        Ok(())
    }

    // --- Introspection ---

    /// Number of registered subscriptions, dead ones included until purged.
    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }

    /// Purge subscriptions whose owner has been dropped. Returns the count.
    pub fn prune(&self) -> usize {
        self.registry.prune()
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}
