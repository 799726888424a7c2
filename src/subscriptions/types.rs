//! Subscription types: identifiers, topic matchers, owners, removal
//! selectors and handles.

use crate::error::Result;
use crate::types::MessageType;
use regex::Regex;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, Weak};

use super::registry::SubscriptionRegistry;

/// Unique identifier for a subscription within one broker.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscription-{}", self.0)
    }
}

/// A compiled topic pattern.
///
/// Matching is unanchored: the pattern may match anywhere in the topic.
/// Two patterns are the same key when they share the compiled instance or
/// have identical source text.
#[derive(Clone)]
pub struct TopicPattern(Arc<Regex>);

impl TopicPattern {
    /// Compile `pattern`. Fails immediately on malformed input.
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self(Arc::new(Regex::new(pattern)?)))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_match(&self, topic: &str) -> bool {
        self.0.is_match(topic)
    }
}

impl From<Regex> for TopicPattern {
    fn from(regex: Regex) -> Self {
        Self(Arc::new(regex))
    }
}

impl PartialEq for TopicPattern {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.as_str() == other.as_str()
    }
}

impl Eq for TopicPattern {}

impl fmt::Debug for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TopicPattern({:?})", self.as_str())
    }
}

/// Decides whether a published topic qualifies.
///
/// A subscription made with no name or no pattern is represented as
/// [`TopicMatcher::Any`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TopicMatcher {
    /// Every topic, including none.
    Any,
    /// Exactly this topic string.
    Named(Arc<str>),
    /// Any topic the pattern matches. Never a publish without a topic.
    Pattern(TopicPattern),
}

impl TopicMatcher {
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        TopicMatcher::Named(name.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self> {
        Ok(TopicMatcher::Pattern(TopicPattern::new(pattern)?))
    }

    /// Named matcher, or `Any` when there is no name.
    pub fn from_name(name: Option<&str>) -> Self {
        name.map_or(TopicMatcher::Any, |n| TopicMatcher::named(n))
    }

    pub fn accepts(&self, topic: Option<&str>) -> bool {
        match self {
            TopicMatcher::Any => true,
            TopicMatcher::Named(name) => topic == Some(&**name),
            TopicMatcher::Pattern(pattern) => topic.is_some_and(|t| pattern.is_match(t)),
        }
    }
}

impl From<&str> for TopicMatcher {
    fn from(name: &str) -> Self {
        TopicMatcher::named(name)
    }
}

impl From<String> for TopicMatcher {
    fn from(name: String) -> Self {
        TopicMatcher::named(name)
    }
}

impl From<TopicPattern> for TopicMatcher {
    fn from(pattern: TopicPattern) -> Self {
        TopicMatcher::Pattern(pattern)
    }
}

/// The object a subscription belongs to.
///
/// Held weakly: once every `Arc` to the owner is dropped the subscription
/// is dead and is purged on the next registry operation. An anonymous
/// owner never dies; its subscriptions live until removed explicitly.
#[derive(Clone, Default)]
pub struct Owner(Option<WeakOwner>);

impl Owner {
    /// Owned by `subscriber`, without keeping it alive.
    pub fn of<S: Any + Send + Sync>(subscriber: &Arc<S>) -> Self {
        Owner(Some(downgrade(subscriber)))
    }

    /// No owner.
    pub fn anonymous() -> Self {
        Owner(None)
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.is_none()
    }

    /// Whether the owner has been dropped. Anonymous owners never are.
    pub fn is_dead(&self) -> bool {
        self.0.as_ref().is_some_and(|w| w.strong_count() == 0)
    }

    /// Whether both this owner and `other` are alive and the same instance.
    pub(crate) fn is(&self, other: &WeakOwner) -> bool {
        match &self.0 {
            Some(weak) => {
                weak.strong_count() > 0 && other.strong_count() > 0 && Weak::ptr_eq(weak, other)
            }
            None => false,
        }
    }
}

impl<S: Any + Send + Sync> From<&Arc<S>> for Owner {
    fn from(subscriber: &Arc<S>) -> Self {
        Owner::of(subscriber)
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            None => f.write_str("Owner(anonymous)"),
            Some(w) if w.strong_count() == 0 => f.write_str("Owner(dead)"),
            Some(w) => write!(f, "Owner({:p})", w.as_ptr() as *const ()),
        }
    }
}

type WeakOwner = Weak<dyn Any + Send + Sync>;

/// Downgrade with `S` fixed, then unsize the result.
fn downgrade<S: Any + Send + Sync>(subscriber: &Arc<S>) -> WeakOwner {
    Arc::<S>::downgrade(subscriber)
}

/// Topic criterion of a [`Selector`].
#[derive(Clone, Debug)]
enum TopicKey {
    Named(String),
    Pattern(TopicPattern),
}

/// Selects the subscriptions of one owner for bulk removal.
///
/// Criteria combine: every one that is set must hold. Type criteria compare
/// the subscription's type filter for equality, not assignability.
///
/// The owner is held weakly. Once it is dropped the selector matches
/// nothing, even if a new object is allocated at the same address.
///
/// A subscription made without a topic name accepts every topic and is
/// stored as [`TopicMatcher::Any`]. [`topic`] and [`pattern`] never select
/// such a subscription; select it by owner (and type) alone.
///
/// [`topic`]: Selector::topic
/// [`pattern`]: Selector::pattern
///
/// ```ignore
/// broker.unsubscribe_where(&Selector::owner(&me).topic("orders").of_type::<Order>());
/// ```
#[derive(Clone)]
pub struct Selector {
    owner: WeakOwner,
    type_filter: Option<Option<TypeId>>,
    topic: Option<TopicKey>,
}

impl Selector {
    /// Every live subscription owned by `subscriber`.
    pub fn owner<S: Any + Send + Sync>(subscriber: &Arc<S>) -> Self {
        Self {
            owner: downgrade(subscriber),
            type_filter: None,
            topic: None,
        }
    }

    /// Only subscriptions filtered on exactly `T`.
    pub fn of_type<T: Any>(self) -> Self {
        self.with_type_id(Some(TypeId::of::<T>()))
    }

    /// Only subscriptions filtered on exactly `message_type`.
    pub fn of_message_type(self, message_type: &MessageType) -> Self {
        self.with_type_id(Some(message_type.id()))
    }

    /// Only subscriptions without a type filter.
    pub fn untyped(self) -> Self {
        self.with_type_id(None)
    }

    /// Only subscriptions on exactly this named topic.
    pub fn topic(mut self, name: impl Into<String>) -> Self {
        self.topic = Some(TopicKey::Named(name.into()));
        self
    }

    /// Only pattern subscriptions on the same pattern.
    pub fn pattern(mut self, pattern: &TopicPattern) -> Self {
        self.topic = Some(TopicKey::Pattern(pattern.clone()));
        self
    }

    fn with_type_id(mut self, id: Option<TypeId>) -> Self {
        self.type_filter = Some(id);
        self
    }

    pub(crate) fn matches(
        &self,
        owner: &Owner,
        type_filter: Option<&MessageType>,
        matcher: &TopicMatcher,
    ) -> bool {
        if !owner.is(&self.owner) {
            return false;
        }

        if let Some(expected) = self.type_filter {
            if type_filter.map(MessageType::id) != expected {
                return false;
            }
        }

        match (&self.topic, matcher) {
            (None, _) => true,
            (Some(TopicKey::Named(name)), TopicMatcher::Named(n)) => name.as_str() == &**n,
            (Some(TopicKey::Pattern(pattern)), TopicMatcher::Pattern(p)) => pattern == p,
            _ => false,
        }
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector")
            .field("owner", &format_args!("{:p}", self.owner.as_ptr() as *const ()))
            .field("typed", &self.type_filter.map(|t| t.is_some()))
            .field("topic", &self.topic)
            .finish()
    }
}

/// Handle to a single subscription.
///
/// Dropping the handle does not unsubscribe; use [`unsubscribe`] or turn
/// it into a [`SubscriptionGuard`]. Unsubscribing twice is a no-op.
///
/// [`unsubscribe`]: SubscriptionHandle::unsubscribe
#[derive(Clone)]
pub struct SubscriptionHandle {
    pub(crate) id: SubscriptionId,
    pub(crate) registry: Weak<SubscriptionRegistry>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove this exact subscription. Returns whether it was still registered.
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(self.id),
            None => false,
        }
    }

    /// Whether the subscription is registered and its owner is alive.
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.is_alive(self.id))
    }

    /// Unsubscribe automatically when the returned guard is dropped.
    pub fn into_guard(self) -> SubscriptionGuard {
        SubscriptionGuard(self)
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SubscriptionHandle").field(&self.id).finish()
    }
}

/// Unsubscribes its subscription on drop.
#[derive(Debug)]
pub struct SubscriptionGuard(SubscriptionHandle);

impl SubscriptionGuard {
    pub fn id(&self) -> SubscriptionId {
        self.0.id
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.0.unsubscribe();
    }
}
