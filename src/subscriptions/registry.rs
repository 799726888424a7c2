//! Subscription registry: the ordered, mutex-guarded set of subscriptions.

use crate::handler::{Handler, HandlerResult};
use crate::types::{MessageType, Payload};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::types::{Owner, Selector, SubscriptionId, TopicMatcher};

/// A single registered interest.
pub(crate) struct Subscription {
    id: SubscriptionId,
    matcher: TopicMatcher,
    /// `None` accepts any published type, including no payload.
    type_filter: Option<MessageType>,
    handler: Handler,
    owner: Owner,
}

impl Subscription {
    pub(crate) fn new(
        matcher: TopicMatcher,
        type_filter: Option<MessageType>,
        handler: Handler,
        owner: Owner,
    ) -> Self {
        Self {
            id: SubscriptionId(0),
            matcher,
            type_filter,
            handler,
            owner,
        }
    }

    pub(crate) fn id(&self) -> SubscriptionId {
        self.id
    }

    pub(crate) fn is_dead(&self) -> bool {
        self.owner.is_dead()
    }

    fn accepts_type(&self, published: Option<&MessageType>) -> bool {
        match (&self.type_filter, published) {
            (None, _) => true,
            (Some(filter), Some(published)) => filter.accepts(published),
            (Some(_), None) => false,
        }
    }

    /// Check if this subscription matches a publish of `topic` with a payload
    /// of type `published`. Both filters must accept.
    pub(crate) fn matches(&self, topic: Option<&str>, published: Option<&MessageType>) -> bool {
        self.accepts_type(published) && self.matcher.accepts(topic)
    }

    fn selected_by(&self, selector: &Selector) -> bool {
        selector.matches(&self.owner, self.type_filter.as_ref(), &self.matcher)
    }

    pub(crate) fn invoke(&self, payload: Option<Payload<'_>>) -> HandlerResult {
        self.handler.call(payload)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("matcher", &self.matcher)
            .field("type_filter", &self.type_filter)
            .field("handler", &self.handler)
            .field("owner", &self.owner)
            .finish()
    }
}

/// Ordered collection of subscriptions.
///
/// Every structural change, and the read-then-copy of a snapshot, happens
/// under one mutex. Handlers are never called while it is held.
pub(crate) struct SubscriptionRegistry {
    /// Subscriptions in subscribe order.
    entries: Mutex<Vec<Arc<Subscription>>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
    /// Broker label for log events.
    label: Arc<str>,
}

impl SubscriptionRegistry {
    #[cfg(test)]
    pub(crate) fn new() -> Self {
        Self::with_capacity("test", 0)
    }

    pub(crate) fn with_capacity(label: impl Into<Arc<str>>, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::with_capacity(capacity)),
            next_id: AtomicU64::new(1),
            label: label.into(),
        }
    }

    /// Append a subscription and return its id. Does not purge.
    pub(crate) fn add(&self, mut subscription: Subscription) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        subscription.id = id;
        self.entries.lock().push(Arc::new(subscription));
        id
    }

    /// Purge dead entries, then remove the exact subscription `id`.
    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let (retired, removed) = {
            let mut entries = self.entries.lock();
            let mut retired = self.purge(&mut entries);

            let removed = match entries.iter().position(|s| s.id == id) {
                Some(index) => {
                    retired.push(entries.remove(index));
                    true
                }
                None => false,
            };
            (retired, removed)
        };

        // Handlers may own guards that re-enter the registry when dropped
        drop(retired);
        removed
    }

    /// Purge dead entries, then remove every live entry the selector picks.
    /// Returns the number removed by the selector.
    pub(crate) fn remove_where(&self, selector: &Selector) -> usize {
        let (retired, removed) = {
            let mut entries = self.entries.lock();
            let mut retired = self.purge(&mut entries);

            let (selected, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *entries)
                .into_iter()
                .partition(|s| s.selected_by(selector));
            *entries = kept;

            let removed = selected.len();
            retired.extend(selected);
            (retired, removed)
        };

        drop(retired);
        removed
    }

    /// Purge dead entries, then copy every entry matching `topic` and
    /// `published`, in subscribe order.
    pub(crate) fn snapshot(
        &self,
        topic: Option<&str>,
        published: Option<&MessageType>,
    ) -> Vec<Arc<Subscription>> {
        let (retired, matched) = {
            let mut entries = self.entries.lock();
            let retired = self.purge(&mut entries);

            let matched: Vec<_> = entries
                .iter()
                .filter(|s| s.matches(topic, published))
                .cloned()
                .collect();
            (retired, matched)
        };

        drop(retired);
        matched
    }

    /// Purge dead entries. Returns how many were dropped.
    pub(crate) fn prune(&self) -> usize {
        let retired = {
            let mut entries = self.entries.lock();
            self.purge(&mut entries)
        };
        retired.len()
    }

    /// Whether `id` is registered and not dead.
    pub(crate) fn is_alive(&self, id: SubscriptionId) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|s| s.id == id && !s.is_dead())
    }

    /// Number of registered entries, dead ones included until purged.
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Detach dead entries. The caller drops them once the lock is released.
    fn purge(&self, entries: &mut Vec<Arc<Subscription>>) -> Vec<Arc<Subscription>> {
        if !entries.iter().any(|s| s.is_dead()) {
            return Vec::new();
        }

        let (dead, live): (Vec<_>, Vec<_>) =
            std::mem::take(entries).into_iter().partition(|s| s.is_dead());
        *entries = live;

        debug!(broker = %self.label, purged = dead.len(), "Purged dead subscriptions");
        dead
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("label", &self.label)
            .field("len", &self.len())
            .finish()
    }
}
