//! Prefix subscription filter for SUB sockets.
//!
//! A SUB socket keeps a message only when its first frame (the type tag on
//! the Courier wire) starts with one of the prefixes it subscribed to.

use bytes::Bytes;

/// A subscription entry with topic prefix
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Topic prefix (empty = subscribe to all)
    pub prefix: Bytes,
}

impl Subscription {
    /// Create a new subscription for a topic prefix
    #[must_use]
    pub const fn new(prefix: Bytes) -> Self {
        Self { prefix }
    }

    /// Check if this subscription matches a given topic
    #[must_use]
    pub fn matches(&self, topic: &[u8]) -> bool {
        topic.starts_with(&self.prefix)
    }
}

/// Sorted set of subscribed prefixes.
///
/// Kept sorted so that matching can stop as soon as a prefix sorts after the
/// topic (it can no longer be a prefix of it).
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    /// Create a new empty subscription set
    #[must_use]
    pub const fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
        }
    }

    /// Add a subscription. Duplicates are ignored.
    pub fn subscribe(&mut self, prefix: Bytes) {
        if let Err(idx) = self
            .subscriptions
            .binary_search_by(|s| s.prefix.cmp(&prefix))
        {
            self.subscriptions.insert(idx, Subscription::new(prefix));
        }
    }

    /// Remove a subscription
    pub fn unsubscribe(&mut self, prefix: &[u8]) {
        if let Ok(idx) = self
            .subscriptions
            .binary_search_by(|s| s.prefix.as_ref().cmp(prefix))
        {
            self.subscriptions.remove(idx);
        }
    }

    /// Check if a topic matches any subscription.
    ///
    /// No subscriptions means nothing is delivered.
    #[must_use]
    pub fn matches(&self, topic: &[u8]) -> bool {
        for sub in &self.subscriptions {
            if sub.prefix.as_ref() > topic {
                break;
            }
            if sub.matches(topic) {
                return true;
            }
        }
        false
    }

    /// Get all subscriptions
    #[must_use]
    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    /// Check if there are no subscriptions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Get the number of subscriptions
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Clear all subscriptions
    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }
}
