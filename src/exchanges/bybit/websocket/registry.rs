use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Which of the two streams a topic belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChannelScope {
    Public,
    Private,
}

impl ChannelScope {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

impl fmt::Display for ChannelScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired topics per scope.
///
/// This is the source of truth for resubscription replay and is never
/// cleared by a disconnect.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    topics: RwLock<HashMap<ChannelScope, BTreeSet<String>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the topic was not already present.
    pub fn add(&self, scope: ChannelScope, topic: &str) -> bool {
        self.topics
            .write()
            .entry(scope)
            .or_default()
            .insert(topic.to_string())
    }

    /// Returns `true` if the topic was present.
    pub fn remove(&self, scope: ChannelScope, topic: &str) -> bool {
        self.topics
            .write()
            .get_mut(&scope)
            .is_some_and(|set| set.remove(topic))
    }

    pub fn contains(&self, scope: ChannelScope, topic: &str) -> bool {
        self.topics
            .read()
            .get(&scope)
            .is_some_and(|set| set.contains(topic))
    }

    /// Sorted snapshot of the scope's topics
    pub fn topics(&self, scope: ChannelScope) -> Vec<String> {
        self.topics
            .read()
            .get(&scope)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}
