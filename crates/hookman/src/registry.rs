//! Subscription registry: topic handlers and the topics being listened to.
//!
//! The registry holds one [`HandlerSet`] per topic, and an entry exists
//! exactly while the service is delivering that topic to us. Creating an
//! entry is reported as [`Subscribed::NewSubscription`] and deleting one as
//! [`Unsubscribed::LastUnsubscribed`]; the caller must answer those with a
//! `listen` and an `unlisten` command respectively. The registry itself
//! never talks to the network.

use std::collections::HashMap;

use serde_json::Value;

use crate::handler::{FanOut, Handler, HandlerSet};

/// Handler for payloads published on a topic.
pub type TopicHandler = Handler<Value>;

/// Errors raised when the registry's own invariant is broken.
///
/// Reaching one of these means a bug, not bad input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A topic entry exists with no handlers in it.
    #[error("internal: topic '{0}' has an entry but no handlers")]
    EmptyEntry(String),
}

/// Outcome of [`SubscriptionRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscribed {
    /// The topic had no entry. Send `listen`.
    NewSubscription,
    /// The handler joined an existing subscription.
    Added,
    /// The handler was already subscribed. Nothing changed.
    AlreadyRegistered,
}

/// Outcome of [`SubscriptionRegistry::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unsubscribed {
    /// The last handler left and the entry is gone. Send `unlisten`.
    LastUnsubscribed,
    /// The handler left; others remain.
    Removed,
    /// The topic is subscribed but not by this handler.
    HandlerNotRegistered,
    /// The topic has no entry.
    NotSubscribed,
}

/// Where an inbound topic payload should go.
pub enum Routing {
    /// The topic is subscribed; run this fan-out.
    Topic(FanOut<Value>),
    /// Nobody subscribed to the topic. The payload is handed back so it
    /// can go to `message` listeners instead.
    Unrouted(Value),
}

/// Topic name → handlers, for every topic with an active subscription.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    topics: HashMap<String, HandlerSet<Value>>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `handler` to `topic`, creating the entry if needed.
    pub fn subscribe(
        &mut self,
        topic: &str,
        handler: &TopicHandler,
    ) -> Result<Subscribed, RegistryError> {
        match self.topics.get_mut(topic) {
            Some(set) if set.is_empty() => Err(RegistryError::EmptyEntry(topic.to_owned())),
            Some(set) => {
                if set.insert(handler) {
                    Ok(Subscribed::Added)
                } else {
                    Ok(Subscribed::AlreadyRegistered)
                }
            }
            None => {
                let mut set = HandlerSet::new();
                set.insert(handler);
                self.topics.insert(topic.to_owned(), set);
                Ok(Subscribed::NewSubscription)
            }
        }
    }

    /// Removes `handler` from `topic`, deleting the entry once it's empty.
    pub fn unsubscribe(
        &mut self,
        topic: &str,
        handler: &TopicHandler,
    ) -> Result<Unsubscribed, RegistryError> {
        let Some(set) = self.topics.get_mut(topic) else {
            return Ok(Unsubscribed::NotSubscribed);
        };
        if set.is_empty() {
            return Err(RegistryError::EmptyEntry(topic.to_owned()));
        }
        if !set.remove(handler) {
            return Ok(Unsubscribed::HandlerNotRegistered);
        }
        if set.is_empty() {
            self.topics.remove(topic);
            return Ok(Unsubscribed::LastUnsubscribed);
        }
        Ok(Unsubscribed::Removed)
    }

    /// Prepares delivery of `payload` to `topic`'s handlers.
    ///
    /// The returned fan-out is a snapshot, so it can run after the
    /// registry is unlocked and handlers may subscribe or unsubscribe
    /// while it does.
    pub fn dispatch(&self, topic: &str, payload: Value) -> Result<Routing, RegistryError> {
        match self.topics.get(topic) {
            None => Ok(Routing::Unrouted(payload)),
            Some(set) if set.is_empty() => Err(RegistryError::EmptyEntry(topic.to_owned())),
            Some(set) => Ok(Routing::Topic(set.fan_out(format!("topic '{topic}'"), payload))),
        }
    }

    /// Drops `topic`'s entry outright. Used to undo a subscription whose
    /// `listen` never made it out.
    pub(crate) fn remove_topic(&mut self, topic: &str) -> bool {
        self.topics.remove(topic).is_some()
    }

    /// Returns `true` if `topic` has an active subscription.
    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    /// Number of handlers on `topic`, 0 if unsubscribed.
    pub fn handler_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, HandlerSet::len)
    }

    /// Subscribed topic names, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn insert_empty_entry(&mut self, topic: &str) {
        self.topics.insert(topic.to_owned(), HandlerSet::new());
    }
}
