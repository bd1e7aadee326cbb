//! Topic subscription registry.
//!
//! Local subscriptions are multiplexed over one STOMP subscription per topic: the
//! first local subscriber to a topic produces a `SUBSCRIBE` frame, the last one to
//! leave produces the matching `UNSUBSCRIBE`. The registry only computes frames;
//! sending them is the caller's job.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{Command, Event, Frame, SubscriptionId};

pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct TopicEntry {
    seq: u64,
    transport_id: String,
    handlers: Vec<(SubscriptionId, Handler)>,
}

#[derive(Default)]
pub struct Registry {
    next_local: u64,
    next_transport: u64,
    topics: HashMap<String, TopicEntry>,
    by_local: HashMap<SubscriptionId, String>,
    by_transport: HashMap<String, String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` on `topic`. Returns the new id and, for the first
    /// subscriber of the topic, the `SUBSCRIBE` frame to send.
    pub fn insert(&mut self, topic: &str, handler: Handler) -> (SubscriptionId, Option<Frame>) {
        let id = SubscriptionId(self.next_local);
        self.next_local += 1;
        self.by_local.insert(id, topic.to_string());

        if let Some(entry) = self.topics.get_mut(topic) {
            entry.handlers.push((id, handler));
            return (id, None);
        }

        let seq = self.next_transport;
        self.next_transport += 1;
        let transport_id = format!("sub-{seq}");
        let frame = subscribe_frame(&transport_id, topic);
        self.by_transport.insert(transport_id.clone(), topic.to_string());
        self.topics.insert(
            topic.to_string(),
            TopicEntry {
                seq,
                transport_id,
                handlers: vec![(id, handler)],
            },
        );
        (id, Some(frame))
    }

    /// Removes one subscription. Unknown ids return `None` and change nothing;
    /// otherwise `Some(frame)` where `frame` is the `UNSUBSCRIBE` owed to the broker
    /// if this was the topic's last subscriber.
    pub fn remove(&mut self, id: SubscriptionId) -> Option<Option<Frame>> {
        let topic = self.by_local.remove(&id)?;
        let entry = self.topics.get_mut(&topic)?;
        entry.handlers.retain(|(sid, _)| *sid != id);
        if !entry.handlers.is_empty() {
            return Some(None);
        }
        let entry = self.topics.remove(&topic)?;
        self.by_transport.remove(&entry.transport_id);
        Some(Some(
            Frame::new(Command::Unsubscribe).header("id", entry.transport_id),
        ))
    }

    /// Resolves a `MESSAGE` to its topic, preferring the `subscription` header.
    pub fn topic_for(&self, frame: &Frame) -> Option<&str> {
        if let Some(topic) = frame
            .get("subscription")
            .and_then(|sub| self.by_transport.get(sub))
        {
            return Some(topic.as_str());
        }
        let destination = frame.get("destination")?;
        self.topics
            .get_key_value(destination)
            .map(|(topic, _)| topic.as_str())
    }

    /// Handlers for `topic` in registration order.
    pub fn handlers(&self, topic: &str) -> Vec<(SubscriptionId, Handler)> {
        self.topics
            .get(topic)
            .map(|entry| entry.handlers.clone())
            .unwrap_or_default()
    }

    /// `SUBSCRIBE` frames re-establishing every live topic on a fresh session.
    pub fn resubscribe_frames(&self) -> Vec<Frame> {
        let mut live: Vec<_> = self.topics.iter().collect();
        live.sort_by_key(|(_, entry)| entry.seq);
        live.into_iter()
            .map(|(topic, entry)| subscribe_frame(&entry.transport_id, topic))
            .collect()
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.by_local.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.by_local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_local.is_empty()
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

fn subscribe_frame(transport_id: &str, topic: &str) -> Frame {
    Frame::new(Command::Subscribe)
        .header("id", transport_id)
        .header("destination", topic)
        .header("ack", "auto")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Handler {
        Arc::new(|_: &Event| {})
    }

    #[test]
    fn first_subscriber_subscribes_last_unsubscribes() {
        let mut registry = Registry::new();
        let (a, frame) = registry.insert("/topic/campaign/1/progress", noop());
        let frame = frame.expect("first subscriber sends SUBSCRIBE");
        assert_eq!(frame.command, Command::Subscribe);
        assert_eq!(frame.get("destination"), Some("/topic/campaign/1/progress"));

        let (b, frame) = registry.insert("/topic/campaign/1/progress", noop());
        assert!(frame.is_none());
        assert_ne!(a, b);
        assert_eq!(registry.topic_count(), 1);

        assert_eq!(registry.remove(a), Some(None));
        let unsubscribe = registry.remove(b).flatten().expect("last subscriber sends UNSUBSCRIBE");
        assert_eq!(unsubscribe.command, Command::Unsubscribe);
        assert_eq!(unsubscribe.get("id"), Some("sub-0"));
        assert!(registry.is_empty());
    }

    #[test]
    fn removing_unknown_or_removed_id_is_noop() {
        let mut registry = Registry::new();
        let (a, _) = registry.insert("/topic/x", noop());
        let (_b, _) = registry.insert("/topic/x", noop());
        assert!(registry.remove(a).is_some());
        assert!(registry.remove(a).is_none());
        assert!(registry.remove(SubscriptionId(999)).is_none());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.handlers("/topic/x").len(), 1);
    }

    #[test]
    fn ids_are_not_reused() {
        let mut registry = Registry::new();
        let (a, _) = registry.insert("/topic/x", noop());
        registry.remove(a);
        let (b, frame) = registry.insert("/topic/x", noop());
        assert_ne!(a, b);
        // A new transport subscription too, since the old one was released.
        assert_eq!(frame.unwrap().get("id"), Some("sub-1"));
    }

    #[test]
    fn resolves_topic_by_subscription_then_destination() {
        let mut registry = Registry::new();
        registry.insert("/topic/a", noop());
        registry.insert("/topic/b", noop());

        let by_sub = Frame::new(Command::Message)
            .header("subscription", "sub-1")
            .header("destination", "/topic/a");
        assert_eq!(registry.topic_for(&by_sub), Some("/topic/b"));

        let by_dest = Frame::new(Command::Message).header("destination", "/topic/a");
        assert_eq!(registry.topic_for(&by_dest), Some("/topic/a"));

        let unknown = Frame::new(Command::Message).header("destination", "/topic/c");
        assert_eq!(registry.topic_for(&unknown), None);
    }

    #[test]
    fn resubscribe_covers_live_topics_only() {
        let mut registry = Registry::new();
        registry.insert("/topic/a", noop());
        let (b, _) = registry.insert("/topic/b", noop());
        registry.insert("/topic/c", noop());
        registry.remove(b);

        let frames = registry.resubscribe_frames();
        let destinations: Vec<_> = frames.iter().filter_map(|f| f.get("destination")).collect();
        assert_eq!(destinations, vec!["/topic/a", "/topic/c"]);
    }
}
