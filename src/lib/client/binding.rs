//! Consumer bindings: one subscription per consumer, keyed by a topic key.
//!
//! The callback lives in a shared slot that the registered handler reads on every
//! delivery. Replacing the callback swaps the slot and never touches the broker.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::client::registry::Handler;
use crate::client::{RealtimeClient, lock};
use crate::core::{ClientError, Event, SubscriptionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Unbound,
    Subscribing,
    Bound,
}

type TopicFn<K> = Box<dyn Fn(&K) -> String + Send + Sync>;

pub struct Binding<K> {
    client: RealtimeClient,
    topic_for: TopicFn<K>,
    slot: Arc<Mutex<Handler>>,
    current: Option<(K, SubscriptionId)>,
    state: BindingState,
}

impl<K: PartialEq> Binding<K> {
    pub fn new<T, F>(client: RealtimeClient, topic_for: T, callback: F) -> Self
    where
        T: Fn(&K) -> String + Send + Sync + 'static,
        F: Fn(&Event) + Send + Sync + 'static,
    {
        Self {
            client,
            topic_for: Box::new(topic_for),
            slot: Arc::new(Mutex::new(Arc::new(callback))),
            current: None,
            state: BindingState::Unbound,
        }
    }

    /// Replaces the callback in place; the subscription is kept.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        *lock(&self.slot) = Arc::new(callback);
    }

    /// Binds to `key`. Rebinding the current key is a no-op; a new key releases
    /// the old subscription before subscribing the new topic. On failure the
    /// binding is left unbound.
    pub fn bind(&mut self, key: K) -> Result<(), ClientError> {
        if self.state == BindingState::Bound
            && self.current.as_ref().is_some_and(|(current, _)| *current == key)
        {
            return Ok(());
        }
        self.unbind();

        self.state = BindingState::Subscribing;
        let topic = (self.topic_for)(&key);
        let slot = self.slot.clone();
        let trampoline: Handler = Arc::new(move |event: &Event| {
            let callback = lock(&slot).clone();
            callback(event);
        });
        match self.client.subscribe_handler(&topic, trampoline) {
            Ok(id) => {
                debug!(topic = %topic, subscription = %id, "Binding bound");
                self.current = Some((key, id));
                self.state = BindingState::Bound;
                Ok(())
            }
            Err(e) => {
                self.state = BindingState::Unbound;
                Err(e)
            }
        }
    }

    pub fn unbind(&mut self) {
        if let Some((_, id)) = self.current.take() {
            self.client.unsubscribe(id);
        }
        self.state = BindingState::Unbound;
    }

    pub fn state(&self) -> BindingState {
        self.state
    }

    pub fn key(&self) -> Option<&K> {
        self.current.as_ref().map(|(key, _)| key)
    }

    pub fn subscription(&self) -> Option<SubscriptionId> {
        self.current.as_ref().map(|(_, id)| *id)
    }
}

impl Binding<()> {
    /// A binding to one fixed topic, such as the global pledge result topics.
    pub fn fixed<F>(client: RealtimeClient, topic: &str, callback: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let topic = topic.to_string();
        Self::new(client, move |_: &()| topic.clone(), callback)
    }
}

impl<K> Drop for Binding<K> {
    fn drop(&mut self) {
        if let Some((_, id)) = self.current.take() {
            self.client.unsubscribe(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::client::{ClientConfig, Router};
    use crate::core::topics::campaign_progress;
    use crate::core::{Command, Frame};
    use crate::storage::NoToken;

    fn connected() -> (RealtimeClient, tokio::sync::mpsc::UnboundedReceiver<Frame>) {
        let client = RealtimeClient::new(ClientConfig::default(), Arc::new(NoToken));
        let frames = client.attach_outbound();
        (client, frames)
    }

    fn drain(frames: &mut tokio::sync::mpsc::UnboundedReceiver<Frame>) -> Vec<Frame> {
        let mut out = Vec::new();
        while let Ok(frame) = frames.try_recv() {
            out.push(frame);
        }
        out
    }

    fn progress(client: &RealtimeClient, destination: &str) {
        let frame = Frame::new(Command::Message)
            .header("destination", destination)
            .body(&b"{}"[..]);
        Router::new(client.shared.registry.clone()).dispatch(&frame);
    }

    #[test]
    fn new_callback_does_not_resubscribe() {
        let (client, mut frames) = connected();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let mut binding = {
            let first = first.clone();
            Binding::new(client.clone(), |id: &u64| campaign_progress(id), move |_| {
                first.fetch_add(1, Ordering::SeqCst);
            })
        };
        binding.bind(42).unwrap();
        assert_eq!(binding.state(), BindingState::Bound);
        {
            let second = second.clone();
            binding.set_callback(move |_| {
                second.fetch_add(1, Ordering::SeqCst);
            });
        }
        binding.bind(42).unwrap();

        let sent = drain(&mut frames);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].command, Command::Subscribe);
        assert_eq!(client.subscription_count(), 1);

        progress(&client, &campaign_progress(42));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn key_change_swaps_exactly_one_subscription() {
        let (client, mut frames) = connected();
        let mut binding = Binding::new(client.clone(), |id: &u64| campaign_progress(id), |_| {});
        binding.bind(1).unwrap();
        drain(&mut frames);

        binding.bind(2).unwrap();
        let sent = drain(&mut frames);
        let commands: Vec<_> = sent.iter().map(|f| f.command).collect();
        assert_eq!(commands, vec![Command::Unsubscribe, Command::Subscribe]);
        assert_eq!(sent[1].get("destination"), Some("/topic/campaign/2/progress"));
        assert_eq!(binding.key(), Some(&2));
        assert_eq!(client.subscription_count(), 1);
    }

    #[test]
    fn drop_releases_subscription() {
        let (client, mut frames) = connected();
        let mut binding = Binding::fixed(client.clone(), "/user/queue/pledge/error", |_| {});
        binding.bind(()).unwrap();
        drop(binding);

        let commands: Vec<_> = drain(&mut frames).iter().map(|f| f.command).collect();
        assert_eq!(commands, vec![Command::Subscribe, Command::Unsubscribe]);
        assert_eq!(client.subscription_count(), 0);
    }

    #[test]
    fn failed_bind_leaves_binding_unbound() {
        let client = RealtimeClient::new(ClientConfig::default(), Arc::new(NoToken));
        let mut binding = Binding::new(client, |id: &u64| campaign_progress(id), |_| {});
        assert!(matches!(binding.bind(7), Err(ClientError::NotConnected)));
        assert_eq!(binding.state(), BindingState::Unbound);
        assert_eq!(binding.key(), None);
    }
}
