use std::sync::Arc;

use tracing::debug;

use crate::client::RealtimeClient;
use crate::client::lock;
use crate::client::registry::Handler;
use crate::core::{ClientError, Event, SubscriptionId};

impl RealtimeClient {
    /// Registers `callback` for `topic`. Requires a live session: while
    /// disconnected this returns [`ClientError::NotConnected`] and registers
    /// nothing. Subscriptions made while connected survive reconnects.
    pub fn subscribe_to_topic<F>(&self, topic: &str, callback: F) -> Result<SubscriptionId, ClientError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe_handler(topic, Arc::new(callback))
    }

    pub(crate) fn subscribe_handler(&self, topic: &str, handler: Handler) -> Result<SubscriptionId, ClientError> {
        let outbound = self.outbound().ok_or(ClientError::NotConnected)?;
        let registry = &self.shared.registry;
        let (id, frame) = lock(registry).insert(topic, handler);
        if let Some(frame) = frame {
            if outbound.send(frame).is_err() {
                lock(registry).remove(id);
                return Err(ClientError::NotConnected);
            }
        }
        debug!(topic = %topic, subscription = %id, "Subscribed");
        Ok(id)
    }

    /// Stops delivery to one subscription. Returns `false` for ids that are
    /// unknown or already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Some(frame) = lock(&self.shared.registry).remove(id) else {
            debug!(subscription = %id, "Unsubscribe for unknown subscription ignored");
            return false;
        };
        if let (Some(frame), Some(outbound)) = (frame, self.outbound()) {
            // A closed channel means the session is gone along with its
            // broker-side subscription.
            let _ = outbound.send(frame);
        }
        debug!(subscription = %id, "Unsubscribed");
        true
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        lock(&self.shared.registry).contains(id)
    }

    pub fn subscription_count(&self) -> usize {
        lock(&self.shared.registry).len()
    }
}
