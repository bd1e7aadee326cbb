use std::sync::{Arc, Mutex};

use tracing::{debug, error, instrument, warn};

use crate::client::{guarded, lock};
use crate::client::registry::Registry;
use crate::core::{Command, Event, Frame};

/// Delivers inbound `MESSAGE` frames to the callbacks registered for their topic.
#[derive(Clone)]
pub struct Router {
    registry: Arc<Mutex<Registry>>,
}

impl Router {
    pub fn new(registry: Arc<Mutex<Registry>>) -> Self {
        Self { registry }
    }

    /// Returns how many callbacks ran to completion.
    ///
    /// Handlers are snapshotted before any of them runs, so a callback may
    /// subscribe or unsubscribe without deadlocking; such changes take effect
    /// from the next message.
    #[instrument(skip_all, fields(destination = frame.get("destination").unwrap_or("")))]
    pub fn dispatch(&self, frame: &Frame) -> usize {
        if frame.command != Command::Message {
            return 0;
        }

        let (topic, handlers) = {
            let registry = lock(&self.registry);
            let Some(topic) = registry.topic_for(frame) else {
                debug!("No subscribers for message; dropping");
                return 0;
            };
            (topic.to_string(), registry.handlers(topic))
        };

        let event = match Event::from_frame(frame, &topic) {
            Ok(event) => event,
            Err(e) => {
                warn!(topic = %topic, error = %e, "Failed to deserialize message payload; dropping");
                return 0;
            }
        };

        let mut delivered = 0;
        for (id, handler) in handlers {
            match guarded(|| handler(&event)) {
                Ok(()) => delivered += 1,
                Err(reason) => {
                    error!(topic = %topic, subscription = %id, reason = %reason, "Subscriber callback panicked");
                }
            }
        }
        debug!(topic = %topic, delivered, "Message delivered");
        delivered
    }
}
