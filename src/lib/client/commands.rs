use serde::Serialize;
use tracing::debug;

use crate::client::RealtimeClient;
use crate::core::topics::{PLEDGE_DESTINATION, PledgeCommand};
use crate::core::{CORRELATION_HEADER, ClientError, Command, CorrelationId, Frame};

impl RealtimeClient {
    /// Sends `payload` as JSON to `destination`. Nothing comes back on this
    /// call; the outcome arrives later on a result topic, tagged with the
    /// returned correlation id when the broker echoes it.
    ///
    /// Rejected with [`ClientError::NotConnected`] when there is no live
    /// session. Commands are never queued.
    pub fn send_command<T>(&self, destination: &str, payload: &T) -> Result<CorrelationId, ClientError>
    where
        T: Serialize + ?Sized,
    {
        let outbound = self.outbound().ok_or(ClientError::NotConnected)?;
        let body = serde_json::to_vec(payload)?;
        let correlation = CorrelationId::new();
        let frame = Frame::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .header(CORRELATION_HEADER, correlation.to_string())
            .body(body);
        outbound.send(frame).map_err(|_| ClientError::NotConnected)?;
        debug!(destination = %destination, correlation = %correlation, "Command sent");
        Ok(correlation)
    }

    pub fn create_pledge(&self, pledge: &PledgeCommand) -> Result<CorrelationId, ClientError> {
        self.send_command(PLEDGE_DESTINATION, pledge)
    }
}
