use std::time::Duration;

/// Broker endpoint compiled into the application.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8080/ws";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Retry forever, waiting the same delay before every attempt.
    Fixed(Duration),
    Disabled,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub reconnect: ReconnectPolicy,
    /// Bound on the WebSocket upgrade plus the wait for `CONNECTED`.
    pub connect_timeout: Duration,
    /// Client-to-broker heart-beat interval offered in `CONNECT`; zero disables.
    pub heartbeat_outgoing: Duration,
    /// Broker-to-client heart-beat interval requested in `CONNECT`; zero disables.
    pub heartbeat_incoming: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ENDPOINT.to_string(),
            reconnect: ReconnectPolicy::Fixed(Duration::from_secs(5)),
            connect_timeout: Duration::from_secs(10),
            heartbeat_outgoing: Duration::from_secs(10),
            heartbeat_incoming: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub(crate) fn heartbeat_header(&self) -> String {
        format!(
            "{},{}",
            self.heartbeat_outgoing.as_millis(),
            self.heartbeat_incoming.as_millis()
        )
    }
}

/// Intervals agreed with the broker, per STOMP 1.2 heart-beat negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Heartbeat {
    pub outgoing: Option<Duration>,
    pub incoming: Option<Duration>,
}

impl Heartbeat {
    /// `server` is the broker's `heart-beat` header from `CONNECTED`. A missing or
    /// unparsable header disables heart-beats in both directions.
    pub fn negotiate(config: &ClientConfig, server: Option<&str>) -> Self {
        let Some((sx, sy)) = server.and_then(parse_pair) else {
            return Self::default();
        };
        let pick = |ours: Duration, theirs: u64| {
            if ours.is_zero() || theirs == 0 {
                None
            } else {
                Some(ours.max(Duration::from_millis(theirs)))
            }
        };
        Self {
            outgoing: pick(config.heartbeat_outgoing, sy),
            incoming: pick(config.heartbeat_incoming, sx),
        }
    }
}

fn parse_pair(raw: &str) -> Option<(u64, u64)> {
    let (a, b) = raw.split_once(',')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_takes_the_slower_side() {
        let config = ClientConfig::default();
        let hb = Heartbeat::negotiate(&config, Some("20000,4000"));
        assert_eq!(hb.outgoing, Some(Duration::from_secs(10)));
        assert_eq!(hb.incoming, Some(Duration::from_secs(20)));
    }

    #[test]
    fn zero_on_either_side_disables() {
        let config = ClientConfig {
            heartbeat_outgoing: Duration::ZERO,
            ..Default::default()
        };
        let hb = Heartbeat::negotiate(&config, Some("0,5000"));
        assert_eq!(hb, Heartbeat::default());
        assert_eq!(Heartbeat::negotiate(&ClientConfig::default(), None), Heartbeat::default());
    }

    #[test]
    fn connect_header_in_millis() {
        assert_eq!(ClientConfig::default().heartbeat_header(), "10000,10000");
    }
}
