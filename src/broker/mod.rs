//! Broker session lifecycle with unbounded, fixed-interval recovery
//!
//! [`BrokerConnection`] wraps a [`Transport`] and never gives up: connect
//! failures are retried after the backoff, and a failed publish reconnects and
//! re-sends the identical [`Message`] until it goes through. Delivery is
//! therefore at-least-once; a publish that failed after reaching the broker
//! can show up twice.
//!
//! The connection is not shared. Whoever owns it (the delivery worker) is the
//! only code that touches the session, so connect and publish never race.

mod rumqtt;

pub use rumqtt::RumqttTransport;

use crate::retry::Backoff;
use crate::stats::ScanStats;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Most transport events handled by one service tick
const MAX_EVENTS_PER_TICK: usize = 32;

/// A message to publish. Retries reuse the same value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>, retain: bool) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain,
        }
    }

    /// Payload as text, lossy for non-UTF-8 payloads
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Error type for broker operations
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Network or protocol failure of the session
    #[error("Connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),
    /// The client request queue is gone
    #[error("Client error: {0}")]
    Client(#[from] rumqttc::ClientError),
    /// Broker answered the connect with a failure code
    #[error("Broker refused connection: {0}")]
    Refused(String),
    /// No acknowledgement within the allowed time
    #[error("No response from broker within {0:?}")]
    Timeout(Duration),
    /// Broker closed the session
    #[error("Broker closed the connection")]
    Disconnected,
    /// Operation attempted without a session
    #[error("Not connected to broker")]
    NotConnected,
}

/// Notifications surfaced by [`Transport::poll`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// Broker acknowledged a connect
    Connected,
    /// Session ended
    Disconnected,
    /// A publish went out on the wire
    Published,
}

/// Low-level MQTT session operations
pub trait Transport {
    /// Open a fresh session, replacing any existing one.
    ///
    /// Returns once the broker has acknowledged the connect.
    fn connect(&mut self) -> Result<(), BrokerError>;

    /// Publish `message` at QoS 0.
    ///
    /// Returns only once the message was written on a live session.
    fn publish(&mut self, message: &Message) -> Result<(), BrokerError>;

    /// Drive the session for at most `timeout`, returning the next notification
    fn poll(&mut self, timeout: Duration) -> Result<Option<TransportEvent>, BrokerError>;

    fn is_connected(&self) -> bool;
}

/// Lifecycle of a [`BrokerConnection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    Disconnected,
    Connected,
}

/// Self-healing broker session
pub struct BrokerConnection<T: Transport> {
    transport: T,
    backoff: Backoff,
    state: BrokerState,
    /// A session has been established at least once
    established: bool,
    stats: Arc<ScanStats>,
}

impl<T: Transport> BrokerConnection<T> {
    pub fn new(transport: T, backoff: Backoff) -> Self {
        Self {
            transport,
            backoff,
            state: BrokerState::Disconnected,
            established: false,
            stats: Arc::new(ScanStats::new()),
        }
    }

    /// Report reconnects into a shared counter set
    pub fn with_stats(mut self, stats: Arc<ScanStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn state(&self) -> BrokerState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Connect, retrying forever with the fixed backoff
    pub fn connect(&mut self) {
        self.state = BrokerState::Disconnected;
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            info!("Connecting to broker (attempt {}).", attempt);
            match self.transport.connect() {
                Ok(()) => {
                    info!("Connected to the broker.");
                    self.state = BrokerState::Connected;
                    self.established = true;
                    return;
                }
                Err(e) => {
                    warn!(
                        "Could not connect to broker: {}. Trying again in {:?}.",
                        e,
                        self.backoff.interval()
                    );
                }
            }
            self.backoff.wait();
        }
    }

    /// Bring a lost session back; the very first session is not a reconnect
    fn reconnect(&mut self) {
        if self.established {
            self.stats.record_broker_reconnect();
            info!("Reconnecting to broker.");
        }
        self.connect();
    }

    /// Publish `message`, reconnecting and re-sending until it succeeds.
    ///
    /// Returns the number of attempts it took.
    pub fn publish(&mut self, message: &Message) -> u64 {
        let mut attempts: u64 = 0;

        loop {
            if self.state != BrokerState::Connected || !self.transport.is_connected() {
                self.reconnect();
            }

            attempts += 1;
            match self.transport.publish(message) {
                Ok(()) => {
                    debug!(
                        "Published {} bytes to {} (attempt {}).",
                        message.payload.len(),
                        message.topic,
                        attempts
                    );
                    return attempts;
                }
                Err(e) => {
                    warn!(
                        "Could not publish to {}: {}. Reconnecting to the broker and publishing again.",
                        message.topic, e
                    );
                    self.state = BrokerState::Disconnected;
                }
            }
        }
    }

    /// One service tick: handle pending notifications, reconnect on failure.
    ///
    /// `timeout` bounds the wait for the first notification.
    pub fn service(&mut self, timeout: Duration) {
        if self.state != BrokerState::Connected {
            self.reconnect();
            return;
        }

        let mut wait = timeout;
        for _ in 0..MAX_EVENTS_PER_TICK {
            match self.transport.poll(wait) {
                Ok(None) => return,
                Ok(Some(TransportEvent::Connected)) => info!("Connected to the broker."),
                Ok(Some(TransportEvent::Published)) => debug!("Publish written to the broker."),
                Ok(Some(TransportEvent::Disconnected)) => {
                    warn!("Disconnected from the broker. Reconnecting now.");
                    self.reconnect();
                    return;
                }
                Err(e) => {
                    warn!("Broker connection failed: {}. Reconnecting now.", e);
                    self.reconnect();
                    return;
                }
            }
            // Only drain what is already there after the first event
            wait = Duration::ZERO;
        }
    }
}
