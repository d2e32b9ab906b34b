//! [`Transport`] over the blocking rumqttc client

use super::{BrokerError, Message, Transport, TransportEvent};
use crate::config::BrokerConfig;
use log::trace;
use rumqttc::{Client, ConnectReturnCode, Connection, Event, MqttOptions, Outgoing, Packet, QoS};
use std::time::{Duration, Instant};

/// Capacity of the client's request channel
const REQUEST_CAPACITY: usize = 10;

/// How long a liveness check listens for a close the socket already saw
const LIVENESS_WINDOW: Duration = Duration::from_millis(20);

/// Most already-queued events consumed by one drain or poll
const MAX_DRAINED: usize = 64;

struct Session {
    client: Client,
    connection: Connection,
}

/// MQTT transport driving rumqttc's event loop from the calling thread.
///
/// The client and its event loop live together, so a publish can wait for
/// the event loop to actually write the packet before reporting success.
pub struct RumqttTransport {
    options: MqttOptions,
    timeout: Duration,
    session: Option<Session>,
}

impl RumqttTransport {
    /// `timeout` bounds both the connect handshake and the publish write
    pub fn new(config: &BrokerConfig, timeout: Duration) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(config.keep_alive());
        options.set_clean_session(true);

        Self {
            options,
            timeout,
            session: None,
        }
    }

    /// Wait for the next event, `Ok(None)` on timeout
    fn next_event(&mut self, timeout: Duration) -> Result<Option<Event>, BrokerError> {
        let outcome = match self.session.as_mut() {
            Some(session) => session.connection.recv_timeout(timeout),
            None => return Err(BrokerError::NotConnected),
        };

        match outcome {
            Ok(Ok(Event::Incoming(Packet::Disconnect))) => {
                self.session = None;
                Err(BrokerError::Disconnected)
            }
            Ok(Ok(event)) => Ok(Some(event)),
            Ok(Err(rumqttc::ConnectionError::ConnectionRefused(code))) => {
                self.session = None;
                Err(BrokerError::Refused(format!("{:?}", code)))
            }
            Ok(Err(e)) => {
                self.session = None;
                Err(e.into())
            }
            Err(_) => Ok(None),
        }
    }

    /// Consume events the session already has queued.
    ///
    /// Fails if the broker closed the connection in the meantime; rumqttc
    /// only notices an EOF once its event loop reads the socket.
    fn drain(&mut self) -> Result<(), BrokerError> {
        for _ in 0..MAX_DRAINED {
            match self.next_event(LIVENESS_WINDOW)? {
                Some(event) => trace!("Broker event: {:?}", event),
                None => return Ok(()),
            }
        }
        Ok(())
    }

    /// Pump events until `done` accepts one or the deadline passes
    fn wait_for(&mut self, done: impl Fn(&Event) -> Result<bool, BrokerError>) -> Result<(), BrokerError> {
        let deadline = Instant::now() + self.timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.session = None;
                return Err(BrokerError::Timeout(self.timeout));
            }

            if let Some(event) = self.next_event(remaining)? {
                match done(&event) {
                    Ok(true) => return Ok(()),
                    Ok(false) => trace!("Broker event: {:?}", event),
                    Err(e) => {
                        self.session = None;
                        return Err(e);
                    }
                }
            }
        }
    }
}

impl Transport for RumqttTransport {
    fn connect(&mut self) -> Result<(), BrokerError> {
        let (client, connection) = Client::new(self.options.clone(), REQUEST_CAPACITY);
        self.session = Some(Session { client, connection });

        self.wait_for(|event| match event {
            Event::Incoming(Packet::ConnAck(ack)) if ack.code == ConnectReturnCode::Success => Ok(true),
            Event::Incoming(Packet::ConnAck(ack)) => Err(BrokerError::Refused(format!("{:?}", ack.code))),
            _ => Ok(false),
        })
    }

    fn publish(&mut self, message: &Message) -> Result<(), BrokerError> {
        self.drain()?;

        let session = self.session.as_mut().ok_or(BrokerError::NotConnected)?;
        session.client.publish(
            message.topic.clone(),
            QoS::AtMostOnce,
            message.retain,
            message.payload.clone(),
        )?;
        self.wait_for(|event| Ok(matches!(event, Event::Outgoing(Outgoing::Publish(_)))))?;

        // A write into a half-closed socket still succeeds locally
        self.drain()
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<TransportEvent>, BrokerError> {
        let deadline = Instant::now() + timeout;

        // Keep-alive traffic and acks are consumed here, not reported
        for _ in 0..MAX_DRAINED {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.next_event(remaining) {
                Ok(Some(Event::Incoming(Packet::ConnAck(_)))) => {
                    return Ok(Some(TransportEvent::Connected));
                }
                Ok(Some(Event::Outgoing(Outgoing::Publish(_)))) => {
                    return Ok(Some(TransportEvent::Published));
                }
                Ok(Some(event)) => trace!("Broker event: {:?}", event),
                Ok(None) => return Ok(None),
                Err(BrokerError::Disconnected) => return Ok(Some(TransportEvent::Disconnected)),
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    const TIMEOUT: Duration = Duration::from_millis(500);

    /// How the fake broker answers a CONNECT
    #[derive(Clone, Copy)]
    enum Reply {
        Accept,
        Refuse(u8),
        Silent,
        AcceptThenClose,
    }

    /// Single-connection broker on a loopback port
    fn fake_broker(reply: Reply) -> BrokerConfig {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();

        thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            stream.set_read_timeout(Some(Duration::from_secs(5))).ok();
            let mut buf = [0u8; 256];
            if stream.read(&mut buf).unwrap_or(0) == 0 {
                return;
            }

            let code = match reply {
                Reply::Accept | Reply::AcceptThenClose => Some(0x00),
                Reply::Refuse(code) => Some(code),
                Reply::Silent => None,
            };
            if let Some(code) = code {
                // CONNACK, no session present
                stream.write_all(&[0x20, 0x02, 0x00, code]).ok();
            }
            if matches!(reply, Reply::AcceptThenClose) {
                return;
            }

            // Hold the socket open until the client goes away
            while matches!(stream.read(&mut buf), Ok(n) if n > 0) {}
        });

        BrokerConfig {
            host: "127.0.0.1".to_string(),
            port,
            ..BrokerConfig::default()
        }
    }

    fn message() -> Message {
        Message::new("hasi/code_scanner", "4006381333931", true)
    }

    #[test]
    fn starts_without_session() {
        let transport = RumqttTransport::new(&BrokerConfig::default(), Duration::from_secs(1));
        assert!(!transport.is_connected());
    }

    #[test]
    fn publish_without_session_fails() {
        let mut transport = RumqttTransport::new(&BrokerConfig::default(), Duration::from_secs(1));
        let message = Message::new("t", "x", true);
        assert!(matches!(transport.publish(&message), Err(BrokerError::NotConnected)));
        assert!(matches!(
            transport.poll(Duration::from_millis(1)),
            Err(BrokerError::NotConnected)
        ));
    }

    #[test]
    fn connect_waits_for_connack() {
        let mut transport = RumqttTransport::new(&fake_broker(Reply::Accept), TIMEOUT);

        transport.connect().expect("broker accepts");
        assert!(transport.is_connected());

        transport.publish(&message()).expect("live session publishes");
        assert!(transport.is_connected());
        assert!(matches!(transport.poll(Duration::from_millis(10)), Ok(None)));
    }

    #[test]
    fn refused_connack_is_an_error() {
        let mut transport = RumqttTransport::new(&fake_broker(Reply::Refuse(5)), TIMEOUT);

        let err = transport.connect().unwrap_err();
        assert!(matches!(err, BrokerError::Refused(_)), "got {:?}", err);
        assert!(!transport.is_connected());
    }

    #[test]
    fn silent_broker_times_out() {
        let mut transport = RumqttTransport::new(&fake_broker(Reply::Silent), TIMEOUT);

        let err = transport.connect().unwrap_err();
        assert!(matches!(err, BrokerError::Timeout(t) if t == TIMEOUT), "got {:?}", err);
        assert!(!transport.is_connected());
    }

    #[test]
    fn publish_after_peer_close_fails() {
        for _ in 0..10 {
            let mut transport = RumqttTransport::new(&fake_broker(Reply::AcceptThenClose), TIMEOUT);
            transport.connect().expect("broker accepts");
            thread::sleep(Duration::from_millis(100));

            assert!(transport.publish(&message()).is_err());
            assert!(!transport.is_connected());
        }
    }

    #[test]
    fn poll_reports_peer_close() {
        let mut transport = RumqttTransport::new(&fake_broker(Reply::AcceptThenClose), TIMEOUT);
        transport.connect().expect("broker accepts");
        thread::sleep(Duration::from_millis(100));

        assert!(transport.poll(Duration::from_millis(100)).is_err());
        assert!(!transport.is_connected());
    }
}
