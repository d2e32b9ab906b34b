//! Wiring between the scanner and the broker
//!
//! The scanner side ([`ScanDispatcher`]) runs on the calling thread and only
//! ever blocks on device reads. Completed codes go onto an unbounded queue
//! drained by a [`DeliveryWorker`] thread that exclusively owns the broker
//! session, so slow or failing deliveries never hold up scanning.

use crate::broker::{BrokerConnection, Message, Transport};
use crate::config::BrokerConfig;
use crate::device::{DeviceConnection, DeviceError, InputProvider};
use crate::keyboard::{CodeAccumulator, KeyEvent, ScannedCode};
use crate::stats::ScanStats;
use log::{error, info, warn};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Network wait used by an idle service tick
const SERVICE_POLL: Duration = Duration::from_millis(50);

/// Publishes queued codes and keeps the broker session serviced
pub struct DeliveryWorker<T: Transport> {
    broker: BrokerConnection<T>,
    topic: String,
    retain: bool,
    service_interval: Duration,
    stats: Arc<ScanStats>,
}

impl<T: Transport> DeliveryWorker<T> {
    pub fn new(
        broker: BrokerConnection<T>,
        config: &BrokerConfig,
        service_interval: Duration,
        stats: Arc<ScanStats>,
    ) -> Self {
        Self {
            broker,
            topic: config.topic.clone(),
            retain: config.retain,
            service_interval,
            stats,
        }
    }

    pub fn broker(&self) -> &BrokerConnection<T> {
        &self.broker
    }

    /// Publish one code, retrying until it is delivered
    pub fn deliver(&mut self, code: ScannedCode) {
        let message = Message::new(self.topic.as_str(), code.into_string(), self.retain);
        let attempts = self.broker.publish(&message);
        self.stats.record_delivered(attempts);
        info!(
            "Scanned code {:?} published to {} ({}).",
            message.payload_str(),
            message.topic,
            self.stats.snapshot()
        );
    }

    /// Connect, then deliver codes as they arrive.
    ///
    /// While the queue is idle the broker session is serviced every
    /// `service_interval`. Returns once every sender is dropped.
    pub fn run(mut self, queue: Receiver<ScannedCode>) {
        self.broker.connect();

        loop {
            match queue.recv_timeout(self.service_interval) {
                Ok(code) => self.deliver(code),
                Err(RecvTimeoutError::Timeout) => self.broker.service(SERVICE_POLL),
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Delivery queue closed, stopping delivery worker.");
                    return;
                }
            }
        }
    }
}

impl<T: Transport + Send + 'static> DeliveryWorker<T> {
    /// Run the worker on its own thread, returning the queue feeding it
    pub fn spawn(self) -> std::io::Result<(Sender<ScannedCode>, JoinHandle<()>)> {
        let (tx, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("delivery".to_string())
            .spawn(move || self.run(rx))?;
        Ok((tx, handle))
    }
}

/// Turns keystrokes into queued codes
struct CodeSink {
    accumulator: CodeAccumulator,
    queue: Sender<ScannedCode>,
    stats: Arc<ScanStats>,
}

impl CodeSink {
    fn handle(&mut self, event: &KeyEvent) {
        match self.accumulator.on_keystroke(event) {
            Ok(Some(code)) => {
                info!("Scanned code: {}", code);
                self.stats.record_scanned();
                if self.queue.send(code).is_err() {
                    error!("Delivery worker is gone, scanned code dropped.");
                }
            }
            Ok(None) => {}
            Err(e) => {
                self.stats.record_decode_error();
                warn!("{}. Waiting for the next code.", e);
            }
        }
    }
}

/// Reads the scanner forever and hands completed codes to delivery
pub struct ScanDispatcher<P: InputProvider> {
    device: DeviceConnection<P>,
    sink: CodeSink,
}

impl<P: InputProvider> ScanDispatcher<P> {
    pub fn new(device: DeviceConnection<P>, queue: Sender<ScannedCode>, stats: Arc<ScanStats>) -> Self {
        Self {
            device,
            sink: CodeSink {
                accumulator: CodeAccumulator::new(),
                queue,
                stats,
            },
        }
    }

    pub fn device(&self) -> &DeviceConnection<P> {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut DeviceConnection<P> {
        &mut self.device
    }

    /// Keystrokes collected for the code currently being scanned
    pub fn accumulator(&self) -> &CodeAccumulator {
        &self.sink.accumulator
    }

    pub fn stats(&self) -> &Arc<ScanStats> {
        &self.sink.stats
    }

    /// Connect to the scanner and dispatch codes forever.
    ///
    /// A partially scanned code survives a device reconnect.
    pub fn run(&mut self) -> ! {
        loop {
            self.device.connect();
            let err = self.run_session();
            warn!(
                "Scanner read failed: {}. Reconnecting in {:?}.",
                err,
                self.device.backoff().interval()
            );
            self.sink.stats.record_device_reconnect();
            self.device.backoff().wait();
        }
    }

    /// Dispatch events from the connected device until a read fails.
    ///
    /// Returns the error that ended the session.
    pub fn run_session(&mut self) -> DeviceError {
        for item in self.device.read_loop() {
            match item {
                Ok(event) => self.sink.handle(&event),
                Err(e) => return e,
            }
        }
        DeviceError::NotConnected
    }
}
