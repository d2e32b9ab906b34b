//! Scripted in-memory stand-ins for the scanner and the broker
//!
//! Used by unit tests and `tests/integration.rs`. Each fake shares a log
//! handle so a test can inspect what happened after handing the fake over.

use crate::broker::{BrokerError, Message, Transport, TransportEvent};
use crate::device::{DeviceError, DeviceSelector, InputDevice, InputProvider};
use crate::keyboard::KeyEvent;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// One scripted `fetch_events` result
#[derive(Debug, Clone)]
pub enum Step {
    Events(Vec<KeyEvent>),
    ReadError,
}

/// Build a batch of presses for the given scancodes
pub fn presses(codes: &[u16]) -> Step {
    Step::Events(codes.iter().map(|&c| KeyEvent::press(c)).collect())
}

#[derive(Debug, Clone)]
enum OpenOutcome {
    Missing,
    EnumerationFailure,
    Ungrabbable,
    Device(Vec<Step>),
}

#[derive(Debug, Default)]
struct DeviceLogInner {
    opens: usize,
    grabs: usize,
    ungrabs: usize,
    live: usize,
}

/// Shared view of what a [`ScriptedProvider`] did
#[derive(Debug, Clone, Default)]
pub struct DeviceLog(Arc<Mutex<DeviceLogInner>>);

impl DeviceLog {
    fn lock(&self) -> MutexGuard<'_, DeviceLogInner> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    pub fn grabs(&self) -> usize {
        self.lock().grabs
    }

    pub fn ungrabs(&self) -> usize {
        self.lock().ungrabs
    }

    /// Devices currently grabbed
    pub fn live_handles(&self) -> usize {
        self.lock().live
    }
}

/// Provider whose `open` results follow a script.
///
/// Once the script runs out every `open` reports the scanner as missing.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    outcomes: VecDeque<OpenOutcome>,
    log: DeviceLog,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn missing(mut self) -> Self {
        self.outcomes.push_back(OpenOutcome::Missing);
        self
    }

    pub fn enumeration_failure(mut self) -> Self {
        self.outcomes.push_back(OpenOutcome::EnumerationFailure);
        self
    }

    pub fn ungrabbable(mut self) -> Self {
        self.outcomes.push_back(OpenOutcome::Ungrabbable);
        self
    }

    /// A device that will return `steps` from successive reads, then fail
    pub fn device(mut self, steps: Vec<Step>) -> Self {
        self.outcomes.push_back(OpenOutcome::Device(steps));
        self
    }

    pub fn log(&self) -> DeviceLog {
        self.log.clone()
    }
}

impl InputProvider for ScriptedProvider {
    type Device = ScriptedDevice;

    fn open(&mut self, _selector: &DeviceSelector) -> Result<Option<ScriptedDevice>, DeviceError> {
        self.log.lock().opens += 1;
        match self.outcomes.pop_front().unwrap_or(OpenOutcome::Missing) {
            OpenOutcome::Missing => Ok(None),
            OpenOutcome::EnumerationFailure => {
                Err(DeviceError::Enumeration("scripted failure".to_string()))
            }
            OpenOutcome::Ungrabbable => Ok(Some(ScriptedDevice::new(Vec::new(), false, self.log.clone()))),
            OpenOutcome::Device(steps) => Ok(Some(ScriptedDevice::new(steps, true, self.log.clone()))),
        }
    }
}

/// Device produced by [`ScriptedProvider`]
#[derive(Debug)]
pub struct ScriptedDevice {
    steps: VecDeque<Step>,
    grabbable: bool,
    grabbed: bool,
    log: DeviceLog,
}

impl ScriptedDevice {
    fn new(steps: Vec<Step>, grabbable: bool, log: DeviceLog) -> Self {
        Self {
            steps: steps.into(),
            grabbable,
            grabbed: false,
            log,
        }
    }

    fn set_grabbed(&mut self, grabbed: bool) {
        if self.grabbed == grabbed {
            return;
        }
        self.grabbed = grabbed;
        let mut log = self.log.lock();
        if grabbed {
            log.grabs += 1;
            log.live += 1;
        } else {
            log.live -= 1;
        }
    }
}

impl InputDevice for ScriptedDevice {
    fn name(&self) -> &str {
        "Scripted Scanner"
    }

    fn grab(&mut self) -> Result<(), DeviceError> {
        if !self.grabbable {
            return Err(DeviceError::Grab {
                name: self.name().to_string(),
                source: io::Error::new(io::ErrorKind::ResourceBusy, "already grabbed"),
            });
        }
        self.set_grabbed(true);
        Ok(())
    }

    fn ungrab(&mut self) -> Result<(), DeviceError> {
        self.log.lock().ungrabs += 1;
        self.set_grabbed(false);
        Ok(())
    }

    fn fetch_events(&mut self) -> Result<Vec<KeyEvent>, DeviceError> {
        match self.steps.pop_front() {
            Some(Step::Events(events)) => Ok(events),
            Some(Step::ReadError) | None => Err(DeviceError::Read(io::Error::new(
                io::ErrorKind::NotConnected,
                "device unplugged",
            ))),
        }
    }
}

impl Drop for ScriptedDevice {
    fn drop(&mut self) {
        self.set_grabbed(false);
    }
}

#[derive(Debug, Default)]
struct TransportLogInner {
    connect_attempts: usize,
    publish_attempts: Vec<Message>,
    delivered: Vec<Message>,
}

/// Shared view of what a [`ScriptedTransport`] did
#[derive(Debug, Clone, Default)]
pub struct TransportLog(Arc<Mutex<TransportLogInner>>);

impl TransportLog {
    fn lock(&self) -> MutexGuard<'_, TransportLogInner> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn connect_attempts(&self) -> usize {
        self.lock().connect_attempts
    }

    /// Every message passed to `publish`, successful or not
    pub fn publish_attempts(&self) -> Vec<Message> {
        self.lock().publish_attempts.clone()
    }

    /// Messages whose publish succeeded
    pub fn delivered(&self) -> Vec<Message> {
        self.lock().delivered.clone()
    }
}

/// One scripted `poll` result
#[derive(Debug)]
enum PollStep {
    Event(Option<TransportEvent>),
    Failure,
}

/// Transport whose results follow per-operation scripts.
///
/// Exhausted scripts succeed (connect, publish) or report nothing (poll).
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    connects: VecDeque<bool>,
    publishes: VecDeque<bool>,
    polls: VecDeque<PollStep>,
    connected: bool,
    log: TransportLog,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcomes of successive connect attempts
    pub fn connects(mut self, outcomes: &[bool]) -> Self {
        self.connects.extend(outcomes);
        self
    }

    /// Outcomes of successive publish attempts
    pub fn publishes(mut self, outcomes: &[bool]) -> Self {
        self.publishes.extend(outcomes);
        self
    }

    /// Events returned by successive polls
    pub fn polls(mut self, events: Vec<Option<TransportEvent>>) -> Self {
        self.polls.extend(events.into_iter().map(PollStep::Event));
        self
    }

    /// Next poll fails with a connection error and drops the session
    pub fn poll_failure(mut self) -> Self {
        self.polls.push_back(PollStep::Failure);
        self
    }

    pub fn log(&self) -> TransportLog {
        self.log.clone()
    }
}

impl Transport for ScriptedTransport {
    fn connect(&mut self) -> Result<(), BrokerError> {
        self.log.lock().connect_attempts += 1;
        self.connected = self.connects.pop_front().unwrap_or(true);
        if self.connected {
            Ok(())
        } else {
            Err(BrokerError::Timeout(Duration::from_secs(1)))
        }
    }

    fn publish(&mut self, message: &Message) -> Result<(), BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }
        let mut log = self.log.lock();
        log.publish_attempts.push(message.clone());
        if self.publishes.pop_front().unwrap_or(true) {
            log.delivered.push(message.clone());
            Ok(())
        } else {
            self.connected = false;
            Err(BrokerError::Disconnected)
        }
    }

    fn poll(&mut self, _timeout: Duration) -> Result<Option<TransportEvent>, BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }
        match self.polls.pop_front() {
            Some(PollStep::Event(event)) => {
                if event == Some(TransportEvent::Disconnected) {
                    self.connected = false;
                }
                Ok(event)
            }
            Some(PollStep::Failure) => {
                self.connected = false;
                Err(BrokerError::Connection(rumqttc::ConnectionError::Io(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset by broker",
                ))))
            }
            None => Ok(None),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
