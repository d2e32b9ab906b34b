//! Scanner device discovery, exclusive acquisition and event reads
//!
//! [`DeviceConnection`] owns at most one grabbed device at a time. Every
//! failure is treated as transient: `connect` keeps retrying with a fixed
//! backoff until the scanner shows up, and a read error simply ends the
//! current [`ReadLoop`] so the caller can connect again.

#[cfg(target_os = "linux")]
mod evdev_input;

#[cfg(target_os = "linux")]
pub use evdev_input::{EvdevDevice, EvdevProvider};

use crate::keyboard::KeyEvent;
use crate::retry::Backoff;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::fmt;
use std::io;

/// How the scanner is recognised among all input devices
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    /// Exact device name as reported by the kernel
    Name(String),
    /// USB vendor/product id pair
    UsbId { vendor: u16, product: u16 },
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "\"{}\"", name),
            Self::UsbId { vendor, product } => write!(f, "{:04x}:{:04x}", vendor, product),
        }
    }
}

/// Error type for device operations
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Listing input devices failed
    #[error("Device enumeration failed: {0}")]
    Enumeration(String),
    /// No device matched the selector
    #[error("No scanner matching {0} found")]
    NotFound(DeviceSelector),
    /// Device found but could not be grabbed exclusively
    #[error("Could not grab {name}: {source}")]
    Grab {
        name: String,
        #[source]
        source: io::Error,
    },
    /// Reading events failed, usually because the device was unplugged
    #[error("Read failed: {0}")]
    Read(#[source] io::Error),
    /// Read attempted without a connected device
    #[error("No scanner connected")]
    NotConnected,
}

/// An opened input device
pub trait InputDevice {
    /// Device name, for diagnostics
    fn name(&self) -> &str;

    /// Take exclusive ownership so no other consumer sees the keystrokes
    fn grab(&mut self) -> Result<(), DeviceError>;

    /// Give exclusive ownership back
    fn ungrab(&mut self) -> Result<(), DeviceError>;

    /// Block until at least one event is available and return the batch
    fn fetch_events(&mut self) -> Result<Vec<KeyEvent>, DeviceError>;
}

/// Source of input devices
pub trait InputProvider {
    type Device: InputDevice;

    /// Find and open the device matching `selector`, `Ok(None)` if absent
    fn open(&mut self, selector: &DeviceSelector) -> Result<Option<Self::Device>, DeviceError>;
}

/// Lifecycle of a [`DeviceConnection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Disconnected,
    Connecting,
    Connected,
}

/// Owns the grabbed scanner and turns it into a keystroke stream
pub struct DeviceConnection<P: InputProvider> {
    provider: P,
    selector: DeviceSelector,
    backoff: Backoff,
    handle: Option<P::Device>,
    pending: VecDeque<KeyEvent>,
    state: DeviceState,
}

impl<P: InputProvider> DeviceConnection<P> {
    pub fn new(provider: P, selector: DeviceSelector, backoff: Backoff) -> Self {
        Self {
            provider,
            selector,
            backoff,
            handle: None,
            pending: VecDeque::new(),
            state: DeviceState::Disconnected,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn selector(&self) -> &DeviceSelector {
        &self.selector
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Connect to the scanner, retrying forever
    pub fn connect(&mut self) {
        loop {
            match self.try_connect() {
                Ok(()) => return,
                Err(DeviceError::NotFound(selector)) => {
                    warn!(
                        "No scanner matching {} found. Trying again in {:?}.",
                        selector,
                        self.backoff.interval()
                    );
                }
                Err(e) => {
                    warn!(
                        "Could not connect to scanner: {}. Trying again in {:?}.",
                        e,
                        self.backoff.interval()
                    );
                }
            }
            self.backoff.wait();
        }
    }

    /// Single connection attempt.
    ///
    /// Any previously held device is ungrabbed and dropped first.
    pub fn try_connect(&mut self) -> Result<(), DeviceError> {
        self.release();
        self.state = DeviceState::Connecting;

        let mut device = self
            .provider
            .open(&self.selector)?
            .ok_or_else(|| DeviceError::NotFound(self.selector.clone()))?;
        device.grab()?;

        info!("Connected to scanner {}.", device.name());
        self.handle = Some(device);
        self.state = DeviceState::Connected;
        Ok(())
    }

    /// Ungrab and drop the current device, if any
    pub fn release(&mut self) {
        if let Some(mut device) = self.handle.take() {
            // The device is usually gone already when this runs
            if let Err(e) = device.ungrab() {
                debug!("Ungrab of {} failed: {}", device.name(), e);
            }
        }
        self.pending.clear();
        self.state = DeviceState::Disconnected;
    }

    /// Next event from the device, blocking until one arrives.
    ///
    /// A read error releases the device.
    pub fn next_event(&mut self) -> Result<KeyEvent, DeviceError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(event);
            }

            let device = self.handle.as_mut().ok_or(DeviceError::NotConnected)?;
            match device.fetch_events() {
                Ok(batch) => self.pending.extend(batch),
                Err(e) => {
                    self.release();
                    return Err(e);
                }
            }
        }
    }

    /// Lazy stream of events from the connected device.
    ///
    /// Yields a read error at most once and then ends.
    pub fn read_loop(&mut self) -> ReadLoop<'_, P> {
        ReadLoop {
            connection: self,
            done: false,
        }
    }
}

/// Iterator returned by [`DeviceConnection::read_loop`]
pub struct ReadLoop<'a, P: InputProvider> {
    connection: &'a mut DeviceConnection<P>,
    done: bool,
}

impl<P: InputProvider> Iterator for ReadLoop<'_, P> {
    type Item = Result<KeyEvent, DeviceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.connection.next_event() {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
