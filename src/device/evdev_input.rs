//! evdev-backed scanner access for Linux

use super::{DeviceError, DeviceSelector, InputDevice, InputProvider};
use crate::keyboard::KeyEvent;
use log::debug;
use std::path::{Path, PathBuf};

const INPUT_DIR: &str = "/dev/input";

/// Finds scanners among `/dev/input/event*` devices
#[derive(Debug, Default)]
pub struct EvdevProvider;

impl EvdevProvider {
    pub fn new() -> Self {
        Self
    }
}

fn is_selected(device: &evdev::Device, selector: &DeviceSelector) -> bool {
    match selector {
        DeviceSelector::Name(name) => device.name() == Some(name.as_str()),
        DeviceSelector::UsbId { vendor, product } => {
            let id = device.input_id();
            id.vendor() == *vendor && id.product() == *product
        }
    }
}

impl InputProvider for EvdevProvider {
    type Device = EvdevDevice;

    fn open(&mut self, selector: &DeviceSelector) -> Result<Option<EvdevDevice>, DeviceError> {
        if !Path::new(INPUT_DIR).is_dir() {
            return Err(DeviceError::Enumeration(format!("{} does not exist", INPUT_DIR)));
        }

        // Devices we lack permission for are silently skipped by enumerate()
        for (path, device) in evdev::enumerate() {
            debug!("Found input device {} ({:?})", path.display(), device.name());
            if is_selected(&device, selector) {
                let name = device.name().unwrap_or("unnamed device").to_string();
                return Ok(Some(EvdevDevice { device, path, name }));
            }
        }
        Ok(None)
    }
}

/// An opened evdev input device
pub struct EvdevDevice {
    device: evdev::Device,
    path: PathBuf,
    name: String,
}

impl EvdevDevice {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InputDevice for EvdevDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn grab(&mut self) -> Result<(), DeviceError> {
        self.device.grab().map_err(|source| DeviceError::Grab {
            name: format!("{} ({})", self.name, self.path.display()),
            source,
        })
    }

    fn ungrab(&mut self) -> Result<(), DeviceError> {
        self.device.ungrab().map_err(DeviceError::Read)
    }

    fn fetch_events(&mut self) -> Result<Vec<KeyEvent>, DeviceError> {
        let events = self.device.fetch_events().map_err(DeviceError::Read)?;
        Ok(events
            .map(|event| KeyEvent::from_raw(event.event_type().0, event.code(), event.value()))
            .collect())
    }
}
