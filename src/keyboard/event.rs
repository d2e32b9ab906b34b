//! Keystroke event types

use super::KeyCode;
use std::time::Instant;

/// Kernel event type for key transitions
pub const EV_KEY: u16 = 0x01;

/// Type of keyboard event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventType {
    /// Key was pressed down
    Press,
    /// Key was released
    Release,
    /// Autorepeat while held
    Repeat,
    /// Not a key transition (sync, misc, LED...)
    Other,
}

/// A keystroke event read from the scanner
#[derive(Debug, Clone)]
pub struct KeyEvent {
    /// The key code
    pub key: KeyCode,
    /// Type of event
    pub event_type: KeyEventType,
    /// When the event was read
    pub timestamp: Instant,
}

impl KeyEvent {
    pub fn new(key: KeyCode, event_type: KeyEventType, timestamp: Instant) -> Self {
        Self {
            key,
            event_type,
            timestamp,
        }
    }

    pub fn press(key: impl Into<KeyCode>) -> Self {
        Self::new(key.into(), KeyEventType::Press, Instant::now())
    }

    pub fn release(key: impl Into<KeyCode>) -> Self {
        Self::new(key.into(), KeyEventType::Release, Instant::now())
    }

    /// Build an event from the raw `{type, code, value}` triple of an input event.
    ///
    /// Key values are 0 = release, 1 = press, 2 = repeat.
    pub fn from_raw(event_type: u16, code: u16, value: i32) -> Self {
        let event_type = match (event_type, value) {
            (EV_KEY, 0) => KeyEventType::Release,
            (EV_KEY, 1) => KeyEventType::Press,
            (EV_KEY, 2) => KeyEventType::Repeat,
            _ => KeyEventType::Other,
        };
        Self::new(KeyCode(code), event_type, Instant::now())
    }

    pub fn is_press(&self) -> bool {
        self.event_type == KeyEventType::Press
    }
}
