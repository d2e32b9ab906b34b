//! Assembles keystrokes into scanned codes

use super::keymap::{self, KeyCode, KeySymbol};
use super::KeyEvent;
use std::fmt;

/// A completed code, detached from the accumulator
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScannedCode(String);

impl ScannedCode {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ScannedCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The in-progress code was dropped because of an undecodable keystroke
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unmapped scancode {scancode}, discarded partial code {discarded:?}")]
pub struct DecodeError {
    pub scancode: KeyCode,
    /// Text that had been accumulated before the bad keystroke
    pub discarded: String,
}

/// Collects decoded key presses until the terminator arrives
#[derive(Debug, Default)]
pub struct CodeAccumulator {
    pending: Vec<KeySymbol>,
}

fn render(symbols: &[KeySymbol]) -> String {
    let mut out = String::with_capacity(symbols.len());
    for symbol in symbols {
        symbol.write_to(&mut out);
    }
    out
}

impl CodeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one event.
    ///
    /// Returns the completed code when `event` is a terminator press. An
    /// unmapped press discards the pending code and resets the buffer.
    pub fn on_keystroke(&mut self, event: &KeyEvent) -> Result<Option<ScannedCode>, DecodeError> {
        if !event.is_press() || event.key == KeyCode::LEFT_SHIFT {
            return Ok(None);
        }

        if event.key == KeyCode::TERMINATOR {
            let code = ScannedCode(render(&self.pending));
            self.pending.clear();
            return Ok(Some(code));
        }

        match keymap::decode(event.key) {
            Ok(symbol) => {
                self.pending.push(symbol);
                Ok(None)
            }
            Err(keymap::Unmapped(scancode)) => {
                let discarded = render(&self.pending);
                self.pending.clear();
                Err(DecodeError { scancode, discarded })
            }
        }
    }

    /// Symbols collected since the last terminator
    pub fn pending(&self) -> &[KeySymbol] {
        &self.pending
    }

    /// Pending symbols rendered as text
    pub fn pending_text(&self) -> String {
        render(&self.pending)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn reset(&mut self) {
        self.pending.clear();
    }
}
