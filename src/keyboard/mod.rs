//! Keystroke decoding and code assembly

mod accumulator;
mod event;
pub mod keymap;

pub use accumulator::{CodeAccumulator, DecodeError, ScannedCode};
pub use event::{KeyEvent, KeyEventType, EV_KEY};
pub use keymap::{decode, ControlKey, KeyCode, KeySymbol, SCANCODE_TABLE};
