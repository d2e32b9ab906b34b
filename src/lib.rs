//! Scanner Bridge - forwards codes from a USB barcode scanner to MQTT
//!
//! The scanner presents itself as a keyboard. Its keystrokes are decoded into
//! codes, and every completed code is published as a retained message. Both
//! the device and the broker may disappear at any time; each side reconnects
//! on its own and scanning never waits for delivery.

pub mod broker;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod keyboard;
pub mod retry;
pub mod stats;
pub mod testing;

pub use config::Config;
