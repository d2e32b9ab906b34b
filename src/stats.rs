//! Running counters shared by the scan and delivery threads

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-lifetime counters. Cheap to bump from any thread.
#[derive(Debug, Default)]
pub struct ScanStats {
    scanned: AtomicU64,
    delivered: AtomicU64,
    publish_retries: AtomicU64,
    decode_errors: AtomicU64,
    device_reconnects: AtomicU64,
    broker_reconnects: AtomicU64,
}

/// Point-in-time copy of [`ScanStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Codes completed by the accumulator
    pub scanned: u64,
    /// Codes confirmed written to the broker
    pub delivered: u64,
    /// Publish attempts beyond the first
    pub publish_retries: u64,
    /// Codes discarded because of unmapped scancodes
    pub decode_errors: u64,
    pub device_reconnects: u64,
    pub broker_reconnects: u64,
}

impl ScanStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_scanned(&self) {
        self.scanned.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delivered code that took `attempts` publishes
    pub fn record_delivered(&self, attempts: u64) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        self.publish_retries
            .fetch_add(attempts.saturating_sub(1), Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_device_reconnect(&self) {
        self.device_reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broker_reconnect(&self) {
        self.broker_reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            scanned: self.scanned.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            publish_retries: self.publish_retries.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            device_reconnects: self.device_reconnects.load(Ordering::Relaxed),
            broker_reconnects: self.broker_reconnects.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Codes scanned but not yet confirmed delivered
    pub fn in_flight(&self) -> u64 {
        self.scanned.saturating_sub(self.delivered)
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scanned={} delivered={} in_flight={} retries={} decode_errors={} device_reconnects={} broker_reconnects={}",
            self.scanned,
            self.delivered,
            self.in_flight(),
            self.publish_retries,
            self.decode_errors,
            self.device_reconnects,
            self.broker_reconnects,
        )
    }
}
