//! Integration tests for Scanner Bridge
//!
//! These tests drive the full pipeline: scripted device events through the
//! dispatcher and delivery queue to a scripted broker transport.

use scanner_bridge::broker::{BrokerConnection, Message};
use scanner_bridge::config::{BrokerConfig, Config};
use scanner_bridge::device::{DeviceConnection, DeviceSelector, DeviceState};
use scanner_bridge::dispatch::{DeliveryWorker, ScanDispatcher};
use scanner_bridge::keyboard::{decode, CodeAccumulator, KeyCode, KeyEvent, KeySymbol, ScannedCode};
use scanner_bridge::retry::Backoff;
use scanner_bridge::stats::ScanStats;
use scanner_bridge::testing::{presses, ScriptedProvider, ScriptedTransport, Step, TransportLog};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn device(provider: ScriptedProvider) -> DeviceConnection<ScriptedProvider> {
    DeviceConnection::new(
        provider,
        DeviceSelector::Name("Symbol Bar Code Scanner".to_string()),
        Backoff::immediate(),
    )
}

/// Start a delivery worker over a scripted transport
fn start_worker(
    transport: ScriptedTransport,
    stats: &Arc<ScanStats>,
) -> (Sender<ScannedCode>, JoinHandle<()>, TransportLog) {
    let log = transport.log();
    let broker = BrokerConnection::new(transport, Backoff::immediate()).with_stats(stats.clone());
    let worker = DeliveryWorker::new(
        broker,
        &BrokerConfig::default(),
        Duration::from_millis(5),
        stats.clone(),
    );
    let (tx, handle) = worker.spawn().expect("spawn delivery worker");
    (tx, handle, log)
}

fn payloads(messages: &[Message]) -> Vec<String> {
    messages.iter().map(|m| m.payload_str().into_owned()).collect()
}

fn feed(acc: &mut CodeAccumulator, codes: &[u16]) -> Vec<ScannedCode> {
    codes
        .iter()
        .filter_map(|&c| acc.on_keystroke(&KeyEvent::press(c)).expect("decodable"))
        .collect()
}

// ---------------------------------------------------------------------------
// Decoding and accumulation
// ---------------------------------------------------------------------------

#[test]
fn buffer_tracks_mappable_presses_without_terminator() {
    let mut acc = CodeAccumulator::new();
    let keys = [42, 30, 31, 42, 2, 15, 52];
    for &k in &keys {
        assert_eq!(acc.on_keystroke(&KeyEvent::press(k)), Ok(None));
        assert_eq!(acc.on_keystroke(&KeyEvent::release(k)), Ok(None));
    }
    // Two shift presses carry no payload
    assert_eq!(acc.pending_len(), keys.len() - 2);
}

#[test]
fn code_is_concatenation_of_decoded_presses() {
    let mut acc = CodeAccumulator::new();
    let keys = [2, 3, 42, 30, 12, 44, 52];

    let mut expected = String::new();
    for &k in &keys {
        if KeyCode(k) != KeyCode::LEFT_SHIFT {
            decode(KeyCode(k)).unwrap().write_to(&mut expected);
        }
    }

    let mut input = keys.to_vec();
    input.push(28);
    assert_eq!(feed(&mut acc, &input), vec![ScannedCode::new(expected.clone())]);
    assert_eq!(expected, "12A-Z.");
    assert!(acc.is_empty());
}

#[test]
fn decode_matches_table() {
    assert_eq!(decode(KeyCode(30)), Ok(KeySymbol::Char('A')));
    assert!(decode(KeyCode(57)).is_err());
    assert!(decode(KeyCode(55)).is_err());
}

// ---------------------------------------------------------------------------
// Full pipeline
// ---------------------------------------------------------------------------

#[test]
fn scanned_codes_reach_the_broker() {
    let stats = Arc::new(ScanStats::new());
    let (tx, handle, log) = start_worker(ScriptedTransport::new(), &stats);

    let provider = ScriptedProvider::new().device(vec![
        presses(&[16, 17, 28]),
        presses(&[42, 30, 28]),
        Step::ReadError,
    ]);
    let mut dispatcher = ScanDispatcher::new(device(provider), tx, stats.clone());
    dispatcher.device_mut().connect();
    dispatcher.run_session();

    drop(dispatcher);
    handle.join().unwrap();

    assert_eq!(payloads(&log.delivered()), vec!["QW", "A"]);
    assert!(log.delivered().iter().all(|m| m.retain));
    assert_eq!(stats.snapshot().delivered, 2);
    assert_eq!(stats.snapshot().in_flight(), 0);
}

#[test]
fn failed_publish_is_retried_with_identical_payload() {
    let stats = Arc::new(ScanStats::new());
    let transport = ScriptedTransport::new().publishes(&[false, true]);
    let (tx, handle, log) = start_worker(transport, &stats);

    let provider = ScriptedProvider::new().device(vec![
        presses(&[5, 6, 7, 28]),
        Step::ReadError,
    ]);
    let mut dispatcher = ScanDispatcher::new(device(provider), tx, stats.clone());
    dispatcher.device_mut().connect();
    dispatcher.run_session();

    drop(dispatcher);
    handle.join().unwrap();

    let attempts = log.publish_attempts();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].payload, attempts[1].payload);
    assert_eq!(attempts[0].payload, b"456".to_vec());
    assert_eq!(payloads(&log.delivered()), vec!["456"]);
    assert_eq!(stats.snapshot().publish_retries, 1);
    assert_eq!(stats.snapshot().broker_reconnects, 1);
}

#[test]
fn broker_outage_at_startup_does_not_block_scanning() {
    let stats = Arc::new(ScanStats::new());
    let transport = ScriptedTransport::new().connects(&[false, false, false, true]);
    let (tx, handle, log) = start_worker(transport, &stats);

    let provider = ScriptedProvider::new().device(vec![
        presses(&[2, 28]),
        presses(&[3, 28]),
        Step::ReadError,
    ]);
    let mut dispatcher = ScanDispatcher::new(device(provider), tx, stats.clone());
    dispatcher.device_mut().connect();
    dispatcher.run_session();
    assert_eq!(dispatcher.stats().snapshot().scanned, 2);

    drop(dispatcher);
    handle.join().unwrap();

    assert_eq!(log.connect_attempts(), 4);
    assert_eq!(payloads(&log.delivered()), vec!["1", "2"]);
}

#[test]
fn partial_code_survives_device_reconnect() {
    let stats = Arc::new(ScanStats::new());
    let (tx, handle, log) = start_worker(ScriptedTransport::new(), &stats);

    let provider = ScriptedProvider::new()
        .missing()
        .device(vec![presses(&[46, 47]), Step::ReadError])
        .missing()
        .device(vec![presses(&[48, 28]), Step::ReadError]);
    let provider_log = provider.log();
    let mut dispatcher = ScanDispatcher::new(device(provider), tx, stats.clone());

    dispatcher.device_mut().connect();
    dispatcher.run_session();
    assert_eq!(dispatcher.device().state(), DeviceState::Disconnected);
    assert_eq!(dispatcher.accumulator().pending_text(), "CV");

    dispatcher.device_mut().connect();
    dispatcher.run_session();

    drop(dispatcher);
    handle.join().unwrap();

    assert_eq!(payloads(&log.delivered()), vec!["CVB"]);
    assert_eq!(provider_log.opens(), 4);
    assert_eq!(provider_log.live_handles(), 0);
}

#[test]
fn unmapped_scancode_drops_only_the_current_code() {
    let stats = Arc::new(ScanStats::new());
    let (tx, handle, log) = start_worker(ScriptedTransport::new(), &stats);

    let provider = ScriptedProvider::new().device(vec![
        presses(&[30, 31]),
        presses(&[88, 32, 28]),
        presses(&[33, 28]),
        Step::ReadError,
    ]);
    let mut dispatcher = ScanDispatcher::new(device(provider), tx, stats.clone());
    dispatcher.device_mut().connect();
    dispatcher.run_session();

    drop(dispatcher);
    handle.join().unwrap();

    assert_eq!(payloads(&log.delivered()), vec!["D", "F"]);
    assert_eq!(stats.snapshot().decode_errors, 1);
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn config_file_drives_worker_topic() {
    let config: Config = toml::from_str(
        r#"
[broker]
topic = "shop/scanner"
retain = false
"#,
    )
    .expect("parse config");
    config.validate().expect("valid config");

    let stats = Arc::new(ScanStats::new());
    let transport = ScriptedTransport::new();
    let log = transport.log();
    let broker = BrokerConnection::new(transport, Backoff::immediate());
    let worker = DeliveryWorker::new(broker, &config.broker, Duration::from_millis(5), stats);
    let (tx, handle) = worker.spawn().expect("spawn delivery worker");

    tx.send(ScannedCode::new("X1")).unwrap();
    drop(tx);
    handle.join().unwrap();

    let delivered = log.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].topic, "shop/scanner");
    assert!(!delivered[0].retain);
}
