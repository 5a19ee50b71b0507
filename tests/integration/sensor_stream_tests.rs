//! Integration tests for the serial side: decoding, throttled snapshots,
//! parse-health warnings and link loss.

use roverhub::app::events::ClientEvent;
use roverhub::app::service::RESYNC_WARNING;
use roverhub::sensor::codec::encode_reading;

use super::mock_hw::{Harness, reading};

const OP_START: u8 = 128;
const OP_STREAM: u8 = 148;

fn sensor_broadcasts(h: &Harness) -> usize {
    h.clients
        .broadcasts()
        .filter(|e| matches!(e, ClientEvent::SensorData(_)))
        .count()
}

fn warnings(h: &Harness) -> usize {
    h.clients
        .broadcasts()
        .filter(|e| matches!(e, ClientEvent::Warning(w) if w == RESYNC_WARNING))
        .count()
}

fn corrupted(voltage_mv: u16) -> Vec<u8> {
    let mut frame = encode_reading(&reading(voltage_mv, 2_000));
    if let Some(last) = frame.last_mut() {
        *last = last.wrapping_add(1);
    }
    frame
}

#[test]
fn start_requests_the_stream() {
    let h = Harness::new();
    assert_eq!(h.rover.writes.first().map(Vec::as_slice), Some(&[OP_START][..]));
    assert_eq!(h.rover.count(OP_STREAM), 1);
}

#[test]
fn snapshots_are_throttled_but_latest_is_kept() {
    let mut h = Harness::new();
    for mv in [16_000, 15_990, 15_980, 15_970] {
        h.reading(&reading(mv, 2_000));
    }
    assert_eq!(sensor_broadcasts(&h), 1);
    assert_eq!(h.service.latest().unwrap().reading.voltage_mv, 15_970);

    h.advance(100);
    assert_eq!(sensor_broadcasts(&h), 2);
    let last = h
        .clients
        .broadcasts()
        .filter_map(|e| match e {
            ClientEvent::SensorData(u) => Some(u.reading.voltage_mv),
            _ => None,
        })
        .last();
    assert_eq!(last, Some(15_970));
}

#[test]
fn new_client_gets_latest_snapshot() {
    let mut h = Harness::new();
    h.reading(&reading(16_000, 2_000));
    h.guest(1, "alice").unwrap();
    assert!(h.clients.sent.iter().any(|(to, e)| {
        *to == super::mock_hw::Recipient::One(1) && matches!(e, ClientEvent::SensorData(_))
    }));
}

#[test]
fn resync_warnings_are_throttled() {
    let mut h = Harness::new();
    h.feed(&corrupted(16_000));
    h.feed(&corrupted(15_000));
    assert_eq!(warnings(&h), 1);
    assert!(h.service.decoder_stats().checksum_errors >= 2);

    h.reading(&reading(16_000, 2_000));
    assert_eq!(sensor_broadcasts(&h), 1);

    h.advance(5_000);
    h.feed(&corrupted(16_000));
    assert_eq!(warnings(&h), 2);
}

#[test]
fn garbage_between_frames_is_skipped() {
    let mut h = Harness::new();
    let mut bytes = vec![0xFF, 0x00, 0x42, 0x02];
    bytes.extend(encode_reading(&reading(16_000, 2_000)));
    bytes.extend([0xAA; 7]);
    bytes.extend(encode_reading(&reading(15_500, 2_000)));
    for chunk in bytes.chunks(5) {
        h.feed(chunk);
    }
    assert_eq!(h.service.decoder_stats().frames, 2);
    assert_eq!(h.service.latest().unwrap().reading.voltage_mv, 15_500);
}

#[test]
fn commands_are_dropped_while_link_down() {
    let mut h = Harness::new();
    h.guest(1, "alice").unwrap();
    h.rover.link_up = false;
    let before = h.rover.writes.len();

    h.drive(1);
    assert_eq!(h.rover.writes.len(), before);
    // The intent itself still counts as activity.
    assert_eq!(h.service.gate().get(1).unwrap().last_drive_at, Some(0));

    h.rover.link_up = true;
    h.with_ports(|svc, ports, _| svc.on_link_restored(ports));
    assert_eq!(h.rover.count(OP_STREAM), 2);
    assert_eq!(h.rover.count(OP_START), 2);
}
