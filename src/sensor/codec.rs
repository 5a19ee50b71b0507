//! Streaming sensor frame decoder.
//!
//! Wire format:
//! ```text
//! ┌────────┬────────┬───────────────────────────────────┬──────────┐
//! │ 0x13   │ len n  │ (id, value) pairs, fixed order    │ checksum │
//! │ header │ 1 B    │ n bytes                           │ 1 B      │
//! └────────┴────────┴───────────────────────────────────┴──────────┘
//!          all frame bytes sum to 0 mod 256
//! ```
//!
//! The decoder accumulates incoming bytes and yields complete readings.
//! A single serial read may carry part of a frame, several frames, or
//! line noise.  Any candidate frame that fails validation gives up one
//! byte and the search for the next header starts again, so a real frame
//! hiding behind garbage is always found.

use log::debug;
use serde::Serialize;

use super::{FULL_PAYLOAD_LEN, PACKET_IDS, REQUIRED_IDS, SensorReading, Width, packet_width};
use crate::error::FrameError;

/// Stream frame header byte.
pub const HEADER: u8 = 19;

/// Header, length and checksum bytes around the payload.
const FRAME_OVERHEAD: usize = 3;

/// Bytes searched for a header before the scanned window is dropped.
pub const MAX_SCAN: usize = 5 * (FULL_PAYLOAD_LEN + FRAME_OVERHEAD);

/// Running decoder counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecoderStats {
    pub frames: u64,
    pub checksum_errors: u64,
    pub unexpected_ids: u64,
    pub truncated: u64,
    pub bad_lengths: u64,
    pub missing_required: u64,
    pub bytes_discarded: u64,
}

impl DecoderStats {
    /// Total protocol faults (missing fields are not faults).
    pub fn faults(&self) -> u64 {
        self.checksum_errors + self.unexpected_ids + self.truncated + self.bad_lengths
    }

    fn record(&mut self, err: FrameError) {
        match err {
            FrameError::BadLength(_) => self.bad_lengths += 1,
            FrameError::Checksum => self.checksum_errors += 1,
            FrameError::UnexpectedId { .. } => self.unexpected_ids += 1,
            FrameError::Truncated { .. } => self.truncated += 1,
        }
    }
}

/// Streaming sensor decoder.
pub struct StreamDecoder {
    buf: Vec<u8>,
    /// Values carried into frames that omit trailing packets.
    last: SensorReading,
    stats: DecoderStats,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(MAX_SCAN),
            last: SensorReading::default(),
            stats: DecoderStats::default(),
        }
    }

    /// Append raw serial bytes.  Call [`poll`](Self::poll) until it
    /// returns `None` to drain every complete frame.
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Decode the next frame from the buffered bytes.
    ///
    /// Returns `Some(Ok(reading))` for a valid frame, `Some(Err(_))` for
    /// a rejected candidate (one byte already dropped), and `None` when
    /// more bytes are needed.  Frames missing a required packet are
    /// skipped without being reported.
    pub fn poll(&mut self) -> Option<Result<SensorReading, FrameError>> {
        loop {
            let scan = self.buf.len().min(MAX_SCAN);
            match self.buf[..scan].iter().position(|&b| b == HEADER) {
                Some(0) => {}
                Some(offset) => self.discard(offset),
                None => {
                    self.discard(scan);
                    if self.buf.is_empty() {
                        return None;
                    }
                    continue;
                }
            }

            if self.buf.len() < 2 {
                return None;
            }

            let len = usize::from(self.buf[1]);
            if len == 0 || len > FULL_PAYLOAD_LEN {
                return Some(Err(self.reject(FrameError::BadLength(self.buf[1]))));
            }

            let total = len + FRAME_OVERHEAD;
            if self.buf.len() < total {
                return None;
            }

            let sum = self.buf[..total]
                .iter()
                .fold(0u8, |acc, &b| acc.wrapping_add(b));
            if sum != 0 {
                return Some(Err(self.reject(FrameError::Checksum)));
            }

            match parse_payload(&self.buf[2..2 + len], self.last) {
                Err(e) => return Some(Err(self.reject(e))),
                Ok((reading, complete)) => {
                    self.buf.drain(..total);
                    if !complete {
                        self.stats.missing_required += 1;
                        debug!("decoder: frame without battery packets skipped");
                        continue;
                    }
                    self.stats.frames += 1;
                    self.last = reading;
                    return Some(Ok(reading));
                }
            }
        }
    }

    /// Drop any partial frame (e.g. after a serial reconnect).
    pub fn reset(&mut self) {
        self.stats.bytes_discarded += self.buf.len() as u64;
        self.buf.clear();
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Bytes waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    fn reject(&mut self, err: FrameError) -> FrameError {
        self.stats.record(err);
        self.discard(1);
        err
    }

    fn discard(&mut self, n: usize) {
        self.buf.drain(..n);
        self.stats.bytes_discarded += n as u64;
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Walk `payload` in the agreed packet order on top of `base`.
///
/// Returns the updated reading and whether every required packet was present.
fn parse_payload(payload: &[u8], base: SensorReading) -> Result<(SensorReading, bool), FrameError> {
    let mut reading = base;
    let mut seen = [false; PACKET_IDS.len()];
    let mut offset = 0;

    for (slot, &expected) in PACKET_IDS.iter().enumerate() {
        if offset == payload.len() {
            break;
        }
        let found = payload[offset];
        if found != expected {
            return Err(FrameError::UnexpectedId { expected, found });
        }
        let width = packet_width(expected);
        let value = payload
            .get(offset + 1..offset + 1 + width.len())
            .ok_or(FrameError::Truncated { id: expected })?;
        let raw = match width {
            Width::U8 => u16::from(value[0]),
            Width::U16 | Width::I16 => u16::from_be_bytes([value[0], value[1]]),
        };
        reading.set_packet(expected, raw);
        seen[slot] = true;
        offset += 1 + width.len();
    }

    let complete = REQUIRED_IDS.iter().all(|id| {
        PACKET_IDS
            .iter()
            .position(|p| p == id)
            .is_some_and(|slot| seen[slot])
    });
    Ok((reading, complete))
}

// ───────────────────────────────────────────────────────────────
// Encoding
// ───────────────────────────────────────────────────────────────

/// Wrap `payload` with header, length and checksum.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    frame.push(HEADER);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    let sum = frame.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    frame.push(0u8.wrapping_sub(sum));
    frame
}

/// Payload carrying the first `packets` packets of `reading`.
pub fn encode_payload(reading: &SensorReading, packets: usize) -> Vec<u8> {
    let mut payload = Vec::with_capacity(FULL_PAYLOAD_LEN);
    for &id in PACKET_IDS.iter().take(packets) {
        payload.push(id);
        let raw = reading.packet(id);
        match packet_width(id) {
            Width::U8 => payload.push(raw as u8),
            Width::U16 | Width::I16 => payload.extend_from_slice(&raw.to_be_bytes()),
        }
    }
    payload
}

/// A complete frame carrying every packet of `reading`.
pub fn encode_reading(reading: &SensorReading) -> Vec<u8> {
    encode_frame(&encode_payload(reading, PACKET_IDS.len()))
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
