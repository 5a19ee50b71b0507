//! Rover Open Interface command encoders.
//!
//! Every command is a short, fixed-width byte buffer written to the
//! serial link fire-and-forget.  Multi-byte values are big-endian.
//!
//! ```text
//! ┌────────┬──────────────────────────────┐
//! │ opcode │ operands (0..n bytes)        │
//! └────────┴──────────────────────────────┘
//! ```

use crate::sensor::PACKET_IDS;

pub const OP_START: u8 = 128;
pub const OP_SAFE: u8 = 131;
pub const OP_SONG: u8 = 140;
pub const OP_PLAY: u8 = 141;
pub const OP_DOCK: u8 = 143;
pub const OP_PWM_MOTORS: u8 = 144;
pub const OP_DRIVE_DIRECT: u8 = 145;
pub const OP_STREAM: u8 = 148;
pub const OP_PAUSE_STREAM: u8 = 150;

/// Wheel velocity limit in mm/s.
pub const MAX_WHEEL_SPEED: i16 = 500;

/// Song slot reserved for the low-battery alarm.
pub const ALARM_SONG: u8 = 0;
const ALARM_NOTE: u8 = 78;
const ALARM_NOTE_LEN: u8 = 15;

/// Fixed-capacity command buffer (the longest command is the stream request).
pub type Command = heapless::Vec<u8, 32>;

fn command(bytes: &[u8]) -> Command {
    // Every encoder below emits well under the buffer capacity.
    let mut cmd = Command::new();
    let _ = cmd.extend_from_slice(bytes);
    cmd
}

pub fn start() -> Command {
    command(&[OP_START])
}

pub fn safe() -> Command {
    command(&[OP_SAFE])
}

/// Seek the home base and begin charging.
pub fn dock() -> Command {
    command(&[OP_DOCK])
}

/// Independent wheel velocities, clamped to ±500 mm/s.
pub fn drive_direct(right: i16, left: i16) -> Command {
    let [rh, rl] = right.clamp(-MAX_WHEEL_SPEED, MAX_WHEEL_SPEED).to_be_bytes();
    let [lh, ll] = left.clamp(-MAX_WHEEL_SPEED, MAX_WHEEL_SPEED).to_be_bytes();
    command(&[OP_DRIVE_DIRECT, rh, rl, lh, ll])
}

/// Brush and vacuum duty: brushes −127..127, vacuum 0..127.
pub fn aux_motors(main_brush: i8, side_brush: i8, vacuum: u8) -> Command {
    let main = main_brush.max(-127) as u8;
    let side = side_brush.max(-127) as u8;
    command(&[OP_PWM_MOTORS, main, side, vacuum.min(127)])
}

/// Stop both wheels and every auxiliary motor.
pub fn halt() -> [Command; 2] {
    [drive_direct(0, 0), aux_motors(0, 0, 0)]
}

/// Define `song` as a sequence of (note, duration in 1/64 s) pairs.
pub fn define_song(song: u8, notes: &[(u8, u8)]) -> Command {
    let mut cmd = command(&[OP_SONG, song, notes.len() as u8]);
    for &(note, len) in notes {
        if cmd.extend_from_slice(&[note, len]).is_err() {
            break;
        }
    }
    cmd
}

pub fn play_song(song: u8) -> Command {
    command(&[OP_PLAY, song])
}

/// Define and play the low-battery tone.
pub fn alarm_tone() -> [Command; 2] {
    [
        define_song(ALARM_SONG, &[(ALARM_NOTE, ALARM_NOTE_LEN)]),
        play_song(ALARM_SONG),
    ]
}

/// Ask the rover to stream the full packet list every 15 ms.
pub fn stream_sensors() -> Command {
    let mut cmd = command(&[OP_STREAM, PACKET_IDS.len() as u8]);
    let _ = cmd.extend_from_slice(&PACKET_IDS);
    cmd
}

pub fn pause_stream() -> Command {
    command(&[OP_PAUSE_STREAM, 0])
}
