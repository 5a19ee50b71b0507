//! Sensor packet layout and the decoded reading.
//!
//! The rover streams a fixed list of packets.  Each packet is an id
//! byte followed by a big-endian value of a fixed width:
//!
//! ```text
//!  id  21  25  26  34  35  22  57  23  46..51  27  55  54  7  28..31  15  56  14
//!  w    1   2   2   1   1   2   2   2   2×6      2   2   2  1   2×4     1   2   1
//! ```
//!
//! The order is agreed in advance; the decoder rejects any frame where
//! an id shows up out of place.

pub mod codec;
pub mod health;

use serde::Serialize;

/// Packet ids in stream order.
pub const PACKET_IDS: [u8; 25] = [
    21, 25, 26, 34, 35, 22, 57, 23, 46, 47, 48, 49, 50, 51, 27, 55, 54, 7, 28, 29, 30, 31, 15, 56,
    14,
];

/// Packets the battery logic cannot run without.
pub const REQUIRED_IDS: [u8; 5] = [21, 25, 26, 34, 22];

/// Payload length when every packet is present.
pub const FULL_PAYLOAD_LEN: usize = {
    let mut total = 0;
    let mut i = 0;
    while i < PACKET_IDS.len() {
        total += 1 + packet_width(PACKET_IDS[i]).len();
        i += 1;
    }
    total
};

/// Charging-state codes that mean current is flowing into the pack.
const CHARGING_CODES: [u8; 4] = [1, 2, 3, 4];

/// Charging-sources bit for the home base.
const HOME_BASE: u8 = 0b0000_0010;

// ---------------------------------------------------------------------------
// Packet widths
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    U8,
    U16,
    I16,
}

impl Width {
    pub const fn len(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 | Self::I16 => 2,
        }
    }
}

/// Width and signedness of every packet this crate understands.
pub const fn packet_width(id: u8) -> Width {
    match id {
        7 | 14 | 15 | 21 | 34 | 35 => Width::U8,
        23 | 54 | 55 | 56 | 57 => Width::I16,
        _ => Width::U16,
    }
}

// ---------------------------------------------------------------------------
// Flag bytes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BumpFlags {
    pub bump_right: bool,
    pub bump_left: bool,
    pub wheel_drop_right: bool,
    pub wheel_drop_left: bool,
}

impl BumpFlags {
    pub fn from_bits(bits: u8) -> Self {
        Self {
            bump_right: bits & 0x01 != 0,
            bump_left: bits & 0x02 != 0,
            wheel_drop_right: bits & 0x04 != 0,
            wheel_drop_left: bits & 0x08 != 0,
        }
    }

    pub fn bits(self) -> u8 {
        u8::from(self.bump_right)
            | u8::from(self.bump_left) << 1
            | u8::from(self.wheel_drop_right) << 2
            | u8::from(self.wheel_drop_left) << 3
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overcurrents {
    pub left_wheel: bool,
    pub right_wheel: bool,
    pub main_brush: bool,
    pub side_brush: bool,
}

impl Overcurrents {
    pub fn from_bits(bits: u8) -> Self {
        Self {
            left_wheel: bits & 0x10 != 0,
            right_wheel: bits & 0x08 != 0,
            main_brush: bits & 0x04 != 0,
            side_brush: bits & 0x01 != 0,
        }
    }

    pub fn bits(self) -> u8 {
        (u8::from(self.left_wheel) << 4)
            | (u8::from(self.right_wheel) << 3)
            | (u8::from(self.main_brush) << 2)
            | u8::from(self.side_brush)
    }
}

// ---------------------------------------------------------------------------
// Decoded reading
// ---------------------------------------------------------------------------

/// One decoded sensor frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    pub charging_state: u8,
    pub charge_mah: u16,
    pub capacity_mah: u16,
    pub charging_sources: u8,
    pub oi_mode: u8,
    pub voltage_mv: u16,
    pub side_brush_current: i16,
    pub battery_current: i16,
    pub light_bumps: [u16; 6],
    pub wall_signal: u16,
    pub right_motor_current: i16,
    pub left_motor_current: i16,
    pub bumps: BumpFlags,
    pub cliff_signals: [u16; 4],
    pub dirt_detect: u8,
    pub main_brush_current: i16,
    pub overcurrents: Overcurrents,
}

impl SensorReading {
    pub fn is_charging(&self) -> bool {
        CHARGING_CODES.contains(&self.charging_state)
    }

    pub fn is_docked(&self) -> bool {
        self.charging_sources & HOME_BASE != 0
    }

    /// Store the raw big-endian value of packet `id`.
    pub(crate) fn set_packet(&mut self, id: u8, raw: u16) {
        let signed = raw as i16;
        let byte = raw as u8;
        match id {
            21 => self.charging_state = byte,
            25 => self.charge_mah = raw,
            26 => self.capacity_mah = raw,
            34 => self.charging_sources = byte,
            35 => self.oi_mode = byte,
            22 => self.voltage_mv = raw,
            57 => self.side_brush_current = signed,
            23 => self.battery_current = signed,
            46..=51 => self.light_bumps[usize::from(id - 46)] = raw,
            27 => self.wall_signal = raw,
            55 => self.right_motor_current = signed,
            54 => self.left_motor_current = signed,
            7 => self.bumps = BumpFlags::from_bits(byte),
            28..=31 => self.cliff_signals[usize::from(id - 28)] = raw,
            15 => self.dirt_detect = byte,
            56 => self.main_brush_current = signed,
            14 => self.overcurrents = Overcurrents::from_bits(byte),
            _ => {}
        }
    }

    /// Raw value of packet `id`, as it would appear on the wire.
    pub(crate) fn packet(&self, id: u8) -> u16 {
        match id {
            21 => self.charging_state.into(),
            25 => self.charge_mah,
            26 => self.capacity_mah,
            34 => self.charging_sources.into(),
            35 => self.oi_mode.into(),
            22 => self.voltage_mv,
            57 => self.side_brush_current as u16,
            23 => self.battery_current as u16,
            46..=51 => self.light_bumps[usize::from(id - 46)],
            27 => self.wall_signal,
            55 => self.right_motor_current as u16,
            54 => self.left_motor_current as u16,
            7 => self.bumps.bits().into(),
            28..=31 => self.cliff_signals[usize::from(id - 28)],
            15 => self.dirt_detect.into(),
            56 => self.main_brush_current as u16,
            14 => self.overcurrents.bits().into(),
            _ => 0,
        }
    }
}
