//! System configuration parameters
//!
//! All tunable parameters for the rover hub.  Values are read from a
//! JSON file at startup; any field left out keeps its default.

use serde::{Deserialize, Serialize};

use crate::access::AccessMode;
use crate::error::{Error, Result};
use crate::timer::Millis;

/// Shortest turn the scheduler will hand out.
pub const MIN_TURN_DURATION_MS: Millis = 5_000;

/// Core system configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoverConfig {
    pub serial: SerialConfig,
    pub server: ServerConfig,
    pub sensors: SensorConfig,
    pub battery: BatteryConfig,
    pub turns: TurnConfig,
    pub access: AccessConfig,
    pub idle_watch: IdleWatchConfig,
}

impl RoverConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json(text: &str) -> core::result::Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Reject values the core cannot run with and apply the two
    /// hardware-tuning clamps.
    pub fn validate(mut self) -> Result<Self> {
        let b = &mut self.battery;
        b.filter_alpha = b.filter_alpha.clamp(0.01, 1.0);
        b.full_charge_ratio = b.full_charge_ratio.clamp(0.5, 1.0);
        if b.empty_voltage_mv >= b.full_voltage_mv {
            return Err(Error::Config("battery.empty_voltage_mv must be below full_voltage_mv"));
        }
        if b.low_voltage_mv <= b.empty_voltage_mv || b.low_voltage_mv >= b.full_voltage_mv {
            return Err(Error::Config("battery.low_voltage_mv must lie between empty and full"));
        }
        if let RecoveryRule::ChargeRatio { ratio } = b.recovery {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(Error::Config("battery.recovery ratio must be within 0..=1"));
            }
        }

        let t = &self.turns;
        if t.turn_duration_ms < MIN_TURN_DURATION_MS {
            return Err(Error::Config("turns.turn_duration_ms must be at least 5000"));
        }
        if t.idle_grace_ms == 0 || t.idle_grace_ms >= t.turn_duration_ms {
            return Err(Error::Config("turns.idle_grace_ms must be shorter than a turn"));
        }
        if t.broadcast_interval_ms == 0 {
            return Err(Error::Config("turns.broadcast_interval_ms must be non-zero"));
        }

        let sn = &self.sensors;
        if sn.emit_interval_ms == 0 || sn.stats_report_interval_ms == 0 {
            return Err(Error::Config("sensors intervals must be non-zero"));
        }

        if self.serial.reconnect_initial_ms == 0
            || self.serial.reconnect_initial_ms > self.serial.reconnect_max_ms
        {
            return Err(Error::Config("serial reconnect backoff bounds are inverted"));
        }
        if self.server.intents_per_sec == 0 || self.server.intent_burst == 0 {
            return Err(Error::Config("server intent rate limit must be non-zero"));
        }
        Ok(self)
    }
}

// --- Serial link ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path of the rover's serial adapter
    pub port: String,
    pub baud_rate: u32,
    /// First reconnect delay; doubles per failure
    pub reconnect_initial_ms: Millis,
    /// Reconnect delay ceiling
    pub reconnect_max_ms: Millis,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".into(),
            baud_rate: 115_200,
            reconnect_initial_ms: 500,
            reconnect_max_ms: 30_000,
        }
    }
}

// --- Client transport ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address for JSON-lines clients
    pub listen: String,
    /// Service tick period (milliseconds)
    pub tick_interval_ms: Millis,
    /// Intents each client may send per second, sustained
    pub intents_per_sec: u64,
    /// Intents a client may send back to back
    pub intent_burst: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8787".into(),
            tick_interval_ms: 20,
            intents_per_sec: 30,
            intent_burst: 30,
        }
    }
}

// --- Sensor stream ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Minimum gap between sensor snapshots sent to clients
    pub emit_interval_ms: Millis,
    /// Minimum gap between resync warnings sent to clients
    pub warning_cooldown_ms: Millis,
    /// Parse error rate report window
    pub stats_report_interval_ms: Millis,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            emit_interval_ms: 100,
            warning_cooldown_ms: 5_000,
            stats_report_interval_ms: 10_000,
        }
    }
}

// --- Battery ---

/// Which signal decides that a low battery has recovered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecoveryRule {
    /// charge / capacity at or above `ratio`
    ChargeRatio { ratio: f32 },
    /// raw charge at or above `units` mAh
    ChargeUnits { units: u16 },
    /// filtered voltage at or above `millivolts`
    Voltage { millivolts: u16 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    /// Exponential smoothing factor for the voltage filter, (0, 1]
    pub filter_alpha: f32,
    pub empty_voltage_mv: u16,
    pub full_voltage_mv: u16,
    /// Filtered voltage at or below which the low dwell starts
    pub low_voltage_mv: u16,
    /// Extra headroom above `low_voltage_mv` before the clear dwell starts
    pub clear_margin_mv: u16,
    pub low_debounce_ms: Millis,
    pub clear_debounce_ms: Millis,
    /// Filtered voltage for the one-off urgent escalation
    pub urgent_voltage_mv: u16,
    /// charge / capacity treated as full
    pub full_charge_ratio: f32,
    pub recovery: RecoveryRule,
    pub alert_cooldown_ms: Millis,
    pub dock_reminder_ms: Millis,
    /// A gap longer than this restarts running dwell timers
    pub max_sample_gap_ms: Millis,
    pub autocharge_enabled: bool,
    pub autocharge_timeout_ms: Millis,
    pub alarm_interval_ms: Millis,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            filter_alpha: 0.25,
            empty_voltage_mv: 13_200,
            full_voltage_mv: 16_800,
            low_voltage_mv: 14_400,
            clear_margin_mv: 200,
            low_debounce_ms: 1_500,
            clear_debounce_ms: 2_500,
            urgent_voltage_mv: 13_800,
            full_charge_ratio: 0.98,
            recovery: RecoveryRule::ChargeRatio { ratio: 0.98 },
            alert_cooldown_ms: 10 * 60 * 1000,
            dock_reminder_ms: 2 * 60 * 1000,
            max_sample_gap_ms: 2_000,
            autocharge_enabled: true,
            autocharge_timeout_ms: 10_000,
            alarm_interval_ms: 5_000,
        }
    }
}

// --- Turns ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    pub turn_duration_ms: Millis,
    /// Time a new driver has to move before the turn is skipped
    pub idle_grace_ms: Millis,
    pub broadcast_interval_ms: Millis,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            turn_duration_ms: 120_000,
            idle_grace_ms: 7_000,
            broadcast_interval_ms: 1_000,
        }
    }
}

// --- Access ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Mode at startup
    pub default_mode: AccessMode,
    pub admins: Vec<AdminEntry>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            default_mode: AccessMode::Turns,
            admins: Vec::new(),
        }
    }
}

/// One administrator credential.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminEntry {
    pub name: String,
    pub password: String,
    /// Admitted even while the hub is locked down
    pub lockdown_bypass: bool,
}

// --- Idle watch ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleWatchConfig {
    pub enabled: bool,
    pub check_interval_ms: Millis,
    /// Time without drive commands before an undocked rover is "idle"
    pub idle_threshold_ms: Millis,
    pub reminder_interval_ms: Millis,
}

impl Default for IdleWatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_ms: 20_000,
            idle_threshold_ms: 60_000,
            reminder_interval_ms: 10 * 60 * 1000,
        }
    }
}
