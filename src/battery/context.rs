//! Blackboard threaded through every battery state handler.
//!
//! The facade writes the latest sample and the scheduler's view into
//! `BatteryContext` before each tick; handlers read it and push
//! [`BatteryEffect`]s that the service turns into messages and pause
//! requests afterwards.

use crate::config::{BatteryConfig, RecoveryRule};
use crate::scheduler::PauseReason;
use crate::sensor::SensorReading;
use crate::timer::Millis;

use super::trend::BatteryTrend;

// ---------------------------------------------------------------------------
// Charge sample
// ---------------------------------------------------------------------------

/// The fields of a sensor reading the battery logic looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChargeSample {
    pub charging: bool,
    pub docked: bool,
    pub charge_mah: u16,
    pub capacity_mah: u16,
    pub voltage_mv: u16,
}

impl From<&SensorReading> for ChargeSample {
    fn from(r: &SensorReading) -> Self {
        Self {
            charging: r.is_charging(),
            docked: r.is_docked(),
            charge_mah: r.charge_mah,
            capacity_mah: r.capacity_mah,
            voltage_mv: r.voltage_mv,
        }
    }
}

// ---------------------------------------------------------------------------
// Effects (written by handlers; drained by the facade)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatteryEffect {
    /// Low battery alert for everyone; `summary` is "NN% / V.VVV".
    LowAlert { summary: String },
    /// One-off escalation once the filtered voltage sinks past urgent.
    UrgentAlert { summary: String },
    /// Rover is docked and charging.
    ChargingNotice { summary: String, turns_mode: bool },
    /// Rover still needs charge and is not on the dock.
    DockReminder { summary: String },
    /// Warning cleared.
    Recovered { summary: String, turns_mode: bool },
    /// Ask the scheduler to pause turns for charging.
    RequestPause,
    /// Lift a charging pause this machine placed.
    ReleasePause,
}

impl BatteryEffect {
    /// User-facing text, for the effects that carry one.
    pub fn notice(&self) -> Option<String> {
        let text = match self {
            Self::LowAlert { summary } => {
                format!("Battery low ({summary}). Please dock the rover to charge.")
            }
            Self::UrgentAlert { summary } => {
                format!("Battery critically low ({summary}). Dock the rover immediately.")
            }
            Self::ChargingNotice {
                summary,
                turns_mode: true,
            } => format!(
                "Battery charging ({summary}). Turns are paused until charging completes."
            ),
            Self::ChargingNotice { summary, .. } => format!(
                "Battery charging ({summary}). Please keep the rover docked until it finishes."
            ),
            Self::DockReminder { summary } => format!(
                "Battery still low ({summary}). Please dock the rover as soon as possible."
            ),
            Self::Recovered {
                summary,
                turns_mode: true,
            } => format!("Battery recovered ({summary}). Turns have resumed."),
            Self::Recovered { summary, .. } => format!("Battery recovered ({summary})."),
            Self::RequestPause | Self::ReleasePause => return None,
        };
        Some(text)
    }

    /// Low and urgent alerts also go to the alert hook.
    pub fn is_alert(&self) -> bool {
        matches!(self, Self::LowAlert { .. } | Self::UrgentAlert { .. })
    }
}

// ---------------------------------------------------------------------------
// Latched per-episode state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct EpisodeState {
    pub last_alert_at: Option<Millis>,
    pub last_dock_reminder_at: Option<Millis>,
    pub charging_pause_notified: bool,
    pub urgent_notified: bool,
}

// ---------------------------------------------------------------------------
// BatteryContext
// ---------------------------------------------------------------------------

pub struct BatteryContext {
    // -- Timing --
    pub now: Millis,

    // -- Inputs --
    pub sample: ChargeSample,
    pub trend: BatteryTrend,
    /// Turns mode is the active access mode.
    pub turns_mode: bool,
    /// Scheduler's current pause, if any.
    pub pause_reason: Option<PauseReason>,

    // -- Latches --
    pub episode: EpisodeState,

    // -- Outputs --
    pub effects: Vec<BatteryEffect>,

    pub config: BatteryConfig,
}

impl BatteryContext {
    pub fn new(config: BatteryConfig) -> Self {
        Self {
            now: 0,
            sample: ChargeSample::default(),
            trend: BatteryTrend::new(),
            turns_mode: false,
            pause_reason: None,
            episode: EpisodeState::default(),
            effects: Vec::new(),
            config,
        }
    }

    /// charge / capacity, when capacity is known.
    pub fn charge_ratio(&self) -> Option<f32> {
        (self.sample.capacity_mah > 0)
            .then(|| f32::from(self.sample.charge_mah) / f32::from(self.sample.capacity_mah))
    }

    pub fn reached_full_charge(&self) -> bool {
        self.charge_ratio()
            .is_some_and(|r| r >= self.config.full_charge_ratio)
    }

    /// Whether the configured recovery signal says the pack is good again.
    pub fn recovered(&self) -> bool {
        match self.config.recovery {
            RecoveryRule::ChargeRatio { ratio } => self.charge_ratio().is_some_and(|r| r >= ratio),
            RecoveryRule::ChargeUnits { units } => self.sample.charge_mah >= units,
            RecoveryRule::Voltage { millivolts } => self
                .trend
                .filtered_mv()
                .is_some_and(|v| v >= f32::from(millivolts)),
        }
    }

    pub fn percentage(&self) -> u8 {
        self.trend.percentage(&self.config)
    }

    /// "NN% / V.VVV" for user-facing text.
    pub fn summary(&self) -> String {
        let volts = self.trend.filtered_mv().unwrap_or(0.0) / 1000.0;
        format!("{}% / {:.2}V", self.percentage(), volts)
    }

    pub fn holds_charging_pause(&self) -> bool {
        self.pause_reason == Some(PauseReason::BatteryCharging)
    }

    /// Queue a pause request unless any pause is already in force.
    /// A manual pause is left alone.
    pub fn ensure_pause(&mut self) {
        if self.turns_mode && self.pause_reason.is_none() {
            self.effects.push(BatteryEffect::RequestPause);
            self.pause_reason = Some(PauseReason::BatteryCharging);
        }
    }

    /// Queue a release if the current pause is ours.
    pub fn release_pause(&mut self) {
        if self.holds_charging_pause() {
            self.effects.push(BatteryEffect::ReleasePause);
            self.pause_reason = None;
        }
    }
}
