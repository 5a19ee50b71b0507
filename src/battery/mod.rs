//! Battery state machine: function-pointer engine plus the facade the
//! service drives once per decoded reading.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  StateTable                                                  │
//! │  ┌─────────────┬─────────────┬─────────────┬──────────────┐  │
//! │  │ StateId     │ on_enter    │ on_exit     │ on_update    │  │
//! │  ├─────────────┼─────────────┼─────────────┼──────────────┤  │
//! │  │ Normal      │ -           │ -           │ fn(ctx)->Opt │  │
//! │  │ NeedsCharge │ fn(ctx)     │ fn(ctx)     │ fn(ctx)->Opt │  │
//! │  └─────────────┴─────────────┴─────────────┴──────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each reading the facade refreshes the [`BatteryContext`], folds the
//! voltage into the trend, then ticks the engine.  Handlers never touch
//! the outside world; they push [`BatteryEffect`]s which the caller
//! applies, so a failing notification can never stall a transition.

pub mod context;
pub mod states;
pub mod trend;
pub mod watchdog;

use log::info;
use serde::Serialize;

use crate::app::ports::{ChargingPause, TurnDelegate};
use crate::config::BatteryConfig;
use crate::scheduler::PauseReason;
use crate::sensor::SensorReading;
use crate::timer::Millis;

pub use context::{BatteryContext, BatteryEffect, ChargeSample};
pub use trend::BatteryTrend;
pub use watchdog::{AutochargeAction, AutochargeWatchdog, LowBatteryAlarm};

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    Normal = 0,
    NeedsCharge = 1,
}

impl StateId {
    pub const COUNT: usize = 2;

    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Normal,
            1 => Self::NeedsCharge,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Normal
            }
        }
    }
}

pub type StateActionFn = fn(&mut BatteryContext);

/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn = fn(&mut BatteryContext) -> Option<StateId>;

pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Fsm {
    table: [StateDescriptor; StateId::COUNT],
    current: usize,
    /// `ctx.now` when the current state was entered.
    entered_at: Millis,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        Self {
            table,
            current: initial as usize,
            entered_at: 0,
        }
    }

    pub fn start(&mut self, ctx: &mut BatteryContext) {
        info!("battery: starting in state {}", self.table[self.current].name);
        self.entered_at = ctx.now;
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Run `on_update` for the current state and follow any transition.
    pub fn tick(&mut self, ctx: &mut BatteryContext) {
        if let Some(next) = (self.table[self.current].on_update)(ctx) {
            self.transition(next, ctx);
        }
    }

    pub fn force_transition(&mut self, next: StateId, ctx: &mut BatteryContext) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    pub fn time_in_state(&self, now: Millis) -> Millis {
        now.saturating_sub(self.entered_at)
    }

    fn transition(&mut self, next_id: StateId, ctx: &mut BatteryContext) {
        let next_idx = next_id as usize;
        info!(
            "battery: {} -> {} after {} s",
            self.table[self.current].name,
            self.table[next_idx].name,
            self.time_in_state(ctx.now) / 1000
        );
        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }
        self.current = next_idx;
        self.entered_at = ctx.now;
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChargeAlertState {
    Charged,
    Charging,
    NeedsCharge,
    Clear,
}

/// Charge alert attached to every sensor snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChargeAlert {
    pub state: ChargeAlertState,
    pub active: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryReport {
    pub percentage: u8,
    pub filtered_voltage_mv: f32,
    pub needs_charge: bool,
    pub charging: bool,
    pub docked: bool,
    pub charge_alert: ChargeAlert,
}

/// What the scheduler looks like to the battery machine this reading.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatteryEnv {
    pub turns_mode: bool,
    pub pause_reason: Option<PauseReason>,
}

#[derive(Debug, Clone)]
pub struct BatteryOutcome {
    pub report: BatteryReport,
    pub effects: Vec<BatteryEffect>,
    pub autocharge: AutochargeAction,
}

// ---------------------------------------------------------------------------
// Facade
// ---------------------------------------------------------------------------

pub struct BatteryMachine {
    fsm: Fsm,
    ctx: BatteryContext,
    autocharge: AutochargeWatchdog,
    alarm: LowBatteryAlarm,
    seen_sample: bool,
}

impl BatteryMachine {
    pub fn new(config: BatteryConfig) -> Self {
        let autocharge =
            AutochargeWatchdog::new(config.autocharge_enabled, config.autocharge_timeout_ms);
        let alarm = LowBatteryAlarm::new(config.alarm_interval_ms);
        let mut ctx = BatteryContext::new(config);
        let mut fsm = Fsm::new(states::build_state_table(), StateId::Normal);
        fsm.start(&mut ctx);
        Self {
            fsm,
            ctx,
            autocharge,
            alarm,
            seen_sample: false,
        }
    }

    /// Fold one reading into the machine.
    pub fn evaluate(
        &mut self,
        reading: &SensorReading,
        env: BatteryEnv,
        now: Millis,
    ) -> BatteryOutcome {
        self.seen_sample = true;
        self.ctx.now = now;
        self.ctx.sample = ChargeSample::from(reading);
        self.ctx.turns_mode = env.turns_mode;
        self.ctx.pause_reason = env.pause_reason;

        let voltage = self.ctx.sample.voltage_mv;
        let config = &self.ctx.config;
        self.ctx.trend.update(voltage, now, config);
        self.fsm.tick(&mut self.ctx);

        let sample = self.ctx.sample;
        let autocharge = self.autocharge.observe(sample.docked, sample.charging, now);

        BatteryOutcome {
            report: self.report(),
            effects: core::mem::take(&mut self.ctx.effects),
            autocharge,
        }
    }

    /// Advance the alarm cadence.  `true` means play the tone now.
    pub fn alarm_tick(&mut self, now: Millis) -> bool {
        if !self.seen_sample {
            return false;
        }
        self.alarm
            .tick(now, self.needs_charge(), self.ctx.sample.docked)
    }

    pub fn needs_charge(&self) -> bool {
        self.fsm.current_state() == StateId::NeedsCharge
    }

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    /// Dock flag of the latest reading, once one has arrived.
    pub fn docked(&self) -> Option<bool> {
        self.seen_sample.then_some(self.ctx.sample.docked)
    }

    pub fn trend(&self) -> &BatteryTrend {
        &self.ctx.trend
    }

    pub fn report(&self) -> BatteryReport {
        let sample = self.ctx.sample;
        let summary = self.ctx.summary();
        let charge_alert = if sample.charging {
            if self.ctx.reached_full_charge() {
                ChargeAlert {
                    state: ChargeAlertState::Charged,
                    active: false,
                    message: format!("Battery fully charged ({summary})."),
                }
            } else {
                ChargeAlert {
                    state: ChargeAlertState::Charging,
                    active: false,
                    message: format!("Battery charging ({summary})."),
                }
            }
        } else if self.needs_charge() {
            ChargeAlert {
                state: ChargeAlertState::NeedsCharge,
                active: true,
                message: format!("Battery low ({summary}). Please dock the rover to charge."),
            }
        } else {
            ChargeAlert {
                state: ChargeAlertState::Clear,
                active: false,
                message: String::new(),
            }
        };
        BatteryReport {
            percentage: self.ctx.percentage(),
            filtered_voltage_mv: self.ctx.trend.filtered_mv().unwrap_or(0.0),
            needs_charge: self.needs_charge(),
            charging: sample.charging,
            docked: sample.docked,
            charge_alert,
        }
    }
}

/// Apply the pause effects of one evaluation to the scheduler.
pub fn apply_pause_effects<P: ChargingPause + ?Sized>(
    effects: &[BatteryEffect],
    pause: &mut P,
    now: Millis,
    out: &mut dyn TurnDelegate,
) {
    for effect in effects {
        match effect {
            BatteryEffect::RequestPause => {
                pause.set_charging_pause(PauseReason::BatteryCharging, now, out);
            }
            BatteryEffect::ReleasePause => {
                if pause.pause_reason() == Some(PauseReason::BatteryCharging) {
                    pause.clear_charging_pause(now, out);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPACITY: u16 = 3_000;

    fn reading(voltage_mv: u16, charge_mah: u16, charging: bool, docked: bool) -> SensorReading {
        SensorReading {
            voltage_mv,
            charge_mah,
            capacity_mah: CAPACITY,
            charging_state: if charging { 2 } else { 0 },
            charging_sources: if docked { 2 } else { 0 },
            ..SensorReading::default()
        }
    }

    fn turns() -> BatteryEnv {
        BatteryEnv {
            turns_mode: true,
            pause_reason: None,
        }
    }

    /// Feed readings every 100 ms from `from` until `until`, collecting effects.
    fn run(
        m: &mut BatteryMachine,
        r: &SensorReading,
        env: BatteryEnv,
        from: Millis,
        until: Millis,
    ) -> Vec<BatteryEffect> {
        let mut effects = Vec::new();
        let mut now = from;
        while now <= until {
            effects.extend(m.evaluate(r, env, now).effects);
            now += 100;
        }
        effects
    }

    fn count(effects: &[BatteryEffect], pred: fn(&BatteryEffect) -> bool) -> usize {
        effects.iter().filter(|e| pred(e)).count()
    }

    #[test]
    fn starts_normal() {
        let m = BatteryMachine::new(BatteryConfig::default());
        assert_eq!(m.state(), StateId::Normal);
        assert_eq!(m.docked(), None);
    }

    #[test]
    fn low_voltage_enters_needs_charge_with_alert() {
        let mut m = BatteryMachine::new(BatteryConfig::default());
        let low = reading(14_000, 1_000, false, false);
        let effects = run(&mut m, &low, turns(), 0, 1_400);
        assert_eq!(m.state(), StateId::Normal);
        assert!(effects.is_empty());

        let effects = m.evaluate(&low, turns(), 1_500).effects;
        assert_eq!(m.state(), StateId::NeedsCharge);
        assert_eq!(count(&effects, |e| matches!(e, BatteryEffect::LowAlert { .. })), 1);
    }

    #[test]
    fn entry_alert_suppressed_while_charging() {
        let mut m = BatteryMachine::new(BatteryConfig::default());
        let low_charging = reading(14_000, 1_000, true, true);
        let effects = run(&mut m, &low_charging, turns(), 0, 1_500);
        assert!(m.needs_charge());
        assert_eq!(count(&effects, |e| matches!(e, BatteryEffect::LowAlert { .. })), 0);
        assert_eq!(count(&effects, |e| matches!(e, BatteryEffect::RequestPause)), 1);
        assert_eq!(count(&effects, |e| matches!(e, BatteryEffect::ChargingNotice { .. })), 1);
    }

    #[test]
    fn full_charge_vetoes_entry() {
        let mut m = BatteryMachine::new(BatteryConfig::default());
        let sagging = reading(14_000, CAPACITY, false, false);
        run(&mut m, &sagging, turns(), 0, 3_000);
        assert_eq!(m.state(), StateId::Normal);
    }

    #[test]
    fn realerts_after_cooldown() {
        let cfg = BatteryConfig::default();
        let cooldown = cfg.alert_cooldown_ms;
        let mut m = BatteryMachine::new(cfg);
        let low = reading(14_000, 1_000, false, false);
        let effects = run(&mut m, &low, turns(), 0, 1_500 + cooldown);
        assert_eq!(count(&effects, |e| matches!(e, BatteryEffect::LowAlert { .. })), 2);
    }

    #[test]
    fn urgent_escalation_once() {
        let mut m = BatteryMachine::new(BatteryConfig::default());
        let very_low = reading(13_500, 500, false, false);
        let effects = run(&mut m, &very_low, turns(), 0, 10_000);
        assert_eq!(count(&effects, |e| matches!(e, BatteryEffect::UrgentAlert { .. })), 1);
    }

    #[test]
    fn dock_reminder_on_interval() {
        let cfg = BatteryConfig::default();
        let reminder = cfg.dock_reminder_ms;
        let mut m = BatteryMachine::new(cfg);
        let low = reading(14_000, 1_000, false, false);
        let effects = run(&mut m, &low, turns(), 0, 1_500 + reminder);
        assert_eq!(count(&effects, |e| matches!(e, BatteryEffect::DockReminder { .. })), 1);
    }

    #[test]
    fn recovers_exactly_once() {
        let mut m = BatteryMachine::new(BatteryConfig::default());
        run(&mut m, &reading(14_000, 1_000, true, true), turns(), 0, 1_500);
        assert!(m.needs_charge());

        let env = BatteryEnv {
            turns_mode: true,
            pause_reason: Some(PauseReason::BatteryCharging),
        };
        let full = reading(16_000, 2_950, true, true);
        let effects = m.evaluate(&full, env, 1_600).effects;
        assert_eq!(m.state(), StateId::Normal);
        assert_eq!(count(&effects, |e| matches!(e, BatteryEffect::Recovered { .. })), 1);
        assert_eq!(count(&effects, |e| matches!(e, BatteryEffect::ReleasePause)), 1);

        // Pause already lifted; further full readings stay quiet.
        let effects = run(&mut m, &full, turns(), 1_700, 5_000);
        assert_eq!(m.state(), StateId::Normal);
        assert!(effects.is_empty());
    }

    #[test]
    fn undocking_releases_charging_pause() {
        let mut m = BatteryMachine::new(BatteryConfig::default());
        run(&mut m, &reading(14_000, 1_000, true, true), turns(), 0, 1_500);
        let env = BatteryEnv {
            turns_mode: true,
            pause_reason: Some(PauseReason::BatteryCharging),
        };
        let effects = m.evaluate(&reading(14_000, 1_000, false, false), env, 1_600).effects;
        assert!(effects.contains(&BatteryEffect::ReleasePause));
    }

    #[test]
    fn no_pause_outside_turns_mode() {
        let mut m = BatteryMachine::new(BatteryConfig::default());
        let env = BatteryEnv::default();
        let effects = run(&mut m, &reading(14_000, 1_000, true, true), env, 0, 3_000);
        assert_eq!(count(&effects, |e| matches!(e, BatteryEffect::RequestPause)), 0);
        assert_eq!(count(&effects, |e| matches!(e, BatteryEffect::ChargingNotice { .. })), 1);
    }

    #[test]
    fn charge_alert_states() {
        let mut m = BatteryMachine::new(BatteryConfig::default());
        let out = m.evaluate(&reading(16_000, 2_000, false, false), turns(), 0);
        assert_eq!(out.report.charge_alert.state, ChargeAlertState::Clear);
        let out = m.evaluate(&reading(16_000, 2_000, true, true), turns(), 100);
        assert_eq!(out.report.charge_alert.state, ChargeAlertState::Charging);
        let out = m.evaluate(&reading(16_000, 2_990, true, true), turns(), 200);
        assert_eq!(out.report.charge_alert.state, ChargeAlertState::Charged);
    }

    #[test]
    fn autocharge_reported_through_outcome() {
        let mut m = BatteryMachine::new(BatteryConfig::default());
        let parked = reading(16_000, 2_000, false, true);
        assert_eq!(m.evaluate(&parked, turns(), 0).autocharge, AutochargeAction::Started);
        assert_eq!(m.evaluate(&parked, turns(), 10_000).autocharge, AutochargeAction::Fire);
    }

    #[test]
    fn alarm_needs_a_sample() {
        let mut m = BatteryMachine::new(BatteryConfig::default());
        assert!(!m.alarm_tick(0));
    }

    #[test]
    fn force_transition_runs_enter_and_exit() {
        let mut ctx = BatteryContext::new(BatteryConfig::default());
        let mut fsm = Fsm::new(states::build_state_table(), StateId::Normal);
        fsm.start(&mut ctx);
        fsm.force_transition(StateId::NeedsCharge, &mut ctx);
        assert!(matches!(ctx.effects[0], BatteryEffect::LowAlert { .. }));
        ctx.effects.clear();
        fsm.force_transition(StateId::Normal, &mut ctx);
        assert!(matches!(ctx.effects[0], BatteryEffect::Recovered { .. }));
    }

    #[test]
    fn state_id_from_index_roundtrip() {
        for i in 0..StateId::COUNT {
            assert_eq!(StateId::from_index(i) as usize, i);
        }
    }
}
