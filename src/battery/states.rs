//! Battery state handlers and table builder.
//!
//! ```text
//!  NORMAL ──[warning && !full]──▶ NEEDS_CHARGE
//!    ▲                                │
//!    └───────────[recovered]──────────┘
//! ```
//!
//! While in NEEDS_CHARGE the charging policy runs on every sample:
//! docked and charging pauses turns, anything else releases the pause
//! and reminds drivers to dock.

use log::{info, warn};

use super::context::{BatteryContext, BatteryEffect};
use super::{StateDescriptor, StateId};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        StateDescriptor {
            id: StateId::Normal,
            name: "Normal",
            on_enter: None,
            on_exit: None,
            on_update: normal_update,
        },
        StateDescriptor {
            id: StateId::NeedsCharge,
            name: "NeedsCharge",
            on_enter: Some(needs_charge_enter),
            on_exit: Some(needs_charge_exit),
            on_update: needs_charge_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  NORMAL
// ═══════════════════════════════════════════════════════════════════════════

fn normal_update(ctx: &mut BatteryContext) -> Option<StateId> {
    if ctx.trend.warning() {
        if ctx.reached_full_charge() {
            // Pack reports full; the voltage sag is transient.
            ctx.trend.clear_warning();
            info!("battery: warning ignored, pack reports full charge");
        } else {
            return Some(StateId::NeedsCharge);
        }
    }
    ctx.release_pause();
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  NEEDS_CHARGE
// ═══════════════════════════════════════════════════════════════════════════

fn needs_charge_enter(ctx: &mut BatteryContext) {
    let summary = ctx.summary();
    warn!("battery: needs charge ({summary})");

    ctx.episode.last_dock_reminder_at = Some(ctx.now);
    ctx.episode.charging_pause_notified = false;
    ctx.episode.urgent_notified = false;

    if ctx.sample.charging {
        ctx.episode.last_alert_at = None;
    } else {
        ctx.effects.push(BatteryEffect::LowAlert { summary });
        ctx.episode.last_alert_at = Some(ctx.now);
    }
    charging_policy(ctx);
}

fn needs_charge_update(ctx: &mut BatteryContext) -> Option<StateId> {
    if ctx.recovered() {
        return Some(StateId::Normal);
    }

    if !ctx.sample.charging {
        let due = ctx
            .episode
            .last_alert_at
            .is_none_or(|t| ctx.now.saturating_sub(t) >= ctx.config.alert_cooldown_ms);
        if due {
            let summary = ctx.summary();
            ctx.effects.push(BatteryEffect::LowAlert { summary });
            ctx.episode.last_alert_at = Some(ctx.now);
        }

        let urgent = ctx
            .trend
            .filtered_mv()
            .is_some_and(|v| v <= f32::from(ctx.config.urgent_voltage_mv));
        if urgent && !ctx.episode.urgent_notified {
            let summary = ctx.summary();
            warn!("battery: critically low ({summary})");
            ctx.effects.push(BatteryEffect::UrgentAlert { summary });
            ctx.episode.urgent_notified = true;
        }
    }

    charging_policy(ctx);
    None
}

fn needs_charge_exit(ctx: &mut BatteryContext) {
    ctx.trend.clear_warning();
    let summary = ctx.summary();
    info!("battery: recovered ({summary})");
    ctx.effects.push(BatteryEffect::Recovered {
        summary,
        turns_mode: ctx.turns_mode,
    });
    ctx.release_pause();
    ctx.episode = Default::default();
}

// ═══════════════════════════════════════════════════════════════════════════
//  Charging policy
// ═══════════════════════════════════════════════════════════════════════════

fn charging_policy(ctx: &mut BatteryContext) {
    if ctx.sample.docked && ctx.sample.charging {
        ctx.ensure_pause();
        if !ctx.episode.charging_pause_notified {
            let summary = ctx.summary();
            ctx.effects.push(BatteryEffect::ChargingNotice {
                summary,
                turns_mode: ctx.turns_mode,
            });
            ctx.episode.charging_pause_notified = true;
        }
        return;
    }

    ctx.release_pause();
    let due = ctx
        .episode
        .last_dock_reminder_at
        .is_none_or(|t| ctx.now.saturating_sub(t) >= ctx.config.dock_reminder_ms);
    if due {
        let summary = ctx.summary();
        ctx.effects.push(BatteryEffect::DockReminder { summary });
        ctx.episode.last_dock_reminder_at = Some(ctx.now);
    }
    ctx.episode.charging_pause_notified = false;
}
