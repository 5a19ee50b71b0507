//! Integration tests for the sensor stream → battery machine → turns
//! pipeline.

use roverhub::battery::StateId;
use roverhub::idle::IDLE_ALERT;
use roverhub::scheduler::{PauseReason, TurnPhase};

use super::mock_hw::{Harness, docked_charging, reading};

const LOW_MV: u16 = 14_000;
const HEALTHY_MV: u16 = 16_000;
const OP_DOCK: u8 = 143;
const OP_PLAY: u8 = 141;

fn low_alerts(h: &Harness) -> usize {
    h.clients
        .alerts()
        .iter()
        .filter(|a| a.starts_with("Battery low"))
        .count()
}

// ── Low battery ───────────────────────────────────────────────

#[test]
fn low_battery_alerts_once_after_debounce() {
    let mut h = Harness::new();
    h.stream(&reading(LOW_MV, 1_000), 100, 1_000);
    assert_eq!(h.service.battery().state(), StateId::Normal);

    h.stream(&reading(LOW_MV, 1_000), 100, 3_000);
    assert_eq!(h.service.battery().state(), StateId::NeedsCharge);
    assert_eq!(low_alerts(&h), 1);
    assert!(
        h.alerts
            .seen
            .iter()
            .any(|a| a.starts_with("[Rover] Battery low"))
    );
    assert!(h.service.latest().unwrap().battery.needs_charge);
}

#[test]
fn brief_dip_does_not_alert() {
    let mut h = Harness::new();
    h.stream(&reading(HEALTHY_MV, 2_500), 100, 2_000);
    h.stream(&reading(12_000, 2_500), 100, 500);
    h.stream(&reading(HEALTHY_MV, 2_500), 100, 5_000);
    assert_eq!(h.service.battery().state(), StateId::Normal);
    assert_eq!(low_alerts(&h), 0);
}

#[test]
fn alarm_plays_while_undocked_and_low() {
    let mut h = Harness::new();
    h.stream(&reading(LOW_MV, 1_000), 100, 12_000);
    assert!(h.rover.count(OP_PLAY) >= 1);
}

// ── Charging pause ────────────────────────────────────────────

#[test]
fn charging_pauses_turns_and_recovery_resumes_them() {
    let mut h = Harness::new();
    h.guest(1, "alice").unwrap();
    h.drive(1);
    h.stream(&reading(LOW_MV, 1_000), 100, 3_000);
    assert_eq!(h.service.battery().state(), StateId::NeedsCharge);
    assert_eq!(h.service.turns().holder(), Some(1));

    h.stream(&docked_charging(LOW_MV, 1_000), 100, 1_000);
    let snap = h.service.turns().snapshot(h.now);
    assert_eq!(snap.pause_reason, Some(PauseReason::BatteryCharging));
    assert_eq!(h.service.turns().phase(), TurnPhase::Paused);
    assert_eq!(h.clients.can_drive(1), Some(false));
    let charging = h
        .clients
        .messages_for(1)
        .into_iter()
        .filter(|m| m.starts_with("Battery charging"))
        .count();
    assert_eq!(charging, 1);

    h.stream(&docked_charging(16_500, 2_950), 100, 1_000);
    assert_eq!(h.service.battery().state(), StateId::Normal);
    assert_eq!(h.service.turns().snapshot(h.now).pause_reason, None);
    assert_eq!(h.service.turns().holder(), Some(1));
    assert_eq!(h.clients.can_drive(1), Some(true));
    assert_eq!(h.announcements.seen.len(), 1);
    let recovered: Vec<_> = h
        .clients
        .messages_for(1)
        .into_iter()
        .filter(|m| m.starts_with("Battery recovered"))
        .collect();
    assert_eq!(recovered.len(), 1);
    assert!(recovered[0].ends_with("Turns have resumed."));
}

#[test]
fn undocking_releases_pause_without_recovery() {
    let mut h = Harness::new();
    h.guest(1, "alice").unwrap();
    h.drive(1);
    h.stream(&reading(LOW_MV, 1_000), 100, 3_000);
    h.stream(&docked_charging(LOW_MV, 1_000), 100, 500);
    assert_eq!(h.service.turns().phase(), TurnPhase::Paused);

    h.stream(&reading(LOW_MV, 1_000), 100, 500);
    assert_eq!(h.service.battery().state(), StateId::NeedsCharge);
    assert_eq!(h.service.turns().snapshot(h.now).pause_reason, None);
    assert_eq!(h.service.turns().holder(), Some(1));
}

#[test]
fn manual_pause_survives_battery_recovery() {
    let mut h = Harness::new();
    h.admin(10).unwrap();
    h.guest(1, "alice").unwrap();
    h.stream(&reading(LOW_MV, 1_000), 100, 3_000);
    h.intent(10, roverhub::app::commands::ClientIntent::PauseTurns);

    h.stream(&docked_charging(16_500, 2_950), 100, 1_000);
    assert_eq!(h.service.battery().state(), StateId::Normal);
    assert_eq!(
        h.service.turns().snapshot(h.now).pause_reason,
        Some(PauseReason::Manual)
    );
}

// ── Autocharge ────────────────────────────────────────────────

#[test]
fn docked_without_charging_resends_dock() {
    let mut h = Harness::new();
    let mut idle_on_dock = reading(HEALTHY_MV, 2_500);
    idle_on_dock.charging_sources = 0b10;
    h.stream(&idle_on_dock, 100, 10_500);

    let messages = h.clients.messages_for(1);
    assert!(messages.iter().any(|m| m == "Autocharge timer started"));
    assert!(messages.iter().any(|m| m == "Autocharge command sent"));
    assert!(h.rover.count(OP_DOCK) >= 1);
}

// ── Idle watch ────────────────────────────────────────────────

#[test]
fn undocked_and_idle_rover_raises_alert() {
    let mut h = Harness::new();
    h.reading(&reading(HEALTHY_MV, 2_500));
    h.advance(40_000);
    assert!(h.alerts.seen.is_empty());

    h.advance(20_000);
    assert_eq!(h.alerts.seen, vec![IDLE_ALERT.to_owned()]);
}

#[test]
fn failed_alert_hook_is_not_fatal() {
    let mut h = Harness::new();
    h.alerts.fail = true;
    h.stream(&reading(LOW_MV, 1_000), 100, 3_000);
    assert_eq!(h.service.battery().state(), StateId::NeedsCharge);
    assert!(!h.alerts.seen.is_empty());
}
