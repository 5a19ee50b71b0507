//! Integration tests for connections, turns and access modes.
//!
//! Drive the `RoverService` through virtual time with mock ports and
//! check what every client would have seen.

use roverhub::access::{AccessMode, ConnectRequest, ConnectionKind, DenyReason};
use roverhub::app::commands::ClientIntent;
use roverhub::app::events::{Announcement, ClientEvent};
use roverhub::app::service::{ADMIN_REQUIRED, NOT_DRIVING, TURNS_WAIT};
use roverhub::scheduler::{PauseReason, TurnEvent, TurnPhase};

use super::mock_hw::Harness;

const DRIVE_FORWARD: [u8; 5] = [145, 0, 100, 0, 100];

fn queue(h: &Harness) -> Vec<u32> {
    h.service.turns().queue().collect()
}

fn drove(h: &Harness) -> bool {
    h.rover.writes.iter().any(|w| w.as_slice() == DRIVE_FORWARD)
}

// ── Turns ─────────────────────────────────────────────────────

#[test]
fn first_guest_is_welcomed_and_granted() {
    let mut h = Harness::new();
    h.guest(1, "alice").unwrap();

    let events = h.clients.events_for(1);
    assert!(matches!(
        events.first(),
        Some(ClientEvent::Welcome { id: 1, is_admin: false, .. })
    ));
    assert!(h.clients.messages_for(1).contains(&TURNS_WAIT.to_owned()));
    assert_eq!(h.service.turns().holder(), Some(1));
    assert_eq!(h.clients.can_drive(1), Some(true));

    h.drive(1);
    assert!(drove(&h));
}

#[test]
fn idle_holder_is_skipped_and_rotated() {
    let mut h = Harness::new();
    h.guest(1, "alice").unwrap();
    h.guest(2, "bob").unwrap();
    h.guest(3, "carol").unwrap();
    assert_eq!(h.clients.can_drive(2), Some(false));

    h.advance(6_980);
    assert_eq!(h.service.turns().holder(), Some(1));

    h.advance(20);
    assert_eq!(h.service.turns().holder(), Some(2));
    assert_eq!(queue(&h), vec![2, 3, 1]);
    assert_eq!(h.clients.can_drive(1), Some(false));
    assert_eq!(h.clients.can_drive(2), Some(true));
    assert!(
        h.clients
            .messages_for(1)
            .contains(&TurnEvent::idle_skip_notice(7))
    );
}

#[test]
fn driving_holds_the_turn_until_expiry() {
    let mut h = Harness::new();
    h.guest(1, "alice").unwrap();
    h.guest(2, "bob").unwrap();
    h.drive(1);

    h.advance(119_980);
    assert_eq!(h.service.turns().holder(), Some(1));

    h.advance(20);
    assert_eq!(h.service.turns().holder(), Some(2));
    assert_eq!(queue(&h), vec![2, 1]);
}

#[test]
fn waiting_guest_cannot_drive() {
    let mut h = Harness::new();
    h.guest(1, "alice").unwrap();
    h.guest(2, "bob").unwrap();

    h.drive(2);
    assert!(!drove(&h));
    assert_eq!(h.clients.errors_for(2), vec![NOT_DRIVING.to_owned()]);
}

#[test]
fn holder_disconnect_promotes_next_and_halts() {
    let mut h = Harness::new();
    h.guest(1, "alice").unwrap();
    h.guest(2, "bob").unwrap();
    h.drive(1);
    let writes = h.rover.writes.len();

    h.disconnect(1);
    assert_eq!(h.service.turns().holder(), Some(2));
    assert_eq!(queue(&h), vec![2]);
    assert!(h.rover.writes[writes..].iter().any(|w| w.as_slice() == [145, 0, 0, 0, 0]));
    assert!(h.service.gate().get(1).is_none());
}

#[test]
fn turn_snapshots_are_broadcast_periodically() {
    let mut h = Harness::new();
    h.guest(1, "alice").unwrap();
    h.drive(1);
    h.clients.clear();

    h.advance(3_000);
    let snapshots: Vec<_> = h
        .clients
        .broadcasts()
        .filter_map(|e| match e {
            ClientEvent::TurnsUpdate(v) => Some(v.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(snapshots.len(), 3);
    let last = snapshots.last().unwrap();
    assert_eq!(last.current_driver_id, Some(1));
    assert_eq!(last.queue[0].nickname, "User lice");
    assert!(last.queue[0].is_current);
    assert_eq!(last.time_remaining_ms, Some(117_000));
}

// ── Sessions ──────────────────────────────────────────────────

#[test]
fn same_identity_key_replaces_old_session() {
    let mut h = Harness::new();
    h.guest(1, "phone-42").unwrap();
    h.guest(2, "phone-42").unwrap();

    assert_eq!(h.clients.closed, vec![(1, DenyReason::SessionReplaced.as_str())]);
    assert!(h.service.gate().get(1).is_none());
    assert_eq!(h.service.turns().holder(), Some(2));
    assert_eq!(queue(&h), vec![2]);

    // The stale close must not release the new holder's claim.
    h.disconnect(1);
    h.guest(3, "phone-42").unwrap();
    assert!(h.clients.closed.contains(&(2, DenyReason::SessionReplaced.as_str())));
}

#[test]
fn viewers_are_never_queued() {
    let mut h = Harness::new();
    h.connect(
        5,
        ConnectRequest {
            kind: ConnectionKind::Viewer,
            ..ConnectRequest::default()
        },
    )
    .unwrap();
    assert!(queue(&h).is_empty());
    assert_eq!(h.clients.can_drive(5), Some(false));
}

#[test]
fn spectating_leaves_and_rejoins_the_queue() {
    let mut h = Harness::new();
    h.guest(1, "alice").unwrap();
    h.guest(2, "bob").unwrap();

    h.intent(2, ClientIntent::SetSpectating { spectating: true });
    assert_eq!(queue(&h), vec![1]);

    h.intent(2, ClientIntent::SetSpectating { spectating: false });
    assert_eq!(queue(&h), vec![1, 2]);
}

#[test]
fn nickname_is_sanitized_and_echoed() {
    let mut h = Harness::new();
    h.guest(1, "alice").unwrap();
    h.intent(
        1,
        ClientIntent::SetNickname {
            nickname: "  Speedy  ".into(),
        },
    );
    assert!(h.clients.events_for(1).contains(&&ClientEvent::Nickname {
        nickname: "Speedy".into()
    }));
    assert_eq!(h.service.gate().nickname(1), Some("Speedy"));
}

// ── Admin controls ────────────────────────────────────────────

#[test]
fn admin_pause_and_resume() {
    let mut h = Harness::new();
    h.admin(10).unwrap();
    h.guest(1, "alice").unwrap();
    h.guest(2, "bob").unwrap();
    assert!(!queue(&h).contains(&10));
    assert_eq!(h.clients.can_drive(10), Some(true));

    h.intent(1, ClientIntent::PauseTurns);
    assert_eq!(h.clients.errors_for(1), vec![ADMIN_REQUIRED.to_owned()]);
    assert_eq!(h.service.turns().holder(), Some(1));

    h.intent(10, ClientIntent::PauseTurns);
    assert_eq!(h.service.turns().phase(), TurnPhase::Paused);
    assert_eq!(h.service.turns().holder(), None);
    assert_eq!(h.clients.can_drive(1), Some(false));
    let snap = h.service.turns().snapshot(h.now);
    assert_eq!(snap.pause_reason, Some(PauseReason::Manual));

    // Paused queues do not tick idle-skips.
    h.advance(10_000);
    assert_eq!(queue(&h), vec![1, 2]);

    h.intent(10, ClientIntent::ResumeTurns);
    assert_eq!(h.service.turns().holder(), Some(1));
    assert_eq!(h.clients.can_drive(1), Some(true));
}

#[test]
fn switching_to_open_lets_every_guest_drive() {
    let mut h = Harness::new();
    h.admin(10).unwrap();
    h.guest(1, "alice").unwrap();
    h.guest(2, "bob").unwrap();

    h.intent(10, ClientIntent::ChangeMode { mode: AccessMode::Open });
    assert_eq!(h.service.mode(), AccessMode::Open);
    assert!(!h.service.turns().is_enabled());
    assert_eq!(h.clients.can_drive(1), Some(true));
    assert_eq!(h.clients.can_drive(2), Some(true));
    assert!(
        h.clients
            .broadcasts()
            .any(|e| *e == ClientEvent::ModeChanged { mode: AccessMode::Open })
    );
    assert_eq!(
        h.announcements.seen,
        vec![Announcement::ModeChanged(AccessMode::Open)]
    );

    h.intent(10, ClientIntent::ChangeMode { mode: AccessMode::Turns });
    assert_eq!(queue(&h), vec![1, 2]);
    assert_eq!(h.service.turns().holder(), Some(1));
    assert_eq!(h.clients.can_drive(2), Some(false));
}

#[test]
fn lockdown_evicts_guests_but_keeps_bypass_admin() {
    let mut h = Harness::new();
    h.admin(10).unwrap();
    h.guest(1, "alice").unwrap();

    h.intent(10, ClientIntent::ChangeMode { mode: AccessMode::Lockdown });
    assert_eq!(h.clients.closed, vec![(1, DenyReason::LockdownEnabled.as_str())]);
    assert_eq!(h.service.gate().len(), 1);
    assert!(queue(&h).is_empty());

    assert_eq!(h.guest(2, "bob"), Err(DenyReason::LockdownEnabled));
    assert!(h.clients.closed.contains(&(2, DenyReason::LockdownEnabled.as_str())));
    assert!(h.service.gate().get(2).is_none());
}

#[test]
fn admin_mode_refuses_guests() {
    let mut h = Harness::new();
    h.admin(10).unwrap();
    h.intent(10, ClientIntent::ChangeMode { mode: AccessMode::Admin });
    assert_eq!(h.guest(1, "alice"), Err(DenyReason::AdminModeEnabled));
}

#[test]
fn failed_hooks_do_not_block_mode_change() {
    let mut h = Harness::new();
    h.announcements.fail = true;
    h.admin(10).unwrap();
    h.intent(10, ClientIntent::ChangeMode { mode: AccessMode::Open });
    assert_eq!(h.service.mode(), AccessMode::Open);
    assert_eq!(h.announcements.seen.len(), 1);
}
