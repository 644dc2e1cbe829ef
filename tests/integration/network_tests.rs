//! Network mode against a scripted companion.

use sensekit::app::events::AppEvent;
use sensekit::app::ports::{FileId, RtcPort};
use sensekit::app::service::LINK_COOLDOWN_MS;
use sensekit::link::MessageKind;
use sensekit::state::{Mode, Operation};

use crate::mock_hw::{Rig, SYNCED_EPOCH, board_with, network_config};

/// Network device whose companion booted and associated at t=500.
fn online() -> Rig {
    let mut rig = Rig::boot(board_with(&network_config()));
    rig.run(200);
    rig.wire.booted();
    rig.run(200);
    rig.wire.wifi(true);
    rig.run(100);
    assert_eq!(rig.device.mode(), Mode::Network);
    rig
}

fn card_text(rig: &Rig, file: FileId) -> String {
    rig.board
        .storage
        .contents(file)
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .unwrap_or_default()
}

// ── Cycle ─────────────────────────────────────────────────────

#[test]
fn cycle_requests_in_order() {
    let rig = online();
    assert_eq!(
        rig.wire.sent(),
        vec![MessageKind::SetWifi, MessageKind::SetTime, MessageKind::PullInfo]
    );
    let creds = rig.wire.last_sent(MessageKind::SetWifi).unwrap();
    assert_eq!(creds.text(), Some(r#"{"ssid":"lab","password":"secret"}"#));
}

#[test]
fn nothing_is_sent_before_boot_confirmation() {
    let mut rig = Rig::boot(board_with(&network_config()));
    rig.run(5000);
    assert_eq!(rig.wire.power_ons(), 1);
    assert!(rig.wire.sent().is_empty());
}

#[test]
fn time_sync_sets_rtc() {
    let mut rig = online();
    rig.wire.time(SYNCED_EPOCH);
    rig.run(100);
    assert_eq!(rig.board.rtc.epoch(), SYNCED_EPOCH);
    assert!(rig.device.trackers().time.ok);
}

#[test]
fn implausible_time_is_ignored() {
    let mut rig = online();
    let before = rig.board.rtc.epoch();
    rig.wire.time(12_345);
    rig.run(100);
    assert_eq!(rig.board.rtc.epoch(), before);
    assert!(!rig.device.trackers().time.ok);
}

#[test]
fn time_failure_is_reported_once() {
    let mut rig = online();
    // Budget 2 × 3000ms: sent at 500 and 3500, judged at 6500.
    rig.run(5900);
    assert_eq!(rig.wire.sent_count(MessageKind::SetTime), 2);
    assert!(!rig.sink.contains(&AppEvent::OperationFailed(Operation::Time)));

    rig.run(100);
    assert_eq!(rig.sink.count(&AppEvent::OperationFailed(Operation::Time)), 1);

    rig.run(10_000);
    assert_eq!(rig.sink.count(&AppEvent::OperationFailed(Operation::Time)), 1);
    assert_eq!(rig.wire.sent_count(MessageKind::SetTime), 2);
    assert!(card_text(&rig, FileId::Debug).contains("Time failed"));
}

#[test]
fn wifi_failure_power_cycles_companion() {
    let mut rig = Rig::boot(board_with(&network_config()));
    rig.run(200);
    rig.wire.booted();
    rig.run(200);
    assert_eq!(rig.wire.sent_count(MessageKind::SetWifi), 1);

    rig.run(59_900);
    assert_eq!(rig.wire.power_ons(), 1);
    rig.run(100);
    assert!(rig.sink.contains(&AppEvent::OperationFailed(Operation::Wifi)));
    assert_eq!(rig.wire.power_ons(), 2);
    assert!(!rig.device.link().is_powered());

    // The rebooted companion gets a fresh cycle.
    rig.wire.booted();
    rig.run(200);
    assert_eq!(rig.wire.sent_count(MessageKind::SetWifi), 2);
}

#[test]
fn lost_association_rejoins() {
    let mut rig = online();
    rig.wire.wifi(false);
    rig.run(100);
    assert!(!rig.device.net().wifi_associated);
    assert_eq!(rig.wire.sent_count(MessageKind::SetWifi), 2);

    rig.wire.wifi(true);
    rig.run(100);
    assert!(rig.device.net().wifi_associated);
    assert!(rig.device.trackers().wifi.ok);
}

#[test]
fn publish_falls_back_while_association_is_lost() {
    let mut rig = online();
    rig.wire.wifi(false);
    rig.run(100);

    // Reading taken at 60100; its budget runs out at 75200 offline.
    rig.run(75_000);
    assert_eq!(rig.wire.sent_count(MessageKind::Publish), 0);
    assert!(rig.sink.contains(&AppEvent::OperationFailed(Operation::Publish)));
    assert!(rig.sink.contains(&AppEvent::Published { to_card: true }));
    assert!(rig.device.net().outbox.is_none());
    assert!(card_text(&rig, FileId::Monitor).lines().nth(1).is_some());
}

// ── Publish ───────────────────────────────────────────────────

#[test]
fn publish_is_acknowledged() {
    let mut rig = online();
    rig.run(59_600);
    assert_eq!(rig.wire.sent_count(MessageKind::Publish), 0);
    rig.run(100);
    let publish = rig.wire.last_sent(MessageKind::Publish).unwrap();
    let body = publish.text().unwrap();
    assert!(body.contains(r#""kind":"temperature","value":21.5"#));
    assert!(rig.device.net().outbox.is_some());

    rig.wire.push(MessageKind::PublishAck, &[]);
    rig.run(100);
    assert!(rig.device.net().outbox.is_none());
    assert_eq!(rig.sink.count(&AppEvent::Published { to_card: false }), 1);
    assert!(card_text(&rig, FileId::Monitor).is_empty());
}

#[test]
fn unacknowledged_publish_falls_back_to_card() {
    let mut rig = online();
    // Publish sent at 60200, 65200 and 70200; judged at 75200.
    rig.run(74_600);
    assert_eq!(rig.wire.sent_count(MessageKind::Publish), 3);
    assert!(!rig.sink.contains(&AppEvent::Published { to_card: true }));

    rig.run(100);
    assert!(rig.sink.contains(&AppEvent::OperationFailed(Operation::Publish)));
    assert!(rig.sink.contains(&AppEvent::Published { to_card: true }));
    assert!(rig.device.net().outbox.is_none());

    let csv = card_text(&rig, FileId::Monitor);
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("time,temperature,humidity"));
    assert!(lines.next().unwrap().ends_with(",21.50,40.00"));
    assert!(card_text(&rig, FileId::Debug).contains("Publish failed"));
}

#[test]
fn companion_info_is_cached_on_card() {
    let mut rig = online();
    rig.wire.push(
        MessageKind::Info,
        br#"{"version":"1.2.0","ip":"10.0.0.7","hostname":"sk-lab"}"#,
    );
    rig.run(100);
    assert_eq!(rig.device.link().info().unwrap().version.as_str(), "1.2.0");
    assert!(rig.device.trackers().info.ok);

    let cached = card_text(&rig, FileId::Info);
    assert!(cached.contains(rig.device.id()));
    assert!(cached.contains(r#""mode":"network""#));
    assert!(cached.contains(r#""hostname":"sk-lab""#));
}

// ── Companion boot ────────────────────────────────────────────

#[test]
fn silent_companion_is_switched_off_then_retried() {
    let mut rig = Rig::boot(board_with(&network_config()));
    // Power-on at 200 is attempt one; reboots at 10200 and 20200.
    rig.run(30_100);
    assert!(!rig.sink.contains(&AppEvent::OperationFailed(Operation::LinkBoot)));
    rig.run(100);
    assert_eq!(rig.wire.power_ons(), 3);
    assert_eq!(rig.sink.count(&AppEvent::OperationFailed(Operation::LinkBoot)), 1);
    assert!(!rig.wire.supply_on());

    rig.run(LINK_COOLDOWN_MS - 100);
    assert_eq!(rig.wire.power_ons(), 3);
    rig.run(100);
    assert_eq!(rig.wire.power_ons(), 4);
    assert!(rig.wire.supply_on());

    rig.wire.booted();
    rig.run(100);
    assert!(rig.device.link().is_powered());
}
