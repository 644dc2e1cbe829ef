//! Sleep mode: scheduling, guards, wake handling.

use sensekit::adapters::board::SimBoard;
use sensekit::adapters::time::SimRtc;
use sensekit::app::commands::SetupCommand;
use sensekit::app::events::AppEvent;
use sensekit::app::ports::{FileId, RtcPort};
use sensekit::app::service::LINK_COOLDOWN_MS;
use sensekit::events::IrqEvent;
use sensekit::link::MessageKind;
use sensekit::power::{SECS_PER_DAY, SleepRefusal, WakeSource};
use sensekit::state::{Mode, Operation};

use crate::mock_hw::{LineCall, Rig, SYNCED_EPOCH, board_with, mode_config};

/// Sleep-mode board whose RTC reads 22:13:20 UTC.
fn synced_sleep_board() -> SimBoard {
    let mut board = board_with(&mode_config(Mode::Sleep));
    board.rtc = SimRtc::at(SYNCED_EPOCH);
    board
}

fn slept(rig: &Rig) -> Vec<u32> {
    rig.sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::Slept { secs } => Some(*secs),
            _ => None,
        })
        .collect()
}

#[test]
fn sleeps_until_wake_time_then_publishes() {
    let mut rig = Rig::boot(synced_sleep_board());
    rig.run(100);
    assert_eq!(rig.device.mode(), Mode::Sleep);
    assert!(slept(&rig).is_empty());

    // 22:13:20 to 03:00:00.
    rig.run(100);
    assert_eq!(slept(&rig), vec![17_200]);
    assert!(rig.sink.contains(&AppEvent::Woke(WakeSource::Alarm)));
    assert_eq!(rig.board.rtc.epoch(), SYNCED_EPOCH + 17_200);
    assert_eq!(rig.board.standbys(), 1);

    // Woken exactly at the wake time: sample, then a full day.
    rig.run(100);
    assert!(rig.sink.contains(&AppEvent::Published { to_card: true }));
    assert_eq!(slept(&rig), vec![17_200, SECS_PER_DAY]);
    assert_eq!(rig.device.scheduler().sleep_count(), 2);

    let monitor = rig.board.storage.contents(FileId::Monitor).unwrap();
    let csv = String::from_utf8(monitor.to_vec()).unwrap();
    assert!(csv.lines().nth(1).unwrap().starts_with("2023-11-15T03:00:00Z"));
}

#[test]
fn sleep_mode_never_boots_the_companion() {
    let mut rig = Rig::boot(synced_sleep_board());
    rig.run(200);
    assert_eq!(rig.wire.power_ons(), 0);
    // Powering down still drives the lines low.
    assert!(rig.wire.lines().contains(&LineCall::Power(false)));
    assert!(!rig.device.snapshot().sleeping);
}

#[test]
fn unsynced_clock_defers_sleep_once() {
    let mut rig = Rig::boot(board_with(&mode_config(Mode::Sleep)));
    rig.run(5000);
    assert_eq!(
        rig.sink.count(&AppEvent::SleepDeferred(SleepRefusal::NoWakeTarget)),
        1
    );
    assert_eq!(rig.board.standbys(), 0);
    assert!(rig.device.scheduler().is_armed());
    assert_eq!(rig.device.next_sleep_secs(&rig.board), None);
}

#[test]
fn unsynced_clock_is_fetched_from_companion() {
    let mut rig = Rig::boot(board_with(&mode_config(Mode::Sleep)));
    rig.run(200);
    assert_eq!(rig.wire.power_ons(), 1);
    assert_eq!(rig.board.standbys(), 0);

    rig.wire.booted();
    rig.run(100);
    assert_eq!(rig.wire.sent_count(MessageKind::SetTime), 1);

    // 22:13:20 to 03:00:00; the companion goes down with the device.
    rig.wire.time(SYNCED_EPOCH);
    rig.run(100);
    assert_eq!(slept(&rig), vec![17_200]);
    assert_eq!(rig.board.standbys(), 1);
    assert!(!rig.wire.supply_on());
    assert_eq!(rig.wire.sent_count(MessageKind::SetTime), 1);
}

#[test]
fn silent_time_source_rests_companion() {
    let mut rig = Rig::boot(board_with(&mode_config(Mode::Sleep)));
    rig.run(200);
    rig.wire.booted();
    rig.run(100);

    // Budget 2 × 3000ms: sent at 300 and 3300, judged at 6300.
    rig.run(6000);
    assert!(rig.sink.contains(&AppEvent::OperationFailed(Operation::Time)));
    assert!(!rig.wire.supply_on());
    assert_eq!(rig.wire.power_ons(), 1);

    rig.run(LINK_COOLDOWN_MS);
    assert_eq!(rig.wire.power_ons(), 2);
    rig.wire.booted();
    rig.run(100);
    assert_eq!(rig.wire.sent_count(MessageKind::SetTime), 3);
}

#[test]
fn sleep_waits_for_config_sync() {
    let mut board = SimBoard::new();
    board.rtc = SimRtc::at(SYNCED_EPOCH);
    let mut rig = Rig::boot(board);
    // Setup requested the companion at 200 but it has not booted yet.
    rig.run(200);
    rig.device
        .apply_setup(SetupCommand::SetMode(Mode::Sleep), &mut rig.board, &mut rig.sink)
        .unwrap();
    rig.device
        .apply_setup(SetupCommand::Exit, &mut rig.board, &mut rig.sink)
        .unwrap();

    rig.run(500);
    assert_eq!(rig.device.mode(), Mode::Sleep);
    assert!(rig.sink.contains(&AppEvent::SleepDeferred(SleepRefusal::ConfigSyncPending)));
    assert_eq!(rig.board.standbys(), 0);
    assert!(rig.wire.supply_on());

    rig.wire.booted();
    rig.run(100);
    assert_eq!(rig.wire.sent_count(MessageKind::SyncConfig), 1);
    assert_eq!(rig.board.standbys(), 1);
    assert!(!rig.wire.supply_on());
}

#[test]
fn button_wake_keeps_device_awake_for_window() {
    let mut board = synced_sleep_board();
    board.wakes.push_back(WakeSource::Button);
    let mut rig = Rig::boot(board);
    rig.run(200);
    assert!(rig.sink.contains(&AppEvent::Woke(WakeSource::Button)));
    assert_eq!(rig.device.scheduler().sleep_count(), 1);

    // The press that woke the device is still held: it fires nothing.
    rig.irq.push(IrqEvent::ButtonEdge {
        pressed: true,
        at_ms: rig.now,
    });
    rig.run(6000);
    rig.irq.push(IrqEvent::ButtonEdge {
        pressed: false,
        at_ms: rig.now,
    });
    rig.run(100);
    assert!(!rig.device.is_on_setup());
    assert!(!rig.sink.contains(&AppEvent::SetupEntered));

    // Window of 60s opened at 200.
    rig.run(53_800);
    assert_eq!(rig.device.scheduler().sleep_count(), 1);
    rig.run(200);
    assert_eq!(rig.device.scheduler().sleep_count(), 2);
}

#[test]
fn setup_during_sleep_mode_blocks_sleep() {
    let mut board = synced_sleep_board();
    board.wakes.push_back(WakeSource::Button);
    let mut rig = Rig::boot(board);
    rig.run(200);

    // Release the wake press, then hold a new one inside the window.
    rig.run(100);
    rig.irq.push(IrqEvent::ButtonEdge {
        pressed: true,
        at_ms: rig.now,
    });
    rig.run(100);
    rig.irq.push(IrqEvent::ButtonEdge {
        pressed: false,
        at_ms: rig.now,
    });
    rig.run(100);
    rig.irq.push(IrqEvent::ButtonEdge {
        pressed: true,
        at_ms: rig.now,
    });
    rig.run(6000);
    rig.irq.push(IrqEvent::ButtonEdge {
        pressed: false,
        at_ms: rig.now,
    });
    rig.run(100);
    assert!(rig.device.is_on_setup());
    assert!(!rig.device.scheduler().is_armed());

    rig.run(120_000);
    assert_eq!(rig.device.scheduler().sleep_count(), 1);
}
