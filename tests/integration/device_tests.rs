//! Device-level tests: boot, mode resolution, setup, button, storage.

use sensekit::adapters::board::SimBoard;
use sensekit::adapters::device_id::SimIdentity;
use sensekit::adapters::storage::MemStorage;
use sensekit::app::commands::SetupCommand;
use sensekit::app::events::AppEvent;
use sensekit::app::ports::{ConfigPort, FileId};
use sensekit::config::{DeviceConfig, Password, Ssid, Token};
use sensekit::error::{ConfigError, Error};
use sensekit::events::IrqEvent;
use sensekit::link::MessageKind;
use sensekit::state::Mode;

use crate::mock_hw::{Rig, board_with, mode_config, network_config};

fn press(rig: &mut Rig, hold_ms: u32) {
    rig.irq.push(IrqEvent::ButtonEdge {
        pressed: true,
        at_ms: rig.now,
    });
    rig.run(hold_ms);
    rig.irq.push(IrqEvent::ButtonEdge {
        pressed: false,
        at_ms: rig.now,
    });
    rig.run(100);
}

/// Unconfigured device in setup with its companion up.
fn in_setup() -> Rig {
    let mut rig = Rig::boot(SimBoard::new());
    rig.run(200);
    rig.wire.booted();
    rig.run(100);
    assert!(rig.device.is_on_setup());
    assert!(rig.device.link().is_powered());
    rig
}

// ── Boot ──────────────────────────────────────────────────────

#[test]
fn boot_reports_identity() {
    let mut board = SimBoard::new();
    board.identity = SimIdentity::with_words([1, 2, 3, 0xABCD_EF01]);
    let rig = Rig::boot(board);
    assert_eq!(rig.device.id(), "000000010000000200000003ABCDEF01");
    assert!(matches!(
        rig.sink.events.first(),
        Some(AppEvent::Started { mode: Mode::NotConfigured, .. })
    ));
}

#[test]
fn unreadable_serial_boots_as_unknown() {
    let mut board = SimBoard::new();
    board.identity = SimIdentity::unreadable();
    let rig = Rig::boot(board);
    assert_eq!(rig.device.id(), "unknown");
}

#[test]
fn corrupted_config_boots_with_defaults() {
    let mut board = board_with(&network_config());
    board.config.corrupt();
    let rig = Rig::boot(board);
    assert_eq!(rig.device.config(), &DeviceConfig::default());
}

#[test]
fn stored_config_resolves_mode_on_first_iteration() {
    let mut rig = Rig::boot(board_with(&mode_config(Mode::SdCard)));
    assert_eq!(rig.device.mode(), Mode::NotConfigured);
    rig.run(100);
    assert_eq!(rig.device.mode(), Mode::SdCard);
    assert!(rig.sink.contains(&AppEvent::ModeChanged {
        from: Mode::NotConfigured,
        to: Mode::SdCard
    }));
}

// ── Setup ─────────────────────────────────────────────────────

#[test]
fn unconfigured_device_enters_setup_and_powers_link() {
    let mut rig = Rig::boot(SimBoard::new());
    rig.run(100);
    assert!(rig.device.is_on_setup());
    assert_eq!(rig.sink.count(&AppEvent::SetupEntered), 1);
    rig.run(100);
    assert_eq!(rig.wire.power_ons(), 1);
}

#[test]
fn setup_configures_network_mode() {
    let mut rig = in_setup();
    let cmds = [
        SetupCommand::SetWifi {
            ssid: Ssid::try_from("lab").unwrap(),
            password: Password::try_from("secret").unwrap(),
        },
        SetupCommand::SetToken(Token::try_from("a1b2c3").unwrap()),
        SetupCommand::SetMode(Mode::Network),
    ];
    for cmd in cmds {
        rig.device
            .apply_setup(cmd, &mut rig.board, &mut rig.sink)
            .unwrap();
    }
    rig.run(100);
    let sync = rig.wire.last_sent(MessageKind::SyncConfig).unwrap();
    assert!(sync.text().unwrap().contains("\"ssid\":\"lab\""));

    rig.device
        .apply_setup(SetupCommand::Exit, &mut rig.board, &mut rig.sink)
        .unwrap();
    assert!(!rig.device.is_on_setup());
    assert!(rig.sink.contains(&AppEvent::SetupExited));
    assert_eq!(rig.board.config.load().unwrap(), network_config());

    // Resolve the mode, start the cycle, then associate and register.
    rig.run(300);
    assert_eq!(rig.device.mode(), Mode::Network);
    assert_eq!(rig.wire.sent_count(MessageKind::SetWifi), 1);
    rig.wire.wifi(true);
    rig.run(100);
    let token = rig.wire.last_sent(MessageKind::SetToken).unwrap();
    assert_eq!(token.text(), Some("a1b2c3"));
    let hello = rig.wire.last_sent(MessageKind::Hello).unwrap();
    assert_eq!(hello.text(), Some(rig.device.id()));

    rig.wire.push(MessageKind::HelloAck, &[]);
    rig.run(100);
    assert!(!rig.device.net().hello_pending);
}

#[test]
fn setup_command_outside_setup_is_rejected() {
    let mut rig = Rig::boot(board_with(&mode_config(Mode::SdCard)));
    rig.run(100);
    let res = rig
        .device
        .apply_setup(SetupCommand::SetMode(Mode::Sleep), &mut rig.board, &mut rig.sink);
    assert_eq!(res, Err(Error::NotInSetup));
    assert_eq!(rig.device.config().mode, Mode::SdCard);
}

#[test]
fn invalid_setup_is_not_persisted() {
    let mut rig = in_setup();
    rig.device
        .apply_setup(SetupCommand::SetMode(Mode::Network), &mut rig.board, &mut rig.sink)
        .unwrap();
    let res = rig
        .device
        .apply_setup(SetupCommand::Exit, &mut rig.board, &mut rig.sink);
    assert!(matches!(
        res,
        Err(Error::Config(ConfigError::ValidationFailed(_)))
    ));
    assert!(rig.device.is_on_setup());
    assert_eq!(rig.board.config.writes(), 0);
}

#[test]
fn config_sync_waits_for_link() {
    let mut rig = Rig::boot(SimBoard::new());
    rig.run(200);
    rig.device
        .apply_setup(SetupCommand::SetMode(Mode::SdCard), &mut rig.board, &mut rig.sink)
        .unwrap();
    rig.run(500);
    assert_eq!(rig.wire.sent_count(MessageKind::SyncConfig), 0);
    assert!(rig.device.link().config_sync_pending());

    rig.wire.booted();
    rig.run(100);
    assert_eq!(rig.wire.sent_count(MessageKind::SyncConfig), 1);
    assert!(!rig.device.link().config_sync_pending());
}

// ── Button ────────────────────────────────────────────────────

#[test]
fn long_press_toggles_setup() {
    let mut rig = Rig::boot(board_with(&mode_config(Mode::SdCard)));
    rig.run(300);
    assert!(!rig.device.is_on_setup());

    press(&mut rig, 6000);
    assert!(rig.device.is_on_setup());
    assert_eq!(rig.sink.count(&AppEvent::SetupEntered), 1);

    press(&mut rig, 6000);
    assert!(!rig.device.is_on_setup());
    assert_eq!(rig.sink.count(&AppEvent::SetupExited), 1);
}

#[test]
fn short_press_does_nothing() {
    let mut rig = Rig::boot(board_with(&mode_config(Mode::SdCard)));
    rig.run(300);
    press(&mut rig, 1000);
    assert!(!rig.device.is_on_setup());
    assert!(!rig.sink.contains(&AppEvent::SetupEntered));
}

#[test]
fn tap_shorter_than_debounce_is_ignored() {
    let mut rig = Rig::boot(board_with(&network_config()));
    rig.run(300);
    rig.irq.push(IrqEvent::ButtonEdge {
        pressed: true,
        at_ms: rig.now,
    });
    rig.irq.push(IrqEvent::ButtonEdge {
        pressed: false,
        at_ms: rig.now + 30,
    });
    rig.run(16_000);
    assert!(!rig.device.button().is_held());
    assert!(!rig.sink.contains(&AppEvent::ConfigReset));
    assert!(!rig.sink.contains(&AppEvent::SetupEntered));
    assert_eq!(rig.device.config(), &network_config());
}

#[test]
fn very_long_press_restores_defaults_once() {
    let mut rig = Rig::boot(board_with(&network_config()));
    rig.run(300);

    rig.irq.push(IrqEvent::ButtonEdge {
        pressed: true,
        at_ms: rig.now,
    });
    rig.run(15_200);
    // Fires while still held.
    assert_eq!(rig.sink.count(&AppEvent::ConfigReset), 1);
    assert_eq!(rig.device.config(), &DeviceConfig::default());
    assert_eq!(rig.board.config.load().unwrap(), DeviceConfig::default());

    let entered = rig.sink.count(&AppEvent::SetupEntered);
    rig.irq.push(IrqEvent::ButtonEdge {
        pressed: false,
        at_ms: rig.now,
    });
    rig.run(100);
    assert_eq!(rig.sink.count(&AppEvent::ConfigReset), 1);
    // The release does not also count as a long press.
    assert_eq!(rig.sink.count(&AppEvent::SetupEntered), entered);
    assert!(!rig.sink.contains(&AppEvent::SetupExited));
}

// ── Storage ───────────────────────────────────────────────────

#[test]
fn missing_card_is_reported_and_recovered() {
    let mut board = board_with(&mode_config(Mode::SdCard));
    board.storage = MemStorage::without_card();
    let mut rig = Rig::boot(board);
    assert!(rig.sink.contains(&AppEvent::StorageDegraded));

    rig.run(200);
    assert_eq!(rig.sink.count(&AppEvent::NoCard), 1);

    rig.board.storage.insert();
    rig.irq.push(IrqEvent::CardDetect { at_ms: rig.now });
    rig.run(100);
    assert!(rig.device.snapshot().card_present);

    rig.run(60_000);
    assert!(rig.sink.contains(&AppEvent::Published { to_card: true }));
    let monitor = rig.board.storage.contents(FileId::Monitor).unwrap();
    let csv = String::from_utf8(monitor.to_vec()).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("time,temperature,humidity"));
    assert!(lines.next().unwrap().ends_with(",21.50,40.00"));
    assert_eq!(rig.sink.count(&AppEvent::NoCard), 1);
    // Card mode never needs the companion.
    assert_eq!(rig.wire.power_ons(), 0);
}

// ── Change detection ──────────────────────────────────────────

#[test]
fn policy_runs_only_on_change() {
    let mut rig = Rig::boot(board_with(&network_config()));
    rig.run(200);
    rig.wire.booted();
    rig.run(300);
    let settled = rig.device.evaluations();

    rig.run(2000);
    assert_eq!(rig.device.evaluations(), settled);

    rig.device.set_on_shell(true);
    rig.run(100);
    assert_eq!(rig.device.evaluations(), settled);

    rig.wire.wifi(true);
    rig.run(100);
    assert_eq!(rig.device.evaluations(), settled + 1);
}
