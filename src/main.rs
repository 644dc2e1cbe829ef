//! SenseKit simulator — the firmware control loop on the host.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SimBoard (RTC · standby · card · flash config · serial no.)   │
//! │  SimCompanion (UART + power lines)   SimSensor ×5              │
//! │  LogEventSink                                                  │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │                Device (control loop)                   │    │
//! │  │  ModeMachine · retry trackers · CompanionLink          │    │
//! │  │  SleepScheduler · ButtonClassifier · SensorHub         │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `sensekit-sim [network|sdcard|sleep] [iterations]`
//!
//! The board starts unconfigured, so the device enters setup.  The
//! simulator plays the user: it sends the setup commands for the chosen
//! mode, leaves setup, and lets the loop run on virtual time.

#![deny(unused_must_use)]

use anyhow::{Context, Result, bail};
use log::info;

use sensekit::adapters::board::SimBoard;
use sensekit::adapters::companion_sim::{CompanionBehaviour, SimCompanion};
use sensekit::adapters::log_sink::LogEventSink;
use sensekit::adapters::sensors_sim::SimSensor;
use sensekit::adapters::time::{LoopClock, SimRtc};
use sensekit::app::commands::SetupCommand;
use sensekit::app::service::Device;
use sensekit::config::{Password, Ssid, Token};
use sensekit::events::{IRQ_EVENTS, isr_card_detect};
use sensekit::link::CompanionLink;
use sensekit::sensors::SensorHub;
use sensekit::state::Mode;

/// Virtual milliseconds per loop iteration.
const TICK_MS: u32 = 100;

/// Iteration at which the simulated user pulls the card.
const CARD_EJECT_AT: u32 = 4_000;

fn parse_mode(arg: Option<&str>) -> Result<Mode> {
    Ok(match arg.unwrap_or("network") {
        "network" => Mode::Network,
        "sdcard" => Mode::SdCard,
        "sleep" => Mode::Sleep,
        other => bail!("unknown mode '{other}' (expected network, sdcard or sleep)"),
    })
}

fn setup_script(mode: Mode) -> Result<Vec<SetupCommand>> {
    let mut cmds = Vec::new();
    if mode == Mode::Network {
        let ssid =
            Ssid::try_from("sensekit-lab").map_err(|_| anyhow::anyhow!("ssid too long"))?;
        let password = Password::try_from("correct horse")
            .map_err(|_| anyhow::anyhow!("password too long"))?;
        let token =
            Token::try_from("a1b2c3").map_err(|_| anyhow::anyhow!("token too long"))?;
        cmds.push(SetupCommand::SetWifi { ssid, password });
        cmds.push(SetupCommand::SetToken(token));
    }
    cmds.push(SetupCommand::SetMode(mode));
    cmds.push(SetupCommand::Exit);
    Ok(cmds)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let mode = parse_mode(args.get(1).map(String::as_str))?;
    let iterations: u32 = match args.get(2) {
        Some(n) => n.parse().context("iterations must be a number")?,
        None => 6_000,
    };

    info!("SenseKit simulator v{}", env!("CARGO_PKG_VERSION"));
    info!("Target mode: {}, {} iterations of {}ms", mode, iterations, TICK_MS);

    // ── Adapters ──────────────────────────────────────────────
    let companion = SimCompanion::new(CompanionBehaviour::default());
    let link = CompanionLink::new(companion.transport(), companion.lines());

    let mut sensors = SensorHub::new();
    for sensor in SimSensor::standard_set() {
        sensors.add(Box::new(sensor));
    }

    let mut board = SimBoard::new();
    // The coin cell kept the clock running; the companion corrects it.
    board.rtc = SimRtc::at(1_699_990_000);
    let mut sink = LogEventSink::new();
    let mut clock = LoopClock::new();

    // ── Boot ──────────────────────────────────────────────────
    let mut device = Device::new(link, sensors);
    device.boot(&mut board, &mut sink);

    let mut script = setup_script(mode)?.into_iter();

    // ── Main loop ─────────────────────────────────────────────
    for i in 0..iterations {
        let now = clock.advance(TICK_MS);
        board.rtc.advance_ms(TICK_MS);

        if i == CARD_EJECT_AT && mode == Mode::SdCard {
            info!("sim: ejecting card");
            board.storage.eject();
            isr_card_detect(now);
        }

        device.tick(now, &IRQ_EVENTS, &mut board, &mut sink);

        // Play the user once the companion is up and setup is showing.
        if device.is_on_setup() && device.link().is_powered() {
            if let Some(cmd) = script.next() {
                info!("sim: setup <- {:?}", cmd);
                device
                    .apply_setup(cmd, &mut board, &mut sink)
                    .context("setup command rejected")?;
            }
        }
    }

    info!(
        "sim: done | mode={} events={} sleeps={} companion boots={} dropped irqs={}",
        device.mode(),
        sink.emitted(),
        device.scheduler().sleep_count(),
        companion.boots(),
        IRQ_EVENTS.dropped(),
    );
    Ok(())
}
