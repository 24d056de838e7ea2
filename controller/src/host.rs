use std::{
    path::PathBuf,
    sync::{atomic::AtomicBool, Arc},
    time::Duration,
};

use anyhow::{anyhow, bail, Context};
use chrono_tz::Tz;
use spa_common::{
    render_fault, render_status, Actuators, Button, ButtonPanel, CharacterDisplay, Clock,
    ClockReading, ConfigError, EngineAction, FaultReason, SpaConfig, SpaEngine, TickInput,
    FAULT_MESSAGE,
};
use spa_sensor::{LatestReading, SimulatedProbe, TemperatureMonitor, W1ThermProbe};
use tokio::{
    signal::unix::{signal, SignalKind},
    sync::mpsc::{self, UnboundedReceiver},
};
use tracing::{debug, error, info, warn};

use crate::{
    export::StatusExporter,
    hardware::{spawn_console_buttons, ConsoleDisplay, HeldButtons, SimulatedActuators, SystemClock},
};

/// Starting water temperature for the simulated probe, in Celsius.
const SIMULATED_WATER_C: f32 = 30.0;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let probe_dir = std::env::var("SPA_PROBE_PATH").ok().map(PathBuf::from);
    let mut config = SpaConfig::default();
    if let Ok(path) = std::env::var("SPA_STATUS_FILE") {
        config.enable_status_export = true;
        config.status_export_path = path;
    }

    match config.validate() {
        Ok(unit) => info!("controller starting in {:?}, unit {}", config.default_mode, unit.symbol()),
        // The engine starts faulted and the loop shuts down on its first pass.
        Err(ConfigError::InvalidTemperatureUnit(unit)) => {
            error!("invalid temperature unit {unit:?}");
        }
        Err(err) => return Err(err).context("invalid controller configuration"),
    }

    debug!("pin map {:?}", config.pins);

    let tz: Tz = config
        .timezone
        .parse()
        .map_err(|err| anyhow!("invalid timezone {}: {err}", config.timezone))?;
    let clock = SystemClock::new(tz);

    let heater_flag = Arc::new(AtomicBool::new(false));
    let latest = Arc::new(LatestReading::new());
    let poll_interval = Duration::from_millis(config.sensor_poll_interval_ms);
    let monitor = match &probe_dir {
        Some(dir) => {
            let probe = W1ThermProbe::in_devices_dir(dir, &config.probe_id);
            info!("reading probe at {}", probe.slave_path().display());
            TemperatureMonitor::new(probe, config.temperature_unit, latest.clone(), poll_interval)
                .spawn()
        }
        None => {
            info!("SPA_PROBE_PATH not set, using simulated water temperature");
            let probe = SimulatedProbe::new(heater_flag.clone(), SIMULATED_WATER_C);
            TemperatureMonitor::new(probe, config.temperature_unit, latest.clone(), poll_interval)
                .spawn()
        }
    };
    monitor.context("failed to start temperature monitor")?;

    let (button_tx, button_rx) = mpsc::unbounded_channel();
    spawn_console_buttons(button_tx).context("failed to start console button reader")?;

    let exporter = config
        .enable_status_export
        .then(|| StatusExporter::new(&config.status_export_path));
    if let Some(exporter) = &exporter {
        info!("exporting status to {}", exporter.path().display());
    }

    let mut controller = Controller::new(
        config,
        SimulatedActuators::new(heater_flag),
        ConsoleDisplay::new(),
        button_rx,
    );

    let outcome = run_loop(&mut controller, &clock, &latest, exporter.as_ref()).await;
    controller.shutdown();
    outcome
}

async fn run_loop(
    controller: &mut Controller<SimulatedActuators, ConsoleDisplay>,
    clock: &impl Clock,
    latest: &LatestReading,
    exporter: Option<&StatusExporter>,
) -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    loop {
        if let Some(reason) = controller.tick(clock.now(), latest)? {
            controller.display.flush();
            bail!("{FAULT_MESSAGE}: {reason}");
        }
        controller.display.flush();

        if let Some(exporter) = exporter {
            if let Err(err) = exporter.publish(&controller.engine.status()).await {
                warn!("status export failed: {err:#}");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(controller.pause()) => {}
            _ = &mut ctrl_c => {
                warn!("SIGINT received, turning everything off");
                return Ok(());
            }
            _ = sigterm.recv() => {
                warn!("SIGTERM received, turning everything off");
                return Ok(());
            }
        }
    }
}

/// One spa's worth of engine, outputs, screen and buttons, advanced one tick
/// at a time by the host loop.
pub struct Controller<A, D> {
    engine: SpaEngine,
    actuators: A,
    display: D,
    panel: ButtonPanel,
    held: HeldButtons,
    buttons: UnboundedReceiver<Button>,
}

impl<A: Actuators, D: CharacterDisplay> Controller<A, D> {
    pub fn new(config: SpaConfig, actuators: A, display: D, buttons: UnboundedReceiver<Button>) -> Self {
        let bounce_ms = config.button_bounce_ms;
        Self {
            engine: SpaEngine::new(config),
            actuators,
            display,
            panel: ButtonPanel::new(bounce_ms),
            held: HeldButtons::new(bounce_ms),
            buttons,
        }
    }

    /// Runs one control cycle. Returns the fault reason once the engine has
    /// faulted; the fault screen is already drawn by then.
    pub fn tick(&mut self, now: ClockReading, latest: &LatestReading) -> anyhow::Result<Option<FaultReason>> {
        if let Some(reason) = self.engine.fault() {
            return self.show_fault(reason).map(Some);
        }

        let poll_ms = u64::try_from(self.pause().as_millis()).unwrap_or(u64::MAX);
        while let Ok(button) = self.buttons.try_recv() {
            self.held.press(button, now.epoch_ms, poll_ms);
        }
        let levels = self.held.levels(now.epoch_ms);
        let presses = self.panel.poll(levels, now.epoch_ms);

        let actions = self.engine.tick(&TickInput {
            clock: now,
            reading: latest.load(),
            presses,
        });

        let mut fault = None;
        for action in actions {
            match action {
                EngineAction::SetPump(speed) => self.actuators.set_pump(speed)?,
                EngineAction::SetHeater(on) => self.actuators.set_heater(on)?,
                EngineAction::SetBlower(on) => self.actuators.set_blower(on)?,
                EngineAction::SetLight(on) => self.actuators.set_light(on)?,
                EngineAction::SetIndicator(on) => self.actuators.set_indicator(on)?,
                EngineAction::SetBacklight(on) => {
                    if !on {
                        self.display.clear().context("failed to blank display")?;
                    }
                    self.display
                        .set_backlight(on)
                        .context("failed to switch backlight")?;
                }
                EngineAction::Fault(reason) => fault = Some(reason),
            }
        }

        if let Some(reason) = fault {
            return self.show_fault(reason).map(Some);
        }

        if self.engine.is_screen_awake() {
            render_status(&mut self.display, &self.engine, &now)
                .context("failed to draw status screen")?;
        }
        Ok(None)
    }

    fn show_fault(&mut self, reason: FaultReason) -> anyhow::Result<FaultReason> {
        render_fault(&mut self.display).context("failed to draw fault screen")?;
        Ok(reason)
    }

    pub fn pause(&self) -> Duration {
        let config = &self.engine.config;
        Duration::from_millis(if self.engine.is_screen_awake() {
            config.tick_interval_ms
        } else {
            config.blanked_tick_interval_ms
        })
    }

    /// Safe-off for every exit path. Errors are logged so every output still
    /// gets its turn.
    pub fn shutdown(&mut self) {
        if let Err(err) = self.actuators.release_all() {
            error!("failed to release outputs: {err}");
        }
        if let Err(err) = self.display.set_backlight(false) {
            warn!("failed to switch off backlight: {err}");
        }
        info!("outputs released");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use pretty_assertions::assert_eq;
    use spa_common::{FrameBuffer, PumpSpeed, RunMode};

    use super::*;

    fn at(hour: u32, minute: u32, epoch_secs: u64) -> ClockReading {
        ClockReading {
            hour,
            minute,
            second: 0,
            epoch_ms: epoch_secs * 1_000,
        }
    }

    fn controller(
        config: SpaConfig,
    ) -> (
        Controller<SimulatedActuators, FrameBuffer>,
        mpsc::UnboundedSender<Button>,
        Arc<AtomicBool>,
    ) {
        let flag = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Controller::new(config, SimulatedActuators::new(flag.clone()), FrameBuffer::new(), rx);
        (controller, tx, flag)
    }

    #[test]
    fn schedule_window_drives_relays_and_screen() {
        let (mut controller, _tx, flag) = controller(SpaConfig::default());
        let latest = LatestReading::new();
        latest.publish(95.0);

        assert_eq!(controller.tick(at(19, 0, 1_000_000), &latest).unwrap(), None);
        assert_eq!(controller.actuators.pump(), PumpSpeed::Low);
        assert!(!controller.actuators.heater());

        assert_eq!(controller.tick(at(19, 1, 1_000_061), &latest).unwrap(), None);
        assert!(controller.actuators.heater());
        assert!(flag.load(Ordering::Relaxed));
        assert_eq!(controller.display.line(1), "Schedule Mode       ");
        assert_eq!(controller.display.line(2), "pump HEAT           ");
    }

    #[test]
    fn console_press_reaches_engine_once() {
        let (mut controller, tx, _flag) = controller(SpaConfig {
            default_mode: RunMode::FilterOnly,
            ..SpaConfig::default()
        });
        let latest = LatestReading::new();
        tx.send(Button::Light).unwrap();

        let mut now_ms = 5_000_000u64;
        for _ in 0..20 {
            controller
                .tick(
                    ClockReading {
                        hour: 12,
                        minute: 0,
                        second: 0,
                        epoch_ms: now_ms,
                    },
                    &latest,
                )
                .unwrap();
            now_ms += 50;
        }

        assert!(controller.actuators.light());
        assert!(controller.engine.is_manual());
    }

    fn tick_at_pause(
        controller: &mut Controller<SimulatedActuators, FrameBuffer>,
        now_ms: &mut u64,
        latest: &LatestReading,
    ) {
        *now_ms += u64::try_from(controller.pause().as_millis()).unwrap();
        controller
            .tick(
                ClockReading {
                    hour: 12,
                    minute: 6,
                    second: 0,
                    epoch_ms: *now_ms,
                },
                latest,
            )
            .unwrap();
    }

    #[test]
    fn console_press_wakes_blanked_screen() {
        let (mut controller, tx, _flag) = controller(SpaConfig::default());
        let latest = LatestReading::new();
        controller.tick(at(12, 0, 1_000_000), &latest).unwrap();
        controller.tick(at(12, 6, 1_000_301), &latest).unwrap();
        assert!(!controller.engine.is_screen_awake());
        assert!(!controller.actuators.indicator());

        tx.send(Button::Mode).unwrap();
        let mut now_ms = 1_000_301_000;
        for _ in 0..8 {
            tick_at_pause(&mut controller, &mut now_ms, &latest);
        }

        assert!(controller.engine.is_screen_awake());
        assert!(controller.actuators.indicator());
        assert!(controller.display.is_backlit());
        // The waking press is consumed.
        assert_eq!(controller.engine.run_mode(), Some(RunMode::Schedule));

        tx.send(Button::Mode).unwrap();
        for _ in 0..20 {
            tick_at_pause(&mut controller, &mut now_ms, &latest);
        }
        assert_eq!(controller.engine.run_mode(), Some(RunMode::HoldTemp));
    }

    #[test]
    fn invalid_unit_reading_faults_and_goes_dark() {
        let (mut controller, _tx, _flag) = controller(SpaConfig::default());
        let latest = LatestReading::new();
        latest.publish(95.0);
        controller.tick(at(19, 0, 1_000_000), &latest).unwrap();

        latest.mark_invalid_unit();
        let fault = controller.tick(at(19, 0, 1_000_001), &latest).unwrap();

        assert_eq!(fault, Some(FaultReason::InvalidTemperatureUnit));
        assert_eq!(controller.actuators.pump(), PumpSpeed::Off);
        assert_eq!(controller.display.line(1), "  FAULT - STOPPING  ");
        assert!(!controller.display.is_backlit());
    }

    #[test]
    fn bad_configured_unit_faults_on_first_tick() {
        let (mut controller, _tx, _flag) = controller(SpaConfig {
            temperature_unit: 'K',
            ..SpaConfig::default()
        });

        let fault = controller.tick(at(19, 0, 1_000_000), &LatestReading::new()).unwrap();

        assert_eq!(fault, Some(FaultReason::InvalidTemperatureUnit));
        assert_eq!(controller.actuators.pump(), PumpSpeed::Off);
    }

    #[test]
    fn shutdown_releases_everything() {
        let (mut controller, _tx, flag) = controller(SpaConfig::default());
        let latest = LatestReading::new();
        latest.publish(95.0);
        controller.tick(at(19, 0, 1_000_000), &latest).unwrap();
        controller.tick(at(19, 1, 1_000_061), &latest).unwrap();

        controller.shutdown();

        assert_eq!(controller.actuators.pump(), PumpSpeed::Off);
        assert!(!controller.actuators.heater());
        assert!(!flag.load(Ordering::Relaxed));
        assert!(!controller.display.is_backlit());
    }

    #[test]
    fn blanked_screen_slows_the_loop() {
        let (mut controller, _tx, _flag) = controller(SpaConfig::default());
        let latest = LatestReading::new();

        controller.tick(at(12, 0, 1_000_000), &latest).unwrap();
        assert_eq!(controller.pause(), Duration::from_millis(50));

        controller.tick(at(12, 6, 1_000_301), &latest).unwrap();
        assert!(!controller.engine.is_screen_awake());
        assert_eq!(controller.pause(), Duration::from_millis(250));
        assert!(!controller.display.is_backlit());
    }
}
