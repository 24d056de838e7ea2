use tracing::{debug, error, info, warn};

use crate::{
    buttons::{Button, ButtonSet},
    clock::{ClockReading, TimeWindow},
    config::SpaConfig,
    types::{ControlState, FaultReason, PumpSpeed, RunMode, SensorReading, SpaStatus},
};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineAction {
    SetPump(PumpSpeed),
    SetHeater(bool),
    SetBlower(bool),
    SetLight(bool),
    SetIndicator(bool),
    SetBacklight(bool),
    /// Terminal. The loop must render the fault screen, release every
    /// output and stop.
    Fault(FaultReason),
}

/// Everything the engine samples at the start of a tick.
#[derive(Debug, Clone, Copy)]
pub struct TickInput {
    pub clock: ClockReading,
    pub reading: SensorReading,
    /// Debounced presses reported by the button panel this tick.
    pub presses: ButtonSet,
}

#[derive(Debug, Clone)]
pub struct SpaEngine {
    pub config: SpaConfig,
    window: TimeWindow,

    state: ControlState,
    manual: bool,

    target_temp: f32,
    turn_on_temp: f32,
    reading: SensorReading,

    pump: PumpSpeed,
    heater_on: bool,
    blower_on: bool,
    light_on: bool,
    indicator_on: bool,
    screen_awake: bool,

    pump_start_ms: Option<u64>,
    heater_off_ms: Option<u64>,
    last_activity_ms: Option<u64>,

    // Keeps hold-temp mode from restarting the pump twice in one check window.
    loop_protect: bool,
    in_time_window: bool,
    minute: u32,
    now_ms: u64,
}

impl SpaEngine {
    /// Builds the engine from compiled-in defaults. A configuration with an
    /// unreadable temperature unit starts out faulted, before any tick runs.
    pub fn new(config: SpaConfig) -> Self {
        let state = match config.unit() {
            Ok(_) => ControlState::Running(config.default_mode),
            Err(err) => {
                error!("refusing to start control loop: {err}");
                ControlState::Faulted(FaultReason::InvalidTemperatureUnit)
            }
        };
        let target_temp = config
            .initial_target_temp
            .clamp(config.min_temp, config.max_temp);

        Self {
            window: TimeWindow::new(config.time_window_start, config.time_window_end),
            turn_on_temp: target_temp - config.max_temp_sag,
            target_temp,
            config,
            state,
            manual: false,
            reading: SensorReading::Pending,
            pump: PumpSpeed::Off,
            heater_on: false,
            blower_on: false,
            light_on: false,
            indicator_on: false,
            screen_awake: true,
            pump_start_ms: None,
            heater_off_ms: None,
            last_activity_ms: None,
            loop_protect: false,
            in_time_window: false,
            minute: 0,
            now_ms: 0,
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn run_mode(&self) -> Option<RunMode> {
        match self.state {
            ControlState::Running(mode) => Some(mode),
            ControlState::Faulted(_) => None,
        }
    }

    pub fn fault(&self) -> Option<FaultReason> {
        match self.state {
            ControlState::Faulted(reason) => Some(reason),
            ControlState::Running(_) => None,
        }
    }

    pub fn is_manual(&self) -> bool {
        self.manual
    }

    pub fn target_temp(&self) -> f32 {
        self.target_temp
    }

    pub fn turn_on_temp(&self) -> f32 {
        self.turn_on_temp
    }

    pub fn reading(&self) -> SensorReading {
        self.reading
    }

    pub fn pump(&self) -> PumpSpeed {
        self.pump
    }

    pub fn is_heater_on(&self) -> bool {
        self.heater_on
    }

    pub fn is_blower_on(&self) -> bool {
        self.blower_on
    }

    pub fn is_light_on(&self) -> bool {
        self.light_on
    }

    pub fn is_indicator_on(&self) -> bool {
        self.indicator_on
    }

    pub fn is_screen_awake(&self) -> bool {
        self.screen_awake
    }

    pub fn in_time_window(&self) -> bool {
        self.in_time_window
    }

    pub fn loop_protect(&self) -> bool {
        self.loop_protect
    }

    /// Runs one control cycle and returns the output changes it decided on.
    ///
    /// Order: time window, manual override, run-mode logic, button presses,
    /// screensaver, then the heater/pump interlock as the final check.
    pub fn tick(&mut self, input: &TickInput) -> Vec<EngineAction> {
        let mut actions = Vec::new();
        let ControlState::Running(mode) = self.state else {
            return actions;
        };

        self.now_ms = input.clock.epoch_ms;
        self.minute = input.clock.minute;
        self.reading = input.reading;

        if input.reading == SensorReading::InvalidUnit {
            self.enter_fault(FaultReason::InvalidTemperatureUnit, &mut actions);
            return actions;
        }

        let last_activity = *self.last_activity_ms.get_or_insert(self.now_ms);
        let idle_ms = self.now_ms.saturating_sub(last_activity);
        self.in_time_window = self.window.contains(input.clock.hour);

        if self.manual {
            self.manual_tick(mode, idle_ms, &mut actions);
        }

        match mode {
            RunMode::FilterOnly => self.filter_only_tick(&mut actions),
            RunMode::Schedule => self.schedule_tick(&mut actions),
            RunMode::HoldTemp => self.hold_temp_tick(&mut actions),
        }

        self.handle_presses(input.presses, &mut actions);
        self.update_screen(&mut actions);
        self.enforce_interlock(&mut actions);

        actions
    }

    /// Pump button: Off -> Low -> High, then back to Low inside the time
    /// window, or Off in hold-temp mode and outside the window.
    pub fn apply_manual_pump_press(&mut self) -> Vec<EngineAction> {
        let mut actions = Vec::new();
        let Some(mode) = self.run_mode() else {
            return actions;
        };

        self.enter_manual();
        match self.pump {
            PumpSpeed::Off => self.run_pump(PumpSpeed::Low, &mut actions),
            PumpSpeed::Low => self.run_pump(PumpSpeed::High, &mut actions),
            PumpSpeed::High => {
                if mode == RunMode::HoldTemp || !self.in_time_window {
                    self.stop_pump(&mut actions);
                } else {
                    self.run_pump(PumpSpeed::Low, &mut actions);
                }
            }
        }
        actions
    }

    pub fn toggle_blower(&mut self) -> Vec<EngineAction> {
        let mut actions = Vec::new();
        if self.run_mode().is_none() {
            return actions;
        }

        self.enter_manual();
        self.set_blower(!self.blower_on, &mut actions);
        actions
    }

    pub fn toggle_light(&mut self) -> Vec<EngineAction> {
        let mut actions = Vec::new();
        if self.run_mode().is_none() {
            return actions;
        }

        self.enter_manual();
        self.set_light(!self.light_on, &mut actions);
        actions
    }

    /// Advances to the next run mode. Outputs follow on the next tick.
    pub fn request_mode_change(&mut self) -> Option<RunMode> {
        let mode = self.run_mode()?.next();
        self.state = ControlState::Running(mode);
        info!("run mode changed to {}", mode.as_str());
        Some(mode)
    }

    pub fn raise_target_temp(&mut self) -> bool {
        if self.target_temp >= self.config.max_temp {
            return false;
        }
        self.set_target_temp(self.target_temp + 1.0)
    }

    pub fn lower_target_temp(&mut self) -> bool {
        if self.target_temp <= self.config.min_temp {
            return false;
        }
        self.set_target_temp(self.target_temp - 1.0)
    }

    /// Clamps into the configured range and recomputes the turn-on threshold.
    pub fn set_target_temp(&mut self, temp: f32) -> bool {
        let clamped = temp.clamp(self.config.min_temp, self.config.max_temp);
        if (self.target_temp - clamped).abs() <= f32::EPSILON {
            return false;
        }

        self.target_temp = clamped;
        self.turn_on_temp = clamped - self.config.max_temp_sag;
        info!(
            "target temperature {:.1}, heat below {:.1}",
            self.target_temp, self.turn_on_temp
        );
        true
    }

    pub fn status(&self) -> SpaStatus {
        SpaStatus {
            epoch: self.now_ms / 1_000,
            mode: match self.state {
                ControlState::Running(mode) => mode.as_str(),
                ControlState::Faulted(_) => "FAULT",
            },
            manual: self.manual,
            current_temp: self.reading.display_value(),
            target_temp: self.target_temp,
            turn_on_temp: self.turn_on_temp,
            unit: self.config.temperature_unit,
            pump: self.pump.as_str(),
            heat: self.heater_on,
            blower: self.blower_on,
            light: self.light_on,
            in_time_window: self.in_time_window,
            screen_awake: self.screen_awake,
            fault: self.fault().map(FaultReason::as_str),
        }
    }

    fn manual_tick(&mut self, mode: RunMode, idle_ms: u64, actions: &mut Vec<EngineAction>) {
        if idle_ms > self.config.inactivity_timeout_ms {
            info!("leaving manual mode after {}s idle", idle_ms / 1_000);
            self.stop_pump(actions);
            self.set_blower(false, actions);
            self.set_light(false, actions);
            self.manual = false;
            return;
        }

        // Low speed inside the window is as "off" as the pump gets.
        if self.pump != PumpSpeed::High
            && !self.blower_on
            && !self.light_on
            && (self.pump == PumpSpeed::Off || self.in_time_window)
        {
            info!("everything off, leaving manual mode");
            self.manual = false;
            return;
        }

        if mode == RunMode::FilterOnly {
            return;
        }

        if self.pump.is_running() {
            if self.is_sensor_warm() {
                self.apply_hysteresis(actions);
            }
        } else {
            self.turn_heater_off(actions);
        }
    }

    fn filter_only_tick(&mut self, actions: &mut Vec<EngineAction>) {
        self.turn_heater_off(actions);
        if self.manual {
            return;
        }

        if self.in_time_window {
            if self.pump == PumpSpeed::Off {
                self.run_pump(PumpSpeed::Low, actions);
            }
        } else {
            self.stop_pump(actions);
        }
    }

    fn schedule_tick(&mut self, actions: &mut Vec<EngineAction>) {
        if self.in_time_window {
            // Never downgrade a user-selected high speed.
            if self.pump == PumpSpeed::Off {
                self.run_pump(PumpSpeed::Low, actions);
            }
            if !self.manual && self.is_sensor_warm() {
                self.apply_hysteresis(actions);
            }
        } else if !self.manual {
            self.turn_heater_off(actions);
            self.stop_pump(actions);
        }
    }

    fn hold_temp_tick(&mut self, actions: &mut Vec<EngineAction>) {
        if self.manual {
            return;
        }

        // A running pump extends the check past the minute boundary so a
        // long warmup can finish.
        let check_window =
            self.config.temp_check_minutes.contains(&self.minute) || self.pump.is_running();
        if !check_window {
            self.stop_pump(actions);
            self.loop_protect = false;
            return;
        }

        if self.pump == PumpSpeed::Off && !self.loop_protect {
            self.run_pump(PumpSpeed::Low, actions);
            self.loop_protect = true;
        }

        if !self.is_sensor_warm() {
            return;
        }

        match self.reading.trusted() {
            Some(temp) if temp < self.target_temp => {
                if self.pump.is_running() {
                    self.turn_heater_on(actions);
                }
            }
            _ => {
                self.turn_heater_off(actions);
                self.stop_pump(actions);
            }
        }
    }

    /// Heat on below the turn-on threshold, off at or above target. Between
    /// the two the heater keeps its previous state.
    fn apply_hysteresis(&mut self, actions: &mut Vec<EngineAction>) {
        let Some(temp) = self.reading.trusted() else {
            if self.heater_on {
                warn!("no trusted temperature reading, heater off");
                self.turn_heater_off(actions);
            }
            return;
        };

        if temp < self.turn_on_temp {
            self.turn_heater_on(actions);
        } else if temp >= self.target_temp {
            self.turn_heater_off(actions);
        }
    }

    fn handle_presses(&mut self, presses: ButtonSet, actions: &mut Vec<EngineAction>) {
        if presses.is_empty() {
            return;
        }

        self.last_activity_ms = Some(self.now_ms);
        if !self.screen_awake {
            debug!("button press consumed to wake the display");
            return;
        }

        for button in presses.iter() {
            debug!("{button} button pressed");
            match button {
                Button::Pump => actions.extend(self.apply_manual_pump_press()),
                Button::Blower => actions.extend(self.toggle_blower()),
                Button::Light => actions.extend(self.toggle_light()),
                Button::Mode => {
                    self.request_mode_change();
                }
                Button::TempUp => {
                    self.raise_target_temp();
                }
                Button::TempDown => {
                    self.lower_target_temp();
                }
            }
        }
    }

    fn update_screen(&mut self, actions: &mut Vec<EngineAction>) {
        let last_activity = self.last_activity_ms.unwrap_or(self.now_ms);
        let awake = self.now_ms.saturating_sub(last_activity) < self.config.screen_timeout_ms;

        if awake != self.screen_awake {
            self.screen_awake = awake;
            debug!("screensaver {}", if awake { "off" } else { "on" });
            actions.push(EngineAction::SetBacklight(awake));
        }
        if awake != self.indicator_on {
            self.indicator_on = awake;
            actions.push(EngineAction::SetIndicator(awake));
        }
    }

    fn enforce_interlock(&mut self, actions: &mut Vec<EngineAction>) {
        if self.heater_on && self.pump == PumpSpeed::Off {
            self.enter_fault(FaultReason::HeaterWithoutCirculation, actions);
        }
    }

    fn enter_fault(&mut self, reason: FaultReason, actions: &mut Vec<EngineAction>) {
        error!("FAULT - STOPPING: {reason}");
        self.state = ControlState::Faulted(reason);
        self.manual = false;
        self.heater_on = false;
        self.pump = PumpSpeed::Off;
        self.blower_on = false;
        self.light_on = false;
        self.indicator_on = false;
        self.screen_awake = false;

        actions.extend([
            EngineAction::SetHeater(false),
            EngineAction::SetPump(PumpSpeed::Off),
            EngineAction::SetBlower(false),
            EngineAction::SetLight(false),
            EngineAction::SetIndicator(false),
            EngineAction::SetBacklight(false),
            EngineAction::Fault(reason),
        ]);
    }

    fn enter_manual(&mut self) {
        if !self.manual {
            info!("entering manual mode");
            self.manual = true;
        }
    }

    fn is_sensor_warm(&self) -> bool {
        self.pump_start_ms.is_some_and(|start| {
            self.now_ms.saturating_sub(start) >= self.config.sensor_warmup_ms
        })
    }

    fn run_pump(&mut self, speed: PumpSpeed, actions: &mut Vec<EngineAction>) {
        if self.pump == speed {
            return;
        }
        if self.pump == PumpSpeed::Off {
            self.pump_start_ms = Some(self.now_ms);
        }

        self.pump = speed;
        info!("pump {}", speed.as_str());
        actions.push(EngineAction::SetPump(speed));
    }

    fn stop_pump(&mut self, actions: &mut Vec<EngineAction>) {
        self.turn_heater_off(actions);
        if self.pump == PumpSpeed::Off {
            return;
        }

        self.pump = PumpSpeed::Off;
        info!("pump OFF");
        actions.push(EngineAction::SetPump(PumpSpeed::Off));
    }

    fn turn_heater_on(&mut self, actions: &mut Vec<EngineAction>) {
        if self.heater_on {
            return;
        }
        if let Some(off_ms) = self.heater_off_ms {
            let since_off = self.now_ms.saturating_sub(off_ms);
            if since_off <= self.config.heater_cooldown_ms {
                debug!(
                    "heater in cooldown, {}s remaining",
                    (self.config.heater_cooldown_ms - since_off) / 1_000
                );
                return;
            }
        }

        self.heater_on = true;
        info!("heater on");
        actions.push(EngineAction::SetHeater(true));
    }

    fn turn_heater_off(&mut self, actions: &mut Vec<EngineAction>) {
        if !self.heater_on {
            return;
        }

        self.heater_on = false;
        self.heater_off_ms = Some(self.now_ms);
        info!("heater off");
        actions.push(EngineAction::SetHeater(false));
    }

    fn set_blower(&mut self, on: bool, actions: &mut Vec<EngineAction>) {
        if self.blower_on == on {
            return;
        }
        self.blower_on = on;
        actions.push(EngineAction::SetBlower(on));
    }

    fn set_light(&mut self, on: bool, actions: &mut Vec<EngineAction>) {
        if self.light_on == on {
            return;
        }
        self.light_on = on;
        actions.push(EngineAction::SetLight(on));
    }
}
