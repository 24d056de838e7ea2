use std::{
    io::{self, BufRead},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use chrono::Utc;
use chrono_tz::Tz;
use spa_common::{
    ActuatorError, Actuators, Button, ButtonSet, CharacterDisplay, Clock, ClockReading,
    DisplayError, FrameBuffer, PumpSpeed,
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> ClockReading {
        ClockReading::from_datetime(&Utc::now().with_timezone(&self.tz))
    }
}

/// Relay board stand-in for host runs. Logs each real change and mirrors the
/// heater state into the flag the simulated probe warms the water from.
#[derive(Debug)]
pub struct SimulatedActuators {
    pump: PumpSpeed,
    heater: bool,
    blower: bool,
    light: bool,
    indicator: bool,
    heater_flag: Arc<AtomicBool>,
}

impl SimulatedActuators {
    pub fn new(heater_flag: Arc<AtomicBool>) -> Self {
        Self {
            pump: PumpSpeed::Off,
            heater: false,
            blower: false,
            light: false,
            indicator: false,
            heater_flag,
        }
    }
}

#[cfg(test)]
impl SimulatedActuators {
    pub fn pump(&self) -> PumpSpeed {
        self.pump
    }

    pub fn heater(&self) -> bool {
        self.heater
    }

    pub fn blower(&self) -> bool {
        self.blower
    }

    pub fn light(&self) -> bool {
        self.light
    }

    pub fn indicator(&self) -> bool {
        self.indicator
    }
}

fn switch(output: &'static str, state: &mut bool, on: bool) {
    if *state != on {
        *state = on;
        info!("relay {output} -> {}", if on { "on" } else { "off" });
    }
}

impl Actuators for SimulatedActuators {
    fn set_pump(&mut self, speed: PumpSpeed) -> Result<(), ActuatorError> {
        if self.pump != speed {
            self.pump = speed;
            info!("relay pump -> {}", speed.as_str());
        }
        Ok(())
    }

    fn set_heater(&mut self, on: bool) -> Result<(), ActuatorError> {
        switch("heater", &mut self.heater, on);
        self.heater_flag.store(on, Ordering::Relaxed);
        Ok(())
    }

    fn set_blower(&mut self, on: bool) -> Result<(), ActuatorError> {
        switch("blower", &mut self.blower, on);
        Ok(())
    }

    fn set_light(&mut self, on: bool) -> Result<(), ActuatorError> {
        switch("light", &mut self.light, on);
        Ok(())
    }

    fn set_indicator(&mut self, on: bool) -> Result<(), ActuatorError> {
        switch("button-led", &mut self.indicator, on);
        Ok(())
    }
}

/// Frame buffer that echoes the screen to the log whenever it changes.
#[derive(Debug, Default)]
pub struct ConsoleDisplay {
    frame: FrameBuffer,
    shown: Option<(Vec<String>, bool)>,
}

impl ConsoleDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    /// Returns true when a changed frame was logged.
    pub fn flush(&mut self) -> bool {
        let current = (self.frame.lines(), self.frame.is_backlit());
        if self.shown.as_ref() == Some(&current) {
            return false;
        }
        if current.1 {
            debug!("display\n|{}|", current.0.join("|\n|"));
        } else {
            debug!("display dark");
        }
        self.shown = Some(current);
        true
    }
}

impl CharacterDisplay for ConsoleDisplay {
    const ROWS: usize = FrameBuffer::ROWS;
    const COLS: usize = FrameBuffer::COLS;

    fn clear(&mut self) -> Result<(), DisplayError> {
        self.frame.clear()
    }

    fn write_at(&mut self, row: usize, col: usize, text: &str) -> Result<(), DisplayError> {
        self.frame.write_at(row, col, text)
    }

    fn set_backlight(&mut self, on: bool) -> Result<(), DisplayError> {
        self.frame.set_backlight(on)
    }
}

/// Extra time a console press stays held past the first poll that can
/// report it.
const HOLD_MARGIN_MS: u64 = 100;

/// Keeps console-pressed buttons held down long enough to clear debounce,
/// standing in for the active-low GPIO levels.
///
/// The hold covers the bounce window plus one poll interval, so exactly one
/// press is reported whether the loop is polling fast or slow.
#[derive(Debug)]
pub struct HeldButtons {
    bounce_ms: u64,
    release_at: [Option<u64>; 6],
}

impl HeldButtons {
    pub fn new(bounce_ms: u64) -> Self {
        Self {
            bounce_ms,
            release_at: [None; 6],
        }
    }

    /// `poll_ms` is the spacing of the polls that will follow.
    pub fn press(&mut self, button: Button, now_ms: u64, poll_ms: u64) {
        if let Some(slot) = Button::ALL.iter().position(|candidate| *candidate == button) {
            self.release_at[slot] = Some(
                now_ms
                    .saturating_add(self.bounce_ms + HOLD_MARGIN_MS)
                    .saturating_add(poll_ms),
            );
        }
    }

    /// Pin levels as the panel would read them, active-low.
    pub fn levels(&mut self, now_ms: u64) -> ButtonSet {
        let mut pins = [true; 6];
        for (pin, release_at) in pins.iter_mut().zip(self.release_at.iter_mut()) {
            match *release_at {
                Some(until) if now_ms < until => *pin = false,
                Some(_) => *release_at = None,
                None => {}
            }
        }
        ButtonSet::from_pin_levels(pins)
    }
}

/// Reads button names from stdin, one per line. Runs on a plain thread so a
/// pending read never holds up runtime shutdown.
pub fn spawn_console_buttons(tx: UnboundedSender<Button>) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("console-buttons".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!("console button input failed: {err}");
                        break;
                    }
                };
                let name = line.trim();
                if name.is_empty() {
                    continue;
                }
                match Button::parse(name) {
                    Some(button) => {
                        if tx.send(button).is_err() {
                            break;
                        }
                    }
                    None => warn!("unknown button {name:?}"),
                }
            }
            info!("console button input closed");
        })
}
