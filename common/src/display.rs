//! 20x4 status screen.
//!
//! Row 0 shows current and target temperature, row 1 the run mode, row 2
//! which outputs are running and row 3 the wall clock.

use crate::{
    clock::ClockReading,
    engine::SpaEngine,
    hal::{CharacterDisplay, DisplayError},
    types::{PumpSpeed, RunMode},
};

pub const FAULT_MESSAGE: &str = "FAULT - STOPPING";

/// In-memory character display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    cells: [[char; 20]; 4],
    backlight: bool,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self {
            cells: [[' '; 20]; 4],
            backlight: true,
        }
    }
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&self, row: usize) -> String {
        self.cells
            .get(row)
            .map(|cells| cells.iter().collect())
            .unwrap_or_default()
    }

    pub fn lines(&self) -> Vec<String> {
        (0..Self::ROWS).map(|row| self.line(row)).collect()
    }

    pub fn is_backlit(&self) -> bool {
        self.backlight
    }
}

impl CharacterDisplay for FrameBuffer {
    const ROWS: usize = 4;
    const COLS: usize = 20;

    fn clear(&mut self) -> Result<(), DisplayError> {
        self.cells = [[' '; 20]; 4];
        Ok(())
    }

    /// Text running past the last column is cut off.
    fn write_at(&mut self, row: usize, col: usize, text: &str) -> Result<(), DisplayError> {
        if row >= Self::ROWS || col >= Self::COLS {
            return Err(DisplayError::OutOfBounds { row, col });
        }
        for (cell, ch) in self.cells[row][col..].iter_mut().zip(text.chars()) {
            *cell = ch;
        }
        Ok(())
    }

    fn set_backlight(&mut self, on: bool) -> Result<(), DisplayError> {
        self.backlight = on;
        Ok(())
    }
}

fn format_temp(temp: f32) -> String {
    if temp.fract() == 0.0 {
        format!("{temp:.0}")
    } else {
        format!("{temp:.1}")
    }
}

fn mode_label(mode: RunMode, manual: bool) -> &'static str {
    match (mode, manual) {
        (RunMode::FilterOnly, false) => "Filter Only",
        (RunMode::FilterOnly, true) => "Manual - No Heat",
        (RunMode::Schedule, false) => "Schedule Mode",
        (RunMode::Schedule, true) => "Schedule - Manual",
        (RunMode::HoldTemp, false) => "Hold Temp Mode",
        (RunMode::HoldTemp, true) => "Hold Temp - Manual",
    }
}

/// Draws the running status. Every row is written in full so stale
/// characters from the previous frame are overwritten.
pub fn render_status<D: CharacterDisplay>(
    display: &mut D,
    engine: &SpaEngine,
    clock: &ClockReading,
) -> Result<(), DisplayError> {
    let current = engine
        .reading()
        .display_value()
        .map(format_temp)
        .unwrap_or_else(|| "--.-".to_string());
    let target = format_temp(engine.target_temp());
    display.write_at(0, 0, &format!("Temp: {current:<5} -> {target:<5}"))?;

    let label = match engine.run_mode() {
        Some(mode) => mode_label(mode, engine.is_manual()),
        None => FAULT_MESSAGE,
    };
    display.write_at(1, 0, &format!("{label:<20}"))?;

    let pump = match engine.pump() {
        PumpSpeed::Off => "",
        PumpSpeed::Low => "pump",
        PumpSpeed::High => "PUMP",
    };
    let heat = if engine.is_heater_on() { "HEAT" } else { "" };
    let blower = if engine.is_blower_on() { "BLOW" } else { "" };
    let light = if engine.is_light_on() { "LIGHT" } else { "" };
    display.write_at(2, 0, &format!("{pump:<4} {heat:<4} {blower:<4} {light:<5}"))?;

    display.write_at(3, 0, &format!("{:6}{:<14}", "", clock.hms()))?;
    display.set_backlight(true)
}

pub fn render_fault<D: CharacterDisplay>(display: &mut D) -> Result<(), DisplayError> {
    display.clear()?;
    display.write_at(1, 2, FAULT_MESSAGE)?;
    display.set_backlight(false)
}
