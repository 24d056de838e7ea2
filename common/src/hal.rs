//! Interfaces to the relay board and the character display.

use thiserror::Error;

use crate::types::PumpSpeed;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActuatorError {
    #[error("failed to drive {output}: {reason}")]
    Write {
        output: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisplayError {
    #[error("position row {row} column {col} is off the screen")]
    OutOfBounds { row: usize, col: usize },
    #[error("display bus error: {0}")]
    Bus(String),
}

/// Discrete outputs. Every setter is idempotent: writing the state an output
/// already has changes nothing.
pub trait Actuators {
    /// Low and high windings are mutually exclusive.
    fn set_pump(&mut self, speed: PumpSpeed) -> Result<(), ActuatorError>;
    fn set_heater(&mut self, on: bool) -> Result<(), ActuatorError>;
    fn set_blower(&mut self, on: bool) -> Result<(), ActuatorError>;
    fn set_light(&mut self, on: bool) -> Result<(), ActuatorError>;
    fn set_indicator(&mut self, on: bool) -> Result<(), ActuatorError>;

    /// Drives every output to its safe-off state. Heater goes first so it
    /// never outlives circulation.
    fn release_all(&mut self) -> Result<(), ActuatorError> {
        self.set_heater(false)?;
        self.set_pump(PumpSpeed::Off)?;
        self.set_blower(false)?;
        self.set_light(false)?;
        self.set_indicator(false)
    }
}

/// Fixed-width text display addressed by zero-based row and column.
pub trait CharacterDisplay {
    const ROWS: usize;
    const COLS: usize;

    fn clear(&mut self) -> Result<(), DisplayError>;
    fn write_at(&mut self, row: usize, col: usize, text: &str) -> Result<(), DisplayError>;
    fn set_backlight(&mut self, on: bool) -> Result<(), DisplayError>;
}
