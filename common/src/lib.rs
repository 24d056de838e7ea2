pub mod buttons;
pub mod clock;
pub mod config;
pub mod display;
pub mod engine;
pub mod hal;
pub mod types;

pub use buttons::{Button, ButtonPanel, ButtonSet, Debouncer};
pub use clock::{Clock, ClockReading, TimeWindow};
pub use config::{ConfigError, PinMap, SpaConfig, TemperatureUnit};
pub use display::{render_fault, render_status, FrameBuffer, FAULT_MESSAGE};
pub use engine::{EngineAction, SpaEngine, TickInput};
pub use hal::{ActuatorError, Actuators, CharacterDisplay, DisplayError};
pub use types::{ControlState, FaultReason, PumpSpeed, RunMode, SensorReading, SpaStatus};
