use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMode {
    FilterOnly,
    Schedule,
    HoldTemp,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FilterOnly => "FILTER_ONLY",
            Self::Schedule => "SCHEDULE",
            Self::HoldTemp => "HOLD_TEMP",
        }
    }

    /// Mode button order: FilterOnly -> Schedule -> HoldTemp -> FilterOnly.
    pub fn next(self) -> Self {
        match self {
            Self::FilterOnly => Self::Schedule,
            Self::Schedule => Self::HoldTemp,
            Self::HoldTemp => Self::FilterOnly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PumpSpeed {
    Off,
    Low,
    High,
}

impl PumpSpeed {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Low => "LOW",
            Self::High => "HIGH",
        }
    }

    pub fn is_running(self) -> bool {
        self != Self::Off
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultReason {
    InvalidTemperatureUnit,
    HeaterWithoutCirculation,
}

impl FaultReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidTemperatureUnit => "INVALID_TEMPERATURE_UNIT",
            Self::HeaterWithoutCirculation => "HEATER_WITHOUT_CIRCULATION",
        }
    }
}

impl fmt::Display for FaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTemperatureUnit => f.write_str("configured temperature unit is invalid"),
            Self::HeaterWithoutCirculation => f.write_str("heater energized with pump off"),
        }
    }
}

/// Top-level controller state. `Faulted` is terminal for the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Running(RunMode),
    Faulted(FaultReason),
}

/// Latest value published by the temperature monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorReading {
    /// No sample has been published yet.
    Pending,
    Valid(f32),
    /// The probe stopped answering; `last` is the last good sample, if any.
    Failed { last: Option<f32> },
    /// The monitor was started with a unit it cannot read in.
    InvalidUnit,
}

impl SensorReading {
    /// Reading trusted for heat decisions.
    pub fn trusted(self) -> Option<f32> {
        match self {
            Self::Valid(temp) => Some(temp),
            _ => None,
        }
    }

    /// Best value to show on the display.
    pub fn display_value(self) -> Option<f32> {
        match self {
            Self::Valid(temp) => Some(temp),
            Self::Failed { last } => last,
            Self::Pending | Self::InvalidUnit => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SpaStatus {
    pub epoch: u64,
    pub mode: &'static str,
    pub manual: bool,
    #[serde(rename = "currentTemp")]
    pub current_temp: Option<f32>,
    #[serde(rename = "targetTemp")]
    pub target_temp: f32,
    #[serde(rename = "turnOnTemp")]
    pub turn_on_temp: f32,
    pub unit: char,
    pub pump: &'static str,
    pub heat: bool,
    pub blower: bool,
    pub light: bool,
    #[serde(rename = "inTimeWindow")]
    pub in_time_window: bool,
    #[serde(rename = "screenAwake")]
    pub screen_awake: bool,
    pub fault: Option<&'static str>,
}

impl SpaStatus {
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_button_cycles_through_run_modes() {
        let mut mode = RunMode::FilterOnly;
        let mut seen = Vec::new();
        for _ in 0..4 {
            mode = mode.next();
            seen.push(mode);
        }

        assert_eq!(
            seen,
            vec![
                RunMode::Schedule,
                RunMode::HoldTemp,
                RunMode::FilterOnly,
                RunMode::Schedule
            ]
        );
    }

    #[test]
    fn failed_reading_is_shown_but_not_trusted() {
        let reading = SensorReading::Failed { last: Some(99.5) };

        assert_eq!(reading.trusted(), None);
        assert_eq!(reading.display_value(), Some(99.5));
        assert_eq!(SensorReading::Valid(98.0).trusted(), Some(98.0));
    }
}
