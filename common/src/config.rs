use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::RunMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemperatureUnit {
    Fahrenheit,
    Celsius,
}

impl TemperatureUnit {
    pub fn symbol(self) -> char {
        match self {
            Self::Fahrenheit => 'F',
            Self::Celsius => 'C',
        }
    }

    pub fn from_celsius(self, celsius: f32) -> f32 {
        match self {
            Self::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
            Self::Celsius => celsius,
        }
    }
}

impl TryFrom<char> for TemperatureUnit {
    type Error = ConfigError;

    /// Only uppercase `F` and `C` are accepted.
    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value {
            'F' => Ok(Self::Fahrenheit),
            'C' => Ok(Self::Celsius),
            other => Err(ConfigError::InvalidTemperatureUnit(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid temperature unit {0:?}, expected 'F' or 'C'")]
    InvalidTemperatureUnit(char),
    #[error("minimum temperature {min} is above maximum {max}")]
    TemperatureRange { min: f32, max: f32 },
    #[error("target temperature {0} is outside the configured range")]
    TargetOutOfRange(f32),
    #[error("time window hour {0} is not a valid hour of day")]
    InvalidWindowHour(u32),
    #[error("temperature check minute {0} is not a valid minute of the hour")]
    InvalidCheckMinute(u32),
    #[error("maximum temperature sag must be non-negative, got {0}")]
    NegativeSag(f32),
}

/// BCM pin numbers for the relay board and the button panel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PinMap {
    pub pump_low: u8,
    pub pump_high: u8,
    pub heater: u8,
    pub blower: u8,
    pub light: u8,
    pub button_led: u8,
    pub pump_button: u8,
    pub blower_button: u8,
    pub light_button: u8,
    pub mode_button: u8,
    pub temp_up_button: u8,
    pub temp_down_button: u8,
}

impl Default for PinMap {
    fn default() -> Self {
        Self {
            pump_low: 9,
            pump_high: 10,
            heater: 11,
            blower: 8,
            light: 7,
            button_led: 4,
            pump_button: 25,
            blower_button: 14,
            light_button: 15,
            mode_button: 17,
            temp_up_button: 18,
            temp_down_button: 23,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaConfig {
    pub pins: PinMap,
    pub default_mode: RunMode,
    pub inactivity_timeout_ms: u64,
    pub screen_timeout_ms: u64,
    /// Minutes of the hour at which hold-temp mode samples the water.
    pub temp_check_minutes: Vec<u32>,
    pub sensor_warmup_ms: u64,
    pub heater_cooldown_ms: u64,
    pub time_window_start: u32,
    pub time_window_end: u32,
    /// Raw unit character; validated at startup.
    pub temperature_unit: char,
    pub min_temp: f32,
    pub max_temp: f32,
    pub max_temp_sag: f32,
    pub initial_target_temp: f32,
    pub button_bounce_ms: u64,
    pub tick_interval_ms: u64,
    pub blanked_tick_interval_ms: u64,
    pub sensor_poll_interval_ms: u64,
    pub enable_status_export: bool,
    pub status_export_path: String,
    pub timezone: String,
    pub probe_id: String,
}

impl Default for SpaConfig {
    fn default() -> Self {
        Self {
            pins: PinMap::default(),
            default_mode: RunMode::Schedule,
            inactivity_timeout_ms: 3_600_000,
            screen_timeout_ms: 300_000,
            temp_check_minutes: vec![0],
            sensor_warmup_ms: 60_000,
            heater_cooldown_ms: 300_000,
            time_window_start: 18,
            time_window_end: 20,
            temperature_unit: 'F',
            min_temp: 60.0,
            max_temp: 108.0,
            max_temp_sag: 0.2,
            initial_target_temp: 98.0,
            button_bounce_ms: 300,
            tick_interval_ms: 50,
            blanked_tick_interval_ms: 250,
            sensor_poll_interval_ms: 1_000,
            enable_status_export: false,
            status_export_path: "/dev/shm/spa-status".to_string(),
            timezone: "America/Los_Angeles".to_string(),
            probe_id: "031722cbb8ff".to_string(),
        }
    }
}

impl SpaConfig {
    pub fn unit(&self) -> Result<TemperatureUnit, ConfigError> {
        TemperatureUnit::try_from(self.temperature_unit)
    }

    /// Checks every tunable. The temperature unit is checked first so a bad
    /// unit is always reported as such.
    pub fn validate(&self) -> Result<TemperatureUnit, ConfigError> {
        let unit = self.unit()?;

        if self.min_temp > self.max_temp {
            return Err(ConfigError::TemperatureRange {
                min: self.min_temp,
                max: self.max_temp,
            });
        }
        if !(self.min_temp..=self.max_temp).contains(&self.initial_target_temp) {
            return Err(ConfigError::TargetOutOfRange(self.initial_target_temp));
        }
        if self.max_temp_sag < 0.0 {
            return Err(ConfigError::NegativeSag(self.max_temp_sag));
        }
        for hour in [self.time_window_start, self.time_window_end] {
            if hour > 23 {
                return Err(ConfigError::InvalidWindowHour(hour));
            }
        }
        if let Some(minute) = self.temp_check_minutes.iter().find(|minute| **minute > 59) {
            return Err(ConfigError::InvalidCheckMinute(*minute));
        }

        Ok(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SpaConfig::default();
        assert_eq!(config.validate(), Ok(TemperatureUnit::Fahrenheit));
    }

    #[test]
    fn lowercase_unit_is_rejected() {
        let config = SpaConfig {
            temperature_unit: 'f',
            ..SpaConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidTemperatureUnit('f'))
        );
    }

    #[test]
    fn inverted_range_is_rejected() {
        let config = SpaConfig {
            min_temp: 100.0,
            max_temp: 90.0,
            ..SpaConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TemperatureRange { .. })
        ));
    }

    #[test]
    fn out_of_range_check_minute_is_rejected() {
        let config = SpaConfig {
            temp_check_minutes: vec![0, 30, 60],
            ..SpaConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidCheckMinute(60)));
    }

    #[test]
    fn celsius_conversion() {
        assert_eq!(TemperatureUnit::Fahrenheit.from_celsius(100.0), 212.0);
        assert_eq!(TemperatureUnit::Celsius.from_celsius(37.0), 37.0);
    }
}
