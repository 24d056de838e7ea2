use std::{
    fs,
    io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use spa_common::TemperatureUnit;
use thiserror::Error;

const W1_DEVICES_DIR: &str = "/sys/bus/w1/devices";
const DS18B20_FAMILY: &str = "28";
/// Value a DS18B20 reports before its first conversion.
const DS18B20_RESET_MILLI_C: i32 = 85_000;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe {path} is not present")]
    NotFound { path: PathBuf },
    #[error("probe read failed: {0}")]
    Io(#[from] io::Error),
    #[error("probe reported a CRC mismatch")]
    CrcMismatch,
    #[error("probe returned its power-on reset value")]
    ResetValue,
    #[error("unreadable probe payload: {0:?}")]
    Malformed(String),
}

pub trait TemperatureProbe: Send {
    fn read(&mut self, unit: TemperatureUnit) -> Result<f32, ProbeError>;
}

/// DS18B20 on the Linux 1-Wire bus, read through the `w1_therm` sysfs file.
#[derive(Debug, Clone)]
pub struct W1ThermProbe {
    slave_path: PathBuf,
}

impl W1ThermProbe {
    /// `id` is the device serial without the family prefix, as listed
    /// under `/sys/bus/w1/devices`.
    pub fn from_id(id: &str) -> Self {
        Self::in_devices_dir(Path::new(W1_DEVICES_DIR), id)
    }

    pub fn in_devices_dir(devices_dir: &Path, id: &str) -> Self {
        Self {
            slave_path: devices_dir
                .join(format!("{DS18B20_FAMILY}-{id}"))
                .join("w1_slave"),
        }
    }

    pub fn slave_path(&self) -> &Path {
        &self.slave_path
    }
}

impl TemperatureProbe for W1ThermProbe {
    fn read(&mut self, unit: TemperatureUnit) -> Result<f32, ProbeError> {
        let payload = fs::read_to_string(&self.slave_path).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                ProbeError::NotFound {
                    path: self.slave_path.clone(),
                }
            } else {
                ProbeError::Io(err)
            }
        })?;
        parse_w1_slave(&payload).map(|celsius| unit.from_celsius(celsius))
    }
}

/// Parses a `w1_slave` payload into degrees Celsius.
///
/// ```text
/// 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
/// 72 01 4b 46 7f ff 0e 10 57 t=23125
/// ```
pub fn parse_w1_slave(payload: &str) -> Result<f32, ProbeError> {
    let mut lines = payload.lines();
    let crc_line = lines
        .next()
        .ok_or_else(|| ProbeError::Malformed(payload.to_string()))?;
    if !crc_line.trim_end().ends_with("YES") {
        return Err(ProbeError::CrcMismatch);
    }

    let data_line = lines
        .next()
        .ok_or_else(|| ProbeError::Malformed(payload.to_string()))?;
    let (_, raw) = data_line
        .rsplit_once("t=")
        .ok_or_else(|| ProbeError::Malformed(data_line.to_string()))?;
    let milli_c: i32 = raw
        .trim()
        .parse()
        .map_err(|_| ProbeError::Malformed(data_line.to_string()))?;
    if milli_c == DS18B20_RESET_MILLI_C {
        return Err(ProbeError::ResetValue);
    }

    Ok(milli_c as f32 / 1_000.0)
}

/// Lumped thermal model of the tub for runs without hardware. The water
/// warms while the heater flag is set and drifts toward ambient otherwise.
#[derive(Debug)]
pub struct SimulatedProbe {
    heater: Arc<AtomicBool>,
    water_c: f32,
    ambient_c: f32,
    heat_c_per_min: f32,
    loss_per_min: f32,
    last_read: Option<Instant>,
}

impl SimulatedProbe {
    pub fn new(heater: Arc<AtomicBool>, water_c: f32) -> Self {
        Self {
            heater,
            water_c,
            ambient_c: 15.0,
            heat_c_per_min: 0.25,
            loss_per_min: 0.002,
            last_read: None,
        }
    }

    pub fn water_c(&self) -> f32 {
        self.water_c
    }

    pub fn advance(&mut self, minutes: f32) {
        if self.heater.load(Ordering::Relaxed) {
            self.water_c += self.heat_c_per_min * minutes;
        }
        self.water_c -= (self.water_c - self.ambient_c) * self.loss_per_min * minutes;
    }
}

impl TemperatureProbe for SimulatedProbe {
    fn read(&mut self, unit: TemperatureUnit) -> Result<f32, ProbeError> {
        let now = Instant::now();
        if let Some(last) = self.last_read.replace(now) {
            self.advance(now.duration_since(last).as_secs_f32() / 60.0);
        }
        Ok(unit.from_celsius(self.water_c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n\
                        72 01 4b 46 7f ff 0e 10 57 t=23125\n";

    #[test]
    fn parses_valid_payload() {
        let celsius = parse_w1_slave(GOOD).unwrap();
        assert!((celsius - 23.125).abs() < 1e-4);
    }

    #[test]
    fn parses_negative_temperature() {
        let payload = "5e ff 4b 46 7f ff 02 10 4d : crc=4d YES\n\
                       5e ff 4b 46 7f ff 02 10 4d t=-10125\n";
        let celsius = parse_w1_slave(payload).unwrap();
        assert!((celsius + 10.125).abs() < 1e-4);
    }

    #[test]
    fn rejects_crc_failure() {
        let payload = "72 01 4b 46 7f ff 0e 10 57 : crc=57 NO\n\
                       72 01 4b 46 7f ff 0e 10 57 t=23125\n";
        assert!(matches!(
            parse_w1_slave(payload),
            Err(ProbeError::CrcMismatch)
        ));
    }

    #[test]
    fn rejects_reset_value() {
        let payload = "50 05 4b 46 7f ff 0c 10 1c : crc=1c YES\n\
                       50 05 4b 46 7f ff 0c 10 1c t=85000\n";
        assert!(matches!(
            parse_w1_slave(payload),
            Err(ProbeError::ResetValue)
        ));
    }

    #[test]
    fn rejects_truncated_payload() {
        assert!(matches!(
            parse_w1_slave("72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n"),
            Err(ProbeError::Malformed(_))
        ));
    }

    #[test]
    fn reads_from_sysfs_layout() {
        let root = std::env::temp_dir().join(format!("spa-w1-{}", std::process::id()));
        let device = root.join("28-031722cbb8ff");
        fs::create_dir_all(&device).unwrap();
        fs::write(device.join("w1_slave"), GOOD).unwrap();

        let mut probe = W1ThermProbe::in_devices_dir(&root, "031722cbb8ff");
        let fahrenheit = probe.read(TemperatureUnit::Fahrenheit).unwrap();
        fs::remove_dir_all(&root).unwrap();

        assert!((fahrenheit - 73.625).abs() < 1e-3);
    }

    #[test]
    fn missing_device_is_reported() {
        let mut probe = W1ThermProbe::in_devices_dir(Path::new("/nonexistent-w1"), "abc");
        assert!(matches!(
            probe.read(TemperatureUnit::Celsius),
            Err(ProbeError::NotFound { .. })
        ));
    }

    #[test]
    fn simulated_water_follows_heater() {
        let heater = Arc::new(AtomicBool::new(true));
        let mut probe = SimulatedProbe::new(heater.clone(), 30.0);

        probe.advance(10.0);
        let heated = probe.water_c();
        assert!(heated > 30.0);

        heater.store(false, Ordering::Relaxed);
        probe.advance(10.0);
        assert!(probe.water_c() < heated);
    }
}
