pub mod monitor;
pub mod probe;

pub use monitor::{LatestReading, MonitorStep, TemperatureMonitor};
pub use probe::{ProbeError, SimulatedProbe, TemperatureProbe, W1ThermProbe};
