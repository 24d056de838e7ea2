use chrono::{DateTime, TimeZone, Timelike};

/// Wall-clock time split into the fields the control loop needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockReading {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    /// Milliseconds since the Unix epoch. All interval math uses this.
    pub epoch_ms: u64,
}

impl ClockReading {
    pub fn from_datetime<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        Self {
            hour: now.hour(),
            minute: now.minute(),
            second: now.second(),
            epoch_ms: u64::try_from(now.timestamp_millis()).unwrap_or(0),
        }
    }

    pub fn hms(&self) -> String {
        format!("{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

pub trait Clock {
    fn now(&self) -> ClockReading;
}

/// Hours during which filtering and heating run automatically.
///
/// Both ends are inclusive: a window of 18..=20 runs until 20:59:59. A start
/// later than the end wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: u32,
    pub end: u32,
}

impl TimeWindow {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, hour: u32) -> bool {
        if self.start <= self.end {
            (self.start..=self.end).contains(&hour)
        } else {
            hour >= self.start || hour <= self.end
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::FixedOffset;

    use super::*;

    #[test]
    fn window_includes_both_end_hours() {
        let window = TimeWindow::new(18, 20);

        assert!(!window.contains(17));
        assert!(window.contains(18));
        assert!(window.contains(19));
        assert!(window.contains(20));
        assert!(!window.contains(21));
    }

    #[test]
    fn window_wraps_past_midnight() {
        let window = TimeWindow::new(22, 2);

        assert!(window.contains(23));
        assert!(window.contains(0));
        assert!(window.contains(2));
        assert!(!window.contains(3));
        assert!(!window.contains(21));
    }

    #[test]
    fn reading_uses_local_fields_and_utc_epoch() {
        let now = FixedOffset::west_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 1, 5, 19, 4, 9)
            .unwrap();
        let reading = ClockReading::from_datetime(&now);

        assert_eq!((reading.hour, reading.minute, reading.second), (19, 4, 9));
        assert_eq!(reading.epoch_ms, now.timestamp_millis() as u64);
        assert_eq!(reading.hms(), "19:04:09");
    }
}
