use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use serde::Deserialize;

use super::error::CliError;

/// `[gate]` section: only capture inside a daily window.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GateConfig {
    /// First hour of the window, 0..=23.
    #[serde(default)]
    pub from_hour: u32,
    /// Hour the window closes, 0..=24. Smaller than `from_hour` wraps past midnight.
    #[serde(default = "default_to_hour")]
    pub to_hour: u32,
    /// Skip Saturdays and Sundays.
    #[serde(default)]
    pub weekdays_only: bool,
}

fn default_to_hour() -> u32 {
    24
}

/// Validated daily capture window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveHours {
    from_hour: u32,
    to_hour: u32,
    weekdays_only: bool,
}

impl TryFrom<GateConfig> for ActiveHours {
    type Error = CliError;

    fn try_from(cfg: GateConfig) -> Result<Self, Self::Error> {
        if cfg.from_hour > 23 {
            return Err(CliError::Config(format!("gate.from_hour must be 0..=23, got {}", cfg.from_hour)));
        }
        if cfg.to_hour > 24 {
            return Err(CliError::Config(format!("gate.to_hour must be 0..=24, got {}", cfg.to_hour)));
        }
        Ok(Self {
            from_hour: cfg.from_hour,
            to_hour: cfg.to_hour,
            weekdays_only: cfg.weekdays_only,
        })
    }
}

impl ActiveHours {
    pub fn allows(&self, ts: NaiveDateTime) -> bool {
        if self.weekdays_only && matches!(ts.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let hour = ts.hour();
        let to = self.to_hour % 24;
        if self.from_hour == to {
            return true;
        }
        if self.from_hour < to {
            hour >= self.from_hour && hour < to
        } else {
            hour >= self.from_hour || hour < to
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    // 2024-05-01 is a Wednesday.
    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day)
            .and_then(|d| d.and_hms_opt(hour, 30, 0))
            .unwrap()
    }

    fn gate(from_hour: u32, to_hour: u32, weekdays_only: bool) -> ActiveHours {
        ActiveHours::try_from(GateConfig { from_hour, to_hour, weekdays_only }).unwrap()
    }

    #[test]
    fn office_hours_window() {
        let g = gate(8, 18, false);
        assert!(!g.allows(at(1, 7)));
        assert!(g.allows(at(1, 8)));
        assert!(g.allows(at(1, 17)));
        assert!(!g.allows(at(1, 18)));
    }

    #[test]
    fn window_wraps_past_midnight() {
        let g = gate(22, 6, false);
        assert!(g.allows(at(1, 23)));
        assert!(g.allows(at(1, 2)));
        assert!(!g.allows(at(1, 12)));
    }

    #[test]
    fn full_day_and_weekends() {
        let g = gate(0, 24, true);
        assert!(g.allows(at(1, 0)));
        assert!(g.allows(at(3, 23)));
        assert!(!g.allows(at(4, 12)));
        assert!(!g.allows(at(5, 12)));
    }

    #[test]
    fn rejects_out_of_range_hours() {
        assert!(ActiveHours::try_from(GateConfig { from_hour: 24, to_hour: 24, weekdays_only: false }).is_err());
        assert!(ActiveHours::try_from(GateConfig { from_hour: 0, to_hour: 25, weekdays_only: false }).is_err());
    }
}
