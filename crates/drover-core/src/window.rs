use crate::config::WorkWindow;
use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};

/// Stateless predicate over the configured daily run window.
///
/// With `start_hour > end_hour` the window wraps past midnight (night
/// shift): 20 → 8 means 20:00 tonight until 08:00 tomorrow morning.
#[derive(Debug, Clone, Copy)]
pub struct TimeWindowGate {
    window: WorkWindow,
}

impl TimeWindowGate {
    pub fn new(window: WorkWindow) -> Self {
        Self { window }
    }

    fn start(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.window.start_hour, 0, 0)
            .unwrap_or(NaiveTime::MIN)
    }

    fn end(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.window.end_hour, 0, 0).unwrap_or(NaiveTime::MIN)
    }

    fn wraps_midnight(&self) -> bool {
        self.window.start_hour > self.window.end_hour
    }

    /// Whether sessions are permitted to run at `now`. Always true when the
    /// window is disabled.
    pub fn is_within(&self, now: NaiveTime) -> bool {
        if !self.window.enabled {
            return true;
        }
        if self.wraps_midnight() {
            now >= self.start() || now < self.end()
        } else {
            now >= self.start() && now < self.end()
        }
    }

    /// Seconds until the window next opens. `None` when already open (or the
    /// window is disabled).
    pub fn seconds_until_start(&self, now: NaiveDateTime) -> Option<i64> {
        if self.is_within(now.time()) {
            return None;
        }
        let mut target = now.date().and_time(self.start());
        if target <= now {
            target += Duration::days(1);
        }
        Some((target - now).num_seconds())
    }

    /// Seconds until the window next closes. `None` when currently outside it
    /// (or the window is disabled).
    pub fn seconds_until_end(&self, now: NaiveDateTime) -> Option<i64> {
        if !self.window.enabled || !self.is_within(now.time()) {
            return None;
        }
        let mut target = now.date().and_time(self.end());
        if target <= now {
            target += Duration::days(1);
        }
        Some((target - now).num_seconds())
    }

    /// Window length in hours per day.
    pub fn daily_hours(&self) -> u32 {
        if self.wraps_midnight() {
            (24 - self.window.start_hour) + self.window.end_hour
        } else {
            self.window.end_hour - self.window.start_hour
        }
    }

    /// One-line status for operator logs.
    pub fn status_message(&self, now: NaiveDateTime) -> String {
        if !self.window.enabled {
            return "work window disabled (24/7)".to_string();
        }
        if self.is_within(now.time()) {
            match self.seconds_until_end(now) {
                Some(secs) => format!(
                    "work window open (closes at {:02}:00, {:.1}h left)",
                    self.window.end_hour,
                    secs as f64 / 3600.0
                ),
                None => "work window open".to_string(),
            }
        } else {
            match self.seconds_until_start(now) {
                Some(secs) => format!(
                    "work window closed (opens at {:02}:00, {:.1}h until)",
                    self.window.start_hour,
                    secs as f64 / 3600.0
                ),
                None => "work window closed".to_string(),
            }
        }
    }

    /// Convenience wrapper over the local wall clock.
    pub fn is_within_now(&self) -> bool {
        let now = chrono::Local::now().time();
        // Truncate to whole seconds so the comparison matches the hour-granular
        // configuration.
        self.is_within(
            NaiveTime::from_hms_opt(now.hour(), now.minute(), now.second())
                .unwrap_or(NaiveTime::MIN),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn gate(start: u32, end: u32, enabled: bool) -> TimeWindowGate {
        TimeWindowGate::new(WorkWindow {
            start_hour: start,
            end_hour: end,
            enabled,
        })
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn dt(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap().and_time(t(h, m))
    }

    #[test]
    fn day_shift_bounds() {
        let g = gate(8, 18, true);
        assert!(g.is_within(t(9, 0)));
        assert!(g.is_within(t(8, 0)));
        assert!(!g.is_within(t(18, 0)));
        assert!(!g.is_within(t(19, 0)));
        assert!(!g.is_within(t(7, 59)));
    }

    #[test]
    fn overnight_shift_wraps() {
        let g = gate(20, 8, true);
        assert!(g.is_within(t(23, 0)));
        assert!(g.is_within(t(3, 0)));
        assert!(g.is_within(t(20, 0)));
        assert!(!g.is_within(t(12, 0)));
        assert!(!g.is_within(t(8, 0)));
    }

    #[test]
    fn disabled_always_permits() {
        let g = gate(8, 18, false);
        assert!(g.is_within(t(3, 0)));
        assert!(g.seconds_until_start(dt(3, 0)).is_none());
        assert!(g.seconds_until_end(dt(9, 0)).is_none());
    }

    #[test]
    fn seconds_until_start_same_day() {
        let g = gate(8, 18, true);
        // 06:00 → opens at 08:00 = 2h
        assert_eq!(g.seconds_until_start(dt(6, 0)), Some(2 * 3600));
    }

    #[test]
    fn seconds_until_start_rolls_to_tomorrow() {
        let g = gate(8, 18, true);
        // 19:00 → opens tomorrow 08:00 = 13h
        assert_eq!(g.seconds_until_start(dt(19, 0)), Some(13 * 3600));
    }

    #[test]
    fn seconds_until_start_overnight_gap() {
        let g = gate(20, 8, true);
        // 12:00 is inside the 08→20 gap; opens tonight at 20:00 = 8h
        assert_eq!(g.seconds_until_start(dt(12, 0)), Some(8 * 3600));
    }

    #[test]
    fn seconds_until_end_overnight_evening_side() {
        let g = gate(20, 8, true);
        // 23:00 → closes tomorrow 08:00 = 9h
        assert_eq!(g.seconds_until_end(dt(23, 0)), Some(9 * 3600));
        // 03:00 → closes today 08:00 = 5h
        assert_eq!(g.seconds_until_end(dt(3, 0)), Some(5 * 3600));
    }

    #[test]
    fn seconds_until_end_none_when_outside() {
        let g = gate(8, 18, true);
        assert!(g.seconds_until_end(dt(19, 0)).is_none());
    }

    #[test]
    fn daily_hours_accounts_for_wrap() {
        assert_eq!(gate(8, 18, true).daily_hours(), 10);
        assert_eq!(gate(20, 8, true).daily_hours(), 12);
    }
}
