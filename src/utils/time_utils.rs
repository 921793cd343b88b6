use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

use crate::shared::constants;

pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats whole seconds as `H:MM:SS`, truncating the fractional part.
/// A day or more gets a `N day(s), ` prefix and hours wrap at 24.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    let clock = format!("{}:{:02}:{:02}", hours, minutes, seconds);
    match days {
        0 => clock,
        1 => format!("1 day, {}", clock),
        n => format!("{} days, {}", n, clock),
    }
}

pub fn format_timestamp(at: DateTime<Local>) -> String {
    at.format(constants::TIMESTAMP_FORMAT).to_string()
}

/// Linear extrapolation of the time left after `done` of `total` units.
///
/// Returns `None` while nothing has been done yet or when the total is unknown.
pub fn estimate_remaining(done: u64, total: u64, elapsed: Duration) -> Option<Duration> {
    if done == 0 || total == 0 {
        return None;
    }
    let per_unit = elapsed.as_secs_f64() / done as f64;
    let remaining = total.saturating_sub(done) as f64;
    Some(Duration::from_secs_f64(per_unit * remaining))
}

pub fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(d) => format_duration(d),
        None => constants::ETA_UNKNOWN.to_string(),
    }
}
