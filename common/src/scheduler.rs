use chrono::{NaiveDateTime, Timelike};

use crate::{alarm::AlarmState, config::LampConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmDecision {
    Idle,
    /// Enabled alarm whose time text does not parse as `HH:MM`.
    InvalidTime,
    /// The alarm is less than one ramp window away: ramp so the target is
    /// reached by the alarm time.
    EnterRampWindow { duration_ms: u64 },
    /// The current minute is the alarm minute.
    Trigger { duration_ms: u64 },
}

/// Decides what one alarm tick should do. Pure over `(alarm, now)`; the
/// caller records the dates and starts the ramp.
pub fn evaluate(alarm: &AlarmState, now: NaiveDateTime, config: &LampConfig) -> AlarmDecision {
    if !alarm.enabled || alarm.time.trim().is_empty() {
        return AlarmDecision::Idle;
    }
    let Some(time) = alarm.parsed_time() else {
        return AlarmDecision::InvalidTime;
    };

    let today = now.date();
    let diff_ms = (time.on(today) - now).num_milliseconds();

    // Ramp window is checked before the exact minute.
    if diff_ms > 0
        && diff_ms as u64 <= config.ramp_window_ms
        && alarm.ramp_started_date != Some(today)
        && !alarm.ramp_in_progress
    {
        return AlarmDecision::EnterRampWindow {
            duration_ms: diff_ms as u64,
        };
    }

    let same_minute = now.hour() == time.hour() as u32 && now.minute() == time.minute() as u32;
    if same_minute && alarm.last_triggered_date != Some(today) && !alarm.ramp_in_progress {
        return AlarmDecision::Trigger {
            duration_ms: config.trigger_ramp_ms,
        };
    }

    AlarmDecision::Idle
}
