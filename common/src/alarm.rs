use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::PayloadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmTime {
    hour: u8,
    minute: u8,
}

impl AlarmTime {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    /// Parses the `HH:MM` form produced by a time input.
    pub fn parse(text: &str) -> Result<Self, PayloadError> {
        let invalid = || PayloadError::InvalidAlarmTime(text.to_string());

        let (hour, minute) = text.trim().split_once(':').ok_or_else(invalid)?;
        let two_digits = |part: &str| part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit());
        if !two_digits(hour) || !two_digits(minute) {
            return Err(invalid());
        }

        let hour = hour.parse::<u8>().map_err(|_| invalid())?;
        let minute = minute.parse::<u8>().map_err(|_| invalid())?;
        Self::new(hour, minute).ok_or_else(invalid)
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }

    pub fn on(self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.naive_time())
    }

    fn naive_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, 0)
            .unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for AlarmTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmState {
    pub enabled: bool,
    /// Raw `HH:MM` text as last entered or received; may be empty or invalid.
    pub time: String,
    pub brightness: u8,
    pub last_triggered_date: Option<NaiveDate>,
    pub ramp_started_date: Option<NaiveDate>,
    pub ramp_in_progress: bool,
}

impl AlarmState {
    pub fn new(brightness: u8) -> Self {
        Self {
            enabled: false,
            time: String::new(),
            brightness: brightness.min(100),
            last_triggered_date: None,
            ramp_started_date: None,
            ramp_in_progress: false,
        }
    }

    pub fn parsed_time(&self) -> Option<AlarmTime> {
        if self.time.trim().is_empty() {
            return None;
        }
        AlarmTime::parse(&self.time).ok()
    }

    pub fn config(&self) -> AlarmConfig {
        AlarmConfig {
            enabled: self.enabled,
            time: self.time.clone(),
        }
    }
}

impl Default for AlarmState {
    fn default() -> Self {
        Self::new(100)
    }
}

/// The part of the alarm the device persists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmConfig {
    pub enabled: bool,
    pub time: String,
}

/// Alarm fields as reported by the device. Either field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteAlarm {
    pub enabled: Option<bool>,
    pub time: Option<String>,
}

impl RemoteAlarm {
    /// Decodes a `/getAlarm` body. Fields holding the wrong JSON type are
    /// dropped one by one; only a body that is not an object is an error.
    pub fn from_json(text: &str) -> Result<Self, PayloadError> {
        let value: Value =
            serde_json::from_str(text).map_err(|_| PayloadError::InvalidAlarmJson)?;
        let object = value.as_object().ok_or(PayloadError::InvalidAlarmJson)?;

        Ok(Self {
            enabled: object.get("enabled").and_then(Value::as_bool),
            time: object
                .get("time")
                .and_then(Value::as_str)
                .map(|time| time.trim().to_string()),
        })
    }
}
