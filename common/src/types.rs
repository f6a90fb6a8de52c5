use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("invalid color string {0:?}")]
    InvalidColor(String),
    #[error("invalid brightness value {0:?}")]
    InvalidBrightness(String),
    #[error("brightness {0} is outside 0-100")]
    BrightnessOutOfRange(i64),
    #[error("alarm payload is not a JSON object")]
    InvalidAlarmJson,
    #[error("invalid alarm time {0:?}, expected HH:MM")]
    InvalidAlarmTime(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// A `#RRGGBB` color. Parsing is case-insensitive, so two colors that differ
/// only in letter case compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor(Rgb);

impl HexColor {
    pub const fn from_rgb(rgb: Rgb) -> Self {
        Self(rgb)
    }

    pub fn parse(text: &str) -> Result<Self, PayloadError> {
        let trimmed = text.trim();
        let invalid = || PayloadError::InvalidColor(text.to_string());

        let digits = trimmed.strip_prefix('#').ok_or_else(invalid)?;
        if digits.len() != 6 || !digits.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16).map_err(|_| invalid())
        };

        Ok(Self(Rgb {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        }))
    }

    pub fn rgb(self) -> Rgb {
        self.0
    }
}

impl Default for HexColor {
    fn default() -> Self {
        Self(Rgb { r: 0xFF, g: 0, b: 0 })
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.0.r, self.0.g, self.0.b)
    }
}

impl TryFrom<String> for HexColor {
    type Error = PayloadError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<HexColor> for String {
    fn from(color: HexColor) -> Self {
        color.to_string()
    }
}

pub fn parse_brightness(text: &str) -> Result<u8, PayloadError> {
    let value = text
        .trim()
        .parse::<i64>()
        .map_err(|_| PayloadError::InvalidBrightness(text.to_string()))?;

    if !(0..=100).contains(&value) {
        return Err(PayloadError::BrightnessOutOfRange(value));
    }
    Ok(value as u8)
}

/// Who produced a change to the displayed color/brightness. Only `Local`
/// changes are written back through the debouncer, `Scheduler` changes are
/// written immediately and `Remote` changes are never written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOrigin {
    Local,
    Remote,
    Scheduler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RampKind {
    PreAlarm,
    Trigger,
    Preview,
}

impl RampKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreAlarm => "PRE_ALARM",
            Self::Trigger => "TRIGGER",
            Self::Preview => "PREVIEW",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RampStatus {
    pub kind: RampKind,
    pub current: u8,
    pub target: u8,
    #[serde(rename = "tickMs")]
    pub tick_ms: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LampStatus {
    #[serde(rename = "alarmEnabled")]
    pub alarm_enabled: bool,
    #[serde(rename = "alarmTime")]
    pub alarm_time: String,
    #[serde(rename = "alarmBrightness")]
    pub alarm_brightness: u8,
    #[serde(rename = "lastTriggeredDate")]
    pub last_triggered_date: Option<String>,
    #[serde(rename = "rampStartedDate")]
    pub ramp_started_date: Option<String>,
    #[serde(rename = "rampInProgress")]
    pub ramp_in_progress: bool,
    pub ramp: Option<RampStatus>,
    #[serde(rename = "currentBrightness")]
    pub current_brightness: u8,
    pub color: HexColor,
    #[serde(rename = "alarmEditing")]
    pub alarm_editing: bool,
    #[serde(rename = "userInteracting")]
    pub user_interacting: bool,
    pub status: String,
}
