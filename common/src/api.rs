use crate::engine::EngineAction;

pub const PATH_GET_COLOR: &str = "/getColor";
pub const PATH_COLOR: &str = "/color";
pub const PATH_GET_BRIGHTNESS: &str = "/getBrightness";
pub const PATH_BRIGHTNESS: &str = "/brightness";
pub const PATH_COMMAND: &str = "/command";
pub const PATH_GET_ALARM: &str = "/getAlarm";
pub const PATH_SET_ALARM: &str = "/setAlarm";

/// A GET request against the device; query values are sent percent-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRequest {
    pub path: &'static str,
    pub query: Vec<(&'static str, String)>,
}

impl EngineAction {
    pub fn request(&self) -> Option<DeviceRequest> {
        let (path, query) = match self {
            Self::SetBrightness(value) => (PATH_BRIGHTNESS, vec![("value", value.to_string())]),
            Self::SetColor(rgb) => (
                PATH_COLOR,
                vec![
                    ("r", rgb.r.to_string()),
                    ("g", rgb.g.to_string()),
                    ("b", rgb.b.to_string()),
                ],
            ),
            Self::SetAlarm(alarm) => (
                PATH_SET_ALARM,
                vec![
                    ("enabled", (if alarm.enabled { "1" } else { "0" }).to_string()),
                    ("time", alarm.time.clone()),
                ],
            ),
            Self::Command(value) => (PATH_COMMAND, vec![("value", value.clone())]),
            Self::StatusChanged(_) => return None,
        };
        Some(DeviceRequest { path, query })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{alarm::AlarmConfig, types::Rgb};

    #[test]
    fn alarm_write_uses_numeric_flag() {
        let action = EngineAction::SetAlarm(AlarmConfig {
            enabled: false,
            time: "07:00".to_string(),
        });

        assert_eq!(
            action.request(),
            Some(DeviceRequest {
                path: "/setAlarm",
                query: vec![("enabled", "0".to_string()), ("time", "07:00".to_string())],
            })
        );
    }

    #[test]
    fn color_write_splits_channels() {
        let action = EngineAction::SetColor(Rgb { r: 255, g: 8, b: 0 });

        assert_eq!(
            action.request(),
            Some(DeviceRequest {
                path: "/color",
                query: vec![
                    ("r", "255".to_string()),
                    ("g", "8".to_string()),
                    ("b", "0".to_string()),
                ],
            })
        );
    }

    #[test]
    fn status_changes_are_local_only() {
        assert_eq!(
            EngineAction::StatusChanged("Alarm completed".to_string()).request(),
            None
        );
    }
}
