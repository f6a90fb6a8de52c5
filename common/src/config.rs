use serde::{Deserialize, Serialize};

use crate::types::HexColor;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LampConfig {
    pub alarm_tick_ms: u64,
    pub poll_interval_ms: u64,
    pub alarm_write_debounce_ms: u64,
    pub picker_write_debounce_ms: u64,
    pub ramp_window_ms: u64,
    pub trigger_ramp_ms: u64,
    pub slow_tick_ms: u64,
    pub fast_tick_ms: u64,
    pub test_ramp_ms: u64,
    pub brightness_noise_threshold: u8,
    pub default_brightness: u8,
    pub alarm_brightness: u8,
    pub default_color: HexColor,
}

impl Default for LampConfig {
    fn default() -> Self {
        Self {
            alarm_tick_ms: 1_000,
            poll_interval_ms: 1_000,
            alarm_write_debounce_ms: 200,
            picker_write_debounce_ms: 50,
            ramp_window_ms: 300_000,
            trigger_ramp_ms: 300_000,
            slow_tick_ms: 1_000,
            fast_tick_ms: 200,
            test_ramp_ms: 5_000,
            brightness_noise_threshold: 1,
            default_brightness: 100,
            alarm_brightness: 100,
            default_color: HexColor::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://192.168.4.1".to_string(),
            request_timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub lamp: LampConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

fn default_http_port() -> u16 {
    8080
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            lamp: LampConfig::default(),
            device: DeviceConfig::default(),
            http_port: default_http_port(),
        }
    }
}

impl LampConfig {
    pub fn sanitize(&mut self) {
        self.alarm_tick_ms = self.alarm_tick_ms.clamp(100, 60_000);
        self.poll_interval_ms = self.poll_interval_ms.clamp(100, 60_000);
        self.alarm_write_debounce_ms = self.alarm_write_debounce_ms.min(10_000);
        self.picker_write_debounce_ms = self.picker_write_debounce_ms.min(10_000);
        self.ramp_window_ms = self.ramp_window_ms.clamp(1_000, 3_600_000);
        self.trigger_ramp_ms = self.trigger_ramp_ms.clamp(1_000, 3_600_000);
        // Zero tick lengths would divide by zero when planning a ramp.
        self.slow_tick_ms = self.slow_tick_ms.max(1);
        self.fast_tick_ms = self.fast_tick_ms.max(1);
        self.test_ramp_ms = self.test_ramp_ms.max(self.fast_tick_ms);
        self.brightness_noise_threshold = self.brightness_noise_threshold.clamp(1, 100);
        self.default_brightness = self.default_brightness.min(100);
        self.alarm_brightness = self.alarm_brightness.min(100);
    }
}

impl DeviceConfig {
    pub fn sanitize(&mut self) {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        self.base_url = if trimmed.is_empty() {
            DeviceConfig::default().base_url
        } else {
            trimmed.to_string()
        };
        self.request_timeout_ms = self.request_timeout_ms.clamp(100, 30_000);
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.lamp.sanitize();
        self.device.sanitize();
        if self.http_port == 0 {
            self.http_port = default_http_port();
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let runtime: RuntimeConfig =
            serde_json::from_str(r#"{"lamp": {"alarm_brightness": 80}}"#).unwrap();

        assert_eq!(runtime.lamp.alarm_brightness, 80);
        assert_eq!(runtime.lamp.alarm_write_debounce_ms, 200);
        assert_eq!(runtime.device.base_url, "http://192.168.4.1");
        assert_eq!(runtime.http_port, 8080);
    }

    #[test]
    fn sanitize_clamps_out_of_range_values() {
        let mut runtime = RuntimeConfig::default();
        runtime.lamp.slow_tick_ms = 0;
        runtime.lamp.alarm_brightness = 250;
        runtime.device.base_url = "http://lamp.local/ ".to_string();
        runtime.http_port = 0;

        runtime.sanitize();

        assert_eq!(runtime.lamp.slow_tick_ms, 1);
        assert_eq!(runtime.lamp.alarm_brightness, 100);
        assert_eq!(runtime.device.base_url, "http://lamp.local");
        assert_eq!(runtime.http_port, 8080);
    }

    #[test]
    fn invalid_default_color_is_rejected() {
        let result =
            serde_json::from_str::<LampConfig>(r##"{"default_color": "#12345"}"##);
        assert!(result.is_err());
    }
}
