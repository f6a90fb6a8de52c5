use crate::{
    alarm::{AlarmState, RemoteAlarm},
    types::HexColor,
};

/// Local activity that blocks remote merges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeGuard {
    pub alarm_editing: bool,
    /// A local alarm change is waiting for its debounced write.
    pub alarm_write_pending: bool,
    pub user_interacting: bool,
    pub ramp_in_progress: bool,
}

impl MergeGuard {
    pub fn blocks_alarm(self) -> bool {
        self.alarm_editing || self.alarm_write_pending
    }

    pub fn blocks_picker(self) -> bool {
        self.user_interacting || self.ramp_in_progress
    }
}

/// Merges the device's alarm fields into local state. Returns whether any
/// observable field changed.
pub fn merge_alarm(local: &mut AlarmState, remote: &RemoteAlarm, guard: MergeGuard) -> bool {
    if guard.blocks_alarm() {
        return false;
    }

    let mut changed = false;
    if let Some(enabled) = remote.enabled {
        if local.enabled != enabled {
            local.enabled = enabled;
            changed = true;
        }
    }
    if let Some(time) = remote.time.as_deref() {
        if local.time != time {
            local.time = time.to_string();
            changed = true;
        }
    }
    changed
}

/// Last values applied from the device, used to skip repeats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteTracker {
    brightness: Option<u8>,
    color: Option<HexColor>,
}

impl RemoteTracker {
    pub fn last_brightness(&self) -> Option<u8> {
        self.brightness
    }

    pub fn last_color(&self) -> Option<HexColor> {
        self.color
    }

    /// Returns the brightness to apply, or `None` when the merge is blocked
    /// or the value is within `noise_threshold` of the last applied one.
    pub fn accept_brightness(
        &mut self,
        remote: u8,
        guard: MergeGuard,
        noise_threshold: u8,
    ) -> Option<u8> {
        if guard.blocks_picker() {
            return None;
        }
        if let Some(last) = self.brightness {
            if last.abs_diff(remote) < noise_threshold {
                return None;
            }
        }
        self.brightness = Some(remote);
        Some(remote)
    }

    pub fn accept_color(&mut self, remote: HexColor, guard: MergeGuard) -> Option<HexColor> {
        if guard.blocks_picker() || self.color == Some(remote) {
            return None;
        }
        self.color = Some(remote);
        Some(remote)
    }

    pub fn seed(&mut self, brightness: Option<u8>, color: Option<HexColor>) {
        self.brightness = brightness;
        self.color = color;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn remote(enabled: Option<bool>, time: Option<&str>) -> RemoteAlarm {
        RemoteAlarm {
            enabled,
            time: time.map(str::to_string),
        }
    }

    #[test]
    fn identical_remote_alarm_is_a_no_op() {
        let mut local = AlarmState {
            enabled: true,
            time: "07:00".to_string(),
            ..AlarmState::default()
        };
        let before = local.clone();

        let changed = merge_alarm(
            &mut local,
            &remote(Some(true), Some("07:00")),
            MergeGuard::default(),
        );

        assert!(!changed);
        assert_eq!(local, before);
    }

    #[test]
    fn missing_fields_leave_local_values() {
        let mut local = AlarmState {
            enabled: true,
            time: "07:00".to_string(),
            ..AlarmState::default()
        };

        assert!(merge_alarm(
            &mut local,
            &remote(None, Some("06:45")),
            MergeGuard::default()
        ));
        assert!(local.enabled);
        assert_eq!(local.time, "06:45");
    }

    #[test]
    fn editing_blocks_alarm_merge() {
        let mut local = AlarmState {
            time: "06:3".to_string(),
            ..AlarmState::default()
        };
        let guard = MergeGuard {
            alarm_editing: true,
            ..MergeGuard::default()
        };

        assert!(!merge_alarm(&mut local, &remote(Some(true), Some("08:00")), guard));
        assert_eq!(local.time, "06:3");
        assert!(!local.enabled);
    }

    #[test]
    fn pending_alarm_write_blocks_alarm_merge() {
        let mut local = AlarmState {
            enabled: true,
            time: "07:00".to_string(),
            ..AlarmState::default()
        };
        let guard = MergeGuard {
            alarm_write_pending: true,
            ..MergeGuard::default()
        };

        assert!(guard.blocks_alarm());
        assert!(!guard.blocks_picker());
        assert!(!merge_alarm(&mut local, &remote(Some(false), None), guard));
        assert!(local.enabled);
    }

    #[test]
    fn brightness_noise_filter_skips_repeats() {
        let mut tracker = RemoteTracker::default();
        let guard = MergeGuard::default();

        assert_eq!(tracker.accept_brightness(40, guard, 1), Some(40));
        assert_eq!(tracker.accept_brightness(40, guard, 1), None);
        assert_eq!(tracker.accept_brightness(41, guard, 1), Some(41));

        assert_eq!(tracker.accept_brightness(43, guard, 5), None);
        assert_eq!(tracker.last_brightness(), Some(41));
    }

    #[test]
    fn interaction_and_ramp_block_picker_merges() {
        let mut tracker = RemoteTracker::default();
        let color = HexColor::parse("#00FF00").unwrap();

        let interacting = MergeGuard {
            user_interacting: true,
            ..MergeGuard::default()
        };
        assert_eq!(tracker.accept_brightness(10, interacting, 1), None);
        assert_eq!(tracker.accept_color(color, interacting), None);

        let ramping = MergeGuard {
            ramp_in_progress: true,
            ..MergeGuard::default()
        };
        assert_eq!(tracker.accept_brightness(10, ramping, 1), None);
        assert_eq!(tracker.last_brightness(), None);
    }

    #[test]
    fn color_repeat_differing_only_in_case_is_skipped() {
        let mut tracker = RemoteTracker::default();
        let guard = MergeGuard::default();

        let first = HexColor::parse("#aabbcc").unwrap();
        let second = HexColor::parse("#AABBCC").unwrap();
        assert_eq!(tracker.accept_color(first, guard), Some(first));
        assert_eq!(tracker.accept_color(second, guard), None);
    }
}
