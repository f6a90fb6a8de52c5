use chrono::NaiveDateTime;
use thiserror::Error;

use crate::{
    alarm::{AlarmConfig, AlarmState, RemoteAlarm},
    config::LampConfig,
    debounce::Debounce,
    ramp::{Ramp, RampMode, RampStart},
    reconcile::{merge_alarm, MergeGuard, RemoteTracker},
    scheduler::{self, AlarmDecision},
    types::{parse_brightness, HexColor, LampStatus, PayloadError, RampKind, Rgb, UpdateOrigin},
};

const INVALID_TIME_STATUS: &str = "Invalid alarm time, expected HH:MM";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineAction {
    SetBrightness(u8),
    SetColor(Rgb),
    SetAlarm(AlarmConfig),
    Command(String),
    StatusChanged(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("a brightness ramp is already in progress")]
    RampInProgress,
    #[error("command value cannot be empty")]
    EmptyCommand,
}

#[derive(Debug, Clone)]
pub struct LampEngine {
    pub config: LampConfig,
    alarm: AlarmState,

    brightness: u8,
    color: HexColor,

    alarm_editing: bool,
    user_interacting: bool,
    remote: RemoteTracker,

    alarm_writer: Debounce,
    picker_writer: Debounce,
    color_dirty: bool,
    brightness_dirty: bool,

    ramp: Option<Ramp>,
    status: String,
}

impl LampEngine {
    pub fn new(mut config: LampConfig) -> Self {
        config.sanitize();
        Self {
            alarm: AlarmState::new(config.alarm_brightness),
            brightness: config.default_brightness,
            color: config.default_color,
            alarm_editing: false,
            user_interacting: false,
            remote: RemoteTracker::default(),
            alarm_writer: Debounce::new(config.alarm_write_debounce_ms),
            picker_writer: Debounce::new(config.picker_write_debounce_ms),
            color_dirty: false,
            brightness_dirty: false,
            ramp: None,
            status: String::new(),
            config,
        }
    }

    pub fn alarm(&self) -> &AlarmState {
        &self.alarm
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn color(&self) -> HexColor {
        self.color
    }

    pub fn ramp(&self) -> Option<&Ramp> {
        self.ramp.as_ref()
    }

    pub fn status_text(&self) -> &str {
        &self.status
    }

    /// Applies the device's persisted values once at startup. A missing or
    /// invalid color falls back to the configured default; the returned
    /// errors describe every discarded field.
    pub fn load_initial(
        &mut self,
        color: Option<&str>,
        brightness: Option<&str>,
        alarm: Option<&RemoteAlarm>,
    ) -> Vec<PayloadError> {
        let mut discarded = Vec::new();

        let color = match color.map(HexColor::parse) {
            Some(Ok(color)) => Some(color),
            Some(Err(err)) => {
                discarded.push(err);
                None
            }
            None => None,
        };
        self.color = color.unwrap_or(self.config.default_color);

        let brightness = match brightness.map(parse_brightness) {
            Some(Ok(value)) => Some(value),
            Some(Err(err)) => {
                discarded.push(err);
                None
            }
            None => None,
        };
        if let Some(value) = brightness {
            self.brightness = value;
        }

        self.remote.seed(brightness, color);

        if let Some(remote) = alarm {
            merge_alarm(&mut self.alarm, remote, MergeGuard::default());
        }

        discarded
    }

    pub fn tick_alarm(&mut self, now: NaiveDateTime, now_ms: u64) -> Vec<EngineAction> {
        let mut actions = Vec::new();
        let today = now.date();
        let target = self.alarm.brightness;

        match scheduler::evaluate(&self.alarm, now, &self.config) {
            AlarmDecision::Idle => {
                if self.status == INVALID_TIME_STATUS {
                    self.set_status("", &mut actions);
                }
            }
            AlarmDecision::InvalidTime => self.set_status(INVALID_TIME_STATUS, &mut actions),
            AlarmDecision::EnterRampWindow { duration_ms } => {
                self.alarm.ramp_started_date = Some(today);
                self.alarm.ramp_in_progress = true;
                self.set_status(
                    format!("Alarm ramp started, {}s until alarm", duration_ms / 1_000),
                    &mut actions,
                );
                self.start_ramp(
                    RampKind::PreAlarm,
                    self.brightness,
                    target,
                    duration_ms,
                    RampMode::Slow,
                    now_ms,
                    &mut actions,
                );
            }
            AlarmDecision::Trigger { duration_ms } => {
                self.alarm.last_triggered_date = Some(today);
                self.alarm.enabled = false;
                self.alarm.ramp_in_progress = true;
                self.persist_alarm_now(&mut actions);
                self.set_status("Alarm triggered", &mut actions);
                self.start_ramp(
                    RampKind::Trigger,
                    self.brightness,
                    target,
                    duration_ms,
                    RampMode::Slow,
                    now_ms,
                    &mut actions,
                );
            }
        }

        actions
    }

    /// Flushes due debounced writes and steps a due ramp.
    pub fn advance(&mut self, now_ms: u64) -> Vec<EngineAction> {
        let mut actions = Vec::new();

        if self.alarm_writer.take_due(now_ms) {
            actions.push(EngineAction::SetAlarm(self.alarm.config()));
        }

        if self.picker_writer.take_due(now_ms) {
            if std::mem::take(&mut self.color_dirty) {
                actions.push(EngineAction::SetColor(self.color.rgb()));
            }
            if std::mem::take(&mut self.brightness_dirty) {
                actions.push(EngineAction::SetBrightness(self.brightness));
            }
        }

        let step = match self.ramp.as_mut() {
            Some(ramp) if ramp.is_due(now_ms) => Some((ramp.kind(), ramp.step(now_ms))),
            _ => None,
        };
        if let Some((kind, step)) = step {
            self.apply_brightness(step.value, UpdateOrigin::Scheduler, now_ms, &mut actions);
            if step.done {
                self.ramp = None;
                self.finish_ramp(kind, &mut actions);
            }
        }

        actions
    }

    pub fn next_deadline_ms(&self) -> Option<u64> {
        [
            self.alarm_writer.deadline_ms(),
            self.picker_writer.deadline_ms(),
            self.ramp.as_ref().map(Ramp::next_step_ms),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn apply_remote_alarm(&mut self, remote: &RemoteAlarm) -> bool {
        let guard = self.merge_guard();
        merge_alarm(&mut self.alarm, remote, guard)
    }

    pub fn apply_remote_brightness(&mut self, text: &str) -> Result<bool, PayloadError> {
        let remote = parse_brightness(text)?;
        let guard = self.merge_guard();
        let accepted = self.remote.accept_brightness(
            remote,
            guard,
            self.config.brightness_noise_threshold,
        );

        Ok(match accepted {
            Some(value) => {
                let (changed, _) =
                    self.picker_changed(self.color, value, UpdateOrigin::Remote, 0);
                changed
            }
            None => false,
        })
    }

    pub fn apply_remote_color(&mut self, text: &str) -> Result<bool, PayloadError> {
        let remote = HexColor::parse(text)?;
        let guard = self.merge_guard();
        Ok(match self.remote.accept_color(remote, guard) {
            Some(color) => {
                let (changed, _) =
                    self.picker_changed(color, self.brightness, UpdateOrigin::Remote, 0);
                changed
            }
            None => false,
        })
    }

    pub fn set_alarm_time(&mut self, time: &str, now_ms: u64) -> bool {
        let time = time.trim();
        if self.alarm.time == time {
            return false;
        }
        self.alarm.time = time.to_string();
        self.alarm_writer.schedule(now_ms);
        true
    }

    pub fn set_alarm_enabled(&mut self, enabled: bool, now_ms: u64) -> bool {
        if self.alarm.enabled == enabled {
            return false;
        }
        self.alarm.enabled = enabled;
        self.alarm_writer.schedule(now_ms);
        true
    }

    pub fn begin_alarm_edit(&mut self) {
        self.alarm_editing = true;
    }

    pub fn end_alarm_edit(&mut self) {
        self.alarm_editing = false;
    }

    pub fn begin_interaction(&mut self) {
        self.user_interacting = true;
    }

    pub fn end_interaction(&mut self) {
        self.user_interacting = false;
    }

    /// A value-changed notification from the picker. Returns whether the
    /// displayed value changed. `Local` changes are written back after the
    /// picker quiet period, `Scheduler` changes immediately, `Remote` never.
    pub fn picker_changed(
        &mut self,
        color: HexColor,
        brightness: u8,
        origin: UpdateOrigin,
        now_ms: u64,
    ) -> (bool, Vec<EngineAction>) {
        let mut actions = Vec::new();

        let color_changed = self.color != color;
        self.color = color;
        if color_changed {
            match origin {
                UpdateOrigin::Local => {
                    self.color_dirty = true;
                    self.picker_writer.schedule(now_ms);
                }
                UpdateOrigin::Scheduler => actions.push(EngineAction::SetColor(color.rgb())),
                UpdateOrigin::Remote => {}
            }
        }

        let brightness_changed = self.apply_brightness(brightness, origin, now_ms, &mut actions);
        (color_changed || brightness_changed, actions)
    }

    pub fn send_command(&mut self, value: &str) -> Result<Vec<EngineAction>, EngineError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(EngineError::EmptyCommand);
        }
        Ok(vec![EngineAction::Command(value.to_string())])
    }

    /// Previews the alarm: drops to zero, then ramps to the alarm brightness
    /// in fast mode. Refused while any ramp is running.
    pub fn test_alarm(&mut self, now_ms: u64) -> Result<Vec<EngineAction>, EngineError> {
        if self.alarm.ramp_in_progress || self.ramp.is_some() {
            return Err(EngineError::RampInProgress);
        }

        let mut actions = Vec::new();
        self.alarm.ramp_in_progress = true;
        self.set_status("Testing alarm", &mut actions);
        self.apply_brightness(0, UpdateOrigin::Scheduler, now_ms, &mut actions);
        self.start_ramp(
            RampKind::Preview,
            0,
            self.alarm.brightness,
            self.config.test_ramp_ms,
            RampMode::Fast,
            now_ms,
            &mut actions,
        );
        Ok(actions)
    }

    pub fn status(&self) -> LampStatus {
        let date = |date: Option<chrono::NaiveDate>| date.map(|d| d.format("%Y-%m-%d").to_string());
        LampStatus {
            alarm_enabled: self.alarm.enabled,
            alarm_time: self.alarm.time.clone(),
            alarm_brightness: self.alarm.brightness,
            last_triggered_date: date(self.alarm.last_triggered_date),
            ramp_started_date: date(self.alarm.ramp_started_date),
            ramp_in_progress: self.alarm.ramp_in_progress,
            ramp: self.ramp.as_ref().map(Ramp::status),
            current_brightness: self.brightness,
            color: self.color,
            alarm_editing: self.alarm_editing,
            user_interacting: self.user_interacting,
            status: self.status.clone(),
        }
    }

    fn merge_guard(&self) -> MergeGuard {
        MergeGuard {
            alarm_editing: self.alarm_editing,
            alarm_write_pending: self.alarm_writer.is_pending(),
            user_interacting: self.user_interacting,
            ramp_in_progress: self.alarm.ramp_in_progress,
        }
    }

    fn apply_brightness(
        &mut self,
        value: u8,
        origin: UpdateOrigin,
        now_ms: u64,
        actions: &mut Vec<EngineAction>,
    ) -> bool {
        let value = value.min(100);
        let changed = self.brightness != value;
        self.brightness = value;

        match origin {
            UpdateOrigin::Scheduler => actions.push(EngineAction::SetBrightness(value)),
            UpdateOrigin::Local if changed => {
                self.brightness_dirty = true;
                self.picker_writer.schedule(now_ms);
            }
            UpdateOrigin::Local | UpdateOrigin::Remote => {}
        }
        changed
    }

    #[allow(clippy::too_many_arguments)]
    fn start_ramp(
        &mut self,
        kind: RampKind,
        start: u8,
        target: u8,
        duration_ms: u64,
        mode: RampMode,
        now_ms: u64,
        actions: &mut Vec<EngineAction>,
    ) {
        match Ramp::start(kind, start, target, duration_ms, mode, &self.config, now_ms) {
            RampStart::Immediate(value) => {
                self.apply_brightness(value, UpdateOrigin::Scheduler, now_ms, actions);
                self.finish_ramp(kind, actions);
            }
            RampStart::Running(ramp) => self.ramp = Some(ramp),
        }
    }

    fn finish_ramp(&mut self, kind: RampKind, actions: &mut Vec<EngineAction>) {
        self.alarm.ramp_in_progress = false;
        match kind {
            RampKind::PreAlarm | RampKind::Trigger => {
                // A finished window ramp counts as that day's trigger.
                if self.alarm.ramp_started_date > self.alarm.last_triggered_date {
                    self.alarm.last_triggered_date = self.alarm.ramp_started_date;
                }
                if self.alarm.enabled {
                    self.alarm.enabled = false;
                    self.persist_alarm_now(actions);
                }
                self.set_status("Alarm completed", actions);
            }
            RampKind::Preview => self.set_status("Alarm test completed", actions),
        }
    }

    fn persist_alarm_now(&mut self, actions: &mut Vec<EngineAction>) {
        // The immediate write carries the latest state, so a pending flush is redundant.
        self.alarm_writer.cancel();
        actions.push(EngineAction::SetAlarm(self.alarm.config()));
    }

    fn set_status(&mut self, status: impl Into<String>, actions: &mut Vec<EngineAction>) {
        let status = status.into();
        if self.status != status {
            self.status = status.clone();
            actions.push(EngineAction::StatusChanged(status));
        }
    }
}
