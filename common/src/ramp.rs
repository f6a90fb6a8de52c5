use crate::{
    config::LampConfig,
    types::{RampKind, RampStatus},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampMode {
    /// One step per second, used by real alarms.
    Slow,
    /// Five steps per second, used by the test button.
    Fast,
}

impl RampMode {
    pub fn tick_ms(self, config: &LampConfig) -> u64 {
        match self {
            Self::Slow => config.slow_tick_ms,
            Self::Fast => config.fast_tick_ms,
        }
        .max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ramp {
    kind: RampKind,
    current: u8,
    target: u8,
    delta: u8,
    tick_ms: u64,
    next_step_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RampStart {
    /// Nothing to ramp: write the target once and complete.
    Immediate(u8),
    Running(Ramp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampStep {
    pub value: u8,
    pub done: bool,
}

impl Ramp {
    pub fn start(
        kind: RampKind,
        start: u8,
        target: u8,
        duration_ms: u64,
        mode: RampMode,
        config: &LampConfig,
        now_ms: u64,
    ) -> RampStart {
        let target = target.min(100);
        if mode == RampMode::Slow && start >= target {
            return RampStart::Immediate(target);
        }

        let tick_ms = mode.tick_ms(config);
        let step_count = (duration_ms / tick_ms).max(1);
        // Never a zero step, even when the distance is smaller than the step count.
        let delta = ((target as f64 - start as f64) / step_count as f64)
            .round()
            .clamp(1.0, 100.0) as u8;

        RampStart::Running(Self {
            kind,
            current: start,
            target,
            delta,
            tick_ms,
            next_step_ms: now_ms.saturating_add(tick_ms),
        })
    }

    pub fn kind(&self) -> RampKind {
        self.kind
    }

    pub fn current(&self) -> u8 {
        self.current
    }

    pub fn target(&self) -> u8 {
        self.target
    }

    pub fn delta(&self) -> u8 {
        self.delta
    }

    pub fn next_step_ms(&self) -> u64 {
        self.next_step_ms
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        now_ms >= self.next_step_ms
    }

    /// Advances one tick, clamping at the target.
    pub fn step(&mut self, now_ms: u64) -> RampStep {
        self.current = self.current.saturating_add(self.delta).min(self.target);
        self.next_step_ms = now_ms.saturating_add(self.tick_ms);
        RampStep {
            value: self.current,
            done: self.current == self.target,
        }
    }

    pub fn status(&self) -> RampStatus {
        RampStatus {
            kind: self.kind,
            current: self.current,
            target: self.target,
            tick_ms: self.tick_ms,
        }
    }
}
