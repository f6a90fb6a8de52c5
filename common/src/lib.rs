pub mod alarm;
pub mod api;
pub mod config;
pub mod debounce;
pub mod engine;
pub mod ramp;
pub mod reconcile;
pub mod scheduler;
pub mod types;

pub use alarm::{AlarmConfig, AlarmState, AlarmTime, RemoteAlarm};
pub use api::*;
pub use config::{DeviceConfig, LampConfig, RuntimeConfig};
pub use engine::{EngineAction, EngineError, LampEngine};
pub use ramp::{Ramp, RampMode};
pub use scheduler::AlarmDecision;
pub use types::{HexColor, LampStatus, PayloadError, RampKind, Rgb, UpdateOrigin};
