// Engine module - Scheduling, tempo math, training and transport

pub mod config;
pub mod controller;
pub mod interval;
pub mod scheduler;
pub mod tap;
pub mod training;

pub use config::{Accent, EngineConfig, EngineReadout};
pub use controller::{PlaybackController, PlaybackState};
pub use interval::{clamp_tempo, interval_seconds, TEMPO_MAX, TEMPO_MIN};
pub use scheduler::LookaheadScheduler;
pub use tap::TapTempo;
pub use training::{MacroMode, SpeedMode, TrainingConfig};
