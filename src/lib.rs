// Tickmate - Library exports for tests and benchmarks

pub mod audio;
pub mod engine;
pub mod error;
pub mod messaging;
pub mod sound;

// Re-export commonly used types for convenience
pub use audio::clock::{Clock, ClockState, OfflineClock};
pub use audio::output::{AudioOutput, CpalClock};
pub use engine::config::{Accent, EngineConfig, EngineReadout};
pub use engine::controller::{PlaybackController, PlaybackState};
pub use engine::scheduler::LookaheadScheduler;
pub use engine::tap::TapTempo;
pub use engine::training::{MacroMode, SpeedMode, TrainingConfig};
pub use error::EngineError;
pub use messaging::channels::create_event_channel;
pub use messaging::event::{EngineEvent, TempoSource};
pub use sound::bank::{ClickBuffer, ClickSet, SoundBank, SoundSetSpec};
