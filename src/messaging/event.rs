// Engine events - Typed notifications for UI collaborators
// Replaces the ambient event-bus of the original design: callers subscribe
// on the scheduler or drain the lock-free channel, nothing is global.

use crate::engine::config::Accent;

/// Where a tempo change originated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempoSource {
    Ui,
    TapTempo,
    AutoSpeedUp,
    ManualSpeedUp,
}

/// Discrete engine notifications, emitted outside the timing-critical path
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A subdivision was committed to the clock (or deliberately muted)
    Beat {
        subdivision: usize,
        accent: Accent,
        muted: bool,
        /// Clock time the beat will sound at, in seconds
        when: f64,
    },
    /// The subdivision cursor wrapped back to zero
    MeasureBoundary {
        measure_count: u32,
        mute_measure_count: u32,
        silence_phase: bool,
    },
    /// The training macro entered or left a silence phase
    SilencePhase(bool),
    TempoChanged {
        bpm: f32,
        source: TempoSource,
    },
}
