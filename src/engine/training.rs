// Training logic - Macro silence phases and progressive speed-up
// One shared measure counter drives both macros: enabling either mode
// mid-session continues from the measures already counted.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::engine::interval::clamp_tempo;

/// Ceiling for automatic speed-up; increases stop here
pub const AUTO_TEMPO_CEILING: f32 = 240.0;

/// Largest single automatic increase in BPM, whatever the percentage says
pub const AUTO_STEP_CAP: f32 = 5.0;

/// Ceiling for the manual speed-up button
pub const MANUAL_TEMPO_CEILING: f32 = 180.0;

/// Largest single manual increase in BPM
pub const MANUAL_STEP_CAP: f32 = 10.0;

/// Muting macro mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MacroMode {
    #[default]
    Off,
    /// Alternate N audible measures with M silent measures
    FixedSilence,
    /// Mute each beat independently with a fixed probability
    RandomSilence,
}

/// Progressive speed-up mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeedMode {
    #[default]
    Off,
    /// Raise the tempo by a percentage every N measures
    AutoIncrease,
    /// Tempo only changes when the user presses the speed-up control
    ManualIncrease,
}

/// Training parameters, all live-editable between measures
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub macro_mode: MacroMode,
    pub speed_mode: SpeedMode,
    /// Audible measures before a silence phase starts
    pub measures_until_mute: u32,
    /// Length of each silence phase in measures
    pub mute_duration_measures: u32,
    /// Per-beat mute probability for `RandomSilence`
    pub mute_probability: f32,
    /// Measures between automatic tempo increases
    pub measures_until_speed_up: u32,
    /// Percentage increase per speed-up step
    pub tempo_increase_percent: f32,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            macro_mode: MacroMode::Off,
            speed_mode: SpeedMode::Off,
            measures_until_mute: 2,
            mute_duration_measures: 1,
            mute_probability: 0.3,
            measures_until_speed_up: 2,
            tempo_increase_percent: 5.0,
        }
    }
}

/// What happened at a measure boundary
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryOutcome {
    pub silence_phase: bool,
    pub measure_count: u32,
    pub mute_measure_count: u32,
    /// Set when the auto speed-up fired this boundary
    pub new_tempo: Option<f32>,
}

/// Mutable training state, owned by the scheduler thread
pub struct TrainingState {
    measure_count: u32,
    mute_measure_count: u32,
    silence_phase: bool,
    rng: SmallRng,
}

impl TrainingState {
    pub fn new() -> Self {
        Self::with_seed(rand::thread_rng().gen())
    }

    /// Deterministic variant for tests
    pub fn with_seed(seed: u64) -> Self {
        Self {
            measure_count: 0,
            mute_measure_count: 0,
            silence_phase: false,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn silence_phase(&self) -> bool {
        self.silence_phase
    }

    pub fn measure_count(&self) -> u32 {
        self.measure_count
    }

    pub fn mute_measure_count(&self) -> u32 {
        self.mute_measure_count
    }

    /// Back to the start of an audible phase; called on transport start
    pub fn reset(&mut self) {
        self.measure_count = 0;
        self.mute_measure_count = 0;
        self.silence_phase = false;
    }

    /// Per-beat mute decision. Fixed silence mutes whole measures via the
    /// phase flag; random silence draws per beat so consecutive beats are
    /// independent.
    pub fn should_mute_beat(&mut self, config: &TrainingConfig) -> bool {
        match config.macro_mode {
            MacroMode::Off => false,
            MacroMode::FixedSilence => self.silence_phase,
            MacroMode::RandomSilence => {
                let p = config.mute_probability.clamp(0.0, 1.0);
                self.rng.gen::<f32>() < p
            }
        }
    }

    /// Advance the measure counters and apply phase transitions and the auto
    /// speed-up. Called once per completed measure with the tempo in effect.
    /// The measure counter resets on every silence transition and on every
    /// speed step; both macros read the same counter.
    pub fn measure_boundary(&mut self, config: &TrainingConfig, current_tempo: f32) -> BoundaryOutcome {
        self.measure_count += 1;

        if config.macro_mode == MacroMode::FixedSilence {
            if !self.silence_phase {
                if self.measure_count >= config.measures_until_mute.max(1) {
                    self.silence_phase = true;
                    self.mute_measure_count = 0;
                    self.measure_count = 0;
                }
            } else {
                self.mute_measure_count += 1;
                if self.mute_measure_count >= config.mute_duration_measures.max(1) {
                    self.silence_phase = false;
                    self.mute_measure_count = 0;
                    self.measure_count = 0;
                }
            }
        }

        let new_tempo = if config.speed_mode == SpeedMode::AutoIncrease
            && !self.silence_phase
            && self.measure_count >= config.measures_until_speed_up.max(1)
        {
            self.measure_count = 0;
            auto_increase(current_tempo, config.tempo_increase_percent)
        } else {
            None
        };

        BoundaryOutcome {
            silence_phase: self.silence_phase,
            measure_count: self.measure_count,
            mute_measure_count: self.mute_measure_count,
            new_tempo,
        }
    }
}

impl Default for TrainingState {
    fn default() -> Self {
        Self::new()
    }
}

/// Automatic tempo step: percentage increase, capped per step and by the
/// ceiling. Returns `None` when the tempo is already at the ceiling.
fn auto_increase(current: f32, percent: f32) -> Option<f32> {
    if current >= AUTO_TEMPO_CEILING {
        return None;
    }
    let stepped = current * (1.0 + percent.max(0.0) / 100.0);
    let capped = stepped.min(current + AUTO_STEP_CAP).min(AUTO_TEMPO_CEILING);
    if capped > current {
        Some(clamp_tempo(capped))
    } else {
        None
    }
}

/// Manual speed-up step, for the explicit user control. Uses its own lower
/// ceiling; a tempo already at or above it is returned unchanged.
pub fn manual_accelerate(current: f32, percent: f32) -> f32 {
    if current >= MANUAL_TEMPO_CEILING {
        return current;
    }
    let stepped = current * (1.0 + percent.max(0.0) / 100.0);
    clamp_tempo(stepped.min(current + MANUAL_STEP_CAP).min(MANUAL_TEMPO_CEILING))
}
