// Live engine configuration - Shared between the UI thread and the scheduler
// The scheduler reads these values on every tick, so slider changes take
// effect on the next tick without a restart. Setters clamp silently: values
// arrive from live UI controls that may transiently go out of range.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::audio::parameters::AtomicF32;
use crate::engine::interval::clamp_tempo;

/// Emphasis classification of one subdivision slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Accent {
    /// Slot produces no sound
    Muted,
    Normal,
    Accent,
    /// Downbeat emphasis
    First,
}

/// Shared, live-updatable metronome configuration
///
/// Cloning yields another handle onto the same values (teacher-style atomic
/// parameter sharing); the accent pattern sits behind a mutex because it is
/// the only non-scalar field.
#[derive(Clone)]
pub struct EngineConfig {
    tempo_bpm: AtomicF32,
    subdivisions: Arc<AtomicUsize>,
    beat_multiplier: Arc<AtomicU32>,
    swing: AtomicF32,
    volume: AtomicF32,
    multi_voice: Arc<AtomicBool>,
    accents: Arc<Mutex<Vec<Accent>>>,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            tempo_bpm: AtomicF32::new(120.0),
            subdivisions: Arc::new(AtomicUsize::new(4)),
            beat_multiplier: Arc::new(AtomicU32::new(1)),
            swing: AtomicF32::new(0.0),
            volume: AtomicF32::new(0.5),
            multi_voice: Arc::new(AtomicBool::new(false)),
            accents: Arc::new(Mutex::new(vec![
                Accent::First,
                Accent::Normal,
                Accent::Normal,
                Accent::Normal,
            ])),
        }
    }

    pub fn tempo(&self) -> f32 {
        self.tempo_bpm.get()
    }

    pub fn set_tempo(&self, bpm: f32) {
        self.tempo_bpm.set(clamp_tempo(bpm));
    }

    pub fn subdivisions(&self) -> usize {
        self.subdivisions.load(Ordering::Relaxed).max(1)
    }

    pub fn set_subdivisions(&self, count: usize) {
        self.subdivisions.store(count.max(1), Ordering::Relaxed);
    }

    /// 1 = quarter-note pulse, 2 = eighth-note pulse
    pub fn beat_multiplier(&self) -> u32 {
        self.beat_multiplier.load(Ordering::Relaxed)
    }

    pub fn set_beat_multiplier(&self, multiplier: u32) {
        self.beat_multiplier
            .store(multiplier.clamp(1, 2), Ordering::Relaxed);
    }

    pub fn swing(&self) -> f32 {
        self.swing.get()
    }

    pub fn set_swing(&self, factor: f32) {
        let factor = if factor.is_finite() { factor } else { 0.0 };
        self.swing.set(factor.clamp(0.0, 0.5));
    }

    pub fn volume(&self) -> f32 {
        self.volume.get()
    }

    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_finite() { volume } else { 0.0 };
        self.volume.set(volume.clamp(0.0, 1.0));
    }

    /// Widened-lookahead flag for multi-voice configurations
    pub fn multi_voice(&self) -> bool {
        self.multi_voice.load(Ordering::Relaxed)
    }

    pub fn set_multi_voice(&self, enabled: bool) {
        self.multi_voice.store(enabled, Ordering::Relaxed);
    }

    /// Accent for a subdivision slot; slots past the end of the pattern read
    /// as `Normal`
    pub fn accent_for(&self, sub_index: usize) -> Accent {
        self.accents
            .lock()
            .ok()
            .and_then(|pattern| pattern.get(sub_index).copied())
            .unwrap_or(Accent::Normal)
    }

    pub fn set_accents(&self, pattern: Vec<Accent>) {
        if let Ok(mut accents) = self.accents.lock() {
            *accents = pattern;
        }
    }

    pub fn accents(&self) -> Vec<Accent> {
        self.accents.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only snapshot handle onto the scheduler's observable state
///
/// This is what UI collaborators poll for display; the scheduler is the only
/// writer.
#[derive(Clone)]
pub struct EngineReadout {
    current_subdivision: Arc<AtomicUsize>,
    actual_bpm: AtomicF32,
    jitter_ms: AtomicF32,
    silence_phase: Arc<AtomicBool>,
}

impl EngineReadout {
    pub fn new() -> Self {
        Self {
            current_subdivision: Arc::new(AtomicUsize::new(0)),
            actual_bpm: AtomicF32::new(0.0),
            jitter_ms: AtomicF32::new(0.0),
            silence_phase: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Index of the subdivision that last fired (for visual highlighting)
    pub fn current_subdivision(&self) -> usize {
        self.current_subdivision.load(Ordering::Relaxed)
    }

    /// Observed BPM computed from actually-played beats; 0 until enough
    /// beats have been recorded
    pub fn actual_bpm(&self) -> f32 {
        self.actual_bpm.get()
    }

    /// Standard deviation of inter-beat intervals in milliseconds
    pub fn jitter_ms(&self) -> f32 {
        self.jitter_ms.get()
    }

    pub fn silence_phase(&self) -> bool {
        self.silence_phase.load(Ordering::Relaxed)
    }

    pub(crate) fn set_current_subdivision(&self, index: usize) {
        self.current_subdivision.store(index, Ordering::Relaxed);
    }

    pub(crate) fn set_actual_bpm(&self, bpm: f32) {
        self.actual_bpm.set(bpm);
    }

    pub(crate) fn set_jitter_ms(&self, jitter: f32) {
        self.jitter_ms.set(jitter);
    }

    pub(crate) fn set_silence_phase(&self, silent: bool) {
        self.silence_phase.store(silent, Ordering::Relaxed);
    }
}

impl Default for EngineReadout {
    fn default() -> Self {
        Self::new()
    }
}
