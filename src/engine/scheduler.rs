// Lookahead scheduler - Commits beats to the clock slightly ahead of time
// A coarse tick (20ms) runs on an ordinary thread; within each tick every
// beat falling inside the lookahead window is committed to the clock at its
// exact time. Timing accuracy comes from the clock, not from the tick rate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::audio::clock::{Clock, ClockState};
use crate::engine::config::{Accent, EngineConfig, EngineReadout};
use crate::engine::interval::interval_seconds;
use crate::engine::training::{TrainingConfig, TrainingState};
use crate::messaging::event::{EngineEvent, TempoSource};
use crate::sound::bank::SoundBank;

/// How far ahead of the clock beats are committed
pub const LOOKAHEAD_SECONDS: f64 = 0.030;

/// Lookahead widening when several click voices may overlap
pub const MULTI_VOICE_LOOKAHEAD_FACTOR: f64 = 1.2;

/// A beat whose time has already passed is clamped to this far past "now"
pub const LATE_EPSILON_SECONDS: f64 = 0.001;

/// Scheduler thread tick period
pub const TICK_INTERVAL: Duration = Duration::from_millis(20);

/// Beat timestamps kept for the observed BPM / jitter readout
const MAX_BEAT_HISTORY: usize = 16;

pub type Observer = Box<dyn Fn(&EngineEvent) + Send>;

/// Beat scheduler driven by `tick()` calls
///
/// Owns the subdivision cursor, the next-beat time and the training state;
/// everything shared with other threads (config, readout, bank, running
/// flag) arrives as a handle.
pub struct LookaheadScheduler {
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    readout: EngineReadout,
    bank: SoundBank,
    training_config: Arc<Mutex<TrainingConfig>>,
    training: TrainingState,
    observers: Arc<Mutex<Vec<Observer>>>,
    running: Arc<AtomicBool>,
    next_event_time: f64,
    current_subdivision: usize,
    beat_times_ms: Vec<f64>,
}

impl LookaheadScheduler {
    pub fn new(
        clock: Arc<dyn Clock>,
        config: EngineConfig,
        readout: EngineReadout,
        bank: SoundBank,
        training_config: Arc<Mutex<TrainingConfig>>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            clock,
            config,
            readout,
            bank,
            training_config,
            training: TrainingState::new(),
            observers: Arc::new(Mutex::new(Vec::new())),
            running,
            next_event_time: 0.0,
            current_subdivision: 0,
            beat_times_ms: Vec::with_capacity(MAX_BEAT_HISTORY),
        }
    }

    /// Deterministic training randomness for tests
    pub fn with_training_seed(mut self, seed: u64) -> Self {
        self.training = TrainingState::with_seed(seed);
        self
    }

    /// Share an externally owned observer list, so subscriptions made before
    /// the scheduler exists still receive events
    pub fn with_observers(mut self, observers: Arc<Mutex<Vec<Observer>>>) -> Self {
        self.observers = observers;
        self
    }

    /// Register an observer called synchronously for every emitted event
    pub fn subscribe<F>(&self, observer: F)
    where
        F: Fn(&EngineEvent) + Send + 'static,
    {
        if let Ok(mut observers) = self.observers.lock() {
            observers.push(Box::new(observer));
        }
    }

    /// Rewind the cursors to "start of measure, first beat now". Called on
    /// transport start so a stop/start always begins cleanly on the downbeat.
    pub fn reset_cursors(&mut self) {
        self.next_event_time = self.clock.now();
        self.current_subdivision = 0;
        self.beat_times_ms.clear();
        self.training.reset();
        self.readout.set_current_subdivision(0);
        self.readout.set_actual_bpm(0.0);
        self.readout.set_jitter_ms(0.0);
        self.readout.set_silence_phase(false);
    }

    /// One scheduler pass: commit every beat inside the lookahead window.
    ///
    /// Safe to call at any rate. A late tick schedules all the beats it
    /// missed, clamped to just past "now", so beats are never dropped.
    pub fn tick(&mut self) {
        if !self.running.load(Ordering::Relaxed) {
            return;
        }
        if self.clock.state() != ClockState::Running {
            return;
        }

        let lookahead = if self.config.multi_voice() {
            LOOKAHEAD_SECONDS * MULTI_VOICE_LOOKAHEAD_FACTOR
        } else {
            LOOKAHEAD_SECONDS
        };
        let now = self.clock.now();

        while self.next_event_time < now + lookahead {
            // Stop may land between beats of a single pass.
            if !self.running.load(Ordering::Relaxed) {
                return;
            }

            let subdivisions = self.config.subdivisions();
            if self.current_subdivision >= subdivisions {
                self.current_subdivision = 0;
            }
            let sub = self.current_subdivision;

            let training_muted = match self.training_config.lock() {
                Ok(cfg) => self.training.should_mute_beat(&cfg),
                Err(_) => false,
            };
            let accent = self.config.accent_for(sub);

            let when = if self.next_event_time < now {
                now + LATE_EPSILON_SECONDS
            } else {
                self.next_event_time
            };

            if !training_muted && accent != Accent::Muted {
                if let Some(set) = self.bank.current() {
                    let buffer = match accent {
                        Accent::First => &set.first,
                        Accent::Accent => &set.accent,
                        _ => &set.normal,
                    };
                    self.clock
                        .schedule_click(Arc::clone(buffer), self.config.volume(), when);
                }
            }

            if !training_muted {
                self.beat_times_ms.push(when * 1000.0);
                while self.beat_times_ms.len() > MAX_BEAT_HISTORY {
                    self.beat_times_ms.remove(0);
                }
                if let Some((bpm, jitter)) = beat_stats(&self.beat_times_ms) {
                    self.readout.set_actual_bpm(bpm);
                    self.readout.set_jitter_ms(jitter);
                }
            }

            self.readout.set_current_subdivision(sub);
            self.emit(&EngineEvent::Beat {
                subdivision: sub,
                accent,
                muted: training_muted || accent == Accent::Muted,
                when,
            });

            self.next_event_time += interval_seconds(
                self.config.tempo(),
                self.config.beat_multiplier(),
                subdivisions,
                self.config.swing(),
                sub,
            );
            self.current_subdivision += 1;
            if self.current_subdivision >= subdivisions {
                self.current_subdivision = 0;
                self.measure_boundary();
            }
        }
    }

    fn measure_boundary(&mut self) {
        let outcome = match self.training_config.lock() {
            Ok(cfg) => self.training.measure_boundary(&cfg, self.config.tempo()),
            Err(_) => return,
        };

        let was_silent = self.readout.silence_phase();
        self.readout.set_silence_phase(outcome.silence_phase);

        self.emit(&EngineEvent::MeasureBoundary {
            measure_count: outcome.measure_count,
            mute_measure_count: outcome.mute_measure_count,
            silence_phase: outcome.silence_phase,
        });
        if outcome.silence_phase != was_silent {
            self.emit(&EngineEvent::SilencePhase(outcome.silence_phase));
        }
        if let Some(bpm) = outcome.new_tempo {
            self.config.set_tempo(bpm);
            self.emit(&EngineEvent::TempoChanged {
                bpm: self.config.tempo(),
                source: TempoSource::AutoSpeedUp,
            });
        }
    }

    fn emit(&self, event: &EngineEvent) {
        if let Ok(observers) = self.observers.lock() {
            for observer in observers.iter() {
                observer(event);
            }
        }
    }
}

/// Observed BPM and interval jitter from a window of beat times (ms).
/// Needs at least two beats; jitter is the standard deviation of the
/// inter-beat intervals.
pub fn beat_stats(times_ms: &[f64]) -> Option<(f32, f32)> {
    if times_ms.len() < 2 {
        return None;
    }
    let intervals: Vec<f64> = times_ms.windows(2).map(|p| p[1] - p[0]).collect();
    let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
    if mean <= 0.0 {
        return None;
    }

    let bpm = 60_000.0 / mean;
    let variance = intervals
        .iter()
        .map(|i| (i - mean) * (i - mean))
        .sum::<f64>()
        / intervals.len() as f64;

    Some((bpm as f32, variance.sqrt() as f32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clock::OfflineClock;
    use crate::sound::bank::{ClickBuffer, ClickSet};
    use crate::sound::loader::synthesize_click_set;

    fn test_rig(
        config: EngineConfig,
        training: TrainingConfig,
    ) -> (Arc<OfflineClock>, LookaheadScheduler) {
        let clock = Arc::new(OfflineClock::new(48_000));
        let bank = SoundBank::new();
        bank.install(synthesize_click_set(48_000));
        let running = Arc::new(AtomicBool::new(true));
        let mut scheduler = LookaheadScheduler::new(
            Arc::clone(&clock) as Arc<dyn Clock>,
            config,
            EngineReadout::new(),
            bank,
            Arc::new(Mutex::new(training)),
            running,
        )
        .with_training_seed(1);
        scheduler.reset_cursors();
        (clock, scheduler)
    }

    #[test]
    fn test_tick_commits_only_inside_lookahead() {
        let (clock, mut scheduler) = test_rig(EngineConfig::new(), TrainingConfig::default());

        // 120 BPM: beats at 0.0, 0.5, ... Only the first is within 30ms.
        scheduler.tick();
        assert_eq!(clock.scheduled().len(), 1);

        // Repeat ticks without advancing time schedule nothing new.
        scheduler.tick();
        scheduler.tick();
        assert_eq!(clock.scheduled().len(), 1);

        clock.advance(0.5);
        scheduler.tick();
        assert_eq!(clock.scheduled().len(), 2);
    }

    #[test]
    fn test_late_tick_recovers_missed_beats() {
        let (clock, mut scheduler) = test_rig(EngineConfig::new(), TrainingConfig::default());

        scheduler.tick();
        assert_eq!(clock.take_scheduled().len(), 1);

        // The tick thread stalls for 1.6 seconds. Beats at 0.5, 1.0 and 1.5
        // were missed; they must all still be committed, clamped to now.
        clock.advance(1.6);
        scheduler.tick();

        let recovered = clock.take_scheduled();
        assert_eq!(recovered.len(), 3);
        let now = clock.now();
        for click in &recovered {
            assert!(click.when >= now, "when={} now={}", click.when, now);
            assert!(click.when <= now + LATE_EPSILON_SECONDS + 1e-9);
        }
    }

    #[test]
    fn test_accent_pattern_selects_buffers_and_muted_slot_is_silent() {
        let config = EngineConfig::new();
        config.set_accents(vec![
            Accent::First,
            Accent::Normal,
            Accent::Accent,
            Accent::Muted,
        ]);
        let (clock, mut scheduler) = test_rig(config, TrainingConfig::default());
        // Distinct buffer lengths so the selected accent class is visible.
        scheduler.bank.install(ClickSet {
            normal: Arc::new(ClickBuffer {
                samples: vec![0.5; 48],
                sample_rate: 48_000,
            }),
            accent: Arc::new(ClickBuffer {
                samples: vec![0.5; 96],
                sample_rate: 48_000,
            }),
            first: Arc::new(ClickBuffer {
                samples: vec![0.5; 144],
                sample_rate: 48_000,
            }),
        });

        let events: Arc<Mutex<Vec<EngineEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        scheduler.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

        // Walk a full measure.
        for _ in 0..4 {
            scheduler.tick();
            clock.advance(0.5);
        }

        let scheduled = clock.scheduled();
        // Three audible slots; the muted slot produced no click.
        assert_eq!(scheduled.len(), 3);
        assert_eq!(scheduled[0].buffer.len(), 144);
        assert_eq!(scheduled[1].buffer.len(), 48);
        assert_eq!(scheduled[2].buffer.len(), 96);

        // The muted slot still produced a Beat event and advanced time.
        let beats: Vec<_> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Beat {
                    subdivision, muted, ..
                } => Some((*subdivision, *muted)),
                _ => None,
            })
            .collect();
        assert!(beats.contains(&(3, true)));
    }

    #[test]
    fn test_tempo_change_applies_on_next_beat() {
        let config = EngineConfig::new();
        let (clock, mut scheduler) = test_rig(config.clone(), TrainingConfig::default());

        scheduler.tick();
        config.set_tempo(60.0);

        // The beat committed before the change keeps its old 0.5s offset.
        clock.advance(0.48);
        scheduler.tick();
        let scheduled = clock.scheduled();
        assert_eq!(scheduled.len(), 2);
        assert!((scheduled[1].when - 0.5).abs() < 1e-9);

        // From there on the 60 BPM interval holds.
        clock.advance(1.0);
        scheduler.tick();
        assert!((clock.scheduled()[2].when - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_not_running_is_a_no_op() {
        let (clock, mut scheduler) = test_rig(EngineConfig::new(), TrainingConfig::default());
        scheduler.running.store(false, Ordering::Relaxed);
        scheduler.tick();
        assert!(clock.scheduled().is_empty());
    }

    #[test]
    fn test_suspended_clock_is_a_no_op() {
        let (clock, mut scheduler) = test_rig(EngineConfig::new(), TrainingConfig::default());
        clock.set_state(ClockState::Suspended);
        scheduler.tick();
        assert!(clock.scheduled().is_empty());
    }

    #[test]
    fn test_empty_bank_keeps_timing_and_events() {
        let (clock, mut scheduler) = test_rig(EngineConfig::new(), TrainingConfig::default());
        scheduler.bank.clear();

        let events: Arc<Mutex<Vec<EngineEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        scheduler.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

        for _ in 0..4 {
            scheduler.tick();
            clock.advance(0.5);
        }

        assert!(clock.scheduled().is_empty());
        let beat_count = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, EngineEvent::Beat { .. }))
            .count();
        assert_eq!(beat_count, 4);
    }

    #[test]
    fn test_readout_tracks_observed_bpm() {
        let config = EngineConfig::new();
        config.set_subdivisions(1);
        let readout = {
            let (clock, mut scheduler) = test_rig(config, TrainingConfig::default());
            for _ in 0..8 {
                scheduler.tick();
                clock.advance(0.5);
            }
            scheduler.readout.clone()
        };

        assert!((readout.actual_bpm() - 120.0).abs() < 0.01);
        assert!(readout.jitter_ms() < 0.01);
    }

    #[test]
    fn test_beat_stats_exact_and_jittered() {
        assert_eq!(beat_stats(&[0.0]), None);

        let (bpm, jitter) = beat_stats(&[0.0, 500.0, 1000.0, 1500.0]).unwrap();
        assert!((bpm - 120.0).abs() < 1e-3);
        assert!(jitter < 1e-6);

        let (bpm, jitter) = beat_stats(&[0.0, 490.0, 1000.0, 1510.0, 2000.0]).unwrap();
        assert!((bpm - 120.0).abs() < 0.5);
        assert!(jitter > 5.0);
    }

    #[test]
    fn test_scheduled_clicks_use_dummy_buffer_gain() {
        let config = EngineConfig::new();
        config.set_volume(0.25);
        let (clock, mut scheduler) = test_rig(config, TrainingConfig::default());
        scheduler.bank.clear();
        scheduler.bank.install(ClickSet {
            normal: Arc::new(ClickBuffer {
                samples: vec![1.0; 48],
                sample_rate: 48_000,
            }),
            accent: Arc::new(ClickBuffer {
                samples: vec![1.0; 48],
                sample_rate: 48_000,
            }),
            first: Arc::new(ClickBuffer {
                samples: vec![1.0; 48],
                sample_rate: 48_000,
            }),
        });

        scheduler.tick();
        assert_eq!(clock.scheduled()[0].gain, 0.25);
    }
}
