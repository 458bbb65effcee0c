// Playback controller - Transport facade owned by the application thread
// Owns the audio output (the stream handle is not Send on every platform)
// and the scheduler thread. Everything it shares with that thread is a
// cloneable handle; start and stop are idempotent.

use log::{info, warn};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::audio::clock::{Clock, ClockState};
use crate::audio::output::AudioOutput;
use crate::engine::config::{EngineConfig, EngineReadout};
use crate::engine::scheduler::{LookaheadScheduler, Observer, TICK_INTERVAL};
use crate::engine::tap::TapTempo;
use crate::engine::training::{manual_accelerate, TrainingConfig};
use crate::error::EngineError;
use crate::messaging::channels::{create_event_channel, EventConsumer, EventProducer};
use crate::messaging::event::{EngineEvent, TempoSource};
use crate::sound::bank::{SoundBank, SoundSetSpec};
use crate::sound::loader::{load_click_set, synthesize_click_set};

/// Event ring capacity. At the fastest configuration (240 BPM, eighth-note
/// pulse, 8 subdivisions) the engine emits under 300 events per second, so
/// this holds comfortably over a second of backlog for a slow consumer.
const EVENT_CHANNEL_CAPACITY: usize = 512;

/// Attempts at loading the configured sound set before synthesizing
const MAX_LOAD_ATTEMPTS: u32 = 3;

/// Transport lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Starting,
    Running,
    Stopping,
    /// The clock exists but is paused (host policy or failed resume)
    Suspended,
}

impl PlaybackState {
    fn to_u8(self) -> u8 {
        match self {
            PlaybackState::Stopped => 0,
            PlaybackState::Starting => 1,
            PlaybackState::Running => 2,
            PlaybackState::Stopping => 3,
            PlaybackState::Suspended => 4,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => PlaybackState::Starting,
            2 => PlaybackState::Running,
            3 => PlaybackState::Stopping,
            4 => PlaybackState::Suspended,
            _ => PlaybackState::Stopped,
        }
    }
}

/// Top-level metronome transport
///
/// Construct once, then drive it with `start` / `stop` while mutating the
/// shared `EngineConfig` and `TrainingConfig` live. Not `Send`: it keeps the
/// audio stream on the thread that created it.
pub struct PlaybackController {
    config: EngineConfig,
    readout: EngineReadout,
    bank: SoundBank,
    training_config: Arc<Mutex<TrainingConfig>>,
    sound_spec: Mutex<Option<SoundSetSpec>>,
    state: Arc<AtomicU8>,
    running: Arc<AtomicBool>,
    observers: Arc<Mutex<Vec<Observer>>>,
    clock: Mutex<Option<Arc<dyn Clock>>>,
    external_clock: bool,
    output: Mutex<Option<AudioOutput>>,
    scheduler_thread: Mutex<Option<JoinHandle<()>>>,
    tap: Mutex<TapTempo>,
    epoch: Instant,
    event_rx: Mutex<Option<EventConsumer>>,
}

impl PlaybackController {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Run against a caller-supplied clock instead of real audio output.
    /// Used by tests and benches with an offline clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::build(Some(clock))
    }

    fn build(clock: Option<Arc<dyn Clock>>) -> Self {
        let (tx, rx) = create_event_channel(EVENT_CHANNEL_CAPACITY);
        let observers: Arc<Mutex<Vec<Observer>>> = Arc::new(Mutex::new(Vec::new()));

        // Bridge observer: copy every event into the lock-free ring. A full
        // ring drops the event rather than blocking the scheduler.
        let bridge_tx: Arc<Mutex<EventProducer>> = Arc::new(Mutex::new(tx));
        if let Ok(mut list) = observers.lock() {
            let bridge = Arc::clone(&bridge_tx);
            list.push(Box::new(move |event: &EngineEvent| {
                if let Ok(mut tx) = bridge.lock() {
                    use ringbuf::traits::Producer;
                    let _ = tx.try_push(event.clone());
                }
            }));
        }

        Self {
            config: EngineConfig::new(),
            readout: EngineReadout::new(),
            bank: SoundBank::new(),
            training_config: Arc::new(Mutex::new(TrainingConfig::default())),
            sound_spec: Mutex::new(None),
            state: Arc::new(AtomicU8::new(PlaybackState::Stopped.to_u8())),
            running: Arc::new(AtomicBool::new(false)),
            observers,
            external_clock: clock.is_some(),
            clock: Mutex::new(clock),
            output: Mutex::new(None),
            scheduler_thread: Mutex::new(None),
            tap: Mutex::new(TapTempo::new()),
            epoch: Instant::now(),
            event_rx: Mutex::new(Some(rx)),
        }
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn readout(&self) -> &EngineReadout {
        &self.readout
    }

    pub fn training_config(&self) -> Arc<Mutex<TrainingConfig>> {
        Arc::clone(&self.training_config)
    }

    /// Consumer end of the event ring; available exactly once
    pub fn take_events(&self) -> Option<EventConsumer> {
        self.event_rx.lock().ok().and_then(|mut rx| rx.take())
    }

    /// Register an observer called synchronously on the scheduler thread
    pub fn subscribe<F>(&self, observer: F)
    where
        F: Fn(&EngineEvent) + Send + 'static,
    {
        if let Ok(mut observers) = self.observers.lock() {
            observers.push(Box::new(observer));
        }
    }

    /// Choose the sound set loaded on the next start or reload
    pub fn set_sound_set(&self, spec: SoundSetSpec) {
        if let Ok(mut slot) = self.sound_spec.lock() {
            *slot = Some(spec);
        }
    }

    /// Start playback. Idempotent: a second start while running is a no-op.
    ///
    /// Rebuilds the audio output when no clock exists yet or the previous one
    /// was closed. A clock that refuses to resume leaves the transport in
    /// `Suspended` with the scheduler thread parked on no-op ticks; a later
    /// `resume` picks playback up without another start.
    pub fn start(&self) -> Result<(), EngineError> {
        match self.state() {
            PlaybackState::Running | PlaybackState::Starting => return Ok(()),
            // A suspended transport already owns a scheduler thread parked
            // on no-op ticks; a start here is a retry of the gesture-gated
            // resume, never a second spawn.
            PlaybackState::Suspended => {
                match self.resume() {
                    Ok(()) => info!("playback resumed at {} BPM", self.config.tempo()),
                    Err(e) => warn!("clock still refuses to resume: {e}"),
                }
                return Ok(());
            }
            _ => {}
        }
        self.set_state(PlaybackState::Starting);

        let clock = match self.ensure_clock() {
            Ok(clock) => clock,
            Err(e) => {
                self.set_state(PlaybackState::Stopped);
                return Err(e);
            }
        };

        let resumed = self.resume_clock(&clock);

        self.ensure_sounds(clock.sample_rate());

        let scheduler = LookaheadScheduler::new(
            Arc::clone(&clock),
            self.config.clone(),
            self.readout.clone(),
            self.bank.clone(),
            Arc::clone(&self.training_config),
            Arc::clone(&self.running),
        )
        .with_observers(Arc::clone(&self.observers));

        self.running.store(true, Ordering::SeqCst);
        self.spawn_scheduler(scheduler);

        if resumed {
            self.set_state(PlaybackState::Running);
            info!("playback started at {} BPM", self.config.tempo());
        } else {
            // Host policy can hold the clock suspended. Keep the thread
            // ticking; a later resume makes beats flow without a restart.
            self.set_state(PlaybackState::Suspended);
            warn!("clock did not resume; playback is suspended");
        }
        Ok(())
    }

    /// Stop playback and silence in-flight clicks. Idempotent.
    pub fn stop(&self) {
        if self.state() == PlaybackState::Stopped {
            return;
        }
        self.set_state(PlaybackState::Stopping);

        // Flag first: the scheduler thread re-checks between beats, so no
        // new clicks are committed while we tear down.
        self.running.store(false, Ordering::SeqCst);

        if let Ok(mut slot) = self.scheduler_thread.lock() {
            if let Some(handle) = slot.take() {
                if handle.thread().id() != thread::current().id() {
                    let _ = handle.join();
                }
            }
        }

        if let Ok(clock) = self.clock.lock() {
            if let Some(clock) = clock.as_ref() {
                clock.stop_all();
            }
        }
        if let Ok(output) = self.output.lock() {
            if let Some(output) = output.as_ref() {
                output.suspend();
            }
        }

        self.set_state(PlaybackState::Stopped);
        info!("playback stopped");
    }

    /// Resume a suspended transport. Goes through the owned audio output
    /// when one exists so the paused stream itself restarts.
    pub fn resume(&self) -> Result<(), EngineError> {
        if self.state() != PlaybackState::Suspended {
            return Ok(());
        }
        if let Ok(output) = self.output.lock() {
            if let Some(output) = output.as_ref() {
                output.resume()?;
                self.set_state(PlaybackState::Running);
                return Ok(());
            }
        }
        if let Ok(clock) = self.clock.lock() {
            if let Some(clock) = clock.as_ref() {
                clock.resume()?;
            }
        }
        self.set_state(PlaybackState::Running);
        Ok(())
    }

    /// Bring a non-running clock back before scheduling begins. The owned
    /// output must restart its stream; flipping the clock state atomic
    /// alone would leave the audio callback paused and `now()` frozen.
    fn resume_clock(&self, clock: &Arc<dyn Clock>) -> bool {
        if clock.state() == ClockState::Running {
            return true;
        }
        if let Ok(output) = self.output.lock() {
            if let Some(output) = output.as_ref() {
                return output.resume().is_ok();
            }
        }
        clock.resume().is_ok()
    }

    /// Swap the sound set without interrupting playback. Loading happens on
    /// a background thread; the new set is installed in one atomic swap and
    /// in-flight clicks finish on their old buffers.
    pub fn reload(&self, spec: SoundSetSpec) {
        self.set_sound_set(spec.clone());

        let sample_rate = match self.clock.lock() {
            Ok(clock) => clock.as_ref().map(|c| c.sample_rate()),
            Err(_) => None,
        };
        // No clock yet: the set loads on the next start.
        let Some(sample_rate) = sample_rate else {
            return;
        };

        let bank = self.bank.clone();
        thread::Builder::new()
            .name("sound-reload".to_string())
            .spawn(move || match load_click_set(&spec, sample_rate) {
                Ok(set) => {
                    bank.install(set);
                    info!("sound set '{}' installed", spec.name);
                }
                Err(e) => {
                    warn!("sound set '{}' failed to load, keeping current: {e}", spec.name);
                }
            })
            .ok();
    }

    /// Set the tempo from the UI surface; clamped, and announced to
    /// observers like every other tempo source
    pub fn set_tempo(&self, bpm: f32) {
        self.config.set_tempo(bpm);
        self.emit(&EngineEvent::TempoChanged {
            bpm: self.config.tempo(),
            source: TempoSource::Ui,
        });
    }

    /// Feed one tap into the tempo estimator; a committed estimate is
    /// applied immediately
    pub fn record_tap(&self) -> Option<u32> {
        let now_ms = self.epoch.elapsed().as_secs_f64() * 1000.0;
        let committed = self.tap.lock().ok()?.record_tap(now_ms)?;

        self.config.set_tempo(committed as f32);
        self.emit(&EngineEvent::TempoChanged {
            bpm: self.config.tempo(),
            source: TempoSource::TapTempo,
        });
        Some(committed)
    }

    /// One manual speed-up step (the user-facing "faster" control)
    pub fn accelerate_once(&self) {
        let percent = self
            .training_config
            .lock()
            .map(|cfg| cfg.tempo_increase_percent)
            .unwrap_or(5.0);

        let current = self.config.tempo();
        let next = manual_accelerate(current, percent);
        if next != current {
            self.config.set_tempo(next);
            self.emit(&EngineEvent::TempoChanged {
                bpm: self.config.tempo(),
                source: TempoSource::ManualSpeedUp,
            });
        }
    }

    fn set_state(&self, state: PlaybackState) {
        self.state.store(state.to_u8(), Ordering::Relaxed);
    }

    fn emit(&self, event: &EngineEvent) {
        if let Ok(observers) = self.observers.lock() {
            for observer in observers.iter() {
                observer(event);
            }
        }
    }

    /// Current clock, rebuilding the audio output when necessary
    fn ensure_clock(&self) -> Result<Arc<dyn Clock>, EngineError> {
        let mut slot = self
            .clock
            .lock()
            .map_err(|_| EngineError::ClockClosed)?;

        if let Some(clock) = slot.as_ref() {
            if clock.state() != ClockState::Closed {
                return Ok(Arc::clone(clock));
            }
            if self.external_clock {
                return Err(EngineError::ClockClosed);
            }
        }
        if self.external_clock {
            return Err(EngineError::ClockClosed);
        }

        // A closed clock means the device sample rate may have changed, so
        // decoded buffers must be rebuilt too.
        self.bank.clear();

        let output = AudioOutput::new()?;
        let clock: Arc<dyn Clock> = Arc::new(output.clock());
        if let Ok(mut output_slot) = self.output.lock() {
            *output_slot = Some(output);
        }
        *slot = Some(Arc::clone(&clock));
        Ok(clock)
    }

    /// Make sure a click set is installed before the first beat. File loads
    /// get a few attempts; synthesized clicks are the last resort so a start
    /// never fails for want of assets.
    fn ensure_sounds(&self, sample_rate: u32) {
        if self.bank.is_loaded() {
            return;
        }

        let spec = self.sound_spec.lock().ok().and_then(|s| s.clone());
        if let Some(spec) = spec {
            for attempt in 1..=MAX_LOAD_ATTEMPTS {
                match load_click_set(&spec, sample_rate) {
                    Ok(set) => {
                        self.bank.install(set);
                        return;
                    }
                    Err(e) => {
                        warn!(
                            "sound set '{}' load attempt {attempt}/{MAX_LOAD_ATTEMPTS} failed: {e}",
                            spec.name
                        );
                    }
                }
            }
        }
        self.bank.install(synthesize_click_set(sample_rate));
    }

    fn spawn_scheduler(&self, mut scheduler: LookaheadScheduler) {
        scheduler.reset_cursors();
        let running = Arc::clone(&self.running);

        let handle = thread::Builder::new()
            .name("beat-scheduler".to_string())
            .spawn(move || {
                while running.load(Ordering::Relaxed) {
                    scheduler.tick();
                    thread::sleep(TICK_INTERVAL);
                }
            })
            .ok();

        if let Ok(mut slot) = self.scheduler_thread.lock() {
            *slot = handle;
        }
    }
}

impl Default for PlaybackController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.stop();
    }
}
