// Clock source abstraction
// A clock exposes "current time" in seconds against a monotonic audio-rate
// timebase, and accepts click buffers to start at exact future times. The
// scheduler only ever talks to this trait, so tests and benches run against
// an offline implementation with no audio hardware.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crate::audio::parameters::AtomicF64;
use crate::error::EngineError;
use crate::sound::bank::ClickBuffer;

/// Lifecycle state of a clock source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    /// Advancing; scheduling is live.
    Running,
    /// Paused by host policy; can be resumed.
    Suspended,
    /// Torn down; a fresh clock must be constructed.
    Closed,
}

impl ClockState {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            ClockState::Running => 0,
            ClockState::Suspended => 1,
            ClockState::Closed => 2,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            0 => ClockState::Running,
            1 => ClockState::Suspended,
            _ => ClockState::Closed,
        }
    }
}

/// Monotonic audio clock with sample-accurate future scheduling
pub trait Clock: Send + Sync {
    /// Current clock time in seconds
    fn now(&self) -> f64;

    fn state(&self) -> ClockState;

    /// Attempt to resume a suspended clock. Failure is tolerated by callers;
    /// a closed clock reports `ClockClosed` and must be rebuilt instead.
    fn resume(&self) -> Result<(), EngineError>;

    /// Commit a click buffer to start exactly at `when` (clock seconds).
    /// Times already in the past are clamped by the implementation.
    fn schedule_click(&self, buffer: Arc<ClickBuffer>, gain: f32, when: f64);

    /// Stop and release every scheduled-but-unfinished click
    fn stop_all(&self);

    /// Number of in-flight click voices (for shutdown accounting)
    fn active_voices(&self) -> usize;

    /// Sample rate of the underlying timebase
    fn sample_rate(&self) -> u32;
}

/// A click committed to an offline clock, recorded for inspection
#[derive(Clone)]
pub struct OfflineClick {
    pub when: f64,
    pub gain: f32,
    pub buffer: Arc<ClickBuffer>,
}

/// Manually advanced clock for tests and benches
///
/// Records every scheduled click instead of producing sound. Time only moves
/// when the test calls `advance`, which makes late-timer scenarios exact.
pub struct OfflineClock {
    time: AtomicF64,
    state: AtomicU8,
    sample_rate: u32,
    scheduled: Mutex<Vec<OfflineClick>>,
}

impl OfflineClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            time: AtomicF64::new(0.0),
            state: AtomicU8::new(ClockState::Running.to_u8()),
            sample_rate,
            scheduled: Mutex::new(Vec::new()),
        }
    }

    /// Move the clock forward by `dt` seconds
    pub fn advance(&self, dt: f64) {
        self.time.set(self.time.get() + dt);
    }

    pub fn set_state(&self, state: ClockState) {
        self.state.store(state.to_u8(), Ordering::Relaxed);
    }

    /// Snapshot of everything scheduled so far
    pub fn scheduled(&self) -> Vec<OfflineClick> {
        self.scheduled.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Drain the recorded clicks, leaving the log empty
    pub fn take_scheduled(&self) -> Vec<OfflineClick> {
        self.scheduled
            .lock()
            .map(|mut v| std::mem::take(&mut *v))
            .unwrap_or_default()
    }
}

impl Clock for OfflineClock {
    fn now(&self) -> f64 {
        self.time.get()
    }

    fn state(&self) -> ClockState {
        ClockState::from_u8(self.state.load(Ordering::Relaxed))
    }

    fn resume(&self) -> Result<(), EngineError> {
        match self.state() {
            ClockState::Closed => Err(EngineError::ClockClosed),
            _ => {
                self.set_state(ClockState::Running);
                Ok(())
            }
        }
    }

    fn schedule_click(&self, buffer: Arc<ClickBuffer>, gain: f32, when: f64) {
        if self.state() != ClockState::Running {
            return;
        }
        if let Ok(mut scheduled) = self.scheduled.lock() {
            scheduled.push(OfflineClick { when, gain, buffer });
        }
    }

    fn stop_all(&self) {
        if let Ok(mut scheduled) = self.scheduled.lock() {
            scheduled.clear();
        }
    }

    fn active_voices(&self) -> usize {
        self.scheduled.lock().map(|v| v.len()).unwrap_or(0)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
