// CPAL output - Real-time callback that renders scheduled clicks
//
// The callback supports F32/I16/U16 devices: clicks are mixed in f32 and
// converted to the device format on write. The `cpal::Stream` is not `Send`
// on every platform, so it stays with the controller; the scheduler thread
// only ever holds the `CpalClock` handle, which is `Send + Sync`.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use log::{error, info};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crate::audio::clock::{Clock, ClockState};
use crate::audio::mixer::Mixer;
use crate::error::EngineError;
use crate::sound::bank::ClickBuffer;

/// Pre-sized mixing scratch; callbacks larger than this trigger one resize
const SCRATCH_FRAMES: usize = 8192;

/// Sendable handle onto the live audio clock
///
/// Time is derived from the stream's sample counter, so `now()` moves in
/// lockstep with what the listener hears, not with the wall clock.
#[derive(Clone)]
pub struct CpalClock {
    sample_position: Arc<AtomicU64>,
    state: Arc<AtomicU8>,
    mixer: Arc<Mutex<Mixer>>,
    sample_rate: u32,
}

impl CpalClock {
    fn new(sample_rate: u32) -> Self {
        Self {
            sample_position: Arc::new(AtomicU64::new(0)),
            state: Arc::new(AtomicU8::new(ClockState::Suspended.to_u8())),
            mixer: Arc::new(Mutex::new(Mixer::new())),
            sample_rate,
        }
    }

    fn set_state(&self, state: ClockState) {
        self.state.store(state.to_u8(), Ordering::Relaxed);
    }
}

impl Clock for CpalClock {
    fn now(&self) -> f64 {
        self.sample_position.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
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
        // Past times clamp to the next sample the callback will render.
        let when = when.max(self.now());
        let start_sample = (when * self.sample_rate as f64).round() as u64;
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.schedule(buffer, gain, start_sample);
        }
    }

    fn stop_all(&self) {
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.stop_all();
        }
    }

    fn active_voices(&self) -> usize {
        self.mixer.lock().map(|m| m.active_voices()).unwrap_or(0)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Owns the CPAL device and stream; hands out `CpalClock` handles
pub struct AudioOutput {
    _device: Device,
    _stream: Stream,
    clock: CpalClock,
}

impl AudioOutput {
    /// Open the default output device and start the stream
    pub fn new() -> Result<Self, EngineError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(EngineError::NoOutputDevice)?;

        let supported_config = device.default_output_config()?;
        let sample_format = supported_config.sample_format();
        let sample_rate = supported_config.sample_rate().0;
        let channels = supported_config.channels() as usize;
        let config: StreamConfig = supported_config.into();

        let clock = CpalClock::new(sample_rate);

        let stream = match sample_format {
            SampleFormat::F32 => Self::build_stream::<f32>(&device, &config, channels, &clock),
            SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, channels, &clock),
            SampleFormat::U16 => Self::build_stream::<u16>(&device, &config, channels, &clock),
            other => return Err(EngineError::UnsupportedFormat(other)),
        }?;

        stream.play()?;
        clock.set_state(ClockState::Running);

        info!(
            "audio output started: {} Hz, {} channel(s), {:?}",
            sample_rate, channels, sample_format
        );

        Ok(Self {
            _device: device,
            _stream: stream,
            clock,
        })
    }

    /// Sendable clock handle for the scheduler thread
    pub fn clock(&self) -> CpalClock {
        self.clock.clone()
    }

    /// Pause the stream and mark the clock suspended
    pub fn suspend(&self) {
        let _ = self._stream.pause();
        self.clock.set_state(ClockState::Suspended);
    }

    /// Restart a suspended stream
    pub fn resume(&self) -> Result<(), EngineError> {
        if self.clock.state() == ClockState::Closed {
            return Err(EngineError::ClockClosed);
        }
        self._stream.play()?;
        self.clock.set_state(ClockState::Running);
        Ok(())
    }

    /// Build an output stream with automatic format conversion
    ///
    /// The callback mixes in f32 and converts on write via `FromSample<f32>`.
    /// No I/O and no blocking locks inside; a contended mixer lock yields one
    /// silent callback rather than a stall.
    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        channels: usize,
        clock: &CpalClock,
    ) -> Result<Stream, EngineError>
    where
        T: SizedSample + FromSample<f32> + Send + 'static,
    {
        let sample_position = Arc::clone(&clock.sample_position);
        let mixer = Arc::clone(&clock.mixer);
        let mut scratch = vec![0.0f32; SCRATCH_FRAMES * channels];

        let stream = device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels.max(1);
                let buffer_start = sample_position.load(Ordering::Relaxed);

                if scratch.len() < data.len() {
                    scratch.resize(data.len(), 0.0);
                }
                let scratch = &mut scratch[..data.len()];

                if let Ok(mut mixer) = mixer.try_lock() {
                    mixer.mix_into(scratch, channels, buffer_start);
                } else {
                    for s in scratch.iter_mut() {
                        *s = 0.0;
                    }
                }

                for (dst, src) in data.iter_mut().zip(scratch.iter()) {
                    *dst = T::from_sample(*src);
                }

                sample_position.fetch_add(frames as u64, Ordering::Relaxed);
            },
            move |err| {
                // Runs outside the audio callback, so logging is fine here.
                error!("audio stream error: {err}");
            },
            None,
        )?;

        Ok(stream)
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.clock.stop_all();
        self.clock.set_state(ClockState::Closed);
    }
}
