// Click mixer - Plays scheduled click buffers at exact sample positions
// Voices are committed by the scheduler thread; the audio callback mixes
// them into the output buffer and retires them once finished.

use std::sync::Arc;

use crate::sound::bank::ClickBuffer;

/// One scheduled click: a buffer, a gain, and the absolute sample position
/// at which its first sample must sound
struct ScheduledVoice {
    buffer: Arc<ClickBuffer>,
    gain: f32,
    start_sample: u64,
}

impl ScheduledVoice {
    fn end_sample(&self) -> u64 {
        self.start_sample + self.buffer.len() as u64
    }
}

/// Sample-accurate click mixer
///
/// Additive mixing: overlapping clicks (short intervals at high tempo) sum
/// rather than cutting each other off.
#[derive(Default)]
pub struct Mixer {
    voices: Vec<ScheduledVoice>,
}

impl Mixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a click to start at `start_sample` (absolute stream position)
    pub fn schedule(&mut self, buffer: Arc<ClickBuffer>, gain: f32, start_sample: u64) {
        self.voices.push(ScheduledVoice {
            buffer,
            gain,
            start_sample,
        });
    }

    /// Mix all active voices into an interleaved output buffer whose first
    /// frame sits at absolute position `buffer_start`. Mono click data is
    /// written to every channel. Must not allocate.
    pub fn mix_into(&mut self, data: &mut [f32], channels: usize, buffer_start: u64) {
        let channels = channels.max(1);
        let frames = data.len() / channels;

        for (frame_idx, frame) in data.chunks_mut(channels).enumerate() {
            let global = buffer_start + frame_idx as u64;
            let mut sample = 0.0f32;

            for voice in &self.voices {
                if global >= voice.start_sample {
                    let offset = (global - voice.start_sample) as usize;
                    if offset < voice.buffer.len() {
                        sample += voice.buffer.samples[offset] * voice.gain;
                    }
                }
            }

            for channel_sample in frame.iter_mut() {
                *channel_sample = sample;
            }
        }

        let buffer_end = buffer_start + frames as u64;
        self.voices.retain(|v| v.end_sample() > buffer_end);
    }

    /// Stop and release every voice (clean shutdown)
    pub fn stop_all(&mut self) {
        self.voices.clear();
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click(len: usize, value: f32) -> Arc<ClickBuffer> {
        Arc::new(ClickBuffer {
            samples: vec![value; len],
            sample_rate: 48_000,
        })
    }

    #[test]
    fn test_click_starts_at_exact_sample() {
        let mut mixer = Mixer::new();
        mixer.schedule(click(4, 0.5), 1.0, 10);

        let mut out = vec![0.0f32; 16];
        mixer.mix_into(&mut out, 1, 0);

        assert!(out[..10].iter().all(|&s| s == 0.0));
        assert_eq!(out[10], 0.5);
        assert_eq!(out[13], 0.5);
        assert_eq!(out[14], 0.0);
    }

    #[test]
    fn test_click_spans_callback_boundary() {
        let mut mixer = Mixer::new();
        mixer.schedule(click(8, 0.25), 1.0, 6);

        let mut first = vec![0.0f32; 8];
        mixer.mix_into(&mut first, 1, 0);
        assert_eq!(first[6], 0.25);
        assert_eq!(mixer.active_voices(), 1);

        let mut second = vec![0.0f32; 8];
        mixer.mix_into(&mut second, 1, 8);
        assert_eq!(second[0], 0.25);
        assert_eq!(second[5], 0.25);
        assert_eq!(second[6], 0.0);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_overlapping_clicks_sum() {
        let mut mixer = Mixer::new();
        mixer.schedule(click(4, 0.25), 1.0, 0);
        mixer.schedule(click(4, 0.25), 1.0, 2);

        let mut out = vec![0.0f32; 8];
        mixer.mix_into(&mut out, 1, 0);

        assert_eq!(out[0], 0.25);
        assert_eq!(out[2], 0.5);
        assert_eq!(out[5], 0.25);
    }

    #[test]
    fn test_gain_applied() {
        let mut mixer = Mixer::new();
        mixer.schedule(click(2, 1.0), 0.5, 0);

        let mut out = vec![0.0f32; 4];
        mixer.mix_into(&mut out, 1, 0);
        assert_eq!(out[0], 0.5);
    }

    #[test]
    fn test_stereo_duplicates_mono() {
        let mut mixer = Mixer::new();
        mixer.schedule(click(2, 0.3), 1.0, 0);

        let mut out = vec![0.0f32; 8];
        mixer.mix_into(&mut out, 2, 0);
        assert_eq!(out[0], 0.3);
        assert_eq!(out[1], 0.3);
    }

    #[test]
    fn test_stop_all_clears_voices() {
        let mut mixer = Mixer::new();
        mixer.schedule(click(100, 0.5), 1.0, 0);
        mixer.schedule(click(100, 0.5), 1.0, 50);
        assert_eq!(mixer.active_voices(), 2);

        mixer.stop_all();
        assert_eq!(mixer.active_voices(), 0);

        let mut out = vec![1.0f32; 8];
        mixer.mix_into(&mut out, 1, 0);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
