// Click loader - Decodes WAV click assets or synthesizes fallback clicks
// Everything is converted to mono f32 at the device sample rate before it
// reaches the bank.

use hound::WavReader;
use log::warn;
use std::f32::consts::PI;
use std::path::Path;
use std::sync::Arc;

use crate::error::EngineError;
use crate::sound::bank::{ClickBuffer, ClickSet, SoundSetSpec};

/// Duration of a synthesized click in milliseconds
const CLICK_DURATION_MS: f32 = 10.0;

/// Load a WAV file into a mono click buffer at the target sample rate
pub fn load_click(path: &Path, target_rate: u32) -> Result<ClickBuffer, EngineError> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .filter_map(Result::ok)
            .collect(),
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .filter_map(Result::ok)
                .map(|s| s as f32 * scale)
                .collect()
        }
    };

    let mono = downmix_to_mono(&samples, channels);
    let resampled = resample_linear(&mono, spec.sample_rate, target_rate);

    Ok(ClickBuffer {
        samples: resampled,
        sample_rate: target_rate,
    })
}

/// Load a full click set from a sound-set description
pub fn load_click_set(spec: &SoundSetSpec, target_rate: u32) -> Result<ClickSet, EngineError> {
    Ok(ClickSet {
        normal: Arc::new(load_click(&spec.normal_path, target_rate)?),
        accent: Arc::new(load_click(&spec.accent_path, target_rate)?),
        first: Arc::new(load_click(&spec.first_path, target_rate)?),
    })
}

/// Load from a sound-set description, falling back to synthesized clicks if
/// any asset is missing or undecodable. Timing must never go silent because
/// an asset failed to load.
pub fn load_or_synthesize(spec: Option<&SoundSetSpec>, target_rate: u32) -> ClickSet {
    if let Some(spec) = spec {
        match load_click_set(spec, target_rate) {
            Ok(set) => return set,
            Err(e) => {
                warn!("sound set '{}' failed to load, using synthesized clicks: {e}", spec.name);
            }
        }
    }
    synthesize_click_set(target_rate)
}

/// Generate a short click using a sine burst with an exponential decay
/// envelope. Higher frequency and amplitude for the more emphasized clicks.
pub fn generate_click(sample_rate: u32, frequency: f32, amplitude: f32) -> ClickBuffer {
    let num_samples = ((CLICK_DURATION_MS / 1000.0) * sample_rate as f32) as usize;
    let phase_increment = 2.0 * PI * frequency / sample_rate as f32;

    let mut samples = Vec::with_capacity(num_samples);
    for i in 0..num_samples {
        let t = i as f32 / num_samples as f32;
        let envelope = (-t * 8.0).exp();
        let phase = i as f32 * phase_increment;
        samples.push(phase.sin() * envelope * amplitude);
    }

    ClickBuffer {
        samples,
        sample_rate,
    }
}

/// Synthesized click set: distinct pitch per accent class so the three
/// emphasis levels stay audibly distinguishable without any assets on disk
pub fn synthesize_click_set(sample_rate: u32) -> ClickSet {
    ClickSet {
        normal: Arc::new(generate_click(sample_rate, 800.0, 0.4)),
        accent: Arc::new(generate_click(sample_rate, 1200.0, 0.6)),
        first: Arc::new(generate_click(sample_rate, 1600.0, 0.7)),
    }
}

fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || input.is_empty() {
        return input.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((input.len() as f64) / ratio).round() as usize;

    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let idx = pos as usize;
        let frac = (pos - idx as f64) as f32;
        let a = input[idx.min(input.len() - 1)];
        let b = input[(idx + 1).min(input.len() - 1)];
        out.push(a + (b - a) * frac);
    }
    out
}
