// Interval calculator - Pure timing math for the scheduler
// Stateless by design: callable at any rate without accumulating drift.

/// Valid tempo range in BPM
pub const TEMPO_MIN: f32 = 15.0;
pub const TEMPO_MAX: f32 = 240.0;

/// Returned when the tempo is degenerate (zero, negative, NaN)
pub const FALLBACK_INTERVAL_SECONDS: f64 = 0.5;

/// Clamp a tempo into the valid range. NaN maps to the minimum.
pub fn clamp_tempo(bpm: f32) -> f32 {
    if bpm.is_nan() {
        return TEMPO_MIN;
    }
    bpm.clamp(TEMPO_MIN, TEMPO_MAX)
}

/// Seconds until the next subdivision.
///
/// `beat_multiplier` scales the effective pulse (1 = quarter, 2 = eighth).
/// Swing applies only with at least two subdivisions: even-indexed hits are
/// lengthened by `(1 + swing)`, odd-indexed shortened by `(1 - swing)`.
pub fn interval_seconds(
    tempo_bpm: f32,
    beat_multiplier: u32,
    subdivisions: usize,
    swing: f32,
    sub_index: usize,
) -> f64 {
    if !tempo_bpm.is_finite() || tempo_bpm <= 0.0 {
        return FALLBACK_INTERVAL_SECONDS;
    }

    let seconds_per_beat = 60.0 / tempo_bpm as f64;
    let seconds_per_hit = seconds_per_beat / beat_multiplier.max(1) as f64;

    if subdivisions >= 2 && swing > 0.0 {
        if sub_index % 2 == 0 {
            seconds_per_hit * (1.0 + swing as f64)
        } else {
            seconds_per_hit * (1.0 - swing as f64)
        }
    } else {
        seconds_per_hit
    }
}
