// Tap tempo - BPM estimation from user-supplied tap timestamps
// Instance state only, so independent estimators (one per metronome mode)
// never interfere with each other.

use crate::engine::interval::{clamp_tempo, TEMPO_MAX, TEMPO_MIN};

/// Taps closer together than this are treated as switch bounce and ignored
const MIN_TAP_INTERVAL_MS: f64 = 150.0;

/// A pause longer than this starts a fresh tapping session
const MAX_TAP_INTERVAL_MS: f64 = 2000.0;

/// History capacity; older taps fall off
const MAX_TAPS: usize = 5;

/// Taps needed before an estimate is committed; earlier taps refine silently
const COMMIT_TAPS: usize = 4;

/// Intervals deviating more than this fraction from the median are discarded
const OUTLIER_TOLERANCE: f64 = 0.4;

/// Snap to a common tempo when within this fraction of it
const SNAP_TOLERANCE: f64 = 0.05;

/// Familiar practice tempos; noisy human tapping stabilizes onto these
const COMMON_TEMPOS: [f64; 7] = [60.0, 90.0, 100.0, 120.0, 140.0, 160.0, 180.0];

/// Stateful tap-tempo estimator
#[derive(Debug, Default)]
pub struct TapTempo {
    taps_ms: Vec<f64>,
}

impl TapTempo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of taps currently in the session history
    pub fn tap_count(&self) -> usize {
        self.taps_ms.len()
    }

    pub fn reset(&mut self) {
        self.taps_ms.clear();
    }

    /// Record a tap at `timestamp_ms` (any monotonic millisecond clock).
    ///
    /// Returns the committed tempo once enough taps have accumulated;
    /// debounced or merely-refining taps return `None`.
    pub fn record_tap(&mut self, timestamp_ms: f64) -> Option<u32> {
        if let Some(&last) = self.taps_ms.last() {
            let since_last = timestamp_ms - last;
            if since_last < MIN_TAP_INTERVAL_MS {
                return None;
            }
            if since_last > MAX_TAP_INTERVAL_MS {
                self.taps_ms.clear();
            }
        }

        self.taps_ms.push(timestamp_ms);
        while self.taps_ms.len() > MAX_TAPS {
            self.taps_ms.remove(0);
        }

        if self.taps_ms.len() < COMMIT_TAPS {
            return None;
        }
        self.estimate()
    }

    /// Current estimate without the commit threshold; needs at least 2 taps
    pub fn preview(&self) -> Option<u32> {
        if self.taps_ms.len() < 2 {
            return None;
        }
        self.estimate()
    }

    fn estimate(&self) -> Option<u32> {
        let intervals: Vec<f64> = self
            .taps_ms
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect();
        if intervals.is_empty() {
            return None;
        }

        let filtered = reject_outliers(&intervals);
        let avg_ms = filtered.iter().sum::<f64>() / filtered.len() as f64;
        if avg_ms <= 0.0 {
            return None;
        }

        let bpm = snap_to_common_tempo(60_000.0 / avg_ms);
        let rounded = bpm.round() as f32;
        Some(clamp_tempo(rounded) as u32)
    }
}

/// Median-based outlier rejection. With fewer than 3 intervals there is no
/// meaningful median; the unfiltered set also wins when filtering would
/// leave fewer than 2 intervals.
fn reject_outliers(intervals: &[f64]) -> Vec<f64> {
    if intervals.len() < 3 {
        return intervals.to_vec();
    }

    let mut sorted = intervals.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };

    let filtered: Vec<f64> = intervals
        .iter()
        .copied()
        .filter(|&i| (i - median).abs() <= OUTLIER_TOLERANCE * median)
        .collect();

    if filtered.len() < 2 {
        intervals.to_vec()
    } else {
        filtered
    }
}

fn snap_to_common_tempo(bpm: f64) -> f64 {
    for &reference in &COMMON_TEMPOS {
        if (bpm - reference).abs() <= SNAP_TOLERANCE * reference {
            return reference;
        }
    }
    bpm.clamp(TEMPO_MIN as f64, TEMPO_MAX as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tap_evenly(tap: &mut TapTempo, count: usize, interval_ms: f64) -> Option<u32> {
        let mut committed = None;
        for i in 0..count {
            committed = tap.record_tap(i as f64 * interval_ms);
        }
        committed
    }

    #[test]
    fn test_exact_taps_round_trip_common_tempos() {
        for bpm in [60u32, 90, 100, 120, 140, 160, 180] {
            let mut tap = TapTempo::new();
            let interval = 60_000.0 / bpm as f64;
            let committed = tap_evenly(&mut tap, 5, interval);
            assert_eq!(committed, Some(bpm), "bpm={bpm}");
        }
    }

    #[test]
    fn test_uncommon_tempo_not_snapped() {
        let mut tap = TapTempo::new();
        // 200 BPM = 300ms intervals; outside 5% of every reference tempo.
        let committed = tap_evenly(&mut tap, 5, 300.0);
        assert_eq!(committed, Some(200));
    }

    #[test]
    fn test_near_common_tempo_snaps() {
        let mut tap = TapTempo::new();
        // 122-ish BPM: within 5% of 120, should stabilize onto it.
        let committed = tap_evenly(&mut tap, 5, 492.0);
        assert_eq!(committed, Some(120));
    }

    #[test]
    fn test_debounce_drops_rapid_second_tap() {
        let mut tap = TapTempo::new();
        tap.record_tap(0.0);
        tap.record_tap(50.0);
        assert_eq!(tap.tap_count(), 1);
    }

    #[test]
    fn test_long_pause_resets_session() {
        let mut tap = TapTempo::new();
        tap.record_tap(0.0);
        tap.record_tap(500.0);
        tap.record_tap(1000.0);
        assert_eq!(tap.tap_count(), 3);

        tap.record_tap(10_000.0);
        assert_eq!(tap.tap_count(), 1);
    }

    #[test]
    fn test_no_commit_before_threshold() {
        let mut tap = TapTempo::new();
        assert_eq!(tap.record_tap(0.0), None);
        assert_eq!(tap.record_tap(500.0), None);
        assert_eq!(tap.record_tap(1000.0), None);
        // Preview is available from two taps on.
        assert_eq!(tap.preview(), Some(120));
        // Fourth tap commits.
        assert_eq!(tap.record_tap(1500.0), Some(120));
    }

    #[test]
    fn test_outlier_interval_rejected() {
        let mut tap = TapTempo::new();
        tap.record_tap(0.0);
        tap.record_tap(500.0);
        tap.record_tap(1000.0);
        // One sluggish tap: 900ms interval, 80% above the 500ms median.
        tap.record_tap(1900.0);
        let committed = tap.record_tap(2400.0);
        // The 900ms interval is discarded; remaining 500ms intervals => 120.
        assert_eq!(committed, Some(120));
    }

    #[test]
    fn test_history_capped() {
        let mut tap = TapTempo::new();
        for i in 0..20 {
            tap.record_tap(i as f64 * 500.0);
        }
        assert_eq!(tap.tap_count(), MAX_TAPS);
    }

    #[test]
    fn test_result_clamped_to_valid_range() {
        let mut tap = TapTempo::new();
        // 160ms intervals = 375 BPM, above range but not debounced.
        let committed = tap_evenly(&mut tap, 5, 160.0);
        assert_eq!(committed, Some(240));
    }

    #[test]
    fn test_independent_estimators_do_not_interfere() {
        let mut a = TapTempo::new();
        let mut b = TapTempo::new();
        tap_evenly(&mut a, 5, 500.0);
        assert_eq!(b.tap_count(), 0);
        assert_eq!(b.preview(), None);
    }
}
