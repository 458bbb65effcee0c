// Error taxonomy for the metronome engine
// Everything here is handled locally by the controller; the scheduling loop
// itself never propagates errors upward during normal operation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// No output device available on this host (unsupported environment).
    #[error("no audio output device found")]
    NoOutputDevice,

    #[error("failed to query default stream config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("unsupported sample format: {0:?}")]
    UnsupportedFormat(cpal::SampleFormat),

    /// The clock source has been closed and cannot be resumed.
    #[error("clock source is closed")]
    ClockClosed,

    #[error("failed to decode click sample: {0}")]
    Decode(#[from] hound::Error),

    #[error("failed to read sound set: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse sound set description: {0}")]
    SoundSet(#[from] serde_json::Error),
}
