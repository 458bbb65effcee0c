// Sound module - Click buffers, the shared bank and the WAV loader

pub mod bank;
pub mod loader;

pub use bank::{ClickBuffer, ClickSet, SoundBank, SoundSetSpec};
pub use loader::{load_click_set, load_or_synthesize, synthesize_click_set};
