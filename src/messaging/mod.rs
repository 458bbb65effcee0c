// Messaging module - Typed engine events and their lock-free channel

pub mod channels;
pub mod event;

pub use channels::{create_event_channel, EventConsumer, EventProducer};
pub use event::{EngineEvent, TempoSource};
