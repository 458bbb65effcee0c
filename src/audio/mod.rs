// Audio module - Clock abstraction, mixing and CPAL output

pub mod clock;
pub mod mixer;
pub mod output;
pub mod parameters;

pub use clock::{Clock, ClockState, OfflineClock};
pub use output::{AudioOutput, CpalClock};
