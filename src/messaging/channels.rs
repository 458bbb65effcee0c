// Lock-free event channel between the scheduler thread and the UI

use crate::messaging::event::EngineEvent;
use ringbuf::{traits::Split, HeapRb};

pub type EventProducer = ringbuf::HeapProd<EngineEvent>;
pub type EventConsumer = ringbuf::HeapCons<EngineEvent>;

pub fn create_event_channel(capacity: usize) -> (EventProducer, EventConsumer) {
    let rb = HeapRb::<EngineEvent>::new(capacity);
    rb.split()
}
