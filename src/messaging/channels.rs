// Channels - Lock-free SPSC rings between the control, input and scheduler threads
// Each ring is owned by its two ends, one producer and one consumer

use crate::messaging::command::{EngineCommand, RawMidi};
use crate::messaging::notification::Notification;
use ringbuf::{HeapRb, traits::Split};

pub type EngineProducer = ringbuf::HeapProd<EngineCommand>;
pub type EngineConsumer = ringbuf::HeapCons<EngineCommand>;

pub fn create_engine_channel(capacity: usize) -> (EngineProducer, EngineConsumer) {
    let rb = HeapRb::<EngineCommand>::new(capacity);
    rb.split()
}

pub type InputProducer = ringbuf::HeapProd<RawMidi>;
pub type InputConsumer = ringbuf::HeapCons<RawMidi>;

pub fn create_input_channel(capacity: usize) -> (InputProducer, InputConsumer) {
    let rb = HeapRb::<RawMidi>::new(capacity);
    rb.split()
}

pub type NotificationProducer = ringbuf::HeapProd<Notification>;
pub type NotificationConsumer = ringbuf::HeapCons<Notification>;

pub fn create_notification_channel(
    capacity: usize,
) -> (NotificationProducer, NotificationConsumer) {
    let rb = HeapRb::<Notification>::new(capacity);
    rb.split()
}
