//! Application side of the ingress and egress ring buffers.

use std::sync::Arc;

use ringbuf::{traits::*, HeapCons, HeapProd};
use tracing::debug;

use crate::clock::FrameClock;
use crate::error::CorruptEvent;
use crate::midi::{message_len, MidiMessage};
use crate::stats::TransportStats;

/// Producer end of the egress ring. Stamps every message with the clock's
/// current frame time.
pub struct OutgoingQueue {
    producer: HeapProd<MidiMessage>,
    clock: Arc<dyn FrameClock>,
    stats: Arc<TransportStats>,
}

impl OutgoingQueue {
    pub(crate) fn new(
        producer: HeapProd<MidiMessage>,
        clock: Arc<dyn FrameClock>,
        stats: Arc<TransportStats>,
    ) -> Self {
        Self {
            producer,
            clock,
            stats,
        }
    }

    /// Queue a message for the next realtime block.
    ///
    /// The status byte decides how many bytes are sent. Returns false if the
    /// status is not sendable or the ring is full; neither blocks.
    pub fn enqueue_outgoing(&mut self, bytes: [u8; 3]) -> bool {
        let Some(len) = message_len(bytes[0]) else {
            debug!(status = bytes[0], "refusing to send unsupported MIDI status");
            return false;
        };
        let msg = MidiMessage::new(self.clock.frame_time(), bytes, len);
        if self.producer.try_push(msg).is_err() {
            self.stats.record_egress_dropped();
            debug!(?bytes, "egress ring buffer full, MIDI lost");
            return false;
        }
        true
    }

    /// Free slots left in the ring.
    #[inline]
    pub fn vacant(&self) -> usize {
        self.producer.vacant_len()
    }
}

/// Consumer end of the ingress ring.
pub struct IncomingQueue {
    consumer: HeapCons<MidiMessage>,
    stats: Arc<TransportStats>,
}

impl IncomingQueue {
    pub(crate) fn new(consumer: HeapCons<MidiMessage>, stats: Arc<TransportStats>) -> Self {
        Self { consumer, stats }
    }

    /// Pop the oldest received message.
    ///
    /// A malformed entry is skipped and reported for this call only; the
    /// next call continues with the following entry.
    pub fn dequeue_incoming(&mut self) -> Result<Option<MidiMessage>, CorruptEvent> {
        match self.consumer.try_pop() {
            None => Ok(None),
            Some(msg) if msg.is_valid() => Ok(Some(msg)),
            Some(msg) => {
                self.stats.record_corrupt();
                Err(CorruptEvent { len: msg.len })
            }
        }
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.consumer.occupied_len()
    }
}
