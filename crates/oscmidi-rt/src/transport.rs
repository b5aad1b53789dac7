//! Wiring the application handle to the realtime processor.

use std::sync::Arc;

use ringbuf::{traits::*, HeapRb};
use tracing::debug;

use crate::clock::{FrameClock, TransportClock};
use crate::config::TransportConfig;
use crate::error::CorruptEvent;
use crate::lockfree::AtomicShift;
use crate::midi::MidiMessage;
use crate::processor::RealtimeProcessor;
use crate::queue::{IncomingQueue, OutgoingQueue};
use crate::stats::{StatsSnapshot, TransportStats};
use crate::transpose::TransposeFilter;
use crate::Result;

/// Application-thread handle. Pairs with the [`RealtimeProcessor`] created
/// alongside it.
pub struct MidiTransport {
    outgoing: Option<OutgoingQueue>,
    incoming: Option<IncomingQueue>,
    shift: Arc<AtomicShift>,
    clock: Arc<dyn FrameClock>,
    stats: Arc<TransportStats>,
}

/// Builds both halves of a transport using a [`TransportClock`] driven by
/// the processor.
pub fn transport(config: &TransportConfig) -> Result<(MidiTransport, RealtimeProcessor)> {
    let clock = Arc::new(TransportClock::new(config.sample_rate));
    transport_with_clock(config, clock)
}

/// Builds both halves of a transport around a caller-supplied clock.
pub fn transport_with_clock(
    config: &TransportConfig,
    clock: Arc<dyn FrameClock>,
) -> Result<(MidiTransport, RealtimeProcessor)> {
    config.validate()?;
    clock.set_sample_rate(config.sample_rate);

    let stats = Arc::new(TransportStats::new());
    let shift = Arc::new(AtomicShift::default());

    let (ingress, incoming) = if config.use_input {
        let (producer, consumer) = HeapRb::<MidiMessage>::new(config.ring_capacity).split();
        (
            Some(producer),
            Some(IncomingQueue::new(consumer, Arc::clone(&stats))),
        )
    } else {
        (None, None)
    };

    let (outgoing, egress) = if config.use_output {
        let (producer, consumer) = HeapRb::<MidiMessage>::new(config.ring_capacity).split();
        (
            Some(OutgoingQueue::new(
                producer,
                Arc::clone(&clock),
                Arc::clone(&stats),
            )),
            Some(consumer),
        )
    } else {
        (None, None)
    };

    let filter = config.use_filter.then(TransposeFilter::new);

    debug!(
        client = %config.client_name,
        input = config.use_input,
        output = config.use_output,
        filter = config.use_filter,
        capacity = config.ring_capacity,
        "created MIDI transport"
    );

    let processor = RealtimeProcessor::new(
        ingress,
        egress,
        filter,
        Arc::clone(&shift),
        Arc::clone(&clock),
        Arc::clone(&stats),
    );
    let handle = MidiTransport {
        outgoing,
        incoming,
        shift,
        clock,
        stats,
    };
    Ok((handle, processor))
}

impl MidiTransport {
    /// See [`OutgoingQueue::enqueue_outgoing`]. False when output is disabled.
    pub fn enqueue_outgoing(&mut self, bytes: [u8; 3]) -> bool {
        self.outgoing
            .as_mut()
            .is_some_and(|queue| queue.enqueue_outgoing(bytes))
    }

    /// See [`IncomingQueue::dequeue_incoming`]. Always empty when input is
    /// disabled.
    pub fn dequeue_incoming(&mut self) -> std::result::Result<Option<MidiMessage>, CorruptEvent> {
        match self.incoming.as_mut() {
            Some(queue) => queue.dequeue_incoming(),
            None => Ok(None),
        }
    }

    /// Transpose amount the filter applies from its next block on.
    pub fn set_shift(&self, shift: i8) {
        self.shift.set(shift);
    }

    pub fn shift(&self) -> i8 {
        self.shift.get()
    }

    pub fn shift_handle(&self) -> Arc<AtomicShift> {
        Arc::clone(&self.shift)
    }

    pub fn frame_time(&self) -> u32 {
        self.clock.frame_time()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn has_input(&self) -> bool {
        self.incoming.is_some()
    }

    pub fn has_output(&self) -> bool {
        self.outgoing.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::processor::{BlockInfo, ProcessIo};
    use crate::port::MidiBuffer;
    use crate::Error;

    #[test]
    fn test_disabled_directions() {
        let config = TransportConfig {
            use_input: false,
            use_output: false,
            ..TransportConfig::default()
        };
        let (mut handle, processor) = transport(&config).unwrap();
        assert!(!handle.has_input() && !handle.has_output());
        assert!(!processor.uses_input() && !processor.uses_output());
        assert!(!handle.enqueue_outgoing([0x90, 60, 1]));
        assert_eq!(handle.dequeue_incoming(), Ok(None));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = TransportConfig {
            ring_capacity: 0,
            ..TransportConfig::default()
        };
        assert!(matches!(transport(&config), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_shift_reaches_processor() {
        let config = TransportConfig {
            use_filter: true,
            ..TransportConfig::default()
        };
        let (handle, mut processor) =
            transport_with_clock(&config, Arc::new(ManualClock::default())).unwrap();
        handle.set_shift(7);
        assert_eq!(handle.shift(), 7);
        assert_eq!(handle.shift_handle().get(), 7);

        let input = MidiBuffer::from_events([MidiMessage::new(0, [0x90, 60, 1], 3)]);
        let mut out = MidiBuffer::with_capacity(4);
        processor.process(
            BlockInfo {
                nframes: 32,
                last_frame_time: 0,
            },
            ProcessIo {
                filter_in: Some(&input),
                filter_out: Some(&mut out),
                ..ProcessIo::default()
            },
        );
        assert_eq!(out.events()[0].data[1], 67);
    }
}
