//! The realtime callback.
//!
//! [`RealtimeProcessor::process`] runs once per audio block on the driver
//! thread. It never allocates, locks or blocks: every failure is a counter
//! increment in [`TransportStats`].

use std::ops::ControlFlow;
use std::sync::Arc;

use ringbuf::{traits::*, HeapCons, HeapProd};

use crate::clock::FrameClock;
use crate::lockfree::AtomicShift;
use crate::midi::MidiMessage;
use crate::port::{MidiSink, MidiSource};
use crate::stats::TransportStats;
use crate::transpose::TransposeFilter;

/// Timing of the block being processed, as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub nframes: u32,
    /// Frame time at the start of this block.
    pub last_frame_time: u32,
}

/// Port buffers for one block. A missing port skips its stage.
#[derive(Default)]
pub struct ProcessIo<'a> {
    pub midi_in: Option<&'a dyn MidiSource>,
    pub midi_out: Option<&'a mut dyn MidiSink>,
    pub filter_in: Option<&'a dyn MidiSource>,
    pub filter_out: Option<&'a mut dyn MidiSink>,
}

pub struct RealtimeProcessor {
    ingress: Option<HeapProd<MidiMessage>>,
    egress: Option<HeapCons<MidiMessage>>,
    filter: Option<TransposeFilter>,
    shift: Arc<AtomicShift>,
    clock: Arc<dyn FrameClock>,
    stats: Arc<TransportStats>,
}

impl RealtimeProcessor {
    pub(crate) fn new(
        ingress: Option<HeapProd<MidiMessage>>,
        egress: Option<HeapCons<MidiMessage>>,
        filter: Option<TransposeFilter>,
        shift: Arc<AtomicShift>,
        clock: Arc<dyn FrameClock>,
        stats: Arc<TransportStats>,
    ) -> Self {
        Self {
            ingress,
            egress,
            filter,
            shift,
            clock,
            stats,
        }
    }

    pub fn uses_input(&self) -> bool {
        self.ingress.is_some()
    }

    pub fn uses_output(&self) -> bool {
        self.egress.is_some()
    }

    pub fn uses_filter(&self) -> bool {
        self.filter.is_some()
    }

    /// Forwarded to the clock so frame time extrapolation matches the driver.
    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.clock.set_sample_rate(sample_rate);
    }

    /// Capture input, run the transpose filter, then drain queued output.
    pub fn process(&mut self, block: BlockInfo, io: ProcessIo<'_>) {
        self.clock.block_started(block.last_frame_time);

        if let (Some(producer), Some(source)) = (self.ingress.as_mut(), io.midi_in) {
            capture_input(producer, source, &self.stats);
        }

        if let (Some(filter), Some(input), Some(output)) =
            (self.filter.as_mut(), io.filter_in, io.filter_out)
        {
            if filter.process(self.shift.get(), input, output).is_err() {
                self.stats.record_filter_dropped();
            }
        }

        if let (Some(consumer), Some(sink)) = (self.egress.as_mut(), io.midi_out) {
            drain_output(consumer, block, sink, &self.stats);
        }
    }
}

fn capture_input(
    producer: &mut HeapProd<MidiMessage>,
    source: &dyn MidiSource,
    stats: &TransportStats,
) {
    source.for_each_event(&mut |event| {
        // Longer events are system exclusive; not carried.
        if let Some(msg) = MidiMessage::from_bytes(event.time, event.bytes) {
            if producer.try_push(msg).is_err() {
                stats.record_ingress_dropped();
            }
        }
        ControlFlow::Continue(())
    });
}

/// Writes every queued event that falls inside this block.
///
/// An event stamped at `time` goes out at `time + nframes - last_frame_time`.
/// Events for a later block stay queued; events that already missed their
/// block go out at offset 0.
fn drain_output(
    consumer: &mut HeapCons<MidiMessage>,
    block: BlockInfo,
    sink: &mut dyn MidiSink,
    stats: &TransportStats,
) {
    sink.clear();
    while let Some(msg) = consumer.try_peek().copied() {
        if !msg.is_valid() {
            consumer.skip(1);
            stats.record_corrupt();
            continue;
        }

        let offset = msg
            .time
            .wrapping_add(block.nframes)
            .wrapping_sub(block.last_frame_time) as i32;
        if offset >= block.nframes as i32 {
            break;
        }
        let late = offset < 0;

        if sink.write(offset.max(0) as u32, msg.bytes()).is_err() {
            break;
        }
        consumer.skip(1);
        if late {
            stats.record_late();
        }
    }
}
