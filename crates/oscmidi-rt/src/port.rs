//! Driver-neutral view of the MIDI ports the realtime callback touches.
//!
//! A driver backend adapts its port buffers to [`MidiSource`] and
//! [`MidiSink`]; [`MidiBuffer`] is an in-memory port for offline processing
//! and tests.

use std::ops::ControlFlow;

use crate::error::SinkFull;
use crate::midi::MidiMessage;

/// One event in a port buffer, timestamped relative to the block start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent<'a> {
    pub time: u32,
    pub bytes: &'a [u8],
}

/// Events arriving on an input port during the current block.
pub trait MidiSource {
    /// Visits events in time order until `f` breaks.
    fn for_each_event(&self, f: &mut dyn FnMut(RawEvent<'_>) -> ControlFlow<()>);
}

/// An output port for the current block.
pub trait MidiSink {
    /// Forget anything written so far this block.
    fn clear(&mut self) {}

    /// Reserve space for `bytes` at block offset `time` and copy them in.
    fn write(&mut self, time: u32, bytes: &[u8]) -> Result<(), SinkFull>;
}

/// Fixed-capacity port buffer.
#[derive(Debug, Clone)]
pub struct MidiBuffer {
    events: Vec<MidiMessage>,
    capacity: usize,
}

impl MidiBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn from_events(events: impl IntoIterator<Item = MidiMessage>) -> Self {
        let events: Vec<_> = events.into_iter().collect();
        let capacity = events.len();
        Self { events, capacity }
    }

    pub fn events(&self) -> &[MidiMessage] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl MidiSource for MidiBuffer {
    fn for_each_event(&self, f: &mut dyn FnMut(RawEvent<'_>) -> ControlFlow<()>) {
        for msg in &self.events {
            let event = RawEvent {
                time: msg.time,
                bytes: msg.bytes(),
            };
            if f(event).is_break() {
                break;
            }
        }
    }
}

impl MidiSink for MidiBuffer {
    fn clear(&mut self) {
        self.events.clear();
    }

    /// Messages longer than three bytes do not fit a [`MidiMessage`] and
    /// are rejected like a full buffer.
    fn write(&mut self, time: u32, bytes: &[u8]) -> Result<(), SinkFull> {
        if self.events.len() >= self.capacity {
            return Err(SinkFull);
        }
        let msg = MidiMessage::from_bytes(time, bytes).ok_or(SinkFull)?;
        self.events.push(msg);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_capacity() {
        let mut buf = MidiBuffer::with_capacity(2);
        assert!(buf.write(0, &[0x90, 60, 100]).is_ok());
        assert!(buf.write(3, &[0xC0, 1]).is_ok());
        assert_eq!(buf.write(4, &[0xF8]), Err(SinkFull));
        assert_eq!(buf.len(), 2);
        buf.clear();
        assert!(buf.is_empty());
        assert!(buf.write(4, &[0xF8]).is_ok());
    }

    #[test]
    fn test_source_stops_on_break() {
        let buf = MidiBuffer::from_events([
            MidiMessage::new(0, [0x90, 60, 1], 3),
            MidiMessage::new(1, [0x90, 61, 1], 3),
            MidiMessage::new(2, [0x90, 62, 1], 3),
        ]);
        let mut seen = Vec::new();
        buf.for_each_event(&mut |ev| {
            seen.push(ev.bytes[1]);
            if seen.len() == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(seen, vec![60, 61]);
    }
}
