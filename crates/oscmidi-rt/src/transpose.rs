//! Transpose filter.
//!
//! Shifts note numbers between a dedicated input/output port pair and keeps
//! track of held notes so that a shift change re-voices them: note-offs at
//! the old pitch, then note-ons at the new one, both at the start of the
//! block.

use std::ops::ControlFlow;

use crate::error::SinkFull;
use crate::port::{MidiSink, MidiSource};

/// One entry per note number.
pub const MAX_HELD_NOTES: usize = 128;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct HeldNote {
    note: u8,
    /// Status byte of the note-on, channel included.
    status: u8,
    velocity: u8,
}

#[derive(Debug, Clone)]
pub struct TransposeFilter {
    held: [HeldNote; MAX_HELD_NOTES],
    len: usize,
    shift: i8,
}

impl Default for TransposeFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn shifted(note: u8, shift: i8) -> Option<u8> {
    let value = note as i16 + shift as i16;
    (0..=127).contains(&value).then_some(value as u8)
}

impl TransposeFilter {
    pub fn new() -> Self {
        Self {
            held: [HeldNote::default(); MAX_HELD_NOTES],
            len: 0,
            shift: 0,
        }
    }

    /// Shift applied during the last processed block.
    pub fn shift(&self) -> i8 {
        self.shift
    }

    /// Untransposed note numbers currently held, oldest first.
    pub fn held_notes(&self) -> impl Iterator<Item = u8> + '_ {
        self.held[..self.len].iter().map(|h| h.note)
    }

    fn hold(&mut self, status: u8, note: u8, velocity: u8) {
        if self.len < MAX_HELD_NOTES && !self.held_notes().any(|n| n == note) {
            self.held[self.len] = HeldNote {
                note,
                status,
                velocity,
            };
            self.len += 1;
        }
    }

    fn release(&mut self, note: u8) {
        let found = self.held_notes().position(|n| n == note);
        if let Some(index) = found {
            self.held.copy_within(index + 1..self.len, index);
            self.len -= 1;
        }
    }

    fn revoice(&self, old: i8, new: i8, output: &mut dyn MidiSink) -> Result<(), SinkFull> {
        for held in &self.held[..self.len] {
            if let Some(note) = shifted(held.note, old) {
                output.write(0, &[held.status & 0xEF, note, 0])?;
            }
        }
        for held in &self.held[..self.len] {
            if let Some(note) = shifted(held.note, new) {
                output.write(0, &[held.status, note, held.velocity])?;
            }
        }
        Ok(())
    }

    /// Runs one block: re-voices held notes if `shift` changed, then copies
    /// `input` to `output` with note numbers shifted.
    ///
    /// Once the output is full the remaining writes are skipped, but every
    /// input event still updates the held set.
    pub fn process(
        &mut self,
        shift: i8,
        input: &dyn MidiSource,
        output: &mut dyn MidiSink,
    ) -> Result<(), SinkFull> {
        output.clear();

        let mut result = Ok(());
        if shift != self.shift {
            let old = std::mem::replace(&mut self.shift, shift);
            result = self.revoice(old, shift, output);
        }

        input.for_each_event(&mut |event| {
            let bytes = event.bytes;
            let mut data = [0u8; 3];
            let out: &[u8] = if bytes.len() == 3 {
                data.copy_from_slice(bytes);
                let [status, note, velocity] = data;
                let transpose = match status & 0xF0 {
                    0x80 => {
                        self.release(note);
                        true
                    }
                    0x90 if velocity == 0 => {
                        self.release(note);
                        true
                    }
                    0x90 => {
                        self.hold(status, note, velocity);
                        true
                    }
                    0xA0 => true,
                    _ => false,
                };
                if transpose {
                    match shifted(note, shift) {
                        Some(note) => data[1] = note,
                        None => return ControlFlow::Continue(()),
                    }
                }
                &data
            } else {
                bytes
            };
            if result.is_ok() {
                result = output.write(event.time, out);
            }
            ControlFlow::Continue(())
        });
        result
    }
}
