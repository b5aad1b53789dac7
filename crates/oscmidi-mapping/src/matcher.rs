//! Applying a compiled rule in either direction.
//!
//! OSC to MIDI: `midi = midi_scale * (osc - osc_offset) / osc_scale + midi_offset`,
//! clamped to the slot's wire range. MIDI to OSC runs the inverse transform.
//! Every observed OSC argument value is recorded in the rule's register
//! vector so the reverse direction can fill in arguments a MIDI message does
//! not carry.

use std::fmt::Write as _;
use std::time::SystemTime;

use rosc::{OscMessage, OscMidiMessage, OscTime, OscType};
use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::registers::RegisterTable;
use crate::rule::{
    Global, MappingRule, MidiSlot, OscBinding, CHANNEL_SLOT, NOTE_STATE_SLOT, VELOCITY_SLOT,
};

/// Session-wide values that control rules update and message rules read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Globals {
    pub channel: u8,
    pub velocity: u8,
    pub shift: i8,
}

impl Globals {
    pub fn apply(&mut self, update: ControlUpdate) {
        match update {
            ControlUpdate::Channel(channel) => self.channel = channel,
            ControlUpdate::Velocity(velocity) => self.velocity = velocity,
            ControlUpdate::Shift(shift) => self.shift = shift,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlUpdate {
    Channel(u8),
    Velocity(u8),
    Shift(i8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OscToMidi {
    NoMatch,
    /// A control rule matched and updated the globals; nothing to send.
    Control(ControlUpdate),
    Message([u8; 3]),
}

/// One decoded OSC message as seen by the matcher.
#[derive(Debug, Clone, Copy)]
pub struct OscInput<'a> {
    pub addr: &'a str,
    pub types: &'a str,
    pub args: &'a [OscType],
}

impl<'a> OscInput<'a> {
    pub fn new(addr: &'a str, types: &'a str, args: &'a [OscType]) -> Self {
        Self { addr, types, args }
    }
}

/// OSC type tag string for a list of arguments.
pub fn type_tags(args: &[OscType]) -> String {
    args.iter()
        .map(|arg| match arg {
            OscType::Int(_) => 'i',
            OscType::Float(_) => 'f',
            OscType::String(_) => 's',
            OscType::Blob(_) => 'b',
            OscType::Time(_) => 't',
            OscType::Long(_) => 'h',
            OscType::Double(_) => 'd',
            OscType::Char(_) => 'c',
            OscType::Color(_) => 'r',
            OscType::Midi(_) => 'm',
            OscType::Bool(true) => 'T',
            OscType::Bool(false) => 'F',
            OscType::Array(_) => '[',
            OscType::Nil => 'N',
            OscType::Inf => 'I',
        })
        .collect()
}

enum ArgValue {
    Number(f64),
    Midi([u8; 3]),
    Unsupported,
}

fn read_arg(tag: char, arg: &OscType) -> Option<ArgValue> {
    let value = match (tag, arg) {
        ('i', OscType::Int(v)) => ArgValue::Number(*v as f64),
        ('h', OscType::Long(v)) => ArgValue::Number(*v as f64),
        ('f', OscType::Float(v)) => ArgValue::Number(*v as f64),
        ('d', OscType::Double(v)) => ArgValue::Number(*v),
        ('c', OscType::Char(v)) => ArgValue::Number(*v as u32 as f64),
        ('T' | 'I', _) => ArgValue::Number(1.0),
        ('F' | 'N', _) => ArgValue::Number(0.0),
        ('m', OscType::Midi(m)) => ArgValue::Midi([m.status, m.data1, m.data2]),
        ('s' | 'S' | 'b' | 't', _) => ArgValue::Unsupported,
        _ => return None,
    };
    Some(value)
}

/// Value for a typed OSC argument on the reverse path.
fn load_arg(tag: char, value: f32) -> OscType {
    match tag {
        'i' => OscType::Int(value as i32),
        'h' => OscType::Long(value as i64),
        'f' => OscType::Float(value),
        'd' => OscType::Double(value as f64),
        'c' => OscType::Char(char::from(value as u8)),
        'T' => OscType::Bool(true),
        'F' => OscType::Bool(false),
        'N' => OscType::Nil,
        'I' => OscType::Inf,
        'm' => OscType::Midi(OscMidiMessage {
            port: 0,
            status: 0,
            data1: 0,
            data2: 0,
        }),
        'b' => OscType::Blob(Vec::new()),
        't' => OscType::Time(
            OscTime::try_from(SystemTime::now()).unwrap_or_else(|_| OscTime::from((0, 0))),
        ),
        _ => OscType::String(String::new()),
    }
}

/// Optionally signed decimal integer at the start of `s`.
fn leading_int(s: &str) -> Option<(i64, usize)> {
    let bytes = s.as_bytes();
    let sign = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let digits = bytes[sign..].iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let len = sign + digits;
    s[..len].parse().ok().map(|v| (v, len))
}

/// Message under construction on the OSC to MIDI path.
struct Outgoing {
    bytes: [u8; 3],
    control: f64,
}

impl MappingRule {
    fn slot_affine(&self, slot: usize) -> (f64, f64) {
        match self.slots.get(slot) {
            Some(MidiSlot::Variable { scale, offset, .. }) => (*scale as f64, *offset as f64),
            _ => (1.0, 0.0),
        }
    }

    fn arg_affine(&self, arg: usize) -> (f64, f64) {
        match self.args.get(arg).map(|a| a.binding) {
            Some(OscBinding::Mapped { scale, offset, .. }) => (scale as f64, offset as f64),
            _ => (1.0, 0.0),
        }
    }

    fn initial_message(&self, globals: &Globals) -> Outgoing {
        let mut out = Outgoing {
            bytes: [self.opcode, 0, 0],
            control: 0.0,
        };
        if self.is_control() {
            if let Some(MidiSlot::Constant(value)) = self.slots.first() {
                out.control = *value as f64;
            }
            return out;
        }
        for (index, slot) in self.slots.iter().enumerate().take(3) {
            match (index, slot) {
                (_, MidiSlot::Global(Global::Channel)) => {
                    out.bytes[0] = out.bytes[0].wrapping_add(globals.channel & 0x0F);
                }
                (_, MidiSlot::Global(Global::Velocity)) => {
                    out.bytes[VELOCITY_SLOT] = globals.velocity.min(0x7F);
                }
                (CHANNEL_SLOT, slot) => {
                    if let Some((value, _)) = slot.bounds() {
                        out.bytes[0] = out.bytes[0].wrapping_add(value as u8);
                    }
                }
                (1, slot) if self.command == Command::PitchBend => {
                    if let Some((value, _)) = slot.bounds() {
                        out.bytes[1] = (value & 0x7F) as u8;
                        out.bytes[2] = ((value >> 7) & 0x7F) as u8;
                    }
                }
                (index, slot) => {
                    if let Some((value, _)) = slot.bounds() {
                        out.bytes[index] = value as u8;
                    }
                }
            }
        }
        out
    }

    /// Writes a conditioned value into `place`, clamped to what the slot can
    /// carry on the wire.
    fn write_slot(&self, out: &mut Outgoing, place: usize, conditioned: f64) {
        if self.is_control() {
            debug_assert_eq!(place, 0, "control rules have a single slot");
            out.control = conditioned;
            return;
        }
        if place == NOTE_STATE_SLOT {
            if conditioned > 0.0 {
                out.bytes[0] = out.bytes[0].wrapping_add(0x10);
            }
            return;
        }
        let value = conditioned.max(0.0);
        if self.command == Command::PitchBend && place == 1 {
            let bend = value.min(16383.0) as u16;
            out.bytes[1] = out.bytes[1].saturating_add((bend & 0x7F) as u8);
            out.bytes[2] = out.bytes[2].saturating_add((bend >> 7) as u8);
        } else if place > 0 {
            out.bytes[place] = out.bytes[place].saturating_add(value.min(127.0) as u8);
        } else if self.is_raw() {
            out.bytes[0] = out.bytes[0].saturating_add(value.min(255.0) as u8);
        } else {
            out.bytes[0] = out.bytes[0].saturating_add(value.min(15.0) as u8);
        }
    }

    /// Routes one observed OSC argument value. False if it fails a filter.
    fn feed(&self, out: &mut Outgoing, regs: &mut [f32], index: usize, value: f64) -> bool {
        match self.args[index].binding {
            OscBinding::Mapped { scale, offset, .. } => {
                for (place, slot) in self.slots.iter().enumerate() {
                    if slot.source() == Some(index) {
                        let (midi_scale, midi_offset) = self.slot_affine(place);
                        let conditioned =
                            midi_scale * (value - offset as f64) / scale as f64 + midi_offset;
                        self.write_slot(out, place, conditioned);
                    }
                }
            }
            binding => {
                if !binding.accepts(value) {
                    return false;
                }
            }
        }
        regs[index] = value as f32;
        true
    }

    /// Translate one OSC message into a MIDI message or a control update.
    ///
    /// `strict` additionally requires every duplicate use of a variable on
    /// the OSC side to carry the same de-scaled value.
    pub fn osc_to_midi(
        &self,
        registers: &mut RegisterTable,
        input: &OscInput<'_>,
        strict: bool,
        globals: &mut Globals,
    ) -> OscToMidi {
        if input.args.len() < self.types.len() || !input.types.starts_with(self.types.as_str()) {
            return OscToMidi::NoMatch;
        }
        let regs = registers.bind(self.register, self.args.len());
        let mut out = self.initial_message(globals);

        let mut rest = input.addr;
        for (index, literal) in self.path.segments().iter().enumerate() {
            let Some(after) = rest.strip_prefix(literal.as_str()) else {
                return OscToMidi::NoMatch;
            };
            let Some((value, len)) = leading_int(after) else {
                return OscToMidi::NoMatch;
            };
            if !self.feed(&mut out, regs, index, value as f64) {
                return OscToMidi::NoMatch;
            }
            rest = &after[len..];
        }
        if rest != self.path.tail() {
            return OscToMidi::NoMatch;
        }

        let first_typed = self.path.placeholders();
        for (k, (tag, arg)) in self.types.chars().zip(input.args).enumerate() {
            let index = first_typed + k;
            let mapped = self.args[index].binding.slot().is_some();
            let value = match read_arg(tag, arg) {
                None => return OscToMidi::NoMatch,
                Some(ArgValue::Number(v)) => v,
                Some(ArgValue::Midi(bytes)) if mapped => {
                    if self.command != Command::MidiMessage {
                        return OscToMidi::NoMatch;
                    }
                    out.bytes = bytes;
                    continue;
                }
                Some(ArgValue::Unsupported) if mapped => return OscToMidi::NoMatch,
                Some(_) => 0.0,
            };
            if !self.feed(&mut out, regs, index, value) {
                return OscToMidi::NoMatch;
            }
        }

        if strict {
            for (i, arg) in self.args.iter().enumerate() {
                let Some(place) = arg.binding.slot() else {
                    continue;
                };
                let Some(j) = self.slots[place].source().filter(|&j| j != i) else {
                    continue;
                };
                let (y1, y2) = (regs[i] as f64, regs[j] as f64);
                let (a1, b1) = self.arg_affine(i);
                let (a2, b2) = self.arg_affine(j);
                let lhs = (y1 - b1) * a2;
                let rhs = (y2 - b2) * a1;
                if (lhs - rhs).abs() > f32::EPSILON as f64 * lhs.abs().max(rhs.abs()).max(1.0) {
                    return OscToMidi::NoMatch;
                }
            }
        }

        let update = match self.command {
            Command::SetChannel => ControlUpdate::Channel(out.control.clamp(0.0, 15.0) as u8),
            Command::SetVelocity => ControlUpdate::Velocity(out.control.clamp(0.0, 127.0) as u8),
            Command::SetShift => ControlUpdate::Shift(out.control as i8),
            _ => return OscToMidi::Message(out.bytes),
        };
        globals.apply(update);
        OscToMidi::Control(update)
    }

    /// Translate one MIDI message into an OSC message.
    ///
    /// Note-offs are expected in normalized form (`0x9n key 0`). `strict`
    /// additionally requires duplicate uses of a variable on the MIDI side
    /// to agree, up to integer rounding.
    pub fn midi_to_osc(
        &self,
        registers: &mut RegisterTable,
        msg: [u8; 3],
        strict: bool,
        globals: &Globals,
    ) -> Option<OscMessage> {
        if self.is_control() {
            return None;
        }
        let raw = self.is_raw();
        let bend = self.command == Command::PitchBend;
        let mut note_on = false;

        if raw {
            for (index, slot) in self.slots.iter().enumerate() {
                let bounds = match slot {
                    MidiSlot::Variable { source: None, .. } => Some((0, 0)),
                    MidiSlot::Variable { .. } | MidiSlot::Global(_) => None,
                    fixed => fixed.bounds(),
                };
                if let Some((min, max)) = bounds {
                    if !(min..=max).contains(&(msg[index] as i32)) {
                        return None;
                    }
                }
            }
        } else {
            let status = msg[0] & 0xF0;
            if status == self.opcode {
                note_on = status == 0x90;
            } else if self.opcode == 0x80 && status == 0x90 {
                note_on = msg[2] > 0;
                if note_on && !self.has_note_state() {
                    return None;
                }
            } else {
                return None;
            }

            let channel = (msg[0] & 0x0F) as i32;
            match &self.slots[CHANNEL_SLOT] {
                MidiSlot::Global(Global::Channel) => {
                    if channel != (globals.channel & 0x0F) as i32 {
                        return None;
                    }
                }
                slot => {
                    if let Some((min, max)) = slot.bounds() {
                        if !(min..=max).contains(&channel) {
                            return None;
                        }
                    }
                }
            }

            if bend {
                if let Some((min, max)) = self.slots.get(1).and_then(MidiSlot::bounds) {
                    let value = msg[1] as i32 + 128 * msg[2] as i32;
                    if !(min..=max).contains(&value) {
                        return None;
                    }
                }
            } else {
                for index in 1..self.slots.len().min(3) {
                    if let Some((min, max)) = self.slots[index].bounds() {
                        if !(min..=max).contains(&(msg[index] as i32)) {
                            return None;
                        }
                    }
                }
            }
        }

        let decode = |place: usize| -> i32 {
            match place {
                NOTE_STATE_SLOT => note_on as i32,
                CHANNEL_SLOT if !raw => (msg[0] & 0x0F) as i32,
                1 if bend => msg[1] as i32 + 128 * msg[2] as i32,
                place => msg[place] as i32,
            }
        };

        let regs = registers.bind(self.register, self.args.len());
        let mut values = Vec::with_capacity(self.args.len());
        for (index, arg) in self.args.iter().enumerate() {
            let value = match arg.binding {
                OscBinding::Mapped {
                    slot,
                    scale,
                    offset,
                } => {
                    let (midi_scale, midi_offset) = self.slot_affine(slot);
                    let value = (scale as f64 * (decode(slot) as f64 - midi_offset) / midi_scale
                        + offset as f64) as f32;
                    if slot != NOTE_STATE_SLOT {
                        regs[index] = value;
                    }
                    value
                }
                binding => binding.fixed_value().unwrap_or(regs[index]),
            };
            values.push(value);
        }

        let first_typed = self.path.placeholders();
        let mut args = Vec::with_capacity(self.types.len());
        for (k, tag) in self.types.chars().enumerate() {
            let index = first_typed + k;
            if raw && tag == 'm' && self.args[index].binding.slot().is_some() {
                if self.command != Command::MidiMessage {
                    return None;
                }
                args.push(OscType::Midi(OscMidiMessage {
                    port: 0,
                    status: msg[0],
                    data1: msg[1],
                    data2: msg[2],
                }));
            } else {
                args.push(load_arg(tag, values[index]));
            }
        }

        let mut addr = String::new();
        for (segment, value) in self.path.segments().iter().zip(&values) {
            addr.push_str(segment);
            let _ = write!(addr, "{}", *value as i32);
        }
        addr.push_str(self.path.tail());

        if strict {
            for (i, slot) in self.slots.iter().enumerate() {
                let Some(place) = slot.source() else {
                    continue;
                };
                let Some(j) = self.args[place].binding.slot().filter(|&j| j != i) else {
                    continue;
                };
                let (a1, b1) = self.slot_affine(i);
                let (a2, b2) = self.slot_affine(j);
                let expected = ((decode(j) as f64 - b2) * a1 / a2 + b1) as i32;
                if decode(i) != expected {
                    return None;
                }
            }
        }

        Some(OscMessage { addr, args })
    }
}
