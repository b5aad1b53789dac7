//! MIDI command classes a rule can target.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    NoteOn,
    NoteOff,
    /// Note with a fourth on/off slot.
    Note,
    PolyAftertouch,
    ControlChange,
    ProgramChange,
    Aftertouch,
    PitchBend,
    /// Three bytes sent verbatim.
    RawMidi,
    /// One `m`-typed OSC argument carrying a raw MIDI triple.
    MidiMessage,
    SetChannel,
    SetVelocity,
    SetShift,
}

impl Command {
    pub const ALL: [Command; 13] = [
        Command::NoteOn,
        Command::NoteOff,
        Command::Note,
        Command::PolyAftertouch,
        Command::ControlChange,
        Command::ProgramChange,
        Command::Aftertouch,
        Command::PitchBend,
        Command::RawMidi,
        Command::MidiMessage,
        Command::SetChannel,
        Command::SetVelocity,
        Command::SetShift,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|cmd| cmd.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::NoteOn => "noteon",
            Command::NoteOff => "noteoff",
            Command::Note => "note",
            Command::PolyAftertouch => "polyaftertouch",
            Command::ControlChange => "controlchange",
            Command::ProgramChange => "programchange",
            Command::Aftertouch => "aftertouch",
            Command::PitchBend => "pitchbend",
            Command::RawMidi => "rawmidi",
            Command::MidiMessage => "midimessage",
            Command::SetChannel => "setchannel",
            Command::SetVelocity => "setvelocity",
            Command::SetShift => "setshift",
        }
    }

    /// Status nibble for channel messages, 0 for raw and control rules.
    pub fn opcode(self) -> u8 {
        match self {
            Command::NoteOn => 0x90,
            Command::NoteOff | Command::Note => 0x80,
            Command::PolyAftertouch => 0xA0,
            Command::ControlChange => 0xB0,
            Command::ProgramChange => 0xC0,
            Command::Aftertouch => 0xD0,
            Command::PitchBend => 0xE0,
            _ => 0x00,
        }
    }

    /// Number of argument slots the command takes.
    pub fn arity(self) -> usize {
        match self {
            Command::Note => 4,
            Command::NoteOn
            | Command::NoteOff
            | Command::PolyAftertouch
            | Command::ControlChange
            | Command::RawMidi => 3,
            Command::ProgramChange | Command::Aftertouch | Command::PitchBend => 2,
            Command::MidiMessage
            | Command::SetChannel
            | Command::SetVelocity
            | Command::SetShift => 1,
        }
    }

    /// Bytes pass through without channel-message interpretation.
    #[inline]
    pub fn is_raw(self) -> bool {
        matches!(self, Command::RawMidi | Command::MidiMessage)
    }

    /// Updates in-process state instead of producing a message.
    #[inline]
    pub fn is_control(self) -> bool {
        matches!(
            self,
            Command::SetChannel | Command::SetVelocity | Command::SetShift
        )
    }

    /// Display name for a status byte, as used in message descriptions.
    pub fn for_status(status: u8) -> Option<Self> {
        match status & 0xF0 {
            0x80 => Some(Command::NoteOff),
            0x90 => Some(Command::NoteOn),
            0xA0 => Some(Command::PolyAftertouch),
            0xB0 => Some(Command::ControlChange),
            0xC0 => Some(Command::ProgramChange),
            0xD0 => Some(Command::Aftertouch),
            0xE0 => Some(Command::PitchBend),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_roundtrip() {
        for cmd in Command::ALL {
            assert_eq!(Command::from_name(cmd.name()), Some(cmd));
        }
        assert_eq!(Command::from_name("NoteOn"), None);
        assert_eq!(Command::from_name("sysex"), None);
    }

    #[test]
    fn test_arity_table() {
        assert_eq!(Command::Note.arity(), 4);
        assert_eq!(Command::ControlChange.arity(), 3);
        assert_eq!(Command::PitchBend.arity(), 2);
        assert_eq!(Command::SetShift.arity(), 1);
    }

    #[test]
    fn test_status_lookup() {
        assert_eq!(Command::for_status(0x93), Some(Command::NoteOn));
        assert_eq!(Command::for_status(0xE1), Some(Command::PitchBend));
        assert_eq!(Command::for_status(0xF8), None);
    }
}
