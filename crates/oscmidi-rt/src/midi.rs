//! Raw MIDI messages as they travel through the ring buffers.

/// Longest message the transport carries. System exclusive is not supported.
pub const MAX_MESSAGE_LEN: usize = 3;

/// One timestamped MIDI message.
///
/// `time` is block-relative for incoming events and an absolute frame time
/// for outgoing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MidiMessage {
    pub time: u32,
    /// Valid bytes in `data` (1-3).
    pub len: u8,
    pub data: [u8; MAX_MESSAGE_LEN],
}

impl MidiMessage {
    #[inline]
    pub fn new(time: u32, data: [u8; MAX_MESSAGE_LEN], len: u8) -> Self {
        Self { time, len, data }
    }

    /// Copies 1-3 bytes into a message. `None` for empty or longer input.
    pub fn from_bytes(time: u32, bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() || bytes.len() > MAX_MESSAGE_LEN {
            return None;
        }
        let mut data = [0u8; MAX_MESSAGE_LEN];
        data[..bytes.len()].copy_from_slice(bytes);
        Some(Self::new(time, data, bytes.len() as u8))
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        (1..=MAX_MESSAGE_LEN as u8).contains(&self.len)
    }

    /// The valid bytes, clipped to the buffer.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data[..(self.len as usize).min(MAX_MESSAGE_LEN)]
    }

    #[inline]
    pub fn status(&self) -> u8 {
        self.data[0] & 0xF0
    }

    #[inline]
    pub fn channel(&self) -> u8 {
        self.data[0] & 0x0F
    }
}

/// Wire length of a message starting with `status`, or `None` for data
/// bytes, system exclusive and undefined system messages.
pub fn message_len(status: u8) -> Option<u8> {
    match status & 0xF0 {
        0x80 | 0x90 | 0xA0 | 0xB0 | 0xE0 => Some(3),
        0xC0 | 0xD0 => Some(2),
        0xF0 => match status {
            0xF2 => Some(3),
            0xF1 | 0xF3 => Some(2),
            0xF6 | 0xF8 | 0xF9 | 0xFA | 0xFB | 0xFC | 0xFE | 0xFF => Some(1),
            _ => None,
        },
        _ => None,
    }
}

/// Rewrites `0x8n key vel` as `0x9n key 0`. Anything else is returned as is.
#[inline]
pub fn normalize_note_off(msg: [u8; 3]) -> [u8; 3] {
    if msg[0] & 0xF0 == 0x80 {
        [msg[0] | 0x10, msg[1], 0]
    } else {
        msg
    }
}

fn status_name(status: u8) -> &'static str {
    match status & 0xF0 {
        0x80 => "noteoff",
        0x90 => "noteon",
        0xA0 => "polyaftertouch",
        0xB0 => "controlchange",
        0xC0 => "programchange",
        0xD0 => "aftertouch",
        0xE0 => "pitchbend",
        _ => "rawmidi",
    }
}

/// Human readable form such as `noteon ( 1, 60, 100 )`.
///
/// Pitchbend is shown as one 14-bit value and system messages as raw bytes.
pub fn describe(msg: [u8; 3]) -> String {
    let name = status_name(msg[0]);
    let channel = msg[0] & 0x0F;
    match msg[0] & 0xF0 {
        0xC0 | 0xD0 => format!("{name} ( {channel}, {} )", msg[1]),
        0xE0 => format!(
            "{name} ( {channel}, {} )",
            msg[1] as u16 + 128 * msg[2] as u16
        ),
        0xF0 => format!("{name} ( {}, {}, {} )", msg[0], msg[1], msg[2]),
        _ => format!("{name} ( {channel}, {}, {} )", msg[1], msg[2]),
    }
}
