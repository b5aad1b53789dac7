//! Error types for the realtime transport.

use thiserror::Error;

/// Failures while bringing the transport up. Nothing on the realtime path
/// returns these: overruns and late events are counted and dropped.
#[derive(Error, Debug)]
pub enum Error {
    #[error("could not open audio client '{name}': {reason}")]
    ClientOpen { name: String, reason: String },

    #[error("could not register port '{port}': {reason}")]
    PortRegistration { port: String, reason: String },

    #[error("could not activate audio client: {0}")]
    Activation(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// True for errors raised by the audio driver rather than by the caller.
    pub fn is_driver_failure(&self) -> bool {
        !matches!(self, Error::InvalidConfig(_))
    }
}

/// A ring entry whose length does not describe a 1-3 byte message. The
/// entry has already been skipped when this is returned.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("corrupt MIDI event in ring buffer (length {len})")]
pub struct CorruptEvent {
    pub len: u8,
}

/// The output port cannot take another event this block.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("MIDI port buffer full")]
pub struct SinkFull;

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_failure_classification() {
        assert!(Error::Activation("no server".into()).is_driver_failure());
        assert!(Error::PortRegistration {
            port: "midi_in".into(),
            reason: "exists".into()
        }
        .is_driver_failure());
        assert!(!Error::InvalidConfig("ring_capacity".into()).is_driver_failure());
    }

    #[test]
    fn test_display() {
        let err = Error::ClientOpen {
            name: "oscmidi".into(),
            reason: "server not running".into(),
        };
        assert_eq!(
            err.to_string(),
            "could not open audio client 'oscmidi': server not running"
        );
        assert_eq!(
            CorruptEvent { len: 0 }.to_string(),
            "corrupt MIDI event in ring buffer (length 0)"
        );
    }
}
