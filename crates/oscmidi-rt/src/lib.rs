//! Real-time MIDI transport.
//!
//! Two lock-free single-producer/single-consumer rings connect application
//! threads to the audio driver's realtime callback:
//!
//! - **ingress**: MIDI received by the driver, popped with
//!   [`MidiTransport::dequeue_incoming`]
//! - **egress**: MIDI queued with [`MidiTransport::enqueue_outgoing`],
//!   written to the output port at the block offset matching its frame time
//!
//! The callback can also run a [`TransposeFilter`] between a dedicated port
//! pair, following a shift set from any thread.
//!
//! ```ignore
//! use oscmidi_rt::{transport, JackTransport, TransportConfig};
//!
//! let config = TransportConfig::default();
//! let (mut midi, processor) = transport(&config)?;
//! let jack = JackTransport::start(&config, processor)?;
//!
//! midi.enqueue_outgoing([0x90, 60, 100]);
//! while let Ok(Some(msg)) = midi.dequeue_incoming() {
//!     println!("{}", oscmidi_rt::describe(msg.data));
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod lockfree;
pub mod midi;
pub mod port;
pub mod processor;
pub mod queue;
pub mod stats;
pub mod transport;
pub mod transpose;

#[cfg(feature = "jack")]
mod jack_backend;

pub use clock::{FrameClock, ManualClock, TransportClock};
pub use config::{TransportConfig, DEFAULT_RING_CAPACITY};
pub use error::{CorruptEvent, Error, Result, SinkFull};
pub use lockfree::AtomicShift;
pub use midi::{describe, message_len, normalize_note_off, MidiMessage};
pub use port::{MidiBuffer, MidiSink, MidiSource, RawEvent};
pub use processor::{BlockInfo, ProcessIo, RealtimeProcessor};
pub use queue::{IncomingQueue, OutgoingQueue};
pub use stats::{StatsSnapshot, TransportStats};
pub use transport::{transport, transport_with_clock, MidiTransport};
pub use transpose::{TransposeFilter, MAX_HELD_NOTES};

#[cfg(feature = "jack")]
pub use jack_backend::JackTransport;
