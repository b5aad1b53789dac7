//! # oscmidi - OSC/MIDI bridge
//!
//! Translates Open Sound Control messages to MIDI and back according to
//! one-line mapping rules, and moves the MIDI through a lock-free realtime
//! transport.
//!
//! ## Architecture
//!
//! oscmidi is an umbrella crate that coordinates:
//! - **oscmidi-mapping** - rule compiler, bidirectional matcher, shared register table
//! - **oscmidi-rt** - ring-buffer transport, realtime callback, transpose filter, JACK backend
//!
//! ## Quick Start
//!
//! ```ignore
//! use oscmidi::prelude::*;
//!
//! let mut session = Session::builder()
//!     .rules("/mixer/{i}/volume f, ch, level : controlchange(ch, 7, level*127)")
//!     .build()?;
//!
//! let msg = OscMessage { addr: "/mixer/3/volume".into(), args: vec![OscType::Float(0.5)] };
//! assert_eq!(session.handle_osc(&msg), vec![[0xB3, 7, 63]]);
//! ```
//!
//! ## Feature Flags
//!
//! - `jack` - run the realtime transport inside a JACK client

/// Re-export of oscmidi-mapping for direct access
pub use oscmidi_mapping as mapping;
/// Re-export of oscmidi-rt for direct access
pub use oscmidi_rt as rt;

mod builder;
pub mod error;
mod session;

pub use builder::SessionBuilder;
pub use error::{Error, Result};
pub use session::{Session, SessionConfig};

pub use oscmidi_mapping::{
    compile, Command, ControlUpdate, Globals, LoadReport, MappingRule, OscToMidi, RuleSet,
};
pub use oscmidi_rt::{
    transport, transport_with_clock, BlockInfo, MidiMessage, MidiTransport, ProcessIo,
    RealtimeProcessor, TransportConfig,
};

#[cfg(feature = "jack")]
pub use oscmidi_rt::JackTransport;

pub mod prelude {
    pub use crate::{Error, Result, Session, SessionBuilder, SessionConfig};
    pub use oscmidi_mapping::{Globals, OscToMidi, RuleSet};
    pub use oscmidi_rt::{transport, MidiTransport, TransportConfig};
    pub use rosc::{OscMessage, OscPacket, OscType};

    #[cfg(feature = "jack")]
    pub use oscmidi_rt::JackTransport;
}
