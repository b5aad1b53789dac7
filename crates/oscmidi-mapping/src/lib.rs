//! OSC/MIDI mapping rules.
//!
//! A rule is one line of text such as
//!
//! ```text
//! /mixer/{i}/volume f, ch, level : controlchange(ch, 7, level*127)
//! ```
//!
//! The left side describes an OSC address template and type signature, the
//! right side a MIDI command whose arguments are constants, ranges or
//! affinely conditioned variables shared with the OSC side. Compiled rules
//! translate in both directions.
//!
//! ```ignore
//! use oscmidi_mapping::{Globals, OscInput, OscToMidi, RuleSet};
//! use rosc::OscType;
//!
//! let mut rules = RuleSet::new();
//! rules.compile_line("/note/{i} if, ch, key, vel : noteon(ch, key, vel*127)")?;
//!
//! let args = [OscType::Int(60), OscType::Float(0.5)];
//! let mut globals = Globals::default();
//! let out = rules.osc_to_midi(&OscInput::new("/note/1", "if", &args), false, &mut globals);
//! assert_eq!(out, vec![OscToMidi::Message([0x91, 60, 63])]);
//! ```

pub mod command;
pub mod compile;
pub mod error;
pub mod grammar;
pub mod matcher;
pub mod registers;
pub mod rule;
pub mod ruleset;

pub use command::Command;
pub use compile::compile;
pub use error::{Error, Result, SemanticError, SyntaxError};
pub use matcher::{type_tags, ControlUpdate, Globals, OscInput, OscToMidi};
pub use registers::{RegisterKey, RegisterTable};
pub use rule::{Global, MappingRule, MidiSlot, OscArg, OscBinding, PathTemplate};
pub use ruleset::{LoadReport, RuleSet};
