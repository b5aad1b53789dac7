//! Compiled form of one mapping rule.

use std::fmt;

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::command::Command;
use crate::registers::RegisterKey;

/// Largest number of MIDI argument slots a command can take.
pub const MAX_SLOTS: usize = 4;

/// Slot index of the channel nibble.
pub const CHANNEL_SLOT: usize = 0;
/// Slot index of the velocity byte.
pub const VELOCITY_SLOT: usize = 2;
/// Slot index of the note on/off flag.
pub const NOTE_STATE_SLOT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Global {
    Channel,
    Velocity,
}

impl Global {
    pub fn keyword(self) -> &'static str {
        match self {
            Global::Channel => "channel",
            Global::Velocity => "velocity",
        }
    }
}

/// What feeds one MIDI argument slot.
#[derive(Debug, Clone, PartialEq)]
pub enum MidiSlot {
    /// Fixed value; filters incoming MIDI on the reverse path.
    Constant(i32),
    /// Inclusive range; its lower bound is used when generating MIDI.
    Range(i32, i32),
    /// `scale * osc + offset` from the OSC argument at `source`. A variable
    /// with no OSC counterpart has no source and contributes nothing.
    Variable {
        name: String,
        source: Option<usize>,
        scale: f32,
        offset: f32,
    },
    /// Session-wide channel or velocity.
    Global(Global),
}

impl MidiSlot {
    #[inline]
    pub fn source(&self) -> Option<usize> {
        match self {
            MidiSlot::Variable { source, .. } => *source,
            _ => None,
        }
    }

    /// `(min, max)` bounds of a constant or range slot.
    #[inline]
    pub fn bounds(&self) -> Option<(i32, i32)> {
        match *self {
            MidiSlot::Constant(value) => Some((value, value)),
            MidiSlot::Range(min, max) => Some((min, max)),
            _ => None,
        }
    }
}

/// How one OSC argument (path placeholder or typed argument) is treated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OscBinding {
    /// Accepts anything, value only recorded.
    Free,
    Constant(f32),
    Range(f32, f32),
    /// Feeds MIDI slot `slot` after removing `scale * x + offset`.
    Mapped { slot: usize, scale: f32, offset: f32 },
}

impl OscBinding {
    #[inline]
    pub fn slot(&self) -> Option<usize> {
        match self {
            OscBinding::Mapped { slot, .. } => Some(*slot),
            _ => None,
        }
    }

    /// True if `value` passes this argument's constant or range filter.
    #[inline]
    pub fn accepts(&self, value: f64) -> bool {
        match *self {
            OscBinding::Constant(c) => value == c as f64,
            OscBinding::Range(min, max) => value >= min as f64 && value <= max as f64,
            _ => true,
        }
    }

    /// Fixed value loaded on the reverse path, if any.
    #[inline]
    pub fn fixed_value(&self) -> Option<f32> {
        match *self {
            OscBinding::Constant(c) => Some(c),
            OscBinding::Range(min, _) => Some(min),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OscArg {
    pub name: Option<String>,
    pub binding: OscBinding,
}

/// OSC address split around its `{i}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    /// One more literal than there are placeholders.
    literals: Vec<String>,
}

impl PathTemplate {
    pub(crate) fn from_literals(literals: Vec<String>) -> Self {
        debug_assert!(!literals.is_empty());
        Self { literals }
    }

    #[inline]
    pub fn placeholders(&self) -> usize {
        self.literals.len() - 1
    }

    /// Literal text preceding each placeholder.
    #[inline]
    pub fn segments(&self) -> &[String] {
        &self.literals[..self.placeholders()]
    }

    /// Literal text after the last placeholder.
    #[inline]
    pub fn tail(&self) -> &str {
        &self.literals[self.placeholders()]
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in self.segments() {
            write!(f, "{segment}{{i}}")?;
        }
        f.write_str(self.tail())
    }
}

/// Variable name to every combined OSC argument position carrying it.
pub type VariableMap = HashMap<String, SmallVec<[usize; 2]>>;

#[derive(Debug, Clone)]
pub struct MappingRule {
    pub(crate) path: PathTemplate,
    pub(crate) types: String,
    pub(crate) command: Command,
    pub(crate) opcode: u8,
    pub(crate) slots: SmallVec<[MidiSlot; MAX_SLOTS]>,
    pub(crate) args: Vec<OscArg>,
    pub(crate) variables: VariableMap,
    pub(crate) register: RegisterKey,
}

impl MappingRule {
    pub fn path(&self) -> &PathTemplate {
        &self.path
    }

    pub fn types(&self) -> &str {
        &self.types
    }

    pub fn command(&self) -> Command {
        self.command
    }

    /// Status byte before channel and data are applied. A `note` rule with a
    /// constant on/off slot has already been resolved to note-on or note-off.
    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn slots(&self) -> &[MidiSlot] {
        &self.slots
    }

    /// Path placeholders first, then typed arguments.
    pub fn osc_args(&self) -> &[OscArg] {
        &self.args
    }

    pub fn register_key(&self) -> RegisterKey {
        self.register
    }

    /// Positions of every OSC argument named `name`.
    pub fn positions(&self, name: &str) -> &[usize] {
        self.variables.get(name).map_or(&[], |p| p.as_slice())
    }

    #[inline]
    pub fn is_raw(&self) -> bool {
        self.command.is_raw()
    }

    #[inline]
    pub fn is_control(&self) -> bool {
        self.command.is_control()
    }

    #[inline]
    pub fn uses_global(&self, global: Global) -> bool {
        self.slots.iter().any(|s| *s == MidiSlot::Global(global))
    }

    /// `note` rule whose on/off state comes from an OSC argument.
    #[inline]
    pub(crate) fn has_note_state(&self) -> bool {
        self.slots.len() > NOTE_STATE_SLOT
    }
}

struct Affine<'a> {
    name: &'a str,
    scale: f32,
    offset: f32,
}

impl fmt::Display for Affine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 1.0 {
            f.write_str(self.name)?;
        } else if self.scale == -1.0 {
            write!(f, "-{}", self.name)?;
        } else {
            write!(f, "{}*{}", self.scale, self.name)?;
        }
        if self.offset > 0.0 {
            write!(f, " + {}", self.offset)?;
        } else if self.offset < 0.0 {
            write!(f, " - {}", -self.offset)?;
        }
        Ok(())
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[String]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        f.write_str(item)?;
    }
    Ok(())
}

/// Renders the rule back in config syntax.
impl fmt::Display for MappingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {},", self.path, self.types)?;

        let mut osc: Vec<String> = self
            .args
            .iter()
            .map(|arg| match (arg.binding, arg.name.as_deref()) {
                (OscBinding::Constant(c), _) => c.to_string(),
                (OscBinding::Range(min, max), _) => format!("{min}-{max}"),
                (OscBinding::Mapped { scale, offset, .. }, Some(name)) => {
                    Affine { name, scale, offset }.to_string()
                }
                (_, name) => name.unwrap_or_default().to_string(),
            })
            .collect();
        while osc.last().is_some_and(String::is_empty) {
            osc.pop();
        }
        if !osc.is_empty() {
            f.write_str(" ")?;
            write_list(f, &osc)?;
        }

        let mut midi: Vec<String> = self
            .slots
            .iter()
            .map(|slot| match slot {
                MidiSlot::Constant(v) => v.to_string(),
                MidiSlot::Range(min, max) => format!("{min}-{max}"),
                MidiSlot::Global(global) => global.keyword().to_string(),
                MidiSlot::Variable {
                    name,
                    scale,
                    offset,
                    ..
                } => Affine {
                    name,
                    scale: *scale,
                    offset: *offset,
                }
                .to_string(),
            })
            .collect();
        if self.command == Command::Note && !self.has_note_state() {
            midi.push(u8::from(self.opcode == 0x90).to_string());
        }
        write!(f, " : {}( ", self.command)?;
        write_list(f, &midi)?;
        f.write_str(" )")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_template_display() {
        let path = PathTemplate::from_literals(vec!["/ch/".into(), "/note/".into(), "".into()]);
        assert_eq!(path.placeholders(), 2);
        assert_eq!(path.to_string(), "/ch/{i}/note/{i}");
        assert_eq!(path.tail(), "");
    }

    #[test]
    fn test_binding_filters() {
        assert!(OscBinding::Free.accepts(-1e9));
        assert!(OscBinding::Constant(3.0).accepts(3.0));
        assert!(!OscBinding::Constant(3.0).accepts(3.5));
        assert!(OscBinding::Range(0.0, 1.0).accepts(1.0));
        assert!(!OscBinding::Range(0.0, 1.0).accepts(1.01));
        assert_eq!(OscBinding::Range(2.0, 5.0).fixed_value(), Some(2.0));
    }

    #[test]
    fn test_affine_display() {
        let show = |scale, offset| Affine { name: "x", scale, offset }.to_string();
        assert_eq!(show(1.0, 0.0), "x");
        assert_eq!(show(-1.0, 3.0), "-x + 3");
        assert_eq!(show(4.0, 0.0), "4*x");
        assert_eq!(show(0.5, -1.0), "0.5*x - 1");
    }
}
