//! Semantic pass: turns a parsed line into a `MappingRule`.
//!
//! MIDI slots are resolved first, binding each variable to every OSC argument
//! with the same name. The OSC arguments are then resolved against those
//! bindings. The register vector is only bound once the rule is complete, so a
//! rejected line leaves the table untouched.

use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::command::Command;
use crate::error::{Error, Result, SemanticError};
use crate::grammar::{parse_rule, ArgSyntax, OSC_TYPE_TAGS};
use crate::registers::{RegisterKey, RegisterTable};
use crate::rule::{
    Global, MappingRule, MidiSlot, OscArg, OscBinding, PathTemplate, VariableMap, CHANNEL_SLOT,
    NOTE_STATE_SLOT, VELOCITY_SLOT,
};

/// Compile one config line, binding its register vector in `registers`.
pub fn compile(line: &str, registers: &mut RegisterTable) -> Result<MappingRule> {
    let syntax = parse_rule(line)?;
    let semantic = |reason| Error::semantic(line, reason);

    let path = parse_path(syntax.path).map_err(semantic)?;
    if let Some(tag) = syntax.types.chars().find(|c| !OSC_TYPE_TAGS.contains(*c)) {
        return Err(semantic(SemanticError::UnknownOscType(tag)));
    }
    let command = Command::from_name(syntax.command)
        .ok_or_else(|| semantic(SemanticError::UnknownCommand(syntax.command.to_string())))?;
    if syntax.midi_args.len() != command.arity() {
        return Err(semantic(SemanticError::ArgCount {
            command: command.name(),
            expected: command.arity(),
            found: syntax.midi_args.len(),
        }));
    }

    let total = path.placeholders() + syntax.types.len();
    if syntax.osc_args.len() > total {
        warn!(
            line = line.trim_end(),
            "ignoring {} OSC argument(s) beyond the {} the address and types provide",
            syntax.osc_args.len() - total,
            total
        );
    }
    let osc_syntax = |i: usize| syntax.osc_args.get(i).unwrap_or(&ArgSyntax::Blank);

    let mut variables = VariableMap::new();
    for i in 0..total {
        if let ArgSyntax::Variable { name, .. } = osc_syntax(i) {
            check_name(name).map_err(semantic)?;
            variables.entry(name.to_string()).or_default().push(i);
        }
    }

    let mut opcode = command.opcode();
    let mut slots: SmallVec<[MidiSlot; 4]> = SmallVec::new();
    // Slot each OSC argument feeds; a name used in several slots keeps the last.
    let mut osc_slot: Vec<Option<usize>> = vec![None; total];

    for (index, arg) in syntax.midi_args.iter().enumerate() {
        let slot = match *arg {
            ArgSyntax::Blank => return Err(semantic(SemanticError::BlankArgument(index))),
            ArgSyntax::Number(value) => constant_slot(command, index, value),
            ArgSyntax::Range(min, max) => {
                let (lo, _) = constant_slot_bounds(command, index, min);
                let (hi, _) = constant_slot_bounds(command, index, max);
                if index == NOTE_STATE_SLOT {
                    constant_slot(command, index, min)
                } else {
                    Some(MidiSlot::Range(lo, hi))
                }
            }
            ArgSyntax::Variable {
                name,
                scale,
                offset,
            } => {
                if let Some(global) = keyword(name) {
                    let expected = match global {
                        Global::Channel => CHANNEL_SLOT,
                        Global::Velocity => VELOCITY_SLOT,
                    };
                    if index != expected {
                        return Err(semantic(SemanticError::KeywordPosition {
                            keyword: global.keyword(),
                            position: index,
                        }));
                    }
                    if scale != 1.0 || offset != 0.0 {
                        return Err(semantic(SemanticError::ScaledKeyword(global.keyword())));
                    }
                    Some(MidiSlot::Global(global))
                } else if scale == 0.0 {
                    warn!(
                        line = line.trim_end(),
                        "midi argument {index} has zero scale, treating it as the constant {offset}"
                    );
                    constant_slot(command, index, offset)
                } else {
                    check_name(name).map_err(semantic)?;
                    let positions = variables.get(name);
                    let source = positions.and_then(|p| p.first().copied());
                    for &pos in positions.into_iter().flatten() {
                        osc_slot[pos] = Some(index);
                    }
                    if source.is_none() {
                        warn!(
                            line = line.trim_end(),
                            "variable `{name}` does not appear in the OSC arguments"
                        );
                    }
                    Some(MidiSlot::Variable {
                        name: name.to_string(),
                        source,
                        scale: scale as f32,
                        offset: offset as f32,
                    })
                }
            }
        };
        match slot {
            Some(slot) => slots.push(slot),
            // Fixed note state picks the opcode instead of taking a slot.
            None => {
                let on = match *arg {
                    ArgSyntax::Number(v) | ArgSyntax::Range(v, _) => v != 0.0,
                    ArgSyntax::Variable { offset, .. } => offset > 0.0,
                    ArgSyntax::Blank => false,
                };
                if on {
                    opcode += 0x10;
                }
            }
        }
    }

    let mut args = Vec::with_capacity(total);
    for i in 0..total {
        let syntax = osc_syntax(i);
        let name = match syntax {
            ArgSyntax::Variable { name, .. } => Some(name.to_string()),
            _ => None,
        };
        let binding = match (osc_slot[i], syntax) {
            (
                Some(slot),
                ArgSyntax::Variable {
                    scale, offset, ..
                },
            ) => {
                if *scale == 0.0 {
                    warn!(
                        line = line.trim_end(),
                        "OSC argument {i} has zero scale, treating it as the constant {offset}"
                    );
                    let next = (i + 1..total).find(|&j| osc_slot[j] == Some(slot));
                    osc_slot[i] = None;
                    for midi in slots.iter_mut() {
                        if let MidiSlot::Variable { source, .. } = midi {
                            if *source == Some(i) {
                                *source = next;
                            }
                        }
                    }
                    OscBinding::Constant(*offset as f32)
                } else {
                    OscBinding::Mapped {
                        slot,
                        scale: *scale as f32,
                        offset: *offset as f32,
                    }
                }
            }
            (_, ArgSyntax::Number(value)) => OscBinding::Constant(*value as f32),
            (_, ArgSyntax::Range(min, max)) => OscBinding::Range(*min as f32, *max as f32),
            _ => OscBinding::Free,
        };
        args.push(OscArg { name, binding });
    }

    let register = RegisterKey::new(&path.to_string(), syntax.types);
    registers.bind(register, total);

    let rule = MappingRule {
        path,
        types: syntax.types.to_string(),
        command,
        opcode,
        slots,
        args,
        variables,
        register,
    };
    debug!(rule = %rule, "compiled mapping rule");
    Ok(rule)
}

fn parse_path(path: &str) -> std::result::Result<PathTemplate, SemanticError> {
    let bad = || SemanticError::PathPlaceholder(path.to_string());
    let mut literals = Vec::new();
    let mut rest = path;
    while let Some(open) = rest.find('{') {
        let close = rest[open..].find('}').map(|c| open + c).ok_or_else(bad)?;
        if !rest[open + 1..close].contains('i') {
            return Err(bad());
        }
        literals.push(rest[..open].to_string());
        rest = &rest[close + 1..];
    }
    literals.push(rest.to_string());
    Ok(PathTemplate::from_literals(literals))
}

fn keyword(name: &str) -> Option<Global> {
    match name {
        "channel" => Some(Global::Channel),
        "velocity" => Some(Global::Velocity),
        _ => None,
    }
}

fn check_name(name: &str) -> std::result::Result<(), SemanticError> {
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        Err(SemanticError::InvalidVariable(name.to_string()))
    } else {
        Ok(())
    }
}

/// Largest value a slot can carry on the wire.
pub(crate) fn slot_max(command: Command, index: usize) -> i32 {
    match (command, index) {
        (Command::PitchBend, 1) => 0x3FFF,
        (cmd, CHANNEL_SLOT) if cmd.is_raw() => 0xFF,
        (cmd, CHANNEL_SLOT) if !cmd.is_control() => 0x0F,
        _ => 0x7F,
    }
}

fn constant_slot_bounds(command: Command, index: usize, value: f64) -> (i32, bool) {
    let truncated = value as i32;
    if command.is_control() {
        return (truncated, false);
    }
    let clamped = truncated.clamp(0, slot_max(command, index));
    (clamped, clamped != truncated)
}

/// Fixed slot value, or `None` for the note on/off slot.
fn constant_slot(command: Command, index: usize, value: f64) -> Option<MidiSlot> {
    if index == NOTE_STATE_SLOT {
        return None;
    }
    let (clamped, changed) = constant_slot_bounds(command, index, value);
    if changed {
        warn!("{command} argument {index}: constant {value} clamped to {clamped}");
    }
    Some(MidiSlot::Constant(clamped))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_ok(line: &str) -> MappingRule {
        compile(line, &mut RegisterTable::new()).unwrap()
    }

    fn semantic(line: &str) -> SemanticError {
        match compile(line, &mut RegisterTable::new()) {
            Err(Error::Semantic { reason, .. }) => reason,
            other => panic!("expected semantic error for {line}, got {other:?}"),
        }
    }

    fn variable(name: &str, source: Option<usize>, scale: f32) -> MidiSlot {
        MidiSlot::Variable {
            name: name.to_string(),
            source,
            scale,
            offset: 0.0,
        }
    }

    #[test]
    fn test_constant_filters_leave_midi_variables_unbound() {
        let rule = compile_ok("/note/{i} if, 1, 2, 3 : noteon( a, b, 4*c )");
        assert_eq!(rule.opcode(), 0x90);
        assert_eq!(rule.path().placeholders(), 1);
        let bindings: Vec<_> = rule.osc_args().iter().map(|a| a.binding).collect();
        assert_eq!(
            bindings,
            vec![
                OscBinding::Constant(1.0),
                OscBinding::Constant(2.0),
                OscBinding::Constant(3.0)
            ]
        );
        assert!(rule.slots().iter().all(|s| s.source().is_none()));
    }

    #[test]
    fn test_named_variables_bind_both_ways() {
        let rule = compile_ok("/note/{i} if, a, b, c : noteon( a, b, 4*c )");
        assert_eq!(
            rule.slots(),
            &[
                variable("a", Some(0), 1.0),
                variable("b", Some(1), 1.0),
                variable("c", Some(2), 4.0)
            ]
        );
        let slots: Vec<_> = rule.osc_args().iter().map(|a| a.binding.slot()).collect();
        assert_eq!(slots, vec![Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn test_duplicate_variable_positions() {
        let rule = compile_ok("/dup ii, a, a : noteon(0, a, a)");
        assert_eq!(rule.positions("a"), &[0, 1]);
        assert_eq!(rule.slots()[1].source(), Some(0));
        assert_eq!(rule.slots()[2].source(), Some(0));
        // Every occurrence reports the last slot the name was used in.
        assert_eq!(rule.osc_args()[0].binding.slot(), Some(2));
        assert_eq!(rule.osc_args()[1].binding.slot(), Some(2));
    }

    #[test]
    fn test_global_keywords() {
        let rule = compile_ok("/vol i, v : noteon(channel, v, velocity)");
        assert!(rule.uses_global(Global::Channel));
        assert!(rule.uses_global(Global::Velocity));

        assert_eq!(
            semantic("/vol i, v : controlchange(0, velocity, v)"),
            SemanticError::KeywordPosition {
                keyword: "velocity",
                position: 1
            }
        );
        assert_eq!(
            semantic("/vol i, v : controlchange(2*channel, 7, v)"),
            SemanticError::ScaledKeyword("channel")
        );
    }

    #[test]
    fn test_note_state_constant_selects_opcode() {
        let on = compile_ok("/on i, n : note(0, n, 100, 1)");
        assert_eq!(on.opcode(), 0x90);
        assert_eq!(on.slots().len(), 3);

        let off = compile_ok("/off i, n : note(0, n, 0, 0)");
        assert_eq!(off.opcode(), 0x80);

        let flagged = compile_ok("/n ii, n, s : note(0, n, 100, s)");
        assert_eq!(flagged.opcode(), 0x80);
        assert_eq!(flagged.slots().len(), 4);
    }

    #[test]
    fn test_constants_are_clamped_per_slot() {
        let bend = compile_ok("/pb , : pitchbend(0, 20000)");
        assert_eq!(bend.slots()[1], MidiSlot::Constant(16383));

        let cc = compile_ok("/cc i, v : controlchange(20, 300, v)");
        assert_eq!(cc.slots()[0], MidiSlot::Constant(15));
        assert_eq!(cc.slots()[1], MidiSlot::Constant(127));

        let raw = compile_ok("/raw , : rawmidi(250, 0, 0)");
        assert_eq!(raw.slots()[0], MidiSlot::Constant(250));

        let shift = compile_ok("/down , : setshift(-12)");
        assert_eq!(shift.slots()[0], MidiSlot::Constant(-12));
    }

    #[test]
    fn test_zero_scale_midi_argument_becomes_constant() {
        let rule = compile_ok("/x i, a : controlchange(0, 0*a + 5, a)");
        assert_eq!(rule.slots()[1], MidiSlot::Constant(5));
        assert_eq!(rule.slots()[2].source(), Some(0));
    }

    #[test]
    fn test_zero_scale_osc_argument_rebinds_to_duplicate() {
        let rule = compile_ok("/x ii, 0*a+3, a : controlchange(0, 7, a)");
        assert_eq!(rule.osc_args()[0].binding, OscBinding::Constant(3.0));
        assert_eq!(rule.osc_args()[1].binding.slot(), Some(2));
        assert_eq!(rule.slots()[2].source(), Some(1));

        let lone = compile_ok("/x i, 0*a+3 : controlchange(0, 7, a)");
        assert_eq!(lone.slots()[2].source(), None);
    }

    #[test]
    fn test_semantic_errors() {
        assert_eq!(
            semantic("/x iq, a, b : noteon(a, b, 1)"),
            SemanticError::UnknownOscType('q')
        );
        assert_eq!(
            semantic("/x i, a : bogus(a)"),
            SemanticError::UnknownCommand("bogus".into())
        );
        assert_eq!(
            semantic("/x i, a : noteon(0, a)"),
            SemanticError::ArgCount {
                command: "noteon",
                expected: 3,
                found: 2
            }
        );
        assert_eq!(
            semantic("/x i, a : noteon(0, , a)"),
            SemanticError::BlankArgument(1)
        );
        assert_eq!(
            semantic("/x/{n} , : programchange(0, 1)"),
            SemanticError::PathPlaceholder("/x/{n}".into())
        );
        assert_eq!(
            semantic("/x/{i , : programchange(0, 1)"),
            SemanticError::PathPlaceholder("/x/{i".into())
        );
        assert_eq!(
            semantic("/x i, a : noteon(0, 2*3, a)"),
            SemanticError::InvalidVariable("3".into())
        );
    }

    #[test]
    fn test_failed_compile_binds_nothing() {
        let mut registers = RegisterTable::new();
        assert!(matches!(
            compile("/x i : noteon(1,2", &mut registers),
            Err(Error::Syntax(_))
        ));
        assert!(compile("/x i, a : noteon(0, a)", &mut registers).is_err());
        assert!(registers.is_empty());
    }

    #[test]
    fn test_rules_with_same_signature_share_registers() {
        let mut registers = RegisterTable::new();
        let a = compile("/mix/{i} f, ch, v : controlchange(ch, 7, v*127)", &mut registers).unwrap();
        let b = compile("/mix/{i} f, ch, v : controlchange(ch, 10, v*127)", &mut registers).unwrap();
        let c = compile("/mix/{i} i, ch, v : controlchange(ch, 10, v)", &mut registers).unwrap();
        assert_eq!(a.register_key(), b.register_key());
        assert_ne!(a.register_key(), c.register_key());
        assert_eq!(registers.len(), 2);
        assert_eq!(registers.get(a.register_key()).map(<[f32]>::len), Some(2));
    }

    #[test]
    fn test_display_renders_config_syntax() {
        let rules = [
            "/note/{i} if, 1, 2, 3 : noteon( a, b, 4*c )",
            "/fader/{i} f, ch, 127-2*v : controlchange(ch, 7, v/2+1)",
            "/key ii, n, 0-127 : note(channel, n, velocity, 1)",
            "/bend , : pitchbend(3, 8192)",
        ];
        let rendered: Vec<String> = rules.iter().map(|l| compile_ok(l).to_string()).collect();
        insta::assert_snapshot!(rendered.join("\n"), @r"
        /note/{i} if, 1, 2, 3 : noteon( a, b, 4*c )
        /fader/{i} f, ch, -2*v + 127 : controlchange( ch, 7, 0.5*v + 1 )
        /key ii, n, 0-127 : note( channel, n, velocity, 1 )
        /bend , : pitchbend( 3, 8192 )
        ");
    }
}
