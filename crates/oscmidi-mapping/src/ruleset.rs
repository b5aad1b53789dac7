//! A set of compiled rules sharing one register table.

use rosc::OscMessage;
use tracing::{debug, error};

use crate::command::Command;
use crate::compile::compile;
use crate::error::{Error, Result};
use crate::matcher::{type_tags, Globals, OscInput, OscToMidi};
use crate::registers::RegisterTable;
use crate::rule::MappingRule;

/// Outcome of loading a multi-line config text.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    /// 1-based line number and the reason each rejected line was skipped.
    pub rejected: Vec<(usize, Error)>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<MappingRule>,
    registers: RegisterTable,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile_line(&mut self, line: &str) -> Result<&MappingRule> {
        let rule = compile(line, &mut self.registers)?;
        self.rules.push(rule);
        Ok(&self.rules[self.rules.len() - 1])
    }

    /// Compile every rule in `text`. Blank lines and `#` comments are skipped;
    /// a bad line is logged and rejected without affecting the others.
    pub fn load(&mut self, text: &str) -> LoadReport {
        let mut report = LoadReport::default();
        for (number, line) in text.lines().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match self.compile_line(line) {
                Ok(_) => report.loaded += 1,
                Err(err) => {
                    error!("config line {}:\n{err}", number + 1);
                    report.rejected.push((number + 1, err));
                }
            }
        }
        report
    }

    pub fn rules(&self) -> &[MappingRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn registers(&self) -> &RegisterTable {
        &self.registers
    }

    /// True if any rule can change the transpose shift, meaning the
    /// transpose filter should run.
    pub fn has_shift_rule(&self) -> bool {
        self.rules.iter().any(|r| r.command() == Command::SetShift)
    }

    /// Every non-miss result of matching `input` against each rule in order.
    pub fn osc_to_midi(
        &mut self,
        input: &OscInput<'_>,
        strict: bool,
        globals: &mut Globals,
    ) -> Vec<OscToMidi> {
        let mut results = Vec::new();
        for rule in &self.rules {
            let result = rule.osc_to_midi(&mut self.registers, input, strict, globals);
            if result != OscToMidi::NoMatch {
                debug!(addr = input.addr, rule = %rule, ?result, "OSC matched");
                results.push(result);
            }
        }
        results
    }

    pub fn osc_message_to_midi(
        &mut self,
        msg: &OscMessage,
        strict: bool,
        globals: &mut Globals,
    ) -> Vec<OscToMidi> {
        let types = type_tags(&msg.args);
        self.osc_to_midi(&OscInput::new(&msg.addr, &types, &msg.args), strict, globals)
    }

    /// An OSC message for every rule matching `msg`.
    pub fn midi_to_osc(&mut self, msg: [u8; 3], strict: bool, globals: &Globals) -> Vec<OscMessage> {
        let mut out = Vec::new();
        for rule in &self.rules {
            if let Some(osc) = rule.midi_to_osc(&mut self.registers, msg, strict, globals) {
                debug!(?msg, rule = %rule, addr = %osc.addr, "MIDI matched");
                out.push(osc);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::OscType;

    const CONFIG: &str = "\
# mixer
/mix/{i} f, ch, v : controlchange(ch, 7, v*127)

/mix/{i} f, ch, v : controlchange(ch, 10, v*127)
/broken i : noteon(1,2
/shift i, s : setshift(s)
";

    #[test]
    fn test_load_skips_comments_and_rejects_bad_lines() {
        let mut set = RuleSet::new();
        let report = set.load(CONFIG);
        assert_eq!(report.loaded, 3);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].0, 5);
        assert!(!report.is_clean());
        assert_eq!(set.len(), 3);
        assert!(set.has_shift_rule());
        // Both mixer rules share one register vector.
        assert_eq!(set.registers().len(), 2);
    }

    #[test]
    fn test_every_matching_rule_fires() {
        let mut set = RuleSet::new();
        set.load(CONFIG);
        let mut globals = Globals::default();
        let msg = OscMessage {
            addr: "/mix/2".into(),
            args: vec![OscType::Float(0.5)],
        };
        let out = set.osc_message_to_midi(&msg, false, &mut globals);
        assert_eq!(
            out,
            vec![
                OscToMidi::Message([0xB2, 7, 63]),
                OscToMidi::Message([0xB2, 10, 63])
            ]
        );
    }

    #[test]
    fn test_reverse_uses_shared_registers() {
        let mut set = RuleSet::new();
        set.load(CONFIG);
        let out = set.midi_to_osc([0xB1, 10, 127], false, &Globals::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].addr, "/mix/1");
        assert_eq!(out[0].args, vec![OscType::Float(1.0)]);
    }

    #[test]
    fn test_no_shift_rule() {
        let mut set = RuleSet::new();
        set.compile_line("/n i, n : noteon(0, n, 100)").unwrap();
        assert!(!set.has_shift_rule());
        assert!(!set.is_empty());
    }
}
