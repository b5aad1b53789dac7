//! A running bridge: compiled rules, session globals and the MIDI transport.
//!
//! All matching happens on the thread that owns the [`Session`]; only the
//! transport rings and the transpose shift cross into the realtime thread.

use std::sync::Arc;

use oscmidi_mapping::{ControlUpdate, Globals, LoadReport, MappingRule, OscToMidi, RuleSet};
use oscmidi_rt::{describe, normalize_note_off, AtomicShift, MidiTransport, StatsSnapshot};
use rosc::{OscMessage, OscPacket};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Matching options and initial globals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Require duplicate variables within a rule to agree.
    pub strict_match: bool,
    pub channel: u8,
    pub velocity: u8,
    pub shift: i8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            strict_match: false,
            channel: 0,
            velocity: 100,
            shift: 0,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.channel > 15 {
            return Err(Error::InvalidConfig(format!(
                "channel {} out of range (0-15)",
                self.channel
            )));
        }
        if self.velocity > 127 {
            return Err(Error::InvalidConfig(format!(
                "velocity {} out of range (0-127)",
                self.velocity
            )));
        }
        Ok(())
    }

    fn globals(&self) -> Globals {
        Globals {
            channel: self.channel,
            velocity: self.velocity,
            shift: self.shift,
        }
    }
}

pub struct Session {
    rules: RuleSet,
    globals: Globals,
    strict: bool,
    shift: Arc<AtomicShift>,
    transport: Option<MidiTransport>,
    report: LoadReport,
    seen_stats: StatsSnapshot,
}

impl Session {
    pub fn builder() -> crate::SessionBuilder {
        crate::SessionBuilder::default()
    }

    pub(crate) fn from_parts(
        rules: RuleSet,
        report: LoadReport,
        config: SessionConfig,
        transport: Option<MidiTransport>,
    ) -> Self {
        let shift = match &transport {
            Some(transport) => transport.shift_handle(),
            None => Arc::new(AtomicShift::default()),
        };
        shift.set(config.shift);
        let seen_stats = transport
            .as_ref()
            .map(MidiTransport::stats)
            .unwrap_or_default();
        Self {
            rules,
            globals: config.globals(),
            strict: config.strict_match,
            shift,
            transport,
            report,
            seen_stats,
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Compile one more rule into the running session.
    pub fn add_rule(&mut self, line: &str) -> Result<&MappingRule> {
        Ok(self.rules.compile_line(line)?)
    }

    /// Lines rejected while the session was built.
    pub fn load_report(&self) -> &LoadReport {
        &self.report
    }

    pub fn globals(&self) -> Globals {
        self.globals
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Shift shared with the transpose filter.
    pub fn shift_handle(&self) -> Arc<AtomicShift> {
        Arc::clone(&self.shift)
    }

    pub fn transport(&self) -> Option<&MidiTransport> {
        self.transport.as_ref()
    }

    pub fn transport_mut(&mut self) -> Option<&mut MidiTransport> {
        self.transport.as_mut()
    }

    /// Match one OSC message against every rule.
    ///
    /// Produced MIDI messages are queued on the transport, if there is one,
    /// and returned. Control rules update the globals; a new shift is
    /// published to the transpose filter.
    pub fn handle_osc(&mut self, msg: &OscMessage) -> Vec<[u8; 3]> {
        let results = self
            .rules
            .osc_message_to_midi(msg, self.strict, &mut self.globals);

        let mut sent = Vec::new();
        for result in results {
            match result {
                OscToMidi::Message(bytes) => {
                    debug!(addr = %msg.addr, midi = %describe(bytes), "OSC -> MIDI");
                    if let Some(transport) = self.transport.as_mut() {
                        if !transport.enqueue_outgoing(bytes) {
                            warn!(midi = %describe(bytes), "MIDI message not queued");
                        }
                    }
                    sent.push(bytes);
                }
                OscToMidi::Control(ControlUpdate::Shift(shift)) => {
                    debug!(shift, "transpose shift changed");
                    self.shift.set(shift);
                }
                OscToMidi::Control(update) => debug!(?update, "global changed"),
                OscToMidi::NoMatch => {}
            }
        }
        sent
    }

    /// Like [`Session::handle_osc`], descending into bundles.
    pub fn handle_packet(&mut self, packet: &OscPacket) -> Vec<[u8; 3]> {
        match packet {
            OscPacket::Message(msg) => self.handle_osc(msg),
            OscPacket::Bundle(bundle) => bundle
                .content
                .iter()
                .flat_map(|inner| self.handle_packet(inner))
                .collect(),
        }
    }

    /// OSC messages for one received MIDI message. Note-offs are normalized
    /// to zero-velocity note-ons first.
    pub fn handle_midi(&mut self, msg: [u8; 3]) -> Vec<OscMessage> {
        let msg = normalize_note_off(msg);
        let out = self.rules.midi_to_osc(msg, self.strict, &self.globals);
        if !out.is_empty() {
            debug!(midi = %describe(msg), matches = out.len(), "MIDI -> OSC");
        }
        out
    }

    /// Drain the transport's ingress ring and translate everything in it.
    pub fn poll_midi(&mut self) -> Vec<OscMessage> {
        let mut received = Vec::new();
        if let Some(transport) = self.transport.as_mut() {
            loop {
                match transport.dequeue_incoming() {
                    Ok(Some(msg)) => received.push(msg.data),
                    Ok(None) => break,
                    Err(err) => warn!("{err}"),
                }
            }
        }
        self.report_transport_drops();

        received
            .into_iter()
            .flat_map(|msg| self.handle_midi(msg))
            .collect()
    }

    fn report_transport_drops(&mut self) {
        let Some(transport) = self.transport.as_ref() else {
            return;
        };
        let now = transport.stats();
        let delta = now.since(&self.seen_stats);
        if delta.total() > 0 {
            warn!(
                ingress_dropped = delta.ingress_dropped,
                egress_dropped = delta.egress_dropped,
                filter_dropped = delta.filter_dropped,
                late = delta.late,
                corrupt = delta.corrupt,
                "realtime MIDI transport lost or delayed events"
            );
        }
        self.seen_stats = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::{OscBundle, OscType};

    const RULES: &str = "\
/synth/{i}/note ii, ch, key, vel : noteon(ch, key, vel)
/shift i, s : setshift(s)
/chan i, c : setchannel(c)
/play i, key : noteon(channel, key, velocity)
";

    fn session() -> Session {
        Session::builder().rules(RULES).build().unwrap()
    }

    fn osc(addr: &str, args: Vec<OscType>) -> OscMessage {
        OscMessage {
            addr: addr.to_string(),
            args,
        }
    }

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert!(!config.strict_match);
        assert!(config.validate().is_ok());
        let bad = SessionConfig {
            channel: 16,
            ..SessionConfig::default()
        };
        assert!(matches!(bad.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_handle_osc_without_transport() {
        let mut session = session();
        let out = session.handle_osc(&osc(
            "/synth/2/note",
            vec![OscType::Int(60), OscType::Int(90)],
        ));
        assert_eq!(out, vec![[0x92, 60, 90]]);
        assert!(session.poll_midi().is_empty());
    }

    #[test]
    fn test_controls_update_globals_and_shift() {
        let mut session = session();
        assert!(session
            .handle_osc(&osc("/chan", vec![OscType::Int(4)]))
            .is_empty());
        assert!(session
            .handle_osc(&osc("/shift", vec![OscType::Int(-5)]))
            .is_empty());
        assert_eq!(session.globals().channel, 4);
        assert_eq!(session.globals().shift, -5);
        assert_eq!(session.shift_handle().get(), -5);
        assert_eq!(
            session.handle_osc(&osc("/play", vec![OscType::Int(60)])),
            vec![[0x94, 60, 100]]
        );
    }

    #[test]
    fn test_bundles_are_flattened() {
        let mut session = session();
        let note = |key| {
            OscPacket::Message(osc(
                "/synth/0/note",
                vec![OscType::Int(key), OscType::Int(1)],
            ))
        };
        let packet = OscPacket::Bundle(OscBundle {
            timetag: (0, 1).into(),
            content: vec![note(60), OscPacket::Bundle(OscBundle {
                timetag: (0, 1).into(),
                content: vec![note(64)],
            })],
        });
        assert_eq!(
            session.handle_packet(&packet),
            vec![[0x90, 60, 1], [0x90, 64, 1]]
        );
    }

    #[test]
    fn test_note_off_is_normalized_before_matching() {
        let mut session = Session::builder()
            .rules("/off/{i} i, ch, key : noteoff(ch, key, 0)")
            .build()
            .unwrap();
        let out = session.handle_midi([0x83, 60, 64]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].addr, "/off/3");
        assert_eq!(out[0].args, vec![OscType::Int(60)]);
    }

    #[test]
    fn test_add_rule_reports_errors() {
        let mut session = session();
        assert!(session.add_rule("/x i : noteon(1,2").is_err());
        assert!(session.add_rule("/pc i, p : programchange(0, p)").is_ok());
        assert_eq!(session.rules().len(), 5);
    }
}
