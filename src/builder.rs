//! Builder for configuring and constructing a [`Session`].

use oscmidi_mapping::RuleSet;
use oscmidi_rt::MidiTransport;

use crate::session::{Session, SessionConfig};
use crate::Result;

/// Rules are compiled in [`SessionBuilder::build`]. Bad lines are logged and
/// skipped; they show up in [`Session::load_report`].
///
/// # Example
///
/// ```ignore
/// use oscmidi::prelude::*;
///
/// let config = TransportConfig::default();
/// let (midi, processor) = transport(&config)?;
/// let jack = JackTransport::start(&config, processor)?;
///
/// let mut session = Session::builder()
///     .rules(&std::fs::read_to_string("bridge.conf")?)
///     .strict(true)
///     .transport(midi)
///     .build()?;
///
/// session.handle_osc(&msg);
/// for reply in session.poll_midi() {
///     // send reply over OSC
/// }
/// ```
#[derive(Default)]
pub struct SessionBuilder {
    sources: Vec<String>,
    config: SessionConfig,
    transport: Option<MidiTransport>,
}

impl SessionBuilder {
    /// Add a block of rule lines. May be called more than once.
    pub fn rules(mut self, text: &str) -> Self {
        self.sources.push(text.to_string());
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Default: false
    pub fn strict(mut self, strict: bool) -> Self {
        self.config.strict_match = strict;
        self
    }

    /// Initial transpose shift. Default: 0
    pub fn shift(mut self, shift: i8) -> Self {
        self.config.shift = shift;
        self
    }

    /// Without a transport the session only translates; nothing is sent.
    pub fn transport(mut self, transport: MidiTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<Session> {
        self.config.validate()?;

        let mut rules = RuleSet::new();
        let mut report = oscmidi_mapping::LoadReport::default();
        for text in &self.sources {
            let part = rules.load(text);
            report.loaded += part.loaded;
            report.rejected.extend(part.rejected);
        }

        Ok(Session::from_parts(
            rules,
            report,
            self.config,
            self.transport,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_collects_rejections() {
        let session = Session::builder()
            .rules("/a i, n : noteon(0, n, 1)\n/bad i : noteon(")
            .rules("/b i, n : noteoff(0, n, 0)")
            .strict(true)
            .shift(3)
            .build()
            .unwrap();
        assert_eq!(session.rules().len(), 2);
        assert_eq!(session.load_report().loaded, 2);
        assert_eq!(session.load_report().rejected.len(), 1);
        assert!(session.is_strict());
        assert_eq!(session.shift_handle().get(), 3);
    }

    #[test]
    fn test_invalid_config_fails_build() {
        let config = SessionConfig {
            velocity: 200,
            ..SessionConfig::default()
        };
        assert!(Session::builder().config(config).build().is_err());
    }
}
