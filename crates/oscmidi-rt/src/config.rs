//! Transport configuration.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default number of events each ring buffer holds.
pub const DEFAULT_RING_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Name the audio client registers under.
    pub client_name: String,
    /// Register `midi_in` and fill the ingress ring.
    pub use_input: bool,
    /// Register `midi_out` and drain the egress ring.
    pub use_output: bool,
    /// Register the `filter_in`/`filter_out` pair and run the transpose filter.
    pub use_filter: bool,
    pub ring_capacity: usize,
    /// Used to extrapolate frame time between blocks until the driver
    /// reports its own rate.
    pub sample_rate: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            client_name: "oscmidi".to_string(),
            use_input: true,
            use_output: true,
            use_filter: false,
            ring_capacity: DEFAULT_RING_CAPACITY,
            sample_rate: 48_000,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.client_name.is_empty() {
            return Err(Error::InvalidConfig("client_name must not be empty".into()));
        }
        if self.ring_capacity == 0 {
            return Err(Error::InvalidConfig(
                "ring_capacity must hold at least one event".into(),
            ));
        }
        if !(8_000..=384_000).contains(&self.sample_rate) {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        Ok(())
    }
}
