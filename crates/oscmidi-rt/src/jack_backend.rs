//! JACK backend.
//!
//! Registers the ports the configuration asks for and runs the
//! [`RealtimeProcessor`] inside the JACK process callback. Requires the
//! `jack` feature.

use jack::{
    AsyncClient, Client, ClientOptions, ClientStatus, Control, MidiIn, MidiOut, MidiWriter, Port,
    ProcessScope, RawMidi,
};
use std::ops::ControlFlow;
use tracing::{info, warn};

use crate::config::TransportConfig;
use crate::error::SinkFull;
use crate::port::{MidiSink, MidiSource, RawEvent};
use crate::processor::{BlockInfo, ProcessIo, RealtimeProcessor};
use crate::{Error, Result};

struct JackSource<'a> {
    port: &'a Port<MidiIn>,
    ps: &'a ProcessScope,
}

impl MidiSource for JackSource<'_> {
    fn for_each_event(&self, f: &mut dyn FnMut(RawEvent<'_>) -> ControlFlow<()>) {
        for event in self.port.iter(self.ps) {
            let event = RawEvent {
                time: event.time,
                bytes: event.bytes,
            };
            if f(event).is_break() {
                break;
            }
        }
    }
}

/// The writer clears the port buffer when it is created.
struct JackSink<'a>(MidiWriter<'a>);

impl MidiSink for JackSink<'_> {
    fn write(&mut self, time: u32, bytes: &[u8]) -> std::result::Result<(), SinkFull> {
        self.0.write(&RawMidi { time, bytes }).map_err(|_| SinkFull)
    }
}

#[derive(Default)]
struct Ports {
    midi_in: Option<Port<MidiIn>>,
    midi_out: Option<Port<MidiOut>>,
    filter_in: Option<Port<MidiIn>>,
    filter_out: Option<Port<MidiOut>>,
}

struct JackProcess {
    processor: RealtimeProcessor,
    ports: Ports,
}

impl jack::ProcessHandler for JackProcess {
    fn process(&mut self, _client: &Client, ps: &ProcessScope) -> Control {
        let block = BlockInfo {
            nframes: ps.n_frames(),
            last_frame_time: ps.last_frame_time(),
        };

        let Ports {
            midi_in,
            midi_out,
            filter_in,
            filter_out,
        } = &mut self.ports;
        let midi_in = midi_in.as_ref().map(|port| JackSource { port, ps });
        let filter_in = filter_in.as_ref().map(|port| JackSource { port, ps });
        let mut midi_out = midi_out.as_mut().map(|port| JackSink(port.writer(ps)));
        let mut filter_out = filter_out.as_mut().map(|port| JackSink(port.writer(ps)));

        let io = ProcessIo {
            midi_in: midi_in.as_ref().map(|s| s as &dyn MidiSource),
            midi_out: midi_out.as_mut().map(|s| s as &mut dyn MidiSink),
            filter_in: filter_in.as_ref().map(|s| s as &dyn MidiSource),
            filter_out: filter_out.as_mut().map(|s| s as &mut dyn MidiSink),
        };
        self.processor.process(block, io);
        Control::Continue
    }
}

struct Notifications;

impl jack::NotificationHandler for Notifications {
    unsafe fn shutdown(&mut self, status: ClientStatus, reason: &str) {
        warn!(?status, reason, "JACK server shut the client down");
    }
}

/// A running JACK client. Dropping it deactivates the client.
pub struct JackTransport {
    client: AsyncClient<Notifications, JackProcess>,
}

fn register<P: jack::PortSpec + Default>(
    client: &Client,
    enabled: bool,
    name: &str,
) -> Result<Option<Port<P>>> {
    if !enabled {
        return Ok(None);
    }
    client
        .register_port(name, P::default())
        .map(Some)
        .map_err(|e| Error::PortRegistration {
            port: name.to_string(),
            reason: e.to_string(),
        })
}

impl JackTransport {
    /// Opens a client named after `config.client_name` without starting a
    /// server, registers the enabled ports and activates the processor.
    pub fn start(config: &TransportConfig, processor: RealtimeProcessor) -> Result<Self> {
        config.validate()?;
        let (client, _status) = Client::new(&config.client_name, ClientOptions::NO_START_SERVER)
            .map_err(|e| Error::ClientOpen {
                name: config.client_name.clone(),
                reason: e.to_string(),
            })?;

        let ports = Ports {
            midi_in: register(&client, config.use_input, "midi_in")?,
            midi_out: register(&client, config.use_output, "midi_out")?,
            filter_in: register(&client, config.use_filter, "filter_in")?,
            filter_out: register(&client, config.use_filter, "filter_out")?,
        };

        processor.set_sample_rate(client.sample_rate() as u32);
        let name = client.name().to_string();
        let client = client
            .activate_async(Notifications, JackProcess { processor, ports })
            .map_err(|e| Error::Activation(e.to_string()))?;

        info!(client = %name, "JACK MIDI client active");
        Ok(Self { client })
    }

    pub fn name(&self) -> &str {
        self.client.as_client().name()
    }

    pub fn sample_rate(&self) -> u32 {
        self.client.as_client().sample_rate() as u32
    }

    /// JACK's own estimate of the current frame time.
    pub fn frame_time(&self) -> u32 {
        self.client.as_client().frame_time()
    }

    /// Deactivates the client and hands the processor back.
    pub fn stop(self) -> Result<RealtimeProcessor> {
        let (_client, _notifications, process) = self
            .client
            .deactivate()
            .map_err(|e| Error::Activation(e.to_string()))?;
        Ok(process.processor)
    }
}
