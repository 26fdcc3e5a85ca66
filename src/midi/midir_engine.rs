use crate::midi::{InputDevice, InputDispatcher, MidiError, OutputDevice, Result, WireMessage};
use log::{debug, info};
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use std::sync::Arc;

const CLIENT_NAME: &str = "midiclockrs";

/// Picks the port matching `query`, preferring an exact name over a substring
pub fn resolve_port_name<'a>(names: &'a [String], query: &str) -> Option<&'a String> {
    names
        .iter()
        .find(|name| name.as_str() == query)
        .or_else(|| names.iter().find(|name| name.contains(query)))
}

/// Cached list of the system's MIDI ports
///
/// The lists are read once on construction and only change on
/// [`DeviceRegistry::refresh`].
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl DeviceRegistry {
    pub fn new() -> Result<Self> {
        let mut registry = Self::default();
        registry.refresh()?;
        Ok(registry)
    }

    /// Re-reads the port lists from the system
    pub fn refresh(&mut self) -> Result<()> {
        let midi_in = MidiInput::new(&format!("{}-list", CLIENT_NAME))?;
        self.inputs = midi_in
            .ports()
            .iter()
            .filter_map(|p| midi_in.port_name(p).ok())
            .collect();

        let midi_out = MidiOutput::new(&format!("{}-list", CLIENT_NAME))?;
        self.outputs = midi_out
            .ports()
            .iter()
            .filter_map(|p| midi_out.port_name(p).ok())
            .collect();

        debug!(
            "Found {} MIDI input(s) and {} output(s)",
            self.inputs.len(),
            self.outputs.len()
        );
        Ok(())
    }

    pub fn input_names(&self) -> &[String] {
        &self.inputs
    }

    pub fn output_names(&self) -> &[String] {
        &self.outputs
    }

    /// Opens the output port matching `query`
    pub fn open_output(&self, query: &str) -> Result<Arc<MidirOutputDevice>> {
        let name = resolve_port_name(&self.outputs, query)
            .ok_or_else(|| MidiError::DeviceNotFound(query.to_string()))?;
        let device = Arc::new(MidirOutputDevice::new(name.clone()));
        device.open()?;
        Ok(device)
    }

    /// Opens the input port matching `query`
    pub fn open_input(&self, query: &str) -> Result<Arc<MidirInputDevice>> {
        let name = resolve_port_name(&self.inputs, query)
            .ok_or_else(|| MidiError::DeviceNotFound(query.to_string()))?;
        let device = Arc::new(MidirInputDevice::new(name.clone()));
        device.open()?;
        Ok(device)
    }
}

/// Output port backed by midir
pub struct MidirOutputDevice {
    name: String,
    connection: Mutex<Option<MidiOutputConnection>>,
}

impl MidirOutputDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connection: Mutex::new(None),
        }
    }
}

impl OutputDevice for MidirOutputDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> Result<()> {
        let mut connection = self.connection.lock();
        if connection.is_some() {
            return Ok(());
        }
        let midi_out = MidiOutput::new(CLIENT_NAME)?;
        let out_ports = midi_out.ports();
        let port = out_ports
            .iter()
            .find(|p| midi_out.port_name(p).map(|n| n == self.name).unwrap_or(false))
            .ok_or_else(|| MidiError::DeviceNotFound(self.name.clone()))?;

        info!("Connecting to MIDI output port: {}", self.name);
        *connection = Some(midi_out.connect(port, &format!("{}-output", CLIENT_NAME))?);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if let Some(connection) = self.connection.lock().take() {
            connection.close();
            info!("Closed MIDI output port: {}", self.name);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.connection.lock().is_some()
    }

    fn send(&self, msg: &WireMessage) -> Result<()> {
        let mut connection = self.connection.lock();
        let conn = connection
            .as_mut()
            .ok_or_else(|| MidiError::DeviceClosed(self.name.clone()))?;
        let bytes = msg.to_bytes();
        debug!("Sending {:02X?} to {}", bytes, self.name);
        conn.send(&bytes)?;
        Ok(())
    }
}

/// Input port backed by midir
///
/// The midir callback thread feeds every received message to the device's
/// [`InputDispatcher`].
pub struct MidirInputDevice {
    name: String,
    dispatcher: Arc<InputDispatcher>,
    connection: Mutex<Option<MidiInputConnection<()>>>,
}

impl MidirInputDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dispatcher: Arc::new(InputDispatcher::new()),
            connection: Mutex::new(None),
        }
    }
}

impl InputDevice for MidirInputDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> Result<()> {
        let mut connection = self.connection.lock();
        if connection.is_some() {
            return Ok(());
        }
        let mut midi_in = MidiInput::new(CLIENT_NAME)?;
        midi_in.ignore(Ignore::TimeAndActiveSense);

        let in_ports = midi_in.ports();
        let port = in_ports
            .iter()
            .find(|p| midi_in.port_name(p).map(|n| n == self.name).unwrap_or(false))
            .ok_or_else(|| MidiError::DeviceNotFound(self.name.clone()))?;

        info!("Connecting to MIDI input port: {}", self.name);
        let dispatcher = Arc::clone(&self.dispatcher);
        *connection = Some(midi_in.connect(
            port,
            &format!("{}-input", CLIENT_NAME),
            move |stamp, message, _| dispatcher.dispatch(message, stamp),
            (),
        )?);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if let Some(connection) = self.connection.lock().take() {
            connection.close();
            info!("Closed MIDI input port: {}", self.name);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.connection.lock().is_some()
    }

    fn dispatcher(&self) -> &Arc<InputDispatcher> {
        &self.dispatcher
    }
}
