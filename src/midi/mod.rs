//! MIDI functionality for midiclockrs
//!
//! This module provides:
//! - MIDI value types, wire encoding and error handling
//! - Timed messages and the beat-relative scheduling [`Clock`]
//! - Input decoding with NRPN reassembly
//! - Real MIDI device communication via midir
//! - A mock output device for testing
//!
//! The main components are:
//! - [`OutputDevice`] and [`InputDevice`] traits for the device capabilities
//! - [`MidirOutputDevice`], [`MidirInputDevice`] and [`DeviceRegistry`] for real ports
//! - [`MockOutputDevice`] for testing
//! - [`Message`] and [`Clock`] for scheduled playback
//! - [`InputDispatcher`] for decoding and fanning out received messages
pub mod clock;
mod engine;
mod input;
mod message;
pub mod midir_engine;
pub mod mock_engine;
pub mod types;

pub use engine::{InputDevice, MidiError, OutputDevice, Result, ShortMessage, WireMessage};

pub use midir_engine::{DeviceRegistry, MidirInputDevice, MidirOutputDevice};
pub use mock_engine::MockOutputDevice;

pub use clock::{Clock, ClockHandle, DeliveryError, MessageQueue, TimeBase};
pub use input::{InputDispatcher, InputEvent, NrpnAssembler};
pub use message::{CallbackFn, Message, MessageKind};
pub use types::{Channel, Control, Percussion, Pitch};
