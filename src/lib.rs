pub mod cli;
pub mod config;
pub mod logging;
pub mod midi;
pub mod ui;

pub use midi::{
    Channel, Clock, ClockHandle, Control, InputEvent, Message, MidiError, OutputDevice,
    Percussion, Pitch, Result,
};
