use crate::midi::types::{check_7bit, check_14bit, join_14bit, split_14bit};
use crate::midi::types::{Channel, Control, Pitch};
use thiserror::Error;

/// Error type for MIDI and clock operations
#[derive(Debug, Error)]
pub enum MidiError {
    /// Error when sending a MIDI message
    #[error("MIDI send error: {0}")]
    SendError(String),
    /// Error when connecting to a MIDI device
    #[error("MIDI connection error: {0}")]
    ConnectionError(String),
    /// No port with the requested name exists
    #[error("MIDI device not found: {0}")]
    DeviceNotFound(String),
    /// The device has not been opened, or was closed
    #[error("MIDI device is not open: {0}")]
    DeviceClosed(String),
    /// An operation was attempted in a state that does not allow it
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    /// A MIDI value outside its legal range
    #[error("{what} out of range: {value} (maximum {max})")]
    OutOfRange {
        what: &'static str,
        value: u16,
        max: u16,
    },
    #[error("invalid tempo: {0} BPM")]
    InvalidTempo(f64),
    #[error("invalid time: {0}")]
    InvalidTime(f64),
    #[error("malformed SysEx message: {0}")]
    MalformedSysEx(&'static str),
    /// A message callback panicked on the delivery thread
    #[error("callback panicked: {0}")]
    CallbackPanicked(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
}

impl From<midir::InitError> for MidiError {
    fn from(e: midir::InitError) -> Self {
        MidiError::ConnectionError(e.to_string())
    }
}

impl From<midir::PortInfoError> for MidiError {
    fn from(e: midir::PortInfoError) -> Self {
        MidiError::ConnectionError(e.to_string())
    }
}

impl From<midir::SendError> for MidiError {
    fn from(e: midir::SendError) -> Self {
        MidiError::SendError(e.to_string())
    }
}

impl From<midir::ConnectError<midir::MidiOutput>> for MidiError {
    fn from(e: midir::ConnectError<midir::MidiOutput>) -> Self {
        MidiError::ConnectionError(e.to_string())
    }
}

impl From<midir::ConnectError<midir::MidiInput>> for MidiError {
    fn from(e: midir::ConnectError<midir::MidiInput>) -> Self {
        MidiError::ConnectionError(e.to_string())
    }
}

/// Result type for MIDI operations
pub type Result<T> = std::result::Result<T, MidiError>;

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const CONTROL_CHANGE: u8 = 0xB0;
const PROGRAM_CHANGE: u8 = 0xC0;
const PITCH_BEND: u8 = 0xE0;
pub(crate) const SYSEX_START: u8 = 0xF0;
pub(crate) const SYSEX_END: u8 = 0xF7;

/// A channel-voice message as it travels on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortMessage {
    status: u8,
    data1: u8,
    data2: u8,
}

impl ShortMessage {
    pub fn note_on(channel: Channel, pitch: Pitch, velocity: u8) -> Result<Self> {
        let velocity = check_7bit("velocity", velocity)?;
        Ok(Self::channel_voice(NOTE_ON, channel, pitch.value(), velocity))
    }

    pub fn note_off(channel: Channel, pitch: Pitch, velocity: u8) -> Result<Self> {
        let velocity = check_7bit("velocity", velocity)?;
        Ok(Self::channel_voice(NOTE_OFF, channel, pitch.value(), velocity))
    }

    pub fn control_change(channel: Channel, control: Control, value: u8) -> Result<Self> {
        let value = check_7bit("control value", value)?;
        Ok(Self::channel_voice(
            CONTROL_CHANGE,
            channel,
            control.number(),
            value,
        ))
    }

    pub fn program_change(channel: Channel, instrument: u8) -> Result<Self> {
        let instrument = check_7bit("instrument", instrument)?;
        Ok(Self::channel_voice(PROGRAM_CHANGE, channel, instrument, 0))
    }

    /// Pitch bend where 8192 is centred
    pub fn pitch_bend(channel: Channel, value: u16) -> Result<Self> {
        let (msb, lsb) = split_14bit(check_14bit("pitch bend", value)?);
        Ok(Self::channel_voice(PITCH_BEND, channel, lsb, msb))
    }

    fn channel_voice(kind: u8, channel: Channel, data1: u8, data2: u8) -> Self {
        Self {
            status: kind | channel.index(),
            data1,
            data2,
        }
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    pub fn channel(&self) -> Channel {
        Channel::from_status(self.status)
    }

    pub fn data1(&self) -> u8 {
        self.data1
    }

    pub fn data2(&self) -> u8 {
        self.data2
    }

    /// Encodes the message, dropping the unused second data byte where needed
    pub fn to_bytes(&self) -> Vec<u8> {
        match self.status & 0xF0 {
            PROGRAM_CHANGE | 0xD0 => vec![self.status, self.data1],
            _ => vec![self.status, self.data1, self.data2],
        }
    }

    /// Parses a channel-voice message; system and truncated messages yield `None`
    pub fn decode(data: &[u8]) -> Option<Self> {
        let status = *data.first()?;
        match status & 0xF0 {
            NOTE_OFF | NOTE_ON | 0xA0 | CONTROL_CHANGE | PITCH_BEND if data.len() >= 3 => {
                Some(Self {
                    status,
                    data1: data[1] & 0x7F,
                    data2: data[2] & 0x7F,
                })
            }
            PROGRAM_CHANGE | 0xD0 if data.len() >= 2 => Some(Self {
                status,
                data1: data[1] & 0x7F,
                data2: 0,
            }),
            _ => None,
        }
    }
}

/// Anything an output device can transmit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Short(ShortMessage),
    /// A complete SysEx message including the `F0`/`F7` framing bytes
    SysEx(Vec<u8>),
}

impl WireMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            WireMessage::Short(msg) => msg.to_bytes(),
            WireMessage::SysEx(data) => data.clone(),
        }
    }
}

impl From<ShortMessage> for WireMessage {
    fn from(msg: ShortMessage) -> Self {
        WireMessage::Short(msg)
    }
}

/// Checks the `F0 ... F7` framing and that the payload bytes are 7-bit
pub(crate) fn validate_sysex(data: &[u8]) -> Result<()> {
    if data.len() < 2 {
        return Err(MidiError::MalformedSysEx("too short"));
    }
    if data[0] != SYSEX_START {
        return Err(MidiError::MalformedSysEx("missing F0 start byte"));
    }
    if data[data.len() - 1] != SYSEX_END {
        return Err(MidiError::MalformedSysEx("missing F7 end byte"));
    }
    if data[1..data.len() - 1].iter().any(|b| b & 0x80 != 0) {
        return Err(MidiError::MalformedSysEx("payload byte above 0x7F"));
    }
    Ok(())
}

/// Trait implemented by anything that can transmit MIDI messages
pub trait OutputDevice: Send + Sync {
    fn name(&self) -> &str;

    fn open(&self) -> Result<()>;

    fn close(&self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Sends a message to the device
    fn send(&self, msg: &WireMessage) -> Result<()>;

    /// Sends All Notes Off on every channel
    fn silence_all(&self) -> Result<()> {
        for channel in Channel::all() {
            self.send(&ShortMessage::control_change(channel, Control::ALL_NOTES_OFF, 0)?.into())?;
        }
        Ok(())
    }
}

/// Trait implemented by MIDI input ports
///
/// Received bytes are handed to the device's [`InputDispatcher`], which decodes
/// them and fans events out to registered handlers.
///
/// [`InputDispatcher`]: crate::midi::InputDispatcher
pub trait InputDevice: Send + Sync {
    fn name(&self) -> &str;

    fn open(&self) -> Result<()>;

    fn close(&self) -> Result<()>;

    fn is_open(&self) -> bool;

    fn dispatcher(&self) -> &std::sync::Arc<crate::midi::InputDispatcher>;
}

pub(crate) fn pitch_bend_value(msg: &ShortMessage) -> u16 {
    join_14bit(msg.data2, msg.data1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(i: u8) -> Channel {
        Channel::new(i).unwrap()
    }

    #[test]
    fn test_short_message_encoding() {
        let msg = ShortMessage::note_on(ch(0), Pitch::MIDDLE_C, 100).unwrap();
        assert_eq!(msg.to_bytes(), vec![0x90, 60, 100]);

        let msg = ShortMessage::program_change(ch(3), 42).unwrap();
        assert_eq!(msg.to_bytes(), vec![0xC3, 42]);

        let msg = ShortMessage::pitch_bend(ch(1), 8192).unwrap();
        assert_eq!(msg.to_bytes(), vec![0xE1, 0x00, 0x40]);
        assert_eq!(pitch_bend_value(&msg), 8192);
    }

    #[test]
    fn test_short_message_validation() {
        assert!(ShortMessage::note_on(ch(0), Pitch::MIDDLE_C, 128).is_err());
        assert!(ShortMessage::control_change(ch(0), Control::VOLUME, 200).is_err());
        assert!(ShortMessage::pitch_bend(ch(0), 16_384).is_err());
        assert!(ShortMessage::program_change(ch(0), 128).is_err());
    }

    #[test]
    fn test_decode() {
        let msg = ShortMessage::decode(&[0xB2, 7, 99]).unwrap();
        assert_eq!(msg.channel(), ch(2));
        assert_eq!(msg.data1(), 7);
        assert_eq!(msg.data2(), 99);

        assert!(ShortMessage::decode(&[]).is_none());
        assert!(ShortMessage::decode(&[0x90, 60]).is_none());
        assert!(ShortMessage::decode(&[0xF8]).is_none());
        assert_eq!(
            ShortMessage::decode(&[0xC0, 5]).unwrap().to_bytes(),
            vec![0xC0, 5]
        );
    }

    #[test]
    fn test_sysex_framing() {
        assert!(validate_sysex(&[0xF0, 0x7E, 0x7F, 0x09, 0x01, 0xF7]).is_ok());
        assert!(validate_sysex(&[0xF0]).is_err());
        assert!(validate_sysex(&[0x90, 0x01, 0xF7]).is_err());
        assert!(validate_sysex(&[0xF0, 0x01, 0x02]).is_err());
        assert!(validate_sysex(&[0xF0, 0x81, 0xF7]).is_err());
    }

    #[test]
    fn test_midi_error_display() {
        let send_error = MidiError::SendError("Failed to send".to_string());
        let conn_error = MidiError::ConnectionError("Failed to connect".to_string());
        assert_eq!(send_error.to_string(), "MIDI send error: Failed to send");
        assert_eq!(
            conn_error.to_string(),
            "MIDI connection error: Failed to connect"
        );
        let range = MidiError::OutOfRange {
            what: "velocity",
            value: 130,
            max: 127,
        };
        assert_eq!(range.to_string(), "velocity out of range: 130 (maximum 127)");
    }
}
