//! Small MIDI value types shared by messages, the codec and input events

use crate::midi::{MidiError, Result};
use std::fmt;

/// Largest value carried by a single MIDI data byte
pub const MAX_7BIT: u16 = 127;
/// Largest value carried by a pair of MIDI data bytes (pitch bend, NRPN)
pub const MAX_14BIT: u16 = 16_383;

pub(crate) fn check_7bit(what: &'static str, value: u8) -> Result<u8> {
    check_range(what, value as u16, MAX_7BIT).map(|v| v as u8)
}

pub(crate) fn check_14bit(what: &'static str, value: u16) -> Result<u16> {
    check_range(what, value, MAX_14BIT)
}

fn check_range(what: &'static str, value: u16, max: u16) -> Result<u16> {
    if value > max {
        return Err(MidiError::OutOfRange { what, value, max });
    }
    Ok(value)
}

/// Splits a 14-bit value into its (MSB, LSB) 7-bit halves
pub fn split_14bit(value: u16) -> (u8, u8) {
    (((value >> 7) & 0x7F) as u8, (value & 0x7F) as u8)
}

/// Joins two 7-bit halves into a 14-bit value
pub fn join_14bit(msb: u8, lsb: u8) -> u16 {
    ((msb as u16 & 0x7F) << 7) | (lsb as u16 & 0x7F)
}

/// A MIDI channel, stored zero-based and displayed one-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Channel(u8);

impl Channel {
    /// Channel 10, reserved for percussion in General MIDI
    pub const PERCUSSION: Channel = Channel(9);

    pub fn new(index: u8) -> Result<Self> {
        if index > 15 {
            return Err(MidiError::OutOfRange {
                what: "channel",
                value: index as u16,
                max: 15,
            });
        }
        Ok(Channel(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// All sixteen channels in order
    pub fn all() -> impl Iterator<Item = Channel> {
        (0..16).map(Channel)
    }

    pub(crate) fn from_status(status: u8) -> Self {
        Channel(status & 0x0F)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Channel {}", self.0 + 1)
    }
}

/// A MIDI note number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pitch(u8);

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

impl Pitch {
    pub const MIDDLE_C: Pitch = Pitch(60);

    pub fn new(value: u8) -> Result<Self> {
        check_7bit("pitch", value).map(Pitch)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Moves the pitch by `semitones`, failing if it leaves the MIDI range
    pub fn transpose(self, semitones: i16) -> Result<Self> {
        let shifted = self.0 as i32 + semitones as i32;
        if !(0..=MAX_7BIT as i32).contains(&shifted) {
            return Err(MidiError::OutOfRange {
                what: "pitch",
                value: shifted.unsigned_abs().min(u16::MAX as u32) as u16,
                max: MAX_7BIT,
            });
        }
        Ok(Pitch(shifted as u8))
    }

    /// Scientific pitch name, with middle C as `C4`
    pub fn name(self) -> String {
        let octave = (self.0 / 12) as i16 - 1;
        format!("{}{}", NOTE_NAMES[(self.0 % 12) as usize], octave)
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A continuous controller number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Control(u8);

impl Control {
    pub const BANK_SELECT: Control = Control(0);
    pub const MODULATION_WHEEL: Control = Control(1);
    pub const DATA_ENTRY_MSB: Control = Control(6);
    pub const VOLUME: Control = Control(7);
    pub const PAN: Control = Control(10);
    pub const EXPRESSION: Control = Control(11);
    pub const DATA_ENTRY_LSB: Control = Control(38);
    pub const SUSTAIN_PEDAL: Control = Control(64);
    pub const NON_REGISTERED_PARAMETER_LSB: Control = Control(98);
    pub const NON_REGISTERED_PARAMETER_MSB: Control = Control(99);
    pub const REGISTERED_PARAMETER_LSB: Control = Control(100);
    pub const REGISTERED_PARAMETER_MSB: Control = Control(101);
    pub const ALL_SOUND_OFF: Control = Control(120);
    pub const RESET_ALL_CONTROLLERS: Control = Control(121);
    pub const ALL_NOTES_OFF: Control = Control(123);

    pub fn new(number: u8) -> Result<Self> {
        check_7bit("control", number).map(Control)
    }

    pub fn number(self) -> u8 {
        self.0
    }
}

/// General MIDI percussion key map, played on [`Channel::PERCUSSION`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Percussion {
    AcousticBassDrum = 35,
    BassDrum1 = 36,
    SideStick = 37,
    AcousticSnare = 38,
    HandClap = 39,
    ElectricSnare = 40,
    LowFloorTom = 41,
    ClosedHiHat = 42,
    HighFloorTom = 43,
    PedalHiHat = 44,
    LowTom = 45,
    OpenHiHat = 46,
    LowMidTom = 47,
    HiMidTom = 48,
    CrashCymbal1 = 49,
    HighTom = 50,
    RideCymbal1 = 51,
    ChineseCymbal = 52,
    RideBell = 53,
    Tambourine = 54,
    SplashCymbal = 55,
    Cowbell = 56,
    CrashCymbal2 = 57,
    Vibraslap = 58,
    RideCymbal2 = 59,
    HiBongo = 60,
    LowBongo = 61,
    MuteHiConga = 62,
    OpenHiConga = 63,
    LowConga = 64,
    HighTimbale = 65,
    LowTimbale = 66,
    HighAgogo = 67,
    LowAgogo = 68,
    Cabasa = 69,
    Maracas = 70,
    ShortWhistle = 71,
    LongWhistle = 72,
    ShortGuiro = 73,
    LongGuiro = 74,
    Claves = 75,
    HiWoodBlock = 76,
    LowWoodBlock = 77,
    MuteCuica = 78,
    OpenCuica = 79,
    MuteTriangle = 80,
    OpenTriangle = 81,
}

impl Percussion {
    pub fn pitch(self) -> Pitch {
        Pitch(self as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_bounds() {
        assert!(Channel::new(15).is_ok());
        assert!(Channel::new(16).is_err());
        assert_eq!(Channel::all().count(), 16);
        assert_eq!(Channel::PERCUSSION.to_string(), "Channel 10");
    }

    #[test]
    fn test_pitch_names_and_transpose() {
        assert_eq!(Pitch::MIDDLE_C.name(), "C4");
        assert_eq!(Pitch::new(69).unwrap().name(), "A4");
        assert_eq!(Pitch::new(0).unwrap().name(), "C-1");
        assert_eq!(Pitch::MIDDLE_C.transpose(7).unwrap().value(), 67);
        assert!(Pitch::new(120).unwrap().transpose(8).is_err());
        assert!(Pitch::new(3).unwrap().transpose(-4).is_err());
        assert!(Pitch::new(128).is_err());
    }

    #[test]
    fn test_transpose_extremes() {
        assert!(matches!(
            Pitch::new(127).unwrap().transpose(i16::MAX),
            Err(MidiError::OutOfRange { value: 32_767, .. })
        ));
        assert!(Pitch::new(0).unwrap().transpose(i16::MIN).is_err());
        assert_eq!(Pitch::new(127).unwrap().transpose(-127).unwrap().value(), 0);
    }

    #[test]
    fn test_14bit_halves() {
        assert_eq!(split_14bit(640), (5, 0));
        assert_eq!(split_14bit(MAX_14BIT), (127, 127));
        assert_eq!(join_14bit(1, 0), 128);
        assert_eq!(join_14bit(64, 0), 8192);
    }

    #[test]
    fn test_percussion_pitch() {
        assert_eq!(Percussion::AcousticBassDrum.pitch().value(), 35);
        assert_eq!(Percussion::OpenTriangle.pitch().value(), 81);
    }
}
