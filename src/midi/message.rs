//! Timed messages the clock schedules and fires
//!
//! A [`Message`] pairs a beat time with a [`MessageKind`]. Messages are
//! immutable: re-timing one with [`Message::time_shifted`] produces a copy.
//! Most kinds address an [`OutputDevice`]; `NoteOnOff` and `Callback` also get
//! the firing clock's [`ClockHandle`] so they can schedule follow-up messages.

use crate::midi::engine::{validate_sysex, OutputDevice, ShortMessage, WireMessage};
use crate::midi::types::{check_14bit, check_7bit, split_14bit};
use crate::midi::types::{Channel, Control, Percussion, Pitch};
use crate::midi::{ClockHandle, MidiError, Result};
use std::fmt;
use std::sync::Arc;

/// Closure run by a [`MessageKind::Callback`] message with the firing clock and
/// the message's scheduled beat time
pub type CallbackFn = dyn Fn(&ClockHandle, f64) -> Result<()> + Send + Sync;

#[derive(Clone)]
pub enum MessageKind {
    NoteOn {
        device: Arc<dyn OutputDevice>,
        channel: Channel,
        pitch: Pitch,
        velocity: u8,
    },
    NoteOff {
        device: Arc<dyn OutputDevice>,
        channel: Channel,
        pitch: Pitch,
        velocity: u8,
    },
    /// A note on that schedules its own note off `duration` beats later
    NoteOnOff {
        device: Arc<dyn OutputDevice>,
        channel: Channel,
        pitch: Pitch,
        velocity: u8,
        duration: f64,
    },
    ControlChange {
        device: Arc<dyn OutputDevice>,
        channel: Channel,
        control: Control,
        value: u8,
    },
    ProgramChange {
        device: Arc<dyn OutputDevice>,
        channel: Channel,
        instrument: u8,
    },
    PitchBend {
        device: Arc<dyn OutputDevice>,
        channel: Channel,
        value: u16,
    },
    SysEx {
        device: Arc<dyn OutputDevice>,
        data: Arc<[u8]>,
    },
    Percussion {
        device: Arc<dyn OutputDevice>,
        percussion: Percussion,
        velocity: u8,
    },
    /// A 14-bit parameter/value pair sent as four control changes
    Nrpn {
        device: Arc<dyn OutputDevice>,
        channel: Channel,
        parameter: u16,
        value: u16,
    },
    Callback { callback: Arc<CallbackFn> },
}

impl fmt::Debug for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::NoteOn {
                device,
                channel,
                pitch,
                velocity,
            } => f
                .debug_struct("NoteOn")
                .field("device", &device.name())
                .field("channel", channel)
                .field("pitch", pitch)
                .field("velocity", velocity)
                .finish(),
            MessageKind::NoteOff {
                device,
                channel,
                pitch,
                velocity,
            } => f
                .debug_struct("NoteOff")
                .field("device", &device.name())
                .field("channel", channel)
                .field("pitch", pitch)
                .field("velocity", velocity)
                .finish(),
            MessageKind::NoteOnOff {
                device,
                channel,
                pitch,
                velocity,
                duration,
            } => f
                .debug_struct("NoteOnOff")
                .field("device", &device.name())
                .field("channel", channel)
                .field("pitch", pitch)
                .field("velocity", velocity)
                .field("duration", duration)
                .finish(),
            MessageKind::ControlChange {
                device,
                channel,
                control,
                value,
            } => f
                .debug_struct("ControlChange")
                .field("device", &device.name())
                .field("channel", channel)
                .field("control", control)
                .field("value", value)
                .finish(),
            MessageKind::ProgramChange {
                device,
                channel,
                instrument,
            } => f
                .debug_struct("ProgramChange")
                .field("device", &device.name())
                .field("channel", channel)
                .field("instrument", instrument)
                .finish(),
            MessageKind::PitchBend {
                device,
                channel,
                value,
            } => f
                .debug_struct("PitchBend")
                .field("device", &device.name())
                .field("channel", channel)
                .field("value", value)
                .finish(),
            MessageKind::SysEx { device, data } => f
                .debug_struct("SysEx")
                .field("device", &device.name())
                .field("len", &data.len())
                .finish(),
            MessageKind::Percussion {
                device,
                percussion,
                velocity,
            } => f
                .debug_struct("Percussion")
                .field("device", &device.name())
                .field("percussion", percussion)
                .field("velocity", velocity)
                .finish(),
            MessageKind::Nrpn {
                device,
                channel,
                parameter,
                value,
            } => f
                .debug_struct("Nrpn")
                .field("device", &device.name())
                .field("channel", channel)
                .field("parameter", parameter)
                .field("value", value)
                .finish(),
            MessageKind::Callback { .. } => f.write_str("Callback"),
        }
    }
}

/// A command scheduled to fire at a beat time
#[derive(Debug, Clone)]
pub struct Message {
    time: f64,
    kind: MessageKind,
}

impl Message {
    fn new(time: f64, kind: MessageKind) -> Result<Self> {
        if !time.is_finite() {
            return Err(MidiError::InvalidTime(time));
        }
        Ok(Self { time, kind })
    }

    pub fn note_on(
        device: Arc<dyn OutputDevice>,
        channel: Channel,
        pitch: Pitch,
        velocity: u8,
        time: f64,
    ) -> Result<Self> {
        let velocity = check_7bit("velocity", velocity)?;
        Self::new(
            time,
            MessageKind::NoteOn {
                device,
                channel,
                pitch,
                velocity,
            },
        )
    }

    pub fn note_off(
        device: Arc<dyn OutputDevice>,
        channel: Channel,
        pitch: Pitch,
        velocity: u8,
        time: f64,
    ) -> Result<Self> {
        let velocity = check_7bit("velocity", velocity)?;
        Self::new(
            time,
            MessageKind::NoteOff {
                device,
                channel,
                pitch,
                velocity,
            },
        )
    }

    /// A note on at `time` whose note off follows `duration` beats later
    pub fn note_on_off(
        device: Arc<dyn OutputDevice>,
        channel: Channel,
        pitch: Pitch,
        velocity: u8,
        time: f64,
        duration: f64,
    ) -> Result<Self> {
        let velocity = check_7bit("velocity", velocity)?;
        if !duration.is_finite() || duration < 0.0 {
            return Err(MidiError::InvalidTime(duration));
        }
        Self::new(
            time,
            MessageKind::NoteOnOff {
                device,
                channel,
                pitch,
                velocity,
                duration,
            },
        )
    }

    pub fn control_change(
        device: Arc<dyn OutputDevice>,
        channel: Channel,
        control: Control,
        value: u8,
        time: f64,
    ) -> Result<Self> {
        let value = check_7bit("control value", value)?;
        Self::new(
            time,
            MessageKind::ControlChange {
                device,
                channel,
                control,
                value,
            },
        )
    }

    pub fn program_change(
        device: Arc<dyn OutputDevice>,
        channel: Channel,
        instrument: u8,
        time: f64,
    ) -> Result<Self> {
        let instrument = check_7bit("instrument", instrument)?;
        Self::new(
            time,
            MessageKind::ProgramChange {
                device,
                channel,
                instrument,
            },
        )
    }

    /// Pitch bend in 0..=16383, 8192 being centred
    pub fn pitch_bend(
        device: Arc<dyn OutputDevice>,
        channel: Channel,
        value: u16,
        time: f64,
    ) -> Result<Self> {
        let value = check_14bit("pitch bend", value)?;
        Self::new(
            time,
            MessageKind::PitchBend {
                device,
                channel,
                value,
            },
        )
    }

    /// A SysEx message; `data` must include the `F0`/`F7` framing
    pub fn sysex(device: Arc<dyn OutputDevice>, data: &[u8], time: f64) -> Result<Self> {
        validate_sysex(data)?;
        Self::new(
            time,
            MessageKind::SysEx {
                device,
                data: Arc::from(data),
            },
        )
    }

    pub fn percussion(
        device: Arc<dyn OutputDevice>,
        percussion: Percussion,
        velocity: u8,
        time: f64,
    ) -> Result<Self> {
        let velocity = check_7bit("velocity", velocity)?;
        Self::new(
            time,
            MessageKind::Percussion {
                device,
                percussion,
                velocity,
            },
        )
    }

    pub fn nrpn(
        device: Arc<dyn OutputDevice>,
        channel: Channel,
        parameter: u16,
        value: u16,
        time: f64,
    ) -> Result<Self> {
        let parameter = check_14bit("NRPN parameter", parameter)?;
        let value = check_14bit("NRPN value", value)?;
        Self::new(
            time,
            MessageKind::Nrpn {
                device,
                channel,
                parameter,
                value,
            },
        )
    }

    pub fn callback<F>(callback: F, time: f64) -> Result<Self>
    where
        F: Fn(&ClockHandle, f64) -> Result<()> + Send + Sync + 'static,
    {
        Self::new(
            time,
            MessageKind::Callback {
                callback: Arc::new(callback),
            },
        )
    }

    /// Scheduled time in beats
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    /// The device this message is addressed to, if any
    pub fn device(&self) -> Option<&Arc<dyn OutputDevice>> {
        match &self.kind {
            MessageKind::NoteOn { device, .. }
            | MessageKind::NoteOff { device, .. }
            | MessageKind::NoteOnOff { device, .. }
            | MessageKind::ControlChange { device, .. }
            | MessageKind::ProgramChange { device, .. }
            | MessageKind::PitchBend { device, .. }
            | MessageKind::SysEx { device, .. }
            | MessageKind::Percussion { device, .. }
            | MessageKind::Nrpn { device, .. } => Some(device),
            MessageKind::Callback { .. } => None,
        }
    }

    /// Returns a copy of this message scheduled `delta` beats later
    pub fn time_shifted(&self, delta: f64) -> Message {
        Message {
            time: self.time + delta,
            kind: self.kind.clone(),
        }
    }

    /// Fires the message immediately
    ///
    /// `clock` is the clock delivering the message. Self-propagating kinds use
    /// it to schedule their follow-ups relative to [`Message::time`].
    pub fn send_now(&self, clock: &ClockHandle) -> Result<()> {
        match &self.kind {
            MessageKind::NoteOn {
                device,
                channel,
                pitch,
                velocity,
            } => device.send(&ShortMessage::note_on(*channel, *pitch, *velocity)?.into()),
            MessageKind::NoteOff {
                device,
                channel,
                pitch,
                velocity,
            } => device.send(&ShortMessage::note_off(*channel, *pitch, *velocity)?.into()),
            MessageKind::NoteOnOff {
                device,
                channel,
                pitch,
                velocity,
                duration,
            } => {
                device.send(&ShortMessage::note_on(*channel, *pitch, *velocity)?.into())?;
                clock.schedule(Message::note_off(
                    Arc::clone(device),
                    *channel,
                    *pitch,
                    0,
                    self.time + duration,
                )?);
                Ok(())
            }
            MessageKind::ControlChange {
                device,
                channel,
                control,
                value,
            } => device.send(&ShortMessage::control_change(*channel, *control, *value)?.into()),
            MessageKind::ProgramChange {
                device,
                channel,
                instrument,
            } => device.send(&ShortMessage::program_change(*channel, *instrument)?.into()),
            MessageKind::PitchBend {
                device,
                channel,
                value,
            } => device.send(&ShortMessage::pitch_bend(*channel, *value)?.into()),
            MessageKind::SysEx { device, data } => device.send(&WireMessage::SysEx(data.to_vec())),
            MessageKind::Percussion {
                device,
                percussion,
                velocity,
            } => device.send(
                &ShortMessage::note_on(Channel::PERCUSSION, percussion.pitch(), *velocity)?
                    .into(),
            ),
            MessageKind::Nrpn {
                device,
                channel,
                parameter,
                value,
            } => {
                let (param_msb, param_lsb) = split_14bit(*parameter);
                let (value_msb, value_lsb) = split_14bit(*value);
                let sequence = [
                    (Control::NON_REGISTERED_PARAMETER_MSB, param_msb),
                    (Control::NON_REGISTERED_PARAMETER_LSB, param_lsb),
                    (Control::DATA_ENTRY_MSB, value_msb),
                    (Control::DATA_ENTRY_LSB, value_lsb),
                ];
                for (control, data) in sequence {
                    device.send(&ShortMessage::control_change(*channel, control, data)?.into())?;
                }
                Ok(())
            }
            MessageKind::Callback { callback } => (**callback)(clock, self.time),
        }
    }
}
