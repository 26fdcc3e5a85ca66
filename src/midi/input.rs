//! Decoding and fan-out of received MIDI
//!
//! The OS delivers input on its own thread, which may be realtime sensitive.
//! [`InputDispatcher::dispatch`] therefore only decodes, timestamps and hands
//! events to handlers; it never waits on a clock's delivery thread.

use crate::midi::engine::{pitch_bend_value, OutputDevice, ShortMessage, SYSEX_START};
use crate::midi::types::{join_14bit, Channel, Control, Pitch};
use crate::midi::{ClockHandle, Message, Result};
use crossbeam::channel::{self, Receiver};
use log::trace;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A decoded incoming message
///
/// `time` is the attached clock's beat time when the message arrived, or the
/// driver timestamp in seconds when no clock is attached.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    NoteOn {
        channel: Channel,
        pitch: Pitch,
        velocity: u8,
        time: f64,
    },
    NoteOff {
        channel: Channel,
        pitch: Pitch,
        velocity: u8,
        time: f64,
    },
    ControlChange {
        channel: Channel,
        control: Control,
        value: u8,
        time: f64,
    },
    ProgramChange {
        channel: Channel,
        instrument: u8,
        time: f64,
    },
    PitchBend {
        channel: Channel,
        value: u16,
        time: f64,
    },
    SysEx {
        data: Vec<u8>,
        time: f64,
    },
    /// Four control changes reassembled into one parameter/value pair
    Nrpn {
        channel: Channel,
        parameter: u16,
        value: u16,
        time: f64,
    },
}

impl InputEvent {
    pub fn time(&self) -> f64 {
        match self {
            InputEvent::NoteOn { time, .. }
            | InputEvent::NoteOff { time, .. }
            | InputEvent::ControlChange { time, .. }
            | InputEvent::ProgramChange { time, .. }
            | InputEvent::PitchBend { time, .. }
            | InputEvent::SysEx { time, .. }
            | InputEvent::Nrpn { time, .. } => *time,
        }
    }

    /// Decodes raw bytes; unsupported or truncated messages yield `None`
    ///
    /// A note on with velocity zero decodes as a note off.
    pub fn decode(data: &[u8], time: f64) -> Option<InputEvent> {
        if data.first() == Some(&SYSEX_START) {
            return Some(InputEvent::SysEx {
                data: data.to_vec(),
                time,
            });
        }
        let msg = ShortMessage::decode(data)?;
        let channel = msg.channel();
        match msg.status() & 0xF0 {
            0x80 => Some(InputEvent::NoteOff {
                channel,
                pitch: Pitch::new(msg.data1()).ok()?,
                velocity: msg.data2(),
                time,
            }),
            0x90 if msg.data2() == 0 => Some(InputEvent::NoteOff {
                channel,
                pitch: Pitch::new(msg.data1()).ok()?,
                velocity: 0,
                time,
            }),
            0x90 => Some(InputEvent::NoteOn {
                channel,
                pitch: Pitch::new(msg.data1()).ok()?,
                velocity: msg.data2(),
                time,
            }),
            0xB0 => Some(InputEvent::ControlChange {
                channel,
                control: Control::new(msg.data1()).ok()?,
                value: msg.data2(),
                time,
            }),
            0xC0 => Some(InputEvent::ProgramChange {
                channel,
                instrument: msg.data1(),
                time,
            }),
            0xE0 => Some(InputEvent::PitchBend {
                channel,
                value: pitch_bend_value(&msg),
                time,
            }),
            _ => None,
        }
    }

    /// Builds an outgoing message that replays this event on `device` at `time`
    pub fn to_message(&self, device: Arc<dyn OutputDevice>, time: f64) -> Result<Message> {
        match self {
            InputEvent::NoteOn {
                channel,
                pitch,
                velocity,
                ..
            } => Message::note_on(device, *channel, *pitch, *velocity, time),
            InputEvent::NoteOff {
                channel,
                pitch,
                velocity,
                ..
            } => Message::note_off(device, *channel, *pitch, *velocity, time),
            InputEvent::ControlChange {
                channel,
                control,
                value,
                ..
            } => Message::control_change(device, *channel, *control, *value, time),
            InputEvent::ProgramChange {
                channel,
                instrument,
                ..
            } => Message::program_change(device, *channel, *instrument, time),
            InputEvent::PitchBend { channel, value, .. } => {
                Message::pitch_bend(device, *channel, *value, time)
            }
            InputEvent::SysEx { data, .. } => Message::sysex(device, data, time),
            InputEvent::Nrpn {
                channel,
                parameter,
                value,
                ..
            } => Message::nrpn(device, *channel, *parameter, *value, time),
        }
    }
}

const NRPN_SEQUENCE: [Control; 4] = [
    Control::NON_REGISTERED_PARAMETER_MSB,
    Control::NON_REGISTERED_PARAMETER_LSB,
    Control::DATA_ENTRY_MSB,
    Control::DATA_ENTRY_LSB,
];

#[derive(Debug, Clone, Copy)]
struct PendingControl {
    channel: Channel,
    control: Control,
    value: u8,
    time: f64,
}

impl PendingControl {
    fn into_event(self) -> InputEvent {
        InputEvent::ControlChange {
            channel: self.channel,
            control: self.control,
            value: self.value,
            time: self.time,
        }
    }
}

/// Reassembles NRPN bursts from individual control changes
///
/// Idle until a Parameter MSB arrives, then queues controls as long as they
/// follow Parameter LSB, Data Entry MSB, Data Entry LSB on the same channel.
/// The fourth control completes an [`InputEvent::Nrpn`]. Anything out of
/// sequence flushes the queue as plain control changes and is then handled as
/// if the assembler were idle.
#[derive(Debug, Default)]
pub struct NrpnAssembler {
    pending: Vec<PendingControl>,
}

impl NrpnAssembler {
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(NRPN_SEQUENCE.len()),
        }
    }

    /// True while part of a sequence is buffered
    pub fn is_queueing(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn feed(
        &mut self,
        channel: Channel,
        control: Control,
        value: u8,
        time: f64,
        emit: &mut dyn FnMut(InputEvent),
    ) {
        let incoming = PendingControl {
            channel,
            control,
            value,
            time,
        };

        if let Some(first) = self.pending.first() {
            let expected = NRPN_SEQUENCE[self.pending.len()];
            if control == expected && channel == first.channel {
                self.pending.push(incoming);
                if self.pending.len() == NRPN_SEQUENCE.len() {
                    emit(self.assemble());
                }
                return;
            }
            trace!("NRPN sequence broken by control {:?}", control);
            self.flush(emit);
        }

        if control == Control::NON_REGISTERED_PARAMETER_MSB {
            self.pending.push(incoming);
        } else {
            emit(incoming.into_event());
        }
    }

    /// Emits any buffered controls as plain control changes
    pub fn flush(&mut self, emit: &mut dyn FnMut(InputEvent)) {
        for pending in self.pending.drain(..) {
            emit(pending.into_event());
        }
    }

    fn assemble(&mut self) -> InputEvent {
        let p = &self.pending;
        let event = InputEvent::Nrpn {
            channel: p[0].channel,
            parameter: join_14bit(p[0].value, p[1].value),
            value: join_14bit(p[2].value, p[3].value),
            time: p[3].time,
        };
        self.pending.clear();
        event
    }
}

type EventHandler = Arc<dyn Fn(&InputEvent) + Send + Sync>;

/// Decodes raw input and fans events out to handlers
///
/// One dispatcher sits behind each input device and is shared with the driver
/// callback. Handlers run on the driver's thread and should return quickly;
/// use [`InputDispatcher::subscribe`] to move events elsewhere. A handler may
/// add or clear handlers on its own dispatcher; the change applies from the
/// next event.
pub struct InputDispatcher {
    clock: RwLock<Option<ClockHandle>>,
    nrpn: Mutex<NrpnAssembler>,
    assemble_nrpn: AtomicBool,
    handlers: RwLock<Vec<EventHandler>>,
}

impl Default for InputDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl InputDispatcher {
    pub fn new() -> Self {
        Self {
            clock: RwLock::new(None),
            nrpn: Mutex::new(NrpnAssembler::new()),
            assemble_nrpn: AtomicBool::new(true),
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Timestamps subsequent events with `clock`'s beat time
    pub fn set_clock(&self, clock: Option<ClockHandle>) {
        *self.clock.write() = clock;
    }

    /// Enables or disables NRPN reassembly; disabling flushes any partial burst
    pub fn set_nrpn_assembly(&self, enabled: bool) {
        self.assemble_nrpn.store(enabled, Ordering::SeqCst);
        if !enabled {
            let mut flushed = Vec::new();
            self.nrpn.lock().flush(&mut |event| flushed.push(event));
            for event in &flushed {
                self.emit(event);
            }
        }
    }

    pub fn on_event<F>(&self, handler: F)
    where
        F: Fn(&InputEvent) + Send + Sync + 'static,
    {
        self.handlers.write().push(Arc::new(handler));
    }

    /// Returns a channel receiving a copy of every subsequent event
    pub fn subscribe(&self) -> Receiver<InputEvent> {
        let (tx, rx) = channel::unbounded();
        self.on_event(move |event| {
            let _ = tx.send(event.clone());
        });
        rx
    }

    pub fn clear_handlers(&self) {
        self.handlers.write().clear();
    }

    /// Entry point for the driver callback
    pub fn dispatch(&self, data: &[u8], driver_timestamp_us: u64) {
        let time = match self.clock.read().as_ref() {
            Some(clock) => clock.time(),
            None => driver_timestamp_us as f64 / 1_000_000.0,
        };
        let Some(event) = InputEvent::decode(data, time) else {
            trace!("Ignoring unsupported MIDI message: {:02X?}", data);
            return;
        };

        match event {
            InputEvent::ControlChange {
                channel,
                control,
                value,
                time,
            } if self.assemble_nrpn.load(Ordering::SeqCst) => {
                let mut ready = Vec::with_capacity(NRPN_SEQUENCE.len());
                self.nrpn
                    .lock()
                    .feed(channel, control, value, time, &mut |e| ready.push(e));
                for event in &ready {
                    self.emit(event);
                }
            }
            event => self.emit(&event),
        }
    }

    fn emit(&self, event: &InputEvent) {
        let handlers = self.handlers.read().clone();
        for handler in &handlers {
            handler(event);
        }
    }
}
