use midiclockrs::midi::{
    Channel, Clock, Control, InputDispatcher, InputEvent, MessageKind, MockOutputDevice,
    OutputDevice, Pitch,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn ch(index: u8) -> Channel {
    Channel::new(index).unwrap()
}

fn cc(channel: u8, control: u8, value: u8) -> [u8; 3] {
    [0xB0 | channel, control, value]
}

fn drain(rx: &crossbeam::channel::Receiver<InputEvent>) -> Vec<InputEvent> {
    rx.try_iter().collect()
}

#[test]
fn test_dispatcher_assembles_nrpn() {
    let dispatcher = InputDispatcher::new();
    let events = dispatcher.subscribe();

    dispatcher.dispatch(&cc(0, 99, 5), 1_000_000);
    dispatcher.dispatch(&cc(0, 98, 0), 1_001_000);
    dispatcher.dispatch(&cc(0, 6, 1), 1_002_000);
    assert!(drain(&events).is_empty(), "Partial burst must be held back");
    dispatcher.dispatch(&cc(0, 38, 0), 1_003_000);

    assert_eq!(
        drain(&events),
        vec![InputEvent::Nrpn {
            channel: ch(0),
            parameter: 640,
            value: 128,
            time: 1.003,
        }]
    );
}

#[test]
fn test_interrupted_nrpn_flushes_as_control_changes() {
    let dispatcher = InputDispatcher::new();
    let events = dispatcher.subscribe();

    dispatcher.dispatch(&cc(2, 99, 1), 0);
    dispatcher.dispatch(&cc(2, 98, 2), 0);
    dispatcher.dispatch(&cc(2, 7, 100), 0);

    let controls: Vec<(u8, u8)> = drain(&events)
        .into_iter()
        .map(|event| match event {
            InputEvent::ControlChange {
                channel,
                control,
                value,
                ..
            } => {
                assert_eq!(channel, ch(2));
                (control.number(), value)
            }
            other => panic!("Expected a control change, got {:?}", other),
        })
        .collect();
    assert_eq!(controls, vec![(99, 1), (98, 2), (7, 100)]);
}

#[test]
fn test_nrpn_on_another_channel_breaks_sequence() {
    let dispatcher = InputDispatcher::new();
    let events = dispatcher.subscribe();

    dispatcher.dispatch(&cc(0, 99, 1), 0);
    dispatcher.dispatch(&cc(1, 98, 2), 0);
    let flushed = drain(&events);
    assert_eq!(flushed.len(), 2);
    assert!(flushed
        .iter()
        .all(|e| matches!(e, InputEvent::ControlChange { .. })));
}

#[test]
fn test_other_messages_pass_through_during_burst() {
    let dispatcher = InputDispatcher::new();
    let events = dispatcher.subscribe();

    dispatcher.dispatch(&cc(0, 99, 0), 0);
    dispatcher.dispatch(&[0x90, 60, 100], 0);
    dispatcher.dispatch(&cc(0, 98, 10), 0);
    dispatcher.dispatch(&cc(0, 6, 0), 0);
    dispatcher.dispatch(&cc(0, 38, 3), 0);

    let received = drain(&events);
    assert_eq!(received.len(), 2);
    assert!(matches!(received[0], InputEvent::NoteOn { velocity: 100, .. }));
    assert!(matches!(
        received[1],
        InputEvent::Nrpn {
            parameter: 10,
            value: 3,
            ..
        }
    ));
}

#[test]
fn test_disabling_assembly_flushes_and_passes_controls() {
    let dispatcher = InputDispatcher::new();
    let events = dispatcher.subscribe();

    dispatcher.dispatch(&cc(0, 99, 1), 0);
    dispatcher.dispatch(&cc(0, 98, 1), 0);
    assert!(drain(&events).is_empty());

    dispatcher.set_nrpn_assembly(false);
    assert_eq!(drain(&events).len(), 2);

    dispatcher.dispatch(&cc(0, 99, 1), 0);
    assert_eq!(drain(&events).len(), 1);
}

#[test]
fn test_decoding_through_dispatcher() {
    let dispatcher = InputDispatcher::new();
    let events = dispatcher.subscribe();

    dispatcher.dispatch(&[0x93, 64, 0], 2_000_000);
    dispatcher.dispatch(&[0xC5, 12], 0);
    dispatcher.dispatch(&[0xE0, 0x00, 0x40], 0);
    dispatcher.dispatch(&[0xF0, 0x01, 0x02, 0xF7], 0);
    dispatcher.dispatch(&[0xF8], 0);
    dispatcher.dispatch(&[0xA0, 60, 10], 0);

    let received = drain(&events);
    assert_eq!(
        received,
        vec![
            InputEvent::NoteOff {
                channel: ch(3),
                pitch: Pitch::new(64).unwrap(),
                velocity: 0,
                time: 2.0,
            },
            InputEvent::ProgramChange {
                channel: ch(5),
                instrument: 12,
                time: 0.0,
            },
            InputEvent::PitchBend {
                channel: ch(0),
                value: 8192,
                time: 0.0,
            },
            InputEvent::SysEx {
                data: vec![0xF0, 0x01, 0x02, 0xF7],
                time: 0.0,
            },
        ]
    );
}

#[test]
fn test_events_stamped_with_clock_time() {
    let clock = Clock::new(600.0).unwrap();
    let dispatcher = InputDispatcher::new();
    dispatcher.set_clock(Some(clock.handle()));
    let events = dispatcher.subscribe();

    clock.start().unwrap();
    thread::sleep(Duration::from_millis(150));
    dispatcher.dispatch(&[0x90, 60, 90], 999_000_000);
    clock.stop().unwrap();

    let received = drain(&events);
    assert_eq!(received.len(), 1);
    let time = received[0].time();
    assert!(
        time > 1.0 && time <= clock.time(),
        "Expected a beat time from the clock, got {}",
        time
    );

    dispatcher.set_clock(None);
    dispatcher.dispatch(&[0x90, 60, 90], 3_500_000);
    assert_eq!(drain(&events)[0].time(), 3.5);
}

#[test]
fn test_handlers_and_clear() {
    let dispatcher = InputDispatcher::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    dispatcher.on_event(move |event| sink.lock().push(event.clone()));

    dispatcher.dispatch(&cc(0, 7, 64), 0);
    assert_eq!(seen.lock().len(), 1);

    dispatcher.clear_handlers();
    dispatcher.dispatch(&cc(0, 7, 65), 0);
    assert_eq!(seen.lock().len(), 1);
}

#[test]
fn test_echo_schedules_delayed_copy() {
    let mock = Arc::new(MockOutputDevice::new("echo"));
    let device: Arc<dyn OutputDevice> = mock.clone();
    let clock = Clock::new(600.0).unwrap();
    let handle = clock.handle();
    let dispatcher = InputDispatcher::new();
    dispatcher.set_clock(Some(clock.handle()));
    dispatcher.on_event(move |event| {
        let msg = event
            .to_message(Arc::clone(&device), event.time() + 1.0)
            .unwrap();
        handle.schedule(msg);
    });

    dispatcher.dispatch(&cc(4, 99, 5), 0);
    dispatcher.dispatch(&cc(4, 98, 0), 0);
    dispatcher.dispatch(&cc(4, 6, 1), 0);
    dispatcher.dispatch(&cc(4, 38, 0), 0);
    assert_eq!(clock.pending(), 1);

    clock.start().unwrap();
    thread::sleep(Duration::from_millis(60));
    assert_eq!(mock.sent_count(), 0, "Echo must wait for its delay");
    thread::sleep(Duration::from_millis(150));
    clock.stop().unwrap();

    let sent: Vec<Vec<u8>> = mock.sent().iter().map(|m| m.to_bytes()).collect();
    assert_eq!(
        sent,
        vec![
            vec![0xB4, 99, 5],
            vec![0xB4, 98, 0],
            vec![0xB4, 6, 1],
            vec![0xB4, 38, 0],
        ]
    );
}

#[test]
fn test_event_to_message_keeps_fields() {
    let mock: Arc<dyn OutputDevice> = Arc::new(MockOutputDevice::new("out"));
    let event = InputEvent::ControlChange {
        channel: ch(9),
        control: Control::MODULATION_WHEEL,
        value: 33,
        time: 1.0,
    };
    let msg = event.to_message(mock, 4.0).unwrap();
    assert_eq!(msg.time(), 4.0);
    match msg.kind() {
        MessageKind::ControlChange {
            channel,
            control,
            value,
            ..
        } => {
            assert_eq!(*channel, ch(9));
            assert_eq!(*control, Control::MODULATION_WHEEL);
            assert_eq!(*value, 33);
        }
        other => panic!("Unexpected kind {:?}", other),
    }
}

#[test]
fn test_handler_may_change_handlers() {
    let dispatcher = Arc::new(InputDispatcher::new());
    let calls = Arc::new(Mutex::new(0usize));
    let late_events = Arc::new(Mutex::new(None));

    let inner = Arc::clone(&dispatcher);
    let counter = Arc::clone(&calls);
    let late = Arc::clone(&late_events);
    dispatcher.on_event(move |_| {
        *counter.lock() += 1;
        inner.clear_handlers();
        *late.lock() = Some(inner.subscribe());
    });

    dispatcher.dispatch(&cc(0, 7, 1), 0);
    dispatcher.dispatch(&cc(0, 7, 2), 0);

    assert_eq!(*calls.lock(), 1, "Cleared handler must not run again");
    let events = late_events.lock().take().unwrap();
    assert_eq!(drain(&events).len(), 1);
}
