use clap::Parser;
use dialoguer::Select;
use midiclockrs::{
    cli::{validate_device, Args, Command},
    config::{Settings, BEATS_PER_BAR},
    logging,
    midi::{
        Clock, ClockHandle, Control, DeviceRegistry, InputDevice, InputEvent, Message,
        MidiError, MockOutputDevice, OutputDevice, Percussion, Pitch, Result,
    },
    ui::BeatDisplay,
};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Semitone offsets of the arpeggio, one note per half beat
const ARPEGGIO: [i16; 8] = [0, 4, 7, 12, 16, 12, 7, 4];

fn main() {
    let args = Args::parse();
    let settings = match load_settings(&args) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            std::process::exit(1);
        }
    };
    initialize_logging(&settings);

    if let Err(e) = run(&args, &settings) {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = Settings::load(args.config.as_deref())?;
    settings.apply_args(args);
    Ok(settings)
}

fn initialize_logging(settings: &Settings) {
    match logging::init_logger(settings.log_level_filter()) {
        Ok(path) => log::info!("Application starting, logging to {}", path.display()),
        Err(e) => eprintln!("Logging disabled: {}", e),
    }
}

fn run(args: &Args, settings: &Settings) -> Result<()> {
    match &args.command {
        Command::Devices => list_available_devices(),
        Command::Metronome { beats } => {
            let output = select_output(settings, args.mock)?;
            run_metronome(output, settings, *beats)
        }
        Command::Arpeggio { bars } => {
            let output = select_output(settings, args.mock)?;
            run_arpeggio(output, settings, *bars)
        }
        Command::Echo { delay, seconds } => {
            let output = select_output(settings, args.mock)?;
            let delay = delay.unwrap_or(settings.echo_delay);
            run_echo(output, settings, delay, Duration::from_secs(*seconds))
        }
        Command::Monitor { seconds } => run_monitor(settings, Duration::from_secs(*seconds)),
    }
}

fn list_available_devices() -> Result<()> {
    let registry = DeviceRegistry::new()?;
    println!("MIDI inputs:");
    for device in registry.input_names() {
        println!("  - {}", device);
    }
    println!("MIDI outputs:");
    for device in registry.output_names() {
        println!("  - {}", device);
    }
    Ok(())
}

fn prompt_for_device(prompt: &str, names: &[String]) -> Result<String> {
    if names.is_empty() {
        return Err(MidiError::DeviceNotFound(format!("no {} available", prompt)));
    }
    let index = Select::new()
        .with_prompt(format!("Select a {}", prompt))
        .items(names)
        .default(0)
        .interact()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    Ok(names[index].clone())
}

fn select_output(settings: &Settings, mock: bool) -> Result<Arc<dyn OutputDevice>> {
    if mock {
        log::info!("Using mock output device");
        return Ok(Arc::new(MockOutputDevice::new("mock output")));
    }
    let registry = DeviceRegistry::new()?;
    let name = match &settings.output_device {
        Some(name) => {
            if let Err(error_msg) = validate_device(name, registry.output_names()) {
                eprintln!("{}", error_msg);
                return Err(MidiError::DeviceNotFound(name.clone()));
            }
            name.clone()
        }
        None => prompt_for_device("MIDI output", registry.output_names())?,
    };
    let device: Arc<dyn OutputDevice> = registry.open_output(&name)?;
    println!("Sending to MIDI output: {}", device.name());
    Ok(device)
}

fn select_input(settings: &Settings) -> Result<Arc<dyn InputDevice>> {
    let registry = DeviceRegistry::new()?;
    let name = match &settings.input_device {
        Some(name) => {
            if let Err(error_msg) = validate_device(name, registry.input_names()) {
                eprintln!("{}", error_msg);
                return Err(MidiError::DeviceNotFound(name.clone()));
            }
            name.clone()
        }
        None => prompt_for_device("MIDI input", registry.input_names())?,
    };
    let device: Arc<dyn InputDevice> = registry.open_input(&name)?;
    device.dispatcher().set_nrpn_assembly(settings.assemble_nrpn);
    println!("Listening on MIDI input: {}", device.name());
    Ok(device)
}

/// Plays one click at the current beat and schedules the next one
fn click(clock: &ClockHandle, device: &Arc<dyn OutputDevice>, beat: u32, total: u32) -> Result<()> {
    let now = clock.time();
    let (sound, velocity) = if beat % BEATS_PER_BAR == 0 {
        (Percussion::HiWoodBlock, 120)
    } else {
        (Percussion::LowWoodBlock, 90)
    };
    Message::percussion(Arc::clone(device), sound, velocity, now)?.send_now(clock)?;

    if beat + 1 < total {
        let device = Arc::clone(device);
        clock.schedule(Message::callback(
            move |clock, _| click(clock, &device, beat + 1, total),
            now + 1.0,
        )?);
    }
    Ok(())
}

fn run_metronome(output: Arc<dyn OutputDevice>, settings: &Settings, beats: u32) -> Result<()> {
    let clock = Clock::new(settings.bpm)?;
    let device = Arc::clone(&output);
    clock.schedule(Message::callback(
        move |clock, _| click(clock, &device, 0, beats),
        0.0,
    )?);

    let bars = (beats as u64).div_ceil(BEATS_PER_BAR as u64);
    play_until(&clock, beats as f64, bars)?;
    output.silence_all()
}

fn run_arpeggio(output: Arc<dyn OutputDevice>, settings: &Settings, bars: u32) -> Result<()> {
    let channel = settings.channel()?;
    let clock = Clock::new(settings.bpm)?;

    let mut pattern = vec![
        Message::program_change(Arc::clone(&output), channel, 0, 0.0)?,
        Message::control_change(Arc::clone(&output), channel, Control::VOLUME, 100, 0.0)?,
    ];
    for (step, offset) in ARPEGGIO.iter().enumerate() {
        let pitch = Pitch::MIDDLE_C.transpose(*offset)?;
        let velocity = if step == 0 { 110 } else { 80 };
        pattern.push(Message::note_on_off(
            Arc::clone(&output),
            channel,
            pitch,
            velocity,
            step as f64 * 0.5,
            0.4,
        )?);
    }

    let beats_per_pattern = ARPEGGIO.len() as f64 * 0.5;
    let repeats = (bars * BEATS_PER_BAR) as f64 / beats_per_pattern;
    for repeat in 0..repeats.ceil() as u32 {
        clock.schedule_all(pattern.iter().cloned(), repeat as f64 * beats_per_pattern);
    }

    play_until(&clock, (bars * BEATS_PER_BAR) as f64, bars as u64)?;
    output.silence_all()
}

fn run_echo(
    output: Arc<dyn OutputDevice>,
    settings: &Settings,
    delay: f64,
    duration: Duration,
) -> Result<()> {
    let input = select_input(settings)?;
    let clock = Clock::new(settings.bpm)?;
    let handle = clock.handle();
    input.dispatcher().set_clock(Some(handle.clone()));

    let echo_output = Arc::clone(&output);
    input.dispatcher().on_event(move |event: &InputEvent| {
        match event.to_message(Arc::clone(&echo_output), event.time() + delay) {
            Ok(msg) => handle.schedule(msg),
            Err(e) => log::warn!("Cannot echo {:?}: {}", event, e),
        }
    });

    println!("Echoing with a delay of {} beat(s) for {:?}", delay, duration);
    clock.start()?;
    thread::sleep(duration);
    clock.stop()?;
    input.dispatcher().clear_handlers();
    input.close()?;
    report_delivery_errors(&clock);
    output.silence_all()
}

fn run_monitor(settings: &Settings, duration: Duration) -> Result<()> {
    let input = select_input(settings)?;
    let events = input.dispatcher().subscribe();
    let deadline = Instant::now() + duration;

    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match events.recv_timeout(remaining) {
            Ok(event) => println!("{:>10.3}  {}", event.time(), describe(&event)),
            Err(_) => break,
        }
    }
    input.close()
}

fn describe(event: &InputEvent) -> String {
    match event {
        InputEvent::NoteOn {
            channel,
            pitch,
            velocity,
            ..
        } => format!("{} NoteOn {} velocity {}", channel, pitch, velocity),
        InputEvent::NoteOff { channel, pitch, .. } => format!("{} NoteOff {}", channel, pitch),
        InputEvent::ControlChange {
            channel,
            control,
            value,
            ..
        } => format!("{} ControlChange {} = {}", channel, control.number(), value),
        InputEvent::ProgramChange {
            channel,
            instrument,
            ..
        } => format!("{} ProgramChange {}", channel, instrument),
        InputEvent::PitchBend { channel, value, .. } => {
            format!("{} PitchBend {}", channel, value)
        }
        InputEvent::SysEx { data, .. } => format!("SysEx {:02X?}", data),
        InputEvent::Nrpn {
            channel,
            parameter,
            value,
            ..
        } => format!("{} NRPN {} = {}", channel, parameter, value),
    }
}

/// Runs the clock with a position display until `end_beat` is reached
fn play_until(clock: &Clock, end_beat: f64, bars: u64) -> Result<()> {
    let display = BeatDisplay::start(clock.handle(), bars);
    clock.start()?;
    while clock.time() < end_beat {
        thread::sleep(Duration::from_millis(10));
    }
    clock.stop()?;
    display.finish();
    report_delivery_errors(clock);
    Ok(())
}

fn report_delivery_errors(clock: &Clock) {
    for failure in clock.delivery_errors().try_iter() {
        eprintln!(
            "Failed to deliver {} at beat {:.2}: {}",
            failure.message, failure.time, failure.error
        );
    }
}
