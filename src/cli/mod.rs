use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Settings file to load instead of ./midiclockrs.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Tempo in beats per minute
    #[arg(short, long, global = true)]
    pub bpm: Option<f64>,

    /// MIDI output device (exact name or substring)
    #[arg(long, global = true)]
    pub output: Option<String>,

    /// MIDI input device (exact name or substring)
    #[arg(long, global = true)]
    pub input: Option<String>,

    /// MIDI channel, 1-16
    #[arg(long, global = true)]
    pub channel: Option<u8>,

    /// Log level for the log file (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Send to a recording mock device instead of a real port
    #[arg(long, global = true)]
    pub mock: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List available MIDI devices
    Devices,
    /// Click on every beat, accenting the first beat of each bar
    Metronome {
        /// Number of beats to play
        #[arg(long, default_value_t = 16)]
        beats: u32,
    },
    /// Play a looping arpeggio of self-releasing notes
    Arpeggio {
        /// Number of bars to play
        #[arg(long, default_value_t = 4)]
        bars: u32,
    },
    /// Replay everything received on the input to the output after a delay
    Echo {
        /// Delay in beats
        #[arg(long)]
        delay: Option<f64>,
        /// How long to run, in seconds
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
    /// Print incoming MIDI events
    Monitor {
        /// How long to run, in seconds
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
}

pub fn validate_device(device_name: &str, devices: &[String]) -> Result<(), String> {
    if !devices.iter().any(|d| d.contains(device_name)) {
        let mut error_msg = format!(
            "Error: Device '{}' not found in available devices:\n",
            device_name
        );
        for device in devices {
            error_msg.push_str(&format!("  - {}\n", device));
        }
        return Err(error_msg);
    }
    Ok(())
}
