// config.rs

use crate::cli::Args;
use crate::midi::{Channel, Result};
use ::config::{Environment, File};
use log::{debug, LevelFilter};
use serde::Deserialize;
use std::path::Path;

/// Base name of the optional settings file in the working directory
pub const CONFIG_FILE: &str = "midiclockrs";
/// Prefix of environment variables overriding settings, e.g. `MIDICLOCKRS_BPM`
pub const ENV_PREFIX: &str = "MIDICLOCKRS";

pub const BEATS_PER_BAR: u32 = 4;

/// Application settings, layered file < environment < command line
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bpm: f64,
    pub output_device: Option<String>,
    pub input_device: Option<String>,
    /// One-based channel used by the demos
    pub channel: u8,
    /// Echo delay in beats
    pub echo_delay: f64,
    pub assemble_nrpn: bool,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            output_device: None,
            input_device: None,
            channel: 1,
            echo_delay: 0.5,
            assemble_nrpn: true,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from `path` (or `midiclockrs.*` if present) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(CONFIG_FILE).required(false),
        };
        let settings: Settings = ::config::Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        debug!("Loaded settings: {:?}", settings);
        Ok(settings)
    }

    /// Overrides settings with any values given on the command line
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(bpm) = args.bpm {
            self.bpm = bpm;
        }
        if let Some(output) = &args.output {
            self.output_device = Some(output.clone());
        }
        if let Some(input) = &args.input {
            self.input_device = Some(input.clone());
        }
        if let Some(channel) = args.channel {
            self.channel = channel;
        }
        if let Some(level) = &args.log_level {
            self.log_level = level.clone();
        }
    }

    pub fn channel(&self) -> Result<Channel> {
        Channel::new(self.channel.wrapping_sub(1))
    }

    pub fn log_level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_is_one_based() {
        let mut settings = Settings::default();
        assert_eq!(settings.channel().unwrap().index(), 0);
        settings.channel = 16;
        assert_eq!(settings.channel().unwrap().index(), 15);
        settings.channel = 0;
        assert!(settings.channel().is_err());
        settings.channel = 17;
        assert!(settings.channel().is_err());
    }

    #[test]
    fn test_log_level_fallback() {
        let mut settings = Settings::default();
        settings.log_level = "debug".to_string();
        assert_eq!(settings.log_level_filter(), LevelFilter::Debug);
        settings.log_level = "chatty".to_string();
        assert_eq!(settings.log_level_filter(), LevelFilter::Info);
    }
}
