use chrono::Local;
use simplelog::*;
use std::fs::{self, OpenOptions};
use std::io::{Error, ErrorKind};
use std::path::PathBuf;

/// Directory holding the log files, under the user's home
pub fn log_dir() -> Result<PathBuf, Error> {
    let home = std::env::var("HOME")
        .map_err(|_| Error::new(ErrorKind::NotFound, "HOME environment variable not set"))?;

    Ok(PathBuf::from(home)
        .join(".local")
        .join("share")
        .join("midiclockrs")
        .join("logs"))
}

/// Logs to a dated file at `level` and to stderr at warn level
///
/// Returns the path of the log file.
pub fn init_logger(level: LevelFilter) -> Result<PathBuf, Error> {
    let log_dir = log_dir()?;
    fs::create_dir_all(&log_dir)?;

    let log_path = log_dir.join(format!("app-{}.log", Local::now().format("%Y-%m-%d")));
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let config = ConfigBuilder::new()
        .set_thread_level(LevelFilter::Debug)
        .build();

    CombinedLogger::init(vec![
        WriteLogger::new(level, config.clone(), log_file),
        TermLogger::new(
            LevelFilter::Warn,
            config,
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ),
    ])
    .map_err(|e| Error::new(ErrorKind::Other, format!("Logger initialization failed: {}", e)))?;

    Ok(log_path)
}
