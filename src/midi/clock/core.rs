use crate::midi::{MidiError, Result};
use log::debug;
use std::time::{Duration, Instant};

/// Elapsed-time source that can be paused and resumed
#[derive(Debug, Default)]
pub(crate) struct Stopwatch {
    accumulated: Duration,
    started: Option<Instant>,
}

impl Stopwatch {
    pub(crate) fn start(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    pub(crate) fn pause(&mut self) {
        if let Some(started) = self.started.take() {
            self.accumulated += started.elapsed();
        }
    }

    pub(crate) fn reset(&mut self) {
        self.accumulated = Duration::ZERO;
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }

    pub(crate) fn elapsed_ms(&self) -> f64 {
        let running = self.started.map(|s| s.elapsed()).unwrap_or_default();
        (self.accumulated + running).as_secs_f64() * 1000.0
    }
}

/// Converts elapsed milliseconds into beats at a changeable tempo
///
/// Beat time is `(elapsed_ms + fudge_ms) / ms_per_beat`. When the tempo
/// changes, `fudge_ms` is re-solved so the beat position at that instant is
/// unchanged.
#[derive(Debug)]
pub struct TimeBase {
    beats_per_minute: f64,
    ms_per_beat: f64,
    fudge_ms: f64,
}

impl TimeBase {
    pub fn new(beats_per_minute: f64) -> Result<Self> {
        validate_bpm(beats_per_minute)?;
        Ok(Self {
            beats_per_minute,
            ms_per_beat: 60_000.0 / beats_per_minute,
            fudge_ms: 0.0,
        })
    }

    pub fn beats_per_minute(&self) -> f64 {
        self.beats_per_minute
    }

    pub fn ms_per_beat(&self) -> f64 {
        self.ms_per_beat
    }

    /// Beat position after `elapsed_ms` milliseconds of running time
    pub fn beat_at(&self, elapsed_ms: f64) -> f64 {
        (elapsed_ms + self.fudge_ms) / self.ms_per_beat
    }

    /// Milliseconds from `elapsed_ms` until `beat` is reached; negative if past
    pub fn ms_until(&self, beat: f64, elapsed_ms: f64) -> f64 {
        beat * self.ms_per_beat - self.fudge_ms - elapsed_ms
    }

    /// Changes tempo at `elapsed_ms` without moving the current beat position
    pub fn set_beats_per_minute_at(&mut self, beats_per_minute: f64, elapsed_ms: f64) -> Result<()> {
        validate_bpm(beats_per_minute)?;
        let beat = self.beat_at(elapsed_ms);
        self.beats_per_minute = beats_per_minute;
        self.ms_per_beat = 60_000.0 / beats_per_minute;
        self.fudge_ms = beat * self.ms_per_beat - elapsed_ms;
        debug!(
            "Tempo set to {} BPM at beat {:.3} (fudge {:.3} ms)",
            beats_per_minute, beat, self.fudge_ms
        );
        Ok(())
    }

    /// Forgets earlier tempo changes so that beat zero is elapsed time zero
    pub fn reset(&mut self) {
        self.fudge_ms = 0.0;
    }
}

fn validate_bpm(beats_per_minute: f64) -> Result<()> {
    if !beats_per_minute.is_finite() || beats_per_minute <= 0.0 {
        return Err(MidiError::InvalidTempo(beats_per_minute));
    }
    Ok(())
}
