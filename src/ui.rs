// ui.rs

use crate::config::BEATS_PER_BAR;
use crate::midi::ClockHandle;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::warn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const REFRESH_INTERVAL: Duration = Duration::from_millis(25);

fn create_beat_progress(multi_progress: &MultiProgress) -> ProgressBar {
    let pb = multi_progress.add(ProgressBar::new(BEATS_PER_BAR as u64));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:.bold} [{bar:40.cyan}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("⣀⣤⣦⣶⣷⣿ "),
    );
    pb.set_prefix("Beat");
    pb
}

fn create_bar_progress(multi_progress: &MultiProgress, total_bars: u64) -> ProgressBar {
    let pb = multi_progress.add(ProgressBar::new(total_bars));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:.bold} [{bar:20.white/black}] {pos}/{len} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▊ "),
    );
    pb.set_prefix("Bar");
    pb
}

/// Splits a beat time into a zero-based (bar, beat within bar) pair
pub fn bar_and_beat(time: f64) -> (u64, u64) {
    let whole = time.max(0.0).floor() as u64;
    (whole / BEATS_PER_BAR as u64, whole % BEATS_PER_BAR as u64)
}

/// Terminal display of a running clock's position
pub struct BeatDisplay {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl BeatDisplay {
    /// Starts redrawing the clock position until [`BeatDisplay::finish`]
    pub fn start(clock: ClockHandle, total_bars: u64) -> Self {
        let multi_progress = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());
        let beat_pb = create_beat_progress(&multi_progress);
        let bar_pb = create_bar_progress(&multi_progress, total_bars.max(1));
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        let thread_handle = thread::spawn(move || {
            let _multi_progress = multi_progress;
            while thread_running.load(Ordering::SeqCst) {
                let (bar, beat) = bar_and_beat(clock.time());
                beat_pb.set_position(beat + 1);
                bar_pb.set_position(bar.min(total_bars));
                bar_pb.set_message(format!("{:.0} BPM", clock.beats_per_minute()));
                thread::sleep(REFRESH_INTERVAL);
            }
            beat_pb.finish_and_clear();
            bar_pb.finish_and_clear();
        });

        Self {
            running,
            thread_handle: Some(thread_handle),
        }
    }

    pub fn finish(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                warn!("Beat display thread panicked");
            }
        }
    }
}

impl Drop for BeatDisplay {
    fn drop(&mut self) {
        self.shutdown();
    }
}
