//! Beat-relative scheduling clock
//!
//! A [`Clock`] converts wall-clock time into beats at an adjustable tempo and
//! owns a delivery thread that fires scheduled [`Message`]s when their beat
//! comes due. Scheduling, tempo changes and time queries are available on
//! cloneable [`ClockHandle`]s, which are also what message handlers receive.
//!
//! The delivery thread holds the clock lock only while touching the queue; it
//! releases it for the duration of each batch so handlers may schedule more
//! messages without deadlocking.
pub mod core;
mod queue;

pub use self::core::TimeBase;
pub use queue::MessageQueue;

use self::core::Stopwatch;
use crate::midi::{Message, MidiError, Result};
use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

/// Upper bound on a single timed wait; the loop re-evaluates after it
const MAX_WAIT: Duration = Duration::from_secs(60);
const ERROR_CHANNEL_CAPACITY: usize = 64;

/// A message that failed while being delivered by the clock
#[derive(Debug)]
pub struct DeliveryError {
    /// Scheduled beat time of the failed message
    pub time: f64,
    /// Debug rendering of the failed message
    pub message: String,
    pub error: MidiError,
}

struct ClockState {
    time_base: TimeBase,
    stopwatch: Stopwatch,
    queue: MessageQueue,
    running: bool,
    exit_requested: bool,
    delivery_thread: Option<ThreadId>,
    // Beat time of the batch being delivered, returned by `time()` on the delivery thread
    processing_time: Option<f64>,
}

impl ClockState {
    fn on_delivery_thread(&self) -> bool {
        self.delivery_thread == Some(thread::current().id())
    }

    fn beats_now(&self) -> f64 {
        self.time_base.beat_at(self.stopwatch.elapsed_ms())
    }
}

struct ClockShared {
    state: Mutex<ClockState>,
    wake: Condvar,
    errors_tx: Sender<DeliveryError>,
    errors_rx: Receiver<DeliveryError>,
}

/// Shared access to a clock's schedule and time
///
/// Handles are cheap to clone and may be used from any thread, including from
/// inside message handlers on the delivery thread.
#[derive(Clone)]
pub struct ClockHandle {
    shared: Arc<ClockShared>,
}

impl ClockHandle {
    fn lock(&self) -> MutexGuard<'_, ClockState> {
        self.shared.state.lock()
    }

    /// Current beat time
    ///
    /// On the delivery thread this is the scheduled time of the batch being
    /// delivered, so handlers can place follow-up messages at exact offsets
    /// regardless of delivery latency.
    pub fn time(&self) -> f64 {
        let state = self.lock();
        if state.on_delivery_thread() {
            if let Some(time) = state.processing_time {
                return time;
            }
        }
        state.beats_now()
    }

    /// Queues a message; messages in the past fire at the next opportunity
    pub fn schedule(&self, msg: Message) {
        if !msg.time().is_finite() {
            warn!("Dropping message with non-finite time: {:?}", msg);
            return;
        }
        self.lock().queue.add_message(msg);
        self.shared.wake.notify_all();
    }

    /// Queues every message, shifted `delta` beats later
    pub fn schedule_all<I>(&self, messages: I, delta: f64)
    where
        I: IntoIterator<Item = Message>,
    {
        let mut state = self.lock();
        for msg in messages {
            let msg = if delta != 0.0 {
                msg.time_shifted(delta)
            } else {
                msg
            };
            if !msg.time().is_finite() {
                warn!("Dropping message with non-finite time: {:?}", msg);
                continue;
            }
            state.queue.add_message(msg);
        }
        drop(state);
        self.shared.wake.notify_all();
    }

    pub fn beats_per_minute(&self) -> f64 {
        self.lock().time_base.beats_per_minute()
    }

    /// Changes tempo without moving the current beat position
    pub fn set_beats_per_minute(&self, beats_per_minute: f64) -> Result<()> {
        {
            let mut state = self.lock();
            let elapsed = state.stopwatch.elapsed_ms();
            state
                .time_base
                .set_beats_per_minute_at(beats_per_minute, elapsed)?;
        }
        self.shared.wake.notify_all();
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Number of messages waiting to be delivered
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Receiver for failures raised while delivering scheduled messages
    ///
    /// The channel is bounded; failures are dropped once it is full.
    pub fn delivery_errors(&self) -> Receiver<DeliveryError> {
        self.shared.errors_rx.clone()
    }

    fn on_delivery_thread(&self) -> bool {
        self.lock().on_delivery_thread()
    }

    fn report(&self, failure: DeliveryError) {
        error!(
            "Delivery of {} at beat {:.3} failed: {}",
            failure.message, failure.time, failure.error
        );
        if self.shared.errors_tx.try_send(failure).is_err() {
            debug!("Delivery error channel full, dropping report");
        }
    }
}

/// The scheduler: a tempo-aware time source with a message delivery thread
pub struct Clock {
    handle: ClockHandle,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Clock {
    /// Creates a stopped clock at beat zero
    pub fn new(beats_per_minute: f64) -> Result<Self> {
        let time_base = TimeBase::new(beats_per_minute)?;
        let (errors_tx, errors_rx) = channel::bounded(ERROR_CHANNEL_CAPACITY);
        info!("Creating clock at {} BPM", beats_per_minute);
        Ok(Self {
            handle: ClockHandle {
                shared: Arc::new(ClockShared {
                    state: Mutex::new(ClockState {
                        time_base,
                        stopwatch: Stopwatch::default(),
                        queue: MessageQueue::new(),
                        running: false,
                        exit_requested: false,
                        delivery_thread: None,
                        processing_time: None,
                    }),
                    wake: Condvar::new(),
                    errors_tx,
                    errors_rx,
                }),
            },
            worker: Mutex::new(None),
        })
    }

    /// Returns a handle for scheduling from other threads and handlers
    pub fn handle(&self) -> ClockHandle {
        self.handle.clone()
    }

    /// Resumes time and starts delivering messages
    pub fn start(&self) -> Result<()> {
        if self.handle.on_delivery_thread() {
            return Err(MidiError::InvalidState(
                "start cannot be called from the delivery thread",
            ));
        }
        let mut worker = self.worker.lock();
        let bpm = {
            let mut state = self.handle.lock();
            if state.running {
                return Err(MidiError::InvalidState("clock is already running"));
            }
            state.running = true;
            state.exit_requested = false;
            state.stopwatch.start();
            state.time_base.beats_per_minute()
        };

        let shared = Arc::clone(&self.handle.shared);
        let spawned = thread::Builder::new()
            .name("midiclock-delivery".into())
            .spawn(move || run_delivery_loop(shared));
        match spawned {
            Ok(join_handle) => {
                *worker = Some(join_handle);
                info!("Clock started at {} BPM", bpm);
                Ok(())
            }
            Err(e) => {
                let mut state = self.handle.lock();
                state.running = false;
                state.stopwatch.pause();
                error!("Failed to spawn delivery thread: {}", e);
                Err(e.into())
            }
        }
    }

    /// Stops delivery and pauses time; pending messages stay queued
    ///
    /// Blocks until the delivery thread has exited. Once this returns no
    /// further messages are delivered until the next [`Clock::start`].
    pub fn stop(&self) -> Result<()> {
        if self.handle.on_delivery_thread() {
            return Err(MidiError::InvalidState(
                "stop cannot be called from the delivery thread",
            ));
        }
        let mut worker = self.worker.lock();
        {
            let mut state = self.handle.lock();
            if !state.running {
                return Err(MidiError::InvalidState("clock is not running"));
            }
            state.exit_requested = true;
        }
        self.handle.shared.wake.notify_all();

        if let Some(join_handle) = worker.take() {
            if join_handle.join().is_err() {
                error!("Delivery thread panicked");
            }
        }

        let mut state = self.handle.lock();
        state.stopwatch.pause();
        state.running = false;
        state.exit_requested = false;
        state.delivery_thread = None;
        state.processing_time = None;
        info!(
            "Clock stopped at beat {:.3} with {} message(s) pending",
            state.beats_now(),
            state.queue.len()
        );
        Ok(())
    }

    /// Rewinds to beat zero and discards pending messages; only while stopped
    pub fn reset(&self) -> Result<()> {
        if self.handle.on_delivery_thread() {
            return Err(MidiError::InvalidState(
                "reset cannot be called from the delivery thread",
            ));
        }
        let mut state = self.handle.lock();
        if state.running {
            return Err(MidiError::InvalidState("cannot reset a running clock"));
        }
        state.stopwatch.reset();
        state.time_base.reset();
        let discarded = std::mem::take(&mut state.queue);
        drop(state);
        info!("Clock reset, {} pending message(s) discarded", discarded.len());
        Ok(())
    }

    pub fn time(&self) -> f64 {
        self.handle.time()
    }

    pub fn schedule(&self, msg: Message) {
        self.handle.schedule(msg)
    }

    pub fn schedule_all<I>(&self, messages: I, delta: f64)
    where
        I: IntoIterator<Item = Message>,
    {
        self.handle.schedule_all(messages, delta)
    }

    pub fn beats_per_minute(&self) -> f64 {
        self.handle.beats_per_minute()
    }

    pub fn set_beats_per_minute(&self, beats_per_minute: f64) -> Result<()> {
        self.handle.set_beats_per_minute(beats_per_minute)
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    pub fn pending(&self) -> usize {
        self.handle.pending()
    }

    pub fn delivery_errors(&self) -> Receiver<DeliveryError> {
        self.handle.delivery_errors()
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        if !self.handle.is_running() {
            return;
        }
        if self.handle.on_delivery_thread() {
            // Cannot join ourselves; let the loop wind down on its own
            let mut state = self.handle.lock();
            state.exit_requested = true;
            state.running = false;
            state.stopwatch.pause();
            drop(state);
            self.handle.shared.wake.notify_all();
        } else if let Err(e) = self.stop() {
            warn!("Failed to stop clock on drop: {}", e);
        }
    }
}

fn run_delivery_loop(shared: Arc<ClockShared>) {
    let handle = ClockHandle {
        shared: Arc::clone(&shared),
    };
    let mut state = shared.state.lock();
    state.delivery_thread = Some(thread::current().id());
    debug!("Delivery thread started");

    loop {
        if state.exit_requested {
            break;
        }
        let Some(earliest) = state.queue.earliest_timestamp() else {
            shared.wake.wait(&mut state);
            continue;
        };
        let wait_ms = state
            .time_base
            .ms_until(earliest, state.stopwatch.elapsed_ms());
        if wait_ms > 0.0 {
            let wait = Duration::try_from_secs_f64(wait_ms / 1000.0)
                .map_or(MAX_WAIT, |wait| wait.min(MAX_WAIT));
            shared.wake.wait_for(&mut state, wait);
            continue;
        }

        let batch = state.queue.pop_earliest();
        state.processing_time = Some(earliest);
        // The batch is consumed unlocked: dropping a message may drop the Clock
        MutexGuard::unlocked(&mut state, || deliver_batch(&handle, earliest, batch));
        state.processing_time = None;
    }

    state.delivery_thread = None;
    debug!("Delivery thread exiting");
}

fn deliver_batch(handle: &ClockHandle, time: f64, batch: Vec<Message>) {
    debug!("Delivering {} message(s) at beat {:.3}", batch.len(), time);
    for msg in &batch {
        let error = match panic::catch_unwind(AssertUnwindSafe(|| msg.send_now(handle))) {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e,
            Err(payload) => MidiError::CallbackPanicked(panic_message(payload.as_ref())),
        };
        handle.report(DeliveryError {
            time: msg.time(),
            message: format!("{:?}", msg.kind()),
            error,
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
