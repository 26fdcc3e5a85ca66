use crate::midi::{MidiError, OutputDevice, Result, WireMessage};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Output device that records what it is sent instead of talking to hardware
///
/// Used by the tests and by the demos when no port is available.
#[derive(Debug)]
pub struct MockOutputDevice {
    name: String,
    open: AtomicBool,
    failing: AtomicBool,
    sent: Mutex<Vec<WireMessage>>,
}

impl MockOutputDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            open: AtomicBool::new(true),
            failing: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Makes every subsequent send fail with a send error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Messages sent so far, oldest first
    pub fn sent(&self) -> Vec<WireMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn take_sent(&self) -> Vec<WireMessage> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl OutputDevice for MockOutputDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> Result<()> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn send(&self, msg: &WireMessage) -> Result<()> {
        if !self.is_open() {
            return Err(MidiError::DeviceClosed(self.name.clone()));
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(MidiError::SendError(format!("{} refused message", self.name)));
        }
        self.sent.lock().push(msg.clone());
        Ok(())
    }
}
