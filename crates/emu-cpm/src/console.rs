//! Console and printer devices.
//!
//! The buffered implementations share their state behind an `Arc`, so a
//! clone handed to the bus and a clone kept by the host (a stdin reader
//! thread, a test) see the same queues.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Keyboard and screen as seen through ports 0x00 and 0x01.
pub trait Console {
    /// Whether a key is waiting.
    fn status(&mut self) -> bool;

    /// Take the next key. Returns 0 when nothing is waiting.
    fn read(&mut self) -> u8;

    fn write(&mut self, byte: u8);
}

/// Line printer on port 0x03.
pub trait Printer {
    fn print(&mut self, byte: u8);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Default)]
struct Buffers {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

/// Console backed by in-memory queues.
#[derive(Clone, Default)]
pub struct BufferedConsole {
    inner: Arc<Mutex<Buffers>>,
}

impl BufferedConsole {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue keystrokes.
    pub fn push_input(&self, bytes: &[u8]) {
        lock(&self.inner).input.extend(bytes);
    }

    #[must_use]
    pub fn pending_input(&self) -> usize {
        lock(&self.inner).input.len()
    }

    /// Everything written since the last call.
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut lock(&self.inner).output)
    }

    /// Output so far as text, without draining it.
    #[must_use]
    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&lock(&self.inner).output).into_owned()
    }
}

impl Console for BufferedConsole {
    fn status(&mut self) -> bool {
        !lock(&self.inner).input.is_empty()
    }

    fn read(&mut self) -> u8 {
        lock(&self.inner).input.pop_front().map_or(0, |b| b & 0x7F)
    }

    fn write(&mut self, byte: u8) {
        lock(&self.inner).output.push(byte);
    }
}

/// Printer that collects its output.
#[derive(Clone, Default)]
pub struct BufferedPrinter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl BufferedPrinter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *lock(&self.inner))
    }
}

impl Printer for BufferedPrinter {
    fn print(&mut self, byte: u8) {
        lock(&self.inner).push(byte);
    }
}
