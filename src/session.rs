use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Crawl-wide shared state. The parser core touches exactly one field: the
/// worker cap, clamped to 1 when a Google-Drive index is detected.
#[derive(Debug)]
pub struct Session {
    max_threads: AtomicUsize,
    cancelled: AtomicBool,
}

impl Session {
    pub fn new(threads: usize) -> Self {
        Self {
            max_threads: AtomicUsize::new(threads.max(1)),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn max_threads(&self) -> usize {
        self.max_threads.load(Ordering::SeqCst)
    }

    /// Lower the worker cap to `threads`; never raises it.
    pub fn clamp_threads(&self, threads: usize) {
        self.max_threads.fetch_min(threads.max(1), Ordering::SeqCst);
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(2)
    }
}
