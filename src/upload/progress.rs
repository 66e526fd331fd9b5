//! Host-facing progress reporting.
//!
//! Parts complete in any order and on any worker, so the reporter serializes
//! sink calls and drops values that would move the host's progress backwards.
//! `100` is reserved for [`ProgressReporter::finish`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Receives integer progress values in `0..=100`.
pub type ProgressSink = Arc<dyn Fn(u8) + Send + Sync>;

const COMPLETE: u8 = 100;
const LOGICALLY_COMPLETE: u8 = 99;

#[derive(Default)]
struct ReporterState {
    last: Option<u8>,
    finished: bool,
}

/// Wraps the host sink; emitted values never decrease and `100` is sent at most once.
pub struct ProgressReporter {
    sink: ProgressSink,
    state: Mutex<ReporterState>,
}

impl ProgressReporter {
    #[must_use]
    pub fn new(sink: ProgressSink) -> Self {
        Self {
            sink,
            state: Mutex::new(ReporterState::default()),
        }
    }

    /// A reporter that discards everything.
    #[must_use]
    pub fn silent() -> Self {
        Self::new(Arc::new(|_| {}))
    }

    /// Reports intermediate progress, capped at 99.
    pub fn report(&self, percent: u8) {
        let percent = percent.min(LOGICALLY_COMPLETE);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.finished || state.last.is_some_and(|last| percent <= last) {
            return;
        }
        state.last = Some(percent);
        (self.sink)(percent);
    }

    /// Reports 100. Only the first call reaches the sink.
    pub fn finish(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.finished {
            return;
        }
        state.finished = true;
        state.last = Some(COMPLETE);
        (self.sink)(COMPLETE);
    }
}

/// Counts completed parts and turns the count into a percentage.
pub struct PartProgress {
    completed: AtomicU64,
    total_parts: u64,
    reporter: Arc<ProgressReporter>,
}

impl PartProgress {
    #[must_use]
    pub fn new(total_parts: u64, reporter: Arc<ProgressReporter>) -> Self {
        Self {
            completed: AtomicU64::new(0),
            total_parts,
            reporter,
        }
    }

    /// Records one completed part and reports `floor(completed / total * 100)`.
    pub fn part_completed(&self) {
        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        let percent = (done.min(self.total_parts) * 100)
            .checked_div(self.total_parts)
            .unwrap_or(100);
        self.reporter
            .report(u8::try_from(percent).unwrap_or(LOGICALLY_COMPLETE));
    }

    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }
}
