// src/state.rs

use crate::models::RunOutcome;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};

/// Value of a progress counter while its operation is not running.
pub const PROGRESS_IDLE: i32 = -1;

/// The cross-thread signals shared between the UI and the background interpreter.
///
/// Everything per-run (success, gates, bindings) lives on the worker's stack;
/// only cancellation requests, progress counters and the published outcome
/// are kept here.
#[derive(Debug)]
pub struct InterpreterState {
    pub abort_command: AtomicBool,
    pub abort_download: AtomicBool,
    pub abort_unzip: AtomicBool,
    pub abort_file_op: AtomicBool,

    pub download_percentage: AtomicI32,
    pub unzip_percentage: AtomicI32,
    pub copy_percentage: AtomicI32,

    running: AtomicBool,
    pending_jobs: AtomicUsize,

    last_success: AtomicBool,
    refresh_page: AtomicBool,
    refresh_package: AtomicBool,
}

pub type SharedState = Arc<InterpreterState>;

impl Default for InterpreterState {
    fn default() -> Self {
        Self {
            abort_command: AtomicBool::new(false),
            abort_download: AtomicBool::new(false),
            abort_unzip: AtomicBool::new(false),
            abort_file_op: AtomicBool::new(false),
            download_percentage: AtomicI32::new(PROGRESS_IDLE),
            unzip_percentage: AtomicI32::new(PROGRESS_IDLE),
            copy_percentage: AtomicI32::new(PROGRESS_IDLE),
            running: AtomicBool::new(false),
            pending_jobs: AtomicUsize::new(0),
            last_success: AtomicBool::new(false),
            refresh_page: AtomicBool::new(false),
            refresh_package: AtomicBool::new(false),
        }
    }
}

impl InterpreterState {
    pub fn shared() -> SharedState {
        Arc::new(Self::default())
    }

    /// Asks the running batch and every in-flight long operation to stop.
    pub fn request_abort(&self) {
        self.abort_command.store(true, Ordering::Release);
        self.abort_download.store(true, Ordering::Release);
        self.abort_unzip.store(true, Ordering::Release);
        self.abort_file_op.store(true, Ordering::Release);
    }

    pub fn clear_abort_flags(&self) {
        self.abort_command.store(false, Ordering::Release);
        self.abort_download.store(false, Ordering::Release);
        self.abort_unzip.store(false, Ordering::Release);
        self.abort_file_op.store(false, Ordering::Release);
    }

    pub fn reset_percentages(&self) {
        self.download_percentage.store(PROGRESS_IDLE, Ordering::Release);
        self.unzip_percentage.store(PROGRESS_IDLE, Ordering::Release);
        self.copy_percentage.store(PROGRESS_IDLE, Ordering::Release);
    }

    /// Consumes a pending batch abort. Returns whether one was pending.
    pub fn take_command_abort(&self) -> bool {
        self.abort_command.swap(false, Ordering::AcqRel)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn pending_jobs(&self) -> usize {
        self.pending_jobs.load(Ordering::Acquire)
    }

    pub(crate) fn job_enqueued(&self) {
        self.pending_jobs.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn job_finished(&self) {
        // Saturate so a drained queue can never wrap around.
        let _ = self
            .pending_jobs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Stores the result of a finished run for the UI thread to pick up.
    pub fn publish_outcome(&self, outcome: &RunOutcome) {
        self.last_success.store(outcome.success, Ordering::Release);
        self.refresh_page.store(outcome.refresh_page, Ordering::Release);
        self.refresh_package
            .store(outcome.refresh_package, Ordering::Release);
    }

    pub fn last_success(&self) -> bool {
        self.last_success.load(Ordering::Acquire)
    }

    /// Returns and clears a pending page refresh request.
    pub fn take_refresh_page(&self) -> bool {
        self.refresh_page.swap(false, Ordering::AcqRel)
    }

    /// Returns and clears a pending package refresh request.
    pub fn take_refresh_package(&self) -> bool {
        self.refresh_package.swap(false, Ordering::AcqRel)
    }
}

/// Converts a transferred/total byte count into a 0-100 progress value.
pub fn update_progress(counter: &AtomicI32, total: u64, done: u64) {
    if total == 0 {
        return;
    }
    let percent = (done.min(total) * 100 + total / 2) / total;
    counter.store(i32::try_from(percent).unwrap_or(100), Ordering::Release);
}
