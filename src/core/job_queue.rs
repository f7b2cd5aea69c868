// src/core/job_queue.rs

//! # Background Interpreter
//!
//! A single worker thread drains a FIFO of [`Job`]s, one at a time. The UI
//! thread only enqueues work, raises abort requests and reads the shared
//! [`InterpreterState`](crate::state::InterpreterState).

use crate::{core::task_executor::execute_commands, models::Job, system::Services};
use crossbeam_channel::{Receiver, Sender, TryRecvError, select, unbounded};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

const WORKER_THREAD_NAME: &str = "packrun-worker";
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn the interpreter thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("The interpreter has been shut down.")]
    Stopped,
}

/// Handle to the background worker. Dropping it shuts the worker down.
#[derive(Debug)]
pub struct Interpreter {
    services: Arc<Services>,
    jobs: Sender<Job>,
    shutdown: Sender<()>,
    worker: Option<JoinHandle<()>>,
}

impl Interpreter {
    pub fn start(services: Arc<Services>) -> Result<Self, WorkerError> {
        let (jobs, job_rx) = unbounded::<Job>();
        let (shutdown, shutdown_rx) = unbounded::<()>();

        let mut builder = thread::Builder::new().name(WORKER_THREAD_NAME.to_string());
        if services.config.worker_stack_size > 0 {
            builder = builder.stack_size(services.config.worker_stack_size);
        }

        let worker_services = Arc::clone(&services);
        let worker = builder
            .spawn(move || worker_loop(&worker_services, &job_rx, &shutdown_rx))
            .map_err(WorkerError::Spawn)?;
        log::debug!("Interpreter thread '{}' started", WORKER_THREAD_NAME);

        Ok(Self {
            services,
            jobs,
            shutdown,
            worker: Some(worker),
        })
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// Queues a job behind any pending ones.
    pub fn enqueue(&self, job: Job) -> Result<(), WorkerError> {
        if self.worker.is_none() {
            return Err(WorkerError::Stopped);
        }
        self.services.state.job_enqueued();
        self.jobs.send(job).map_err(|_| {
            self.services.state.job_finished();
            WorkerError::Stopped
        })
    }

    /// Stops the running job at the next command boundary, along with any
    /// download, unzip or copy in flight.
    pub fn request_abort(&self) {
        self.services.state.request_abort();
    }

    pub fn is_running(&self) -> bool {
        self.services.state.is_running()
    }

    /// No job is running and none is waiting.
    pub fn is_idle(&self) -> bool {
        !self.is_running() && self.services.state.pending_jobs() == 0
    }

    /// Blocks until the queue drains. Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_idle() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(IDLE_POLL_INTERVAL);
        }
        true
    }

    /// Signals the worker, waits for it and clears every shared flag.
    /// Jobs still queued are dropped.
    pub fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.shutdown.send(());
        self.services.state.request_abort();
        if worker.join().is_err() {
            log::error!("Interpreter thread panicked.");
        }

        let state = &self.services.state;
        state.clear_abort_flags();
        state.reset_percentages();
        while state.pending_jobs() > 0 {
            state.job_finished();
        }
        log::debug!("Interpreter thread stopped");
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(services: &Services, jobs: &Receiver<Job>, shutdown: &Receiver<()>) {
    loop {
        match shutdown.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        select! {
            recv(shutdown) -> _ => break,
            recv(jobs) -> job => match job {
                Ok(job) => run_job(services, job),
                Err(_) => break,
            },
        }
    }
}

fn run_job(services: &Services, job: Job) {
    let state = &services.state;
    state.clear_abort_flags();
    state.reset_percentages();
    state.set_running(true);

    scopeguard::defer! {
        state.clear_abort_flags();
        state.reset_percentages();
        state.set_running(false);
        state.job_finished();
    }

    log::debug!(
        "Running job '{}' ({} commands)",
        job.selected_command,
        job.commands.len()
    );
    let outcome = execute_commands(
        &job.commands,
        &job.package_path,
        &job.selected_command,
        services,
    );
    state.publish_outcome(&outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::package_parser::tokenize_line;
    use crate::models::PlatformVariant;
    use crate::state::PROGRESS_IDLE;
    use crate::system::test_support::services_at;
    use std::fs;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::Ordering;
    use tempfile::tempdir;

    fn job(lines: &[&str]) -> Job {
        Job::new(lines.iter().map(|line| tokenize_line(line)).collect(), "", "opt")
    }

    #[test]
    fn test_jobs_run_in_fifo_order() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let (services, _) = services_at(dir.path(), PlatformVariant::Erista);
        let interpreter = Interpreter::start(Arc::new(services)).unwrap();

        // --- Action ---
        for name in ["first", "second", "third"] {
            let line = format!("set-ini-val sdmc:/order.ini log {} 1", name);
            interpreter.enqueue(job(&[line.as_str()])).unwrap();
        }

        // --- Assertions ---
        assert!(interpreter.wait_idle(Duration::from_secs(10)));
        assert_eq!(
            fs::read_to_string(dir.path().join("order.ini")).unwrap(),
            "[log]\nfirst=1\nsecond=1\nthird=1\n"
        );
        assert!(interpreter.services().state.last_success());
    }

    #[test]
    fn test_outcome_is_published_and_flags_reset() {
        let dir = tempdir().unwrap();
        let (services, _) = services_at(dir.path(), PlatformVariant::Erista);
        let interpreter = Interpreter::start(Arc::new(services)).unwrap();

        interpreter
            .enqueue(job(&["cp sdmc:/missing.txt sdmc:/out.txt", "refresh"]))
            .unwrap();

        assert!(interpreter.wait_idle(Duration::from_secs(10)));
        let state = &interpreter.services().state;
        assert!(!state.last_success());
        assert!(state.take_refresh_page());
        assert!(!state.take_refresh_page());
        assert!(!interpreter.is_running());
    }

    #[test]
    fn test_abort_during_a_job_stops_the_remaining_commands() {
        // --- Setup ---
        // A server that holds the response back until the abort has been raised.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (connected_tx, connected_rx) = unbounded::<()>();
        let (release_tx, release_rx) = unbounded::<()>();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut byte = [0u8; 1];
            while !request.ends_with(b"\r\n\r\n") && stream.read(&mut byte).unwrap_or(0) == 1 {
                request.push(byte[0]);
            }
            connected_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\nConnection: close\r\n\r\ndata");
        });

        let dir = tempdir().unwrap();
        let (services, _) = services_at(dir.path(), PlatformVariant::Erista);
        let interpreter = Interpreter::start(Arc::new(services)).unwrap();
        let url = format!("download http://127.0.0.1:{}/pack.bin sdmc:/dl/", port);

        // --- Action ---
        interpreter
            .enqueue(job(&[url.as_str(), "mkdir sdmc:/after"]))
            .unwrap();
        connected_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(interpreter.is_running());
        interpreter.request_abort();
        release_tx.send(()).unwrap();
        server.join().unwrap();

        // --- Assertions ---
        assert!(interpreter.wait_idle(Duration::from_secs(10)));
        let state = &interpreter.services().state;
        assert!(!state.last_success());
        assert!(!dir.path().join("after").exists());
        assert!(!dir.path().join("dl/pack.bin").exists());
        assert!(!state.abort_command.load(Ordering::Acquire));
        assert!(!state.abort_download.load(Ordering::Acquire));
        assert_eq!(state.download_percentage.load(Ordering::Acquire), PROGRESS_IDLE);
    }

    #[test]
    fn test_enqueue_after_shutdown_is_refused() {
        let dir = tempdir().unwrap();
        let (services, _) = services_at(dir.path(), PlatformVariant::Erista);
        let mut interpreter = Interpreter::start(Arc::new(services)).unwrap();

        interpreter.shutdown();

        assert!(matches!(interpreter.enqueue(job(&["refresh"])), Err(WorkerError::Stopped)));
        assert!(interpreter.is_idle());
    }
}
