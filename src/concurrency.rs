//! Worker pool: a fixed number of threads drain one pre-loaded FIFO queue of jobs
//! under a shared cancellation token; outcomes are reported in submission order.

use crate::cancel::CancellationToken;
use crate::error::TabulateResult;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// One unit of work for the pool.
pub trait Job: Send + Sync {
    fn id(&self) -> &str;
    fn run(&self, cancel: &CancellationToken) -> TabulateResult<()>;
}

/// Exactly one per submitted job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    Error(String),
    Interrupted,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

pub struct WorkerPool {
    workers: usize,
    cancel: CancellationToken,
    handle_interrupts: bool,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self { workers: workers.max(1), cancel: CancellationToken::new(), handle_interrupts: false }
    }
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
    /// Route SIGINT into the pool's token for the duration of each `run`.
    pub fn with_interrupt_handling(mut self, yes: bool) -> Self {
        self.handle_interrupts = yes;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run every job; returns once the queue is drained and all workers exited.
    pub fn run<J: Job>(&self, jobs: &[J]) -> Vec<JobOutcome> {
        self.run_with(jobs, |_, _, _| {})
    }

    /// Like [`run`](Self::run), calling `on_done(index, job, outcome)` from the
    /// worker thread as each job finishes.
    pub fn run_with<J, F>(&self, jobs: &[J], on_done: F) -> Vec<JobOutcome>
    where
        J: Job,
        F: Fn(usize, &J, &JobOutcome) + Sync,
    {
        let n = jobs.len();
        if n == 0 {
            return Vec::new();
        }
        let _hook = if self.handle_interrupts {
            match self.cancel.install_interrupt_hook() {
                Ok(h) => Some(h),
                Err(e) => {
                    tracing::warn!(error = %e, "could not install interrupt handler");
                    None
                }
            }
        } else {
            None
        };

        let queue: Mutex<VecDeque<(usize, &J)>> = Mutex::new(jobs.iter().enumerate().collect());
        let results: Mutex<Vec<Option<JobOutcome>>> = Mutex::new(vec![None; n]);
        let threads = self.workers.min(n);

        let worker = || loop {
            let Some((i, job)) = queue.lock().pop_front() else { break };
            let outcome = if self.cancel.is_cancelled() {
                JobOutcome::Interrupted
            } else {
                execute(job, &self.cancel)
            };
            on_done(i, job, &outcome);
            results.lock()[i] = Some(outcome);
        };

        match rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("tab-worker-{i}"))
            .build()
        {
            Ok(pool) => pool.scope(|s| {
                for _ in 0..threads {
                    s.spawn(|_| worker());
                }
            }),
            Err(e) => {
                tracing::warn!(error = %e, "could not start worker threads; running jobs inline");
                worker();
            }
        }

        results
            .into_inner()
            .into_iter()
            .map(|o| o.unwrap_or(JobOutcome::Interrupted))
            .collect()
    }
}

fn execute<J: Job>(job: &J, cancel: &CancellationToken) -> JobOutcome {
    match catch_unwind(AssertUnwindSafe(|| job.run(cancel))) {
        Ok(Ok(())) => JobOutcome::Success,
        Ok(Err(e)) if e.is_interrupted() => JobOutcome::Interrupted,
        Ok(Err(e)) => JobOutcome::Error(e.to_string()),
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "job panicked".to_string());
            JobOutcome::Error(format!("panic: {msg}"))
        }
    }
}
