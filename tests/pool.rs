use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread::sleep;
use std::time::Duration;
use tabkit::{CancellationToken, Job, JobOutcome, TabulateError, TabulateResult, WorkerPool};

/// Test job driven by a closure.
struct FnJob<F> {
    id: String,
    f: F,
}

impl<F> Job for FnJob<F>
where
    F: Fn(&CancellationToken) -> TabulateResult<()> + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }
    fn run(&self, cancel: &CancellationToken) -> TabulateResult<()> {
        (self.f)(cancel)
    }
}

fn job<F>(id: &str, f: F) -> FnJob<F>
where
    F: Fn(&CancellationToken) -> TabulateResult<()> + Send + Sync,
{
    FnJob { id: id.to_string(), f }
}

type BoxedFn<'a> = Box<dyn Fn(&CancellationToken) -> TabulateResult<()> + Send + Sync + 'a>;

fn boxed<'a>(f: impl Fn(&CancellationToken) -> TabulateResult<()> + Send + Sync + 'a) -> BoxedFn<'a> {
    Box::new(f)
}

#[test]
fn outcomes_follow_submission_order_not_completion_order() {
    // all three start together, then finish C, B, A
    let together = Barrier::new(3);
    let finished = Mutex::new(Vec::new());
    let jobs: Vec<FnJob<BoxedFn>> = [("A", 160u64), ("B", 80), ("C", 0)]
        .into_iter()
        .map(|(id, ms)| {
            let together = &together;
            job(
                id,
                boxed(move |_| {
                    together.wait();
                    sleep(Duration::from_millis(ms));
                    Ok(())
                }),
            )
        })
        .collect();

    let outcomes = WorkerPool::new(3).run_with(&jobs, |i, j, _| finished.lock().push((i, j.id().to_string())));
    assert_eq!(outcomes, vec![JobOutcome::Success; 3]);

    let finished = finished.into_inner();
    let order: Vec<&str> = finished.iter().map(|(_, id)| id.as_str()).collect();
    assert_eq!(order, ["C", "B", "A"]);
    let indices: Vec<usize> = finished.iter().map(|(i, _)| *i).collect();
    assert_eq!(indices, [2, 1, 0]);
}

#[test]
fn errors_are_isolated_per_job() {
    let jobs: Vec<FnJob<BoxedFn>> = vec![
        job("ok-1", boxed(|_| Ok(()))),
        job("bad", boxed(|_| Err(TabulateError::config("broken locator")))),
        job("ok-2", boxed(|_| Ok(()))),
        job("panics", boxed(|_| panic!("kaboom"))),
        job("ok-3", boxed(|_| Ok(()))),
    ];
    let outcomes = WorkerPool::new(2).run(&jobs);
    assert_eq!(outcomes[0], JobOutcome::Success);
    assert!(matches!(&outcomes[1], JobOutcome::Error(e) if e.contains("broken locator")));
    assert_eq!(outcomes[2], JobOutcome::Success);
    assert!(matches!(&outcomes[3], JobOutcome::Error(e) if e.contains("kaboom")));
    assert_eq!(outcomes[4], JobOutcome::Success);
}

#[test]
fn cancelled_before_start_runs_nothing() {
    let ran = AtomicUsize::new(0);
    let jobs: Vec<_> = (0..4)
        .map(|i| {
            job(&format!("j{i}"), |_: &CancellationToken| {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .collect();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcomes = WorkerPool::new(2).with_cancel(cancel).run(&jobs);
    assert_eq!(outcomes, vec![JobOutcome::Interrupted; 4]);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test]
fn cancel_mid_job_is_interrupted_and_queued_jobs_do_not_start() {
    let cancel = CancellationToken::new();
    let started = Barrier::new(2);
    let ran_second = AtomicUsize::new(0);

    let jobs: Vec<FnJob<BoxedFn>> = vec![
        job(
            "long",
            boxed(|c| {
                started.wait();
                // one checkpoint per record, forever
                loop {
                    c.checkpoint()?;
                    sleep(Duration::from_millis(5));
                }
            }),
        ),
        job(
            "queued",
            boxed(|_| {
                ran_second.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        ),
    ];

    let pool = WorkerPool::new(1).with_cancel(cancel.clone());
    let outcomes = std::thread::scope(|s| {
        let handle = s.spawn(|| pool.run(&jobs));
        started.wait();
        cancel.cancel();
        handle.join().unwrap()
    });
    assert_eq!(outcomes, vec![JobOutcome::Interrupted, JobOutcome::Interrupted]);
    assert_eq!(ran_second.load(Ordering::SeqCst), 0);
}

#[test]
fn job_past_its_last_checkpoint_completes_normally() {
    let cancel = CancellationToken::new();
    let jobs = vec![job("late", |c: &CancellationToken| {
        c.checkpoint()?;
        c.cancel();
        Ok(())
    })];
    let outcomes = WorkerPool::new(1).with_cancel(cancel.clone()).run(&jobs);
    assert_eq!(outcomes, vec![JobOutcome::Success]);
    assert!(cancel.is_cancelled());
}

#[test]
fn empty_batch_returns_no_outcomes() {
    let jobs: Vec<FnJob<BoxedFn>> = Vec::new();
    assert!(WorkerPool::new(4).run(&jobs).is_empty());
}
