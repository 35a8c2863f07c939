use crate::cancel::CancellationToken;
use crate::concurrency::Job;
use crate::config::TabulateOptions;
use crate::engine::{tabulate_dataset, TabulateStats};
use crate::error::TabulateResult;
use crate::source::DatasetDescriptor;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// One dataset, tabulated end to end on a pool worker.
pub struct TabulationJob {
    desc: DatasetDescriptor,
    opts: Arc<TabulateOptions>,
    stats: Mutex<Option<TabulateStats>>,
}

impl TabulationJob {
    pub fn new(desc: DatasetDescriptor, opts: Arc<TabulateOptions>) -> Self {
        Self { desc, opts, stats: Mutex::new(None) }
    }

    pub fn descriptor(&self) -> &DatasetDescriptor {
        &self.desc
    }

    /// Row counters of the last successful run.
    pub fn stats(&self) -> Option<TabulateStats> {
        *self.stats.lock()
    }
}

impl Job for TabulationJob {
    fn id(&self) -> &str {
        &self.desc.id
    }

    fn run(&self, cancel: &CancellationToken) -> TabulateResult<()> {
        let span = tracing::info_span!("dataset", dataset = %self.desc.id);
        let _enter = span.enter();
        let t0 = Instant::now();
        let stats = tabulate_dataset(&self.desc, &self.opts, cancel)?;
        tracing::info!(
            read = stats.read,
            written = stats.written,
            filtered = stats.filtered,
            empty = stats.empty,
            "done in {:.2?}",
            t0.elapsed()
        );
        *self.stats.lock() = Some(stats);
        Ok(())
    }
}
