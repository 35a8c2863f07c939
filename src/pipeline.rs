use crate::cache::{digest, CacheStore};
use crate::cancel::CancellationToken;
use crate::concurrency::{Job, JobOutcome, WorkerPool};
use crate::config::TabulateOptions;
use crate::engine::TabulateStats;
use crate::job::TabulationJob;
use crate::progress::ProgressScope;
use crate::source::DatasetDescriptor;
use crate::util::init_tracing_once;
use ahash::AHashSet;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Skip iff the cache is honoured, an entry exists, the output exists, and the
/// cached digest equals the current one.
pub fn should_skip(ignore_cache: bool, cached: Option<&str>, output_exists: bool, current: &str) -> bool {
    !ignore_cache && output_exists && cached == Some(current)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatasetStatus {
    Skipped,
    Success,
    Error(String),
    Interrupted,
}

impl DatasetStatus {
    /// 0 for success/skipped, 1 for error, none for interrupted.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Skipped | Self::Success => Some(0),
            Self::Error(_) => Some(1),
            Self::Interrupted => None,
        }
    }
}

impl From<JobOutcome> for DatasetStatus {
    fn from(o: JobOutcome) -> Self {
        match o {
            JobOutcome::Success => Self::Success,
            JobOutcome::Error(e) => Self::Error(e),
            JobOutcome::Interrupted => Self::Interrupted,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DatasetReport {
    pub id: String,
    pub status: DatasetStatus,
    pub stats: Option<TabulateStats>,
}

/// Outcome of one pipeline run, datasets in submission order.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub started_at: OffsetDateTime,
    pub elapsed: Duration,
    pub datasets: Vec<DatasetReport>,
    /// Cache load/persist failures; they never change dataset outcomes.
    pub cache_errors: Vec<String>,
}

impl RunReport {
    pub fn status_of(&self, id: &str) -> Option<&DatasetStatus> {
        self.datasets.iter().find(|d| d.id == id).map(|d| &d.status)
    }
    pub fn errored(&self) -> Vec<(&str, &str)> {
        self.datasets
            .iter()
            .filter_map(|d| match &d.status {
                DatasetStatus::Error(e) => Some((d.id.as_str(), e.as_str())),
                _ => None,
            })
            .collect()
    }
    pub fn interrupted(&self) -> Vec<&str> {
        self.ids_with(|s| matches!(s, DatasetStatus::Interrupted))
    }
    pub fn skipped(&self) -> Vec<&str> {
        self.ids_with(|s| matches!(s, DatasetStatus::Skipped))
    }
    pub fn succeeded(&self) -> Vec<&str> {
        self.ids_with(|s| matches!(s, DatasetStatus::Success))
    }
    fn ids_with(&self, pred: impl Fn(&DatasetStatus) -> bool) -> Vec<&str> {
        self.datasets.iter().filter(|d| pred(&d.status)).map(|d| d.id.as_str()).collect()
    }

    /// 1 if anything errored, else 130 if anything was interrupted, else 0.
    pub fn process_exit_code(&self) -> i32 {
        if !self.errored().is_empty() {
            1
        } else if !self.interrupted().is_empty() {
            130
        } else {
            0
        }
    }

    pub fn log_summary(&self) {
        let started = self.started_at.format(&Rfc3339).unwrap_or_else(|_| self.started_at.to_string());
        tracing::info!(
            started = %started,
            succeeded = self.succeeded().len(),
            skipped = self.skipped().len(),
            errored = self.errored().len(),
            interrupted = self.interrupted().len(),
            "run finished in {:.2?}",
            self.elapsed
        );
        for (id, detail) in self.errored() {
            tracing::error!(dataset = %id, "{detail}");
        }
        for id in self.interrupted() {
            tracing::warn!(dataset = %id, "interrupted; status unknown");
        }
        for e in &self.cache_errors {
            tracing::error!("cache: {e}");
        }
    }
}

/// Pipeline driver: digests -> skip decision -> pool -> cache update -> persist.
#[derive(Clone)]
pub struct Pipeline {
    opts: TabulateOptions,
    data_cache: PathBuf,
    source_cache: Option<PathBuf>,
    cancel: CancellationToken,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::from_options(TabulateOptions::default())
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caches default to `.cache/data.cache` and `.cache/source.cache` under the root.
    pub fn from_options(opts: TabulateOptions) -> Self {
        Self {
            data_cache: opts.data_cache_path(),
            source_cache: Some(opts.source_cache_path()),
            cancel: CancellationToken::new(),
            opts,
        }
    }

    // -------- Builder methods --------
    pub fn workers(mut self, n: usize) -> Self { self.opts = self.opts.with_workers(n); self }
    pub fn ignore_cache(mut self, yes: bool) -> Self { self.opts = self.opts.with_ignore_cache(yes); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn progress_label(mut self, label: impl Into<String>) -> Self { self.opts = self.opts.with_progress_label(label); self }
    pub fn interrupt_handling(mut self, yes: bool) -> Self { self.opts = self.opts.with_interrupt_handling(yes); self }
    pub fn data_cache(mut self, path: impl AsRef<Path>) -> Self { self.data_cache = path.as_ref().to_path_buf(); self }
    pub fn source_cache(mut self, path: Option<PathBuf>) -> Self { self.source_cache = path; self }
    pub fn cancel_token(mut self, token: CancellationToken) -> Self { self.cancel = token; self }

    pub fn options(&self) -> &TabulateOptions {
        &self.opts
    }

    /// Persist empty caches.
    pub fn clear_cache(&self) -> Result<()> {
        init_tracing_once();
        for path in std::iter::once(&self.data_cache).chain(self.source_cache.as_ref()) {
            CacheStore::new(path)
                .persist()
                .with_context(|| format!("clear cache {}", path.display()))?;
            tracing::info!(path = %path.display(), "cache cleared");
        }
        Ok(())
    }

    pub fn run(&self, datasets: Vec<DatasetDescriptor>) -> RunReport {
        init_tracing_once();
        let started_at = OffsetDateTime::now_utc();
        let t0 = Instant::now();
        let mut cache_errors = Vec::new();

        let mut data = load_or_empty(&self.data_cache, &mut cache_errors);
        let mut sources = self.source_cache.as_ref().map(|p| load_or_empty(p, &mut cache_errors));

        // digests and skip decisions, single-threaded
        let mut statuses: Vec<Option<DatasetStatus>> = vec![None; datasets.len()];
        let mut pending: Vec<(usize, Fingerprint)> = Vec::new();
        let mut jobs: Vec<TabulationJob> = Vec::new();
        let ids: Vec<String> = datasets.iter().map(|d| d.id.clone()).collect();
        let opts = Arc::new(self.opts.clone());

        let mut claimed_ids = AHashSet::new();
        let mut claimed_outputs = AHashSet::new();

        for (i, desc) in datasets.into_iter().enumerate() {
            // one job per identifier and per output file
            let clash = if !claimed_ids.insert(desc.id.clone()) {
                Some(format!("duplicate dataset identifier '{}'", desc.id))
            } else if !claimed_outputs.insert(desc.output_path.clone()) {
                Some(format!("output {} is already written by another dataset", desc.output_path.display()))
            } else {
                None
            };
            if let Some(detail) = clash {
                tracing::error!(dataset = %desc.id, "{detail}; not queued");
                statuses[i] = Some(DatasetStatus::Error(detail));
                continue;
            }

            let fp = match Fingerprint::compute(&desc, sources.is_some()) {
                Ok(fp) => fp,
                Err(e) => {
                    tracing::error!(dataset = %desc.id, error = %e, "cannot fingerprint input");
                    statuses[i] = Some(DatasetStatus::Error(format!("{e:#}")));
                    continue;
                }
            };
            let output_exists = desc.output_path.exists();
            let ignore = self.opts.ignore_cache;
            let data_fresh = should_skip(ignore, data.lookup(&desc.id), output_exists, &fp.input);
            let source_fresh = match (&sources, &fp.source) {
                (Some(cache), Some(current)) => should_skip(ignore, cache.lookup(&desc.id), output_exists, current),
                _ => true,
            };
            if data_fresh && source_fresh {
                tracing::debug!(dataset = %desc.id, "unchanged; skipping");
                statuses[i] = Some(DatasetStatus::Skipped);
                continue;
            }
            pending.push((i, fp));
            jobs.push(TabulationJob::new(desc, Arc::clone(&opts)));
        }
        tracing::info!(queued = jobs.len(), total = ids.len(), workers = self.opts.workers, "planned run");

        let label = self.opts.progress_label.clone().unwrap_or_else(|| "Tabulating".to_string());
        let progress = ProgressScope::count(self.opts.progress, label, jobs.len() as u64);
        let pool = WorkerPool::new(self.opts.workers)
            .with_cancel(self.cancel.clone())
            .with_interrupt_handling(self.opts.handle_interrupts);
        let outcomes = pool.run_with(&jobs, |_, job, outcome| {
            match outcome {
                JobOutcome::Success => tracing::debug!(dataset = %job.id(), "succeeded"),
                JobOutcome::Error(e) => tracing::error!(dataset = %job.id(), "failed: {e}"),
                JobOutcome::Interrupted => tracing::warn!(dataset = %job.id(), "interrupted"),
            }
            progress.inc_items(1);
        });
        progress.finish("done");

        // cache update for succeeded jobs, then persist
        let mut stats: Vec<Option<TabulateStats>> = vec![None; ids.len()];
        for (((i, fp), job), outcome) in pending.into_iter().zip(&jobs).zip(outcomes) {
            if outcome.is_success() {
                stats[i] = job.stats();
                if let Err(e) = data.upsert(&ids[i], &fp.input) {
                    cache_errors.push(e.to_string());
                }
                if let (Some(cache), Some(src)) = (sources.as_mut(), fp.source.as_deref()) {
                    if let Err(e) = cache.upsert(&ids[i], src) {
                        cache_errors.push(e.to_string());
                    }
                }
            }
            statuses[i] = Some(outcome.into());
        }
        for cache in std::iter::once(&data).chain(sources.as_ref()) {
            if let Err(e) = cache.persist() {
                tracing::error!(error = %e, "could not save cache");
                cache_errors.push(e.to_string());
            }
        }

        let datasets = ids
            .into_iter()
            .zip(statuses)
            .zip(stats)
            .map(|((id, status), stats)| DatasetReport {
                id,
                status: status.unwrap_or(DatasetStatus::Interrupted),
                stats,
            })
            .collect();
        let report = RunReport { started_at, elapsed: t0.elapsed(), datasets, cache_errors };
        report.log_summary();
        report
    }
}

fn load_or_empty(path: &Path, errors: &mut Vec<String>) -> CacheStore {
    match CacheStore::load(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "could not read cache; treating it as empty");
            errors.push(e.to_string());
            CacheStore::new(path)
        }
    }
}

/// Current digests of one dataset's input (and source file, when tracked).
struct Fingerprint {
    input: String,
    source: Option<String>,
}

impl Fingerprint {
    fn compute(desc: &DatasetDescriptor, with_source: bool) -> Result<Self> {
        let input = digest(&desc.input_path)
            .with_context(|| format!("digest {}", desc.input_path.display()))?;
        let source = match (&desc.source_path, with_source) {
            (Some(p), true) => Some(digest(p).with_context(|| format!("digest {}", p.display()))?),
            _ => None,
        };
        Ok(Self { input, source })
    }
}
