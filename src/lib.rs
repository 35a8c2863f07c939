mod error;
mod config;
mod encoding;
mod source;
mod paths;

mod label_map;
mod reader;
mod delimited;
mod xml_tree;
mod json_records;
mod filters;
mod normalize;
mod output;
mod engine;

mod cache;
mod cancel;
mod concurrency;
mod job;
mod pipeline;
mod progress;
mod util;

pub use crate::error::{CacheError, TabulateError, TabulateResult};
pub use crate::config::{GeneralSettings, Settings, TabulateOptions};
pub use crate::encoding::{EncodingErrors, TextEncoding};
pub use crate::source::{DatasetDescriptor, FormatKind, FormatSpec, JsonLayout, NormalizeFlags, SchemaValue};
pub use crate::paths::discover_source_files;

// mapping engine
pub use crate::label_map::{ColumnLocator, LabelMap, Locator, TreePath};
pub use crate::reader::{RawRecord, RecordReader};
pub use crate::delimited::DelimitedReader;
pub use crate::xml_tree::XmlRecordReader;
pub use crate::json_records::JsonRecordReader;
pub use crate::filters::RowFilter;
pub use crate::normalize::normalize_value;
pub use crate::output::{CsvFileSink, RowSink, VecSink};
pub use crate::engine::{tabulate_dataset, TabulateStats, Tabulator};

// cache, pool, driver
pub use crate::cache::{digest, CacheStore};
pub use crate::cancel::CancellationToken;
pub use crate::concurrency::{Job, JobOutcome, WorkerPool};
pub use crate::job::TabulationJob;
pub use crate::pipeline::{should_skip, DatasetReport, DatasetStatus, Pipeline, RunReport};

// Expose multiprogress so binaries can share one terminal.
pub use crate::progress::set_global_multiprogress;

pub use crate::util::init_tracing_once;
