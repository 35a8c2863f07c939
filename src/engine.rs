//! Tabulation engine: raw records in, standardized rows out.

use crate::cancel::CancellationToken;
use crate::config::TabulateOptions;
use crate::error::TabulateResult;
use crate::filters::RowFilter;
use crate::label_map::{ColumnLocator, LabelMap, Locator};
use crate::normalize::normalize_value;
use crate::output::{CsvFileSink, RowSink};
use crate::reader::{open_reader, AnyReader, RawRecord, RecordReader};
use crate::source::{DatasetDescriptor, NormalizeFlags};
use std::borrow::Cow;

pub const INDEX_COLUMN: &str = "idx";
pub const PROVIDER_COLUMN: &str = "provider";

/// Per-dataset row counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TabulateStats {
    pub read: u64,
    pub filtered: u64,
    pub empty: u64,
    pub written: u64,
}

/// Compiled mapping for one dataset.
#[derive(Debug)]
pub struct Tabulator<'a> {
    labels: &'a LabelMap,
    filter: &'a RowFilter,
    normalize: NormalizeFlags,
    provider: Option<&'a str>,
    add_index: bool,
}

impl<'a> Tabulator<'a> {
    pub fn new(labels: &'a LabelMap, filter: &'a RowFilter) -> Self {
        Self { labels, filter, normalize: NormalizeFlags::default(), provider: None, add_index: false }
    }
    pub fn normalize(mut self, flags: NormalizeFlags) -> Self {
        self.normalize = flags;
        self
    }
    pub fn provider(mut self, provider: Option<&'a str>) -> Self {
        self.provider = provider;
        self
    }
    pub fn index(mut self, yes: bool) -> Self {
        self.add_index = yes;
        self
    }

    pub fn header(&self) -> Vec<&str> {
        let mut names = Vec::with_capacity(self.labels.len() + 2);
        if self.add_index {
            names.push(INDEX_COLUMN);
        }
        names.extend(self.labels.column_names());
        if self.provider.is_some() {
            names.push(PROVIDER_COLUMN);
        }
        names
    }

    /// Raw value of one column before normalization.
    pub fn column_value<'r, R: RawRecord>(&self, rec: &'r R, col: &'r ColumnLocator) -> Cow<'r, str> {
        match col {
            ColumnLocator::Single(loc) => resolve(rec, loc),
            ColumnLocator::Concat(parts) => {
                let mut joined = String::new();
                for (i, loc) in parts.iter().enumerate() {
                    if i > 0 {
                        joined.push(' ');
                    }
                    joined.push_str(&resolve(rec, loc));
                }
                Cow::Owned(joined)
            }
        }
    }

    /// Mapped, normalized values for one record, or `None` if every value is empty.
    pub fn build_row<R: RawRecord>(&self, rec: &R) -> Option<Vec<String>> {
        let values: Vec<String> = self
            .labels
            .iter()
            .map(|(_, col)| normalize_value(&self.column_value(rec, col), &self.normalize))
            .collect();
        if values.iter().all(|v| v.is_empty()) {
            None
        } else {
            Some(values)
        }
    }

    /// Drain `reader` into `sink`, header first. Checks `cancel` once per record.
    pub fn run<R: RecordReader, S: RowSink>(
        &self,
        reader: &mut R,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> TabulateResult<TabulateStats> {
        sink.write_header(&self.header())?;
        let mut stats = TabulateStats::default();
        let mut idx: u64 = 0;

        while let Some(rec) = reader.next_record() {
            cancel.checkpoint()?;
            let rec = rec?;
            stats.read += 1;

            if !self.filter.keep(&rec) {
                stats.filtered += 1;
                continue;
            }
            let Some(values) = self.build_row(&rec) else {
                stats.empty += 1;
                continue;
            };

            let idx_text;
            let mut fields: Vec<&str> = Vec::with_capacity(values.len() + 2);
            if self.add_index {
                idx_text = idx.to_string();
                fields.push(idx_text.as_str());
                idx += 1;
            }
            fields.extend(values.iter().map(String::as_str));
            if let Some(p) = self.provider {
                fields.push(p);
            }
            sink.write_row(&fields)?;
            stats.written += 1;
        }
        sink.finish()?;
        Ok(stats)
    }
}

fn resolve<'r, R: RawRecord>(rec: &'r R, loc: &'r Locator) -> Cow<'r, str> {
    match loc {
        Locator::Literal(v) => Cow::Borrowed(v.as_str()),
        other => rec.lookup(other),
    }
}

/// Tabulate one dataset end to end: compile, open, stream to the output file.
///
/// Output is written in place; a job that fails midway leaves what it wrote.
pub fn tabulate_dataset(
    desc: &DatasetDescriptor,
    opts: &TabulateOptions,
    cancel: &CancellationToken,
) -> TabulateResult<TabulateStats> {
    let kind = desc.format.kind();
    let labels = LabelMap::compile(&desc.schema, kind)?;
    let filter = RowFilter::compile(&desc.filter, kind)?;
    let tab = Tabulator::new(&labels, &filter)
        .normalize(desc.normalize)
        .provider(desc.provider.as_deref())
        .index(desc.add_index);

    let (reader, enc) = open_reader(desc, &labels, opts.read_buffer_bytes, cancel)?;
    tracing::debug!(encoding = %enc, output = %desc.output_path.display(), "tabulating");

    let mut sink = CsvFileSink::create(
        &desc.output_path,
        opts.target_encoding,
        opts.output_encoding_errors,
        opts.write_buffer_bytes,
    )?;
    match reader {
        AnyReader::Delimited(mut r) => tab.run(&mut r, &mut sink, cancel),
        AnyReader::Tree(mut r) => tab.run(&mut r, &mut sink, cancel),
        AnyReader::Object(mut r) => tab.run(&mut r, &mut sink, cancel),
    }
}
