//! Format-independent record access used by the tabulation engine.

use crate::cancel::CancellationToken;
use crate::delimited::DelimitedReader;
use crate::encoding::{self, TextEncoding};
use crate::error::TabulateResult;
use crate::json_records::JsonRecordReader;
use crate::label_map::{LabelMap, Locator};
use crate::source::{DatasetDescriptor, FormatSpec};
use crate::xml_tree::XmlRecordReader;
use std::borrow::Cow;

/// One raw input record.
pub trait RawRecord {
    /// Value at `loc`; missing fields and text-less elements resolve to "".
    /// The engine resolves literals itself; a reader handed one returns its payload.
    fn lookup(&self, loc: &Locator) -> Cow<'_, str>;
}

/// Stream of raw records in input order.
pub trait RecordReader {
    type Record: RawRecord;

    fn next_record(&mut self) -> Option<TabulateResult<Self::Record>>;
}

/// Reader selected by format kind.
pub enum AnyReader {
    Delimited(DelimitedReader),
    Tree(XmlRecordReader),
    Object(JsonRecordReader),
}

/// Resolve the input encoding, then open the reader for the descriptor's format.
pub fn open_reader(
    desc: &DatasetDescriptor,
    labels: &LabelMap,
    read_buf_bytes: usize,
    cancel: &CancellationToken,
) -> TabulateResult<(AnyReader, TextEncoding)> {
    let enc = encoding::resolve_input_encoding(desc.encoding.as_deref(), &desc.input_path, read_buf_bytes, cancel)?;
    let reader = match &desc.format {
        FormatSpec::Delimited { delimiter, quote } => AnyReader::Delimited(DelimitedReader::open(
            &desc.input_path,
            enc,
            *delimiter,
            *quote,
            labels,
            desc.filter.iter().map(|(f, _)| f.as_str()),
        )?),
        FormatSpec::Tree { record_element } => {
            AnyReader::Tree(XmlRecordReader::open(&desc.input_path, enc, record_element)?)
        }
        FormatSpec::Object { layout } => {
            AnyReader::Object(JsonRecordReader::open(&desc.input_path, enc, *layout, read_buf_bytes)?)
        }
        FormatSpec::Features { crs } => {
            if let Some(crs) = crs {
                tracing::debug!(crs = %crs, "feature collection coordinates are taken as given");
            }
            AnyReader::Object(JsonRecordReader::open_features(&desc.input_path, enc)?)
        }
    };
    Ok((reader, enc))
}
