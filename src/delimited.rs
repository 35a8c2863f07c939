//! Delimited-text records: header index, BOM strip, field-count integrity.

use crate::encoding::{read_to_string, TextEncoding};
use crate::error::{TabulateError, TabulateResult};
use crate::label_map::{LabelMap, Locator};
use crate::reader::{RawRecord, RecordReader};
use crate::util::open_with_backoff;
use ahash::AHashMap;
use std::borrow::Cow;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;
use std::sync::Arc;

const BOM: char = '\u{feff}';

pub struct DelimitedReader {
    rdr: csv::Reader<Box<dyn Read + Send>>,
    header: Arc<AHashMap<String, usize>>,
    width: usize,
}

impl DelimitedReader {
    /// Open `path` and read its header. Referenced fields missing from the header
    /// are logged once and resolve to "" for every row.
    pub fn open<'a>(
        path: &Path,
        enc: TextEncoding,
        delimiter: u8,
        quote: u8,
        labels: &'a LabelMap,
        filter_fields: impl Iterator<Item = &'a str>,
    ) -> TabulateResult<Self> {
        let src: Box<dyn Read + Send> = match enc {
            TextEncoding::Utf8 => Box::new(BufReader::new(open_with_backoff(path, 16, 50)?)),
            _ => Box::new(Cursor::new(read_to_string(path, enc)?.into_bytes())),
        };
        Self::from_reader(src, delimiter, quote, labels, filter_fields)
    }

    pub fn from_reader<'a>(
        src: Box<dyn Read + Send>,
        delimiter: u8,
        quote: u8,
        labels: &'a LabelMap,
        filter_fields: impl Iterator<Item = &'a str>,
    ) -> TabulateResult<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .quote(quote)
            .has_headers(true)
            .flexible(true)
            .from_reader(src);

        let mut header = AHashMap::new();
        let names = rdr.headers()?.clone();
        for (i, name) in names.iter().enumerate() {
            let name = if i == 0 { name.trim_start_matches(BOM) } else { name };
            // a repeated name resolves to its last column
            header.insert(name.to_string(), i);
        }

        let referenced = labels
            .references()
            .filter_map(|l| match l {
                Locator::Field(f) => Some(f.as_str()),
                _ => None,
            })
            .chain(filter_fields);
        for field in referenced {
            if !header.contains_key(field) {
                tracing::warn!(field, "field not present in header; values will be empty");
            }
        }

        Ok(Self { rdr, width: names.len(), header: Arc::new(header) })
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

pub struct DelimitedRecord {
    fields: csv::StringRecord,
    header: Arc<AHashMap<String, usize>>,
}

impl RawRecord for DelimitedRecord {
    fn lookup(&self, loc: &Locator) -> Cow<'_, str> {
        let name = match loc {
            Locator::Field(f) => f.as_str(),
            Locator::Literal(v) => return Cow::Owned(v.clone()),
            Locator::Path(_) => return Cow::Borrowed(""),
        };
        let value = self
            .header
            .get(name)
            .and_then(|&i| self.fields.get(i))
            .unwrap_or("");
        Cow::Borrowed(value)
    }
}

impl RecordReader for DelimitedReader {
    type Record = DelimitedRecord;

    fn next_record(&mut self) -> Option<TabulateResult<DelimitedRecord>> {
        let mut fields = csv::StringRecord::new();
        match self.rdr.read_record(&mut fields) {
            Ok(false) => None,
            Err(e) => Some(Err(e.into())),
            Ok(true) => {
                if fields.len() != self.width {
                    let line = fields.position().map(|p| p.line()).unwrap_or(0);
                    return Some(Err(TabulateError::FormatIntegrity {
                        line,
                        expected: self.width,
                        found: fields.len(),
                    }));
                }
                Some(Ok(DelimitedRecord { fields, header: Arc::clone(&self.header) }))
            }
        }
    }
}
