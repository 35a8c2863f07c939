//! Structured-object records: a top-level array of objects, one object per line,
//! or the features of a GeoJSON FeatureCollection.

use crate::encoding::{read_to_string, TextEncoding};
use crate::error::{TabulateError, TabulateResult};
use crate::label_map::Locator;
use crate::reader::{RawRecord, RecordReader};
use crate::source::JsonLayout;
use crate::util::open_with_backoff;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;

pub enum JsonRecordReader {
    Records(std::vec::IntoIter<Value>),
    Lines { rdr: Box<dyn BufRead + Send>, line: String, line_no: u64 },
}

impl JsonRecordReader {
    pub fn open(path: &Path, enc: TextEncoding, layout: JsonLayout, buf_bytes: usize) -> TabulateResult<Self> {
        match layout {
            JsonLayout::Records => Self::from_records_str(&read_to_string(path, enc)?),
            JsonLayout::Lines => {
                let rdr: Box<dyn BufRead + Send> = match enc {
                    TextEncoding::Utf8 => {
                        let f = open_with_backoff(path, 16, 50)?;
                        Box::new(BufReader::with_capacity(buf_bytes.max(8 * 1024), f))
                    }
                    _ => Box::new(Cursor::new(read_to_string(path, enc)?.into_bytes())),
                };
                Ok(Self::from_lines(rdr))
            }
        }
    }

    pub fn from_records_str(text: &str) -> TabulateResult<Self> {
        match serde_json::from_str::<Value>(text.trim_start_matches('\u{feff}'))? {
            Value::Array(items) => Ok(Self::Records(items.into_iter())),
            _ => Err(TabulateError::config("expected a top-level array of records")),
        }
    }

    pub fn open_features(path: &Path, enc: TextEncoding) -> TabulateResult<Self> {
        Self::from_features_str(&read_to_string(path, enc)?)
    }

    /// One record per feature: its `properties`, plus `LONGITUDE`/`LATITUDE` taken
    /// from a Point geometry when the properties do not carry them.
    pub fn from_features_str(text: &str) -> TabulateResult<Self> {
        let mut doc: Value = serde_json::from_str(text.trim_start_matches('\u{feff}'))?;
        if doc.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
            return Err(TabulateError::config("expected a GeoJSON FeatureCollection"));
        }
        let features = match doc.get_mut("features").map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => return Err(TabulateError::config("FeatureCollection has no 'features' array")),
        };
        let records: Vec<Value> = features.into_iter().map(feature_record).collect();
        Ok(Self::Records(records.into_iter()))
    }

    pub fn from_lines(rdr: Box<dyn BufRead + Send>) -> Self {
        Self::Lines { rdr, line: String::with_capacity(8 * 1024), line_no: 0 }
    }
}

impl RecordReader for JsonRecordReader {
    type Record = Value;

    fn next_record(&mut self) -> Option<TabulateResult<Value>> {
        match self {
            Self::Records(items) => items.next().map(Ok),
            Self::Lines { rdr, line, line_no } => loop {
                line.clear();
                match rdr.read_line(line) {
                    Ok(0) => return None,
                    Ok(_) => {}
                    Err(e) => return Some(Err(e.into())),
                }
                *line_no += 1;
                let s = line.trim();
                let s = if *line_no == 1 { s.trim_start_matches('\u{feff}') } else { s };
                if s.is_empty() {
                    continue;
                }
                return Some(serde_json::from_str(s).map_err(|e| {
                    tracing::debug!(line = *line_no, "bad json line");
                    TabulateError::from(e)
                }));
            },
        }
    }
}

const LONGITUDE: &str = "LONGITUDE";
const LATITUDE: &str = "LATITUDE";

fn feature_record(mut feature: Value) -> Value {
    let mut props = match feature.get_mut("properties").map(Value::take) {
        Some(Value::Object(m)) => m,
        _ => Map::new(),
    };
    let point = feature
        .get("geometry")
        .filter(|g| g.get("type").and_then(Value::as_str) == Some("Point"))
        .and_then(|g| g.get("coordinates"))
        .and_then(Value::as_array);
    if let Some(coords) = point {
        for (key, axis) in [(LONGITUDE, 0), (LATITUDE, 1)] {
            if !props.contains_key(key) {
                if let Some(v) = coords.get(axis) {
                    props.insert(key.to_string(), v.clone());
                }
            }
        }
    }
    Value::Object(props)
}

/// Render a JSON value as cell text.
pub fn render(v: &Value) -> Cow<'_, str> {
    match v {
        Value::Null => Cow::Borrowed(""),
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Bool(b) => Cow::Owned(b.to_string()),
        Value::Number(n) => Cow::Owned(n.to_string()),
        other => Cow::Owned(other.to_string()),
    }
}

impl RawRecord for Value {
    fn lookup(&self, loc: &Locator) -> Cow<'_, str> {
        let found = match loc {
            Locator::Field(key) if key.starts_with('/') => self.pointer(key),
            Locator::Field(key) => self.get(key.as_str()),
            Locator::Literal(v) => return Cow::Owned(v.clone()),
            Locator::Path(p) => self.get(p.segments.join("/").as_str()),
        };
        found.map(render).unwrap_or(Cow::Borrowed(""))
    }
}
