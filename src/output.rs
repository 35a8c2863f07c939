//! Output rows: the `RowSink` seam and the CSV file sink.

use crate::encoding::{encode_into, EncodingErrors, TextEncoding};
use crate::error::TabulateResult;
use crate::util::create_with_backoff;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Consumer of standardized rows.
pub trait RowSink {
    fn write_header(&mut self, names: &[&str]) -> TabulateResult<()>;
    fn write_row(&mut self, values: &[&str]) -> TabulateResult<()>;
    fn finish(&mut self) -> TabulateResult<()> {
        Ok(())
    }
}

/// Rows collected in memory.
#[derive(Debug, Default)]
pub struct VecSink {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RowSink for VecSink {
    fn write_header(&mut self, names: &[&str]) -> TabulateResult<()> {
        self.header = names.iter().map(|s| s.to_string()).collect();
        Ok(())
    }
    fn write_row(&mut self, values: &[&str]) -> TabulateResult<()> {
        self.rows.push(values.iter().map(|s| s.to_string()).collect());
        Ok(())
    }
}

/// `,`-delimited, minimally quoted, `\n`-terminated CSV in the target encoding.
pub struct CsvFileSink {
    fmt: csv::WriterBuilder,
    line: Vec<u8>,
    out: BufWriter<File>,
    encoded: Vec<u8>,
    target: TextEncoding,
    policy: EncodingErrors,
}

impl CsvFileSink {
    pub fn create(
        path: &Path,
        target: TextEncoding,
        policy: EncodingErrors,
        buf_bytes: usize,
    ) -> TabulateResult<Self> {
        let f = create_with_backoff(path, 16, 50)?;
        let mut fmt = csv::WriterBuilder::new();
        fmt.delimiter(b',')
            .quote(b'"')
            .quote_style(csv::QuoteStyle::Necessary)
            .terminator(csv::Terminator::Any(b'\n'));
        Ok(Self {
            fmt,
            line: Vec::with_capacity(1024),
            out: BufWriter::with_capacity(buf_bytes.max(8 * 1024), f),
            encoded: Vec::with_capacity(1024),
            target,
            policy,
        })
    }

    fn emit(&mut self, fields: &[&str]) -> TabulateResult<()> {
        self.line.clear();
        {
            let mut w = self.fmt.from_writer(&mut self.line);
            w.write_record(fields)?;
            w.flush()?;
        }
        self.encoded.clear();
        // &str fields in, so the formatted line is UTF-8
        let text = String::from_utf8_lossy(&self.line);
        encode_into(&text, self.target, self.policy, &mut self.encoded)?;
        self.out.write_all(&self.encoded)?;
        Ok(())
    }
}

impl RowSink for CsvFileSink {
    fn write_header(&mut self, names: &[&str]) -> TabulateResult<()> {
        self.emit(names)
    }
    fn write_row(&mut self, values: &[&str]) -> TabulateResult<()> {
        self.emit(values)
    }
    fn finish(&mut self) -> TabulateResult<()> {
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_quoting_and_target_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("out").join("x.csv");
        let mut sink = CsvFileSink::create(&p, TextEncoding::Windows1252, EncodingErrors::Replace, 0).unwrap();
        sink.write_header(&["name", "note"]).unwrap();
        sink.write_row(&["café", "a, b"]).unwrap();
        sink.write_row(&["x→y", "say \"hi\""]).unwrap();
        sink.finish().unwrap();
        let bytes = std::fs::read(&p).unwrap();
        assert_eq!(bytes, b"name,note\ncaf\xe9,\"a, b\"\nx?y,\"say \"\"hi\"\"\"\n".to_vec());
    }
}
