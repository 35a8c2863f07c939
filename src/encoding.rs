//! Character encodings: the supported set, input probing, decoding, and
//! re-encoding of output text.

use crate::cancel::CancellationToken;
use crate::error::{TabulateError, TabulateResult};
use crate::util::open_with_backoff;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use std::fmt;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

/// Encodings a dataset may be declared in (and that probing tries, in this order).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Windows1252,
}

pub const PROBE_ORDER: [TextEncoding; 2] = [TextEncoding::Utf8, TextEncoding::Windows1252];

// Positions left undefined by cp1252.
const CP1252_UNDEFINED: [u8; 5] = [0x81, 0x8D, 0x8F, 0x90, 0x9D];

impl TextEncoding {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Self::Utf8),
            "cp1252" | "windows-1252" => Some(Self::Windows1252),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Windows1252 => "cp1252",
        }
    }

    fn codec(self) -> &'static Encoding {
        match self {
            Self::Utf8 => UTF_8,
            Self::Windows1252 => WINDOWS_1252,
        }
    }

    /// True iff `bytes` decode without a single malformed sequence.
    pub fn decodes_cleanly(self, bytes: &[u8]) -> bool {
        match self {
            Self::Utf8 => UTF_8.decode_without_bom_handling_and_without_replacement(bytes).is_some(),
            Self::Windows1252 => !bytes.iter().any(|b| CP1252_UNDEFINED.contains(b)),
        }
    }

    /// Decode a whole buffer. A leading BOM is kept for the readers to deal with.
    pub fn decode(self, bytes: &[u8]) -> String {
        let (text, _had_errors) = self.codec().decode_without_bom_handling(bytes);
        text.into_owned()
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What to do with characters the output encoding cannot represent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncodingErrors {
    Strict,
    Replace,
    Ignore,
}

impl FromStr for EncodingErrors {
    type Err = TabulateError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "replace" => Ok(Self::Replace),
            "ignore" => Ok(Self::Ignore),
            other => Err(TabulateError::config(format!("'{other}' is not an output encoding error handler"))),
        }
    }
}

/// Pick the encoding for an input file.
///
/// A declared name must be in the supported set. Without one, every candidate in
/// [`PROBE_ORDER`] is tried against the full input and the first that decodes
/// cleanly wins. Probing checks `cancel` once per input line.
pub fn resolve_input_encoding(
    declared: Option<&str>,
    path: &Path,
    read_buf_bytes: usize,
    cancel: &CancellationToken,
) -> TabulateResult<TextEncoding> {
    if let Some(name) = declared {
        return TextEncoding::from_name(name)
            .ok_or_else(|| TabulateError::config(format!("'{name}' is not a supported encoding")));
    }
    for candidate in PROBE_ORDER {
        if probe(candidate, path, read_buf_bytes, cancel)? {
            tracing::debug!(path = %path.display(), encoding = %candidate, "detected encoding");
            return Ok(candidate);
        }
    }
    Err(TabulateError::EncodingDetection { path: path.to_path_buf() })
}

fn probe(
    candidate: TextEncoding,
    path: &Path,
    read_buf_bytes: usize,
    cancel: &CancellationToken,
) -> TabulateResult<bool> {
    let file = open_with_backoff(path, 16, 50)?;
    let mut reader = BufReader::with_capacity(read_buf_bytes.max(8 * 1024), file);
    let mut line = Vec::with_capacity(16 * 1024);
    loop {
        cancel.checkpoint()?;
        line.clear();
        let n = reader.read_until(b'\n', &mut line)?;
        if n == 0 {
            return Ok(true);
        }
        if !candidate.decodes_cleanly(&line) {
            return Ok(false);
        }
    }
}

/// Read and decode an entire input file.
pub fn read_to_string(path: &Path, enc: TextEncoding) -> TabulateResult<String> {
    let bytes = fs::read(path)?;
    Ok(enc.decode(&bytes))
}

/// Encode `text` into `out` for the target encoding under the given policy.
pub fn encode_into(
    text: &str,
    target: TextEncoding,
    policy: EncodingErrors,
    out: &mut Vec<u8>,
) -> TabulateResult<()> {
    if target == TextEncoding::Utf8 || text.is_ascii() {
        out.extend_from_slice(text.as_bytes());
        return Ok(());
    }
    let mut buf = [0u8; 4];
    for ch in text.chars() {
        if ch.is_ascii() {
            out.push(ch as u8);
            continue;
        }
        let (bytes, _, unmappable) = target.codec().encode(ch.encode_utf8(&mut buf));
        if !unmappable {
            out.extend_from_slice(&bytes);
            continue;
        }
        match policy {
            EncodingErrors::Strict => {
                return Err(TabulateError::config(format!(
                    "character {ch:?} cannot be encoded as {target}"
                )))
            }
            EncodingErrors::Replace => out.push(b'?'),
            EncodingErrors::Ignore => {}
        }
    }
    Ok(())
}
