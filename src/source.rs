//! Dataset descriptors and the JSON source files they are loaded from.

use crate::config::TabulateOptions;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Broad family of an input format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatKind {
    Delimited,
    Tree,
    Object,
}

/// How structured-object inputs are laid out on disk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonLayout {
    /// One top-level array of objects.
    #[default]
    Records,
    /// One object per line.
    Lines,
}

/// Format kind plus the parameters its reader needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormatSpec {
    Delimited { delimiter: u8, quote: u8 },
    Tree { record_element: String },
    Object { layout: JsonLayout },
    /// GeoJSON FeatureCollection; `crs` is recorded, coordinates are not reprojected.
    Features { crs: Option<String> },
}

impl FormatSpec {
    pub fn csv() -> Self {
        Self::Delimited { delimiter: b',', quote: b'"' }
    }
    pub fn xml(record_element: impl Into<String>) -> Self {
        Self::Tree { record_element: record_element.into() }
    }
    pub fn json(layout: JsonLayout) -> Self {
        Self::Object { layout }
    }
    pub fn geojson(crs: Option<&str>) -> Self {
        Self::Features { crs: crs.map(str::to_string) }
    }
    pub fn kind(&self) -> FormatKind {
        match self {
            Self::Delimited { .. } => FormatKind::Delimited,
            Self::Tree { .. } => FormatKind::Tree,
            Self::Object { .. } | Self::Features { .. } => FormatKind::Object,
        }
    }
}

/// A schema leaf: one locator spec, or an ordered list of them to concatenate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemaValue {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for SchemaValue {
    fn from(s: &str) -> Self {
        Self::One(s.to_string())
    }
}

impl<const N: usize> From<[&str; N]> for SchemaValue {
    fn from(items: [&str; N]) -> Self {
        Self::Many(items.iter().map(|s| s.to_string()).collect())
    }
}

/// Per-value normalization switches. Case transforms are applied by priority
/// lowercase > titlecase > uppercase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NormalizeFlags {
    pub collapse_whitespace: bool,
    pub lowercase: bool,
    pub titlecase: bool,
    pub uppercase: bool,
}

impl NormalizeFlags {
    pub fn from_options(opts: &TabulateOptions) -> Self {
        Self {
            collapse_whitespace: opts.clean_whitespace,
            lowercase: opts.lowercase,
            titlecase: opts.titlecase,
            uppercase: opts.uppercase,
        }
    }
}

/// Everything needed to process one dataset.
#[derive(Clone, Debug)]
pub struct DatasetDescriptor {
    pub id: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Source file this descriptor was loaded from, fingerprinted alongside the input.
    pub source_path: Option<PathBuf>,
    pub format: FormatSpec,
    pub encoding: Option<String>,
    /// Output column -> locator spec, in output order.
    pub schema: Vec<(String, SchemaValue)>,
    /// Field -> regex; a row is kept iff every pattern matches.
    pub filter: Vec<(String, String)>,
    pub provider: Option<String>,
    pub normalize: NormalizeFlags,
    pub add_index: bool,
}

impl DatasetDescriptor {
    pub fn new(
        id: impl Into<String>,
        format: FormatSpec,
        input_path: impl AsRef<Path>,
        output_path: impl AsRef<Path>,
    ) -> Self {
        Self {
            id: id.into(),
            input_path: input_path.as_ref().to_path_buf(),
            output_path: output_path.as_ref().to_path_buf(),
            source_path: None,
            format,
            encoding: None,
            schema: Vec::new(),
            filter: Vec::new(),
            provider: None,
            normalize: NormalizeFlags::default(),
            add_index: false,
        }
    }

    pub fn column(mut self, name: impl Into<String>, value: impl Into<SchemaValue>) -> Self {
        self.schema.push((name.into(), value.into()));
        self
    }
    pub fn filter(mut self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.filter.push((field.into(), pattern.into()));
        self
    }
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }
    pub fn encoding(mut self, name: impl Into<String>) -> Self {
        self.encoding = Some(name.into());
        self
    }
    pub fn normalize(mut self, flags: NormalizeFlags) -> Self {
        self.normalize = flags;
        self
    }
    pub fn index(mut self, yes: bool) -> Self {
        self.add_index = yes;
        self
    }
    pub fn source_path(mut self, path: impl AsRef<Path>) -> Self {
        self.source_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load a JSON source file and resolve its paths against `opts.root_dir`.
    pub fn from_source_file(path: &Path, opts: &TabulateOptions) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("read source file {}", path.display()))?;
        let raw: SourceFile = serde_json::from_str(&text)
            .with_context(|| format!("parse source file {}", path.display()))?;
        raw.into_descriptor(path, opts)
            .with_context(|| format!("source file {}", path.display()))
    }
}

// ----------------------------- Source file JSON ----------------------------------

#[derive(Debug, Deserialize)]
struct SourceFile {
    localfile: String,
    format: RawFormat,
    encoding: Option<String>,
    schema: Map<String, Value>,
    #[serde(default)]
    filter: Map<String, Value>,
    provider: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RawFormat {
    Csv {
        #[serde(default = "default_delimiter")]
        delimiter: String,
        #[serde(default = "default_quote")]
        quote: String,
    },
    Xml {
        header: String,
    },
    Json {
        #[serde(default)]
        layout: JsonLayout,
    },
    Geojson {
        crs: Option<String>,
    },
}

fn default_delimiter() -> String { ",".to_string() }
fn default_quote() -> String { "\"".to_string() }

fn single_byte(what: &str, s: &str) -> Result<u8> {
    match s.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(anyhow!("'format.{what}' must be a single ASCII character, got {s:?}")),
    }
}

impl SourceFile {
    fn into_descriptor(self, src_path: &Path, opts: &TabulateOptions) -> Result<DatasetDescriptor> {
        let format = match self.format {
            RawFormat::Csv { delimiter, quote } => FormatSpec::Delimited {
                delimiter: single_byte("delimiter", &delimiter)?,
                quote: single_byte("quote", &quote)?,
            },
            RawFormat::Xml { header } => FormatSpec::Tree { record_element: header },
            RawFormat::Json { layout } => FormatSpec::Object { layout },
            RawFormat::Geojson { crs } => FormatSpec::Features { crs },
        };

        let mut schema = Vec::new();
        flatten_schema(&self.schema, &mut schema)?;

        let mut filter = Vec::with_capacity(self.filter.len());
        for (field, pattern) in self.filter {
            match pattern {
                Value::String(p) => filter.push((field, p)),
                _ => return Err(anyhow!("filter '{field}' must be a string (regex)")),
            }
        }

        let stem = Path::new(&self.localfile)
            .file_stem()
            .ok_or_else(|| anyhow!("'localfile' has no file name: {:?}", self.localfile))?;
        let mut out_name = stem.to_os_string();
        out_name.push(".csv");

        Ok(DatasetDescriptor {
            id: self.localfile.clone(),
            input_path: opts.input_dir().join(&self.localfile),
            output_path: opts.output_dir().join(out_name),
            source_path: Some(src_path.to_path_buf()),
            format,
            encoding: self.encoding,
            schema,
            filter,
            provider: self.provider,
            normalize: NormalizeFlags::from_options(opts),
            add_index: opts.add_index,
        })
    }
}

/// Schema groups (nested objects) are flattened into their member columns, in order.
fn flatten_schema(map: &Map<String, Value>, out: &mut Vec<(String, SchemaValue)>) -> Result<()> {
    for (key, node) in map {
        match node {
            Value::String(s) => out.push((key.clone(), SchemaValue::One(s.clone()))),
            Value::Array(items) => {
                let parts = items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| anyhow!("schema '{key}' must be a list of strings"))?;
                out.push((key.clone(), SchemaValue::Many(parts)));
            }
            Value::Object(group) => flatten_schema(group, out)?,
            _ => return Err(anyhow!("schema '{key}' must be a string, list of strings, or object")),
        }
    }
    Ok(())
}
