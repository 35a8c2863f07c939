use crate::encoding::{EncodingErrors, TextEncoding};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct TabulateOptions {
    pub root_dir: PathBuf,
    pub workers: usize,               // worker threads in the pool, >= 1
    pub ignore_cache: bool,           // reprocess everything, still record digests
    pub progress: bool,               // show progress bar
    pub progress_label: Option<String>,
    pub handle_interrupts: bool,      // install a SIGINT hook for the duration of a run

    // row formatting
    pub add_index: bool,
    pub clean_whitespace: bool,
    pub lowercase: bool,
    pub titlecase: bool,
    pub uppercase: bool,

    // output encoding
    pub target_encoding: TextEncoding,
    pub output_encoding_errors: EncodingErrors,

    // IO tuning
    pub read_buffer_bytes: usize,
    pub write_buffer_bytes: usize,
}

impl Default for TabulateOptions {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            workers: 1,
            ignore_cache: false,
            progress: true,
            progress_label: None,
            handle_interrupts: true,

            add_index: false,
            clean_whitespace: false,
            lowercase: false,
            titlecase: false,
            uppercase: false,

            target_encoding: TextEncoding::Utf8,
            output_encoding_errors: EncodingErrors::Strict,

            read_buffer_bytes: 64 * 1024,
            write_buffer_bytes: 256 * 1024,
        }
    }
}

impl TabulateOptions {
    pub fn with_root_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.root_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_workers(mut self, n: usize) -> Self {
        self.workers = n.max(1);
        self
    }
    pub fn with_ignore_cache(mut self, yes: bool) -> Self {
        self.ignore_cache = yes;
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_progress_label(mut self, label: impl Into<String>) -> Self {
        self.progress_label = Some(label.into());
        self
    }
    pub fn with_interrupt_handling(mut self, yes: bool) -> Self {
        self.handle_interrupts = yes;
        self
    }
    pub fn with_index(mut self, yes: bool) -> Self {
        self.add_index = yes;
        self
    }
    pub fn with_clean_whitespace(mut self, yes: bool) -> Self {
        self.clean_whitespace = yes;
        self
    }
    pub fn with_lowercase(mut self, yes: bool) -> Self {
        self.lowercase = yes;
        self
    }
    pub fn with_titlecase(mut self, yes: bool) -> Self {
        self.titlecase = yes;
        self
    }
    pub fn with_uppercase(mut self, yes: bool) -> Self {
        self.uppercase = yes;
        self
    }
    pub fn with_target_encoding(mut self, enc: TextEncoding) -> Self {
        self.target_encoding = enc;
        self
    }
    pub fn with_output_encoding_errors(mut self, policy: EncodingErrors) -> Self {
        self.output_encoding_errors = policy;
        self
    }
    pub fn with_io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self {
        self.read_buffer_bytes = read_bytes.max(8 * 1024);
        self.write_buffer_bytes = write_bytes.max(8 * 1024);
        self
    }

    // Default layout under the root directory.
    pub fn input_dir(&self) -> PathBuf {
        self.root_dir.join("data").join("input")
    }
    pub fn output_dir(&self) -> PathBuf {
        self.root_dir.join("data").join("output")
    }
    pub fn data_cache_path(&self) -> PathBuf {
        self.root_dir.join(".cache").join("data.cache")
    }
    pub fn source_cache_path(&self) -> PathBuf {
        self.root_dir.join(".cache").join("source.cache")
    }

    /// Overlay the `[general]` table of a settings file onto these options.
    pub fn apply_settings(mut self, settings: &Settings) -> Result<Self> {
        let g = &settings.general;
        if let Some(root) = &g.root_directory {
            self.root_dir = root.clone();
        }
        if let Some(n) = g.threads {
            if n == 0 {
                return Err(anyhow!("'threads' must be a positive integer"));
            }
            self.workers = n;
        }
        if let Some(v) = g.add_index { self.add_index = v; }
        if let Some(v) = g.clean_whitespace { self.clean_whitespace = v; }
        if let Some(v) = g.lowercase_output { self.lowercase = v; }
        if let Some(v) = g.titlecase_output { self.titlecase = v; }
        if let Some(v) = g.uppercase_output { self.uppercase = v; }
        if let Some(name) = &g.target_encoding {
            self.target_encoding = TextEncoding::from_name(name)
                .ok_or_else(|| anyhow!("'{name}' is not a supported output encoding"))?;
        }
        if let Some(name) = &g.output_encoding_errors {
            self.output_encoding_errors = name.parse()?;
        }
        Ok(self)
    }
}

/// Settings file contents (TOML).
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub general: GeneralSettings,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralSettings {
    pub root_directory: Option<PathBuf>,
    pub threads: Option<usize>,
    pub add_index: Option<bool>,
    pub target_encoding: Option<String>,
    pub output_encoding_errors: Option<String>,
    pub clean_whitespace: Option<bool>,
    pub lowercase_output: Option<bool>,
    pub titlecase_output: Option<bool>,
    pub uppercase_output: Option<bool>,
}

impl Settings {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read settings {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("parse settings {}", path.display()))
    }
}
