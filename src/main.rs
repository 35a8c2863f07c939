use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tabkit::{
    discover_source_files, init_tracing_once, DatasetDescriptor, EncodingErrors, Pipeline, Settings,
    TabulateOptions, TextEncoding,
};

/// Tabulate CSV/XML/JSON/GeoJSON datasets into a standardized CSV layout, skipping
/// datasets whose input, source file and output are unchanged since the last run.
#[derive(Parser, Debug)]
#[command(name = "tabkit", version)]
struct Cli {
    /// Source files, or directories searched for `*.json` source files
    /// (default: `<root>/sources`)
    sources: Vec<PathBuf>,

    /// Settings file (TOML, `[general]` table)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of worker threads
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    threads: Option<u64>,

    /// Reprocess every dataset regardless of the cache
    #[arg(long)]
    ignore_cache: bool,

    /// Empty the processing cache and exit
    #[arg(long)]
    clear_cache: bool,

    /// Root directory holding `data/` and `.cache/`
    #[arg(long)]
    root: Option<PathBuf>,

    /// Prepend a zero-based `idx` column (`--add-index=false` overrides the settings file)
    #[arg(long, value_name = "BOOL", num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    add_index: Option<bool>,

    /// Collapse whitespace runs and trim every value
    #[arg(long = "clean-ws", value_name = "BOOL", num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    clean_ws: Option<bool>,

    #[arg(long, value_name = "BOOL", num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    lowercase: Option<bool>,

    #[arg(long, value_name = "BOOL", num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    titlecase: Option<bool>,

    #[arg(long, value_name = "BOOL", num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    uppercase: Option<bool>,

    /// Output encoding: utf-8 or cp1252
    #[arg(long = "target-enc")]
    target_enc: Option<String>,

    /// Unencodable output characters: strict, replace or ignore
    #[arg(long = "output-enc-errors")]
    output_enc_errors: Option<String>,

    #[arg(long)]
    no_progress: bool,

    /// Debug logging (unless RUST_LOG is set)
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn options(&self) -> Result<TabulateOptions> {
        let mut opts = TabulateOptions::default();
        if let Some(path) = &self.config {
            opts = opts.apply_settings(&Settings::load(path)?)?;
        }
        if let Some(root) = &self.root {
            opts = opts.with_root_dir(root);
        }
        if let Some(n) = self.threads {
            opts = opts.with_workers(usize::try_from(n)?);
        }
        if let Some(name) = &self.target_enc {
            let enc = TextEncoding::from_name(name)
                .ok_or_else(|| anyhow!("'{name}' is not a supported output encoding"))?;
            opts = opts.with_target_encoding(enc);
        }
        if let Some(policy) = &self.output_enc_errors {
            opts = opts.with_output_encoding_errors(policy.parse::<EncodingErrors>()?);
        }
        // given flags win over the settings file in both directions
        if let Some(v) = self.add_index { opts = opts.with_index(v); }
        if let Some(v) = self.clean_ws { opts = opts.with_clean_whitespace(v); }
        if let Some(v) = self.lowercase { opts = opts.with_lowercase(v); }
        if let Some(v) = self.titlecase { opts = opts.with_titlecase(v); }
        if let Some(v) = self.uppercase { opts = opts.with_uppercase(v); }
        Ok(opts
            .with_ignore_cache(self.ignore_cache)
            .with_progress(!self.no_progress)
            .with_interrupt_handling(true))
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.verbose && std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "debug");
    }
    init_tracing_once();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    let opts = cli.options()?;
    let pipeline = Pipeline::from_options(opts.clone());

    if cli.clear_cache {
        pipeline.clear_cache()?;
        return Ok(0);
    }

    let roots = if cli.sources.is_empty() {
        vec![opts.root_dir.join("sources")]
    } else {
        cli.sources.clone()
    };
    let files = discover_source_files(&roots);
    if files.is_empty() {
        tracing::warn!("no source files found");
        return Ok(0);
    }

    let mut bad_sources = 0usize;
    let mut datasets = Vec::with_capacity(files.len());
    for f in &files {
        match DatasetDescriptor::from_source_file(f, &opts) {
            Ok(d) => datasets.push(d),
            Err(e) => {
                tracing::error!("{e:#}");
                bad_sources += 1;
            }
        }
    }

    let report = pipeline.run(datasets);
    for (id, detail) in report.errored() {
        eprintln!("error: {id}: {detail}");
    }
    for id in report.interrupted() {
        eprintln!("interrupted: {id}");
    }

    let code = if bad_sources > 0 { 1 } else { report.process_exit_code() };
    Ok(u8::try_from(code).unwrap_or(1))
}
