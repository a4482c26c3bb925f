// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// VibeParser command line.
//
// Entry point. Initialises logging, parses the command, and maps failures to
// plain-language messages and an exit code.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vibeparser_core::human_errors::{Severity, humanize_error};
use vibeparser_core::{ExtractionOptions, ExtractionStatus, OcrEngineKind, Result, VibeError};
use vibeparser_document::Document;
use vibeparser_pipeline::{extract_and_process, identify_type, render};

#[derive(Parser)]
#[command(name = "vibeparser")]
#[command(about = "Classify documents as native or scanned and extract their text")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a document as NATIVE or SCANNED and show the signals used
    Identify {
        /// Document to classify
        file: PathBuf,
        /// Print the verdict as JSON
        #[arg(long)]
        json: bool,
    },

    /// Extract, clean and structure the text of a document
    Extract(ExtractArgs),
}

#[derive(Args)]
struct ExtractArgs {
    /// Document to extract
    file: PathBuf,
    /// Read the embedded text layer only, never OCR
    #[arg(long, conflicts_with = "force_ocr")]
    no_ocr: bool,
    /// OCR every page even when the document has a text layer
    #[arg(long)]
    force_ocr: bool,
    /// Lower DPI, no preprocessing, no tables, no confidence scores
    #[arg(long)]
    fast: bool,
    /// Process at most this many leading pages
    #[arg(long)]
    max_pages: Option<usize>,
    /// Rasterization resolution for OCR
    #[arg(long)]
    dpi: Option<u32>,
    /// OCR language (ISO 639-1, e.g. `en`, or tesseract codes like `deu+eng`)
    #[arg(long)]
    lang: Option<String>,
    /// OCR engine: auto, tesseract or ocrs
    #[arg(long)]
    engine: Option<OcrEngineKind>,
    /// Wall-clock bound in seconds (0 disables it)
    #[arg(long)]
    timeout: Option<u64>,
    /// OCR worker threads (0 = automatic)
    #[arg(long)]
    workers: Option<usize>,
    /// JSON file with extraction options; flags override it
    #[arg(long, env = "VIBEPARSER_CONFIG")]
    config: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
    format: OutputFormat,
    /// Write the output here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Markdown,
    Json,
}

impl ExtractArgs {
    /// Config file values with the command-line flags applied on top.
    fn options(&self) -> ExtractionOptions {
        let mut options = ExtractionOptions::load_or_default(self.config.as_deref());
        if self.fast {
            options.fast_mode = true;
        }
        if self.no_ocr {
            options.do_ocr = Some(false);
        } else if self.force_ocr {
            options.do_ocr = Some(true);
        }
        if let Some(max_pages) = self.max_pages {
            options.max_pages = Some(max_pages);
        }
        if let Some(dpi) = self.dpi {
            options.dpi = dpi;
        }
        if let Some(lang) = &self.lang {
            options.language = lang.clone();
        }
        if let Some(engine) = self.engine {
            options.engine = engine;
        }
        if let Some(timeout) = self.timeout {
            options.timeout_seconds = (timeout > 0).then_some(timeout);
        }
        if let Some(workers) = self.workers {
            options.workers = workers;
        }
        options
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match &cli.command {
        Commands::Identify { file, json } => identify(file, *json),
        Commands::Extract(args) => extract(args),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

fn identify(file: &Path, json: bool) -> Result<()> {
    let document = Document::open(file)?;
    let verdict = identify_type(&document)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
        return Ok(());
    }
    println!("{}  {}", verdict.document_type, file.display());
    println!("{:<24}{:.3}", "confidence", verdict.confidence);
    for (name, value) in &verdict.signals {
        println!("{name:<24}{value:.3}");
    }
    Ok(())
}

fn extract(args: &ExtractArgs) -> Result<()> {
    let options = args.options();
    let document = Document::open(&args.file)?;
    let structured = extract_and_process(&document, &options)?;

    match &structured.raw.status {
        ExtractionStatus::Complete => {}
        ExtractionStatus::Partial { failed_pages } => {
            warn!(?failed_pages, "Some pages could not be extracted");
        }
        ExtractionStatus::TimedOut {
            completed_pages,
            failed_pages,
        } => {
            warn!(
                completed_pages,
                ?failed_pages,
                "Timed out; output covers the pages that finished"
            );
        }
    }

    let mut rendered = match args.format {
        OutputFormat::Markdown => render::to_markdown(&structured),
        OutputFormat::Json => render::to_json(&structured)?,
    };
    if !rendered.ends_with('\n') {
        rendered.push('\n');
    }

    match &args.output {
        Some(path) => {
            std::fs::write(path, rendered)?;
            info!(output = %path.display(), "Output written");
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

fn report(err: &VibeError) -> ExitCode {
    error!(error = %err, "Command failed");
    let human = humanize_error(err);
    eprintln!("error: {}", human.message);
    eprintln!("  {}", human.suggestion);
    if human.retriable {
        eprintln!("  Running the command again may help.");
    }
    // sysexits: EX_TEMPFAIL, EX_CONFIG, EX_DATAERR
    let code = match human.severity {
        Severity::Transient => 75,
        Severity::ActionRequired => 78,
        Severity::Permanent => 65,
    };
    ExitCode::from(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Parse extract arguments. A config path picked up from the
    /// environment is discarded so the ambient shell cannot leak in; one
    /// given with `--config` is kept.
    fn parse(args: &[&str]) -> ExtractArgs {
        let cli = Cli::try_parse_from(args).unwrap();
        let mut extract = match cli.command {
            Commands::Extract(extract) => extract,
            Commands::Identify { .. } => panic!("expected extract"),
        };
        if !args.contains(&"--config") {
            extract.config = None;
        }
        extract
    }

    #[test]
    fn flags_override_defaults() {
        let args = parse(&[
            "vibeparser", "extract", "scan.pdf", "--force-ocr", "--max-pages", "3", "--dpi",
            "300", "--lang", "de", "--engine", "tesseract", "--timeout", "0",
        ]);
        let options = args.options();
        assert_eq!(options.do_ocr, Some(true));
        assert_eq!(options.max_pages, Some(3));
        assert_eq!(options.dpi, 300);
        assert_eq!(options.language, "de");
        assert_eq!(options.engine, OcrEngineKind::Tesseract);
        assert_eq!(options.timeout_seconds, None);
    }

    #[test]
    fn no_flags_keep_defaults() {
        let options = parse(&["vibeparser", "extract", "doc.docx"]).options();
        assert_eq!(options, ExtractionOptions::default());
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, r#"{"dpi": 150, "language": "fr", "fast_mode": true}"#).unwrap();
        let config = path.to_str().unwrap();

        let options = parse(&["vibeparser", "extract", "a.pdf", "--config", config, "--dpi", "400"])
            .options();
        assert_eq!(options.dpi, 400);
        assert_eq!(options.language, "fr");
        assert!(options.fast_mode);
    }

    #[test]
    fn ocr_overrides_conflict() {
        let result =
            Cli::try_parse_from(["vibeparser", "extract", "a.pdf", "--no-ocr", "--force-ocr"]);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_engines_are_rejected() {
        let result = Cli::try_parse_from(["vibeparser", "extract", "a.pdf", "--engine", "magic"]);
        assert!(result.is_err());
    }
}
