//! CLI command definitions and handlers

use clap::Subcommand;
use std::path::{Path, PathBuf};
use tracing::{info, info_span, Instrument};

use crate::core::config::Settings;
use crate::core::models::{ensure_cobol_file, is_cobol_file, ConversionResult, TargetLanguage, TranslationRequest};
use crate::core::pipeline::CodeConverter;
use crate::server::request_id::RequestId;

/// Commands for the code converter
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP API server
    Serve {
        /// Bind address (overrides configuration)
        #[arg(long)]
        host: Option<String>,

        /// Listen port (overrides configuration)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Convert COBOL files from the command line
    Convert {
        /// Input file or directory (required)
        #[arg(short, long)]
        file: PathBuf,

        /// Target language: java or python
        #[arg(short, long)]
        target: TargetLanguage,

        /// Output directory (default: <input dir>/converted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Recursively convert subdirectories
        #[arg(short, long)]
        recursive: bool,
    },
}

/// Where one converted file ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Code written to the target-language file
    Converted(PathBuf),
    /// Raw completion written for manual review
    Degraded(PathBuf),
}

/// Collect COBOL sources under `dir`
pub fn find_cobol_files(dir: &Path, recursive: bool) -> anyhow::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        anyhow::bail!("{} is not a directory", dir.display());
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    for entry in walkdir::WalkDir::new(dir).max_depth(max_depth) {
        let entry = entry?;
        let path = entry.path();
        if path.is_file()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_cobol_file)
        {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

/// Default output location for an input file or directory
fn default_output(input: &Path) -> PathBuf {
    let base = if input.is_dir() {
        input
    } else {
        input.parent().unwrap_or_else(|| Path::new("."))
    };
    base.join("converted")
}

/// Directory under `output` mirroring where `file` sits below `root`
pub fn output_dir_for(root: &Path, file: &Path, output: &Path) -> PathBuf {
    match file.parent().and_then(|parent| parent.strip_prefix(root).ok()) {
        Some(relative) => output.join(relative),
        None => output.to_path_buf(),
    }
}

/// Convert one file and write the result into `output`, creating it if needed
pub async fn convert_file(
    converter: &CodeConverter,
    path: &Path,
    target: TargetLanguage,
    output: &Path,
) -> anyhow::Result<FileOutcome> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("{} has no usable file name", path.display()))?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);

    let contents = tokio::fs::read(path).await?;
    let request = TranslationRequest::from_upload(filename, contents, target)?;
    let result = converter.convert(&request).await?;
    tokio::fs::create_dir_all(output).await?;

    match result {
        ConversionResult::Converted { code } => {
            let dest = output.join(format!("{}.{}", stem, target.file_extension()));
            tokio::fs::write(&dest, code).await?;
            Ok(FileOutcome::Converted(dest))
        }
        ConversionResult::Degraded { raw_response, .. } => {
            let dest = output.join(format!("{stem}.raw.txt"));
            tokio::fs::write(&dest, raw_response).await?;
            Ok(FileOutcome::Degraded(dest))
        }
    }
}

/// Handle convert command
pub async fn handle_convert(
    settings: Settings,
    file: PathBuf,
    target: TargetLanguage,
    output: Option<PathBuf>,
    recursive: bool,
) -> anyhow::Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};
    use std::time::Instant;

    let start_time = Instant::now();
    let output = output.unwrap_or_else(|| default_output(&file));

    info!("Starting COBOL conversion");
    info!("Input: {}", file.display());
    info!("Output: {}", output.display());
    info!("Target language: {}", target);

    let converter = CodeConverter::from_settings(&settings)?;

    let (root, files) = if file.is_dir() {
        (file.clone(), find_cobol_files(&file, recursive)?)
    } else {
        let name = file.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        ensure_cobol_file(name)?;
        let root = file.parent().map(Path::to_path_buf).unwrap_or_default();
        (root, vec![file])
    };

    if files.is_empty() {
        anyhow::bail!("No COBOL files found");
    }

    tokio::fs::create_dir_all(&output).await?;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("=>-"),
    );

    let mut converted = 0;
    let mut degraded = 0;
    let mut failed = 0;

    for file_path in files {
        pb.set_message(format!("Converting: {}", file_path.display()));

        let span = info_span!(
            "convert",
            request_id = %RequestId::generate(),
            file = %file_path.display()
        );

        let dest_dir = output_dir_for(&root, &file_path, &output);
        match convert_file(&converter, &file_path, target, &dest_dir)
            .instrument(span)
            .await
        {
            Ok(FileOutcome::Converted(_)) => converted += 1,
            Ok(FileOutcome::Degraded(dest)) => {
                degraded += 1;
                pb.println(format!(
                    "⚠️  {}: model reply was not parseable, raw text saved to {}",
                    file_path.display(),
                    dest.display()
                ));
            }
            Err(e) => {
                failed += 1;
                pb.println(format!("❌ {}: {}", file_path.display(), e));
            }
        }
        pb.inc(1);
    }

    pb.finish_with_message("Completed");

    let duration = start_time.elapsed();
    info!(
        "Completed: {} converted, {} degraded, {} failed in {:?}",
        converted, degraded, failed, duration
    );

    println!("\n✅ Conversion completed!");
    println!("   Converted: {}", converted);
    println!("   Unparsed: {}", degraded);
    println!("   Failed: {}", failed);
    println!("   Time: {:?}", duration);

    Ok(())
}

/// Handle serve command
pub async fn handle_serve(mut settings: Settings, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    use crate::server::api::run_server;

    if let Some(host) = host {
        settings.host = host;
    }
    if let Some(port) = port {
        settings.port = port;
    }

    info!("Starting HTTP server on {}:{}", settings.host, settings.port);
    println!("🚀 Server starting on http://{}:{}{}", settings.host, settings.port, settings.base_path);

    run_server(settings).await
}
