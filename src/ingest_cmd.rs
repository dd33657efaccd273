//! The `mmrag ingest` command.
//!
//! Resolves the CLI paths into an ordered file list (directories are walked
//! recursively, entries sorted for deterministic runs), then hands the list
//! to the [`IngestionPipeline`](crate::ingest::IngestionPipeline). Path
//! resolution is the dispatch stage and reports progress up to 0.35.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use mmrag_core::models::Modality;
use walkdir::WalkDir;

use crate::config::Config;
use crate::ingest::{FileOutcome, IngestReport};
use crate::progress::{self, ProgressMode, ProgressTracker};
use crate::services::Services;

/// Expand `inputs` into files, in argument order. Directory contents are
/// sorted by path. Every file is kept, supported or not; the pipeline
/// decides what to skip.
pub fn collect_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_file() {
            files.push(input.clone());
        } else if input.is_dir() {
            let mut found = Vec::new();
            for entry in WalkDir::new(input).follow_links(true) {
                let entry = entry?;
                if entry.file_type().is_file() {
                    found.push(entry.into_path());
                }
            }
            found.sort();
            files.extend(found);
        } else {
            bail!("Path does not exist: {}", input.display());
        }
    }
    Ok(files)
}

pub async fn run_ingest(config: &Config, inputs: &[PathBuf], mode: ProgressMode) -> Result<()> {
    let sink = mode.sink();
    let mut tracker = ProgressTracker::new(Some(sink.as_ref()));

    tracker.report(0.0, "Resolving input paths");
    let files = collect_files(inputs)?;
    tracker.report(
        progress::DISPATCH_END,
        &format!("Dispatching {} files", files.len()),
    );

    let services = Services::build(config).await?;

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; stopping after the current item");
            flag.store(true, Ordering::SeqCst);
        }
    });

    let pipeline = services.ingestion_pipeline().with_cancellation(cancel);
    let report = pipeline.ingest(&files, Some(sink.as_ref())).await?;

    print_summary(&report);
    Ok(())
}

fn print_summary(report: &IngestReport) {
    println!("ingest");
    println!("  files processed: {}", report.files_processed());
    println!("  files skipped: {}", report.files_skipped());
    for file in &report.files {
        if !matches!(file.outcome, FileOutcome::Chunked { .. }) {
            println!("    {} ({})", file.path.display(), outcome_label(&file.outcome));
        }
    }
    println!("  chunks generated: {}", report.chunks_generated);
    println!(
        "  vectors stored: {} ({})",
        report.total_stored(),
        Modality::ALL
            .iter()
            .map(|m| format!("{} {}", m, report.stored.get(*m)))
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  embedding failures: {}", report.chunk_failures.len());
    println!("  failed batches: {}", report.batch_failures.len());
    if report.cancelled {
        println!("  cancelled: yes");
    }
    println!("{}", if report.is_complete() { "ok" } else { "incomplete" });
}

fn outcome_label(outcome: &FileOutcome) -> String {
    match outcome {
        FileOutcome::Chunked { chunks } => format!("{} chunks", chunks),
        FileOutcome::Unsupported => "unsupported".to_string(),
        FileOutcome::Empty => "no chunks".to_string(),
        FileOutcome::Failed { error } => format!("failed: {}", error),
    }
}
