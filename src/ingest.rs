//! Ingestion pipeline orchestration.
//!
//! Coordinates one run over a resolved list of files:
//! modality dispatch → chunking → single-item embedding → batched storage.
//!
//! The run is sequential so batch and progress accounting stay
//! deterministic. Failures are isolated per item: an unsupported or broken
//! file, a chunk that fails to embed, or a batch the store rejects is
//! recorded in the [`IngestReport`] and the run moves on. `Ok(report)`
//! therefore means the run *finished*, not that everything was stored; use
//! [`IngestReport::is_complete`] for the latter.
//!
//! Re-ingesting a file stores its chunks again under fresh ids. There is
//! no dedup on `chunk_id`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use mmrag_core::embedding::{embed_single, Embedder};
use mmrag_core::models::{Chunk, Modality, PerModality};
use mmrag_core::store::Collection;
use serde::Serialize;
use tokio::task::JoinError;

use crate::chunker::Chunker;
use crate::progress::{self, ProgressSink, ProgressTracker};

/// What happened to one input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    /// The chunker produced at least one chunk.
    Chunked { chunks: usize },
    /// Extension not mapped to any modality.
    Unsupported,
    /// The chunker succeeded but produced nothing (e.g. an empty file).
    Empty,
    /// The chunker failed; the file was skipped.
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub modality: Option<Modality>,
    pub outcome: FileOutcome,
}

/// A chunk dropped because it could not be embedded.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkFailure {
    pub chunk_id: String,
    pub modality: Modality,
    pub error: String,
}

/// A batch the store refused. Its chunks are not stored.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub modality: Modality,
    pub size: usize,
    pub error: String,
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub files: Vec<FileReport>,
    pub chunks_generated: usize,
    pub stored: PerModality<usize>,
    pub chunk_failures: Vec<ChunkFailure>,
    pub batch_failures: Vec<BatchFailure>,
    pub cancelled: bool,
}

impl IngestReport {
    /// Files that yielded at least one chunk.
    pub fn files_processed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Chunked { .. }))
            .count()
    }

    /// Files that yielded nothing, for whatever reason.
    pub fn files_skipped(&self) -> usize {
        self.files.len() - self.files_processed()
    }

    pub fn files_failed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Failed { .. }))
            .count()
    }

    pub fn total_stored(&self) -> usize {
        self.stored.iter().map(|(_, n)| *n).sum()
    }

    /// True iff nothing was lost: no file failed to chunk, no chunk failed
    /// to embed, no batch was rejected, and the run was not cancelled.
    /// Unsupported and empty files do not count as losses.
    pub fn is_complete(&self) -> bool {
        !self.cancelled
            && self.files_failed() == 0
            && self.chunk_failures.is_empty()
            && self.batch_failures.is_empty()
    }
}

#[derive(Default)]
struct PendingBatch {
    vectors: Vec<Vec<f32>>,
    payloads: Vec<Chunk>,
}

impl PendingBatch {
    fn len(&self) -> usize {
        self.payloads.len()
    }

    fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}

pub struct IngestionPipeline {
    chunkers: PerModality<Arc<dyn Chunker>>,
    embedders: PerModality<Arc<dyn Embedder>>,
    collections: PerModality<Collection>,
    batch_size: usize,
    cancel: Option<Arc<AtomicBool>>,
}

impl IngestionPipeline {
    /// `batch_size` is the number of vectors sent to the store per
    /// `add_vectors` call; 0 is treated as 1.
    pub fn new(
        chunkers: PerModality<Arc<dyn Chunker>>,
        embedders: PerModality<Arc<dyn Embedder>>,
        collections: PerModality<Collection>,
        batch_size: usize,
    ) -> Self {
        Self {
            chunkers,
            embedders,
            collections,
            batch_size: batch_size.max(1),
            cancel: None,
        }
    }

    /// Stop at the next file or chunk boundary once `flag` is set.
    /// Already-embedded chunks are still flushed.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Ingest `paths` in order.
    ///
    /// Per-item failures, a panicking chunker included, are recorded in the
    /// report and never abort the run.
    pub async fn ingest(
        &self,
        paths: &[PathBuf],
        sink: Option<&dyn ProgressSink>,
    ) -> Result<IngestReport> {
        let mut tracker = ProgressTracker::new(sink);
        let mut report = IngestReport::default();

        tracker.report(progress::CHUNKING_START, "Starting ingestion");
        tracing::info!(files = paths.len(), "ingestion started");

        let chunks = self.chunk_files(paths, &mut tracker, &mut report).await;
        report.chunks_generated = chunks.len();

        if chunks.is_empty() {
            tracing::info!(files = paths.len(), "no chunks to process");
            tracker.report(1.0, "No chunks to process");
            return Ok(report);
        }

        let mut pending: PerModality<PendingBatch> = PerModality::default();
        let total = chunks.len();

        for (i, chunk) in chunks.into_iter().enumerate() {
            if self.is_cancelled() {
                report.cancelled = true;
                tracing::warn!(processed = i, total, "ingestion cancelled");
                break;
            }
            tracker.report_step(
                progress::EMBEDDING_START,
                progress::EMBEDDING_END,
                i,
                total,
                &format!("Embedding chunk {}/{}", i + 1, total),
            );

            let modality = chunk.modality();
            match self.embed_chunk(&chunk).await {
                Ok(vector) => {
                    let batch = pending.get_mut(modality);
                    batch.vectors.push(vector);
                    batch.payloads.push(chunk);
                    if batch.len() >= self.batch_size {
                        self.flush(modality, batch, &mut report).await;
                    }
                }
                Err(e) => {
                    tracing::error!(
                        chunk_id = chunk.chunk_id(),
                        modality = %modality,
                        error = %format!("{e:#}"),
                        "embedding failed; chunk dropped"
                    );
                    report.chunk_failures.push(ChunkFailure {
                        chunk_id: chunk.chunk_id().to_string(),
                        modality,
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        tracker.report(progress::FLUSH_START, "Flushing remaining batches");
        for (step, modality) in Modality::ALL.into_iter().enumerate() {
            let batch = pending.get_mut(modality);
            if !batch.is_empty() {
                self.flush(modality, batch, &mut report).await;
            }
            tracker.report_step(
                progress::FLUSH_START,
                progress::FLUSH_END,
                step + 1,
                Modality::ALL.len(),
                &format!("Flushed {} batch", modality),
            );
        }

        let summary = format!(
            "Ingestion complete: {} files processed, {} chunks generated",
            report.files_processed(),
            report.chunks_generated
        );
        tracing::info!(
            files_processed = report.files_processed(),
            files_skipped = report.files_skipped(),
            chunks = report.chunks_generated,
            stored = report.total_stored(),
            chunk_failures = report.chunk_failures.len(),
            batch_failures = report.batch_failures.len(),
            cancelled = report.cancelled,
            "ingestion finished"
        );
        tracker.report(1.0, &summary);

        Ok(report)
    }

    async fn chunk_files(
        &self,
        paths: &[PathBuf],
        tracker: &mut ProgressTracker<'_>,
        report: &mut IngestReport,
    ) -> Vec<Chunk> {
        let mut all_chunks = Vec::new();
        let total = paths.len();

        for (i, path) in paths.iter().enumerate() {
            if self.is_cancelled() {
                report.cancelled = true;
                tracing::warn!(processed = i, total, "ingestion cancelled during chunking");
                break;
            }
            tracker.report_step(
                progress::CHUNKING_START,
                progress::CHUNKING_END,
                i,
                total,
                &format!("Chunking {}", display_name(path)),
            );

            let (modality, outcome, chunks) = self.chunk_file(path).await;
            report.files.push(FileReport {
                path: path.clone(),
                modality,
                outcome,
            });
            all_chunks.extend(chunks);
        }

        tracker.report(progress::CHUNKING_END, "Chunking finished");
        all_chunks
    }

    async fn chunk_file(&self, path: &Path) -> (Option<Modality>, FileOutcome, Vec<Chunk>) {
        let Some(modality) = Modality::from_path(path) else {
            tracing::warn!(path = %path.display(), "unsupported file type, skipping");
            return (None, FileOutcome::Unsupported, Vec::new());
        };

        let chunker = Arc::clone(self.chunkers.get(modality));
        let owned = path.to_path_buf();
        let result = match tokio::task::spawn_blocking(move || chunker.process(&owned)).await {
            Ok(result) => result,
            Err(e) => Err(anyhow::anyhow!("chunker panicked: {}", panic_message(e))),
        };

        let (outcome, chunks) = match result {
            Ok(chunks) if chunks.is_empty() => {
                tracing::warn!(path = %path.display(), modality = %modality, "no chunks produced");
                (FileOutcome::Empty, chunks)
            }
            Ok(chunks) => {
                tracing::debug!(
                    path = %path.display(),
                    modality = %modality,
                    chunks = chunks.len(),
                    "file chunked"
                );
                (FileOutcome::Chunked { chunks: chunks.len() }, chunks)
            }
            Err(e) => {
                tracing::error!(
                    path = %path.display(),
                    modality = %modality,
                    error = %format!("{e:#}"),
                    "chunking failed; file skipped"
                );
                (
                    FileOutcome::Failed {
                        error: format!("{e:#}"),
                    },
                    Vec::new(),
                )
            }
        };
        (Some(modality), outcome, chunks)
    }

    /// Embed one chunk and check it fits its collection.
    async fn embed_chunk(&self, chunk: &Chunk) -> Result<Vec<f32>> {
        let modality = chunk.modality();
        let vector = embed_single(self.embedders.get(modality).as_ref(), chunk.content()).await?;
        let expected = self.collections.get(modality).embedding_dim();
        if vector.len() != expected {
            anyhow::bail!(
                "embedding has {} dims but collection '{}' expects {}",
                vector.len(),
                self.collections.get(modality).name(),
                expected
            );
        }
        Ok(vector)
    }

    async fn flush(&self, modality: Modality, batch: &mut PendingBatch, report: &mut IngestReport) {
        let batch = std::mem::take(batch);
        let size = batch.len();
        let collection = self.collections.get(modality);

        match collection.add_vectors(&batch.vectors, &batch.payloads).await {
            Ok(inserted) => {
                *report.stored.get_mut(modality) += inserted;
                tracing::debug!(collection = collection.name(), inserted, "batch stored");
            }
            Err(e) => {
                tracing::error!(
                    collection = collection.name(),
                    size,
                    unavailable = e.is_unavailable(),
                    error = %e,
                    "batch insert failed; batch dropped"
                );
                report.batch_failures.push(BatchFailure {
                    modality,
                    size,
                    error: e.to_string(),
                });
            }
        }
    }
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string()),
        Err(err) => err.to_string(),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(outcome: FileOutcome) -> FileReport {
        FileReport {
            path: PathBuf::from("x"),
            modality: None,
            outcome,
        }
    }

    #[test]
    fn test_report_counts() {
        let report = IngestReport {
            files: vec![
                file(FileOutcome::Chunked { chunks: 3 }),
                file(FileOutcome::Unsupported),
                file(FileOutcome::Empty),
            ],
            chunks_generated: 3,
            stored: PerModality::new(3, 0, 0),
            ..Default::default()
        };
        assert_eq!(report.files_processed(), 1);
        assert_eq!(report.files_skipped(), 2);
        assert_eq!(report.total_stored(), 3);
        assert!(report.is_complete());
    }

    #[test]
    fn test_completion_is_not_completeness() {
        let mut report = IngestReport {
            files: vec![file(FileOutcome::Chunked { chunks: 1 })],
            ..Default::default()
        };
        report.batch_failures.push(BatchFailure {
            modality: Modality::Text,
            size: 1,
            error: "vector store unavailable".into(),
        });
        assert!(!report.is_complete());

        let failed = IngestReport {
            files: vec![file(FileOutcome::Failed {
                error: "decode".into(),
            })],
            ..Default::default()
        };
        assert!(!failed.is_complete());
    }

    #[test]
    fn test_file_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(FileOutcome::Chunked { chunks: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "chunked", "chunks": 2 }));
    }
}
