//! End-to-end tests of the ingestion and retrieval pipelines over an
//! in-memory store with deterministic hash embedders.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use mmrag::chunker::{AudioChunker, Chunker};
use mmrag::ingest::{FileOutcome, IngestionPipeline};
use mmrag::progress::ProgressSink;
use mmrag::retrieve::{Query, Retrieval, RetrievalError};
use mmrag_core::models::{Chunk, Modality};
use tempfile::TempDir;

use common::*;

#[derive(Default)]
struct RecordingSink {
    updates: Mutex<Vec<(f32, String)>>,
    fail: bool,
}

impl RecordingSink {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn fractions(&self) -> Vec<f32> {
        self.updates.lock().unwrap().iter().map(|(f, _)| *f).collect()
    }
}

impl ProgressSink for RecordingSink {
    fn report(&self, fraction: f32, description: &str) -> Result<()> {
        self.updates
            .lock()
            .unwrap()
            .push((fraction, description.to_string()));
        if self.fail {
            anyhow::bail!("progress channel closed");
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_text_round_trip() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(TestStore::new());
    let embedders = HashEmbedders::new(DIMS);
    let services = services_with(&tmp, store.clone(), &embedders).await;

    let path = write_file(tmp.path(), "history.txt", text_1200());
    let report = services
        .ingestion_pipeline()
        .ingest(&[path], None)
        .await
        .unwrap();

    assert_eq!(report.chunks_generated, 3);
    assert_eq!(report.stored.text, 3);
    assert!(report.is_complete());
    assert_eq!(services.collections.text.count().await.unwrap(), 3);

    let retrieval = services
        .retriever()
        .try_retrieve(&Query::text("word00003 word00004 word00005"), 1)
        .await
        .unwrap();
    let results = retrieval.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].metadata.source_id, "history.txt");
    assert_eq!(results[0].metadata.chunk_id, "history_chunk_text_0");
    assert!(results[0].content.contains("word00003"));
}

#[tokio::test]
async fn test_unsupported_file_is_skipped() {
    let tmp = TempDir::new().unwrap();
    let embedders = HashEmbedders::new(DIMS);
    let services = services_with(&tmp, Arc::new(TestStore::new()), &embedders).await;

    let files = vec![
        write_file(tmp.path(), "a.txt", "Alpha notes about rivers."),
        write_file(tmp.path(), "manual.pdf", "%PDF-1.4"),
        write_file(tmp.path(), "b.txt", "Beta notes about mountains."),
    ];
    let report = services.ingestion_pipeline().ingest(&files, None).await.unwrap();

    assert_eq!(report.files.len(), 3);
    assert_eq!(report.files[1].outcome, FileOutcome::Unsupported);
    assert_eq!(report.files[1].modality, None);
    assert_eq!(report.files_processed(), 2);
    assert_eq!(report.stored.text, 2);
    assert!(report.is_complete());
}

#[tokio::test]
async fn test_store_failure_completes_but_is_incomplete() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(TestStore::failing_inserts());
    let embedders = HashEmbedders::new(DIMS);
    let services = services_with(&tmp, store.clone(), &embedders).await;

    let path = write_file(tmp.path(), "notes.txt", text_1200());
    let report = services
        .ingestion_pipeline()
        .ingest(&[path], None)
        .await
        .unwrap();

    assert_eq!(report.chunks_generated, 3);
    assert_eq!(report.total_stored(), 0);
    assert_eq!(report.batch_failures.len(), 1);
    assert_eq!(report.batch_failures[0].size, 3);
    assert!(!report.is_complete());
    assert_eq!(services.collections.text.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_embedding_failure_drops_only_that_chunk() {
    let tmp = TempDir::new().unwrap();
    let embedders = HashEmbedders::new(DIMS);
    let services = services_with(&tmp, Arc::new(TestStore::new()), &embedders).await;

    let files = vec![
        write_file(tmp.path(), "good.txt", "A perfectly ordinary paragraph."),
        write_file(tmp.path(), "bad.txt", "This one carries POISON inside."),
        write_file(tmp.path(), "fine.txt", "Another ordinary paragraph."),
    ];
    let report = services.ingestion_pipeline().ingest(&files, None).await.unwrap();

    assert_eq!(report.chunks_generated, 3);
    assert_eq!(report.chunk_failures.len(), 1);
    assert_eq!(report.chunk_failures[0].chunk_id, "bad_chunk_text_0");
    assert_eq!(report.stored.text, 2);
    assert!(!report.is_complete());
}

#[tokio::test]
async fn test_broken_file_does_not_abort_run() {
    let tmp = TempDir::new().unwrap();
    let embedders = HashEmbedders::new(DIMS);
    let services = services_with(&tmp, Arc::new(TestStore::new()), &embedders).await;

    let files = vec![
        write_file(tmp.path(), "broken.wav", b"not really a wav file"),
        write_file(tmp.path(), "ok.txt", "Still ingested."),
    ];
    let report = services.ingestion_pipeline().ingest(&files, None).await.unwrap();

    assert!(matches!(report.files[0].outcome, FileOutcome::Failed { .. }));
    assert_eq!(report.files[0].modality, Some(Modality::Audio));
    assert_eq!(report.stored.text, 1);
    assert!(!report.is_complete());
}

#[tokio::test]
async fn test_progress_is_monotonic_and_sink_errors_are_ignored() {
    let tmp = TempDir::new().unwrap();
    let embedders = HashEmbedders::new(DIMS);
    let services = services_with(&tmp, Arc::new(TestStore::new()), &embedders).await;

    let files = vec![
        write_file(tmp.path(), "a.txt", text_1200()),
        write_file(tmp.path(), "b.txt", "Short file."),
    ];
    let sink = RecordingSink::failing();
    let report = services
        .ingestion_pipeline()
        .ingest(&files, Some(&sink))
        .await
        .unwrap();
    assert_eq!(report.stored.text, 4);

    let fractions = sink.fractions();
    assert_eq!(fractions.first().copied(), Some(0.4));
    assert_eq!(fractions.last().copied(), Some(1.0));
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
    assert!(fractions.iter().all(|f| (0.0..=1.0).contains(f)));

    let updates = sink.updates.lock().unwrap();
    let last = &updates.last().unwrap().1;
    assert!(last.contains("2 files processed"));
    assert!(last.contains("4 chunks generated"));
}

#[tokio::test]
async fn test_zero_chunks_is_success() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(TestStore::new());
    let embedders = HashEmbedders::new(DIMS);
    let services = services_with(&tmp, store.clone(), &embedders).await;

    let path = write_file(tmp.path(), "empty.txt", "");
    let sink = RecordingSink::default();
    let report = services
        .ingestion_pipeline()
        .ingest(&[path], Some(&sink))
        .await
        .unwrap();

    assert_eq!(report.files[0].outcome, FileOutcome::Empty);
    assert_eq!(report.chunks_generated, 0);
    assert!(report.is_complete());
    assert_eq!(store.inserts.load(Ordering::SeqCst), 0);
    assert_eq!(embedders.total_calls(), 0);

    let updates = sink.updates.lock().unwrap();
    assert_eq!(
        updates.last().unwrap(),
        &(1.0, "No chunks to process".to_string())
    );
}

#[tokio::test]
async fn test_batches_flush_at_batch_size() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(TestStore::new());
    let embedders = HashEmbedders::new(DIMS);
    let services = services_with(&tmp, store.clone(), &embedders).await;

    let files: Vec<_> = (0..5)
        .map(|i| write_file(tmp.path(), &format!("note{i}.txt"), format!("Note number {i}.")))
        .collect();
    let pipeline = IngestionPipeline::new(
        services.chunkers.clone(),
        services.embedders.clone(),
        services.collections.clone(),
        2,
    );
    let report = pipeline.ingest(&files, None).await.unwrap();

    assert_eq!(report.stored.text, 5);
    // Two full batches of 2, then a final flush of 1.
    assert_eq!(store.inserts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_cancellation_stops_run() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(TestStore::new());
    let embedders = HashEmbedders::new(DIMS);
    let services = services_with(&tmp, store.clone(), &embedders).await;

    let path = write_file(tmp.path(), "notes.txt", text_1200());
    let flag = Arc::new(AtomicBool::new(true));
    let report = services
        .ingestion_pipeline()
        .with_cancellation(flag)
        .ingest(&[path], None)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert!(report.files.is_empty());
    assert_eq!(report.total_stored(), 0);
    assert!(!report.is_complete());
}

#[tokio::test]
async fn test_reingest_duplicates_records() {
    let tmp = TempDir::new().unwrap();
    let embedders = HashEmbedders::new(DIMS);
    let services = services_with(&tmp, Arc::new(TestStore::new()), &embedders).await;

    let path = write_file(tmp.path(), "notes.txt", text_1200());
    let pipeline = services.ingestion_pipeline();
    pipeline.ingest(&[path.clone()], None).await.unwrap();
    pipeline.ingest(&[path], None).await.unwrap();

    assert_eq!(services.collections.text.count().await.unwrap(), 6);
}

#[tokio::test]
async fn test_empty_database_short_circuits() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(TestStore::new());
    let embedders = HashEmbedders::new(DIMS);
    let services = services_with(&tmp, store.clone(), &embedders).await;
    let retriever = services.retriever();

    assert!(retriever.is_database_empty().await);
    let retrieval = retriever.retrieve(&Query::text("anything"), 5).await;

    assert_eq!(retrieval, Retrieval::EmptyDatabase);
    assert_eq!(embedders.total_calls(), 0);
    assert_eq!(store.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_query_only_searches_its_modality() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(TestStore::new());
    let embedders = HashEmbedders::new(DIMS);
    let services = services_with(&tmp, store.clone(), &embedders).await;

    let path = write_file(tmp.path(), "notes.txt", "Lighthouse keepers and their logs.");
    services.ingestion_pipeline().ingest(&[path], None).await.unwrap();

    let retriever = services.retriever();
    assert!(!retriever.is_database_empty().await);

    // Images are empty even though text is not.
    let image = write_file(tmp.path(), "query.png", b"\x89PNG");
    let retrieval = retriever.try_retrieve(&Query::image(&image), 5).await.unwrap();
    assert_eq!(retrieval, Retrieval::Results(Vec::new()));
    assert_eq!(store.searches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalid_query_is_an_error_or_empty() {
    let tmp = TempDir::new().unwrap();
    let embedders = HashEmbedders::new(DIMS);
    let services = services_with(&tmp, Arc::new(TestStore::new()), &embedders).await;
    let path = write_file(tmp.path(), "notes.txt", "Some text.");
    services.ingestion_pipeline().ingest(&[path], None).await.unwrap();

    let retriever = services.retriever();
    let missing = Query::audio(tmp.path().join("missing.wav"));
    assert!(matches!(
        retriever.try_retrieve(&missing, 5).await,
        Err(RetrievalError::FileNotFound { .. })
    ));
    assert_eq!(
        retriever.retrieve(&missing, 5).await,
        Retrieval::Results(Vec::new())
    );
}

#[tokio::test]
async fn test_image_round_trip() {
    let tmp = TempDir::new().unwrap();
    let embedders = HashEmbedders::new(DIMS);
    let services = services_with(&tmp, Arc::new(TestStore::new()), &embedders).await;

    let cat = write_file(tmp.path(), "cat.png", b"\x89PNG cat");
    let dog = write_file(tmp.path(), "dog.jpg", b"\xff\xd8 dog");
    let report = services
        .ingestion_pipeline()
        .ingest(&[cat.clone(), dog], None)
        .await
        .unwrap();
    assert_eq!(report.stored.image, 2);

    let results = services
        .retriever()
        .try_retrieve(&Query::image(&cat), 1)
        .await
        .unwrap()
        .into_results();
    assert_eq!(results[0].metadata.source_id, "cat.png");
    assert_eq!(results[0].metadata.chunk_id, "cat_image_chunk");
    assert_eq!(results[0].content, cat.to_string_lossy());
}

#[tokio::test]
async fn test_audio_silence_split_scenario() {
    let tmp = TempDir::new().unwrap();
    let embedders = HashEmbedders::new(DIMS);
    let services = services_with(&tmp, Arc::new(TestStore::new()), &embedders).await;

    let clip = tmp.path().join("interview.wav");
    write_wav(
        &clip,
        &[
            (2000, true),
            (2000, false),
            (2000, true),
            (2000, false),
            (2000, true),
        ],
    );
    let report = services
        .ingestion_pipeline()
        .ingest(&[clip.clone()], None)
        .await
        .unwrap();

    assert_eq!(report.files[0].outcome, FileOutcome::Chunked { chunks: 3 });
    assert_eq!(report.stored.audio, 3);

    let out_dir = &AudioChunker::from_config(&services.config.chunking.audio)
        .artifact_dir(&clip)
        .unwrap();
    let mut total_ms = 0;
    for i in 0..3 {
        let segment = out_dir.join(format!("interview_chunk_audio_{i}.wav"));
        assert!(segment.is_file(), "missing {}", segment.display());
        let reader = hound::WavReader::open(&segment).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        total_ms += reader.duration() as u64 * 1000 / 16_000;
    }
    assert!(total_ms < 10_000);

    let results = services
        .retriever()
        .try_retrieve(
            &Query::audio(out_dir.join("interview_chunk_audio_1.wav")),
            3,
        )
        .await
        .unwrap()
        .into_results();
    assert_eq!(results.len(), 3);
    let exact = results
        .iter()
        .find(|r| r.metadata.chunk_id == "interview_chunk_audio_1")
        .unwrap();
    assert!((exact.score - 1.0).abs() < 1e-4);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(results.iter().all(|r| r.metadata.duration_ms.is_some()));
    let durations: u64 = results.iter().filter_map(|r| r.metadata.duration_ms).sum();
    assert_eq!(durations, 8000);
}

struct PanickingChunker;

impl Chunker for PanickingChunker {
    fn modality(&self) -> Modality {
        Modality::Image
    }

    fn process(&self, _path: &std::path::Path) -> Result<Vec<Chunk>> {
        panic!("decoder blew up")
    }
}

#[tokio::test]
async fn test_panicking_chunker_fails_only_its_file() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(TestStore::new());
    let embedders = HashEmbedders::new(DIMS);
    let services = services_with(&tmp, store.clone(), &embedders).await;

    let mut chunkers = services.chunkers.clone();
    chunkers.image = Arc::new(PanickingChunker);
    let pipeline = IngestionPipeline::new(
        chunkers,
        services.embedders.clone(),
        services.collections.clone(),
        8,
    );

    let files = vec![
        write_file(tmp.path(), "bad.png", b"\x89PNG"),
        write_file(tmp.path(), "ok.txt", "Survives a crashing neighbour."),
    ];
    let report = pipeline.ingest(&files, None).await.unwrap();

    match &report.files[0].outcome {
        FileOutcome::Failed { error } => assert!(error.contains("decoder blew up"), "{error}"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(report.files[1].outcome, FileOutcome::Chunked { chunks: 1 });
    assert_eq!(report.stored.text, 1);
    assert_eq!(services.collections.text.count().await.unwrap(), 1);
    assert!(!report.is_complete());
}

#[tokio::test]
async fn test_same_named_audio_sources_keep_separate_segments() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(TestStore::new());
    let embedders = HashEmbedders::new(DIMS);
    let services = services_with(&tmp, store.clone(), &embedders).await;

    let mut files = Vec::new();
    for (day, ms) in [("day1", 4000), ("day2", 1000)] {
        let dir = tmp.path().join(day);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("rec.wav");
        write_wav(&path, &[(ms, true)]);
        files.push(path);
    }
    let report = services.ingestion_pipeline().ingest(&files, None).await.unwrap();
    assert_eq!(report.stored.audio, 2);

    let records = all_records(&store, "audio_collection").await;
    assert_eq!(records.len(), 2);
    let mut durations = Vec::new();
    for record in &records {
        let meta = record.payload.metadata();
        assert_eq!(meta.chunk_id, "rec_chunk_audio_0");
        let artifact = meta.chunk_data_path.as_deref().unwrap();
        let (ms, _) = wav_info(std::path::Path::new(artifact));
        assert_eq!(Some(ms), meta.duration_ms, "{artifact} was overwritten");
        durations.push(ms);
    }
    durations.sort();
    assert_eq!(durations, vec![1000, 4000]);
    assert_ne!(
        records[0].payload.metadata().chunk_data_path,
        records[1].payload.metadata().chunk_data_path
    );
}

#[tokio::test]
async fn test_stereo_44k_audio_is_downmixed_and_resampled() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(TestStore::new());
    let embedders = HashEmbedders::new(DIMS);
    let services = services_with(&tmp, store.clone(), &embedders).await;

    let clip = tmp.path().join("field.wav");
    write_wav_with(&clip, 44_100, 2, &[(1000, true), (2000, false), (1000, true)]);
    let report = services.ingestion_pipeline().ingest(&[clip], None).await.unwrap();

    assert_eq!(report.files[0].outcome, FileOutcome::Chunked { chunks: 2 });
    assert_eq!(report.stored.audio, 2);

    for record in all_records(&store, "audio_collection").await {
        let meta = record.payload.metadata();
        let (ms, spec) = wav_info(std::path::Path::new(meta.chunk_data_path.as_deref().unwrap()));
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.channels, 1);
        assert!((1000..=2000).contains(&ms), "segment of {ms} ms");
    }
}
