//! Audio chunker: decode, resample, split on silence, write segments.
//!
//! # Algorithm
//!
//! 1. Decode the file with symphonia and downmix to mono `f32`.
//! 2. Resample to the target rate (rubato FFT resampler) when it differs.
//! 3. Scan the clip in 1 ms steps with a `min_silence_ms` window; a window
//!    whose RMS is at or below `silence_thresh_db` (dBFS) is silent.
//!    Adjacent silent windows merge into silent ranges.
//! 4. The complement of the silent ranges is the speech. Each speech range
//!    is widened by `keep_silence_ms` on both sides; where two widened
//!    ranges overlap they meet at the midpoint.
//! 5. Every range is written as a 16-bit mono WAV and becomes one chunk
//!    whose content is the segment's path. Segments of one source share a
//!    directory under `output_dir` named `{stem}_{hash}`, where the hash is
//!    taken over the canonical source path, so same-named sources from
//!    different folders never overwrite each other.
//!
//! A clip shorter than `min_silence_ms` is kept whole; an all-silent clip
//! yields no chunks.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mmrag_core::models::{Chunk, ChunkMetadata, Modality};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use sha2::{Digest, Sha256};
use symphonia::core::probe::Hint;

use super::{file_stem, source_id, Chunker};
use crate::config::AudioChunkingConfig;

/// Silence detection parameters, all in milliseconds except the threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SilenceParams {
    pub min_silence_ms: u64,
    pub silence_thresh_db: f32,
    pub keep_silence_ms: u64,
}

impl Default for SilenceParams {
    fn default() -> Self {
        Self {
            min_silence_ms: 1000,
            silence_thresh_db: -40.0,
            keep_silence_ms: 500,
        }
    }
}

pub struct AudioChunker {
    params: SilenceParams,
    target_sample_rate: u32,
    output_dir: PathBuf,
}

impl AudioChunker {
    pub fn new(params: SilenceParams, target_sample_rate: u32, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            params,
            target_sample_rate,
            output_dir: output_dir.into(),
        }
    }

    pub fn from_config(config: &AudioChunkingConfig) -> Self {
        Self::new(
            SilenceParams {
                min_silence_ms: config.min_silence_ms,
                silence_thresh_db: config.silence_thresh_db,
                keep_silence_ms: config.keep_silence_ms,
            },
            config.target_sample_rate,
            &config.output_dir,
        )
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Directory holding the segments of `path`.
    pub fn artifact_dir(&self, path: &Path) -> Result<PathBuf> {
        let canonical = path
            .canonicalize()
            .with_context(|| format!("Failed to resolve audio path: {}", path.display()))?;
        let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
        let key: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
        Ok(self.output_dir.join(format!("{}_{}", file_stem(path)?, key)))
    }
}

impl Chunker for AudioChunker {
    fn modality(&self) -> Modality {
        Modality::Audio
    }

    fn process(&self, path: &Path) -> Result<Vec<Chunk>> {
        let source = source_id(path)?;
        let stem = file_stem(path)?;

        let (samples, rate) = decode_mono(path)?;
        let samples = if rate != self.target_sample_rate {
            tracing::debug!(from = rate, to = self.target_sample_rate, "resampling");
            resample(&samples, rate, self.target_sample_rate)?
        } else {
            samples
        };
        let rate = self.target_sample_rate;

        let ranges = split_on_silence(&samples, rate, &self.params);
        if ranges.is_empty() {
            tracing::info!(file = %source, "no non-silent audio found");
            return Ok(Vec::new());
        }

        let dir = self.artifact_dir(path)?;
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create audio chunk dir: {}", dir.display()))?;

        let mut chunks = Vec::with_capacity(ranges.len());
        for (i, (start_ms, end_ms)) in ranges.into_iter().enumerate() {
            let chunk_id = format!("{stem}_chunk_audio_{i}");
            let out = dir.join(format!("{chunk_id}.wav"));
            let from = ms_to_frame(start_ms, rate, samples.len());
            let to = ms_to_frame(end_ms, rate, samples.len());
            write_wav(&out, &samples[from..to], rate)?;

            let content = out.to_string_lossy().into_owned();
            let meta = ChunkMetadata::new(&source, Modality::Audio, chunk_id)
                .with_chunk_data_path(content.clone())
                .with_duration_ms(end_ms - start_ms);
            chunks.push(Chunk::new(content, meta)?);
        }

        tracing::info!(file = %source, segments = chunks.len(), "split audio file");
        Ok(chunks)
    }
}

/// Decode any supported file to mono `f32` samples and its sample rate.
pub fn decode_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("Unsupported or corrupt audio: {}", path.display()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .with_context(|| format!("No audio track in {}", path.display()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params
        .sample_rate
        .with_context(|| format!("Unknown sample rate in {}", path.display()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .with_context(|| format!("No decoder for {}", path.display()))?;

    let mut mono = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e).context("Failed to read audio packet"),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let channels = spec.channels.count().max(1);
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                for frame in buf.samples().chunks(channels) {
                    mono.push(frame.iter().sum::<f32>() / channels as f32);
                }
            }
            Err(SymphoniaError::DecodeError(msg)) => {
                tracing::warn!(path = %path.display(), error = msg, "skipping undecodable packet");
            }
            Err(e) => return Err(e).context("Failed to decode audio"),
        }
    }

    Ok((mono, sample_rate))
}

/// Resample mono audio with rubato's FFT resampler.
pub fn resample(pcm_in: &[f32], sr_in: u32, sr_out: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedInOut, Resampler};

    if pcm_in.is_empty() || sr_in == sr_out {
        return Ok(pcm_in.to_vec());
    }

    let mut pcm_out =
        Vec::with_capacity((pcm_in.len() as f64 * sr_out as f64 / sr_in as f64) as usize + 1024);
    let mut resampler = FftFixedInOut::<f32>::new(sr_in as usize, sr_out as usize, 1024, 1)
        .context("Failed to build resampler")?;
    let mut output_buffer = resampler.output_buffer_allocate(true);

    let mut pos_in = 0;
    while pos_in + resampler.input_frames_next() < pcm_in.len() {
        let (in_len, out_len) =
            resampler.process_into_buffer(&[&pcm_in[pos_in..]], &mut output_buffer, None)?;
        pos_in += in_len;
        pcm_out.extend_from_slice(&output_buffer[0][..out_len]);
    }
    if pos_in < pcm_in.len() {
        let (_in_len, out_len) = resampler.process_partial_into_buffer(
            Some(&[&pcm_in[pos_in..]]),
            &mut output_buffer,
            None,
        )?;
        pcm_out.extend_from_slice(&output_buffer[0][..out_len]);
    }

    Ok(pcm_out)
}

fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for &s in samples {
        writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Clip length in whole milliseconds.
pub fn duration_ms(frames: usize, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    frames as u64 * 1000 / sample_rate as u64
}

fn ms_to_frame(ms: u64, sample_rate: u32, frames: usize) -> usize {
    ((ms * sample_rate as u64 / 1000) as usize).min(frames)
}

/// Silent ranges `[start_ms, end_ms)`, each at least `min_silence_ms` long.
pub fn detect_silence(
    samples: &[f32],
    sample_rate: u32,
    min_silence_ms: u64,
    silence_thresh_db: f32,
) -> Vec<(u64, u64)> {
    let len_ms = duration_ms(samples.len(), sample_rate);
    if min_silence_ms == 0 || len_ms < min_silence_ms {
        return Vec::new();
    }

    let threshold = 10f64.powf(silence_thresh_db as f64 / 20.0);
    let mut squares = Vec::with_capacity(samples.len() + 1);
    squares.push(0.0f64);
    let mut acc = 0.0f64;
    for &s in samples {
        acc += (s as f64) * (s as f64);
        squares.push(acc);
    }

    let window_rms = |start_ms: u64| -> f64 {
        let a = ms_to_frame(start_ms, sample_rate, samples.len());
        let b = ms_to_frame(start_ms + min_silence_ms, sample_rate, samples.len());
        if b <= a {
            return 0.0;
        }
        ((squares[b] - squares[a]) / (b - a) as f64).sqrt()
    };

    let last_start = len_ms - min_silence_ms;
    let silent_starts: Vec<u64> = (0..=last_start)
        .filter(|&i| window_rms(i) <= threshold)
        .collect();

    let mut ranges = Vec::new();
    let mut iter = silent_starts.into_iter();
    let Some(first) = iter.next() else {
        return ranges;
    };
    let mut range_start = first;
    let mut prev = first;
    for start in iter {
        let continuous = start == prev + 1;
        let has_gap = start > prev + min_silence_ms;
        if !continuous && has_gap {
            ranges.push((range_start, prev + min_silence_ms));
            range_start = start;
        }
        prev = start;
    }
    ranges.push((range_start, prev + min_silence_ms));
    ranges
}

/// Non-silent ranges: the complement of [`detect_silence`].
pub fn detect_nonsilent(
    samples: &[f32],
    sample_rate: u32,
    min_silence_ms: u64,
    silence_thresh_db: f32,
) -> Vec<(u64, u64)> {
    let len_ms = duration_ms(samples.len(), sample_rate);
    let silent = detect_silence(samples, sample_rate, min_silence_ms, silence_thresh_db);
    if silent.is_empty() {
        return vec![(0, len_ms)];
    }
    if silent[0] == (0, len_ms) {
        return Vec::new();
    }

    let mut ranges = Vec::new();
    let mut prev_end = 0;
    for &(start, end) in &silent {
        ranges.push((prev_end, start));
        prev_end = end;
    }
    if prev_end != len_ms {
        ranges.push((prev_end, len_ms));
    }
    if ranges.first() == Some(&(0, 0)) {
        ranges.remove(0);
    }
    ranges
}

/// Segment boundaries in milliseconds after padding each non-silent range
/// with `keep_silence_ms`. Zero-length ranges are dropped.
pub fn split_on_silence(samples: &[f32], sample_rate: u32, params: &SilenceParams) -> Vec<(u64, u64)> {
    let len_ms = duration_ms(samples.len(), sample_rate) as i64;
    let keep = params.keep_silence_ms as i64;

    let mut ranges: Vec<(i64, i64)> = detect_nonsilent(
        samples,
        sample_rate,
        params.min_silence_ms,
        params.silence_thresh_db,
    )
    .into_iter()
    .map(|(s, e)| (s as i64 - keep, e as i64 + keep))
    .collect();

    for i in 1..ranges.len() {
        let last_end = ranges[i - 1].1;
        let next_start = ranges[i].0;
        if next_start < last_end {
            let mid = (last_end + next_start).div_euclid(2);
            ranges[i - 1].1 = mid;
            ranges[i].0 = mid;
        }
    }

    ranges
        .into_iter()
        .map(|(s, e)| (s.max(0) as u64, e.min(len_ms).max(0) as u64))
        .filter(|(s, e)| e > s)
        .collect()
}
