//! Chunked speech synthesis with bounded concurrency, retries and an
//! order-preserving merge.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::{process::Command, sync::Semaphore, task::JoinSet};
use tracing::{debug, info, warn};

use crate::{
    cancel::CancelToken,
    error::{CourseError, Result},
    process::{self, ProcessError},
    provider::{ProviderError, SpeechProvider, SpeechRequest},
    types::{AudioSegment, NarrationTrack, TextChunk, VoiceOptions},
    workspace::LessonWorkspace,
};

#[derive(Debug, Clone)]
pub struct SynthesisSettings {
    /// Chunks synthesized at once for a single lesson.
    pub parallelism: usize,
    pub max_attempts: u32,
    /// Base delay; attempt `n` waits `n * retry_backoff`.
    pub retry_backoff: Duration,
    /// Reported when the provider does not say.
    pub sample_rate: u32,
    pub concat_program: PathBuf,
    pub concat_timeout: Duration,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            parallelism: 2,
            max_attempts: 3,
            retry_backoff: Duration::from_secs(1),
            sample_rate: 24000,
            concat_program: PathBuf::from("ffmpeg"),
            concat_timeout: Duration::from_secs(300),
        }
    }
}

pub struct NarrationSynthesizer {
    provider: Arc<dyn SpeechProvider>,
    settings: SynthesisSettings,
}

impl NarrationSynthesizer {
    pub fn new(provider: Arc<dyn SpeechProvider>, settings: SynthesisSettings) -> Self {
        Self { provider, settings }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Synthesizes every chunk and merges the audio in chunk order.
    ///
    /// The first chunk that exhausts its attempts fails the whole narration;
    /// chunks still in flight are aborted and their files removed.
    pub async fn synthesize(
        &self,
        chunks: &[TextChunk],
        voice: &VoiceOptions,
        workspace: &LessonWorkspace,
        cancel: &CancelToken,
    ) -> Result<NarrationTrack> {
        if chunks.iter().all(|c| c.text.trim().is_empty()) {
            return Err(CourseError::EmptyLesson);
        }

        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.settings.parallelism.max(1)));
        let mut tasks = JoinSet::new();

        for (position, chunk) in chunks.iter().cloned().enumerate() {
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&semaphore);
            let voice = voice.clone();
            let workspace = workspace.clone();
            let cancel = cancel.clone();
            let policy = RetryPolicy {
                max_attempts: self.settings.max_attempts.max(1),
                backoff: self.settings.retry_backoff,
            };

            tasks.spawn(async move {
                let _permit = tokio::select! {
                    permit = semaphore.acquire_owned() => {
                        permit.map_err(|e| CourseError::Task(e.to_string()))?
                    }
                    _ = cancel.cancelled() => {
                        return Err(CourseError::ChunkSynthesis {
                            chunk_index: chunk.index,
                            attempts: 0,
                            source: ProviderError::Cancelled,
                        });
                    }
                };
                let segment =
                    synthesize_chunk(provider.as_ref(), &chunk, &voice, &workspace, &cancel, policy)
                        .await?;
                Ok::<_, CourseError>((position, segment))
            });
        }

        let mut slots: Vec<Option<AudioSegment>> = vec![None; chunks.len()];
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| CourseError::Task(e.to_string()))
                .and_then(|result| result);
            match outcome {
                Ok((position, segment)) => slots[position] = Some(segment),
                Err(err) => {
                    tasks.abort_all();
                    while let Some(joined) = tasks.join_next().await {
                        if let Ok(Ok((position, segment))) = joined {
                            slots[position] = Some(segment);
                        }
                    }
                    remove_segments(slots.iter().flatten()).await;
                    return Err(err);
                }
            }
        }

        let segments: Vec<AudioSegment> = slots.into_iter().flatten().collect();
        let duration_seconds: f64 = segments.iter().map(|s| s.duration_seconds).sum();
        let sample_rate = segments
            .first()
            .and_then(|s| s.sample_rate)
            .unwrap_or(self.settings.sample_rate);

        debug!(
            chunks = segments.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "all chunks synthesized"
        );

        let file_path = self.merge(&segments, workspace, cancel).await?;

        info!(
            provider = self.provider.name(),
            chunks = segments.len(),
            duration_seconds,
            "narration ready"
        );

        Ok(NarrationTrack {
            file_path,
            duration_seconds,
            sample_rate,
        })
    }

    async fn merge(
        &self,
        segments: &[AudioSegment],
        workspace: &LessonWorkspace,
        cancel: &CancelToken,
    ) -> Result<PathBuf> {
        let extension = segments
            .first()
            .map(|s| audio_extension(&s.file_path))
            .unwrap_or("wav");
        let output = workspace.narration_path(extension);

        if let [only] = segments {
            tokio::fs::rename(&only.file_path, &output).await?;
            return Ok(output);
        }

        let list_path = workspace.concat_list_path();
        tokio::fs::write(&list_path, concat_listing(segments)).await?;

        let mut command = Command::new(&self.settings.concat_program);
        command
            .args(["-y", "-hide_banner", "-loglevel", "error"])
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(&list_path)
            .args(["-c", "copy"])
            .arg(&output);

        let result = process::run(command, self.settings.concat_timeout, cancel).await;
        let _ = tokio::fs::remove_file(&list_path).await;

        let output_result = match result {
            Err(ProcessError::Cancelled { .. }) => return Err(CourseError::Cancelled),
            Err(err) => {
                return Err(CourseError::Concatenation {
                    reason: err.to_string(),
                    diagnostics: String::new(),
                });
            }
            Ok(output_result) => output_result,
        };

        if !output_result.success() {
            return Err(CourseError::Concatenation {
                reason: format!("concat exited with {}", output_result.status),
                diagnostics: output_result.diagnostics(),
            });
        }

        let produced = tokio::fs::metadata(&output)
            .await
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if !produced {
            return Err(CourseError::Concatenation {
                reason: format!("{} is missing or empty", output.display()),
                diagnostics: output_result.diagnostics(),
            });
        }

        remove_segments(segments.iter()).await;
        Ok(output)
    }
}

#[derive(Clone, Copy)]
struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

async fn synthesize_chunk(
    provider: &dyn SpeechProvider,
    chunk: &TextChunk,
    voice: &VoiceOptions,
    workspace: &LessonWorkspace,
    cancel: &CancelToken,
    policy: RetryPolicy,
) -> Result<AudioSegment> {
    let target = workspace.chunk_audio_path(chunk.index, "wav");
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let request = SpeechRequest {
            text: &chunk.text,
            voice,
            output_path: &target,
            cancel,
        };

        match provider.generate_speech(request).await {
            Ok(audio) => {
                let dest = workspace.chunk_audio_path(chunk.index, audio_extension(&audio.path));
                adopt(&audio.path, &dest)
                    .await
                    .map_err(|e| CourseError::ChunkSynthesis {
                        chunk_index: chunk.index,
                        attempts: attempt,
                        source: ProviderError::Io(e),
                    })?;
                debug!(chunk = chunk.index, attempt, duration = audio.duration_seconds, "chunk synthesized");
                return Ok(AudioSegment {
                    chunk_index: chunk.index,
                    file_path: dest,
                    duration_seconds: audio.duration_seconds,
                    sample_rate: audio.sample_rate,
                });
            }
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.backoff * attempt;
                warn!(
                    chunk = chunk.index,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "speech synthesis failed, retrying"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return Err(CourseError::ChunkSynthesis {
                            chunk_index: chunk.index,
                            attempts: attempt,
                            source: ProviderError::Cancelled,
                        });
                    }
                }
            }
            Err(source) => {
                return Err(CourseError::ChunkSynthesis {
                    chunk_index: chunk.index,
                    attempts: attempt,
                    source,
                });
            }
        }
    }
}

/// Moves provider output into the lesson workspace.
async fn adopt(source: &Path, dest: &Path) -> std::io::Result<()> {
    if source == dest {
        return Ok(());
    }
    if tokio::fs::rename(source, dest).await.is_ok() {
        return Ok(());
    }
    // Different filesystem: copy, then drop the original.
    tokio::fs::copy(source, dest).await?;
    tokio::fs::remove_file(source).await
}

fn audio_extension(path: &Path) -> &str {
    path.extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .unwrap_or("wav")
}

/// Concat demuxer listing. Segments live next to the list file, so bare
/// file names are enough.
fn concat_listing(segments: &[AudioSegment]) -> String {
    segments
        .iter()
        .map(|segment| {
            let name = segment
                .file_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| segment.file_path.to_string_lossy().into_owned());
            format!("file '{}'\n", name.replace('\'', "'\\''"))
        })
        .collect()
}

async fn remove_segments<'a>(segments: impl Iterator<Item = &'a AudioSegment>) {
    for segment in segments {
        if let Err(e) = tokio::fs::remove_file(&segment.file_path).await {
            debug!(path = %segment.file_path.display(), error = %e, "could not remove chunk audio");
        }
    }
}
