//! Final video muxing through an external encoder.

pub mod filter;

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::{
    cancel::CancelToken,
    error::{CourseError, EncoderFailure, Result},
    process::{self, ProcessError},
    subtitle,
    types::{NarrationTrack, Quality, SubtitleCue},
};

pub use filter::{
    FilterParams, OverlaySegment, build_filter_graph, escape_filter_text, overlay_segments,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleMode {
    /// Rendered into the picture.
    #[default]
    Burn,
    /// Muxed as a selectable `mov_text` track.
    Soft,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub program: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_codec: String,
    pub video_bitrate: String,
    pub preset: String,
    pub pixel_format: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub font_path: Option<PathBuf>,
    pub font_size: u32,
    pub high_quality_font_size: u32,
    pub font_color: String,
    pub text_bottom_margin: u32,
    pub subtitle_mode: SubtitleMode,
    pub timeout_secs: u64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            width: 1920,
            height: 1080,
            fps: 30,
            video_codec: "libx264".to_string(),
            video_bitrate: "2M".to_string(),
            preset: "medium".to_string(),
            pixel_format: "yuv420p".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
            font_path: None,
            font_size: 48,
            high_quality_font_size: 56,
            font_color: "white".to_string(),
            text_bottom_margin: 150,
            subtitle_mode: SubtitleMode::Burn,
            timeout_secs: 300,
        }
    }
}

/// Inputs for one lesson video.
#[derive(Debug, Clone)]
pub struct AssemblyRequest<'a> {
    pub narration: &'a NarrationTrack,
    pub background: &'a Path,
    pub cues: &'a [SubtitleCue],
    /// Lesson body, source of the on-screen text overlays.
    pub body: &'a str,
    pub subtitle_path: &'a Path,
    pub output_path: &'a Path,
    pub quality: Quality,
}

pub struct VideoAssembler {
    config: EncoderConfig,
}

impl VideoAssembler {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    fn font_size(&self, quality: Quality) -> u32 {
        match quality {
            Quality::High => self.config.high_quality_font_size,
            Quality::Standard => self.config.font_size,
        }
    }

    /// Full argument list for the encoder, in invocation order.
    pub fn encoder_args(&self, request: &AssemblyRequest<'_>) -> Vec<OsString> {
        let config = &self.config;
        let segments = overlay_segments(request.body, request.narration.duration_seconds);
        let soft = config.subtitle_mode == SubtitleMode::Soft;
        let has_cues = !request.cues.is_empty();

        let graph = build_filter_graph(&FilterParams {
            width: config.width,
            height: config.height,
            segments: &segments,
            font_size: self.font_size(request.quality),
            font_color: &config.font_color,
            font_path: config.font_path.as_deref(),
            bottom_margin: config.text_bottom_margin,
            subtitles: (!soft && has_cues).then_some(request.subtitle_path),
        });

        let mut args: Vec<OsString> = Vec::new();
        let mut push = |values: &[&str]| args.extend(values.iter().map(OsString::from));

        push(&["-y", "-hide_banner", "-loglevel", "error"]);
        push(&["-loop", "1", "-framerate", &config.fps.to_string(), "-i"]);
        args.push(request.background.as_os_str().to_owned());
        args.push("-i".into());
        args.push(request.narration.file_path.as_os_str().to_owned());
        if soft && has_cues {
            args.push("-i".into());
            args.push(request.subtitle_path.as_os_str().to_owned());
        }

        let mut push = |values: &[&str]| args.extend(values.iter().map(OsString::from));
        push(&["-filter_complex", &graph]);
        push(&["-map", filter::VIDEO_OUTPUT_LABEL, "-map", "1:a:0"]);
        if soft && has_cues {
            push(&["-map", "2:s:0", "-c:s", "mov_text", "-metadata:s:s:0", "language=eng"]);
        }
        push(&[
            "-c:v",
            &config.video_codec,
            "-preset",
            &config.preset,
            "-b:v",
            &config.video_bitrate,
            "-pix_fmt",
            &config.pixel_format,
            "-r",
            &config.fps.to_string(),
        ]);
        push(&["-c:a", &config.audio_codec, "-b:a", &config.audio_bitrate]);
        push(&[
            "-t",
            &format!("{:.3}", request.narration.duration_seconds),
            "-shortest",
            "-movflags",
            "+faststart",
        ]);
        args.push(request.output_path.as_os_str().to_owned());
        args
    }

    /// Writes the subtitle file, runs the encoder and checks the result.
    ///
    /// Encoder failures are returned as-is; retrying is up to the caller.
    pub async fn assemble(
        &self,
        request: &AssemblyRequest<'_>,
        cancel: &CancelToken,
    ) -> Result<PathBuf> {
        subtitle::write_srt(request.subtitle_path, request.cues).await?;

        if let Some(parent) = request.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        remove_output(request.output_path, "stale").await;

        if let Err(err) = self.encode(request, cancel).await {
            // Whatever the encoder managed to write is not a usable video.
            remove_output(request.output_path, "partial").await;
            return Err(err);
        }

        info!(output = %request.output_path.display(), "video assembled");
        Ok(request.output_path.to_path_buf())
    }

    async fn encode(&self, request: &AssemblyRequest<'_>, cancel: &CancelToken) -> Result<()> {
        let mut command = Command::new(&self.config.program);
        command.args(self.encoder_args(request));

        let timeout = Duration::from_secs(self.config.timeout_secs);
        debug!(
            program = %self.config.program.display(),
            output = %request.output_path.display(),
            "invoking encoder"
        );

        let output = process::run(command, timeout, cancel)
            .await
            .map_err(|err| match err {
                ProcessError::Cancelled { .. } => CourseError::Cancelled,
                ProcessError::TimedOut { timeout, .. } => CourseError::EncoderInvocation {
                    reason: EncoderFailure::TimedOut(timeout),
                    diagnostics: String::new(),
                },
                ProcessError::Spawn { source, .. } => CourseError::EncoderInvocation {
                    reason: EncoderFailure::Spawn(source.to_string()),
                    diagnostics: String::new(),
                },
                ProcessError::Wait { source, .. } => CourseError::Io(source),
            })?;

        if !output.success() {
            return Err(CourseError::EncoderInvocation {
                reason: EncoderFailure::NonZeroExit(output.status.to_string()),
                diagnostics: output.diagnostics(),
            });
        }

        let produced = tokio::fs::metadata(request.output_path)
            .await
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false);
        if !produced {
            return Err(CourseError::EncoderInvocation {
                reason: EncoderFailure::MissingOutput(request.output_path.to_path_buf()),
                diagnostics: output.diagnostics(),
            });
        }

        Ok(())
    }

    /// Confirms the encoder can be launched at all.
    pub async fn check_encoder(&self) -> Result<()> {
        let mut command = Command::new(&self.config.program);
        command.arg("-version");
        let output = process::run(command, Duration::from_secs(10), &CancelToken::never())
            .await
            .map_err(|e| {
                CourseError::configuration(format!(
                    "encoder {} is not usable: {e}",
                    self.config.program.display()
                ))
            })?;
        if !output.success() {
            return Err(CourseError::configuration(format!(
                "encoder {} exited with {}",
                self.config.program.display(),
                output.status
            )));
        }
        Ok(())
    }
}

async fn remove_output(path: &Path, kind: &str) {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), error = %e, "could not remove {kind} output");
        }
        _ => {}
    }
}
