//! Pipeline configuration.
//!
//! Everything has a default, so an empty JSON object is a valid config file.
//! Credentials are never stored here; providers read them from the
//! environment.

use std::{path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    assembler::EncoderConfig,
    error::{CourseError, Result},
    narration::SynthesisSettings,
    provider::ProviderKind,
    types::{Pattern, ProcessingOptions, Quality},
    workspace,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub url: Option<String>,
    /// Executable for the `command` provider.
    pub command: Option<PathBuf>,
    pub args: Vec<String>,
    pub model: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            url: None,
            command: None,
            args: Vec::new(),
            model: None,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
    pub chunk_size: usize,
    pub synthesis_parallelism: usize,
    pub lesson_workers: usize,
    /// Total attempts per chunk, first try included.
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub sample_rate: u32,
    pub keep_intermediates: bool,
    pub quality: String,
    pub background_style: Option<String>,
    pub voice: Option<String>,
    pub provider: ProviderSettings,
    pub encoder: EncoderConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: workspace::default_work_dir(),
            output_dir: PathBuf::from("output"),
            chunk_size: 200,
            synthesis_parallelism: 2,
            lesson_workers: 2,
            max_attempts: 3,
            retry_backoff_ms: 1000,
            sample_rate: 24000,
            keep_intermediates: false,
            quality: Quality::default().name().to_string(),
            background_style: None,
            voice: None,
            provider: ProviderSettings::default(),
            encoder: EncoderConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Rejects settings no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(CourseError::configuration("chunk_size must be at least 1"));
        }
        if self.synthesis_parallelism == 0 {
            return Err(CourseError::configuration(
                "synthesis_parallelism must be at least 1",
            ));
        }
        if self.lesson_workers == 0 {
            return Err(CourseError::configuration("lesson_workers must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(CourseError::configuration("max_attempts must be at least 1"));
        }
        if self.encoder.width == 0 || self.encoder.height == 0 {
            return Err(CourseError::configuration(format!(
                "invalid output resolution {}x{}",
                self.encoder.width, self.encoder.height
            )));
        }
        if self.encoder.fps == 0 {
            return Err(CourseError::configuration("encoder fps must be at least 1"));
        }
        if self.encoder.timeout_secs == 0 {
            return Err(CourseError::configuration("encoder timeout must be positive"));
        }
        if self.encoder.program.as_os_str().is_empty() {
            return Err(CourseError::configuration("encoder program is empty"));
        }
        if self.provider.kind == ProviderKind::Command && self.provider.command.is_none() {
            return Err(CourseError::configuration(
                "the command provider requires `command`",
            ));
        }
        self.processing_options().map(|_| ())
    }

    pub fn processing_options(&self) -> Result<ProcessingOptions> {
        let background_style = self
            .background_style
            .as_deref()
            .map(str::parse::<Pattern>)
            .transpose()?;
        Ok(ProcessingOptions {
            voice: self.voice.clone(),
            quality: self.quality.parse()?,
            background_style,
        })
    }

    pub fn synthesis_settings(&self) -> SynthesisSettings {
        SynthesisSettings {
            parallelism: self.synthesis_parallelism,
            max_attempts: self.max_attempts,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            sample_rate: self.sample_rate,
            concat_program: self.encoder.program.clone(),
            concat_timeout: Duration::from_secs(self.encoder.timeout_secs),
        }
    }
}
