use std::{path::PathBuf, time::Duration};

use thiserror::Error;

use crate::{provider::ProviderError, types::Stage};

/// Why an encoder invocation did not produce a usable video.
#[derive(Debug, Error)]
pub enum EncoderFailure {
    #[error("encoder exited with {0}")]
    NonZeroExit(String),

    #[error("encoder timed out after {0:?}")]
    TimedOut(Duration),

    #[error("encoder reported success but {} is missing or empty", .0.display())]
    MissingOutput(PathBuf),

    #[error("failed to launch encoder: {0}")]
    Spawn(String),
}

#[derive(Debug, Error)]
pub enum CourseError {
    #[error("Chunk {chunk_index} failed after {attempts} attempt(s): {source}")]
    ChunkSynthesis {
        chunk_index: usize,
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("Failed to concatenate narration: {reason}")]
    Concatenation { reason: String, diagnostics: String },

    #[error("Failed to render background {}: {source}", path.display())]
    BackgroundRender {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Video assembly failed: {reason}")]
    EncoderInvocation {
        reason: EncoderFailure,
        diagnostics: String,
    },

    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    #[error("Lesson has no narration text")]
    EmptyLesson,

    #[error("Cancelled")]
    Cancelled,

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CourseError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Captured encoder output, when the failure came from an external tool.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::Concatenation { diagnostics, .. } | Self::EncoderInvocation { diagnostics, .. } => {
                Some(diagnostics)
            }
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled
                | Self::ChunkSynthesis {
                    source: ProviderError::Cancelled,
                    ..
                }
        )
    }
}

/// A lesson failure attributed to the stage that raised it.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: CourseError,
}

impl StageError {
    pub fn new(stage: Stage, source: CourseError) -> Self {
        Self { stage, source }
    }
}

pub type Result<T> = std::result::Result<T, CourseError>;
