use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{CourseError, StageError};

/// Lesson record as produced by the upstream markdown parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub id: String,
    pub title: String,
    #[serde(alias = "body_text")]
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub lessons: Vec<Lesson>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub index: usize,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub chunk_index: usize,
    pub file_path: PathBuf,
    pub duration_seconds: f64,
    pub sample_rate: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NarrationTrack {
    pub file_path: PathBuf,
    pub duration_seconds: f64,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtitleCue {
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub text: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Standard,
    High,
}

impl Quality {
    pub fn name(&self) -> &'static str {
        match self {
            Quality::Standard => "standard",
            Quality::High => "high",
        }
    }
}

impl FromStr for Quality {
    type Err = CourseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(Quality::Standard),
            "high" => Ok(Quality::High),
            other => Err(CourseError::Configuration {
                reason: format!("unknown quality tier '{other}' (expected 'standard' or 'high')"),
            }),
        }
    }
}

/// Background rendering algorithm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pattern {
    Solid,
    Gradient,
    Geometric,
    Noise,
}

impl Pattern {
    pub fn name(&self) -> &'static str {
        match self {
            Pattern::Solid => "solid",
            Pattern::Gradient => "gradient",
            Pattern::Geometric => "geometric",
            Pattern::Noise => "noise",
        }
    }
}

impl FromStr for Pattern {
    type Err = CourseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "solid" => Ok(Pattern::Solid),
            "gradient" => Ok(Pattern::Gradient),
            "geometric" => Ok(Pattern::Geometric),
            "noise" => Ok(Pattern::Noise),
            other => Err(CourseError::Configuration {
                reason: format!("unknown background style '{other}'"),
            }),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VoiceOptions {
    pub voice_id: Option<String>,
    pub quality: Quality,
}

/// Per-course generation options.
#[derive(Clone, Debug, Default)]
pub struct ProcessingOptions {
    pub voice: Option<String>,
    pub quality: Quality,
    /// Explicit style; when unset the pattern follows the quality tier.
    pub background_style: Option<Pattern>,
}

impl ProcessingOptions {
    pub fn voice_options(&self) -> VoiceOptions {
        VoiceOptions {
            voice_id: self.voice.clone(),
            quality: self.quality,
        }
    }
}

/// Orchestrator stages, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Prepare,
    Chunking,
    Narration,
    Background,
    Subtitles,
    Assembly,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Prepare => "prepare",
            Stage::Chunking => "chunking",
            Stage::Narration => "narration",
            Stage::Background => "background",
            Stage::Subtitles => "subtitles",
            Stage::Assembly => "assembly",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl LessonStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LessonStatus::Completed | LessonStatus::Failed)
    }
}

/// Outcome of one lesson. Only the orchestrator moves it through
/// `pending -> running -> completed | failed`.
#[derive(Debug, Clone, Serialize)]
pub struct LessonAssemblyResult {
    pub lesson_id: String,
    pub title: String,
    pub status: LessonStatus,
    pub video_path: Option<PathBuf>,
    pub duration_seconds: Option<f64>,
    pub failed_stage: Option<Stage>,
    pub error: Option<String>,
    /// Raw output of the external tool behind the failure, if any.
    pub diagnostics: Option<String>,
}

impl LessonAssemblyResult {
    pub fn new(lesson: &Lesson) -> Self {
        Self {
            lesson_id: lesson.id.clone(),
            title: lesson.title.clone(),
            status: LessonStatus::Pending,
            video_path: None,
            duration_seconds: None,
            failed_stage: None,
            error: None,
            diagnostics: None,
        }
    }

    pub(crate) fn start(&mut self) {
        debug_assert_eq!(self.status, LessonStatus::Pending);
        self.status = LessonStatus::Running;
    }

    pub(crate) fn complete(&mut self, video_path: PathBuf, duration_seconds: f64) {
        debug_assert_eq!(self.status, LessonStatus::Running);
        self.status = LessonStatus::Completed;
        self.video_path = Some(video_path);
        self.duration_seconds = Some(duration_seconds);
    }

    pub(crate) fn fail(&mut self, err: &StageError) {
        debug_assert_eq!(self.status, LessonStatus::Running);
        self.status = LessonStatus::Failed;
        self.failed_stage = Some(err.stage);
        self.error = Some(err.to_string());
        self.diagnostics = err
            .source
            .diagnostics()
            .filter(|d| !d.is_empty())
            .map(str::to_string);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseResult {
    pub course_id: String,
    pub lessons: Vec<LessonAssemblyResult>,
}

impl CourseResult {
    /// True only when every lesson reached `completed`.
    pub fn is_success(&self) -> bool {
        self.lessons
            .iter()
            .all(|l| l.status == LessonStatus::Completed)
    }

    pub fn count(&self, status: LessonStatus) -> usize {
        self.lessons.iter().filter(|l| l.status == status).count()
    }

    pub fn total_duration_seconds(&self) -> f64 {
        self.lessons.iter().filter_map(|l| l.duration_seconds).sum()
    }
}
