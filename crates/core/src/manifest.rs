//! Course manifest written next to the produced videos.

use std::{
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    format::format_hms,
    types::{Course, CourseResult, LessonStatus},
    workspace,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestLesson {
    pub id: String,
    pub title: String,
    pub status: String,
    pub video_path: Option<PathBuf>,
    pub duration_seconds: Option<f64>,
    pub failed_stage: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub diagnostics: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseManifest {
    pub course_id: String,
    pub title: String,
    /// Unix seconds.
    pub generated_at: u64,
    /// `H:MM:SS` over completed lessons.
    pub total_duration: String,
    pub total_duration_seconds: f64,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
    pub lessons: Vec<ManifestLesson>,
}

pub fn build_manifest(course: &Course, result: &CourseResult) -> CourseManifest {
    let total = result.total_duration_seconds();
    CourseManifest {
        course_id: course.id.clone(),
        title: course.title.clone(),
        generated_at: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default(),
        total_duration: format_hms(total),
        total_duration_seconds: total,
        completed: result.count(LessonStatus::Completed),
        failed: result.count(LessonStatus::Failed),
        pending: result.count(LessonStatus::Pending) + result.count(LessonStatus::Running),
        lessons: result
            .lessons
            .iter()
            .map(|lesson| ManifestLesson {
                id: lesson.lesson_id.clone(),
                title: lesson.title.clone(),
                status: format!("{:?}", lesson.status).to_lowercase(),
                video_path: lesson.video_path.clone(),
                duration_seconds: lesson.duration_seconds,
                failed_stage: lesson.failed_stage.map(|s| s.name().to_string()),
                error: lesson.error.clone(),
                diagnostics: lesson.diagnostics.clone(),
            })
            .collect(),
    }
}

pub async fn write_manifest(output_dir: &Path, manifest: &CourseManifest) -> Result<PathBuf> {
    tokio::fs::create_dir_all(output_dir).await?;
    let path = workspace::manifest_path(output_dir);
    let json = serde_json::to_string_pretty(manifest)?;
    tokio::fs::write(&path, json).await?;
    Ok(path)
}

pub async fn read_manifest(path: &Path) -> Result<CourseManifest> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}
