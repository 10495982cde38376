use std::{
    hash::{DefaultHasher, Hash, Hasher},
    path::{Path, PathBuf},
};

/// Hash used to derive directory names and background seeds.
pub fn text_hash(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

pub fn default_work_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("coursecast")
}

/// Working directory for every lesson of a course
pub fn course_dir(work_dir: &Path, course_id: &str) -> PathBuf {
    work_dir.join(text_hash(course_id).to_string())
}

/// Filesystem-safe rendering of an identifier
pub fn sanitize_id(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "lesson".to_string()
    } else {
        cleaned
    }
}

/// Sanitized id plus a hash of the raw id, so ids that sanitize alike
/// (`intro 1`, `intro_1`) still get distinct names.
fn unique_name(id: &str) -> String {
    format!("{}-{}", sanitize_id(id), text_hash(id))
}

/// Final video location for a lesson
pub fn video_path(output_dir: &Path, lesson_id: &str) -> PathBuf {
    output_dir.join(format!("{}.mp4", unique_name(lesson_id)))
}

pub fn manifest_path(output_dir: &Path) -> PathBuf {
    output_dir.join("course-manifest.json")
}

/// Intermediate files of one lesson. Dropping this does not delete anything;
/// the orchestrator calls [`LessonWorkspace::remove`] once the lesson is done.
#[derive(Debug, Clone)]
pub struct LessonWorkspace {
    root: PathBuf,
}

impl LessonWorkspace {
    pub async fn create(work_dir: &Path, course_id: &str, lesson_id: &str) -> std::io::Result<Self> {
        let root = course_dir(work_dir, course_id).join(unique_name(lesson_id));
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Wraps an existing directory.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn chunk_audio_path(&self, index: usize, extension: &str) -> PathBuf {
        self.root.join(format!("chunk_{index:04}.{extension}"))
    }

    pub fn narration_path(&self, extension: &str) -> PathBuf {
        self.root.join(format!("narration.{extension}"))
    }

    pub fn concat_list_path(&self) -> PathBuf {
        self.root.join("narration_concat.txt")
    }

    pub fn background_path(&self) -> PathBuf {
        self.root.join("background.png")
    }

    pub fn subtitle_path(&self) -> PathBuf {
        self.root.join("subtitles.srt")
    }

    pub async fn remove(&self) -> std::io::Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
