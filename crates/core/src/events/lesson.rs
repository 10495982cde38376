//! Progress events published by the lesson pipeline.

use std::path::PathBuf;

use serde::Serialize;
use uuid::Uuid;

use crate::{events::EventHeader, types::Stage};

macro_rules! impl_event {
    ($ty:ty) => {
        impl $crate::events::Event for $ty {
            fn event_id(&self) -> Uuid {
                self.header.event_id
            }

            fn parent_ids(&self) -> &[Uuid] {
                &self.header.parent_ids
            }

            fn event_type(&self) -> &'static str {
                Self::EVENT_TYPE
            }

            fn timestamp(&self) -> std::time::SystemTime {
                self.header.timestamp
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self as &dyn std::any::Any
            }
        }
    };
}

#[derive(Debug, Serialize)]
pub struct LessonStarted {
    pub header: EventHeader,
    pub course_id: String,
    pub lesson_id: String,
    pub title: String,
}

impl LessonStarted {
    pub const EVENT_TYPE: &'static str = "lesson.started";

    pub fn new(course_id: &str, lesson_id: &str, title: &str) -> Self {
        Self {
            header: EventHeader::new(Vec::new()),
            course_id: course_id.to_string(),
            lesson_id: lesson_id.to_string(),
            title: title.to_string(),
        }
    }
}

impl_event!(LessonStarted);

#[derive(Debug, Serialize)]
pub struct StageFinished {
    pub header: EventHeader,
    pub lesson_id: String,
    pub stage: Stage,
    pub elapsed_ms: u64,
}

impl StageFinished {
    pub const EVENT_TYPE: &'static str = "lesson.stage_finished";

    pub fn new(parent: Uuid, lesson_id: &str, stage: Stage, elapsed_ms: u64) -> Self {
        Self {
            header: EventHeader::new(vec![parent]),
            lesson_id: lesson_id.to_string(),
            stage,
            elapsed_ms,
        }
    }
}

impl_event!(StageFinished);

#[derive(Debug, Serialize)]
pub struct LessonCompleted {
    pub header: EventHeader,
    pub lesson_id: String,
    pub video_path: PathBuf,
    pub duration_seconds: f64,
}

impl LessonCompleted {
    pub const EVENT_TYPE: &'static str = "lesson.completed";

    pub fn new(parent: Uuid, lesson_id: &str, video_path: PathBuf, duration_seconds: f64) -> Self {
        Self {
            header: EventHeader::new(vec![parent]),
            lesson_id: lesson_id.to_string(),
            video_path,
            duration_seconds,
        }
    }
}

impl_event!(LessonCompleted);

#[derive(Debug, Serialize)]
pub struct LessonFailed {
    pub header: EventHeader,
    pub lesson_id: String,
    pub stage: Stage,
    pub message: String,
}

impl LessonFailed {
    pub const EVENT_TYPE: &'static str = "lesson.failed";

    pub fn new(parent: Uuid, lesson_id: &str, stage: Stage, message: String) -> Self {
        Self {
            header: EventHeader::new(vec![parent]),
            lesson_id: lesson_id.to_string(),
            stage,
            message,
        }
    }
}

impl_event!(LessonFailed);

#[derive(Debug, Serialize)]
pub struct CourseFinished {
    pub header: EventHeader,
    pub course_id: String,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
    pub manifest_path: Option<PathBuf>,
}

impl CourseFinished {
    pub const EVENT_TYPE: &'static str = "course.finished";

    pub fn new(
        course_id: &str,
        completed: usize,
        failed: usize,
        pending: usize,
        manifest_path: Option<PathBuf>,
    ) -> Self {
        Self {
            header: EventHeader::new(Vec::new()),
            course_id: course_id.to_string(),
            completed,
            failed,
            pending,
            manifest_path,
        }
    }
}

impl_event!(CourseFinished);

/// Every event type the pipeline publishes.
pub const ALL_EVENT_TYPES: &[&str] = &[
    LessonStarted::EVENT_TYPE,
    StageFinished::EVENT_TYPE,
    LessonCompleted::EVENT_TYPE,
    LessonFailed::EVENT_TYPE,
    CourseFinished::EVENT_TYPE,
];
