use std::time::Duration;

use crate::types::{CourseResult, LessonStatus};

/// Format seconds as an SRT timestamp `HH:MM:SS,mmm`
pub fn format_srt_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    format!(
        "{:02}:{:02}:{:02},{:03}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60,
        ms
    )
}

/// Format seconds as `H:MM:SS`
pub fn format_hms(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// Format an elapsed wall-clock duration for progress output
pub fn format_elapsed(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let mins = (secs / 60.0) as u64;
        format!("{}m {:.0}s", mins, secs % 60.0)
    }
}

/// Format a course run as human-readable markdown
pub fn format_course_report(result: &CourseResult) -> String {
    let mut output = String::new();

    output.push_str(&format!("# Course {}\n\n", result.course_id));

    output.push_str(&format!(
        "**Completed:** {} | **Failed:** {} | **Pending:** {} | **Total runtime:** {}\n\n",
        result.count(LessonStatus::Completed),
        result.count(LessonStatus::Failed),
        result.count(LessonStatus::Pending) + result.count(LessonStatus::Running),
        format_hms(result.total_duration_seconds())
    ));

    output.push_str("## Lessons\n\n");
    for (i, lesson) in result.lessons.iter().enumerate() {
        match lesson.status {
            LessonStatus::Completed => {
                let path = lesson
                    .video_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                output.push_str(&format!(
                    "{}. ✓ {} [{}] → {}\n",
                    i + 1,
                    lesson.title,
                    format_hms(lesson.duration_seconds.unwrap_or_default()),
                    path
                ));
            }
            LessonStatus::Failed => {
                output.push_str(&format!(
                    "{}. ✗ {} ({})\n",
                    i + 1,
                    lesson.title,
                    lesson.error.as_deref().unwrap_or("unknown error")
                ));
            }
            LessonStatus::Pending | LessonStatus::Running => {
                output.push_str(&format!("{}. · {} (not started)\n", i + 1, lesson.title));
            }
        }
    }

    output
}
