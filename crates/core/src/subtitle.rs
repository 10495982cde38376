//! Paragraph-level subtitle cues and SRT output.

use std::path::Path;

use crate::{format::format_srt_timestamp, types::SubtitleCue};

/// Paragraphs separated by blank lines, with their lines trimmed.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }

    paragraphs
}

/// Spreads `total_duration` evenly across paragraphs.
///
/// Cues are contiguous, start at zero and the last one ends exactly at
/// `total_duration`.
pub fn build_cues(text: &str, total_duration: f64) -> Vec<SubtitleCue> {
    let paragraphs = split_paragraphs(text);
    if paragraphs.is_empty() {
        return Vec::new();
    }

    let total = if total_duration.is_finite() {
        total_duration.max(0.0)
    } else {
        0.0
    };
    let count = paragraphs.len();
    let per_cue = total / count as f64;

    paragraphs
        .into_iter()
        .enumerate()
        .map(|(i, text)| SubtitleCue {
            start_seconds: i as f64 * per_cue,
            end_seconds: if i + 1 == count {
                total
            } else {
                (i + 1) as f64 * per_cue
            },
            text,
        })
        .collect()
}

/// Every block, the last included, ends with a blank line.
pub fn render_srt(cues: &[SubtitleCue]) -> String {
    cues.iter()
        .enumerate()
        .map(|(i, cue)| {
            format!(
                "{}\n{} --> {}\n{}\n\n",
                i + 1,
                format_srt_timestamp(cue.start_seconds),
                format_srt_timestamp(cue.end_seconds),
                cue.text
            )
        })
        .collect()
}

pub async fn write_srt(path: &Path, cues: &[SubtitleCue]) -> std::io::Result<()> {
    tokio::fs::write(path, render_srt(cues)).await
}
