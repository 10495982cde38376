//! Filter graph construction for the encoder.
//!
//! A value inside `-filter_complex` is unescaped twice: first by the graph
//! parser, then by the option parser of its filter. drawtext unescapes its
//! text once more while expanding `%{...}`. Each level is escaped on its own,
//! innermost first.

use std::path::Path;

/// One line of on-screen text and the window it is visible in.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySegment {
    pub text: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
}

/// Non-empty trimmed lines of `body`, each shown for an equal share of
/// `duration`.
pub fn overlay_segments(body: &str, duration: f64) -> Vec<OverlaySegment> {
    let lines: Vec<&str> = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let total = duration.max(0.0);
    let per_line = total / lines.len() as f64;
    let last = lines.len() - 1;

    lines
        .into_iter()
        .enumerate()
        .map(|(i, text)| OverlaySegment {
            text: text.to_string(),
            start_seconds: i as f64 * per_line,
            end_seconds: if i == last {
                total
            } else {
                (i + 1) as f64 * per_line
            },
        })
        .collect()
}

/// drawtext text expansion.
const EXPANSION_SPECIAL: &[char] = &['%', '(', ')'];
/// `key=value:key=value` option lists.
const OPTION_SPECIAL: &[char] = &['\'', ':'];
/// Filter chains and link labels.
const GRAPH_SPECIAL: &[char] = &['\'', '[', ']', ',', ';'];

/// One level of backslash escaping. Backslash itself is always escaped.
fn escape_level(value: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        if c == '\\' || special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Escapes a value for a filter option inside `-filter_complex`.
fn escape_option_value(value: &str) -> String {
    escape_level(&escape_level(value, OPTION_SPECIAL), GRAPH_SPECIAL)
}

/// Escapes overlay text for drawtext's `text=` option. Line breaks become
/// spaces.
pub fn escape_filter_text(text: &str) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    escape_option_value(&escape_level(&flat, EXPANSION_SPECIAL))
}

pub fn escape_filter_path(path: &Path) -> String {
    escape_option_value(&path.to_string_lossy())
}

#[derive(Debug, Clone)]
pub struct FilterParams<'a> {
    pub width: u32,
    pub height: u32,
    pub segments: &'a [OverlaySegment],
    pub font_size: u32,
    pub font_color: &'a str,
    pub font_path: Option<&'a Path>,
    /// Distance of the text baseline area from the bottom edge.
    pub bottom_margin: u32,
    /// Subtitle file to burn in.
    pub subtitles: Option<&'a Path>,
}

/// Label carrying the finished video stream.
pub const VIDEO_OUTPUT_LABEL: &str = "[v]";

pub fn build_filter_graph(params: &FilterParams<'_>) -> String {
    let mut graph = format!(
        "[0:v]scale={}:{},setsar=1",
        params.width, params.height
    );

    for segment in params.segments {
        graph.push_str(",drawtext=text=");
        graph.push_str(&escape_filter_text(&segment.text));
        graph.push_str(&format!(
            ":fontsize={}:fontcolor={}",
            params.font_size, params.font_color
        ));
        if let Some(font) = params.font_path {
            graph.push_str(":fontfile=");
            graph.push_str(&escape_filter_path(font));
        }
        graph.push_str(&format!(
            ":x=(w-text_w)/2:y=h-{}:enable='between(t,{:.3},{:.3})'",
            params.bottom_margin, segment.start_seconds, segment.end_seconds
        ));
    }

    if let Some(subtitles) = params.subtitles {
        graph.push_str(",subtitles=");
        graph.push_str(&escape_filter_path(subtitles));
    }

    graph.push_str(VIDEO_OUTPUT_LABEL);
    graph
}
