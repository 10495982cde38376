//! Coursecast Core Library
//!
//! Turns lesson scripts into narrated course videos: text chunking, speech
//! synthesis through pluggable providers, procedural backgrounds, subtitles
//! and the ffmpeg invocation that muxes everything into one file per lesson.

pub mod assembler;
pub mod background;
pub mod cancel;
pub mod chunker;
pub mod config;
pub mod error;
pub mod events;
pub mod format;
pub mod manifest;
pub mod narration;
pub mod palette;
pub mod pipeline;
pub mod process;
pub mod provider;
pub mod queues;
pub mod routes;
pub mod subtitle;
pub mod types;
pub mod workers;
pub mod workspace;

// Re-export commonly used items at crate root
pub use assembler::{AssemblyRequest, EncoderConfig, SubtitleMode, VideoAssembler};
pub use background::{BackgroundGenerator, BackgroundSpec};
pub use cancel::{CancelHandle, CancelToken, cancel_pair};
pub use chunker::split_text;
pub use config::{PipelineConfig, ProviderSettings};
pub use error::{CourseError, EncoderFailure, Result, StageError};
pub use format::{format_course_report, format_hms, format_srt_timestamp};
pub use narration::{NarrationSynthesizer, SynthesisSettings};
pub use palette::{ColorPalette, PaletteCatalog};
pub use pipeline::LessonPipeline;
pub use provider::{ProviderError, ProviderKind, SpeechProvider, SpeechRequest, SynthesizedAudio};
pub use subtitle::build_cues;
pub use types::{
    AudioSegment, Course, CourseResult, Lesson, LessonAssemblyResult, LessonStatus,
    NarrationTrack, Pattern, ProcessingOptions, Quality, Stage, SubtitleCue, TextChunk,
    VoiceOptions,
};
