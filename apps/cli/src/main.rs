use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use console::style;
use coursecast_core::{
    Course, Lesson, LessonPipeline, PaletteCatalog, PipelineConfig, ProviderKind, SubtitleMode,
    cancel_pair,
    events::BusConfig,
    format::{format_course_report, format_elapsed},
    provider::build_provider,
    workers::EventLogWorker,
    workspace,
};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::{pipeline::start_workers, workers::progress_sink::ProgressSinkWorker};

mod pipeline;
mod workers;

/// CLI wrapper for ProviderKind (needed for clap ValueEnum)
#[derive(Clone, Copy, ValueEnum)]
enum CliProvider {
    Bark,
    Speecht5,
    Openai,
    Command,
}

impl From<CliProvider> for ProviderKind {
    fn from(cli: CliProvider) -> Self {
        match cli {
            CliProvider::Bark => ProviderKind::Bark,
            CliProvider::Speecht5 => ProviderKind::SpeechT5,
            CliProvider::Openai => ProviderKind::OpenAi,
            CliProvider::Command => ProviderKind::Command,
        }
    }
}

#[derive(Parser)]
#[command(name = "coursecast")]
#[command(about = "Turn lesson scripts into narrated course videos")]
struct Cli {
    /// Course file: JSON with `id`, `title` and `lessons`, or a bare lesson array
    course: PathBuf,

    /// Pipeline configuration (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for finished videos and the course manifest
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for intermediate files
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Speech provider
    #[arg(short, long)]
    provider: Option<CliProvider>,

    /// Override the provider endpoint
    #[arg(long)]
    provider_url: Option<String>,

    /// Executable for the `command` provider (piper-compatible)
    #[arg(long)]
    tts_command: Option<PathBuf>,

    /// Voice identifier passed to the provider
    #[arg(long)]
    voice: Option<String>,

    /// Quality tier: standard or high
    #[arg(short, long)]
    quality: Option<String>,

    /// Background style: solid, gradient, geometric or noise
    #[arg(short, long)]
    style: Option<String>,

    /// Lessons processed concurrently
    #[arg(short, long)]
    workers: Option<usize>,

    /// Maximum characters per synthesis request
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Encoder executable
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Mux subtitles as a selectable track instead of burning them in
    #[arg(long)]
    soft_subtitles: bool,

    /// Keep per-lesson intermediate files
    #[arg(long)]
    keep_intermediates: bool,

    /// Verbose logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CourseFile {
    Course(Course),
    Lessons(Vec<Lesson>),
}

async fn load_course(path: &Path) -> Result<Course> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let parsed: CourseFile =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;

    Ok(match parsed {
        CourseFile::Course(course) => course,
        CourseFile::Lessons(lessons) => {
            let id = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "course".to_string());
            Course {
                title: id.clone(),
                id,
                lessons,
            }
        }
    })
}

fn apply_overrides(config: &mut PipelineConfig, cli: &Cli) {
    if let Some(output) = &cli.output {
        config.output_dir = output.clone();
    }
    if let Some(work_dir) = &cli.work_dir {
        config.work_dir = work_dir.clone();
    }
    if let Some(provider) = cli.provider {
        config.provider.kind = provider.into();
    }
    if let Some(url) = &cli.provider_url {
        config.provider.url = Some(url.clone());
    }
    if let Some(command) = &cli.tts_command {
        config.provider.command = Some(command.clone());
    }
    if let Some(voice) = &cli.voice {
        config.voice = Some(voice.clone());
    }
    if let Some(quality) = &cli.quality {
        config.quality = quality.clone();
    }
    if let Some(style) = &cli.style {
        config.background_style = Some(style.clone());
    }
    if let Some(workers) = cli.workers {
        config.lesson_workers = workers;
    }
    if let Some(chunk_size) = cli.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(ffmpeg) = &cli.ffmpeg {
        config.encoder.program = ffmpeg.clone();
    }
    if cli.soft_subtitles {
        config.encoder.subtitle_mode = SubtitleMode::Soft;
    }
    if cli.keep_intermediates {
        config.keep_intermediates = true;
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "coursecast=debug,coursecast_core=debug"
    } else {
        "warn"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{} {}", style("Error:").red().bold(), message);
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .await
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    apply_overrides(&mut config, &cli);

    // Validate settings and credentials before touching any lesson
    if let Err(e) = config.validate() {
        fail(e);
    }
    let provider = build_provider(&config.provider).unwrap_or_else(|e| fail(e));

    let course = load_course(&cli.course).await?;

    println!(
        "\n{}  {}\n",
        style("coursecast").cyan().bold(),
        style(&course.title).dim()
    );

    let event_log_path = workspace::course_dir(&config.work_dir, &course.id).join("events.jsonl");
    let progress = ProgressSinkWorker::new(course.lessons.len())?;
    let handle = start_workers(
        BusConfig {
            session_id: Uuid::new_v4(),
        },
        progress,
        Some(EventLogWorker::new(event_log_path)),
    )?;

    let pipeline = LessonPipeline::new(config, provider, Arc::new(PaletteCatalog::standard()))
        .unwrap_or_else(|e| fail(e))
        .with_event_bus(handle.bus.clone());
    if let Err(e) = pipeline.assembler().check_encoder().await {
        fail(e);
    }
    let pipeline = Arc::new(pipeline);

    let (cancel_handle, cancel) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} cancelling…", style("!").yellow().bold());
            cancel_handle.cancel();
        }
    });

    let total_start = Instant::now();
    let result = pipeline.run_course(&course, &cancel).await;
    handle.shutdown().await;

    println!(
        "\n{} {}\n",
        style("Total time:").dim(),
        style(format_elapsed(total_start.elapsed())).cyan().bold()
    );
    println!(
        "{} {}",
        style("Saved:").dim(),
        style(workspace::manifest_path(&pipeline.config().output_dir).display()).cyan()
    );
    println!("{}", style("─".repeat(60)).dim());
    println!("{}", format_course_report(&result));

    if !result.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
