//! Lesson and course orchestration.
//!
//! A lesson runs chunking, narration, then background and subtitles side by
//! side, then assembly. Lessons of a course run on a bounded worker pool and
//! fail independently.

use std::{
    path::PathBuf,
    sync::Arc,
    time::Instant,
};

use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::{
    assembler::{AssemblyRequest, VideoAssembler},
    background::BackgroundGenerator,
    cancel::CancelToken,
    chunker,
    config::PipelineConfig,
    error::{CourseError, Result, StageError},
    events::{
        CourseFinished, Event, EventBus, LessonCompleted, LessonFailed, LessonStarted,
        StageFinished,
    },
    manifest,
    narration::NarrationSynthesizer,
    palette::PaletteCatalog,
    provider::SpeechProvider,
    subtitle,
    types::{Course, CourseResult, Lesson, LessonAssemblyResult, LessonStatus, ProcessingOptions, Stage},
    workspace::{self, LessonWorkspace},
};

fn at(stage: Stage) -> impl Fn(CourseError) -> StageError {
    move |source| StageError::new(stage, source)
}

pub struct LessonPipeline {
    config: PipelineConfig,
    options: ProcessingOptions,
    synthesizer: NarrationSynthesizer,
    background: BackgroundGenerator,
    assembler: VideoAssembler,
    bus: Option<EventBus>,
}

impl LessonPipeline {
    /// Validates `config` and wires the stage components.
    pub fn new(
        config: PipelineConfig,
        provider: Arc<dyn SpeechProvider>,
        catalog: Arc<PaletteCatalog>,
    ) -> Result<Self> {
        config.validate()?;
        let options = config.processing_options()?;
        let synthesizer = NarrationSynthesizer::new(provider, config.synthesis_settings());
        let background =
            BackgroundGenerator::new(catalog, config.encoder.width, config.encoder.height);
        let assembler = VideoAssembler::new(config.encoder.clone());

        Ok(Self {
            config,
            options,
            synthesizer,
            background,
            assembler,
            bus: None,
        })
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn assembler(&self) -> &VideoAssembler {
        &self.assembler
    }

    fn publish<E: Event>(&self, event: E) -> Uuid {
        let id = event.event_id();
        if let Some(bus) = &self.bus {
            bus.publish(Arc::new(event));
        }
        id
    }

    fn stage_done(&self, parent: Uuid, lesson_id: &str, stage: Stage, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        debug!(stage = stage.name(), elapsed_ms, "stage finished");
        self.publish(StageFinished::new(parent, lesson_id, stage, elapsed_ms));
    }

    /// Runs one lesson to a terminal state. Never panics on stage failure;
    /// the error is recorded in the returned result.
    pub async fn run_lesson(
        &self,
        course_id: &str,
        lesson: &Lesson,
        cancel: &CancelToken,
    ) -> LessonAssemblyResult {
        let span = info_span!("lesson", course = %course_id, lesson = %lesson.id);
        async move {
            let mut result = LessonAssemblyResult::new(lesson);
            result.start();
            let started = Instant::now();
            let parent = self.publish(LessonStarted::new(course_id, &lesson.id, &lesson.title));
            info!(title = %lesson.title, "lesson started");

            let outcome = match LessonWorkspace::create(&self.config.work_dir, course_id, &lesson.id).await {
                Ok(workspace) => {
                    let outcome = self.execute(lesson, &workspace, parent, cancel).await;
                    if !self.config.keep_intermediates {
                        if let Err(e) = workspace.remove().await {
                            warn!(dir = %workspace.root().display(), error = %e, "failed to remove lesson workspace");
                        }
                    }
                    outcome
                }
                Err(e) => Err(StageError::new(Stage::Prepare, CourseError::Io(e))),
            };

            match outcome {
                Ok((video_path, duration)) => {
                    info!(
                        video = %video_path.display(),
                        duration_seconds = duration,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "lesson completed"
                    );
                    self.publish(LessonCompleted::new(parent, &lesson.id, video_path.clone(), duration));
                    result.complete(video_path, duration);
                }
                Err(err) => {
                    error!(stage = err.stage.name(), error = %err.source, "lesson failed");
                    if let Some(diagnostics) = err.source.diagnostics().filter(|d| !d.is_empty()) {
                        debug!(%diagnostics, "tool output");
                    }
                    self.publish(LessonFailed::new(parent, &lesson.id, err.stage, err.to_string()));
                    result.fail(&err);
                }
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        lesson: &Lesson,
        workspace: &LessonWorkspace,
        parent: Uuid,
        cancel: &CancelToken,
    ) -> std::result::Result<(PathBuf, f64), StageError> {
        let started = Instant::now();
        if lesson.body.trim().is_empty() {
            return Err(StageError::new(Stage::Chunking, CourseError::EmptyLesson));
        }
        let chunks = chunker::split_text(&lesson.body, self.config.chunk_size);
        debug!(chunks = chunks.len(), "text chunked");
        self.stage_done(parent, &lesson.id, Stage::Chunking, started);

        ensure_live(Stage::Narration, cancel)?;
        let started = Instant::now();
        let narration = self
            .synthesizer
            .synthesize(&chunks, &self.options.voice_options(), workspace, cancel)
            .await
            .map_err(at(Stage::Narration))?;
        self.stage_done(parent, &lesson.id, Stage::Narration, started);

        ensure_live(Stage::Background, cancel)?;
        let started = Instant::now();
        let generator = self.background.clone();
        let text = lesson.body.clone();
        let options = self.options.clone();
        let background_path = workspace.background_path();
        let background_task =
            tokio::task::spawn_blocking(move || generator.generate(&text, &options, &background_path));
        let cues_task = async { subtitle::build_cues(&lesson.body, narration.duration_seconds) };

        let (background, cues) = tokio::join!(background_task, cues_task);
        self.stage_done(parent, &lesson.id, Stage::Subtitles, started);
        let background = background
            .map_err(|e| StageError::new(Stage::Background, CourseError::Task(e.to_string())))?
            .map_err(at(Stage::Background))?;
        self.stage_done(parent, &lesson.id, Stage::Background, started);

        ensure_live(Stage::Assembly, cancel)?;
        let started = Instant::now();
        let output_path = workspace::video_path(&self.config.output_dir, &lesson.id);
        let subtitle_path = workspace.subtitle_path();
        let request = AssemblyRequest {
            narration: &narration,
            background: &background,
            cues: &cues,
            body: &lesson.body,
            subtitle_path: &subtitle_path,
            output_path: &output_path,
            quality: self.options.quality,
        };
        let video = self
            .assembler
            .assemble(&request, cancel)
            .await
            .map_err(at(Stage::Assembly))?;
        self.stage_done(parent, &lesson.id, Stage::Assembly, started);

        Ok((video, narration.duration_seconds))
    }

    /// Runs every lesson of `course` on at most `lesson_workers` workers.
    ///
    /// One lesson failing never stops the others. Lessons that had not
    /// started when `cancel` fired stay `pending`.
    pub async fn run_course(self: &Arc<Self>, course: &Course, cancel: &CancelToken) -> CourseResult {
        let started = Instant::now();
        info!(
            course = %course.id,
            lessons = course.lessons.len(),
            workers = self.config.lesson_workers,
            provider = self.synthesizer.provider_name(),
            "course started"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.lesson_workers.max(1)));
        let mut tasks = JoinSet::new();

        for (index, lesson) in course.lessons.iter().cloned().enumerate() {
            let pipeline = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let course_id = course.id.clone();

            tasks.spawn(async move {
                let permit = tokio::select! {
                    permit = semaphore.acquire_owned() => permit.ok(),
                    _ = cancel.cancelled() => None,
                };
                let result = match permit {
                    Some(_permit) if !cancel.is_cancelled() => {
                        pipeline.run_lesson(&course_id, &lesson, &cancel).await
                    }
                    _ => LessonAssemblyResult::new(&lesson),
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<LessonAssemblyResult>> = vec![None; course.lessons.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => error!(error = %e, "lesson task aborted"),
            }
        }

        let lessons = slots
            .into_iter()
            .zip(&course.lessons)
            .map(|(slot, lesson)| {
                slot.unwrap_or_else(|| {
                    let mut result = LessonAssemblyResult::new(lesson);
                    result.start();
                    result.fail(&StageError::new(
                        Stage::Prepare,
                        CourseError::Task("lesson task aborted".to_string()),
                    ));
                    result
                })
            })
            .collect();

        let result = CourseResult {
            course_id: course.id.clone(),
            lessons,
        };

        let manifest = manifest::build_manifest(course, &result);
        let manifest_path = match manifest::write_manifest(&self.config.output_dir, &manifest).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "failed to write course manifest");
                None
            }
        };

        let completed = result.count(LessonStatus::Completed);
        let failed = result.count(LessonStatus::Failed);
        let pending = result.count(LessonStatus::Pending);
        info!(
            course = %course.id,
            completed,
            failed,
            pending,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "course finished"
        );
        self.publish(CourseFinished::new(&course.id, completed, failed, pending, manifest_path));

        result
    }
}

fn ensure_live(next: Stage, cancel: &CancelToken) -> std::result::Result<(), StageError> {
    if cancel.is_cancelled() {
        Err(StageError::new(next, CourseError::Cancelled))
    } else {
        Ok(())
    }
}
