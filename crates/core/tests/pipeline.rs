#![cfg(unix)]

mod common;

use std::{path::Path, sync::Arc};

use common::{FAILING_ENCODER, FAKE_ENCODER, ScriptedProvider, write_script};
use coursecast_core::{
    CancelToken, Course, Lesson, LessonPipeline, LessonStatus, PaletteCatalog, PipelineConfig,
    Stage, cancel_pair,
    events::{
        ALL_EVENT_TYPES, BusConfig, EventBusBuilder, LessonCompleted, LessonFailed,
        LessonStarted, StageFinished, downcast_ref,
    },
    manifest::read_manifest,
    workers::SubscriptionSpec,
    workspace,
};

fn lesson(id: &str, body: &str) -> Lesson {
    Lesson {
        id: id.to_string(),
        title: format!("Lesson {id}"),
        body: body.to_string(),
    }
}

fn config(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig {
        work_dir: root.join("work"),
        output_dir: root.join("out"),
        chunk_size: 40,
        retry_backoff_ms: 1,
        ..Default::default()
    };
    config.encoder.program = write_script(root, "ffmpeg", FAKE_ENCODER);
    config.encoder.width = 64;
    config.encoder.height = 36;
    config
}

fn pipeline(config: PipelineConfig, provider: ScriptedProvider) -> LessonPipeline {
    LessonPipeline::new(config, Arc::new(provider), Arc::new(PaletteCatalog::standard())).unwrap()
}

fn lesson_dirs(config: &PipelineConfig, course_id: &str) -> usize {
    std::fs::read_dir(workspace::course_dir(&config.work_dir, course_id))
        .map(|entries| entries.count())
        .unwrap_or(0)
}

#[tokio::test]
async fn single_lesson_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let pipeline = pipeline(config.clone(), ScriptedProvider::new(2.0));

    let result = pipeline
        .run_lesson("course", &lesson("hello", "Hello world."), &CancelToken::never())
        .await;

    assert_eq!(result.status, LessonStatus::Completed, "{:?}", result.error);
    assert_eq!(result.duration_seconds, Some(2.0));
    let video = result.video_path.unwrap();
    assert_eq!(video, workspace::video_path(&config.output_dir, "hello"));

    // The fake encoder records its arguments in place of a video.
    let args = std::fs::read_to_string(&video).unwrap();
    let args: Vec<&str> = args.lines().collect();
    let t = args.iter().position(|a| *a == "-t").unwrap();
    assert_eq!(args[t + 1], "2.000");
    assert_eq!(lesson_dirs(&config, "course"), 0);
}

#[tokio::test]
async fn failing_lesson_does_not_stop_the_course() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let pipeline = Arc::new(pipeline(
        config.clone(),
        ScriptedProvider::new(1.0).failing_on("EXPLODE", false),
    ));

    let course = Course {
        id: "course-7".to_string(),
        title: "Seven".to_string(),
        lessons: vec![
            lesson("one", "First lesson has a single short paragraph."),
            lesson(
                "two",
                "This lesson is long enough to be split.\n\nIts second chunk will EXPLODE.",
            ),
            lesson("three", "Third.\n\nWith two paragraphs and more than forty characters."),
        ],
    };

    let result = pipeline.run_course(&course, &CancelToken::never()).await;

    let statuses: Vec<_> = result.lessons.iter().map(|l| l.status).collect();
    assert_eq!(
        statuses,
        [LessonStatus::Completed, LessonStatus::Failed, LessonStatus::Completed]
    );
    assert!(!result.is_success());

    let failed = &result.lessons[1];
    assert_eq!(failed.failed_stage, Some(Stage::Narration));
    assert!(failed.error.as_deref().unwrap().contains("Chunk"));
    assert!(failed.video_path.is_none());

    for lesson in [&result.lessons[0], &result.lessons[2]] {
        assert!(lesson.video_path.as_ref().unwrap().exists());
    }
    assert!(!workspace::video_path(&config.output_dir, "two").exists());
    assert_eq!(lesson_dirs(&config, "course-7"), 0);

    let manifest = read_manifest(&workspace::manifest_path(&config.output_dir))
        .await
        .unwrap();
    assert_eq!(manifest.course_id, "course-7");
    assert_eq!((manifest.completed, manifest.failed, manifest.pending), (2, 1, 0));
    assert_eq!(manifest.lessons[1].status, "failed");
    assert_eq!(manifest.lessons[1].failed_stage.as_deref(), Some("narration"));
    assert_eq!(manifest.total_duration_seconds, result.total_duration_seconds());
}

#[tokio::test]
async fn exhausted_retries_fail_only_that_lesson() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let provider = Arc::new(ScriptedProvider::new(1.0).failing_on("UNAVAILABLE", true));
    let pipeline = Arc::new(
        LessonPipeline::new(
            config.clone(),
            provider.clone(),
            Arc::new(PaletteCatalog::standard()),
        )
        .unwrap(),
    );

    let course = Course {
        id: "course-retry".to_string(),
        title: "Retries".to_string(),
        lessons: vec![
            lesson("one", "First lesson has a single short paragraph."),
            lesson(
                "two",
                "This lesson is long enough to be split.\n\nIts second chunk stays UNAVAILABLE.",
            ),
            lesson("three", "Third.\n\nWith two paragraphs and more than forty characters."),
        ],
    };

    let result = pipeline.run_course(&course, &CancelToken::never()).await;

    let statuses: Vec<_> = result.lessons.iter().map(|l| l.status).collect();
    assert_eq!(
        statuses,
        [LessonStatus::Completed, LessonStatus::Failed, LessonStatus::Completed]
    );

    let failed = &result.lessons[1];
    assert_eq!(failed.failed_stage, Some(Stage::Narration));
    let error = failed.error.as_deref().unwrap();
    assert!(
        error.contains(&format!("after {} attempt(s)", config.max_attempts)),
        "{error}"
    );
    assert!(error.contains("(503)"), "{error}");

    for lesson in [&result.lessons[0], &result.lessons[2]] {
        let video = lesson.video_path.as_ref().unwrap();
        let args = std::fs::read_to_string(video).unwrap();
        assert!(args.lines().any(|a| a == "-filter_complex"));
    }
    assert!(provider.calls() >= config.max_attempts as usize + 2);
}

#[tokio::test]
async fn similar_ids_get_distinct_videos() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let pipeline = Arc::new(pipeline(config.clone(), ScriptedProvider::new(1.0)));

    let course = Course {
        id: "naming".to_string(),
        title: String::new(),
        lessons: vec![lesson("intro 1", "Spaced."), lesson("intro_1", "Underscored.")],
    };

    let result = pipeline.run_course(&course, &CancelToken::never()).await;

    assert!(result.is_success());
    let first = result.lessons[0].video_path.clone().unwrap();
    let second = result.lessons[1].video_path.clone().unwrap();
    assert_ne!(first, second);
    // Each video still holds its own encoder run.
    let first_args = std::fs::read_to_string(&first).unwrap();
    let second_args = std::fs::read_to_string(&second).unwrap();
    assert_eq!(first_args.lines().last(), first.to_str());
    assert_eq!(second_args.lines().last(), second.to_str());
}

#[tokio::test]
async fn encoder_diagnostics_reach_result_and_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.encoder.program = write_script(dir.path(), "broken-ffmpeg", FAILING_ENCODER);
    let pipeline = Arc::new(pipeline(config.clone(), ScriptedProvider::new(1.0)));

    let course = Course {
        id: "broken".to_string(),
        title: String::new(),
        lessons: vec![lesson("only", "One short paragraph.")],
    };

    let result = pipeline.run_course(&course, &CancelToken::never()).await;

    let failed = &result.lessons[0];
    assert_eq!(failed.status, LessonStatus::Failed);
    assert_eq!(failed.failed_stage, Some(Stage::Assembly));
    assert!(failed.diagnostics.as_deref().unwrap().contains("boom"));

    let manifest = read_manifest(&workspace::manifest_path(&config.output_dir))
        .await
        .unwrap();
    let recorded = manifest.lessons[0].diagnostics.as_deref().unwrap();
    assert!(recorded.contains("Invalid filtergraph: boom"));
}

#[tokio::test]
async fn cancelled_course_leaves_lessons_pending() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let provider = ScriptedProvider::new(1.0);
    let pipeline = Arc::new(pipeline(config.clone(), provider));

    let course = Course {
        id: "cancelled".to_string(),
        title: String::new(),
        lessons: vec![lesson("a", "Alpha."), lesson("b", "Beta.")],
    };
    let (handle, cancel) = cancel_pair();
    handle.cancel();

    let result = pipeline.run_course(&course, &cancel).await;

    assert_eq!(result.count(LessonStatus::Pending), 2);
    assert!(!workspace::video_path(&config.output_dir, "a").exists());
    let manifest = read_manifest(&workspace::manifest_path(&config.output_dir))
        .await
        .unwrap();
    assert_eq!(manifest.pending, 2);
}

#[tokio::test]
async fn blank_lesson_fails_at_chunking() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(config(dir.path()), ScriptedProvider::new(1.0));

    let result = pipeline
        .run_lesson("course", &lesson("blank", "  \n\n "), &CancelToken::never())
        .await;

    assert_eq!(result.status, LessonStatus::Failed);
    assert_eq!(result.failed_stage, Some(Stage::Chunking));
}

#[tokio::test]
async fn progress_events_describe_each_lesson() {
    let dir = tempfile::tempdir().unwrap();
    let (bus, mut wiring) = EventBusBuilder::new(BusConfig::default())
        .subscribe(SubscriptionSpec::to_all("test.observer", ALL_EVENT_TYPES, 64))
        .build()
        .unwrap();
    let pipeline = Arc::new(
        pipeline(
            config(dir.path()),
            ScriptedProvider::new(1.0).failing_on("EXPLODE", false),
        )
        .with_event_bus(bus),
    );
    let course = Course {
        id: "observed".to_string(),
        title: String::new(),
        lessons: vec![lesson("ok", "Fine."), lesson("bad", "EXPLODE")],
    };

    pipeline.run_course(&course, &CancelToken::never()).await;

    let mut inputs = wiring.take("test.observer").unwrap();
    // Inboxes are per event type; restore publish order.
    let mut events: Vec<_> = std::iter::from_fn(|| inputs.try_next()).collect();
    events.sort_by_key(|e| e.ingest_seq);

    let started: Vec<_> = events
        .iter()
        .filter_map(|e| downcast_ref::<LessonStarted>(&e.event))
        .collect();
    assert_eq!(started.len(), 2);

    let ok_started = started.iter().find(|e| e.lesson_id == "ok").unwrap();
    let ok_stages: Vec<_> = events
        .iter()
        .filter_map(|e| downcast_ref::<StageFinished>(&e.event))
        .filter(|e| e.lesson_id == "ok")
        .map(|e| {
            assert_eq!(e.header.parent_ids, [ok_started.header.event_id]);
            e.stage
        })
        .collect();
    for stage in [
        Stage::Chunking,
        Stage::Narration,
        Stage::Background,
        Stage::Subtitles,
        Stage::Assembly,
    ] {
        assert!(ok_stages.contains(&stage), "missing {stage}");
    }

    let completed: Vec<_> = events
        .iter()
        .filter_map(|e| downcast_ref::<LessonCompleted>(&e.event))
        .map(|e| e.lesson_id.as_str())
        .collect();
    assert_eq!(completed, ["ok"]);

    let failed: Vec<_> = events
        .iter()
        .filter_map(|e| downcast_ref::<LessonFailed>(&e.event))
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].lesson_id, "bad");
    assert_eq!(failed[0].stage, Stage::Narration);

    let last = events.last().unwrap();
    assert_eq!(last.event.event_type(), "course.finished");
    assert_eq!(last.ingest_seq as usize, events.len() - 1);
}
