use std::{collections::HashMap, sync::Arc, time::Duration};

use console::style;
use coursecast_core::{
    events::{
        ALL_EVENT_TYPES, CourseFinished, EnrichedEvent, LessonCompleted, LessonFailed,
        LessonStarted, StageFinished, downcast_ref,
    },
    format::{format_elapsed, format_hms},
    workers::{SubscriptionSpec, Worker},
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::time::Instant;

/// Renders pipeline events as terminal progress.
pub struct ProgressSinkWorker {
    multi: MultiProgress,
    overall: ProgressBar,
    spinner_style: ProgressStyle,
    lessons: HashMap<String, (ProgressBar, Instant, String)>,
}

impl ProgressSinkWorker {
    pub fn new(total_lessons: usize) -> anyhow::Result<Self> {
        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::new(total_lessons as u64));
        overall.set_style(
            ProgressStyle::default_bar()
                .template("{bar:30.cyan/blue} {pos}/{len} lessons {msg}")?
                .progress_chars("█▓░"),
        );

        let spinner_style = ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")?;

        Ok(Self {
            multi,
            overall,
            spinner_style,
            lessons: HashMap::new(),
        })
    }

    fn lesson_started(&mut self, event: &LessonStarted) {
        let pb = self.multi.insert_before(&self.overall, ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(format!("{} {}", event.title, style("chunking…").dim()));
        pb.enable_steady_tick(Duration::from_millis(80));
        self.lessons
            .insert(event.lesson_id.clone(), (pb, Instant::now(), event.title.clone()));
    }

    fn stage_finished(&mut self, event: &StageFinished) {
        if let Some((pb, _, title)) = self.lessons.get(&event.lesson_id) {
            pb.set_message(format!(
                "{} {}",
                title,
                style(format!("{} done", event.stage)).dim()
            ));
        }
    }

    fn lesson_completed(&mut self, event: &LessonCompleted) {
        if let Some((pb, started, title)) = self.lessons.remove(&event.lesson_id) {
            pb.finish_with_message(format!(
                "{} {} {} {}",
                style("✓").green().bold(),
                title,
                style(format_hms(event.duration_seconds)).yellow(),
                style(format!("[{}]", format_elapsed(started.elapsed()))).dim()
            ));
        }
        self.overall.inc(1);
    }

    fn lesson_failed(&mut self, event: &LessonFailed) {
        if let Some((pb, _, title)) = self.lessons.remove(&event.lesson_id) {
            pb.finish_with_message(format!(
                "{} {} {}",
                style("✗").red().bold(),
                title,
                style(&event.message).red()
            ));
        }
        self.overall.inc(1);
    }

    fn course_finished(&mut self, event: &CourseFinished) {
        for (_, (pb, _, title)) in self.lessons.drain() {
            pb.abandon_with_message(format!("{} {}", style("·").dim(), title));
        }
        self.overall.finish_with_message(format!(
            "{} completed, {} failed, {} pending",
            style(event.completed).green(),
            style(event.failed).red(),
            style(event.pending).dim()
        ));
    }
}

impl Worker for ProgressSinkWorker {
    const SUBSCRIBER_ID: &'static str = "cli.progress_sink";

    fn subscription() -> SubscriptionSpec {
        SubscriptionSpec::to_all(Self::SUBSCRIBER_ID, ALL_EVENT_TYPES, 128)
    }

    async fn handle(&mut self, event: Arc<EnrichedEvent>) -> anyhow::Result<()> {
        let event = &event.event;
        if let Some(e) = downcast_ref::<LessonStarted>(event) {
            self.lesson_started(e);
        } else if let Some(e) = downcast_ref::<StageFinished>(event) {
            self.stage_finished(e);
        } else if let Some(e) = downcast_ref::<LessonCompleted>(event) {
            self.lesson_completed(e);
        } else if let Some(e) = downcast_ref::<LessonFailed>(event) {
            self.lesson_failed(e);
        } else if let Some(e) = downcast_ref::<CourseFinished>(event) {
            self.course_finished(e);
        }
        Ok(())
    }
}
