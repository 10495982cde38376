use std::{path::PathBuf, sync::Arc, time::UNIX_EPOCH};

use anyhow::Context;
use serde::Serialize;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};
use uuid::Uuid;

use crate::{
    events::{ALL_EVENT_TYPES, EnrichedEvent, Event},
    workers::{SubscriptionSpec, Worker},
};

#[derive(Serialize)]
struct LogLine<'a> {
    seq: u64,
    session_id: Uuid,
    event_type: &'static str,
    event_id: Uuid,
    parent_ids: &'a [Uuid],
    timestamp_ms: u128,
    event: &'a dyn Event,
}

/// Appends every pipeline event to a JSON-lines file.
pub struct EventLogWorker {
    path: PathBuf,
}

impl EventLogWorker {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Worker for EventLogWorker {
    const SUBSCRIBER_ID: &'static str = "event.log";

    fn subscription() -> SubscriptionSpec {
        SubscriptionSpec::to_all(Self::SUBSCRIBER_ID, ALL_EVENT_TYPES, 256)
    }

    async fn handle(&mut self, event: Arc<EnrichedEvent>) -> anyhow::Result<()> {
        let inner = event.event.as_ref();
        let line = LogLine {
            seq: event.ingest_seq,
            session_id: event.session_id,
            event_type: inner.event_type(),
            event_id: inner.event_id(),
            parent_ids: inner.parent_ids(),
            timestamp_ms: inner
                .timestamp()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default(),
            event: inner,
        };
        let mut json = serde_json::to_vec(&line)?;
        json.push(b'\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening event log {}", self.path.display()))?;
        file.write_all(&json).await?;
        file.flush().await?;
        Ok(())
    }
}
