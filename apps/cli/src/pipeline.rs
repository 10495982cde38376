use anyhow::Context;
use coursecast_core::{
    events::{BusConfig, EventBus, EventBusBuilder},
    workers::{EventLogWorker, Worker},
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::warn;

use crate::workers::progress_sink::ProgressSinkWorker;

pub struct PipelineHandle {
    pub bus: EventBus,
    pub shutdown_tx: broadcast::Sender<()>,
    workers: Vec<JoinHandle<anyhow::Result<()>>>,
}

impl PipelineHandle {
    /// Signals every worker and waits for them to drain their inboxes.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        for worker in self.workers {
            match worker.await {
                Ok(Err(e)) => warn!(error = %e, "worker exited with error"),
                Err(e) => warn!(error = %e, "worker task panicked"),
                Ok(Ok(())) => {}
            }
        }
    }
}

pub fn start_workers(
    bus_config: BusConfig,
    progress: ProgressSinkWorker,
    event_log: Option<EventLogWorker>,
) -> anyhow::Result<PipelineHandle> {
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

    let mut builder =
        EventBusBuilder::new(bus_config).subscribe(ProgressSinkWorker::subscription());
    if event_log.is_some() {
        builder = builder.subscribe(EventLogWorker::subscription());
    }
    let (bus, mut wiring) = builder.build()?;

    let mut workers = Vec::new();
    workers.push(tokio::spawn(progress.run(
        wiring
            .take(ProgressSinkWorker::SUBSCRIBER_ID)
            .context("progress sink is not wired")?,
        shutdown_rx.resubscribe(),
    )));
    if let Some(event_log) = event_log {
        workers.push(tokio::spawn(event_log.run(
            wiring
                .take(EventLogWorker::SUBSCRIBER_ID)
                .context("event log is not wired")?,
            shutdown_rx.resubscribe(),
        )));
    }

    Ok(PipelineHandle {
        bus,
        shutdown_tx,
        workers,
    })
}
