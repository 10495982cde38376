use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::warn;

use crate::{events::EnrichedEvent, workers::{SubscriptionSpec, WorkerInputs}};

pub trait Worker: Send + Sized + 'static {
    const SUBSCRIBER_ID: &'static str;

    fn subscription() -> SubscriptionSpec;

    fn handle(&mut self, event: Arc<EnrichedEvent>) -> impl Future<Output = Result<()>> + Send;

    /// Consumes events until shutdown, then drains whatever is still queued.
    fn run(
        mut self,
        mut inputs: WorkerInputs,
        mut shutdown: broadcast::Receiver<()>,
    ) -> impl Future<Output = Result<()>> + Send {
        async move {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    event = inputs.next() => {
                        if let Err(e) = self.handle(event).await {
                            warn!(subscriber = Self::SUBSCRIBER_ID, error = %e, "worker failed to handle event");
                        }
                    }
                }
            }

            while let Some(event) = inputs.try_next() {
                if let Err(e) = self.handle(event).await {
                    warn!(subscriber = Self::SUBSCRIBER_ID, error = %e, "worker failed to handle event");
                }
            }
            Ok(())
        }
    }
}
