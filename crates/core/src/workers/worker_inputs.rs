use std::sync::Arc;

use tokio::sync::Notify;

use crate::{events::EnrichedEvent, queues::FifoDropOldestReceiver};

pub struct FifoInput {
    pub event_type: &'static str,
    pub receiver: FifoDropOldestReceiver<Arc<EnrichedEvent>>,
}

/// All inboxes of one subscriber, drained round-robin.
pub struct WorkerInputs {
    fifos: Vec<FifoInput>,
    notify_any: Arc<Notify>,
    fifo_index: usize,
}

impl WorkerInputs {
    pub fn new(fifos: Vec<FifoInput>, notify_any: Arc<Notify>) -> Self {
        Self {
            fifos,
            notify_any,
            fifo_index: 0,
        }
    }

    pub fn try_next(&mut self) -> Option<Arc<EnrichedEvent>> {
        if self.fifos.is_empty() {
            return None;
        }

        let start = self.fifo_index;
        loop {
            let i = self.fifo_index;
            self.fifo_index = (self.fifo_index + 1) % self.fifos.len();

            if let Some(e) = self.fifos[i].receiver.try_recv() {
                return Some(e);
            }
            if self.fifo_index == start {
                return None;
            }
        }
    }

    pub async fn next(&mut self) -> Arc<EnrichedEvent> {
        loop {
            if let Some(e) = self.try_next() {
                return e;
            }
            self.notify_any.notified().await;
        }
    }
}
