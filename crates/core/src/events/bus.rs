use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::time::Instant;
use tracing::trace;
use uuid::Uuid;

use crate::{
    events::{BusConfig, EnrichedEvent, Event},
    routes::Routes,
};

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

pub struct EventBusInner {
    session_id: Uuid,
    next_ingest_seq: AtomicU64,
    routes: Routes,
    unrouted_total: AtomicU64,
}

impl EventBus {
    pub fn new(cfg: BusConfig, routes: Routes) -> Self {
        Self {
            inner: Arc::new(EventBusInner {
                session_id: cfg.session_id,
                next_ingest_seq: AtomicU64::new(0),
                routes,
                unrouted_total: AtomicU64::new(0),
            }),
        }
    }

    /// Fans `event` out to every subscriber of its type. Never blocks: a full
    /// inbox drops its oldest entry.
    pub fn publish(&self, event: Arc<dyn Event>) {
        let ingest_seq = self.inner.next_ingest_seq.fetch_add(1, Ordering::Relaxed);

        let enriched_event = Arc::new(EnrichedEvent {
            event,
            session_id: self.inner.session_id,
            ingest_seq,
            ingested_at: Instant::now(),
        });

        let event_type = enriched_event.event.event_type();
        let Some(routes) = self.inner.routes.table.get(event_type) else {
            self.inner.unrouted_total.fetch_add(1, Ordering::Relaxed);
            trace!(event_type, "event has no subscribers");
            return;
        };

        for route in routes {
            route.deliver(Arc::clone(&enriched_event));
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    pub fn unrouted_total(&self) -> u64 {
        self.inner.unrouted_total.load(Ordering::Relaxed)
    }

    /// Events dropped from `subscriber_id`'s inboxes because they overflowed.
    pub fn drops_for(&self, subscriber_id: &str) -> u64 {
        self.inner
            .routes
            .table
            .values()
            .flatten()
            .filter(|route| route.subscriber_id == subscriber_id)
            .map(|route| route.drops_total.load(Ordering::Relaxed))
            .sum()
    }
}
