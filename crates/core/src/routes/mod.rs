use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{events::EnrichedEvent, queues::FifoDropOldestQueue};

pub struct Routes {
    pub table: HashMap<&'static str, Vec<Route>>,
}

pub struct Route {
    pub subscriber_id: &'static str,
    pub inbox: Arc<FifoDropOldestQueue<Arc<EnrichedEvent>>>,
    pub drops_total: Arc<AtomicU64>,
}

impl Route {
    pub fn deliver(&self, event: Arc<EnrichedEvent>) {
        if self.inbox.push_overwrite(event) {
            self.drops_total.fetch_add(1, Ordering::Relaxed);
        }
    }
}
