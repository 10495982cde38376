use std::collections::HashMap;

use crate::workers::WorkerInputs;

pub struct SubscriptionSpec {
    pub subscriber_id: &'static str,
    pub inputs: Vec<InputSpec>,
}

pub struct InputSpec {
    pub event_type: &'static str,
    pub capacity: usize,
}

impl SubscriptionSpec {
    /// Same inbox capacity for every listed event type.
    pub fn to_all(subscriber_id: &'static str, event_types: &[&'static str], capacity: usize) -> Self {
        Self {
            subscriber_id,
            inputs: event_types
                .iter()
                .map(|&event_type| InputSpec {
                    event_type,
                    capacity,
                })
                .collect(),
        }
    }
}

pub struct WorkerWiring {
    inputs: HashMap<&'static str, WorkerInputs>,
}

impl WorkerWiring {
    pub fn new(inputs: HashMap<&'static str, WorkerInputs>) -> Self {
        Self { inputs }
    }

    pub fn take(&mut self, subscriber_id: &'static str) -> Option<WorkerInputs> {
        self.inputs.remove(subscriber_id)
    }
}
