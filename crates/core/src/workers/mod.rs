pub mod event_log;
pub mod wiring;
pub mod worker;
pub mod worker_inputs;

pub use event_log::*;
pub use wiring::*;
pub use worker::*;
pub use worker_inputs::*;
