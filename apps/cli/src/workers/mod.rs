pub mod progress_sink;
