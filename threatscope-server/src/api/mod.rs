//! HTTP API handlers

pub mod health;
pub mod runs;
pub mod stream;

pub use health::health_check;
pub use runs::{delete_run, get_run, get_run_compact, list_runs};
pub use stream::stream_run;
