//! Observability module providing structured logging.
//!
//! This module initializes and configures structured logging with
//! configurable formats (pretty, compact, JSON).

mod tracing_init;

pub use tracing_init::*;
