//! Process startup: logging and shutdown handling

pub mod logging;
pub mod shutdown;

pub use logging::{LoggingConfig, LoggingGuard, init_logging};
pub use shutdown::{ShutdownSignal, spawn_signal_handler};
