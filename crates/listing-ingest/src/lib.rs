pub mod config;
pub mod error;
pub mod sinks;
pub mod telemetry;
pub mod workflows;
