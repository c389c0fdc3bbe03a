//! Logging module for the operator log
//!
//! This module replaces per-context global loggers with explicit services:
//!
//! - `LogRing`: bounded, oldest-first buffer of log entries
//! - `LogSink`: the persisted ring fed from the bus log stream
//! - `BusLogLayer`: a tracing layer that publishes events onto the bus

mod layer;
mod ring;
mod sink;

pub use layer::BusLogLayer;
pub use ring::{LogRing, DEFAULT_LOG_CAPACITY};
pub use sink::LogSink;
