//! Engine façade, options, and client sessions.

/// Event batching in front of the engine.
pub mod buffer;
mod config;
mod core;

#[cfg(test)]
mod tests;

pub use buffer::{BufferLimits, BufferStatus, ClientSession, EventBuffer, EventSink};
pub use config::{EngineOptions, Synchronous};
pub use core::{Database, QueryResult};
pub(crate) use core::Inner;
