//! graphsync engine - orchestration layer
//!
//! Wraps an `EntityContainer` in a [`DomainContext`] that drives the submit
//! pipeline and query loading against a `RemoteExecutor`.

pub mod commands;
pub mod config;
pub mod context;

pub use commands::load::LoadResult;
pub use commands::submit::PendingSubmit;
pub use config::ContextConfig;
pub use context::DomainContext;
