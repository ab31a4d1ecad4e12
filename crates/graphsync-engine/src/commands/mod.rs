//! Orchestration commands on a `DomainContext`
//!
//! Each command coordinates the container with a `RemoteExecutor` and logs
//! one start and one end (or end_error) event.

pub mod load;
pub mod submit;
