//! Core types shared across graphsync facilities
//!
//! This crate provides foundational types used by the change-tracking core,
//! the orchestration engine and the logging facility:
//!
//! - **Correlation types**: RequestId, TraceId, SpanId, RequestContext
//! - **Schema constants**: Canonical field keys and event names

pub mod correlation;
pub mod schema;

pub use correlation::{RequestContext, RequestId, SpanId, TraceId};
