//! Structured logging facility
//!
//! - Single initialization point via `init(profile)`
//! - Structured logging macros (`log_op_start!`, `log_op_end!`, `log_op_error!`)
//! - Test capture mode for deterministic assertions
//!
//! # Usage
//!
//! ```rust
//! use graphsync_core::logging_facility::{init, Profile};
//!
//! init(Profile::Development);
//! ```
//!
//! Container operations that change tracked state log one `start` event and
//! exactly one of `end` / `end_error`. Leaf operations such as `set_value`
//! log at `trace` level only.

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
