//! Structured logging facility
//!
//! - One initialization point, `init(profile)`
//! - Lifecycle macros (`log_op_start!`, `log_op_end!`, `log_op_error!`)
//!   emitting the canonical `component`/`op`/`event` fields
//! - A capture layer for asserting on events in tests
//!
//! Core graph code only emits `tracing::debug!`; lifecycle events belong to
//! the boundary that owns an operation (see the engine crate).
//!
//! ```rust
//! use graphdelta_core::logging_facility::{init, Profile};
//!
//! init(Profile::Development);
//! ```

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
