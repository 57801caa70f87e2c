// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice,
    dead_code
)]

//! Common test utilities shared across all test targets
//!
//! Builders for the custom resources plus in-memory stand-ins for the
//! Kubernetes stores and the PostgreSQL capability handles.
//!
//! # Usage
//!
//! Include this module in your test file:
//! ```rust,ignore
//! #[path = "../common/mod.rs"]
//! mod common;
//! use common::*;
//! ```

mod fakes;

pub use fakes::*;
pub use fixtures::*;
