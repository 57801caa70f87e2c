// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Unit tests for the postgres controller
//!
//! This module contains unit tests for:
//! - SQL issued by the PostgreSQL capability surface
//! - Instance property resolution
//! - Condition bookkeeping
//! - The instance, database and user reconcilers, run against in-memory fakes

#[path = "../common/mod.rs"]
mod common;
