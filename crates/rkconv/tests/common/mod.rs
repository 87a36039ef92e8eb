//! Shared utilities for rkconv integration tests.
//!
//! - `TestHarness` owns temporary upload/output directories
//! - stub executors stand in for the RKNN toolkit
//! - `StallingNotifier` stands in for a callback endpoint that hangs

pub mod executors;
pub mod harness;
pub mod notifiers;

pub use executors::*;
pub use harness::*;
pub use notifiers::*;
