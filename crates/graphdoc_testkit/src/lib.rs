//! # GraphDoc Testkit
//!
//! Test utilities for GraphDoc storage backends.
//!
//! This crate provides:
//! - Fixtures that open every backend against throwaway storage
//! - Property-based test generators using proptest
//! - A tracking harness that verifies a store against expected contents
//! - Async stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use graphdoc_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn test_every_backend() {
//!     for store in TestStore::all().await {
//!         store.save("node", sample_node("n1")).await.unwrap();
//!     }
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
