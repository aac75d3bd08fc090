//! # relstore Testkit
//!
//! Test utilities for relstore.
//!
//! This crate provides:
//! - Sample schemas covering every relationship shape
//! - Temporary data managers, in memory or file-backed
//! - Property-based test generators using proptest
//!
//! The cross-module scenario tests live in this crate's `tests/`
//! directory.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relstore_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_manager() {
//!     with_temp_manager(|manager| {
//!         let people = manager.dao("Person").unwrap();
//!         // ... test operations
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
