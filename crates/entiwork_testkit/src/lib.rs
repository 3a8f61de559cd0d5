//! # EntiWork Testkit
//!
//! Test utilities for EntiWork.
//!
//! This crate provides:
//! - Store fixtures (in-memory or file-backed in a temporary directory)
//! - A standard `Person`/`Company` type registry
//! - Property-based test generators using proptest
//! - Stress helpers for concurrent conflicting units of work
//!
//! ## Usage
//!
//! ```rust
//! use entiwork_testkit::prelude::*;
//!
//! with_memory_store(|factory| {
//!     let mut uow = factory.new_unit_of_work();
//!     uow.new_entity("Person", None).unwrap();
//!     uow.complete().unwrap();
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
