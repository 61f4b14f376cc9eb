//! Core orchestration for Tiercast.
//!
//! This crate ties the phase coordinator, multiplier, and spec compiler into
//! the end-to-end catalog build, and exposes the request-time operations
//! (classify, select, degrade) through [`CatalogService`].

pub mod pipeline;
pub mod service;

pub use pipeline::{BuildOptions, BuildReport, ProgressReporter, SilentProgress, build_catalog};
pub use service::CatalogService;
