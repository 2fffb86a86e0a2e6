#![doc(hidden)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Core library for bluefin-releases
//!
//! This library aggregates metadata and changelog information for the packages that
//! make up the Bluefin catalog (OS images, Flatpak apps, Homebrew formulae and casks)
//! into a single deduplicated dataset.
//!
//! # Module Organization
//!
//! - [`model`]: Canonical package, release, and source repository types
//! - [`sources`]: Upstream adapters, HTTP plumbing, and rate governors
//! - [`pipeline`]: Discovery, detail, merge, enrichment, and finalize stages
//! - [`dataset`]: Deterministic, atomic snapshot writer
//! - [`commands`]: Command-line interface and orchestration

pub type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

pub mod commands;
pub mod dataset;
pub mod model;
pub mod pipeline;
pub mod sources;

pub use crate::commands::{Host, run};
