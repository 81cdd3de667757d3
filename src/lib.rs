#![forbid(unsafe_code)]

//! mock_disk_full (mdf) — deliberately drive a storage volume toward full
//! capacity, and reverse the effect afterwards.
//!
//! The tool creates a single filler artifact at a fixed, tool-reserved path
//! on the selected volume, sized to leave a configurable reserve untouched:
//!
//! 1. **Volume catalog** — snapshot of mounted volumes with total/used/free
//!    byte counts, with a degraded fallback enumeration
//! 2. **Fill engine** — fastest available creation strategy (native
//!    preallocation, bulk zero-fill, chunked write loop)
//! 3. **Release engine** — idempotent removal of the artifact and any
//!    container directory it introduced
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use mock_disk_full::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use mock_disk_full::core::config::Config;
//! use mock_disk_full::catalog::VolumeCatalog;
//! ```

pub mod prelude;

pub mod catalog;
pub mod core;
pub mod filler;
pub mod logger;
pub mod platform;
