//! Core data structures for the geofuse vector pipeline.
//!
//! This crate holds the tile math every other geofuse crate builds on:
//! generic integer/floating extents, the tilespace parameter pack, per-level
//! tile coverage, packed quadtree addresses, multi-level inset coverage,
//! presence and coverage masks (including the on-disk presence-mask format),
//! plus the shared ambient pieces: little-endian value I/O, progress
//! reporting, error kinds and an LRU cache.

mod error;
pub mod io;
pub mod progress;
pub mod types;

pub use error::*;
pub use types::*;
