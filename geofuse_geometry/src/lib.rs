//! Geometry model and preparation algorithms for the geofuse pipeline.
//!
//! This crate turns source features into per-tile geometry: the [`Geode`]
//! model (points, polylines, streets, polygons with edge flags), clipping
//! against tile windows ([`BoxCutter`], [`PolygonClipper`]), polyline
//! deduplication and joining ([`PolylineJoiner`]), and the Douglas–Peucker
//! line simplifier with its sub-pixel feature culler.

mod box_cutter;
pub mod geom_utils;
mod polygon_builder;
mod polygon_clipper;
mod polyline_joiner;
mod simplifier;
pub mod types;

pub use box_cutter::BoxCutter;
pub use polygon_builder::PolygonBuilder;
pub use polygon_clipper::PolygonClipper;
pub use polyline_joiner::PolylineJoiner;
pub use simplifier::{FeatureCuller, Simplifier};
pub use types::*;
