//! Feature selection and per-tile preparation for the geofuse pipeline.
//!
//! This crate connects sources to tiles: typed attribute records and their
//! KVP stores, shared source access with process-wide caching, per-filter
//! record predicates (structured rules or compiled expressions), the
//! spatial index answering "which features touch this tile", the selector
//! that runs queries and prepares per-tile feature/site sets, and the
//! quad-coverage engine that walks the tile pyramid.

pub mod config;
mod display_rule;
mod expression;
mod filter;
mod geo_index;
mod kvp_file;
mod kvp_table;
mod quad_exporter;
mod record;
mod selector;
mod source;
mod source_manager;

pub use display_rule::{DisplayRule, Site};
pub use expression::{CompiledProgram, CompiledRule, ExpressionEvaluator, RecordExprEvaluator};
pub use filter::Filter;
pub use geo_index::{FeatureHandle, GeoIndex};
pub use kvp_file::KvpFile;
pub use kvp_table::KvpTable;
pub use quad_exporter::{BuildSet, MAX_PRESENCE_LEVEL, QuadExporter, TileSink};
pub use record::{FieldSpec, FieldType, Record, RecordFormatter, RecordHeader, SharedHeader, SharedRecord, Value};
pub use selector::{FeatureSet, Selector, SiteSet};
pub use source::Source;
pub use source_manager::{SharedSource, SourceManager, UniqueFeatureId};
