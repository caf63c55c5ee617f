//! Geometry value types.

mod geode;
mod norm_bbox;
mod vertex;

pub use geode::{EdgeFlag, Geode, MIN_CYCLE_VERTICES, MIN_POLYLINE_VERTICES, PrimType};
pub use norm_bbox::{MAX_DOMAIN, NormBBox, SegmentClip};
pub use vertex::Vertex;

/// A list of geodes, the unit most preparation passes work on.
pub type GeodeList = Vec<Geode>;
