//! The feature geometry model.
//!
//! A [`Geode`] is a tagged variant over the geometry families the pipeline
//! moves around: points, multi-part polylines (with the internal street
//! flavor used for road joining), polygons with per-edge flags, and
//! multi-polygon collections. 2.5D variants carry one height in `z`, 3D
//! polygons carry a full `z` per vertex.
//!
//! Polygon edge flags distinguish original edges from edges introduced by
//! clipping: the simplifier refuses to move anything on a `QuadCut` or
//! `HoleCut` edge since those must line up exactly with the neighboring
//! tile or the bridged hole.

use crate::{
	geom_utils,
	types::{NormBBox, Vertex},
};
use anyhow::{Result, bail};

/// Geometric primitive type of a geode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimType {
	Point,
	Point25D,
	PolyLine,
	PolyLine25D,
	Street,
	Street25D,
	Polygon,
	Polygon25D,
	Polygon3D,
	MultiPolygon,
	MultiPolygon25D,
	MultiPolygon3D,
}

impl PrimType {
	/// Collapse the 2.5D/3D flavors onto their planar family.
	pub fn flat(&self) -> PrimType {
		use PrimType::*;
		match self {
			Point | Point25D => Point,
			PolyLine | PolyLine25D => PolyLine,
			Street | Street25D => Street,
			Polygon | Polygon25D | Polygon3D => Polygon,
			MultiPolygon | MultiPolygon25D | MultiPolygon3D => MultiPolygon,
		}
	}

	pub fn is_line(&self) -> bool {
		matches!(self.flat(), PrimType::PolyLine | PrimType::Street)
	}

	pub fn is_polygon(&self) -> bool {
		self.flat() == PrimType::Polygon
	}

	pub fn is_multi_polygon(&self) -> bool {
		self.flat() == PrimType::MultiPolygon
	}

	/// The code stored in KVP geometry files.
	pub fn code(&self) -> u32 {
		use PrimType::*;
		match self {
			Point => 1,
			Point25D => 2,
			PolyLine => 3,
			PolyLine25D => 4,
			Street => 5,
			Street25D => 6,
			Polygon => 7,
			Polygon25D => 8,
			Polygon3D => 9,
			MultiPolygon => 10,
			MultiPolygon25D => 11,
			MultiPolygon3D => 12,
		}
	}

	pub fn from_code(code: u32) -> Result<PrimType> {
		use PrimType::*;
		Ok(match code {
			1 => Point,
			2 => Point25D,
			3 => PolyLine,
			4 => PolyLine25D,
			5 => Street,
			6 => Street25D,
			7 => Polygon,
			8 => Polygon25D,
			9 => Polygon3D,
			10 => MultiPolygon,
			11 => MultiPolygon25D,
			12 => MultiPolygon3D,
			_ => bail!(geofuse_core::FusionError::InvalidFormat(format!(
				"unknown primitive type code {code}"
			))),
		})
	}
}

/// Provenance of a polygon edge. `edge_flags[i]` describes the edge leaving
/// vertex `i`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeFlag {
	/// An edge of the source polygon.
	Normal,
	/// An edge created by cutting against a tile window.
	QuadCut,
	/// A bridge edge created when cutting a hole into its outer cycle.
	HoleCut,
}

/// Minimum vertices of a valid polygon cycle (closed, so a triangle).
pub const MIN_CYCLE_VERTICES: usize = 4;
/// Minimum vertices of a valid polyline.
pub const MIN_POLYLINE_VERTICES: usize = 2;

/// A feature's geometry.
#[derive(Clone, Debug, PartialEq)]
pub enum Geode {
	Point {
		prim: PrimType,
		vertex: Vertex,
	},
	/// Polylines and streets; each part is an independent vertex chain.
	Lines {
		prim: PrimType,
		parts: Vec<Vec<Vertex>>,
	},
	/// A polygon: part 0 is the outer cycle, further parts are holes.
	/// `edge_flags` parallels part 0.
	Polygon {
		prim: PrimType,
		parts: Vec<Vec<Vertex>>,
		edge_flags: Vec<EdgeFlag>,
	},
	MultiPolygon {
		prim: PrimType,
		polygons: Vec<Geode>,
	},
}

impl Geode {
	#[must_use]
	pub fn new_point(prim: PrimType, vertex: Vertex) -> Self {
		debug_assert!(prim.flat() == PrimType::Point);
		Geode::Point { prim, vertex }
	}

	/// An empty line geode ready for vertices.
	#[must_use]
	pub fn new_lines(prim: PrimType) -> Self {
		debug_assert!(prim.is_line());
		Geode::Lines {
			prim,
			parts: vec![Vec::new()],
		}
	}

	#[must_use]
	pub fn new_polygon(prim: PrimType, parts: Vec<Vec<Vertex>>, edge_flags: Vec<EdgeFlag>) -> Self {
		debug_assert!(prim.is_polygon());
		Geode::Polygon { prim, parts, edge_flags }
	}

	#[must_use]
	pub fn new_multi_polygon(prim: PrimType, polygons: Vec<Geode>) -> Self {
		debug_assert!(prim.is_multi_polygon());
		Geode::MultiPolygon { prim, polygons }
	}

	/// A closed quad-sized polygon covering `bbox`, used in place of
	/// clipping when a feature fully covers the tile.
	#[must_use]
	pub fn new_quad_polygon(bbox: &NormBBox, flag: EdgeFlag, prim: PrimType, height: f64) -> Self {
		let z = height;
		let cycle = vec![
			Vertex::new(bbox.west(), bbox.south(), z),
			Vertex::new(bbox.east(), bbox.south(), z),
			Vertex::new(bbox.east(), bbox.north(), z),
			Vertex::new(bbox.west(), bbox.north(), z),
			Vertex::new(bbox.west(), bbox.south(), z),
		];
		Geode::Polygon {
			prim,
			edge_flags: vec![flag; cycle.len()],
			parts: vec![cycle],
		}
	}

	pub fn prim_type(&self) -> PrimType {
		match self {
			Geode::Point { prim, .. }
			| Geode::Lines { prim, .. }
			| Geode::Polygon { prim, .. }
			| Geode::MultiPolygon { prim, .. } => *prim,
		}
	}

	pub fn flat_prim_type(&self) -> PrimType {
		self.prim_type().flat()
	}

	pub fn num_parts(&self) -> usize {
		match self {
			Geode::Point { .. } => 1,
			Geode::Lines { parts, .. } | Geode::Polygon { parts, .. } => parts.len(),
			Geode::MultiPolygon { polygons, .. } => polygons.len(),
		}
	}

	pub fn vertex_count(&self, part: usize) -> usize {
		match self {
			Geode::Point { .. } => 1,
			Geode::Lines { parts, .. } | Geode::Polygon { parts, .. } => parts.get(part).map_or(0, Vec::len),
			Geode::MultiPolygon { polygons, .. } => polygons.get(part).map_or(0, Geode::total_vertex_count),
		}
	}

	pub fn total_vertex_count(&self) -> usize {
		match self {
			Geode::Point { .. } => 1,
			Geode::Lines { parts, .. } | Geode::Polygon { parts, .. } => parts.iter().map(Vec::len).sum(),
			Geode::MultiPolygon { polygons, .. } => polygons.iter().map(Geode::total_vertex_count).sum(),
		}
	}

	pub fn is_empty(&self) -> bool {
		match self {
			Geode::Point { .. } => false,
			Geode::Lines { parts, .. } | Geode::Polygon { parts, .. } => parts.iter().all(Vec::is_empty),
			Geode::MultiPolygon { polygons, .. } => polygons.iter().all(Geode::is_empty),
		}
	}

	/// Remove all vertices, leaving an empty geode of the same type.
	pub fn clear(&mut self) {
		match self {
			Geode::Point { .. } => {}
			Geode::Lines { parts, .. } => *parts = vec![Vec::new()],
			Geode::Polygon { parts, edge_flags, .. } => {
				parts.clear();
				edge_flags.clear();
			}
			Geode::MultiPolygon { polygons, .. } => polygons.clear(),
		}
	}

	/// Too few vertices to carry its primitive type.
	pub fn is_degenerate(&self) -> bool {
		match self {
			Geode::Point { .. } => false,
			Geode::Lines { parts, .. } => parts.first().is_none_or(|p| p.len() < MIN_POLYLINE_VERTICES),
			Geode::Polygon { parts, .. } => parts.first().is_none_or(|p| p.len() < 3),
			Geode::MultiPolygon { polygons, .. } => polygons.is_empty() || polygons.iter().any(Geode::is_degenerate),
		}
	}

	pub fn parts(&self) -> &[Vec<Vertex>] {
		match self {
			Geode::Lines { parts, .. } | Geode::Polygon { parts, .. } => parts,
			_ => &[],
		}
	}

	pub fn get_vertex(&self, part: usize, index: usize) -> Vertex {
		match self {
			Geode::Point { vertex, .. } => *vertex,
			Geode::Lines { parts, .. } | Geode::Polygon { parts, .. } => parts[part][index],
			Geode::MultiPolygon { polygons, .. } => polygons[part].get_vertex(0, index),
		}
	}

	pub fn first_vertex(&self, part: usize) -> Option<Vertex> {
		match self {
			Geode::Point { vertex, .. } => Some(*vertex),
			Geode::Lines { parts, .. } | Geode::Polygon { parts, .. } => parts.get(part)?.first().copied(),
			Geode::MultiPolygon { polygons, .. } => polygons.get(part)?.first_vertex(0),
		}
	}

	pub fn last_vertex(&self, part: usize) -> Option<Vertex> {
		match self {
			Geode::Point { vertex, .. } => Some(*vertex),
			Geode::Lines { parts, .. } | Geode::Polygon { parts, .. } => parts.get(part)?.last().copied(),
			Geode::MultiPolygon { polygons, .. } => polygons.get(part)?.last_vertex(0),
		}
	}

	/// Append a vertex to part 0 (lines only).
	pub fn add_vertex(&mut self, vertex: Vertex) {
		match self {
			Geode::Lines { parts, .. } => {
				if parts.is_empty() {
					parts.push(Vec::new());
				}
				parts[0].push(vertex);
			}
			_ => debug_assert!(false, "add_vertex on a non-line geode"),
		}
	}

	pub fn edge_flags(&self) -> &[EdgeFlag] {
		match self {
			Geode::Polygon { edge_flags, .. } => edge_flags,
			_ => &[],
		}
	}

	/// The geometry's bounding box.
	pub fn bounding_box(&self) -> NormBBox {
		let mut bbox = NormBBox::new_invalid();
		match self {
			Geode::Point { vertex, .. } => bbox.grow_point(vertex.x, vertex.y),
			Geode::Lines { parts, .. } | Geode::Polygon { parts, .. } => {
				for part in parts {
					for v in part {
						bbox.grow_point(v.x, v.y);
					}
				}
			}
			Geode::MultiPolygon { polygons, .. } => {
				for p in polygons {
					bbox.grow(&p.bounding_box());
				}
			}
		}
		bbox
	}

	/// Whether part-0 vertex sequences are identical, optionally comparing
	/// one reversed. Used by the polyline joiner to find duplicates.
	pub fn is_equal(&self, other: &Geode, reversed: bool) -> bool {
		let (Geode::Lines { parts: a, .. }, Geode::Lines { parts: b, .. }) = (self, other) else {
			return false;
		};
		let (Some(a), Some(b)) = (a.first(), b.first()) else {
			return false;
		};
		if a.len() != b.len() {
			return false;
		}
		if reversed {
			a.iter().zip(b.iter().rev()).all(|(x, y)| x.same_xy(y))
		} else {
			a.iter().zip(b.iter()).all(|(x, y)| x.same_xy(y))
		}
	}

	/// Directed overlap test: every segment of this line lies within
	/// `epsilon` of some segment of `other`.
	pub fn overlaps(&self, other: &Geode, epsilon: f64) -> bool {
		let (Geode::Lines { parts: a, .. }, Geode::Lines { parts: b, .. }) = (self, other) else {
			return false;
		};
		let (Some(a), Some(b)) = (a.first(), b.first()) else {
			return false;
		};
		if a.len() < 2 || b.len() < 2 {
			return false;
		}

		let near = |p: &Vertex| -> bool {
			b.windows(2)
				.any(|seg| geom_utils::point_segment_distance(p, &seg[0], &seg[1]) <= epsilon)
		};
		a.windows(2).all(|seg| {
			near(&seg[0]) && near(&seg[1]) && near(&Vertex::midpoint(&seg[0], &seg[1]))
		})
	}

	/// Coerce this geode to the flavor the display rule asks for.
	///
	/// Line targets turn polygons into their cycles-as-polylines; polygon
	/// targets accept polylines as (open) cycles. Returns an error for
	/// conversions that make no sense (e.g. lines from points).
	pub fn change_prim_type(&mut self, target: PrimType) -> Result<()> {
		use PrimType::*;
		let current = self.prim_type();
		if current == target {
			return Ok(());
		}
		match (self.flat_prim_type(), target.flat()) {
			(PolyLine | Street, PolyLine | Street) => {
				if let Geode::Lines { prim, .. } = self {
					*prim = target;
				}
				Ok(())
			}
			(Polygon, PolyLine | Street) => {
				let Geode::Polygon { parts, .. } = self else { unreachable!() };
				let parts = std::mem::take(parts);
				*self = Geode::Lines { prim: target, parts };
				Ok(())
			}
			(MultiPolygon, PolyLine | Street) => {
				let Geode::MultiPolygon { polygons, .. } = self else { unreachable!() };
				let mut parts = Vec::new();
				for polygon in polygons {
					if let Geode::Polygon { parts: cycles, .. } = polygon {
						parts.append(cycles);
					}
				}
				*self = Geode::Lines { prim: target, parts };
				Ok(())
			}
			(PolyLine | Street, Polygon) => {
				let Geode::Lines { parts, .. } = self else { unreachable!() };
				let parts = std::mem::take(parts);
				let flags = parts.first().map_or(0, Vec::len);
				*self = Geode::Polygon {
					prim: target,
					parts,
					edge_flags: vec![EdgeFlag::Normal; flags],
				};
				Ok(())
			}
			(Polygon, Polygon) | (MultiPolygon, Polygon | MultiPolygon) | (Point, Point) => Ok(()),
			(from, to) => bail!(geofuse_core::FusionError::InvalidGeometry(format!(
				"invalid conversion from {from:?} to {to:?}"
			))),
		}
	}

	/// Plane equation of a 3D polygon via Newell's method: unit normal and
	/// distance such that `normal · p = distance` for points on the plane.
	/// `None` when the polygon is degenerate.
	pub fn compute_plane_equation(&self) -> Option<(Vertex, f64)> {
		let part = self.parts().first()?;
		if part.len() < 3 {
			return None;
		}
		let mut nx = 0.0;
		let mut ny = 0.0;
		let mut nz = 0.0;
		for i in 0..part.len() {
			let a = part[i];
			let b = part[(i + 1) % part.len()];
			nx += (a.y - b.y) * (a.z + b.z);
			ny += (a.z - b.z) * (a.x + b.x);
			nz += (a.x - b.x) * (a.y + b.y);
		}
		let len = (nx * nx + ny * ny + nz * nz).sqrt();
		if len == 0.0 {
			return None;
		}
		let normal = Vertex::new(nx / len, ny / len, nz / len);
		let p = part[0];
		let distance = normal.x * p.x + normal.y * p.y + normal.z * p.z;
		Some((normal, distance))
	}

	/// Keep only the part-0 vertices whose indices are in `keep` (orderless;
	/// output preserves vertex order). Edge flags follow their vertices.
	/// Returns the number of removed vertices.
	pub fn apply_simplification(&mut self, keep: &[usize]) -> usize {
		let mut keep: Vec<usize> = keep.to_vec();
		keep.sort_unstable();
		keep.dedup();
		match self {
			Geode::Lines { parts, .. } => {
				let Some(part) = parts.first_mut() else { return 0 };
				let before = part.len();
				*part = keep.iter().filter_map(|&i| part.get(i).copied()).collect();
				before - part.len()
			}
			Geode::Polygon { parts, edge_flags, .. } => {
				let Some(part) = parts.first_mut() else { return 0 };
				let before = part.len();
				*part = keep.iter().filter_map(|&i| part.get(i).copied()).collect();
				*edge_flags = keep.iter().filter_map(|&i| edge_flags.get(i).copied()).collect();
				before - part.len()
			}
			_ => 0,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn line(vertices: &[(f64, f64)]) -> Geode {
		let mut g = Geode::new_lines(PrimType::PolyLine);
		for &(x, y) in vertices {
			g.add_vertex(Vertex::new_2d(x, y));
		}
		g
	}

	#[test]
	fn counts_and_emptiness() {
		let mut g = line(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]);
		assert_eq!(g.total_vertex_count(), 3);
		assert!(!g.is_empty());
		g.clear();
		assert!(g.is_empty());
		assert_eq!(g.total_vertex_count(), 0);
	}

	#[test]
	fn bounding_box_spans_parts() {
		let g = line(&[(0.1, 0.2), (0.4, 0.9)]);
		let b = g.bounding_box();
		assert_eq!(
			(b.west(), b.east(), b.south(), b.north()),
			(0.1, 0.4, 0.2, 0.9)
		);
	}

	#[test]
	fn equality_forward_and_reversed() {
		let a = line(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
		let b = line(&[(2.0, 0.0), (1.0, 0.0), (0.0, 0.0)]);
		assert!(a.is_equal(&a.clone(), false));
		assert!(a.is_equal(&b, true));
		assert!(!a.is_equal(&b, false));
	}

	#[test]
	fn overlap_is_directed() {
		let long = line(&[(0.0, 0.0), (10.0, 0.0)]);
		let short = line(&[(2.0, 0.0001), (5.0, 0.0001)]);
		assert!(short.overlaps(&long, 0.001));
		assert!(!long.overlaps(&short, 0.001));
		assert!(!short.overlaps(&long, 0.00001));
	}

	#[test]
	fn prim_type_conversions() {
		let mut polygon = Geode::new_polygon(
			PrimType::Polygon,
			vec![vec![
				Vertex::new_2d(0.0, 0.0),
				Vertex::new_2d(1.0, 0.0),
				Vertex::new_2d(1.0, 1.0),
				Vertex::new_2d(0.0, 0.0),
			]],
			vec![EdgeFlag::Normal; 4],
		);
		polygon.change_prim_type(PrimType::Street).unwrap();
		assert_eq!(polygon.prim_type(), PrimType::Street);
		assert_eq!(polygon.total_vertex_count(), 4);

		let mut l = line(&[(0.0, 0.0), (1.0, 1.0)]);
		l.change_prim_type(PrimType::Street).unwrap();
		assert_eq!(l.prim_type(), PrimType::Street);

		let mut p = Geode::new_point(PrimType::Point, Vertex::default());
		assert!(p.change_prim_type(PrimType::PolyLine).is_err());
	}

	#[test]
	fn plane_equation_of_tilted_polygon() {
		// the plane z = x
		let g = Geode::new_polygon(
			PrimType::Polygon3D,
			vec![vec![
				Vertex::new(0.0, 0.0, 0.0),
				Vertex::new(1.0, 0.0, 1.0),
				Vertex::new(1.0, 1.0, 1.0),
				Vertex::new(0.0, 1.0, 0.0),
			]],
			vec![EdgeFlag::Normal; 4],
		);
		let (normal, distance) = g.compute_plane_equation().unwrap();
		// normal ∝ (1, 0, -1)
		assert!(normal.y.abs() < 1e-12);
		assert!((normal.x + normal.z).abs() < 1e-12);
		assert!(distance.abs() < 1e-12);
	}

	#[test]
	fn simplification_keeps_selected_vertices() {
		let mut g = line(&[
			(0.0, 0.0),
			(1.0, 0.0),
			(2.0, 0.0),
			(3.0, 0.0),
			(4.0, 0.0),
			(5.0, 0.0),
			(6.0, 0.0),
			(7.0, 0.0),
			(8.0, 0.0),
			(9.0, 0.0),
			(10.0, 0.0),
		]);
		let removed = g.apply_simplification(&[5, 0, 2]);
		assert_eq!(removed, 8);
		assert_eq!(g.total_vertex_count(), 3);
		assert_eq!(g.get_vertex(0, 0), Vertex::new_2d(0.0, 0.0));
		assert_eq!(g.get_vertex(0, 1), Vertex::new_2d(2.0, 0.0));
		assert_eq!(g.get_vertex(0, 2), Vertex::new_2d(5.0, 0.0));
	}

	#[test]
	fn quad_polygon_is_closed() {
		let bbox = NormBBox::new(0.0, 1.0, 0.0, 1.0);
		let g = Geode::new_quad_polygon(&bbox, EdgeFlag::QuadCut, PrimType::Polygon, 0.0);
		assert_eq!(g.vertex_count(0), 5);
		assert_eq!(g.first_vertex(0), g.last_vertex(0));
		assert!(g.edge_flags().iter().all(|f| *f == EdgeFlag::QuadCut));
	}
}
