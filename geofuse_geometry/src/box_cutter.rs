//! Cutting any geometry against an axis-aligned tile window.
//!
//! Dispatches on the primitive type: polylines and streets go through
//! per-segment Liang–Barsky clipping, polygons through the polygon clipper,
//! and 3D polygons are clipped in a 2D projection with the third component
//! recovered from the plane equation afterwards.

use crate::{
	PolygonClipper,
	types::{Geode, GeodeList, NormBBox, PrimType, SegmentClip, Vertex},
};
use std::collections::VecDeque;

const VERTICAL_EPS: f64 = 1e-12;

#[derive(Clone, Copy)]
struct Segment {
	v0: Vertex,
	v1: Vertex,
}

/// Clips geodes against a tile window.
pub struct BoxCutter {
	window: NormBBox,
	cut_holes: bool,
}

impl BoxCutter {
	#[must_use]
	pub fn new(cut_holes: bool) -> Self {
		Self {
			window: NormBBox::new_invalid(),
			cut_holes,
		}
	}

	#[must_use]
	pub fn with_window(window: NormBBox, cut_holes: bool) -> Self {
		Self { window, cut_holes }
	}

	pub fn set_clip_rect(&mut self, window: NormBBox) {
		self.window = window;
	}

	/// Clip `geode` into `pieces` (cleared first). Returns the piece count;
	/// `completely_covered` is set when the window lies inside a polygon.
	pub fn run(&self, geode: &Geode, pieces: &mut GeodeList, completely_covered: &mut bool) -> usize {
		pieces.clear();

		if !self.window.intersects(&geode.bounding_box()) {
			return 0;
		}

		match geode.prim_type() {
			PrimType::Point | PrimType::Point25D => {}
			PrimType::PolyLine | PrimType::PolyLine25D | PrimType::Street | PrimType::Street25D => {
				self.clip_lines(geode, pieces);
			}
			PrimType::Polygon | PrimType::Polygon25D | PrimType::MultiPolygon | PrimType::MultiPolygon25D => {
				let clipper = PolygonClipper::with_window(self.window, self.cut_holes);
				clipper.run(geode, pieces, completely_covered);
			}
			PrimType::Polygon3D => {
				self.clip_polygon_3d(geode, pieces, completely_covered);
			}
			PrimType::MultiPolygon3D => {
				if let Geode::MultiPolygon { polygons, .. } = geode {
					for polygon in polygons {
						self.clip_polygon_3d(polygon, pieces, completely_covered);
					}
				}
			}
		}

		log::debug!("box cut produced {} pieces", pieces.len());
		pieces.len()
	}

	/// Clip every segment; streets re-concatenate runs of connected
	/// surviving segments, polylines emit one geode per segment so later
	/// duplicate removal can work segment-wise.
	fn clip_lines(&self, geode: &Geode, pieces: &mut GeodeList) {
		let mut segments: VecDeque<Segment> = VecDeque::new();
		for part in geode.parts() {
			for pair in part.windows(2) {
				match self.window.clip_segment(&pair[0], &pair[1]) {
					SegmentClip::Outside => {}
					SegmentClip::Inside(v0, v1) | SegmentClip::Cut(v0, v1) => {
						segments.push_back(Segment { v0, v1 });
					}
				}
			}
		}
		if segments.is_empty() {
			return;
		}

		if geode.flat_prim_type() == PrimType::Street {
			combine_ordered_segments(&segments, geode.prim_type(), pieces);
		} else {
			for seg in &segments {
				let mut piece = Geode::new_lines(geode.prim_type());
				piece.add_vertex(seg.v0);
				piece.add_vertex(seg.v1);
				pieces.push(piece);
			}
		}
	}

	/// Clip a 3D polygon by projecting to 2D and recovering the dropped
	/// component from the plane equation. Vertical polygons swap `x↔z` or
	/// `y↔z`, whichever axis the normal allows.
	fn clip_polygon_3d(&self, geode: &Geode, pieces: &mut GeodeList, completely_covered: &mut bool) {
		let Some((normal, distance)) = geode.compute_plane_equation() else {
			// invalid plane; such geodes are filtered at import
			return;
		};
		let vertical = normal.z.abs() <= VERTICAL_EPS;
		let swap_x = !(vertical && normal.x.abs() <= VERTICAL_EPS);

		let (min_z, max_z) = geode
			.parts()
			.first()
			.map(|p| {
				p.iter()
					.fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(v.z), hi.max(v.z)))
			})
			.unwrap_or((0.0, 0.0));

		let mut window = self.window;
		let project = |v: &Vertex| -> Vertex {
			if vertical && swap_x {
				Vertex::new_2d(v.z, v.y)
			} else if vertical {
				Vertex::new_2d(v.x, v.z)
			} else {
				Vertex::new_2d(v.x, v.y)
			}
		};
		if vertical && swap_x {
			window = NormBBox::new(min_z, max_z, self.window.south(), self.window.north());
		} else if vertical {
			window = NormBBox::new(self.window.west(), self.window.east(), min_z, max_z);
		}

		let Geode::Polygon { prim, parts, edge_flags } = geode else {
			return;
		};
		let projected_parts: Vec<Vec<Vertex>> = parts.iter().map(|p| p.iter().map(project).collect()).collect();
		let projected = Geode::new_polygon(*prim, projected_parts, edge_flags.clone());

		let clipper = PolygonClipper::with_window(window, self.cut_holes);
		let mut flat_pieces = Vec::new();
		clipper.run(&projected, &mut flat_pieces, completely_covered);

		// recover the dropped component from the plane equation
		for piece in &mut flat_pieces {
			if let Geode::Polygon { parts, .. } = piece {
				for part in parts {
					for v in part.iter_mut() {
						*v = if vertical && swap_x {
							let x = (distance - normal.y * v.y) / normal.x;
							Vertex::new(x, v.y, v.x)
						} else if vertical {
							let y = (distance - normal.x * v.x) / normal.y;
							Vertex::new(v.x, y, v.y)
						} else {
							let z = (distance - normal.x * v.x - normal.y * v.y) / normal.z;
							Vertex::new(v.x, v.y, z)
						};
					}
				}
			}
		}
		pieces.append(&mut flat_pieces);
	}
}

/// Turn an ordered segment run back into polylines, starting a new piece at
/// every discontinuity.
fn combine_ordered_segments(segments: &VecDeque<Segment>, prim: PrimType, pieces: &mut GeodeList) {
	let mut iter = segments.iter();
	let Some(first) = iter.next() else { return };

	let mut current = Geode::new_lines(prim);
	current.add_vertex(first.v0);
	current.add_vertex(first.v1);
	let mut prev = first.v1;

	for seg in iter {
		if !seg.v0.same_xy(&prev) {
			pieces.push(current);
			current = Geode::new_lines(prim);
			current.add_vertex(seg.v0);
		}
		current.add_vertex(seg.v1);
		prev = seg.v1;
	}
	pieces.push(current);
}
