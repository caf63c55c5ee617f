//! Clipping polygons (with holes) against an axis-aligned window.
//!
//! The clipping step walks every cycle edge through Liang–Barsky, keeping
//! the portions inside the window as halfedge fragments and collecting
//! *turning points* — the places where the polygon boundary crosses the
//! window boundary. New halfedges are synthesized along the window boundary
//! between an exit turning point and the next entry (walking the boundary
//! counterclockwise, matching the interior-on-the-left orientation of the
//! fragments). Reconstruction of output rings is done by
//! [`crate::PolygonBuilder`].
//!
//! When no turning points exist the window is either disjoint from the
//! polygon, swallowed by it (reported through `completely_covered`), or
//! strictly contains whole cycles, which pass through as fragments.

use crate::{
	geom_utils,
	polygon_builder::{BuildEdge, PolygonBuilder},
	types::{EdgeFlag, Geode, GeodeList, NormBBox, PrimType, SegmentClip, Vertex},
};
use std::collections::HashSet;

const BOUNDARY_TOL: f64 = 1e-12;

#[derive(Clone, Copy, Debug)]
struct TurningPoint {
	/// Perimeter position, counterclockwise from the south-west corner.
	s: f64,
	/// Polygon enters the window here (fragment starts) vs exits.
	entry: bool,
	v: Vertex,
}

/// Clips polygons against a rectangular window.
pub struct PolygonClipper {
	window: NormBBox,
	cut_holes: bool,
}

impl PolygonClipper {
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

	pub fn set_window(&mut self, window: NormBBox) {
		self.window = window;
	}

	/// Clip `geode` and append the pieces. `completely_covered` is set when
	/// the window lies entirely inside the polygon.
	pub fn run(&self, geode: &Geode, pieces: &mut GeodeList, completely_covered: &mut bool) {
		match geode {
			Geode::Polygon { prim, parts, edge_flags } => {
				self.run_polygon(*prim, parts, edge_flags, pieces, completely_covered);
			}
			Geode::MultiPolygon { polygons, .. } => {
				for polygon in polygons {
					let mut covered = false;
					self.run(polygon, pieces, &mut covered);
					*completely_covered = *completely_covered || covered;
				}
			}
			_ => debug_assert!(false, "polygon clipper fed a non-polygon"),
		}
	}

	fn run_polygon(
		&self,
		prim: PrimType,
		parts: &[Vec<Vertex>],
		edge_flags: &[EdgeFlag],
		pieces: &mut GeodeList,
		completely_covered: &mut bool,
	) {
		let cycles = normalize_cycles(parts, edge_flags);
		if cycles.is_empty() {
			return;
		}
		let height = cycles[0].0.first().map_or(0.0, |v| v.z);

		// clip every edge, collecting inside fragments and turning points
		let mut fragments: Vec<BuildEdge> = Vec::new();
		let mut turning_points: Vec<TurningPoint> = Vec::new();
		let mut any_on_boundary = false;
		for (vertices, flags) in &cycles {
			for i in 0..vertices.len() {
				let a = vertices[i];
				let b = vertices[(i + 1) % vertices.len()];
				let flag = flags[i];
				match self.window.clip_segment(&a, &b) {
					SegmentClip::Outside => {}
					SegmentClip::Inside(p0, p1) => {
						any_on_boundary = any_on_boundary || self.on_boundary(&p0) || self.on_boundary(&p1);
						fragments.push(BuildEdge { v0: p0, v1: p1, flag });
					}
					SegmentClip::Cut(p0, p1) => {
						if p0.same_xy(&p1) {
							continue; // grazing touch
						}
						if !p0.same_xy(&a) {
							turning_points.push(TurningPoint {
								s: self.perimeter_pos(&p0),
								entry: true,
								v: p0,
							});
						}
						if !p1.same_xy(&b) {
							turning_points.push(TurningPoint {
								s: self.perimeter_pos(&p1),
								entry: false,
								v: p1,
							});
						}
						fragments.push(BuildEdge { v0: p0, v1: p1, flag });
					}
				}
			}
		}

		let mut boundary_edges: Vec<BuildEdge> = Vec::new();
		if turning_points.is_empty() {
			if fragments.is_empty() || !any_on_boundary {
				// window fully inside or outside the polygon area
				let probe = Vertex::new_2d(
					(self.window.west() + self.window.east()) / 2.0,
					self.window.south(),
				);
				let all_cycles: Vec<Vec<Vertex>> = cycles.iter().map(|(v, _)| v.clone()).collect();
				if geom_utils::point_in_cycles(&all_cycles, probe.x, probe.y) {
					self.emit_full_ring(height, &mut boundary_edges);
					if fragments.is_empty() {
						*completely_covered = true;
					}
				} else if fragments.is_empty() {
					return; // disjoint
				}
			}
		} else {
			turning_points.sort_by(|a, b| {
				a.s.partial_cmp(&b.s)
					.unwrap_or(std::cmp::Ordering::Equal)
					.then(a.entry.cmp(&b.entry))
			});
			for (i, tp) in turning_points.iter().enumerate() {
				if tp.entry {
					continue;
				}
				// boundary runs counterclockwise from this exit to the next
				// entry point
				let next = turning_points
					.iter()
					.cycle()
					.skip(i + 1)
					.take(turning_points.len())
					.find(|other| other.entry);
				if let Some(next) = next {
					self.emit_arc(tp, next, height, &mut boundary_edges);
				}
			}
		}

		// drop boundary edges that coincide with kept fragments (pieces
		// whose edges already lie on the window)
		let quant = |v: &Vertex| ((v.x * 1e13).round() as i64, (v.y * 1e13).round() as i64);
		let existing: HashSet<_> = fragments.iter().map(|e| (quant(&e.v0), quant(&e.v1))).collect();
		boundary_edges.retain(|e| !existing.contains(&(quant(&e.v0), quant(&e.v1))));

		fragments.extend(boundary_edges);
		if fragments.is_empty() {
			return;
		}
		let builder = PolygonBuilder::new(self.cut_holes);
		pieces.extend(builder.build(prim, &fragments));
	}

	fn on_boundary(&self, v: &Vertex) -> bool {
		(v.x - self.window.west()).abs() <= BOUNDARY_TOL
			|| (v.x - self.window.east()).abs() <= BOUNDARY_TOL
			|| (v.y - self.window.south()).abs() <= BOUNDARY_TOL
			|| (v.y - self.window.north()).abs() <= BOUNDARY_TOL
	}

	/// Perimeter position of a boundary point, counterclockwise from the
	/// south-west corner.
	fn perimeter_pos(&self, v: &Vertex) -> f64 {
		let w = self.window.width();
		let h = self.window.height();
		if (v.y - self.window.south()).abs() <= BOUNDARY_TOL {
			return (v.x - self.window.west()).clamp(0.0, w);
		}
		if (v.x - self.window.east()).abs() <= BOUNDARY_TOL {
			return w + (v.y - self.window.south()).clamp(0.0, h);
		}
		if (v.y - self.window.north()).abs() <= BOUNDARY_TOL {
			return w + h + (self.window.east() - v.x).clamp(0.0, w);
		}
		2.0 * w + h + (self.window.north() - v.y).clamp(0.0, h)
	}

	/// Boundary point at perimeter position `s`.
	fn point_at(&self, s: f64, height: f64) -> Vertex {
		let w = self.window.width();
		let h = self.window.height();
		let s = s.rem_euclid(2.0 * (w + h));
		if s <= w {
			Vertex::new(self.window.west() + s, self.window.south(), height)
		} else if s <= w + h {
			Vertex::new(self.window.east(), self.window.south() + (s - w), height)
		} else if s <= 2.0 * w + h {
			Vertex::new(self.window.east() - (s - w - h), self.window.north(), height)
		} else {
			Vertex::new(self.window.west(), self.window.north() - (s - 2.0 * w - h), height)
		}
	}

	/// Emit window-boundary halfedges from an exit turning point
	/// counterclockwise to an entry turning point, inserting window corners
	/// along the way.
	fn emit_arc(&self, from: &TurningPoint, to: &TurningPoint, height: f64, out: &mut Vec<BuildEdge>) {
		let w = self.window.width();
		let h = self.window.height();
		let total = 2.0 * (w + h);
		let s0 = from.s;
		let mut s1 = to.s;
		if s1 <= s0 {
			s1 += total;
		}

		let mut points = vec![from.v];
		for corner in [w, w + h, 2.0 * w + h, total, total + w, total + w + h, total + 2.0 * w + h] {
			if corner > s0 + BOUNDARY_TOL && corner < s1 - BOUNDARY_TOL {
				points.push(self.point_at(corner, height));
			}
		}
		points.push(to.v);

		for pair in points.windows(2) {
			if !pair[0].same_xy(&pair[1]) {
				out.push(BuildEdge {
					v0: pair[0],
					v1: pair[1],
					flag: EdgeFlag::QuadCut,
				});
			}
		}
	}

	/// Emit the whole window boundary counterclockwise.
	fn emit_full_ring(&self, height: f64, out: &mut Vec<BuildEdge>) {
		let corners = [
			Vertex::new(self.window.west(), self.window.south(), height),
			Vertex::new(self.window.east(), self.window.south(), height),
			Vertex::new(self.window.east(), self.window.north(), height),
			Vertex::new(self.window.west(), self.window.north(), height),
		];
		for i in 0..4 {
			out.push(BuildEdge {
				v0: corners[i],
				v1: corners[(i + 1) % 4],
				flag: EdgeFlag::QuadCut,
			});
		}
	}
}

/// Open every cycle (drop a closing duplicate vertex), orient the outer
/// cycle counterclockwise and holes clockwise, and carry the outer cycle's
/// edge flags through any reversal. Hole edges are `Normal`.
fn normalize_cycles(parts: &[Vec<Vertex>], edge_flags: &[EdgeFlag]) -> Vec<(Vec<Vertex>, Vec<EdgeFlag>)> {
	let mut cycles = Vec::with_capacity(parts.len());
	for (index, part) in parts.iter().enumerate() {
		let mut vertices = part.clone();
		let mut flags: Vec<EdgeFlag> = if index == 0 && edge_flags.len() >= vertices.len() {
			edge_flags[..vertices.len()].to_vec()
		} else {
			vec![EdgeFlag::Normal; vertices.len()]
		};
		if vertices.len() > 1 && vertices.first().unwrap().same_xy(vertices.last().unwrap()) {
			vertices.pop();
			flags.pop();
		}
		if vertices.len() < 3 {
			continue;
		}

		let area = geom_utils::signed_area_2x(&vertices);
		let want_ccw = index == 0;
		if (area >= 0.0) != want_ccw {
			reverse_cycle(&mut vertices, &mut flags);
		}
		cycles.push((vertices, flags));
	}
	cycles
}

/// Reverse a cycle in place, remapping the per-edge flags so each edge
/// keeps its flag under the new traversal direction.
fn reverse_cycle(vertices: &mut [Vertex], flags: &mut [EdgeFlag]) {
	let n = vertices.len();
	vertices.reverse();
	let old = flags.to_vec();
	for (k, flag) in flags.iter_mut().enumerate() {
		*flag = old[(2 * n - 2 - k) % n];
	}
}
