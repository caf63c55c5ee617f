//! Douglas–Peucker line simplification with an earth-curvature error term,
//! plus the sub-pixel feature culler.
//!
//! Simplification starts from base segments and iteratively reinserts the
//! vertex worst approximated by its segment. The returned keep-list is
//! ordered by importance: any prefix of length `n` is the best
//! `n`-vertex approximation. For polygons, every edge flagged as a quad cut
//! or hole cut is locked — moving those vertices would open cracks against
//! the neighboring tile or the bridged hole.
//!
//! The curvature term accounts for the bulge of the earth under a chord:
//! with the earth's circumference parameterized to 1.0, the radius is
//! `1/(2π)` and the worst error under a chord is `R − sqrt(R² − (c/2)²)`,
//! attributed to the vertex nearest the chord midpoint.

use crate::types::{EdgeFlag, Geode, MIN_CYCLE_VERTICES, MIN_POLYLINE_VERTICES, PrimType, Vertex};

const EARTH_RADIUS: f64 = 1.0 / (2.0 * std::f64::consts::PI);

/// One segment of the current approximation, tracking its worst vertex.
#[derive(Clone, Copy, Debug)]
struct LineSegment {
	start: usize,
	end: usize,
	max_dist: f64,
	max_v: usize,
}

impl LineSegment {
	fn new(start: usize, end: usize, vertices: &[Vertex]) -> Self {
		let mut seg = Self {
			start,
			end,
			max_dist: 0.0,
			max_v: start,
		};
		seg.update(vertices);
		seg
	}

	fn is_splittable(&self) -> bool {
		self.start + 1 != self.end
	}

	/// Recompute the worst-approximated vertex and its error.
	fn update(&mut self, vertices: &[Vertex]) {
		self.max_dist = 0.0;
		self.max_v = self.start;
		if !self.is_splittable() {
			return;
		}

		let v1 = vertices[self.start];
		let v2 = vertices[self.end];
		for i in self.start + 1..self.end {
			let dist = vertices[i].chord_distance_sq(&v1, &v2).sqrt();
			if dist > self.max_dist {
				self.max_dist = dist;
				self.max_v = i;
			}
		}

		// The chord's midpoint dips below the sphere surface; if that error
		// dominates, blame it on the vertex closest to the midpoint.
		let half = v1.distance_2d(&v2) / 2.0;
		let error = EARTH_RADIUS - (EARTH_RADIUS * EARTH_RADIUS - half * half).max(0.0).sqrt();
		if error <= self.max_dist {
			return;
		}
		self.max_dist = error;
		let midpoint = Vertex::midpoint(&v1, &v2);
		self.max_v = self.start + 1;
		let mut best = vertices[self.max_v].distance_2d(&midpoint);
		for i in self.start + 2..self.end {
			let dist = vertices[i].distance_2d(&midpoint);
			if dist < best {
				best = dist;
				self.max_v = i;
			}
		}
	}

	/// Split at the worst vertex; `self` keeps the head, the tail is returned.
	fn split(&mut self, vertices: &[Vertex]) -> LineSegment {
		let tail = LineSegment::new(self.max_v, self.end, vertices);
		self.end = self.max_v;
		self.update(vertices);
		tail
	}
}

/// Douglas–Peucker simplifier with per-level thresholds.
#[derive(Debug, Default)]
pub struct Simplifier {
	threshold: f64,
	threshold_weak: f64,
	allowable_error: f64,
}

impl Simplifier {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Allowable on-screen error in pixels at the display level.
	pub fn set_pixel_error(&mut self, error: f64) {
		self.allowable_error = error;
	}

	/// Derive the error threshold for `level`.
	///
	/// Features may be drawn up to three levels below the one they are
	/// built for, hence the division by 8. Each extra `loopcount` doubles
	/// the threshold for progressively destructive packet-size reduction.
	/// The weak threshold reaches three more levels down and is used
	/// together with the edge-length check.
	pub fn compute_threshold(&mut self, level: u32, loopcount: u32, pixels_at_level0: u32) {
		self.threshold =
			self.allowable_error / 8.0 / f64::from(pixels_at_level0) / 2f64.powi(level as i32);
		self.threshold *= 2f64.powi(loopcount as i32);
		self.threshold_weak = self.threshold / 8.0;
		log::debug!("level {level}, loopcount {loopcount}, threshold {:.20}", self.threshold);
	}

	pub fn threshold(&self) -> f64 {
		self.threshold
	}

	/// Simplify `geode`, filling `keep` with the vertex indices to retain in
	/// importance order. The geode itself is only modified to close an open
	/// polygon cycle. Returns the max error of the approximation.
	pub fn simplify(&self, geode: &mut Geode, keep: &mut Vec<usize>) -> f64 {
		keep.clear();
		debug_assert!(
			!geode.flat_prim_type().is_multi_polygon() && geode.num_parts() <= 1,
			"simplifier requires single-part geometry"
		);
		if geode.is_degenerate() {
			return 0.0;
		}

		let mut segments: Vec<LineSegment> = Vec::new();
		match geode.flat_prim_type() {
			PrimType::PolyLine | PrimType::Street => {
				let count = geode.vertex_count(0);
				if count <= MIN_POLYLINE_VERTICES {
					keep.extend(0..count);
					return 0.0;
				}
				let vertices = &geode.parts()[0];
				segments.push(LineSegment::new(0, count - 1, vertices));
				keep.push(0);
				keep.push(count - 1);
			}
			PrimType::Polygon => {
				// close the cycle so the final edge is preserved
				if let Geode::Polygon { parts, edge_flags, .. } = geode {
					let part = &mut parts[0];
					if part.first() != part.last() {
						part.push(part[0]);
						edge_flags.push(*edge_flags.last().unwrap_or(&EdgeFlag::Normal));
					}
				}
				let count = geode.vertex_count(0);
				debug_assert!(count >= MIN_CYCLE_VERTICES);
				if count <= MIN_CYCLE_VERTICES {
					keep.extend(0..count);
					return 0.0;
				}

				let vertices = &geode.parts()[0];
				let flags = geode.edge_flags();
				let mut start = 0;
				let mut have_start = false;
				for i in 0..count - 1 {
					if flags[i] == EdgeFlag::Normal {
						if !have_start {
							start = i;
							have_start = true;
							keep.push(i);
						}
						continue;
					}

					// locked edge: its vertex always survives
					keep.push(i);
					if have_start {
						if i - start > 1 {
							segments.push(LineSegment::new(start, i, vertices));
						}
						have_start = false;
					}
				}
				// close off a trailing run against the final vertex (equal
				// to vertex 0, always preserved)
				if have_start && start < count - 2 {
					segments.push(LineSegment::new(start, count - 1, vertices));
				}
				keep.push(count - 1);
				if segments.is_empty() {
					return 0.0;
				}
			}
			_ => {
				keep.extend(0..geode.vertex_count(0));
				return 0.0;
			}
		}

		let vertices = &geode.parts()[0];
		let bbox = geode.bounding_box();
		let edge_length_threshold = bbox.width().min(bbox.height()) / 8.0;
		let is_polygon = geode.flat_prim_type() == PrimType::Polygon;

		let mut best = worst_segment(&segments);
		while !segments.is_empty()
			&& (segments[best].max_dist > self.threshold
				|| (segments[best].max_dist > self.threshold_weak
					&& (vertices[segments[best].start].distance_2d(&vertices[segments[best].max_v])
						> edge_length_threshold
						|| vertices[segments[best].end].distance_2d(&vertices[segments[best].max_v])
							> edge_length_threshold))
				|| (is_polygon && keep.len() < MIN_CYCLE_VERTICES))
		{
			debug_assert!(segments[best].is_splittable());
			keep.push(segments[best].max_v);

			let tail = segments[best].split(vertices);
			if !segments[best].is_splittable() {
				segments.swap_remove(best);
			}
			if tail.is_splittable() {
				segments.push(tail);
			}
			if segments.is_empty() {
				return 0.0;
			}
			best = worst_segment(&segments);
		}

		segments[best].max_dist
	}

	/// Whether the geode is too small to affect the display at the current
	/// threshold.
	pub fn is_subpixel_feature(&self, geode: &Geode) -> bool {
		is_below(geode, self.threshold)
	}
}

fn worst_segment(segments: &[LineSegment]) -> usize {
	let mut best = 0;
	for (i, seg) in segments.iter().enumerate().skip(1) {
		if seg.max_dist > segments[best].max_dist {
			best = i;
		}
	}
	best
}

fn is_below(geode: &Geode, threshold: f64) -> bool {
	match geode.flat_prim_type() {
		PrimType::PolyLine | PrimType::Street | PrimType::Polygon => {
			if geode.vertex_count(0) <= 1 {
				return true;
			}
			geode.bounding_box().diameter() < threshold
		}
		PrimType::MultiPolygon => geode.bounding_box().diameter() < threshold,
		_ => false,
	}
}

/// Culls features whose footprint is below the pixel-error budget at a
/// level. Unlike the simplifier threshold there is no draw-below slack.
#[derive(Debug, Default)]
pub struct FeatureCuller {
	threshold: f64,
	allowable_error: f64,
}

impl FeatureCuller {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_pixel_error(&mut self, error: f64) {
		self.allowable_error = error;
	}

	pub fn compute_threshold(&mut self, level: u32, pixels_at_level0: u32) {
		self.threshold = self.allowable_error / f64::from(pixels_at_level0) / 2f64.powi(level as i32);
	}

	pub fn is_subpixel_feature(&self, geode: &Geode) -> bool {
		is_below(geode, self.threshold)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn line(points: &[(f64, f64)]) -> Geode {
		let mut g = Geode::new_lines(PrimType::PolyLine);
		for &(x, y) in points {
			g.add_vertex(Vertex::new_2d(x, y));
		}
		g
	}

	fn simplifier_at(level: u32, pixel_error: f64) -> Simplifier {
		let mut s = Simplifier::new();
		s.set_pixel_error(pixel_error);
		s.compute_threshold(level, 0, 256);
		s
	}

	#[test]
	fn straight_line_reduces_to_endpoints() {
		let mut g = line(&[
			(0.0, 0.0),
			(0.0001, 0.0),
			(0.0002, 0.0),
			(0.0003, 0.0),
			(0.0004, 0.0),
		]);
		let s = simplifier_at(0, 0.5);
		let mut keep = Vec::new();
		s.simplify(&mut g, &mut keep);
		keep.sort_unstable();
		assert_eq!(keep, vec![0, 4]);
	}

	#[test]
	fn corner_survives_simplification() {
		let mut g = line(&[(0.0, 0.0), (0.001, 0.0), (0.001, 0.001)]);
		let s = simplifier_at(10, 0.5);
		let mut keep = Vec::new();
		let err = s.simplify(&mut g, &mut keep);
		keep.sort_unstable();
		assert_eq!(keep, vec![0, 1, 2]);
		assert!(err <= s.threshold() || err == 0.0);
	}

	#[test]
	fn keep_list_is_prefix_ordered_by_importance() {
		// a zig-zag: the big kink comes back before the small one
		let mut g = line(&[
			(0.0, 0.0),
			(0.1, 0.04),
			(0.2, 0.0),
			(0.3, 0.0005),
			(0.4, 0.0),
		]);
		let s = simplifier_at(12, 0.5);
		let mut keep = Vec::new();
		s.simplify(&mut g, &mut keep);
		assert_eq!(keep[0], 0);
		assert_eq!(keep[1], 4);
		assert_eq!(keep[2], 1); // biggest deviation first
	}

	#[test]
	fn short_polyline_is_left_alone() {
		let mut g = line(&[(0.0, 0.0), (1.0, 1.0)]);
		let s = simplifier_at(0, 0.5);
		let mut keep = Vec::new();
		assert_eq!(s.simplify(&mut g, &mut keep), 0.0);
		assert_eq!(keep, vec![0, 1]);
	}

	#[test]
	fn locked_polygon_edges_are_never_dropped() {
		// vertex 2 and 3 bound a quad-cut edge; they survive any threshold
		let cycle = vec![
			Vertex::new_2d(0.0, 0.0),
			Vertex::new_2d(0.5, 0.0001),
			Vertex::new_2d(1.0, 0.0),
			Vertex::new_2d(1.0, 1.0),
			Vertex::new_2d(0.0, 1.0),
			Vertex::new_2d(0.0, 0.0),
		];
		let flags = vec![
			EdgeFlag::Normal,
			EdgeFlag::Normal,
			EdgeFlag::QuadCut,
			EdgeFlag::QuadCut,
			EdgeFlag::Normal,
			EdgeFlag::Normal,
		];
		let mut g = Geode::new_polygon(PrimType::Polygon, vec![cycle], flags);

		let s = simplifier_at(0, 100.0); // absurdly permissive threshold
		let mut keep = Vec::new();
		s.simplify(&mut g, &mut keep);
		assert!(keep.contains(&2));
		assert!(keep.contains(&3));
		assert!(keep.contains(&4));
		// and a polygon never drops below a closed triangle
		assert!(keep.len() >= MIN_CYCLE_VERTICES);
	}

	#[test]
	fn open_polygon_is_closed_before_simplifying() {
		let cycle = vec![
			Vertex::new_2d(0.0, 0.0),
			Vertex::new_2d(1.0, 0.0),
			Vertex::new_2d(1.0, 1.0),
			Vertex::new_2d(0.0, 1.0),
		];
		let mut g = Geode::new_polygon(PrimType::Polygon, vec![cycle], vec![EdgeFlag::Normal; 4]);
		let s = simplifier_at(8, 0.5);
		let mut keep = Vec::new();
		s.simplify(&mut g, &mut keep);
		assert_eq!(g.vertex_count(0), 5);
		assert_eq!(g.first_vertex(0), g.last_vertex(0));
	}

	#[test]
	fn subpixel_features_are_detected() {
		let g = line(&[(0.5, 0.5), (0.500001, 0.500001)]);
		let mut s = Simplifier::new();
		s.set_pixel_error(0.5);
		s.compute_threshold(0, 0, 256);
		assert!(s.is_subpixel_feature(&g));
		s.compute_threshold(20, 0, 256);
		assert!(!s.is_subpixel_feature(&g));

		let mut culler = FeatureCuller::new();
		culler.set_pixel_error(0.5);
		culler.compute_threshold(0, 256);
		assert!(culler.is_subpixel_feature(&g));
		culler.compute_threshold(22, 256);
		assert!(!culler.is_subpixel_feature(&g));
	}

	#[test]
	fn points_are_never_subpixel() {
		let g = Geode::new_point(PrimType::Point, Vertex::new_2d(0.5, 0.5));
		let s = simplifier_at(0, 0.5);
		assert!(!s.is_subpixel_feature(&g));
	}
}
