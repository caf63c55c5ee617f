//! Polygon reconstruction from clipped halfedges.
//!
//! The clipper produces a soup of directed edges: fragments of the source
//! polygon's edges plus synthesized window-boundary edges. All edges keep
//! the region interior on their left. This module reconnects them into
//! oriented rings, nests holes into their outer rings and, when asked,
//! cuts each hole into its outer ring with a bridge so every output part
//! is a single simple cycle.
//!
//! The edge graph lives in a flat arena addressed by integer indices; ring
//! walking never chases pointers.

use crate::{
	geom_utils,
	types::{EdgeFlag, Geode, PrimType, Vertex},
};
use std::collections::HashMap;

/// A directed edge with the interior on its left.
#[derive(Clone, Copy, Debug)]
pub struct BuildEdge {
	pub v0: Vertex,
	pub v1: Vertex,
	pub flag: EdgeFlag,
}

/// One reconstructed ring: vertices paired with the flag of the edge
/// leaving them.
type Ring = Vec<(Vertex, EdgeFlag)>;

/// Quantization grid for endpoint matching. Coordinates are normalized
/// (|x| ≤ 1), so 2^47 keeps ~15 significant digits.
const QUANT: f64 = (1u64 << 47) as f64;

fn key(v: &Vertex) -> (i64, i64) {
	((v.x * QUANT).round() as i64, (v.y * QUANT).round() as i64)
}

/// Reconnects clipped halfedges into polygons.
pub struct PolygonBuilder {
	cut_holes: bool,
}

impl PolygonBuilder {
	#[must_use]
	pub fn new(cut_holes: bool) -> Self {
		Self { cut_holes }
	}

	/// Build output polygons of type `prim` from the edge soup.
	pub fn build(&self, prim: PrimType, edges: &[BuildEdge]) -> Vec<Geode> {
		let rings = walk_rings(edges);
		if rings.is_empty() {
			return Vec::new();
		}

		// classify by orientation
		let mut outers: Vec<Ring> = Vec::new();
		let mut holes: Vec<Ring> = Vec::new();
		for ring in rings {
			let cycle: Vec<Vertex> = ring.iter().map(|(v, _)| *v).collect();
			if geom_utils::signed_area_2x(&cycle) >= 0.0 {
				outers.push(ring);
			} else {
				holes.push(ring);
			}
		}

		// nest each hole into the outer ring containing it
		let mut nested: Vec<Vec<Ring>> = outers.iter().map(|_| Vec::new()).collect();
		for hole in holes {
			let probe = hole[0].0;
			let owner = outers.iter().position(|outer| {
				let cycle: Vec<Vertex> = outer.iter().map(|(v, _)| *v).collect();
				geom_utils::point_in_cycles(std::slice::from_ref(&cycle), probe.x, probe.y)
			});
			if let Some(owner) = owner {
				nested[owner].push(hole);
			}
			// a hole with no owner is a clipping artifact; drop it
		}

		outers
			.into_iter()
			.zip(nested)
			.map(|(outer, outer_holes)| self.assemble(prim, outer, outer_holes))
			.collect()
	}

	fn assemble(&self, prim: PrimType, mut outer: Ring, holes: Vec<Ring>) -> Geode {
		if self.cut_holes {
			for hole in holes {
				bridge_hole(&mut outer, hole);
			}
			let (cycle, flags) = close_ring(outer);
			Geode::new_polygon(prim, vec![cycle], flags)
		} else {
			let (cycle, flags) = close_ring(outer);
			let mut parts = vec![cycle];
			for hole in holes {
				parts.push(close_ring(hole).0);
			}
			Geode::new_polygon(prim, parts, flags)
		}
	}
}

/// Close the ring by repeating its first vertex; the closing vertex carries
/// the last edge's flag.
fn close_ring(ring: Ring) -> (Vec<Vertex>, Vec<EdgeFlag>) {
	let mut cycle: Vec<Vertex> = ring.iter().map(|(v, _)| *v).collect();
	let mut flags: Vec<EdgeFlag> = ring.iter().map(|(_, f)| *f).collect();
	if let (Some(first), Some((_, last_flag))) = (cycle.first().copied(), ring.last()) {
		cycle.push(first);
		flags.push(*last_flag);
	}
	(cycle, flags)
}

/// Trace closed rings out of the edge soup.
///
/// At a junction with several unused outgoing edges, the continuation is
/// the one turning most sharply left relative to the incoming direction,
/// which keeps each traced face simple.
fn walk_rings(edges: &[BuildEdge]) -> Vec<Ring> {
	let mut outgoing: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
	for (i, e) in edges.iter().enumerate() {
		if key(&e.v0) == key(&e.v1) {
			continue; // zero-length edge
		}
		outgoing.entry(key(&e.v0)).or_default().push(i);
	}

	let mut used = vec![false; edges.len()];
	let mut rings = Vec::new();

	for start in 0..edges.len() {
		if used[start] || key(&edges[start].v0) == key(&edges[start].v1) {
			continue;
		}
		let mut ring: Ring = Vec::new();
		let start_key = key(&edges[start].v0);
		let mut current = start;
		let mut ok = true;
		loop {
			used[current] = true;
			let e = &edges[current];
			ring.push((e.v0, e.flag));
			let at = key(&e.v1);
			if at == start_key {
				break;
			}
			let candidates = outgoing.get(&at).map_or(&[][..], Vec::as_slice);
			let incoming = (e.v1.x - e.v0.x, e.v1.y - e.v0.y);
			let next = candidates
				.iter()
				.copied()
				.filter(|&c| !used[c])
				.min_by(|&a, &b| {
					let ta = left_turn_rank(incoming, &edges[a]);
					let tb = left_turn_rank(incoming, &edges[b]);
					ta.partial_cmp(&tb).unwrap_or(std::cmp::Ordering::Equal)
				});
			match next {
				Some(next) => current = next,
				None => {
					// open chain: a numeric tangency broke the loop
					log::debug!("dropping open ring of {} edges", ring.len());
					ok = false;
					break;
				}
			}
		}
		if ok && ring.len() >= 3 {
			rings.push(ring);
		}
	}
	rings
}

/// Rank an outgoing edge by how sharply it turns left from `incoming`;
/// smaller ranks turn harder left.
fn left_turn_rank(incoming: (f64, f64), outgoing: &BuildEdge) -> f64 {
	let out = (outgoing.v1.x - outgoing.v0.x, outgoing.v1.y - outgoing.v0.y);
	let angle_in = incoming.1.atan2(incoming.0);
	let angle_out = out.1.atan2(out.0);
	// signed turn in (-π, π]; left turns positive
	let mut turn = angle_out - angle_in;
	while turn <= -std::f64::consts::PI {
		turn += 2.0 * std::f64::consts::PI;
	}
	while turn > std::f64::consts::PI {
		turn -= 2.0 * std::f64::consts::PI;
	}
	-turn
}

/// Splice `hole` (clockwise) into `outer` (counterclockwise) with a bridge
/// at the hole's easternmost vertex, flagged [`EdgeFlag::HoleCut`].
fn bridge_hole(outer: &mut Ring, hole: Ring) {
	// easternmost hole vertex
	let hi = hole
		.iter()
		.enumerate()
		.max_by(|(_, a), (_, b)| a.0.x.partial_cmp(&b.0.x).unwrap_or(std::cmp::Ordering::Equal))
		.map_or(0, |(i, _)| i);
	let hv = hole[hi].0;

	// nearest outer edge hit by the +x ray from hv
	let mut best: Option<(usize, f64)> = None;
	for j in 0..outer.len() {
		let a = outer[j].0;
		let b = outer[(j + 1) % outer.len()].0;
		if (a.y > hv.y) == (b.y > hv.y) {
			continue;
		}
		let t = (hv.y - a.y) / (b.y - a.y);
		let x = a.x + t * (b.x - a.x);
		if x >= hv.x && best.is_none_or(|(_, bx)| x < bx) {
			best = Some((j, x));
		}
	}
	let Some((j, ix)) = best else {
		log::debug!("hole bridge found no outer edge; dropping hole");
		return;
	};
	let bridge_point = Vertex::new(ix, hv.y, hv.z);
	let split_flag = outer[j].1;

	// outer[0..=j], bridge point, hole from hi around, hole[hi] again,
	// bridge point, outer[j+1..]
	let mut merged: Ring = Vec::with_capacity(outer.len() + hole.len() + 3);
	merged.extend_from_slice(&outer[..=j]);
	merged.last_mut().unwrap().1 = split_flag;
	merged.push((bridge_point, EdgeFlag::HoleCut));
	for k in 0..hole.len() {
		merged.push(hole[(hi + k) % hole.len()]);
	}
	merged.push((hv, EdgeFlag::HoleCut));
	merged.push((bridge_point, split_flag));
	merged.extend_from_slice(&outer[j + 1..]);
	*outer = merged;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn v(x: f64, y: f64) -> Vertex {
		Vertex::new_2d(x, y)
	}

	fn square_edges(flag: EdgeFlag) -> Vec<BuildEdge> {
		let c = [v(0.0, 0.0), v(1.0, 0.0), v(1.0, 1.0), v(0.0, 1.0)];
		(0..4)
			.map(|i| BuildEdge {
				v0: c[i],
				v1: c[(i + 1) % 4],
				flag,
			})
			.collect()
	}

	#[test]
	fn rebuilds_single_ring() {
		let builder = PolygonBuilder::new(true);
		let out = builder.build(PrimType::Polygon, &square_edges(EdgeFlag::Normal));
		assert_eq!(out.len(), 1);
		assert_eq!(out[0].vertex_count(0), 5); // closed
		assert_eq!(out[0].first_vertex(0), out[0].last_vertex(0));
	}

	#[test]
	fn nests_and_keeps_holes_without_cutting() {
		let mut edges = square_edges(EdgeFlag::Normal);
		// clockwise inner square = hole
		let h = [v(0.25, 0.25), v(0.25, 0.75), v(0.75, 0.75), v(0.75, 0.25)];
		for i in 0..4 {
			edges.push(BuildEdge {
				v0: h[i],
				v1: h[(i + 1) % 4],
				flag: EdgeFlag::Normal,
			});
		}

		let builder = PolygonBuilder::new(false);
		let out = builder.build(PrimType::Polygon, &edges);
		assert_eq!(out.len(), 1);
		assert_eq!(out[0].num_parts(), 2);
	}

	#[test]
	fn cuts_holes_with_bridge_edges() {
		let mut edges = square_edges(EdgeFlag::Normal);
		let h = [v(0.25, 0.25), v(0.25, 0.75), v(0.75, 0.75), v(0.75, 0.25)];
		for i in 0..4 {
			edges.push(BuildEdge {
				v0: h[i],
				v1: h[(i + 1) % 4],
				flag: EdgeFlag::Normal,
			});
		}

		let builder = PolygonBuilder::new(true);
		let out = builder.build(PrimType::Polygon, &edges);
		assert_eq!(out.len(), 1);
		assert_eq!(out[0].num_parts(), 1);
		// the bridge shows up as HoleCut flags
		assert!(out[0].edge_flags().iter().any(|f| *f == EdgeFlag::HoleCut));
		// all original vertices survive
		assert!(out[0].vertex_count(0) >= 4 + 4 + 2);
	}

	#[test]
	fn separate_rings_become_separate_polygons() {
		let mut edges = square_edges(EdgeFlag::Normal);
		let c = [v(2.0, 2.0), v(3.0, 2.0), v(3.0, 3.0), v(2.0, 3.0)];
		for i in 0..4 {
			edges.push(BuildEdge {
				v0: c[i],
				v1: c[(i + 1) % 4],
				flag: EdgeFlag::QuadCut,
			});
		}
		let out = PolygonBuilder::new(true).build(PrimType::Polygon, &edges);
		assert_eq!(out.len(), 2);
	}
}
