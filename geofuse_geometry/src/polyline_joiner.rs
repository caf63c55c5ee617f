//! Duplicate removal and joining of polylines at degree-two vertices.
//!
//! Input is a list of polylines sharing a key (typically a road name).
//! Endpoints landing on the same geometric vertex form a group; within a
//! group, exact duplicates (same vertex sequence in either direction) are
//! emptied, polylines whose both ends sit in the group are cycles and never
//! merge there, and if exactly two survivors remain they become *merge
//! partners*. Chains of partners are then merged into one polyline each:
//! first the open chains, then pure cycles. Consumed polylines are left
//! empty in place so caller-side indices stay stable.

use crate::types::{Geode, GeodeList, PrimType, Vertex};

const FIRST: usize = 0;
const LAST: usize = 1;

#[derive(Clone, Copy)]
struct SegmentEnd {
	seg: usize,
	is_last: bool,
	x: f64,
	y: f64,
}

impl SegmentEnd {
	fn id(&self) -> usize {
		self.seg * 2 + usize::from(self.is_last)
	}
}

/// Joins polylines that meet at degree-two vertices and removes duplicates.
pub struct PolylineJoiner;

impl PolylineJoiner {
	/// Returns `(num_duplicates, num_joined)`. Duplicate and consumed
	/// polylines are emptied in place.
	pub fn remove_duplicates_and_join(glist: &mut GeodeList) -> (u64, u64) {
		let n = glist.len();
		let mut ends: Vec<SegmentEnd> = Vec::with_capacity(n * 2);
		let mut alive = vec![false; n];
		let mut is_cycle = vec![false; n];

		for (seg, geode) in glist.iter().enumerate() {
			debug_assert!(
				geode.flat_prim_type() == PrimType::PolyLine || geode.flat_prim_type() == PrimType::Street,
				"polyline joiner fed a non-line geode"
			);
			debug_assert!(geode.num_parts() <= 1, "polyline joiner requires single-part geodes");
			let (Some(first), Some(last)) = (geode.first_vertex(0), geode.last_vertex(0)) else {
				continue;
			};
			if geode.vertex_count(0) == 0 {
				continue;
			}
			alive[seg] = true;
			is_cycle[seg] = first.same_xy(&last);
			ends.push(SegmentEnd {
				seg,
				is_last: false,
				x: first.x,
				y: first.y,
			});
			ends.push(SegmentEnd {
				seg,
				is_last: true,
				x: last.x,
				y: last.y,
			});
		}
		if ends.is_empty() {
			return (0, 0);
		}

		ends.sort_by(|a, b| {
			a.x
				.partial_cmp(&b.x)
				.unwrap_or(std::cmp::Ordering::Equal)
				.then(a.y.partial_cmp(&b.y).unwrap_or(std::cmp::Ordering::Equal))
		});

		let mut num_duplicates = 0u64;
		let mut partner: Vec<Option<usize>> = vec![None; n * 2];

		// walk groups of ends sharing one geometric vertex
		let mut start = 0;
		while start < ends.len() {
			let mut stop = start + 1;
			while stop < ends.len() && ends[stop].x == ends[start].x && ends[stop].y == ends[start].y {
				stop += 1;
			}
			let group = &ends[start..stop];

			// duplicates first, so partners are only assigned among survivors
			for i in 0..group.len() {
				for j in i + 1..group.len() {
					let (si, sj) = (group[i].seg, group[j].seg);
					if si == sj || !alive[si] || !alive[sj] || is_cycle[si] || is_cycle[sj] {
						continue;
					}
					if glist[si].is_equal(&glist[sj], false) || glist[si].is_equal(&glist[sj], true) {
						glist[sj].clear();
						alive[sj] = false;
						num_duplicates += 1;
					}
				}
			}

			// a cycle at this vertex blocks merging: the two labels of the
			// joined segments would be ambiguous
			let cycle_here = group.iter().any(|e| alive[e.seg] && is_cycle[e.seg]);
			if !cycle_here {
				let survivors: Vec<&SegmentEnd> =
					group.iter().filter(|e| alive[e.seg] && !is_cycle[e.seg]).collect();
				if survivors.len() == 2 && survivors[0].seg != survivors[1].seg {
					partner[survivors[0].id()] = Some(survivors[1].id());
					partner[survivors[1].id()] = Some(survivors[0].id());
				}
			}

			start = stop;
		}

		let mut num_joined = 0u64;

		// open chains start at a partnerless end whose far end has a partner
		for end_id in 0..n * 2 {
			if !alive[end_id / 2] || partner[end_id].is_some() || partner[end_id ^ 1].is_none() {
				continue;
			}
			num_joined += merge_chain(glist, &mut partner, end_id);
		}

		// remaining partner pairs are pure cycles
		for end_id in 0..n * 2 {
			let Some(p) = partner[end_id] else { continue };
			partner[p] = None;
			partner[end_id] = None;
			num_joined += merge_chain(glist, &mut partner, end_id);
		}

		(num_duplicates, num_joined)
	}
}

/// Follow partner links from the far end of `start_end`'s polyline, folding
/// every consumed neighbor's vertices into the base polyline. Returns how
/// many neighbors were consumed.
fn merge_chain(glist: &mut GeodeList, partner: &mut [Option<usize>], start_end: usize) -> u64 {
	let base = start_end / 2;
	let extend_at_back = start_end % 2 == FIRST;

	let mut acquired: Vec<Vertex> = Vec::new();
	let mut consumed = 0u64;
	let mut cursor = start_end ^ 1;
	loop {
		let Some(p) = partner[cursor] else { break };
		partner[cursor] = None;
		partner[p] = None;

		let next_seg = p / 2;
		let mut vertices = take_vertices(&mut glist[next_seg]);
		if p % 2 == LAST {
			vertices.reverse();
		}
		// drop the shared endpoint
		acquired.extend(vertices.into_iter().skip(1));
		glist[next_seg].clear();
		consumed += 1;
		cursor = p ^ 1;
	}

	if consumed > 0 {
		let mut vertices = take_vertices(&mut glist[base]);
		if extend_at_back {
			vertices.extend(acquired);
		} else {
			acquired.reverse();
			acquired.extend(vertices);
			vertices = acquired;
		}
		put_vertices(&mut glist[base], vertices);
	}
	consumed
}

fn take_vertices(geode: &mut Geode) -> Vec<Vertex> {
	if let Geode::Lines { parts, .. } = geode {
		if parts.is_empty() {
			Vec::new()
		} else {
			std::mem::take(&mut parts[0])
		}
	} else {
		Vec::new()
	}
}

fn put_vertices(geode: &mut Geode, vertices: Vec<Vertex>) {
	if let Geode::Lines { parts, .. } = geode {
		if parts.is_empty() {
			parts.push(vertices);
		} else {
			parts[0] = vertices;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn line(vertices: &[Vertex]) -> Geode {
		let mut g = Geode::new_lines(PrimType::PolyLine);
		for vertex in vertices {
			g.add_vertex(*vertex);
		}
		g
	}

	fn fixture_vertices() -> Vec<Vertex> {
		[
			(0.0, 0.0),
			(10.0, 0.0),
			(10.0, -5.0),
			(15.0, -5.0),
			(15.0, 5.0),
			(15.0, 25.0),
			(12.0, 24.0),
			(18.0, 3.0),
			(20.0, 3.0),
			(22.0, 5.0),
			(24.0, 5.0),
		]
		.iter()
		.map(|&(x, y)| Vertex::new_2d(x, y))
		.collect()
	}

	#[test]
	fn removes_all_duplicates_of_a_segment() {
		let v0 = Vertex::new_2d(0.05550, 0.42920);
		let v1 = Vertex::new_2d(0.05549, 0.42919);
		let mut glist = vec![
			line(&[v0, v1]),
			line(&[v1, v0]),
			line(&[v0, v1]),
			line(&[v1, v0]),
		];
		let (duplicates, joined) = PolylineJoiner::remove_duplicates_and_join(&mut glist);
		assert_eq!(duplicates, 3);
		assert_eq!(joined, 0);
		assert_eq!(glist[0].total_vertex_count(), 2);
		assert_eq!(glist[1].total_vertex_count(), 0);
		assert_eq!(glist[2].total_vertex_count(), 0);
		assert_eq!(glist[3].total_vertex_count(), 0);
	}

	#[test]
	fn joins_simple_chain_with_duplicate() {
		let v = fixture_vertices();
		let v11 = Vertex::new_2d(9.0, 0.0);
		let mut glist = vec![
			line(&[v[0], v[1]]),
			line(&[v[0], v[1]]), // duplicate
			line(&[v11, v[1]]),
		];
		let (duplicates, joined) = PolylineJoiner::remove_duplicates_and_join(&mut glist);
		assert_eq!(duplicates, 1);
		assert_eq!(joined, 1);

		assert_eq!(glist[0].total_vertex_count(), 3);
		assert_eq!(glist[0].get_vertex(0, 0), v[0]);
		assert_eq!(glist[0].get_vertex(0, 1), v[1]);
		assert_eq!(glist[0].get_vertex(0, 2), v11);
		assert_eq!(glist[1].total_vertex_count(), 0);
		assert_eq!(glist[2].total_vertex_count(), 0);
	}

	#[test]
	fn joins_chains_and_respects_cycles() {
		let v = fixture_vertices();
		let mut glist = vec![
			line(&[v[0], v[1]]),                // [0] simple segment
			line(&[v[1], v[2], v[3], v[1]]),    // [1] cycle at v1
			line(&[v[1], v[4], v[5]]),          // [2] half cycle
			line(&[v[5], v[6], v[1]]),          // [3] other half
			line(&[v[1], v[7]]),                // [4] simple segment
			line(&[v[7], v[8]]),                // [5] simple segment
			line(&[v[8], v[9], v[10], v[8]]),   // [6] cycle at v8
			line(&[v[7], v[8]]),                // [7] duplicate of [5]
		];
		let backup0 = glist[0].clone();
		let backup1 = glist[1].clone();
		let backup6 = glist[6].clone();

		let (duplicates, joined) = PolylineJoiner::remove_duplicates_and_join(&mut glist);
		assert_eq!(duplicates, 1);
		assert_eq!(joined, 2);
		assert_eq!(glist.len(), 8);

		// untouched: the lone segment and both cycles
		assert_eq!(glist[0], backup0);
		assert_eq!(glist[1], backup1);
		assert_eq!(glist[6], backup6);

		// [2] absorbed [3] into the closed chain v1-v4-v5-v6-v1
		assert_eq!(glist[2].total_vertex_count(), 5);
		assert_eq!(glist[2].get_vertex(0, 0), v[1]);
		assert_eq!(glist[2].get_vertex(0, 1), v[4]);
		assert_eq!(glist[2].get_vertex(0, 2), v[5]);
		assert_eq!(glist[2].get_vertex(0, 3), v[6]);
		assert_eq!(glist[2].get_vertex(0, 4), v[1]);
		assert_eq!(glist[3].total_vertex_count(), 0);

		// [4] absorbed [5] into v1-v7-v8
		assert_eq!(glist[4].total_vertex_count(), 3);
		assert_eq!(glist[4].get_vertex(0, 0), v[1]);
		assert_eq!(glist[4].get_vertex(0, 1), v[7]);
		assert_eq!(glist[4].get_vertex(0, 2), v[8]);
		assert_eq!(glist[5].total_vertex_count(), 0);
		assert_eq!(glist[7].total_vertex_count(), 0);

		// every join drops exactly the shared endpoint
		let remaining: usize = glist.iter().map(Geode::total_vertex_count).sum();
		assert_eq!(remaining, 22 - 2 /* duplicate */ - 2 /* shared endpoints */);
	}

	#[test]
	fn merges_pure_cycle_of_segments() {
		let a = Vertex::new_2d(0.0, 0.0);
		let b = Vertex::new_2d(1.0, 0.0);
		let c = Vertex::new_2d(0.5, 1.0);
		let mut glist = vec![line(&[a, b]), line(&[b, c]), line(&[c, a])];

		let (duplicates, joined) = PolylineJoiner::remove_duplicates_and_join(&mut glist);
		assert_eq!(duplicates, 0);
		assert_eq!(joined, 2);

		let survivors: Vec<&Geode> = glist.iter().filter(|g| !g.is_empty()).collect();
		assert_eq!(survivors.len(), 1);
		assert_eq!(survivors[0].total_vertex_count(), 4);
		assert!(
			survivors[0]
				.first_vertex(0)
				.unwrap()
				.same_xy(&survivors[0].last_vertex(0).unwrap())
		);
	}

	#[test]
	fn empty_input_is_fine() {
		let mut glist: GeodeList = Vec::new();
		assert_eq!(PolylineJoiner::remove_duplicates_and_join(&mut glist), (0, 0));

		let mut one = vec![line(&[Vertex::new_2d(0.0, 0.0), Vertex::new_2d(1.0, 0.0)])];
		assert_eq!(PolylineJoiner::remove_duplicates_and_join(&mut one), (0, 0));
		assert_eq!(one[0].total_vertex_count(), 2);
	}
}
