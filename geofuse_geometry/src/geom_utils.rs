//! Small planar geometry helpers shared by the clipping and reduction
//! passes.

use crate::types::Vertex;

/// Euclidean distance from `p` to the segment `a → b` (planar).
pub fn point_segment_distance(p: &Vertex, a: &Vertex, b: &Vertex) -> f64 {
	let abx = b.x - a.x;
	let aby = b.y - a.y;
	let len_sq = abx * abx + aby * aby;
	if len_sq == 0.0 {
		return p.distance_2d(a);
	}
	let t = ((p.x - a.x) * abx + (p.y - a.y) * aby) / len_sq;
	let t = t.clamp(0.0, 1.0);
	let proj = Vertex::new_2d(a.x + t * abx, a.y + t * aby);
	p.distance_2d(&proj)
}

/// Even-odd point-in-polygon over a set of cycles (outer plus holes).
/// Cycles may be closed (first == last) or open.
pub fn point_in_cycles(cycles: &[Vec<Vertex>], x: f64, y: f64) -> bool {
	let mut inside = false;
	for cycle in cycles {
		let n = effective_len(cycle);
		if n < 3 {
			continue;
		}
		let mut j = n - 1;
		for i in 0..n {
			let vi = &cycle[i];
			let vj = &cycle[j];
			if ((vi.y > y) != (vj.y > y)) && (x < (vj.x - vi.x) * (y - vi.y) / (vj.y - vi.y) + vi.x) {
				inside = !inside;
			}
			j = i;
		}
	}
	inside
}

/// Twice the signed area of a cycle (positive for counterclockwise).
pub fn signed_area_2x(cycle: &[Vertex]) -> f64 {
	let n = effective_len(cycle);
	if n < 3 {
		return 0.0;
	}
	let mut sum = 0.0;
	let mut j = n - 1;
	for i in 0..n {
		sum += cycle[j].x * cycle[i].y - cycle[i].x * cycle[j].y;
		j = i;
	}
	sum
}

/// Vertex count ignoring an explicit closing vertex.
fn effective_len(cycle: &[Vertex]) -> usize {
	match (cycle.first(), cycle.last()) {
		(Some(first), Some(last)) if cycle.len() > 1 && first.same_xy(last) => cycle.len() - 1,
		_ => cycle.len(),
	}
}
