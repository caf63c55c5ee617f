//! Per-tile covered-by-feature records.
//!
//! Where a single feature's polygon fully contains a tile, clipping the
//! feature against that tile always yields the tile itself. The coverage
//! mask remembers which feature that was, so the preparation pass can emit
//! a quad-sized polygon directly instead of clipping.

use crate::types::{InsetCoverage, TileAddr};

#[derive(Clone, Debug)]
struct LevelCoverageMask {
	extents: crate::types::Extents<u32>,
	ids: Vec<Option<u32>>,
}

/// Records, per tile, the feature id that fully covers it (if any).
#[derive(Clone, Debug)]
pub struct CoverageMask {
	begin_level: u32,
	end_level: u32,
	levels: Vec<Option<LevelCoverageMask>>,
}

impl CoverageMask {
	/// Build over an inset coverage with every tile uncovered.
	#[must_use]
	pub fn new(coverage: &InsetCoverage) -> Self {
		let mut levels = vec![None; crate::types::NUM_FUSION_LEVELS as usize];
		for level in coverage.begin_level()..coverage.end_level() {
			let extents = *coverage.level_extents(level);
			let count = (extents.num_rows() * extents.num_cols()) as usize;
			levels[level as usize] = Some(LevelCoverageMask {
				extents,
				ids: vec![None; count],
			});
		}
		Self {
			begin_level: coverage.begin_level(),
			end_level: coverage.end_level(),
			levels,
		}
	}

	pub fn begin_level(&self) -> u32 {
		self.begin_level
	}

	pub fn end_level(&self) -> u32 {
		self.end_level
	}

	fn slot(&self, addr: &TileAddr) -> Option<usize> {
		let level = self.levels.get(addr.level as usize)?.as_ref()?;
		if !level.extents.contains_row_col(addr.row, addr.col) {
			return None;
		}
		let row = addr.row - level.extents.begin_row();
		let col = addr.col - level.extents.begin_col();
		Some((row * level.extents.num_cols() + col) as usize)
	}

	/// The feature id fully covering `addr`, if one was recorded.
	pub fn get_covered(&self, addr: &TileAddr) -> Option<u32> {
		let slot = self.slot(addr)?;
		self.levels[addr.level as usize].as_ref()?.ids[slot]
	}

	/// Record that `feature_id` fully covers `addr`.
	pub fn set_covered(&mut self, addr: &TileAddr, feature_id: u32) {
		if let Some(slot) = self.slot(addr) {
			if let Some(level) = self.levels[addr.level as usize].as_mut() {
				level.ids[slot] = Some(feature_id);
			}
		}
	}
}
