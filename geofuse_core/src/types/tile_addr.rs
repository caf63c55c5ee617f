//! A single tile address within a level.

use crate::types::{Extents, LevelCoverage, Tilespace};

/// `(level, row, col)` address of one tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileAddr {
	pub level: u32,
	pub row: u32,
	pub col: u32,
}

impl TileAddr {
	#[must_use]
	pub fn new(level: u32, row: u32, col: u32) -> Self {
		Self { level, row, col }
	}

	/// Move this address up `levels` toward the root.
	pub fn minify_by(&mut self, levels: u32) {
		debug_assert!(levels <= self.level);
		self.level -= levels;
		self.row >>= levels;
		self.col >>= levels;
	}

	/// The ancestor tile at `level` (which must be at or above this one).
	#[must_use]
	pub fn minified_to_level(&self, level: u32) -> TileAddr {
		debug_assert!(level <= self.level);
		let diff = self.level - level;
		TileAddr::new(level, self.row >> diff, self.col >> diff)
	}

	/// The block of descendant tiles at `level` (at or below this one).
	#[must_use]
	pub fn magnified_to_level(&self, level: u32) -> LevelCoverage {
		debug_assert!(level >= self.level);
		let diff = level - self.level;
		LevelCoverage::new(
			level,
			Extents::from_row_col(
				self.row << diff,
				(self.row + 1) << diff,
				self.col << diff,
				(self.col + 1) << diff,
			),
		)
	}

	/// This tile's footprint in normalized `[0, 1]²` space.
	#[must_use]
	pub fn norm_extents(&self, tilespace: &Tilespace) -> Extents<f64> {
		let tiles = f64::from(tilespace.tiles_at_level(self.level));
		Extents::from_xy(
			f64::from(self.col) / tiles,
			f64::from(self.col + 1) / tiles,
			f64::from(self.row) / tiles,
			f64::from(self.row + 1) / tiles,
		)
	}
}
