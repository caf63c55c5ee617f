//! Tile coverage of a region at one level.

use crate::types::{Extents, TileAddr, Tilespace};
use anyhow::{Result, ensure};

/// A rectangular block of tiles at a single level.
///
/// Scaling between levels always preserves supersets: magnifying multiplies
/// the extents by two per level, minifying halves the begin downward and the
/// end upward, so the coarse coverage still contains every fine tile.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LevelCoverage {
	pub level: u32,
	pub extents: Extents<u32>,
}

impl LevelCoverage {
	#[must_use]
	pub fn new(level: u32, extents: Extents<u32>) -> Self {
		Self { level, extents }
	}

	/// Snap normalized `[0,1]²` extents to the tile grid at `fullres_level`,
	/// then scale to `target_level`.
	///
	/// Extents that end exactly on a tile boundary do not spill into the
	/// next tile; degenerate (point) extents still occupy one tile.
	#[must_use]
	pub fn from_norm_extents(
		tilespace: &Tilespace,
		norm_extents: &Extents<f64>,
		fullres_level: u32,
		target_level: u32,
	) -> Self {
		let tiles = f64::from(tilespace.tiles_at_level(fullres_level));

		let clamp = |norm: f64| norm.clamp(0.0, 1.0);
		let mut begin_row = (clamp(norm_extents.south()) * tiles).floor() as u32;
		let mut end_row = (clamp(norm_extents.north()) * tiles).ceil() as u32;
		let mut begin_col = (clamp(norm_extents.west()) * tiles).floor() as u32;
		let mut end_col = (clamp(norm_extents.east()) * tiles).ceil() as u32;

		let max = tiles as u32;
		begin_row = begin_row.min(max.saturating_sub(1));
		begin_col = begin_col.min(max.saturating_sub(1));
		end_row = end_row.clamp(begin_row + 1, max.max(begin_row + 1));
		end_col = end_col.clamp(begin_col + 1, max.max(begin_col + 1));

		Self::new(
			fullres_level,
			Extents::from_row_col(begin_row, end_row, begin_col, end_col),
		)
		.scaled_to_level(target_level)
	}

	/// Like [`LevelCoverage::from_norm_extents`] but grows the extents first
	/// by `tile_size × oversize_factor / 2` pixels (normalized at
	/// `fullres_level`), so features whose labels or icons reach into a
	/// neighboring tile still land in it.
	#[must_use]
	pub fn from_norm_extents_with_oversize_factor(
		tilespace: &Tilespace,
		norm_extents: &Extents<f64>,
		fullres_level: u32,
		target_level: u32,
		oversize_factor: f64,
	) -> Self {
		let mut expanded = *norm_extents;
		if oversize_factor > 0.0 {
			let expand_pixel = f64::from(tilespace.tile_size()) * (oversize_factor / 2.0);
			let num_pixel_world = tilespace.pixels_at_level(fullres_level) as f64;
			expanded.expand_by(expand_pixel / num_pixel_world);
		}
		Self::from_norm_extents(tilespace, &expanded, fullres_level, target_level)
	}

	/// [`LevelCoverage::from_norm_extents`] followed by a world crop.
	#[must_use]
	pub fn from_norm_extents_with_crop(
		tilespace: &Tilespace,
		norm_extents: &Extents<f64>,
		fullres_level: u32,
		target_level: u32,
	) -> Self {
		let mut cov = Self::from_norm_extents(tilespace, norm_extents, fullres_level, target_level);
		cov.crop_to_world(tilespace);
		cov
	}

	/// Scale the extents down `levels` times (×2 per level).
	#[must_use]
	pub fn magnified_by(&self, levels: u32) -> Self {
		Self::new(
			self.level + levels,
			Extents::from_row_col(
				self.extents.begin_row() << levels,
				self.extents.end_row() << levels,
				self.extents.begin_col() << levels,
				self.extents.end_col() << levels,
			),
		)
	}

	/// Scale the extents up `levels` times, rounding outward so the result
	/// still covers every original tile.
	#[must_use]
	pub fn minified_by(&self, levels: u32) -> Self {
		debug_assert!(levels <= self.level);
		let round_up = |v: u32| v.div_ceil(1 << levels);
		Self::new(
			self.level - levels,
			Extents::from_row_col(
				self.extents.begin_row() >> levels,
				round_up(self.extents.end_row()),
				self.extents.begin_col() >> levels,
				round_up(self.extents.end_col()),
			),
		)
	}

	#[must_use]
	pub fn magnified_to_level(&self, level: u32) -> Self {
		debug_assert!(level >= self.level);
		self.magnified_by(level - self.level)
	}

	#[must_use]
	pub fn minified_to_level(&self, level: u32) -> Self {
		debug_assert!(level <= self.level);
		self.minified_by(self.level - level)
	}

	/// Magnify or minify to `level` as needed.
	#[must_use]
	pub fn scaled_to_level(&self, level: u32) -> Self {
		if level >= self.level {
			self.magnified_to_level(level)
		} else {
			self.minified_to_level(level)
		}
	}

	/// Clamp the extents to the valid row/column range at this level.
	pub fn crop_to_world(&mut self, tilespace: &Tilespace) {
		let world = tilespace.tiles_at_level(self.level);
		self.extents = Extents::intersection(&self.extents, &Extents::from_row_col(0, world, 0, world));
	}

	pub fn num_tiles(&self) -> u64 {
		u64::from(self.extents.num_rows()) * u64::from(self.extents.num_cols())
	}

	pub fn contains(&self, addr: &TileAddr) -> bool {
		addr.level == self.level && self.extents.contains_row_col(addr.row, addr.col)
	}

	/// This coverage's footprint in normalized space.
	#[must_use]
	pub fn norm_extents(&self, tilespace: &Tilespace) -> Extents<f64> {
		let tiles = f64::from(tilespace.tiles_at_level(self.level));
		Extents::from_row_col(
			f64::from(self.extents.begin_row()) / tiles,
			f64::from(self.extents.end_row()) / tiles,
			f64::from(self.extents.begin_col()) / tiles,
			f64::from(self.extents.end_col()) / tiles,
		)
	}

	/// Split the row range into `subset_total` near-equal bands and return
	/// band `subset_this`. Bands are independent, so callers can process
	/// them in parallel and merge the outputs.
	pub fn get_subset(&self, subset_this: u32, subset_total: u32) -> Result<Self> {
		ensure!(
			subset_this < subset_total,
			"invalid subset specification ({subset_this} of {subset_total})"
		);
		let rows = self.extents.num_rows();
		let per_subset = rows.div_ceil(subset_total);
		let begin_row = self.extents.begin_row() + subset_this * per_subset;
		let end_row = (begin_row + per_subset).min(self.extents.end_row());
		if begin_row >= end_row {
			return Ok(Self::new(self.level, Extents::new_empty()));
		}
		Ok(Self::new(
			self.level,
			Extents::from_row_col(begin_row, end_row, self.extents.begin_col(), self.extents.end_col()),
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::FUSION_TILESPACE;
	use rstest::rstest;

	#[test]
	fn norm_extents_snap_to_grid() {
		// level 11 has 256 tiles per axis
		let norm = Extents::from_nsew(0.75, 0.5, 0.5, 0.25);
		let cov = LevelCoverage::from_norm_extents(&FUSION_TILESPACE, &norm, 11, 11);
		assert_eq!(cov.level, 11);
		assert_eq!(cov.extents, Extents::from_row_col(128, 192, 64, 128));
	}

	#[test]
	fn point_extents_occupy_one_tile() {
		let point = Extents::from_nsew(0.5, 0.5, 0.5, 0.5);
		let cov = LevelCoverage::from_norm_extents(&FUSION_TILESPACE, &point, 11, 11);
		assert_eq!(cov.num_tiles(), 1);
	}

	#[test]
	fn minify_preserves_superset() {
		let cov = LevelCoverage::new(10, Extents::from_row_col(5, 9, 3, 7));
		let min = cov.minified_by(2);
		assert_eq!(min.level, 8);
		assert_eq!(min.extents, Extents::from_row_col(1, 3, 0, 2));

		// every original tile is inside the magnified-back coverage
		let back = min.magnified_by(2);
		assert!(back.extents.contains(&cov.extents));
	}

	#[rstest]
	#[case(8, 12)]
	#[case(11, 11)]
	fn scaled_to_level_round_trip(#[case] down: u32, #[case] up: u32) {
		let cov = LevelCoverage::new(10, Extents::from_row_col(4, 8, 4, 8));
		let scaled = cov.scaled_to_level(down).scaled_to_level(up);
		assert_eq!(scaled.level, up);
	}

	#[test]
	fn crop_clamps_to_world() {
		let mut cov = LevelCoverage::new(4, Extents::from_row_col(1, 5, 0, 9));
		cov.crop_to_world(&FUSION_TILESPACE); // 2 tiles per axis at level 4
		assert_eq!(cov.extents, Extents::from_row_col(1, 2, 0, 2));
	}

	#[test]
	fn oversize_factor_expands_coverage() {
		let norm = Extents::from_nsew(0.500001, 0.499999, 0.500001, 0.499999);
		let plain = LevelCoverage::from_norm_extents(&FUSION_TILESPACE, &norm, 11, 11);
		let oversized =
			LevelCoverage::from_norm_extents_with_oversize_factor(&FUSION_TILESPACE, &norm, 11, 11, 0.25);
		assert!(oversized.num_tiles() > plain.num_tiles());
		assert!(oversized.extents.contains(&plain.extents));
	}

	#[test]
	fn subsets_partition_rows() {
		let cov = LevelCoverage::new(6, Extents::from_row_col(0, 7, 2, 5));
		let mut total = 0;
		for i in 0..3 {
			let sub = cov.get_subset(i, 3).unwrap();
			total += sub.num_tiles();
		}
		assert_eq!(total, cov.num_tiles());
		assert!(cov.get_subset(3, 3).is_err());
	}
}
