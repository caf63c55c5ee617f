//! Tile coverage of one inset across a range of levels.
//!
//! An inset is a single contiguous source asset's geographic region. Its
//! coverage holds tile extents per level over `[begin_level, end_level)`
//! plus the degree extents it was built from. The type interprets neither
//! level numbers nor tile sizes; constructors take a [`Tilespace`] to build
//! the initial extents but the tilespace is deliberately not stored.

use crate::types::{Extents, LevelCoverage, TileAddr, Tilespace};
use anyhow::{Result, ensure};

/// Per-level tile extents for one inset.
///
/// `begin_level` can move up when [`InsetCoverage::narrow`] proves that the
/// low-resolution levels are wholly redone by other insets; the backing
/// vector keeps its original base so existing level indexes stay valid.
#[derive(Clone, Debug, Default)]
pub struct InsetCoverage {
	/// Level of the first slot in `extents_vec`.
	vec0_level: u32,
	begin_level: u32,
	end_level: u32,
	degree_extents: Extents<f64>,
	extents_vec: Vec<Extents<u32>>,
}

impl InsetCoverage {
	/// Coverage of a single level.
	#[must_use]
	pub fn from_level_coverage(cov: &LevelCoverage) -> Self {
		Self {
			vec0_level: cov.level,
			begin_level: cov.level,
			end_level: cov.level + 1,
			degree_extents: Extents::new_empty(),
			extents_vec: vec![cov.extents],
		}
	}

	/// Coverage from an explicit per-level extents list.
	pub fn from_extents_list(begin_level: u32, end_level: u32, extents_list: Vec<Extents<u32>>) -> Result<Self> {
		ensure!(
			(end_level - begin_level) as usize == extents_list.len(),
			"extents list length ({}) does not match level range [{begin_level}, {end_level})",
			extents_list.len()
		);
		Ok(Self {
			vec0_level: begin_level,
			begin_level,
			end_level,
			degree_extents: Extents::new_empty(),
			extents_vec: extents_list,
		})
	}

	/// Coverage built by scaling one level's extents across a level range,
	/// cropped to the world at every level.
	#[must_use]
	pub fn from_level_coverage_range(
		tilespace: &Tilespace,
		cov: &LevelCoverage,
		begin_level: u32,
		end_level: u32,
	) -> Self {
		let mut extents_list = Vec::with_capacity((end_level - begin_level) as usize);
		for level in begin_level..end_level {
			let mut scaled = cov.scaled_to_level(level);
			scaled.crop_to_world(tilespace);
			extents_list.push(scaled.extents);
		}
		Self::from_extents_list(begin_level, end_level, extents_list).unwrap()
	}

	/// Coverage from normalized extents, minified down from `fullres_level`.
	#[must_use]
	pub fn from_norm_extents(
		tilespace: &Tilespace,
		norm_extents: &Extents<f64>,
		fullres_level: u32,
		begin_level: u32,
		end_level: u32,
	) -> Self {
		let mut cov = Self {
			vec0_level: begin_level,
			begin_level,
			end_level,
			degree_extents: Extents::new_empty(),
			extents_vec: Vec::new(),
		};
		cov.populate_levels(tilespace, norm_extents, fullres_level, 0, 0);
		cov
	}

	/// Coverage from degree extents with optional step-out and padding.
	///
	/// `step_out` is cumulative: each coarser level minifies the already
	/// stepped-out extents (terrain LOD skirts). `padding` is applied per
	/// level on otherwise unpadded extents (client context around imagery).
	#[must_use]
	pub fn from_degree_extents(
		tilespace: &Tilespace,
		degree_extents: &Extents<f64>,
		fullres_level: u32,
		begin_level: u32,
		end_level: u32,
		step_out: u32,
		padding: u32,
	) -> Self {
		let norm = Extents::from_nsew(
			Tilespace::normalize(degree_extents.north()),
			Tilespace::normalize(degree_extents.south()),
			Tilespace::normalize(degree_extents.east()),
			Tilespace::normalize(degree_extents.west()),
		);
		let mut cov = Self {
			vec0_level: begin_level,
			begin_level,
			end_level,
			degree_extents: *degree_extents,
			extents_vec: Vec::new(),
		};
		cov.populate_levels(tilespace, &norm, fullres_level, step_out, padding);
		cov
	}

	fn populate_levels(
		&mut self,
		tilespace: &Tilespace,
		norm_extents: &Extents<f64>,
		fullres_level: u32,
		step_out: u32,
		padding: u32,
	) {
		if self.begin_level >= self.end_level {
			return;
		}

		// always minify from fullres so step-out happens on real extents
		let fullres_level = fullres_level.max(self.end_level - 1);
		let mut tmp = LevelCoverage::from_norm_extents(tilespace, norm_extents, fullres_level, self.end_level - 1);
		tmp.crop_to_world(tilespace);

		self.extents_vec = vec![Extents::new_empty(); (self.end_level - self.begin_level) as usize];
		self.store_level(tilespace, &tmp, padding);

		while tmp.level > self.begin_level {
			if step_out > 0 {
				tmp.extents.expand_by(step_out);
				tmp.crop_to_world(tilespace);
			}
			tmp = tmp.minified_by(1);
			self.store_level(tilespace, &tmp, padding);
		}
	}

	fn store_level(&mut self, tilespace: &Tilespace, cov: &LevelCoverage, padding: u32) {
		let index = (cov.level - self.vec0_level) as usize;
		if padding > 0 {
			let mut padded = *cov;
			padded.extents.expand_by(padding);
			padded.crop_to_world(tilespace);
			self.extents_vec[index] = padded.extents;
		} else {
			self.extents_vec[index] = cov.extents;
		}
	}

	pub fn begin_level(&self) -> u32 {
		self.begin_level
	}

	pub fn end_level(&self) -> u32 {
		self.end_level
	}

	pub fn num_levels(&self) -> u32 {
		self.end_level - self.begin_level
	}

	pub fn has_level(&self, level: u32) -> bool {
		level >= self.begin_level && level < self.end_level
	}

	pub fn intersects_levels(&self, begin: u32, end: u32) -> bool {
		end.min(self.end_level) > begin.max(self.begin_level)
	}

	pub fn has_tile(&self, addr: &TileAddr) -> bool {
		self.has_level(addr.level) && self.level_extents(addr.level).contains_row_col(addr.row, addr.col)
	}

	pub fn level_extents(&self, level: u32) -> &Extents<u32> {
		debug_assert!(self.has_level(level));
		&self.extents_vec[(level - self.vec0_level) as usize]
	}

	#[must_use]
	pub fn level_coverage(&self, level: u32) -> LevelCoverage {
		LevelCoverage::new(level, *self.level_extents(level))
	}

	pub fn degree_extents(&self) -> &Extents<f64> {
		&self.degree_extents
	}

	/// Trim leading low-resolution levels wholly covered by `others`.
	///
	/// Checks from coarse to fine; the first level not fully covered by the
	/// union of the others becomes the new begin level. Returns whether
	/// anything was trimmed. Finer levels are never touched here.
	pub fn narrow<'a, I>(&mut self, others: I) -> bool
	where
		I: IntoIterator<Item = &'a InsetCoverage> + Clone,
	{
		if others.clone().into_iter().next().is_none() {
			return false;
		}

		let mut level = self.begin_level;
		while level < self.end_level {
			let covered = self.level_extents(level).covered_by(
				others
					.clone()
					.into_iter()
					.filter(|o| o.has_level(level))
					.map(|o| (o.level_extents(level), o.degree_extents())),
				&self.degree_extents,
			);
			if covered {
				level += 1;
			} else {
				break;
			}
		}

		if level == self.begin_level {
			false
		} else {
			self.begin_level = level;
			true
		}
	}

	/// Row-band subset of every level, for subset parallelism.
	pub fn get_subset(&self, subset_this: u32, subset_total: u32) -> Result<Self> {
		ensure!(
			subset_this < subset_total,
			"invalid subset specification ({subset_this} of {subset_total})"
		);
		let mut new_extents = Vec::with_capacity(self.num_levels() as usize);
		for level in self.begin_level..self.end_level {
			new_extents.push(self.level_coverage(level).get_subset(subset_this, subset_total)?.extents);
		}
		Self::from_extents_list(self.begin_level, self.end_level, new_extents)
	}
}

impl PartialEq for InsetCoverage {
	fn eq(&self, other: &Self) -> bool {
		if self.begin_level != other.begin_level || self.end_level != other.end_level {
			return false;
		}
		(self.begin_level..self.end_level).all(|lev| self.level_extents(lev) == other.level_extents(lev))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::FUSION_TILESPACE;

	fn norm_quarter() -> Extents<f64> {
		// the north-east quarter of the world
		Extents::from_nsew(1.0, 0.5, 1.0, 0.5)
	}

	#[test]
	fn populates_every_level() {
		let cov = InsetCoverage::from_norm_extents(&FUSION_TILESPACE, &norm_quarter(), 11, 4, 12);
		assert_eq!(cov.num_levels(), 8);
		for level in 4..12 {
			assert!(cov.has_level(level));
			assert!(!cov.level_extents(level).empty());
		}
		assert!(!cov.has_level(3));
		assert!(!cov.has_level(12));

		// level 11 has 256 tiles per axis; the quarter covers rows/cols 128..256
		assert_eq!(*cov.level_extents(11), Extents::from_row_col(128, 256, 128, 256));
		// each minification halves outward
		assert_eq!(*cov.level_extents(10), Extents::from_row_col(64, 128, 64, 128));
	}

	#[test]
	fn coarse_levels_stay_inside_world() {
		let cov = InsetCoverage::from_norm_extents(&FUSION_TILESPACE, &norm_quarter(), 11, 0, 12);
		for level in 0..12 {
			let world = FUSION_TILESPACE.tiles_at_level(level);
			let e = cov.level_extents(level);
			assert!(e.end_row() <= world);
			assert!(e.end_col() <= world);
		}
	}

	#[test]
	fn padding_expands_each_level() {
		let deg = Extents::from_nsew(45.0, 0.0, 45.0, 0.0);
		let plain = InsetCoverage::from_degree_extents(&FUSION_TILESPACE, &deg, 11, 6, 12, 0, 0);
		let padded = InsetCoverage::from_degree_extents(&FUSION_TILESPACE, &deg, 11, 6, 12, 0, 1);
		for level in 6..12 {
			assert!(padded.level_extents(level).contains(plain.level_extents(level)));
			assert!(padded.level_extents(level).num_rows() >= plain.level_extents(level).num_rows());
		}
	}

	#[test]
	fn step_out_accumulates_toward_coarse_levels() {
		let deg = Extents::from_nsew(45.0, 0.0, 45.0, 0.0);
		let plain = InsetCoverage::from_degree_extents(&FUSION_TILESPACE, &deg, 11, 6, 12, 0, 0);
		let stepped = InsetCoverage::from_degree_extents(&FUSION_TILESPACE, &deg, 11, 6, 12, 1, 0);
		// fullres level is identical, coarser levels grow
		assert_eq!(stepped.level_extents(11), plain.level_extents(11));
		assert!(stepped.level_extents(6).num_rows() >= plain.level_extents(6).num_rows());
	}

	#[test]
	fn narrow_trims_covered_low_levels() {
		let deg = Extents::from_nsew(90.0, 0.0, 90.0, 0.0);
		let mut inset = InsetCoverage::from_degree_extents(&FUSION_TILESPACE, &deg, 11, 4, 12, 0, 0);
		// an identical inset covers every level
		let other = InsetCoverage::from_degree_extents(&FUSION_TILESPACE, &deg, 11, 4, 12, 0, 0);
		assert!(inset.narrow([&other]));
		assert_eq!(inset.begin_level(), 12);
		assert_eq!(inset.num_levels(), 0);
	}

	#[test]
	fn narrow_without_others_is_a_no_op() {
		let mut inset = InsetCoverage::from_norm_extents(&FUSION_TILESPACE, &norm_quarter(), 11, 4, 12);
		let others: [&InsetCoverage; 0] = [];
		assert!(!inset.narrow(others));
		assert_eq!(inset.begin_level(), 4);
	}

	#[test]
	fn narrow_stops_at_first_uncovered_level() {
		// other covers the whole world only up to level 6
		let world = Extents::from_nsew(1.0, 0.0, 1.0, 0.0);
		let other = InsetCoverage::from_norm_extents(&FUSION_TILESPACE, &world, 11, 4, 7);

		let mut inset = InsetCoverage::from_norm_extents(&FUSION_TILESPACE, &norm_quarter(), 11, 4, 12);
		assert!(inset.narrow([&other]));
		assert_eq!(inset.begin_level(), 7);
	}

	#[test]
	fn subset_partitions_each_level() {
		let cov = InsetCoverage::from_norm_extents(&FUSION_TILESPACE, &norm_quarter(), 11, 8, 12);
		let mut tiles = 0;
		for i in 0..4 {
			let sub = cov.get_subset(i, 4).unwrap();
			for level in 8..12 {
				tiles += sub.level_coverage(level).num_tiles();
			}
		}
		let total: u64 = (8..12).map(|l| cov.level_coverage(l).num_tiles()).sum();
		assert_eq!(tiles, total);
	}
}
