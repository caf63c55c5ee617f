//! The spatial index: a level-grid of feature-id buckets.
//!
//! The index stores `(feature_id, bounding_box)` pairs and organizes them
//! into a tile grid at a level chosen so buckets hold on the order of a
//! hundred features on uniformly distributed data. Bounding boxes are grown
//! by an additive *oversize* — `tile_size × oversize/2` normalized pixels
//! at the target level — before every tile mapping, so features whose
//! labels or icons reach into a neighboring tile still land in it.
//!
//! Each index owns a presence mask (and, for original build sets, a
//! coverage mask) the quad-coverage engine uses to skip empty quads early.
//! When the engine reaches an index's own level it splits the relevant cell
//! into a finer index covering just that cell's features.

use crate::quad_exporter::MAX_PRESENCE_LEVEL;
use anyhow::{Context, Result, bail, ensure};
use geofuse_core::{
	CoverageMask, Extents, FusionError, InsetCoverage, LevelCoverage, PresenceMask, TileAddr, Tilespace,
};
use geofuse_geometry::{MAX_DOMAIN, NormBBox};
use std::{
	collections::BTreeSet,
	io::Write,
	path::Path,
};

/// Default oversize factor: a quarter tile, one map tile at the target
/// level in each direction.
pub const DEFAULT_OVERSIZE_FACTOR: f64 = 0.25;

const MIN_TOTAL_TILES: u64 = 100;
const MAX_TOTAL_TILES: u64 = 1_000_000;
const SPLIT_STEP_LEVELS: u32 = 3;

/// One indexed feature.
#[derive(Clone, Copy, Debug)]
pub struct FeatureHandle {
	pub feature_id: u32,
	pub bbox: NormBBox,
}

/// A grid of feature-id buckets at one level.
#[derive(Debug)]
pub struct GeoIndex {
	tilespace: Tilespace,
	oversize_factor: f64,
	target_level: u32,
	coverage: LevelCoverage,
	preset_coverage: bool,
	grid: Vec<Vec<u32>>,
	box_list: Vec<FeatureHandle>,
	bounding_box: NormBBox,
	presence_mask: Option<PresenceMask>,
	coverage_mask: Option<CoverageMask>,
}

impl GeoIndex {
	/// A fresh index; the grid level is chosen at [`GeoIndex::finalize`].
	#[must_use]
	pub fn new(tilespace: Tilespace, oversize_factor: f64, target_level: u32) -> Self {
		Self {
			tilespace,
			oversize_factor,
			target_level,
			coverage: LevelCoverage::default(),
			preset_coverage: false,
			grid: Vec::new(),
			box_list: Vec::new(),
			bounding_box: NormBBox::new_invalid(),
			presence_mask: None,
			coverage_mask: None,
		}
	}

	/// An index with a fixed coverage, used when splitting cells.
	#[must_use]
	pub fn with_coverage(coverage: LevelCoverage, tilespace: Tilespace, oversize_factor: f64) -> Self {
		let mut index = Self::new(tilespace, oversize_factor, coverage.level);
		index.coverage = coverage;
		index.preset_coverage = true;
		index
	}

	/// Load an index from a selection-list file; `bbox_lookup` resolves a
	/// feature id to its source bounding box.
	pub fn load(
		select_file: &Path,
		tilespace: Tilespace,
		oversize_factor: f64,
		target_level: u32,
		bbox_lookup: impl Fn(u32) -> Result<NormBBox>,
	) -> Result<Self> {
		let mut index = Self::new(tilespace, oversize_factor, target_level);
		index.read_selection_file(select_file, bbox_lookup)?;
		Ok(index)
	}

	pub fn count(&self) -> usize {
		self.box_list.len()
	}

	pub fn bounding_box(&self) -> &NormBBox {
		&self.bounding_box
	}

	/// The index's own grid level.
	pub fn max_level(&self) -> u32 {
		self.coverage.level
	}

	pub fn coverage(&self) -> &LevelCoverage {
		&self.coverage
	}

	/// Record one feature. Call [`GeoIndex::finalize`] once all are in.
	pub fn insert(&mut self, feature_id: u32, bbox: NormBBox) {
		self.bounding_box.grow(&bbox);
		self.box_list.push(FeatureHandle { feature_id, bbox });
	}

	/// Pick the grid level, allocate buckets, slot every feature into the
	/// tiles its oversized bounding box touches, and build the presence
	/// (and coverage) masks.
	pub fn finalize(&mut self) {
		if !self.bounding_box.valid() {
			return;
		}

		if !self.preset_coverage {
			self.choose_coverage();

			// The presence mask of an original build set spans from the grid
			// level down to the deepest pruning level. Levels below the grid
			// start out all-present and are refined by the coverage engine;
			// the grid level itself is filled by the insertion cascade.
			let end_level = if self.coverage.level < MAX_PRESENCE_LEVEL {
				MAX_PRESENCE_LEVEL + 1
			} else {
				self.coverage.level + 1
			};
			let inset = InsetCoverage::from_level_coverage_range(
				&self.tilespace,
				&self.coverage,
				self.coverage.level,
				end_level,
			);
			let mut mask = PresenceMask::new(&inset, true);
			mask.set_level(self.coverage.level, false);
			self.presence_mask = Some(mask);
			self.coverage_mask = Some(CoverageMask::new(&inset));
		} else {
			let inset = InsetCoverage::from_level_coverage(&self.coverage);
			self.presence_mask = Some(PresenceMask::new(&inset, false));
		}

		self.grid = vec![Vec::new(); self.coverage.num_tiles() as usize];

		for (index, handle) in self.box_list.iter().enumerate() {
			let norm = norm_extents(&handle.bbox);
			let feature_cov = LevelCoverage::from_norm_extents_with_oversize_factor(
				&self.tilespace,
				&norm,
				self.coverage.level,
				self.coverage.level,
				self.oversize_factor,
			);
			let tiles = Extents::intersection(&self.coverage.extents, &feature_cov.extents);
			for row in tiles.begin_row()..tiles.end_row() {
				for col in tiles.begin_col()..tiles.end_col() {
					let pos = self.bucket_pos(row, col);
					self.grid[pos].push(index as u32);
					if let Some(mask) = self.presence_mask.as_mut() {
						mask.set_cascade(&TileAddr::new(self.coverage.level, row, col));
					}
				}
			}
		}
	}

	/// Pick the deepest level whose tile count stays under the maximum and
	/// lands closest to `(sqrt(N)·0.1)²` buckets, never deeper than the
	/// level where the oversize margin equals one tile.
	fn choose_coverage(&mut self) {
		let size = (self.box_list.len() as f64).sqrt() * 0.1;
		let target_total = (size * size) as u64;

		let norm = norm_extents(&self.bounding_box);
		let oversize_is_a_tile_level =
			self.target_level + self.tilespace.tile_size_log2 - self.tilespace.pixels_at_level0_log2;
		let start_level = self.tilespace.max_level.min(oversize_is_a_tile_level);

		self.coverage = LevelCoverage::default();
		for level in (0..=start_level).rev() {
			let tmp = LevelCoverage::from_norm_extents_with_crop(&self.tilespace, &norm, level, level);
			if tmp.num_tiles() > MAX_TOTAL_TILES {
				continue;
			}
			if tmp.num_tiles() < MIN_TOTAL_TILES {
				if self.coverage.extents.empty() {
					self.coverage = tmp;
				}
				break;
			}
			if tmp.num_tiles() > target_total {
				self.coverage = tmp;
				continue;
			}
			// first level at or under target: keep whichever is closer
			let under = target_total - tmp.num_tiles();
			let over = self.coverage.num_tiles().saturating_sub(target_total);
			if self.coverage.extents.empty() || under < over {
				self.coverage = tmp;
			}
			break;
		}
		log::debug!(
			"geo index level {} with {} buckets for {} features (target {})",
			self.coverage.level,
			self.coverage.num_tiles(),
			self.box_list.len(),
			target_total
		);
	}

	fn bucket_pos(&self, row: u32, col: u32) -> usize {
		let grid_row = row - self.coverage.extents.begin_row();
		let grid_col = col - self.coverage.extents.begin_col();
		(grid_row * self.coverage.extents.num_cols() + grid_col) as usize
	}

	/// All feature ids whose stored boxes intersect `bbox`, sorted and
	/// unique.
	pub fn intersect(&self, bbox: &NormBBox) -> Vec<u32> {
		if !self.bounding_box.valid() {
			return Vec::new();
		}
		let cull = NormBBox::intersection(bbox, &self.bounding_box);
		if !cull.valid() {
			return Vec::new();
		}

		let feature_cov = LevelCoverage::from_norm_extents_with_oversize_factor(
			&self.tilespace,
			&norm_extents(&cull),
			self.coverage.level,
			self.coverage.level,
			self.oversize_factor,
		);
		// probably redundant after the geographic cull, but float rounding
		// must never index off the grid
		let tiles = Extents::intersection(&self.coverage.extents, &feature_cov.extents);

		let mut set = BTreeSet::new();
		for row in tiles.begin_row()..tiles.end_row() {
			for col in tiles.begin_col()..tiles.end_col() {
				for &index in &self.grid[self.bucket_pos(row, col)] {
					let handle = &self.box_list[index as usize];
					if cull.intersects(&handle.bbox) {
						set.insert(handle.feature_id);
					}
				}
			}
		}
		set.into_iter().collect()
	}

	/// Every inserted feature id, in insertion order.
	pub fn select_all(&self) -> Vec<u32> {
		self.box_list.iter().map(|h| h.feature_id).collect()
	}

	/// Build a finer index over one source bucket. The split advances three
	/// levels at a time, stopping at the target coverage's level.
	pub fn split_cell(&self, row: u32, col: u32, target_cov: &LevelCoverage) -> GeoIndex {
		debug_assert!(self.coverage.level < target_cov.level);
		debug_assert!(self.coverage.extents.contains_row_col(row, col));

		let level_diff = target_cov.level - self.coverage.level;
		let split_level = if level_diff <= SPLIT_STEP_LEVELS {
			target_cov.level
		} else {
			self.coverage.level + SPLIT_STEP_LEVELS
		};

		let my_split_cov = TileAddr::new(self.coverage.level, row, col).magnified_to_level(split_level);
		let target_split_cov = target_cov.minified_to_level(split_level);
		let split_extents = Extents::intersection(&my_split_cov.extents, &target_split_cov.extents);

		let mut new_index = GeoIndex::with_coverage(
			LevelCoverage::new(split_level, split_extents),
			self.tilespace,
			self.oversize_factor,
		);
		for &index in &self.grid[self.bucket_pos(row, col)] {
			let handle = self.box_list[index as usize];
			new_index.insert(handle.feature_id, handle.bbox);
		}
		new_index.finalize();
		new_index
	}

	/// Feature ids of one bucket, ascending.
	pub fn feature_ids_from_bucket(&self, row: u32, col: u32) -> Vec<u32> {
		let mut ids: Vec<u32> = self.grid[self.bucket_pos(row, col)]
			.iter()
			.map(|&index| self.box_list[index as usize].feature_id)
			.collect();
		ids.sort_unstable();
		ids
	}

	/// Sorted-unique feature ids across a block of buckets.
	pub fn feature_ids_from_buckets(&self, extents: &Extents<u32>) -> Vec<u32> {
		let mut set = BTreeSet::new();
		for row in extents.begin_row()..extents.end_row() {
			for col in extents.begin_col()..extents.end_col() {
				for &index in &self.grid[self.bucket_pos(row, col)] {
					set.insert(self.box_list[index as usize].feature_id);
				}
			}
		}
		set.into_iter().collect()
	}

	pub fn estimated_presence(&self, addr: &TileAddr) -> bool {
		self.presence_mask.as_ref().is_some_and(|m| m.estimated_presence(addr))
	}

	pub fn set_presence(&mut self, addr: &TileAddr, present: bool) {
		if let Some(mask) = self.presence_mask.as_mut() {
			mask.set(addr, present);
		}
	}

	/// The feature id fully covering `addr`, if known.
	pub fn get_covered(&self, addr: &TileAddr) -> Option<u32> {
		self.coverage_mask.as_ref()?.get_covered(addr)
	}

	pub fn set_covered(&mut self, addr: &TileAddr, feature_id: u32) {
		if let Some(mask) = self.coverage_mask.as_mut() {
			mask.set_covered(addr, feature_id);
		}
	}

	/// Write the selection list: one `EXTENTS:` line with the oversized
	/// bounding box, then one feature id per line.
	pub fn write_selection_file(&self, path: &Path) -> Result<()> {
		let mut bbox = self.bounding_box;
		expand_bbox(&mut bbox, self.oversize_factor, self.target_level, &self.tilespace);

		let file = std::fs::File::create(path)
			.map_err(|e| FusionError::IoFailure(format!("unable to create {}: {e}", path.display())))?;
		let mut writer = std::io::BufWriter::new(file);
		let io_err = |e: std::io::Error| FusionError::IoFailure(format!("unable to write {}: {e}", path.display()));

		writeln!(
			writer,
			"EXTENTS: {:.20}, {:.20}, {:.20}, {:.20}",
			bbox.west(),
			bbox.east(),
			bbox.south(),
			bbox.north()
		)
		.map_err(io_err)?;
		for handle in &self.box_list {
			writeln!(writer, "{}", handle.feature_id).map_err(io_err)?;
		}
		writer.flush().map_err(io_err)?;
		Ok(())
	}

	/// Read a selection list and finalize the index. Every feature's
	/// bounding box must be valid and inside the normalized world band.
	fn read_selection_file(
		&mut self,
		path: &Path,
		bbox_lookup: impl Fn(u32) -> Result<NormBBox>,
	) -> Result<()> {
		let text = std::fs::read_to_string(path)
			.map_err(|e| FusionError::IoFailure(format!("unable to open {}: {e}", path.display())))?;
		let mut lines = text.lines();

		let first = lines.next().unwrap_or("");
		let Some(extents) = first.strip_prefix("EXTENTS:") else {
			bail!(FusionError::InvalidFormat(format!(
				"{} does not start with an EXTENTS line",
				path.display()
			)));
		};
		let values: Vec<f64> = extents
			.split(',')
			.map(|v| v.trim().parse::<f64>())
			.collect::<Result<_, _>>()
			.map_err(|e| FusionError::InvalidFormat(format!("bad EXTENTS line in {}: {e}", path.display())))?;
		ensure!(
			values.len() == 4,
			FusionError::InvalidFormat(format!("EXTENTS line in {} has {} values", path.display(), values.len()))
		);
		self.bounding_box = NormBBox::new(values[0], values[1], values[2], values[3]);

		for line in lines {
			let line = line.trim();
			if line.is_empty() {
				continue;
			}
			let feature_id: u32 = line
				.parse()
				.map_err(|e| FusionError::InvalidFormat(format!("bad feature id '{line}': {e}")))?;
			let bbox = bbox_lookup(feature_id).with_context(|| format!("selected feature {feature_id}"))?;
			if !bbox.valid() || !MAX_DOMAIN.contains(&bbox) {
				bail!(FusionError::OutOfDomain(format!(
					"selected feature {feature_id} has bounding box outside the world"
				)));
			}
			self.box_list.push(FeatureHandle { feature_id, bbox });
		}

		self.finalize();
		Ok(())
	}
}

/// NormBBox viewed as closed float extents (nsew order).
fn norm_extents(bbox: &NormBBox) -> Extents<f64> {
	Extents::from_nsew(bbox.north(), bbox.south(), bbox.east(), bbox.west())
}

/// Grow a bounding box by the oversize margin: `tile_size × factor/2`
/// pixels, normalized at `level`.
pub fn expand_bbox(bbox: &mut NormBBox, oversize_factor: f64, level: u32, tilespace: &Tilespace) {
	let expand_pixel = f64::from(tilespace.tile_size()) * (oversize_factor / 2.0);
	let num_pixel_world = tilespace.pixels_at_level(level) as f64;
	bbox.expand_by(expand_pixel / num_pixel_world);
}
