//! The quad-coverage engine: level-by-level traversal of the tile pyramid.
//!
//! One [`BuildSet`] per filter carries the filter's spatial index. The
//! engine walks quads from the coarsest build level down to the target
//! level, maintaining a per-set in-use vector. At every quad it first
//! prunes: a set whose presence masks (the original build set's up to
//! [`MAX_PRESENCE_LEVEL`], plus the currently active index's) report no
//! intersection is dropped for the subtree, and the discovery is written
//! back into the original mask so sibling subtrees skip it immediately.
//! When a set's active index bottoms out at the current level, the engine
//! splits the one relevant cell into a finer index for the subtree and
//! restores the previous index on the way out.
//!
//! At the target level the surviving sets' buckets are handed to the
//! selector for feature and site preparation, and the resulting per-tile
//! sets go to the [`TileSink`] — packet encoding itself lives behind that
//! trait.

use crate::{FeatureSet, GeoIndex, Selector, SiteSet, config::FeatureType};
use anyhow::Result;
use geofuse_core::{
	Extents, InsetCoverage, QuadtreePath, TileAddr, Tilespace,
	progress::{InterruptFlag, ProgressMeter},
};
use geofuse_geometry::NormBBox;

/// Deepest level with maintained presence masks; beyond it pruning relies
/// on the active indexes alone.
pub const MAX_PRESENCE_LEVEL: u32 = 12;

/// One filter's worth of matched features ready for export.
pub struct BuildSet {
	pub filter_id: usize,
	/// The original finalized index with its multi-level presence mask.
	pub geo_index: GeoIndex,
	pub feature_type: FeatureType,
	/// One beyond the deepest level this set is built for.
	pub end_level: u32,
	pub max_build_level: u32,
}

/// Receives finished tiles. The packet encoder implements this.
pub trait TileSink {
	fn emit_tile(
		&mut self,
		addr: TileAddr,
		features: Vec<(usize, FeatureSet)>,
		sites: Vec<(usize, SiteSet)>,
		need_lod: bool,
	) -> Result<()>;
}

/// Drives the per-level quad traversal for one layer.
pub struct QuadExporter<'a> {
	selector: &'a Selector,
	build_sets: &'a mut [BuildSet],
	tilespace: Tilespace,
	coverage: InsetCoverage,
	interrupt: InterruptFlag,
}

impl<'a> QuadExporter<'a> {
	pub fn new(
		selector: &'a Selector,
		build_sets: &'a mut [BuildSet],
		tilespace: Tilespace,
		coverage: InsetCoverage,
		interrupt: InterruptFlag,
	) -> Self {
		debug_assert!(coverage.num_levels() > 0);
		Self {
			selector,
			build_sets,
			tilespace,
			coverage,
			interrupt,
		}
	}

	/// The traversal coverage for a group of build sets: the union of their
	/// bounding boxes across `[begin_level, target_level]`.
	pub fn coverage_for(
		build_sets: &[BuildSet],
		tilespace: &Tilespace,
		begin_level: u32,
		target_level: u32,
	) -> InsetCoverage {
		let mut union = NormBBox::new_invalid();
		for set in build_sets {
			union.grow(set.geo_index.bounding_box());
		}
		let norm = geofuse_core::Extents::from_nsew(union.north(), union.south(), union.east(), union.west());
		InsetCoverage::from_norm_extents(tilespace, &norm, target_level, begin_level, target_level + 1)
	}

	/// Walk the pyramid, emitting every non-empty target-level tile.
	pub fn export(&mut self, sink: &mut dyn TileSink, progress: &mut dyn ProgressMeter) -> Result<()> {
		let begin_level = self.coverage.begin_level();
		let target_level = self.coverage.end_level() - 1;
		let target_tiles = self.coverage.level_coverage(target_level).num_tiles();
		progress.init("export quads", target_tiles);

		let ctx = ExportContext {
			selector: self.selector,
			tilespace: self.tilespace,
			coverage: &self.coverage,
			target_level,
			interrupt: &self.interrupt,
		};
		let mut active: Vec<Option<GeoIndex>> = self.build_sets.iter().map(|_| None).collect();
		let mut use_sets = vec![true; self.build_sets.len()];

		let extents = *self.coverage.level_extents(begin_level);
		for row in extents.begin_row()..extents.end_row() {
			for col in extents.begin_col()..extents.end_col() {
				export_quad(
					&ctx,
					self.build_sets,
					&mut active,
					&mut use_sets,
					begin_level,
					row,
					col,
					sink,
					progress,
				)?;
			}
		}
		progress.finish();
		Ok(())
	}
}

struct ExportContext<'a> {
	selector: &'a Selector,
	tilespace: Tilespace,
	coverage: &'a InsetCoverage,
	target_level: u32,
	interrupt: &'a InterruptFlag,
}

fn active_index<'i>(build_sets: &'i [BuildSet], active: &'i [Option<GeoIndex>], i: usize) -> &'i GeoIndex {
	active[i].as_ref().unwrap_or(&build_sets[i].geo_index)
}

#[allow(clippy::too_many_arguments)]
fn export_quad(
	ctx: &ExportContext,
	build_sets: &mut [BuildSet],
	active: &mut Vec<Option<GeoIndex>>,
	use_sets: &mut Vec<bool>,
	level: u32,
	row: u32,
	col: u32,
	sink: &mut dyn TileSink,
	progress: &mut dyn ProgressMeter,
) -> Result<()> {
	ctx.interrupt.check()?;

	let addr = TileAddr::new(level, row, col);

	// prune sets with no data under this quad
	let mut cleared: Vec<usize> = Vec::new();
	let mut something_left = false;
	for i in 0..build_sets.len() {
		if !use_sets[i] {
			continue;
		}
		let in_range = level < build_sets[i].end_level;
		let original_ok = level > MAX_PRESENCE_LEVEL || build_sets[i].geo_index.estimated_presence(&addr);
		let current_ok = active_index(build_sets, active, i).estimated_presence(&addr);
		if in_range && original_ok && current_ok {
			something_left = true;
		} else {
			use_sets[i] = false;
			cleared.push(i);
			// write the discovery back so sibling subtrees skip this set
			if in_range && level <= MAX_PRESENCE_LEVEL {
				build_sets[i].geo_index.set_presence(&addr, false);
			}
		}
	}

	let result = if !something_left {
		Ok(())
	} else if level == ctx.target_level {
		export_full_res(ctx, build_sets, active, use_sets, addr, sink, progress)
	} else {
		// split every set whose active index bottoms out here, restore on
		// the way back up
		let target_cov = ctx.coverage.level_coverage(ctx.target_level);
		let mut splits: Vec<(usize, Option<GeoIndex>)> = Vec::new();
		for i in 0..build_sets.len() {
			if !use_sets[i] {
				continue;
			}
			let index = active_index(build_sets, active, i);
			if index.max_level() == level && index.coverage().extents.contains_row_col(row, col) {
				let finer = index.split_cell(row, col, &target_cov);
				splits.push((i, active[i].replace(finer)));
			}
		}

		let mut result = Ok(());
		let child_extents = ctx.coverage.level_extents(level + 1);
		for quad in 0..QuadtreePath::CHILD_COUNT {
			let (child_row, child_col) = QuadtreePath::magnify_quad_addr(row, col, quad);
			if !child_extents.contains_row_col(child_row, child_col) {
				continue;
			}
			result = export_quad(
				ctx,
				build_sets,
				active,
				use_sets,
				level + 1,
				child_row,
				child_col,
				sink,
				progress,
			);
			if result.is_err() {
				break;
			}
		}

		for (i, previous) in splits {
			active[i] = previous;
		}
		result
	};

	// restore the sets this quad cleared so siblings see them again
	for i in cleared {
		use_sets[i] = true;
	}
	result
}

fn export_full_res(
	ctx: &ExportContext,
	build_sets: &mut [BuildSet],
	active: &mut [Option<GeoIndex>],
	use_sets: &[bool],
	addr: TileAddr,
	sink: &mut dyn TileSink,
	progress: &mut dyn ProgressMeter,
) -> Result<()> {
	let norm = addr.norm_extents(&ctx.tilespace);
	let quad_bbox = NormBBox::new(norm.west(), norm.east(), norm.south(), norm.north());

	let mut features: Vec<(usize, FeatureSet)> = Vec::new();
	let mut sites: Vec<(usize, SiteSet)> = Vec::new();
	let mut need_lod = false;

	for i in 0..build_sets.len() {
		if !use_sets[i] {
			continue;
		}
		let index = active_index(build_sets, active, i);
		let bucket = if index.max_level() > addr.level {
			// index deeper than the target (small data set, never split):
			// collect across every bucket the quad covers
			let sub = addr.magnified_to_level(index.max_level());
			let tiles = Extents::intersection(&sub.extents, &index.coverage().extents);
			index.feature_ids_from_buckets(&tiles)
		} else if index.max_level() == addr.level && index.coverage().extents.contains_row_col(addr.row, addr.col) {
			index.feature_ids_from_bucket(addr.row, addr.col)
		} else {
			index.intersect(&quad_bbox)
		};
		if bucket.is_empty() {
			continue;
		}
		if build_sets[i].geo_index.max_level() > addr.level || build_sets[i].max_build_level > addr.level {
			need_lod = true;
		}

		let filter_id = build_sets[i].filter_id;
		if let Some(feature_set) =
			ctx.selector
				.prepare_features(&quad_bbox, &addr, filter_id, &mut build_sets[i].geo_index, &bucket)?
		{
			features.push((filter_id, feature_set));
		}
		if let Some(site_set) = ctx.selector.prepare_sites(&quad_bbox, filter_id, &bucket)? {
			sites.push((filter_id, site_set));
		}
	}

	if !features.is_empty() || !sites.is_empty() {
		sink.emit_tile(addr, features, sites, need_lod)?;
	}
	progress.inc(1);
	Ok(())
}
