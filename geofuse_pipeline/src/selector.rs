//! The selector: query pass over a source and per-tile feature
//! preparation.
//!
//! A selector wraps one source layer and the layer's filters. The query
//! pass walks every feature, evaluates each filter's predicate and records
//! matches in the filter's spatial index (or streams them into selection
//! list files). During the fuse pass the quad-coverage engine calls back
//! into [`Selector::prepare_features`] and [`Selector::prepare_sites`] to
//! turn one tile's candidate features into clipped, joined, reduced
//! geometry and deduplicated label sites.

use crate::{
	Filter, GeoIndex, Record, SharedRecord, SharedSource, SourceManager, UniqueFeatureId,
	config::{FeatureType, LayerConfig, MatchLogic},
	expression::ExpressionEvaluator,
	geo_index::{DEFAULT_OVERSIZE_FACTOR, expand_bbox},
};
use anyhow::{Context, Result, bail};
use geofuse_core::{
	FusionError, SoftErrorPolicy, TileAddr, Tilespace, absorb_soft_error,
	progress::{InterruptFlag, ProgressMeter},
};
use geofuse_geometry::{
	BoxCutter, EdgeFlag, FeatureCuller, Geode, GeodeList, MAX_DOMAIN, MIN_CYCLE_VERTICES,
	MIN_POLYLINE_VERTICES, NormBBox, PolylineJoiner, Simplifier, Vertex,
};
use itertools::Itertools;
use std::{
	collections::{HashMap, HashSet},
	io::{Seek, SeekFrom, Write},
	path::{Path, PathBuf},
	sync::Arc,
};

/// Roads at this zoom level and deeper keep their overlapping segments.
pub const ROAD_OVERLAP_MAX_LEVEL: u32 = 13;
/// Epsilon exponent offset for road-overlap detection, tuned by hand long
/// ago: two roads within `2^-(level+28)` of each other collapse to one.
const OVERLAP_EXPONENT: u32 = 28;

const BATCH_COUNT: usize = 1000;
/// Reserved bytes at the head of a selection file for the EXTENTS line.
const EXTENTS_RESERVED: usize = 256;

/// One tile's worth of prepared features for one filter.
pub struct FeatureSet {
	pub glist: GeodeList,
	pub rlist: Vec<SharedRecord>,
	pub feature_type: FeatureType,
}

/// One tile's worth of label sites for one filter.
pub struct SiteSet {
	pub vlist: Vec<Vertex>,
	pub rlist: Vec<SharedRecord>,
}

/// Per-source feature selection and preparation.
pub struct Selector {
	manager: Arc<SourceManager>,
	source: SharedSource,
	layer: u16,
	config: LayerConfig,
	filters: Vec<Filter>,
	tilespace: Tilespace,
	target_level: u32,
	query_complete: bool,
}

impl Selector {
	/// Compile the layer's filters against the source's attribute layout.
	pub fn new(
		manager: Arc<SourceManager>,
		source: SharedSource,
		layer: u16,
		config: LayerConfig,
		evaluator: &dyn ExpressionEvaluator,
		tilespace: Tilespace,
		target_level: u32,
	) -> Result<Self> {
		let header = source.source().attr_defs(u32::from(layer));
		let context_scripts: Vec<String> = if config.context_script.is_empty() {
			Vec::new()
		} else {
			vec![config.context_script.clone()]
		};
		let filters = config
			.filters
			.iter()
			.enumerate()
			.map(|(id, fc)| {
				Filter::new(
					fc.clone(),
					id,
					&header,
					&context_scripts,
					evaluator,
					tilespace,
					target_level,
				)
			})
			.collect::<Result<Vec<_>>>()?;
		Ok(Self {
			manager,
			source,
			layer,
			config,
			filters,
			tilespace,
			target_level,
			query_complete: false,
		})
	}

	pub fn num_filters(&self) -> usize {
		self.filters.len()
	}

	pub fn filter(&self, id: usize) -> &Filter {
		&self.filters[id]
	}

	pub fn filter_mut(&mut self, id: usize) -> &mut Filter {
		&mut self.filters[id]
	}

	pub fn query_complete(&self) -> bool {
		self.query_complete
	}

	pub fn source(&self) -> &SharedSource {
		&self.source
	}

	fn ufid(&self, feature_id: u32) -> UniqueFeatureId {
		UniqueFeatureId::new(self.source.id(), self.layer, feature_id)
	}

	/// Run every filter over every feature, collecting matches in the
	/// filters' spatial indexes.
	pub fn apply_queries(
		&mut self,
		soft_errors: &mut SoftErrorPolicy,
		progress: &mut dyn ProgressMeter,
		interrupt: &InterruptFlag,
	) -> Result<()> {
		self.query_complete = false;
		for filter in &mut self.filters {
			filter.reset();
		}

		let feature_count = self.source.num_features(self.layer);
		if feature_count == 0 {
			bail!(FusionError::InvalidArgument(format!(
				"source {} appears to be empty or corrupt (feature count is 0)",
				self.source.source().name()
			)));
		}
		let header = self.source.source().attr_defs(u32::from(self.layer));
		progress.init("query features", u64::from(feature_count));

		for feature_id in 0..feature_count {
			interrupt.check()?;
			let ufid = self.ufid(feature_id);

			let record = if header.has_attrib() {
				match self.manager.get_attribute(&ufid) {
					Ok(record) => Some(record),
					Err(e) => {
						absorb_soft_error(soft_errors, e)?;
						progress.inc(1);
						continue;
					}
				}
			} else {
				None
			};

			for filter_id in 0..self.filters.len() {
				let matched = match self.filters[filter_id].try_has_match(record.as_deref()) {
					Ok(matched) => matched,
					Err(e) => {
						absorb_soft_error(soft_errors, e)?;
						false
					}
				};
				if matched {
					let bbox = self.manager.get_feature_box(&ufid)?;
					self.filters[filter_id].record_match(feature_id, &bbox);
					if !self.config.allow_feature_duplication {
						break;
					}
				}
			}
			progress.inc(1);
		}

		for filter in &mut self.filters {
			filter.finalize();
		}
		progress.finish();
		self.query_complete = true;
		Ok(())
	}

	/// Streaming counterpart of [`Selector::apply_queries`] used by the
	/// non-interactive pipeline: features go through in batches, matches
	/// are appended to one selection file per filter, and each file's
	/// reserved header region receives its `EXTENTS:` line at the end.
	///
	/// Returns the files actually written; filters with no matches leave no
	/// file behind. Cancellation or a hard error deletes all partial files.
	pub fn create_selection_list_files_batch(
		&mut self,
		prefix: &Path,
		soft_errors: &mut SoftErrorPolicy,
		progress: &mut dyn ProgressMeter,
		interrupt: &InterruptFlag,
	) -> Result<Vec<PathBuf>> {
		let result = self.selection_batch_inner(prefix, soft_errors, progress, interrupt);
		if result.is_err() {
			// partial output is worthless; remove it explicitly
			for filter_id in 0..self.filters.len() {
				let _ = std::fs::remove_file(selection_path(prefix, filter_id));
			}
		}
		result
	}

	fn selection_batch_inner(
		&mut self,
		prefix: &Path,
		soft_errors: &mut SoftErrorPolicy,
		progress: &mut dyn ProgressMeter,
		interrupt: &InterruptFlag,
	) -> Result<Vec<PathBuf>> {
		self.query_complete = false;

		let feature_count = self.source.num_features(self.layer);
		if feature_count == 0 {
			bail!(FusionError::InvalidArgument(format!(
				"source {} appears to be empty or corrupt (feature count is 0)",
				self.source.source().name()
			)));
		}
		let header = self.source.source().attr_defs(u32::from(self.layer));
		if !header.has_attrib() && self.filters.iter().any(|f| f.config().match_logic != MatchLogic::MatchAll) {
			bail!(FusionError::InvalidArgument(format!(
				"source {} carries no attributes for the layer's filters",
				self.source.source().name()
			)));
		}
		progress.init("select features", u64::from(feature_count));

		struct FilterFile {
			path: PathBuf,
			file: std::fs::File,
			bbox: NormBBox,
			select_count: u64,
			selections: Vec<u32>,
		}
		let io_err = |e: std::io::Error| FusionError::IoFailure(format!("selection file: {e}"));

		let mut files = Vec::with_capacity(self.filters.len());
		for filter_id in 0..self.filters.len() {
			let path = selection_path(prefix, filter_id);
			let mut file = std::fs::File::create(&path).map_err(io_err)?;
			// pad the header region so the extents can be written in place
			// once they are known
			let mut pad = vec![b' '; EXTENTS_RESERVED - 1];
			pad.push(b'\n');
			file.write_all(&pad).map_err(io_err)?;
			files.push(FilterFile {
				path,
				file,
				bbox: NormBBox::new_invalid(),
				select_count: 0,
				selections: Vec::with_capacity(BATCH_COUNT),
			});
		}

		let mut id_buffer = String::with_capacity(BATCH_COUNT * 12);
		let mut base = 0u32;
		while base < feature_count {
			interrupt.check()?;
			let batch = BATCH_COUNT.min((feature_count - base) as usize);

			for file in &mut files {
				file.selections.clear();
			}

			for i in 0..batch {
				let feature_id = base + i as u32;
				let ufid = self.ufid(feature_id);

				let record = if header.has_attrib() {
					match self.manager.get_attribute(&ufid) {
						Ok(record) => Some(record),
						Err(e) => {
							absorb_soft_error(soft_errors, e)?;
							continue;
						}
					}
				} else {
					None
				};

				let bbox = self.manager.get_feature_box(&ufid)?;
				if !bbox.valid() {
					absorb_soft_error(
						soft_errors,
						FusionError::InvalidGeometry(format!("invalid bounding box for feature {feature_id}")).into(),
					)?;
					continue;
				}
				if !MAX_DOMAIN.contains(&bbox) {
					absorb_soft_error(
						soft_errors,
						FusionError::OutOfDomain(format!(
							"rejecting invalid feature {feature_id} (n:{:.6} s:{:.6} w:{:.6} e:{:.6})",
							Tilespace::denormalize(bbox.north()),
							Tilespace::denormalize(bbox.south()),
							Tilespace::denormalize(bbox.west()),
							Tilespace::denormalize(bbox.east()),
						))
						.into(),
					)?;
					continue;
				}

				for (filter_id, filter) in self.filters.iter().enumerate() {
					let matched = match filter.try_has_match(record.as_deref()) {
						Ok(matched) => matched,
						Err(e) => {
							absorb_soft_error(soft_errors, e)?;
							false
						}
					};
					if matched {
						let entry = &mut files[filter_id];
						entry.selections.push(feature_id);
						entry.bbox.grow(&bbox);
						entry.select_count += 1;
						if !self.config.allow_feature_duplication {
							break;
						}
					}
				}
			}

			// one write per filter per batch
			for file in &mut files {
				if file.selections.is_empty() {
					continue;
				}
				id_buffer.clear();
				for id in &file.selections {
					id_buffer.push_str(&id.to_string());
					id_buffer.push('\n');
				}
				file.file.write_all(id_buffer.as_bytes()).map_err(io_err)?;
			}

			base += batch as u32;
			progress.set_position(u64::from(base));
		}

		// write the extents into each file's reserved region; drop files
		// with no selections at all
		let mut written = Vec::new();
		for mut entry in files {
			if entry.select_count == 0 {
				drop(entry.file);
				std::fs::remove_file(&entry.path).map_err(io_err)?;
				continue;
			}
			expand_bbox(&mut entry.bbox, DEFAULT_OVERSIZE_FACTOR, self.target_level, &self.tilespace);
			let line = format!(
				"EXTENTS: {:.20}, {:.20}, {:.20}, {:.20}",
				entry.bbox.west(),
				entry.bbox.east(),
				entry.bbox.south(),
				entry.bbox.north()
			);
			debug_assert!(line.len() < EXTENTS_RESERVED);
			entry.file.seek(SeekFrom::Start(0)).map_err(io_err)?;
			entry.file.write_all(line.as_bytes()).map_err(io_err)?;
			entry.file.sync_all().map_err(io_err)?;
			written.push(entry.path);
		}

		progress.finish();
		self.query_complete = true;
		Ok(written)
	}

	/// Prepare one filter's features for one tile: box-cut each candidate
	/// against the tile window (or substitute a quad-sized polygon when the
	/// coverage mask knows the tile is swallowed by the feature), expand
	/// labels, then join/reduce by feature type.
	pub fn prepare_features(
		&self,
		quad_bbox: &NormBBox,
		addr: &TileAddr,
		filter_id: usize,
		original_index: &mut GeoIndex,
		bucket_ids: &[u32],
	) -> Result<Option<FeatureSet>> {
		let filter = &self.filters[filter_id];
		let display_rule = filter.display_rule();
		let header = self.source.source().attr_defs(u32::from(self.layer));

		let box_cutter = BoxCutter::with_window(*quad_bbox, true);
		let covered_id = original_index.get_covered(addr);

		let mut glist: GeodeList = Vec::new();
		let mut rlist: Vec<SharedRecord> = Vec::new();
		let mut pieces: GeodeList = Vec::new();

		for &feature_id in bucket_ids {
			let ufid = self.ufid(feature_id);
			let mut geode = (*self.manager.get_feature(&ufid)?).clone();
			display_rule
				.convert_feature_type(&mut geode)
				.with_context(|| format!("feature {feature_id}"))?;

			if covered_id == Some(feature_id) {
				// tile known to be swallowed by this feature: substitute the
				// quad-sized polygon instead of clipping again
				let height = geode.first_vertex(0).map_or(0.0, |v| v.z);
				pieces.clear();
				pieces.push(Geode::new_quad_polygon(quad_bbox, EdgeFlag::QuadCut, geode.prim_type(), height));
			} else {
				let mut completely_covered = false;
				if box_cutter.run(&geode, &mut pieces, &mut completely_covered) == 0 {
					continue;
				}
				if completely_covered {
					original_index.set_covered(addr, feature_id);
				}
			}

			let label = if header.has_attrib() && display_rule.attribute_expansion_needed() {
				let record = self.manager.get_attribute(&ufid)?;
				display_rule.expand(&record)
			} else {
				display_rule.dummy_expand()
			};

			for piece in pieces.drain(..) {
				debug_assert!(
					!piece.flat_prim_type().is_multi_polygon() && piece.num_parts() <= 1,
					"improper feature after partitioning"
				);
				glist.push(piece);
				rlist.push(label.clone());
			}
		}

		if glist.is_empty() {
			// only bounding boxes intersected; the geometry itself missed
			return Ok(None);
		}

		let mut feature_set = FeatureSet {
			glist,
			rlist,
			feature_type: display_rule.feature_type(),
		};
		match display_rule.feature_type() {
			FeatureType::Point => {}
			FeatureType::Line => {
				if display_rule.config().draw_as_roads {
					let remove_overlaps = addr.level < ROAD_OVERLAP_MAX_LEVEL;
					reduce_roads(&mut feature_set, remove_overlaps, addr.level);
				} else {
					reduce_polylines(&mut feature_set);
				}
				self.simplify_features(&mut feature_set, addr.level, display_rule.config().allowable_pixel_error);
			}
			FeatureType::Polygon => {
				reduce_polygons(&mut feature_set);
				self.simplify_features(&mut feature_set, addr.level, display_rule.config().allowable_pixel_error);
			}
		}

		if feature_set.glist.is_empty() {
			return Ok(None);
		}
		Ok(Some(feature_set))
	}

	/// Cull sub-pixel pieces and simplify the rest against the level's
	/// pixel-error budget.
	fn simplify_features(&self, feature_set: &mut FeatureSet, level: u32, pixel_error: f64) {
		let pixels = self.tilespace.pixels_at_level0();
		let mut culler = FeatureCuller::new();
		culler.set_pixel_error(pixel_error);
		culler.compute_threshold(level, pixels);
		let mut simplifier = Simplifier::new();
		simplifier.set_pixel_error(pixel_error);
		simplifier.compute_threshold(level, 0, pixels);

		let mut keep = Vec::new();
		let mut kept_glist = Vec::with_capacity(feature_set.glist.len());
		let mut kept_rlist = Vec::with_capacity(feature_set.rlist.len());
		let mut culled = 0usize;
		let mut removed_vertices = 0usize;
		for (mut geode, record) in feature_set.glist.drain(..).zip(feature_set.rlist.drain(..)) {
			if geode.is_empty() {
				continue;
			}
			if culler.is_subpixel_feature(&geode) {
				culled += 1;
				continue;
			}
			simplifier.simplify(&mut geode, &mut keep);
			if !keep.is_empty() {
				removed_vertices += geode.apply_simplification(&keep);
			}
			kept_glist.push(geode);
			kept_rlist.push(record);
		}
		if culled + removed_vertices > 0 {
			log::debug!("level {level}: culled {culled} sub-pixel features, removed {removed_vertices} vertices");
		}
		feature_set.glist = kept_glist;
		feature_set.rlist = kept_rlist;
	}

	/// Prepare one filter's label sites for one tile.
	pub fn prepare_sites(
		&self,
		quad_bbox: &NormBBox,
		filter_id: usize,
		bucket_ids: &[u32],
	) -> Result<Option<SiteSet>> {
		let filter = &self.filters[filter_id];
		let site = filter.site();
		if !site.enabled() {
			return Ok(None);
		}
		let header = self.source.source().attr_defs(u32::from(self.layer));

		let mut vlist = Vec::new();
		let mut rlist = Vec::new();
		for &feature_id in bucket_ids {
			let ufid = self.ufid(feature_id);
			let geode = self.manager.get_feature(&ufid)?;
			let Some(location) = site.location(&geode) else {
				continue;
			};
			if !quad_bbox.contains_point(location.x, location.y) {
				continue;
			}
			let record = if header.has_attrib() && site.attribute_expansion_needed() {
				site.expand(&*self.manager.get_attribute(&ufid)?)
			} else {
				Arc::new(Record::single_string(String::new()))
			};
			vlist.push(location);
			rlist.push(record);
		}

		let removed = remove_duplicate_sites(&mut vlist, &mut rlist);
		if removed > 0 {
			log::debug!("removed {removed} duplicate sites");
		}
		if vlist.is_empty() {
			return Ok(None);
		}
		Ok(Some(SiteSet { vlist, rlist }))
	}
}

fn selection_path(prefix: &Path, filter_id: usize) -> PathBuf {
	PathBuf::from(format!("{}.{filter_id:02}", prefix.display()))
}

/// Join roads sharing a name, optionally drop overlapping duplicates, then
/// weed out everything below the polyline minimum.
fn reduce_roads(feature_set: &mut FeatureSet, remove_overlaps: bool, level: u32) {
	// group by label
	let name_map: HashMap<String, Vec<usize>> = feature_set
		.rlist
		.iter()
		.enumerate()
		.map(|(index, record)| {
			(record.field(0).map_or_else(String::new, |v| v.as_string()), index)
		})
		.into_group_map();

	for indices in name_map.values() {
		// pull the group out, join, put it back in place
		let mut group: GeodeList = indices
			.iter()
			.map(|&i| std::mem::replace(&mut feature_set.glist[i], Geode::new_lines(geofuse_geometry::PrimType::PolyLine)))
			.collect();
		let (duplicates, joined) = PolylineJoiner::remove_duplicates_and_join(&mut group);
		if duplicates + joined > 0 {
			log::debug!("road join: {duplicates} duplicates, {joined} joined");
		}
		if remove_overlaps {
			remove_overlapping_segments(&mut group, level);
		}
		for (&i, geode) in indices.iter().zip(group) {
			feature_set.glist[i] = geode;
		}
	}

	remove_empty_features(feature_set, MIN_POLYLINE_VERTICES);
}

/// Polylines reduce like roads, minus the overlap filter.
fn reduce_polylines(feature_set: &mut FeatureSet) {
	reduce_roads(feature_set, false, 0);
}

fn reduce_polygons(feature_set: &mut FeatureSet) {
	remove_empty_features(feature_set, MIN_CYCLE_VERTICES);
}

/// Drop features whose part 0 fell below `min_vertex_count`. Returns the
/// number of vertices kept.
fn remove_empty_features(feature_set: &mut FeatureSet, min_vertex_count: usize) -> usize {
	let mut kept_vertices = 0;
	let mut kept_glist = Vec::with_capacity(feature_set.glist.len());
	let mut kept_rlist = Vec::with_capacity(feature_set.rlist.len());
	for (geode, record) in feature_set.glist.drain(..).zip(feature_set.rlist.drain(..)) {
		if geode.num_parts() >= 1 && geode.vertex_count(0) >= min_vertex_count {
			kept_vertices += geode.total_vertex_count();
			kept_glist.push(geode);
			kept_rlist.push(record);
		}
	}
	feature_set.glist = kept_glist;
	feature_set.rlist = kept_rlist;
	kept_vertices
}

/// Clear roads every segment of which lies within the level epsilon of
/// another road. Returns how many were cleared.
fn remove_overlapping_segments(glist: &mut GeodeList, level: u32) -> usize {
	let epsilon = 1.0 / (1u64 << (level + OVERLAP_EXPONENT)) as f64;

	let mut removed = 0;
	for g1 in 0..glist.len() {
		if glist[g1].is_empty() {
			continue;
		}
		for g2 in g1 + 1..glist.len() {
			if glist[g2].is_empty() {
				continue;
			}
			if glist[g2].overlaps(&glist[g1], epsilon) {
				glist[g2].clear();
				removed += 1;
			} else if glist[g1].overlaps(&glist[g2], epsilon) {
				glist[g1].clear();
				removed += 1;
				break;
			}
		}
	}
	removed
}

/// Remove sites sharing position and label, keeping first occurrences in
/// order. Returns the number removed.
pub fn remove_duplicate_sites(vlist: &mut Vec<Vertex>, rlist: &mut Vec<SharedRecord>) -> usize {
	let mut seen: HashSet<(u64, u64, String)> = HashSet::new();
	let mut kept_v = Vec::with_capacity(vlist.len());
	let mut kept_r = Vec::with_capacity(rlist.len());
	let mut removed = 0;
	for (vertex, record) in vlist.drain(..).zip(rlist.drain(..)) {
		let label = record.field(0).map_or_else(String::new, |v| v.as_string());
		let key = (vertex.x.to_bits(), vertex.y.to_bits(), label);
		if seen.insert(key) {
			kept_v.push(vertex);
			kept_r.push(record);
		} else {
			removed += 1;
		}
	}
	*vlist = kept_v;
	*rlist = kept_r;
	removed
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{Record, RecordExprEvaluator, SourceManager, config::*, source::test_support::build_point_source};
	use geofuse_core::{FUSION_TILESPACE, progress::ProgressDrain};

	fn point_selector(dir: &Path, config: LayerConfig) -> Result<Selector> {
		let source = build_point_source(dir, 10)?;
		let manager = SourceManager::new(256, 256);
		let shared = manager.register_source("points", source);
		Selector::new(
			manager,
			shared,
			0,
			config,
			&RecordExprEvaluator::new(),
			FUSION_TILESPACE,
			8,
		)
	}

	fn x_ge_5_config() -> LayerConfig {
		let mut filter = FilterConfig::match_all("big", FeatureType::Point);
		filter.rules.push(SelectRuleConfig {
			field: "x".into(),
			op: RuleOp::GreaterEqual,
			value: "5".into(),
		});
		filter.site.enabled = true;
		LayerConfig {
			filters: vec![filter],
			..LayerConfig::default()
		}
	}

	#[test]
	fn apply_queries_selects_matching_features() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let mut selector = point_selector(dir.path(), x_ge_5_config())?;

		let mut soft = SoftErrorPolicy::new(0);
		let mut progress = ProgressDrain::new();
		selector.apply_queries(&mut soft, &mut progress, &InterruptFlag::new())?;

		assert!(selector.query_complete());
		assert_eq!(selector.filter(0).geo_index().select_all(), vec![5, 6, 7, 8, 9]);
		assert_eq!(progress.position(), 10);
		Ok(())
	}

	#[test]
	fn batch_selection_writes_ordered_ids_and_extents() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let mut selector = point_selector(dir.path(), x_ge_5_config())?;

		let prefix = dir.path().join("select");
		let mut soft = SoftErrorPolicy::new(0);
		let mut progress = ProgressDrain::new();
		let written =
			selector.create_selection_list_files_batch(&prefix, &mut soft, &mut progress, &InterruptFlag::new())?;
		assert_eq!(written.len(), 1);

		let text = std::fs::read_to_string(&written[0])?;
		let lines: Vec<&str> = text.lines().collect();
		assert!(lines[0].trim_end().starts_with("EXTENTS: "));
		assert_eq!(&lines[1..], &["5", "6", "7", "8", "9"]);

		// the extents cover the five matched points, grown by the oversize
		// margin
		let values: Vec<f64> = lines[0]
			.trim_end()
			.strip_prefix("EXTENTS:")
			.unwrap()
			.split(',')
			.map(|v| v.trim().parse().unwrap())
			.collect();
		let (w, e, s, n) = (values[0], values[1], values[2], values[3]);
		assert!(w < 0.45 && e > 0.49);
		assert!(s < 0.5 && n > 0.5);
		Ok(())
	}

	#[test]
	fn batch_selection_skips_empty_filters() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let mut config = x_ge_5_config();
		let mut never = FilterConfig::match_all("never", FeatureType::Point);
		never.rules.push(SelectRuleConfig {
			field: "x".into(),
			op: RuleOp::GreaterThan,
			value: "100".into(),
		});
		config.filters.push(never);

		let mut selector = point_selector(dir.path(), config)?;
		let prefix = dir.path().join("select");
		let mut soft = SoftErrorPolicy::new(0);
		let written = selector.create_selection_list_files_batch(
			&prefix,
			&mut soft,
			&mut ProgressDrain::new(),
			&InterruptFlag::new(),
		)?;
		assert_eq!(written.len(), 1);
		assert!(written[0].to_string_lossy().ends_with(".00"));
		assert!(!selection_path(&prefix, 1).exists());
		Ok(())
	}

	#[test]
	fn interrupt_deletes_partial_files() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let mut selector = point_selector(dir.path(), x_ge_5_config())?;

		let interrupt = InterruptFlag::new();
		interrupt.interrupt();
		let prefix = dir.path().join("select");
		let err = selector
			.create_selection_list_files_batch(&prefix, &mut SoftErrorPolicy::new(0), &mut ProgressDrain::new(), &interrupt)
			.unwrap_err();
		assert!(matches!(
			err.downcast_ref::<FusionError>(),
			Some(FusionError::Interrupted)
		));
		assert!(!selection_path(&prefix, 0).exists());
		Ok(())
	}

	#[test]
	fn first_match_wins_without_duplication() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let mut config = x_ge_5_config();
		// second filter matches everything
		config.filters.push(FilterConfig::match_all("rest", FeatureType::Point));

		let mut selector = point_selector(dir.path(), config.clone())?;
		selector.apply_queries(&mut SoftErrorPolicy::new(0), &mut ProgressDrain::new(), &InterruptFlag::new())?;
		assert_eq!(selector.filter(0).geo_index().select_all(), vec![5, 6, 7, 8, 9]);
		assert_eq!(selector.filter(1).geo_index().select_all(), vec![0, 1, 2, 3, 4]);

		// with duplication allowed the second filter sees everything
		config.allow_feature_duplication = true;
		let mut selector = point_selector(dir.path(), config)?;
		selector.apply_queries(&mut SoftErrorPolicy::new(0), &mut ProgressDrain::new(), &InterruptFlag::new())?;
		assert_eq!(selector.filter(1).geo_index().count(), 10);
		Ok(())
	}

	#[test]
	fn duplicate_sites_are_removed() {
		let v = |x: f64| Vertex::new_2d(x, 0.5);
		let r = |s: &str| Arc::new(Record::single_string(s.to_string()));
		let mut vlist = vec![v(0.0), v(0.0), v(0.1), v(0.2), v(0.2), v(0.3), v(0.3)];
		let mut rlist = vec![r("0"), r("0"), r("1"), r("2"), r("2"), r("3"), r("3")];

		assert_eq!(remove_duplicate_sites(&mut vlist, &mut rlist), 3);
		assert_eq!(vlist, vec![v(0.0), v(0.1), v(0.2), v(0.3)]);
		let labels: Vec<String> = rlist.iter().map(|r| r.field(0).unwrap().as_string()).collect();
		assert_eq!(labels, vec!["0", "1", "2", "3"]);

		// a second pass removes nothing
		assert_eq!(remove_duplicate_sites(&mut vlist, &mut rlist), 0);

		// same position with a different label is not a duplicate
		let mut vlist = vec![v(0.0), v(0.0)];
		let mut rlist = vec![r("a"), r("b")];
		assert_eq!(remove_duplicate_sites(&mut vlist, &mut rlist), 0);
	}

	#[test]
	fn overlapping_roads_collapse_below_level_13() {
		let mk = |y: f64| {
			let mut g = Geode::new_lines(geofuse_geometry::PrimType::Street);
			g.add_vertex(Vertex::new_2d(0.1, y));
			g.add_vertex(Vertex::new_2d(0.2, y));
			g
		};
		// identical-but-for-epsilon roads at a coarse level
		let eps = 1.0 / (1u64 << (8 + OVERLAP_EXPONENT)) as f64;
		let mut glist = vec![mk(0.5), mk(0.5 + eps / 2.0)];
		assert_eq!(remove_overlapping_segments(&mut glist, 8), 1);
		assert!(glist[0].is_empty() != glist[1].is_empty());

		// far enough apart survives
		let mut glist = vec![mk(0.5), mk(0.5 + eps * 10.0)];
		assert_eq!(remove_overlapping_segments(&mut glist, 8), 0);
	}
}
