//! End-to-end pipeline test: build a source, select features into
//! selection-list files, load them back into spatial indexes, and fuse
//! per-tile feature sets through the quad-coverage engine.

use anyhow::Result;
use geofuse_core::{
	FUSION_TILESPACE, SoftErrorPolicy, TileAddr,
	progress::{InterruptFlag, ProgressDrain},
};
use geofuse_geometry::{Geode, PrimType, Vertex};
use geofuse_pipeline::{
	BuildSet, FeatureSet, FieldSpec, FieldType, GeoIndex, KvpFile, KvpTable, QuadExporter, RecordExprEvaluator,
	RecordHeader, Selector, SiteSet, Source, SourceManager, TileSink, UniqueFeatureId, Value,
	config::{FeatureType, FilterConfig, LayerConfig, MatchLogic},
};
use std::{path::Path, sync::Arc};

const TARGET_LEVEL: u32 = 6;

/// A road network in the north-east quarter: a long named road crossing
/// several tiles, short connecting pieces sharing its name, and a few
/// minor roads.
fn build_road_source(dir: &Path) -> Result<Arc<Source>> {
	let geometry_path = dir.join("roads.kvgeom");
	let attribute_path = dir.join("roads.kvattr");

	let header = Arc::new(RecordHeader::from_specs(vec![
		FieldSpec::new("name", FieldType::String),
		FieldSpec::new("lanes", FieldType::Int),
	]));
	let mut geometry = KvpFile::new();
	let mut table = KvpTable::new(header.clone());

	let mut add = |vertices: &[(f64, f64)], name: &str, lanes: i32| -> Result<()> {
		let mut line = Geode::new_lines(PrimType::PolyLine);
		for &(x, y) in vertices {
			line.add_vertex(Vertex::new_2d(x, y));
		}
		geometry.add_geode(&line)?;
		let mut record = header.new_record();
		record.set_field(0, Value::String(name.to_string()));
		record.set_field(1, Value::Int(lanes));
		table.add_record(&record)
	};

	// the main road: three chained segments across tile boundaries
	add(&[(0.55, 0.6), (0.6, 0.6)], "main", 4)?;
	add(&[(0.6, 0.6), (0.65, 0.62)], "main", 4)?;
	add(&[(0.65, 0.62), (0.7, 0.62)], "main", 4)?;
	// minor roads
	add(&[(0.56, 0.56), (0.57, 0.57)], "alley one", 1)?;
	add(&[(0.58, 0.56), (0.59, 0.57)], "alley two", 1)?;
	add(&[(0.62, 0.56), (0.63, 0.57)], "alley three", 1)?;

	geometry.write_to_file(&geometry_path)?;
	table.write_to_file(&attribute_path)?;
	Ok(Arc::new(Source::open("roads", &geometry_path, Some(&attribute_path))?))
}

fn road_layer_config() -> LayerConfig {
	let mut major = FilterConfig::match_all("major", FeatureType::Line);
	major.match_logic = MatchLogic::Expression;
	major.match_script = "lanes >= min_lanes".into();
	major.feature.draw_as_roads = true;
	major.feature.label_format = "{name}".into();

	let mut minor = FilterConfig::match_all("minor", FeatureType::Line);
	minor.feature.label_format = "{name}".into();

	LayerConfig {
		filters: vec![major, minor],
		context_script: "min_lanes = 2".into(),
		allow_feature_duplication: false,
	}
}

struct CollectSink {
	tiles: Vec<(TileAddr, Vec<(usize, FeatureSet)>, Vec<(usize, SiteSet)>)>,
}

impl TileSink for CollectSink {
	fn emit_tile(
		&mut self,
		addr: TileAddr,
		features: Vec<(usize, FeatureSet)>,
		sites: Vec<(usize, SiteSet)>,
		_need_lod: bool,
	) -> Result<()> {
		self.tiles.push((addr, features, sites));
		Ok(())
	}
}

#[test]
fn selection_files_to_fused_tiles() -> Result<()> {
	let dir = tempfile::tempdir()?;
	let source = build_road_source(dir.path())?;
	let manager = SourceManager::new(1024, 1024);
	let shared = manager.register_source("roads", source);

	let mut selector = Selector::new(
		manager.clone(),
		shared.clone(),
		0,
		road_layer_config(),
		&RecordExprEvaluator::new(),
		FUSION_TILESPACE,
		TARGET_LEVEL,
	)?;

	// query pass: stream selections into per-filter files
	let prefix = dir.path().join("select");
	let mut soft = SoftErrorPolicy::new(0);
	let written = selector.create_selection_list_files_batch(
		&prefix,
		&mut soft,
		&mut ProgressDrain::new(),
		&InterruptFlag::new(),
	)?;
	assert_eq!(written.len(), 2);

	// the expression filter took the three main-road segments, the
	// match-all filter got the rest
	let main_ids = std::fs::read_to_string(&written[0])?;
	assert_eq!(main_ids.lines().skip(1).collect::<Vec<_>>(), vec!["0", "1", "2"]);
	let minor_ids = std::fs::read_to_string(&written[1])?;
	assert_eq!(minor_ids.lines().skip(1).collect::<Vec<_>>(), vec!["3", "4", "5"]);

	// load the selection files back into per-filter indexes
	for (filter_id, path) in written.iter().enumerate() {
		let manager = manager.clone();
		let shared_id = shared.id();
		let index = GeoIndex::load(path, FUSION_TILESPACE, 0.25, TARGET_LEVEL, move |feature_id| {
			manager.get_feature_box(&UniqueFeatureId::new(shared_id, 0, feature_id))
		})?;
		assert_eq!(index.count(), 3);
		selector.filter_mut(filter_id).set_geo_index(index);
	}

	// fuse pass
	let mut build_sets: Vec<BuildSet> = (0..2)
		.map(|filter_id| BuildSet {
			filter_id,
			geo_index: selector.filter_mut(filter_id).take_geo_index(),
			feature_type: FeatureType::Line,
			end_level: TARGET_LEVEL + 1,
			max_build_level: TARGET_LEVEL,
		})
		.collect();
	let coverage = QuadExporter::coverage_for(&build_sets, &FUSION_TILESPACE, 3, TARGET_LEVEL);
	let mut exporter = QuadExporter::new(
		&selector,
		&mut build_sets,
		FUSION_TILESPACE,
		coverage,
		InterruptFlag::new(),
	);

	let mut sink = CollectSink { tiles: Vec::new() };
	exporter.export(&mut sink, &mut ProgressDrain::new())?;

	assert!(!sink.tiles.is_empty());
	let mut saw_main = false;
	for (addr, features, _sites) in &sink.tiles {
		assert_eq!(addr.level, TARGET_LEVEL);
		for (filter_id, feature_set) in features {
			assert_eq!(feature_set.glist.len(), feature_set.rlist.len());
			for (geode, record) in feature_set.glist.iter().zip(&feature_set.rlist) {
				assert!(!geode.is_empty());
				// geometry stays inside the tile
				let tile = addr.norm_extents(&FUSION_TILESPACE);
				let bbox = geode.bounding_box();
				assert!(bbox.west() >= tile.west() - 1e-9);
				assert!(bbox.east() <= tile.east() + 1e-9);

				if *filter_id == 0 {
					assert_eq!(record.field(0).unwrap().as_string(), "main");
					saw_main = true;
				}
			}
		}
	}
	assert!(saw_main);

	// the three main segments share a name, so within any single tile they
	// are joined into at most two chains
	for (_, features, _) in &sink.tiles {
		for (filter_id, feature_set) in features {
			if *filter_id == 0 {
				assert!(feature_set.glist.len() <= 3);
			}
		}
	}
	Ok(())
}

#[test]
fn query_pass_matches_batch_results() -> Result<()> {
	let dir = tempfile::tempdir()?;
	let source = build_road_source(dir.path())?;
	let manager = SourceManager::new(1024, 1024);
	let shared = manager.register_source("roads2", source);

	let mut selector = Selector::new(
		manager,
		shared,
		0,
		road_layer_config(),
		&RecordExprEvaluator::new(),
		FUSION_TILESPACE,
		TARGET_LEVEL,
	)?;
	selector.apply_queries(&mut SoftErrorPolicy::new(0), &mut ProgressDrain::new(), &InterruptFlag::new())?;

	assert_eq!(selector.filter(0).geo_index().select_all(), vec![0, 1, 2]);
	assert_eq!(selector.filter(1).geo_index().select_all(), vec![3, 4, 5]);
	Ok(())
}
