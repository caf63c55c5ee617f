//! Display rules and sites: how a filter's matches become drawable
//! features and label points.

use crate::{
	Record, RecordFormatter, SharedRecord,
	config::{FeatureConfig, FeatureType, SiteConfig},
	record::RecordHeader,
};
use anyhow::{Result, bail};
use geofuse_core::FusionError;
use geofuse_geometry::{Geode, PrimType, Vertex, geom_utils};
use std::sync::Arc;

/// Turns matched source geometry into the filter's display geometry and
/// expands feature labels.
#[derive(Debug)]
pub struct DisplayRule {
	config: FeatureConfig,
	label_formatter: Option<RecordFormatter>,
}

impl DisplayRule {
	pub fn new(config: &FeatureConfig, header: &RecordHeader) -> Result<Self> {
		let label_formatter = if config.label_format.is_empty() || !header.has_attrib() {
			None
		} else {
			Some(RecordFormatter::new(&config.label_format, header)?)
		};
		Ok(Self {
			config: config.clone(),
			label_formatter,
		})
	}

	pub fn config(&self) -> &FeatureConfig {
		&self.config
	}

	pub fn feature_type(&self) -> FeatureType {
		self.config.feature_type
	}

	/// Whether label expansion needs the source attribute row.
	pub fn attribute_expansion_needed(&self) -> bool {
		self.label_formatter.is_some()
	}

	/// Coerce source geometry to the display type.
	///
	/// Line displays accept polylines and polygon outlines (as streets when
	/// drawn as roads); polygon displays accept closed polylines and any
	/// polygon flavor. Impossible coercions (lines from points) fail with
	/// an invalid-geometry error.
	pub fn convert_feature_type(&self, geode: &mut Geode) -> Result<()> {
		let current = geode.prim_type();
		match self.config.feature_type {
			// point conversion happens during site preparation
			FeatureType::Point => Ok(()),
			FeatureType::Line => {
				let is_25d = !matches!(
					current,
					PrimType::Point | PrimType::PolyLine | PrimType::Street | PrimType::Polygon | PrimType::MultiPolygon
				);
				let target = match (self.config.draw_as_roads, is_25d) {
					(true, false) => PrimType::Street,
					(true, true) => PrimType::Street25D,
					(false, false) => PrimType::PolyLine,
					(false, true) => PrimType::PolyLine25D,
				};
				if current.flat() == PrimType::Point {
					bail!(FusionError::InvalidGeometry(format!(
						"invalid conversion from {current:?} to line display"
					)));
				}
				geode.change_prim_type(target)
			}
			FeatureType::Polygon => match current.flat() {
				PrimType::PolyLine => {
					let target = if current == PrimType::PolyLine {
						PrimType::Polygon
					} else {
						PrimType::Polygon25D
					};
					geode.change_prim_type(target)
				}
				PrimType::Polygon | PrimType::MultiPolygon => Ok(()),
				_ => bail!(FusionError::InvalidGeometry(format!(
					"invalid conversion from {current:?} to polygon display"
				))),
			},
		}
	}

	/// Expand the feature label from the source record.
	pub fn expand(&self, record: &Record) -> SharedRecord {
		let label = self
			.label_formatter
			.as_ref()
			.map_or_else(String::new, |f| f.expand(record));
		Arc::new(Record::single_string(label))
	}

	/// The empty label used when no attributes are in play.
	pub fn dummy_expand(&self) -> SharedRecord {
		Arc::new(Record::single_string(String::new()))
	}
}

/// Site (label point) preparation for a filter.
#[derive(Debug)]
pub struct Site {
	config: SiteConfig,
	label_formatter: Option<RecordFormatter>,
	popup_formatter: Option<RecordFormatter>,
}

impl Site {
	pub fn new(config: &SiteConfig, header: &RecordHeader) -> Result<Self> {
		let compile = |format: &str| -> Result<Option<RecordFormatter>> {
			if format.is_empty() || !header.has_attrib() {
				Ok(None)
			} else {
				Ok(Some(RecordFormatter::new(format, header)?))
			}
		};
		Ok(Self {
			config: config.clone(),
			label_formatter: compile(&config.label_format)?,
			popup_formatter: compile(&config.popup_format)?,
		})
	}

	pub fn enabled(&self) -> bool {
		self.config.enabled
	}

	pub fn attribute_expansion_needed(&self) -> bool {
		self.label_formatter.is_some() || self.popup_formatter.is_some()
	}

	/// Where the site sits for a feature: the point itself, a polyline's
	/// middle vertex, or a polygon's outer-cycle centroid.
	pub fn location(&self, geode: &Geode) -> Option<Vertex> {
		match geode {
			Geode::Point { vertex, .. } => Some(*vertex),
			Geode::Lines { parts, .. } => {
				let part = parts.first()?;
				if part.is_empty() {
					return None;
				}
				Some(part[part.len() / 2])
			}
			Geode::Polygon { parts, .. } => centroid(parts.first()?),
			Geode::MultiPolygon { polygons, .. } => self.location(polygons.first()?),
		}
	}

	/// Expand the site record (label, and popup when configured).
	pub fn expand(&self, record: &Record) -> SharedRecord {
		let label = self
			.label_formatter
			.as_ref()
			.map_or_else(String::new, |f| f.expand(record));
		match &self.popup_formatter {
			None => Arc::new(Record::single_string(label)),
			Some(popup) => {
				let mut expanded = Record::single_string(label);
				let popup_text = popup.expand(record);
				expanded = Record::single_string(format!("{}\n{popup_text}", expanded.field(0).unwrap().as_string()));
				Arc::new(expanded)
			}
		}
	}
}

fn centroid(cycle: &[Vertex]) -> Option<Vertex> {
	let area2 = geom_utils::signed_area_2x(cycle);
	if cycle.is_empty() {
		return None;
	}
	if area2 == 0.0 {
		return Some(cycle[0]);
	}
	let n = cycle.len();
	let mut cx = 0.0;
	let mut cy = 0.0;
	let mut j = n - 1;
	for i in 0..n {
		let cross = cycle[j].x * cycle[i].y - cycle[i].x * cycle[j].y;
		cx += (cycle[j].x + cycle[i].x) * cross;
		cy += (cycle[j].y + cycle[i].y) * cross;
		j = i;
	}
	Some(Vertex::new_2d(cx / (3.0 * area2), cy / (3.0 * area2)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::record::{FieldSpec, FieldType, Value};

	fn header() -> RecordHeader {
		RecordHeader::from_specs(vec![FieldSpec::new("name", FieldType::String)])
	}

	fn named_record(name: &str) -> Record {
		let header = Arc::new(header());
		let mut record = header.new_record();
		record.set_field(0, Value::String(name.into()));
		record
	}

	#[test]
	fn line_display_converts_polygons_to_streets() -> Result<()> {
		let config = FeatureConfig {
			feature_type: FeatureType::Line,
			draw_as_roads: true,
			..FeatureConfig::default()
		};
		let rule = DisplayRule::new(&config, &header())?;

		let mut polygon = Geode::new_polygon(
			PrimType::Polygon,
			vec![vec![
				Vertex::new_2d(0.0, 0.0),
				Vertex::new_2d(1.0, 0.0),
				Vertex::new_2d(1.0, 1.0),
				Vertex::new_2d(0.0, 0.0),
			]],
			vec![geofuse_geometry::EdgeFlag::Normal; 4],
		);
		rule.convert_feature_type(&mut polygon)?;
		assert_eq!(polygon.prim_type(), PrimType::Street);

		let mut point = Geode::new_point(PrimType::Point, Vertex::default());
		assert!(rule.convert_feature_type(&mut point).is_err());
		Ok(())
	}

	#[test]
	fn label_expansion_uses_the_record() -> Result<()> {
		let config = FeatureConfig {
			label_format: "Road: {name}".into(),
			..FeatureConfig::default()
		};
		let rule = DisplayRule::new(&config, &header())?;
		assert!(rule.attribute_expansion_needed());

		let label = rule.expand(&named_record("A4"));
		assert_eq!(label.field(0).unwrap().as_string(), "Road: A4");

		let dummy = rule.dummy_expand();
		assert_eq!(dummy.field(0).unwrap().as_string(), "");
		Ok(())
	}

	#[test]
	fn site_locations() -> Result<()> {
		let site = Site::new(&SiteConfig::default(), &header())?;

		let point = Geode::new_point(PrimType::Point, Vertex::new_2d(0.3, 0.4));
		assert_eq!(site.location(&point), Some(Vertex::new_2d(0.3, 0.4)));

		let mut line = Geode::new_lines(PrimType::PolyLine);
		for x in [0.0, 0.1, 0.2, 0.3, 0.4] {
			line.add_vertex(Vertex::new_2d(x, 0.0));
		}
		assert_eq!(site.location(&line), Some(Vertex::new_2d(0.2, 0.0)));

		let square = Geode::new_polygon(
			PrimType::Polygon,
			vec![vec![
				Vertex::new_2d(0.0, 0.0),
				Vertex::new_2d(1.0, 0.0),
				Vertex::new_2d(1.0, 1.0),
				Vertex::new_2d(0.0, 1.0),
				Vertex::new_2d(0.0, 0.0),
			]],
			vec![geofuse_geometry::EdgeFlag::Normal; 5],
		);
		let center = site.location(&square).unwrap();
		assert!((center.x - 0.5).abs() < 1e-12);
		assert!((center.y - 0.5).abs() < 1e-12);
		Ok(())
	}
}
