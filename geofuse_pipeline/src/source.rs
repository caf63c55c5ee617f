//! Layered access to a vector source.
//!
//! A source pairs a KVP geometry store with an optional attribute table per
//! layer and exposes random access by feature id plus bounding-box
//! discovery. Sources are shared read-only across selectors and filters;
//! the [`crate::SourceManager`] hands out the shared handles.

use crate::{KvpFile, KvpTable, Record, RecordHeader, SharedHeader};
use anyhow::{Context, Result, ensure};
use geofuse_geometry::{Geode, NormBBox};
use std::{path::Path, sync::Arc};

struct SourceLayer {
	geometry: KvpFile,
	attributes: Option<KvpTable>,
	empty_header: SharedHeader,
}

/// One opened vector source with one or more layers.
pub struct Source {
	name: String,
	layers: Vec<SourceLayer>,
}

impl Source {
	/// Open a single-layer source from a geometry store and an optional
	/// attribute table.
	pub fn open(name: &str, geometry_path: &Path, attribute_path: Option<&Path>) -> Result<Self> {
		let geometry = KvpFile::open(geometry_path).with_context(|| format!("opening source '{name}'"))?;
		let attributes = match attribute_path {
			Some(path) => {
				let table = KvpTable::open(path).with_context(|| format!("opening attributes of '{name}'"))?;
				ensure!(
					table.num_records() == geometry.num_records(),
					"attribute table has {} rows but geometry has {} records",
					table.num_records(),
					geometry.num_records()
				);
				Some(table)
			}
			None => None,
		};
		Ok(Self {
			name: name.to_string(),
			layers: vec![SourceLayer {
				geometry,
				attributes,
				empty_header: Arc::new(RecordHeader::new()),
			}],
		})
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn num_layers(&self) -> u32 {
		self.layers.len() as u32
	}

	fn layer(&self, layer: u32) -> Result<&SourceLayer> {
		self
			.layers
			.get(layer as usize)
			.with_context(|| format!("source '{}' has no layer {layer}", self.name))
	}

	pub fn num_features(&self, layer: u32) -> u32 {
		self.layers.get(layer as usize).map_or(0, |l| l.geometry.num_records())
	}

	pub fn get_feature(&self, layer: u32, id: u32) -> Result<Geode> {
		self.layer(layer)?.geometry.get_geode(id)
	}

	pub fn get_feature_box(&self, layer: u32, id: u32) -> Result<NormBBox> {
		self.layer(layer)?.geometry.get_geode_box(id)
	}

	pub fn get_attribute(&self, layer: u32, id: u32) -> Result<Record> {
		let layer = self.layer(layer)?;
		let table = layer
			.attributes
			.as_ref()
			.with_context(|| format!("source '{}' has no attributes", self.name))?;
		table.row(id)
	}

	/// The attribute layout of a layer; empty when the layer carries no
	/// attributes.
	pub fn attr_defs(&self, layer: u32) -> SharedHeader {
		match self.layers.get(layer as usize) {
			Some(l) => match &l.attributes {
				Some(table) => table.attr_defs().clone(),
				None => l.empty_header.clone(),
			},
			None => Arc::new(RecordHeader::new()),
		}
	}

	/// Union of all feature bounding boxes of a layer.
	pub fn bounding_box(&self, layer: u32) -> NormBBox {
		self
			.layers
			.get(layer as usize)
			.map_or_else(NormBBox::new_invalid, |l| *l.geometry.bounding_box())
	}
}
