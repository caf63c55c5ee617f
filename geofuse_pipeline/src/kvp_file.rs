//! The KVP geometry store.
//!
//! A binary file of geodes with random access by feature id:
//!
//! ```text
//! header  : magic 0xab0120cd, version (1 or 2), num_recs,
//!           prim_type (v2 only), bbox 4×f64 (normalized)
//! records : one encoded geode each
//! index   : num_recs × { offset u64, size u32, pad u32, bbox 4×f64 }
//!           at the file tail
//! ```
//!
//! Readers accept both versions; v1 files simply lack the shared primitive
//! type. Everything is little-endian.

use anyhow::{Context, Result, bail, ensure};
use geofuse_core::{
	FusionError,
	io::{BinaryReader, BinaryWriter},
};
use geofuse_geometry::{Geode, NormBBox, PrimType, Vertex};
use std::path::Path;

pub const KVP_MAGIC: u32 = 0xab01_20cd;
const RECORD_POS_SIZE: usize = 8 + 4 + 4 + 32;

#[derive(Clone, Copy, Debug)]
struct RecordPos {
	offset: u64,
	size: u32,
	bbox: [f64; 4],
}

/// A geometry store, either being written or opened read-only.
#[derive(Debug)]
pub struct KvpFile {
	records: Vec<Vec<u8>>,
	index: Vec<RecordPos>,
	prim_type: Option<PrimType>,
	bounding_box: NormBBox,
	data: Vec<u8>,
}

impl KvpFile {
	/// An empty store ready for [`KvpFile::add_geode`].
	#[must_use]
	pub fn new() -> Self {
		Self {
			records: Vec::new(),
			index: Vec::new(),
			prim_type: None,
			bounding_box: NormBBox::new_invalid(),
			data: Vec::new(),
		}
	}

	/// Append one geode.
	pub fn add_geode(&mut self, geode: &Geode) -> Result<()> {
		ensure!(!geode.is_empty(), "refusing to store an empty geode");
		if self.prim_type.is_none() {
			self.prim_type = Some(geode.prim_type());
		}
		let bbox = geode.bounding_box();
		let mut writer = BinaryWriter::new();
		encode_geode(geode, &mut writer);
		let encoded = writer.into_vec();
		self.index.push(RecordPos {
			offset: 0, // assigned at write time
			size: encoded.len() as u32,
			bbox: [bbox.west(), bbox.south(), bbox.east(), bbox.north()],
		});
		self.records.push(encoded);
		self.bounding_box.grow(&bbox);
		Ok(())
	}

	/// Write the store to `path` (current version 2).
	pub fn write_to_file(&self, path: &Path) -> Result<()> {
		let mut writer = BinaryWriter::new();
		writer.write_u32(KVP_MAGIC);
		writer.write_u32(2);
		writer.write_u32(self.records.len() as u32);
		writer.write_u32(self.prim_type.map_or(0, |p| p.code()));
		writer.write_f64(self.bounding_box.west());
		writer.write_f64(self.bounding_box.south());
		writer.write_f64(self.bounding_box.east());
		writer.write_f64(self.bounding_box.north());

		let mut offsets = Vec::with_capacity(self.records.len());
		for record in &self.records {
			offsets.push(writer.position() as u64);
			writer.write_bytes(record);
		}
		for (pos, offset) in self.index.iter().zip(offsets) {
			writer.write_u64(offset);
			writer.write_u32(pos.size);
			writer.write_u32(0);
			for v in pos.bbox {
				writer.write_f64(v);
			}
		}

		std::fs::write(path, writer.into_vec())
			.map_err(|e| FusionError::IoFailure(format!("unable to write {}: {e}", path.display())).into())
	}

	/// Open a store for reading. Accepts version 1 and 2 files.
	pub fn open(path: &Path) -> Result<Self> {
		let data = std::fs::read(path)
			.map_err(|e| FusionError::IoFailure(format!("unable to read {}: {e}", path.display())))?;
		Self::from_bytes(data).with_context(|| format!("while opening {}", path.display()))
	}

	fn from_bytes(data: Vec<u8>) -> Result<Self> {
		let mut reader = BinaryReader::new(&data);
		let magic = reader.read_u32()?;
		if magic != KVP_MAGIC {
			bail!(FusionError::InvalidFormat(format!("bad magic {magic:#010x}")));
		}
		let version = reader.read_u32()?;
		let num_records = reader.read_u32()? as usize;
		let prim_type = match version {
			1 => None,
			2 => {
				let code = reader.read_u32()?;
				if code == 0 { None } else { Some(PrimType::from_code(code)?) }
			}
			v => bail!(FusionError::InvalidFormat(format!("unsupported version {v}"))),
		};
		let west = reader.read_f64()?;
		let south = reader.read_f64()?;
		let east = reader.read_f64()?;
		let north = reader.read_f64()?;

		let index_size = num_records * RECORD_POS_SIZE;
		if data.len() < index_size {
			bail!(FusionError::InvalidFormat(format!(
				"file too short for {num_records} index entries"
			)));
		}
		let mut index = Vec::with_capacity(num_records);
		let mut index_reader = BinaryReader::new(&data);
		index_reader.set_position(data.len() - index_size)?;
		for _ in 0..num_records {
			let offset = index_reader.read_u64()?;
			let size = index_reader.read_u32()?;
			let _pad = index_reader.read_u32()?;
			let bbox = [
				index_reader.read_f64()?,
				index_reader.read_f64()?,
				index_reader.read_f64()?,
				index_reader.read_f64()?,
			];
			if offset + u64::from(size) > data.len() as u64 {
				bail!(FusionError::InvalidFormat(format!(
					"record at {offset} (size {size}) beyond end of file"
				)));
			}
			index.push(RecordPos { offset, size, bbox });
		}

		Ok(Self {
			records: Vec::new(),
			index,
			prim_type,
			bounding_box: NormBBox::new(west, east, south, north),
			data,
		})
	}

	pub fn num_records(&self) -> u32 {
		self.index.len() as u32
	}

	pub fn bounding_box(&self) -> &NormBBox {
		&self.bounding_box
	}

	pub fn prim_type(&self) -> Option<PrimType> {
		self.prim_type
	}

	/// Decode the geode with the given id.
	pub fn get_geode(&self, id: u32) -> Result<Geode> {
		let pos = self
			.index
			.get(id as usize)
			.with_context(|| format!("feature id {id} out of range"))?;
		let bytes = &self.data[pos.offset as usize..(pos.offset + u64::from(pos.size)) as usize];
		let mut reader = BinaryReader::new(bytes);
		decode_geode(&mut reader)
	}

	/// The stored bounding box of one record, without decoding it.
	pub fn get_geode_box(&self, id: u32) -> Result<NormBBox> {
		let pos = self
			.index
			.get(id as usize)
			.with_context(|| format!("feature id {id} out of range"))?;
		Ok(NormBBox::new(pos.bbox[0], pos.bbox[2], pos.bbox[1], pos.bbox[3]))
	}
}

impl Default for KvpFile {
	fn default() -> Self {
		Self::new()
	}
}

fn encode_geode(geode: &Geode, writer: &mut BinaryWriter) {
	writer.write_u32(geode.prim_type().code());
	match geode {
		Geode::Point { vertex, .. } => {
			write_vertices(std::slice::from_ref(vertex), writer);
		}
		Geode::Lines { parts, .. } => {
			writer.write_u32(parts.len() as u32);
			for part in parts {
				write_vertices(part, writer);
			}
		}
		Geode::Polygon { parts, edge_flags, .. } => {
			writer.write_u32(parts.len() as u32);
			for part in parts {
				write_vertices(part, writer);
			}
			writer.write_u32(edge_flags.len() as u32);
			for flag in edge_flags {
				writer.write_u8(match flag {
					geofuse_geometry::EdgeFlag::Normal => 0,
					geofuse_geometry::EdgeFlag::QuadCut => 1,
					geofuse_geometry::EdgeFlag::HoleCut => 2,
				});
			}
		}
		Geode::MultiPolygon { polygons, .. } => {
			writer.write_u32(polygons.len() as u32);
			for polygon in polygons {
				encode_geode(polygon, writer);
			}
		}
	}
}

fn write_vertices(vertices: &[Vertex], writer: &mut BinaryWriter) {
	writer.write_u32(vertices.len() as u32);
	for v in vertices {
		writer.write_f64(v.x);
		writer.write_f64(v.y);
		writer.write_f64(v.z);
	}
}

fn read_vertices(reader: &mut BinaryReader) -> Result<Vec<Vertex>> {
	let count = reader.read_u32()? as usize;
	ensure!(count <= reader.remaining() / 24 + 1, "vertex count {count} beyond data");
	let mut vertices = Vec::with_capacity(count);
	for _ in 0..count {
		let x = reader.read_f64()?;
		let y = reader.read_f64()?;
		let z = reader.read_f64()?;
		vertices.push(Vertex::new(x, y, z));
	}
	Ok(vertices)
}

fn decode_geode(reader: &mut BinaryReader) -> Result<Geode> {
	let prim = PrimType::from_code(reader.read_u32()?)?;
	Ok(match prim.flat() {
		PrimType::Point => {
			let vertices = read_vertices(reader)?;
			ensure!(vertices.len() == 1, "point record with {} vertices", vertices.len());
			Geode::new_point(prim, vertices[0])
		}
		PrimType::PolyLine | PrimType::Street => {
			let num_parts = reader.read_u32()? as usize;
			let mut parts = Vec::with_capacity(num_parts);
			for _ in 0..num_parts {
				parts.push(read_vertices(reader)?);
			}
			Geode::Lines { prim, parts }
		}
		PrimType::Polygon => {
			let num_parts = reader.read_u32()? as usize;
			let mut parts = Vec::with_capacity(num_parts);
			for _ in 0..num_parts {
				parts.push(read_vertices(reader)?);
			}
			let num_flags = reader.read_u32()? as usize;
			let mut edge_flags = Vec::with_capacity(num_flags);
			for _ in 0..num_flags {
				edge_flags.push(match reader.read_u8()? {
					0 => geofuse_geometry::EdgeFlag::Normal,
					1 => geofuse_geometry::EdgeFlag::QuadCut,
					2 => geofuse_geometry::EdgeFlag::HoleCut,
					v => bail!(FusionError::InvalidFormat(format!("unknown edge flag {v}"))),
				});
			}
			Geode::new_polygon(prim, parts, edge_flags)
		}
		PrimType::MultiPolygon => {
			let count = reader.read_u32()? as usize;
			let mut polygons = Vec::with_capacity(count);
			for _ in 0..count {
				polygons.push(decode_geode(reader)?);
			}
			Geode::new_multi_polygon(prim, polygons)
		}
		_ => unreachable!(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use geofuse_geometry::EdgeFlag;

	fn sample_line(x0: f64) -> Geode {
		let mut g = Geode::new_lines(PrimType::PolyLine);
		g.add_vertex(Vertex::new_2d(x0, 0.4));
		g.add_vertex(Vertex::new_2d(x0 + 0.1, 0.5));
		g
	}

	#[test]
	fn round_trip_with_index() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let path = dir.path().join("geometry.kvp");

		let mut file = KvpFile::new();
		for i in 0..5 {
			file.add_geode(&sample_line(0.1 * f64::from(i)))?;
		}
		let polygon = Geode::new_polygon(
			PrimType::Polygon,
			vec![vec![
				Vertex::new_2d(0.2, 0.2),
				Vertex::new_2d(0.3, 0.2),
				Vertex::new_2d(0.3, 0.3),
				Vertex::new_2d(0.2, 0.2),
			]],
			vec![EdgeFlag::Normal, EdgeFlag::QuadCut, EdgeFlag::Normal, EdgeFlag::Normal],
		);
		file.add_geode(&polygon)?;
		file.write_to_file(&path)?;

		let opened = KvpFile::open(&path)?;
		assert_eq!(opened.num_records(), 6);
		assert_eq!(opened.prim_type(), Some(PrimType::PolyLine));
		for i in 0..5 {
			let geode = opened.get_geode(i)?;
			assert_eq!(geode, sample_line(0.1 * f64::from(i)));
			let bbox = opened.get_geode_box(i)?;
			assert!(bbox.valid());
		}
		assert_eq!(opened.get_geode(5)?, polygon);
		assert!(opened.get_geode(6).is_err());
		Ok(())
	}

	#[test]
	fn corrupt_magic_is_rejected() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let path = dir.path().join("geometry.kvp");
		let mut file = KvpFile::new();
		file.add_geode(&sample_line(0.1))?;
		file.write_to_file(&path)?;

		let mut data = std::fs::read(&path)?;
		data[0] ^= 0x55;
		std::fs::write(&path, &data)?;

		let err = KvpFile::open(&path).unwrap_err();
		assert!(matches!(
			err.downcast_ref::<FusionError>(),
			Some(FusionError::InvalidFormat(_))
		));
		Ok(())
	}

	#[test]
	fn multi_polygon_round_trip() -> Result<()> {
		let square = |x0: f64| {
			Geode::new_polygon(
				PrimType::Polygon,
				vec![vec![
					Vertex::new_2d(x0, 0.1),
					Vertex::new_2d(x0 + 0.05, 0.1),
					Vertex::new_2d(x0 + 0.05, 0.15),
					Vertex::new_2d(x0, 0.1),
				]],
				vec![EdgeFlag::Normal; 4],
			)
		};
		let multi = Geode::new_multi_polygon(PrimType::MultiPolygon, vec![square(0.1), square(0.3)]);

		let dir = tempfile::tempdir()?;
		let path = dir.path().join("multi.kvp");
		let mut file = KvpFile::new();
		file.add_geode(&multi)?;
		file.write_to_file(&path)?;

		assert_eq!(KvpFile::open(&path)?.get_geode(0)?, multi);
		Ok(())
	}
}
