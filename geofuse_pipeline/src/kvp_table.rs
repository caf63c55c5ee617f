//! The KVP attribute table, parallel to the geometry store.
//!
//! ```text
//! header     : magic 0xab0120cd, version, num_records, num_fields,
//!              field_defs_size, filler, index_offset i64
//! field defs : serialized FieldSpec list
//! records    : row-packed record data
//! index      : num_records × { offset u64, size u32, pad u32 }
//! ```

use crate::record::{FieldSpec, FieldType, Record, RecordHeader, SharedHeader};
use anyhow::{Context, Result, bail, ensure};
use geofuse_core::{
	FusionError,
	io::{BinaryReader, BinaryWriter},
};
use std::{path::Path, sync::Arc};

use crate::kvp_file::KVP_MAGIC;

const TABLE_VERSION: u32 = 1;
const HEADER_SIZE: usize = 32;
const RECORD_POS_SIZE: usize = 16;

#[derive(Clone, Copy, Debug)]
struct RecordPos {
	offset: u64,
	size: u32,
}

/// An attribute table keyed by feature id.
#[derive(Debug)]
pub struct KvpTable {
	header: SharedHeader,
	rows: Vec<Vec<u8>>,
	index: Vec<RecordPos>,
	data: Vec<u8>,
}

impl KvpTable {
	/// An empty table for the given record layout.
	#[must_use]
	pub fn new(header: SharedHeader) -> Self {
		Self {
			header,
			rows: Vec::new(),
			index: Vec::new(),
			data: Vec::new(),
		}
	}

	pub fn attr_defs(&self) -> &SharedHeader {
		&self.header
	}

	pub fn num_records(&self) -> u32 {
		self.index.len() as u32
	}

	/// Append one record; it must match the table's header.
	pub fn add_record(&mut self, record: &Record) -> Result<()> {
		ensure!(
			**record.header() == *self.header,
			"record header does not match table header"
		);
		let raw = self.header.to_raw(record)?;
		self.index.push(RecordPos {
			offset: 0,
			size: raw.len() as u32,
		});
		self.rows.push(raw);
		Ok(())
	}

	pub fn write_to_file(&self, path: &Path) -> Result<()> {
		let mut defs = BinaryWriter::new();
		for spec in self.header.specs() {
			defs.write_u32(spec.name.len() as u32);
			defs.write_bytes(spec.name.as_bytes());
			defs.write_u32(spec.ftype.code());
			defs.write_i32(spec.length);
			defs.write_f64(spec.multiplier);
		}
		let defs = defs.into_vec();

		let mut body = BinaryWriter::new();
		let mut offsets = Vec::with_capacity(self.rows.len());
		for row in &self.rows {
			offsets.push((HEADER_SIZE + defs.len() + body.position()) as u64);
			body.write_bytes(row);
		}
		let index_offset = (HEADER_SIZE + defs.len() + body.position()) as i64;

		let mut writer = BinaryWriter::new();
		writer.write_u32(KVP_MAGIC);
		writer.write_u32(TABLE_VERSION);
		writer.write_u32(self.rows.len() as u32);
		writer.write_i32(self.header.num_columns() as i32);
		writer.write_i32(defs.len() as i32);
		writer.write_i32(0);
		writer.write_i64(index_offset);
		debug_assert_eq!(writer.position(), HEADER_SIZE);
		writer.write_bytes(&defs);
		writer.write_bytes(&body.into_vec());
		for (pos, offset) in self.index.iter().zip(offsets) {
			writer.write_u64(offset);
			writer.write_u32(pos.size);
			writer.write_u32(0);
		}

		std::fs::write(path, writer.into_vec())
			.map_err(|e| FusionError::IoFailure(format!("unable to write {}: {e}", path.display())).into())
	}

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
		if version != TABLE_VERSION {
			bail!(FusionError::InvalidFormat(format!("unsupported version {version}")));
		}
		let num_records = reader.read_u32()? as usize;
		let num_fields = reader.read_i32()?;
		let defs_size = reader.read_i32()?;
		let _filler = reader.read_i32()?;
		let index_offset = reader.read_i64()?;
		ensure!(num_fields >= 0 && defs_size >= 0, "negative header counts");

		let mut specs = Vec::with_capacity(num_fields as usize);
		for _ in 0..num_fields {
			let name_len = reader.read_u32()? as usize;
			let name = reader.read_string(name_len)?;
			let ftype = FieldType::from_code(reader.read_u32()?)?;
			let length = reader.read_i32()?;
			let multiplier = reader.read_f64()?;
			specs.push(FieldSpec {
				name,
				ftype,
				length,
				multiplier,
			});
		}
		let header = Arc::new(RecordHeader::from_specs(specs));

		let index_size = num_records * RECORD_POS_SIZE;
		if index_offset < 0 || index_offset as usize + index_size > data.len() {
			bail!(FusionError::InvalidFormat(format!(
				"index at {index_offset} (size {index_size}) beyond end of file"
			)));
		}
		let mut index_reader = BinaryReader::new(&data);
		index_reader.set_position(index_offset as usize)?;
		let mut index = Vec::with_capacity(num_records);
		for _ in 0..num_records {
			let offset = index_reader.read_u64()?;
			let size = index_reader.read_u32()?;
			let _pad = index_reader.read_u32()?;
			if offset + u64::from(size) > data.len() as u64 {
				bail!(FusionError::InvalidFormat(format!(
					"row at {offset} (size {size}) beyond end of file"
				)));
			}
			index.push(RecordPos { offset, size });
		}

		Ok(Self {
			header,
			rows: Vec::new(),
			index,
			data,
		})
	}

	/// Decode the row with the given id.
	pub fn row(&self, id: u32) -> Result<Record> {
		let pos = self
			.index
			.get(id as usize)
			.with_context(|| format!("row id {id} out of range"))?;
		let bytes = &self.data[pos.offset as usize..(pos.offset + u64::from(pos.size)) as usize];
		self.header.from_raw(bytes)
	}
}
