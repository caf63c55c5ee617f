//! Typed attribute records and their shared headers.
//!
//! A record is a row of typed values governed by an immutable header shared
//! across all rows of one source layer. Headers compare by column name
//! (case-insensitively), type, length and multiplier. Rows round-trip
//! through a packed little-endian form used by the KVP attribute store.

use anyhow::{Context, Result, bail, ensure};
use geofuse_core::{
	FusionError,
	io::{BinaryReader, BinaryWriter},
};
use std::sync::Arc;

/// Column value type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
	String,
	Int,
	UInt,
	Int64,
	UInt64,
	Float,
	Double,
	Bool,
}

impl FieldType {
	pub fn code(&self) -> u32 {
		use FieldType::*;
		match self {
			String => 0,
			Int => 1,
			UInt => 2,
			Int64 => 3,
			UInt64 => 4,
			Float => 5,
			Double => 6,
			Bool => 7,
		}
	}

	pub fn from_code(code: u32) -> Result<FieldType> {
		use FieldType::*;
		Ok(match code {
			0 => String,
			1 => Int,
			2 => UInt,
			3 => Int64,
			4 => UInt64,
			5 => Float,
			6 => Double,
			7 => Bool,
			_ => bail!(FusionError::InvalidFormat(format!("unknown field type code {code}"))),
		})
	}
}

/// One column of a record header.
#[derive(Clone, Debug)]
pub struct FieldSpec {
	pub name: String,
	pub ftype: FieldType,
	pub length: i32,
	pub multiplier: f64,
}

impl FieldSpec {
	#[must_use]
	pub fn new(name: &str, ftype: FieldType) -> Self {
		Self {
			name: name.to_string(),
			ftype,
			length: -1,
			multiplier: 0.0,
		}
	}
}

impl PartialEq for FieldSpec {
	fn eq(&self, other: &Self) -> bool {
		// column names compare case-insensitively
		self.name.eq_ignore_ascii_case(&other.name)
			&& self.ftype == other.ftype
			&& self.length == other.length
			&& self.multiplier == other.multiplier
	}
}

/// An immutable record layout shared by every row of a layer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordHeader {
	field_specs: Vec<FieldSpec>,
}

pub type SharedHeader = Arc<RecordHeader>;
pub type SharedRecord = Arc<Record>;

impl RecordHeader {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn from_specs(field_specs: Vec<FieldSpec>) -> Self {
		Self { field_specs }
	}

	pub fn add_spec(&mut self, spec: FieldSpec) {
		self.field_specs.push(spec);
	}

	pub fn specs(&self) -> &[FieldSpec] {
		&self.field_specs
	}

	pub fn num_columns(&self) -> usize {
		self.field_specs.len()
	}

	pub fn has_attrib(&self) -> bool {
		self.num_columns() > 0
	}

	/// Case-insensitive column lookup.
	pub fn field_pos_by_name(&self, name: &str) -> Option<usize> {
		self.field_specs.iter().position(|s| s.name.eq_ignore_ascii_case(name))
	}

	/// A record with default-valued fields.
	pub fn new_record(self: &Arc<Self>) -> Record {
		let fields = self.field_specs.iter().map(|s| Value::default_for(s.ftype)).collect();
		Record {
			header: self.clone(),
			fields,
		}
	}

	/// Pack a record into the on-disk row form.
	pub fn to_raw(&self, record: &Record) -> Result<Vec<u8>> {
		ensure!(
			record.fields.len() == self.num_columns(),
			"record has {} fields, header {}",
			record.fields.len(),
			self.num_columns()
		);
		let mut writer = BinaryWriter::new();
		for (value, spec) in record.fields.iter().zip(&self.field_specs) {
			ensure!(
				value.matches(spec.ftype),
				"field {:?} does not match declared type {:?}",
				value,
				spec.ftype
			);
			match value {
				Value::String(s) => {
					writer.write_u32(s.len() as u32);
					writer.write_bytes(s.as_bytes());
				}
				Value::Int(v) => writer.write_i32(*v),
				Value::UInt(v) => writer.write_u32(*v),
				Value::Int64(v) => writer.write_i64(*v),
				Value::UInt64(v) => writer.write_u64(*v),
				Value::Float(v) => writer.write_f32(*v),
				Value::Double(v) => writer.write_f64(*v),
				Value::Bool(v) => writer.write_u8(u8::from(*v)),
			}
		}
		Ok(writer.into_vec())
	}

	/// Unpack a row. String fields must be valid UTF-8; anything else is an
	/// attribute error (soft).
	pub fn from_raw(self: &Arc<Self>, buf: &[u8]) -> Result<Record> {
		let mut reader = BinaryReader::new(buf);
		let mut fields = Vec::with_capacity(self.num_columns());
		for spec in &self.field_specs {
			let value = match spec.ftype {
				FieldType::String => {
					let len = reader.read_u32()? as usize;
					let bytes = reader.read_bytes(len)?;
					let text = std::str::from_utf8(bytes).map_err(|_| {
						FusionError::InvalidAttribute(format!("field '{}' is not valid UTF-8", spec.name))
					})?;
					Value::String(text.to_string())
				}
				FieldType::Int => Value::Int(reader.read_i32()?),
				FieldType::UInt => Value::UInt(reader.read_u32()?),
				FieldType::Int64 => Value::Int64(reader.read_i64()?),
				FieldType::UInt64 => Value::UInt64(reader.read_u64()?),
				FieldType::Float => Value::Float(reader.read_f32()?),
				FieldType::Double => Value::Double(reader.read_f64()?),
				FieldType::Bool => Value::Bool(reader.read_u8()? != 0),
			};
			fields.push(value);
		}
		ensure!(reader.remaining() == 0, "trailing bytes after record");
		Ok(Record {
			header: self.clone(),
			fields,
		})
	}
}

/// A typed cell value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
	String(String),
	Int(i32),
	UInt(u32),
	Int64(i64),
	UInt64(u64),
	Float(f32),
	Double(f64),
	Bool(bool),
}

impl Value {
	fn default_for(ftype: FieldType) -> Value {
		match ftype {
			FieldType::String => Value::String(String::new()),
			FieldType::Int => Value::Int(0),
			FieldType::UInt => Value::UInt(0),
			FieldType::Int64 => Value::Int64(0),
			FieldType::UInt64 => Value::UInt64(0),
			FieldType::Float => Value::Float(0.0),
			FieldType::Double => Value::Double(0.0),
			FieldType::Bool => Value::Bool(false),
		}
	}

	fn matches(&self, ftype: FieldType) -> bool {
		matches!(
			(self, ftype),
			(Value::String(_), FieldType::String)
				| (Value::Int(_), FieldType::Int)
				| (Value::UInt(_), FieldType::UInt)
				| (Value::Int64(_), FieldType::Int64)
				| (Value::UInt64(_), FieldType::UInt64)
				| (Value::Float(_), FieldType::Float)
				| (Value::Double(_), FieldType::Double)
				| (Value::Bool(_), FieldType::Bool)
		)
	}

	pub fn as_string(&self) -> String {
		match self {
			Value::String(s) => s.clone(),
			Value::Int(v) => v.to_string(),
			Value::UInt(v) => v.to_string(),
			Value::Int64(v) => v.to_string(),
			Value::UInt64(v) => v.to_string(),
			Value::Float(v) => v.to_string(),
			Value::Double(v) => v.to_string(),
			Value::Bool(v) => v.to_string(),
		}
	}

	/// Numeric view; strings parse, non-numeric strings are `None`.
	pub fn as_double(&self) -> Option<f64> {
		match self {
			Value::String(s) => s.trim().parse().ok(),
			Value::Int(v) => Some(f64::from(*v)),
			Value::UInt(v) => Some(f64::from(*v)),
			Value::Int64(v) => Some(*v as f64),
			Value::UInt64(v) => Some(*v as f64),
			Value::Float(v) => Some(f64::from(*v)),
			Value::Double(v) => Some(*v),
			Value::Bool(v) => Some(f64::from(u8::from(*v))),
		}
	}

	pub fn as_bool(&self) -> bool {
		match self {
			Value::String(s) => !s.is_empty() && s != "0" && !s.eq_ignore_ascii_case("false"),
			Value::Bool(v) => *v,
			other => other.as_double().is_some_and(|v| v != 0.0),
		}
	}
}

/// A row of typed values.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
	header: SharedHeader,
	fields: Vec<Value>,
}

impl Record {
	/// A free-standing single-string record (labels, expanded sites).
	#[must_use]
	pub fn single_string(text: String) -> Record {
		let header = Arc::new(RecordHeader::from_specs(vec![FieldSpec::new("label", FieldType::String)]));
		Record {
			header,
			fields: vec![Value::String(text)],
		}
	}

	pub fn header(&self) -> &SharedHeader {
		&self.header
	}

	pub fn num_fields(&self) -> usize {
		self.fields.len()
	}

	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}

	pub fn field(&self, index: usize) -> Option<&Value> {
		self.fields.get(index)
	}

	pub fn field_by_name(&self, name: &str) -> Option<&Value> {
		self.fields.get(self.header.field_pos_by_name(name)?)
	}

	pub fn set_field(&mut self, index: usize, value: Value) {
		if index < self.fields.len() {
			self.fields[index] = value;
		}
	}
}

/// Expands `{column}` templates against a record.
///
/// Unknown column names fail at construction, not per row.
#[derive(Clone, Debug)]
pub struct RecordFormatter {
	/// Literal chunks; `args[i]` is inserted after `chunks[i]`.
	chunks: Vec<String>,
	args: Vec<usize>,
}

impl RecordFormatter {
	pub fn new(format: &str, header: &RecordHeader) -> Result<Self> {
		lazy_static::lazy_static! {
			static ref FIELD_REF: regex::Regex = regex::Regex::new(r"\{([^{}]+)\}").unwrap();
		}

		let mut chunks = Vec::new();
		let mut args = Vec::new();
		let mut last = 0;
		for capture in FIELD_REF.captures_iter(format) {
			let whole = capture.get(0).unwrap();
			let name = capture.get(1).unwrap().as_str();
			let pos = header
				.field_pos_by_name(name)
				.with_context(|| format!("unknown column '{name}' in format '{format}'"))?;
			chunks.push(format[last..whole.start()].to_string());
			args.push(pos);
			last = whole.end();
		}
		chunks.push(format[last..].to_string());
		Ok(Self { chunks, args })
	}

	pub fn expand(&self, record: &Record) -> String {
		let mut out = String::new();
		for (i, chunk) in self.chunks.iter().enumerate() {
			out.push_str(chunk);
			if let Some(&pos) = self.args.get(i) {
				if let Some(value) = record.field(pos) {
					out.push_str(&value.as_string());
				}
			}
		}
		out
	}
}
