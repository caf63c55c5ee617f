//! Writing typed values to an in-memory buffer.

use byteorder::{ByteOrder, LittleEndian};

/// Builds a little-endian byte buffer value by value.
///
/// # Examples
///
/// ```
/// use geofuse_core::io::BinaryWriter;
///
/// let mut writer = BinaryWriter::new();
/// writer.write_u16(0x0201);
/// assert_eq!(writer.into_vec(), vec![0x01, 0x02]);
/// ```
#[derive(Default)]
pub struct BinaryWriter {
	data: Vec<u8>,
}

impl BinaryWriter {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn position(&self) -> usize {
		self.data.len()
	}

	pub fn into_vec(self) -> Vec<u8> {
		self.data
	}

	pub fn write_bytes(&mut self, bytes: &[u8]) {
		self.data.extend_from_slice(bytes);
	}

	/// Pad with `len` zero bytes.
	pub fn write_zeros(&mut self, len: usize) {
		self.data.resize(self.data.len() + len, 0);
	}

	pub fn write_u8(&mut self, value: u8) {
		self.data.push(value);
	}

	pub fn write_u16(&mut self, value: u16) {
		let mut buf = [0u8; 2];
		LittleEndian::write_u16(&mut buf, value);
		self.data.extend_from_slice(&buf);
	}

	pub fn write_u32(&mut self, value: u32) {
		let mut buf = [0u8; 4];
		LittleEndian::write_u32(&mut buf, value);
		self.data.extend_from_slice(&buf);
	}

	pub fn write_u64(&mut self, value: u64) {
		let mut buf = [0u8; 8];
		LittleEndian::write_u64(&mut buf, value);
		self.data.extend_from_slice(&buf);
	}

	pub fn write_i32(&mut self, value: i32) {
		let mut buf = [0u8; 4];
		LittleEndian::write_i32(&mut buf, value);
		self.data.extend_from_slice(&buf);
	}

	pub fn write_i64(&mut self, value: i64) {
		let mut buf = [0u8; 8];
		LittleEndian::write_i64(&mut buf, value);
		self.data.extend_from_slice(&buf);
	}

	pub fn write_f32(&mut self, value: f32) {
		let mut buf = [0u8; 4];
		LittleEndian::write_f32(&mut buf, value);
		self.data.extend_from_slice(&buf);
	}

	pub fn write_f64(&mut self, value: f64) {
		let mut buf = [0u8; 8];
		LittleEndian::write_f64(&mut buf, value);
		self.data.extend_from_slice(&buf);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::io::BinaryReader;

	#[test]
	fn round_trips_through_reader() -> anyhow::Result<()> {
		let mut writer = BinaryWriter::new();
		writer.write_u8(9);
		writer.write_u32(123_456);
		writer.write_i64(-42);
		writer.write_f64(0.25);
		writer.write_zeros(3);
		assert_eq!(writer.position(), 1 + 4 + 8 + 8 + 3);

		let data = writer.into_vec();
		let mut reader = BinaryReader::new(&data);
		assert_eq!(reader.read_u8()?, 9);
		assert_eq!(reader.read_u32()?, 123_456);
		assert_eq!(reader.read_i64()?, -42);
		assert_eq!(reader.read_f64()?, 0.25);
		assert_eq!(reader.read_bytes(3)?, &[0, 0, 0]);
		Ok(())
	}
}
