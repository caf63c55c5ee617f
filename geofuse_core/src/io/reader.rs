//! Reading typed values from a byte slice.

use anyhow::{Result, bail, ensure};
use byteorder::{ByteOrder, LittleEndian};

/// Reads little-endian values from a byte slice, tracking a position.
///
/// # Examples
///
/// ```
/// use geofuse_core::io::BinaryReader;
///
/// let data = [0x01, 0x02, 0x03, 0x04];
/// let mut reader = BinaryReader::new(&data);
/// assert_eq!(reader.read_u16().unwrap(), 0x0201);
/// assert_eq!(reader.position(), 2);
/// ```
pub struct BinaryReader<'a> {
	data: &'a [u8],
	pos: usize,
}

impl<'a> BinaryReader<'a> {
	#[must_use]
	pub fn new(data: &'a [u8]) -> Self {
		Self { data, pos: 0 }
	}

	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	pub fn position(&self) -> usize {
		self.pos
	}

	pub fn set_position(&mut self, pos: usize) -> Result<()> {
		ensure!(pos <= self.data.len(), "position {pos} beyond end ({})", self.data.len());
		self.pos = pos;
		Ok(())
	}

	pub fn remaining(&self) -> usize {
		self.data.len() - self.pos
	}

	/// Borrow the next `len` bytes and advance.
	pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
		if self.remaining() < len {
			bail!("unexpected end of data: need {len} bytes, have {}", self.remaining());
		}
		let slice = &self.data[self.pos..self.pos + len];
		self.pos += len;
		Ok(slice)
	}

	pub fn read_u8(&mut self) -> Result<u8> {
		Ok(self.read_bytes(1)?[0])
	}

	pub fn read_u16(&mut self) -> Result<u16> {
		Ok(LittleEndian::read_u16(self.read_bytes(2)?))
	}

	pub fn read_u32(&mut self) -> Result<u32> {
		Ok(LittleEndian::read_u32(self.read_bytes(4)?))
	}

	pub fn read_u64(&mut self) -> Result<u64> {
		Ok(LittleEndian::read_u64(self.read_bytes(8)?))
	}

	pub fn read_i32(&mut self) -> Result<i32> {
		Ok(LittleEndian::read_i32(self.read_bytes(4)?))
	}

	pub fn read_i64(&mut self) -> Result<i64> {
		Ok(LittleEndian::read_i64(self.read_bytes(8)?))
	}

	pub fn read_f32(&mut self) -> Result<f32> {
		Ok(LittleEndian::read_f32(self.read_bytes(4)?))
	}

	pub fn read_f64(&mut self) -> Result<f64> {
		Ok(LittleEndian::read_f64(self.read_bytes(8)?))
	}

	/// Read exactly `len` bytes as UTF-8, without trimming.
	pub fn read_string(&mut self, len: usize) -> Result<String> {
		let bytes = self.read_bytes(len)?;
		Ok(String::from_utf8_lossy(bytes).into_owned())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reads_values_in_order() -> Result<()> {
		let mut data = Vec::new();
		data.extend_from_slice(&7u32.to_le_bytes());
		data.extend_from_slice(&0.5f64.to_le_bytes());
		data.extend_from_slice(b"abc");

		let mut reader = BinaryReader::new(&data);
		assert_eq!(reader.read_u32()?, 7);
		assert_eq!(reader.read_f64()?, 0.5);
		assert_eq!(reader.read_string(3)?, "abc");
		assert_eq!(reader.remaining(), 0);
		Ok(())
	}

	#[test]
	fn fails_past_end() {
		let mut reader = BinaryReader::new(&[1, 2]);
		assert!(reader.read_u32().is_err());
		assert!(reader.set_position(3).is_err());
		assert!(reader.set_position(2).is_ok());
	}
}
