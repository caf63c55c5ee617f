//! Per-level presence bitmasks and their on-disk format.
//!
//! A presence mask records, one bit per tile, which tiles of an inset
//! actually carry data. The on-disk layout is a single contiguous file:
//!
//! ```text
//! offset 0   : 32-byte header (22-byte magic, version, num_levels, size)
//! offset 32  : num_levels × 32-byte level records
//! offset …   : concatenated per-level bit buffers
//! ```
//!
//! Integers are little-endian. The writer zero-fills the file and writes the
//! header last, so an interrupted write leaves an invalid magic behind and
//! the reader will refuse it.

use crate::{
	FusionError,
	io::{BinaryReader, BinaryWriter},
	types::{Extents, InsetCoverage, TileAddr},
};
use anyhow::{Context, Result, bail};
use std::{
	fs::File,
	io::{Seek, SeekFrom, Write},
	path::Path,
};

/// One beyond the deepest level the fusion pipeline addresses.
pub const NUM_FUSION_LEVELS: u32 = 25;

const MAGIC: &[u8; 22] = b"Keyhole Presence Mask\0";
const FORMAT_VERSION: u8 = 1;
const HEADER_SIZE: u32 = 32;
const LEVEL_RECORD_SIZE: u32 = 32;

/// One bit per tile at a single level.
#[derive(Clone, Debug, PartialEq)]
pub struct LevelPresenceMask {
	pub level: u32,
	pub extents: Extents<u32>,
	buf: Vec<u8>,
}

impl LevelPresenceMask {
	/// Bytes needed for a `rows × cols` bitmap.
	pub fn calc_buffer_size(num_rows: u32, num_cols: u32) -> u32 {
		(num_rows * num_cols).div_ceil(8)
	}

	#[must_use]
	pub fn new(level: u32, extents: Extents<u32>, set_present: bool) -> Self {
		let size = Self::calc_buffer_size(extents.num_rows(), extents.num_cols());
		Self {
			level,
			extents,
			buf: vec![if set_present { 0xff } else { 0x00 }; size as usize],
		}
	}

	fn from_buffer(level: u32, extents: Extents<u32>, buf: Vec<u8>) -> Self {
		debug_assert_eq!(
			buf.len() as u32,
			Self::calc_buffer_size(extents.num_rows(), extents.num_cols())
		);
		Self { level, extents, buf }
	}

	pub fn buffer_size(&self) -> u32 {
		self.buf.len() as u32
	}

	pub fn buffer(&self) -> &[u8] {
		&self.buf
	}

	fn bit_index(&self, row: u32, col: u32) -> usize {
		debug_assert!(self.extents.contains_row_col(row, col));
		let grid_row = row - self.extents.begin_row();
		let grid_col = col - self.extents.begin_col();
		(grid_row * self.extents.num_cols() + grid_col) as usize
	}

	pub fn get(&self, row: u32, col: u32) -> bool {
		let idx = self.bit_index(row, col);
		self.buf[idx / 8] & (1 << (idx % 8)) != 0
	}

	pub fn set(&mut self, row: u32, col: u32, present: bool) {
		let idx = self.bit_index(row, col);
		if present {
			self.buf[idx / 8] |= 1 << (idx % 8);
		} else {
			self.buf[idx / 8] &= !(1 << (idx % 8));
		}
	}

	pub fn set_all(&mut self, present: bool) {
		self.buf.fill(if present { 0xff } else { 0x00 });
	}
}

/// Presence bitmaps across the levels of one inset.
#[derive(Clone, Debug)]
pub struct PresenceMask {
	begin_level: u32,
	end_level: u32,
	levels: Vec<Option<LevelPresenceMask>>,
}

impl PresenceMask {
	/// Build from an inset coverage, all bits present or all absent.
	#[must_use]
	pub fn new(coverage: &InsetCoverage, set_present: bool) -> Self {
		let mut levels = vec![None; NUM_FUSION_LEVELS as usize];
		for level in coverage.begin_level()..coverage.end_level() {
			levels[level as usize] = Some(LevelPresenceMask::new(
				level,
				*coverage.level_extents(level),
				set_present,
			));
		}
		Self {
			begin_level: coverage.begin_level(),
			end_level: coverage.end_level(),
			levels,
		}
	}

	pub fn begin_level(&self) -> u32 {
		self.begin_level
	}

	pub fn end_level(&self) -> u32 {
		self.end_level
	}

	pub fn num_levels(&self) -> u32 {
		self.end_level - self.begin_level
	}

	pub fn has_level(&self, level: u32) -> bool {
		(level as usize) < self.levels.len() && self.levels[level as usize].is_some()
	}

	/// The stored extents at `level`, empty when the level is absent.
	pub fn level_tile_extents(&self, level: u32) -> Extents<u32> {
		self.levels[level as usize]
			.as_ref()
			.map_or_else(Extents::new_empty, |l| l.extents)
	}

	/// The stored bit. The level must exist.
	pub fn get(&self, addr: &TileAddr) -> bool {
		self.levels[addr.level as usize]
			.as_ref()
			.is_some_and(|l| l.extents.contains_row_col(addr.row, addr.col) && l.get(addr.row, addr.col))
	}

	pub fn set(&mut self, addr: &TileAddr, present: bool) {
		if let Some(level) = self.levels[addr.level as usize].as_mut()
			&& level.extents.contains_row_col(addr.row, addr.col)
		{
			level.set(addr.row, addr.col, present);
		}
	}

	/// Set every bit of one level.
	pub fn set_level(&mut self, level: u32, present: bool) {
		if let Some(l) = self.levels[level as usize].as_mut() {
			l.set_all(present);
		}
	}

	/// Set the bit at `addr` and every ancestor up to the begin level,
	/// stopping early at the first already-present ancestor.
	pub fn set_cascade(&mut self, addr: &TileAddr) {
		let mut addr = *addr;
		while let Some(level) = self.levels[addr.level as usize].as_mut() {
			if !level.extents.contains_row_col(addr.row, addr.col) || level.get(addr.row, addr.col) {
				break;
			}
			level.set(addr.row, addr.col, true);
			if addr.level <= self.begin_level {
				break;
			}
			addr.minify_by(1);
		}
	}

	/// Presence at any level, estimated when `addr.level` is outside the
	/// stored range: above it, the single ancestor at `end_level − 1`
	/// decides; below it, any present descendant at `begin_level` does.
	pub fn estimated_presence(&self, addr: &TileAddr) -> bool {
		debug_assert!(addr.level < NUM_FUSION_LEVELS);
		if let Some(level) = self.levels[addr.level as usize].as_ref() {
			return level.extents.contains_row_col(addr.row, addr.col) && level.get(addr.row, addr.col);
		}
		if addr.level >= self.end_level {
			if self.num_levels() == 0 {
				return false;
			}
			let max_addr = addr.minified_to_level(self.end_level - 1);
			return self.get(&max_addr);
		}
		debug_assert!(addr.level < self.begin_level);
		let Some(begin) = self.levels.get(self.begin_level as usize).and_then(Option::as_ref) else {
			return false;
		};
		let descendants = addr.magnified_to_level(self.begin_level);
		let to_check = Extents::intersection(&descendants.extents, &begin.extents);
		for row in to_check.begin_row()..to_check.end_row() {
			for col in to_check.begin_col()..to_check.end_col() {
				if begin.get(row, col) {
					return true;
				}
			}
		}
		false
	}

	/// The coverage this mask spans.
	pub fn populate_coverage(&self) -> InsetCoverage {
		if self.num_levels() == 0 {
			return InsetCoverage::default();
		}
		let extents_list = (self.begin_level..self.end_level)
			.map(|level| self.level_tile_extents(level))
			.collect();
		InsetCoverage::from_extents_list(self.begin_level, self.end_level, extents_list).unwrap()
	}

	/// Parse a presence-mask file.
	pub fn from_file(path: &Path) -> Result<Self> {
		let data = std::fs::read(path)
			.map_err(|e| FusionError::IoFailure(format!("unable to read {}: {e}", path.display())))?;
		Self::from_bytes(&data).with_context(|| format!("while loading presence mask {}", path.display()))
	}

	fn from_bytes(data: &[u8]) -> Result<Self> {
		if data.len() < HEADER_SIZE as usize {
			bail!(FusionError::InvalidFormat(format!(
				"presence file too short ({} bytes)",
				data.len()
			)));
		}
		let mut reader = BinaryReader::new(data);
		let magic = reader.read_bytes(MAGIC.len())?;
		if magic != MAGIC {
			bail!(FusionError::InvalidFormat("corrupted header (magic)".to_string()));
		}
		let version = reader.read_u8()?;
		if version != FORMAT_VERSION {
			bail!(FusionError::InvalidFormat(format!(
				"unsupported format version ({version})"
			)));
		}
		let num_levels = u32::from(reader.read_u8()?);
		let total_file_size = reader.read_u32()?;
		let _reserved = reader.read_u32()?;

		if total_file_size as usize != data.len() {
			bail!(FusionError::InvalidFormat(format!(
				"corrupted header (file size {total_file_size} != {})",
				data.len()
			)));
		}
		if num_levels > NUM_FUSION_LEVELS {
			bail!(FusionError::InvalidFormat(format!(
				"corrupted header (num levels {num_levels})"
			)));
		}

		let mut levels = vec![None; NUM_FUSION_LEVELS as usize];
		let mut begin_level = NUM_FUSION_LEVELS;
		let mut end_level = 0u32;
		for _ in 0..num_levels {
			let buf_offset = reader.read_u32()?;
			let buf_size = reader.read_u32()?;
			let start_row = reader.read_u32()?;
			let start_col = reader.read_u32()?;
			let num_rows = reader.read_u32()?;
			let num_cols = reader.read_u32()?;
			let level = u32::from(reader.read_u8()?);
			let _ = reader.read_u8()?;
			let _ = reader.read_u16()?;
			let _ = reader.read_u32()?;

			if level >= NUM_FUSION_LEVELS {
				bail!(FusionError::InvalidFormat(format!(
					"corrupted level header (level {level})"
				)));
			}
			if buf_size != LevelPresenceMask::calc_buffer_size(num_rows, num_cols) {
				bail!(FusionError::InvalidFormat(format!(
					"corrupted level header (size) at level {level}"
				)));
			}
			if u64::from(buf_offset) + u64::from(buf_size) > u64::from(total_file_size) {
				bail!(FusionError::InvalidFormat(format!(
					"corrupted level header (offset) at level {level}"
				)));
			}

			let extents =
				Extents::from_row_col(start_row, start_row + num_rows, start_col, start_col + num_cols);
			let buf = data[buf_offset as usize..(buf_offset + buf_size) as usize].to_vec();
			levels[level as usize] = Some(LevelPresenceMask::from_buffer(level, extents, buf));

			end_level = end_level.max(level + 1);
			begin_level = begin_level.min(level);
		}

		if num_levels != end_level.saturating_sub(begin_level) {
			bail!(FusionError::InvalidFormat("corrupted header (min/max/num)".to_string()));
		}

		Ok(Self {
			begin_level: if num_levels == 0 { 0 } else { begin_level },
			end_level,
			levels,
		})
	}

	/// Write the mask to `path`.
	///
	/// The file is zero-filled first and the header written last, so a
	/// partial file never carries a valid magic.
	pub fn write_to_file(&self, path: &Path) -> Result<()> {
		let stored: Vec<&LevelPresenceMask> = self.levels.iter().filter_map(Option::as_ref).collect();
		let data_offset = HEADER_SIZE + stored.len() as u32 * LEVEL_RECORD_SIZE;
		let total_size = data_offset + stored.iter().map(|l| l.buffer_size()).sum::<u32>();

		let mut file = File::create(path)
			.map_err(|e| FusionError::IoFailure(format!("unable to create {}: {e}", path.display())))?;
		let io_err = |e: std::io::Error| FusionError::IoFailure(format!("unable to write {}: {e}", path.display()));

		// presize with zeros
		file.write_all(&vec![0u8; total_size as usize]).map_err(io_err)?;

		// level records, then the bit buffers
		let mut body = BinaryWriter::new();
		let mut buf_offset = data_offset;
		for level in &stored {
			body.write_u32(buf_offset);
			body.write_u32(level.buffer_size());
			body.write_u32(level.extents.begin_row());
			body.write_u32(level.extents.begin_col());
			body.write_u32(level.extents.num_rows());
			body.write_u32(level.extents.num_cols());
			body.write_u8(level.level as u8);
			body.write_u8(0);
			body.write_u16(0);
			body.write_u32(0);
			buf_offset += level.buffer_size();
		}
		for level in &stored {
			body.write_bytes(level.buffer());
		}
		file.seek(SeekFrom::Start(u64::from(HEADER_SIZE))).map_err(io_err)?;
		file.write_all(&body.into_vec()).map_err(io_err)?;

		// header last
		let mut header = BinaryWriter::new();
		header.write_bytes(MAGIC);
		header.write_u8(FORMAT_VERSION);
		header.write_u8(stored.len() as u8);
		header.write_u32(total_size);
		header.write_u32(0);
		file.seek(SeekFrom::Start(0)).map_err(io_err)?;
		file.write_all(&header.into_vec()).map_err(io_err)?;
		file.sync_all().map_err(io_err)?;
		Ok(())
	}
}
