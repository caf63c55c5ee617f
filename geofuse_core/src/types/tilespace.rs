//! The tile-grid parameter pack.
//!
//! A [`Tilespace`] fixes the pixel size of a tile, the number of pixels the
//! whole world spans at level 0, the deepest valid level and the projection
//! flavor. Coverage types deliberately do **not** store a tilespace; callers
//! thread it through every conversion so one coverage value can never be
//! interpreted against the wrong grid.
//!
//! Normalized coordinates map longitude `[-180°, 180°]` onto `[0, 1]`; the
//! valid latitude band maps onto `[0.25, 0.75]`.

/// Immutable tile-grid parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tilespace {
	/// Tile width/height is `2^tile_size_log2` pixels.
	pub tile_size_log2: u32,
	/// The world is `2^pixels_at_level0_log2` pixels wide at level 0.
	pub pixels_at_level0_log2: u32,
	/// One beyond the deepest valid level.
	pub max_level: u32,
	/// Flat (plate carrée) vs mercator tile grid.
	pub is_mercator: bool,
}

/// The tilespace used by the vector fusion pipeline: 2048-pixel supertiles,
/// 256 pixels at level 0, 24 levels, flat projection.
pub const FUSION_TILESPACE: Tilespace = Tilespace {
	tile_size_log2: 11,
	pixels_at_level0_log2: 8,
	max_level: 24,
	is_mercator: false,
};

impl Tilespace {
	pub fn tile_size(&self) -> u32 {
		1 << self.tile_size_log2
	}

	pub fn pixels_at_level0(&self) -> u32 {
		1 << self.pixels_at_level0_log2
	}

	/// Number of tiles along one axis at `level`. Coarse levels where the
	/// whole world fits inside a single tile report 1.
	pub fn tiles_at_level(&self, level: u32) -> u32 {
		if level + self.pixels_at_level0_log2 >= self.tile_size_log2 {
			1 << (level + self.pixels_at_level0_log2 - self.tile_size_log2)
		} else {
			1
		}
	}

	/// World width in pixels at `level`.
	pub fn pixels_at_level(&self, level: u32) -> u64 {
		u64::from(self.pixels_at_level0()) << level
	}

	/// Degrees to normalized `[0, 1]` space (both axes share the mapping,
	/// which lands the ±90° latitude band on `[0.25, 0.75]`).
	pub fn normalize(degrees: f64) -> f64 {
		degrees / 360.0 + 0.5
	}

	/// Normalized `[0, 1]` back to degrees.
	pub fn denormalize(norm: f64) -> f64 {
		(norm - 0.5) * 360.0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fusion_tilespace_dimensions() {
		let ts = FUSION_TILESPACE;
		assert_eq!(ts.tile_size(), 2048);
		assert_eq!(ts.pixels_at_level0(), 256);
		assert_eq!(ts.tiles_at_level(0), 1);
		assert_eq!(ts.tiles_at_level(3), 1);
		assert_eq!(ts.tiles_at_level(4), 2);
		assert_eq!(ts.tiles_at_level(11), 256);
		assert_eq!(ts.pixels_at_level(4), 4096);
	}

	#[test]
	fn normalize_round_trips() {
		assert_eq!(Tilespace::normalize(-180.0), 0.0);
		assert_eq!(Tilespace::normalize(180.0), 1.0);
		assert_eq!(Tilespace::normalize(90.0), 0.75);
		assert_eq!(Tilespace::normalize(-90.0), 0.25);
		assert_eq!(Tilespace::denormalize(Tilespace::normalize(42.5)), 42.5);
	}
}
