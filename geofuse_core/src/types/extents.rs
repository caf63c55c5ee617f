//! Axis-aligned extents over integer or floating coordinates.
//!
//! `Extents<T>` is the workhorse rectangle of the tile pipeline. The same
//! type covers two families with different semantics:
//!
//! - integer coordinates (tile rows/columns, pixels): **half-open**
//!   `[begin, end)` on both axes, empty when degenerate;
//! - `f64` coordinates (normalized or degree space): **closed**
//!   `[begin, end]`, empty only when all four coordinates are zero.
//!
//! Invalid constructor arguments (end before begin) collapse to the empty
//! extents rather than producing an inverted rectangle, so a constructed
//! value is always valid.
//!
//! ## Examples
//! ```
//! use geofuse_core::types::Extents;
//!
//! let a = Extents::<u32>::from_xy(0, 4, 0, 4);
//! let b = Extents::<u32>::from_xy(2, 6, 2, 6);
//! let i = Extents::intersection(&a, &b);
//! assert_eq!((i.begin_x(), i.end_x(), i.begin_y(), i.end_y()), (2, 4, 2, 4));
//! ```

use num_traits::{Bounded, PrimInt, Zero};
use std::{
	collections::VecDeque,
	fmt::Debug,
	ops::{Add, Sub},
};

/// Coordinate types usable inside [`Extents`].
///
/// `CLOSED_END` distinguishes the closed floating interval from the
/// half-open integer one; everything else follows from it.
pub trait ExtentUnit:
	Copy + PartialOrd + PartialEq + Zero + Bounded + Add<Output = Self> + Sub<Output = Self> + Debug
{
	/// `true` when `end` is itself a valid coordinate (floating point).
	const CLOSED_END: bool;
}

impl ExtentUnit for u32 {
	const CLOSED_END: bool = false;
}
impl ExtentUnit for u64 {
	const CLOSED_END: bool = false;
}
impl ExtentUnit for i32 {
	const CLOSED_END: bool = false;
}
impl ExtentUnit for f64 {
	const CLOSED_END: bool = true;
}

/// An axis-aligned rectangle with always-valid semantics.
///
/// Row/col accessors treat `y` as rows and `x` as columns; the nsew
/// accessors treat `end_y` as north and `begin_x` as west.
#[derive(Clone, Copy, PartialEq)]
pub struct Extents<T> {
	begin_x: T,
	end_x: T,
	begin_y: T,
	end_y: T,
}

impl<T: ExtentUnit> Default for Extents<T> {
	fn default() -> Self {
		Self {
			begin_x: T::zero(),
			end_x: T::zero(),
			begin_y: T::zero(),
			end_y: T::zero(),
		}
	}
}

impl<T: ExtentUnit> Debug for Extents<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"Extents(x: {:?}..{:?}, y: {:?}..{:?})",
			self.begin_x, self.end_x, self.begin_y, self.end_y
		)
	}
}

impl<T: ExtentUnit> Extents<T> {
	/// The empty extents.
	#[must_use]
	pub fn new_empty() -> Self {
		Self::default()
	}

	/// Build from x then y ranges. Collapses to empty if either range is inverted.
	#[must_use]
	pub fn from_xy(begin_x: T, end_x: T, begin_y: T, end_y: T) -> Self {
		if end_x < begin_x || end_y < begin_y {
			Self::default()
		} else {
			Self {
				begin_x,
				end_x,
				begin_y,
				end_y,
			}
		}
	}

	/// Build from row then column ranges.
	#[must_use]
	pub fn from_row_col(begin_row: T, end_row: T, begin_col: T, end_col: T) -> Self {
		Self::from_xy(begin_col, end_col, begin_row, end_row)
	}

	/// Build from north/south/east/west bounds.
	#[must_use]
	pub fn from_nsew(north: T, south: T, east: T, west: T) -> Self {
		Self::from_xy(west, east, south, north)
	}

	/// Build from an origin and a size.
	#[must_use]
	pub fn from_origin_size(x: T, y: T, width: T, height: T) -> Self {
		Self::from_xy(x, x + width, y, y + height)
	}

	pub fn begin_x(&self) -> T {
		self.begin_x
	}
	pub fn end_x(&self) -> T {
		self.end_x
	}
	pub fn begin_y(&self) -> T {
		self.begin_y
	}
	pub fn end_y(&self) -> T {
		self.end_y
	}

	pub fn north(&self) -> T {
		self.end_y
	}
	pub fn south(&self) -> T {
		self.begin_y
	}
	pub fn east(&self) -> T {
		self.end_x
	}
	pub fn west(&self) -> T {
		self.begin_x
	}

	pub fn begin_row(&self) -> T {
		self.begin_y
	}
	pub fn end_row(&self) -> T {
		self.end_y
	}
	pub fn begin_col(&self) -> T {
		self.begin_x
	}
	pub fn end_col(&self) -> T {
		self.end_x
	}

	pub fn width(&self) -> T {
		self.end_x - self.begin_x
	}
	pub fn height(&self) -> T {
		self.end_y - self.begin_y
	}
	pub fn num_rows(&self) -> T {
		self.height()
	}
	pub fn num_cols(&self) -> T {
		self.width()
	}

	/// Zero width or zero height.
	pub fn degenerate(&self) -> bool {
		self.width() == T::zero() || self.height() == T::zero()
	}

	/// Emptiness per the coordinate family: degenerate for integers, all
	/// four coordinates zero for floats.
	pub fn empty(&self) -> bool {
		if T::CLOSED_END {
			self.begin_x == T::zero() && self.end_x == T::zero() && self.begin_y == T::zero() && self.end_y == T::zero()
		} else {
			self.degenerate()
		}
	}

	pub fn contains_row(&self, row: T) -> bool {
		row >= self.begin_row() && if T::CLOSED_END { row <= self.end_row() } else { row < self.end_row() }
	}

	pub fn contains_col(&self, col: T) -> bool {
		col >= self.begin_col() && if T::CLOSED_END { col <= self.end_col() } else { col < self.end_col() }
	}

	pub fn contains_row_col(&self, row: T, col: T) -> bool {
		self.contains_row(row) && self.contains_col(col)
	}

	pub fn contains_xy(&self, x: T, y: T) -> bool {
		self.contains_row_col(y, x)
	}

	/// Whether `other` lies entirely inside this extents.
	pub fn contains(&self, other: &Self) -> bool {
		self.begin_x <= other.begin_x
			&& self.end_x >= other.end_x
			&& self.begin_y <= other.begin_y
			&& self.end_y >= other.end_y
	}

	/// Whether the interiors overlap: strict for integers, non-strict for floats.
	pub fn intersects(&self, other: &Self) -> bool {
		let min_end_x = if self.end_x < other.end_x { self.end_x } else { other.end_x };
		let max_begin_x = if self.begin_x > other.begin_x {
			self.begin_x
		} else {
			other.begin_x
		};
		let min_end_y = if self.end_y < other.end_y { self.end_y } else { other.end_y };
		let max_begin_y = if self.begin_y > other.begin_y {
			self.begin_y
		} else {
			other.begin_y
		};
		if T::CLOSED_END {
			min_end_x >= max_begin_x && min_end_y >= max_begin_y
		} else {
			min_end_x > max_begin_x && min_end_y > max_begin_y
		}
	}

	/// Union with `other`; growing an empty extents adopts `other`.
	pub fn grow(&mut self, other: &Self) {
		if other.empty() {
			return;
		}
		if self.empty() {
			*self = *other;
			return;
		}
		if other.begin_x < self.begin_x {
			self.begin_x = other.begin_x;
		}
		if other.begin_y < self.begin_y {
			self.begin_y = other.begin_y;
		}
		if other.end_x > self.end_x {
			self.end_x = other.end_x;
		}
		if other.end_y > self.end_y {
			self.end_y = other.end_y;
		}
	}

	/// Grow each side outward by `t`, saturating at the type limits.
	pub fn expand_by(&mut self, t: T) {
		self.begin_x = if self.begin_x >= T::min_value() + t {
			self.begin_x - t
		} else {
			T::min_value()
		};
		self.end_x = if self.end_x <= T::max_value() - t {
			self.end_x + t
		} else {
			T::max_value()
		};
		self.begin_y = if self.begin_y >= T::min_value() + t {
			self.begin_y - t
		} else {
			T::min_value()
		};
		self.end_y = if self.end_y <= T::max_value() - t {
			self.end_y + t
		} else {
			T::max_value()
		};
	}

	/// Shrink each side inward by `t`; collapses to empty if it inverts.
	pub fn narrow_by(&mut self, t: T) {
		self.begin_x = if self.begin_x <= T::max_value() - t {
			self.begin_x + t
		} else {
			T::max_value()
		};
		self.end_x = if self.end_x >= T::min_value() + t {
			self.end_x - t
		} else {
			T::min_value()
		};
		self.begin_y = if self.begin_y <= T::max_value() - t {
			self.begin_y + t
		} else {
			T::max_value()
		};
		self.end_y = if self.end_y >= T::min_value() + t {
			self.end_y - t
		} else {
			T::min_value()
		};
		if self.end_x < self.begin_x || self.end_y < self.begin_y {
			*self = Self::default();
		}
	}

	/// Translate so that `origin` becomes the new zero.
	pub fn make_relative_to(&mut self, origin_x: T, origin_y: T) {
		if !self.empty() {
			self.begin_x = self.begin_x - origin_x;
			self.end_x = self.end_x - origin_x;
			self.begin_y = self.begin_y - origin_y;
			self.end_y = self.end_y - origin_y;
		}
	}

	/// The overlapping rectangle of `a` and `b`, empty if they don't meet.
	#[must_use]
	pub fn intersection(a: &Self, b: &Self) -> Self {
		let begin_x = if a.begin_x > b.begin_x { a.begin_x } else { b.begin_x };
		let end_x = if a.end_x < b.end_x { a.end_x } else { b.end_x };
		let begin_y = if a.begin_y > b.begin_y { a.begin_y } else { b.begin_y };
		let end_y = if a.end_y < b.end_y { a.end_y } else { b.end_y };
		Self::from_xy(begin_x, end_x, begin_y, end_y)
	}

	/// Subtract `b` from `a`, pushing up to four remainders (left, right,
	/// top, bottom). Returns whether `b` intersected `a` at all.
	pub fn subtract(a: &Self, b: &Self, remainders: &mut Vec<Self>) -> bool {
		let inter = Self::intersection(a, b);
		if inter.empty() {
			return false;
		}
		let left = Self::from_xy(a.begin_x, inter.begin_x, a.begin_y, a.end_y);
		if !left.degenerate() {
			remainders.push(left);
		}
		let right = Self::from_xy(inter.end_x, a.end_x, a.begin_y, a.end_y);
		if !right.degenerate() {
			remainders.push(right);
		}
		let top = Self::from_xy(inter.begin_x, inter.end_x, inter.end_y, a.end_y);
		if !top.degenerate() {
			remainders.push(top);
		}
		let bottom = Self::from_xy(inter.begin_x, inter.end_x, a.begin_y, inter.begin_y);
		if !bottom.degenerate() {
			remainders.push(bottom);
		}
		true
	}
}

impl<T: ExtentUnit + PrimInt> Extents<T> {
	/// Whether the boxes intersect or are immediately adjacent.
	///
	/// Integer coordinates only. Floating callers must pick a tolerance and
	/// use [`Extents::<f64>::connects_with_tolerance`].
	pub fn connects(&self, other: &Self) -> bool {
		self.end_x.min(other.end_x) >= self.begin_x.max(other.begin_x)
			&& self.end_y.min(other.end_y) >= self.begin_y.max(other.begin_y)
	}

	/// Snap `begin` down and `end` up to multiples of `t`.
	///
	/// Preserves the all-zero empty extents.
	pub fn align_by(&mut self, t: T) {
		self.begin_x = self.begin_x - self.begin_x % t;
		self.end_x = self.end_x + t - T::one();
		self.end_x = self.end_x - self.end_x % t;

		self.begin_y = self.begin_y - self.begin_y % t;
		self.end_y = self.end_y + t - T::one();
		self.end_y = self.end_y - self.end_y % t;
	}
}

impl Extents<f64> {
	/// Adjacency test with an explicit tolerance, the floating counterpart
	/// of [`Extents::connects`].
	pub fn connects_with_tolerance(&self, other: &Self, tolerance: f64) -> bool {
		self.end_x.min(other.end_x) + tolerance >= self.begin_x.max(other.begin_x)
			&& self.end_y.min(other.end_y) + tolerance >= self.begin_y.max(other.begin_y)
	}
}

impl Extents<u32> {
	/// Whether this extents is fully consumed by the union of `others`.
	///
	/// Each element of `others` supplies the other inset's tile extents at
	/// this level together with its degree extents; an inset identical in
	/// both is a cover by definition (two assets with the same bounds), and
	/// the remaining ones are removed by repeated subtraction.
	pub fn covered_by<'a, I>(&self, others: I, degree_extents: &Extents<f64>) -> bool
	where
		I: IntoIterator<Item = (&'a Extents<u32>, &'a Extents<f64>)>,
	{
		let mut targets: VecDeque<Extents<u32>> = VecDeque::new();
		targets.push_back(*self);

		for (other, other_degrees) in others {
			if targets.is_empty() {
				break;
			}
			if self == other && degree_extents == other_degrees {
				return true;
			}
			if other.empty() {
				continue;
			}

			let mut remainders = Vec::new();
			for _ in 0..targets.len() {
				let target = targets.pop_front().unwrap();
				remainders.clear();
				if Extents::subtract(&target, other, &mut remainders) {
					targets.extend(remainders.drain(..));
				} else {
					// no intersection, keep the whole target
					targets.push_back(target);
				}
			}
		}
		targets.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	fn ex(bx: u32, ex_: u32, by: u32, ey: u32) -> Extents<u32> {
		Extents::from_xy(bx, ex_, by, ey)
	}

	#[test]
	fn invalid_constructor_collapses_to_empty() {
		assert!(ex(5, 3, 0, 4).empty());
		assert!(ex(0, 4, 5, 3).empty());
		assert!(!ex(0, 4, 0, 4).empty());
	}

	#[test]
	fn float_emptiness_is_all_zero() {
		let zero = Extents::<f64>::new_empty();
		assert!(zero.empty());
		// a degenerate but non-zero float box is not empty
		let line = Extents::<f64>::from_xy(0.5, 0.5, 0.1, 0.9);
		assert!(line.degenerate());
		assert!(!line.empty());
	}

	#[rstest]
	#[case(ex(0, 4, 0, 4), ex(2, 6, 2, 6), Some(ex(2, 4, 2, 4)))]
	#[case(ex(0, 4, 0, 4), ex(4, 8, 0, 4), None)] // adjacent, no overlap
	#[case(ex(0, 4, 0, 4), ex(6, 8, 0, 4), None)] // fully apart
	#[case(ex(1, 9, 1, 9), ex(3, 5, 3, 5), Some(ex(3, 5, 3, 5)))] // contained
	fn intersection_cases(#[case] a: Extents<u32>, #[case] b: Extents<u32>, #[case] expected: Option<Extents<u32>>) {
		let i = Extents::intersection(&a, &b);
		assert_eq!(i.empty(), Extents::intersection(&b, &a).empty());
		match expected {
			Some(expected) => {
				assert_eq!(i, expected);
				assert_eq!(Extents::intersection(&b, &a), expected);
				assert!(a.contains(&i));
				assert!(b.contains(&i));
			}
			None => assert!(i.empty()),
		}
	}

	#[test]
	fn grow_identity_with_empty() {
		let a = ex(2, 5, 3, 7);
		let mut b = a;
		b.grow(&Extents::new_empty());
		assert_eq!(b, a);

		let mut c = Extents::<u32>::new_empty();
		c.grow(&a);
		assert_eq!(c, a);
	}

	#[test]
	fn grow_takes_union() {
		let mut a = ex(2, 5, 3, 7);
		a.grow(&ex(0, 3, 5, 9));
		assert_eq!(a, ex(0, 5, 3, 9));
	}

	fn area(e: &Extents<u32>) -> u64 {
		u64::from(e.width()) * u64::from(e.height())
	}

	#[rstest]
	#[case(ex(0, 8, 0, 8), ex(2, 5, 3, 6))] // interior hole
	#[case(ex(0, 8, 0, 8), ex(0, 4, 0, 4))] // corner
	#[case(ex(0, 8, 0, 8), ex(6, 12, 2, 4))] // partial overlap
	#[case(ex(0, 8, 0, 8), ex(0, 8, 2, 4))] // full-width band
	fn subtract_tiles_exactly(#[case] a: Extents<u32>, #[case] b: Extents<u32>) {
		let mut remainders = Vec::new();
		assert!(Extents::subtract(&a, &b, &mut remainders));
		let inter = Extents::intersection(&a, &b);

		// pieces plus the intersection cover a's area with no overlap
		let total: u64 = remainders.iter().map(area).sum::<u64>() + area(&inter);
		assert_eq!(total, area(&a));
		for (i, r) in remainders.iter().enumerate() {
			assert!(a.contains(r));
			assert!(!r.intersects(&inter));
			for other in &remainders[i + 1..] {
				assert!(!r.intersects(other));
			}
		}
	}

	#[test]
	fn subtract_reports_miss() {
		let mut remainders = Vec::new();
		assert!(!Extents::subtract(&ex(0, 4, 0, 4), &ex(6, 8, 6, 8), &mut remainders));
		assert!(remainders.is_empty());
	}

	#[test]
	fn expand_then_narrow_round_trips() {
		let a = ex(10, 20, 30, 40);
		let mut b = a;
		b.expand_by(3);
		assert_eq!(b, ex(7, 23, 27, 43));
		b.narrow_by(3);
		assert_eq!(b, a);
	}

	#[test]
	fn expand_saturates_at_limits() {
		let mut a = ex(1, 20, 2, 40);
		a.expand_by(5);
		assert_eq!(a.begin_x(), 0);
		assert_eq!(a.begin_y(), 0);

		let mut b = Extents::<u32>::from_xy(0, u32::MAX - 1, 0, 10);
		b.expand_by(5);
		assert_eq!(b.end_x(), u32::MAX);
	}

	#[test]
	fn narrow_collapses_on_inversion() {
		let mut a = ex(4, 6, 4, 6);
		a.narrow_by(2);
		assert!(a.empty());
	}

	#[rstest]
	#[case(4)]
	#[case(8)]
	fn align_by_snaps_to_multiples(#[case] t: u32) {
		let mut a = ex(5, 13, 9, 17);
		a.align_by(t);
		assert_eq!(a.begin_x() % t, 0);
		assert_eq!(a.end_x() % t, 0);
		assert_eq!(a.begin_y() % t, 0);
		assert_eq!(a.end_y() % t, 0);
		assert!(a.contains(&ex(5, 13, 9, 17)));
	}

	#[test]
	fn align_by_preserves_empty() {
		let mut a = Extents::<u32>::new_empty();
		a.align_by(8);
		assert!(a.empty());
	}

	#[test]
	fn contains_semantics_differ_by_family() {
		let i = ex(0, 4, 0, 4);
		assert!(i.contains_row_col(3, 3));
		assert!(!i.contains_row_col(4, 0)); // half-open

		let f = Extents::<f64>::from_xy(0.0, 4.0, 0.0, 4.0);
		assert!(f.contains_row_col(4.0, 0.0)); // closed
	}

	#[test]
	fn connects_includes_adjacency() {
		let a = ex(0, 4, 0, 4);
		assert!(a.connects(&ex(4, 8, 0, 4)));
		assert!(a.connects(&ex(2, 6, 2, 6)));
		assert!(!a.connects(&ex(5, 8, 0, 4)));

		let fa = Extents::<f64>::from_xy(0.0, 1.0, 0.0, 1.0);
		let fb = Extents::<f64>::from_xy(1.00001, 2.0, 0.0, 1.0);
		assert!(!fa.connects_with_tolerance(&fb, 1e-9));
		assert!(fa.connects_with_tolerance(&fb, 1e-4));
	}

	#[test]
	fn make_relative_translates() {
		let mut a = ex(10, 14, 20, 26);
		a.make_relative_to(10, 20);
		assert_eq!(a, ex(0, 4, 0, 6));
	}

	#[test]
	fn covered_by_four_quadrants() {
		let whole = ex(0, 8, 0, 8);
		let quadrants = [ex(0, 4, 0, 4), ex(4, 8, 0, 4), ex(0, 4, 4, 8), ex(4, 8, 4, 8)];
		let degrees: Vec<Extents<f64>> = (0..4)
			.map(|i| Extents::from_xy(f64::from(i), f64::from(i + 1), 0.0, 1.0))
			.collect();
		let own_degrees = Extents::from_xy(0.0, 4.0, 0.0, 1.0);

		assert!(whole.covered_by(quadrants.iter().zip(degrees.iter()), &own_degrees));
	}

	#[test]
	fn covered_by_reports_gaps() {
		let whole = ex(0, 8, 0, 8);
		let three = [ex(0, 4, 0, 4), ex(4, 8, 0, 4), ex(0, 4, 4, 8)];
		let degrees: Vec<Extents<f64>> = (0..3)
			.map(|i| Extents::from_xy(f64::from(i), f64::from(i + 1), 0.0, 1.0))
			.collect();
		let own_degrees = Extents::from_xy(0.0, 4.0, 0.0, 1.0);

		assert!(!whole.covered_by(three.iter().zip(degrees.iter()), &own_degrees));
	}

	#[test]
	fn covered_by_identical_inset_short_circuits() {
		let whole = ex(0, 8, 0, 8);
		let own_degrees = Extents::from_xy(0.0, 4.0, 0.0, 1.0);
		let same_degrees = own_degrees;
		let others = [whole];

		assert!(whole.covered_by(others.iter().zip(std::iter::once(&same_degrees)), &own_degrees));

		// same rows/cols but different degree extents: no short circuit,
		// but plain subtraction still consumes the target
		let different_degrees = Extents::from_xy(0.0, 5.0, 0.0, 1.0);
		assert!(whole.covered_by(others.iter().zip(std::iter::once(&different_degrees)), &own_degrees));
	}

	#[test]
	fn nsew_and_row_col_orders() {
		let a = Extents::<u32>::from_nsew(8, 2, 6, 1);
		assert_eq!(a.north(), 8);
		assert_eq!(a.south(), 2);
		assert_eq!(a.east(), 6);
		assert_eq!(a.west(), 1);

		let b = Extents::<u32>::from_row_col(2, 8, 1, 6);
		assert_eq!(a, b);
		assert_eq!(b.num_rows(), 6);
		assert_eq!(b.num_cols(), 5);
	}
}
