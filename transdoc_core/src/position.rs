use std::fmt::Display;
use std::ops::Add;

use serde::Deserialize;
use serde::Serialize;

/// A position within a document.
///
/// Rows and columns are 1-indexed. The zero position `(0, 0)` is reserved as
/// a sentinel for errors which apply to the whole document rather than a
/// specific location.
#[derive(
	Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SourcePos {
	/// File row (1-indexed).
	pub row: usize,
	/// File column (1-indexed), counted in characters.
	pub col: usize,
}

impl SourcePos {
	pub const fn new(row: usize, col: usize) -> Self {
		Self { row, col }
	}

	/// The sentinel position, meaning "no specific position".
	pub const fn zero() -> Self {
		Self { row: 0, col: 0 }
	}

	/// The first character of a document.
	pub const fn origin() -> Self {
		Self { row: 1, col: 1 }
	}

	pub const fn is_zero(&self) -> bool {
		self.row == 0 && self.col == 0
	}

	/// Return the position reached after reading `text` starting from this
	/// position.
	///
	/// Without a newline in `text` only the column moves. Otherwise the row
	/// advances by the number of newlines and the column restarts after the
	/// last line segment.
	#[must_use]
	pub fn offset_by_str(self, text: &str) -> Self {
		let row_offset = text.bytes().filter(|byte| *byte == b'\n').count();

		if row_offset == 0 {
			return Self::new(self.row, self.col + text.chars().count());
		}

		let last_row = text.rsplit('\n').next().unwrap_or_default();
		Self::new(self.row + row_offset, last_row.chars().count() + 1)
	}

	/// Advance this position in place through the given text.
	pub fn advance_str(&mut self, text: &str) {
		*self = self.offset_by_str(text);
	}
}

/// Advance a position by a relative offset.
///
/// When the offset stays on its first row only the column moves, otherwise
/// the rows are combined and the column is taken from the offset. This is
/// not commutative.
impl Add for SourcePos {
	type Output = Self;

	fn add(self, other: Self) -> Self::Output {
		if other.row == 1 {
			Self::new(self.row, (self.col + other.col).saturating_sub(1))
		} else {
			Self::new((self.row + other.row).saturating_sub(1), other.col)
		}
	}
}

impl Display for SourcePos {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}:{}", self.row, self.col)
	}
}

/// A half-open range of positions within a document (`start <= p < end`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRange {
	pub start: SourcePos,
	pub end: SourcePos,
}

impl SourceRange {
	pub const fn new(start: SourcePos, end: SourcePos) -> Self {
		Self { start, end }
	}

	/// The range used for errors which apply to a whole document.
	pub const fn zero() -> Self {
		Self {
			start: SourcePos::zero(),
			end: SourcePos::zero(),
		}
	}

	pub const fn is_zero(&self) -> bool {
		self.start.is_zero() && self.end.is_zero()
	}

	/// The range covering `text` when it starts at `start`.
	pub fn spanning(start: SourcePos, text: &str) -> Self {
		Self::new(start, start.offset_by_str(text))
	}

	pub fn contains(&self, pos: SourcePos) -> bool {
		self.start <= pos && pos < self.end
	}
}

impl Display for SourceRange {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}-{}", self.start, self.end)
	}
}
