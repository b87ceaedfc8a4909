use std::ops::Range;

use crate::SourcePos;
use crate::SourceRange;
use crate::TransdocError;
use crate::TransdocResult;
use crate::lexer::memrstr;
use crate::lexer::memstr;

/// The tokens which open and close a rule call, `{{` and `}}` by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSyntax {
	open: String,
	close: String,
}

impl Default for MarkerSyntax {
	fn default() -> Self {
		Self {
			open: "{{".to_string(),
			close: "}}".to_string(),
		}
	}
}

impl MarkerSyntax {
	/// Create a marker syntax. Both markers must be non-empty and differ from
	/// each other.
	pub fn new(open: impl Into<String>, close: impl Into<String>) -> TransdocResult<Self> {
		let open = open.into();
		let close = close.into();

		if open.is_empty() || close.is_empty() {
			return Err(TransdocError::InvalidMarkers(
				"markers cannot be empty".to_string(),
			));
		}

		if open == close {
			return Err(TransdocError::InvalidMarkers(format!(
				"the opening and closing markers are both `{open}`"
			)));
		}

		Ok(Self { open, close })
	}

	pub fn open(&self) -> &str {
		&self.open
	}

	pub fn close(&self) -> &str {
		&self.close
	}
}

/// A rule call found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite<'a> {
	/// Where the whole marker, delimiters included, appears in the document.
	pub range: SourceRange,
	/// The marker content with the delimiters stripped.
	pub raw_text: &'a str,
	/// Byte span of the whole marker within the document.
	pub span: Range<usize>,
}

/// Find every rule call in `content`, left to right.
///
/// Matching is non-greedy: each opener is paired with the nearest closer
/// which leaves at least one character of content, so calls never nest and
/// an empty marker pair is not a call. Positions start at `origin`.
pub fn scan_calls<'a>(
	content: &'a str,
	syntax: &MarkerSyntax,
	origin: SourcePos,
) -> Vec<CallSite<'a>> {
	let bytes = content.as_bytes();
	let open = syntax.open.as_bytes();
	let close = syntax.close.as_bytes();
	let mut sites = Vec::new();
	let mut search_from = 0;
	let mut position = origin;

	while search_from < bytes.len() {
		let Some(open_offset) = memstr(&bytes[search_from..], open) else {
			break;
		};
		let abs_open = search_from + open_offset;
		let after_open = abs_open + open.len();

		let Some(first_char) = content[after_open..].chars().next() else {
			break;
		};
		let content_min = after_open + first_char.len_utf8();

		let Some(close_offset) = memstr(&bytes[content_min..], close) else {
			break;
		};
		let abs_close = content_min + close_offset;
		let abs_close_end = abs_close + close.len();

		position.advance_str(&content[search_from..abs_open]);
		let start = position;
		position.advance_str(&content[abs_open..abs_close_end]);

		sites.push(CallSite {
			range: SourceRange::new(start, position),
			raw_text: &content[after_open..abs_close],
			span: abs_open..abs_close_end,
		});

		search_from = abs_close_end;
	}

	sites
}

/// Find the first opener in `content` with no closer anywhere after it,
/// returning its byte offset.
pub fn find_unclosed_marker(content: &str, syntax: &MarkerSyntax) -> Option<usize> {
	let bytes = content.as_bytes();
	let open = syntax.open.as_bytes();

	// An opener is unclosed when the last closer starts before its content.
	let start = match memrstr(bytes, syntax.close.as_bytes()) {
		Some(last_close) => (last_close + 1).saturating_sub(open.len()),
		None => 0,
	};

	memstr(&bytes[start..], open).map(|offset| start + offset)
}

/// The range covered by the unclosed opener at `offset`.
pub fn unclosed_marker_range(
	content: &str,
	syntax: &MarkerSyntax,
	offset: usize,
	origin: SourcePos,
) -> SourceRange {
	SourceRange::spanning(origin.offset_by_str(&content[..offset]), &syntax.open)
}
