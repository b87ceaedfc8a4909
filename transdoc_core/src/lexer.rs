use logos::Logos;
use snailquote::unescape;
use thiserror::Error;

use crate::tokens::SpannedToken;
use crate::tokens::Token;

/// Raw tokens produced by logos for the text of a call expression.
#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum RawToken {
	#[token("(")]
	ParenOpen,
	#[token(")")]
	ParenClose,
	#[token(",")]
	Comma,
	#[token("=")]
	Equals,
	#[regex(r"[_\p{Alphabetic}][_\p{Alphabetic}\p{N}]*")]
	Ident,
	#[regex(r#""([^"\\]|\\.)*""#)]
	DoubleQuotedString,
	#[regex(r"'([^'\\]|\\.)*'")]
	SingleQuotedString,
	#[regex(r"[+-]?[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?")]
	Number,
}

/// A failure to split call text into tokens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
	#[error("unexpected character `{found}` at offset {offset}")]
	UnexpectedCharacter { found: char, offset: usize },
	#[error("invalid escape sequence in string at offset {offset}")]
	InvalidEscape { offset: usize },
	#[error("invalid number `{text}` at offset {offset}")]
	InvalidNumber { text: String, offset: usize },
}

/// Split the text of a call expression into tokens.
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, LexError> {
	let mut tokens = Vec::new();

	for (result, span) in RawToken::lexer(source).spanned() {
		let slice = &source[span.clone()];

		let Ok(raw) = result else {
			let found = slice.chars().next().unwrap_or_default();
			return Err(LexError::UnexpectedCharacter {
				found,
				offset: span.start,
			});
		};

		let token = match raw {
			RawToken::ParenOpen => Token::ParenOpen,
			RawToken::ParenClose => Token::ParenClose,
			RawToken::Comma => Token::Comma,
			RawToken::Equals => Token::Equals,
			RawToken::Ident => Token::Ident(slice.to_string()),
			RawToken::DoubleQuotedString => process_string(slice, b'"', span.start)?,
			RawToken::SingleQuotedString => process_string(slice, b'\'', span.start)?,
			RawToken::Number => process_number(slice, span.start)?,
		};

		tokens.push(SpannedToken::new(token, span));
	}

	Ok(tokens)
}

/// Strip the quotes from a string token and unescape it if needed.
///
/// Both quote styles accept the escapes `\\`, `\n`, `\t`, `\r`, `\0`, `\"`
/// and `\'`. The content is re-quoted as a double-quoted shell word so that
/// `unescape` decodes it the same way whichever quote was used.
fn process_string(slice: &str, delimiter: u8, offset: usize) -> Result<Token, LexError> {
	let inner = &slice[1..slice.len() - 1];

	if !inner.contains('\\') {
		return Ok(Token::String(inner.to_string(), delimiter));
	}

	let mut quoted = String::with_capacity(inner.len() + 2);
	quoted.push('"');
	let mut chars = inner.chars();

	while let Some(ch) = chars.next() {
		match ch {
			'\\' => {
				match chars.next() {
					Some('0') => quoted.push_str("\\u{0}"),
					Some(escaped @ ('\\' | 'n' | 't' | 'r' | '"' | '\'')) => {
						quoted.push('\\');
						quoted.push(escaped);
					}
					_ => return Err(LexError::InvalidEscape { offset }),
				}
			}
			'"' => quoted.push_str("\\\""),
			other => quoted.push(other),
		}
	}

	quoted.push('"');
	let value = unescape(&quoted).map_err(|_| LexError::InvalidEscape { offset })?;

	Ok(Token::String(value, delimiter))
}

/// Determine whether a number token is a float or an int.
fn process_number(slice: &str, offset: usize) -> Result<Token, LexError> {
	let is_float = slice.contains('.') || slice.contains('e') || slice.contains('E');
	let invalid = || {
		LexError::InvalidNumber {
			text: slice.to_string(),
			offset,
		}
	};

	if is_float {
		slice.parse::<f64>().map(Token::Float).map_err(|_| invalid())
	} else {
		slice.parse::<i64>().map(Token::Int).map_err(|_| invalid())
	}
}

/// Find the first occurrence of `needle` in `haystack`.
pub fn memstr(haystack: &[u8], needle: &[u8]) -> Option<usize> {
	if needle.is_empty() {
		return None;
	}

	haystack
		.windows(needle.len())
		.position(|window| window == needle)
}

/// Find the last occurrence of `needle` in `haystack`.
pub fn memrstr(haystack: &[u8], needle: &[u8]) -> Option<usize> {
	if needle.is_empty() {
		return None;
	}

	haystack
		.windows(needle.len())
		.rposition(|window| window == needle)
}
