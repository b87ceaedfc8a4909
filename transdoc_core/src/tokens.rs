use std::fmt::Display;
use std::ops::Range;

use float_cmp::approx_eq;

/// Tokens of a call expression such as `rule("text", count=2)`.
#[derive(Debug, Clone)]
pub enum Token {
	/// `(`
	ParenOpen,
	/// `)`
	ParenClose,
	/// `,`
	Comma,
	/// `=`
	Equals,
	/// String content, e.g. `"my content"`. The delimiter is kept so the
	/// token can be displayed again.
	String(String, u8),
	/// An identifier, e.g. `file_contents`
	Ident(String),
	/// An integer number, e.g. `123`
	Int(i64),
	/// A floating point number, e.g. `123.456`
	Float(f64),
}

impl Eq for Token {}
impl PartialEq for Token {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Token::ParenOpen, Token::ParenOpen)
			| (Token::ParenClose, Token::ParenClose)
			| (Token::Comma, Token::Comma)
			| (Token::Equals, Token::Equals) => true,
			(Token::String(value, delimiter), Token::String(other_value, other_delimiter)) => {
				value == other_value && delimiter == other_delimiter
			}
			(Token::Ident(value), Token::Ident(other_value)) => value == other_value,
			(Token::Int(value), Token::Int(other_value)) => value == other_value,
			(Token::Float(value), Token::Float(other_value)) => {
				approx_eq!(f64, *value, *other_value, ulps = 2)
			}
			_ => false,
		}
	}
}

impl Token {
	/// A short description of the token kind, used in syntax error messages.
	pub fn describe(&self) -> &'static str {
		match self {
			Token::ParenOpen => "`(`",
			Token::ParenClose => "`)`",
			Token::Comma => "`,`",
			Token::Equals => "`=`",
			Token::String(..) => "string",
			Token::Ident(_) => "identifier",
			Token::Int(_) | Token::Float(_) => "number",
		}
	}
}

impl Display for Token {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Token::ParenOpen => write!(f, "("),
			Token::ParenClose => write!(f, ")"),
			Token::Comma => write!(f, ","),
			Token::Equals => write!(f, "="),
			Token::String(string, ch) => {
				let ch = *ch as char;
				write!(f, "{ch}{string}{ch}")
			}
			Token::Ident(ident) => write!(f, "{ident}"),
			Token::Int(number) => write!(f, "{number}"),
			Token::Float(number) => write!(f, "{number}"),
		}
	}
}

/// A token together with its byte span in the call text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpannedToken {
	pub token: Token,
	pub span: Range<usize>,
}

impl SpannedToken {
	pub fn new(token: Token, span: Range<usize>) -> Self {
		Self { token, span }
	}
}
