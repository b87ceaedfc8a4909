use std::fmt::Display;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::lexer::tokenize;
use crate::tokens::SpannedToken;
use crate::tokens::Token;

/// The three shapes a rule call can take inside its markers.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationShape {
	/// `{{name}}`: the rule is called with no arguments.
	Bare { name: String },
	/// `{{name[text]}}`: the rule is called with the verbatim text between
	/// the first `[` and the final `]`.
	Bracketed { name: String, content: String },
	/// `{{name(...)}}`: a call expression with literal or nested call
	/// arguments.
	Expression(CallExpression),
}

impl InvocationShape {
	/// The name of the rule being called.
	pub fn name(&self) -> &str {
		match self {
			Self::Bare { name } | Self::Bracketed { name, .. } => name,
			Self::Expression(call) => &call.name,
		}
	}
}

/// A parsed call expression, e.g. `link("docs", page=file_contents("path"))`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpression {
	pub name: String,
	pub positional: Vec<ArgumentValue>,
	/// Keyword arguments in the order they were written.
	pub keyword: Vec<(String, ArgumentValue)>,
}

impl CallExpression {
	/// Every rule name used in this expression, outermost first then nested
	/// calls from left to right.
	pub fn rule_names(&self) -> Vec<&str> {
		let mut names = vec![self.name.as_str()];

		for value in self.arguments() {
			if let ArgumentValue::Call(call) = value {
				names.extend(call.rule_names());
			}
		}

		names
	}

	/// Positional then keyword argument values, in source order.
	pub fn arguments(&self) -> impl Iterator<Item = &ArgumentValue> {
		self.positional
			.iter()
			.chain(self.keyword.iter().map(|(_, value)| value))
	}
}

/// A single argument inside a call expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentValue {
	Literal(Argument),
	/// A nested call whose string result becomes the argument.
	Call(CallExpression),
}

/// A literal argument value passed to a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Argument {
	/// A quoted string value, e.g. `"hello"` or `'world'`.
	String(String),
	/// A whole number, e.g. `42`. Kept exact rather than widened to a float.
	Integer(i64),
	/// A floating point number, e.g. `3.14` or `1e3`.
	Number(OrderedFloat),
	/// A boolean value: `true` or `false`.
	Boolean(bool),
}

impl Argument {
	pub fn type_name(&self) -> &'static str {
		match self {
			Self::String(_) => "string",
			Self::Integer(_) | Self::Number(_) => "number",
			Self::Boolean(_) => "boolean",
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::String(value) => Some(value),
			_ => None,
		}
	}
}

impl Display for Argument {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::String(value) => write!(f, "{value}"),
			Self::Integer(value) => write!(f, "{value}"),
			Self::Number(value) => write!(f, "{value}"),
			Self::Boolean(value) => write!(f, "{value}"),
		}
	}
}

/// A float wrapper that implements `Eq` via approximate comparison,
/// allowing `Argument` to derive `PartialEq` cleanly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderedFloat(pub f64);

impl PartialEq for OrderedFloat {
	fn eq(&self, other: &Self) -> bool {
		float_cmp::approx_eq!(f64, self.0, other.0)
	}
}

impl Display for OrderedFloat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// The text of a call marker could not be understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct InvalidCall {
	/// What went wrong inside a call expression, when known.
	pub detail: Option<String>,
}

impl InvalidCall {
	fn new(detail: impl Into<String>) -> Self {
		Self {
			detail: Some(detail.into()),
		}
	}
}

impl Display for InvalidCall {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "unable to evaluate rule due to invalid syntax")?;

		if let Some(detail) = &self.detail {
			write!(f, ": {detail}")?;
		}

		Ok(())
	}
}

/// Returns `true` for a letter or `_` followed by letters, digits or `_`.
pub fn is_identifier(text: &str) -> bool {
	let mut chars = text.chars();

	match chars.next() {
		Some(first) if first.is_alphabetic() || first == '_' => {}
		_ => return false,
	}

	chars.all(|ch| ch.is_alphanumeric() || ch == '_')
}

/// Classify the text found between a pair of call markers.
///
/// The first matching shape wins: a bare identifier, then a bracketed call,
/// then a call expression. Text matching none of them is invalid.
pub fn parse_invocation(raw: &str) -> Result<InvocationShape, InvalidCall> {
	if is_identifier(raw) {
		return Ok(InvocationShape::Bare {
			name: raw.to_string(),
		});
	}

	if let Some((name, rest)) = raw.split_once('[') {
		if is_identifier(name) {
			if let Some(content) = rest.strip_suffix(']') {
				return Ok(InvocationShape::Bracketed {
					name: name.to_string(),
					content: content.to_string(),
				});
			}
		}
	}

	if let Some((name, _)) = raw.split_once('(') {
		if is_identifier(name) && raw.ends_with(')') {
			return parse_call_expression(raw).map(InvocationShape::Expression);
		}
	}

	Err(InvalidCall { detail: None })
}

/// Parse a complete call expression. Every token must be consumed.
pub fn parse_call_expression(source: &str) -> Result<CallExpression, InvalidCall> {
	let tokens = tokenize(source).map_err(|error| InvalidCall::new(error.to_string()))?;
	let mut parser = CallParser {
		tokens: &tokens,
		cursor: 0,
	};
	let call = parser.parse_call()?;

	if let Some(extra) = parser.peek() {
		return Err(InvalidCall::new(format!(
			"unexpected {} after the end of the call",
			extra.describe()
		)));
	}

	Ok(call)
}

/// A recursive descent parser over the tokens of a call expression.
struct CallParser<'a> {
	tokens: &'a [SpannedToken],
	cursor: usize,
}

impl<'a> CallParser<'a> {
	fn peek(&self) -> Option<&'a Token> {
		self.peek_nth(0)
	}

	fn peek_nth(&self, n: usize) -> Option<&'a Token> {
		self.tokens.get(self.cursor + n).map(|spanned| &spanned.token)
	}

	fn next(&mut self) -> Option<&'a Token> {
		let token = self.tokens.get(self.cursor).map(|spanned| &spanned.token);

		if token.is_some() {
			self.cursor += 1;
		}

		token
	}

	/// Consume the next token if it equals `expected`.
	fn eat(&mut self, expected: &Token) -> bool {
		if self.peek() == Some(expected) {
			self.cursor += 1;
			return true;
		}

		false
	}

	fn expect(&mut self, expected: &Token) -> Result<(), InvalidCall> {
		match self.next() {
			Some(token) if token == expected => Ok(()),
			Some(token) => {
				Err(InvalidCall::new(format!(
					"expected {} but found {}",
					expected.describe(),
					token.describe()
				)))
			}
			None => {
				Err(InvalidCall::new(format!(
					"expected {} but the call ended",
					expected.describe()
				)))
			}
		}
	}

	fn expect_ident(&mut self) -> Result<String, InvalidCall> {
		match self.next() {
			Some(Token::Ident(name)) => Ok(name.clone()),
			Some(token) => {
				Err(InvalidCall::new(format!(
					"expected a rule name but found {}",
					token.describe()
				)))
			}
			None => Err(InvalidCall::new("expected a rule name but the call ended")),
		}
	}

	fn parse_call(&mut self) -> Result<CallExpression, InvalidCall> {
		let name = self.expect_ident()?;
		self.expect(&Token::ParenOpen)?;

		let mut positional = vec![];
		let mut keyword: Vec<(String, ArgumentValue)> = vec![];

		loop {
			// Handles both `name()` and a trailing comma.
			if self.eat(&Token::ParenClose) {
				break;
			}

			if let (Some(Token::Ident(key)), Some(Token::Equals)) = (self.peek(), self.peek_nth(1))
			{
				let key = key.clone();
				self.cursor += 2;

				if keyword.iter().any(|(existing, _)| *existing == key) {
					return Err(InvalidCall::new(format!(
						"keyword argument `{key}` repeated"
					)));
				}

				let value = self.parse_value()?;
				keyword.push((key, value));
			} else {
				if !keyword.is_empty() {
					return Err(InvalidCall::new(
						"positional argument follows keyword argument",
					));
				}

				positional.push(self.parse_value()?);
			}

			match self.next() {
				Some(Token::Comma) => {}
				Some(Token::ParenClose) => break,
				Some(token) => {
					return Err(InvalidCall::new(format!(
						"expected `,` or `)` but found {}",
						token.describe()
					)));
				}
				None => return Err(InvalidCall::new("expected `)` but the call ended")),
			}
		}

		Ok(CallExpression {
			name,
			positional,
			keyword,
		})
	}

	fn parse_value(&mut self) -> Result<ArgumentValue, InvalidCall> {
		let is_call = matches!(
			(self.peek(), self.peek_nth(1)),
			(Some(Token::Ident(_)), Some(Token::ParenOpen))
		);

		if is_call {
			return self.parse_call().map(ArgumentValue::Call);
		}

		let argument = match self.next() {
			Some(Token::String(value, _)) => Argument::String(value.clone()),
			Some(Token::Int(value)) => Argument::Integer(*value),
			Some(Token::Float(value)) => Argument::Number(OrderedFloat(*value)),
			Some(Token::Ident(value)) if value == "true" || value == "True" => {
				Argument::Boolean(true)
			}
			Some(Token::Ident(value)) if value == "false" || value == "False" => {
				Argument::Boolean(false)
			}
			Some(Token::Ident(value)) => {
				return Err(InvalidCall::new(format!(
					"unexpected identifier `{value}`; string arguments must be quoted"
				)));
			}
			Some(token) => {
				return Err(InvalidCall::new(format!(
					"expected an argument but found {}",
					token.describe()
				)));
			}
			None => return Err(InvalidCall::new("expected an argument but the call ended")),
		};

		Ok(ArgumentValue::Literal(argument))
	}
}
