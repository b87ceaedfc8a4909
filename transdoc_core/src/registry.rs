use std::collections::BTreeMap;
use std::fmt::Debug;

use thiserror::Error;

use crate::Argument;

/// The error type returned by rules. Any error can be boxed into it; it is
/// preserved as the cause of the resulting evaluation error.
pub type RuleError = Box<dyn std::error::Error + Send + Sync>;

/// The result of invoking a rule.
pub type RuleResult = Result<String, RuleError>;

/// A rule which can be called from a document.
///
/// Rules receive the literal arguments of the call and return the text to
/// splice into the document. A rule which panics is reported as a
/// [`RulePanicked`] evaluation error. Every call shape maps onto
/// [`RuleArguments`]:
///
/// - `{{name}}` passes no arguments.
/// - `{{name[text]}}` passes `text` as the only positional argument.
/// - `{{name("a", 1, flag=true)}}` passes positional and keyword arguments.
pub trait Rule: Send + Sync {
	fn invoke(&self, args: &RuleArguments) -> RuleResult;
}

impl<F> Rule for F
where
	F: Fn(&RuleArguments) -> RuleResult + Send + Sync,
{
	fn invoke(&self, args: &RuleArguments) -> RuleResult {
		self(args)
	}
}

/// A source of rules, looked up by name.
pub trait Registry {
	fn lookup(&self, name: &str) -> Option<&dyn Rule>;

	fn contains(&self, name: &str) -> bool {
		self.lookup(name).is_some()
	}
}

/// The arguments passed to a rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleArguments {
	/// Positional arguments in call order.
	pub positional: Vec<Argument>,
	/// Keyword arguments, sorted by name.
	pub keyword: BTreeMap<String, Argument>,
}

impl RuleArguments {
	pub fn new() -> Self {
		Self::default()
	}

	/// Arguments for the bracketed call shape: a single string.
	pub fn text(content: impl Into<String>) -> Self {
		Self {
			positional: vec![Argument::String(content.into())],
			keyword: BTreeMap::new(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.positional.is_empty() && self.keyword.is_empty()
	}

	pub fn len(&self) -> usize {
		self.positional.len() + self.keyword.len()
	}

	pub fn get(&self, index: usize) -> Option<&Argument> {
		self.positional.get(index)
	}

	pub fn get_keyword(&self, name: &str) -> Option<&Argument> {
		self.keyword.get(name)
	}

	/// Fail unless no arguments were given.
	pub fn expect_none(&self, rule: &str) -> Result<(), RuleError> {
		if self.is_empty() {
			return Ok(());
		}

		Err(ArgumentError::Unexpected {
			rule: rule.to_string(),
			expected: 0,
			got: self.len(),
		}
		.into())
	}

	/// Return the single string argument of a rule which accepts exactly one.
	pub fn expect_single_string(&self, rule: &str) -> Result<&str, RuleError> {
		if self.positional.len() != 1 || !self.keyword.is_empty() {
			return Err(ArgumentError::Unexpected {
				rule: rule.to_string(),
				expected: 1,
				got: self.len(),
			}
			.into());
		}

		string_argument(rule, 0, &self.positional[0])
	}

	/// Return the string positional argument at `index`, which must be given.
	pub fn expect_string(&self, rule: &str, index: usize) -> Result<&str, RuleError> {
		let Some(argument) = self.positional.get(index) else {
			return Err(ArgumentError::Unexpected {
				rule: rule.to_string(),
				expected: index + 1,
				got: self.len(),
			}
			.into());
		};

		string_argument(rule, index, argument)
	}

	/// Return the positional argument at `index` if it was given, failing
	/// when it is not a string.
	pub fn optional_string(&self, rule: &str, index: usize) -> Result<Option<&str>, RuleError> {
		self.positional
			.get(index)
			.map(|argument| string_argument(rule, index, argument))
			.transpose()
	}
}

fn string_argument<'a>(
	rule: &str,
	index: usize,
	argument: &'a Argument,
) -> Result<&'a str, RuleError> {
	match argument {
		Argument::String(value) => Ok(value),
		other => {
			Err(ArgumentError::WrongType {
				rule: rule.to_string(),
				index,
				expected: "string",
				got: other.type_name(),
			}
			.into())
		}
	}
}

/// Errors rules report when called with arguments they cannot accept.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ArgumentError {
	#[error("rule `{rule}` takes {expected} argument(s) but {got} were given")]
	Unexpected {
		rule: String,
		expected: usize,
		got: usize,
	},
	#[error("rule `{rule}` expected a {expected} for argument {index}, got a {got}")]
	WrongType {
		rule: String,
		index: usize,
		expected: &'static str,
		got: &'static str,
	},
	#[error("rule `{rule}` got an unexpected keyword argument `{name}`")]
	UnknownKeyword { rule: String, name: String },
}

/// The cause of an evaluation error raised by a rule which panicked.
#[derive(Debug, Error)]
#[error("rule `{rule}` panicked: {message}")]
pub struct RulePanicked {
	pub rule: String,
	pub message: String,
}

/// The default [`Registry`]: an ordered map of rule names to rules.
#[derive(Default)]
pub struct RuleSet {
	rules: BTreeMap<String, Box<dyn Rule>>,
}

impl RuleSet {
	pub fn new() -> Self {
		Self::default()
	}

	/// Add a rule, replacing any existing rule with the same name.
	pub fn insert(&mut self, name: impl Into<String>, rule: impl Rule + 'static) {
		self.rules.insert(name.into(), Box::new(rule));
	}

	/// Add a closure as a rule.
	pub fn insert_fn<F>(&mut self, name: impl Into<String>, rule: F)
	where
		F: Fn(&RuleArguments) -> RuleResult + Send + Sync + 'static,
	{
		self.insert(name, rule);
	}

	#[must_use]
	pub fn with(mut self, name: impl Into<String>, rule: impl Rule + 'static) -> Self {
		self.insert(name, rule);
		self
	}

	#[must_use]
	pub fn with_fn<F>(mut self, name: impl Into<String>, rule: F) -> Self
	where
		F: Fn(&RuleArguments) -> RuleResult + Send + Sync + 'static,
	{
		self.insert_fn(name, rule);
		self
	}

	/// Move every rule from `other` into this set. Rules in `other` win on
	/// name clashes.
	pub fn extend(&mut self, other: RuleSet) {
		self.rules.extend(other.rules);
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.rules.keys().map(String::as_str)
	}

	pub fn len(&self) -> usize {
		self.rules.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rules.is_empty()
	}
}

impl Registry for RuleSet {
	fn lookup(&self, name: &str) -> Option<&dyn Rule> {
		let rule = self.rules.get(name)?;
		Some(rule.as_ref())
	}
}

impl Debug for RuleSet {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_set().entries(self.rules.keys()).finish()
	}
}
