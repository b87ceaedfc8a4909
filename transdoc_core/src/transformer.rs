use crate::MarkerSyntax;
use crate::Registry;
use crate::RuleSet;
use crate::SourcePos;
use crate::TransdocError;
use crate::TransdocResult;
use crate::TransformError;
use crate::find_unclosed_marker;
use crate::invoke_call;
use crate::scan_calls;
use crate::unclosed_marker_range;

/// Options for a single call to [`Transformer::transform_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOptions {
	/// Label used in error messages, usually the document's path.
	pub document_id: String,
	/// The position of the first character of the input within its document.
	/// Handlers which transform a fragment of a larger file set this so that
	/// errors point at the right place.
	pub position_offset: SourcePos,
	/// Prefixed to every line after the first of each rule result.
	pub indentation: String,
}

impl TransformOptions {
	pub fn new(document_id: impl Into<String>) -> Self {
		Self {
			document_id: document_id.into(),
			position_offset: SourcePos::origin(),
			indentation: String::new(),
		}
	}

	#[must_use]
	pub fn position_offset(mut self, position_offset: SourcePos) -> Self {
		self.position_offset = position_offset;
		self
	}

	#[must_use]
	pub fn indentation(mut self, indentation: impl Into<String>) -> Self {
		self.indentation = indentation.into();
		self
	}
}

/// The result of transforming a document: either all of the rewritten text
/// or every error found, never a mix.
#[derive(Debug)]
pub enum TransformOutcome {
	Text(String),
	Failed(Vec<TransformError>),
}

impl TransformOutcome {
	pub fn is_ok(&self) -> bool {
		matches!(self, Self::Text(_))
	}

	pub fn text(&self) -> Option<&str> {
		match self {
			Self::Text(text) => Some(text),
			Self::Failed(_) => None,
		}
	}

	pub fn errors(&self) -> &[TransformError] {
		match self {
			Self::Text(_) => &[],
			Self::Failed(errors) => errors,
		}
	}

	/// Convert into a result, wrapping errors as [`TransdocError::Transform`].
	pub fn into_result(self, document_id: impl Into<String>) -> TransdocResult<String> {
		match self {
			Self::Text(text) => Ok(text),
			Self::Failed(errors) => {
				Err(TransdocError::Transform {
					document_id: document_id.into(),
					errors,
				})
			}
		}
	}
}

/// Applies the rules of a registry to documents.
///
/// The transformer holds no mutable state and may be shared between threads
/// when its registry can be.
#[derive(Debug)]
pub struct Transformer<R = RuleSet> {
	registry: R,
	syntax: MarkerSyntax,
}

impl<R: Registry> Transformer<R> {
	pub fn new(registry: R) -> Self {
		Self {
			registry,
			syntax: MarkerSyntax::default(),
		}
	}

	#[must_use]
	pub fn with_syntax(mut self, syntax: MarkerSyntax) -> Self {
		self.syntax = syntax;
		self
	}

	pub fn registry(&self) -> &R {
		&self.registry
	}

	pub fn syntax(&self) -> &MarkerSyntax {
		&self.syntax
	}

	/// Transform `input` starting at row 1, column 1 with no indentation.
	pub fn transform(&self, input: &str, document_id: &str) -> TransformOutcome {
		self.transform_with(input, &TransformOptions::new(document_id))
	}

	/// Transform `input`, replacing each rule call with the result of its
	/// rule.
	///
	/// Every call is evaluated even after an error so that all problems in
	/// the document are reported together. Errors are ordered by position,
	/// followed by at most one unclosed marker error.
	pub fn transform_with(&self, input: &str, options: &TransformOptions) -> TransformOutcome {
		let document_id = options.document_id.as_str();
		let mut output = String::with_capacity(input.len());
		let mut errors = Vec::new();
		let mut input_pos = 0;

		for site in scan_calls(input, &self.syntax, options.position_offset) {
			tracing::debug!(
				document = document_id,
				position = %site.range.start,
				call = site.raw_text,
				"evaluating rule call"
			);

			output.push_str(&input[input_pos..site.span.start]);
			input_pos = site.span.end;

			match invoke_call(
				site.raw_text,
				&self.registry,
				document_id,
				site.range,
				&options.indentation,
			) {
				Ok(replacement) => output.push_str(&replacement),
				Err(error) => errors.push(error),
			}
		}

		output.push_str(&input[input_pos..]);

		if let Some(offset) = find_unclosed_marker(input, &self.syntax) {
			let range = unclosed_marker_range(input, &self.syntax, offset, options.position_offset);
			let message = format!(
				"Unclosed rule call. Did you forget a closing '{}'?",
				self.syntax.close()
			);
			errors.push(TransformError::syntax(document_id, range, message));
		}

		if errors.is_empty() {
			TransformOutcome::Text(output)
		} else {
			TransformOutcome::Failed(errors)
		}
	}
}
