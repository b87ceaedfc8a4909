use std::fmt::Display;

use miette::Diagnostic;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::RuleError;
use crate::SourceRange;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum TransdocError {
	#[error(transparent)]
	#[diagnostic(code(transdoc::io_error))]
	Io(#[from] std::io::Error),

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(transdoc::config_parse),
		help("check that transdoc.toml is valid TOML with [rules], [markers] and/or [handlers] sections")
	)]
	ConfigParse(String),

	#[error("invalid call markers: {0}")]
	#[diagnostic(
		code(transdoc::invalid_markers),
		help("the opening and closing markers must be non-empty and different from each other")
	)]
	InvalidMarkers(String),

	#[error("invalid rule `{name}`: {reason}")]
	#[diagnostic(code(transdoc::invalid_rule))]
	InvalidRule { name: String, reason: String },

	#[error("invalid handler pattern `{pattern}`: {reason}")]
	#[diagnostic(code(transdoc::invalid_pattern))]
	InvalidPattern { pattern: String, reason: String },

	#[error("no handlers found that match file `{path}`")]
	#[diagnostic(
		code(transdoc::no_handler),
		help("add a matching pattern under [handlers.plaintext] in transdoc.toml")
	)]
	NoHandler { path: String },

	#[error("output location `{path}` already exists")]
	#[diagnostic(
		code(transdoc::output_exists),
		help("pass `--force` to overwrite the existing output")
	)]
	OutputExists { path: String },

	#[error("output `{output}` would replace the input `{input}`")]
	#[diagnostic(
		code(transdoc::output_overlaps_input),
		help("choose an output location which is neither the input nor one of its parents")
	)]
	OutputOverlapsInput { input: String, output: String },

	#[error("symlink cycle detected at: `{path}`")]
	#[diagnostic(
		code(transdoc::symlink_cycle),
		help("remove the circular symlink or exclude this path")
	)]
	SymlinkCycle { path: String },

	#[error("{} error(s) occurred while transforming `{document_id}`", .errors.len())]
	#[diagnostic(code(transdoc::transform_failed))]
	Transform {
		document_id: String,
		#[related]
		errors: Vec<TransformError>,
	},

	#[error("{} file(s) failed to transform", .errors.len())]
	#[diagnostic(code(transdoc::tree_failed))]
	Tree {
		#[related]
		errors: Vec<TransdocError>,
	},
}

impl TransdocError {
	/// Every located transformation error carried by this error, flattening
	/// nested tree failures.
	pub fn transform_errors(&self) -> Vec<&TransformError> {
		match self {
			Self::Transform { errors, .. } => errors.iter().collect(),
			Self::Tree { errors } => errors.iter().flat_map(Self::transform_errors).collect(),
			_ => Vec::new(),
		}
	}
}

/// The kind of a [`TransformError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransformErrorKind {
	/// A call marker is malformed or was never closed.
	Syntax,
	/// A call marker names a rule which is not in the registry.
	Name,
	/// The rule was found but failed while running.
	Evaluation,
}

impl TransformErrorKind {
	pub const fn code(self) -> &'static str {
		match self {
			Self::Syntax => "transdoc::syntax_error",
			Self::Name => "transdoc::name_error",
			Self::Evaluation => "transdoc::evaluation_error",
		}
	}

	const fn help(self) -> &'static str {
		match self {
			Self::Syntax => {
				"rule calls look like `{{name}}`, `{{name[text]}}` or `{{name(\"arg\", key=1)}}`"
			}
			Self::Name => "check the rule name, or declare the rule under [rules] in transdoc.toml",
			Self::Evaluation => "the rule itself reported this error; see the cause below",
		}
	}
}

impl Display for TransformErrorKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Syntax => write!(f, "SyntaxError"),
			Self::Name => write!(f, "NameError"),
			Self::Evaluation => write!(f, "EvaluationError"),
		}
	}
}

/// A located error produced while transforming a single document.
///
/// Transformation never stops at the first error. Every independent problem
/// in a document is reported as one of these, in the order it was found.
#[derive(Debug, Error)]
#[error("{document_id}:{} {kind}: {message}", .range.start)]
pub struct TransformError {
	/// Whether this is a syntax, name or evaluation error.
	pub kind: TransformErrorKind,
	/// Label of the document being transformed (usually a path).
	pub document_id: String,
	/// Where the offending call marker appears in the document.
	pub range: SourceRange,
	/// Human readable description.
	pub message: String,
	/// The error returned by the rule, for evaluation errors.
	#[source]
	pub cause: Option<RuleError>,
}

impl TransformError {
	pub fn syntax(
		document_id: impl Into<String>,
		range: SourceRange,
		message: impl Into<String>,
	) -> Self {
		Self {
			kind: TransformErrorKind::Syntax,
			document_id: document_id.into(),
			range,
			message: message.into(),
			cause: None,
		}
	}

	pub fn name(
		document_id: impl Into<String>,
		range: SourceRange,
		message: impl Into<String>,
	) -> Self {
		Self {
			kind: TransformErrorKind::Name,
			document_id: document_id.into(),
			range,
			message: message.into(),
			cause: None,
		}
	}

	pub fn evaluation(
		document_id: impl Into<String>,
		range: SourceRange,
		message: impl Into<String>,
		cause: RuleError,
	) -> Self {
		Self {
			kind: TransformErrorKind::Evaluation,
			document_id: document_id.into(),
			range,
			message: message.into(),
			cause: Some(cause),
		}
	}

	pub fn is_syntax(&self) -> bool {
		self.kind == TransformErrorKind::Syntax
	}

	pub fn is_name(&self) -> bool {
		self.kind == TransformErrorKind::Name
	}

	pub fn is_evaluation(&self) -> bool {
		self.kind == TransformErrorKind::Evaluation
	}

	/// Try to view the rule's underlying error as a concrete type.
	pub fn cause_as<E: std::error::Error + 'static>(&self) -> Option<&E> {
		self.cause.as_ref().and_then(|cause| cause.downcast_ref::<E>())
	}
}

impl Diagnostic for TransformError {
	fn code<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
		Some(Box::new(self.kind.code()))
	}

	fn help<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
		Some(Box::new(self.kind.help()))
	}
}

pub type TransdocResult<T> = Result<T, TransdocError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
