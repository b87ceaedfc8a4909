//! Document handlers decide which files can be transformed and how their
//! text is fed through a [`Transformer`].

use std::fmt::Debug;
use std::io::Read;
use std::io::Write;
use std::path::Path;

use globset::Glob;
use globset::GlobSet;
use globset::GlobSetBuilder;

use crate::TransdocError;
use crate::TransdocResult;
use crate::TransformOptions;
use crate::Transformer;
use crate::config::TransdocConfig;

/// A handler for one kind of document.
pub trait DocumentHandler: Debug + Send + Sync {
	/// A short name used in logs.
	fn name(&self) -> &str;

	/// Whether this handler can transform the file at `path`.
	fn matches(&self, path: &Path) -> bool;

	/// Transform the document read from `input`, writing the result to
	/// `output` when one is given.
	///
	/// On failure every error in the document is returned and nothing is
	/// written.
	fn process(
		&self,
		transformer: &Transformer,
		document_id: &str,
		input: &mut dyn Read,
		output: Option<&mut dyn Write>,
	) -> TransdocResult<()>;
}

/// Handler for plain text files. The whole file is transformed.
#[derive(Debug, Clone)]
pub struct PlaintextHandler {
	patterns: Vec<String>,
	glob_set: GlobSet,
	indentation: String,
}

impl PlaintextHandler {
	/// Create a handler matching file names against glob `patterns`.
	pub fn new(patterns: &[String], indentation: impl Into<String>) -> TransdocResult<Self> {
		Ok(Self {
			patterns: patterns.to_vec(),
			glob_set: build_glob_set(patterns)?,
			indentation: indentation.into(),
		})
	}

	pub fn patterns(&self) -> &[String] {
		&self.patterns
	}

	pub fn indentation(&self) -> &str {
		&self.indentation
	}
}

impl DocumentHandler for PlaintextHandler {
	fn name(&self) -> &str {
		"plaintext"
	}

	fn matches(&self, path: &Path) -> bool {
		path.file_name()
			.is_some_and(|file_name| self.glob_set.is_match(file_name))
	}

	fn process(
		&self,
		transformer: &Transformer,
		document_id: &str,
		input: &mut dyn Read,
		output: Option<&mut dyn Write>,
	) -> TransdocResult<()> {
		let mut content = String::new();
		input.read_to_string(&mut content)?;

		let options = TransformOptions::new(document_id).indentation(self.indentation.as_str());
		let transformed = transformer
			.transform_with(&content, &options)
			.into_result(document_id)?;

		if let Some(output) = output {
			output.write_all(transformed.as_bytes())?;
			output.flush()?;
		}

		Ok(())
	}
}

/// Build a `GlobSet` from a list of glob pattern strings.
fn build_glob_set(patterns: &[String]) -> TransdocResult<GlobSet> {
	let mut builder = GlobSetBuilder::new();

	for pattern in patterns {
		let glob = Glob::new(pattern).map_err(|e| {
			TransdocError::InvalidPattern {
				pattern: pattern.clone(),
				reason: e.to_string(),
			}
		})?;
		builder.add(glob);
	}

	builder.build().map_err(|e| {
		TransdocError::InvalidPattern {
			pattern: patterns.join(", "),
			reason: e.to_string(),
		}
	})
}

/// The built-in handlers, configured from `config`.
pub fn default_handlers(config: &TransdocConfig) -> TransdocResult<Vec<Box<dyn DocumentHandler>>> {
	let plaintext = PlaintextHandler::new(
		&config.handlers.plaintext.patterns,
		config.indentation.as_str(),
	)?;

	let plaintext: Box<dyn DocumentHandler> = Box::new(plaintext);

	Ok(vec![plaintext])
}

/// The first handler which can transform the file at `path`.
pub fn find_matching_handler<'a>(
	handlers: &'a [Box<dyn DocumentHandler>],
	path: &Path,
) -> Option<&'a dyn DocumentHandler> {
	let handler = handlers.iter().find(|handler| handler.matches(path))?;
	Some(handler.as_ref())
}

/// Transform a single file with the first matching handler.
///
/// Returns [`TransdocError::NoHandler`] when no handler matches `path`.
pub fn transform_file(
	handlers: &[Box<dyn DocumentHandler>],
	transformer: &Transformer,
	path: &Path,
	input: &mut dyn Read,
	output: Option<&mut dyn Write>,
) -> TransdocResult<()> {
	let document_id = path.display().to_string();

	let Some(handler) = find_matching_handler(handlers, path) else {
		return Err(TransdocError::NoHandler { path: document_id });
	};

	tracing::debug!(handler = handler.name(), path = %document_id, "handler matched file");
	handler.process(transformer, &document_id, input, output)?;
	tracing::info!(path = %document_id, "transformed file");

	Ok(())
}
