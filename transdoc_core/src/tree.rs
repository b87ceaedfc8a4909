//! Transforming whole directory trees.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::path::PathBuf;

use ignore::gitignore::Gitignore;
use ignore::gitignore::GitignoreBuilder;

use crate::TransdocError;
use crate::TransdocResult;
use crate::Transformer;
use crate::handler::DocumentHandler;
use crate::handler::find_matching_handler;

/// An input file and where its output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMapping {
	pub input: PathBuf,
	/// `None` when transforming without writing anything.
	pub output: Option<PathBuf>,
}

/// Options for [`transform_tree`].
#[derive(Debug, Clone, Default)]
pub struct TreeOptions {
	/// Replace an existing output instead of refusing to run.
	pub force: bool,
	/// Gitignore-style patterns, relative to the input directory, of files to
	/// leave out entirely.
	pub exclude: Vec<String>,
}

/// What happened during a successful [`transform_tree`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeSummary {
	/// Files passed through a handler.
	pub transformed: usize,
	/// Files with no matching handler, copied byte for byte.
	pub copied: usize,
}

/// Map `input` onto `output`.
///
/// A file maps to `output` itself. A directory maps every file beneath it,
/// in sorted order, to the same relative path under `output`. Files matching
/// `exclude` are left out.
pub fn expand_tree(
	input: &Path,
	output: Option<&Path>,
	exclude: &[String],
) -> TransdocResult<Vec<FileMapping>> {
	if !input.is_dir() {
		return Ok(vec![FileMapping {
			input: input.to_path_buf(),
			output: output.map(Path::to_path_buf),
		}]);
	}

	let exclude_matcher = build_exclude_matcher(input, exclude)?;
	let mut files = Vec::new();
	let mut visited_dirs = HashSet::new();
	walk_dir(input, &mut files, &exclude_matcher, &mut visited_dirs)?;
	files.sort();

	let mappings = files
		.into_iter()
		.map(|file| {
			let output = output.map(|output| {
				file.strip_prefix(input)
					.map_or_else(|_| output.join(&file), |relative| output.join(relative))
			});

			FileMapping {
				input: file,
				output,
			}
		})
		.collect();

	Ok(mappings)
}

/// Transform every file in `input`, writing the results under `output`.
///
/// Files no handler matches are copied unchanged. A failure in one file does
/// not stop the others; all failures are returned together as
/// [`TransdocError::Tree`] after every other file has been written.
pub fn transform_tree(
	handlers: &[Box<dyn DocumentHandler>],
	transformer: &Transformer,
	input: &Path,
	output: Option<&Path>,
	options: &TreeOptions,
) -> TransdocResult<TreeSummary> {
	if let Some(output) = output {
		check_output_location(input, output)?;
		prepare_output(output, options.force)?;
	}

	let mappings = expand_tree(input, output, &options.exclude)?;
	let mut summary = TreeSummary::default();
	let mut errors = Vec::new();

	for mapping in &mappings {
		match transform_mapping(handlers, transformer, mapping) {
			Ok(MappingResult::Transformed) => summary.transformed += 1,
			Ok(MappingResult::Copied) => summary.copied += 1,
			Ok(MappingResult::Skipped) => {}
			Err(error) => errors.push(error),
		}
	}

	if !errors.is_empty() {
		return Err(TransdocError::Tree { errors });
	}

	Ok(summary)
}

enum MappingResult {
	Transformed,
	Copied,
	Skipped,
}

fn transform_mapping(
	handlers: &[Box<dyn DocumentHandler>],
	transformer: &Transformer,
	mapping: &FileMapping,
) -> TransdocResult<MappingResult> {
	let document_id = mapping.input.display().to_string();

	let Some(handler) = find_matching_handler(handlers, &mapping.input) else {
		let Some(output) = &mapping.output else {
			tracing::debug!(path = %document_id, "no handler matched file, skipping");
			return Ok(MappingResult::Skipped);
		};

		tracing::warn!(path = %document_id, "no handler matched file, copying unchanged");
		create_parent_dir(output)?;
		std::fs::copy(&mapping.input, output)?;
		return Ok(MappingResult::Copied);
	};

	tracing::debug!(handler = handler.name(), path = %document_id, "handler matched file");
	let mut reader = BufReader::new(File::open(&mapping.input)?);

	match &mapping.output {
		Some(output) => {
			let mut buffer = Vec::new();
			handler.process(transformer, &document_id, &mut reader, Some(&mut buffer))?;
			create_parent_dir(output)?;
			std::fs::write(output, buffer)?;
		}
		None => handler.process(transformer, &document_id, &mut reader, None)?,
	}

	tracing::info!(path = %document_id, "transformed file");
	Ok(MappingResult::Transformed)
}

/// Reject an output which is the input itself or one of its ancestors, since
/// replacing it would destroy the input.
fn check_output_location(input: &Path, output: &Path) -> TransdocResult<()> {
	// A missing path cannot contain the input. A missing input is reported
	// when the tree is expanded.
	let (Ok(input_canonical), Ok(output_canonical)) = (input.canonicalize(), output.canonicalize())
	else {
		return Ok(());
	};

	if input_canonical.starts_with(&output_canonical) {
		return Err(TransdocError::OutputOverlapsInput {
			input: input.display().to_string(),
			output: output.display().to_string(),
		});
	}

	Ok(())
}

/// Refuse to overwrite an existing output unless `force` is set, in which
/// case an existing output directory is removed.
fn prepare_output(output: &Path, force: bool) -> TransdocResult<()> {
	let exists = if output.is_dir() {
		std::fs::read_dir(output)?.next().is_some()
	} else {
		output.exists()
	};

	if exists && !force {
		return Err(TransdocError::OutputExists {
			path: output.display().to_string(),
		});
	}

	if force && output.is_dir() {
		tracing::debug!(path = %output.display(), "removing existing output directory");
		std::fs::remove_dir_all(output)?;
	}

	Ok(())
}

fn create_parent_dir(path: &Path) -> TransdocResult<()> {
	if let Some(parent) = path.parent() {
		if !parent.as_os_str().is_empty() {
			std::fs::create_dir_all(parent)?;
		}
	}

	Ok(())
}

/// Build a `Gitignore` matcher from exclude patterns. These follow
/// `.gitignore` syntax relative to `root`.
fn build_exclude_matcher(root: &Path, patterns: &[String]) -> TransdocResult<Gitignore> {
	let mut builder = GitignoreBuilder::new(root);

	for pattern in patterns {
		builder.add_line(None, pattern).map_err(|e| {
			TransdocError::InvalidPattern {
				pattern: pattern.clone(),
				reason: e.to_string(),
			}
		})?;
	}

	builder.build().map_err(|e| {
		TransdocError::InvalidPattern {
			pattern: patterns.join(", "),
			reason: e.to_string(),
		}
	})
}

fn walk_dir(
	dir: &Path,
	files: &mut Vec<PathBuf>,
	exclude: &Gitignore,
	visited_dirs: &mut HashSet<PathBuf>,
) -> TransdocResult<()> {
	// Detect symlink cycles by tracking canonical paths.
	let canonical = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
	if !visited_dirs.insert(canonical) {
		return Err(TransdocError::SymlinkCycle {
			path: dir.display().to_string(),
		});
	}

	for entry in std::fs::read_dir(dir)? {
		let path = entry?.path();
		let is_dir = path.is_dir();

		if exclude.matched(&path, is_dir).is_ignore() {
			continue;
		}

		if is_dir {
			walk_dir(&path, files, exclude, visited_dirs)?;
		} else {
			files.push(path);
		}
	}

	Ok(())
}
