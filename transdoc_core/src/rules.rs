//! Built-in rules and rules declared in `transdoc.toml`.
//!
//! Every rule here accepts either no arguments or a fixed shape of
//! arguments, and reports any other shape as an [`ArgumentError`](crate::ArgumentError).

use std::path::Path;
use std::path::PathBuf;
use std::process::Command;

use minijinja::Environment;
use minijinja::context;
use thiserror::Error;

use crate::Argument;
use crate::ArgumentError;
use crate::Rule;
use crate::RuleArguments;
use crate::RuleResult;
use crate::RuleSet;
use crate::TransdocError;
use crate::TransdocResult;
use crate::config::RuleSource;
use crate::config::TransdocConfig;

/// The name of the built-in rule which embeds the contents of a file.
pub const FILE_CONTENTS: &str = "file_contents";

/// Prefix of the environment variables which carry keyword arguments to
/// command rules.
pub const COMMAND_ARGUMENT_PREFIX: &str = "TRANSDOC_ARG_";

/// Failures of the rules in this module.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuleFailure {
	#[error("unable to read `{path}`: {source}")]
	ReadFile {
		path: String,
		#[source]
		source: std::io::Error,
	},
	#[error("command `{command}` failed: {reason}")]
	Command { command: String, reason: String },
	#[error("unable to run command `{command}`: {source}")]
	Spawn {
		command: String,
		#[source]
		source: std::io::Error,
	},
}

/// Returns the contents of a file relative to the project root, without its
/// trailing newline.
///
/// ```text
/// {{file_contents[docs/intro.txt]}}
/// {{file_contents("docs/intro.txt")}}
/// ```
#[derive(Debug, Clone)]
pub struct FileContentsRule {
	root: PathBuf,
}

impl FileContentsRule {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}
}

impl Rule for FileContentsRule {
	fn invoke(&self, args: &RuleArguments) -> RuleResult {
		let path = args.expect_single_string(FILE_CONTENTS)?;
		Ok(read_file_contents(&self.root, Path::new(path))?)
	}
}

fn read_file_contents(root: &Path, path: &Path) -> Result<String, RuleFailure> {
	let contents = std::fs::read_to_string(root.join(path)).map_err(|source| {
		RuleFailure::ReadFile {
			path: path.display().to_string(),
			source,
		}
	})?;

	Ok(trim_trailing_newline(contents))
}

fn trim_trailing_newline(mut text: String) -> String {
	if text.ends_with('\n') {
		text.pop();

		if text.ends_with('\r') {
			text.pop();
		}
	}

	text
}

/// A rule which always returns the same text.
#[derive(Debug, Clone)]
pub struct TextRule {
	name: String,
	text: String,
}

impl TextRule {
	pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			text: text.into(),
		}
	}
}

impl Rule for TextRule {
	fn invoke(&self, args: &RuleArguments) -> RuleResult {
		args.expect_none(&self.name)?;
		Ok(self.text.clone())
	}
}

/// A rule which returns the contents of a fixed file.
#[derive(Debug, Clone)]
pub struct FileRule {
	name: String,
	root: PathBuf,
	file: PathBuf,
}

impl Rule for FileRule {
	fn invoke(&self, args: &RuleArguments) -> RuleResult {
		args.expect_none(&self.name)?;
		Ok(read_file_contents(&self.root, &self.file)?)
	}
}

/// A rule which links to a page of a documentation site as markdown.
///
/// ```text
/// {{docs[guide/intro]}}           -> [https://example.com/guide/intro](https://example.com/guide/intro)
/// {{docs("guide/intro", "Intro")}} -> [Intro](https://example.com/guide/intro)
/// ```
///
/// The link text may also be given as `text="Intro"`.
#[derive(Debug, Clone)]
pub struct DocsLinkRule {
	name: String,
	base_url: String,
}

impl DocsLinkRule {
	pub fn new(name: impl Into<String>, base_url: &str) -> Self {
		Self {
			name: name.into(),
			base_url: base_url.trim_end_matches('/').to_string(),
		}
	}
}

impl Rule for DocsLinkRule {
	fn invoke(&self, args: &RuleArguments) -> RuleResult {
		if let Some(name) = args.keyword.keys().find(|name| name.as_str() != "text") {
			return Err(ArgumentError::UnknownKeyword {
				rule: self.name.clone(),
				name: name.clone(),
			}
			.into());
		}

		if args.len() > 2 {
			return Err(ArgumentError::Unexpected {
				rule: self.name.clone(),
				expected: 2,
				got: args.len(),
			}
			.into());
		}

		let path = args.expect_string(&self.name, 0)?;
		let url = format!("{}/{path}", self.base_url);

		let text = match args.get_keyword("text") {
			Some(Argument::String(text)) => Some(text.as_str()),
			Some(other) => {
				return Err(ArgumentError::WrongType {
					rule: self.name.clone(),
					index: 1,
					expected: "string",
					got: other.type_name(),
				}
				.into());
			}
			None => args.optional_string(&self.name, 1)?,
		};

		Ok(format!("[{}]({url})", text.unwrap_or(&url)))
	}
}

/// A rule which runs a shell command in the project root.
///
/// Positional arguments are passed to the shell as `$1`, `$2`, ...; keyword
/// arguments are exported as `TRANSDOC_ARG_<NAME>` with the name upper-cased.
/// The command's standard output, without its trailing newline, is the
/// result.
#[derive(Debug, Clone)]
pub struct CommandRule {
	root: PathBuf,
	command: String,
}

impl CommandRule {
	pub fn new(root: impl Into<PathBuf>, command: impl Into<String>) -> Self {
		Self {
			root: root.into(),
			command: command.into(),
		}
	}
}

impl Rule for CommandRule {
	fn invoke(&self, args: &RuleArguments) -> RuleResult {
		let stdout = execute_script(&self.root, &self.command, args)?;
		Ok(trim_trailing_newline(stdout))
	}
}

fn execute_script(root: &Path, command: &str, args: &RuleArguments) -> Result<String, RuleFailure> {
	let mut process = if cfg!(windows) {
		let mut process = Command::new("cmd");
		process.arg("/C").arg(command);
		process
	} else {
		let mut process = Command::new("sh");
		// `$0` is the command itself so positional arguments start at `$1`.
		process.arg("-c").arg(command).arg(command);
		process
	};

	process
		.args(args.positional.iter().map(ToString::to_string))
		.current_dir(root);

	for (name, value) in &args.keyword {
		let key = format!("{COMMAND_ARGUMENT_PREFIX}{}", name.to_uppercase());
		process.env(key, value.to_string());
	}

	tracing::debug!(command, "running rule command");

	let output = process.output().map_err(|source| {
		RuleFailure::Spawn {
			command: command.to_string(),
			source,
		}
	})?;

	if !output.status.success() {
		let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
		let reason = if stderr.is_empty() {
			format!(
				"command exited with status {}",
				output
					.status
					.code()
					.map_or_else(|| "unknown".to_string(), |code| code.to_string())
			)
		} else {
			stderr
		};

		return Err(RuleFailure::Command {
			command: command.to_string(),
			reason,
		});
	}

	Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// A rule which renders a `minijinja` template.
///
/// The template sees `args`, a list of the positional arguments, and
/// `kwargs`, a map of the keyword arguments.
#[derive(Debug)]
pub struct TemplateRule {
	template: String,
	env: Environment<'static>,
}

impl TemplateRule {
	/// Create a template rule, checking that the template compiles.
	pub fn new(name: &str, template: impl Into<String>) -> TransdocResult<Self> {
		let template = template.into();
		let env = Environment::new();

		if let Err(error) = env.template_from_str(&template) {
			return Err(TransdocError::InvalidRule {
				name: name.to_string(),
				reason: error.to_string(),
			});
		}

		Ok(Self { template, env })
	}
}

impl Rule for TemplateRule {
	fn invoke(&self, args: &RuleArguments) -> RuleResult {
		let positional: Vec<serde_json::Value> = args.positional.iter().map(argument_json).collect();
		let keyword: serde_json::Map<String, serde_json::Value> = args
			.keyword
			.iter()
			.map(|(name, value)| (name.clone(), argument_json(value)))
			.collect();

		let rendered = self.env.render_str(
			&self.template,
			context! {
				args => positional,
				kwargs => keyword,
			},
		)?;

		Ok(rendered)
	}
}

/// Whole numbers become integers so templates print `2` rather than `2.0`.
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn argument_json(argument: &Argument) -> serde_json::Value {
	match argument {
		Argument::String(value) => serde_json::Value::String(value.clone()),
		Argument::Integer(value) => serde_json::Value::from(*value),
		Argument::Number(number) if number.0.fract() == 0.0 && number.0.abs() < 1e15 => {
			serde_json::Value::from(number.0 as i64)
		}
		Argument::Number(number) => {
			serde_json::Number::from_f64(number.0)
				.map_or(serde_json::Value::Null, serde_json::Value::Number)
		}
		Argument::Boolean(value) => serde_json::Value::Bool(*value),
	}
}

/// The rules every project gets, resolved relative to `root`.
pub fn builtin_rules(root: &Path) -> RuleSet {
	RuleSet::new().with(FILE_CONTENTS, FileContentsRule::new(root))
}

/// Build the rules declared in the `[rules]` table of `config`.
pub fn configured_rules(config: &TransdocConfig, root: &Path) -> TransdocResult<RuleSet> {
	let mut rules = RuleSet::new();

	for (name, source) in &config.rules {
		tracing::debug!(rule = name.as_str(), kind = source.kind(), "registering rule");

		match source {
			RuleSource::Text(text) => rules.insert(name.as_str(), TextRule::new(name, text)),
			RuleSource::Command(command) => {
				rules.insert(name.as_str(), CommandRule::new(root, &command.command));
			}
			RuleSource::Template(template) => {
				rules.insert(name.as_str(), TemplateRule::new(name, &template.template)?);
			}
			RuleSource::DocsLink(docs) => {
				rules.insert(name.as_str(), DocsLinkRule::new(name, &docs.docs_link));
			}
			RuleSource::File(file) => {
				rules.insert(
					name.as_str(),
					FileRule {
						name: name.clone(),
						root: root.to_path_buf(),
						file: file.file.clone(),
					},
				);
			}
		}
	}

	Ok(rules)
}

/// The built-in rules plus every configured rule. Configured rules replace
/// built-in rules with the same name.
pub fn project_rules(config: Option<&TransdocConfig>, root: &Path) -> TransdocResult<RuleSet> {
	let mut rules = builtin_rules(root);

	if let Some(config) = config {
		rules.extend(configured_rules(config, root)?);
	}

	Ok(rules)
}
