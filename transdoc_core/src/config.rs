use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::MarkerSyntax;
use crate::TransdocError;
use crate::TransdocResult;
use crate::is_identifier;

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] =
	["transdoc.toml", ".transdoc.toml", ".config/transdoc.toml"];

/// File name patterns handled by the plaintext handler when none are
/// configured.
pub const DEFAULT_PLAINTEXT_PATTERNS: [&str; 3] = ["*.txt", "*.md", "*.ascii"];

/// A rule declared in the `[rules]` table.
///
/// Plain strings are text rules:
///
/// ```toml
/// [rules]
/// greeting = "Hello, world!"
/// ```
///
/// Tables declare rules backed by a shell command, a template, a file or a
/// documentation site:
///
/// ```toml
/// [rules]
/// version = { command = "git describe --tags" }
/// shout = { template = "{{ args[0] | upper }}!" }
/// license = { file = "LICENSE" }
/// docs = { docs_link = "https://example.com/docs" }
/// ```
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(untagged)]
#[non_exhaustive]
pub enum RuleSource {
	Text(String),
	Command(CommandRuleSource),
	Template(TemplateRuleSource),
	File(FileRuleSource),
	DocsLink(DocsLinkRuleSource),
}

impl RuleSource {
	/// A short name for the kind of rule, used in logs.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Text(_) => "text",
			Self::Command(_) => "command",
			Self::Template(_) => "template",
			Self::File(_) => "file",
			Self::DocsLink(_) => "docs_link",
		}
	}
}

/// A rule which runs a shell command in the project root and returns its
/// standard output.
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CommandRuleSource {
	pub command: String,
}

/// A rule which renders a `minijinja` template.
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TemplateRuleSource {
	pub template: String,
}

/// A rule which returns the contents of a file relative to the project root.
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileRuleSource {
	pub file: PathBuf,
}

/// A rule which creates markdown links to pages under a base URL.
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DocsLinkRuleSource {
	pub docs_link: String,
}

/// Configuration loaded from a `transdoc.toml` file.
///
/// ```toml
/// indentation = "    "
///
/// [markers]
/// open = "{{"
/// close = "}}"
///
/// [rules]
/// greeting = "Hello, world!"
///
/// [handlers.plaintext]
/// patterns = ["*.txt", "*.md"]
///
/// [exclude]
/// patterns = ["target/", "*.bin"]
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransdocConfig {
	/// Indentation applied by handlers to every line after the first of a
	/// rule's result.
	#[serde(default)]
	pub indentation: String,
	/// The tokens which open and close rule calls.
	#[serde(default)]
	pub markers: MarkersConfig,
	/// Rules declared by name.
	#[serde(default)]
	pub rules: BTreeMap<String, RuleSource>,
	/// Settings for the built-in document handlers.
	#[serde(default)]
	pub handlers: HandlersConfig,
	/// Exclusion configuration using gitignore-style patterns.
	#[serde(default)]
	pub exclude: ExcludeConfig,
}

/// The `[markers]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkersConfig {
	#[serde(default = "default_open_marker")]
	pub open: String,
	#[serde(default = "default_close_marker")]
	pub close: String,
}

impl Default for MarkersConfig {
	fn default() -> Self {
		Self {
			open: default_open_marker(),
			close: default_close_marker(),
		}
	}
}

impl MarkersConfig {
	/// Validate the markers, returning the syntax used by the scanner.
	pub fn syntax(&self) -> TransdocResult<MarkerSyntax> {
		MarkerSyntax::new(self.open.as_str(), self.close.as_str())
	}
}

fn default_open_marker() -> String {
	"{{".to_string()
}

fn default_close_marker() -> String {
	"}}".to_string()
}

/// The `[handlers]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlersConfig {
	#[serde(default)]
	pub plaintext: PlaintextConfig,
}

/// The `[handlers.plaintext]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlaintextConfig {
	/// Glob patterns matched against file names.
	#[serde(default = "default_plaintext_patterns")]
	pub patterns: Vec<String>,
}

impl Default for PlaintextConfig {
	fn default() -> Self {
		Self {
			patterns: default_plaintext_patterns(),
		}
	}
}

fn default_plaintext_patterns() -> Vec<String> {
	DEFAULT_PLAINTEXT_PATTERNS
		.iter()
		.map(ToString::to_string)
		.collect()
}

/// Configuration for excluding files and directories from tree transforms.
///
/// Patterns follow gitignore syntax. Supports negation (`!pattern`),
/// directory markers (trailing `/`), and all standard gitignore wildcards.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExcludeConfig {
	/// Patterns relative to the input directory.
	///
	/// Examples: `"build/"`, `"*.bin"`, `"!keep.bin"`.
	#[serde(default)]
	pub patterns: Vec<String>,
}

impl TransdocConfig {
	/// Resolve the config path from known discovery candidates.
	#[must_use]
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the config from the first discovered config file at `root`.
	/// Returns `None` if the file does not exist.
	pub fn load(root: &Path) -> TransdocResult<Option<TransdocConfig>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		Self::load_from(&config_path).map(Some)
	}

	/// Load the config from an explicit path.
	pub fn load_from(path: &Path) -> TransdocResult<TransdocConfig> {
		tracing::debug!(path = %path.display(), "loading config");
		let content = std::fs::read_to_string(path)?;
		Self::parse(&content)
	}

	/// Parse and validate config file content.
	pub fn parse(content: &str) -> TransdocResult<TransdocConfig> {
		let config: TransdocConfig =
			toml::from_str(content).map_err(|e| TransdocError::ConfigParse(e.to_string()))?;

		config.markers.syntax()?;

		if let Some(name) = config.rules.keys().find(|name| !is_identifier(name)) {
			return Err(TransdocError::InvalidRule {
				name: name.clone(),
				reason: "rule names must be identifiers so they can be called".to_string(),
			});
		}

		Ok(config)
	}
}
