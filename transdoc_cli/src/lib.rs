use std::path::PathBuf;

use clap::ArgAction;
use clap::Parser;
use clap::ValueEnum;

/// The input value which reads a document from standard input.
pub const STDIN_INPUT: &str = "-";

/// The document id used in errors for standard input.
pub const STDIN_DOCUMENT_ID: &str = "<stdin>";

#[derive(Parser)]
#[command(
	name = "transdoc",
	author,
	version,
	about = "Transform your documentation by embedding the results of rule calls.",
	long_about = "transdoc scans documents for rule calls such as `{{rule}}`, `{{rule[text]}}` \
	              or `{{rule(\"text\", count=2)}}` and replaces each one with the result of the \
	              rule.\n\nRules are declared in `transdoc.toml`. The built-in `file_contents` \
	              rule embeds another file.\n\nExamples:\n  transdoc docs -o build/docs\n  \
	              transdoc README.md --dry-run\n  cat notes.md | transdoc -"
)]
pub struct TransdocCli {
	/// Path to the input file or directory, or `-` to read from standard
	/// input.
	pub input: String,

	/// Path to the output file or directory. Required unless `--dry-run` is
	/// given. Standard input is written to standard output by default.
	#[arg(long, short)]
	pub output: Option<PathBuf>,

	/// Transform every file without writing any output.
	#[arg(long, short, conflicts_with_all = ["output", "force"], default_value_t = false)]
	pub dry_run: bool,

	/// Overwrite the output file or directory if it already exists.
	#[arg(long, short, default_value_t = false)]
	pub force: bool,

	/// Path to the config file. Defaults to the first of `transdoc.toml`,
	/// `.transdoc.toml` or `.config/transdoc.toml` in the project root.
	#[arg(long, short)]
	pub config: Option<PathBuf>,

	/// Path to the project root. Rules resolve files and run commands
	/// relative to it.
	#[arg(long)]
	pub root: Option<PathBuf>,

	/// Indentation added to every line after the first of a multi-line rule
	/// result. Overrides the configured indentation.
	#[arg(long)]
	pub indent: Option<String>,

	/// Output format for transformation errors. Use `text` for
	/// human-readable output, `json` for programmatic consumption, or
	/// `github` for GitHub Actions annotations.
	#[arg(long, value_enum, default_value_t = OutputFormat::Text)]
	pub format: OutputFormat,

	/// Increase logging verbosity. Repeat for more detail (`-vvv`).
	#[arg(long, short, action = ArgAction::Count)]
	pub verbose: u8,

	/// Disable colored output.
	#[arg(long, default_value_t = false)]
	pub no_color: bool,
}

impl TransdocCli {
	/// Whether the input is read from standard input.
	pub fn is_stdin(&self) -> bool {
		self.input == STDIN_INPUT
	}

	/// The default log level for the number of `-v` flags given.
	pub fn log_level(&self) -> &'static str {
		match self.verbose {
			0 => "error",
			1 => "warn",
			2 => "info",
			3 => "debug",
			_ => "trace",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text output with colors and formatting.
	Text,
	/// A JSON array with one object per error, including the file, the kind
	/// of error and its location.
	Json,
	/// GitHub Actions annotation format. Emits `::error` annotations that
	/// appear inline on pull request diffs.
	Github,
}
