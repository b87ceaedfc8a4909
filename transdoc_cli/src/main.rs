use std::error::Error;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use clap::Parser;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use transdoc_cli::OutputFormat;
use transdoc_cli::STDIN_DOCUMENT_ID;
use transdoc_cli::TransdocCli;
use transdoc_core::TransdocError;
use transdoc_core::TransdocResult;
use transdoc_core::TransformError;
use transdoc_core::TransformOptions;
use transdoc_core::Transformer;
use transdoc_core::config::TransdocConfig;
use transdoc_core::handler::default_handlers;
use transdoc_core::rules::project_rules;
use transdoc_core::tree::TreeOptions;
use transdoc_core::tree::TreeSummary;
use transdoc_core::tree::transform_tree;

static USE_COLOR: AtomicBool = AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,yellow) => {
		if color_enabled() {
			format!("{}", $text.yellow())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,cyan) => {
		if color_enabled() {
			format!("{}", $text.cyan())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,bold) => {
		if color_enabled() {
			format!("{}", $text.bold())
		} else {
			format!("{}", $text)
		}
	};
}

fn main() {
	let args = TransdocCli::parse();

	// Respect NO_COLOR env var, --no-color flag and terminal support.
	let use_color = !args.no_color
		&& std::env::var_os("NO_COLOR").is_none()
		&& supports_color::on(supports_color::Stream::Stderr).is_some();
	if !use_color {
		USE_COLOR.store(false, Ordering::Relaxed);
	}

	init_tracing(&args);

	// Install miette's fancy handler for rich error diagnostics.
	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	if let Err(message) = validate_args(&args) {
		eprintln!("{} {message}", colored!("error:", red));
		process::exit(2);
	}

	if let Err(e) = run(&args) {
		let code = match e.downcast::<TransdocError>() {
			Ok(error) => report_transdoc_error(*error, args.format),
			Err(e) => {
				eprintln!("{} {e}", colored!("error:", red));
				2
			}
		};

		process::exit(code);
	}
}

/// Log to stderr. `RUST_LOG` takes precedence over the `-v` count.
fn init_tracing(args: &TransdocCli) {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_level()));

	tracing_subscriber::registry()
		.with(filter)
		.with(
			tracing_subscriber::fmt::layer()
				.with_writer(std::io::stderr)
				.with_ansi(color_enabled())
				.with_target(false),
		)
		.try_init()
		.ok();
}

/// Argument combinations which clap cannot check on its own.
fn validate_args(args: &TransdocCli) -> Result<(), String> {
	if args.is_stdin() {
		return Ok(());
	}

	if !Path::new(&args.input).exists() {
		return Err(format!("input `{}` does not exist", args.input));
	}

	if args.output.is_none() && !args.dry_run {
		return Err("--output must be given unless --dry-run is specified".to_string());
	}

	Ok(())
}

fn resolve_root(args: &TransdocCli) -> PathBuf {
	args.root
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn load_config(args: &TransdocCli, root: &Path) -> TransdocResult<TransdocConfig> {
	let config = match &args.config {
		Some(path) => Some(TransdocConfig::load_from(path)?),
		None => TransdocConfig::load(root)?,
	};

	let mut config = config.unwrap_or_else(|| {
		tracing::debug!(root = %root.display(), "no config file found, using defaults");
		TransdocConfig::default()
	});

	if let Some(indent) = &args.indent {
		config.indentation.clone_from(indent);
	}

	Ok(config)
}

fn run(args: &TransdocCli) -> Result<(), Box<dyn Error>> {
	let root = resolve_root(args);
	let config = load_config(args, &root)?;
	let rules = project_rules(Some(&config), &root)?;
	let transformer = Transformer::new(rules).with_syntax(config.markers.syntax()?);
	tracing::debug!(rules = ?transformer.registry(), "loaded rules");

	if args.is_stdin() {
		return run_stdin(args, &transformer, &config);
	}

	let handlers = default_handlers(&config)?;
	let options = TreeOptions {
		force: args.force,
		exclude: config.exclude.patterns.clone(),
	};
	let summary = transform_tree(
		&handlers,
		&transformer,
		Path::new(&args.input),
		args.output.as_deref(),
		&options,
	)?;

	print_summary(args, summary);

	Ok(())
}

/// Standard input has no file name to match a handler against, so it is
/// always transformed as plain text.
fn run_stdin(
	args: &TransdocCli,
	transformer: &Transformer,
	config: &TransdocConfig,
) -> Result<(), Box<dyn Error>> {
	let mut content = String::new();
	std::io::stdin().read_to_string(&mut content)?;

	let options = TransformOptions::new(STDIN_DOCUMENT_ID).indentation(config.indentation.as_str());
	let transformed = transformer
		.transform_with(&content, &options)
		.into_result(STDIN_DOCUMENT_ID)?;

	if args.dry_run {
		return Ok(());
	}

	match &args.output {
		Some(path) => {
			if path.exists() && !args.force {
				return Err(TransdocError::OutputExists {
					path: path.display().to_string(),
				}
				.into());
			}

			std::fs::write(path, transformed)?;
		}
		None => {
			let mut stdout = std::io::stdout().lock();
			stdout.write_all(transformed.as_bytes())?;
			stdout.flush()?;
		}
	}

	Ok(())
}

fn print_summary(args: &TransdocCli, summary: TreeSummary) {
	match args.format {
		OutputFormat::Json => {
			let output = serde_json::json!({
				"ok": true,
				"dry_run": args.dry_run,
				"transformed": summary.transformed,
				"copied": summary.copied,
			});
			println!("{output}");
		}
		OutputFormat::Github | OutputFormat::Text => {
			if args.dry_run {
				println!(
					"Dry run passed: {} file(s) transformed without errors.",
					summary.transformed
				);
			} else {
				println!(
					"Transformed {} file(s) and copied {} file(s).",
					summary.transformed, summary.copied
				);
			}
		}
	}
}

/// Render an error from the core library, returning the exit code.
fn report_transdoc_error(error: TransdocError, format: OutputFormat) -> i32 {
	if !matches!(
		error,
		TransdocError::Transform { .. } | TransdocError::Tree { .. }
	) {
		let report: miette::Report = error.into();
		eprintln!("{report:?}");
		return 2;
	}

	let errors = error.transform_errors();
	print_transform_errors(&errors, format);

	for other in host_errors(&error) {
		eprintln!("{} {other}", colored!("error:", red));
	}

	1
}

/// Errors inside a tree failure which are not located in a document, such
/// as a file which could not be read.
fn host_errors(error: &TransdocError) -> Vec<&TransdocError> {
	match error {
		TransdocError::Tree { errors } => errors.iter().flat_map(host_errors).collect(),
		TransdocError::Transform { .. } => Vec::new(),
		other => vec![other],
	}
}

fn print_transform_errors(errors: &[&TransformError], format: OutputFormat) {
	match format {
		OutputFormat::Json => {
			let entries: Vec<serde_json::Value> = errors
				.iter()
				.map(|error| {
					serde_json::json!({
						"file": error.document_id,
						"kind": error.kind.to_string(),
						"line": error.range.start.row,
						"column": error.range.start.col,
						"end_line": error.range.end.row,
						"end_column": error.range.end.col,
						"message": error.message,
						"cause": error.cause.as_ref().map(ToString::to_string),
					})
				})
				.collect();
			println!("{}", serde_json::Value::Array(entries));
		}
		OutputFormat::Github => {
			for error in errors {
				println!(
					"::error file={},line={},col={}::{}: {}",
					error.document_id,
					error.range.start.row,
					error.range.start.col,
					error.kind,
					annotation_message(error),
				);
			}
			eprintln!("{}", failure_summary(errors.len()));
		}
		OutputFormat::Text => {
			for error in errors {
				let location = format!("{}:{}", error.document_id, error.range.start);
				eprintln!(
					"{} {}: {}",
					colored!(location, cyan),
					colored!(error.kind.to_string(), red),
					error.message
				);

				if let Some(cause) = &error.cause {
					eprintln!("  {} {cause}", colored!("caused by:", yellow));
				}
			}

			eprintln!();
			eprintln!("{}", colored!(failure_summary(errors.len()), bold));
		}
	}
}

/// GitHub annotations are a single line, so the cause is folded in.
fn annotation_message(error: &TransformError) -> String {
	let message = match &error.cause {
		Some(cause) => format!("{} ({cause})", error.message),
		None => error.message.clone(),
	};

	message.replace('\n', "%0A")
}

fn failure_summary(count: usize) -> String {
	format!("Transformation failed with {count} error(s).")
}
