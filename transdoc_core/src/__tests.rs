use std::path::Path;

use rstest::fixture;
use rstest::rstest;
use similar_asserts::assert_eq;
use thiserror::Error;
use tracing_test::traced_test;

use super::*;
use crate::config::RuleSource;
use crate::config::TransdocConfig;
use crate::handler::DocumentHandler;
use crate::handler::PlaintextHandler;
use crate::handler::default_handlers;
use crate::handler::find_matching_handler;
use crate::handler::transform_file;
use crate::lexer::LexError;
use crate::lexer::tokenize;
use crate::rules::DocsLinkRule;
use crate::rules::RuleFailure;
use crate::rules::project_rules;
use crate::tokens::Token;
use crate::tree::TreeOptions;
use crate::tree::TreeSummary;
use crate::tree::expand_tree;
use crate::tree::transform_tree;

#[derive(Debug, Error)]
#[error("{0}")]
struct ExampleError(String);

#[fixture]
fn transformer() -> Transformer {
	let rules = RuleSet::new()
		.with_fn("simple", |args| {
			args.expect_none("simple")?;
			Ok("Simple rule".to_string())
		})
		.with_fn("multiline", |args| {
			match args.get(0) {
				Some(extra) => Ok(format!("Multiple\nLines {extra}")),
				None => Ok("Multiple\nLines".to_string()),
			}
		})
		.with_fn("echo", |args| Ok(args.expect_single_string("echo")?.to_string()))
		.with_fn("error", |args| {
			let kind = args.get(0).and_then(Argument::as_str).unwrap_or("TypeError");
			Err(ExampleError(kind.to_string()).into())
		})
		.with_fn("join", |args| {
			let separator = args
				.get_keyword("sep")
				.map_or_else(|| " ".to_string(), ToString::to_string);
			let parts: Vec<String> = args.positional.iter().map(ToString::to_string).collect();
			Ok(parts.join(&separator))
		})
		.with_fn("describe", |args| {
			let kinds: Vec<&str> = args.positional.iter().map(Argument::type_name).collect();
			Ok(kinds.join(" "))
		});

	Transformer::new(rules)
}

fn transform_ok(transformer: &Transformer, input: &str) -> String {
	match transformer.transform(input, "<string>") {
		TransformOutcome::Text(text) => text,
		TransformOutcome::Failed(errors) => panic!("unexpected errors: {errors:#?}"),
	}
}

fn transform_err(transformer: &Transformer, input: &str) -> Vec<TransformError> {
	match transformer.transform(input, "<string>") {
		TransformOutcome::Text(text) => panic!("expected errors, got text: {text:?}"),
		TransformOutcome::Failed(errors) => errors,
	}
}

fn write_file(path: &Path, content: impl AsRef<[u8]>) {
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent).unwrap_or_else(|e| panic!("create_dir_all: {e}"));
	}
	std::fs::write(path, content).unwrap_or_else(|e| panic!("write: {e}"));
}

fn read_file(path: &Path) -> String {
	std::fs::read_to_string(path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
}

// --- Position tests ---

#[rstest]
#[case::same_row(SourcePos::new(2, 2), SourcePos::new(1, 2), SourcePos::new(2, 3))]
#[case::next_rows(SourcePos::new(2, 1), SourcePos::new(2, 3), SourcePos::new(3, 3))]
#[case::origin(SourcePos::origin(), SourcePos::origin(), SourcePos::origin())]
fn add_positions(#[case] left: SourcePos, #[case] right: SourcePos, #[case] expected: SourcePos) {
	assert_eq!(left + right, expected);
}

#[rstest]
#[case::single_line(SourcePos::new(2, 2), "12345", SourcePos::new(2, 7))]
#[case::multiple_lines(SourcePos::new(2, 2), "a\nb\n123", SourcePos::new(4, 4))]
#[case::trailing_newline(SourcePos::new(1, 5), "abc\n", SourcePos::new(2, 1))]
#[case::counts_characters(SourcePos::origin(), "héllo", SourcePos::new(1, 6))]
#[case::empty(SourcePos::new(3, 4), "", SourcePos::new(3, 4))]
fn offset_position_by_text(
	#[case] start: SourcePos,
	#[case] text: &str,
	#[case] expected: SourcePos,
) {
	assert_eq!(start.offset_by_str(text), expected);
}

#[test]
fn position_display_and_zero_sentinel() {
	assert_eq!(SourcePos::new(4, 12).to_string(), "4:12");
	assert!(SourcePos::zero().is_zero());
	assert!(SourceRange::zero().is_zero());
	assert!(!SourceRange::spanning(SourcePos::origin(), "{{").is_zero());
	assert_eq!(
		SourceRange::spanning(SourcePos::origin(), "{{").to_string(),
		"1:1-1:3"
	);
}

// --- Lexer and parser tests ---

#[test]
fn tokenize_call_expression() -> AnyEmptyResult {
	let tokens: Vec<Token> = tokenize(r#"link("a b", 'c', n=-2, f=1.5e1, on=true)"#)?
		.into_iter()
		.map(|spanned| spanned.token)
		.collect();

	assert_eq!(
		tokens,
		vec![
			Token::Ident("link".into()),
			Token::ParenOpen,
			Token::String("a b".into(), b'"'),
			Token::Comma,
			Token::String("c".into(), b'\''),
			Token::Comma,
			Token::Ident("n".into()),
			Token::Equals,
			Token::Int(-2),
			Token::Comma,
			Token::Ident("f".into()),
			Token::Equals,
			Token::Float(15.0),
			Token::Comma,
			Token::Ident("on".into()),
			Token::Equals,
			Token::Ident("true".into()),
			Token::ParenClose,
		]
	);

	Ok(())
}

#[test]
fn tokenize_rejects_unknown_characters() {
	let result = tokenize("echo[1]");
	assert!(result.is_err(), "expected a lex error, got {result:?}");
}

#[rstest]
#[case::unknown_letter(r#"echo("\q")"#)]
#[case::unicode(r#"echo('\u{41}')"#)]
fn tokenize_rejects_unknown_escapes(#[case] source: &str) {
	assert_eq!(
		tokenize(source),
		Err(LexError::InvalidEscape { offset: 5 })
	);
}

#[rstest]
#[case::large("9007199254740993", Argument::Integer(9_007_199_254_740_993))]
#[case::negative("-12", Argument::Integer(-12))]
#[case::float("2.5", Argument::Number(OrderedFloat(2.5)))]
fn integers_stay_exact(#[case] literal: &str, #[case] expected: Argument) -> AnyEmptyResult {
	let call = parse_call_expression(&format!("value({literal})"))?;
	assert_eq!(call.positional, vec![ArgumentValue::Literal(expected)]);

	Ok(())
}

#[rstest]
#[case::bare("simple", InvocationShape::Bare { name: "simple".into() })]
#[case::unicode_bare("héllo_1", InvocationShape::Bare { name: "héllo_1".into() })]
#[case::bracketed(
	"echo[Input text]",
	InvocationShape::Bracketed { name: "echo".into(), content: "Input text".into() }
)]
#[case::bracketed_keeps_inner_brackets(
	"echo[[a] (b)]",
	InvocationShape::Bracketed { name: "echo".into(), content: "[a] (b)".into() }
)]
#[case::bracketed_empty(
	"echo[]",
	InvocationShape::Bracketed { name: "echo".into(), content: String::new() }
)]
#[case::expression(
	"echo('Input text')",
	InvocationShape::Expression(CallExpression {
		name: "echo".into(),
		positional: vec![ArgumentValue::Literal(Argument::String("Input text".into()))],
		keyword: vec![],
	})
)]
fn classify_invocations(#[case] raw: &str, #[case] expected: InvocationShape) {
	assert_eq!(parse_invocation(raw), Ok(expected));
}

#[rstest]
#[case::unfinished_expression("echo(")]
#[case::unfinished_bracket("echo[input")]
#[case::quoted_after_name("echo'input'")]
#[case::leading_space(" simple")]
#[case::leading_digit("1rule")]
#[case::keyword_before_positional("join(sep='-', 'a')")]
#[case::repeated_keyword("join(sep='-', sep='+')")]
#[case::unquoted_argument("echo(input)")]
#[case::missing_comma("join('a' 'b')")]
#[case::trailing_tokens("echo('a'))")]
#[case::empty_argument("join(,)")]
fn reject_invalid_invocations(#[case] raw: &str) {
	let result = parse_invocation(raw);
	assert!(result.is_err(), "`{raw}` should be invalid, got {result:?}");
}

#[test]
fn nested_calls_list_rule_names_outermost_first() -> AnyEmptyResult {
	let call = parse_call_expression("outer(first('a'), key=second(third()))")?;
	assert_eq!(call.rule_names(), vec!["outer", "first", "second", "third"]);

	Ok(())
}

#[test]
fn invalid_call_message() {
	let error = parse_invocation("echo(input)").unwrap_err();
	insta::assert_snapshot!(
		error.to_string(),
		@"unable to evaluate rule due to invalid syntax: unexpected identifier `input`; string arguments must be quoted"
	);
}

// --- Scanner tests ---

#[test]
fn scan_calls_is_non_greedy_and_tracks_positions() {
	let content = "a {{one}}\n  {{two\nlines}} {{}}";
	let sites = scan_calls(content, &MarkerSyntax::default(), SourcePos::origin());

	let raw: Vec<&str> = sites.iter().map(|site| site.raw_text).collect();
	assert_eq!(raw, vec!["one", "two\nlines"]);
	assert_eq!(sites[0].range, SourceRange::new(SourcePos::new(1, 3), SourcePos::new(1, 10)));
	assert_eq!(sites[1].range, SourceRange::new(SourcePos::new(2, 3), SourcePos::new(3, 8)));
	assert_eq!(&content[sites[1].span.clone()], "{{two\nlines}}");
}

#[rstest]
#[case::no_markers("plain text", None)]
#[case::closed("{{a}} {{b}}", None)]
#[case::unclosed("{{Unclosed", Some(0))]
#[case::after_closed("{{a}} text {{b", Some(11))]
#[case::empty_pair("{{}}", None)]
#[case::closer_later("{{a\nb}}", None)]
fn find_unclosed_markers(#[case] content: &str, #[case] expected: Option<usize>) {
	assert_eq!(find_unclosed_marker(content, &MarkerSyntax::default()), expected);
}

#[rstest]
#[case::empty_open("", "}}")]
#[case::empty_close("{{", "")]
#[case::identical("@@", "@@")]
fn reject_invalid_markers(#[case] open: &str, #[case] close: &str) {
	let result = MarkerSyntax::new(open, close);
	assert!(matches!(result, Err(TransdocError::InvalidMarkers(_))));
}

// --- Invoker tests ---

#[rstest]
#[case::no_indent("", "Multiple\nLines", "Multiple\nLines")]
#[case::spaces("    ", "Multiple\nLines", "Multiple\n    Lines")]
#[case::trims_line_ends("\t", "a  \nb\t\n", "a\n\tb")]
#[case::leading_whitespace("  ", "  a\nb", "a\n  b")]
#[case::empty("  ", "", "")]
fn indent_results(#[case] indent: &str, #[case] text: &str, #[case] expected: &str) {
	assert_eq!(indent_by(indent, text), expected);
}

// --- Transformer tests ---

#[rstest]
fn leaves_strings_with_no_rules_as_is(transformer: Transformer) {
	assert_eq!(
		transform_ok(&transformer, "Text without a rule call"),
		"Text without a rule call"
	);
}

#[rstest]
#[case::single("Call: {{simple}}", "Call: Simple rule")]
#[case::multiple("Call: {{simple}} {{simple}}", "Call: Simple rule Simple rule")]
#[case::multiline_output("Call: {{multiline}}", "Call: Multiple\nLines")]
#[case::multiline_input("Call: {{multiline[sample\ntext]}}", "Call: Multiple\nLines sample\ntext")]
#[case::bracket_syntax("Call: {{echo[Input text]}}", "Call: Input text")]
#[case::expression_syntax("Call: {{echo('Input text')}}", "Call: Input text")]
#[case::keyword_arguments(r#"{{join("a", 'b', sep="-")}}"#, "a-b")]
#[case::nested_calls(r#"{{join(echo("x"), "y",)}}"#, "x y")]
#[case::nested_keyword(r#"{{join("a", "b", sep=echo("+"))}}"#, "a+b")]
#[case::literal_types(r#"{{describe(1, -2.5, true, False, "s")}}"#, "number number boolean boolean string")]
#[case::numbers_display("{{join(1, 2.5, 1e3)}}", "1 2.5 1000")]
#[case::empty_marker_pair("{{}} stays", "{{}} stays")]
#[case::multibyte("é {{simple}} ü", "é Simple rule ü")]
#[case::escaped_newline(r#"{{echo("a\nb")}}"#, "a\nb")]
#[case::apostrophe_in_double_quotes(r#"{{echo("it's\tok")}}"#, "it's\tok")]
#[case::escaped_double_quotes(r#"{{echo("a \"q\" b")}}"#, "a \"q\" b")]
#[case::escaped_single_quote(r#"{{echo('it\'s "hi"\tthere')}}"#, "it's \"hi\"\tthere")]
#[case::escaped_backslash(r#"{{echo("back\\slash")}}"#, "back\\slash")]
#[case::escaped_carriage_return(r#"{{echo('a\rb')}}"#, "a\rb")]
#[case::escaped_nul(r#"{{echo("nul\0end")}}"#, "nul\0end")]
#[case::large_integer("{{join(9007199254740993, -12)}}", "9007199254740993 -12")]
fn embeds_rule_output(transformer: Transformer, #[case] input: &str, #[case] expected: &str) {
	assert_eq!(transform_ok(&transformer, input), expected);
}

#[rstest]
fn rules_respect_indentation(transformer: Transformer) {
	let options = TransformOptions::new("<string>").indentation("    ");
	let outcome = transformer.transform_with("Call: {{multiline}}", &options);
	assert_eq!(outcome.text(), Some("Call: Multiple\n    Lines"));
}

#[rstest]
fn transforming_output_again_is_a_no_op(transformer: Transformer) {
	let once = transform_ok(&transformer, "A {{simple}}\nB {{multiline[x]}}\n");
	let twice = transform_ok(&transformer, &once);
	assert_eq!(once, twice);
}

#[rstest]
fn errors_unclosed_call(transformer: Transformer) {
	let errors = transform_err(&transformer, "{{Unclosed");
	assert_eq!(errors.len(), 1);
	assert!(errors[0].is_syntax());
	assert_eq!(
		errors[0].range,
		SourceRange::new(SourcePos::new(1, 1), SourcePos::new(1, 3))
	);
	insta::assert_snapshot!(
		errors[0].to_string(),
		@"<string>:1:1 SyntaxError: Unclosed rule call. Did you forget a closing '}}'?"
	);
}

#[rstest]
#[case::unfinished_expression("{{echo(}}")]
#[case::unfinished_bracket("{{echo[input}}")]
#[case::quoted_after_name("{{echo'input'}}")]
fn invalid_call_syntax(transformer: Transformer, #[case] input: &str) {
	let errors = transform_err(&transformer, input);
	assert_eq!(errors.len(), 1);
	assert!(errors[0].is_syntax());
	assert_eq!(
		errors[0].message,
		"unable to evaluate rule due to invalid syntax"
	);
}

#[rstest]
#[case::bare("{{undefined}}")]
#[case::bracketed("{{undefined[input]}}")]
#[case::expression("{{undefined('input')}}")]
#[case::nested("{{echo(undefined('input'))}}")]
fn name_error(transformer: Transformer, #[case] input: &str) {
	let errors = transform_err(&transformer, input);
	assert_eq!(errors.len(), 1);
	assert!(errors[0].is_name());
	assert!(errors[0].message.contains("`undefined`"));
}

#[rstest]
fn name_error_message(transformer: Transformer) {
	let errors = transform_err(&transformer, "abc\n  {{undefined}}");
	assert_eq!(
		errors[0].range,
		SourceRange::new(SourcePos::new(2, 3), SourcePos::new(2, 16))
	);
	insta::assert_snapshot!(
		errors[0].to_string(),
		@"<string>:2:3 NameError: unrecognised rule name `undefined` in call `undefined`"
	);
}

#[rstest]
#[case::bare("{{error}}", "TypeError")]
#[case::bracketed("{{error[ValueError]}}", "ValueError")]
#[case::expression("{{error('ValueError')}}", "ValueError")]
#[case::nested("{{echo(error('KeyError'))}}", "KeyError")]
fn eval_error(transformer: Transformer, #[case] input: &str, #[case] cause: &str) {
	let errors = transform_err(&transformer, input);
	assert_eq!(errors.len(), 1);
	assert!(errors[0].is_evaluation());

	let Some(example) = errors[0].cause_as::<ExampleError>() else {
		panic!("cause should be preserved: {:?}", errors[0].cause);
	};
	assert_eq!(example.0.as_str(), cause);
}

#[rstest]
fn rule_argument_errors_are_evaluation_errors(transformer: Transformer) {
	let errors = transform_err(&transformer, "{{simple[unexpected]}}");
	assert!(errors[0].is_evaluation());
	assert!(errors[0].cause_as::<ArgumentError>().is_some());
	assert_eq!(
		errors[0].message,
		"an error occurred while evaluating rule `simple`"
	);
}

#[test]
fn panicking_rule_is_an_evaluation_error() {
	let transformer = Transformer::new(
		RuleSet::new()
			.with_fn("explode", |_| panic!("rule exploded"))
			.with_fn("fine", |_| Ok("fine".to_string())),
	);

	let errors = transform_err(&transformer, "{{explode}} {{fine}} {{missing}}");
	assert_eq!(errors.len(), 2);
	assert!(errors[0].is_evaluation());
	assert!(errors[1].is_name());

	let Some(panicked) = errors[0].cause_as::<RulePanicked>() else {
		panic!("expected a panic cause: {:?}", errors[0].cause);
	};
	assert_eq!(panicked.rule.as_str(), "explode");
	assert_eq!(panicked.message.as_str(), "rule exploded");
}

#[rstest]
fn all_errors_reported(transformer: Transformer) {
	let errors = transform_err(&transformer, "{{undefined}} {{error[TypeError]}} {{unclosed");
	let kinds: Vec<TransformErrorKind> = errors.iter().map(|error| error.kind).collect();

	assert_eq!(
		kinds,
		vec![
			TransformErrorKind::Name,
			TransformErrorKind::Evaluation,
			TransformErrorKind::Syntax,
		]
	);
}

#[rstest]
fn errors_respect_position_offset(transformer: Transformer) {
	let options = TransformOptions::new("doc.md").position_offset(SourcePos::new(5, 3));
	let outcome = transformer.transform_with("ab {{undefined}}", &options);
	let errors = outcome.errors();

	assert_eq!(errors.len(), 1);
	assert_eq!(errors[0].document_id, "doc.md");
	assert_eq!(errors[0].range.start, SourcePos::new(5, 6));
}

#[rstest]
fn custom_markers(transformer: Transformer) -> TransdocResult<()> {
	let transformer = transformer.with_syntax(MarkerSyntax::new("<%", "%>")?);
	assert_eq!(
		transform_ok(&transformer, "<%simple%> {{simple}}"),
		"Simple rule {{simple}}"
	);

	let errors = transform_err(&transformer, "<%simple");
	assert_eq!(
		errors[0].message,
		"Unclosed rule call. Did you forget a closing '%>'?"
	);

	Ok(())
}

#[rstest]
fn failed_outcome_converts_to_transdoc_error(transformer: Transformer) {
	let outcome = transformer.transform("{{undefined}}", "<string>");
	let Err(error) = outcome.into_result("<string>") else {
		panic!("expected an error");
	};

	assert_eq!(error.transform_errors().len(), 1);
	insta::assert_snapshot!(error.to_string(), @"1 error(s) occurred while transforming `<string>`");
}

#[rstest]
fn transform_errors_have_diagnostic_codes(transformer: Transformer) {
	let errors = transform_err(&transformer, "{{undefined}} {{error}} {{echo(}}");
	let codes: Vec<String> = errors
		.iter()
		.filter_map(|error| miette::Diagnostic::code(error).map(|code| code.to_string()))
		.collect();

	assert_eq!(
		codes,
		vec![
			"transdoc::name_error",
			"transdoc::evaluation_error",
			"transdoc::syntax_error",
		]
	);
}

#[test]
#[traced_test]
fn logs_each_rule_call() {
	transform_ok(&transformer(), "{{simple}}");
	assert!(logs_contain("evaluating rule call"));
}

// --- Config tests ---

#[test]
fn parse_config_with_every_rule_kind() -> TransdocResult<()> {
	let config = TransdocConfig::parse(
		r#"
indentation = "  "

[markers]
open = "<<"
close = ">>"

[rules]
greeting = "Hello, world!"
version = { command = "echo 1.0.0" }
shout = { template = "{{ args[0] | upper }}!" }
license = { file = "LICENSE" }
docs = { docs_link = "https://example.com" }

[handlers.plaintext]
patterns = ["*.rst"]

[exclude]
patterns = ["target/"]
"#,
	)?;

	assert_eq!(config.indentation, "  ");
	assert_eq!(config.markers.syntax()?, MarkerSyntax::new("<<", ">>")?);
	assert_eq!(
		config.rules.get("greeting"),
		Some(&RuleSource::Text("Hello, world!".into()))
	);
	let kinds: Vec<&str> = config.rules.values().map(RuleSource::kind).collect();
	assert_eq!(kinds, vec!["docs_link", "text", "file", "template", "command"]);
	assert_eq!(config.handlers.plaintext.patterns, vec!["*.rst".to_string()]);
	assert_eq!(config.exclude.patterns, vec!["target/".to_string()]);

	Ok(())
}

#[test]
fn config_defaults() -> TransdocResult<()> {
	let config = TransdocConfig::parse("")?;

	assert_eq!(config.indentation, "");
	assert_eq!(config.markers.syntax()?, MarkerSyntax::default());
	assert!(config.rules.is_empty());
	assert_eq!(
		config.handlers.plaintext.patterns,
		vec!["*.txt".to_string(), "*.md".to_string(), "*.ascii".to_string()]
	);

	Ok(())
}

#[rstest]
#[case::invalid_toml("rules = [")]
#[case::unknown_rule_table("[rules]\nbad = { unknown = 1 }")]
#[case::unknown_section("[unknown]\nkey = 1")]
fn reject_malformed_config(#[case] content: &str) {
	let result = TransdocConfig::parse(content);
	assert!(
		matches!(result, Err(TransdocError::ConfigParse(_))),
		"got {result:?}"
	);
}

#[test]
fn reject_config_markers_and_rule_names() {
	let markers = TransdocConfig::parse("[markers]\nopen = \"%%\"\nclose = \"%%\"");
	assert!(matches!(markers, Err(TransdocError::InvalidMarkers(_))));

	let rule_name = TransdocConfig::parse("[rules]\n\"not a name\" = \"text\"");
	assert!(matches!(rule_name, Err(TransdocError::InvalidRule { .. })));

	let template = TransdocConfig::parse("[rules]\nbroken = { template = \"{{ oops\" }")
		.and_then(|config| project_rules(Some(&config), Path::new(".")));
	assert!(matches!(template, Err(TransdocError::InvalidRule { .. })));
}

#[test]
fn discover_config_files() -> TransdocResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	assert!(TransdocConfig::load(tmp.path())?.is_none());

	write_file(
		&tmp.path().join(".config/transdoc.toml"),
		"indentation = \"\\t\"\n",
	);
	let Some(config) = TransdocConfig::load(tmp.path())? else {
		panic!("config should be discovered");
	};
	assert_eq!(config.indentation, "\t");

	write_file(&tmp.path().join("transdoc.toml"), "indentation = \"  \"\n");
	assert_eq!(
		TransdocConfig::resolve_path(tmp.path()),
		Some(tmp.path().join("transdoc.toml"))
	);

	Ok(())
}

// --- Rule tests ---

fn project_transformer(root: &Path, config: &str) -> Transformer {
	let config = TransdocConfig::parse(config).unwrap_or_else(|e| panic!("config: {e}"));
	let rules = project_rules(Some(&config), root).unwrap_or_else(|e| panic!("rules: {e}"));
	Transformer::new(rules)
}

#[test]
fn file_contents_rule() {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write_file(
		&tmp.path().join("data/example.txt"),
		"Contents of example file\n",
	);
	let transformer = project_transformer(tmp.path(), "");

	assert_eq!(
		transform_ok(&transformer, "{{file_contents[data/example.txt]}}"),
		"Contents of example file"
	);
	assert_eq!(
		transform_ok(&transformer, "{{file_contents('data/example.txt')}}"),
		"Contents of example file"
	);

	let errors = transform_err(&transformer, "{{file_contents[missing.txt]}}");
	assert!(errors[0].is_evaluation());
	assert!(matches!(
		errors[0].cause_as::<RuleFailure>(),
		Some(RuleFailure::ReadFile { .. })
	));
}

#[test]
fn text_template_and_file_rules() {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write_file(&tmp.path().join("LICENSE"), "MIT\n");
	let transformer = project_transformer(
		tmp.path(),
		r#"
[rules]
greeting = "Hello, world!"
shout = { template = "{{ args[0] | upper }}!" }
greet = { template = "Hi {{ kwargs.name }} x{{ kwargs.count }}" }
license = { file = "LICENSE" }
"#,
	);

	assert_eq!(transform_ok(&transformer, "{{greeting}}"), "Hello, world!");
	assert_eq!(transform_ok(&transformer, "{{shout[hey]}}"), "HEY!");
	assert_eq!(
		transform_ok(&transformer, "{{greet(name='Ann', count=2)}}"),
		"Hi Ann x2"
	);
	assert_eq!(transform_ok(&transformer, "{{license}}"), "MIT");

	let errors = transform_err(&transformer, "{{greeting('extra')}}");
	assert!(errors[0].cause_as::<ArgumentError>().is_some());
}

#[cfg(unix)]
#[test]
fn command_rules() {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let transformer = project_transformer(
		tmp.path(),
		r#"
[rules]
version = { command = "echo 1.2.3" }
pair = { command = "echo \"$1-$TRANSDOC_ARG_SUFFIX\"" }
fail = { command = "echo boom >&2; exit 3" }
"#,
	);

	assert_eq!(transform_ok(&transformer, "v{{version}}"), "v1.2.3");
	assert_eq!(
		transform_ok(&transformer, "{{pair('a', suffix='z')}}"),
		"a-z"
	);

	let errors = transform_err(&transformer, "{{fail}}");
	let Some(RuleFailure::Command { reason, .. }) = errors[0].cause_as::<RuleFailure>() else {
		panic!("expected a command failure: {:?}", errors[0].cause);
	};
	assert_eq!(reason.as_str(), "boom");
}

#[rstest]
#[case::default_text("https://example.com", "{{docs[test]}}", "[https://example.com/test](https://example.com/test)")]
#[case::explicit_text("https://example.com", "{{docs('test', 'text')}}", "[text](https://example.com/test)")]
#[case::keyword_text("https://example.com", "{{docs('a/b', text='B')}}", "[B](https://example.com/a/b)")]
#[case::trailing_slash("https://example.com/", "{{docs[test]}}", "[https://example.com/test](https://example.com/test)")]
fn docs_link_rule(#[case] base_url: &str, #[case] input: &str, #[case] expected: &str) {
	let rules = RuleSet::new().with("docs", DocsLinkRule::new("docs", base_url));
	let transformer = Transformer::new(rules);
	assert_eq!(transform_ok(&transformer, input), expected);
}

#[test]
fn docs_link_rule_from_config() {
	let transformer = project_transformer(
		Path::new("."),
		"[rules]\ndocs = { docs_link = \"https://example.com/\" }\n",
	);

	assert_eq!(
		transform_ok(&transformer, "See {{docs('guide', 'the guide')}}."),
		"See [the guide](https://example.com/guide)."
	);

	for input in [
		"{{docs}}",
		"{{docs(1)}}",
		"{{docs('a', 'b', 'c')}}",
		"{{docs('a', title='b')}}",
	] {
		let errors = transform_err(&transformer, input);
		assert!(
			errors[0].cause_as::<ArgumentError>().is_some(),
			"{input}: {:?}",
			errors[0].cause
		);
	}
}

#[test]
fn configured_rules_replace_builtin_rules() -> TransdocResult<()> {
	let config = TransdocConfig::parse("[rules]\nfile_contents = \"overridden\"")?;
	let rules = project_rules(Some(&config), Path::new("."))?;

	assert_eq!(rules.len(), 1);
	assert_eq!(
		transform_ok(&Transformer::new(rules), "{{file_contents}}"),
		"overridden"
	);

	Ok(())
}

// --- Handler tests ---

#[rstest]
#[case::txt("example.txt", true)]
#[case::ascii("in.ascii", true)]
#[case::markdown("README.md", true)]
#[case::nested("docs/guide/intro.md", true)]
#[case::png("image.png", false)]
#[case::no_extension("Makefile", false)]
fn plaintext_handler_matches(#[case] path: &str, #[case] expected: bool) -> TransdocResult<()> {
	let handlers = default_handlers(&TransdocConfig::default())?;
	assert_eq!(handlers[0].matches(Path::new(path)), expected);
	assert_eq!(
		find_matching_handler(&handlers, Path::new(path)).is_some(),
		expected
	);

	Ok(())
}

#[test]
fn invalid_handler_pattern() {
	let result = PlaintextHandler::new(&["[".to_string()], "");
	assert!(matches!(result, Err(TransdocError::InvalidPattern { .. })));
}

#[rstest]
fn transform_file_with_handler(transformer: Transformer) -> TransdocResult<()> {
	let handlers = vec![Box::new(PlaintextHandler::new(&["*.md".to_string()], "  ")?)
		as Box<dyn DocumentHandler>];

	let mut output = Vec::new();
	transform_file(
		&handlers,
		&transformer,
		Path::new("notes.md"),
		&mut "- {{multiline}}".as_bytes(),
		Some(&mut output),
	)?;
	assert_eq!(String::from_utf8_lossy(&output), "- Multiple\n  Lines");

	let mut untouched = Vec::new();
	let result = transform_file(
		&handlers,
		&transformer,
		Path::new("notes.md"),
		&mut "{{undefined}}".as_bytes(),
		Some(&mut untouched),
	);
	assert!(matches!(result, Err(TransdocError::Transform { .. })));
	assert!(untouched.is_empty());

	let missing = transform_file(
		&handlers,
		&transformer,
		Path::new("image.png"),
		&mut "".as_bytes(),
		None,
	);
	assert!(matches!(missing, Err(TransdocError::NoHandler { .. })));

	Ok(())
}

// --- Tree tests ---

#[rstest]
fn transform_tree_transforms_and_copies(transformer: Transformer) -> TransdocResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let input = tmp.path().join("input");
	let output = tmp.path().join("output");
	let binary: &[u8] = &[0, 159, 146, 150, 255];
	write_file(&input.join("a.md"), "A: {{simple}}");
	write_file(&input.join("nested/b.txt"), "B: {{echo[b]}}");
	write_file(&input.join("image.bin"), binary);

	let handlers = default_handlers(&TransdocConfig::default())?;
	let summary = transform_tree(
		&handlers,
		&transformer,
		&input,
		Some(&output),
		&TreeOptions::default(),
	)?;

	assert_eq!(
		summary,
		TreeSummary {
			transformed: 2,
			copied: 1
		}
	);
	assert_eq!(read_file(&output.join("a.md")), "A: Simple rule");
	assert_eq!(read_file(&output.join("nested/b.txt")), "B: b");
	assert_eq!(
		std::fs::read(output.join("image.bin")).unwrap_or_else(|e| panic!("read: {e}")),
		binary
	);

	Ok(())
}

#[rstest]
fn transform_tree_refuses_existing_output(transformer: Transformer) -> TransdocResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let input = tmp.path().join("input");
	let output = tmp.path().join("output");
	write_file(&input.join("a.md"), "{{simple}}");
	write_file(&output.join("stale.md"), "stale");

	let handlers = default_handlers(&TransdocConfig::default())?;
	let result = transform_tree(
		&handlers,
		&transformer,
		&input,
		Some(&output),
		&TreeOptions::default(),
	);
	assert!(matches!(result, Err(TransdocError::OutputExists { .. })));

	let options = TreeOptions {
		force: true,
		..TreeOptions::default()
	};
	transform_tree(&handlers, &transformer, &input, Some(&output), &options)?;
	assert!(!output.join("stale.md").exists());
	assert_eq!(read_file(&output.join("a.md")), "Simple rule");

	Ok(())
}

#[rstest]
#[case::same_directory("input", "input")]
#[case::parent_directory("input/docs", "input")]
#[case::same_file("input/a.md", "input/a.md")]
fn transform_tree_refuses_output_over_input(
	transformer: Transformer,
	#[case] input: &str,
	#[case] output: &str,
) -> TransdocResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write_file(&tmp.path().join("input/a.md"), "{{simple}}");
	write_file(&tmp.path().join("input/docs/b.md"), "{{simple}}");

	let handlers = default_handlers(&TransdocConfig::default())?;
	let options = TreeOptions {
		force: true,
		..TreeOptions::default()
	};
	let result = transform_tree(
		&handlers,
		&transformer,
		&tmp.path().join(input),
		Some(&tmp.path().join(output)),
		&options,
	);

	assert!(
		matches!(result, Err(TransdocError::OutputOverlapsInput { .. })),
		"got {result:?}"
	);
	assert_eq!(read_file(&tmp.path().join("input/a.md")), "{{simple}}");
	assert_eq!(read_file(&tmp.path().join("input/docs/b.md")), "{{simple}}");

	Ok(())
}

#[rstest]
fn transform_tree_collects_file_errors(transformer: Transformer) -> TransdocResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let input = tmp.path().join("input");
	let output = tmp.path().join("output");
	write_file(&input.join("bad.md"), "{{undefined}}\n{{error}}");
	write_file(&input.join("good.md"), "{{simple}}");
	write_file(&input.join("worse.txt"), "{{unclosed");

	let handlers = default_handlers(&TransdocConfig::default())?;
	let result = transform_tree(
		&handlers,
		&transformer,
		&input,
		Some(&output),
		&TreeOptions::default(),
	);

	let Err(error @ TransdocError::Tree { .. }) = result else {
		panic!("expected a tree error");
	};
	assert_eq!(error.transform_errors().len(), 3);
	assert_eq!(read_file(&output.join("good.md")), "Simple rule");
	assert!(!output.join("bad.md").exists());

	Ok(())
}

#[rstest]
fn dry_run_tree_writes_nothing(transformer: Transformer) -> TransdocResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write_file(&tmp.path().join("a.md"), "{{simple}}");
	write_file(&tmp.path().join("b.bin"), "binary");

	let handlers = default_handlers(&TransdocConfig::default())?;
	let summary = transform_tree(
		&handlers,
		&transformer,
		tmp.path(),
		None,
		&TreeOptions::default(),
	)?;

	assert_eq!(
		summary,
		TreeSummary {
			transformed: 1,
			copied: 0
		}
	);
	assert_eq!(read_file(&tmp.path().join("a.md")), "{{simple}}");

	Ok(())
}

#[test]
fn expand_tree_honors_exclusions() -> TransdocResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let input = tmp.path().join("input");
	write_file(&input.join("b.md"), "");
	write_file(&input.join("a.md"), "");
	write_file(&input.join("target/skip.md"), "");
	write_file(&input.join("notes.bin"), "");

	let exclude = vec!["target/".to_string(), "*.bin".to_string()];
	let mappings = expand_tree(&input, Some(Path::new("out")), &exclude)?;
	let pairs: Vec<(String, Option<String>)> = mappings
		.iter()
		.map(|mapping| {
			(
				mapping
					.input
					.strip_prefix(&input)
					.map_or_else(|_| String::new(), |path| path.display().to_string()),
				mapping
					.output
					.as_ref()
					.map(|path| path.display().to_string()),
			)
		})
		.collect();

	assert_eq!(
		pairs,
		vec![
			("a.md".to_string(), Some(Path::new("out").join("a.md").display().to_string())),
			("b.md".to_string(), Some(Path::new("out").join("b.md").display().to_string())),
		]
	);

	let single = expand_tree(&input.join("a.md"), None, &[])?;
	assert_eq!(single.len(), 1);
	assert_eq!(single[0].output, None);

	Ok(())
}

#[cfg(unix)]
#[test]
fn expand_tree_rejects_symlink_cycles() {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let input = tmp.path().join("input");
	write_file(&input.join("a.md"), "");
	std::os::unix::fs::symlink(&input, input.join("loop"))
		.unwrap_or_else(|e| panic!("symlink: {e}"));

	let result = expand_tree(&input, None, &[]);
	assert!(matches!(result, Err(TransdocError::SymlinkCycle { .. })));
}
