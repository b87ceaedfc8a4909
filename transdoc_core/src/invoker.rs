use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;

use crate::Argument;
use crate::ArgumentValue;
use crate::CallExpression;
use crate::InvocationShape;
use crate::Registry;
use crate::RuleArguments;
use crate::RuleError;
use crate::RulePanicked;
use crate::SourceRange;
use crate::TransformError;
use crate::parse_invocation;

/// Indent every line of `text` after the first.
///
/// Each line is right-trimmed and prefixed with `indent`, the lines are
/// joined with `\n` and the result is left-trimmed once, so the first line
/// continues wherever the call marker started.
pub fn indent_by(indent: &str, text: &str) -> String {
	let indented = text
		.lines()
		.map(|line| format!("{indent}{}", line.trim_end()))
		.collect::<Vec<_>>()
		.join("\n");

	indented.trim_start().to_string()
}

/// Evaluate the content of a single call marker against `registry`.
///
/// The text is classified first, so malformed calls are syntax errors even
/// when their rule name is unknown. Every rule name in the call, nested calls
/// included, must resolve before any rule is invoked.
pub fn invoke_call<R: Registry + ?Sized>(
	raw: &str,
	registry: &R,
	document_id: &str,
	range: SourceRange,
	indentation: &str,
) -> Result<String, TransformError> {
	let shape = parse_invocation(raw)
		.map_err(|error| TransformError::syntax(document_id, range, error.to_string()))?;

	let names = match &shape {
		InvocationShape::Bare { name } | InvocationShape::Bracketed { name, .. } => {
			vec![name.as_str()]
		}
		InvocationShape::Expression(call) => call.rule_names(),
	};

	if let Some(missing) = names.into_iter().find(|name| !registry.contains(name)) {
		return Err(TransformError::name(
			document_id,
			range,
			format!("unrecognised rule name `{missing}` in call `{raw}`"),
		));
	}

	let result = match &shape {
		InvocationShape::Bare { name } => invoke_rule(registry, name, &RuleArguments::new()),
		InvocationShape::Bracketed { name, content } => {
			invoke_rule(registry, name, &RuleArguments::text(content.as_str()))
		}
		InvocationShape::Expression(call) => evaluate_call(registry, call),
	};

	result.map(|output| indent_by(indentation, &output)).map_err(|failure| {
		TransformError::evaluation(
			document_id,
			range,
			format!("an error occurred while evaluating rule `{}`", failure.rule),
			failure.cause,
		)
	})
}

/// A rule which returned an error, possibly from inside a nested call.
struct RuleFailure {
	rule: String,
	cause: RuleError,
}

fn invoke_rule<R: Registry + ?Sized>(
	registry: &R,
	name: &str,
	args: &RuleArguments,
) -> Result<String, RuleFailure> {
	tracing::trace!(rule = name, "invoking rule");

	let Some(rule) = registry.lookup(name) else {
		return Err(RuleFailure {
			rule: name.to_string(),
			cause: format!("rule `{name}` is not registered").into(),
		});
	};

	let result = std::panic::catch_unwind(AssertUnwindSafe(|| rule.invoke(args)))
		.unwrap_or_else(|payload| {
			Err(RulePanicked {
				rule: name.to_string(),
				message: panic_message(payload.as_ref()),
			}
			.into())
		});

	result.map_err(|cause| {
		RuleFailure {
			rule: name.to_string(),
			cause,
		}
	})
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		return (*message).to_string();
	}

	if let Some(message) = payload.downcast_ref::<String>() {
		return message.clone();
	}

	"unknown panic payload".to_string()
}

/// Evaluate nested calls left to right, then call the outer rule with their
/// results as string arguments.
fn evaluate_call<R: Registry + ?Sized>(
	registry: &R,
	call: &CallExpression,
) -> Result<String, RuleFailure> {
	let mut args = RuleArguments::new();

	for value in &call.positional {
		args.positional.push(evaluate_value(registry, value)?);
	}

	let mut keyword = BTreeMap::new();

	for (key, value) in &call.keyword {
		keyword.insert(key.clone(), evaluate_value(registry, value)?);
	}

	args.keyword = keyword;
	invoke_rule(registry, &call.name, &args)
}

fn evaluate_value<R: Registry + ?Sized>(
	registry: &R,
	value: &ArgumentValue,
) -> Result<Argument, RuleFailure> {
	match value {
		ArgumentValue::Literal(argument) => Ok(argument.clone()),
		ArgumentValue::Call(call) => evaluate_call(registry, call).map(Argument::String),
	}
}
