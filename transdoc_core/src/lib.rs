//! `transdoc_core` is the core library for the transdoc documentation
//! transformer. It scans text documents for embedded rule calls such as
//! `{{rule}}`, `{{rule[some text]}}` or `{{rule("text", count=2)}}`, invokes
//! the named rule, and splices its result back into the document while
//! preserving indentation.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Document text
//!   → Call scanner (finds `{{ ... }}` markers, non-greedy, no nesting)
//!   → Call parser (classifies each marker as bare, bracketed or expression)
//!   → Rule invoker (resolves the rule in the registry, calls it, indents it)
//!   → Transformer (splices results, collects every error, reports unclosed markers)
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading from `transdoc.toml`, including rule
//!   declarations, marker tokens, handler patterns and exclusions.
//! - [`handler`]: Document handlers which decide which files can be
//!   transformed and how.
//! - [`rules`]: Built-in and configuration-declared rules.
//! - [`tree`]: Transforming whole directory trees into an output location.
//!
//! ## Key Types
//!
//! - [`Transformer`]: Applies the rules of a [`Registry`] to documents.
//! - [`TransformOutcome`]: Either the fully rewritten text or every error
//!   found in the document.
//! - [`TransformError`]: A located syntax, name or evaluation error.
//! - [`SourcePos`] / [`SourceRange`]: 1-indexed row/column positions.
//! - [`RuleSet`]: The default name → rule registry.
//!
//! ## Quick Start
//!
//! ```rust
//! use transdoc_core::RuleArguments;
//! use transdoc_core::RuleSet;
//! use transdoc_core::Transformer;
//!
//! let rules = RuleSet::new().with_fn("greeting", |args: &RuleArguments| {
//! 	args.expect_none("greeting")?;
//! 	Ok("Hello, world!".to_string())
//! });
//! let transformer = Transformer::new(rules);
//!
//! let outcome = transformer.transform("Say: {{greeting}}", "<string>");
//! assert_eq!(outcome.text(), Some("Say: Hello, world!"));
//! ```

pub use error::*;
pub use invoker::*;
pub use parser::*;
pub use position::*;
pub use registry::*;
pub use scanner::*;
pub use transformer::*;

pub mod config;
#[allow(unused_assignments)]
mod error;
pub mod handler;
mod invoker;
pub(crate) mod lexer;
mod parser;
mod position;
mod registry;
pub mod rules;
mod scanner;
pub(crate) mod tokens;
mod transformer;
pub mod tree;

#[cfg(test)]
mod __tests;
