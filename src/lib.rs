// pagemill - declarative text templating with filter pipelines
// Licensed under the MIT License

//! # pagemill
//!
//! A declarative text-templating engine whose embedded mini-language applies
//! chained data-query filters to in-memory collections:
//!
//! ```text
//! {{ products | where('it.UnitsInStock = 0') | select('{{ it.productName | raw }} is sold out!\n') }}
//! ```
//!
//! Placeholders are delimited by `{{ ... }}`; stages are separated by `|`;
//! filters accept a fluent call form (`where('expr', { it: 'alias' })`) and a
//! colon form (`where: expr`). Inside expressions `=` means equality.
//!
//! ## Architecture
//!
//! - `parser` - Expression parser (filter-argument text to expression tree)
//! - `template` - Template scanner (page text to placeholders and stages)
//! - `evaluator` - Pipeline and expression evaluator
//! - `filters` - Filter registry and built-in filter implementations
//! - `scope` - Arena-backed scope chain used for variable resolution
//! - `partial` - Named sub-template invocation with recursion guard
//! - `datetime` - Date parsing and format translation for `dateFormat`
//! - `value` - Runtime value with O(1) clone semantics
//!
//! ## Rendering
//!
//! Build a [`TemplateContext`] once, seed it with global arguments and
//! pages, then render as many times as needed. The context is read-only
//! while rendering; each render call owns its scope state exclusively.
//!
//! ```
//! use pagemill::TemplateContext;
//!
//! let mut context = TemplateContext::new();
//! context.set_arg("numbers", serde_json::json!([5, 4, 1, 3, 9, 8, 6, 7, 2, 0]));
//!
//! let out = context
//!     .render_template("{{ numbers | where('it < 5') | select('{{ it }}\n') }}")
//!     .unwrap();
//! assert_eq!(out, "4\n1\n3\n2\n0\n");
//! ```

use indexmap::IndexMap;

pub mod ast;
pub mod datetime;
pub mod evaluator;
pub mod filters;
pub mod parser;
pub mod partial;
pub mod scope;
pub mod template;
pub mod value;

pub use crate::evaluator::{EvaluationError, Evaluator};
pub use crate::filters::{FilterRegistry, DEFAULT_DATE_FORMAT_ARG};
pub use crate::parser::ParseError;
pub use crate::partial::{MemoryPages, PageLoader};
pub use crate::value::{escape_html, EscapeFn, Value};

use thiserror::Error;

/// Partial nesting depth allowed before [`EvaluationError::PartialRecursion`].
pub const DEFAULT_MAX_PARTIAL_DEPTH: usize = 64;

/// Top-level render failure: either the page text did not parse, or a
/// pipeline failed while evaluating.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Eval(#[from] EvaluationError),
}

/// What a failed placeholder does to its page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// The render call returns the error.
    #[default]
    Propagate,
    /// The failed placeholder renders as an inline error marker and the
    /// rest of the page continues; each placeholder is an independent
    /// failure domain.
    InlineMarker,
}

/// Engine configuration and shared state: global arguments, the filter
/// registry, page sources, and render policy.
///
/// Initialize once, render many times. Everything here is read-only during
/// rendering, so a context can be shared by reference across concurrent,
/// independent render calls.
pub struct TemplateContext {
    /// Process-wide arguments visible from every scope's outermost frame.
    pub args: IndexMap<String, Value>,
    pub(crate) filters: FilterRegistry,
    pages: MemoryPages,
    loader: Option<Box<dyn PageLoader>>,
    pub(crate) escape: Option<EscapeFn>,
    pub(crate) error_policy: ErrorPolicy,
    pub(crate) max_partial_depth: usize,
}

impl TemplateContext {
    pub fn new() -> Self {
        TemplateContext {
            args: IndexMap::new(),
            filters: FilterRegistry::with_builtins(),
            pages: MemoryPages::new(),
            loader: None,
            escape: None,
            error_policy: ErrorPolicy::default(),
            max_partial_depth: DEFAULT_MAX_PARTIAL_DEPTH,
        }
    }

    /// Set a global argument, visible to every render.
    pub fn set_arg(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.args.insert(name.into(), value.into());
    }

    /// Store a page source under a name, the in-memory stand-in for the
    /// host's virtual file system.
    pub fn add_page(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.pages.insert(name, source);
    }

    /// Install an additional page loader consulted after in-memory pages.
    pub fn set_loader(&mut self, loader: Box<dyn PageLoader>) {
        self.loader = Some(loader);
    }

    /// Install the output-encoding hook applied to non-raw placeholder
    /// output (for example [`escape_html`]).
    pub fn set_escape(&mut self, escape: EscapeFn) {
        self.escape = Some(escape);
    }

    pub fn set_error_policy(&mut self, policy: ErrorPolicy) {
        self.error_policy = policy;
    }

    pub fn set_max_partial_depth(&mut self, depth: usize) {
        self.max_partial_depth = depth;
    }

    /// Register a custom filter. Registration belongs to context
    /// initialization; rendering only looks filters up.
    pub fn register_filter<F>(&mut self, name: &str, filter: F)
    where
        F: Fn(
                &mut Evaluator<'_>,
                Value,
                &ast::PipelineStage,
                scope::ScopeId,
            ) -> Result<Value, EvaluationError>
            + Send
            + Sync
            + 'static,
    {
        self.filters.register(name, filter);
    }

    /// Render page text against the global arguments.
    pub fn render_template(&self, text: &str) -> Result<String, RenderError> {
        self.render_template_with(text, IndexMap::new())
    }

    /// Render page text with additional per-call arguments bound in the
    /// page frame (partials do not inherit them).
    pub fn render_template_with(
        &self,
        text: &str,
        args: IndexMap<String, Value>,
    ) -> Result<String, RenderError> {
        let mut evaluator = Evaluator::new(self, args);
        evaluator.render_page_text(text)
    }

    /// Render a stored page by name.
    pub fn render_page(&self, name: &str) -> Result<String, RenderError> {
        let source = self
            .load_page(name)
            .ok_or(EvaluationError::PageNotFound {
                name: name.to_string(),
            })
            .map_err(RenderError::Eval)?;
        let (_, body) = partial::parse_directive(&source);
        let mut evaluator = Evaluator::new(self, IndexMap::new());
        evaluator.render_page_text(body)
    }

    /// Resolve a page name to source text: in-memory pages first, then the
    /// installed loader, trying `<name>.html` as a fallback spelling.
    pub(crate) fn load_page(&self, name: &str) -> Option<String> {
        let with_ext = format!("{}.html", name);
        if let Some(source) = self.pages.load_page(name) {
            return Some(source);
        }
        if let Some(source) = self.pages.load_page(&with_ext) {
            return Some(source);
        }
        if let Some(loader) = &self.loader {
            if let Some(source) = loader.load_page(name) {
                return Some(source);
            }
            if let Some(source) = loader.load_page(&with_ext) {
                return Some(source);
            }
        }
        None
    }
}

impl Default for TemplateContext {
    fn default() -> Self {
        Self::new()
    }
}
