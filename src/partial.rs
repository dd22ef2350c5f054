// Partial invocation
// Resolves a named page, builds a fresh scope seeded only with globals and
// the explicit item binding, and recursively renders. Depth is tracked with
// an explicit counter so a self-referential partial chain fails with a
// deterministic error instead of exhausting the stack.

use std::collections::HashMap;

use tracing::debug;

use crate::ast::{BindingMap, Role, DEFAULT_ALIAS};
use crate::evaluator::{EvaluationError, Evaluator};
use crate::template;
use crate::value::Value;

/// Page-source lookup seam. The real virtual file system lives in the
/// host; rendering only needs a synchronous name → text lookup.
pub trait PageLoader: Send + Sync {
    fn load_page(&self, name: &str) -> Option<String>;
}

/// In-memory page store, the default loader.
#[derive(Debug, Default)]
pub struct MemoryPages {
    pages: HashMap<String, String>,
}

impl MemoryPages {
    pub fn new() -> Self {
        MemoryPages::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.pages.insert(name.into(), source.into());
    }
}

impl PageLoader for MemoryPages {
    fn load_page(&self, name: &str) -> Option<String> {
        self.pages.get(name).cloned()
    }
}

/// Alias declared by a page's leading directive comment:
///
/// ```text
/// <!--
/// it: cust
/// -->
/// ```
///
/// Returns the alias (if any) and the page body with the directive block
/// and surrounding leading whitespace stripped. Pages without a directive
/// are returned untouched.
pub(crate) fn parse_directive(source: &str) -> (Option<String>, &str) {
    let trimmed = source.trim_start();
    let Some(after_open) = trimmed.strip_prefix("<!--") else {
        return (None, source);
    };
    let Some(close) = after_open.find("-->") else {
        return (None, source);
    };

    let mut alias = None;
    for line in after_open[..close].lines() {
        if let Some((key, value)) = line.split_once(':') {
            if key.trim() == DEFAULT_ALIAS {
                alias = Some(value.trim().to_string());
            }
        }
    }
    (alias, after_open[close + 3..].trim_start())
}

/// Render page `name` once per item, concatenating results in order.
///
/// Alias precedence: explicit call-site binding map, then the page's own
/// directive, then `it`. The per-item scope chains directly to the globals
/// frame — the caller's `assignTo` locals never leak across the partial
/// boundary.
pub(crate) fn invoke(
    ev: &mut Evaluator<'_>,
    name: &str,
    items: &[Value],
    binding: Option<&BindingMap>,
) -> Result<String, EvaluationError> {
    if ev.partial_depth >= ev.ctx.max_partial_depth {
        return Err(EvaluationError::PartialRecursion {
            name: name.to_string(),
            limit: ev.ctx.max_partial_depth,
        });
    }
    ev.partial_depth += 1;
    let result = invoke_inner(ev, name, items, binding);
    ev.partial_depth -= 1;
    result
}

fn invoke_inner(
    ev: &mut Evaluator<'_>,
    name: &str,
    items: &[Value],
    binding: Option<&BindingMap>,
) -> Result<String, EvaluationError> {
    let source = ev
        .ctx
        .load_page(name)
        .ok_or_else(|| EvaluationError::PageNotFound {
            name: name.to_string(),
        })?;
    let (directive_alias, body) = parse_directive(&source);
    let alias = binding
        .and_then(|b| b.alias(Role::It))
        .or(directive_alias.as_deref())
        .unwrap_or(DEFAULT_ALIAS)
        .to_string();

    debug!(page = name, depth = ev.partial_depth, alias = %alias, "invoking partial");
    let nodes = template::parse_template(body)?;

    let saved_page_frame = ev.page_frame;
    let globals = ev.globals_frame;
    let mut out = String::new();
    let mut result = Ok(());
    for item in items {
        let frame = ev.scopes.child(globals);
        ev.scopes.bind(frame, alias.as_str(), item.clone());
        ev.page_frame = frame;
        match ev.render_nodes(&nodes, frame) {
            Ok(rendered) => out.push_str(&rendered),
            Err(err) => {
                result = Err(err);
                break;
            }
        }
    }
    ev.page_frame = saved_page_frame;
    result.map(|_| out)
}
