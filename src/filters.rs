// Built-in filter implementations and the filter registry
// The registry is built once when the context is initialized and is only
// read during rendering; hosts may add custom filters before the first
// render call.

use std::collections::HashMap;

use crate::ast::PipelineStage;
use crate::datetime;
use crate::evaluator::{EvaluationError, Evaluator};
use crate::parser;
use crate::partial;
use crate::scope::ScopeId;
use crate::template;
use crate::value::Value;

/// Global-argument key consulted by `dateFormat` when the stage has no
/// format argument.
pub const DEFAULT_DATE_FORMAT_ARG: &str = "defaultDateFormat";

/// Filter signature: current pipeline value in, new value out. The stage
/// carries the raw argument text and optional binding map; `frame` is the
/// scope the enclosing pipeline runs in.
pub type FilterFn = Box<
    dyn Fn(&mut Evaluator<'_>, Value, &PipelineStage, ScopeId) -> Result<Value, EvaluationError>
        + Send
        + Sync,
>;

/// Process-wide filter name → implementation table. Read-mostly: populated
/// at context initialization, looked up during rendering.
pub struct FilterRegistry {
    map: HashMap<String, FilterFn>,
}

impl FilterRegistry {
    /// Registry pre-populated with the standard filters.
    pub fn with_builtins() -> Self {
        let mut registry = FilterRegistry {
            map: HashMap::new(),
        };
        registry.register("where", where_filter);
        registry.register("select", select_filter);
        registry.register("assignTo", assign_to_filter);
        registry.register("selectPartial", select_partial_filter);
        registry.register("dateFormat", date_format_filter);
        registry.register("raw", raw_filter);
        registry.register("newLine", new_line_filter);
        registry.register("count", count_filter);
        registry.register("join", join_filter);
        registry.register("upper", upper_filter);
        registry.register("lower", lower_filter);
        registry
    }

    /// Register a filter under `name`, replacing any existing entry.
    pub fn register<F>(&mut self, name: &str, filter: F)
    where
        F: Fn(&mut Evaluator<'_>, Value, &PipelineStage, ScopeId) -> Result<Value, EvaluationError>
            + Send
            + Sync
            + 'static,
    {
        self.map.insert(name.to_string(), Box::new(filter));
    }

    pub(crate) fn get(&self, name: &str) -> Option<&FilterFn> {
        self.map.get(name)
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn require_arg<'s>(stage: &'s PipelineStage) -> Result<&'s str, EvaluationError> {
    stage
        .arg
        .as_deref()
        .ok_or_else(|| EvaluationError::MissingArgument {
            stage: stage.name.clone(),
        })
}

/// Coerce a value to a sequence: arrays pass through, null is empty, any
/// other single item becomes a one-element sequence.
fn to_sequence(value: Value) -> Vec<Value> {
    match value {
        Value::Array(arr) => arr.as_ref().clone(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

// ── Query filters ────────────────────────────────────────────────────────────

/// `where(predicate, [binding])` — keep sequence elements whose predicate
/// is truthy, in original order. Each element is evaluated in its own child
/// frame under the stage's alias.
fn where_filter(
    ev: &mut Evaluator<'_>,
    input: Value,
    stage: &PipelineStage,
    frame: ScopeId,
) -> Result<Value, EvaluationError> {
    let items = match &input {
        Value::Array(arr) => arr.clone(),
        other => {
            return Err(EvaluationError::TypeMismatch {
                stage: stage.name.clone(),
                kind: other.kind(),
            })
        }
    };
    let predicate = parser::parse_expr(require_arg(stage)?)?;
    let alias = stage.item_alias();

    let mut kept = Vec::new();
    for item in items.iter() {
        let child = ev.scopes.child(frame);
        ev.scopes.bind(child, alias, item.clone());
        if ev.eval_expr(&predicate, child)?.is_truthy() {
            kept.push(item.clone());
        }
    }
    Ok(Value::array(kept))
}

/// `select(template, [binding])` — render an inline sub-template once per
/// element and concatenate. The argument is a full mini-template driven by
/// the same machinery as top-level pages.
fn select_filter(
    ev: &mut Evaluator<'_>,
    input: Value,
    stage: &PipelineStage,
    frame: ScopeId,
) -> Result<Value, EvaluationError> {
    let nodes = template::parse_template(require_arg(stage)?)?;
    let alias = stage.item_alias();

    let mut out = String::new();
    for item in to_sequence(input) {
        let child = ev.scopes.child(frame);
        ev.scopes.bind(child, alias, item);
        out.push_str(&ev.render_nodes(&nodes, child)?);
    }
    Ok(Value::raw(out))
}

/// `assignTo(name)` — bind the pipeline value into the enclosing page
/// frame, visible to later stages and later placeholders. Renders nothing.
fn assign_to_filter(
    ev: &mut Evaluator<'_>,
    input: Value,
    stage: &PipelineStage,
    _frame: ScopeId,
) -> Result<Value, EvaluationError> {
    let name = require_arg(stage)?.to_string();
    let page_frame = ev.page_frame;
    ev.scopes.bind(page_frame, name, input);
    Ok(Value::raw(""))
}

/// `selectPartial(pageName, [binding])` — render a named page once per
/// element through the partial invoker.
fn select_partial_filter(
    ev: &mut Evaluator<'_>,
    input: Value,
    stage: &PipelineStage,
    _frame: ScopeId,
) -> Result<Value, EvaluationError> {
    let page_name = require_arg(stage)?;
    let items = to_sequence(input);
    let rendered = partial::invoke(ev, page_name, &items, stage.binding.as_ref())?;
    Ok(Value::raw(rendered))
}

// ── Formatting filters ───────────────────────────────────────────────────────

/// `dateFormat([format])` — format a date-like string. Falls back to the
/// `defaultDateFormat` global argument, then the built-in default.
fn date_format_filter(
    ev: &mut Evaluator<'_>,
    input: Value,
    stage: &PipelineStage,
    frame: ScopeId,
) -> Result<Value, EvaluationError> {
    if input.is_null() {
        return Ok(Value::Null);
    }
    let text = input.as_str().ok_or_else(|| EvaluationError::TypeMismatch {
        stage: stage.name.clone(),
        kind: input.kind(),
    })?;
    let date = datetime::parse_date(text).map_err(|_| EvaluationError::InvalidDate {
        stage: stage.name.clone(),
        text: text.to_string(),
    })?;

    let format = match stage.arg.as_deref() {
        Some(f) => f.to_string(),
        None => ev
            .scopes
            .lookup(frame, DEFAULT_DATE_FORMAT_ARG)
            .and_then(|v| v.as_str())
            .unwrap_or(datetime::DEFAULT_DATE_FORMAT)
            .to_string(),
    };
    Ok(Value::string(datetime::format_date(&date, &format)))
}

/// `raw` — mark the value's text as already encoded so the host escape
/// hook is bypassed.
fn raw_filter(
    _ev: &mut Evaluator<'_>,
    input: Value,
    _stage: &PipelineStage,
    _frame: ScopeId,
) -> Result<Value, EvaluationError> {
    Ok(Value::raw(input.scalar_text()))
}

/// `newLine` — normalize line terminators and guarantee exactly one
/// trailing newline.
fn new_line_filter(
    _ev: &mut Evaluator<'_>,
    input: Value,
    _stage: &PipelineStage,
    _frame: ScopeId,
) -> Result<Value, EvaluationError> {
    let mut text = input.scalar_text().replace("\r\n", "\n");
    if !text.ends_with('\n') {
        text.push('\n');
    }
    Ok(Value::string(text))
}

/// `count` — element count of a sequence, or character count of a string.
fn count_filter(
    _ev: &mut Evaluator<'_>,
    input: Value,
    stage: &PipelineStage,
    _frame: ScopeId,
) -> Result<Value, EvaluationError> {
    match &input {
        Value::Array(arr) => Ok(Value::from(arr.len())),
        Value::String(s) | Value::Raw(s) => Ok(Value::from(s.chars().count())),
        Value::Null => Ok(Value::from(0usize)),
        other => Err(EvaluationError::TypeMismatch {
            stage: stage.name.clone(),
            kind: other.kind(),
        }),
    }
}

/// `join([separator])` — join a sequence's scalar texts; separator
/// defaults to ",".
fn join_filter(
    _ev: &mut Evaluator<'_>,
    input: Value,
    stage: &PipelineStage,
    _frame: ScopeId,
) -> Result<Value, EvaluationError> {
    let arr = input.as_array().ok_or_else(|| EvaluationError::TypeMismatch {
        stage: stage.name.clone(),
        kind: input.kind(),
    })?;
    let sep = stage.arg.as_deref().unwrap_or(",");
    let joined = arr
        .iter()
        .map(|v| v.scalar_text())
        .collect::<Vec<_>>()
        .join(sep);
    Ok(Value::string(joined))
}

fn upper_filter(
    _ev: &mut Evaluator<'_>,
    input: Value,
    _stage: &PipelineStage,
    _frame: ScopeId,
) -> Result<Value, EvaluationError> {
    if input.is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::string(input.scalar_text().to_uppercase()))
}

fn lower_filter(
    _ev: &mut Evaluator<'_>,
    input: Value,
    _stage: &PipelineStage,
    _frame: ScopeId,
) -> Result<Value, EvaluationError> {
    if input.is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::string(input.scalar_text().to_lowercase()))
}
