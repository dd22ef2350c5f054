// Expression and pipeline evaluator
// Walks a parsed expression tree against the scope chain, and runs filter
// pipelines strictly left-to-right. A failed stage aborts its pipeline;
// sibling placeholders are unaffected.

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::ast::{BinaryOp, Expr, Placeholder, PipelineStage, TemplateNode};
use crate::parser::ParseError;
use crate::scope::{ScopeArena, ScopeId};
use crate::template;
use crate::value::Value;
use crate::{ErrorPolicy, RenderError, TemplateContext};
use thiserror::Error;

/// Evaluation errors. Each identifies the implicated stage or member and
/// the offending value's kind so the host can decide how to surface it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Unknown filter '{name}'")]
    UnknownFilter { name: String },

    #[error("Filter '{stage}' cannot be applied to a {kind} value")]
    TypeMismatch { stage: String, kind: &'static str },

    #[error("Filter '{stage}' requires an argument")]
    MissingArgument { stage: String },

    #[error("Cannot access member '{member}' of a {kind} value")]
    MissingMember { member: String, kind: &'static str },

    #[error("Cannot compare a {lhs} value with a {rhs} value")]
    IncompatibleComparison { lhs: &'static str, rhs: &'static str },

    #[error("Unknown method '{name}' on a {kind} value")]
    UnknownMethod { name: String, kind: &'static str },

    #[error("Filter '{stage}' cannot parse '{text}' as a date")]
    InvalidDate { stage: String, text: String },

    #[error("Page '{name}' was not found")]
    PageNotFound { name: String },

    #[error("Partial recursion limit of {limit} exceeded while rendering '{name}'")]
    PartialRecursion { name: String, limit: usize },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Evaluator for one render call.
///
/// Owns the scope arena exclusively; nothing here is shared across
/// concurrent renders. The context (registry, globals, pages) is read-only.
pub struct Evaluator<'a> {
    pub(crate) ctx: &'a TemplateContext,
    pub(crate) scopes: ScopeArena,
    pub(crate) globals_frame: ScopeId,
    pub(crate) page_frame: ScopeId,
    pub(crate) partial_depth: usize,
}

impl<'a> Evaluator<'a> {
    /// Set up a render call: globals in the root frame, per-call arguments
    /// in the page frame chained under it.
    pub fn new(ctx: &'a TemplateContext, initial_args: IndexMap<String, Value>) -> Self {
        let mut scopes = ScopeArena::new();
        let globals_frame = scopes.root(ctx.args.clone());
        let page_frame = scopes.child(globals_frame);
        for (name, value) in initial_args {
            scopes.bind(page_frame, name, value);
        }
        Evaluator {
            ctx,
            scopes,
            globals_frame,
            page_frame,
            partial_depth: 0,
        }
    }

    /// Render page text against the current page frame.
    pub fn render_page_text(&mut self, text: &str) -> Result<String, RenderError> {
        debug!(bytes = text.len(), "rendering page text");
        let nodes = template::parse_template(text)?;
        let frame = self.page_frame;
        Ok(self.render_nodes(&nodes, frame)?)
    }

    /// Render parsed nodes against a frame, honoring the error policy:
    /// each placeholder is an independent failure domain.
    pub(crate) fn render_nodes(
        &mut self,
        nodes: &[TemplateNode],
        frame: ScopeId,
    ) -> Result<String, EvaluationError> {
        let mut out = String::new();
        for node in nodes {
            match node {
                TemplateNode::Text(text) => out.push_str(text),
                TemplateNode::Placeholder(ph) => {
                    match self.render_placeholder(ph, frame) {
                        Ok(rendered) => out.push_str(&rendered),
                        Err(err) => match self.ctx.error_policy {
                            ErrorPolicy::Propagate => return Err(err),
                            ErrorPolicy::InlineMarker => {
                                out.push_str(&format!("[error: {}]", err));
                            }
                        },
                    }
                }
            }
        }
        Ok(out)
    }

    fn render_placeholder(
        &mut self,
        ph: &Placeholder,
        frame: ScopeId,
    ) -> Result<String, EvaluationError> {
        let input = self.eval_expr(&ph.source, frame)?;
        let result = self.evaluate_pipeline(&ph.stages, input, frame)?;
        Ok(result.render_text(self.ctx.escape))
    }

    /// Execute pipeline stages left-to-right, each stage's output feeding
    /// the next stage's input. Evaluation never continues past a failed
    /// stage.
    pub fn evaluate_pipeline(
        &mut self,
        stages: &[PipelineStage],
        input: Value,
        frame: ScopeId,
    ) -> Result<Value, EvaluationError> {
        let ctx = self.ctx;
        let mut current = input;
        for stage in stages {
            trace!(stage = %stage.name, "applying filter");
            let filter = ctx
                .filters
                .get(&stage.name)
                .ok_or_else(|| EvaluationError::UnknownFilter {
                    name: stage.name.clone(),
                })?;
            current = filter(self, current, stage, frame)?;
        }
        Ok(current)
    }

    /// Evaluate an expression against a frame. The tree is never mutated;
    /// per-item evaluation re-walks it with a different frame.
    pub fn eval_expr(&self, expr: &Expr, frame: ScopeId) -> Result<Value, EvaluationError> {
        match expr {
            Expr::String(s) => Ok(Value::string(s.as_str())),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Boolean(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),

            // Unresolved names evaluate to null rather than erroring, so
            // predicates over absent bindings filter instead of crash.
            Expr::Identifier(name) => Ok(self
                .scopes
                .lookup(frame, name)
                .cloned()
                .unwrap_or(Value::Null)),

            Expr::Member { base, name } => {
                let base_value = self.eval_expr(base, frame)?;
                base_value
                    .get_member(name)
                    .ok_or_else(|| EvaluationError::MissingMember {
                        member: name.clone(),
                        kind: base_value.kind(),
                    })
            }

            Expr::MethodCall { target, name, args } => {
                let target_value = self.eval_expr(target, frame)?;
                let arg_values = args
                    .iter()
                    .map(|a| self.eval_expr(a, frame))
                    .collect::<Result<Vec<_>, _>>()?;
                call_method(&target_value, name, &arg_values)
            }

            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, frame),
        }
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        frame: ScopeId,
    ) -> Result<Value, EvaluationError> {
        // Short-circuit logical operators on truthiness
        match op {
            BinaryOp::And => {
                let left = self.eval_expr(lhs, frame)?;
                if !left.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                let right = self.eval_expr(rhs, frame)?;
                return Ok(Value::Bool(right.is_truthy()));
            }
            BinaryOp::Or => {
                let left = self.eval_expr(lhs, frame)?;
                if left.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                let right = self.eval_expr(rhs, frame)?;
                return Ok(Value::Bool(right.is_truthy()));
            }
            _ => {}
        }

        let left = self.eval_expr(lhs, frame)?;
        let right = self.eval_expr(rhs, frame)?;

        match op {
            BinaryOp::Equal => Ok(Value::Bool(left == right)),
            BinaryOp::NotEqual => Ok(Value::Bool(left != right)),
            BinaryOp::LessThan
            | BinaryOp::LessThanOrEqual
            | BinaryOp::GreaterThan
            | BinaryOp::GreaterThanOrEqual => {
                let ordering = compare(&left, &right)?;
                let keep = match op {
                    BinaryOp::LessThan => ordering == std::cmp::Ordering::Less,
                    BinaryOp::LessThanOrEqual => ordering != std::cmp::Ordering::Greater,
                    BinaryOp::GreaterThan => ordering == std::cmp::Ordering::Greater,
                    BinaryOp::GreaterThanOrEqual => ordering != std::cmp::Ordering::Less,
                    _ => unreachable!(),
                };
                Ok(Value::Bool(keep))
            }
            BinaryOp::And | BinaryOp::Or => unreachable!(),
        }
    }
}

/// Ordering comparison: numbers with numbers, strings with strings.
fn compare(left: &Value, right: &Value) -> Result<std::cmp::Ordering, EvaluationError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a
            .partial_cmp(b)
            .ok_or(EvaluationError::IncompatibleComparison {
                lhs: "number",
                rhs: "number",
            }),
        _ => match (left.as_str(), right.as_str()) {
            (Some(a), Some(b)) => Ok(a.cmp(b)),
            _ => Err(EvaluationError::IncompatibleComparison {
                lhs: left.kind(),
                rhs: right.kind(),
            }),
        },
    }
}

/// Built-in methods callable on values inside expressions.
fn call_method(target: &Value, name: &str, args: &[Value]) -> Result<Value, EvaluationError> {
    fn str_arg<'v>(name: &str, args: &'v [Value]) -> Result<&'v str, EvaluationError> {
        args.first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| EvaluationError::MissingArgument {
                stage: name.to_string(),
            })
    }

    match target {
        Value::String(_) | Value::Raw(_) => {
            let s = target.as_str().unwrap();
            match name {
                "startsWith" => Ok(Value::Bool(s.starts_with(str_arg(name, args)?))),
                "endsWith" => Ok(Value::Bool(s.ends_with(str_arg(name, args)?))),
                "contains" => Ok(Value::Bool(s.contains(str_arg(name, args)?))),
                "toUpper" => Ok(Value::string(s.to_uppercase())),
                "toLower" => Ok(Value::string(s.to_lowercase())),
                "trim" => Ok(Value::string(s.trim())),
                _ => Err(EvaluationError::UnknownMethod {
                    name: name.to_string(),
                    kind: target.kind(),
                }),
            }
        }
        Value::Array(arr) => match name {
            "contains" => {
                let needle = args.first().ok_or_else(|| EvaluationError::MissingArgument {
                    stage: name.to_string(),
                })?;
                Ok(Value::Bool(arr.iter().any(|v| v == needle)))
            }
            "count" => Ok(Value::from(arr.len())),
            _ => Err(EvaluationError::UnknownMethod {
                name: name.to_string(),
                kind: target.kind(),
            }),
        },
        other => Err(EvaluationError::UnknownMethod {
            name: name.to_string(),
            kind: other.kind(),
        }),
    }
}
