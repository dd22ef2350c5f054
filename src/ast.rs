// Expression and pipeline tree definitions
// A parsed tree is immutable; the evaluator re-walks it per item.

/// Expression node types.
///
/// Filter arguments (`where` predicates, comparisons inside them) parse into
/// this tree. `=` is equality, never assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// String literal (e.g. 'WA', "WA")
    String(String),

    /// Number literal
    Number(f64),

    /// Boolean literal
    Boolean(bool),

    /// Null literal
    Null,

    /// Bare identifier — a member-path root resolved through the scope chain
    /// (e.g. `it`, `numbers`, `waCustomers`)
    Identifier(String),

    /// Member access on a base expression (e.g. `it.Orders.Count`)
    Member { base: Box<Expr>, name: String },

    /// Infix binary operation
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    /// Method call on a target value (e.g. `it.CompanyName.startsWith('Lazy')`)
    MethodCall {
        target: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
}

/// Binary operators. `Equal` is spelled `=` in template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    And,
    Or,
}

impl Expr {
    /// Create a string literal node
    pub fn string(s: impl Into<String>) -> Self {
        Expr::String(s.into())
    }

    /// Create a number literal node
    pub fn number(n: f64) -> Self {
        Expr::Number(n)
    }

    /// Create an identifier node
    pub fn identifier(name: impl Into<String>) -> Self {
        Expr::Identifier(name.into())
    }

    /// Create a member-access node
    pub fn member(base: Expr, name: impl Into<String>) -> Self {
        Expr::Member {
            base: Box::new(base),
            name: name.into(),
        }
    }
}

/// Roles a binding map may remap. The set is closed; unknown role names are
/// a parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The current sequence element
    It,
}

impl Role {
    pub fn from_name(name: &str) -> Option<Role> {
        match name {
            "it" => Some(Role::It),
            _ => None,
        }
    }
}

/// Default alias for the current sequence element.
pub const DEFAULT_ALIAS: &str = "it";

/// Ordered role → alias remapping parsed from an object-literal argument
/// such as `{ it: 'product' }`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BindingMap {
    entries: Vec<(Role, String)>,
}

impl BindingMap {
    pub fn new() -> Self {
        BindingMap::default()
    }

    pub fn insert(&mut self, role: Role, alias: impl Into<String>) {
        self.entries.push((role, alias.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Alias bound for a role, if the map remaps it.
    pub fn alias(&self, role: Role) -> Option<&str> {
        self.entries
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, a)| a.as_str())
    }

    /// Alias for the current element, falling back to [`DEFAULT_ALIAS`].
    pub fn item_alias(&self) -> &str {
        self.alias(Role::It).unwrap_or(DEFAULT_ALIAS)
    }
}

/// One `|`-separated segment of a pipeline: filter name, optional raw
/// argument text, optional binding map.
///
/// The argument is kept textual; filters that need an expression or a
/// sub-template parse it when the stage runs (once per pipeline execution).
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStage {
    pub name: String,
    pub arg: Option<String>,
    pub binding: Option<BindingMap>,
    /// Byte offset of the stage within its placeholder, for diagnostics.
    pub offset: usize,
}

impl PipelineStage {
    /// Alias this stage binds the current element under.
    pub fn item_alias(&self) -> &str {
        self.binding
            .as_ref()
            .map(|b| b.item_alias())
            .unwrap_or(DEFAULT_ALIAS)
    }
}

/// A `{{ ... }}` occurrence: the source expression feeding the pipeline plus
/// the ordered filter stages applied to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Placeholder {
    pub source: Expr,
    pub stages: Vec<PipelineStage>,
    /// Byte offset of the placeholder within the page text.
    pub offset: usize,
}

/// A parsed page: literal text interleaved with placeholders.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    Text(String),
    Placeholder(Placeholder),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr_helpers() {
        let e = Expr::member(Expr::identifier("it"), "UnitsInStock");
        match e {
            Expr::Member { base, name } => {
                assert_eq!(*base, Expr::Identifier("it".to_string()));
                assert_eq!(name, "UnitsInStock");
            }
            _ => panic!("expected Member node"),
        }
    }

    #[test]
    fn test_binding_map_alias() {
        let mut map = BindingMap::new();
        assert_eq!(map.item_alias(), "it");

        map.insert(Role::It, "product");
        assert_eq!(map.item_alias(), "product");
        assert_eq!(map.alias(Role::It), Some("product"));
    }

    #[test]
    fn test_role_set_is_closed() {
        assert_eq!(Role::from_name("it"), Some(Role::It));
        assert_eq!(Role::from_name("index"), None);
    }

    #[test]
    fn test_stage_alias_defaults() {
        let stage = PipelineStage {
            name: "where".to_string(),
            arg: Some("it < 5".to_string()),
            binding: None,
            offset: 0,
        };
        assert_eq!(stage.item_alias(), "it");
    }
}
