//! Abstract Syntax Tree (AST) node types

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

/// An expression node in the AST
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value
    Literal(Value),

    /// `$name` variable reference
    Variable(Arc<str>),

    /// Bare identifier, resolved leniently through the context
    Identifier(Arc<str>),

    /// Unary negation (`-expr`)
    Negate(Box<Expr>),

    /// Logical NOT (`!expr`)
    Not(Box<Expr>),

    /// Binary operation (`left op right`)
    Binary {
        /// Left operand
        left: Box<Expr>,
        /// Operator
        op: BinaryOp,
        /// Right operand
        right: Box<Expr>,
    },

    /// Property access (`object.property`)
    PropertyAccess {
        /// Accessed value
        object: Box<Expr>,
        /// Property name
        property: Arc<str>,
    },

    /// Index access (`array[index]`)
    IndexAccess {
        /// Accessed value
        object: Box<Expr>,
        /// Index expression
        index: Box<Expr>,
    },

    /// Function call (`name(args...)`)
    FunctionCall {
        /// Function name
        name: Arc<str>,
        /// Call arguments
        args: Vec<Expr>,
    },

    /// Pipeline (`value | function(args...)`)
    Pipeline {
        /// Value passed as first argument
        value: Box<Expr>,
        /// Function name
        function: Arc<str>,
        /// Remaining arguments
        args: Vec<Expr>,
    },

    /// `if condition then a else b`
    Conditional {
        /// Condition
        condition: Box<Expr>,
        /// Value when the condition is truthy
        then_expr: Box<Expr>,
        /// Value otherwise
        else_expr: Box<Expr>,
    },

    /// Array literal (`[a, b, ...]`)
    Array(Vec<Expr>),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,

    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,
    RegexMatch,

    And,
    Or,
}

impl BinaryOp {
    /// Source form of the operator
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Power => "**",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::LessThan => "<",
            BinaryOp::GreaterThan => ">",
            BinaryOp::LessEqual => "<=",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::RegexMatch => "=~",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Expr {
    /// Check if this expression is a literal constant
    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Literal(_))
    }

    /// Names of every bare identifier the expression reads.
    ///
    /// For `record.field` only `record` is reported: the root of a property
    /// chain is what the context resolves.
    pub fn referenced_identifiers(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_identifiers(&mut names);
        names
    }

    /// Names of every function the expression calls, pipelines included.
    pub fn called_functions(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.walk(&mut |expr| match expr {
            Expr::FunctionCall { name, .. } => {
                names.insert(name.to_string());
            }
            Expr::Pipeline { function, .. } => {
                names.insert(function.to_string());
            }
            _ => {}
        });
        names
    }

    fn collect_identifiers(&self, names: &mut BTreeSet<String>) {
        self.walk(&mut |expr| {
            if let Expr::Identifier(name) = expr {
                names.insert(name.to_string());
            }
        });
    }

    /// Pre-order traversal over this node and all of its children.
    pub fn walk(&self, visit: &mut dyn FnMut(&Expr)) {
        visit(self);
        match self {
            Expr::Literal(_) | Expr::Variable(_) | Expr::Identifier(_) => {}
            Expr::Negate(inner) | Expr::Not(inner) => inner.walk(visit),
            Expr::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::PropertyAccess { object, .. } => object.walk(visit),
            Expr::IndexAccess { object, index } => {
                object.walk(visit);
                index.walk(visit);
            }
            Expr::FunctionCall { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            Expr::Pipeline { value, args, .. } => {
                value.walk(visit);
                for arg in args {
                    arg.walk(visit);
                }
            }
            Expr::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                condition.walk(visit);
                then_expr.walk(visit);
                else_expr.walk(visit);
            }
            Expr::Array(items) => {
                for item in items {
                    item.walk(visit);
                }
            }
        }
    }
}
