//! Synthesized expression fragments.
//!
//! The backward builder produces these; they carry just enough to print with
//! the minimum parentheses and to feed type inference: the text, a precedence
//! tier, an optional inferred type, and an optional literal or variable
//! identity (the latter marks an lvalue candidate).

use super::types::{Type, VarId};

/// Precedence tiers, loosest binding first. `wrap` compares tiers to decide
/// parenthesization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Or,
    And,
    Not,
    Compare,
    AddSub,
    MulDiv,
    Unary,
    Atom,
}

/// Known literal operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Int(i32),
    Float(f32),
    Bool(bool),
}

impl Literal {
    pub fn as_int(self) -> Option<i32> {
        match self {
            Literal::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_one(self) -> bool {
        match self {
            Literal::Int(v) => v == 1,
            Literal::Float(v) => v == 1.0,
            Literal::Bool(_) => false,
        }
    }

    pub fn is_true(self) -> bool {
        matches!(self, Literal::Bool(true))
    }
}

/// Print a float the way the source grammar writes it: trimmed of a trailing
/// `.0`, otherwise with its decimals.
pub fn format_float(v: f32) -> String {
    if v == v.trunc() && v.abs() < 1e7 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

/// One synthesized fragment.
#[derive(Debug, Clone)]
pub struct Expr {
    pub text: String,
    pub prio: Priority,
    pub ty: Option<Type>,
    /// Set when the fragment is a plain variable read (lvalue candidate).
    pub var: Option<VarId>,
    pub lit: Option<Literal>,
    /// Operand-stack cells the value occupies (3 for coordinates).
    pub width: usize,
    /// Set on the value of a compound assignment: the operator whose left
    /// operand was the implicit self.
    pub compound: Option<&'static str>,
}

impl Expr {
    /// Atomic fragment: literal, variable read, call result.
    pub fn atom(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            prio: Priority::Atom,
            ty: None,
            var: None,
            lit: None,
            width: 1,
            compound: None,
        }
    }

    pub fn with_type(mut self, ty: Type) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn with_var(mut self, var: VarId) -> Self {
        self.var = Some(var);
        self
    }

    pub fn with_lit(mut self, lit: Literal) -> Self {
        self.lit = Some(lit);
        self
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    /// Parenthesize when this fragment binds no tighter than its context.
    ///
    /// The `<=` rule never drops a required parenthesis; for equal tiers on
    /// the left of a left-associative operator it can add a cosmetic pair,
    /// which `wrap_left` avoids.
    pub fn wrap(&self, context: Priority) -> String {
        if self.prio <= context {
            format!("({})", self.text)
        } else {
            self.text.clone()
        }
    }

    /// Left-operand variant: parenthesize only when strictly looser.
    pub fn wrap_left(&self, context: Priority) -> String {
        if self.prio < context {
            format!("({})", self.text)
        } else {
            self.text.clone()
        }
    }

    /// Combine two operands with a binary operator.
    pub fn binary(op: &str, prio: Priority, lhs: &Expr, rhs: &Expr) -> Self {
        Self {
            text: format!("{} {} {}", lhs.wrap_left(prio), op, rhs.wrap(prio)),
            prio,
            ty: None,
            var: None,
            lit: None,
            width: lhs.width.max(rhs.width),
            compound: None,
        }
    }

    /// Prefix a unary operator.
    pub fn unary(op: &str, prio: Priority, operand: &Expr) -> Self {
        Self {
            text: format!("{}{}", op, operand.wrap(prio)),
            prio,
            ty: None,
            var: None,
            lit: None,
            width: operand.width,
            compound: None,
        }
    }
}
