//! Resolved expression tree and operator semantics.
//!
//! Names are resolved during parsing: `t` becomes [`Expr::Time`], constants
//! fold to numbers, capabilities become [`Expr::Call`], user functions become
//! [`Expr::Invoke`], and variables and parameters become indices. Evaluation
//! never looks anything up by name.

use crate::math::Builtin;
use std::sync::Arc;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

/// Binary operators with eager operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    /// Operator for a binary token.
    pub(crate) fn from_token(p: &str) -> Option<Self> {
        Some(match p {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            "**" => BinaryOp::Pow,
            "&" => BinaryOp::BitAnd,
            "|" => BinaryOp::BitOr,
            "^" => BinaryOp::BitXor,
            "<<" => BinaryOp::Shl,
            ">>" => BinaryOp::Shr,
            ">>>" => BinaryOp::UShr,
            "==" | "===" => BinaryOp::Eq,
            "!=" | "!==" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            _ => return None,
        })
    }

    /// Operator applied by a compound assignment token (`+=` → `Add`).
    pub(crate) fn from_compound_assign(p: &str) -> Option<Self> {
        p.strip_suffix('=').and_then(Self::from_token).filter(|_| {
            // `==`, `<=`, `>=`, `!=` are comparisons, not compound assignments.
            !matches!(p, "==" | "<=" | ">=" | "!=" | "===" | "!==")
        })
    }

    #[inline]
    pub(crate) fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Rem => a % b,
            BinaryOp::Pow => a.powf(b),
            BinaryOp::BitAnd => f64::from(to_int32(a) & to_int32(b)),
            BinaryOp::BitOr => f64::from(to_int32(a) | to_int32(b)),
            BinaryOp::BitXor => f64::from(to_int32(a) ^ to_int32(b)),
            BinaryOp::Shl => f64::from(to_int32(a).wrapping_shl(shift_count(b))),
            BinaryOp::Shr => f64::from(to_int32(a).wrapping_shr(shift_count(b))),
            BinaryOp::UShr => f64::from(to_uint32(a).wrapping_shr(shift_count(b))),
            BinaryOp::Eq => bool_value(a == b),
            BinaryOp::Ne => bool_value(a != b),
            BinaryOp::Lt => bool_value(a < b),
            BinaryOp::Le => bool_value(a <= b),
            BinaryOp::Gt => bool_value(a > b),
            BinaryOp::Ge => bool_value(a >= b),
        }
    }
}

impl UnaryOp {
    #[inline]
    pub(crate) fn apply(self, a: f64) -> f64 {
        match self {
            UnaryOp::Neg => -a,
            UnaryOp::Plus => a,
            UnaryOp::Not => bool_value(!truthy(a)),
            UnaryOp::BitNot => f64::from(!to_int32(a)),
        }
    }
}

/// Expression node.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Number(f64),
    /// The sample index `t`.
    Time,
    /// Read of a user variable slot.
    Var(usize),
    /// Read of a parameter of the enclosing function.
    Param(usize),
    /// `target = value` or `target op= value`.
    Assign {
        target: Target,
        op: Option<BinaryOp>,
        value: Box<Expr>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// Short-circuit `&&`.
    And(Box<Expr>, Box<Expr>),
    /// Short-circuit `||`.
    Or(Box<Expr>, Box<Expr>),
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// Comma operator: evaluates all, yields the last.
    Sequence(Vec<Expr>),
    Call(Builtin, Box<[Expr]>),
    /// Call of a user function by index.
    Invoke(usize, Box<[Expr]>),
}

/// Storage written by an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    Var(usize),
    Param(usize),
}

/// A user function defined with `name = (a, b = 1) => body`.
///
/// Parameters live in a frame on the evaluation stack. Every other name in
/// the body refers to the formula's globals.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Function {
    pub name: Arc<str>,
    /// Default value expression per parameter, in order.
    pub defaults: Box<[Option<Expr>]>,
    pub body: Expr,
}

impl Function {
    pub(crate) fn param_count(&self) -> usize {
        self.defaults.len()
    }

    /// Arguments a call must supply: up to the last parameter without a default.
    pub(crate) fn required_args(&self) -> usize {
        self.defaults
            .iter()
            .rposition(Option::is_none)
            .map_or(0, |i| i + 1)
    }
}

/// ECMAScript ToInt32: truncate, wrap modulo 2^32. Non-finite maps to 0.
#[inline]
pub fn to_int32(x: f64) -> i32 {
    to_uint32(x) as i32
}

/// ECMAScript ToUint32.
#[inline]
pub fn to_uint32(x: f64) -> u32 {
    if !x.is_finite() {
        return 0;
    }
    let t = x.trunc();
    // Fast path covers every value a sample counter reaches in practice.
    if t.abs() < 9.007_199_254_740_992e15 {
        (t as i64) as u32
    } else {
        t.rem_euclid(4_294_967_296.0) as u32
    }
}

#[inline]
fn shift_count(b: f64) -> u32 {
    to_uint32(b) & 31
}

/// Formula truthiness: non-zero and not NaN.
#[inline]
pub(crate) fn truthy(x: f64) -> bool {
    x != 0.0 && !x.is_nan()
}

#[inline]
fn bool_value(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}
