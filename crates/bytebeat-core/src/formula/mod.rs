//! Formula compilation.
//!
//! Formula text is preprocessed with [`strip_comments`], tokenized, parsed into
//! a resolved expression tree, and evaluated by a small interpreter. Every
//! syntax and name error surfaces from [`Formula::compile`]; evaluation can
//! only fail with an [`EvalError`].
//!
//! ```
//! use bytebeat_core::{Formula, PreciseMath};
//!
//! let formula = Formula::compile("t & 255").unwrap();
//! let mut math = PreciseMath::with_seed(0);
//! let mut vars = formula.variables();
//! assert_eq!(formula.evaluate(300.0, &mut math, &mut vars), Ok(44.0));
//! ```

mod ast;
mod eval;
mod lexer;
mod parser;

pub use ast::{to_int32, to_uint32};
pub use eval::Variables;

use crate::error::{CompileError, EvalError, LoadError};
use crate::math::MathFunctions;
use ast::{Expr, Function};
use std::path::Path;
use std::sync::Arc;

/// Whole-line comment marker.
pub const COMMENT_MARKER: &str = "//";

/// Removes blank lines and lines whose trimmed text starts with `//`.
///
/// Surviving lines are kept verbatim, trailing inline comments included, and
/// rejoined with `\n`.
pub fn strip_comments(source: &str) -> String {
    source
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with(COMMENT_MARKER)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// A compiled formula. Immutable; reloads replace it wholesale.
#[derive(Debug, Clone)]
pub struct Formula {
    source: String,
    program: Expr,
    variable_names: Arc<[Arc<str>]>,
    functions: Box<[Function]>,
}

impl Formula {
    /// Compiles formula text.
    pub fn compile(source: &str) -> Result<Self, CompileError> {
        let source = strip_comments(source);
        if source.is_empty() {
            return Err(CompileError::EmptyFormula);
        }
        let parsed = parser::parse(&source)?;
        Ok(Self {
            source,
            program: parsed.expr,
            variable_names: parsed.variables.into(),
            functions: parsed.functions.into_boxed_slice(),
        })
    }

    /// Reads and compiles a formula file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::compile(&text)?)
    }

    /// The stripped formula text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Length in bytes of the stripped text.
    pub fn len(&self) -> usize {
        self.source.len()
    }

    /// Always false for a compiled formula; provided alongside [`len`](Self::len).
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Number of user variables the formula assigns.
    pub fn variable_count(&self) -> usize {
        self.variable_names.len()
    }

    /// Names of the user variables, in slot order.
    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variable_names.iter().map(|n| &**n)
    }

    /// Names of the functions the formula defines, in definition order.
    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(|f| &*f.name)
    }

    /// Fresh, unassigned variable storage for this formula.
    pub fn variables(&self) -> Variables {
        Variables::new(Arc::clone(&self.variable_names))
    }

    /// Evaluates the formula once.
    ///
    /// `vars` must come from [`variables`](Self::variables) on this formula.
    pub fn evaluate<M: MathFunctions + ?Sized>(
        &self,
        t: f64,
        math: &mut M,
        vars: &mut Variables,
    ) -> Result<f64, EvalError> {
        if vars.len() != self.variable_count() {
            *vars = self.variables();
        }
        eval::Context::new(t, math, vars, &self.functions).eval(&self.program)
    }
}
