//! Tree-walking evaluator.

use super::ast::{Expr, Function, Target, truthy};
use crate::error::EvalError;
use crate::math::MathFunctions;
use std::sync::Arc;

/// Persistent user variable storage for one formula.
///
/// Values survive across samples so formulas can keep accumulators. A fresh
/// set is created whenever a new formula is swapped in. Function parameters
/// live on a stack kept here too, so its allocation is reused across samples.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: Vec<Option<f64>>,
    names: Arc<[Arc<str>]>,
    stack: Vec<f64>,
}

impl Variables {
    pub(crate) fn new(names: Arc<[Arc<str>]>) -> Self {
        Self {
            values: vec![None; names.len()],
            names,
            stack: Vec::new(),
        }
    }

    /// Number of variable slots.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the formula declares no variables.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Current value of a variable by name, if it has been assigned.
    pub fn get(&self, name: &str) -> Option<f64> {
        let idx = self.names.iter().position(|n| &**n == name)?;
        self.values[idx]
    }

    /// Forgets every assigned value.
    pub fn clear(&mut self) {
        self.values.fill(None);
        self.stack.clear();
    }

    fn read(&self, slot: usize) -> Result<f64, EvalError> {
        self.values[slot].ok_or_else(|| EvalError::Undefined(Arc::clone(&self.names[slot])))
    }
}

/// Evaluation context for one sample.
pub(crate) struct Context<'a, M: MathFunctions + ?Sized> {
    pub t: f64,
    pub math: &'a mut M,
    pub vars: &'a mut Variables,
    pub functions: &'a [Function],
    /// Stack offset of the current function's first parameter.
    pub frame: usize,
}

impl<'a, M: MathFunctions + ?Sized> Context<'a, M> {
    pub(crate) fn new(
        t: f64,
        math: &'a mut M,
        vars: &'a mut Variables,
        functions: &'a [Function],
    ) -> Self {
        Self {
            t,
            math,
            vars,
            functions,
            frame: 0,
        }
    }

    pub(crate) fn eval(&mut self, expr: &Expr) -> Result<f64, EvalError> {
        Ok(match expr {
            Expr::Number(n) => *n,
            Expr::Time => self.t,
            Expr::Var(slot) => self.vars.read(*slot)?,
            Expr::Param(index) => self.vars.stack[self.frame + index],
            Expr::Assign { target, op, value } => {
                let rhs = self.eval(value)?;
                let v = match op {
                    Some(op) => op.apply(self.load(*target)?, rhs),
                    None => rhs,
                };
                match *target {
                    Target::Var(slot) => self.vars.values[slot] = Some(v),
                    Target::Param(index) => self.vars.stack[self.frame + index] = v,
                }
                v
            }
            Expr::Unary(op, operand) => op.apply(self.eval(operand)?),
            Expr::Binary(op, lhs, rhs) => {
                let a = self.eval(lhs)?;
                let b = self.eval(rhs)?;
                op.apply(a, b)
            }
            Expr::And(lhs, rhs) => {
                let a = self.eval(lhs)?;
                if truthy(a) { self.eval(rhs)? } else { a }
            }
            Expr::Or(lhs, rhs) => {
                let a = self.eval(lhs)?;
                if truthy(a) { a } else { self.eval(rhs)? }
            }
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                if truthy(self.eval(cond)?) {
                    self.eval(then)?
                } else {
                    self.eval(otherwise)?
                }
            }
            Expr::Sequence(items) => {
                let mut last = f64::NAN;
                for item in items {
                    last = self.eval(item)?;
                }
                last
            }
            Expr::Call(f, args) => {
                // Every capability takes at most two arguments.
                let mut values = [0.0; 2];
                for (slot, arg) in values.iter_mut().zip(args.iter()) {
                    *slot = self.eval(arg)?;
                }
                self.math.apply(*f, &values[..args.len()])
            }
            Expr::Invoke(index, args) => {
                let functions = self.functions;
                self.invoke(&functions[*index], args)?
            }
        })
    }

    fn load(&self, target: Target) -> Result<f64, EvalError> {
        match target {
            Target::Var(slot) => self.vars.read(slot),
            Target::Param(index) => Ok(self.vars.stack[self.frame + index]),
        }
    }

    /// Pushes a frame of arguments, runs the body, and pops the frame.
    fn invoke(&mut self, function: &Function, args: &[Expr]) -> Result<f64, EvalError> {
        let base = self.vars.stack.len();
        let result = self.invoke_in_frame(function, args, base);
        self.vars.stack.truncate(base);
        result
    }

    fn invoke_in_frame(
        &mut self,
        function: &Function,
        args: &[Expr],
        base: usize,
    ) -> Result<f64, EvalError> {
        // Arguments see the caller's frame; nested calls pop back to `len()`.
        for arg in args {
            let v = self.eval(arg)?;
            self.vars.stack.push(v);
        }
        let caller = std::mem::replace(&mut self.frame, base);
        let result = self.run_body(function, args.len());
        self.frame = caller;
        result
    }

    fn run_body(&mut self, function: &Function, supplied: usize) -> Result<f64, EvalError> {
        for default in &function.defaults[supplied..] {
            let v = match default {
                Some(expr) => self.eval(expr)?,
                None => f64::NAN,
            };
            self.vars.stack.push(v);
        }
        self.eval(&function.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parser::parse;
    use crate::math::{FastMath, PreciseMath};

    fn run_with(src: &str, t: f64, vars: &mut Variables) -> Result<f64, EvalError> {
        let parsed = parse(src).unwrap();
        let mut math = PreciseMath::with_seed(1);
        Context::new(t, &mut math, vars, &parsed.functions).eval(&parsed.expr)
    }

    fn run(src: &str, t: f64) -> f64 {
        let names: Arc<[Arc<str>]> = parse(src).unwrap().variables.into();
        let mut vars = Variables::new(names);
        run_with(src, t, &mut vars).unwrap()
    }

    #[test]
    fn classic_formulas() {
        assert_eq!(run("t & 255", 300.0), 44.0);
        assert_eq!(
            run("t*(t>>5|t>>8)", 1000.0),
            1000.0 * f64::from((1000 >> 5) | (1000 >> 8))
        );
        assert_eq!(
            run("(t*5&t>>7)|(t*3&t>>10)", 4096.0),
            f64::from((4096 * 5 & 4096 >> 7) | (4096 * 3 & 4096 >> 10))
        );
    }

    #[test]
    fn logical_operators_return_deciding_operand() {
        assert_eq!(run("0 || 7", 0.0), 7.0);
        assert_eq!(run("3 || 7", 0.0), 3.0);
        assert_eq!(run("3 && 7", 0.0), 7.0);
        assert_eq!(run("0 && 7", 0.0), 0.0);
    }

    #[test]
    fn short_circuit_skips_side_effects() {
        let src = "x = 1, 0 && (x = 5), x";
        assert_eq!(run(src, 0.0), 1.0);
    }

    #[test]
    fn conditional_selects_branch() {
        assert_eq!(run("t > 4 ? 10 : 20", 5.0), 10.0);
        assert_eq!(run("t > 4 ? 10 : 20", 3.0), 20.0);
    }

    #[test]
    fn sequence_yields_last() {
        assert_eq!(run("1, 2, t", 9.0), 9.0);
    }

    #[test]
    fn variables_persist_across_samples() {
        let src = "acc = (acc || 0) + 1";
        // `acc` is read before its first assignment completes.
        let names: Arc<[Arc<str>]> = parse(src).unwrap().variables.into();
        let mut vars = Variables::new(names);
        assert!(matches!(
            run_with(src, 0.0, &mut vars),
            Err(EvalError::Undefined(ref n)) if &**n == "acc"
        ));

        let src = "acc = t ? acc + 1 : 0";
        let names: Arc<[Arc<str>]> = parse(src).unwrap().variables.into();
        let mut vars = Variables::new(names);
        for t in 0..5 {
            run_with(src, f64::from(t), &mut vars).unwrap();
        }
        assert_eq!(vars.get("acc"), Some(4.0));
        vars.clear();
        assert_eq!(vars.get("acc"), None);
    }

    #[test]
    fn compound_assignment_updates() {
        assert_eq!(run("x = 3, x *= 4, x", 0.0), 12.0);
        assert_eq!(run("x = 1, x <<= 4", 0.0), 16.0);
    }

    #[test]
    fn capabilities_dispatch() {
        assert_eq!(run("floor(2.7) + ceil(0.2)", 0.0), 3.0);
        assert_eq!(run("round(2.5)", 0.0), 3.0);
        assert_eq!(run("round(-2.5)", 0.0), -2.0);
        assert_eq!(run("max(1, t)", 5.0), 5.0);
        assert_eq!(run("pow(3, 2)", 0.0), 9.0);
        assert!((run("sin(PI / 2)", 0.0) - 1.0).abs() < 1e-12);
        let r = run("random()", 0.0);
        assert!((0.0..1.0).contains(&r));
    }

    #[test]
    fn fast_math_context() {
        let parsed = parse("sin(t)").unwrap();
        let mut math = FastMath::new(1024).unwrap();
        let mut vars = Variables::default();
        let v = Context::new(1.0, &mut math, &mut vars, &parsed.functions)
            .eval(&parsed.expr)
            .unwrap();
        assert!((v - 1.0_f64.sin()).abs() <= std::f64::consts::TAU / 1024.0);
    }

    #[test]
    fn user_functions_bind_parameters() {
        assert_eq!(run("mtof = (n) => 440 * 2 ** ((n - 69) / 12), mtof(81)", 0.0), 880.0);
        assert_eq!(run("add = (a, b) => a + b, add(t, 2) * add(1, 1)", 3.0), 10.0);
    }

    #[test]
    fn parameters_shadow_t() {
        let src = "gate = (t, seq) => seq >> (t & 15) & 1, gate(t >> 4, 0b1010)";
        assert_eq!(run(src, 16.0), 1.0);
        assert_eq!(run(src, 32.0), 0.0);
    }

    #[test]
    fn default_parameters_fill_missing_arguments() {
        let src = "scale = (x, k = 4, m = k * 2) => x * k + m, scale(1) + scale(1, 1)";
        assert_eq!(run(src, 0.0), 12.0 + 3.0);
    }

    #[test]
    fn parameter_assignment_is_local() {
        let src = "x = 5, bump = (x) => (x += 10, x), bump(1) + x";
        assert_eq!(run(src, 0.0), 16.0);
    }

    #[test]
    fn body_assignments_write_globals() {
        let src = "kick = (u) => (env = 1 - u, env * 2), kick(0.25) + env";
        assert_eq!(run(src, 0.0), 1.5 + 0.75);
    }

    #[test]
    fn nested_calls_restore_frames() {
        let src = concat!(
            "sq = (x) => x * x, hyp = (a, b) => sqrt(sq(a) + sq(b)),",
            "hyp(sq(1) * 3, 4) + sq(2)"
        );
        assert_eq!(run(src, 0.0), 9.0);

        let names: Arc<[Arc<str>]> = parse(src).unwrap().variables.into();
        let mut vars = Variables::new(names);
        for t in 0..3 {
            run_with(src, f64::from(t), &mut vars).unwrap();
        }
        assert!(vars.stack.is_empty());
    }

    #[test]
    fn failing_call_unwinds_stack() {
        let src = "f = (a) => a + later, g = (b) => f(b) * 2, (t ? (later = 1) : 0) + g(1)";
        let names: Arc<[Arc<str>]> = parse(src).unwrap().variables.into();
        let mut vars = Variables::new(names);
        assert!(matches!(
            run_with(src, 0.0, &mut vars),
            Err(EvalError::Undefined(ref n)) if &**n == "later"
        ));
        assert!(vars.stack.is_empty());
        assert_eq!(run_with(src, 1.0, &mut vars), Ok(5.0));
    }

    #[test]
    fn definition_evaluates_to_nan() {
        assert!(run("f = (x) => x", 0.0).is_nan());
    }

    #[test]
    fn division_by_zero_is_infinite_not_an_error() {
        assert_eq!(run("1/0", 0.0), f64::INFINITY);
    }
}
