//! Recursive descent parser producing a resolved [`Expr`] tree.
//!
//! ## Grammar
//!
//! ```text
//! sequence       ::= assignment ( ',' assignment )*
//! assignment     ::= IDENT '=' function | IDENT assign_op assignment | conditional
//! function       ::= '(' ( param ( ',' param )* )? ')' '=>' assignment
//! param          ::= IDENT ( '=' assignment )?
//! conditional    ::= logical_or ( '?' assignment ':' assignment )?
//! logical_or     ::= logical_and ( '||' logical_and )*
//! logical_and    ::= bit_or ( '&&' bit_or )*
//! bit_or         ::= bit_xor ( '|' bit_xor )*
//! bit_xor        ::= bit_and ( '^' bit_and )*
//! bit_and        ::= equality ( '&' equality )*
//! equality       ::= relational ( ('==' | '!=' | '===' | '!==') relational )*
//! relational     ::= shift ( ('<' | '<=' | '>' | '>=') shift )*
//! shift          ::= additive ( ('<<' | '>>' | '>>>') additive )*
//! additive       ::= multiplicative ( ('+' | '-') multiplicative )*
//! multiplicative ::= power ( ('*' | '/' | '%') power )*
//! power          ::= unary ( '**' power )?     (no unary operator before '**')
//! unary          ::= ('-' | '+' | '!' | '~') unary | primary
//! primary        ::= NUMBER | IDENT | IDENT '(' args? ')' | '(' sequence ')'
//! ```
//!
//! Identifiers are resolved as they are parsed. Any name that is not a
//! parameter, a function, `t`, a constant, or a capability is interned as a
//! variable slot; after parsing, slots that are never assigned anywhere are
//! reported as [`CompileError::UnknownIdentifier`].
//!
//! Functions are bound when their definition is parsed, so a body can only
//! call functions defined before it and recursion is impossible. Each
//! function records the nesting depth its body reaches, and a call site adds
//! it to its own depth so the evaluator's stack stays within [`MAX_DEPTH`].

use super::ast::{BinaryOp, Expr, Function, Target, UnaryOp};
use super::lexer::{Spanned, Token, tokenize};
use crate::error::CompileError;
use crate::math::Builtin;
use std::sync::Arc;

/// Maximum nesting of recursive constructs and operator chains.
pub(crate) const MAX_DEPTH: usize = 256;

/// Named constants folded at parse time.
const CONSTANTS: &[(&str, f64)] = &[
    ("PI", std::f64::consts::PI),
    ("TAU", std::f64::consts::TAU),
    ("E", std::f64::consts::E),
];

/// A user variable discovered while parsing.
#[derive(Debug)]
struct Slot {
    name: Arc<str>,
    assigned: bool,
    first_use: usize,
}

/// A parsed function and the nesting its body reaches.
#[derive(Debug)]
struct FunctionDef {
    function: Function,
    depth: usize,
}

/// Output of a successful parse.
#[derive(Debug)]
pub(crate) struct Parsed {
    pub expr: Expr,
    /// Variable names, indexed by slot.
    pub variables: Vec<Arc<str>>,
    /// User functions, indexed by [`Expr::Invoke`].
    pub functions: Vec<Function>,
}

/// Binding power of a binary operator token, loosest first. `**` is handled
/// separately because it is right-associative.
fn binary_precedence(p: &str) -> Option<u8> {
    Some(match p {
        "||" => 0,
        "&&" => 1,
        "|" => 2,
        "^" => 3,
        "&" => 4,
        "==" | "!=" | "===" | "!==" => 5,
        "<" | "<=" | ">" | ">=" => 6,
        "<<" | ">>" | ">>>" => 7,
        "+" | "-" => 8,
        "*" | "/" | "%" => 9,
        _ => return None,
    })
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    /// Deepest nesting reached since the last reset.
    peak: usize,
    slots: Vec<Slot>,
    functions: Vec<FunctionDef>,
    /// Parameters in scope while parsing a function.
    params: Option<Vec<Arc<str>>>,
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            peak: 0,
            slots: Vec::new(),
            functions: Vec::new(),
            params: None,
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].token
    }

    fn current_pos(&self) -> usize {
        self.tokens[self.pos].pos
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    /// Consumes the punctuation `p` if it is next.
    fn eat(&mut self, p: &str) -> bool {
        if matches!(self.peek(), Token::Punct(q) if *q == p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, p: &str) -> Result<(), CompileError> {
        if self.eat(p) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected '{p}'")))
        }
    }

    fn unexpected(&self, context: &str) -> CompileError {
        let found = match self.peek() {
            Token::Eof => "end of input".to_string(),
            Token::Number(n) => format!("number {n}"),
            Token::Ident(name) => format!("'{name}'"),
            Token::Punct(p) => format!("'{p}'"),
        };
        CompileError::syntax(self.current_pos(), format!("{context}, found {found}"))
    }

    fn enter(&mut self) -> Result<(), CompileError> {
        self.depth += 1;
        self.peak = self.peak.max(self.depth);
        if self.depth > MAX_DEPTH {
            return Err(CompileError::TooDeep {
                pos: self.current_pos(),
            });
        }
        Ok(())
    }

    fn leave(&mut self, levels: usize) {
        self.depth -= levels;
    }

    fn slot(&mut self, name: &str, pos: usize) -> usize {
        if let Some(i) = self.slots.iter().position(|s| &*s.name == name) {
            return i;
        }
        self.slots.push(Slot {
            name: Arc::from(name),
            assigned: false,
            first_use: pos,
        });
        self.slots.len() - 1
    }

    fn param(&self, name: &str) -> Option<usize> {
        self.params.as_ref()?.iter().position(|p| &**p == name)
    }

    fn function_index(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|d| &*d.function.name == name)
    }

    /// True when the token at `start` opens a parenthesized list followed by `=>`.
    fn arrow_follows(&self, start: usize) -> bool {
        if !matches!(self.tokens.get(start), Some(s) if s.token == Token::Punct("(")) {
            return false;
        }
        let mut open = 0usize;
        for (i, spanned) in self.tokens.iter().enumerate().skip(start) {
            match spanned.token {
                Token::Punct("(") => open += 1,
                Token::Punct(")") => {
                    open -= 1;
                    if open == 0 {
                        let next = self.tokens.get(i + 1).map(|s| &s.token);
                        return next == Some(&Token::Punct("=>"));
                    }
                }
                Token::Eof => return false,
                _ => {}
            }
        }
        false
    }

    /// Entry: the whole token stream as one sequence expression.
    fn parse_program(&mut self) -> Result<Expr, CompileError> {
        if *self.peek() == Token::Eof {
            return Err(CompileError::EmptyFormula);
        }
        let expr = self.parse_sequence()?;
        if *self.peek() != Token::Eof {
            return Err(self.unexpected("expected end of formula"));
        }
        Ok(expr)
    }

    /// `sequence ::= assignment ( ',' assignment )*`
    fn parse_sequence(&mut self) -> Result<Expr, CompileError> {
        let first = self.parse_assignment()?;
        if !matches!(self.peek(), Token::Punct(",")) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(",") {
            items.push(self.parse_assignment()?);
        }
        Ok(Expr::Sequence(items))
    }

    /// `assignment ::= IDENT assign_op assignment | conditional`
    fn parse_assignment(&mut self) -> Result<Expr, CompileError> {
        self.enter()?;
        let result = self.parse_assignment_inner();
        self.leave(1);
        result
    }

    fn parse_assignment_inner(&mut self) -> Result<Expr, CompileError> {
        let (Token::Ident(name), Token::Punct(p)) = (self.peek(), self.peek_at(1)) else {
            return self.parse_conditional();
        };
        let p = *p;
        if p != "=" && BinaryOp::from_compound_assign(p).is_none() {
            return self.parse_conditional();
        }
        let name = name.clone();
        let pos = self.current_pos();
        if p == "=" && self.arrow_follows(self.pos + 2) {
            self.advance();
            self.advance();
            return self.parse_function(&name, pos);
        }

        let op = BinaryOp::from_compound_assign(p);
        let target = match self.param(&name) {
            Some(index) => Target::Param(index),
            None => {
                self.check_assignable(&name, pos)?;
                let slot = self.slot(&name, pos);
                self.slots[slot].assigned = true;
                Target::Var(slot)
            }
        };
        self.advance();
        self.advance();
        let value = self.parse_assignment()?;
        Ok(Expr::Assign {
            target,
            op,
            value: Box::new(value),
        })
    }

    /// Parses a definition after `name =` and registers it. The definition
    /// itself evaluates to NaN.
    fn parse_function(&mut self, name: &str, pos: usize) -> Result<Expr, CompileError> {
        if self.params.is_some() {
            return Err(CompileError::syntax(pos, "functions cannot be defined inside a function"));
        }
        if self.function_index(name).is_some() {
            return Err(CompileError::syntax(pos, format!("'{name}' is already defined")));
        }
        if self.slots.iter().any(|s| &*s.name == name) {
            return Err(CompileError::syntax(pos, format!("'{name}' is already a variable")));
        }
        self.check_assignable(name, pos)?;

        let start = self.depth;
        let outer_peak = std::mem::replace(&mut self.peak, start);
        self.params = Some(Vec::new());
        let parsed = self.parse_function_rest();
        self.params = None;
        let depth = self.peak - start;
        self.peak = outer_peak.max(self.peak);
        let (defaults, body) = parsed?;

        self.functions.push(FunctionDef {
            function: Function {
                name: Arc::from(name),
                defaults: defaults.into_boxed_slice(),
                body,
            },
            depth,
        });
        Ok(Expr::Number(f64::NAN))
    }

    fn parse_function_rest(&mut self) -> Result<(Vec<Option<Expr>>, Expr), CompileError> {
        self.expect("(")?;
        let mut defaults = Vec::new();
        if !self.eat(")") {
            loop {
                let pos = self.current_pos();
                let Token::Ident(param) = self.peek().clone() else {
                    return Err(self.unexpected("expected a parameter name"));
                };
                // Parameters may shadow `t`, nothing else that is reserved.
                if param != "t" {
                    self.check_assignable(&param, pos)?;
                }
                if self.param(&param).is_some() {
                    return Err(CompileError::syntax(pos, format!("duplicate parameter '{param}'")));
                }
                self.advance();
                let default = if self.eat("=") {
                    Some(self.parse_assignment()?)
                } else {
                    None
                };
                defaults.push(default);
                if let Some(params) = &mut self.params {
                    params.push(Arc::from(param.as_str()));
                }
                if self.eat(")") {
                    break;
                }
                self.expect(",")?;
            }
        }
        self.expect("=>")?;
        let body = self.parse_assignment()?;
        Ok((defaults, body))
    }

    fn check_assignable(&self, name: &str, pos: usize) -> Result<(), CompileError> {
        let reserved = name == "t"
            || Builtin::from_name(name).is_some()
            || CONSTANTS.iter().any(|(c, _)| *c == name)
            || self.function_index(name).is_some();
        if reserved {
            Err(CompileError::syntax(pos, format!("cannot assign to '{name}'")))
        } else {
            Ok(())
        }
    }

    /// `conditional ::= logical_or ( '?' assignment ':' assignment )?`
    fn parse_conditional(&mut self) -> Result<Expr, CompileError> {
        let cond = self.parse_binary(0)?;
        if !self.eat("?") {
            return Ok(cond);
        }
        let then = self.parse_assignment()?;
        self.expect(":")?;
        let otherwise = self.parse_assignment()?;
        Ok(Expr::Conditional {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    /// Precedence climbing over [`binary_precedence`], left-associative.
    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_power()?;
        let mut chain = 0;
        loop {
            let Token::Punct(p) = *self.peek() else { break };
            let Some(prec) = binary_precedence(p).filter(|&prec| prec >= min_prec) else {
                break;
            };
            self.advance();
            chain += 1;
            self.enter()?;
            let rhs = self.parse_binary(prec + 1)?;
            lhs = match p {
                "||" => Expr::Or(Box::new(lhs), Box::new(rhs)),
                "&&" => Expr::And(Box::new(lhs), Box::new(rhs)),
                _ => match BinaryOp::from_token(p) {
                    Some(op) => Expr::Binary(op, Box::new(lhs), Box::new(rhs)),
                    None => return Err(CompileError::syntax(self.current_pos(), "bad operator")),
                },
            };
        }
        self.leave(chain);
        Ok(lhs)
    }

    /// `power ::= unary ( '**' power )?`, right-associative.
    fn parse_power(&mut self) -> Result<Expr, CompileError> {
        let unary = matches!(self.peek(), Token::Punct("-" | "+" | "!" | "~"));
        let base = self.parse_unary()?;
        if !matches!(self.peek(), Token::Punct("**")) {
            return Ok(base);
        }
        if unary {
            return Err(CompileError::syntax(
                self.current_pos(),
                "unary operator before '**' must be parenthesized",
            ));
        }
        self.advance();
        self.enter()?;
        let exponent = self.parse_power();
        self.leave(1);
        Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent?)))
    }

    /// `unary ::= ('-' | '+' | '!' | '~') unary | primary`
    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        let op = match self.peek() {
            Token::Punct("-") => Some(UnaryOp::Neg),
            Token::Punct("+") => Some(UnaryOp::Plus),
            Token::Punct("!") => Some(UnaryOp::Not),
            Token::Punct("~") => Some(UnaryOp::BitNot),
            _ => None,
        };
        let Some(op) = op else {
            return self.parse_primary();
        };
        self.advance();
        self.enter()?;
        let operand = self.parse_unary();
        self.leave(1);
        let operand = operand?;
        // Fold negative literals so `-1` stays a constant.
        Ok(match (op, operand) {
            (UnaryOp::Neg, Expr::Number(n)) => Expr::Number(-n),
            (op, operand) => Expr::Unary(op, Box::new(operand)),
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let pos = self.current_pos();
        match self.peek().clone() {
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Token::Punct("(") => {
                self.advance();
                let inner = self.parse_sequence()?;
                self.expect(")")?;
                Ok(inner)
            }
            Token::Ident(name) => {
                self.advance();
                self.resolve_name(&name, pos)
            }
            _ => Err(self.unexpected("expected an expression")),
        }
    }

    fn resolve_name(&mut self, name: &str, pos: usize) -> Result<Expr, CompileError> {
        if let Some(index) = self.param(name) {
            if matches!(self.peek(), Token::Punct("(")) {
                return Err(CompileError::syntax(pos, format!("'{name}' is not a function")));
            }
            return Ok(Expr::Param(index));
        }
        if let Some(index) = self.function_index(name) {
            return self.parse_invoke(index, pos);
        }
        if let Some(builtin) = Builtin::from_name(name) {
            return self.parse_call(builtin, pos);
        }
        if matches!(self.peek(), Token::Punct("(")) {
            return Err(CompileError::syntax(
                pos,
                format!("'{name}' is not a function"),
            ));
        }
        if name == "t" {
            return Ok(Expr::Time);
        }
        if let Some((_, value)) = CONSTANTS.iter().find(|(c, _)| *c == name) {
            return Ok(Expr::Number(*value));
        }
        Ok(Expr::Var(self.slot(name, pos)))
    }

    /// `IDENT '(' ( assignment ( ',' assignment )* )? ')'`
    fn parse_call(&mut self, builtin: Builtin, pos: usize) -> Result<Expr, CompileError> {
        if !self.eat("(") {
            return Err(CompileError::syntax(
                pos,
                format!("'{}' must be called", builtin.name()),
            ));
        }
        let args = self.parse_args()?;
        if args.len() != builtin.arity() {
            return Err(CompileError::ArityMismatch {
                name: builtin.name().to_string(),
                expected: builtin.arity(),
                found: args.len(),
            });
        }
        Ok(Expr::Call(builtin, args.into_boxed_slice()))
    }

    /// A call of a user function. The callee's body depth counts toward the
    /// call site's nesting.
    fn parse_invoke(&mut self, index: usize, pos: usize) -> Result<Expr, CompileError> {
        if !self.eat("(") {
            let name = &self.functions[index].function.name;
            return Err(CompileError::syntax(pos, format!("'{name}' must be called")));
        }
        let args = self.parse_args()?;
        let def = &self.functions[index];
        let required = def.function.required_args();
        let total = def.function.param_count();
        if args.len() < required || args.len() > total {
            return Err(CompileError::ArityMismatch {
                name: def.function.name.to_string(),
                expected: if args.len() < required { required } else { total },
                found: args.len(),
            });
        }
        let reach = self.depth + def.depth;
        if reach > MAX_DEPTH {
            return Err(CompileError::TooDeep { pos });
        }
        self.peak = self.peak.max(reach);
        Ok(Expr::Invoke(index, args.into_boxed_slice()))
    }

    /// `( assignment ( ',' assignment )* )? ')'`, after the opening parenthesis.
    fn parse_args(&mut self) -> Result<Vec<Expr>, CompileError> {
        let mut args = Vec::new();
        if !self.eat(")") {
            loop {
                args.push(self.parse_assignment()?);
                if self.eat(")") {
                    break;
                }
                self.expect(",")?;
            }
        }
        Ok(args)
    }

    fn finish(self, expr: Expr) -> Result<Parsed, CompileError> {
        if let Some(slot) = self.slots.iter().find(|s| !s.assigned) {
            return Err(CompileError::UnknownIdentifier {
                name: slot.name.to_string(),
                pos: slot.first_use,
            });
        }
        Ok(Parsed {
            expr,
            variables: self.slots.into_iter().map(|s| s.name).collect(),
            functions: self.functions.into_iter().map(|d| d.function).collect(),
        })
    }
}

/// Parses stripped formula text into a resolved expression.
pub(crate) fn parse(source: &str) -> Result<Parsed, CompileError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_program()?;
    parser.finish(expr)
}
