//! Variogram model formulas
//!
//! A small expression language in one variable `x` (the lag distance) and
//! any number of named coefficients:
//!
//! ```text
//! n + (s - n) * (1 - exp(-(x / r)^2)); n=0; r=250
//! ```
//!
//! Clauses after `;` either seed a coefficient with a numeric start value
//! (`r=250`) or replace every occurrence of the coefficient with another
//! expression (`b=s/r`). Replacement works on parsed identifiers, so `r`
//! inside `sqrt` is never touched. `n=n` is accepted and changes nothing.
//!
//! Operators: `+ - * / ^` (right-associative), unary minus, comparisons
//! `< > =` evaluating to 1 or 0. Functions: `exp ln log sqrt sqr abs sin cos
//! tan asin acos atan atan2 pow min max mod int ifelse gt lt eq pi`.

use geokrig_core::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Exp,
    Ln,
    Log10,
    Sqrt,
    Sqr,
    Abs,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Pow,
    Min,
    Max,
    Mod,
    Int,
    IfElse,
    Gt,
    Lt,
    Eq,
    Pi,
}

impl Func {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "exp" => Func::Exp,
            "ln" => Func::Ln,
            "log" => Func::Log10,
            "sqrt" => Func::Sqrt,
            "sqr" => Func::Sqr,
            "abs" => Func::Abs,
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "asin" => Func::Asin,
            "acos" => Func::Acos,
            "atan" => Func::Atan,
            "atan2" => Func::Atan2,
            "pow" => Func::Pow,
            "min" => Func::Min,
            "max" => Func::Max,
            "mod" => Func::Mod,
            "int" => Func::Int,
            "ifelse" => Func::IfElse,
            "gt" => Func::Gt,
            "lt" => Func::Lt,
            "eq" => Func::Eq,
            "pi" => Func::Pi,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Func::Exp => "exp",
            Func::Ln => "ln",
            Func::Log10 => "log",
            Func::Sqrt => "sqrt",
            Func::Sqr => "sqr",
            Func::Abs => "abs",
            Func::Sin => "sin",
            Func::Cos => "cos",
            Func::Tan => "tan",
            Func::Asin => "asin",
            Func::Acos => "acos",
            Func::Atan => "atan",
            Func::Atan2 => "atan2",
            Func::Pow => "pow",
            Func::Min => "min",
            Func::Max => "max",
            Func::Mod => "mod",
            Func::Int => "int",
            Func::IfElse => "ifelse",
            Func::Gt => "gt",
            Func::Lt => "lt",
            Func::Eq => "eq",
            Func::Pi => "pi",
        }
    }

    fn arity(self) -> usize {
        match self {
            Func::Pi => 0,
            Func::Atan2 | Func::Pow | Func::Min | Func::Max | Func::Mod => 2,
            Func::Gt | Func::Lt | Func::Eq => 2,
            Func::IfElse => 3,
            _ => 1,
        }
    }

    fn apply(self, a: &[f64]) -> f64 {
        let truth = |b: bool| if b { 1.0 } else { 0.0 };
        match self {
            Func::Exp => a[0].exp(),
            Func::Ln => a[0].ln(),
            Func::Log10 => a[0].log10(),
            Func::Sqrt => a[0].sqrt(),
            Func::Sqr => a[0] * a[0],
            Func::Abs => a[0].abs(),
            Func::Sin => a[0].sin(),
            Func::Cos => a[0].cos(),
            Func::Tan => a[0].tan(),
            Func::Asin => a[0].asin(),
            Func::Acos => a[0].acos(),
            Func::Atan => a[0].atan(),
            Func::Atan2 => a[0].atan2(a[1]),
            Func::Pow => a[0].powf(a[1]),
            Func::Min => a[0].min(a[1]),
            Func::Max => a[0].max(a[1]),
            Func::Mod => a[0] % a[1],
            Func::Int => a[0].trunc(),
            Func::IfElse => {
                if a[0] != 0.0 {
                    a[1]
                } else {
                    a[2]
                }
            }
            Func::Gt => truth(a[0] > a[1]),
            Func::Lt => truth(a[0] < a[1]),
            Func::Eq => truth(a[0] == a[1]),
            Func::Pi => std::f64::consts::PI,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Gt,
    Eq,
}

impl BinOp {
    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Pow => "^",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Eq => "=",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinOp::Lt | BinOp::Gt | BinOp::Eq => PREC_CMP,
            BinOp::Add | BinOp::Sub => PREC_ADD,
            BinOp::Mul | BinOp::Div => PREC_MUL,
            BinOp::Pow => PREC_POW,
        }
    }
}

const PREC_CMP: u8 = 1;
const PREC_ADD: u8 = 2;
const PREC_MUL: u8 = 3;
const PREC_UNARY: u8 = 4;
const PREC_POW: u8 = 5;
const PREC_ATOM: u8 = 6;

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Num(f64),
    /// The distance variable `x`
    Var,
    /// Unresolved coefficient name
    Ident(String),
    /// Coefficient by index into the parameter vector
    Param(usize),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

impl Expr {
    fn eval(&self, x: f64, params: &[f64]) -> f64 {
        match self {
            Expr::Num(v) => *v,
            Expr::Var => x,
            Expr::Param(i) => params.get(*i).copied().unwrap_or(f64::NAN),
            Expr::Ident(_) => f64::NAN,
            Expr::Neg(e) => -e.eval(x, params),
            Expr::Binary(op, l, r) => {
                let (a, b) = (l.eval(x, params), r.eval(x, params));
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => a.powf(b),
                    BinOp::Lt => (a < b) as u8 as f64,
                    BinOp::Gt => (a > b) as u8 as f64,
                    BinOp::Eq => (a == b) as u8 as f64,
                }
            }
            Expr::Call(f, args) => {
                let mut values = [0.0; 3];
                for (v, a) in values.iter_mut().zip(args) {
                    *v = a.eval(x, params);
                }
                f.apply(&values[..args.len()])
            }
        }
    }

    /// Replace every `Ident(name)` with `with`.
    fn substitute(&mut self, name: &str, with: &Expr) {
        match self {
            Expr::Ident(id) if id == name => *self = with.clone(),
            Expr::Neg(e) => e.substitute(name, with),
            Expr::Binary(_, l, r) => {
                l.substitute(name, with);
                r.substitute(name, with);
            }
            Expr::Call(_, args) => args.iter_mut().for_each(|a| a.substitute(name, with)),
            _ => {}
        }
    }

    fn collect_idents(&self, out: &mut Vec<String>) {
        match self {
            Expr::Ident(id) => {
                if !out.contains(id) {
                    out.push(id.clone());
                }
            }
            Expr::Neg(e) => e.collect_idents(out),
            Expr::Binary(_, l, r) => {
                l.collect_idents(out);
                r.collect_idents(out);
            }
            Expr::Call(_, args) => args.iter().for_each(|a| a.collect_idents(out)),
            _ => {}
        }
    }

    fn resolve(&mut self, names: &[String]) {
        match self {
            Expr::Ident(id) => {
                if let Some(i) = names.iter().position(|n| n == id) {
                    *self = Expr::Param(i);
                }
            }
            Expr::Neg(e) => e.resolve(names),
            Expr::Binary(_, l, r) => {
                l.resolve(names);
                r.resolve(names);
            }
            Expr::Call(_, args) => args.iter_mut().for_each(|a| a.resolve(names)),
            _ => {}
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Num(v) if *v < 0.0 => PREC_UNARY,
            Expr::Neg(_) => PREC_UNARY,
            Expr::Binary(op, _, _) => op.precedence(),
            _ => PREC_ATOM,
        }
    }
}

/// Renders an expression with coefficient names or values
struct Render<'a> {
    expr: &'a Expr,
    names: &'a [String],
    values: Option<&'a [f64]>,
}

impl Render<'_> {
    fn child<'b>(&'b self, expr: &'b Expr) -> Render<'b> {
        Render {
            expr,
            names: self.names,
            values: self.values,
        }
    }

    fn write(&self, f: &mut fmt::Formatter<'_>, min_prec: u8) -> fmt::Result {
        let prec = match (self.expr, self.values) {
            (Expr::Param(i), Some(v)) if v.get(*i).is_some_and(|v| *v < 0.0) => PREC_UNARY,
            _ => self.expr.precedence(),
        };
        let parens = prec < min_prec;
        if parens {
            write!(f, "(")?;
        }
        match self.expr {
            Expr::Num(v) => write!(f, "{}", v)?,
            Expr::Var => write!(f, "x")?,
            Expr::Ident(id) => write!(f, "{}", id)?,
            Expr::Param(i) => match self.values.and_then(|v| v.get(*i)) {
                Some(v) => write!(f, "{}", v)?,
                None => write!(f, "{}", self.names.get(*i).map_or("?", |s| s.as_str()))?,
            },
            Expr::Neg(e) => {
                write!(f, "-")?;
                self.child(e).write(f, PREC_UNARY)?;
            }
            Expr::Binary(op, l, r) => {
                let p = op.precedence();
                let (lp, rp) = if *op == BinOp::Pow {
                    (p + 1, PREC_UNARY)
                } else {
                    (p, p + 1)
                };
                self.child(l).write(f, lp)?;
                if *op == BinOp::Pow {
                    write!(f, "^")?;
                } else {
                    write!(f, " {} ", op.symbol())?;
                }
                self.child(r).write(f, rp)?;
            }
            Expr::Call(Func::Pi, _) => write!(f, "pi")?,
            Expr::Call(func, args) => {
                write!(f, "{}(", func.name())?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    self.child(a).write(f, 0)?;
                }
                write!(f, ")")?;
            }
        }
        if parens {
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl fmt::Display for Render<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f, 0)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Op(char),
}

struct Lexer<'a> {
    src: &'a str,
    /// Offset of `src` within the full formula text
    base: usize,
}

impl Lexer<'_> {
    fn tokens(&self) -> Result<Vec<(usize, Token)>> {
        let bytes = self.src.as_bytes();
        let mut out = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            let c = bytes[i] as char;
            let start = i;
            if c.is_ascii_whitespace() {
                i += 1;
            } else if c.is_ascii_digit() || c == '.' {
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                    let mut j = i + 1;
                    if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                        j += 1;
                    }
                    if j < bytes.len() && bytes[j].is_ascii_digit() {
                        while j < bytes.len() && bytes[j].is_ascii_digit() {
                            j += 1;
                        }
                        i = j;
                    }
                }
                let text = &self.src[start..i];
                let value = text.parse::<f64>().map_err(|_| Error::Formula {
                    position: self.base + start,
                    message: format!("invalid number '{}'", text),
                })?;
                out.push((self.base + start, Token::Num(value)));
            } else if c.is_ascii_alphabetic() || c == '_' {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                out.push((self.base + start, Token::Ident(self.src[start..i].to_string())));
            } else if "+-*/^(),<>=".contains(c) {
                out.push((self.base + start, Token::Op(c)));
                i += 1;
            } else {
                let ch = self.src[start..].chars().next().unwrap_or(c);
                return Err(Error::Formula {
                    position: self.base + start,
                    message: format!("unexpected character '{}'", ch),
                });
            }
        }
        Ok(out)
    }
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    /// Position reported for errors at end of input
    end: usize,
}

impl Parser {
    fn parse(src: &str, base: usize) -> Result<Expr> {
        let tokens = Lexer { src, base }.tokens()?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: base + src.len(),
        };
        let expr = parser.comparison()?;
        if let Some((at, tok)) = parser.tokens.get(parser.pos) {
            return Err(Error::Formula {
                position: *at,
                message: format!("unexpected {}", describe(tok)),
            });
        }
        Ok(expr)
    }

    fn peek_op(&self) -> Option<char> {
        match self.tokens.get(self.pos) {
            Some((_, Token::Op(c))) => Some(*c),
            _ => None,
        }
    }

    fn error_here(&self, message: impl Into<String>) -> Error {
        Error::Formula {
            position: self.tokens.get(self.pos).map_or(self.end, |(at, _)| *at),
            message: message.into(),
        }
    }

    fn expect(&mut self, op: char) -> Result<()> {
        if self.peek_op() == Some(op) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error_here(format!("expected '{}'", op)))
        }
    }

    fn comparison(&mut self) -> Result<Expr> {
        let mut lhs = self.additive()?;
        while let Some(op) = self.peek_op() {
            let op = match op {
                '<' => BinOp::Lt,
                '>' => BinOp::Gt,
                '=' => BinOp::Eq,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut lhs = self.multiplicative()?;
        while let Some(op) = self.peek_op() {
            let op = match op {
                '+' => BinOp::Add,
                '-' => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.peek_op() {
            let op = match op {
                '*' => BinOp::Mul,
                '/' => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        match self.peek_op() {
            Some('-') => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Some('+') => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.primary()?;
        if self.peek_op() == Some('^') {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr> {
        let Some((at, tok)) = self.tokens.get(self.pos).cloned() else {
            return Err(self.error_here("unexpected end of formula"));
        };
        self.pos += 1;
        match tok {
            Token::Num(v) => Ok(Expr::Num(v)),
            Token::Op('(') => {
                let e = self.comparison()?;
                self.expect(')')?;
                Ok(e)
            }
            Token::Ident(name) => match Func::lookup(&name) {
                Some(func) => self.call(func, at),
                None if self.peek_op() == Some('(') => Err(Error::Formula {
                    position: at,
                    message: format!("unknown function '{}'", name),
                }),
                None if name == "x" => Ok(Expr::Var),
                None => Ok(Expr::Ident(name)),
            },
            tok => Err(Error::Formula {
                position: at,
                message: format!("unexpected {}", describe(&tok)),
            }),
        }
    }

    fn call(&mut self, func: Func, at: usize) -> Result<Expr> {
        let mut args = Vec::new();
        if self.peek_op() == Some('(') {
            self.pos += 1;
            if self.peek_op() == Some(')') {
                self.pos += 1;
            } else {
                loop {
                    args.push(self.comparison()?);
                    match self.peek_op() {
                        Some(',') => self.pos += 1,
                        Some(')') => {
                            self.pos += 1;
                            break;
                        }
                        _ => return Err(self.error_here("expected ',' or ')'")),
                    }
                }
            }
        }
        if args.len() != func.arity() {
            return Err(Error::Formula {
                position: at,
                message: format!(
                    "{}() takes {} argument(s), {} given",
                    func.name(),
                    func.arity(),
                    args.len()
                ),
            });
        }
        Ok(Expr::Call(func, args))
    }
}

fn describe(tok: &Token) -> String {
    match tok {
        Token::Num(v) => format!("number {}", v),
        Token::Ident(s) => format!("name '{}'", s),
        Token::Op(c) => format!("'{}'", c),
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A parsed formula in `x` with named, fittable coefficients.
#[derive(Debug, Clone)]
pub struct Formula {
    source: String,
    expr: Expr,
    /// Coefficient names in alphabetical order
    names: Vec<String>,
    /// Start values given by numeric clauses
    seeds: BTreeMap<String, f64>,
}

impl Formula {
    /// Parse a formula with optional `; name=value` clauses.
    pub fn parse(text: &str) -> Result<Self> {
        let mut segments = text.split(';');
        let head = segments.next().unwrap_or_default();
        if head.trim().is_empty() {
            return Err(Error::Formula {
                position: 0,
                message: "empty formula".into(),
            });
        }
        let mut expr = Parser::parse(head, 0)?;

        let mut seeds = BTreeMap::new();
        let mut offset = head.len() + 1;
        for clause in segments {
            let base = offset;
            offset += clause.len() + 1;
            if clause.trim().is_empty() {
                continue;
            }
            let Some(eq) = clause.find('=') else {
                return Err(Error::Formula {
                    position: base,
                    message: format!("clause '{}' is not of the form name=value", clause.trim()),
                });
            };
            let name = clause[..eq].trim();
            if !is_identifier(name) || name == "x" || Func::lookup(name).is_some() {
                return Err(Error::Formula {
                    position: base,
                    message: format!("'{}' cannot be assigned", name),
                });
            }
            let value = Parser::parse(&clause[eq + 1..], base + eq + 1)?;
            match value {
                Expr::Num(v) => {
                    seeds.insert(name.to_string(), v);
                }
                Expr::Neg(ref inner) if matches!(**inner, Expr::Num(_)) => {
                    if let Expr::Num(v) = **inner {
                        seeds.insert(name.to_string(), -v);
                    }
                }
                Expr::Ident(ref same) if same == name => {}
                value => expr.substitute(name, &value),
            }
        }

        let mut names = Vec::new();
        expr.collect_idents(&mut names);
        names.sort();
        expr.resolve(&names);
        seeds.retain(|k, _| names.contains(k));

        Ok(Self {
            source: text.trim().to_string(),
            expr,
            names,
            seeds,
        })
    }

    /// The text this formula was parsed from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Coefficient names, in the order parameter vectors use
    pub fn parameters(&self) -> &[String] {
        &self.names
    }

    pub fn parameter_count(&self) -> usize {
        self.names.len()
    }

    /// Start value from a numeric clause, if one was given
    pub fn seed(&self, name: &str) -> Option<f64> {
        self.seeds.get(name).copied()
    }

    /// Evaluate at `x` with coefficients in [`parameters`](Self::parameters) order.
    pub fn evaluate(&self, x: f64, params: &[f64]) -> f64 {
        self.expr.eval(x, params)
    }

    /// Expression with coefficient names, no clauses
    pub fn expression(&self) -> String {
        Render {
            expr: &self.expr,
            names: &self.names,
            values: None,
        }
        .to_string()
    }

    /// Expression with `params` substituted for the coefficients
    pub fn expression_with(&self, params: &[f64]) -> String {
        Render {
            expr: &self.expr,
            names: &self.names,
            values: Some(params),
        }
        .to_string()
    }

    /// Text that parses back to this formula with `params` as start values.
    pub fn to_string_with(&self, params: &[f64]) -> String {
        let mut s = self.expression();
        for (name, v) in self.names.iter().zip(params) {
            s.push_str(&format!("; {}={}", name, v));
        }
        s
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression())
    }
}
