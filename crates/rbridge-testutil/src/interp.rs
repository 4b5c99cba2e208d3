//! A tiny interpreter for the script subset the bridge emits.
//!
//! Values are numeric arrays with optional matrix dimensions (stored
//! column-major, as the real engine stores them) or character strings.
//! Errors abort the current statement only.

use std::collections::HashMap;
use std::fmt::{self, Write as _};

use chumsky::{input::ValueInput, prelude::*};
use logos::Logos;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Num(NumArray),
    Str(String),
    Null,
}

/// Numbers with optional dimensions; `data` is column-major.
#[derive(Debug, Clone, PartialEq)]
pub struct NumArray {
    pub data: Vec<f64>,
    pub dims: Option<(usize, usize)>,
    pub logical: bool,
}

impl NumArray {
    fn scalar(v: f64) -> Self {
        Self {
            data: vec![v],
            dims: None,
            logical: false,
        }
    }

    fn logical(b: bool) -> Self {
        Self {
            data: vec![if b { 1.0 } else { 0.0 }],
            dims: None,
            logical: true,
        }
    }

    fn vector(data: Vec<f64>) -> Self {
        Self {
            data,
            dims: None,
            logical: false,
        }
    }

    fn shape(&self) -> (usize, usize) {
        self.dims.unwrap_or((self.data.len(), 1))
    }
}

/// Lexer failures; the first one aborts the whole script.
#[derive(Debug, Clone, PartialEq, Default)]
enum LexError {
    #[default]
    UnexpectedCharacter,
    InvalidNumber,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::UnexpectedCharacter => write!(f, "unexpected character"),
            LexError::InvalidNumber => write!(f, "invalid number"),
        }
    }
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexError)]
#[logos(skip r"[ \t\r]+")]
enum Tok {
    // Higher priority than Ident, which also matches `.5`
    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?L?", lex_number, priority = 10)]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?L?", lex_number, priority = 10)]
    Num(f64),

    #[regex(r#""([^"\\]|\\.)*""#, lex_string)]
    #[regex(r"'([^'\\]|\\.)*'", lex_string)]
    Str(String),

    #[regex(r"[A-Za-z_.][A-Za-z0-9_.]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[token("<-")]
    Arrow,

    #[token("%*%")]
    MatMul,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token(",")]
    Comma,

    #[token("=")]
    Equals,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token(";")]
    Semi,

    #[regex(r"#[^\n\r]*", allow_greedy = true)]
    Comment,

    #[token("\n")]
    Newline,
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tok::Num(n) => write!(f, "{n}"),
            Tok::Str(s) => write!(f, "{s:?}"),
            Tok::Ident(name) => f.write_str(name),
            Tok::Arrow => f.write_str("<-"),
            Tok::MatMul => f.write_str("%*%"),
            Tok::LParen => f.write_str("("),
            Tok::RParen => f.write_str(")"),
            Tok::Comma => f.write_str(","),
            Tok::Equals => f.write_str("="),
            Tok::Plus => f.write_str("+"),
            Tok::Minus => f.write_str("-"),
            Tok::Star => f.write_str("*"),
            Tok::Slash => f.write_str("/"),
            Tok::Semi => f.write_str(";"),
            Tok::Newline => f.write_str("newline"),
            Tok::Comment => f.write_str("comment"),
        }
    }
}

/// Numbers may carry the integer suffix `L`.
fn lex_number(lex: &mut logos::Lexer<Tok>) -> Result<f64, LexError> {
    lex.slice()
        .trim_end_matches('L')
        .parse()
        .map_err(|_| LexError::InvalidNumber)
}

/// Strip the quotes and resolve `\n`, `\t` and escaped characters.
fn lex_string(lex: &mut logos::Lexer<Tok>) -> String {
    let raw = lex.slice();
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw[1..raw.len() - 1].chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[derive(Debug, Clone)]
enum Expr {
    Num(f64),
    Str(String),
    Ident(String),
    Neg(Box<Expr>),
    Bin(&'static str, Box<Expr>, Box<Expr>),
    Call(String, Vec<(Option<String>, Expr)>),
}

#[derive(Debug, Clone)]
enum Stmt {
    Assign(String, Expr),
    Eval(Expr),
}

type Span = SimpleSpan;
type Extra<'t> = extra::Err<Rich<'t, Tok, Span>>;

/// Tokenize `src` and cut it into statements at `;` and top-level newlines.
///
/// Newlines inside parentheses are dropped so inline lists may wrap.
fn split_statements(src: &str) -> Result<Vec<Vec<(Tok, Span)>>, String> {
    let mut statements = Vec::new();
    let mut current = Vec::new();
    let mut depth = 0usize;

    for (result, span) in Tok::lexer(src).spanned() {
        let tok = result.map_err(|e| format!("{e} at offset {}", span.start))?;
        match &tok {
            Tok::LParen => depth += 1,
            Tok::RParen => depth = depth.saturating_sub(1),
            Tok::Comment => continue,
            Tok::Newline if depth > 0 => continue,
            Tok::Semi | Tok::Newline => {
                if !current.is_empty() {
                    statements.push(std::mem::take(&mut current));
                }
                depth = 0;
                continue;
            }
            _ => {}
        }
        current.push((tok, Span::from(span)));
    }
    if !current.is_empty() {
        statements.push(current);
    }
    Ok(statements)
}

fn parse_statement(tokens: &[(Tok, Span)]) -> Result<Stmt, String> {
    let end = tokens.last().map_or(0, |(_, span)| span.end);
    let eoi: Span = (end..end).into();
    statement_parser()
        .parse(tokens.map(eoi, |(t, s)| (t, s)))
        .into_result()
        .map_err(|errs| {
            errs.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        })
}

fn statement_parser<'t, I>() -> impl Parser<'t, I, Stmt, Extra<'t>>
where
    I: ValueInput<'t, Token = Tok, Span = Span>,
{
    let ident = select! { Tok::Ident(name) => name };
    let assign = ident
        .then_ignore(just(Tok::Arrow))
        .then(expr_parser())
        .map(|(name, value)| Stmt::Assign(name, value));

    assign
        .or(expr_parser().map(Stmt::Eval))
        .then_ignore(end())
}

/// Arithmetic with the usual precedence; `%*%` binds like `*`.
fn expr_parser<'t, I>() -> impl Parser<'t, I, Expr, Extra<'t>> + Clone
where
    I: ValueInput<'t, Token = Tok, Span = Span>,
{
    recursive(|expr| {
        let ident = select! { Tok::Ident(name) => name };

        let arg = ident
            .clone()
            .then_ignore(just(Tok::Equals))
            .or_not()
            .then(expr.clone());
        let call = ident
            .clone()
            .then(
                arg.separated_by(just(Tok::Comma))
                    .collect::<Vec<_>>()
                    .delimited_by(just(Tok::LParen), just(Tok::RParen)),
            )
            .map(|(name, args)| Expr::Call(name, args));

        let atom = select! {
            Tok::Num(n) => Expr::Num(n),
            Tok::Str(s) => Expr::Str(s),
        }
        .or(call)
        .or(ident.map(Expr::Ident))
        .or(expr.delimited_by(just(Tok::LParen), just(Tok::RParen)));

        let sign = just(Tok::Minus).to(true).or(just(Tok::Plus).to(false));
        let unary = sign
            .repeated()
            .foldr(atom, |negate, e| if negate { Expr::Neg(Box::new(e)) } else { e });

        let product_op = choice((
            just(Tok::Star).to("*"),
            just(Tok::Slash).to("/"),
            just(Tok::MatMul).to("%*%"),
        ));
        let product = unary.clone().foldl(
            product_op.then(unary).repeated(),
            |lhs, (op, rhs)| Expr::Bin(op, Box::new(lhs), Box::new(rhs)),
        );

        let sum_op = just(Tok::Plus).to("+").or(just(Tok::Minus).to("-"));
        product.clone().foldl(
            sum_op.then(product).repeated(),
            |lhs, (op, rhs)| Expr::Bin(op, Box::new(lhs), Box::new(rhs)),
        )
    })
}

/// Interpreter state: the global environment and pending output.
#[derive(Debug, Default)]
pub struct Interpreter {
    pub vars: HashMap<String, Value>,
    /// Complete output lines.
    pub output: Vec<String>,
    /// Output written by `cat` since the last newline.
    partial: String,
    pub errors: Vec<String>,
    pub quit: bool,
    /// Delete files right after `scan` reads them.
    pub unlink_scanned: bool,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every statement in `src`.
    pub fn run(&mut self, src: &str) {
        let statements = match split_statements(src) {
            Ok(statements) => statements,
            Err(e) => {
                self.errors.push(e);
                return;
            }
        };
        for tokens in statements {
            if self.quit {
                return;
            }
            let result = parse_statement(&tokens).and_then(|s| self.exec(s));
            if let Err(e) = result {
                self.errors.push(e);
            }
        }
    }

    fn exec(&mut self, stmt: Stmt) -> Result<(), String> {
        match stmt {
            Stmt::Assign(name, e) => {
                let v = self.eval(&e)?;
                self.vars.insert(name, v);
            }
            Stmt::Eval(e) => {
                self.eval(&e)?;
            }
        }
        Ok(())
    }

    fn emit(&mut self, text: &str) {
        for c in text.chars() {
            if c == '\n' {
                self.output.push(std::mem::take(&mut self.partial));
            } else {
                self.partial.push(c);
            }
        }
    }

    fn num(&mut self, e: &Expr) -> Result<NumArray, String> {
        match self.eval(e)? {
            Value::Num(n) => Ok(n),
            other => Err(format!("non-numeric argument: {other:?}")),
        }
    }

    fn eval(&mut self, e: &Expr) -> Result<Value, String> {
        Ok(match e {
            Expr::Num(n) => Value::Num(NumArray::scalar(*n)),
            Expr::Str(s) => Value::Str(s.clone()),
            Expr::Ident(name) => match name.as_str() {
                "TRUE" | "T" => Value::Num(NumArray::logical(true)),
                "FALSE" | "F" => Value::Num(NumArray::logical(false)),
                "NaN" | "NA" => Value::Num(NumArray::scalar(f64::NAN)),
                "Inf" => Value::Num(NumArray::scalar(f64::INFINITY)),
                "NULL" => Value::Null,
                _ => self
                    .vars
                    .get(name)
                    .cloned()
                    .ok_or_else(|| format!("object '{name}' not found"))?,
            },
            Expr::Neg(inner) => {
                let mut n = self.num(inner)?;
                n.data.iter_mut().for_each(|v| *v = -*v);
                n.logical = false;
                Value::Num(n)
            }
            Expr::Bin(op, l, r) => {
                let l = self.num(l)?;
                let r = self.num(r)?;
                Value::Num(binary(op, &l, &r)?)
            }
            Expr::Call(name, args) => self.call(name, args)?,
        })
    }

    fn arg<'e>(args: &'e [(Option<String>, Expr)], name: &str, pos: usize) -> Option<&'e Expr> {
        args.iter()
            .find(|(n, _)| n.as_deref() == Some(name))
            .or_else(|| args.iter().filter(|(n, _)| n.is_none()).nth(pos))
            .map(|(_, e)| e)
    }

    fn count(&mut self, e: Option<&Expr>) -> Result<Option<usize>, String> {
        match e {
            None => Ok(None),
            Some(e) => {
                let n = self.num(e)?;
                Ok(n.data.first().map(|v| *v as usize))
            }
        }
    }

    fn string_arg(&mut self, args: &[(Option<String>, Expr)]) -> Result<String, String> {
        match Self::arg(args, "", 0).map(|e| self.eval(e)).transpose()? {
            Some(Value::Str(s)) => Ok(s),
            other => Err(format!("expected a string, found {other:?}")),
        }
    }

    fn call(&mut self, name: &str, args: &[(Option<String>, Expr)]) -> Result<Value, String> {
        let first = || Self::arg(args, "x", 0).ok_or_else(|| format!("{name}: missing argument"));
        Ok(match name {
            "c" => {
                let mut data = Vec::new();
                let mut logical = true;
                for (_, e) in args {
                    let n = self.num(e)?;
                    logical &= n.logical;
                    data.extend(n.data);
                }
                Value::Num(NumArray {
                    data,
                    dims: None,
                    logical: logical && !args.is_empty(),
                })
            }
            "numeric" => {
                let n = self.count(Self::arg(args, "length", 0))?.unwrap_or(0);
                Value::Num(NumArray::vector(vec![0.0; n]))
            }
            "matrix" => {
                let data = match Self::arg(args, "data", 0) {
                    Some(e) => self.num(e)?,
                    None => NumArray::scalar(f64::NAN),
                };
                let nrow = self.count(Self::arg(args, "nrow", 1))?;
                let ncol = self.count(Self::arg(args, "ncol", 2))?;
                let len = data.data.len().max(1);
                let (rows, cols) = match (nrow, ncol) {
                    (Some(r), Some(c)) => (r, c),
                    (Some(r), None) => (r, len.div_ceil(r.max(1))),
                    (None, Some(c)) => (len.div_ceil(c.max(1)), c),
                    (None, None) => (len, 1),
                };
                let byrow = match Self::arg(args, "byrow", 3) {
                    Some(e) => self.num(e)?.data.first().is_some_and(|v| *v != 0.0),
                    None => false,
                };
                let mut out = vec![0.0; rows * cols];
                for (k, slot) in out.iter_mut().enumerate() {
                    let (r, c) = (k % rows.max(1), k / rows.max(1));
                    let src = if byrow { r * cols + c } else { k };
                    *slot = data.data.get(src % len).copied().unwrap_or(f64::NAN);
                }
                Value::Num(NumArray {
                    data: out,
                    dims: Some((rows, cols)),
                    logical: data.logical,
                })
            }
            "scan" => {
                let path = self.string_arg(args)?;
                let n = self.count(Self::arg(args, "n", 5))?;
                let text = std::fs::read_to_string(&path).map_err(|e| format!("cannot open file '{path}': {e}"))?;
                if self.unlink_scanned {
                    std::fs::remove_file(&path).map_err(|e| format!("cannot remove file '{path}': {e}"))?;
                }
                let mut data = Vec::new();
                for token in text.split_whitespace() {
                    if n.is_some_and(|n| data.len() >= n) {
                        break;
                    }
                    data.push(parse_token(token).ok_or_else(|| format!("scan() expected 'a real', got '{token}'"))?);
                }
                Value::Num(NumArray::vector(data))
            }
            "t" => {
                let n = self.num(first()?)?;
                let (rows, cols) = n.dims.unwrap_or((1, n.data.len()));
                let (rows, cols) = if n.dims.is_none() { (cols, rows) } else { (rows, cols) };
                let mut data = vec![0.0; n.data.len()];
                for r in 0..rows {
                    for c in 0..cols {
                        data[c + r * cols] = n.data[r + c * rows];
                    }
                }
                Value::Num(NumArray {
                    data,
                    dims: Some((cols, rows)),
                    logical: n.logical,
                })
            }
            "as.double" | "as.numeric" => {
                let mut n = self.num(first()?)?;
                n.logical = false;
                Value::Num(n)
            }
            "sum" => {
                let mut total = 0.0;
                for (_, e) in args {
                    total += self.num(e)?.data.iter().sum::<f64>();
                }
                Value::Num(NumArray::scalar(total))
            }
            "mean" => {
                let n = self.num(first()?)?;
                let mean = n.data.iter().sum::<f64>() / n.data.len() as f64;
                Value::Num(NumArray::scalar(mean))
            }
            "length" => {
                let len = match self.eval(first()?)? {
                    Value::Num(n) => n.data.len(),
                    Value::Str(_) => 1,
                    Value::Null => 0,
                };
                Value::Num(NumArray::scalar(len as f64))
            }
            "det" => {
                let n = self.num(first()?)?;
                Value::Num(NumArray::scalar(determinant(&n)?))
            }
            "solve" => {
                let n = self.num(first()?)?;
                Value::Num(inverse(&n)?)
            }
            "exists" => {
                let name = self.string_arg(args)?;
                let found = self.vars.contains_key(&name);
                self.print(&Value::Num(NumArray::logical(found)));
                Value::Num(NumArray::logical(found))
            }
            "rm" => {
                for (_, e) in args {
                    let key = match e {
                        Expr::Str(s) | Expr::Ident(s) => s.clone(),
                        other => return Err(format!("rm: bad argument {other:?}")),
                    };
                    if self.vars.remove(&key).is_none() {
                        self.errors.push(format!("object '{key}' not found"));
                    }
                }
                Value::Null
            }
            "cat" => {
                let mut parts = Vec::new();
                for (_, e) in args {
                    match self.eval(e)? {
                        Value::Str(s) => parts.push(s),
                        Value::Num(n) => parts.extend(n.data.iter().map(|v| format_number(*v, n.logical))),
                        Value::Null => {}
                    }
                }
                let text = parts.join(" ");
                self.emit(&text);
                Value::Null
            }
            "print" => {
                let v = self.eval(first()?)?;
                self.print(&v);
                v
            }
            "write.table" => {
                let n = self.num(first()?)?;
                let (rows, cols) = n.shape();
                for r in 0..rows {
                    let mut line = String::new();
                    for c in 0..cols {
                        if c > 0 {
                            line.push(' ');
                        }
                        line.push_str(&format_number(n.data[r + c * rows], n.logical));
                    }
                    line.push('\n');
                    self.emit(&line);
                }
                Value::Null
            }
            "options" | "invisible" | "set.seed" => Value::Null,
            "q" | "quit" => {
                self.quit = true;
                Value::Null
            }
            _ => return Err(format!("could not find function \"{name}\"")),
        })
    }

    fn print(&mut self, v: &Value) {
        let line = match v {
            Value::Str(s) => format!("[1] \"{s}\"\n"),
            Value::Null => "NULL\n".to_string(),
            Value::Num(n) => {
                let mut line = String::from("[1]");
                for v in &n.data {
                    let _ = write!(line, " {}", format_number(*v, n.logical));
                }
                line.push('\n');
                line
            }
        };
        self.emit(&line);
    }
}

/// Element-wise arithmetic with recycling, or a matrix product.
fn binary(op: &str, l: &NumArray, r: &NumArray) -> Result<NumArray, String> {
    if op == "%*%" {
        return matmul(l, r);
    }
    let len = if l.data.is_empty() || r.data.is_empty() {
        0
    } else {
        l.data.len().max(r.data.len())
    };
    let data = (0..len)
        .map(|i| {
            let (a, b) = (l.data[i % l.data.len()], r.data[i % r.data.len()]);
            match op {
                "+" => a + b,
                "-" => a - b,
                "*" => a * b,
                _ => a / b,
            }
        })
        .collect();
    Ok(NumArray {
        data,
        dims: l.dims.or(r.dims),
        logical: false,
    })
}

fn matmul(l: &NumArray, r: &NumArray) -> Result<NumArray, String> {
    let (lr, lc) = l.dims.unwrap_or((1, l.data.len()));
    let (rr, rc) = r.dims.unwrap_or((r.data.len(), 1));
    if lc != rr {
        return Err("non-conformable arguments".to_string());
    }
    let mut data = vec![0.0; lr * rc];
    for i in 0..lr {
        for j in 0..rc {
            data[i + j * lr] = (0..lc).map(|k| l.data[i + k * lr] * r.data[k + j * rr]).sum();
        }
    }
    Ok(NumArray {
        data,
        dims: Some((lr, rc)),
        logical: false,
    })
}

fn square(n: &NumArray) -> Result<(usize, Vec<Vec<f64>>), String> {
    let (rows, cols) = n.dims.ok_or("argument is not a matrix")?;
    if rows != cols {
        return Err("matrix must be square".to_string());
    }
    let a = (0..rows)
        .map(|r| (0..cols).map(|c| n.data[r + c * rows]).collect())
        .collect();
    Ok((rows, a))
}

fn determinant(n: &NumArray) -> Result<f64, String> {
    let (size, mut a) = square(n)?;
    let mut det = 1.0;
    for col in 0..size {
        let pivot = (col..size)
            .max_by(|&x, &y| a[x][col].abs().total_cmp(&a[y][col].abs()))
            .unwrap_or(col);
        if a[pivot][col] == 0.0 {
            return Ok(0.0);
        }
        if pivot != col {
            a.swap(pivot, col);
            det = -det;
        }
        det *= a[col][col];
        for row in col + 1..size {
            let f = a[row][col] / a[col][col];
            for k in col..size {
                a[row][k] -= f * a[col][k];
            }
        }
    }
    Ok(det)
}

fn inverse(n: &NumArray) -> Result<NumArray, String> {
    let (size, mut a) = square(n)?;
    let mut inv: Vec<Vec<f64>> = (0..size)
        .map(|r| (0..size).map(|c| if r == c { 1.0 } else { 0.0 }).collect())
        .collect();
    for col in 0..size {
        let pivot = (col..size)
            .max_by(|&x, &y| a[x][col].abs().total_cmp(&a[y][col].abs()))
            .unwrap_or(col);
        if a[pivot][col] == 0.0 {
            return Err("Lapack routine dgesv: system is exactly singular".to_string());
        }
        a.swap(pivot, col);
        inv.swap(pivot, col);
        let p = a[col][col];
        for k in 0..size {
            a[col][k] /= p;
            inv[col][k] /= p;
        }
        for row in 0..size {
            if row != col {
                let f = a[row][col];
                for k in 0..size {
                    a[row][k] -= f * a[col][k];
                    inv[row][k] -= f * inv[col][k];
                }
            }
        }
    }
    let mut data = vec![0.0; size * size];
    for r in 0..size {
        for c in 0..size {
            data[r + c * size] = inv[r][c];
        }
    }
    Ok(NumArray {
        data,
        dims: Some((size, size)),
        logical: false,
    })
}

fn parse_token(token: &str) -> Option<f64> {
    match token {
        "TRUE" | "T" => Some(1.0),
        "FALSE" | "F" => Some(0.0),
        "NaN" | "NA" => Some(f64::NAN),
        "Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        other => other.parse().ok(),
    }
}

/// Format a number the way the engine prints it at full precision.
pub fn format_number(v: f64, logical: bool) -> String {
    if logical {
        return if v != 0.0 { "TRUE" } else { "FALSE" }.to_string();
    }
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "Inf" } else { "-Inf" }.to_string()
    } else if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else if v != 0.0 && (v.abs() >= 1e15 || v.abs() < 1e-4) {
        format!("{:e}", v)
    } else {
        format!("{}", v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> Interpreter {
        let mut i = Interpreter::new();
        i.run(src);
        assert!(i.errors.is_empty(), "{:?}", i.errors);
        i
    }

    #[test]
    fn assign_and_cat() {
        let i = run("x<-(1.5);cat(x);cat('\\n');");
        assert_eq!(i.output, vec!["1.5"]);
    }

    #[test]
    fn matrix_is_column_major() {
        let i = run("m<-(matrix(c(1,3,2,4),nrow=2,ncol=2,byrow=FALSE));write.table(m,row.names=FALSE,col.names=FALSE);");
        assert_eq!(i.output, vec!["1 2", "3 4"]);
    }

    #[test]
    fn multi_line_lists_continue() {
        let i = run("v<-(c(1,2,\n3));print(length(v));");
        assert_eq!(i.output, vec!["[1] 3"]);
    }

    #[test]
    fn exists_prints_logical() {
        let i = run("exists(\"nope\");x<-(TRUE);exists(\"x\");");
        assert_eq!(i.output, vec!["[1] FALSE", "[1] TRUE"]);
    }

    #[test]
    fn products_and_inverse() {
        let i = run("a<-(matrix(c(2,0,0,4),nrow=2,ncol=2,byrow=FALSE));d<-(det(a));cat(d);cat('\\n');b<-((a%*%solve(a)));write.table(b);");
        assert_eq!(i.output[0], "8");
        assert_eq!(i.output[1..], ["1 0", "0 1"]);
    }

    #[test]
    fn errors_skip_one_statement() {
        let mut i = Interpreter::new();
        i.run("x<-(missing);y<-(2);");
        assert_eq!(i.errors.len(), 1);
        assert!(!i.vars.contains_key("x"));
        assert!(i.vars.contains_key("y"));
    }

    #[test]
    fn token_stream() {
        let toks: Vec<Tok> = Tok::lexer("x <- c(.5, 2L) %*% 'a\\tb' # note")
            .map(|t| t.unwrap())
            .collect();
        assert_eq!(
            toks,
            vec![
                Tok::Ident("x".into()),
                Tok::Arrow,
                Tok::Ident("c".into()),
                Tok::LParen,
                Tok::Num(0.5),
                Tok::Comma,
                Tok::Num(2.0),
                Tok::RParen,
                Tok::MatMul,
                Tok::Str("a\tb".into()),
                Tok::Comment,
            ]
        );
    }

    #[test]
    fn newlines_split_only_outside_parens() {
        let statements = split_statements("a<-(1)\nb<-(c(1,\n2)); # done\n").unwrap();
        assert_eq!(statements.len(), 2);
        assert!(statements[1].iter().all(|(t, _)| *t != Tok::Newline));
    }

    #[test]
    fn precedence_and_unary_minus() {
        let i = run("x<-(-2+3*4);cat(x);cat('\\n');");
        assert_eq!(i.output, vec!["10"]);
    }

    #[test]
    fn parse_errors_skip_one_statement() {
        let mut i = Interpreter::new();
        i.run("x<-(1+);y<-(2);");
        assert_eq!(i.errors.len(), 1);
        assert!(!i.vars.contains_key("x"));
        assert!(i.vars.contains_key("y"));
    }

    #[test]
    fn lex_errors_abort_script() {
        let mut i = Interpreter::new();
        i.run("y<-(2);z<-(1 ? 2);");
        assert_eq!(i.errors, vec!["unexpected character at offset 13"]);
        assert!(i.vars.is_empty());
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(2.0, false), "2");
        assert_eq!(format_number(0.1, false), "0.1");
        assert_eq!(format_number(1e300, false), "1e300");
        assert_eq!(format_number(-3e9, false), "-3000000000");
        assert_eq!(format_number(f64::NEG_INFINITY, false), "-Inf");
        assert_eq!(format_number(1.0, true), "TRUE");
    }
}
