//! Boolean expression evaluator for rule matching.
//!
//! The language covers literals (strings, integers, floats, `true`,
//! `false`, `null`, lists), comparison operators (`== != < <= > >=`),
//! boolean operators (`and or not`), list/substring membership (`in`),
//! regex search (`=~`), grouping parentheses, dotted and bracketed
//! variable paths into a context object, and function calls resolved
//! through a caller-supplied registry.
//!
//! Missing context paths and unknown functions evaluate to `null`. An
//! empty or whitespace-only expression compiles to a constant `true`.
//! Compilation returns a reusable form that can be evaluated against
//! many contexts.

use crate::core::error::OapsError;
use regex::Regex;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Runtime value of the expression language.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    /// Python-style truthiness.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn from_json(json: &Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            Json::String(s) => Value::Str(s.clone()),
            Json::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            // Objects have no literal form; treated as opaque truthy-ness
            // is not needed, so collapse to their keys.
            Json::Object(map) => {
                Value::List(map.keys().map(|k| Value::Str(k.clone())).collect())
            }
        }
    }

    fn loosely_equals(&self, other: &Value) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }
}

/// A function callable from expressions.
pub type EvalFunction = Box<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// Registry of functions available to expressions. Unknown names
/// evaluate to `null` rather than failing.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, EvalFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: &str,
        function: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    ) {
        self.functions.insert(name.to_string(), Box::new(function));
    }

    pub fn get(&self, name: &str) -> Option<&EvalFunction> {
        self.functions.get(name)
    }
}

fn arg_str(args: &[Value], index: usize) -> Option<&str> {
    match args.get(index) {
        Some(Value::Str(s)) => Some(s),
        _ => None,
    }
}

/// Registry with the built-in filesystem and environment helpers used by
/// hook rules: `file_exists`, `is_executable`, `is_path_under`,
/// `matches_glob`, `env`, `is_git_repo`.
pub fn default_registry(cwd: &Path) -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();

    registry.register("file_exists", |args| {
        match arg_str(args, 0) {
            Some(path) => Value::Bool(Path::new(path).exists()),
            None => Value::Bool(false),
        }
    });

    registry.register("is_executable", |args| {
        let Some(path) = arg_str(args, 0) else {
            return Value::Bool(false);
        };
        let path = Path::new(path);
        if !path.is_file() {
            return Value::Bool(false);
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            match path.metadata() {
                Ok(meta) => Value::Bool(meta.permissions().mode() & 0o111 != 0),
                Err(_) => Value::Bool(false),
            }
        }
        #[cfg(not(unix))]
        Value::Bool(false)
    });

    let base = cwd.to_path_buf();
    registry.register("is_path_under", move |args| {
        let (Some(path), Some(root)) = (arg_str(args, 0), arg_str(args, 1)) else {
            return Value::Bool(false);
        };
        let path = absolutize(&base, Path::new(path));
        let root = absolutize(&base, Path::new(root));
        Value::Bool(path.starts_with(&root))
    });

    registry.register("matches_glob", |args| {
        let (Some(text), Some(pattern)) = (arg_str(args, 0), arg_str(args, 1)) else {
            return Value::Bool(false);
        };
        match glob_to_regex(pattern) {
            Some(re) => Value::Bool(re.is_match(text)),
            None => Value::Bool(false),
        }
    });

    registry.register("env", |args| match arg_str(args, 0) {
        Some(name) => match std::env::var(name) {
            Ok(value) => Value::Str(value),
            Err(_) => Value::Null,
        },
        None => Value::Null,
    });

    let git_base = cwd.to_path_buf();
    registry.register("is_git_repo", move |_args| {
        let mut current = Some(git_base.as_path());
        while let Some(dir) = current {
            if dir.join(".git").exists() {
                return Value::Bool(true);
            }
            current = dir.parent();
        }
        Value::Bool(false)
    });

    registry
}

/// Resolve a possibly-relative path against a base, following symlinks
/// where the path exists and normalizing `..` lexically otherwise.
fn absolutize(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    if let Ok(resolved) = std::fs::canonicalize(&joined) {
        return resolved;
    }
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

/// Translate a glob pattern (`*`, `?`, `[...]`) into an anchored regex.
/// As with fnmatch, `*` crosses path separators.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                out.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    out.push('^');
                }
                for inner in chars.by_ref() {
                    if inner == ']' {
                        break;
                    }
                    out.push(inner);
                }
                out.push(']');
            }
            c if "\\.+()|^$".contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('$');
    Regex::new(&out).ok()
}

// --- Lexer ---

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    In,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Match,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '"' | '\'' => {
                let quote = c;
                let mut literal = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            match chars.get(i + 1) {
                                Some(&next) => {
                                    literal.push(match next {
                                        'n' => '\n',
                                        't' => '\t',
                                        other => other,
                                    });
                                    i += 2;
                                }
                                None => return Err("unterminated string".to_string()),
                            }
                        }
                        Some(&ch) => {
                            literal.push(ch);
                            i += 1;
                        }
                        None => return Err("unterminated string".to_string()),
                    }
                }
                tokens.push(Token::Str(literal));
            }
            '=' => {
                match chars.get(i + 1) {
                    Some('=') => {
                        tokens.push(Token::Eq);
                        i += 2;
                    }
                    Some('~') => {
                        tokens.push(Token::Match);
                        i += 2;
                    }
                    _ => return Err("unexpected '='".to_string()),
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    return Err("unexpected '!'".to_string());
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '-' | '0'..='9' => {
                let start = i;
                if c == '-' {
                    i += 1;
                    if !matches!(chars.get(i), Some('0'..='9')) {
                        return Err("unexpected '-'".to_string());
                    }
                }
                while matches!(chars.get(i), Some('0'..='9')) {
                    i += 1;
                }
                let mut is_float = false;
                if chars.get(i) == Some(&'.')
                    && matches!(chars.get(i + 1), Some('0'..='9'))
                {
                    is_float = true;
                    i += 1;
                    while matches!(chars.get(i), Some('0'..='9')) {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                if is_float {
                    tokens.push(Token::Float(
                        text.parse().map_err(|_| format!("bad number {text:?}"))?,
                    ));
                } else {
                    tokens.push(Token::Int(
                        text.parse().map_err(|_| format!("bad number {text:?}"))?,
                    ));
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while matches!(chars.get(i), Some(ch) if ch.is_ascii_alphanumeric() || *ch == '_')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(format!("unexpected character {other:?}")),
        }
    }
    Ok(tokens)
}

// --- Parser ---

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Match,
}

#[derive(Debug, Clone, PartialEq)]
enum PathSeg {
    Key(String),
    Index(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    List(Vec<Expr>),
    Var(String, Vec<PathSeg>),
    Call(String, Vec<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, token: &Token) -> Result<(), String> {
        match self.next() {
            Some(t) if t == *token => Ok(()),
            other => Err(format!("expected {token:?}, got {other:?}")),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Not) {
            self.next();
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let left = self.parse_operand()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinOp::Eq,
            Some(Token::Ne) => BinOp::Ne,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            Some(Token::In) => BinOp::In,
            Some(Token::Match) => BinOp::Match,
            _ => return Ok(left),
        };
        self.next();
        let right = self.parse_operand()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn parse_operand(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Int(i)) => Ok(Expr::Literal(Value::Int(i))),
            Some(Token::Float(f)) => Ok(Expr::Literal(Value::Float(f))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if self.peek() != Some(&Token::RBracket) {
                    loop {
                        items.push(self.parse_operand()?);
                        if self.peek() == Some(&Token::Comma) {
                            self.next();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBracket)?;
                Ok(Expr::List(items))
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.next();
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if self.peek() == Some(&Token::Comma) {
                                self.next();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(&Token::RParen)?;
                    return Ok(Expr::Call(name, args));
                }

                let mut segments = Vec::new();
                loop {
                    match self.peek() {
                        Some(Token::Dot) => {
                            self.next();
                            match self.next() {
                                Some(Token::Ident(key)) => segments.push(PathSeg::Key(key)),
                                other => {
                                    return Err(format!("expected identifier after '.', got {other:?}"));
                                }
                            }
                        }
                        Some(Token::LBracket) => {
                            self.next();
                            let index = self.parse_operand()?;
                            self.expect(&Token::RBracket)?;
                            segments.push(PathSeg::Index(Box::new(index)));
                        }
                        _ => break,
                    }
                }
                Ok(Expr::Var(name, segments))
            }
            other => Err(format!("unexpected token {other:?}")),
        }
    }
}

// --- Evaluation ---

fn lookup<'a>(context: &'a Json, key: &str) -> Option<&'a Json> {
    context.as_object().and_then(|map| map.get(key))
}

fn eval_expr(
    expr: &Expr,
    context: &Json,
    registry: &FunctionRegistry,
) -> Result<Value, String> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::List(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval_expr(item, context, registry)?);
            }
            Ok(Value::List(values))
        }
        Expr::Var(base, segments) => {
            let mut current = match lookup(context, base) {
                Some(json) => json.clone(),
                None => return Ok(Value::Null),
            };
            for segment in segments {
                current = match segment {
                    PathSeg::Key(key) => match current.get(key) {
                        Some(next) => next.clone(),
                        None => return Ok(Value::Null),
                    },
                    PathSeg::Index(index_expr) => {
                        match eval_expr(index_expr, context, registry)? {
                            Value::Str(key) => match current.get(&key) {
                                Some(next) => next.clone(),
                                None => return Ok(Value::Null),
                            },
                            Value::Int(i) if i >= 0 => match current.get(i as usize) {
                                Some(next) => next.clone(),
                                None => return Ok(Value::Null),
                            },
                            _ => return Ok(Value::Null),
                        }
                    }
                };
            }
            Ok(Value::from_json(&current))
        }
        Expr::Call(name, args) => {
            let Some(function) = registry.get(name) else {
                return Ok(Value::Null);
            };
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval_expr(arg, context, registry)?);
            }
            Ok(function(&values))
        }
        Expr::Not(inner) => Ok(Value::Bool(!eval_expr(inner, context, registry)?.truthy())),
        Expr::And(left, right) => {
            if !eval_expr(left, context, registry)?.truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval_expr(right, context, registry)?.truthy()))
        }
        Expr::Or(left, right) => {
            if eval_expr(left, context, registry)?.truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval_expr(right, context, registry)?.truthy()))
        }
        Expr::Binary(op, left, right) => {
            let left = eval_expr(left, context, registry)?;
            let right = eval_expr(right, context, registry)?;
            eval_binary(*op, &left, &right)
        }
    }
}

fn eval_binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, String> {
    let result = match op {
        BinOp::Eq => left.loosely_equals(right),
        BinOp::Ne => !left.loosely_equals(right),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = match (left, right) {
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => match (left.as_f64(), right.as_f64()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => None,
                },
            };
            match ordering {
                Some(ordering) => match op {
                    BinOp::Lt => ordering.is_lt(),
                    BinOp::Le => ordering.is_le(),
                    BinOp::Gt => ordering.is_gt(),
                    BinOp::Ge => ordering.is_ge(),
                    _ => unreachable!(),
                },
                None => false,
            }
        }
        BinOp::In => match right {
            Value::List(items) => items.iter().any(|item| item.loosely_equals(left)),
            Value::Str(haystack) => match left {
                Value::Str(needle) => haystack.contains(needle.as_str()),
                _ => false,
            },
            _ => false,
        },
        BinOp::Match => {
            let (Value::Str(text), Value::Str(pattern)) = (left, right) else {
                return Ok(Value::Bool(false));
            };
            let re = Regex::new(pattern).map_err(|e| format!("invalid regex: {e}"))?;
            re.is_match(text)
        }
    };
    Ok(Value::Bool(result))
}

/// A compiled boolean expression.
#[derive(Debug, Clone)]
pub struct ExpressionEvaluator {
    expression: String,
    compiled: Option<Expr>,
}

impl ExpressionEvaluator {
    /// Compile an expression. Empty and whitespace-only input compiles
    /// to a constant `true`.
    pub fn compile(expression: &str) -> Result<Self, OapsError> {
        if expression.trim().is_empty() {
            return Ok(Self {
                expression: expression.to_string(),
                compiled: None,
            });
        }

        let tokens = tokenize(expression).map_err(|message| OapsError::Expression {
            expression: expression.to_string(),
            message,
        })?;
        let mut parser = Parser { tokens, pos: 0 };
        let compiled = parser.parse_expr().map_err(|message| OapsError::Expression {
            expression: expression.to_string(),
            message,
        })?;
        if parser.pos != parser.tokens.len() {
            return Err(OapsError::Expression {
                expression: expression.to_string(),
                message: format!("trailing input at token {}", parser.pos),
            });
        }
        Ok(Self {
            expression: expression.to_string(),
            compiled: Some(compiled),
        })
    }

    /// The source text this evaluator was compiled from.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Evaluate against a context object, resolving functions through
    /// `registry`.
    pub fn evaluate(
        &self,
        context: &Json,
        registry: &FunctionRegistry,
    ) -> Result<bool, OapsError> {
        match &self.compiled {
            None => Ok(true),
            Some(expr) => eval_expr(expr, context, registry)
                .map(|value| value.truthy())
                .map_err(|message| OapsError::Expression {
                    expression: self.expression.clone(),
                    message,
                }),
        }
    }
}

/// Compile and evaluate in one step.
pub fn evaluate_condition(
    expression: &str,
    context: &Json,
    registry: &FunctionRegistry,
) -> Result<bool, OapsError> {
    ExpressionEvaluator::compile(expression)?.evaluate(context, registry)
}
