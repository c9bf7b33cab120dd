//! Input selector expressions.
//!
//! A selector names the state keys a stage reads:
//!
//! - `a & b`: both required, one value each, left to right
//! - `a | b`: the first key present wins
//! - parentheses group; `&` binds tighter than `|`
//!
//! e.g. `user_prompt & (relevant_chunks | parsed_doc | doc)`.

use std::fmt;
use std::str::FromStr;

use gleaner_core::error::{GleanerError, Result};

use super::state::SharedState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Key(String),
    And(Vec<Selector>),
    Or(Vec<Selector>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    And,
    Or,
    Open,
    Close,
}

fn tokenize(expr: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '&' => tokens.push(Token::And),
            '|' => tokens.push(Token::Or),
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            c if c.is_ascii_alphanumeric() || c == '_' => {
                let mut ident = c.to_string();
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        ident.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(GleanerError::InvalidSelector(format!(
                    "unexpected '{}' at {} in `{}`",
                    other, pos, expr
                )))
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    expr: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn error(&self, msg: &str) -> GleanerError {
        GleanerError::InvalidSelector(format!("{} in `{}`", msg, self.expr))
    }

    fn parse_or(&mut self) -> Result<Selector> {
        let mut operands = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            operands.push(self.parse_and()?);
        }
        Ok(flatten(operands, Selector::Or))
    }

    fn parse_and(&mut self) -> Result<Selector> {
        let mut operands = vec![self.parse_atom()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            operands.push(self.parse_atom()?);
        }
        Ok(flatten(operands, Selector::And))
    }

    fn parse_atom(&mut self) -> Result<Selector> {
        match self.tokens.get(self.pos).cloned() {
            Some(Token::Ident(name)) => {
                self.pos += 1;
                Ok(Selector::Key(name))
            }
            Some(Token::Open) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                if self.peek() != Some(&Token::Close) {
                    return Err(self.error("missing ')'"));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(_) => Err(self.error("expected a key or '('")),
            None => Err(self.error("unexpected end of expression")),
        }
    }
}

fn flatten(mut operands: Vec<Selector>, combine: fn(Vec<Selector>) -> Selector) -> Selector {
    if operands.len() == 1 {
        operands.remove(0)
    } else {
        combine(operands)
    }
}

impl Selector {
    /// Parse a selector expression.
    pub fn parse(expr: &str) -> Result<Self> {
        let tokens = tokenize(expr)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            expr,
        };
        let selector = parser.parse_or()?;
        if parser.pos != tokens.len() {
            return Err(parser.error("trailing tokens"));
        }
        Ok(selector)
    }

    /// Resolve against `state`, returning one key per AND operand in
    /// declaration order, or `None` if any required operand is absent.
    pub fn resolve(&self, state: &SharedState) -> Option<Vec<String>> {
        match self {
            Self::Key(key) => state.contains(key).then(|| vec![key.clone()]),
            Self::And(operands) => {
                let mut keys = Vec::new();
                for operand in operands {
                    keys.extend(operand.resolve(state)?);
                }
                Some(keys)
            }
            Self::Or(operands) => operands.iter().find_map(|o| o.resolve(state)),
        }
    }

    /// Fewest values a successful resolution yields.
    pub fn arity(&self) -> usize {
        match self {
            Self::Key(_) => 1,
            Self::And(operands) => operands.iter().map(Selector::arity).sum(),
            Self::Or(operands) => operands.iter().map(Selector::arity).min().unwrap_or(0),
        }
    }

    /// Every key mentioned, in order of appearance.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Self::Key(key) => vec![key.as_str()],
            Self::And(operands) | Self::Or(operands) => {
                operands.iter().flat_map(Selector::keys).collect()
            }
        }
    }
}

impl FromStr for Selector {
    type Err = GleanerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{}", key),
            Self::And(operands) => {
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, " & ")?;
                    }
                    match operand {
                        Self::Or(_) => write!(f, "({})", operand)?,
                        _ => write!(f, "{}", operand)?,
                    }
                }
                Ok(())
            }
            Self::Or(operands) => {
                let parts: Vec<String> = operands.iter().map(|o| o.to_string()).collect();
                write!(f, "{}", parts.join(" | "))
            }
        }
    }
}
