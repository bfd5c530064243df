//! Parsed condition tree
//!
//! Precedence from loosest to tightest: `||`, `&&`, unary `!`, then a
//! primary (a parenthesized group or a single predicate). A predicate is an
//! operand optionally followed by a comparison or `in`.

use super::lexer::{tokenize, CompareOp, Token};
use crate::error::{Error, Result};
use crate::render::split_top_level;
use crate::value::{parse_numeric, unquote};
use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;

/// Nesting limit for `!` and parentheses
pub const MAX_NESTING: usize = 64;

static PATH: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[A-Za-z_$][\w$]*(\.[\w$*]+)*$").expect("valid path regex")
});

static EMPTY_CALL: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?s)^empty\((.*)\)$").expect("valid empty() regex"));

/// One side of a predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Quoted string, number, `true`, `false` or `null`
    Literal(Value),
    /// `['a', 'b']`
    List(Vec<Operand>),
    /// Dot path into the context (`source.amount`, `item`)
    Path(String),
    /// Anything else; resolved by rendering it as a `{{ }}` block
    Expression(String),
}

impl Operand {
    pub fn parse(text: &str) -> Operand {
        let text = text.trim();
        if let Some(literal) = unquote(text) {
            return Operand::Literal(Value::String(literal.to_string()));
        }
        if let Some(number) = parse_numeric(text) {
            return Operand::Literal(number);
        }
        match text {
            "true" => return Operand::Literal(Value::Bool(true)),
            "false" => return Operand::Literal(Value::Bool(false)),
            "null" => return Operand::Literal(Value::Null),
            _ => {}
        }
        if text.starts_with('[') && text.ends_with(']') {
            let inner = &text[1..text.len() - 1];
            if inner.trim().is_empty() {
                return Operand::List(Vec::new());
            }
            return Operand::List(split_top_level(inner, ',').iter().map(|s| Operand::parse(s)).collect());
        }
        if PATH.is_match(text) {
            return Operand::Path(text.to_string());
        }
        Operand::Expression(text.to_string())
    }
}

/// Condition AST node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Vec<Expr>),
    And(Vec<Expr>),
    Not(Box<Expr>),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    In {
        needle: Operand,
        haystack: Operand,
    },
    Empty(Operand),
    /// Bare `true` / `false`
    Bool(bool),
    /// Any other single operand, interpreted by truthiness
    Truthy(Operand),
}

/// A condition parsed once and evaluated many times
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    /// Parse a condition string
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(Error::ExpressionParse("empty condition".into()));
        }
        let mut parser = Parser {
            source,
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.parse_or()?;
        if parser.pos < parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(Self {
            source: source.trim().to_string(),
            expr,
        })
    }

    /// The condition text as written
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> Error {
        Error::ExpressionParse(format!("{} at token {} in `{}`", message, self.pos, self.source))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error("condition nested too deeply"));
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut terms = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            terms.push(self.parse_and()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Or(terms)
        })
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut terms = vec![self.parse_unary()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            terms.push(self.parse_unary()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::And(terms)
        })
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            self.enter()?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::LParen) => {
                self.enter()?;
                let inner = self.parse_or()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(self.error("expected `)`")),
                }
            }
            Some(Token::Operand(text)) => self.parse_predicate(text),
            _ => Err(self.error("expected an operand")),
        }
    }

    fn parse_predicate(&mut self, text: String) -> Result<Expr> {
        match self.peek() {
            Some(Token::Op(op)) => {
                let op = *op;
                self.pos += 1;
                match self.next() {
                    Some(Token::Operand(right)) => Ok(Expr::Compare {
                        left: Operand::parse(&text),
                        op,
                        right: Operand::parse(&right),
                    }),
                    _ => Err(self.error("expected right-hand operand")),
                }
            }
            Some(Token::In) => {
                self.pos += 1;
                match self.next() {
                    Some(Token::Operand(haystack)) => Ok(Expr::In {
                        needle: Operand::parse(&text),
                        haystack: Operand::parse(&haystack),
                    }),
                    _ => Err(self.error("expected a list after `in`")),
                }
            }
            _ => Ok(single(&text)),
        }
    }
}

fn single(text: &str) -> Expr {
    match text {
        "true" => Expr::Bool(true),
        "false" => Expr::Bool(false),
        _ => match EMPTY_CALL.captures(text) {
            Some(caps) => Expr::Empty(Operand::parse(&caps[1])),
            None => Expr::Truthy(Operand::parse(text)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_or_binds_looser_than_and() {
        let c = Condition::parse("a && b || c").unwrap();
        match c.expr() {
            Expr::Or(terms) => {
                assert_eq!(terms.len(), 2);
                assert!(matches!(terms[0], Expr::And(_)));
            }
            other => panic!("expected Or, got {:?}", other),
        }
    }

    #[test]
    fn test_not_covers_comparison() {
        let c = Condition::parse("!status == 'done'").unwrap();
        assert!(matches!(c.expr(), Expr::Not(inner) if matches!(**inner, Expr::Compare { .. })));
    }

    #[test]
    fn test_operand_kinds() {
        assert_eq!(Operand::parse("'x'"), Operand::Literal(json!("x")));
        assert_eq!(Operand::parse("100"), Operand::Literal(json!(100)));
        assert_eq!(Operand::parse("source.amount"), Operand::Path("source.amount".into()));
        assert_eq!(
            Operand::parse("['a', 1]"),
            Operand::List(vec![Operand::Literal(json!("a")), Operand::Literal(json!(1))])
        );
        assert_eq!(
            Operand::parse("a.b ?? 'x'"),
            Operand::Expression("a.b ?? 'x'".into())
        );
    }

    #[test]
    fn test_empty_call() {
        let c = Condition::parse("empty(source.items)").unwrap();
        assert_eq!(c.expr(), &Expr::Empty(Operand::Path("source.items".into())));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Condition::parse("").is_err());
        assert!(Condition::parse("(a == 1").is_err());
        assert!(Condition::parse("a ==").is_err());
        assert!(Condition::parse("a == 1)").is_err());
        let deep = format!("{}a{}", "(".repeat(MAX_NESTING + 1), ")".repeat(MAX_NESTING + 1));
        assert!(Condition::parse(&deep).is_err());
    }
}
