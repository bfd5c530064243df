//! Tokenizer for boolean conditions
//!
//! Only the structural parts of a condition are tokens: `||`, `&&`, `!`,
//! grouping parentheses, comparison operators and the `in` keyword.
//! Everything between them (paths, literals, array literals, function
//! calls, `??` and `~` sub-expressions) is kept as raw operand text so the
//! template renderer can resolve it later.

use crate::error::{Error, Result};
use std::fmt;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "=="),
            CompareOp::Ne => write!(f, "!="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Ge => write!(f, ">="),
            CompareOp::Le => write!(f, "<="),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Or,
    And,
    Not,
    LParen,
    RParen,
    In,
    Op(CompareOp),
    /// Raw operand text, trimmed
    Operand(String),
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    tokens: Vec<Token>,
    chunk: String,
}

/// Split a condition into tokens
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut lexer = Lexer {
        chars: input.chars().collect(),
        pos: 0,
        tokens: Vec::new(),
        chunk: String::new(),
    };
    lexer.run(input)?;
    Ok(lexer.tokens)
}

impl Lexer {
    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn flush(&mut self) {
        let text = self.chunk.trim();
        if !text.is_empty() {
            self.tokens.push(Token::Operand(text.to_string()));
        }
        self.chunk.clear();
    }

    fn emit(&mut self, token: Token, width: usize) {
        self.flush();
        self.tokens.push(token);
        self.pos += width;
    }

    fn chunk_ends_with_ident(&self) -> bool {
        self.chunk
            .chars()
            .last()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
    }

    /// Copy a quoted string, or a bracketed/call group, into the chunk verbatim
    fn consume_group(&mut self, input: &str) -> Result<()> {
        let mut depth = 0i32;
        let mut quote: Option<char> = None;
        while let Some(ch) = self.peek(0) {
            self.chunk.push(ch);
            self.pos += 1;
            match quote {
                Some(q) => {
                    if ch == q && self.chars.get(self.pos.wrapping_sub(2)) != Some(&'\\') {
                        quote = None;
                        if depth == 0 {
                            return Ok(());
                        }
                    }
                }
                None => match ch {
                    '\'' | '"' => quote = Some(ch),
                    '(' | '[' | '{' => depth += 1,
                    ')' | ']' | '}' => {
                        depth -= 1;
                        if depth <= 0 {
                            return Ok(());
                        }
                    }
                    _ => {}
                },
            }
        }
        Err(Error::ExpressionParse(format!(
            "unterminated string or group in `{}`",
            input
        )))
    }

    fn at_in_keyword(&self) -> bool {
        // called on whitespace: `<ws>in<ws>`
        let is_in = matches!(
            (self.peek(1), self.peek(2)),
            (Some('i' | 'I'), Some('n' | 'N'))
        );
        is_in
            && self.peek(3).is_some_and(char::is_whitespace)
            && !self.chunk.trim().is_empty()
    }

    fn run(&mut self, input: &str) -> Result<()> {
        while let Some(ch) = self.peek(0) {
            match ch {
                '\'' | '"' | '[' | '{' => self.consume_group(input)?,
                '(' if self.chunk_ends_with_ident() => self.consume_group(input)?,
                '(' => self.emit(Token::LParen, 1),
                ')' => self.emit(Token::RParen, 1),
                '|' if self.peek(1) == Some('|') => self.emit(Token::Or, 2),
                '&' if self.peek(1) == Some('&') => self.emit(Token::And, 2),
                '!' if self.peek(1) == Some('=') => {
                    let width = if self.peek(2) == Some('=') { 3 } else { 2 };
                    self.emit(Token::Op(CompareOp::Ne), width)
                }
                '!' if self.chunk.trim().is_empty() => self.emit(Token::Not, 1),
                '=' if self.peek(1) == Some('=') => {
                    let width = if self.peek(2) == Some('=') { 3 } else { 2 };
                    self.emit(Token::Op(CompareOp::Eq), width)
                }
                '>' if self.peek(1) == Some('=') => self.emit(Token::Op(CompareOp::Ge), 2),
                '<' if self.peek(1) == Some('=') => self.emit(Token::Op(CompareOp::Le), 2),
                '>' => self.emit(Token::Op(CompareOp::Gt), 1),
                '<' => self.emit(Token::Op(CompareOp::Lt), 1),
                c if c.is_whitespace() && self.at_in_keyword() => {
                    self.pos += 1;
                    self.emit(Token::In, 2);
                }
                c => {
                    self.chunk.push(c);
                    self.pos += 1;
                }
            }
        }
        self.flush();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(s: &str) -> Token {
        Token::Operand(s.to_string())
    }

    #[test]
    fn test_logical_tokens() {
        let tokens = tokenize("(a == 1 && b != 'x') || !c").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::LParen,
                op("a"),
                Token::Op(CompareOp::Eq),
                op("1"),
                Token::And,
                op("b"),
                Token::Op(CompareOp::Ne),
                op("'x'"),
                Token::RParen,
                Token::Or,
                Token::Not,
                op("c"),
            ]
        );
    }

    #[test]
    fn test_quoted_operators_stay_in_operand() {
        let tokens = tokenize("name == 'a || b && c'").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[2], op("'a || b && c'"));
    }

    #[test]
    fn test_in_keyword_and_array_literal() {
        let tokens = tokenize("item in ['selfie', 'signature']").unwrap();
        assert_eq!(
            tokens,
            vec![op("item"), Token::In, op("['selfie', 'signature']")]
        );
    }

    #[test]
    fn test_call_parens_are_operand() {
        let tokens = tokenize("config('app.enabled') && empty(source.items)").unwrap();
        assert_eq!(
            tokens,
            vec![
                op("config('app.enabled')"),
                Token::And,
                op("empty(source.items)")
            ]
        );
    }

    #[test]
    fn test_words_containing_in_are_not_keywords() {
        let tokens = tokenize("index > 1").unwrap();
        assert_eq!(tokens[0], op("index"));
        let tokens = tokenize("source.main inside").unwrap();
        assert_eq!(tokens, vec![op("source.main inside")]);
    }

    #[test]
    fn test_unterminated_string_is_error() {
        assert!(tokenize("a == 'oops").is_err());
    }
}
