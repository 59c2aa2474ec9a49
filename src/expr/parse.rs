use serde_json::{Map, Number, Value};

use crate::expr::ExprError;
use crate::expr::lexer::{Token, TokenKind, tokenize};

/// Parsed form of an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Literal(Value),
    Path { root: String, segments: Vec<Segment> },
}

/// One accessor applied after the root binding.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// `.name`
    Attr(String),
    /// `.name(args...)`
    Call { name: String, args: Vec<Value> },
    /// `[literal]`
    Index(Value),
}

/// Parse a full expression: a literal or a path rooted at a binding name.
///
/// # Errors
///
/// Returns [`ExprError::Syntax`] if the input does not match the grammar
/// or has trailing tokens.
pub fn parse_node(input: &str) -> Result<Node, ExprError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser::new(&tokens, input.len());
    let node = parser.parse_expr()?;
    parser.expect_end()?;
    Ok(node)
}

/// Parse a standalone literal (string, number, boolean, null, mapping, list).
///
/// Accepts both JSON spellings (`true`, `null`) and capitalised ones
/// (`True`, `None`) with either quote style.
///
/// # Errors
///
/// Returns [`ExprError::Syntax`] if the input is not exactly one literal.
pub fn parse_literal(input: &str) -> Result<Value, ExprError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser::new(&tokens, input.len());
    let value = parser.parse_literal()?;
    parser.expect_end()?;
    Ok(value)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    input_len: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token], input_len: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            input_len,
        }
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn next_token(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(tok)
    }

    fn current_pos(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.input_len, |t| t.pos)
    }

    fn error(&self, message: impl Into<String>) -> ExprError {
        ExprError::Syntax {
            pos: self.current_pos(),
            message: message.into(),
        }
    }

    fn expect(&mut self, expected: &TokenKind, what: &str) -> Result<(), ExprError> {
        match self.peek_kind() {
            Some(kind) if kind == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(kind) => Err(self.error(format!("expected {what}, found {kind:?}"))),
            None => Err(self.error(format!("expected {what}, found end of input"))),
        }
    }

    fn expect_end(&self) -> Result<(), ExprError> {
        match self.peek_kind() {
            None => Ok(()),
            Some(kind) => Err(self.error(format!("unexpected trailing {kind:?}"))),
        }
    }

    fn parse_expr(&mut self) -> Result<Node, ExprError> {
        match self.peek_kind() {
            Some(TokenKind::Identifier(name)) if keyword_literal(name).is_none() => {
                let root = name.clone();
                self.pos += 1;
                let segments = self.parse_segments()?;
                Ok(Node::Path { root, segments })
            }
            Some(_) => self.parse_literal().map(Node::Literal),
            None => Err(self.error("empty expression")),
        }
    }

    fn parse_segments(&mut self) -> Result<Vec<Segment>, ExprError> {
        let mut segments = Vec::new();
        loop {
            match self.peek_kind() {
                Some(TokenKind::Dot) => {
                    self.pos += 1;
                    let name = match self.next_token() {
                        Some(Token {
                            kind: TokenKind::Identifier(name),
                            ..
                        }) => name.clone(),
                        _ => {
                            self.pos = self.pos.saturating_sub(1);
                            return Err(self.error("expected attribute name after '.'"));
                        }
                    };
                    if self.peek_kind() == Some(&TokenKind::LParen) {
                        self.pos += 1;
                        let args = self.parse_sequence(&TokenKind::RParen)?;
                        segments.push(Segment::Call { name, args });
                    } else {
                        segments.push(Segment::Attr(name));
                    }
                }
                Some(TokenKind::LBracket) => {
                    self.pos += 1;
                    let key = self.parse_literal()?;
                    self.expect(&TokenKind::RBracket, "']'")?;
                    segments.push(Segment::Index(key));
                }
                _ => return Ok(segments),
            }
        }
    }

    /// Comma-separated literals up to `close` (consumed). Allows a trailing comma.
    fn parse_sequence(&mut self, close: &TokenKind) -> Result<Vec<Value>, ExprError> {
        let mut items = Vec::new();
        loop {
            if self.peek_kind() == Some(close) {
                self.pos += 1;
                return Ok(items);
            }
            items.push(self.parse_literal()?);
            match self.peek_kind() {
                Some(TokenKind::Comma) => self.pos += 1,
                Some(kind) if kind == close => {}
                _ => return Err(self.error("expected ',' or closing bracket")),
            }
        }
    }

    fn parse_literal(&mut self) -> Result<Value, ExprError> {
        let start = self.current_pos();
        let Some(tok) = self.next_token() else {
            return Err(self.error("expected a literal, found end of input"));
        };
        match &tok.kind {
            TokenKind::StringLiteral(s) => Ok(Value::String(s.clone())),
            TokenKind::Integer(n) => Ok(Value::Number((*n).into())),
            TokenKind::Float(f) => Number::from_f64(*f)
                .map(Value::Number)
                .ok_or_else(|| ExprError::Syntax {
                    pos: start,
                    message: format!("unrepresentable number {f}"),
                }),
            TokenKind::Identifier(name) => keyword_literal(name).ok_or_else(|| ExprError::Syntax {
                pos: start,
                message: format!("'{name}' is not a literal"),
            }),
            TokenKind::LBracket => self.parse_sequence(&TokenKind::RBracket).map(Value::Array),
            TokenKind::LBrace => self.parse_mapping(),
            other => Err(ExprError::Syntax {
                pos: start,
                message: format!("expected a literal, found {other:?}"),
            }),
        }
    }

    /// Mapping body after `{`. Keys must be strings.
    fn parse_mapping(&mut self) -> Result<Value, ExprError> {
        let mut map = Map::new();
        loop {
            if self.peek_kind() == Some(&TokenKind::RBrace) {
                self.pos += 1;
                return Ok(Value::Object(map));
            }
            let key = match self.parse_literal()? {
                Value::String(key) => key,
                other => return Err(self.error(format!("mapping keys must be strings, found {other}"))),
            };
            self.expect(&TokenKind::Colon, "':'")?;
            let value = self.parse_literal()?;
            map.insert(key, value);
            match self.peek_kind() {
                Some(TokenKind::Comma) => self.pos += 1,
                Some(TokenKind::RBrace) => {}
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }
}

fn keyword_literal(name: &str) -> Option<Value> {
    match name {
        "True" | "true" => Some(Value::Bool(true)),
        "False" | "false" => Some(Value::Bool(false)),
        "None" | "null" => Some(Value::Null),
        _ => None,
    }
}
