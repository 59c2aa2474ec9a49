use crate::expr::ExprError;

/// A token kind produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    StringLiteral(String),
    Integer(i64),
    Float(f64),

    Dot,
    Comma,
    Colon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
}

/// A token with the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

/// Tokenizes an expression source string.
///
/// # Errors
///
/// Returns [`ExprError::Syntax`] for unterminated strings, malformed numbers
/// or characters outside the grammar.
pub fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        let symbol = match ch {
            '.' => Some(TokenKind::Dot),
            ',' => Some(TokenKind::Comma),
            ':' => Some(TokenKind::Colon),
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            '{' => Some(TokenKind::LBrace),
            '}' => Some(TokenKind::RBrace),
            _ => None,
        };
        if let Some(kind) = symbol {
            chars.next();
            tokens.push(Token { kind, pos });
            continue;
        }

        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }

            '"' | '\'' => {
                let quote = ch;
                chars.next();
                let mut s = String::new();
                let mut terminated = false;
                while let Some((_, c)) = chars.next() {
                    if c == quote {
                        terminated = true;
                        break;
                    }
                    if c == '\\' {
                        let Some((_, escaped)) = chars.next() else {
                            break;
                        };
                        match escaped {
                            'n' => s.push('\n'),
                            't' => s.push('\t'),
                            'r' => s.push('\r'),
                            '\\' => s.push('\\'),
                            '"' => s.push('"'),
                            '\'' => s.push('\''),
                            other => {
                                s.push('\\');
                                s.push(other);
                            }
                        }
                    } else {
                        s.push(c);
                    }
                }
                if !terminated {
                    return Err(ExprError::Syntax {
                        pos,
                        message: "unterminated string literal".to_owned(),
                    });
                }
                tokens.push(Token {
                    kind: TokenKind::StringLiteral(s),
                    pos,
                });
            }

            c if c.is_ascii_digit() || c == '-' => {
                let mut end = pos;
                let mut is_float = false;
                while let Some(&(i, c)) = chars.peek() {
                    let accept = c.is_ascii_digit()
                        || (i == pos && c == '-')
                        || (c == '.' && !is_float && next_is_digit(input, i));
                    if !accept {
                        break;
                    }
                    if c == '.' {
                        is_float = true;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                let text = &input[pos..end];
                let kind = if is_float {
                    text.parse().map(TokenKind::Float).ok()
                } else {
                    text.parse().map(TokenKind::Integer).ok()
                };
                let Some(kind) = kind else {
                    return Err(ExprError::Syntax {
                        pos,
                        message: format!("invalid number '{text}'"),
                    });
                };
                tokens.push(Token { kind, pos });
            }

            c if c.is_alphabetic() || c == '_' => {
                let mut end = pos;
                while let Some(&(i, c)) = chars.peek() {
                    if !(c.is_alphanumeric() || c == '_') {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                tokens.push(Token {
                    kind: TokenKind::Identifier(input[pos..end].to_owned()),
                    pos,
                });
            }

            other => {
                return Err(ExprError::Syntax {
                    pos,
                    message: format!("unexpected character '{other}'"),
                });
            }
        }
    }

    Ok(tokens)
}

fn next_is_digit(input: &str, dot: usize) -> bool {
    input[dot + 1..]
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lex_path_with_call() {
        assert_eq!(
            kinds("values.get('A')"),
            vec![
                TokenKind::Identifier("values".into()),
                TokenKind::Dot,
                TokenKind::Identifier("get".into()),
                TokenKind::LParen,
                TokenKind::StringLiteral("A".into()),
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn lex_double_quoted_string_with_escape() {
        assert_eq!(
            kinds(r#""say \"hi\"""#),
            vec![TokenKind::StringLiteral("say \"hi\"".into())]
        );
    }

    #[test]
    fn lex_numbers() {
        assert_eq!(
            kinds("[1, -2, 3.5]"),
            vec![
                TokenKind::LBracket,
                TokenKind::Integer(1),
                TokenKind::Comma,
                TokenKind::Integer(-2),
                TokenKind::Comma,
                TokenKind::Float(3.5),
                TokenKind::RBracket,
            ]
        );
    }

    #[test]
    fn lex_index_after_integer_is_not_float() {
        // `items[0].id` must lex `0` then `.`
        assert_eq!(
            kinds("a[0].id"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::LBracket,
                TokenKind::Integer(0),
                TokenKind::RBracket,
                TokenKind::Dot,
                TokenKind::Identifier("id".into()),
            ]
        );
    }

    #[test]
    fn lex_unterminated_string_errors() {
        let err = tokenize("values.get('A").unwrap_err();
        assert!(err.to_string().contains("unterminated string"));
    }

    #[test]
    fn lex_rejects_operators() {
        let err = tokenize("values + 1").unwrap_err();
        assert!(err.to_string().contains("unexpected character '+'"));
    }

    #[test]
    fn lex_records_positions() {
        let tokens = tokenize("env . foo").unwrap();
        assert_eq!(tokens[0].pos, 0);
        assert_eq!(tokens[1].pos, 4);
        assert_eq!(tokens[2].pos, 6);
    }
}
