//! Lexer for tokenizing expression strings

use std::borrow::Cow;

use crate::core::span::Span;
use crate::core::token::{Token, TokenKind};
use crate::error::{ExpressionError, ExpressionResult};

/// Lexer for tokenizing expression strings
pub struct Lexer<'a> {
    input: &'a str,
    position: usize,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer from an input string
    pub fn new(input: &'a str) -> Self {
        Self { input, position: 0 }
    }

    /// Tokenize the entire input string, `Eof` included
    pub fn tokenize(&mut self) -> ExpressionResult<Vec<Token<'a>>> {
        // typical bodies have roughly one token per five chars
        let mut tokens = Vec::with_capacity((self.input.len() / 5).max(8));

        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }

        Ok(tokens)
    }

    /// Get the next token from the input
    pub fn next_token(&mut self) -> ExpressionResult<Token<'a>> {
        self.skip_whitespace();

        let start = self.position;

        let Some(ch) = self.current_char() else {
            return Ok(Token::new(
                TokenKind::Eof,
                Span::new(self.position, self.position),
            ));
        };

        let kind = match ch {
            '(' => self.single(TokenKind::LeftParen),
            ')' => self.single(TokenKind::RightParen),
            '[' => self.single(TokenKind::LeftBracket),
            ']' => self.single(TokenKind::RightBracket),
            ',' => self.single(TokenKind::Comma),
            '.' => self.single(TokenKind::Dot),
            '+' => self.single(TokenKind::Plus),
            '-' => self.single(TokenKind::Minus),
            '*' if self.peek() == Some('*') => self.double(TokenKind::Power),
            '*' => self.single(TokenKind::Star),
            '/' => self.single(TokenKind::Slash),
            '%' => self.single(TokenKind::Percent),
            '=' if self.peek() == Some('=') => self.double(TokenKind::Equal),
            '=' if self.peek() == Some('~') => self.double(TokenKind::RegexMatch),
            '!' if self.peek() == Some('=') => self.double(TokenKind::NotEqual),
            '!' => self.single(TokenKind::Not),
            '<' if self.peek() == Some('=') => self.double(TokenKind::LessEqual),
            '<' => self.single(TokenKind::LessThan),
            '>' if self.peek() == Some('=') => self.double(TokenKind::GreaterEqual),
            '>' => self.single(TokenKind::GreaterThan),
            '&' if self.peek() == Some('&') => self.double(TokenKind::And),
            '|' if self.peek() == Some('|') => self.double(TokenKind::Or),
            '|' => self.single(TokenKind::Pipe),
            '"' | '\'' => self.read_string(ch)?,
            '$' => self.read_variable()?,
            ch if ch.is_ascii_digit() => self.read_number()?,
            ch if ch.is_alphabetic() || ch == '_' => self.read_identifier_or_keyword(),
            _ => {
                return Err(ExpressionError::syntax(format!(
                    "unexpected character '{ch}' at position {}",
                    self.position
                )));
            }
        };

        Ok(Token::new(kind, Span::new(start, self.position)))
    }

    fn single(&mut self, kind: TokenKind<'a>) -> TokenKind<'a> {
        self.advance();
        kind
    }

    fn double(&mut self, kind: TokenKind<'a>) -> TokenKind<'a> {
        self.advance();
        self.advance();
        kind
    }

    fn current_char(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn peek(&self) -> Option<char> {
        let current = self.current_char()?;
        self.input[self.position + current.len_utf8()..].chars().next()
    }

    /// Advance position by the current character's UTF-8 byte length
    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.position += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if !ch.is_whitespace() {
                break;
            }
            self.advance();
        }
    }

    fn read_string(&mut self, quote: char) -> ExpressionResult<TokenKind<'a>> {
        let start_pos = self.position;
        self.advance();

        let mut has_escapes = false;

        while let Some(ch) = self.current_char() {
            if ch == quote {
                let end_pos = self.position;
                self.advance();

                let raw = &self.input[start_pos + 1..end_pos];
                if !has_escapes {
                    return Ok(TokenKind::String(Cow::Borrowed(raw)));
                }
                return Ok(TokenKind::String(Cow::Owned(unescape(raw))));
            } else if ch == '\\' {
                has_escapes = true;
                self.advance();
                if self.current_char().is_some() {
                    self.advance();
                }
            } else {
                self.advance();
            }
        }

        Err(ExpressionError::syntax(format!(
            "unterminated string literal starting at position {start_pos}"
        )))
    }

    fn read_variable(&mut self) -> ExpressionResult<TokenKind<'a>> {
        self.advance();
        let start_pos = self.position;

        while let Some(ch) = self.current_char() {
            if !(ch.is_alphanumeric() || ch == '_') {
                break;
            }
            self.advance();
        }

        if start_pos == self.position {
            return Err(ExpressionError::syntax("expected variable name after $"));
        }

        Ok(TokenKind::Variable(&self.input[start_pos..self.position]))
    }

    fn read_number(&mut self) -> ExpressionResult<TokenKind<'a>> {
        let start_pos = self.position;
        let mut is_float = false;

        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                self.advance();
            } else if ch == '.' && !is_float && self.peek().is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.advance();
            } else {
                break;
            }
        }

        let literal = &self.input[start_pos..self.position];

        if is_float {
            literal
                .parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| ExpressionError::syntax(format!("invalid float literal '{literal}'")))
        } else {
            literal.parse::<i64>().map(TokenKind::Integer).map_err(|_| {
                ExpressionError::syntax(format!("invalid integer literal '{literal}'"))
            })
        }
    }

    fn read_identifier_or_keyword(&mut self) -> TokenKind<'a> {
        let start_pos = self.position;

        while let Some(ch) = self.current_char() {
            if !(ch.is_alphanumeric() || ch == '_') {
                break;
            }
            self.advance();
        }

        match &self.input[start_pos..self.position] {
            "true" => TokenKind::Boolean(true),
            "false" => TokenKind::Boolean(false),
            "null" => TokenKind::Null,
            "if" => TokenKind::If,
            "then" => TokenKind::Then,
            "else" => TokenKind::Else,
            name => TokenKind::Identifier(name),
        }
    }
}

fn unescape(raw: &str) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        if let Some(escaped) = chars.next() {
            result.push(match escaped {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                other => other,
            });
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(input: &str) -> Vec<TokenKind<'_>> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_simple_tokens() {
        assert_eq!(
            kinds("+ - * / %"),
            vec![
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Percent,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("42 3.5 -10"),
            vec![
                TokenKind::Integer(42),
                TokenKind::Float(3.5),
                TokenKind::Minus,
                TokenKind::Integer(10),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_strings_and_escapes() {
        let tokens = kinds(r#""hello" 'it\'s'"#);
        assert_eq!(tokens[0], TokenKind::String(Cow::Borrowed("hello")));
        assert_eq!(tokens[1], TokenKind::String(Cow::Owned("it's".to_string())));
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("== != <= >= && || =~ **"),
            vec![
                TokenKind::Equal,
                TokenKind::NotEqual,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::RegexMatch,
                TokenKind::Power,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("if prop then null else CONTEXT_VALUE"),
            vec![
                TokenKind::If,
                TokenKind::Identifier("prop"),
                TokenKind::Then,
                TokenKind::Null,
                TokenKind::Else,
                TokenKind::Identifier("CONTEXT_VALUE"),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_property_chain_is_not_a_float() {
        assert_eq!(
            kinds("level2.count"),
            vec![
                TokenKind::Identifier("level2"),
                TokenKind::Dot,
                TokenKind::Identifier("count"),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_variables() {
        assert_eq!(
            kinds("$this $root"),
            vec![
                TokenKind::Variable("this"),
                TokenKind::Variable("root"),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        assert!(Lexer::new(r#""hello"#).tokenize().is_err());
    }

    #[test]
    fn test_invalid_variable() {
        assert!(Lexer::new("$ ").tokenize().is_err());
    }

    #[test]
    fn test_unexpected_character() {
        let err = Lexer::new("a # b").tokenize().unwrap_err();
        assert_eq!(err.code(), "EXPR:SYNTAX");
    }
}
