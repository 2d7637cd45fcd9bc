//! Parser for converting tokens into an AST
//!
//! Recursive descent with precedence climbing for binary operators.

use std::sync::Arc;

use serde_json::Value;

use crate::core::ast::{BinaryOp, Expr};
use crate::core::token::{Token, TokenKind};
use crate::error::{ExpressionError, ExpressionResult};
use crate::lexer::Lexer;

static EOF: TokenKind<'static> = TokenKind::Eof;

/// Parse an expression source into an AST.
pub fn parse(source: &str) -> ExpressionResult<Expr> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse()
}

/// Parser for converting tokens into an AST
pub struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser from a list of tokens
    pub fn new(tokens: Vec<Token<'a>>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    /// Parse the whole token stream into a single expression
    pub fn parse(&mut self) -> ExpressionResult<Expr> {
        if self.current() == &TokenKind::Eof {
            return Err(ExpressionError::parse("empty expression"));
        }
        let expr = self.parse_expression()?;
        if self.current() != &TokenKind::Eof {
            return Err(ExpressionError::parse(format!(
                "unexpected trailing token: {}",
                self.current()
            )));
        }
        Ok(expr)
    }

    fn parse_expression(&mut self) -> ExpressionResult<Expr> {
        self.parse_conditional()
    }

    /// `if condition then value1 else value2`
    fn parse_conditional(&mut self) -> ExpressionResult<Expr> {
        if !self.match_token(&TokenKind::If) {
            return self.parse_pipeline();
        }
        let condition = Box::new(self.parse_pipeline()?);
        self.expect(&TokenKind::Then)?;
        let then_expr = Box::new(self.parse_pipeline()?);
        self.expect(&TokenKind::Else)?;
        let else_expr = Box::new(self.parse_expression()?);

        Ok(Expr::Conditional {
            condition,
            then_expr,
            else_expr,
        })
    }

    fn parse_pipeline(&mut self) -> ExpressionResult<Expr> {
        let mut expr = self.parse_binary(0)?;

        while self.match_token(&TokenKind::Pipe) {
            let TokenKind::Identifier(name) = self.current() else {
                return Err(ExpressionError::parse("expected function name after |"));
            };
            let function: Arc<str> = Arc::from(*name);
            self.advance();

            let args = if self.current() == &TokenKind::LeftParen {
                self.parse_call_args()?
            } else {
                Vec::new()
            };

            expr = Expr::Pipeline {
                value: Box::new(expr),
                function,
                args,
            };
        }

        Ok(expr)
    }

    fn parse_binary(&mut self, min_precedence: u8) -> ExpressionResult<Expr> {
        let mut left = self.parse_unary()?;

        while self.current().is_binary_operator() {
            let op_token = self.current().clone();
            let precedence = op_token.precedence();
            if precedence < min_precedence {
                break;
            }
            self.advance();

            let next_min = if op_token.is_right_associative() {
                precedence
            } else {
                precedence + 1
            };
            let right = self.parse_binary(next_min)?;

            left = Expr::Binary {
                left: Box::new(left),
                op: binary_op(&op_token)?,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> ExpressionResult<Expr> {
        if self.match_token(&TokenKind::Minus) {
            return Ok(Expr::Negate(Box::new(self.parse_unary()?)));
        }
        if self.match_token(&TokenKind::Not) {
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_postfix()
    }

    /// Property and index access chains
    fn parse_postfix(&mut self) -> ExpressionResult<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.match_token(&TokenKind::Dot) {
                let TokenKind::Identifier(name) = self.current() else {
                    return Err(ExpressionError::parse("expected property name after ."));
                };
                let property: Arc<str> = Arc::from(*name);
                self.advance();
                expr = Expr::PropertyAccess {
                    object: Box::new(expr),
                    property,
                };
            } else if self.match_token(&TokenKind::LeftBracket) {
                let index = self.parse_expression()?;
                self.expect(&TokenKind::RightBracket)?;
                expr = Expr::IndexAccess {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> ExpressionResult<Expr> {
        let token = self.current().clone();
        match token {
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Expr::Literal(Value::from(n)))
            }
            TokenKind::Float(n) => {
                self.advance();
                Ok(Expr::Literal(Value::from(n)))
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Expr::Literal(Value::String(s.into_owned())))
            }
            TokenKind::Boolean(b) => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(b)))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Literal(Value::Null))
            }
            TokenKind::Variable(name) => {
                self.advance();
                Ok(Expr::Variable(Arc::from(name)))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if self.current() == &TokenKind::LeftParen {
                    let args = self.parse_call_args()?;
                    Ok(Expr::FunctionCall {
                        name: Arc::from(name),
                        args,
                    })
                } else {
                    Ok(Expr::Identifier(Arc::from(name)))
                }
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RightParen)?;
                Ok(expr)
            }
            TokenKind::LeftBracket => {
                self.advance();
                let mut elements = Vec::new();
                if self.current() != &TokenKind::RightBracket {
                    loop {
                        elements.push(self.parse_expression()?);
                        if !self.match_token(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RightBracket)?;
                Ok(Expr::Array(elements))
            }
            other => Err(ExpressionError::parse(format!("unexpected token: {other}"))),
        }
    }

    fn parse_call_args(&mut self) -> ExpressionResult<Vec<Expr>> {
        self.expect(&TokenKind::LeftParen)?;
        let mut args = Vec::new();

        if self.current() != &TokenKind::RightParen {
            loop {
                args.push(self.parse_expression()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect(&TokenKind::RightParen)?;
        Ok(args)
    }

    fn current(&self) -> &TokenKind<'a> {
        self.tokens.get(self.position).map_or(&EOF, |t| &t.kind)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn match_token(&mut self, expected: &TokenKind<'_>) -> bool {
        if self.current() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &TokenKind<'_>) -> ExpressionResult<()> {
        if self.match_token(expected) {
            Ok(())
        } else {
            Err(ExpressionError::parse(format!(
                "expected {expected}, found {}",
                self.current()
            )))
        }
    }
}

fn binary_op(token: &TokenKind<'_>) -> ExpressionResult<BinaryOp> {
    Ok(match token {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Subtract,
        TokenKind::Star => BinaryOp::Multiply,
        TokenKind::Slash => BinaryOp::Divide,
        TokenKind::Percent => BinaryOp::Modulo,
        TokenKind::Power => BinaryOp::Power,
        TokenKind::Equal => BinaryOp::Equal,
        TokenKind::NotEqual => BinaryOp::NotEqual,
        TokenKind::LessThan => BinaryOp::LessThan,
        TokenKind::GreaterThan => BinaryOp::GreaterThan,
        TokenKind::LessEqual => BinaryOp::LessEqual,
        TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
        TokenKind::RegexMatch => BinaryOp::RegexMatch,
        TokenKind::And => BinaryOp::And,
        TokenKind::Or => BinaryOp::Or,
        other => {
            return Err(ExpressionError::parse(format!(
                "unexpected operator: {other}"
            )));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literal() {
        assert!(parse("42").unwrap().is_literal());
    }

    #[test]
    fn test_precedence() {
        let expr = parse("1 + 2 * 3").unwrap();
        let Expr::Binary { op, right, .. } = expr else {
            panic!("expected binary expression");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(
            *right,
            Expr::Binary {
                op: BinaryOp::Multiply,
                ..
            }
        ));
    }

    #[test]
    fn test_power_is_right_associative() {
        let expr = parse("2 ** 3 ** 2").unwrap();
        let Expr::Binary { left, right, .. } = expr else {
            panic!("expected binary expression");
        };
        assert!(left.is_literal());
        assert!(matches!(*right, Expr::Binary { .. }));
    }

    #[test]
    fn test_parse_property_chain() {
        let expr = parse("level2.level3[0].prop").unwrap();
        assert!(matches!(expr, Expr::PropertyAccess { .. }));
        assert_eq!(
            expr.referenced_identifiers().into_iter().collect::<Vec<_>>(),
            vec!["level2".to_string()]
        );
    }

    #[test]
    fn test_parse_pipeline() {
        let expr = parse("name | trim | length").unwrap();
        assert!(matches!(expr, Expr::Pipeline { .. }));
        assert_eq!(expr.called_functions().len(), 2);
    }

    #[test]
    fn test_parse_conditional() {
        let expr = parse("if a then 1 else if b then 2 else 3").unwrap();
        assert!(matches!(expr, Expr::Conditional { .. }));
    }

    #[test]
    fn test_rejects_trailing_tokens() {
        assert!(parse("a b").is_err());
    }

    #[test]
    fn test_rejects_empty_source() {
        assert!(parse("   ").is_err());
    }

    #[test]
    fn test_unclosed_call() {
        let err = parse("trim(name").unwrap_err();
        assert_eq!(err.code(), "EXPR:PARSE");
    }
}
