//! Token types for the expression lexer

use std::borrow::Cow;

use super::span::Span;

/// A token with its position in the source
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    /// The token kind
    pub kind: TokenKind<'a>,
    /// Source span for this token
    pub span: Span,
}

impl<'a> Token<'a> {
    /// Create a new token with span
    pub fn new(kind: TokenKind<'a>, span: Span) -> Self {
        Self { kind, span }
    }
}

/// The kind of token
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    /// Integer literal
    Integer(i64),
    /// Float literal
    Float(f64),
    /// String literal; borrowed unless it contained escapes
    String(Cow<'a, str>),
    /// `true` / `false`
    Boolean(bool),
    /// `null`
    Null,

    /// Bare identifier
    Identifier(&'a str),
    /// `$name` variable reference
    Variable(&'a str),

    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `**`
    Power,

    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    LessThan,
    /// `>`
    GreaterThan,
    /// `<=`
    LessEqual,
    /// `>=`
    GreaterEqual,
    /// `=~`
    RegexMatch,

    /// `&&`
    And,
    /// `||`
    Or,
    /// `!`
    Not,

    /// `|`
    Pipe,

    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,

    /// `.`
    Dot,
    /// `,`
    Comma,

    /// `if`
    If,
    /// `then`
    Then,
    /// `else`
    Else,

    /// End of input
    Eof,
}

impl TokenKind<'_> {
    /// Check if this token is a binary operator
    pub fn is_binary_operator(&self) -> bool {
        self.precedence() > 0
    }

    /// Precedence of this operator (higher binds tighter, 0 for non-operators)
    pub fn precedence(&self) -> u8 {
        match self {
            TokenKind::Or => 1,
            TokenKind::And => 2,
            TokenKind::Equal | TokenKind::NotEqual => 3,
            TokenKind::LessThan
            | TokenKind::GreaterThan
            | TokenKind::LessEqual
            | TokenKind::GreaterEqual
            | TokenKind::RegexMatch => 4,
            TokenKind::Plus | TokenKind::Minus => 5,
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => 6,
            TokenKind::Power => 7,
            _ => 0,
        }
    }

    /// Check if this operator is right-associative
    pub fn is_right_associative(&self) -> bool {
        matches!(self, TokenKind::Power)
    }
}

impl std::fmt::Display for TokenKind<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Integer(n) => write!(f, "{n}"),
            TokenKind::Float(n) => write!(f, "{n}"),
            TokenKind::String(s) => write!(f, "\"{s}\""),
            TokenKind::Boolean(b) => write!(f, "{b}"),
            TokenKind::Null => write!(f, "null"),
            TokenKind::Identifier(s) => write!(f, "{s}"),
            TokenKind::Variable(s) => write!(f, "${s}"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::Power => write!(f, "**"),
            TokenKind::Equal => write!(f, "=="),
            TokenKind::NotEqual => write!(f, "!="),
            TokenKind::LessThan => write!(f, "<"),
            TokenKind::GreaterThan => write!(f, ">"),
            TokenKind::LessEqual => write!(f, "<="),
            TokenKind::GreaterEqual => write!(f, ">="),
            TokenKind::RegexMatch => write!(f, "=~"),
            TokenKind::And => write!(f, "&&"),
            TokenKind::Or => write!(f, "||"),
            TokenKind::Not => write!(f, "!"),
            TokenKind::Pipe => write!(f, "|"),
            TokenKind::LeftParen => write!(f, "("),
            TokenKind::RightParen => write!(f, ")"),
            TokenKind::LeftBracket => write!(f, "["),
            TokenKind::RightBracket => write!(f, "]"),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Comma => write!(f, ","),
            TokenKind::If => write!(f, "if"),
            TokenKind::Then => write!(f, "then"),
            TokenKind::Else => write!(f, "else"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}
