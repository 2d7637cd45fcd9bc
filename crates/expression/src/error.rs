//! Error types for parsing and evaluating expressions.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type ExpressionResult<T> = Result<T, ExpressionError>;

/// Expression parsing and evaluation errors
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    /// The lexer met input it cannot tokenize
    #[error("expression syntax error: {message}")]
    SyntaxError {
        /// What went wrong
        message: String,
    },

    /// The token stream does not form a valid expression
    #[error("expression parse error: {message}")]
    ParseError {
        /// What went wrong
        message: String,
    },

    /// Evaluation failed
    #[error("expression evaluation error: {message}")]
    EvalError {
        /// What went wrong
        message: String,
    },

    /// Operand or argument of the wrong type
    #[error("type error: expected {expected}, found {actual}")]
    TypeError {
        /// Expected type description
        expected: String,
        /// Actual type description
        actual: String,
    },

    /// A `$variable` was not bound in the context
    #[error("variable '${name}' not found")]
    VariableNotFound {
        /// Variable name without the `$` prefix
        name: String,
    },

    /// Call to a function that is not registered
    #[error("function '{name}' not found")]
    FunctionNotFound {
        /// Function name
        name: String,
    },

    /// A builtin rejected its arguments
    #[error("invalid argument for {function}: {message}")]
    InvalidArgument {
        /// Function name
        function: String,
        /// What went wrong
        message: String,
    },

    /// Division or modulo by zero
    #[error("division by zero")]
    DivisionByZero,

    /// Regex compilation failed
    #[error("regex error: {message}")]
    RegexError {
        /// Compiler message
        message: String,
    },

    /// Array index outside of bounds
    #[error("index out of bounds: index {index} is out of range for array of length {length}")]
    IndexOutOfBounds {
        /// Requested index
        index: i64,
        /// Array length
        length: usize,
    },
}

impl ExpressionError {
    /// Stable error code for categorization
    pub fn code(&self) -> &'static str {
        match self {
            Self::SyntaxError { .. } => "EXPR:SYNTAX",
            Self::ParseError { .. } => "EXPR:PARSE",
            Self::EvalError { .. } => "EXPR:EVAL",
            Self::TypeError { .. } => "EXPR:TYPE",
            Self::VariableNotFound { .. } => "EXPR:VAR_NOT_FOUND",
            Self::FunctionNotFound { .. } => "EXPR:FUNC_NOT_FOUND",
            Self::InvalidArgument { .. } => "EXPR:INVALID_ARG",
            Self::DivisionByZero => "EXPR:DIV_ZERO",
            Self::RegexError { .. } => "EXPR:REGEX",
            Self::IndexOutOfBounds { .. } => "EXPR:INDEX_OOB",
        }
    }

    /// Whether the error was raised before evaluation started
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            Self::SyntaxError { .. } | Self::ParseError { .. } | Self::FunctionNotFound { .. }
        )
    }

    /// Create a syntax error
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::SyntaxError {
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
        }
    }

    /// Create an evaluation error
    pub fn eval(message: impl Into<String>) -> Self {
        Self::EvalError {
            message: message.into(),
        }
    }

    /// Create a type error
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeError {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a variable-not-found error
    pub fn variable_not_found(name: impl Into<String>) -> Self {
        Self::VariableNotFound { name: name.into() }
    }

    /// Create a function-not-found error
    pub fn function_not_found(name: impl Into<String>) -> Self {
        Self::FunctionNotFound { name: name.into() }
    }

    /// Create an invalid-argument error
    pub fn invalid_argument(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Create a regex error
    pub fn regex(message: impl Into<String>) -> Self {
        Self::RegexError {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ExpressionError::DivisionByZero.code(), "EXPR:DIV_ZERO");
        assert_eq!(ExpressionError::syntax("x").code(), "EXPR:SYNTAX");
        assert_eq!(ExpressionError::variable_not_found("v").code(), "EXPR:VAR_NOT_FOUND");
    }

    #[test]
    fn compile_errors_are_classified() {
        assert!(ExpressionError::parse("bad").is_compile_error());
        assert!(ExpressionError::function_not_found("nope").is_compile_error());
        assert!(!ExpressionError::DivisionByZero.is_compile_error());
    }

    #[test]
    fn display_mentions_variable_sigil() {
        let err = ExpressionError::variable_not_found("record");
        assert_eq!(err.to_string(), "variable '$record' not found");
    }
}
