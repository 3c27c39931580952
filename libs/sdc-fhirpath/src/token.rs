//! Token types produced by the lexer

#[derive(Debug, PartialEq, Clone, Copy, Eq)]
pub enum TokenType {
    // Literals
    StringLiteral,
    NumberLiteral,
    DateLiteral,
    DateTimeLiteral,
    TimeLiteral,
    BooleanLiteral,

    // Identifiers
    Identifier,
    DelimitedIdentifier,

    // Keywords
    As,
    Is,
    Div,
    Mod,
    In,
    Contains,
    And,
    Or,
    Xor,
    Implies,
    This,  // $this
    Index, // $index
    Total, // $total

    /// `%identifier`, `%'string'` or %`delimited`
    ExternalConstant,

    // Operators
    Dot,
    OpenBracket,
    CloseBracket,
    Plus,
    Minus,
    Multiply,
    Divide,
    Ampersand,
    Pipe,
    LessThanOrEqual,
    LessThan,
    GreaterThanOrEqual,
    GreaterThan,
    Equal,
    Equivalent,
    NotEqual,
    NotEquivalent,

    // Delimiters
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    Comma,

    Eof,
    Error,
}

/// A token with its source position (1-based line/column)
#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    pub value: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(token_type: TokenType, value: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            token_type,
            value: value.into(),
            line,
            column,
        }
    }

    pub fn eof(line: usize, column: usize) -> Self {
        Self::new(TokenType::Eof, String::new(), line, column)
    }

    pub fn error(message: String, line: usize, column: usize) -> Self {
        Self::new(TokenType::Error, message, line, column)
    }
}
