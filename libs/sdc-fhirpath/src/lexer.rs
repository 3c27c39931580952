//! FHIRPath lexer
//!
//! Turns an expression string into tokens. Comments (`//` and `/* */`) and
//! whitespace are skipped. Lexical errors are reported as `TokenType::Error`
//! tokens and surfaced by the parser.

use crate::error::{Error, Result};
use crate::token::{Token, TokenType};

pub struct Lexer {
    chars: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        if let Some(c) = self.current() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.position += 1;
        }
    }

    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            match (self.current(), self.peek()) {
                (Some(c), _) if c.is_whitespace() => self.advance(),
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.current() {
                        self.advance();
                        if c == '\n' {
                            break;
                        }
                    }
                }
                (Some('/'), Some('*')) => {
                    self.advance();
                    self.advance();
                    loop {
                        match (self.current(), self.peek()) {
                            (Some('*'), Some('/')) => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            (Some(_), _) => self.advance(),
                            (None, _) => {
                                return Err(Error::ParseError(
                                    "Unterminated block comment".into(),
                                ))
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_identifier(&mut self) -> String {
        let start = self.position;
        while let Some(c) = self.current() {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        self.chars[start..self.position].iter().collect()
    }

    /// Reads a quoted string or delimited identifier, resolving escapes.
    fn read_quoted(&mut self, quote: char) -> Result<String> {
        self.advance();
        let mut value = String::new();
        while let Some(c) = self.current() {
            if c == quote {
                self.advance();
                return Ok(value);
            }
            if c != '\\' {
                value.push(c);
                self.advance();
                continue;
            }
            self.advance();
            let escaped = self
                .current()
                .ok_or_else(|| Error::ParseError("Incomplete escape sequence".into()))?;
            match escaped {
                'f' => value.push('\x0C'),
                'n' => value.push('\n'),
                'r' => value.push('\r'),
                't' => value.push('\t'),
                'u' => {
                    self.advance();
                    let mut hex = String::with_capacity(4);
                    for _ in 0..4 {
                        match self.current() {
                            Some(h) if h.is_ascii_hexdigit() => {
                                hex.push(h);
                                self.advance();
                            }
                            _ => {
                                return Err(Error::ParseError(
                                    "Invalid unicode escape sequence".into(),
                                ))
                            }
                        }
                    }
                    let code = u32::from_str_radix(&hex, 16)
                        .map_err(|_| Error::ParseError("Invalid unicode code point".into()))?;
                    value.push(
                        char::from_u32(code)
                            .ok_or_else(|| Error::ParseError("Invalid unicode character".into()))?,
                    );
                    continue;
                }
                other => value.push(other),
            }
            self.advance();
        }
        Err(Error::ParseError(format!(
            "Unterminated literal, expected closing {quote}"
        )))
    }

    fn read_number(&mut self) -> String {
        let start = self.position;
        while matches!(self.current(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        // A dot only belongs to the number when digits follow: `1.abs()` is an invocation.
        if self.current() == Some('.') && matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
            while matches!(self.current(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
        } else if self.current() == Some('L') {
            // Long suffix is accepted and dropped.
            let value = self.chars[start..self.position].iter().collect();
            self.advance();
            return value;
        }
        self.chars[start..self.position].iter().collect()
    }

    fn read_digits(&mut self, count: usize, out: &mut String, what: &str) -> Result<()> {
        for _ in 0..count {
            match self.current() {
                Some(c) if c.is_ascii_digit() => {
                    out.push(c);
                    self.advance();
                }
                _ => {
                    return Err(Error::ParseError(format!(
                        "Invalid date/time literal: expected {count}-digit {what}"
                    )))
                }
            }
        }
        Ok(())
    }

    fn read_time(&mut self, out: &mut String) -> Result<()> {
        self.read_digits(2, out, "hour")?;
        if self.current() == Some(':') {
            out.push(':');
            self.advance();
            self.read_digits(2, out, "minute")?;
            if self.current() == Some(':') {
                out.push(':');
                self.advance();
                self.read_digits(2, out, "second")?;
                if self.current() == Some('.')
                    && matches!(self.peek(), Some(c) if c.is_ascii_digit())
                {
                    out.push('.');
                    self.advance();
                    while let Some(c) = self.current().filter(|c| c.is_ascii_digit()) {
                        out.push(c);
                        self.advance();
                    }
                }
            }
        }
        Ok(())
    }

    /// `@2020`, `@2020-01-02`, `@2020-01-02T10:00:00Z`, `@T10:30`
    fn read_temporal(&mut self) -> Result<(String, TokenType)> {
        self.advance();
        let mut value = String::new();
        if self.current() == Some('T') {
            self.advance();
            self.read_time(&mut value)?;
            return Ok((value, TokenType::TimeLiteral));
        }

        self.read_digits(4, &mut value, "year")?;
        if self.current() == Some('-') {
            value.push('-');
            self.advance();
            self.read_digits(2, &mut value, "month")?;
            if self.current() == Some('-') {
                value.push('-');
                self.advance();
                self.read_digits(2, &mut value, "day")?;
            }
        }

        if self.current() != Some('T') {
            return Ok((value, TokenType::DateLiteral));
        }
        value.push('T');
        self.advance();
        if matches!(self.current(), Some(c) if c.is_ascii_digit()) {
            self.read_time(&mut value)?;
            match self.current() {
                Some('Z') => {
                    value.push('Z');
                    self.advance();
                }
                Some(sign @ ('+' | '-')) => {
                    value.push(sign);
                    self.advance();
                    self.read_digits(2, &mut value, "timezone hour")?;
                    if self.current() != Some(':') {
                        return Err(Error::ParseError(
                            "Invalid timezone: expected ':' and 2-digit minute".into(),
                        ));
                    }
                    value.push(':');
                    self.advance();
                    self.read_digits(2, &mut value, "timezone minute")?;
                }
                _ => {}
            }
        }
        Ok((value, TokenType::DateTimeLiteral))
    }

    fn single(&mut self, token_type: TokenType, text: &str, line: usize, column: usize) -> Token {
        for _ in 0..text.chars().count() {
            self.advance();
        }
        Token::new(token_type, text, line, column)
    }

    pub fn next_token(&mut self) -> Token {
        if let Err(e) = self.skip_trivia() {
            return Token::error(e.to_string(), self.line, self.column);
        }

        let (line, column) = (self.line, self.column);
        let Some(c) = self.current() else {
            return Token::eof(line, column);
        };

        let wrap = |result: Result<String>, token_type: TokenType| match result {
            Ok(value) => Token::new(token_type, value, line, column),
            Err(e) => Token::error(e.to_string(), line, column),
        };

        match c {
            '.' => self.single(TokenType::Dot, ".", line, column),
            '[' => self.single(TokenType::OpenBracket, "[", line, column),
            ']' => self.single(TokenType::CloseBracket, "]", line, column),
            '(' => self.single(TokenType::OpenParen, "(", line, column),
            ')' => self.single(TokenType::CloseParen, ")", line, column),
            '{' => self.single(TokenType::OpenBrace, "{", line, column),
            '}' => self.single(TokenType::CloseBrace, "}", line, column),
            ',' => self.single(TokenType::Comma, ",", line, column),
            '+' => self.single(TokenType::Plus, "+", line, column),
            '-' => self.single(TokenType::Minus, "-", line, column),
            '*' => self.single(TokenType::Multiply, "*", line, column),
            '/' => self.single(TokenType::Divide, "/", line, column),
            '&' => self.single(TokenType::Ampersand, "&", line, column),
            '|' => self.single(TokenType::Pipe, "|", line, column),
            '=' => self.single(TokenType::Equal, "=", line, column),
            '~' => self.single(TokenType::Equivalent, "~", line, column),
            '<' if self.peek() == Some('=') => {
                self.single(TokenType::LessThanOrEqual, "<=", line, column)
            }
            '<' => self.single(TokenType::LessThan, "<", line, column),
            '>' if self.peek() == Some('=') => {
                self.single(TokenType::GreaterThanOrEqual, ">=", line, column)
            }
            '>' => self.single(TokenType::GreaterThan, ">", line, column),
            '!' if self.peek() == Some('=') => self.single(TokenType::NotEqual, "!=", line, column),
            '!' if self.peek() == Some('~') => {
                self.single(TokenType::NotEquivalent, "!~", line, column)
            }
            '!' => {
                self.advance();
                Token::error("Unexpected '!' character".into(), line, column)
            }
            '%' => {
                self.advance();
                match self.current() {
                    Some(q @ ('\'' | '`')) => {
                        let value = self.read_quoted(q);
                        wrap(value, TokenType::ExternalConstant)
                    }
                    _ => {
                        let ident = self.read_identifier();
                        if ident.is_empty() {
                            Token::error("Expected identifier after '%'".into(), line, column)
                        } else {
                            Token::new(TokenType::ExternalConstant, ident, line, column)
                        }
                    }
                }
            }
            '@' => match self.read_temporal() {
                Ok((value, token_type)) => Token::new(token_type, value, line, column),
                Err(e) => Token::error(e.to_string(), line, column),
            },
            '\'' => {
                let value = self.read_quoted('\'');
                wrap(value, TokenType::StringLiteral)
            }
            '`' => {
                let value = self.read_quoted('`');
                wrap(value, TokenType::DelimitedIdentifier)
            }
            '$' => {
                self.advance();
                let ident = self.read_identifier();
                match ident.as_str() {
                    "this" => Token::new(TokenType::This, "$this", line, column),
                    "index" => Token::new(TokenType::Index, "$index", line, column),
                    "total" => Token::new(TokenType::Total, "$total", line, column),
                    _ => Token::error(format!("Unknown variable: ${ident}"), line, column),
                }
            }
            c if c.is_ascii_digit() => {
                let value = self.read_number();
                Token::new(TokenType::NumberLiteral, value, line, column)
            }
            c if c.is_alphabetic() || c == '_' => {
                let ident = self.read_identifier();
                let token_type = match ident.as_str() {
                    "true" | "false" => TokenType::BooleanLiteral,
                    "as" => TokenType::As,
                    "is" => TokenType::Is,
                    "div" => TokenType::Div,
                    "mod" => TokenType::Mod,
                    "in" => TokenType::In,
                    "contains" => TokenType::Contains,
                    "and" => TokenType::And,
                    "or" => TokenType::Or,
                    "xor" => TokenType::Xor,
                    "implies" => TokenType::Implies,
                    _ => TokenType::Identifier,
                };
                Token::new(token_type, ident, line, column)
            }
            other => {
                self.advance();
                Token::error(format!("Unexpected character: {other}"), line, column)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(input: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(input);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token();
            let done = matches!(token.token_type, TokenType::Eof | TokenType::Error);
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }

    #[test]
    fn test_sdc_answer_path() {
        let tokens = tokenize("%resource.repeat(item).where(linkId='1').answer.value");
        assert_eq!(tokens[0].token_type, TokenType::ExternalConstant);
        assert_eq!(tokens[0].value, "resource");
        assert_eq!(tokens[4].token_type, TokenType::Identifier);
        assert_eq!(tokens[4].value, "item");
        assert!(tokens
            .iter()
            .any(|t| t.token_type == TokenType::StringLiteral && t.value == "1"));
    }

    #[test]
    fn test_numbers_and_invocation_on_number() {
        let tokens = tokenize("1.5 2.abs() 7L");
        assert_eq!(tokens[0].value, "1.5");
        assert_eq!(tokens[1].value, "2");
        assert_eq!(tokens[2].token_type, TokenType::Dot);
        assert_eq!(tokens[6].value, "7");
    }

    #[test]
    fn test_temporal_literals() {
        let tokens = tokenize("@2020-01-02 @2020-01-02T10:30:00+02:00 @T14:30");
        assert_eq!(tokens[0].token_type, TokenType::DateLiteral);
        assert_eq!(tokens[0].value, "2020-01-02");
        assert_eq!(tokens[1].token_type, TokenType::DateTimeLiteral);
        assert_eq!(tokens[1].value, "2020-01-02T10:30:00+02:00");
        assert_eq!(tokens[2].token_type, TokenType::TimeLiteral);
        assert_eq!(tokens[2].value, "14:30");
    }

    #[test]
    fn test_delimited_external_constant() {
        let tokens = tokenize("%`vs-gender` %'map-codes'");
        assert_eq!(tokens[0].token_type, TokenType::ExternalConstant);
        assert_eq!(tokens[0].value, "vs-gender");
        assert_eq!(tokens[1].value, "map-codes");
    }

    #[test]
    fn test_comments_and_operators() {
        let tokens = tokenize("a /* skip */ != b // trailing");
        assert_eq!(tokens[0].value, "a");
        assert_eq!(tokens[1].token_type, TokenType::NotEqual);
        assert_eq!(tokens[2].value, "b");
        assert_eq!(tokens[3].token_type, TokenType::Eof);
    }

    #[test]
    fn test_unterminated_string_is_error_token() {
        let tokens = tokenize("'abc");
        assert_eq!(tokens[0].token_type, TokenType::Error);
    }
}
