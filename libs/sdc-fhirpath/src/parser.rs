//! FHIRPath parser - converts string expressions to AST
//!
//! Recursive descent parser that follows the FHIRPath grammar precedence rules.
//! Precedence (lowest to highest):
//! 1. implies
//! 2. or/xor
//! 3. and
//! 4. membership (in, contains)
//! 5. equality (=, ~, !=, !~)
//! 6. inequality (<=, <, >, >=)
//! 7. union (|)
//! 8. type (is, as)
//! 9. additive (+, -, &)
//! 10. multiplicative (*, /, div, mod)
//! 11. polarity (+, -)
//! 12. indexer and invocation ([ ], .)
//! 13. term (invocation, literal, externalConstant, parenthesized)

use crate::ast::*;
use crate::error::{Error, Result};
use crate::lexer::Lexer;
use crate::temporal::{CalendarUnit, FhirDate, FhirDateTime, FhirTime};
use crate::token::{Token, TokenType};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Parser for FHIRPath expressions
pub struct Parser {
    lexer: Lexer,
    current_token: Token,
    recursion_depth: usize,
}

const MAX_RECURSION_DEPTH: usize = 200;

impl Parser {
    pub fn new(input: &str) -> Self {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token();
        Self {
            lexer,
            current_token,
            recursion_depth: 0,
        }
    }

    fn advance(&mut self) -> Token {
        let next = self.lexer.next_token();
        std::mem::replace(&mut self.current_token, next)
    }

    fn current_token_is(&self, token_type: TokenType) -> bool {
        self.current_token.token_type == token_type
    }

    fn current_token_is_one_of(&self, types: &[TokenType]) -> bool {
        types.contains(&self.current_token.token_type)
    }

    /// Expect a specific token type and advance
    fn expect(&mut self, token_type: TokenType) -> Result<Token> {
        if self.current_token_is(token_type) {
            return Ok(self.advance());
        }
        Err(self.unexpected(&format!("{:?}", token_type)))
    }

    fn unexpected(&self, wanted: &str) -> Error {
        let token = &self.current_token;
        if token.token_type == TokenType::Error {
            return Error::ParseError(format!(
                "{} at line {}, column {}",
                token.value, token.line, token.column
            ));
        }
        Error::ParseError(format!(
            "Expected {}, got {:?} at line {}, column {}",
            wanted, token.token_type, token.line, token.column
        ))
    }

    /// Parse the entire expression (top-level entry point)
    pub fn parse(&mut self) -> Result<AstNode> {
        let expr = self.parse_expression()?;
        if !self.current_token_is(TokenType::Eof) {
            return Err(self.unexpected("end of expression"));
        }
        Ok(expr)
    }

    fn parse_expression(&mut self) -> Result<AstNode> {
        self.recursion_depth += 1;
        if self.recursion_depth > MAX_RECURSION_DEPTH {
            return Err(Error::ParseError(format!(
                "Expression too deeply nested (max depth: {})",
                MAX_RECURSION_DEPTH
            )));
        }
        let expr = self.parse_implies_expression();
        self.recursion_depth -= 1;
        expr
    }

    fn parse_implies_expression(&mut self) -> Result<AstNode> {
        let mut left = self.parse_or_expression()?;
        while self.current_token_is(TokenType::Implies) {
            self.advance();
            let right = self.parse_or_expression()?;
            left = AstNode::binary(left, BinaryOperator::Implies, right);
        }
        Ok(left)
    }

    fn parse_or_expression(&mut self) -> Result<AstNode> {
        let mut left = self.parse_and_expression()?;
        while self.current_token_is_one_of(&[TokenType::Or, TokenType::Xor]) {
            let operator = match self.advance().token_type {
                TokenType::Xor => BinaryOperator::Xor,
                _ => BinaryOperator::Or,
            };
            let right = self.parse_and_expression()?;
            left = AstNode::binary(left, operator, right);
        }
        Ok(left)
    }

    fn parse_and_expression(&mut self) -> Result<AstNode> {
        let mut left = self.parse_membership_expression()?;
        while self.current_token_is(TokenType::And) {
            self.advance();
            let right = self.parse_membership_expression()?;
            left = AstNode::binary(left, BinaryOperator::And, right);
        }
        Ok(left)
    }

    fn parse_membership_expression(&mut self) -> Result<AstNode> {
        let mut left = self.parse_equality_expression()?;
        while self.current_token_is_one_of(&[TokenType::In, TokenType::Contains]) {
            let operator = match self.advance().token_type {
                TokenType::In => BinaryOperator::In,
                _ => BinaryOperator::Contains,
            };
            let right = self.parse_equality_expression()?;
            left = AstNode::binary(left, operator, right);
        }
        Ok(left)
    }

    fn parse_equality_expression(&mut self) -> Result<AstNode> {
        let mut left = self.parse_inequality_expression()?;
        loop {
            let operator = match self.current_token.token_type {
                TokenType::Equal => BinaryOperator::Equal,
                TokenType::Equivalent => BinaryOperator::Equivalent,
                TokenType::NotEqual => BinaryOperator::NotEqual,
                TokenType::NotEquivalent => BinaryOperator::NotEquivalent,
                _ => break,
            };
            self.advance();
            let right = self.parse_inequality_expression()?;
            left = AstNode::binary(left, operator, right);
        }
        Ok(left)
    }

    fn parse_inequality_expression(&mut self) -> Result<AstNode> {
        let mut left = self.parse_union_expression()?;
        loop {
            let operator = match self.current_token.token_type {
                TokenType::LessThan => BinaryOperator::LessThan,
                TokenType::LessThanOrEqual => BinaryOperator::LessThanOrEqual,
                TokenType::GreaterThan => BinaryOperator::GreaterThan,
                TokenType::GreaterThanOrEqual => BinaryOperator::GreaterThanOrEqual,
                _ => break,
            };
            self.advance();
            let right = self.parse_union_expression()?;
            left = AstNode::binary(left, operator, right);
        }
        Ok(left)
    }

    fn parse_union_expression(&mut self) -> Result<AstNode> {
        let mut left = self.parse_type_expression()?;
        while self.current_token_is(TokenType::Pipe) {
            self.advance();
            let right = self.parse_type_expression()?;
            left = AstNode::binary(left, BinaryOperator::Union, right);
        }
        Ok(left)
    }

    fn parse_type_expression(&mut self) -> Result<AstNode> {
        let mut expression = self.parse_additive_expression()?;
        while self.current_token_is_one_of(&[TokenType::Is, TokenType::As]) {
            let operator = match self.advance().token_type {
                TokenType::Is => TypeOperator::Is,
                _ => TypeOperator::As,
            };
            let type_specifier = self.parse_qualified_identifier()?;
            expression = AstNode::Type {
                expression: Box::new(expression),
                operator,
                type_specifier,
            };
        }
        Ok(expression)
    }

    fn parse_additive_expression(&mut self) -> Result<AstNode> {
        let mut left = self.parse_multiplicative_expression()?;
        loop {
            let operator = match self.current_token.token_type {
                TokenType::Plus => BinaryOperator::Add,
                TokenType::Minus => BinaryOperator::Subtract,
                TokenType::Ampersand => BinaryOperator::Concat,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative_expression()?;
            left = AstNode::binary(left, operator, right);
        }
        Ok(left)
    }

    fn parse_multiplicative_expression(&mut self) -> Result<AstNode> {
        let mut left = self.parse_polarity_expression()?;
        loop {
            let operator = match self.current_token.token_type {
                TokenType::Multiply => BinaryOperator::Multiply,
                TokenType::Divide => BinaryOperator::Divide,
                TokenType::Div => BinaryOperator::Div,
                TokenType::Mod => BinaryOperator::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_polarity_expression()?;
            left = AstNode::binary(left, operator, right);
        }
        Ok(left)
    }

    fn parse_polarity_expression(&mut self) -> Result<AstNode> {
        if !self.current_token_is_one_of(&[TokenType::Plus, TokenType::Minus]) {
            return self.parse_postfix_expression();
        }
        let is_minus = self.advance().token_type == TokenType::Minus;

        // Sign chains recurse here without passing through parse_expression.
        self.recursion_depth += 1;
        if self.recursion_depth > MAX_RECURSION_DEPTH {
            return Err(Error::ParseError(format!(
                "Expression too deeply nested (max depth: {})",
                MAX_RECURSION_DEPTH
            )));
        }
        // The sign applies to the whole postfix chain: `-1.abs()` is `-(1.abs())`.
        let expression = self.parse_polarity_expression();
        self.recursion_depth -= 1;

        Ok(AstNode::Polarity {
            operator: if is_minus {
                PolarityOperator::Minus
            } else {
                PolarityOperator::Plus
            },
            expression: Box::new(expression?),
        })
    }

    fn parse_postfix_expression(&mut self) -> Result<AstNode> {
        let term = self.parse_term()?;
        self.parse_postfix(term)
    }

    /// Indexers and `.invocation` chains following a term
    fn parse_postfix(&mut self, mut expr: AstNode) -> Result<AstNode> {
        loop {
            if self.current_token_is(TokenType::OpenBracket) {
                self.advance();
                let index = self.parse_expression()?;
                self.expect(TokenType::CloseBracket)?;
                expr = AstNode::Indexer {
                    collection: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.current_token_is(TokenType::Dot) {
                self.advance();
                let invocation = self.parse_invocation()?;
                expr = AstNode::Invocation {
                    target: Box::new(expr),
                    invocation: Box::new(invocation),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_term(&mut self) -> Result<AstNode> {
        match self.current_token.token_type {
            TokenType::OpenParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenType::CloseParen)?;
                Ok(expr)
            }
            TokenType::ExternalConstant => Ok(AstNode::ExternalConstant(self.advance().value)),
            TokenType::OpenBrace => self.parse_collection_literal(),
            TokenType::BooleanLiteral
            | TokenType::StringLiteral
            | TokenType::NumberLiteral
            | TokenType::DateLiteral
            | TokenType::DateTimeLiteral
            | TokenType::TimeLiteral => Ok(AstNode::Literal(self.parse_literal()?)),
            _ => self.parse_invocation(),
        }
    }

    fn parse_collection_literal(&mut self) -> Result<AstNode> {
        self.expect(TokenType::OpenBrace)?;
        if self.current_token_is(TokenType::CloseBrace) {
            self.advance();
            return Ok(AstNode::Literal(Literal::Null));
        }
        let mut elements = vec![self.parse_expression()?];
        while self.current_token_is(TokenType::Comma) {
            self.advance();
            elements.push(self.parse_expression()?);
        }
        self.expect(TokenType::CloseBrace)?;
        Ok(AstNode::CollectionLiteral(elements))
    }

    fn parse_literal(&mut self) -> Result<Literal> {
        let token = self.advance();
        match token.token_type {
            TokenType::BooleanLiteral => Ok(Literal::Boolean(token.value == "true")),
            TokenType::StringLiteral => Ok(Literal::String(token.value)),
            TokenType::NumberLiteral => self.parse_number(&token.value),
            TokenType::DateLiteral => FhirDate::parse(&token.value)
                .map(Literal::Date)
                .ok_or_else(|| Error::ParseError(format!("Invalid date literal @{}", token.value))),
            TokenType::DateTimeLiteral => FhirDateTime::parse(&token.value)
                .map(Literal::DateTime)
                .ok_or_else(|| {
                    Error::ParseError(format!("Invalid dateTime literal @{}", token.value))
                }),
            TokenType::TimeLiteral => FhirTime::parse(&token.value)
                .map(Literal::Time)
                .ok_or_else(|| Error::ParseError(format!("Invalid time literal @T{}", token.value))),
            other => Err(Error::ParseError(format!(
                "Unexpected token type for literal: {:?}",
                other
            ))),
        }
    }

    /// Number literal, optionally followed by a unit to form a quantity
    fn parse_number(&mut self, text: &str) -> Result<Literal> {
        let unit = if self.current_token_is(TokenType::StringLiteral) {
            Some(self.advance().value)
        } else if self.current_token_is(TokenType::Identifier)
            && CalendarUnit::is_keyword(&self.current_token.value)
        {
            Some(self.advance().value)
        } else {
            None
        };

        if let Some(unit) = unit {
            let value = Decimal::from_str(text)
                .map_err(|e| Error::ParseError(format!("Invalid number: {}", e)))?;
            return Ok(Literal::Quantity { value, unit });
        }
        if text.contains('.') {
            Decimal::from_str(text)
                .map(Literal::Decimal)
                .map_err(|e| Error::ParseError(format!("Invalid number: {}", e)))
        } else {
            i64::from_str(text)
                .map(Literal::Integer)
                .map_err(|e| Error::ParseError(format!("Invalid integer: {}", e)))
        }
    }

    fn parse_invocation(&mut self) -> Result<AstNode> {
        match self.current_token.token_type {
            TokenType::This => {
                self.advance();
                Ok(AstNode::This)
            }
            TokenType::Index => {
                self.advance();
                Ok(AstNode::Index)
            }
            TokenType::Total => {
                self.advance();
                Ok(AstNode::Total)
            }
            // Operator keywords double as function names: contains(), as(), is()
            TokenType::Identifier
            | TokenType::DelimitedIdentifier
            | TokenType::Contains
            | TokenType::In
            | TokenType::As
            | TokenType::Is => {
                let name = self.advance().value;
                if !self.current_token_is(TokenType::OpenParen) {
                    return Ok(AstNode::Member(name));
                }
                self.advance();
                let mut args = Vec::new();
                if !self.current_token_is(TokenType::CloseParen) {
                    loop {
                        args.push(self.parse_expression()?);
                        if !self.current_token_is(TokenType::Comma) {
                            break;
                        }
                        self.advance();
                    }
                }
                self.expect(TokenType::CloseParen)?;
                Ok(AstNode::Function { name, args })
            }
            _ => Err(self.unexpected("invocation")),
        }
    }

    fn parse_qualified_identifier(&mut self) -> Result<QualifiedIdentifier> {
        let mut parts = Vec::new();
        loop {
            if !self.current_token_is_one_of(&[TokenType::Identifier, TokenType::DelimitedIdentifier])
            {
                return Err(self.unexpected("type identifier"));
            }
            parts.push(self.advance().value);
            if !self.current_token_is(TokenType::Dot) {
                break;
            }
            self.advance();
        }
        Ok(QualifiedIdentifier::new(parts))
    }
}

/// Parses `input` into an AST.
pub fn parse(input: &str) -> Result<AstNode> {
    Parser::new(input).parse()
}
