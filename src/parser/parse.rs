//! Main parser coordinator
//!
//! This module provides the [`Parser`] struct and core parsing
//! infrastructure: the error type, token-cursor helper methods, and the main
//! parse entry point.
//!
//! # Parser Architecture
//!
//! The Parser uses a recursive descent approach with the following
//! organization:
//! - This module: Parser struct, helper methods, and coordination
//! - `declarations`: Parsing type specifiers, members, typedefs, variables
//! - `initializers`: Parsing initializer lists and designators
//!
//! Parser methods are split across multiple files using `impl Parser` blocks,
//! allowing each module to extend the Parser with related functionality while
//! maintaining access to the shared parser state.

use crate::parser::ast::*;
use crate::parser::lexer::{LexError, Lexer, Token};
use std::fmt;

/// Parser error type: what the grammar expected vs. what the token stream
/// held.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub expected: String,
    pub found: String,
    pub location: SourceLocation,
}

impl ParseError {
    pub(crate) fn new(
        expected: impl Into<String>,
        found: &Token,
    ) -> Self {
        ParseError {
            expected: expected.into(),
            found: found.to_string(),
            location: found.location(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Parse error at line {}, column {}: expected {}, found {}",
            self.location.line, self.location.column, self.expected, self.found
        )
    }
}

impl std::error::Error for ParseError {}

/// Recursive descent parser for C declaration text
#[derive(Debug)]
pub struct Parser {
    pub(crate) tokens: Vec<Token>,
    pub(crate) position: usize,
}

impl Parser {
    /// Tokenize `source` and set up a parser over the token stream.
    pub fn new(source: &str) -> Result<Self, LexError> {
        let mut lexer = Lexer::new(source);
        let tokens = lexer.tokenize()?;
        Ok(Self {
            tokens,
            position: 0,
        })
    }

    /// Parse the entire unit (an ordered sequence of top-level declarations)
    pub fn parse_unit(&mut self) -> Result<TranslationUnit, ParseError> {
        let mut unit = TranslationUnit::new();

        while !self.is_at_end() {
            self.parse_declaration(&mut unit.decls)?;
        }

        Ok(unit)
    }

    // ===== Helper methods =====

    pub(crate) fn match_token(&mut self, token: &Token) -> bool {
        if std::mem::discriminant(self.peek())
            == std::mem::discriminant(token)
        {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn check(&self, token: &Token) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(token)
    }

    pub(crate) fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.position += 1;
        }
        self.previous()
    }

    pub(crate) fn is_at_end(&self) -> bool {
        matches!(self.peek(), Token::Eof(_))
    }

    pub(crate) fn peek(&self) -> &Token {
        &self.tokens[self.position]
    }

    pub(crate) fn previous(&self) -> &Token {
        &self.tokens[self.position - 1]
    }

    pub(crate) fn current_location(&self) -> SourceLocation {
        self.peek().location()
    }

    pub(crate) fn expect_token(
        &mut self,
        token: &Token,
        expected: &str,
    ) -> Result<(), ParseError> {
        if self.check(token) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::new(expected, self.peek()))
        }
    }

    pub(crate) fn expect_lbrace(&mut self, ctx: &str) -> Result<(), ParseError> {
        self.expect_token(
            &Token::LBrace(self.current_location()),
            &format!("'{{' {ctx}"),
        )
    }

    pub(crate) fn expect_rbrace(&mut self, ctx: &str) -> Result<(), ParseError> {
        self.expect_token(
            &Token::RBrace(self.current_location()),
            &format!("'}}' {ctx}"),
        )
    }

    pub(crate) fn expect_rbracket(
        &mut self,
        ctx: &str,
    ) -> Result<(), ParseError> {
        self.expect_token(
            &Token::RBracket(self.current_location()),
            &format!("']' {ctx}"),
        )
    }

    pub(crate) fn expect_semicolon(
        &mut self,
        ctx: &str,
    ) -> Result<(), ParseError> {
        self.expect_token(
            &Token::Semicolon(self.current_location()),
            &format!("';' {ctx}"),
        )
    }

    pub(crate) fn expect_eq(&mut self, ctx: &str) -> Result<(), ParseError> {
        self.expect_token(
            &Token::Eq(self.current_location()),
            &format!("'=' {ctx}"),
        )
    }

    pub(crate) fn expect_identifier(&mut self) -> Result<String, ParseError> {
        if let Token::Ident(name, _) = self.peek() {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(ParseError::new("identifier", self.peek()))
        }
    }
}
