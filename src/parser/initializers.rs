//! Initializer parsing implementation
//!
//! Brace-enclosed initializer lists in the fixture language:
//!
//! ```text
//! initializer ::= "{" "}"
//!               | "{" init_item ("," init_item)* ","? "}"
//! init_item   ::= designator "=" init_value | init_value
//! designator  ::= ("." identifier)+
//! init_value  ::= constant | identifier | initializer
//! ```
//!
//! An empty `{}` is valid and means every member is zero-valued. Partial
//! lists are valid; matching values to members is the validator's job, not
//! the parser's.

use crate::parser::ast::*;
use crate::parser::lexer::Token;
use crate::parser::parse::{ParseError, Parser};

impl Parser {
    /// Parse a single initializer value: a scalar constant, an identifier
    /// (enum constant), or a nested brace list.
    pub(crate) fn parse_init_value(&mut self) -> Result<InitValue, ParseError> {
        if self.check(&Token::LBrace(self.current_location())) {
            return Ok(InitValue::List(self.parse_initializer_list()?));
        }

        let token = self.peek().clone();
        match token {
            Token::IntLiteral(n, loc) => {
                self.advance();
                Ok(InitValue::Int(n, loc))
            }
            Token::FloatLiteral(x, loc) => {
                self.advance();
                Ok(InitValue::Float(x, loc))
            }
            Token::CharLiteral(c, loc) => {
                self.advance();
                Ok(InitValue::Char(c, loc))
            }
            Token::StringLiteral(s, loc) => {
                self.advance();
                Ok(InitValue::Str(s, loc))
            }
            Token::Ident(name, loc) => {
                self.advance();
                Ok(InitValue::Ident(name, loc))
            }
            Token::Minus(loc) => {
                self.advance();
                match self.peek().clone() {
                    Token::IntLiteral(n, _) => {
                        self.advance();
                        Ok(InitValue::Int(-n, loc))
                    }
                    Token::FloatLiteral(x, _) => {
                        self.advance();
                        Ok(InitValue::Float(-x, loc))
                    }
                    _ => Err(ParseError::new(
                        "a numeric literal after '-'",
                        self.peek(),
                    )),
                }
            }
            _ => Err(ParseError::new("an initializer value", self.peek())),
        }
    }

    /// Parse a brace-enclosed initializer list, trailing comma allowed.
    pub(crate) fn parse_initializer_list(
        &mut self,
    ) -> Result<Initializer, ParseError> {
        let loc = self.current_location();
        self.expect_lbrace("to begin initializer")?;

        let mut items = Vec::new();

        // {} means all members zero-valued
        if self.match_token(&Token::RBrace(self.current_location())) {
            return Ok(Initializer {
                items,
                location: loc,
            });
        }

        loop {
            if self.check(&Token::Dot(self.current_location())) {
                let designator_loc = self.current_location();
                let mut path = Vec::new();
                while self.match_token(&Token::Dot(self.current_location())) {
                    path.push(self.expect_identifier()?);
                }
                self.expect_eq("after designator")?;
                let value = self.parse_init_value()?;
                items.push(InitItem::Designated {
                    path,
                    value,
                    location: designator_loc,
                });
            } else {
                items.push(InitItem::Positional(self.parse_init_value()?));
            }

            if self.match_token(&Token::Comma(self.current_location())) {
                if self.match_token(&Token::RBrace(self.current_location())) {
                    break;
                }
            } else {
                self.expect_rbrace("after initializer list")?;
                break;
            }
        }

        Ok(Initializer {
            items,
            location: loc,
        })
    }
}
