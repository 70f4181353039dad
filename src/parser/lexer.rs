//! Lexer (tokenizer) for C declaration text
//!
//! Converts raw declaration text into a flat [`Token`] stream consumed by the
//! parser. Preprocessor directives (`#include`, `#define`, ...) are silently
//! skipped rather than parsed; the input is expected to be already
//! preprocessed by the caller.

use super::ast::SourceLocation;
use std::fmt;

/// All token variants produced by the lexer.
///
/// Every variant carries a [`SourceLocation`] so that parse errors can report
/// an accurate line and column without a separate token→location table.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    IntLiteral(i64, SourceLocation),
    FloatLiteral(f64, SourceLocation),
    CharLiteral(i8, SourceLocation),
    StringLiteral(String, SourceLocation),

    // Identifiers
    Ident(String, SourceLocation),

    // Keywords
    Struct(SourceLocation),
    Union(SourceLocation),
    Enum(SourceLocation),
    Typedef(SourceLocation),
    Const(SourceLocation),
    Volatile(SourceLocation),
    Signed(SourceLocation),
    Unsigned(SourceLocation),
    Void(SourceLocation),
    Char(SourceLocation),
    Short(SourceLocation),
    Int(SourceLocation),
    Long(SourceLocation),
    Float(SourceLocation),
    Double(SourceLocation),

    // Punctuation
    Star(SourceLocation),      // *
    Eq(SourceLocation),        // =
    Dot(SourceLocation),       // .
    Minus(SourceLocation),     // -
    Colon(SourceLocation),     // :
    LParen(SourceLocation),    // (
    RParen(SourceLocation),    // )
    LBrace(SourceLocation),    // {
    RBrace(SourceLocation),    // }
    LBracket(SourceLocation),  // [
    RBracket(SourceLocation),  // ]
    Semicolon(SourceLocation), // ;
    Comma(SourceLocation),     // ,

    // End of file
    Eof(SourceLocation),
}

impl Token {
    /// Returns the source location where this token appears.
    pub fn location(&self) -> SourceLocation {
        match self {
            Token::IntLiteral(_, loc)
            | Token::FloatLiteral(_, loc)
            | Token::CharLiteral(_, loc)
            | Token::StringLiteral(_, loc)
            | Token::Ident(_, loc)
            | Token::Struct(loc)
            | Token::Union(loc)
            | Token::Enum(loc)
            | Token::Typedef(loc)
            | Token::Const(loc)
            | Token::Volatile(loc)
            | Token::Signed(loc)
            | Token::Unsigned(loc)
            | Token::Void(loc)
            | Token::Char(loc)
            | Token::Short(loc)
            | Token::Int(loc)
            | Token::Long(loc)
            | Token::Float(loc)
            | Token::Double(loc)
            | Token::Star(loc)
            | Token::Eq(loc)
            | Token::Dot(loc)
            | Token::Minus(loc)
            | Token::Colon(loc)
            | Token::LParen(loc)
            | Token::RParen(loc)
            | Token::LBrace(loc)
            | Token::RBrace(loc)
            | Token::LBracket(loc)
            | Token::RBracket(loc)
            | Token::Semicolon(loc)
            | Token::Comma(loc)
            | Token::Eof(loc) => *loc,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::IntLiteral(n, _) => write!(f, "int literal {}", n),
            Token::FloatLiteral(x, _) => write!(f, "float literal {}", x),
            Token::CharLiteral(c, _) => {
                let byte = *c as u8;
                if byte.is_ascii_graphic() || byte == b' ' {
                    write!(f, "char literal '{}'", byte as char)
                } else {
                    write!(f, "char literal '\\x{:02x}'", byte)
                }
            }
            Token::StringLiteral(s, _) => write!(f, "string literal \"{}\"", s),
            Token::Ident(s, _) => write!(f, "identifier '{}'", s),
            Token::Struct(_) => write!(f, "'struct'"),
            Token::Union(_) => write!(f, "'union'"),
            Token::Enum(_) => write!(f, "'enum'"),
            Token::Typedef(_) => write!(f, "'typedef'"),
            Token::Const(_) => write!(f, "'const'"),
            Token::Volatile(_) => write!(f, "'volatile'"),
            Token::Signed(_) => write!(f, "'signed'"),
            Token::Unsigned(_) => write!(f, "'unsigned'"),
            Token::Void(_) => write!(f, "'void'"),
            Token::Char(_) => write!(f, "'char'"),
            Token::Short(_) => write!(f, "'short'"),
            Token::Int(_) => write!(f, "'int'"),
            Token::Long(_) => write!(f, "'long'"),
            Token::Float(_) => write!(f, "'float'"),
            Token::Double(_) => write!(f, "'double'"),
            Token::Star(_) => write!(f, "'*'"),
            Token::Eq(_) => write!(f, "'='"),
            Token::Dot(_) => write!(f, "'.'"),
            Token::Minus(_) => write!(f, "'-'"),
            Token::Colon(_) => write!(f, "':'"),
            Token::LParen(_) => write!(f, "'('"),
            Token::RParen(_) => write!(f, "')'"),
            Token::LBrace(_) => write!(f, "'{{'"),
            Token::RBrace(_) => write!(f, "'}}'"),
            Token::LBracket(_) => write!(f, "'['"),
            Token::RBracket(_) => write!(f, "']'"),
            Token::Semicolon(_) => write!(f, "';'"),
            Token::Comma(_) => write!(f, "','"),
            Token::Eof(_) => write!(f, "end of file"),
        }
    }
}

/// Lexer error type
#[derive(Debug, Clone)]
pub struct LexError {
    pub message: String,
    pub location: SourceLocation,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Lexer error at line {}, column {}: {}",
            self.location.line, self.location.column, self.message
        )
    }
}

impl std::error::Error for LexError {}

/// Lexer for C declaration text
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    finished: bool,
}

impl Lexer {
    /// Create a new lexer for the given source string.
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            finished: false,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace_and_comments()?;

            if self.is_at_end() {
                tokens.push(Token::Eof(self.current_location()));
                break;
            }

            // Skip preprocessor directive lines
            if self.peek() == Some('#') {
                self.skip_preprocessor_directive();
                continue;
            }

            tokens.push(self.next_token()?);
        }

        Ok(tokens)
    }

    /// Get next token
    fn next_token(&mut self) -> Result<Token, LexError> {
        let loc = self.current_location();
        let ch = self.advance().ok_or_else(|| LexError {
            message: "Unexpected end of file".to_string(),
            location: loc,
        })?;

        match ch {
            // String literals
            '"' => self.string_literal(),

            // Character literals
            '\'' => self.char_literal(),

            // Numeric literals
            '0'..='9' => self.number_literal(ch),

            // Identifiers and keywords
            'a'..='z' | 'A'..='Z' | '_' => self.identifier_or_keyword(ch),

            // Punctuation
            '*' => Ok(Token::Star(loc)),
            '=' => Ok(Token::Eq(loc)),
            '.' => Ok(Token::Dot(loc)),
            '-' => Ok(Token::Minus(loc)),
            ':' => Ok(Token::Colon(loc)),
            '(' => Ok(Token::LParen(loc)),
            ')' => Ok(Token::RParen(loc)),
            '{' => Ok(Token::LBrace(loc)),
            '}' => Ok(Token::RBrace(loc)),
            '[' => Ok(Token::LBracket(loc)),
            ']' => Ok(Token::RBracket(loc)),
            ';' => Ok(Token::Semicolon(loc)),
            ',' => Ok(Token::Comma(loc)),

            _ => Err(LexError {
                message: format!("Unexpected character: '{}'", ch),
                location: loc,
            }),
        }
    }

    /// Parse string literal
    fn string_literal(&mut self) -> Result<Token, LexError> {
        let loc = SourceLocation::new(self.line, self.column - 1);
        let mut string = String::new();

        while let Some(ch) = self.peek() {
            if ch == '"' {
                self.advance(); // consume closing quote
                return Ok(Token::StringLiteral(string, loc));
            }

            if ch == '\\' {
                self.advance();
                let escaped = self.advance().ok_or_else(|| LexError {
                    message: "Unexpected end of file in string literal"
                        .to_string(),
                    location: self.current_location(),
                })?;

                let unescaped = match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '\\' => '\\',
                    '"' => '"',
                    '0' => '\0',
                    _ => {
                        return Err(LexError {
                            message: format!(
                                "Unknown escape sequence: \\{}",
                                escaped
                            ),
                            location: self.current_location(),
                        });
                    }
                };
                string.push(unescaped);
            } else {
                string.push(ch);
                self.advance();
            }
        }

        Err(LexError {
            message: "Unterminated string literal".to_string(),
            location: loc,
        })
    }

    /// Parse character literal
    fn char_literal(&mut self) -> Result<Token, LexError> {
        let loc = SourceLocation::new(self.line, self.column - 1);

        let ch = self.advance().ok_or_else(|| LexError {
            message: "Unterminated character literal".to_string(),
            location: loc,
        })?;

        let value = if ch == '\\' {
            let escaped = self.advance().ok_or_else(|| LexError {
                message: "Unterminated character literal".to_string(),
                location: loc,
            })?;

            match escaped {
                'n' => '\n' as i8,
                't' => '\t' as i8,
                'r' => '\r' as i8,
                '\\' => '\\' as i8,
                '\'' => '\'' as i8,
                '0' => 0,
                _ => {
                    return Err(LexError {
                        message: format!(
                            "Unknown escape sequence: \\{}",
                            escaped
                        ),
                        location: self.current_location(),
                    });
                }
            }
        } else {
            ch as i8
        };

        // Expect closing quote
        if self.advance() != Some('\'') {
            return Err(LexError {
                message: "Expected closing quote in character literal"
                    .to_string(),
                location: self.current_location(),
            });
        }

        Ok(Token::CharLiteral(value, loc))
    }

    /// Parse numeric literal (decimal or hex integers, simple floats)
    fn number_literal(&mut self, first_digit: char) -> Result<Token, LexError> {
        let loc = SourceLocation::new(self.line, self.column - 1);

        // Hex: 0x...
        if first_digit == '0' && matches!(self.peek(), Some('x') | Some('X')) {
            self.advance();
            let mut hex_str = String::new();
            while let Some(ch) = self.peek() {
                if ch.is_ascii_hexdigit() {
                    hex_str.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }
            if hex_str.is_empty() {
                return Err(LexError {
                    message: "Incomplete hex literal".to_string(),
                    location: loc,
                });
            }
            let value =
                i64::from_str_radix(&hex_str, 16).map_err(|_| LexError {
                    message: format!("Invalid hex literal: 0x{}", hex_str),
                    location: loc,
                })?;
            self.skip_integer_suffix();
            return Ok(Token::IntLiteral(value, loc));
        }

        let mut num_str = String::new();
        num_str.push(first_digit);

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                num_str.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        // A '.' followed by a digit makes this a float literal
        if self.peek() == Some('.')
            && self.peek_ahead(1).is_some_and(|c| c.is_ascii_digit())
        {
            num_str.push('.');
            self.advance();
            while let Some(ch) = self.peek() {
                if ch.is_ascii_digit() {
                    num_str.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }
            // Optional f/F/l/L suffix
            if matches!(
                self.peek(),
                Some('f') | Some('F') | Some('l') | Some('L')
            ) {
                self.advance();
            }
            let value = num_str.parse::<f64>().map_err(|_| LexError {
                message: format!("Invalid float literal: {}", num_str),
                location: loc,
            })?;
            return Ok(Token::FloatLiteral(value, loc));
        }

        let value = num_str.parse::<i64>().map_err(|_| LexError {
            message: format!("Invalid integer literal: {}", num_str),
            location: loc,
        })?;

        self.skip_integer_suffix();
        Ok(Token::IntLiteral(value, loc))
    }

    /// Consume u/U/l/L integer suffix characters
    fn skip_integer_suffix(&mut self) {
        while matches!(
            self.peek(),
            Some('u') | Some('U') | Some('l') | Some('L')
        ) {
            self.advance();
        }
    }

    /// Parse identifier or keyword
    fn identifier_or_keyword(
        &mut self,
        first_char: char,
    ) -> Result<Token, LexError> {
        let loc = SourceLocation::new(self.line, self.column - 1);
        let mut ident = String::new();
        ident.push(first_char);

        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        // Check if it's a keyword
        let token = match ident.as_str() {
            "struct" => Token::Struct(loc),
            "union" => Token::Union(loc),
            "enum" => Token::Enum(loc),
            "typedef" => Token::Typedef(loc),
            "const" => Token::Const(loc),
            "volatile" => Token::Volatile(loc),
            "signed" => Token::Signed(loc),
            "unsigned" => Token::Unsigned(loc),
            "void" => Token::Void(loc),
            "char" => Token::Char(loc),
            "short" => Token::Short(loc),
            "int" => Token::Int(loc),
            "long" => Token::Long(loc),
            "float" => Token::Float(loc),
            "double" => Token::Double(loc),
            _ => Token::Ident(ident, loc),
        };

        Ok(token)
    }

    /// Skip whitespace and comments
    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') | Some('\n') => {
                    self.advance();
                }
                Some('/') => {
                    if self.peek_ahead(1) == Some('/') {
                        self.skip_line_comment();
                    } else if self.peek_ahead(1) == Some('*') {
                        self.skip_block_comment()?;
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    /// Skip single-line comment (// ...)
    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.peek() {
            self.advance();
            if ch == '\n' {
                break;
            }
        }
    }

    /// Skip multi-line comment (/* ... */)
    fn skip_block_comment(&mut self) -> Result<(), LexError> {
        let start_loc = self.current_location();
        self.advance(); // skip '/'
        self.advance(); // skip '*'

        while !self.is_at_end() {
            if self.peek() == Some('*') && self.peek_ahead(1) == Some('/') {
                self.advance(); // skip '*'
                self.advance(); // skip '/'
                return Ok(());
            }
            self.advance();
        }

        Err(LexError {
            message: "Unterminated block comment".to_string(),
            location: start_loc,
        })
    }

    /// Skip preprocessor directive line (#include, #define, ...)
    fn skip_preprocessor_directive(&mut self) {
        while let Some(ch) = self.peek() {
            self.advance();
            if ch == '\n' {
                break;
            }
        }
    }

    /// Peek at current character without consuming
    fn peek(&self) -> Option<char> {
        if self.position < self.input.len() {
            Some(self.input[self.position])
        } else {
            None
        }
    }

    /// Peek ahead n characters
    fn peek_ahead(&self, n: usize) -> Option<char> {
        let pos = self.position + n;
        if pos < self.input.len() {
            Some(self.input[pos])
        } else {
            None
        }
    }

    /// Advance to next character
    fn advance(&mut self) -> Option<char> {
        if self.position >= self.input.len() {
            return None;
        }

        let ch = self.input[self.position];
        self.position += 1;

        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }

        Some(ch)
    }

    /// Check if at end of input
    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    /// Get current source location
    fn current_location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }
}

/// Lazy token stream: yields tokens one at a time, ending with `Eof`.
impl Iterator for Lexer {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            if let Err(e) = self.skip_whitespace_and_comments() {
                self.finished = true;
                return Some(Err(e));
            }
            if self.is_at_end() {
                self.finished = true;
                return Some(Ok(Token::Eof(self.current_location())));
            }
            if self.peek() == Some('#') {
                self.skip_preprocessor_directive();
                continue;
            }
            return match self.next_token() {
                Ok(tok) => Some(Ok(tok)),
                Err(e) => {
                    self.finished = true;
                    Some(Err(e))
                }
            };
        }
    }
}
