//! SQL lexer (tokenizer) for keystone
//!
//! This module converts query text into a stream of tokens. Whitespace of
//! any kind (spaces, tabs, newlines) separates tokens and is otherwise
//! insignificant; single-quoted string literals are kept intact, including
//! embedded whitespace and punctuation.

use super::token::Token;
use crate::error::{Error, Result};
use tracing::trace;

/// SQL lexer
pub struct Lexer {
    /// Input characters
    input: Vec<char>,
    /// Current position in input
    position: usize,
}

impl Lexer {
    /// Create a new lexer for the given input
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }

        trace!(?tokens, "tokenized query");
        Ok(tokens)
    }

    /// Get the next token from the input
    fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();

        if self.is_at_end() {
            return Ok(Token::Eof);
        }

        let ch = self.current_char();
        match ch {
            '(' => {
                self.advance();
                Ok(Token::LParen)
            }
            ')' => {
                self.advance();
                Ok(Token::RParen)
            }
            ',' => {
                self.advance();
                Ok(Token::Comma)
            }
            ';' => {
                self.advance();
                Ok(Token::Semicolon)
            }
            '.' => {
                self.advance();
                Ok(Token::Dot)
            }
            '*' => {
                self.advance();
                Ok(Token::Asterisk)
            }
            '=' => {
                self.advance();
                Ok(Token::Eq)
            }
            '<' => {
                self.advance();
                if !self.is_at_end() {
                    match self.current_char() {
                        '=' => {
                            self.advance();
                            return Ok(Token::Lte);
                        }
                        '>' => {
                            self.advance();
                            return Ok(Token::Neq);
                        }
                        _ => {}
                    }
                }
                Ok(Token::Lt)
            }
            '>' => {
                self.advance();
                if !self.is_at_end() && self.current_char() == '=' {
                    self.advance();
                    return Ok(Token::Gte);
                }
                Ok(Token::Gt)
            }
            '!' => {
                self.advance();
                if !self.is_at_end() && self.current_char() == '=' {
                    self.advance();
                    return Ok(Token::Neq);
                }
                Err(Error::UnexpectedCharacter('!', self.position))
            }
            '\'' => self.read_string(),
            '-' => {
                self.advance();
                if !self.is_at_end() && self.current_char().is_ascii_digit() {
                    return match self.read_number()? {
                        Token::IntegerLiteral(n) => Ok(Token::IntegerLiteral(-n)),
                        Token::FloatLiteral(n) => Ok(Token::FloatLiteral(-n)),
                        other => Ok(other),
                    };
                }
                Err(Error::UnexpectedCharacter('-', self.position))
            }
            c if c.is_ascii_digit() => self.read_number(),
            c if c.is_alphanumeric() || c == '_' => self.read_word(),
            c => Err(Error::UnexpectedCharacter(c, self.position)),
        }
    }

    /// Read a single-quoted string literal; the quotes are stripped
    fn read_string(&mut self) -> Result<Token> {
        let start = self.position;
        self.advance(); // opening quote

        let mut value = String::new();
        while !self.is_at_end() && self.current_char() != '\'' {
            value.push(self.current_char());
            self.advance();
        }

        if self.is_at_end() {
            return Err(Error::UnterminatedString(start));
        }
        self.advance(); // closing quote
        Ok(Token::StringLiteral(value))
    }

    /// Read an integer or float literal
    fn read_number(&mut self) -> Result<Token> {
        let start = self.position;
        let mut is_float = false;

        while !self.is_at_end() {
            let c = self.current_char();
            if c.is_ascii_digit() {
                self.advance();
            } else if c == '.' && !is_float {
                // a dot only continues the number when a digit follows
                if self
                    .peek()
                    .map(|next| next.is_ascii_digit())
                    .unwrap_or(false)
                {
                    is_float = true;
                    self.advance();
                } else {
                    break;
                }
            } else {
                break;
            }
        }

        let text: String = self.input[start..self.position].iter().collect();
        if is_float {
            text.parse::<f32>()
                .map(Token::FloatLiteral)
                .map_err(|_| Error::InvalidNumber(start))
        } else {
            text.parse::<i32>()
                .map(Token::IntegerLiteral)
                .map_err(|_| Error::InvalidNumber(start))
        }
    }

    /// Read a keyword or identifier
    fn read_word(&mut self) -> Result<Token> {
        let start = self.position;
        while !self.is_at_end() {
            let c = self.current_char();
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let word: String = self.input[start..self.position].iter().collect();
        Ok(Token::from_keyword(&word).unwrap_or(Token::Identifier(word)))
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.current_char().is_whitespace() {
            self.advance();
        }
    }

    fn current_char(&self) -> char {
        self.input[self.position]
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }
}
