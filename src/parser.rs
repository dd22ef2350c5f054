// Filter-argument expression parser
// Turns the textual arguments of a filter invocation into an expression
// tree or a binding map. Parsing is pure; the same input always yields a
// structurally identical tree.

use crate::ast::{BindingMap, BinaryOp, Expr, Role};
use thiserror::Error;

/// Parse errors. Positions are character offsets into the parsed argument
/// text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Unexpected token '{found}' at position {position}")]
    UnexpectedToken { found: String, position: usize },

    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    #[error("Unclosed string literal starting at position {position}")]
    UnclosedString { position: usize },

    #[error("Unclosed placeholder starting at position {position}")]
    UnclosedPlaceholder { position: usize },

    #[error("Invalid number '{text}' at position {position}")]
    InvalidNumber { text: String, position: usize },

    #[error("Invalid escape sequence '{text}' at position {position}")]
    InvalidEscape { text: String, position: usize },

    #[error("Unknown binding role '{role}' at position {position}")]
    UnknownRole { role: String, position: usize },

    #[error("Expected {expected}, found '{found}' at position {position}")]
    Expected {
        expected: String,
        found: String,
        position: usize,
    },
}

/// Token types for the lexer
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    String(String),
    Number(f64),
    True,
    False,
    Null,

    Identifier(String),

    // Operators — `=` means equality inside expressions
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    And,
    Or,
    Dot,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Colon,

    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::String(s) => format!("'{}'", s),
            Token::Number(n) => format!("{}", n),
            Token::Identifier(name) => name.clone(),
            Token::Eof => "end of input".to_string(),
            other => format!("{:?}", other),
        }
    }
}

/// Lexer for filter-argument text
pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Current character offset, used for error positions.
    pub fn position(&self) -> usize {
        self.position
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        if self.position < self.input.len() {
            self.position += 1;
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_string(&mut self, quote_char: char) -> Result<String, ParseError> {
        let start = self.position;
        let mut result = String::new();
        self.advance(); // skip opening quote

        loop {
            match self.current() {
                None => return Err(ParseError::UnclosedString { position: start }),
                Some(ch) if ch == quote_char => {
                    self.advance(); // skip closing quote
                    return Ok(result);
                }
                Some('\\') => {
                    self.advance();
                    match self.current() {
                        None => return Err(ParseError::UnclosedString { position: start }),
                        Some('\'') => result.push('\''),
                        Some('"') => result.push('"'),
                        Some('\\') => result.push('\\'),
                        Some('/') => result.push('/'),
                        Some('n') => result.push('\n'),
                        Some('r') => result.push('\r'),
                        Some('t') => result.push('\t'),
                        Some('u') => {
                            // Unicode escape sequence \uXXXX
                            self.advance();
                            let mut hex = String::new();
                            for _ in 0..4 {
                                match self.current() {
                                    Some(h) if h.is_ascii_hexdigit() => {
                                        hex.push(h);
                                        self.advance();
                                    }
                                    _ => {
                                        return Err(ParseError::InvalidEscape {
                                            text: format!("\\u{}", hex),
                                            position: self.position,
                                        })
                                    }
                                }
                            }
                            let code = u32::from_str_radix(&hex, 16).unwrap();
                            match char::from_u32(code) {
                                Some(ch) => result.push(ch),
                                None => {
                                    return Err(ParseError::InvalidEscape {
                                        text: format!("\\u{}", hex),
                                        position: self.position,
                                    })
                                }
                            }
                            continue; // already past the escape
                        }
                        Some(ch) => {
                            return Err(ParseError::InvalidEscape {
                                text: format!("\\{}", ch),
                                position: self.position,
                            })
                        }
                    }
                    self.advance();
                }
                Some(ch) => {
                    result.push(ch);
                    self.advance();
                }
            }
        }
    }

    fn read_number(&mut self) -> Result<f64, ParseError> {
        let start = self.position;

        if self.current() == Some('-') {
            self.advance();
        }

        if !self.current().map_or(false, |c| c.is_ascii_digit()) {
            return Err(ParseError::InvalidNumber {
                text: "-".to_string(),
                position: start,
            });
        }
        while self.current().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
        }

        // Fractional part
        if self.current() == Some('.') && self.peek(1).map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
            while self.current().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        // Exponent part
        if matches!(self.current(), Some('e') | Some('E')) {
            self.advance();
            if matches!(self.current(), Some('+') | Some('-')) {
                self.advance();
            }
            if !self.current().map_or(false, |c| c.is_ascii_digit()) {
                let text: String = self.input[start..self.position].iter().collect();
                return Err(ParseError::InvalidNumber {
                    text,
                    position: start,
                });
            }
            while self.current().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let num_str: String = self.input[start..self.position].iter().collect();
        num_str.parse().map_err(|_| ParseError::InvalidNumber {
            text: num_str,
            position: start,
        })
    }

    fn read_identifier(&mut self) -> String {
        let start = self.position;

        while let Some(ch) = self.current() {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }

        self.input[start..self.position].iter().collect()
    }

    pub fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_whitespace();

        match self.current() {
            None => Ok(Token::Eof),

            // String literals, either quote style
            Some('\'') => Ok(Token::String(self.read_string('\'')?)),
            Some('"') => Ok(Token::String(self.read_string('"')?)),

            // Numbers
            Some(ch) if ch.is_ascii_digit() => Ok(Token::Number(self.read_number()?)),
            Some('-') if self.peek(1).map_or(false, |c| c.is_ascii_digit()) => {
                Ok(Token::Number(self.read_number()?))
            }

            // Two-character operators
            Some('!') if self.peek(1) == Some('=') => {
                self.advance();
                self.advance();
                Ok(Token::NotEqual)
            }
            Some('<') if self.peek(1) == Some('=') => {
                self.advance();
                self.advance();
                Ok(Token::LessThanOrEqual)
            }
            Some('>') if self.peek(1) == Some('=') => {
                self.advance();
                self.advance();
                Ok(Token::GreaterThanOrEqual)
            }

            // Single-character operators and delimiters
            Some('=') => {
                self.advance();
                Ok(Token::Equal)
            }
            Some('<') => {
                self.advance();
                Ok(Token::LessThan)
            }
            Some('>') => {
                self.advance();
                Ok(Token::GreaterThan)
            }
            Some('.') => {
                self.advance();
                Ok(Token::Dot)
            }
            Some('(') => {
                self.advance();
                Ok(Token::LeftParen)
            }
            Some(')') => {
                self.advance();
                Ok(Token::RightParen)
            }
            Some('{') => {
                self.advance();
                Ok(Token::LeftBrace)
            }
            Some('}') => {
                self.advance();
                Ok(Token::RightBrace)
            }
            Some(',') => {
                self.advance();
                Ok(Token::Comma)
            }
            Some(':') => {
                self.advance();
                Ok(Token::Colon)
            }

            // Identifiers and keywords
            Some(ch) if ch.is_alphabetic() || ch == '_' => {
                let ident = self.read_identifier();
                Ok(match ident.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "and" => Token::And,
                    "or" => Token::Or,
                    _ => Token::Identifier(ident),
                })
            }

            Some(ch) => Err(ParseError::UnexpectedToken {
                found: ch.to_string(),
                position: self.position,
            }),
        }
    }
}

/// Pratt parser for filter-argument expressions
pub struct Parser {
    lexer: Lexer,
    current_token: Token,
    token_position: usize,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token()?;
        Ok(Parser {
            token_position: 0,
            lexer,
            current_token,
        })
    }

    fn advance(&mut self) -> Result<(), ParseError> {
        self.token_position = self.lexer.position();
        self.current_token = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        if std::mem::discriminant(&self.current_token) == std::mem::discriminant(&expected) {
            self.advance()?;
            Ok(())
        } else {
            Err(ParseError::Expected {
                expected: format!("{:?}", expected),
                found: self.current_token.describe(),
                position: self.token_position,
            })
        }
    }

    /// (left, right) binding power for infix tokens; higher binds tighter.
    fn binding_power(token: &Token) -> Option<(u8, u8)> {
        match token {
            Token::Or => Some((25, 26)),
            Token::And => Some((30, 31)),
            Token::Equal
            | Token::NotEqual
            | Token::LessThan
            | Token::LessThanOrEqual
            | Token::GreaterThan
            | Token::GreaterThanOrEqual => Some((40, 41)),
            Token::Dot => Some((75, 76)),
            Token::LeftParen => Some((80, 81)),
            _ => None,
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match &self.current_token {
            Token::String(s) => {
                let value = s.clone();
                self.advance()?;
                Ok(Expr::String(value))
            }
            Token::Number(n) => {
                let value = *n;
                self.advance()?;
                Ok(Expr::Number(value))
            }
            Token::True => {
                self.advance()?;
                Ok(Expr::Boolean(true))
            }
            Token::False => {
                self.advance()?;
                Ok(Expr::Boolean(false))
            }
            Token::Null => {
                self.advance()?;
                Ok(Expr::Null)
            }
            Token::Identifier(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(Expr::Identifier(name))
            }
            Token::LeftParen => {
                self.advance()?;
                let inner = self.parse_expression(0)?;
                self.expect(Token::RightParen)?;
                Ok(inner)
            }
            other => Err(ParseError::UnexpectedToken {
                found: other.describe(),
                position: self.token_position,
            }),
        }
    }

    fn parse_expression(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_primary()?;

        loop {
            if matches!(
                self.current_token,
                Token::Eof | Token::RightParen | Token::RightBrace | Token::Comma | Token::Colon
            ) {
                break;
            }

            let (left_bp, right_bp) = match Self::binding_power(&self.current_token) {
                Some(bp) => bp,
                None => {
                    return Err(ParseError::UnexpectedToken {
                        found: self.current_token.describe(),
                        position: self.token_position,
                    })
                }
            };

            if left_bp < min_bp {
                break;
            }

            match &self.current_token {
                Token::Dot => {
                    self.advance()?;
                    let name = match &self.current_token {
                        Token::Identifier(name) => name.clone(),
                        other => {
                            return Err(ParseError::Expected {
                                expected: "member name".to_string(),
                                found: other.describe(),
                                position: self.token_position,
                            })
                        }
                    };
                    self.advance()?;
                    lhs = Expr::Member {
                        base: Box::new(lhs),
                        name,
                    };
                }
                Token::LeftParen => {
                    // A call is only meaningful on a member path: the last
                    // segment becomes the method name.
                    let (target, name) = match lhs {
                        Expr::Member { base, name } => (base, name),
                        other => {
                            return Err(ParseError::Expected {
                                expected: "method call on a member path".to_string(),
                                found: format!("{:?}", other),
                                position: self.token_position,
                            })
                        }
                    };
                    self.advance()?;

                    let mut args = Vec::new();
                    if self.current_token != Token::RightParen {
                        loop {
                            args.push(self.parse_expression(0)?);
                            if self.current_token != Token::Comma {
                                break;
                            }
                            self.advance()?;
                        }
                    }
                    self.expect(Token::RightParen)?;

                    lhs = Expr::MethodCall {
                        target,
                        name,
                        args,
                    };
                }
                _ => {
                    let op = match &self.current_token {
                        Token::Equal => BinaryOp::Equal,
                        Token::NotEqual => BinaryOp::NotEqual,
                        Token::LessThan => BinaryOp::LessThan,
                        Token::LessThanOrEqual => BinaryOp::LessThanOrEqual,
                        Token::GreaterThan => BinaryOp::GreaterThan,
                        Token::GreaterThanOrEqual => BinaryOp::GreaterThanOrEqual,
                        Token::And => BinaryOp::And,
                        Token::Or => BinaryOp::Or,
                        other => {
                            return Err(ParseError::UnexpectedToken {
                                found: other.describe(),
                                position: self.token_position,
                            })
                        }
                    };

                    self.advance()?;
                    let rhs = self.parse_expression(right_bp)?;

                    lhs = Expr::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    };
                }
            }
        }

        Ok(lhs)
    }

    /// Parse a binding-map literal. The leading `{` is expected to be the
    /// current token.
    fn parse_binding_map(&mut self) -> Result<BindingMap, ParseError> {
        self.expect(Token::LeftBrace)?;

        let mut map = BindingMap::new();
        if self.current_token != Token::RightBrace {
            loop {
                let role_pos = self.token_position;
                let role_name = match &self.current_token {
                    Token::Identifier(name) => name.clone(),
                    Token::String(name) => name.clone(),
                    other => {
                        return Err(ParseError::Expected {
                            expected: "binding role name".to_string(),
                            found: other.describe(),
                            position: role_pos,
                        })
                    }
                };
                let role = Role::from_name(&role_name).ok_or(ParseError::UnknownRole {
                    role: role_name,
                    position: role_pos,
                })?;
                self.advance()?;
                self.expect(Token::Colon)?;

                let alias = match &self.current_token {
                    Token::String(alias) => alias.clone(),
                    other => {
                        return Err(ParseError::Expected {
                            expected: "quoted alias".to_string(),
                            found: other.describe(),
                            position: self.token_position,
                        })
                    }
                };
                self.advance()?;
                map.insert(role, alias);

                if self.current_token != Token::Comma {
                    break;
                }
                self.advance()?;
            }
        }
        self.expect(Token::RightBrace)?;
        Ok(map)
    }

    fn at_eof(&self) -> Result<(), ParseError> {
        if self.current_token != Token::Eof {
            return Err(ParseError::Expected {
                expected: "end of expression".to_string(),
                found: self.current_token.describe(),
                position: self.token_position,
            });
        }
        Ok(())
    }
}

/// Parse a filter-argument string into an expression tree.
pub fn parse_expr(input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(input)?;
    let expr = parser.parse_expression(0)?;
    parser.at_eof()?;
    Ok(expr)
}

/// Parse an object-literal argument (`{ it: 'product' }`) into a binding map.
pub fn parse_binding_map(input: &str) -> Result<BindingMap, ParseError> {
    let mut parser = Parser::new(input)?;
    let map = parser.parse_binding_map()?;
    parser.at_eof()?;
    Ok(map)
}

/// Parse the argument list of a fluent-form stage (the text between the
/// parentheses): at most one string argument plus at most one binding map.
pub fn parse_fluent_args(
    input: &str,
) -> Result<(Option<String>, Option<BindingMap>), ParseError> {
    let mut parser = Parser::new(input)?;
    let mut arg: Option<String> = None;
    let mut binding: Option<BindingMap> = None;

    if parser.current_token == Token::Eof {
        return Ok((None, None));
    }

    loop {
        match &parser.current_token {
            Token::String(s) if arg.is_none() => {
                arg = Some(s.clone());
                parser.advance()?;
            }
            Token::LeftBrace if binding.is_none() => {
                binding = Some(parser.parse_binding_map()?);
            }
            other => {
                return Err(ParseError::Expected {
                    expected: "a quoted argument or a binding map".to_string(),
                    found: other.describe(),
                    position: parser.token_position,
                })
            }
        }
        if parser.current_token != Token::Comma {
            break;
        }
        parser.advance()?;
    }
    parser.at_eof()?;
    Ok((arg, binding))
}
