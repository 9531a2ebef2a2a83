use std::collections::HashMap;
use std::fmt;

/// Position of a token in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// All token kinds the GuardScript front end recognises.
///
/// The lexer deliberately covers more of JavaScript than the dialect
/// accepts (`var`, `throw`, `typeof`, loose equality and so on) so that the
/// rewriter can reject those constructs with its own diagnostics instead of
/// a lexer error.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Number(f64),
    String(String),
    Boolean(bool),
    Null,

    Identifier(String),

    // Declaration keywords
    Var,
    Let,
    Const,

    // Statement keywords
    Function,
    Class,
    New,
    This,
    If,
    Else,
    While,
    Do,
    For,
    Switch,
    Case,
    Default,
    Return,
    Break,
    Continue,
    Throw,
    Try,
    Catch,
    Finally,
    With,

    // Operator keywords
    In,
    InstanceOf,
    TypeOf,
    Delete,
    Void,

    // Punctuation and operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    ShlAssign,
    ShrAssign,
    UShrAssign,
    EqEq,
    EqEqEq,
    NotEq,
    NotEqEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Shl,
    Shr,
    UShr,
    Amp,
    Pipe,
    Caret,
    Tilde,
    AndAnd,
    OrOr,
    Bang,
    PlusPlus,
    MinusMinus,
    Question,
    Colon,
    Arrow,
    Ellipsis,
    Dot,
    Comma,
    Semicolon,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "{}", n),
            TokenKind::String(s) => write!(f, "\"{}\"", s),
            TokenKind::Boolean(b) => write!(f, "{}", b),
            TokenKind::Null => write!(f, "null"),
            TokenKind::Identifier(s) => write!(f, "{}", s),
            TokenKind::Eof => write!(f, "end of input"),
            other => write!(f, "{:?}", other),
        }
    }
}

/// A token with its kind and position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: Position,
}

impl Token {
    pub fn new(kind: TokenKind, position: Position) -> Self {
        Self { kind, position }
    }
}

/// Lexer error with the offending position.
#[derive(Debug, Clone)]
pub struct TokenizeError {
    pub message: String,
    pub position: Position,
}

impl fmt::Display for TokenizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at line {}, column {}",
            self.message, self.position.line, self.position.column
        )
    }
}

impl std::error::Error for TokenizeError {}

/// Hand-written lexer for the GuardScript source language.
pub struct Tokenizer {
    input: Vec<char>,
    position: usize,
    line: u32,
    column: u32,
    keywords: HashMap<&'static str, TokenKind>,
}

impl Tokenizer {
    pub fn new(source: &str) -> Self {
        let mut keywords = HashMap::new();
        keywords.insert("var", TokenKind::Var);
        keywords.insert("let", TokenKind::Let);
        keywords.insert("const", TokenKind::Const);
        keywords.insert("function", TokenKind::Function);
        keywords.insert("class", TokenKind::Class);
        keywords.insert("new", TokenKind::New);
        keywords.insert("this", TokenKind::This);
        keywords.insert("if", TokenKind::If);
        keywords.insert("else", TokenKind::Else);
        keywords.insert("while", TokenKind::While);
        keywords.insert("do", TokenKind::Do);
        keywords.insert("for", TokenKind::For);
        keywords.insert("switch", TokenKind::Switch);
        keywords.insert("case", TokenKind::Case);
        keywords.insert("default", TokenKind::Default);
        keywords.insert("return", TokenKind::Return);
        keywords.insert("break", TokenKind::Break);
        keywords.insert("continue", TokenKind::Continue);
        keywords.insert("throw", TokenKind::Throw);
        keywords.insert("try", TokenKind::Try);
        keywords.insert("catch", TokenKind::Catch);
        keywords.insert("finally", TokenKind::Finally);
        keywords.insert("with", TokenKind::With);
        keywords.insert("in", TokenKind::In);
        keywords.insert("instanceof", TokenKind::InstanceOf);
        keywords.insert("typeof", TokenKind::TypeOf);
        keywords.insert("delete", TokenKind::Delete);
        keywords.insert("void", TokenKind::Void);
        keywords.insert("true", TokenKind::Boolean(true));
        keywords.insert("false", TokenKind::Boolean(false));
        keywords.insert("null", TokenKind::Null);

        Self {
            input: source.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            keywords,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, TokenizeError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments()?;
            let position = self.current_position();
            let Some(ch) = self.peek() else {
                tokens.push(Token::new(TokenKind::Eof, position));
                return Ok(tokens);
            };

            let kind = if ch.is_ascii_digit() || (ch == '.' && self.peek_at(1).map_or(false, |c| c.is_ascii_digit())) {
                self.read_number()?
            } else if ch == '"' || ch == '\'' {
                self.read_string(ch)?
            } else if ch.is_ascii_alphabetic() || ch == '_' {
                self.read_identifier()
            } else {
                self.read_operator()?
            };
            tokens.push(Token::new(kind, position));
        }
    }

    fn current_position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.position += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn matches(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), TokenizeError> {
        loop {
            match self.peek() {
                Some(ch) if ch.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(ch) = self.peek() {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let start = self.current_position();
                    self.advance();
                    self.advance();
                    loop {
                        match self.peek() {
                            Some('*') if self.peek_at(1) == Some('/') => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            Some(_) => {
                                self.advance();
                            }
                            None => {
                                return Err(TokenizeError {
                                    message: "Unterminated block comment".to_string(),
                                    position: start,
                                });
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_number(&mut self) -> Result<TokenKind, TokenizeError> {
        let start = self.current_position();
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') && self.peek_at(1).map_or(true, |c| c != '.') {
            text.push('.');
            self.advance();
            while let Some(ch) = self.peek() {
                if ch.is_ascii_digit() {
                    text.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            text.push('e');
            self.advance();
            if matches!(self.peek(), Some('+') | Some('-')) {
                text.push(self.advance().unwrap_or('+'));
            }
            let mut digits = false;
            while let Some(ch) = self.peek() {
                if ch.is_ascii_digit() {
                    digits = true;
                    text.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }
            if !digits {
                return Err(TokenizeError {
                    message: "Malformed number exponent".to_string(),
                    position: start,
                });
            }
        }
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| TokenizeError {
                message: format!("Malformed number '{}'", text),
                position: start,
            })
    }

    fn read_string(&mut self, quote: char) -> Result<TokenKind, TokenizeError> {
        let start = self.current_position();
        self.advance();
        let mut text = String::new();
        loop {
            match self.advance() {
                Some(ch) if ch == quote => return Ok(TokenKind::String(text)),
                Some('\\') => match self.advance() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('0') => text.push('\0'),
                    Some('\\') => text.push('\\'),
                    Some('\'') => text.push('\''),
                    Some('"') => text.push('"'),
                    Some(other) => text.push(other),
                    None => {
                        return Err(TokenizeError {
                            message: "Unterminated string literal".to_string(),
                            position: start,
                        });
                    }
                },
                Some('\n') | None => {
                    return Err(TokenizeError {
                        message: "Unterminated string literal".to_string(),
                        position: start,
                    });
                }
                Some(ch) => text.push(ch),
            }
        }
    }

    fn read_identifier(&mut self) -> TokenKind {
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        match self.keywords.get(text.as_str()) {
            Some(kind) => kind.clone(),
            None => TokenKind::Identifier(text),
        }
    }

    fn read_operator(&mut self) -> Result<TokenKind, TokenizeError> {
        let position = self.current_position();
        let Some(ch) = self.advance() else {
            return Ok(TokenKind::Eof);
        };
        let kind = match ch {
            '+' => {
                if self.matches('+') {
                    TokenKind::PlusPlus
                } else if self.matches('=') {
                    TokenKind::PlusAssign
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.matches('-') {
                    TokenKind::MinusMinus
                } else if self.matches('=') {
                    TokenKind::MinusAssign
                } else {
                    TokenKind::Minus
                }
            }
            '*' => {
                if self.matches('=') {
                    TokenKind::StarAssign
                } else {
                    TokenKind::Star
                }
            }
            '/' => {
                if self.matches('=') {
                    TokenKind::SlashAssign
                } else {
                    TokenKind::Slash
                }
            }
            '%' => {
                if self.matches('=') {
                    TokenKind::PercentAssign
                } else {
                    TokenKind::Percent
                }
            }
            '=' => {
                if self.matches('=') {
                    if self.matches('=') {
                        TokenKind::EqEqEq
                    } else {
                        TokenKind::EqEq
                    }
                } else if self.matches('>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.matches('=') {
                    if self.matches('=') {
                        TokenKind::NotEqEq
                    } else {
                        TokenKind::NotEq
                    }
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                if self.matches('<') {
                    if self.matches('=') {
                        TokenKind::ShlAssign
                    } else {
                        TokenKind::Shl
                    }
                } else if self.matches('=') {
                    TokenKind::LessEq
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if self.matches('>') {
                    if self.matches('>') {
                        if self.matches('=') {
                            TokenKind::UShrAssign
                        } else {
                            TokenKind::UShr
                        }
                    } else if self.matches('=') {
                        TokenKind::ShrAssign
                    } else {
                        TokenKind::Shr
                    }
                } else if self.matches('=') {
                    TokenKind::GreaterEq
                } else {
                    TokenKind::Greater
                }
            }
            '&' => {
                if self.matches('&') {
                    TokenKind::AndAnd
                } else if self.matches('=') {
                    TokenKind::AmpAssign
                } else {
                    TokenKind::Amp
                }
            }
            '|' => {
                if self.matches('|') {
                    TokenKind::OrOr
                } else if self.matches('=') {
                    TokenKind::PipeAssign
                } else {
                    TokenKind::Pipe
                }
            }
            '^' => {
                if self.matches('=') {
                    TokenKind::CaretAssign
                } else {
                    TokenKind::Caret
                }
            }
            '~' => TokenKind::Tilde,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,
            '.' => {
                if self.peek() == Some('.') && self.peek_at(1) == Some('.') {
                    self.advance();
                    self.advance();
                    TokenKind::Ellipsis
                } else {
                    TokenKind::Dot
                }
            }
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            other => {
                return Err(TokenizeError {
                    message: format!("Unexpected character '{}'", other),
                    position,
                });
            }
        };
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Tokenizer::new(source)
            .tokenize()
            .expect("tokenize")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn lexes_declaration_and_operators() {
        let tokens = kinds("let x = 1 + 2;");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Let,
                TokenKind::Identifier("x".to_string()),
                TokenKind::Assign,
                TokenKind::Number(1.0),
                TokenKind::Plus,
                TokenKind::Number(2.0),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn distinguishes_equality_operators() {
        assert_eq!(
            kinds("a == b === c != d !== e"),
            vec![
                TokenKind::Identifier("a".to_string()),
                TokenKind::EqEq,
                TokenKind::Identifier("b".to_string()),
                TokenKind::EqEqEq,
                TokenKind::Identifier("c".to_string()),
                TokenKind::NotEq,
                TokenKind::Identifier("d".to_string()),
                TokenKind::NotEqEq,
                TokenKind::Identifier("e".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn tracks_line_numbers_across_comments() {
        let tokens = Tokenizer::new("// leading\nlet x;\n/* block\nspans lines */\nx")
            .tokenize()
            .expect("tokenize");
        assert_eq!(tokens[0].position.line, 2);
        let last_ident = tokens
            .iter()
            .rfind(|token| matches!(token.kind, TokenKind::Identifier(_)))
            .expect("identifier");
        assert_eq!(last_ident.position.line, 5);
    }

    #[test]
    fn reads_escapes_and_number_forms() {
        assert_eq!(
            kinds("'a\\nb' 3.5 0.25 1e3"),
            vec![
                TokenKind::String("a\nb".to_string()),
                TokenKind::Number(3.5),
                TokenKind::Number(0.25),
                TokenKind::Number(1000.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn rejects_unterminated_string() {
        let err = Tokenizer::new("let s = 'oops").tokenize().expect_err("should fail");
        assert!(err.message.contains("Unterminated string"));
    }
}
