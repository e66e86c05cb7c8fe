use crate::compiler::diagnostics::{CompileError, CompileResult};
use crate::compiler::span::FileRange;
use crate::compiler::token::{Token, TokenKind};

// ═══════════════════════════════════════════════════════════════
//  Lexer
// ═══════════════════════════════════════════════════════════════

pub struct Lexer {
    path: String,
    source: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
}

impl Lexer {
    pub fn new(path: &str, source: &str) -> Self {
        Self {
            path: path.to_string(),
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Tokenize the entire source into a Vec<Token>.
    pub fn tokenize(&mut self) -> CompileResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.kind.is_eof();
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> CompileResult<Token> {
        self.skip_whitespace_and_comments();

        if self.is_at_end() {
            return Ok(Token::new(
                TokenKind::Eof,
                FileRange::new(self.line, self.col, self.line, self.col),
            ));
        }

        let start_line = self.line;
        let start_col = self.col;
        let c = self.advance();

        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '+' => TokenKind::Plus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '$' => TokenKind::Dollar,
            '^' => TokenKind::Caret,

            ':' => {
                if self.peek() == Some(':') {
                    self.advance();
                    TokenKind::ColonColon
                } else if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::ColonEq
                } else {
                    TokenKind::Colon
                }
            }

            '.' => {
                if self.peek() == Some('[') {
                    self.advance();
                    TokenKind::DotLBracket
                } else if self.peek() == Some('{') {
                    self.advance();
                    TokenKind::DotLBrace
                } else {
                    TokenKind::Dot
                }
            }

            '-' => {
                if self.peek() == Some('>') {
                    self.advance();
                    TokenKind::Arrow
                } else {
                    TokenKind::Minus
                }
            }

            '=' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::EqEq
                } else {
                    TokenKind::Eq
                }
            }

            '!' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }

            '&' => {
                if self.peek() == Some('&') {
                    self.advance();
                    TokenKind::AmpAmp
                } else {
                    TokenKind::Ampersand
                }
            }

            '|' => {
                if self.peek() == Some('|') {
                    self.advance();
                    TokenKind::PipePipe
                } else {
                    TokenKind::Pipe
                }
            }

            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,

            '#' => return self.lex_directive(start_line, start_col),

            '"' => return self.lex_string(start_line, start_col),

            c if c.is_ascii_digit() => {
                return self.lex_number(c, start_line, start_col);
            }

            c if c.is_ascii_alphabetic() || c == '_' => {
                return self.lex_ident_or_keyword(c, start_line, start_col);
            }

            other => {
                return Err(self.error(
                    start_line,
                    start_col,
                    format!("Unexpected character '{}'", other),
                ));
            }
        };

        Ok(Token::new(
            kind,
            FileRange::new(start_line, start_col, self.line, self.col.saturating_sub(1)),
        ))
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn error(&self, line: u32, col: u32, message: String) -> CompileError {
        CompileError::new(
            self.path.clone(),
            FileRange::new(line, col, line, col),
            message,
        )
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.pos];
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        c
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_next() == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_directive(&mut self, start_line: u32, start_col: u32) -> CompileResult<Token> {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(self.advance());
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(self.error(start_line, start_col, "Expected a directive name after '#'".into()));
        }
        Ok(Token::new(
            TokenKind::Directive(name),
            FileRange::new(start_line, start_col, self.line, self.col.saturating_sub(1)),
        ))
    }

    fn lex_string(&mut self, start_line: u32, start_col: u32) -> CompileResult<Token> {
        let mut value = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(self.error(start_line, start_col, "Unterminated string literal".into()));
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    let escaped = match self.peek() {
                        Some('n') => '\n',
                        Some('r') => '\r',
                        Some('t') => '\t',
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some('0') => '\0',
                        other => {
                            return Err(self.error(
                                self.line,
                                self.col,
                                format!(
                                    "Unknown escape sequence '\\{}'",
                                    other.map(String::from).unwrap_or_default()
                                ),
                            ));
                        }
                    };
                    self.advance();
                    value.push(escaped);
                }
                Some(_) => {
                    value.push(self.advance());
                }
            }
        }
        Ok(Token::new(
            TokenKind::StringLit(value),
            FileRange::new(start_line, start_col, self.line, self.col.saturating_sub(1)),
        ))
    }

    fn lex_number(&mut self, first: char, start_line: u32, start_col: u32) -> CompileResult<Token> {
        let mut text = String::new();
        text.push(first);

        // Hex literals
        if first == '0' && matches!(self.peek(), Some('x') | Some('X')) {
            self.advance();
            let mut digits = String::new();
            while let Some(c) = self.peek() {
                if c.is_ascii_hexdigit() || c == '_' {
                    let c = self.advance();
                    if c != '_' {
                        digits.push(c);
                    }
                } else {
                    break;
                }
            }
            let value = u64::from_str_radix(&digits, 16).map_err(|_| {
                self.error(start_line, start_col, "Invalid hexadecimal literal".into())
            })?;
            return Ok(Token::new(
                TokenKind::IntLit(value),
                FileRange::new(start_line, start_col, self.line, self.col.saturating_sub(1)),
            ));
        }

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                let c = self.advance();
                if c != '_' {
                    text.push(c);
                }
            } else {
                break;
            }
        }

        // A '.' followed by a digit makes this a float; '.' followed by
        // anything else is a member reference on the integer.
        let mut is_float = false;
        if self.peek() == Some('.') && self.peek_next().map_or(false, |c| c.is_ascii_digit()) {
            is_float = true;
            text.push(self.advance());
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() || c == '_' {
                    let c = self.advance();
                    if c != '_' {
                        text.push(c);
                    }
                } else {
                    break;
                }
            }
        }

        let range = FileRange::new(start_line, start_col, self.line, self.col.saturating_sub(1));
        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| self.error(start_line, start_col, "Invalid float literal".into()))?;
            Ok(Token::new(TokenKind::FloatLit(value), range))
        } else {
            let value: u64 = text
                .parse()
                .map_err(|_| self.error(start_line, start_col, "Integer literal too large".into()))?;
            Ok(Token::new(TokenKind::IntLit(value), range))
        }
    }

    fn lex_ident_or_keyword(
        &mut self,
        first: char,
        start_line: u32,
        start_col: u32,
    ) -> CompileResult<Token> {
        let mut text = String::new();
        text.push(first);
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                text.push(self.advance());
            } else {
                break;
            }
        }
        let range = FileRange::new(start_line, start_col, self.line, self.col.saturating_sub(1));
        let kind = TokenKind::keyword_from_str(&text).unwrap_or(TokenKind::Ident(text));
        Ok(Token::new(kind, range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new("test.cin", source);
        lexer
            .tokenize()
            .expect("lexing failed")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_declaration_punctuation() {
        let tokens = lex("x :: 1; y := 2; z: i32;");
        assert!(tokens.contains(&TokenKind::ColonColon));
        assert!(tokens.contains(&TokenKind::ColonEq));
        assert!(tokens.contains(&TokenKind::Colon));
    }

    #[test]
    fn test_literal_prefixes() {
        assert_eq!(
            lex(".[1].{}")[0..2],
            [TokenKind::DotLBracket, TokenKind::IntLit(1)]
        );
        assert_eq!(lex(".{x = 1}")[0], TokenKind::DotLBrace);
    }

    #[test]
    fn test_float_versus_member() {
        assert_eq!(lex("1.5")[0], TokenKind::FloatLit(1.5));
        assert_eq!(
            lex("a.length")[0..3],
            [
                TokenKind::Ident("a".into()),
                TokenKind::Dot,
                TokenKind::Ident("length".into())
            ]
        );
    }

    #[test]
    fn test_hex_literal() {
        assert_eq!(lex("0xff")[0], TokenKind::IntLit(255));
    }

    #[test]
    fn test_directive() {
        assert_eq!(lex("#extern")[0], TokenKind::Directive("extern".into()));
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = lex("1 // comment\n2");
        assert_eq!(tokens[0], TokenKind::IntLit(1));
        assert_eq!(tokens[1], TokenKind::IntLit(2));
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            lex("\"a\\n\\\"b\\\"\"")[0],
            TokenKind::StringLit("a\n\"b\"".into())
        );
    }

    #[test]
    fn test_operator_pairs() {
        let tokens = lex("& && | || = == ! != : ::");
        assert_eq!(
            tokens[0..10],
            [
                TokenKind::Ampersand,
                TokenKind::AmpAmp,
                TokenKind::Pipe,
                TokenKind::PipePipe,
                TokenKind::Eq,
                TokenKind::EqEq,
                TokenKind::Bang,
                TokenKind::NotEq,
                TokenKind::Colon,
                TokenKind::ColonColon,
            ]
        );
    }
}
