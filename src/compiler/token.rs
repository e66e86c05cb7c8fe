use crate::compiler::span::FileRange;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub range: FileRange,
}

impl Token {
    pub fn new(kind: TokenKind, range: FileRange) -> Self {
        Self { kind, range }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ── Literals ──────────────────────────────────────────────
    IntLit(u64),
    FloatLit(f64),
    StringLit(String),

    // ── Identifier ───────────────────────────────────────────
    Ident(String),

    // ── Keywords ─────────────────────────────────────────────
    If,
    Else,
    While,
    Return,
    Struct,
    Union,
    Import,
    Using,
    Cast,

    // ── Directives ───────────────────────────────────────────
    Directive(String), // #extern etc.

    // ── Delimiters ───────────────────────────────────────────
    LParen,   // (
    RParen,   // )
    LBrace,   // {
    RBrace,   // }
    LBracket, // [
    RBracket, // ]

    // ── Punctuation ──────────────────────────────────────────
    Comma,        // ,
    Colon,        // :
    ColonColon,   // ::
    ColonEq,      // :=
    Semicolon,    // ;
    Dot,          // .
    DotLBracket,  // .[  (array literal)
    DotLBrace,    // .{  (struct literal)
    Arrow,        // ->
    Dollar,       // $

    // ── Operators ────────────────────────────────────────────
    Eq,        // =
    EqEq,      // ==
    NotEq,     // !=
    Lt,        // <
    Gt,        // >
    Plus,      // +
    Minus,     // -
    Star,      // *
    Slash,     // /
    Percent,   // %
    Ampersand, // &
    AmpAmp,    // &&
    Pipe,      // |
    PipePipe,  // ||
    Bang,      // !
    Caret,     // ^  (dereference)

    // ── Special ──────────────────────────────────────────────
    Eof,
}

impl TokenKind {
    /// Map an identifier string to its keyword token, if any.
    pub fn keyword_from_str(s: &str) -> Option<TokenKind> {
        match s {
            "if" => Some(TokenKind::If),
            "else" => Some(TokenKind::Else),
            "while" => Some(TokenKind::While),
            "return" => Some(TokenKind::Return),
            "struct" => Some(TokenKind::Struct),
            "union" => Some(TokenKind::Union),
            "import" => Some(TokenKind::Import),
            "using" => Some(TokenKind::Using),
            "cast" => Some(TokenKind::Cast),
            _ => None,
        }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self, TokenKind::Eof)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::IntLit(n) => write!(f, "{}", n),
            TokenKind::FloatLit(n) => write!(f, "{}", n),
            TokenKind::StringLit(s) => write!(f, "\"{}\"", s),
            TokenKind::Ident(s) => write!(f, "{}", s),
            TokenKind::If => write!(f, "if"),
            TokenKind::Else => write!(f, "else"),
            TokenKind::While => write!(f, "while"),
            TokenKind::Return => write!(f, "return"),
            TokenKind::Struct => write!(f, "struct"),
            TokenKind::Union => write!(f, "union"),
            TokenKind::Import => write!(f, "import"),
            TokenKind::Using => write!(f, "using"),
            TokenKind::Cast => write!(f, "cast"),
            TokenKind::Directive(s) => write!(f, "#{}", s),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::ColonColon => write!(f, "::"),
            TokenKind::ColonEq => write!(f, ":="),
            TokenKind::Semicolon => write!(f, ";"),
            TokenKind::Dot => write!(f, "."),
            TokenKind::DotLBracket => write!(f, ".["),
            TokenKind::DotLBrace => write!(f, ".{{"),
            TokenKind::Arrow => write!(f, "->"),
            TokenKind::Dollar => write!(f, "$"),
            TokenKind::Eq => write!(f, "="),
            TokenKind::EqEq => write!(f, "=="),
            TokenKind::NotEq => write!(f, "!="),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::Ampersand => write!(f, "&"),
            TokenKind::AmpAmp => write!(f, "&&"),
            TokenKind::Pipe => write!(f, "|"),
            TokenKind::PipePipe => write!(f, "||"),
            TokenKind::Bang => write!(f, "!"),
            TokenKind::Caret => write!(f, "^"),
            TokenKind::Eof => write!(f, "<EOF>"),
        }
    }
}
