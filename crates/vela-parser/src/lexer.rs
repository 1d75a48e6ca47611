//! Lexer for the Vela contract language.
//!
//! Converts source text into a stream of tokens with precise source location
//! information. Tokenization is driven by the logos library; the logos enum is
//! converted to the public [`Token`] type after matching.

use crate::token::{Span, Token};
use logos::Logos;

/// Logos-based token enum used internally for matching.
#[derive(Logos, Debug, Clone, PartialEq)]
enum RawToken {
    // Whitespace (skip)
    #[regex(r"[ \t\r\n]+", logos::skip)]
    Whitespace,

    // Comments (skip)
    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,

    #[regex(r"/\*", lex_block_comment)]
    BlockComment,

    // Keywords (must come before identifiers)
    #[token("pragma")]
    Pragma,
    #[token("import")]
    Import,
    #[token("as")]
    As,
    #[token("contract")]
    Contract,
    #[token("library")]
    Library,
    #[token("interface")]
    Interface,
    #[token("abstract")]
    Abstract,
    #[token("is")]
    Is,
    #[token("struct")]
    Struct,
    #[token("enum")]
    Enum,
    #[token("event")]
    Event,
    #[token("modifier")]
    Modifier,
    #[token("function")]
    Function,
    #[token("constructor")]
    Constructor,
    #[token("fallback")]
    Fallback,
    #[token("receive")]
    Receive,
    #[token("using")]
    Using,
    #[token("returns")]
    Returns,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("do")]
    Do,
    #[token("for")]
    For,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("emit")]
    Emit,
    #[token("new")]
    New,
    #[token("assembly")]
    Assembly,
    #[token("public")]
    Public,
    #[token("private")]
    Private,
    #[token("internal")]
    Internal,
    #[token("external")]
    External,
    #[token("pure")]
    Pure,
    #[token("view")]
    View,
    #[token("payable")]
    Payable,
    #[token("virtual")]
    Virtual,
    #[token("override")]
    Override,
    #[token("constant")]
    Constant,
    #[token("indexed")]
    Indexed,
    #[token("memory")]
    Memory,
    #[token("storage")]
    Storage,
    #[token("calldata")]
    Calldata,
    #[token("mapping")]
    Mapping,
    #[token("bool")]
    Bool,
    #[token("address")]
    Address,
    #[token("string")]
    String,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // Width-carrying type keywords; the callback rejects invalid widths so
    // `uint7` falls through to a lexer error rather than an identifier.
    #[regex(r"uint[0-9]*", parse_uint_width, priority = 3)]
    UintType(u16),
    #[regex(r"int[0-9]*", parse_int_width, priority = 3)]
    IntType(u16),
    #[regex(r"bytes[0-9]*", parse_bytes_width, priority = 3)]
    BytesType(Option<u8>),

    // Identifiers (must come after keywords)
    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| lex.slice().to_string())]
    Identifier(std::string::String),

    // Numbers with separator support; value folding happens in the checker,
    // the lexer only normalises the text.
    #[regex(r"0x[0-9a-fA-F]+(_[0-9a-fA-F]+)*", normalize_number)]
    #[regex(r"[0-9]+(_[0-9]+)*(\.[0-9]+(_[0-9]+)*)?([eE][0-9]+)?", normalize_number)]
    Number(std::string::String),

    // Strings
    #[regex(r#""([^"\\\n]|\\.)*""#, parse_string)]
    #[regex(r"'([^'\\\n]|\\.)*'", parse_string)]
    StringLiteral(std::string::String),

    // Operators (longest first)
    #[token("<<=")]
    ShlAssign,
    #[token(">>=")]
    ShrAssign,
    #[token("**")]
    StarStar,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("==")]
    Eq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("=>")]
    Arrow,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,
    #[token("%=")]
    PercentAssign,
    #[token("&=")]
    AmpAssign,
    #[token("|=")]
    PipeAssign,
    #[token("^=")]
    CaretAssign,

    // Single-character tokens
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("=")]
    Assign,
    #[token("?")]
    Question,
    #[token(".")]
    Dot,
    #[token(":")]
    Colon,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
}

fn lex_block_comment(lex: &mut logos::Lexer<RawToken>) -> logos::Skip {
    // "/*" is already consumed, find the matching "*/"
    let remainder = lex.remainder();
    if let Some(end) = remainder.find("*/") {
        lex.bump(end + 2);
    } else {
        // Unterminated comment, consume to end
        lex.bump(remainder.len());
    }
    logos::Skip
}

fn parse_uint_width(lex: &mut logos::Lexer<RawToken>) -> Option<u16> {
    parse_int_width_text(&lex.slice()[4..])
}

fn parse_int_width(lex: &mut logos::Lexer<RawToken>) -> Option<u16> {
    parse_int_width_text(&lex.slice()[3..])
}

fn parse_int_width_text(suffix: &str) -> Option<u16> {
    if suffix.is_empty() {
        return Some(256);
    }
    let bits: u16 = suffix.parse().ok()?;
    if bits >= 8 && bits <= 256 && bits % 8 == 0 {
        Some(bits)
    } else {
        None
    }
}

fn parse_bytes_width(lex: &mut logos::Lexer<RawToken>) -> Option<Option<u8>> {
    let suffix = &lex.slice()[5..];
    if suffix.is_empty() {
        return Some(None); // dynamic `bytes`
    }
    let width: u8 = suffix.parse().ok()?;
    if (1..=32).contains(&width) {
        Some(Some(width))
    } else {
        None
    }
}

fn normalize_number(lex: &mut logos::Lexer<RawToken>) -> std::string::String {
    lex.slice().replace('_', "")
}

fn parse_string(lex: &mut logos::Lexer<RawToken>) -> Option<std::string::String> {
    let s = lex.slice();
    let inner = &s[1..s.len() - 1];
    unescape_string(inner)
}

fn unescape_string(s: &str) -> Option<std::string::String> {
    let mut result = std::string::String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next()? {
                'n' => result.push('\n'),
                'r' => result.push('\r'),
                't' => result.push('\t'),
                '\\' => result.push('\\'),
                '"' => result.push('"'),
                '\'' => result.push('\''),
                '0' => result.push('\0'),
                'x' => {
                    let hi = chars.next()?;
                    let lo = chars.next()?;
                    let byte = u8::from_str_radix(&format!("{}{}", hi, lo), 16).ok()?;
                    result.push(byte as char);
                }
                other => result.push(other),
            }
        } else {
            result.push(c);
        }
    }

    Some(result)
}

/// Lexer error kinds.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LexError {
    #[error("unexpected character '{ch}' at {span}")]
    UnexpectedCharacter { ch: char, span: Span },
    #[error("invalid type width in '{text}' at {span}")]
    InvalidTypeWidth { text: std::string::String, span: Span },
    #[error("invalid escape sequence at {span}")]
    InvalidEscape { span: Span },
}

/// Main lexer structure.
pub struct Lexer<'a> {
    source: &'a str,
    tokens: Vec<(Token, Span)>,
    errors: Vec<LexError>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Tokenize the entire input, accumulating every lexer error.
    pub fn tokenize(mut self) -> Result<Vec<(Token, Span)>, Vec<LexError>> {
        let mut raw = RawToken::lexer(self.source);
        let mut line = 1u32;
        let mut column = 1u32;
        let mut last_end = 0usize;

        while let Some(token_result) = raw.next() {
            let range = raw.span();

            // Advance line/column over skipped text
            for c in self.source[last_end..range.start].chars() {
                if c == '\n' {
                    line += 1;
                    column = 1;
                } else {
                    column += 1;
                }
            }

            let span = Span::new(range.start as u32, range.end as u32, line, column);

            match token_result {
                Ok(tok) => self.tokens.push((convert_token(tok), span)),
                Err(_) => {
                    let text = &self.source[range.clone()];
                    if text.starts_with("uint") || text.starts_with("int") || text.starts_with("bytes")
                    {
                        self.errors.push(LexError::InvalidTypeWidth {
                            text: text.to_string(),
                            span,
                        });
                    } else if text.starts_with('\\') {
                        self.errors.push(LexError::InvalidEscape { span });
                    } else {
                        let ch = text.chars().next().unwrap_or('\0');
                        self.errors.push(LexError::UnexpectedCharacter { ch, span });
                    }
                }
            }

            for c in self.source[range.start..range.end].chars() {
                if c == '\n' {
                    line += 1;
                    column = 1;
                } else {
                    column += 1;
                }
            }
            last_end = range.end;
        }

        let eof = Span::new(self.source.len() as u32, self.source.len() as u32, line, column);
        self.tokens.push((Token::Eof, eof));

        if self.errors.is_empty() {
            Ok(self.tokens)
        } else {
            Err(self.errors)
        }
    }
}

fn convert_token(raw: RawToken) -> Token {
    match raw {
        RawToken::Pragma => Token::Pragma,
        RawToken::Import => Token::Import,
        RawToken::As => Token::As,
        RawToken::Contract => Token::Contract,
        RawToken::Library => Token::Library,
        RawToken::Interface => Token::Interface,
        RawToken::Abstract => Token::Abstract,
        RawToken::Is => Token::Is,
        RawToken::Struct => Token::Struct,
        RawToken::Enum => Token::Enum,
        RawToken::Event => Token::Event,
        RawToken::Modifier => Token::Modifier,
        RawToken::Function => Token::Function,
        RawToken::Constructor => Token::Constructor,
        RawToken::Fallback => Token::Fallback,
        RawToken::Receive => Token::Receive,
        RawToken::Using => Token::Using,
        RawToken::Returns => Token::Returns,
        RawToken::Return => Token::Return,
        RawToken::If => Token::If,
        RawToken::Else => Token::Else,
        RawToken::While => Token::While,
        RawToken::Do => Token::Do,
        RawToken::For => Token::For,
        RawToken::Break => Token::Break,
        RawToken::Continue => Token::Continue,
        RawToken::Emit => Token::Emit,
        RawToken::New => Token::New,
        RawToken::Assembly => Token::Assembly,
        RawToken::Public => Token::Public,
        RawToken::Private => Token::Private,
        RawToken::Internal => Token::Internal,
        RawToken::External => Token::External,
        RawToken::Pure => Token::Pure,
        RawToken::View => Token::View,
        RawToken::Payable => Token::Payable,
        RawToken::Virtual => Token::Virtual,
        RawToken::Override => Token::Override,
        RawToken::Constant => Token::Constant,
        RawToken::Indexed => Token::Indexed,
        RawToken::Memory => Token::Memory,
        RawToken::Storage => Token::Storage,
        RawToken::Calldata => Token::Calldata,
        RawToken::Mapping => Token::Mapping,
        RawToken::Bool => Token::Bool,
        RawToken::Address => Token::Address,
        RawToken::String => Token::String,
        RawToken::True => Token::True,
        RawToken::False => Token::False,
        RawToken::UintType(bits) => Token::Uint(bits),
        RawToken::IntType(bits) => Token::Int(bits),
        RawToken::BytesType(Some(width)) => Token::FixedBytes(width),
        RawToken::BytesType(None) => Token::Bytes,
        RawToken::Identifier(name) => Token::Identifier(name),
        RawToken::Number(text) => Token::Number(text),
        RawToken::StringLiteral(text) => Token::StringLiteral(text),
        RawToken::ShlAssign => Token::ShlAssign,
        RawToken::ShrAssign => Token::ShrAssign,
        RawToken::StarStar => Token::StarStar,
        RawToken::PlusPlus => Token::PlusPlus,
        RawToken::MinusMinus => Token::MinusMinus,
        RawToken::Eq => Token::Eq,
        RawToken::NotEq => Token::NotEq,
        RawToken::LtEq => Token::LtEq,
        RawToken::GtEq => Token::GtEq,
        RawToken::AmpAmp => Token::AmpAmp,
        RawToken::PipePipe => Token::PipePipe,
        RawToken::Shl => Token::Shl,
        RawToken::Shr => Token::Shr,
        RawToken::Arrow => Token::Arrow,
        RawToken::PlusAssign => Token::PlusAssign,
        RawToken::MinusAssign => Token::MinusAssign,
        RawToken::StarAssign => Token::StarAssign,
        RawToken::SlashAssign => Token::SlashAssign,
        RawToken::PercentAssign => Token::PercentAssign,
        RawToken::AmpAssign => Token::AmpAssign,
        RawToken::PipeAssign => Token::PipeAssign,
        RawToken::CaretAssign => Token::CaretAssign,
        RawToken::Plus => Token::Plus,
        RawToken::Minus => Token::Minus,
        RawToken::Star => Token::Star,
        RawToken::Slash => Token::Slash,
        RawToken::Percent => Token::Percent,
        RawToken::Bang => Token::Bang,
        RawToken::Tilde => Token::Tilde,
        RawToken::Lt => Token::Lt,
        RawToken::Gt => Token::Gt,
        RawToken::Amp => Token::Amp,
        RawToken::Pipe => Token::Pipe,
        RawToken::Caret => Token::Caret,
        RawToken::Assign => Token::Assign,
        RawToken::Question => Token::Question,
        RawToken::Dot => Token::Dot,
        RawToken::Colon => Token::Colon,
        RawToken::LParen => Token::LParen,
        RawToken::RParen => Token::RParen,
        RawToken::LBrace => Token::LBrace,
        RawToken::RBrace => Token::RBrace,
        RawToken::LBracket => Token::LBracket,
        RawToken::RBracket => Token::RBracket,
        RawToken::Semicolon => Token::Semicolon,
        RawToken::Comma => Token::Comma,
        RawToken::Whitespace | RawToken::LineComment | RawToken::BlockComment => {
            unreachable!("whitespace and comments are skipped")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|(tok, _)| tok)
            .collect()
    }

    #[test]
    fn test_keywords_and_identifiers() {
        let tokens = lex("contract Foo is Bar");
        assert_eq!(
            tokens,
            vec![
                Token::Contract,
                Token::Identifier("Foo".into()),
                Token::Is,
                Token::Identifier("Bar".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_type_widths() {
        let tokens = lex("uint uint8 uint256 int128 bytes bytes1 bytes32");
        assert_eq!(
            tokens,
            vec![
                Token::Uint(256),
                Token::Uint(8),
                Token::Uint(256),
                Token::Int(128),
                Token::Bytes,
                Token::FixedBytes(1),
                Token::FixedBytes(32),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_invalid_width_is_error() {
        assert!(Lexer::new("uint7 x;").tokenize().is_err());
        assert!(Lexer::new("bytes33 x;").tokenize().is_err());
    }

    #[test]
    fn test_numbers() {
        let tokens = lex("42 0xff 1_000_000 1e18");
        assert_eq!(
            tokens,
            vec![
                Token::Number("42".into()),
                Token::Number("0xff".into()),
                Token::Number("1000000".into()),
                Token::Number("1e18".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        let tokens = lex("a += b ** 2 >> 1");
        assert_eq!(
            tokens,
            vec![
                Token::Identifier("a".into()),
                Token::PlusAssign,
                Token::Identifier("b".into()),
                Token::StarStar,
                Token::Number("2".into()),
                Token::Shr,
                Token::Number("1".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_mapping_arrow() {
        let tokens = lex("mapping(address => uint)");
        assert_eq!(
            tokens,
            vec![
                Token::Mapping,
                Token::LParen,
                Token::Address,
                Token::Arrow,
                Token::Uint(256),
                Token::RParen,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_skipped() {
        let tokens = lex("a // comment\n /* block\n comment */ b");
        assert_eq!(
            tokens,
            vec![
                Token::Identifier("a".into()),
                Token::Identifier("b".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_spans_track_lines() {
        let tokens = Lexer::new("a\n  b").tokenize().unwrap();
        assert_eq!(tokens[0].1.line, 1);
        assert_eq!(tokens[1].1.line, 2);
        assert_eq!(tokens[1].1.column, 3);
    }

    #[test]
    fn test_string_literal() {
        let tokens = lex(r#""hello\n""#);
        assert_eq!(
            tokens,
            vec![Token::StringLiteral("hello\n".into()), Token::Eof]
        );
    }
}
