//! Tokens and source spans for the Vela language.

use std::fmt;

/// A half-open byte range into a source unit, with the line/column of its
/// first byte for human-readable locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    /// Byte offset of the first character
    pub start: u32,
    /// Byte offset one past the last character
    pub end: u32,
    /// 1-based line of the first character
    pub line: u32,
    /// 1-based column of the first character
    pub column: u32,
}

impl Span {
    pub fn new(start: u32, end: u32, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// A span that points nowhere; used for synthesised nodes.
    pub const DUMMY: Span = Span {
        start: 0,
        end: 0,
        line: 0,
        column: 0,
    };

    /// Combine two spans into one covering both.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start,
            end: other.end.max(self.end),
            line: self.line,
            column: self.column,
        }
    }

    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Tokens of the Vela language.
///
/// Width-carrying type keywords (`uint128`, `bytes4`) keep their width so the
/// parser does not have to re-parse the lexeme.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Declaration keywords
    Pragma,
    Import,
    As,
    Contract,
    Library,
    Interface,
    Abstract,
    Is,
    Struct,
    Enum,
    Event,
    Modifier,
    Function,
    Constructor,
    Fallback,
    Receive,
    Using,

    // Statement keywords
    Returns,
    Return,
    If,
    Else,
    While,
    Do,
    For,
    Break,
    Continue,
    Emit,
    New,
    Assembly,

    // Visibility and mutability
    Public,
    Private,
    Internal,
    External,
    Pure,
    View,
    Payable,
    Virtual,
    Override,
    Constant,
    Indexed,

    // Data locations
    Memory,
    Storage,
    Calldata,

    // Type keywords
    Mapping,
    Bool,
    Address,
    /// `uintN`; bare `uint` carries 256
    Uint(u16),
    /// `intN`; bare `int` carries 256
    Int(u16),
    /// `bytesN`, 1..=32
    FixedBytes(u8),
    /// dynamic `bytes`
    Bytes,
    /// `string`
    String,

    // Literals
    True,
    False,
    Identifier(std::string::String),
    /// Decimal, scientific or `0x` hex literal with separators stripped
    Number(std::string::String),
    StringLiteral(std::string::String),

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Comma,
    Dot,
    Colon,
    Question,
    /// `=>` in mapping types
    Arrow,

    // Operators
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
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    StarStar,
    PlusPlus,
    MinusMinus,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    AmpAmp,
    PipePipe,
    Bang,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Shl,
    Shr,

    Eof,
}

impl Token {
    /// Does this token begin an elementary type name?
    pub fn is_elementary_type(&self) -> bool {
        matches!(
            self,
            Token::Bool
                | Token::Address
                | Token::Uint(_)
                | Token::Int(_)
                | Token::FixedBytes(_)
                | Token::Bytes
                | Token::String
        )
    }

    /// Is this a data-location keyword?
    pub fn is_data_location(&self) -> bool {
        matches!(self, Token::Memory | Token::Storage | Token::Calldata)
    }

    /// Is this a visibility keyword?
    pub fn is_visibility(&self) -> bool {
        matches!(
            self,
            Token::Public | Token::Private | Token::Internal | Token::External
        )
    }

    /// Is this a state-mutability keyword?
    pub fn is_mutability(&self) -> bool {
        matches!(self, Token::Pure | Token::View | Token::Payable)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Pragma => write!(f, "pragma"),
            Token::Import => write!(f, "import"),
            Token::As => write!(f, "as"),
            Token::Contract => write!(f, "contract"),
            Token::Library => write!(f, "library"),
            Token::Interface => write!(f, "interface"),
            Token::Abstract => write!(f, "abstract"),
            Token::Is => write!(f, "is"),
            Token::Struct => write!(f, "struct"),
            Token::Enum => write!(f, "enum"),
            Token::Event => write!(f, "event"),
            Token::Modifier => write!(f, "modifier"),
            Token::Function => write!(f, "function"),
            Token::Constructor => write!(f, "constructor"),
            Token::Fallback => write!(f, "fallback"),
            Token::Receive => write!(f, "receive"),
            Token::Using => write!(f, "using"),
            Token::Returns => write!(f, "returns"),
            Token::Return => write!(f, "return"),
            Token::If => write!(f, "if"),
            Token::Else => write!(f, "else"),
            Token::While => write!(f, "while"),
            Token::Do => write!(f, "do"),
            Token::For => write!(f, "for"),
            Token::Break => write!(f, "break"),
            Token::Continue => write!(f, "continue"),
            Token::Emit => write!(f, "emit"),
            Token::New => write!(f, "new"),
            Token::Assembly => write!(f, "assembly"),
            Token::Public => write!(f, "public"),
            Token::Private => write!(f, "private"),
            Token::Internal => write!(f, "internal"),
            Token::External => write!(f, "external"),
            Token::Pure => write!(f, "pure"),
            Token::View => write!(f, "view"),
            Token::Payable => write!(f, "payable"),
            Token::Virtual => write!(f, "virtual"),
            Token::Override => write!(f, "override"),
            Token::Constant => write!(f, "constant"),
            Token::Indexed => write!(f, "indexed"),
            Token::Memory => write!(f, "memory"),
            Token::Storage => write!(f, "storage"),
            Token::Calldata => write!(f, "calldata"),
            Token::Mapping => write!(f, "mapping"),
            Token::Bool => write!(f, "bool"),
            Token::Address => write!(f, "address"),
            Token::Uint(bits) => write!(f, "uint{}", bits),
            Token::Int(bits) => write!(f, "int{}", bits),
            Token::FixedBytes(n) => write!(f, "bytes{}", n),
            Token::Bytes => write!(f, "bytes"),
            Token::String => write!(f, "string"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Identifier(name) => write!(f, "{}", name),
            Token::Number(text) => write!(f, "{}", text),
            Token::StringLiteral(text) => write!(f, "\"{}\"", text),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Semicolon => write!(f, ";"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::Colon => write!(f, ":"),
            Token::Question => write!(f, "?"),
            Token::Arrow => write!(f, "=>"),
            Token::Assign => write!(f, "="),
            Token::PlusAssign => write!(f, "+="),
            Token::MinusAssign => write!(f, "-="),
            Token::StarAssign => write!(f, "*="),
            Token::SlashAssign => write!(f, "/="),
            Token::PercentAssign => write!(f, "%="),
            Token::AmpAssign => write!(f, "&="),
            Token::PipeAssign => write!(f, "|="),
            Token::CaretAssign => write!(f, "^="),
            Token::ShlAssign => write!(f, "<<="),
            Token::ShrAssign => write!(f, ">>="),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::StarStar => write!(f, "**"),
            Token::PlusPlus => write!(f, "++"),
            Token::MinusMinus => write!(f, "--"),
            Token::Eq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::LtEq => write!(f, "<="),
            Token::GtEq => write!(f, ">="),
            Token::AmpAmp => write!(f, "&&"),
            Token::PipePipe => write!(f, "||"),
            Token::Bang => write!(f, "!"),
            Token::Amp => write!(f, "&"),
            Token::Pipe => write!(f, "|"),
            Token::Caret => write!(f, "^"),
            Token::Tilde => write!(f, "~"),
            Token::Shl => write!(f, "<<"),
            Token::Shr => write!(f, ">>"),
            Token::Eof => write!(f, "<eof>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_to() {
        let a = Span::new(0, 5, 1, 1);
        let b = Span::new(8, 12, 2, 3);
        let merged = a.to(b);
        assert_eq!(merged.start, 0);
        assert_eq!(merged.end, 12);
        assert_eq!(merged.line, 1);
    }

    #[test]
    fn test_token_classification() {
        assert!(Token::Uint(256).is_elementary_type());
        assert!(Token::Bytes.is_elementary_type());
        assert!(!Token::Mapping.is_elementary_type());
        assert!(Token::Memory.is_data_location());
        assert!(Token::External.is_visibility());
        assert!(Token::Pure.is_mutability());
    }

    #[test]
    fn test_token_display() {
        assert_eq!(Token::Uint(8).to_string(), "uint8");
        assert_eq!(Token::FixedBytes(32).to_string(), "bytes32");
        assert_eq!(Token::Arrow.to_string(), "=>");
    }
}
