//! Type-name AST nodes.
//!
//! These are the *syntactic* types as written in source; the checker resolves
//! them to canonical type objects in `vela-types`.

use super::{Expression, IdentifierPath, NodeId, StateMutability, Visibility};
use crate::token::Span;
use std::fmt;

/// Built-in value type keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementaryType {
    Bool,
    /// `address` / `address payable`
    Address { payable: bool },
    /// `uintN`
    Uint(u16),
    /// `intN`
    Int(u16),
    /// `bytesN`, 1..=32
    FixedBytes(u8),
    /// dynamic `bytes`
    Bytes,
    /// `string`
    String,
}

impl fmt::Display for ElementaryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementaryType::Bool => write!(f, "bool"),
            ElementaryType::Address { payable: false } => write!(f, "address"),
            ElementaryType::Address { payable: true } => write!(f, "address payable"),
            ElementaryType::Uint(bits) => write!(f, "uint{}", bits),
            ElementaryType::Int(bits) => write!(f, "int{}", bits),
            ElementaryType::FixedBytes(n) => write!(f, "bytes{}", n),
            ElementaryType::Bytes => write!(f, "bytes"),
            ElementaryType::String => write!(f, "string"),
        }
    }
}

/// A type name as written in source.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeName {
    Elementary {
        ty: ElementaryType,
        span: Span,
    },
    /// A (possibly dotted) reference to a contract, struct or enum.
    UserDefined {
        id: NodeId,
        path: IdentifierPath,
    },
    /// `T[]` or `T[n]`
    Array {
        base: Box<TypeName>,
        length: Option<Box<Expression>>,
        span: Span,
    },
    /// `mapping(K => V)`
    Mapping {
        key: Box<TypeName>,
        value: Box<TypeName>,
        span: Span,
    },
    /// `function (T1, T2) <visibility> <mutability> returns (R)`
    Function {
        params: Vec<TypeName>,
        returns: Vec<TypeName>,
        visibility: Visibility,
        mutability: StateMutability,
        span: Span,
    },
}

impl TypeName {
    pub fn span(&self) -> Span {
        match self {
            TypeName::Elementary { span, .. } => *span,
            TypeName::UserDefined { path, .. } => path.span,
            TypeName::Array { span, .. } => *span,
            TypeName::Mapping { span, .. } => *span,
            TypeName::Function { span, .. } => *span,
        }
    }

    /// Mappings and dynamic arrays of mappings can only live in storage.
    pub fn contains_mapping(&self) -> bool {
        match self {
            TypeName::Mapping { .. } => true,
            TypeName::Array { base, .. } => base.contains_mapping(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elementary_display() {
        assert_eq!(ElementaryType::Uint(256).to_string(), "uint256");
        assert_eq!(
            ElementaryType::Address { payable: true }.to_string(),
            "address payable"
        );
        assert_eq!(ElementaryType::FixedBytes(4).to_string(), "bytes4");
    }

    #[test]
    fn test_contains_mapping() {
        let mapping = TypeName::Mapping {
            key: Box::new(TypeName::Elementary {
                ty: ElementaryType::Address { payable: false },
                span: Span::DUMMY,
            }),
            value: Box::new(TypeName::Elementary {
                ty: ElementaryType::Uint(256),
                span: Span::DUMMY,
            }),
            span: Span::DUMMY,
        };
        assert!(mapping.contains_mapping());

        let array_of_mapping = TypeName::Array {
            base: Box::new(mapping),
            length: None,
            span: Span::DUMMY,
        };
        assert!(array_of_mapping.contains_mapping());
    }
}
