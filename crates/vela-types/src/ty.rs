//! Core type definitions.

use num_bigint::BigInt;
use std::fmt;
use vela_parser::ast::{DataLocation, NodeId, StateMutability};

/// Unique identifier for a type within one [`crate::TypeProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

/// Where a callable lives: internal jump, external message call, or a log
/// topic (events).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallableKind {
    Internal,
    External,
    Event,
}

/// The type of a function, modifier-free: parameter list, return list,
/// kind and state mutability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub params: Vec<TypeId>,
    pub returns: Vec<TypeId>,
    pub kind: CallableKind,
    pub mutability: StateMutability,
}

/// Built-in global namespaces with their own member tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MagicKind {
    Block,
    Msg,
    Tx,
}

impl fmt::Display for MagicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MagicKind::Block => write!(f, "block"),
            MagicKind::Msg => write!(f, "msg"),
            MagicKind::Tx => write!(f, "tx"),
        }
    }
}

/// A canonical type object.
///
/// Immutable once interned. Reference types carry their data location; the
/// same element type in memory and in storage interns to two distinct ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    /// `intN`/`uintN`
    Int { bits: u16, signed: bool },
    /// `bytesN`
    FixedBytes(u8),
    Address { payable: bool },
    /// The type of an integer literal; one type per distinct value
    IntLiteral(BigInt),
    /// The type of a string literal; convertible to `string`, `bytes` and
    /// fitting `bytesN`
    StringLiteral(String),
    Contract {
        decl: NodeId,
        name: String,
        is_library: bool,
    },
    Struct {
        decl: NodeId,
        name: String,
        location: DataLocation,
    },
    Enum {
        decl: NodeId,
        name: String,
        variant_count: u16,
    },
    Array {
        base: TypeId,
        /// `None` for dynamic arrays
        length: Option<u64>,
        location: DataLocation,
    },
    /// dynamic `bytes`
    Bytes { location: DataLocation },
    /// `string`
    String { location: DataLocation },
    Mapping { key: TypeId, value: TypeId },
    Function(FunctionType),
    Modifier { params: Vec<TypeId> },
    Tuple(Vec<TypeId>),
    /// The reflective type of a type, e.g. the callee of `uint8(x)` or the
    /// left side of `Color.Red`
    TypeType(TypeId),
    Magic(MagicKind),
    /// Sentinel used after declaration errors; convertible to and from
    /// everything so one error does not cascade
    Error,
}

impl Type {
    /// Value types fit in a single machine word and are copied on
    /// assignment.
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            Type::Bool
                | Type::Int { .. }
                | Type::FixedBytes(_)
                | Type::Address { .. }
                | Type::IntLiteral(_)
                | Type::Contract { .. }
                | Type::Enum { .. }
                | Type::Function(_)
        )
    }

    /// Reference types must carry a data location.
    pub fn is_reference_type(&self) -> bool {
        matches!(
            self,
            Type::Struct { .. } | Type::Array { .. } | Type::Bytes { .. } | Type::String { .. }
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int { .. } | Type::IntLiteral(_))
    }

    pub fn is_dynamically_sized(&self) -> bool {
        matches!(
            self,
            Type::Array { length: None, .. } | Type::Bytes { .. } | Type::String { .. }
        )
    }

    pub fn data_location(&self) -> Option<DataLocation> {
        match self {
            Type::Struct { location, .. }
            | Type::Array { location, .. }
            | Type::Bytes { location }
            | Type::String { location } => Some(*location),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionType> {
        match self {
            Type::Function(func) => Some(func),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    #[test]
    fn test_value_vs_reference() {
        assert!(Type::Bool.is_value_type());
        assert!(Type::Int {
            bits: 256,
            signed: false
        }
        .is_value_type());
        assert!(Type::Bytes {
            location: DataLocation::Memory
        }
        .is_reference_type());
        assert!(!Type::Bool.is_reference_type());
    }

    #[test]
    fn test_numeric() {
        assert!(Type::IntLiteral(BigInt::from(7)).is_numeric());
        assert!(!Type::Address { payable: false }.is_numeric());
    }

    #[test]
    fn test_dynamically_sized() {
        assert!(Type::String {
            location: DataLocation::Storage
        }
        .is_dynamically_sized());
        assert!(!Type::FixedBytes(32).is_dynamically_sized());
    }
}
