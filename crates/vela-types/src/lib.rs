//! Vela type system.
//!
//! Canonical, de-duplicated type objects. Every distinct type is interned
//! once in a [`TypeProvider`] owned by the compile invocation and referred to
//! by its [`TypeId`]; structural equality is the deduplication key.

pub mod convert;
pub mod provider;
pub mod ty;

pub use convert::{common_type, implicitly_convertible, mobile_type, smallest_int_type};
pub use provider::TypeProvider;
pub use ty::{CallableKind, FunctionType, MagicKind, Type, TypeId};

// the AST enums embedded in type objects, for downstream convenience
pub use vela_parser::ast::{DataLocation, StateMutability};
