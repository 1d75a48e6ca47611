//! Contract-level declarations: contracts, state variables, functions,
//! modifiers, structs, enums, events and using-for directives.

use super::{Expression, Identifier, IdentifierPath, NodeId, TypeName};
use crate::ast::statement::Block;
use crate::token::Span;
use std::fmt;

/// Kind of a contract-like definition. A library is a contract with a
/// library flag as far as the tree is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractKind {
    Contract,
    Library,
    Interface,
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractKind::Contract => write!(f, "contract"),
            ContractKind::Library => write!(f, "library"),
            ContractKind::Interface => write!(f, "interface"),
        }
    }
}

/// A single base in an inheritance list, optionally with constructor
/// arguments: `is Base(1, 2)`.
#[derive(Debug, Clone, PartialEq)]
pub struct InheritanceSpecifier {
    pub name: IdentifierPath,
    pub args: Option<Vec<Expression>>,
    pub span: Span,
}

/// A contract, library or interface definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractDef {
    pub id: NodeId,
    pub kind: ContractKind,
    pub is_abstract: bool,
    pub name: Identifier,
    /// Direct bases in declaration order
    pub bases: Vec<InheritanceSpecifier>,
    pub items: Vec<ContractItem>,
    pub span: Span,
}

impl ContractDef {
    pub fn is_library(&self) -> bool {
        self.kind == ContractKind::Library
    }

    /// Iterate over the function definitions of this contract.
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDef> {
        self.items.iter().filter_map(|item| match item {
            ContractItem::Function(func) => Some(func),
            _ => None,
        })
    }

    /// Iterate over the state variables of this contract.
    pub fn state_variables(&self) -> impl Iterator<Item = &StateVarDecl> {
        self.items.iter().filter_map(|item| match item {
            ContractItem::StateVar(var) => Some(var),
            _ => None,
        })
    }

    /// The constructor, if one is declared.
    pub fn constructor(&self) -> Option<&FunctionDef> {
        self.functions().find(|f| f.kind == FunctionKind::Constructor)
    }
}

/// Item inside a contract body, recognised by leading-token dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum ContractItem {
    StateVar(StateVarDecl),
    Function(FunctionDef),
    Modifier(ModifierDef),
    Struct(StructDef),
    Enum(EnumDef),
    Event(EventDef),
    Using(UsingForDirective),
}

impl ContractItem {
    pub fn span(&self) -> Span {
        match self {
            ContractItem::StateVar(v) => v.span,
            ContractItem::Function(f) => f.span,
            ContractItem::Modifier(m) => m.span,
            ContractItem::Struct(s) => s.span,
            ContractItem::Enum(e) => e.span,
            ContractItem::Event(e) => e.span,
            ContractItem::Using(u) => u.span,
        }
    }
}

/// Member visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Private,
    Internal,
    External,
}

impl Visibility {
    /// Callable from outside the contract (part of the external interface)?
    pub fn is_externally_visible(self) -> bool {
        matches!(self, Visibility::Public | Visibility::External)
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Private => write!(f, "private"),
            Visibility::Internal => write!(f, "internal"),
            Visibility::External => write!(f, "external"),
        }
    }
}

/// State mutability of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateMutability {
    Pure,
    View,
    NonPayable,
    Payable,
}

impl StateMutability {
    /// Ordering used by the override checker: overriding may only narrow.
    /// Pure is the most restrictive, payable the least.
    pub fn restrictiveness(self) -> u8 {
        match self {
            StateMutability::Payable => 0,
            StateMutability::NonPayable => 1,
            StateMutability::View => 2,
            StateMutability::Pure => 3,
        }
    }
}

impl fmt::Display for StateMutability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateMutability::Pure => write!(f, "pure"),
            StateMutability::View => write!(f, "view"),
            StateMutability::NonPayable => write!(f, "nonpayable"),
            StateMutability::Payable => write!(f, "payable"),
        }
    }
}

/// Data location of a reference-type value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataLocation {
    Storage,
    Memory,
    Calldata,
}

impl fmt::Display for DataLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataLocation::Storage => write!(f, "storage"),
            DataLocation::Memory => write!(f, "memory"),
            DataLocation::Calldata => write!(f, "calldata"),
        }
    }
}

/// A typed, optionally named declaration: parameters, return values and
/// struct fields.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub id: NodeId,
    pub type_name: TypeName,
    pub location: Option<DataLocation>,
    pub name: Option<Identifier>,
    pub span: Span,
}

/// A state variable declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct StateVarDecl {
    pub id: NodeId,
    pub type_name: TypeName,
    pub visibility: Visibility,
    pub is_constant: bool,
    pub overrides: Option<OverrideSpecifier>,
    pub name: Identifier,
    pub initializer: Option<Expression>,
    pub span: Span,
}

/// What flavour of callable a [`FunctionDef`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    Function,
    Constructor,
    Fallback,
    Receive,
}

/// `override` / `override(Base, …)` on a function, modifier or state
/// variable.
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideSpecifier {
    pub bases: Vec<IdentifierPath>,
    pub span: Span,
}

/// A modifier applied to a function head: `onlyOwner` or `lock(key)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModifierInvocation {
    pub id: NodeId,
    pub name: IdentifierPath,
    /// `None` means no argument list was written at all
    pub args: Option<Vec<Expression>>,
    pub span: Span,
}

/// A function, constructor, fallback or receive definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub id: NodeId,
    pub kind: FunctionKind,
    /// `None` for constructor/fallback/receive
    pub name: Option<Identifier>,
    pub params: Vec<VarDecl>,
    pub returns: Vec<VarDecl>,
    pub visibility: Visibility,
    pub mutability: StateMutability,
    pub is_virtual: bool,
    pub overrides: Option<OverrideSpecifier>,
    pub invocations: Vec<ModifierInvocation>,
    /// `None` for unimplemented (abstract/interface) functions
    pub body: Option<Block>,
    pub span: Span,
}

impl FunctionDef {
    pub fn is_constructor(&self) -> bool {
        self.kind == FunctionKind::Constructor
    }

    pub fn is_implemented(&self) -> bool {
        self.body.is_some()
    }

    /// Name used in diagnostics: the declared name or the kind keyword.
    pub fn display_name(&self) -> &str {
        match (&self.name, self.kind) {
            (Some(name), _) => &name.name,
            (None, FunctionKind::Constructor) => "constructor",
            (None, FunctionKind::Fallback) => "fallback",
            (None, FunctionKind::Receive) => "receive",
            (None, FunctionKind::Function) => "function",
        }
    }
}

/// A modifier definition; its body contains the `_;` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct ModifierDef {
    pub id: NodeId,
    pub name: Identifier,
    pub params: Vec<VarDecl>,
    pub is_virtual: bool,
    pub overrides: Option<OverrideSpecifier>,
    pub body: Block,
    pub span: Span,
}

/// A struct definition.
#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub id: NodeId,
    pub name: Identifier,
    pub fields: Vec<VarDecl>,
    pub span: Span,
}

/// An enum definition.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub id: NodeId,
    pub name: Identifier,
    pub variants: Vec<Identifier>,
    pub span: Span,
}

/// An event parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct EventParam {
    pub id: NodeId,
    pub type_name: TypeName,
    pub indexed: bool,
    pub name: Option<Identifier>,
    pub span: Span,
}

/// An event definition.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDef {
    pub id: NodeId,
    pub name: Identifier,
    pub params: Vec<EventParam>,
    pub span: Span,
}

/// `using Lib for T;` — `target` is `None` for `using Lib for *;`.
#[derive(Debug, Clone, PartialEq)]
pub struct UsingForDirective {
    pub id: NodeId,
    pub library: IdentifierPath,
    pub target: Option<TypeName>,
    pub span: Span,
}
