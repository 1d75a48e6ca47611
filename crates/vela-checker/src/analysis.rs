//! Analysis output: the annotation side-tables every later pass reads.
//!
//! The AST is never restructured; everything the passes learn about a node is
//! keyed on its [`NodeId`] here.

use rustc_hash::FxHashMap;
use vela_parser::ast::{ContractKind, FunctionKind, NodeId, StateMutability, Visibility};
use vela_parser::Span;
use vela_types::{MagicKind, TypeId, TypeProvider};

/// What an identifier or member access resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// A local variable or parameter (`VarDecl` node)
    Variable(NodeId),
    /// A state variable declaration
    StateVar(NodeId),
    /// An overload set of functions; the set keeps declaration order
    Functions(Vec<NodeId>),
    /// Library functions attached to the receiver's type by a `using`
    /// directive; calls prepend the receiver as the first argument
    BoundFunctions(Vec<NodeId>),
    /// A modifier definition
    Modifier(NodeId),
    /// An event definition
    Event(NodeId),
    /// A contract, struct or enum used as a type or namespace
    TypeLike(NodeId),
    /// A field of a struct, by declaration and field index
    StructField { decl: NodeId, index: usize },
    /// A variant of an enum, by declaration and variant index
    EnumVariant { decl: NodeId, index: usize },
    /// A member of `block`, `msg` or `tx`
    MagicMember(MagicKind, String),
    /// `.length` of an array or byte string
    ArrayLength,
    /// `.balance` on an address
    AddressBalance,
    /// A built-in free function
    Builtin(Builtin),
    /// `this`
    This,
    /// `super`
    Super,
}

/// Built-in free functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Require,
    Assert,
    Revert,
    Keccak256,
    Addmod,
    Mulmod,
}

/// What a call expression ended up calling, after overload resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum CallTarget {
    /// An internal (possibly virtual) call to a function of this contract
    /// lattice
    Function {
        id: NodeId,
        is_virtual: bool,
        is_super: bool,
    },
    /// An external message call on a contract-typed expression
    External { function: NodeId },
    /// A library function bound to its receiver via `using`; the receiver
    /// becomes the first argument of an internal call
    Bound { function: NodeId },
    /// A synthesised public-state-variable getter call (externally only)
    Getter { var: NodeId },
    /// `emit Event(…)`
    Event(NodeId),
    Builtin(Builtin),
    /// Elementary or user-defined type cast
    TypeCast(TypeId),
    /// Struct literal construction `S(a, b)`
    StructConstructor(NodeId),
    /// `new C(…)` contract creation
    ContractCreation(NodeId),
}

/// Value category of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    LValue,
    RValue,
}

/// Per-expression annotation, filled in post-order by the type checker.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprInfo {
    pub ty: TypeId,
    pub category: Category,
    pub is_pure: bool,
    pub is_constant: bool,
}

/// The signature of a callable: a declared function or a synthesised getter.
#[derive(Debug, Clone)]
pub struct FunctionSig {
    pub id: NodeId,
    pub contract: NodeId,
    pub name: String,
    pub kind: FunctionKind,
    pub params: Vec<TypeId>,
    pub returns: Vec<TypeId>,
    pub param_names: Vec<String>,
    pub return_names: Vec<String>,
    pub visibility: Visibility,
    pub mutability: StateMutability,
    pub is_virtual: bool,
    /// Resolved contracts named in the `override(…)` list
    pub override_bases: Vec<NodeId>,
    pub has_override: bool,
    pub implemented: bool,
    /// Synthesised from a public state variable
    pub is_getter: bool,
    pub span: Span,
}

impl FunctionSig {
    /// The canonical external signature, e.g. `transfer(address,uint256)`.
    /// `None` when a parameter type cannot appear in an external interface.
    pub fn external_signature(&self, provider: &TypeProvider) -> Option<String> {
        let params: Option<Vec<_>> = self
            .params
            .iter()
            .map(|param| provider.canonical_name(*param))
            .collect();
        Some(format!("{}({})", self.name, params?.join(",")))
    }
}

/// The signature of a modifier.
#[derive(Debug, Clone)]
pub struct ModifierSig {
    pub id: NodeId,
    pub contract: NodeId,
    pub name: String,
    pub params: Vec<TypeId>,
    pub is_virtual: bool,
    pub override_bases: Vec<NodeId>,
    pub has_override: bool,
    pub span: Span,
}

/// Struct layout.
#[derive(Debug, Clone)]
pub struct StructInfo {
    pub id: NodeId,
    pub name: String,
    pub fields: Vec<(String, TypeId)>,
    pub span: Span,
}

/// Enum layout.
#[derive(Debug, Clone)]
pub struct EnumInfo {
    pub id: NodeId,
    pub name: String,
    pub variants: Vec<String>,
    pub span: Span,
}

/// Event signature.
#[derive(Debug, Clone)]
pub struct EventSig {
    pub id: NodeId,
    pub contract: NodeId,
    pub name: String,
    pub params: Vec<TypeId>,
    pub indexed: Vec<bool>,
    pub param_names: Vec<String>,
    pub span: Span,
}

/// State variable annotation.
#[derive(Debug, Clone)]
pub struct StateVarInfo {
    pub id: NodeId,
    pub contract: NodeId,
    pub name: String,
    pub ty: TypeId,
    pub visibility: Visibility,
    pub is_constant: bool,
    pub span: Span,
}

/// One externally callable entry of a contract's interface.
#[derive(Debug, Clone)]
pub struct InterfaceFunction {
    pub selector: [u8; 4],
    pub signature: String,
    /// The function (or, for getters, the state variable) behind the entry
    pub callable: NodeId,
}

/// Per-contract annotation.
#[derive(Debug, Clone)]
pub struct ContractInfo {
    pub id: NodeId,
    pub name: String,
    pub kind: ContractKind,
    pub declared_abstract: bool,
    pub span: Span,
    /// Source unit index in the compile's file table
    pub file: usize,
    /// Direct bases in declaration order
    pub direct_bases: Vec<NodeId>,
    /// C3-linearised base list, most-derived (this contract) first
    pub linearized: Vec<NodeId>,
    /// Own member declarations
    pub functions: Vec<NodeId>,
    pub modifiers: Vec<NodeId>,
    pub state_vars: Vec<NodeId>,
    pub structs: Vec<NodeId>,
    pub enums: Vec<NodeId>,
    pub events: Vec<NodeId>,
    /// Callables declared or inherited but not implemented anywhere
    pub unimplemented: Vec<NodeId>,
    /// External interface, sorted by ascending selector; empty for
    /// abstract contracts and libraries
    pub interface: Vec<InterfaceFunction>,
    /// Storage slot of every non-constant state variable reachable from
    /// this contract, assigned in linearisation order, base-most first.
    /// Layout is a property of the most-derived contract.
    pub layout: FxHashMap<NodeId, u64>,
    /// `using L for T;` directives of this contract: the library and the
    /// bound type (`None` for `*`). Derived contracts inherit them through
    /// the linearised list.
    pub using_for: Vec<(NodeId, Option<TypeId>)>,
}

impl ContractInfo {
    /// A contract is abstract if declared so or if anything stays
    /// unimplemented.
    pub fn is_abstract(&self) -> bool {
        self.declared_abstract || self.kind == ContractKind::Interface || !self.unimplemented.is_empty()
    }
}

/// Every side-table produced by semantic analysis.
pub struct Analysis {
    pub provider: TypeProvider,
    /// The interned error sentinel, usable without mutable provider access
    pub error_type: TypeId,
    pub contracts: FxHashMap<NodeId, ContractInfo>,
    /// Contract ids in source order; determinism of output depends on it
    pub contract_order: Vec<NodeId>,
    pub functions: FxHashMap<NodeId, FunctionSig>,
    pub modifiers: FxHashMap<NodeId, ModifierSig>,
    pub structs: FxHashMap<NodeId, StructInfo>,
    pub enums: FxHashMap<NodeId, EnumInfo>,
    pub events: FxHashMap<NodeId, EventSig>,
    pub state_vars: FxHashMap<NodeId, StateVarInfo>,
    /// Types of locals and parameters (`VarDecl` nodes)
    pub locals: FxHashMap<NodeId, TypeId>,
    /// Expression annotations
    pub expr_info: FxHashMap<NodeId, ExprInfo>,
    /// Resolution of identifiers, member accesses and user-defined type
    /// names
    pub resolved: FxHashMap<NodeId, Target>,
    /// Per-call resolution after overload selection
    pub call_targets: FxHashMap<NodeId, CallTarget>,
    /// Override edges: a callable to the base callables it overrides
    pub overrides: FxHashMap<NodeId, Vec<NodeId>>,
}

impl Analysis {
    pub fn new() -> Self {
        let mut provider = TypeProvider::new();
        let error_type = provider.error_type();
        Self {
            provider,
            error_type,
            contracts: FxHashMap::default(),
            contract_order: Vec::new(),
            functions: FxHashMap::default(),
            modifiers: FxHashMap::default(),
            structs: FxHashMap::default(),
            enums: FxHashMap::default(),
            events: FxHashMap::default(),
            state_vars: FxHashMap::default(),
            locals: FxHashMap::default(),
            expr_info: FxHashMap::default(),
            resolved: FxHashMap::default(),
            call_targets: FxHashMap::default(),
            overrides: FxHashMap::default(),
        }
    }

    /// Expression type, or the error sentinel if the checker never reached
    /// the node (which only happens after earlier errors).
    pub fn type_of(&self, expr: NodeId) -> TypeId {
        match self.expr_info.get(&expr) {
            Some(info) => info.ty,
            None => self.error_type,
        }
    }

    /// Find the implementation of `name` with matching external parameter
    /// types, walking `contract`'s linearised base list. This is the
    /// virtual-dispatch resolution the emitter uses.
    pub fn resolve_virtual(
        &self,
        contract: NodeId,
        name: &str,
        params: &[TypeId],
    ) -> Option<NodeId> {
        let info = self.contracts.get(&contract)?;
        for base in &info.linearized {
            let base_info = self.contracts.get(base)?;
            for func_id in &base_info.functions {
                let sig = self.functions.get(func_id)?;
                if sig.name == name
                    && self.same_external_params(&sig.params, params)
                    && sig.implemented
                {
                    return Some(*func_id);
                }
            }
        }
        None
    }

    /// Same resolution, starting one element after `after` in the list.
    pub fn resolve_super(
        &self,
        contract: NodeId,
        after: NodeId,
        name: &str,
        params: &[TypeId],
    ) -> Option<NodeId> {
        let info = self.contracts.get(&contract)?;
        let position = info.linearized.iter().position(|id| *id == after)?;
        for base in &info.linearized[position + 1..] {
            let base_info = self.contracts.get(base)?;
            for func_id in &base_info.functions {
                let sig = self.functions.get(func_id)?;
                if sig.name == name
                    && self.same_external_params(&sig.params, params)
                    && sig.implemented
                {
                    return Some(*func_id);
                }
            }
        }
        None
    }

    /// Parameter lists agree for dispatch purposes: canonical external names
    /// match, falling back to display names for internal types.
    pub fn same_external_params(&self, a: &[TypeId], b: &[TypeId]) -> bool {
        if a.len() != b.len() {
            return false;
        }
        a.iter().zip(b).all(|(x, y)| {
            x == y || {
                let cx = self.provider.canonical_name(*x);
                cx.is_some() && cx == self.provider.canonical_name(*y)
            }
        })
    }
}

impl Default for Analysis {
    fn default() -> Self {
        Self::new()
    }
}
