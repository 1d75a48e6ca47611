//! AST for the Vela contract language.
//!
//! The tree is a set of tagged variants with struct payloads. Every
//! declaration and expression node carries a [`NodeId`] assigned by the parser
//! so that later passes can attach annotations in side tables without touching
//! the tree; cross references between nodes are expressed as `NodeId` lookups,
//! never as owning edges. The AST is append-only: the parser builds it and no
//! pass restructures it afterwards.

pub mod contract;
pub mod expression;
pub mod printer;
pub mod statement;
pub mod types;
pub mod visitor;

pub use contract::*;
pub use expression::*;
pub use statement::*;
pub use types::*;

use crate::token::Span;
use std::fmt;

/// Identity of an AST node, unique within one compile invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A simple name with its location.
#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub span: Span,
}

/// A dotted name such as `Lib.Inner`.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentifierPath {
    pub segments: Vec<Identifier>,
    pub span: Span,
}

impl IdentifierPath {
    /// Render the path with dots, e.g. `A.B.C`.
    pub fn dotted(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// The final segment of the path.
    pub fn last(&self) -> &Identifier {
        self.segments.last().expect("identifier path is never empty")
    }
}

/// A logical input keyed by a path-like string. Owns its AST.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceUnit {
    /// Canonical logical path of this unit
    pub path: String,
    pub items: Vec<SourceItem>,
    pub span: Span,
}

impl SourceUnit {
    /// Iterate over the contracts defined in this unit.
    pub fn contracts(&self) -> impl Iterator<Item = &ContractDef> {
        self.items.iter().filter_map(|item| match item {
            SourceItem::Contract(contract) => Some(contract),
            _ => None,
        })
    }
}

/// Top-level item of a source unit.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceItem {
    Pragma(PragmaDirective),
    Import(ImportDirective),
    Contract(ContractDef),
}

impl SourceItem {
    pub fn span(&self) -> Span {
        match self {
            SourceItem::Pragma(p) => p.span,
            SourceItem::Import(i) => i.span,
            SourceItem::Contract(c) => c.span,
        }
    }
}

/// `pragma …;` — recorded but not interpreted by the core.
#[derive(Debug, Clone, PartialEq)]
pub struct PragmaDirective {
    pub id: NodeId,
    /// Raw text between `pragma` and `;`
    pub text: String,
    pub span: Span,
}

/// `import "path";` or `import "path" as name;`
#[derive(Debug, Clone, PartialEq)]
pub struct ImportDirective {
    pub id: NodeId,
    /// The import path exactly as written
    pub path: String,
    pub alias: Option<Identifier>,
    pub span: Span,
}
