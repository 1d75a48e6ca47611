//! AST index: node-identity lookups into the parsed units.
//!
//! The emitter works from the analysis side-tables but still needs the
//! bodies of functions and modifiers; this index maps a declaration's
//! `NodeId` back to its AST node without restructuring the tree.

use rustc_hash::FxHashMap;
use vela_parser::ast::*;

/// Borrowed views into every declaration of the source units.
pub struct AstIndex<'a> {
    pub contracts: FxHashMap<NodeId, &'a ContractDef>,
    pub functions: FxHashMap<NodeId, &'a FunctionDef>,
    pub modifiers: FxHashMap<NodeId, &'a ModifierDef>,
    pub state_vars: FxHashMap<NodeId, &'a StateVarDecl>,
}

impl<'a> AstIndex<'a> {
    pub fn build(units: &'a [SourceUnit]) -> Self {
        let mut index = Self {
            contracts: FxHashMap::default(),
            functions: FxHashMap::default(),
            modifiers: FxHashMap::default(),
            state_vars: FxHashMap::default(),
        };
        for unit in units {
            for contract in unit.contracts() {
                index.contracts.insert(contract.id, contract);
                for item in &contract.items {
                    match item {
                        ContractItem::Function(func) => {
                            index.functions.insert(func.id, func);
                        }
                        ContractItem::Modifier(def) => {
                            index.modifiers.insert(def.id, def);
                        }
                        ContractItem::StateVar(var) => {
                            index.state_vars.insert(var.id, var);
                        }
                        _ => {}
                    }
                }
            }
        }
        index
    }

    pub fn function(&self, id: NodeId) -> Option<&'a FunctionDef> {
        self.functions.get(&id).copied()
    }

    pub fn modifier(&self, id: NodeId) -> Option<&'a ModifierDef> {
        self.modifiers.get(&id).copied()
    }

    pub fn state_var(&self, id: NodeId) -> Option<&'a StateVarDecl> {
        self.state_vars.get(&id).copied()
    }

    pub fn contract(&self, id: NodeId) -> Option<&'a ContractDef> {
        self.contracts.get(&id).copied()
    }
}
