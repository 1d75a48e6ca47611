//! Semantic analysis for the Vela compiler.
//!
//! Three sub-phases over the annotated AST: declaration registration
//! ([`binder`]), reference resolution with expression type checking
//! ([`checker`]) and override legality/ambiguity analysis ([`overrides`]).
//! Results accumulate in an [`Analysis`] keyed by node identity; findings go
//! to a [`Diagnostics`] sink.

pub mod analysis;
pub mod binder;
pub mod checker;
pub mod diagnostics;
pub mod linearize;
pub mod overrides;

pub use analysis::{
    Analysis, Builtin, CallTarget, Category, ContractInfo, EnumInfo, EventSig, ExprInfo,
    FunctionSig, InterfaceFunction, ModifierSig, StateVarInfo, StructInfo, Target,
};
pub use binder::{Binder, Bindings};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};

use sha3::{Digest, Keccak256};
use vela_parser::ast::SourceUnit;

/// First four bytes of the Keccak-256 hash of a canonical signature; the
/// externally callable entry key.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Full Keccak-256 digest, used for event topics and metadata hashes.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let hash = Keccak256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hash);
    out
}

/// Run the complete semantic analysis over a set of parsed source units.
///
/// The units' order defines the file indices used in diagnostics.
pub fn analyze(units: &[SourceUnit]) -> (Analysis, Bindings, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let (mut analysis, bindings) = Binder::new(units, &mut diagnostics).bind();
    overrides::check_overrides(&mut analysis, &bindings, &mut diagnostics);
    checker::check(units, &mut analysis, &bindings, &mut diagnostics);
    (analysis, bindings, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_known_vectors() {
        // keccak256("transfer(address,uint256)")[0..4]
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
        // the canonical ABI example
        assert_eq!(selector("baz(uint32,bool)"), [0xcd, 0xcd, 0x77, 0xc0]);
    }
}
