//! Override legality and ambiguity tests across the contract lattice.

use vela_checker::{analyze, Analysis, Diagnostics};
use vela_parser::Parser;

fn run(source: &str) -> (Analysis, Diagnostics) {
    let unit = Parser::new("test.vela", source)
        .expect("lexing failed")
        .parse()
        .expect("parsing failed");
    let (analysis, _, diagnostics) = analyze(&[unit]);
    (analysis, diagnostics)
}

fn error_codes(diagnostics: &Diagnostics) -> Vec<&'static str> {
    diagnostics.iter().map(|d| d.code).collect()
}

#[test]
fn virtual_override_succeeds() {
    let (analysis, diagnostics) = run(
        "contract A { function g() public virtual {} }
         contract B is A { function g() public override {} }",
    );
    assert!(!diagnostics.has_errors(), "{:?}", error_codes(&diagnostics));

    // the override annotation of B.g lists exactly A.g
    let b_g = analysis
        .functions
        .values()
        .find(|sig| {
            sig.name == "g"
                && analysis.contracts[&sig.contract].name == "B"
        })
        .expect("B.g exists");
    let edges = &analysis.overrides[&b_g.id];
    assert_eq!(edges.len(), 1);
    let base = &analysis.functions[&edges[0]];
    assert_eq!(analysis.contracts[&base.contract].name, "A");
}

#[test]
fn non_virtual_override_fails() {
    let (_, diagnostics) = run(
        "contract A { function g() public {} }
         contract B is A { function g() public override {} }",
    );
    assert!(error_codes(&diagnostics).contains(&"E3008"));
}

#[test]
fn missing_override_keyword_fails() {
    let (_, diagnostics) = run(
        "contract A { function g() public virtual {} }
         contract B is A { function g() public {} }",
    );
    assert!(error_codes(&diagnostics).contains(&"E3009"));
}

#[test]
fn disjoint_paths_require_explicit_override() {
    let (_, diagnostics) = run(
        "contract A { function g() public virtual {} }
         contract B { function g() public virtual {} }
         contract C is A, B {}",
    );
    let ambiguous: Vec<_> = diagnostics.iter().filter(|d| d.code == "E3015").collect();
    assert_eq!(ambiguous.len(), 1);
    // the diagnostic names both defining contracts
    assert!(ambiguous[0].message.contains('A'));
    assert!(ambiguous[0].message.contains('B'));
}

#[test]
fn single_inherited_function_needs_no_override() {
    let (_, diagnostics) = run(
        "contract A { function g() public virtual {} }
         contract B is A {}",
    );
    assert!(!diagnostics.has_errors(), "{:?}", error_codes(&diagnostics));
}

#[test]
fn linear_chain_needs_no_override_in_leaf() {
    // B overrides A; C inherits through both paths but B's definition is a
    // cut vertex away from being ambiguous.
    let (_, diagnostics) = run(
        "contract A { function f() public virtual {} }
         contract B is A { function f() public virtual override {} }
         contract C is A, B {}",
    );
    assert!(!diagnostics.has_errors(), "{:?}", error_codes(&diagnostics));
}

#[test]
fn diamond_requires_override_naming_both() {
    let (_, diagnostics) = run(
        "contract Base { function f() public virtual {} }
         contract M1 is Base { function f() public virtual override {} }
         contract M2 is Base { function f() public virtual override {} }
         contract D is M1, M2 {}",
    );
    assert!(error_codes(&diagnostics).contains(&"E3015"));
}

#[test]
fn diamond_with_explicit_override_succeeds() {
    let (_, diagnostics) = run(
        "contract Base { function f() public virtual {} }
         contract M1 is Base { function f() public virtual override {} }
         contract M2 is Base { function f() public virtual override {} }
         contract D is M1, M2 { function f() public override(M1, M2) {} }",
    );
    assert!(!diagnostics.has_errors(), "{:?}", error_codes(&diagnostics));
}

#[test]
fn override_list_missing_base_fails() {
    let (_, diagnostics) = run(
        "contract A { function f() public virtual {} }
         contract B { function f() public virtual {} }
         contract C is A, B { function f() public override(A) {} }",
    );
    assert!(error_codes(&diagnostics).contains(&"E3010"));
}

#[test]
fn override_list_surplus_entry_fails() {
    let (_, diagnostics) = run(
        "contract A { function f() public virtual {} }
         contract X {}
         contract C is A, X { function f() public override(A, X) {} }",
    );
    assert!(error_codes(&diagnostics).contains(&"E3010"));
}

#[test]
fn visibility_may_relax_external_to_public() {
    let (_, diagnostics) = run(
        "contract A { function f() external virtual {} }
         contract B is A { function f() public override {} }",
    );
    assert!(!diagnostics.has_errors(), "{:?}", error_codes(&diagnostics));
}

#[test]
fn other_visibility_change_fails() {
    let (_, diagnostics) = run(
        "contract A { function f() public virtual {} }
         contract B is A { function f() external override {} }",
    );
    assert!(error_codes(&diagnostics).contains(&"E3011"));
}

#[test]
fn mutability_may_narrow() {
    let (_, diagnostics) = run(
        "contract A { function f() public view virtual returns (uint) { return 1; } }
         contract B is A { function f() public pure override returns (uint) { return 2; } }",
    );
    assert!(!diagnostics.has_errors(), "{:?}", error_codes(&diagnostics));
}

#[test]
fn mutability_may_not_relax() {
    let (_, diagnostics) = run(
        "contract A { uint x; function f() public pure virtual returns (uint) { return 1; } }
         contract B is A { function f() public view override returns (uint) { return x; } }",
    );
    assert!(error_codes(&diagnostics).contains(&"E3012"));
}

#[test]
fn modifier_override_must_match_exactly() {
    let (_, diagnostics) = run(
        "contract A { modifier m(uint x) virtual { _; } }
         contract B is A { modifier m(bool y) override { _; } }",
    );
    assert!(error_codes(&diagnostics).contains(&"E3016"));
}

#[test]
fn function_cannot_override_modifier() {
    let (_, diagnostics) = run(
        "contract A { modifier m() virtual { _; } }
         contract B is A { function m() public {} }",
    );
    assert!(error_codes(&diagnostics).contains(&"E3013"));
}

#[test]
fn overloads_are_distinct_signatures() {
    // same name, different parameters: no override relation at all
    let (_, diagnostics) = run(
        "contract A { function f(uint x) public virtual {} }
         contract B is A { function f(bool y) public {} }",
    );
    assert!(!diagnostics.has_errors(), "{:?}", error_codes(&diagnostics));
}

#[test]
fn linearization_conflict_is_reported() {
    let (_, diagnostics) = run(
        "contract A {}
         contract B {}
         contract X is A, B {}
         contract Y is B, A {}
         contract Z is X, Y {}",
    );
    assert!(error_codes(&diagnostics).contains(&"E3003"));
}

#[test]
fn linearized_order_most_derived_first() {
    let (analysis, diagnostics) = run(
        "contract Base {}
         contract M1 is Base {}
         contract M2 is Base {}
         contract D is M1, M2 {}",
    );
    assert!(!diagnostics.has_errors());
    let d = analysis
        .contracts
        .values()
        .find(|info| info.name == "D")
        .unwrap();
    let names: Vec<&str> = d
        .linearized
        .iter()
        .map(|id| analysis.contracts[id].name.as_str())
        .collect();
    assert_eq!(names, vec!["D", "M2", "M1", "Base"]);
}
