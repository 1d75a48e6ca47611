//! Name resolution, type checking and interface computation tests.

use vela_checker::{analyze, selector, Analysis, Diagnostics};
use vela_parser::Parser;

fn run(source: &str) -> (Analysis, Diagnostics) {
    let unit = Parser::new("test.vela", source)
        .expect("lexing failed")
        .parse()
        .expect("parsing failed");
    let (analysis, _, diagnostics) = analyze(&[unit]);
    (analysis, diagnostics)
}

fn codes(diagnostics: &Diagnostics) -> Vec<&'static str> {
    diagnostics.iter().map(|d| d.code).collect()
}

fn contract<'a>(analysis: &'a Analysis, name: &str) -> &'a vela_checker::ContractInfo {
    analysis
        .contracts
        .values()
        .find(|info| info.name == name)
        .expect("contract exists")
}

#[test]
fn simple_contract_checks_clean() {
    let (_, diagnostics) = run(
        "contract C {
            uint total;
            function add(uint value) public returns (uint) {
                total = total + value;
                return total;
            }
        }",
    );
    assert!(!diagnostics.has_errors(), "{:?}", codes(&diagnostics));
}

#[test]
fn interface_has_selector_for_each_function() {
    let (analysis, diagnostics) = run(
        "contract C { function f() public pure returns (uint) { return 42; } }",
    );
    assert!(!diagnostics.has_errors());
    let info = contract(&analysis, "C");
    assert_eq!(info.interface.len(), 1);
    assert_eq!(info.interface[0].signature, "f()");
    assert_eq!(info.interface[0].selector, selector("f()"));
}

#[test]
fn public_state_variable_materialises_getter() {
    let (analysis, diagnostics) = run("contract C { uint public x; }");
    assert!(!diagnostics.has_errors());
    let info = contract(&analysis, "C");
    assert_eq!(info.interface.len(), 1);
    assert_eq!(info.interface[0].signature, "x()");
    assert_eq!(info.interface[0].selector, selector("x()"));

    let getter = &analysis.functions[&info.interface[0].callable];
    assert!(getter.is_getter);
    assert_eq!(getter.params.len(), 0);
    assert_eq!(analysis.provider.canonical_name(getter.returns[0]).unwrap(), "uint256");
}

#[test]
fn mapping_getter_takes_key_parameters() {
    let (analysis, diagnostics) =
        run("contract C { mapping(address => mapping(uint => bool)) public flags; }");
    assert!(!diagnostics.has_errors());
    let info = contract(&analysis, "C");
    assert_eq!(info.interface[0].signature, "flags(address,uint256)");
    let getter = &analysis.functions[&info.interface[0].callable];
    assert_eq!(getter.params.len(), 2);
}

#[test]
fn interface_selectors_have_no_duplicates() {
    let (analysis, diagnostics) = run(
        "contract C {
            uint public a;
            function f(uint x) public {}
            function f(bool b) public {}
        }",
    );
    assert!(!diagnostics.has_errors(), "{:?}", codes(&diagnostics));
    let info = contract(&analysis, "C");
    assert_eq!(info.interface.len(), 3);
    let mut selectors: Vec<[u8; 4]> = info.interface.iter().map(|e| e.selector).collect();
    selectors.dedup();
    assert_eq!(selectors.len(), 3);
    // ascending selector order
    let mut sorted = selectors.clone();
    sorted.sort();
    assert_eq!(selectors, sorted);
}

#[test]
fn undeclared_identifier_is_declaration_error() {
    let (_, diagnostics) = run(
        "contract C { function f() public returns (uint) { return missing; } }",
    );
    assert!(codes(&diagnostics).contains(&"E2002"));
}

#[test]
fn sentinel_type_suppresses_cascades() {
    // one unknown identifier must produce exactly one error, not a chain
    let (_, diagnostics) = run(
        "contract C {
            function f() public returns (uint) {
                uint x = missing + 1;
                return x + 2;
            }
        }",
    );
    assert_eq!(diagnostics.error_count(), 1, "{:?}", codes(&diagnostics));
}

#[test]
fn duplicate_member_reported_with_both_spans() {
    let (_, diagnostics) = run("contract C { uint x; bool x; }");
    let duplicate = diagnostics
        .iter()
        .find(|d| d.code == "E2001")
        .expect("duplicate reported");
    assert_eq!(duplicate.secondary.len(), 1);
}

#[test]
fn function_overloading_is_allowed() {
    let (_, diagnostics) = run(
        "contract C {
            function f(uint x) public pure returns (uint) { return x; }
            function f(bool b) public pure returns (uint) { return 1; }
            function g() public pure returns (uint) { return f(2); }
        }",
    );
    assert!(!diagnostics.has_errors(), "{:?}", codes(&diagnostics));
}

#[test]
fn ambiguous_overload_is_type_error() {
    // literal 1 converts to both uint8 and uint16
    let (_, diagnostics) = run(
        "contract C {
            function f(uint8 x) public pure {}
            function f(uint16 x) public pure {}
            function g() public pure { f(1); }
        }",
    );
    assert!(codes(&diagnostics).contains(&"E3027"));
}

#[test]
fn literal_width_check() {
    let (_, diagnostics) = run(
        "contract C { function f() public pure returns (uint8) { return 256; } }",
    );
    assert!(codes(&diagnostics).contains(&"E3001"));
}

#[test]
fn literal_folding_at_check_time() {
    let (_, diagnostics) = run(
        "contract C { function f() public pure returns (uint8) { return 2 ** 7; } }",
    );
    assert!(!diagnostics.has_errors(), "{:?}", codes(&diagnostics));
}

#[test]
fn constant_division_by_zero_is_error() {
    let (_, diagnostics) = run(
        "contract C { function f() public pure returns (uint) { return 1 / 0; } }",
    );
    assert!(codes(&diagnostics).contains(&"E3022"));
}

#[test]
fn assignment_needs_lvalue() {
    let (_, diagnostics) = run(
        "contract C { function f() public pure { 1 = 2; } }",
    );
    assert!(codes(&diagnostics).contains(&"E3024"));
}

#[test]
fn constant_state_variable_not_assignable() {
    let (_, diagnostics) = run(
        "contract C {
            uint constant FEE = 3;
            function f() public { FEE = 4; }
        }",
    );
    assert!(codes(&diagnostics).contains(&"E3025"));
}

#[test]
fn pure_function_may_not_read_state() {
    let (_, diagnostics) = run(
        "contract C {
            uint x;
            function f() public pure returns (uint) { return x; }
        }",
    );
    assert!(codes(&diagnostics).contains(&"E3030"));
}

#[test]
fn view_function_may_not_write_state() {
    let (_, diagnostics) = run(
        "contract C {
            uint x;
            function f() public view { x = 1; }
        }",
    );
    assert!(codes(&diagnostics).contains(&"E3030"));
}

#[test]
fn emit_resolves_event() {
    let (_, diagnostics) = run(
        "contract C {
            event Transfer(address indexed from, address indexed to, uint value);
            function f(address a) public {
                emit Transfer(a, a, 1);
            }
        }",
    );
    assert!(!diagnostics.has_errors(), "{:?}", codes(&diagnostics));
}

#[test]
fn storage_layout_follows_linearization() {
    let (analysis, diagnostics) = run(
        "contract A { uint a; }
         contract B is A { uint b; }",
    );
    assert!(!diagnostics.has_errors());
    let b = contract(&analysis, "B");
    let a_var = analysis
        .state_vars
        .values()
        .find(|v| v.name == "a")
        .unwrap();
    let b_var = analysis
        .state_vars
        .values()
        .find(|v| v.name == "b")
        .unwrap();
    // base-most first
    assert_eq!(b.layout[&a_var.id], 0);
    assert_eq!(b.layout[&b_var.id], 1);
}

#[test]
fn struct_and_enum_members_resolve() {
    let (_, diagnostics) = run(
        "contract C {
            struct Point { uint x; uint y; }
            enum Color { Red, Green }
            function f() public pure returns (uint) {
                Point memory p = Point(1, 2);
                Color c = Color.Green;
                if (c == Color.Green) {
                    return p.x;
                }
                return p.y;
            }
        }",
    );
    assert!(!diagnostics.has_errors(), "{:?}", codes(&diagnostics));
}

#[test]
fn magic_globals_resolve() {
    let (_, diagnostics) = run(
        "contract C {
            address owner;
            function f() public {
                owner = msg.sender;
            }
            function g() public view returns (uint) {
                return block.timestamp + block.number;
            }
        }",
    );
    assert!(!diagnostics.has_errors(), "{:?}", codes(&diagnostics));
}

#[test]
fn recursive_struct_is_error() {
    let (_, diagnostics) = run(
        "contract C { struct Node { uint value; Node next; } }",
    );
    assert!(codes(&diagnostics).contains(&"E3006"));
}

#[test]
fn using_for_attaches_library_functions() {
    let (analysis, diagnostics) = run(
        "library Math {
            function double(uint x) internal pure returns (uint) { return x * 2; }
        }
        contract C {
            using Math for uint;
            function f(uint v) public pure returns (uint) { return v.double(); }
        }",
    );
    assert!(!diagnostics.has_errors(), "{:?}", codes(&diagnostics));
    // the call resolved to a bound library function
    assert!(analysis
        .call_targets
        .values()
        .any(|target| matches!(target, vela_checker::CallTarget::Bound { .. })));
}

#[test]
fn using_for_wildcard_binds_every_type() {
    let (_, diagnostics) = run(
        "library Util {
            function ok(bool b) internal pure returns (bool) { return b; }
            function bump(uint x) internal pure returns (uint) { return x + 1; }
        }
        contract C {
            using Util for *;
            function f(uint v, bool b) public pure returns (uint) {
                if (b.ok()) {
                    return v.bump();
                }
                return v;
            }
        }",
    );
    assert!(!diagnostics.has_errors(), "{:?}", codes(&diagnostics));
}

#[test]
fn using_for_is_inherited() {
    let (_, diagnostics) = run(
        "library Math {
            function double(uint x) internal pure returns (uint) { return x * 2; }
        }
        contract Base { using Math for uint; }
        contract C is Base {
            function f(uint v) public pure returns (uint) { return v.double(); }
        }",
    );
    assert!(!diagnostics.has_errors(), "{:?}", codes(&diagnostics));
}

#[test]
fn using_for_respects_bound_type() {
    // Math is bound to uint only; a bool receiver stays unresolved
    let (_, diagnostics) = run(
        "library Math {
            function double(uint x) internal pure returns (uint) { return x * 2; }
        }
        contract C {
            using Math for uint;
            function f(bool b) public pure returns (bool) { return b.double(); }
        }",
    );
    assert!(codes(&diagnostics).contains(&"E3033"));
}

#[test]
fn member_call_without_using_is_error() {
    let (_, diagnostics) = run(
        "contract C {
            function f(uint v) public pure returns (uint) { return v.double(); }
        }",
    );
    assert!(codes(&diagnostics).contains(&"E3033"));
}

#[test]
fn using_requires_a_library() {
    let (_, diagnostics) = run(
        "contract NotALibrary {}
         contract C { using NotALibrary for uint; }",
    );
    assert!(codes(&diagnostics).contains(&"E3037"));
}

#[test]
fn virtual_dispatch_resolution() {
    let (analysis, diagnostics) = run(
        "contract A { function f() public virtual returns (uint) { return 1; } }
         contract B is A { function f() public override returns (uint) { return 2; } }",
    );
    assert!(!diagnostics.has_errors());
    let b = contract(&analysis, "B");
    let resolved = analysis.resolve_virtual(b.id, "f", &[]).unwrap();
    let sig = &analysis.functions[&resolved];
    assert_eq!(analysis.contracts[&sig.contract].name, "B");

    // super resolution starts one element after the given contract
    let via_super = analysis.resolve_super(b.id, b.id, "f", &[]).unwrap();
    let super_sig = &analysis.functions[&via_super];
    assert_eq!(analysis.contracts[&super_sig.contract].name, "A");
}
