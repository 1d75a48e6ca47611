//! Parser tests for contract-level constructs.

use vela_parser::ast::*;
use vela_parser::Parser;

fn parse(source: &str) -> SourceUnit {
    Parser::new("test.vela", source)
        .expect("lexing failed")
        .parse()
        .expect("parsing failed")
}

fn first_contract(unit: &SourceUnit) -> &ContractDef {
    unit.contracts().next().expect("no contract in unit")
}

#[test]
fn parses_empty_contract() {
    let unit = parse("contract C {}");
    let contract = first_contract(&unit);
    assert_eq!(contract.name.name, "C");
    assert_eq!(contract.kind, ContractKind::Contract);
    assert!(!contract.is_abstract);
    assert!(contract.items.is_empty());
}

#[test]
fn parses_abstract_contract_and_library() {
    let unit = parse("abstract contract A {} library L {} interface I {}");
    let contracts: Vec<_> = unit.contracts().collect();
    assert_eq!(contracts.len(), 3);
    assert!(contracts[0].is_abstract);
    assert_eq!(contracts[1].kind, ContractKind::Library);
    assert!(contracts[1].is_library());
    assert_eq!(contracts[2].kind, ContractKind::Interface);
}

#[test]
fn parses_inheritance_list() {
    let unit = parse("contract C is A, B(1, 2) {}");
    let contract = first_contract(&unit);
    assert_eq!(contract.bases.len(), 2);
    assert_eq!(contract.bases[0].name.dotted(), "A");
    assert!(contract.bases[0].args.is_none());
    assert_eq!(contract.bases[1].name.dotted(), "B");
    assert_eq!(contract.bases[1].args.as_ref().unwrap().len(), 2);
}

#[test]
fn parses_function_header() {
    let unit = parse(
        "contract C {
            function f(uint a, bool b) public pure virtual returns (uint) { return a; }
        }",
    );
    let contract = first_contract(&unit);
    let func = contract.functions().next().unwrap();
    assert_eq!(func.display_name(), "f");
    assert_eq!(func.params.len(), 2);
    assert_eq!(func.returns.len(), 1);
    assert_eq!(func.visibility, Visibility::Public);
    assert_eq!(func.mutability, StateMutability::Pure);
    assert!(func.is_virtual);
    assert!(func.is_implemented());
}

#[test]
fn parses_override_specifier() {
    let unit = parse(
        "contract C is A, B {
            function f() public override(A, B) {}
        }",
    );
    let func = first_contract(&unit).functions().next().unwrap();
    let overrides = func.overrides.as_ref().unwrap();
    assert_eq!(overrides.bases.len(), 2);
    assert_eq!(overrides.bases[0].dotted(), "A");
    assert_eq!(overrides.bases[1].dotted(), "B");
}

#[test]
fn parses_unimplemented_function() {
    let unit = parse("interface I { function f() external; }");
    let func = first_contract(&unit).functions().next().unwrap();
    assert!(!func.is_implemented());
    assert_eq!(func.visibility, Visibility::External);
}

#[test]
fn parses_constructor_fallback_receive() {
    let unit = parse(
        "contract C {
            constructor(uint x) {}
            fallback() external {}
            receive() external payable {}
        }",
    );
    let contract = first_contract(&unit);
    let kinds: Vec<_> = contract.functions().map(|f| f.kind).collect();
    assert_eq!(
        kinds,
        vec![
            FunctionKind::Constructor,
            FunctionKind::Fallback,
            FunctionKind::Receive
        ]
    );
    assert!(contract.constructor().is_some());
}

#[test]
fn parses_state_variables() {
    let unit = parse(
        "contract C {
            uint public x;
            mapping(address => uint) balances;
            uint constant FEE = 3;
            bytes32 private h;
        }",
    );
    let contract = first_contract(&unit);
    let vars: Vec<_> = contract.state_variables().collect();
    assert_eq!(vars.len(), 4);
    assert_eq!(vars[0].visibility, Visibility::Public);
    assert_eq!(vars[0].name.name, "x");
    assert!(matches!(vars[1].type_name, TypeName::Mapping { .. }));
    assert!(vars[2].is_constant);
    assert!(vars[2].initializer.is_some());
    assert_eq!(vars[3].visibility, Visibility::Private);
}

#[test]
fn parses_modifier_with_placeholder() {
    let unit = parse(
        "contract C {
            modifier onlyOwner() { require(msg.sender == owner); _; }
            address owner;
        }",
    );
    let contract = first_contract(&unit);
    let modifier = contract
        .items
        .iter()
        .find_map(|item| match item {
            ContractItem::Modifier(m) => Some(m),
            _ => None,
        })
        .unwrap();
    assert_eq!(modifier.name.name, "onlyOwner");
    assert!(matches!(
        modifier.body.statements[1],
        Statement::Placeholder(_)
    ));
}

#[test]
fn parses_modifier_invocations_on_function() {
    let unit = parse(
        "contract C {
            function f() public onlyOwner lock(1) {}
        }",
    );
    let func = first_contract(&unit).functions().next().unwrap();
    assert_eq!(func.invocations.len(), 2);
    assert_eq!(func.invocations[0].name.dotted(), "onlyOwner");
    assert!(func.invocations[0].args.is_none());
    assert_eq!(func.invocations[1].args.as_ref().unwrap().len(), 1);
}

#[test]
fn parses_struct_enum_event() {
    let unit = parse(
        "contract C {
            struct Point { uint x; uint y; }
            enum Color { Red, Green, Blue }
            event Transfer(address indexed from, address indexed to, uint value);
        }",
    );
    let contract = first_contract(&unit);
    let mut saw_struct = false;
    let mut saw_enum = false;
    let mut saw_event = false;
    for item in &contract.items {
        match item {
            ContractItem::Struct(def) => {
                assert_eq!(def.fields.len(), 2);
                saw_struct = true;
            }
            ContractItem::Enum(def) => {
                assert_eq!(def.variants.len(), 3);
                saw_enum = true;
            }
            ContractItem::Event(def) => {
                assert_eq!(def.params.len(), 3);
                assert!(def.params[0].indexed);
                assert!(!def.params[2].indexed);
                saw_event = true;
            }
            _ => {}
        }
    }
    assert!(saw_struct && saw_enum && saw_event);
}

#[test]
fn parses_using_for() {
    let unit = parse("contract C { using SafeMath for uint; using Lib for *; }");
    let contract = first_contract(&unit);
    let usings: Vec<_> = contract
        .items
        .iter()
        .filter_map(|item| match item {
            ContractItem::Using(u) => Some(u),
            _ => None,
        })
        .collect();
    assert_eq!(usings.len(), 2);
    assert!(usings[0].target.is_some());
    assert!(usings[1].target.is_none());
}

#[test]
fn parses_pragma_and_import() {
    let unit = parse("pragma vela ^0.4.0; import \"./lib.vela\"; import \"./a.vela\" as A; contract C {}");
    assert_eq!(unit.items.len(), 4);
    match &unit.items[0] {
        SourceItem::Pragma(p) => assert_eq!(p.text, "vela ^0.4.0"),
        _ => panic!("expected pragma"),
    }
    match &unit.items[1] {
        SourceItem::Import(i) => {
            assert_eq!(i.path, "./lib.vela");
            assert!(i.alias.is_none());
        }
        _ => panic!("expected import"),
    }
    match &unit.items[2] {
        SourceItem::Import(i) => assert_eq!(i.alias.as_ref().unwrap().name, "A"),
        _ => panic!("expected import"),
    }
}

#[test]
fn error_recovery_keeps_later_contracts() {
    let errors = Parser::new("t.vela", "contract A { uint } contract B {")
        .unwrap()
        .parse()
        .unwrap_err();
    // The error in A and the unterminated B are both reported.
    assert_eq!(errors.len(), 2);
}
