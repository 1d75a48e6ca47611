//! Round-trip: parsing a unit and re-serialising it reaches a fixed point.
//!
//! Printing normalises whitespace, so the contract is: parse(S) printed as
//! S′, then parse(S′) printed again, must reproduce S′ exactly.

use vela_parser::ast::printer::print_unit;
use vela_parser::Parser;

fn round_trip(source: &str) {
    let unit = Parser::new("test.vela", source)
        .expect("lexing failed")
        .parse()
        .expect("parsing failed");
    let printed = print_unit(&unit);

    let reparsed = Parser::new("test.vela", &printed)
        .unwrap_or_else(|e| panic!("printed output failed to lex: {:?}\n{}", e, printed))
        .parse()
        .unwrap_or_else(|e| panic!("printed output failed to parse: {:?}\n{}", e, printed));
    let printed_again = print_unit(&reparsed);

    assert_eq!(printed, printed_again, "printing did not reach a fixed point");
}

#[test]
fn round_trip_simple_contract() {
    round_trip("contract C { function f() public pure returns (uint) { return 42; } }");
}

#[test]
fn round_trip_inheritance_and_overrides() {
    round_trip(
        "contract A { function g() public virtual {} }
         contract B is A { function g() public override {} }
         contract D is A, B { function g() public override(A, B) {} }",
    );
}

#[test]
fn round_trip_state_and_types() {
    round_trip(
        "contract C {
            uint public total;
            mapping(address => uint[3]) balances;
            bytes32 constant SALT = 0xff;
            struct Point { uint x; uint y; }
            enum Color { Red, Green, Blue }
            event Moved(address indexed who, uint value);
        }",
    );
}

#[test]
fn round_trip_statements() {
    round_trip(
        "contract C {
            function f(uint n) public pure returns (uint r) {
                uint acc = 0;
                for (uint i = 0; i < n; i++) {
                    if (i % 2 == 0) { acc += i; } else { acc -= 1; }
                }
                while (acc > 100) { acc = acc / 2; }
                do { acc++; } while (acc < 3);
                return acc > 0 ? acc : 0;
            }
        }",
    );
}

#[test]
fn round_trip_modifiers_and_constructor() {
    round_trip(
        "contract C is Base(1) {
            address owner;
            modifier onlyOwner() virtual { require(msg.sender == owner); _; }
            constructor(uint start) { owner = msg.sender; }
            function touch() public onlyOwner {}
            receive() external payable {}
        }
        contract Base { constructor(uint x) {} }",
    );
}

#[test]
fn round_trip_imports_and_pragma() {
    round_trip("pragma vela ^0.4.0; import \"./lib.vela\"; import \"./a.vela\" as A; contract C {}");
}

#[test]
fn round_trip_assembly_verbatim() {
    round_trip(
        "contract C { function f() public { assembly { let x := add(1, 2) } } }",
    );
}
