//! End-to-end pipeline tests: source text to bytecode, ABI and metadata.

use vela_compiler::{Compiler, RevertStrings, Settings};

fn compile(source: &str) -> (vela_compiler::CompilerOutput, vela_checker::Diagnostics) {
    Compiler::new(Settings::default())
        .compile(&[("test.vela".to_string(), source.to_string())])
}

fn compile_ok(source: &str) -> vela_compiler::CompiledContract {
    let (output, diagnostics) = compile(source);
    assert!(
        !diagnostics.has_errors(),
        "unexpected errors: {:?}",
        diagnostics.iter().map(|d| (d.code, d.message.clone())).collect::<Vec<_>>()
    );
    output
        .contracts
        .into_iter()
        .next()
        .expect("one contract compiled")
}

/// Find a byte subsequence in the bytecode.
fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}

#[test]
fn minimal_function_compiles() {
    let contract = compile_ok(
        "contract C { function f() public pure returns (uint) { return 42; } }",
    );
    let runtime = contract.runtime_bytecode.expect("runtime bytecode");
    let bytecode = contract.bytecode.expect("deployment bytecode");
    assert!(!runtime.bytes.is_empty());
    assert!(!bytecode.bytes.is_empty());

    // the body returns 0x2a: a PUSH1 0x2a must exist in the runtime code
    assert!(contains(&runtime.bytes, &[0x60, 0x2a]));

    // the dispatcher matches the selector of f()
    let selector = vela_checker::selector("f()");
    assert!(contains(&runtime.bytes, &selector));

    // the ABI lists exactly one function named f
    let abi = contract.abi.as_array().unwrap();
    assert_eq!(abi.len(), 1);
    assert_eq!(abi[0]["name"], "f");
    assert_eq!(abi[0]["outputs"][0]["type"], "uint256");
}

#[test]
fn runtime_ends_with_metadata_trailer() {
    let contract = compile_ok("contract C { function f() public pure returns (uint) { return 1; } }");
    let runtime = contract.runtime_bytecode.unwrap();
    let bytes = &runtime.bytes;
    assert!(bytes.len() > 34);
    // last two bytes encode the 34-byte trailer length, big-endian
    assert_eq!(&bytes[bytes.len() - 2..], &[0x00, 0x22]);
    // and the 32 bytes before them hash the metadata document
    let expected = vela_checker::keccak256(contract.metadata.as_bytes());
    assert_eq!(&bytes[bytes.len() - 34..bytes.len() - 2], &expected);
}

#[test]
fn deployment_embeds_runtime() {
    let contract = compile_ok("contract C { function f() public pure returns (uint) { return 7; } }");
    let deploy = contract.bytecode.unwrap();
    let runtime = contract.runtime_bytecode.unwrap();
    assert!(contains(&deploy.bytes, &runtime.bytes));
}

#[test]
fn compilation_is_deterministic() {
    let source = "contract C {
        uint public total;
        event Add(address indexed who, uint value);
        function add(uint value) public returns (uint) {
            total = total + value;
            emit Add(msg.sender, value);
            return total;
        }
    }";
    let first = compile_ok(source);
    let second = compile_ok(source);
    assert_eq!(
        first.bytecode.unwrap().bytes,
        second.bytecode.unwrap().bytes
    );
    assert_eq!(first.metadata, second.metadata);
    assert_eq!(first.abi, second.abi);
}

#[test]
fn stack_too_deep_is_reported_with_span() {
    let source = "contract C {
        function f() public pure returns (uint) {
            uint v01 = 1; uint v02 = 2; uint v03 = 3; uint v04 = 4;
            uint v05 = 5; uint v06 = 6; uint v07 = 7; uint v08 = 8;
            uint v09 = 9; uint v10 = 10; uint v11 = 11; uint v12 = 12;
            uint v13 = 13; uint v14 = 14; uint v15 = 15; uint v16 = 16;
            uint v17 = 17;
            return v01;
        }
    }";
    let (_, diagnostics) = compile(source);
    let too_deep: Vec<_> = diagnostics.iter().filter(|d| d.code == "E4001").collect();
    assert!(!too_deep.is_empty());
    // the span points at the unreachable variable reference
    assert!(too_deep[0].primary.span.len() > 0);
}

#[test]
fn moderate_local_count_is_fine() {
    let source = "contract C {
        function f() public pure returns (uint) {
            uint v01 = 1; uint v02 = 2; uint v03 = 3; uint v04 = 4;
            uint v05 = 5; uint v06 = 6; uint v07 = 7; uint v08 = 8;
            uint v09 = 9; uint v10 = 10; uint v11 = 11; uint v12 = 12;
            uint v13 = 13; uint v14 = 14;
            return v01;
        }
    }";
    let (_, diagnostics) = compile(source);
    assert!(!diagnostics.has_errors());
}

#[test]
fn getter_dispatch_for_public_variable() {
    let contract = compile_ok("contract C { uint public x; }");
    let runtime = contract.runtime_bytecode.unwrap();
    let selector = vela_checker::selector("x()");
    assert!(contains(&runtime.bytes, &selector));
}

#[test]
fn internal_calls_drain_the_queue() {
    let contract = compile_ok(
        "contract C {
            function double(uint x) internal pure returns (uint) { return x * 2; }
            function quadruple(uint x) internal pure returns (uint) { return double(double(x)); }
            function f(uint x) public pure returns (uint) { return quadruple(x); }
        }",
    );
    // all three bodies end up in the runtime; a PUSH1 2 MUL pair appears
    let runtime = contract.runtime_bytecode.unwrap();
    assert!(contains(&runtime.bytes, &[0x60, 0x02, 0x02]));
}

#[test]
fn using_for_calls_compile_to_library_calls() {
    let (output, diagnostics) = compile(
        "library Math {
            function double(uint x) internal pure returns (uint) { return x * 2; }
        }
        contract C {
            using Math for uint;
            function f(uint v) public pure returns (uint) { return v.double(); }
        }",
    );
    assert!(
        !diagnostics.has_errors(),
        "{:?}",
        diagnostics.iter().map(|d| (d.code, d.message.clone())).collect::<Vec<_>>()
    );
    let c = output
        .contracts
        .into_iter()
        .find(|contract| contract.name == "C")
        .unwrap();
    // the library body is drained into C's runtime: x * 2 appears
    let runtime = c.runtime_bytecode.unwrap();
    assert!(contains(&runtime.bytes, &[0x60, 0x02, 0x02]));
}

#[test]
fn virtual_call_targets_most_derived() {
    let (output, diagnostics) = compile(
        "contract A {
            function g() public virtual returns (uint) { return 1; }
            function f() public returns (uint) { return g(); }
        }
        contract B is A {
            function g() public override returns (uint) { return 77; }
        }",
    );
    assert!(!diagnostics.has_errors());
    // B's runtime contains the overridden constant, reachable through f()
    let b = output
        .contracts
        .into_iter()
        .find(|c| c.name == "B")
        .unwrap();
    let runtime = b.runtime_bytecode.unwrap();
    assert!(contains(&runtime.bytes, &[0x60, 77]));
}

#[test]
fn modifiers_are_inlined() {
    let contract = compile_ok(
        "contract C {
            address owner;
            modifier onlyOwner() { require(msg.sender == owner); _; }
            function set(address next) public onlyOwner { owner = next; }
        }",
    );
    let runtime = contract.runtime_bytecode.unwrap();
    // CALLER from the inlined require(msg.sender == owner)
    assert!(contains(&runtime.bytes, &[0x33]));
}

#[test]
fn constructor_and_initializers_in_deploy_code() {
    let contract = compile_ok(
        "contract C {
            uint x = 5;
            uint y;
            constructor(uint start) { y = start; }
            function get() public view returns (uint) { return x + y; }
        }",
    );
    let deploy = contract.bytecode.unwrap();
    let runtime = contract.runtime_bytecode.unwrap();
    // the initializer for x lives in the constructor area, not the runtime
    let runtime_offset = deploy
        .bytes
        .windows(runtime.bytes.len())
        .position(|window| window == runtime.bytes.as_slice())
        .expect("runtime embedded");
    let constructor_area = &deploy.bytes[..runtime_offset];
    assert!(contains(constructor_area, &[0x60, 0x05]));
}

#[test]
fn events_emit_logs() {
    let contract = compile_ok(
        "contract C {
            event Transfer(address indexed from, address indexed to, uint value);
            function f(address to) public {
                emit Transfer(msg.sender, to, 1);
            }
        }",
    );
    let runtime = contract.runtime_bytecode.unwrap();
    // three topics: the signature hash and two indexed parameters
    assert!(contains(&runtime.bytes, &[vela_asm::Opcode::log(3) as u8]));
    let topic0 = vela_checker::keccak256(b"Transfer(address,address,uint256)");
    assert!(contains(&runtime.bytes, &topic0));
}

#[test]
fn abstract_contract_gets_no_bytecode() {
    let (output, diagnostics) = compile(
        "abstract contract A { function f() public virtual returns (uint); }",
    );
    assert!(!diagnostics.has_errors());
    let a = &output.contracts[0];
    assert!(a.is_abstract);
    assert!(a.bytecode.is_none());
    // the ABI still describes the interface
    assert_eq!(a.abi.as_array().unwrap().len(), 1);
}

#[test]
fn optimized_build_still_works() {
    let settings = Settings {
        optimize: true,
        optimize_runs: 200,
        ..Settings::default()
    };
    let (output, diagnostics) = Compiler::new(settings).compile(&[(
        "test.vela".to_string(),
        "contract C { function f() public pure returns (uint) { return 1 + 2; } }".to_string(),
    )]);
    assert!(!diagnostics.has_errors());
    let contract = &output.contracts[0];
    let runtime = contract.runtime_bytecode.as_ref().unwrap();
    // 1 + 2 folds: PUSH1 3 appears, the addition is gone from the body
    assert!(contains(&runtime.bytes, &[0x60, 0x03]));
}

#[test]
fn optimization_does_not_change_abi_or_interface() {
    let source =
        "contract C { function f(uint x) public pure returns (uint) { return x + 0; } }";
    let plain = compile_ok(source);
    let (optimized_output, diagnostics) = Compiler::new(Settings {
        optimize: true,
        ..Settings::default()
    })
    .compile(&[("test.vela".to_string(), source.to_string())]);
    assert!(!diagnostics.has_errors());
    assert_eq!(plain.abi, optimized_output.contracts[0].abi);
}

#[test]
fn revert_strings_can_be_stripped() {
    let source = "contract C {
        function f(uint x) public pure {
            require(x > 0, \"value must be positive\");
        }
    }";
    let with_strings = compile_ok(source);
    let (stripped_output, diagnostics) = Compiler::new(Settings {
        revert_strings: RevertStrings::Strip,
        ..Settings::default()
    })
    .compile(&[("test.vela".to_string(), source.to_string())]);
    assert!(!diagnostics.has_errors());
    let stripped = &stripped_output.contracts[0];
    let verbose_len = with_strings.runtime_bytecode.unwrap().bytes.len();
    let stripped_len = stripped.runtime_bytecode.as_ref().unwrap().bytes.len();
    assert!(stripped_len < verbose_len);
}

#[test]
fn inline_assembly_is_rejected_at_codegen() {
    let (_, diagnostics) = compile(
        "contract C { function f() public { assembly { let x := 1 } } }",
    );
    assert!(diagnostics.iter().any(|d| d.code == "E4002"));
}

#[test]
fn type_errors_suppress_bytecode() {
    let (output, diagnostics) = compile(
        "contract C { function f() public pure returns (uint) { return true; } }",
    );
    assert!(diagnostics.has_errors());
    assert!(output.contracts.iter().all(|c| c.bytecode.is_none()));
}

#[test]
fn multiple_sources_compile_together() {
    let sources = vec![
        (
            "a.vela".to_string(),
            "contract A { function f() public pure returns (uint) { return 1; } }".to_string(),
        ),
        (
            "b.vela".to_string(),
            "import \"./a.vela\"; contract B is A {}".to_string(),
        ),
    ];
    let (output, diagnostics) = Compiler::new(Settings::default()).compile(&sources);
    assert!(
        !diagnostics.has_errors(),
        "{:?}",
        diagnostics.iter().map(|d| d.message.clone()).collect::<Vec<_>>()
    );
    assert_eq!(output.contracts.len(), 2);
    // B inherits f() into its own dispatcher
    let b = &output.contracts[1];
    let runtime = b.runtime_bytecode.as_ref().unwrap();
    assert!(contains(&runtime.bytes, &vela_checker::selector("f()")));
}
