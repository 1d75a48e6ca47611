//! ABI and metadata extraction.
//!
//! From each contract: the externally visible callables (functions and
//! synthesised getters), the constructor, fallback/receive and events, as an
//! ordered list of descriptors whose exact ordering and spelling downstream
//! tooling depends on. The metadata document pairs the compiler version, the
//! source set (with content hashes), the compile settings and the ABI; its
//! Keccak-256 hash is appended to the runtime bytecode as a 34-byte trailer.

use serde::Serialize;
use vela_checker::{keccak256, Analysis};
use vela_parser::ast::{FunctionKind, NodeId, StateMutability};

/// Version string embedded into metadata and reported by the CLI.
pub const COMPILER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One parameter of an ABI entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbiParam {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed: Option<bool>,
}

/// One descriptor of the ABI array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbiEntry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Vec<AbiParam>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<AbiParam>>,
    #[serde(rename = "stateMutability", skip_serializing_if = "Option::is_none")]
    pub state_mutability: Option<String>,
}

fn mutability_name(mutability: StateMutability) -> &'static str {
    match mutability {
        StateMutability::Pure => "pure",
        StateMutability::View => "view",
        StateMutability::NonPayable => "nonpayable",
        StateMutability::Payable => "payable",
    }
}

fn abi_params(analysis: &Analysis, types: &[vela_types::TypeId], names: &[String]) -> Vec<AbiParam> {
    types
        .iter()
        .zip(names.iter().chain(std::iter::repeat(&String::new())))
        .map(|(ty, name)| AbiParam {
            name: name.clone(),
            type_name: analysis
                .provider
                .canonical_name(*ty)
                .unwrap_or_else(|| analysis.provider.display(*ty)),
            indexed: None,
        })
        .collect()
}

/// Build the ABI of one contract. Functions appear in interface order
/// (ascending selector), then the constructor, fallback/receive, then events
/// in declaration order.
pub fn contract_abi(analysis: &Analysis, contract: NodeId) -> Vec<AbiEntry> {
    let mut abi = Vec::new();
    let Some(info) = analysis.contracts.get(&contract) else {
        return abi;
    };

    for entry in &info.interface {
        let Some(sig) = analysis.functions.get(&entry.callable) else {
            continue;
        };
        abi.push(AbiEntry {
            kind: "function".to_string(),
            name: Some(sig.name.clone()),
            inputs: Some(abi_params(analysis, &sig.params, &sig.param_names)),
            outputs: Some(abi_params(analysis, &sig.returns, &sig.return_names)),
            state_mutability: Some(mutability_name(sig.mutability).to_string()),
        });
    }

    // constructor, fallback and receive of the most-derived contract
    for func in &info.functions {
        let Some(sig) = analysis.functions.get(func) else {
            continue;
        };
        match sig.kind {
            FunctionKind::Constructor => abi.push(AbiEntry {
                kind: "constructor".to_string(),
                name: None,
                inputs: Some(abi_params(analysis, &sig.params, &sig.param_names)),
                outputs: None,
                state_mutability: Some(mutability_name(sig.mutability).to_string()),
            }),
            FunctionKind::Fallback | FunctionKind::Receive => abi.push(AbiEntry {
                kind: if sig.kind == FunctionKind::Fallback {
                    "fallback".to_string()
                } else {
                    "receive".to_string()
                },
                name: None,
                inputs: None,
                outputs: None,
                state_mutability: Some(mutability_name(sig.mutability).to_string()),
            }),
            FunctionKind::Function => {}
        }
    }

    // events of the whole lattice, base-most last
    for base in &info.linearized {
        let Some(base_info) = analysis.contracts.get(base) else {
            continue;
        };
        for event in &base_info.events {
            let Some(sig) = analysis.events.get(event) else {
                continue;
            };
            let mut inputs = abi_params(analysis, &sig.params, &sig.param_names);
            for (input, indexed) in inputs.iter_mut().zip(&sig.indexed) {
                input.indexed = Some(*indexed);
            }
            abi.push(AbiEntry {
                kind: "event".to_string(),
                name: Some(sig.name.clone()),
                inputs: Some(inputs),
                outputs: None,
                state_mutability: None,
            });
        }
    }

    abi
}

/// Compile settings recorded in the metadata document.
#[derive(Debug, Clone, Serialize)]
pub struct MetadataSettings {
    pub optimizer: OptimizerSettings,
    #[serde(rename = "targetVersion")]
    pub target_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizerSettings {
    pub enabled: bool,
    pub runs: u64,
}

/// The metadata document of one contract.
#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    pub compiler: CompilerInfo,
    pub language: String,
    pub sources: serde_json::Map<String, serde_json::Value>,
    pub settings: MetadataSettings,
    pub output: MetadataOutput,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompilerInfo {
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetadataOutput {
    pub abi: Vec<AbiEntry>,
}

/// Assemble the metadata document for one contract.
///
/// `sources` is the full input set as (logical path, content) pairs; only
/// content hashes are embedded. Ordering follows the input set so two runs
/// on the same input serialise identically.
pub fn contract_metadata(
    analysis: &Analysis,
    contract: NodeId,
    sources: &[(String, String)],
    settings: MetadataSettings,
) -> Metadata {
    let mut source_map = serde_json::Map::new();
    for (path, content) in sources {
        let hash = keccak256(content.as_bytes());
        let mut entry = serde_json::Map::new();
        entry.insert(
            "keccak256".to_string(),
            serde_json::Value::String(format!("0x{}", hex::encode(hash))),
        );
        source_map.insert(path.clone(), serde_json::Value::Object(entry));
    }
    Metadata {
        compiler: CompilerInfo {
            version: COMPILER_VERSION.to_string(),
        },
        language: "Vela".to_string(),
        sources: source_map,
        settings,
        output: MetadataOutput {
            abi: contract_abi(analysis, contract),
        },
    }
}

/// The trailer appended to runtime bytecode: the document hash followed by
/// the big-endian 16-bit trailer length (34 = 32 hash bytes + 2).
pub fn metadata_trailer(metadata_json: &str) -> Vec<u8> {
    let hash = keccak256(metadata_json.as_bytes());
    let mut trailer = hash.to_vec();
    trailer.extend_from_slice(&34u16.to_be_bytes());
    trailer
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_checker::analyze;
    use vela_parser::Parser;

    fn run(source: &str) -> (Analysis, NodeId) {
        let unit = Parser::new("test.vela", source).unwrap().parse().unwrap();
        let (analysis, _, diagnostics) = analyze(&[unit]);
        assert!(!diagnostics.has_errors());
        let contract = analysis.contract_order[0];
        (analysis, contract)
    }

    #[test]
    fn test_function_abi_entry() {
        let (analysis, contract) =
            run("contract C { function transfer(address to, uint value) public returns (bool ok) { return true; } }");
        let abi = contract_abi(&analysis, contract);
        assert_eq!(abi.len(), 1);
        let entry = &abi[0];
        assert_eq!(entry.kind, "function");
        assert_eq!(entry.name.as_deref(), Some("transfer"));
        let inputs = entry.inputs.as_ref().unwrap();
        assert_eq!(inputs[0].name, "to");
        assert_eq!(inputs[0].type_name, "address");
        assert_eq!(inputs[1].type_name, "uint256");
        assert_eq!(entry.outputs.as_ref().unwrap()[0].name, "ok");
        assert_eq!(entry.state_mutability.as_deref(), Some("nonpayable"));
    }

    #[test]
    fn test_getter_in_abi() {
        let (analysis, contract) = run("contract C { uint public x; }");
        let abi = contract_abi(&analysis, contract);
        assert_eq!(abi.len(), 1);
        assert_eq!(abi[0].name.as_deref(), Some("x"));
        assert_eq!(abi[0].state_mutability.as_deref(), Some("view"));
        assert_eq!(abi[0].outputs.as_ref().unwrap()[0].type_name, "uint256");
    }

    #[test]
    fn test_event_abi_entry() {
        let (analysis, contract) = run(
            "contract C {
                event Transfer(address indexed from, address indexed to, uint value);
            }",
        );
        let abi = contract_abi(&analysis, contract);
        let event = abi.iter().find(|entry| entry.kind == "event").unwrap();
        let inputs = event.inputs.as_ref().unwrap();
        assert_eq!(inputs[0].indexed, Some(true));
        assert_eq!(inputs[2].indexed, Some(false));
        assert!(event.state_mutability.is_none());
    }

    #[test]
    fn test_abi_json_shape() {
        let (analysis, contract) =
            run("contract C { function f() public pure returns (uint) { return 42; } }");
        let abi = contract_abi(&analysis, contract);
        let json = serde_json::to_string(&abi).unwrap();
        assert!(json.contains(r#""type":"function""#));
        assert!(json.contains(r#""name":"f""#));
        assert!(json.contains(r#""stateMutability":"pure""#));
        // event-only fields are absent from functions
        assert!(!json.contains("indexed"));
    }

    #[test]
    fn test_metadata_is_deterministic() {
        let source = "contract C { uint public x; }";
        let build = || {
            let (analysis, contract) = run(source);
            let metadata = contract_metadata(
                &analysis,
                contract,
                &[("test.vela".to_string(), source.to_string())],
                MetadataSettings {
                    optimizer: OptimizerSettings {
                        enabled: true,
                        runs: 200,
                    },
                    target_version: "default".to_string(),
                },
            );
            serde_json::to_string(&metadata).unwrap()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_metadata_trailer_shape() {
        let trailer = metadata_trailer("{}");
        assert_eq!(trailer.len(), 34);
        assert_eq!(&trailer[32..], &[0, 34]);
    }

    #[test]
    fn test_metadata_embeds_source_hash() {
        let source = "contract C {}";
        let (analysis, contract) = run(source);
        let metadata = contract_metadata(
            &analysis,
            contract,
            &[("test.vela".to_string(), source.to_string())],
            MetadataSettings {
                optimizer: OptimizerSettings {
                    enabled: false,
                    runs: 200,
                },
                target_version: "default".to_string(),
            },
        );
        let json = serde_json::to_string_pretty(&metadata).unwrap();
        assert!(json.contains("keccak256"));
        assert!(json.contains("0x"));
        assert!(json.contains(COMPILER_VERSION));
    }
}
