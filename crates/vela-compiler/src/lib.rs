//! Vela compiler driver.
//!
//! The end-to-end pipeline over an already-loaded source set: parse,
//! semantic analysis, code generation, low-level optimisation, assembly and
//! artefact extraction. The core never touches the filesystem; import
//! resolution happens in the host before sources reach [`Compiler`].
//!
//! Determinism contract: two runs over the same source set and settings
//! produce byte-identical bytecode, ABI, metadata and diagnostics order.

pub mod contract;
pub mod emit;
pub mod error;
pub mod index;
pub mod queue;
pub mod utilities;

pub use contract::CodegenOptions;
pub use error::{CompileError, CompileResult};

use index::AstIndex;
use vela_abi::{contract_abi, contract_metadata, metadata_trailer, MetadataSettings, OptimizerSettings};
use vela_asm::{optimize_constants, Assembly, LinkedBytecode, Peephole};
use vela_checker::{analyze, Diagnostic, Diagnostics};
use vela_parser::ast::{ContractKind, SourceUnit};
use vela_parser::{Parser, Span};

/// Revert-string verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevertStrings {
    /// Keep reason strings in the emitted code
    #[default]
    Default,
    /// Replace every reason with an empty revert
    Strip,
}

/// Compile settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub optimize: bool,
    pub optimize_runs: u64,
    /// Target VM version selector; recorded in metadata
    pub target_version: String,
    pub revert_strings: RevertStrings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            optimize: false,
            optimize_runs: 200,
            target_version: "default".to_string(),
            revert_strings: RevertStrings::Default,
        }
    }
}

/// Artefacts of one compiled contract.
pub struct CompiledContract {
    pub name: String,
    pub is_abstract: bool,
    /// ABI JSON value; ordering and spelling are observable
    pub abi: serde_json::Value,
    /// Metadata document, serialised; its hash trails the runtime code
    pub metadata: String,
    /// Deployment bytecode with the link map; `None` for abstract
    /// contracts and interfaces
    pub bytecode: Option<LinkedBytecode>,
    /// Runtime bytecode (metadata trailer included)
    pub runtime_bytecode: Option<LinkedBytecode>,
    /// Textual assembly listing of the deployment object
    pub assembly: Option<String>,
}

/// Everything a compile invocation produces.
pub struct CompilerOutput {
    pub contracts: Vec<CompiledContract>,
}

/// Main compiler entry point. Owns the settings; every call to
/// [`Compiler::compile`] is one independent invocation with its own arena of
/// types and items.
pub struct Compiler {
    settings: Settings,
}

impl Compiler {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Compile a source set given as (logical path, content) pairs.
    ///
    /// The success contract: an empty error list with a non-empty output.
    pub fn compile(&self, sources: &[(String, String)]) -> (CompilerOutput, Diagnostics) {
        let mut units: Vec<SourceUnit> = Vec::new();
        let mut parse_diagnostics = Diagnostics::new();
        let mut next_id = 0u32;

        for (file, (path, content)) in sources.iter().enumerate() {
            match Parser::with_first_id(path.clone(), content, next_id) {
                Ok(parser) => match parser.parse_unit() {
                    Ok((unit, used)) => {
                        next_id = used;
                        units.push(unit);
                    }
                    Err(errors) => {
                        for error in errors {
                            parse_diagnostics.report(
                                Diagnostic::error("E1001", error.to_string(), file, error.span)
                                    .with_caption("parse error"),
                            );
                        }
                    }
                },
                Err(errors) => {
                    for error in errors {
                        let span = lex_error_span(&error);
                        parse_diagnostics.report(
                            Diagnostic::error("E1002", error.to_string(), file, span)
                                .with_caption("lexer error"),
                        );
                    }
                }
            }
        }

        if parse_diagnostics.has_errors() {
            return (CompilerOutput { contracts: vec![] }, parse_diagnostics);
        }

        let (analysis, _bindings, mut diagnostics) = analyze(&units);
        let ast_index = AstIndex::build(&units);

        let mut contracts = Vec::new();
        let options = CodegenOptions {
            strip_revert_strings: self.settings.revert_strings == RevertStrings::Strip,
        };

        for &contract_id in &analysis.contract_order {
            let Some(info) = analysis.contracts.get(&contract_id) else {
                continue;
            };
            let name = info.name.clone();
            let is_abstract = info.is_abstract();
            let skip_codegen = is_abstract
                || info.kind == ContractKind::Interface
                || diagnostics.has_errors();

            let abi_entries = contract_abi(&analysis, contract_id);
            let abi = serde_json::to_value(&abi_entries).expect("abi serialises");
            let metadata_doc = contract_metadata(
                &analysis,
                contract_id,
                sources,
                MetadataSettings {
                    optimizer: OptimizerSettings {
                        enabled: self.settings.optimize,
                        runs: self.settings.optimize_runs,
                    },
                    target_version: self.settings.target_version.clone(),
                },
            );
            let metadata = serde_json::to_string(&metadata_doc).expect("metadata serialises");

            let (bytecode, runtime_bytecode, assembly) = if skip_codegen {
                (None, None, None)
            } else {
                let mut creation_stack = Vec::new();
                let mut deploy = contract::compile_deploy(
                    &analysis,
                    &ast_index,
                    &mut diagnostics,
                    contract_id,
                    &mut creation_stack,
                    options,
                );

                if diagnostics.has_errors() {
                    (None, None, None)
                } else {
                    if self.settings.optimize {
                        optimize_assembly(&mut deploy, true, self.settings.optimize_runs);
                    }
                    // the metadata hash trails the runtime code
                    deploy
                        .sub_mut(vela_asm::SubId(0))
                        .new_data(metadata_trailer(&metadata));

                    match assemble_pair(&deploy) {
                        Ok((full, runtime)) => {
                            (Some(full), Some(runtime), Some(deploy.render()))
                        }
                        Err(error) => {
                            diagnostics.report(Diagnostic::error(
                                "E9001",
                                format!("internal assembly failure: {}", error),
                                info.file,
                                info.span,
                            ));
                            (None, None, None)
                        }
                    }
                }
            };

            contracts.push(CompiledContract {
                name,
                is_abstract,
                abi,
                metadata,
                bytecode,
                runtime_bytecode,
                assembly,
            });
        }

        (CompilerOutput { contracts }, diagnostics)
    }
}

/// Peephole plus constant materialisation over an assembly and its subs.
fn optimize_assembly(asm: &mut Assembly, is_creation: bool, runs: u64) {
    Peephole::run(&mut asm.items);
    optimize_constants(asm, is_creation, runs);
    for index in 0..asm.sub_count() {
        optimize_assembly(asm.sub_mut(vela_asm::SubId(index as u32)), false, runs);
    }
}

fn assemble_pair(
    deploy: &Assembly,
) -> Result<(LinkedBytecode, LinkedBytecode), vela_asm::AsmError> {
    let full = deploy.assemble()?;
    let runtime = deploy.sub(vela_asm::SubId(0)).assemble()?;
    Ok((full, runtime))
}

fn lex_error_span(error: &vela_parser::LexError) -> Span {
    match error {
        vela_parser::LexError::UnexpectedCharacter { span, .. }
        | vela_parser::LexError::InvalidTypeWidth { span, .. }
        | vela_parser::LexError::InvalidEscape { span } => *span,
    }
}
