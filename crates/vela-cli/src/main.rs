//! `velac` — the Vela compiler driver.
//!
//! Loads the requested source files (or a single unit from standard input),
//! resolves imports relative to the importing unit, runs the compiler core
//! and prints the selected outputs.
//!
//! Exit codes: 0 success, 1 compile errors, 2 invalid usage.

mod resolver;

use anyhow::Context;
use clap::{Parser as ClapParser, ValueEnum};
use codespan_reporting::files::SimpleFiles;
use rustc_hash::FxHashMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use vela_compiler::{Compiler, RevertStrings, Settings};

#[derive(ClapParser)]
#[command(name = "velac")]
#[command(about = "Vela contract language compiler", long_about = None)]
#[command(version)]
struct Cli {
    /// Source files to compile; standard input is read when omitted
    files: Vec<PathBuf>,

    /// Enable the optimiser
    #[arg(short = 'O', long)]
    optimize: bool,

    /// Expected number of runs for the optimiser cost model
    #[arg(long, default_value_t = 200)]
    optimize_runs: u64,

    /// Target VM version selector
    #[arg(long, default_value = "default")]
    target_version: String,

    /// Revert-string verbosity
    #[arg(long, value_enum, default_value = "default")]
    revert_strings: RevertStringsArg,

    /// Outputs to produce; defaults to `bin,abi`
    #[arg(long, value_enum, value_delimiter = ',')]
    emit: Vec<Emit>,

    /// Library address bindings for the linker, `Name=0xADDR`
    #[arg(long, value_delimiter = ',')]
    libraries: Vec<String>,

    /// Write outputs into this directory instead of standard output
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RevertStringsArg {
    Default,
    Strip,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    Abi,
    #[value(name = "asm")]
    Assembly,
    Bin,
    BinRuntime,
    Metadata,
    Ast,
}

fn main() -> ExitCode {
    // clap exits with code 2 on usage errors
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return ExitCode::from(2);
        }
    };

    match run(cli) {
        Ok(success) => {
            if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(error) => {
            eprintln!("Error: {:#}", error);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    // load the source set; the compiler core never touches the filesystem
    let sources = if cli.files.is_empty() {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("reading standard input")?;
        vec![("<stdin>".to_string(), text)]
    } else {
        resolver::load_with_imports(&cli.files)?
    };

    let libraries = parse_library_bindings(&cli.libraries)?;
    let emit = if cli.emit.is_empty() {
        vec![Emit::Bin, Emit::Abi]
    } else {
        cli.emit.clone()
    };

    let settings = Settings {
        optimize: cli.optimize,
        optimize_runs: cli.optimize_runs,
        target_version: cli.target_version.clone(),
        revert_strings: match cli.revert_strings {
            RevertStringsArg::Default => RevertStrings::Default,
            RevertStringsArg::Strip => RevertStrings::Strip,
        },
    };

    let (output, diagnostics) = Compiler::new(settings).compile(&sources);

    // render diagnostics with source context
    let mut files = SimpleFiles::new();
    for (path, content) in &sources {
        files.add(path.clone(), content.clone());
    }
    diagnostics
        .emit_all(&files)
        .context("rendering diagnostics")?;

    if diagnostics.has_errors() {
        return Ok(false);
    }

    if emit.contains(&Emit::Ast) {
        emit_ast(&sources, cli.output_dir.as_deref())?;
    }

    for contract in &output.contracts {
        if emit.contains(&Emit::Abi) {
            write_output(
                cli.output_dir.as_deref(),
                &format!("{}.abi", contract.name),
                &serde_json::to_string(&contract.abi)?,
            )?;
        }
        if emit.contains(&Emit::Metadata) {
            write_output(
                cli.output_dir.as_deref(),
                &format!("{}_meta.json", contract.name),
                &contract.metadata,
            )?;
        }
        if emit.contains(&Emit::Assembly) {
            if let Some(assembly) = &contract.assembly {
                write_output(
                    cli.output_dir.as_deref(),
                    &format!("{}.asm", contract.name),
                    assembly,
                )?;
            }
        }
        if emit.contains(&Emit::Bin) {
            if let Some(bytecode) = &contract.bytecode {
                let mut linked = bytecode.clone();
                linked.link(&libraries);
                report_unlinked(&contract.name, &linked);
                write_output(
                    cli.output_dir.as_deref(),
                    &format!("{}.bin", contract.name),
                    &hex::encode(&linked.bytes),
                )?;
            }
        }
        if emit.contains(&Emit::BinRuntime) {
            if let Some(runtime) = &contract.runtime_bytecode {
                let mut linked = runtime.clone();
                linked.link(&libraries);
                report_unlinked(&contract.name, &linked);
                write_output(
                    cli.output_dir.as_deref(),
                    &format!("{}.bin-runtime", contract.name),
                    &hex::encode(&linked.bytes),
                )?;
            }
        }
    }

    Ok(true)
}

/// Parse `Name=0xADDR` bindings.
fn parse_library_bindings(specs: &[String]) -> anyhow::Result<FxHashMap<String, [u8; 20]>> {
    let mut bindings = FxHashMap::default();
    for spec in specs {
        let (name, address) = spec
            .split_once('=')
            .with_context(|| format!("invalid library binding '{}'", spec))?;
        let digits = address
            .strip_prefix("0x")
            .with_context(|| format!("library address must start with 0x: '{}'", spec))?;
        let raw = hex::decode(digits)
            .with_context(|| format!("invalid hex in library binding '{}'", spec))?;
        let address: [u8; 20] = raw
            .try_into()
            .ok()
            .with_context(|| format!("library address must be 20 bytes: '{}'", spec))?;
        bindings.insert(name.to_string(), address);
    }
    Ok(bindings)
}

fn report_unlinked(contract: &str, bytecode: &vela_asm::LinkedBytecode) {
    for reference in &bytecode.link_refs {
        eprintln!(
            "Warning: {} has an unlinked library reference to '{}' at offset {}",
            contract, reference.name, reference.offset
        );
    }
}

fn write_output(dir: Option<&std::path::Path>, name: &str, content: &str) -> anyhow::Result<()> {
    match dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating output directory {}", dir.display()))?;
            let path = dir.join(name);
            std::fs::write(&path, content)
                .with_context(|| format!("writing {}", path.display()))?;
        }
        None => {
            println!("======= {} =======", name);
            println!("{}", content);
        }
    }
    Ok(())
}

/// A structural dump of the parsed units.
fn emit_ast(sources: &[(String, String)], dir: Option<&std::path::Path>) -> anyhow::Result<()> {
    for (path, content) in sources {
        let unit = vela_parser::Parser::new(path.clone(), content)
            .map_err(|errors| anyhow::anyhow!("lexing failed: {} errors", errors.len()))?
            .parse()
            .map_err(|errors| anyhow::anyhow!("parsing failed: {} errors", errors.len()))?;
        let name = format!("{}.ast", path.replace(['/', '\\'], "_"));
        write_output(dir, &name, &format!("{:#?}", unit))?;
    }
    Ok(())
}
