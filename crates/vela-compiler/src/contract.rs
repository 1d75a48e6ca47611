//! Per-contract code generation.
//!
//! Each non-abstract contract compiles to a deployment assembly whose sole
//! sub-assembly is the runtime code. The runtime begins with the selector
//! dispatcher (entries in ascending selector order), followed by the bodies
//! drained from the function compilation queue, followed by the requested
//! utility routines. The deployment code decodes constructor arguments from
//! the code tail, runs state-variable initialisers and constructor bodies
//! base-most first, then returns a copy of the runtime sub-assembly.

use crate::emit::CodeGen;
use crate::index::AstIndex;
use crate::queue::FunctionQueue;
use crate::utilities::{emit_utility, UtilityTable};
use rustc_hash::FxHashMap;
use vela_asm::{Assembly, Item, ItemKind, Opcode, SubId};
use vela_checker::{Analysis, CallTarget, Diagnostic, Diagnostics};
use vela_parser::ast::visitor::{self, Flow, Visitor};
use vela_parser::ast::{ContractDef, Expression, FunctionKind, NodeId, StateMutability};
use vela_parser::Span;
use vela_types::Type;

/// Codegen settings that reach the emitter.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodegenOptions {
    pub strip_revert_strings: bool,
}

/// Walks function bodies collecting `new C(…)` targets so child deployment
/// code can be attached as sub-assemblies before emission starts.
struct CreationCollector<'a> {
    analysis: &'a Analysis,
    found: Vec<NodeId>,
}

impl Visitor for CreationCollector<'_> {
    fn visit_expression(&mut self, expression: &Expression) -> Flow {
        if let Expression::FunctionCall(call) = expression {
            if let Some(CallTarget::ContractCreation(child)) =
                self.analysis.call_targets.get(&call.id)
            {
                if !self.found.contains(child) {
                    self.found.push(*child);
                }
            }
        }
        Flow::Continue
    }
}

fn collect_creations(analysis: &Analysis, index: &AstIndex<'_>, contract: NodeId) -> Vec<NodeId> {
    let mut collector = CreationCollector {
        analysis,
        found: Vec::new(),
    };
    let Some(info) = analysis.contracts.get(&contract) else {
        return Vec::new();
    };
    for base in &info.linearized {
        if let Some(def) = index.contract(*base) {
            visitor::walk_contract(&mut collector, def);
        }
    }
    collector.found
}

fn attach_children(
    analysis: &Analysis,
    index: &AstIndex<'_>,
    diagnostics: &mut Diagnostics,
    contract: NodeId,
    asm: &mut Assembly,
    creation_stack: &mut Vec<NodeId>,
    options: CodegenOptions,
) -> FxHashMap<NodeId, SubId> {
    let mut children = FxHashMap::default();
    for child in collect_creations(analysis, index, contract) {
        if creation_stack.contains(&child) {
            let (file, span) = analysis
                .contracts
                .get(&contract)
                .map(|info| (info.file, info.span))
                .unwrap_or((0, Span::DUMMY));
            diagnostics.report(
                Diagnostic::error(
                    "E4003",
                    "circular reference for contract creation",
                    file,
                    span,
                )
                .with_caption("'new' cycle"),
            );
            continue;
        }
        let deploy = compile_deploy(analysis, index, diagnostics, child, creation_stack, options);
        let sub = asm.add_sub(deploy);
        children.insert(child, sub);
    }
    children
}

/// Compile the runtime assembly of one contract.
pub fn compile_runtime(
    analysis: &Analysis,
    index: &AstIndex<'_>,
    diagnostics: &mut Diagnostics,
    contract: NodeId,
    creation_stack: &mut Vec<NodeId>,
    options: CodegenOptions,
) -> Assembly {
    let mut asm = Assembly::new();
    let mut queue = FunctionQueue::new();
    let mut utilities = UtilityTable::new();
    creation_stack.push(contract);
    let children = attach_children(
        analysis,
        index,
        diagnostics,
        contract,
        &mut asm,
        creation_stack,
        options,
    );

    let Some(info) = analysis.contracts.get(&contract) else {
        creation_stack.pop();
        return asm;
    };
    let file = info.file;
    let span = info.span;
    let interface = info.interface.clone();
    let fallback = find_special(analysis, info, FunctionKind::Fallback);
    let receive = find_special(analysis, info, FunctionKind::Receive);

    {
        let mut gen = CodeGen::new(
            analysis,
            index,
            diagnostics,
            &mut asm,
            &mut queue,
            &mut utilities,
            contract,
            &children,
            file,
        );
        gen.set_strip_revert_strings(options.strip_revert_strings);

        // free-memory pointer
        gen.push(0x80u8, span);
        gen.push(0x40u8, span);
        gen.op(Opcode::Mstore, span);

        let no_selector = gen.asm_mut().new_label();

        // selector = shr(224, calldataload(0)) when at least 4 bytes exist
        gen.push(4u8, span);
        gen.op(Opcode::Calldatasize, span);
        gen.op(Opcode::Lt, span); // calldatasize < 4
        gen.push_label(no_selector, span);
        gen.op(Opcode::Jumpi, span);

        gen.push(0u8, span);
        gen.op(Opcode::Calldataload, span);
        gen.push(224u8, span);
        gen.op(Opcode::Shr, span); // [sel]

        let mut wrappers = Vec::with_capacity(interface.len());
        for entry in &interface {
            let wrapper = gen.asm_mut().new_label();
            gen.op(Opcode::Dup1, span);
            gen.push(
                num_bigint::BigUint::from_bytes_be(&entry.selector),
                span,
            );
            gen.op(Opcode::Eq, span);
            gen.push_label(wrapper, span);
            gen.op(Opcode::Jumpi, span);
            wrappers.push(wrapper);
        }
        gen.op(Opcode::Pop, span); // unmatched selector

        // no (or unmatched) selector: receive for empty call data, else
        // fallback, else revert
        gen.define_label(no_selector, span);
        gen.set_height(0);
        match (receive, fallback) {
            (Some(receive_fn), fallback) => {
                let use_fallback = gen.asm_mut().new_label();
                gen.op(Opcode::Calldatasize, span);
                gen.push_label(use_fallback, span);
                gen.op(Opcode::Jumpi, span);
                emit_parameterless_entry(&mut gen, receive_fn, span);
                gen.define_label(use_fallback, span);
                gen.set_height(0);
                match fallback {
                    Some(fallback_fn) => emit_parameterless_entry(&mut gen, fallback_fn, span),
                    None => {
                        gen.push(0u8, span);
                        gen.push(0u8, span);
                        gen.op(Opcode::Revert, span);
                    }
                }
            }
            (None, Some(fallback_fn)) => emit_parameterless_entry(&mut gen, fallback_fn, span),
            (None, None) => {
                gen.push(0u8, span);
                gen.push(0u8, span);
                gen.op(Opcode::Revert, span);
            }
        }

        // one wrapper per interface entry: value check, call-data decoding,
        // internal call, return encoding
        for (entry, wrapper) in interface.iter().zip(wrappers) {
            gen.define_label(wrapper, span);
            gen.set_height(1); // the selector is still on the stack
            gen.op(Opcode::Pop, span);
            emit_external_wrapper(&mut gen, entry.callable, span);
        }

        // drain the queue; emission may enqueue further callables
        while let Some(callable) = queue_pop(&mut gen) {
            gen.emit_function(callable);
        }
    }

    // append the requested utilities
    while let Some(utility) = utilities.pop() {
        emit_utility(&mut asm, &mut utilities, utility);
    }

    creation_stack.pop();
    asm
}

fn queue_pop(gen: &mut CodeGen<'_, '_>) -> Option<NodeId> {
    gen.queue_mut().pop()
}

fn find_special(
    analysis: &Analysis,
    info: &vela_checker::ContractInfo,
    kind: FunctionKind,
) -> Option<NodeId> {
    for base in &info.linearized {
        let base_info = analysis.contracts.get(base)?;
        for func in &base_info.functions {
            if let Some(sig) = analysis.functions.get(func) {
                if sig.kind == kind {
                    return Some(*func);
                }
            }
        }
    }
    None
}

/// Entry for fallback/receive: optional value check, call, stop.
fn emit_parameterless_entry(gen: &mut CodeGen<'_, '_>, callable: NodeId, span: Span) {
    let Some(sig) = gen.analysis().functions.get(&callable).cloned() else {
        return;
    };
    if sig.mutability != StateMutability::Payable {
        let panic = gen.utility_label(crate::utilities::Utility::Panic);
        gen.op(Opcode::Callvalue, span);
        gen.push_label(panic, span);
        gen.op(Opcode::Jumpi, span);
    }
    let ret = gen.asm_mut().new_label();
    gen.push_label(ret, span);
    let entry = gen.queue_entry(callable);
    gen.push_label(entry, span);
    gen.op(Opcode::Jump, span);
    gen.define_label(ret, span);
    gen.set_height(0);
    gen.op(Opcode::Stop, span);
}

/// The externally callable wrapper around one interface entry.
fn emit_external_wrapper(gen: &mut CodeGen<'_, '_>, callable: NodeId, span: Span) {
    let Some(sig) = gen.analysis().functions.get(&callable).cloned() else {
        return;
    };
    if sig.mutability != StateMutability::Payable {
        let panic = gen.utility_label(crate::utilities::Utility::Panic);
        gen.op(Opcode::Callvalue, span);
        gen.push_label(panic, span);
        gen.op(Opcode::Jumpi, span);
    }

    // the return label sits below the decoded arguments
    let ret = gen.asm_mut().new_label();
    gen.push_label(ret, span);

    let mut head_offset = 4u64;
    for param in &sig.params {
        emit_calldata_decode(gen, *param, head_offset, span);
        head_offset += 32;
    }

    let entry = gen.queue_entry(callable);
    gen.push_label(entry, span);
    gen.op(Opcode::Jump, span);
    gen.define_label(ret, span);

    let rets: u32 = sig
        .returns
        .iter()
        .map(|ty| gen.analysis().provider.stack_size(*ty))
        .sum();
    gen.set_height(rets);

    if rets == 0 {
        gen.op(Opcode::Stop, span);
        return;
    }
    for ty in &sig.returns {
        if !gen.analysis().provider.get(*ty).is_value_type() {
            gen.unsupported("reference types in external returns", span);
            return;
        }
    }
    // encode into fresh memory and return
    gen.push(0x40u8, span);
    gen.op(Opcode::Mload, span); // [v0.., ptr]
    for index in (0..rets).rev() {
        gen.op(Opcode::swap(1), span); // [.., ptr, v]
        gen.op(Opcode::Dup2, span);
        if index > 0 {
            gen.push(32 * u64::from(index), span);
            gen.op(Opcode::Add, span);
        }
        gen.op(Opcode::Mstore, span); // [.., ptr]
    }
    gen.push(32 * u64::from(rets), span); // [ptr, len]
    gen.op(Opcode::swap(1), span); // [len, ptr]
    gen.op(Opcode::Return, span);
}

/// Decode one external parameter from call data onto the stack.
fn emit_calldata_decode(gen: &mut CodeGen<'_, '_>, ty: vela_types::TypeId, head: u64, span: Span) {
    let kind = gen.analysis().provider.get(ty).clone();
    match kind {
        kind if kind.is_value_type() => {
            gen.push(head, span);
            gen.op(Opcode::Calldataload, span);
        }
        Type::Bytes { .. } | Type::String { .. } => {
            emit_dynamic_calldata_decode(gen, head, 1, span);
        }
        Type::Array {
            base, length: None, ..
        } if gen.analysis().provider.get(base).is_value_type() => {
            emit_dynamic_calldata_decode(gen, head, 32, span);
        }
        Type::Error => gen.push(0u8, span),
        _ => {
            gen.unsupported("decoding this parameter type from call data", span);
            gen.push(0u8, span);
        }
    }
}

/// Copy a dynamic head+tail value (bytes/string or word array) into memory;
/// `scale` is the byte width of one element in call data.
fn emit_dynamic_calldata_decode(gen: &mut CodeGen<'_, '_>, head: u64, scale: u64, span: Span) {
    // tail offset and element count
    gen.push(head, span);
    gen.op(Opcode::Calldataload, span);
    gen.push(4u8, span);
    gen.op(Opcode::Add, span); // [tail]
    gen.op(Opcode::Dup1, span);
    gen.op(Opcode::Calldataload, span); // [tail, len]

    // byte length of the payload, word aligned
    gen.op(Opcode::Dup1, span);
    gen.push(scale, span);
    gen.op(Opcode::Mul, span);
    gen.push(31u8, span);
    gen.op(Opcode::Add, span);
    let mask = (num_bigint::BigUint::from(1u8) << 256u32)
        - num_bigint::BigUint::from(32u8);
    gen.push(mask, span);
    gen.op(Opcode::And, span); // [tail, len, padded]

    gen.op(Opcode::Dup1, span);
    gen.push(32u8, span);
    gen.op(Opcode::Add, span);
    gen.call_utility(crate::utilities::Utility::Alloc, 1, 1, span); // [tail, len, padded, ptr]

    // store the length
    gen.op(Opcode::Dup3, span);
    gen.op(Opcode::Dup2, span);
    gen.op(Opcode::Mstore, span); // [tail, len, padded, ptr]

    // calldatacopy(ptr + 32, tail + 32, padded)
    gen.op(Opcode::Dup2, span); // padded
    gen.op(Opcode::dup(5), span); // tail
    gen.push(32u8, span);
    gen.op(Opcode::Add, span);
    gen.op(Opcode::Dup3, span); // ptr
    gen.push(32u8, span);
    gen.op(Opcode::Add, span);
    gen.op(Opcode::Calldatacopy, span); // [tail, len, padded, ptr]

    // keep only the pointer
    gen.op(Opcode::swap(3), span); // [ptr, len, padded, tail]
    gen.op(Opcode::Pop, span);
    gen.op(Opcode::Pop, span);
    gen.op(Opcode::Pop, span); // [ptr]
}

/// Compile the deployment assembly; the runtime is attached as sub 0.
pub fn compile_deploy(
    analysis: &Analysis,
    index: &AstIndex<'_>,
    diagnostics: &mut Diagnostics,
    contract: NodeId,
    creation_stack: &mut Vec<NodeId>,
    options: CodegenOptions,
) -> Assembly {
    let runtime = compile_runtime(analysis, index, diagnostics, contract, creation_stack, options);

    let mut asm = Assembly::new();
    let runtime_sub = asm.add_sub(runtime);
    let mut queue = FunctionQueue::new();
    let mut utilities = UtilityTable::new();
    creation_stack.push(contract);
    let children = attach_children(
        analysis,
        index,
        diagnostics,
        contract,
        &mut asm,
        creation_stack,
        options,
    );

    let Some(info) = analysis.contracts.get(&contract) else {
        creation_stack.pop();
        return asm;
    };
    let file = info.file;
    let span = info.span;
    let linearized = info.linearized.clone();
    let ctor = find_special(analysis, info, FunctionKind::Constructor)
        .filter(|id| analysis.functions.get(id).map(|s| s.contract) == Some(contract));
    let ctor_params: Vec<vela_types::TypeId> = ctor
        .and_then(|id| analysis.functions.get(&id))
        .map(|sig| sig.params.clone())
        .unwrap_or_default();

    {
        let mut gen = CodeGen::new(
            analysis,
            index,
            diagnostics,
            &mut asm,
            &mut queue,
            &mut utilities,
            contract,
            &children,
            file,
        );
        gen.set_strip_revert_strings(options.strip_revert_strings);

        // constructor arguments trail the creation code; copy them to the
        // start of free memory before initialising the bump pointer
        let args_base = 0x80u64;
        if !ctor_params.is_empty() {
            gen.op(Opcode::Codesize, span);
            gen.asm_mut()
                .append(Item::new(ItemKind::PushProgramSize, span));
            gen.set_height(gen.height() + 1);
            gen.op(Opcode::swap(1), span);
            gen.op(Opcode::Sub, span); // [argslen]
            gen.asm_mut()
                .append(Item::new(ItemKind::PushProgramSize, span));
            gen.set_height(gen.height() + 1); // [argslen, off]
            gen.push(args_base, span); // [argslen, off, dest]
            gen.op(Opcode::Codecopy, span); // []
        }
        let free_start = args_base + 32 * ctor_params.len() as u64;
        gen.push(free_start, span);
        gen.push(0x40u8, span);
        gen.op(Opcode::Mstore, span);

        // initialisation runs base-most first
        for base in linearized.iter().rev() {
            let Some(base_def) = index.contract(*base) else {
                continue;
            };
            gen.set_origin(*base);
            emit_state_var_initializers(&mut gen, base_def, span);
            emit_constructor_body(&mut gen, base_def, contract, args_base, span);
        }

        // return a copy of the runtime code
        gen.asm_mut()
            .append(Item::new(ItemKind::PushSubSize(runtime_sub), span));
        gen.set_height(gen.height() + 1);
        gen.op(Opcode::Dup1, span);
        gen.asm_mut()
            .append(Item::new(ItemKind::PushSubOffset(runtime_sub), span));
        gen.set_height(gen.height() + 1);
        gen.push(0u8, span);
        gen.op(Opcode::Codecopy, span); // [size]
        gen.push(0u8, span);
        gen.op(Opcode::Return, span);

        while let Some(callable) = queue_pop(&mut gen) {
            gen.emit_function(callable);
        }
    }

    while let Some(utility) = utilities.pop() {
        emit_utility(&mut asm, &mut utilities, utility);
    }

    creation_stack.pop();
    asm
}

fn emit_state_var_initializers(gen: &mut CodeGen<'_, '_>, contract: &ContractDef, span: Span) {
    for var in contract.state_variables() {
        if var.is_constant {
            continue;
        }
        let Some(init) = &var.initializer else {
            continue;
        };
        let Some(info) = gen.analysis().state_vars.get(&var.id).cloned() else {
            continue;
        };
        let slot = gen.storage_slot(var.id);
        let ty = gen.analysis().provider.get(info.ty).clone();
        match ty {
            ty if ty.is_value_type() => {
                gen.emit_expr(init);
                gen.push(slot, span);
                gen.op(Opcode::Sstore, span);
            }
            Type::Bytes { .. } | Type::String { .. } => {
                gen.emit_expr(init); // [ptr]
                gen.push(slot, span); // [ptr, slot]
                gen.call_utility(crate::utilities::Utility::ByteStringStore, 2, 0, span);
            }
            _ => gen.unsupported("initializer for this state variable type", init.span()),
        }
    }
}

/// Inline the constructor body of `base` into the deployment stream.
fn emit_constructor_body(
    gen: &mut CodeGen<'_, '_>,
    base: &ContractDef,
    most_derived: NodeId,
    args_base: u64,
    span: Span,
) {
    let Some(ctor) = base.constructor() else {
        return;
    };
    let frame = gen.height();

    // bind parameters: the most-derived constructor reads its arguments
    // from the copied code tail, base constructors evaluate the argument
    // expressions recorded in the derived contract
    if base.id == most_derived {
        for (position, param) in ctor.params.iter().enumerate() {
            gen.push(args_base + 32 * position as u64, span);
            gen.op(Opcode::Mload, span);
            let ty = gen.local_type(param.id);
            let size = gen.analysis().provider.stack_size(ty);
            gen.bind_local(param.id, size);
        }
    } else if let Some(args) = find_base_constructor_args(gen.analysis(), gen.index(), most_derived, base.id)
    {
        for (param, arg) in ctor.params.iter().zip(args) {
            gen.emit_expr(arg);
            let ty = gen.local_type(param.id);
            let size = gen.analysis().provider.stack_size(ty);
            gen.bind_local(param.id, size);
        }
    }

    gen.begin_inline_body();
    gen.emit_wrapped_body(ctor, 0);
    gen.end_inline_body(frame, span);
}

/// Find the argument list a derived contract supplies for a base
/// constructor, either on the inheritance specifier or on the derived
/// constructor head.
fn find_base_constructor_args<'u>(
    analysis: &Analysis,
    index: &AstIndex<'u>,
    most_derived: NodeId,
    base: NodeId,
) -> Option<&'u [Expression]> {
    let info = analysis.contracts.get(&most_derived)?;
    for candidate in &info.linearized {
        let def = index.contract(*candidate)?;
        for spec in &def.bases {
            if spec_names(analysis, spec, base) {
                if let Some(args) = &spec.args {
                    return Some(args.as_slice());
                }
            }
        }
        if let Some(ctor) = def.constructor() {
            for invocation in &ctor.invocations {
                if let Some(vela_checker::Target::TypeLike(target)) =
                    analysis.resolved.get(&invocation.id)
                {
                    if *target == base {
                        if let Some(args) = &invocation.args {
                            return Some(args.as_slice());
                        }
                    }
                }
            }
        }
    }
    None
}

fn spec_names(
    analysis: &Analysis,
    spec: &vela_parser::ast::InheritanceSpecifier,
    base: NodeId,
) -> bool {
    analysis
        .contracts
        .get(&base)
        .map(|info| info.name == spec.name.dotted())
        .unwrap_or(false)
}
