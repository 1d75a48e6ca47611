//! The IR emitter: lowers checked AST to the stack machine.
//!
//! The emitter maintains the output item stream, a simulated stack depth, a
//! map from declaration to base stack offset for every local, the function
//! compilation queue and the utility-routine table. After lowering a
//! complete statement the simulated height equals the height before it
//! unless the statement diverges; after lowering an expression of type T the
//! height has grown by T's stack size.

mod expr;
mod stmt;

use crate::index::AstIndex;
use crate::queue::FunctionQueue;
use crate::utilities::{Utility, UtilityTable};
use rustc_hash::FxHashMap;
use vela_asm::{Assembly, LabelId, Opcode, SubId, COPY_HORIZON};
use vela_checker::{Analysis, Diagnostic, Diagnostics};
use vela_parser::ast::{FunctionDef, ModifierInvocation, NodeId};
use vela_parser::Span;
use vela_types::TypeId;

/// Code generator for one assembly (runtime or deployment) of one
/// most-derived contract.
pub struct CodeGen<'a, 'u> {
    pub analysis: &'a Analysis,
    pub index: &'a AstIndex<'u>,
    pub diagnostics: &'a mut Diagnostics,
    pub asm: &'a mut Assembly,
    pub queue: &'a mut FunctionQueue,
    pub utilities: &'a mut UtilityTable,
    /// The contract being compiled; virtual dispatch resolves against its
    /// linearised base list
    pub most_derived: NodeId,
    /// Sub-assembly ids of contracts creatable from this assembly
    pub children: &'a FxHashMap<NodeId, SubId>,
    pub file: usize,

    // ---- per-function state ----
    /// Contract that declares the function being emitted (super calls start
    /// one element after it in the linearised list)
    origin: NodeId,
    /// Simulated stack height relative to the function frame
    height: u32,
    /// Declaration → base stack offset (the height just below the value)
    locals: FxHashMap<NodeId, u32>,
    /// Height of the frame after the return slots: 1 + params + returns
    frame_base: u32,
    return_slots: Vec<(u32, TypeId)>,
    exit_label: LabelId,
    /// Control cannot reach the current program point
    diverged: bool,
    /// Codegen for the enclosing function was aborted (stack too deep)
    failed: bool,
    /// (continue target, break target, entry height) per enclosing loop
    loop_stack: Vec<(LabelId, LabelId, u32)>,
    /// (function, next wrapper layer) during modifier expansion; the `_;`
    /// placeholder splices the top entry
    placeholder: Vec<(NodeId, usize)>,
    /// Drop revert reason strings (the `--revert-strings strip` setting)
    pub(crate) strip_revert_strings: bool,
}

impl<'a, 'u> CodeGen<'a, 'u> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        analysis: &'a Analysis,
        index: &'a AstIndex<'u>,
        diagnostics: &'a mut Diagnostics,
        asm: &'a mut Assembly,
        queue: &'a mut FunctionQueue,
        utilities: &'a mut UtilityTable,
        most_derived: NodeId,
        children: &'a FxHashMap<NodeId, SubId>,
        file: usize,
    ) -> Self {
        let exit_label = asm.new_label();
        Self {
            analysis,
            index,
            diagnostics,
            asm,
            queue,
            utilities,
            most_derived,
            children,
            file,
            origin: most_derived,
            height: 0,
            locals: FxHashMap::default(),
            frame_base: 0,
            return_slots: Vec::new(),
            exit_label,
            diverged: false,
            failed: false,
            loop_stack: Vec::new(),
            placeholder: Vec::new(),
            strip_revert_strings: false,
        }
    }

    /// Apply the revert-string verbosity setting.
    pub fn set_strip_revert_strings(&mut self, strip: bool) {
        self.strip_revert_strings = strip;
    }

    // ========================================================================
    // Item helpers with height tracking
    // ========================================================================

    pub fn op(&mut self, opcode: Opcode, span: Span) {
        let delta = vela_asm::Item::op(opcode).stack_delta();
        self.asm.op(opcode, span);
        self.height = self.height.wrapping_add_signed(delta);
    }

    pub fn push(&mut self, value: impl Into<num_bigint::BigUint>, span: Span) {
        self.asm.push_value(value, span);
        self.height += 1;
    }

    pub fn push_label(&mut self, label: LabelId, span: Span) {
        self.asm.push_label(label, span);
        self.height += 1;
    }

    pub fn define_label(&mut self, label: LabelId, span: Span) {
        self.asm.define_label(label, span);
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn set_height(&mut self, height: u32) {
        self.height = height;
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Pop down to a target height.
    pub fn pop_to(&mut self, target: u32, span: Span) {
        while self.height > target {
            self.op(Opcode::Pop, span);
        }
    }

    // ========================================================================
    // Stack variable access
    // ========================================================================

    /// Copy the words of a local to the top of the stack.
    ///
    /// The distance stays constant while copying: every pushed word moves
    /// the top up by exactly one, as does the word index.
    pub fn dup_local(&mut self, base: u32, size: u32, span: Span) {
        let depth = self.height - base + 1;
        if depth > u32::from(COPY_HORIZON) {
            self.stack_too_deep(span);
            return;
        }
        for _ in 0..size.max(1) {
            self.op(Opcode::dup(depth as u8), span);
        }
    }

    /// Assign the top words to a local, consuming them.
    pub fn store_local(&mut self, base: u32, size: u32, span: Span) {
        for word in 0..size.max(1) {
            let target = base - word;
            let depth = self.height - target;
            if depth > u32::from(COPY_HORIZON) {
                self.stack_too_deep(span);
                return;
            }
            if depth == 0 {
                // the value already sits in its slot
                continue;
            }
            self.op(Opcode::swap(depth as u8), span);
            self.op(Opcode::Pop, span);
        }
    }

    /// Record the value currently on top of the stack as a local.
    /// Returns its base offset.
    pub fn bind_local(&mut self, decl: NodeId, size: u32) -> u32 {
        let base = self.height - size.max(1) + 1;
        self.locals.insert(decl, base);
        base
    }

    pub fn local_base(&self, decl: NodeId) -> Option<u32> {
        self.locals.get(&decl).copied()
    }

    pub fn stack_too_deep(&mut self, span: Span) {
        if !self.failed {
            self.diagnostics.report(
                Diagnostic::error(
                    "E4001",
                    "stack too deep: variable is unreachable from this point",
                    self.file,
                    span,
                )
                .with_caption("try reducing the number of live local variables"),
            );
        }
        self.failed = true;
    }

    pub fn stack_size(&self, ty: TypeId) -> u32 {
        self.analysis.provider.stack_size(ty)
    }

    // ========================================================================
    // Calls and utilities
    // ========================================================================

    /// Call a utility routine. `args` words are already on the stack; the
    /// routine consumes them and leaves `returns` words.
    pub fn call_utility(&mut self, utility: Utility, args: u32, returns: u32, span: Span) {
        let base = self.height - args;
        let ret_label = self.asm.new_label();
        let entry = self.utilities.request(self.asm, utility);
        // the return label must end up below the argument block
        self.push_label(ret_label, span);
        for depth in (1..=args).rev() {
            if depth > u32::from(COPY_HORIZON) {
                self.stack_too_deep(span);
                return;
            }
            self.op(Opcode::swap(depth as u8), span);
        }
        self.push_label(entry, span);
        self.op(Opcode::Jump, span);
        self.define_label(ret_label, span);
        self.set_height(base + returns);
    }

    /// Request a utility without calling it (jump targets such as panic).
    pub fn utility_label(&mut self, utility: Utility) -> LabelId {
        self.utilities.request(self.asm, utility)
    }

    /// Jump to the shared revert when the value on top is zero.
    pub fn panic_if_zero(&mut self, span: Span) {
        let panic = self.utility_label(Utility::Panic);
        self.op(Opcode::Iszero, span);
        self.push_label(panic, span);
        self.op(Opcode::Jumpi, span);
    }

    // ========================================================================
    // Function emission
    // ========================================================================

    /// Emit one internal function: frame setup, modifier expansion, body,
    /// exit sequence. The caller pushed the return label and the arguments;
    /// on return only the return values remain.
    pub fn emit_function(&mut self, callable: NodeId) {
        let Some(sig) = self.analysis.functions.get(&callable) else {
            return;
        };
        if sig.is_getter {
            self.emit_getter(callable);
            return;
        }
        let Some(func) = self.index.function(callable) else {
            return;
        };

        self.origin = sig.contract;
        self.locals.clear();
        self.loop_stack.clear();
        self.return_slots.clear();
        self.diverged = false;
        self.failed = false;
        self.exit_label = self.asm.new_label();

        let entry = self.queue.entry_label(self.asm, callable);
        self.define_label(entry, func.span);

        // frame: [return label, params..., return slots...]
        self.height = 1;
        for param in &func.params {
            let ty = self.local_type(param.id);
            let size = self.stack_size(ty);
            self.height += size;
            self.locals.insert(param.id, self.height - size + 1);
        }
        let returns: Vec<(NodeId, TypeId)> = func
            .returns
            .iter()
            .map(|ret| (ret.id, self.local_type(ret.id)))
            .collect();
        for (decl, ty) in &returns {
            let size = self.stack_size(*ty);
            for _ in 0..size {
                self.push(0u8, func.span);
            }
            let base = self.height - size + 1;
            self.locals.insert(*decl, base);
            self.return_slots.push((base, *ty));
        }
        self.frame_base = self.height;

        self.emit_wrapped_body(func, 0);

        // fall-through joins the exit sequence
        if !self.diverged {
            self.pop_to(self.frame_base, func.span);
        }
        self.define_label(self.exit_label, func.span);
        self.set_height(self.frame_base);
        self.emit_exit_sequence(func.span);
    }

    /// Inline the modifier stack around the body: each wrapper's placeholder
    /// splices the next wrapper, the innermost placeholder the body itself.
    pub(crate) fn emit_wrapped_body(&mut self, func: &FunctionDef, layer: usize) {
        if self.failed {
            return;
        }
        // skip invocations that are base-constructor argument lists
        let wrappers: Vec<&ModifierInvocation> = func
            .invocations
            .iter()
            .filter(|invocation| {
                matches!(
                    self.analysis.resolved.get(&invocation.id),
                    Some(vela_checker::Target::Modifier(_))
                )
            })
            .collect();

        if layer >= wrappers.len() {
            if let Some(body) = &func.body {
                self.emit_block(body);
            }
            return;
        }

        let invocation = wrappers[layer];
        let Some(vela_checker::Target::Modifier(modifier_id)) =
            self.analysis.resolved.get(&invocation.id).cloned()
        else {
            return;
        };
        let Some(modifier) = self.index.modifier(modifier_id) else {
            return;
        };

        // bind modifier parameters to evaluated arguments
        let before = self.height;
        let args = invocation.args.as_deref().unwrap_or(&[]);
        for (param, arg) in modifier.params.iter().zip(args) {
            self.emit_expr(arg);
            let ty = self.local_type(param.id);
            self.bind_local(param.id, self.stack_size(ty));
        }

        // the modifier body with the placeholder splicing the next layer
        self.emit_modifier_block(&modifier.body, func, layer);

        // modifier locals die with the wrapper
        if !self.diverged {
            self.pop_to(before, modifier.span);
        }
    }

    fn emit_exit_sequence(&mut self, span: Span) {
        // stack here: [label, params..., rets...]
        let rets: u32 = self
            .return_slots
            .iter()
            .map(|(_, ty)| self.stack_size(*ty))
            .sum();
        let params = self.frame_base - 1 - rets;
        // squash the parameters below the return block
        for _ in 0..params {
            for depth in 1..=rets {
                if depth > u32::from(COPY_HORIZON) {
                    self.stack_too_deep(span);
                    return;
                }
                self.op(Opcode::swap(depth as u8), span);
            }
            self.op(Opcode::Pop, span);
        }
        // rotate the return label to the top, preserving value order
        for depth in 1..=rets {
            if depth > u32::from(COPY_HORIZON) {
                self.stack_too_deep(span);
                return;
            }
            self.op(Opcode::swap(depth as u8), span);
        }
        self.op(Opcode::Jump, span);
        // at exit the frame is fully consumed: only the results remain
        debug_assert_eq!(self.height, rets);
    }

    /// Body of a synthesised public-state-variable getter: peel mapping
    /// keys and array indices off the parameters, `SLOAD` the final slot.
    fn emit_getter(&mut self, var: NodeId) {
        let Some(sig) = self.analysis.functions.get(&var) else {
            return;
        };
        let Some(info) = self.analysis.state_vars.get(&var) else {
            return;
        };
        let slot = self
            .analysis
            .contracts
            .get(&self.most_derived)
            .and_then(|contract| contract.layout.get(&var))
            .copied()
            .unwrap_or(0);
        let span = info.span;

        let entry = self.queue.entry_label(self.asm, var);
        self.define_label(entry, span);
        // frame: [label, keys...]
        self.height = 1 + sig.params.len() as u32;

        // a constant variable has no slot; its getter returns the inlined
        // initializer value
        if info.is_constant {
            match self.index.state_var(var).and_then(|decl| decl.initializer.as_ref()) {
                Some(init) => self.emit_expr(init),
                None => self.push(0u8, span),
            }
            self.op(Opcode::swap(1), span);
            self.op(Opcode::Jump, span);
            return;
        }

        self.push(slot, span);
        let mut current = info.ty;
        for (position, _) in sig.params.iter().enumerate() {
            let key_base = 2 + position as u32; // below the label
            match self.analysis.provider.get(current).clone() {
                vela_types::Type::Mapping { value, .. } => {
                    // slot = keccak(key . slot): scratch space 0x00..0x40
                    self.dup_local(key_base, 1, span);
                    self.push(0u8, span);
                    self.op(Opcode::Mstore, span);
                    self.push(32u8, span);
                    self.op(Opcode::Mstore, span);
                    self.push(64u8, span);
                    self.push(0u8, span);
                    self.op(Opcode::Keccak256, span);
                    current = value;
                }
                vela_types::Type::Array { base, length, .. } => {
                    let elem_size = self.analysis.provider.storage_size(base);
                    match length {
                        Some(_) => {
                            // fixed: slot + index*size
                            self.dup_local(key_base, 1, span);
                            self.push(elem_size, span);
                            self.op(Opcode::Mul, span);
                            self.op(Opcode::Add, span);
                        }
                        None => {
                            // dynamic: hash(slot) + index*size
                            self.push(0u8, span);
                            self.op(Opcode::Mstore, span);
                            self.push(32u8, span);
                            self.push(0u8, span);
                            self.op(Opcode::Keccak256, span);
                            self.dup_local(key_base, 1, span);
                            self.push(elem_size, span);
                            self.op(Opcode::Mul, span);
                            self.op(Opcode::Add, span);
                        }
                    }
                    current = base;
                }
                _ => break,
            }
        }
        self.op(Opcode::Sload, span);

        // exit: [label, keys..., value] → [value], jump label
        let keys = sig.params.len() as u32;
        for _ in 0..keys {
            self.op(Opcode::swap(1), span);
            self.op(Opcode::Pop, span);
        }
        self.op(Opcode::swap(1), span);
        self.op(Opcode::Jump, span);
    }

    /// Emit an internal call: return label below the arguments, jump to the
    /// (virtually resolved) entry, land on the return label with the results
    /// on top.
    pub fn emit_internal_call(
        &mut self,
        target: NodeId,
        is_virtual: bool,
        is_super: bool,
        args: &[vela_parser::ast::Expression],
        span: Span,
    ) {
        let Some(sig) = self.analysis.functions.get(&target) else {
            return;
        };
        let resolved = if is_super {
            self.analysis
                .resolve_super(self.most_derived, self.origin, &sig.name, &sig.params)
                .unwrap_or(target)
        } else if is_virtual {
            self.analysis
                .resolve_virtual(self.most_derived, &sig.name, &sig.params)
                .unwrap_or(target)
        } else {
            target
        };

        let rets: u32 = sig.returns.iter().map(|ty| self.stack_size(*ty)).sum();
        let base = self.height;
        let ret_label = self.asm.new_label();
        self.push_label(ret_label, span);
        for arg in args {
            self.emit_expr(arg);
        }
        let entry = self.queue.entry_label(self.asm, resolved);
        self.push_label(entry, span);
        self.op(Opcode::Jump, span);
        self.define_label(ret_label, span);
        self.set_height(base + rets);
    }

    /// Emit a `using`-bound library call: the receiver expression becomes
    /// the first argument of a plain internal call.
    pub fn emit_bound_call(
        &mut self,
        target: NodeId,
        receiver: &vela_parser::ast::Expression,
        args: &[vela_parser::ast::Expression],
        span: Span,
    ) {
        let Some(sig) = self.analysis.functions.get(&target) else {
            return;
        };
        let rets: u32 = sig.returns.iter().map(|ty| self.stack_size(*ty)).sum();
        let base = self.height;
        let ret_label = self.asm.new_label();
        self.push_label(ret_label, span);
        self.emit_expr(receiver);
        for arg in args {
            self.emit_expr(arg);
        }
        let entry = self.queue.entry_label(self.asm, target);
        self.push_label(entry, span);
        self.op(Opcode::Jump, span);
        self.define_label(ret_label, span);
        self.set_height(base + rets);
    }

    pub fn local_type(&self, decl: NodeId) -> TypeId {
        self.analysis
            .locals
            .get(&decl)
            .copied()
            .unwrap_or(self.analysis.error_type)
    }

    pub fn expr_type(&self, id: NodeId) -> TypeId {
        self.analysis.type_of(id)
    }

    /// Report a construct the emitter does not lower; the enclosing function
    /// aborts like a stack-too-deep error.
    pub fn unsupported(&mut self, what: &str, span: Span) {
        if !self.failed {
            self.diagnostics.report(
                Diagnostic::error(
                    "E4002",
                    format!("{} is not supported by code generation", what),
                    self.file,
                    span,
                )
                .with_caption("cannot lower this construct"),
            );
        }
        self.failed = true;
    }

    /// Accessor for emit submodules: the contract that lexically declares
    /// the function being emitted.
    pub fn origin(&self) -> NodeId {
        self.origin
    }

    pub fn set_origin(&mut self, origin: NodeId) {
        self.origin = origin;
    }

    pub fn exit_label(&self) -> LabelId {
        self.exit_label
    }

    pub fn frame_base(&self) -> u32 {
        self.frame_base
    }

    pub fn return_slot_bases(&self) -> Vec<(u32, TypeId)> {
        self.return_slots.clone()
    }

    pub fn mark_diverged(&mut self) {
        self.diverged = true;
    }

    pub fn clear_diverged(&mut self) {
        self.diverged = false;
    }

    pub fn diverged(&self) -> bool {
        self.diverged
    }

    pub fn analysis(&self) -> &'a Analysis {
        self.analysis
    }

    pub fn index(&self) -> &'a AstIndex<'u> {
        self.index
    }

    pub fn asm_mut(&mut self) -> &mut Assembly {
        self.asm
    }

    pub fn queue_mut(&mut self) -> &mut FunctionQueue {
        self.queue
    }

    pub fn queue_entry(&mut self, callable: NodeId) -> LabelId {
        self.queue.entry_label(self.asm, callable)
    }

    /// Start an inline body (constructor code in the deployment stream):
    /// locals above the current height, a fresh exit label, no return slots.
    pub fn begin_inline_body(&mut self) {
        self.frame_base = self.height;
        self.exit_label = self.asm.new_label();
        self.return_slots.clear();
        self.diverged = false;
    }

    /// Close an inline body and drop everything above `outer` (the bound
    /// parameters included).
    pub fn end_inline_body(&mut self, outer: u32, span: Span) {
        if !self.diverged {
            self.pop_to(self.frame_base, span);
        }
        let exit = self.exit_label;
        self.define_label(exit, span);
        self.set_height(self.frame_base);
        self.clear_diverged();
        self.pop_to(outer, span);
    }
}
