//! Statement lowering.
//!
//! After a complete statement the simulated stack height matches the height
//! before it unless the statement diverges; dead code after a diverging
//! statement is dropped rather than emitted with a broken height.

use super::CodeGen;
use vela_asm::Opcode;
use vela_checker::CallTarget;
use vela_parser::ast::*;
use vela_parser::Span;

impl<'a, 'u> CodeGen<'a, 'u> {
    pub fn emit_block(&mut self, block: &Block) {
        let base = self.height;
        for statement in &block.statements {
            if self.diverged || self.failed {
                break;
            }
            self.emit_statement(statement);
        }
        if !self.diverged && !self.failed {
            self.pop_to(base, block.span);
        }
    }

    /// A modifier body: like a block, but the `_;` placeholder splices the
    /// next wrapper (or the function body itself).
    pub fn emit_modifier_block(&mut self, block: &Block, func: &FunctionDef, layer: usize) {
        self.placeholder.push((func.id, layer + 1));
        self.emit_block(block);
        self.placeholder.pop();
    }

    pub fn emit_statement(&mut self, statement: &Statement) {
        if self.failed {
            return;
        }
        let base = self.height;
        match statement {
            Statement::Block(block) => self.emit_block(block),
            Statement::VariableDecl(decl) => self.emit_local_decl(decl),
            Statement::Expression(stmt) => {
                self.emit_expr(&stmt.expression);
                if !self.diverged {
                    self.pop_to(base, stmt.span);
                }
            }
            Statement::If(stmt) => self.emit_if(stmt),
            Statement::While(stmt) => self.emit_while(stmt),
            Statement::DoWhile(stmt) => self.emit_do_while(stmt),
            Statement::For(stmt) => self.emit_for(stmt),
            Statement::Break(stmt) => self.emit_break(stmt.span),
            Statement::Continue(stmt) => self.emit_continue(stmt.span),
            Statement::Return(stmt) => self.emit_return(stmt),
            Statement::Emit(stmt) => self.emit_event(stmt),
            Statement::Placeholder(stmt) => self.emit_placeholder(stmt.span),
            Statement::Assembly(stmt) => {
                // the sub-language is opaque; its effects cannot be lowered
                self.unsupported("inline assembly", stmt.span)
            }
        }
    }

    fn emit_local_decl(&mut self, stmt: &VariableDeclStatement) {
        let span = stmt.span;
        let ty = self.local_type(stmt.decl.id);
        let size = self.stack_size(ty);
        match &stmt.initializer {
            Some(init) => self.emit_expr(init),
            None => {
                for _ in 0..size {
                    self.push(0u8, span);
                }
            }
        }
        self.bind_local(stmt.decl.id, size);
    }

    fn emit_if(&mut self, stmt: &IfStatement) {
        let span = stmt.span;
        let otherwise = self.asm.new_label();
        self.emit_expr(&stmt.condition);
        self.op(Opcode::Iszero, span);
        self.push_label(otherwise, span);
        self.op(Opcode::Jumpi, span);
        let base = self.height;

        self.emit_statement(&stmt.then_branch);
        let then_diverged = self.diverged;

        match &stmt.else_branch {
            Some(else_branch) => {
                let end = self.asm.new_label();
                if !then_diverged {
                    self.push_label(end, span);
                    self.op(Opcode::Jump, span);
                }
                self.define_label(otherwise, span);
                self.clear_diverged();
                self.set_height(base);
                self.emit_statement(else_branch);
                let else_diverged = self.diverged;
                if !then_diverged {
                    self.define_label(end, span);
                }
                if then_diverged && else_diverged {
                    self.mark_diverged();
                } else {
                    self.clear_diverged();
                    self.set_height(base);
                }
            }
            None => {
                self.define_label(otherwise, span);
                self.clear_diverged();
                self.set_height(base);
            }
        }
    }

    fn emit_while(&mut self, stmt: &WhileStatement) {
        let span = stmt.span;
        let condition = self.asm.new_label();
        let end = self.asm.new_label();
        let base = self.height;

        self.define_label(condition, span);
        self.emit_expr(&stmt.condition);
        self.op(Opcode::Iszero, span);
        self.push_label(end, span);
        self.op(Opcode::Jumpi, span);

        self.loop_stack.push((condition, end, base));
        self.emit_statement(&stmt.body);
        self.loop_stack.pop();
        self.clear_diverged();
        self.set_height(base);

        self.push_label(condition, span);
        self.op(Opcode::Jump, span);
        self.define_label(end, span);
        self.set_height(base);
    }

    fn emit_do_while(&mut self, stmt: &DoWhileStatement) {
        let span = stmt.span;
        let body = self.asm.new_label();
        let condition = self.asm.new_label();
        let end = self.asm.new_label();
        let base = self.height;

        self.define_label(body, span);
        self.loop_stack.push((condition, end, base));
        self.emit_statement(&stmt.body);
        self.loop_stack.pop();
        self.clear_diverged();
        self.set_height(base);

        self.define_label(condition, span);
        self.emit_expr(&stmt.condition);
        self.push_label(body, span);
        self.op(Opcode::Jumpi, span);
        self.define_label(end, span);
        self.set_height(base);
    }

    fn emit_for(&mut self, stmt: &ForStatement) {
        let span = stmt.span;
        let outer = self.height;
        if let Some(init) = &stmt.init {
            self.emit_statement(init);
        }
        let base = self.height;

        let condition = self.asm.new_label();
        let update = self.asm.new_label();
        let end = self.asm.new_label();

        self.define_label(condition, span);
        if let Some(cond) = &stmt.condition {
            self.emit_expr(cond);
            self.op(Opcode::Iszero, span);
            self.push_label(end, span);
            self.op(Opcode::Jumpi, span);
        }

        self.loop_stack.push((update, end, base));
        self.emit_statement(&stmt.body);
        self.loop_stack.pop();
        self.clear_diverged();
        self.set_height(base);

        self.define_label(update, span);
        if let Some(update_expr) = &stmt.update {
            let before = self.height;
            self.emit_expr(update_expr);
            self.pop_to(before, span);
        }
        self.push_label(condition, span);
        self.op(Opcode::Jump, span);

        self.define_label(end, span);
        self.set_height(base);
        // the loop variable dies with the statement
        self.pop_to(outer, span);
    }

    fn emit_break(&mut self, span: Span) {
        let Some(&(_, end, loop_height)) = self.loop_stack.last() else {
            return;
        };
        self.pop_to(loop_height, span);
        self.push_label(end, span);
        self.op(Opcode::Jump, span);
        self.mark_diverged();
    }

    fn emit_continue(&mut self, span: Span) {
        let Some(&(target, _, loop_height)) = self.loop_stack.last() else {
            return;
        };
        self.pop_to(loop_height, span);
        self.push_label(target, span);
        self.op(Opcode::Jump, span);
        self.mark_diverged();
    }

    fn emit_return(&mut self, stmt: &ReturnStatement) {
        let span = stmt.span;
        let slots = self.return_slot_bases();
        if let Some(value) = &stmt.value {
            self.emit_expr(value);
            // values sit on top in declaration order; store them back into
            // the return slots, last value first
            for (base, ty) in slots.iter().rev() {
                let size = self.stack_size(*ty);
                self.store_local(*base, size, span);
            }
        }
        self.pop_to(self.frame_base, span);
        let exit = self.exit_label();
        self.push_label(exit, span);
        self.op(Opcode::Jump, span);
        self.mark_diverged();
    }

    fn emit_placeholder(&mut self, span: Span) {
        let Some(&(func_id, layer)) = self.placeholder.last() else {
            self.unsupported("placeholder outside a modifier", span);
            return;
        };
        let Some(func) = self.index.function(func_id) else {
            return;
        };
        self.emit_wrapped_body(func, layer);
        // the spliced body may fall through or diverge; the placeholder
        // itself never terminates the wrapper
        self.clear_diverged();
    }

    /// `emit EventName(args…);`
    fn emit_event(&mut self, stmt: &EmitStatement) {
        let span = stmt.span;
        let Expression::FunctionCall(call) = &stmt.call else {
            return;
        };
        let Some(CallTarget::Event(event_id)) = self.analysis.call_targets.get(&call.id).cloned()
        else {
            return;
        };
        let Some(sig) = self.analysis.events.get(&event_id).cloned() else {
            return;
        };

        // topic 0 is the hash of the canonical signature
        let canonical_params: Vec<String> = sig
            .params
            .iter()
            .map(|ty| {
                self.analysis
                    .provider
                    .canonical_name(*ty)
                    .unwrap_or_else(|| self.analysis.provider.display(*ty))
            })
            .collect();
        let signature = format!("{}({})", sig.name, canonical_params.join(","));
        let topic0 = vela_checker::keccak256(signature.as_bytes());

        let plain: Vec<&Expression> = call
            .args
            .iter()
            .zip(&sig.indexed)
            .filter(|(_, indexed)| !**indexed)
            .map(|(arg, _)| arg)
            .collect();
        let indexed: Vec<&Expression> = call
            .args
            .iter()
            .zip(&sig.indexed)
            .filter(|(_, indexed)| **indexed)
            .map(|(arg, _)| arg)
            .collect();

        for arg in indexed.iter().chain(plain.iter()) {
            let ty = self.expr_type(arg.id());
            if !self.analysis.provider.get(ty).is_value_type() {
                self.unsupported("reference types in event arguments", arg.span());
                return;
            }
        }

        // data section: the non-indexed arguments, word-encoded
        let data_size = 32 * plain.len();
        self.push(data_size as u64, span);
        self.call_utility(crate::utilities::Utility::Alloc, 1, 1, span); // [ptr]
        for (index, arg) in plain.iter().enumerate() {
            self.emit_expr(arg); // [ptr, v]
            self.op(Opcode::Dup2, span);
            if index > 0 {
                self.push((32 * index) as u64, span);
                self.op(Opcode::Add, span);
            }
            self.op(Opcode::Mstore, span); // [ptr]
        }

        // topics deepest-last: push in reverse, the signature hash ends up
        // directly below length and offset
        for arg in indexed.iter().rev() {
            self.emit_expr(arg);
        }
        self.push(num_bigint::BigUint::from_bytes_be(&topic0), span);
        self.push(data_size as u64, span); // [ptr, t_n.., t0, len]
        let ptr_depth = (indexed.len() + 3) as u8;
        self.op(Opcode::dup(ptr_depth), span); // [.., len, ptr]
        self.op(Opcode::log(1 + indexed.len() as u8), span);
        self.op(Opcode::Pop, span); // drop ptr
    }
}
