//! Expression lowering.
//!
//! Every `emit_expr` grows the simulated stack by exactly the stack size of
//! the expression's type. Compile-time constants (anything the checker folded
//! to a literal type) materialise as a single push; the constant optimiser
//! later picks the cheapest representation.

use super::CodeGen;
use crate::utilities::Utility;
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::One;
use vela_asm::{ItemKind, Opcode};
use vela_checker::{Builtin, CallTarget, Target};
use vela_parser::ast::*;
use vela_parser::Span;
use vela_types::{StateMutability as Mutability, Type, TypeId};

/// A store destination; address words (if any) are on the stack above the
/// value when `store_to` runs.
pub enum Dest {
    Local { base: u32, size: u32 },
    /// slot on stack
    Storage,
    /// byte address on stack
    Memory,
    /// byte address on stack, value is a left-aligned single byte
    MemoryByte,
}

/// Address kind left by [`CodeGen::emit_index_address`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Addr {
    Storage,
    Memory,
    MemoryByte,
}

/// Two's-complement encoding of a literal into a machine word.
pub fn to_word(value: &BigInt) -> BigUint {
    match value.sign() {
        Sign::Minus => {
            let modulus = BigUint::one() << 256u32;
            let magnitude = value.magnitude().clone() & ((BigUint::one() << 256u32) - BigUint::one());
            modulus - magnitude
        }
        _ => value.magnitude().clone(),
    }
}

impl<'a, 'u> CodeGen<'a, 'u> {
    pub fn emit_expr(&mut self, expr: &Expression) {
        if self.failed {
            return;
        }

        // anything folded to a literal type is a plain constant push
        let ty = self.expr_type(expr.id());
        if let Type::IntLiteral(value) = self.analysis.provider.get(ty) {
            let word = to_word(&value.clone());
            self.push(word, expr.span());
            return;
        }

        match expr {
            Expression::Literal(literal) => self.emit_literal(literal),
            Expression::Identifier(ident) => self.emit_identifier(ident),
            Expression::Unary(unary) => self.emit_unary(unary),
            Expression::Binary(binary) => self.emit_binary(binary),
            Expression::Conditional(cond) => self.emit_conditional(cond),
            Expression::Assignment(assign) => self.emit_assignment(assign),
            Expression::MemberAccess(access) => self.emit_member_access(access),
            Expression::IndexAccess(access) => self.emit_index_access(access),
            Expression::FunctionCall(call) => self.emit_call(call),
            Expression::Tuple(tuple) => {
                for component in &tuple.components {
                    self.emit_expr(component);
                }
            }
            Expression::New(new) => self.unsupported("bare 'new' expression", new.span),
            Expression::ElementaryTypeName(node) => {
                self.unsupported("type used as a value", node.span)
            }
        }
    }

    fn emit_literal(&mut self, literal: &Literal) {
        match &literal.kind {
            LiteralKind::Bool(value) => {
                self.push(u8::from(*value), literal.span);
            }
            LiteralKind::String(text) => {
                self.emit_string_to_memory(text.clone(), literal.span);
            }
            // covered by the constant shortcut; an unfolded number literal
            // means the checker rejected it already
            LiteralKind::Number(_) => self.push(0u8, literal.span),
        }
    }

    /// Allocate and fill a memory string/bytes value; leaves the pointer.
    pub fn emit_string_to_memory(&mut self, text: String, span: Span) {
        let bytes = text.into_bytes();
        let padded = (bytes.len() + 31) / 32 * 32;
        self.push((32 + padded) as u64, span);
        self.call_utility(Utility::Alloc, 1, 1, span); // [ptr]
        self.push(bytes.len() as u64, span);
        self.op(Opcode::Dup2, span);
        self.op(Opcode::Mstore, span); // [ptr]
        for (word_index, chunk) in bytes.chunks(32).enumerate() {
            let mut word = [0u8; 32];
            word[..chunk.len()].copy_from_slice(chunk);
            self.push(BigUint::from_bytes_be(&word), span);
            self.op(Opcode::Dup2, span);
            self.push((32 + 32 * word_index) as u64, span);
            self.op(Opcode::Add, span);
            self.op(Opcode::Mstore, span); // [ptr]
        }
    }

    fn emit_identifier(&mut self, ident: &IdentifierExpression) {
        let span = ident.span;
        match self.analysis.resolved.get(&ident.id).cloned() {
            Some(Target::Variable(decl)) => {
                let ty = self.local_type(decl);
                let size = self.stack_size(ty);
                match self.local_base(decl) {
                    Some(base) => self.dup_local(base, size, span),
                    None => self.unsupported("reference to a variable outside this frame", span),
                }
            }
            Some(Target::StateVar(var)) => self.emit_state_var_read(var, span),
            Some(Target::This) => self.op(Opcode::ThisAddress, span),
            _ => self.unsupported("this identifier as a value", span),
        }
    }

    fn emit_state_var_read(&mut self, var: NodeId, span: Span) {
        let Some(info) = self.analysis.state_vars.get(&var) else {
            return;
        };
        if info.is_constant {
            // constants are inlined from their initializer
            let Some(decl) = self.index.state_var(var) else {
                return;
            };
            match &decl.initializer {
                Some(init) => self.emit_expr(init),
                None => self.push(0u8, span),
            }
            return;
        }
        let slot = self.storage_slot(var);
        self.push(slot, span);
        if self.analysis.provider.get(info.ty).is_value_type() {
            self.op(Opcode::Sload, span);
        }
        // reference types leave the slot as a storage pointer
    }

    pub fn storage_slot(&self, var: NodeId) -> u64 {
        self.analysis
            .contracts
            .get(&self.most_derived)
            .and_then(|info| info.layout.get(&var))
            .copied()
            .unwrap_or(0)
    }

    // ========================================================================
    // Operators
    // ========================================================================

    fn emit_unary(&mut self, unary: &UnaryExpression) {
        let span = unary.span;
        match unary.op {
            UnaryOp::Not => {
                self.emit_expr(&unary.operand);
                self.op(Opcode::Iszero, span);
            }
            UnaryOp::BitNot => {
                self.emit_expr(&unary.operand);
                self.op(Opcode::Not, span);
            }
            UnaryOp::Neg => {
                self.emit_expr(&unary.operand);
                self.push(0u8, span);
                self.op(Opcode::Sub, span); // 0 - x
            }
            UnaryOp::Inc | UnaryOp::Dec => {
                // read, adjust, write back; prefix yields the new value,
                // postfix the old one
                self.emit_expr(&unary.operand);
                if !unary.prefix {
                    self.op(Opcode::Dup1, span);
                }
                self.push(1u8, span);
                if unary.op == UnaryOp::Inc {
                    self.op(Opcode::Add, span);
                } else {
                    self.op(Opcode::swap(1), span);
                    self.op(Opcode::Sub, span); // x - 1
                }
                if unary.prefix {
                    self.op(Opcode::Dup1, span);
                }
                let dest = self.emit_dest(&unary.operand);
                self.store_to(dest, span);
            }
        }
    }

    fn emit_binary(&mut self, binary: &BinaryExpression) {
        let span = binary.span;
        if binary.op.is_logical() {
            return self.emit_short_circuit(binary);
        }

        self.emit_expr(&binary.left);
        self.emit_expr(&binary.right);

        let signed = self.is_signed(binary.left.id()) || self.is_signed(binary.right.id());
        // stack is [l, r]; non-commutative operations need the left operand
        // back on top
        let (opcode, swap) = match (binary.op, signed) {
            (BinaryOp::Add, _) => (Opcode::Add, false),
            (BinaryOp::Mul, _) => (Opcode::Mul, false),
            (BinaryOp::Sub, _) => (Opcode::Sub, true),
            (BinaryOp::Div, false) => (Opcode::Div, true),
            (BinaryOp::Div, true) => (Opcode::Sdiv, true),
            (BinaryOp::Mod, false) => (Opcode::Mod, true),
            (BinaryOp::Mod, true) => (Opcode::Smod, true),
            (BinaryOp::Pow, _) => (Opcode::Exp, true),
            (BinaryOp::BitAnd, _) => (Opcode::And, false),
            (BinaryOp::BitOr, _) => (Opcode::Or, false),
            (BinaryOp::BitXor, _) => (Opcode::Xor, false),
            (BinaryOp::Shl, _) => (Opcode::Shl, false),
            (BinaryOp::Shr, signed) => (if signed { Opcode::Sar } else { Opcode::Shr }, false),
            (BinaryOp::Eq, _) => (Opcode::Eq, false),
            (BinaryOp::NotEq, _) => (Opcode::Eq, false),
            (BinaryOp::Lt, false) => (Opcode::Lt, true),
            (BinaryOp::Lt, true) => (Opcode::Slt, true),
            (BinaryOp::Gt, false) => (Opcode::Gt, true),
            (BinaryOp::Gt, true) => (Opcode::Sgt, true),
            // a <= b  ⇔  !(a > b)
            (BinaryOp::LtEq, false) => (Opcode::Gt, true),
            (BinaryOp::LtEq, true) => (Opcode::Sgt, true),
            (BinaryOp::GtEq, false) => (Opcode::Lt, true),
            (BinaryOp::GtEq, true) => (Opcode::Slt, true),
            (BinaryOp::And | BinaryOp::Or, _) => unreachable!("handled above"),
        };
        if swap {
            self.op(Opcode::swap(1), span);
        }
        self.op(opcode, span);
        if matches!(
            binary.op,
            BinaryOp::NotEq | BinaryOp::LtEq | BinaryOp::GtEq
        ) {
            self.op(Opcode::Iszero, span);
        }
    }

    /// Boolean operators short-circuit at codegen.
    fn emit_short_circuit(&mut self, binary: &BinaryExpression) {
        let span = binary.span;
        let end = self.asm.new_label();
        self.emit_expr(&binary.left); // [l]
        self.op(Opcode::Dup1, span);
        if binary.op == BinaryOp::And {
            self.op(Opcode::Iszero, span);
        }
        self.push_label(end, span);
        self.op(Opcode::Jumpi, span); // [l], jumps with l as the result
        self.op(Opcode::Pop, span);
        self.emit_expr(&binary.right); // [r]
        self.define_label(end, span);
    }

    fn emit_conditional(&mut self, cond: &ConditionalExpression) {
        let span = cond.span;
        let otherwise = self.asm.new_label();
        let end = self.asm.new_label();
        self.emit_expr(&cond.condition);
        self.op(Opcode::Iszero, span);
        self.push_label(otherwise, span);
        self.op(Opcode::Jumpi, span);
        let base = self.height();
        self.emit_expr(&cond.true_expr);
        self.push_label(end, span);
        self.op(Opcode::Jump, span);
        self.define_label(otherwise, span);
        self.set_height(base);
        self.emit_expr(&cond.false_expr);
        self.define_label(end, span);
    }

    fn is_signed(&self, expr: NodeId) -> bool {
        matches!(
            self.analysis.provider.get(self.expr_type(expr)),
            Type::Int { signed: true, .. }
        )
    }

    // ========================================================================
    // Loads: member and index access
    // ========================================================================

    fn emit_member_access(&mut self, access: &MemberAccessExpression) {
        let span = access.span;
        match self.analysis.resolved.get(&access.id).cloned() {
            Some(Target::MagicMember(kind, member)) => {
                self.emit_magic_member(kind, &member, span)
            }
            Some(Target::EnumVariant { index, .. }) => self.push(index as u64, span),
            Some(Target::ArrayLength) => {
                let base_ty = self.expr_type(access.expr.id());
                self.emit_expr(&access.expr);
                match self.analysis.provider.get(base_ty).clone() {
                    Type::Array {
                        location: DataLocation::Storage,
                        ..
                    } => self.op(Opcode::Sload, span),
                    Type::Bytes {
                        location: DataLocation::Storage,
                    }
                    | Type::String {
                        location: DataLocation::Storage,
                    } => self.call_utility(Utility::BytesStorageLength, 1, 1, span),
                    Type::Array {
                        location: DataLocation::Memory,
                        ..
                    }
                    | Type::Bytes {
                        location: DataLocation::Memory,
                    }
                    | Type::String {
                        location: DataLocation::Memory,
                    } => self.op(Opcode::Mload, span),
                    _ => self.unsupported("length of this container", span),
                }
            }
            Some(Target::AddressBalance) => {
                self.emit_expr(&access.expr);
                self.op(Opcode::Balance, span);
            }
            Some(Target::StructField { decl, index }) => {
                let base_ty = self.expr_type(access.expr.id());
                self.emit_expr(&access.expr);
                let location = self
                    .analysis
                    .provider
                    .get(base_ty)
                    .data_location()
                    .unwrap_or(DataLocation::Memory);
                self.emit_struct_field_address(decl, index, location, span);
                let addr = if location == DataLocation::Storage {
                    Addr::Storage
                } else {
                    Addr::Memory
                };
                self.load_addr(addr, self.expr_type(access.id), span);
            }
            _ => self.unsupported("this member as a value", span),
        }
    }

    fn emit_magic_member(&mut self, kind: vela_types::MagicKind, member: &str, span: Span) {
        use vela_types::MagicKind::*;
        match (kind, member) {
            (Msg, "sender") => self.op(Opcode::Caller, span),
            (Msg, "value") => self.op(Opcode::Callvalue, span),
            (Msg, "sig") => {
                self.push(0u8, span);
                self.op(Opcode::Calldataload, span);
                let mask = BigUint::from(0xffffffffu32) << 224u32;
                self.push(mask, span);
                self.op(Opcode::And, span);
            }
            (Block, "number") => self.op(Opcode::Number, span),
            (Block, "timestamp") => self.op(Opcode::Timestamp, span),
            (Block, "coinbase") => self.op(Opcode::Coinbase, span),
            (Block, "gaslimit") => self.op(Opcode::Gaslimit, span),
            (Block, "chainid") => self.op(Opcode::Chainid, span),
            (Tx, "origin") => self.op(Opcode::Origin, span),
            (Tx, "gasprice") => self.op(Opcode::Gasprice, span),
            _ => self.unsupported("this built-in member", span),
        }
    }

    /// With the struct's slot/pointer on the stack, add the field offset.
    fn emit_struct_field_address(
        &mut self,
        decl: NodeId,
        index: usize,
        location: DataLocation,
        span: Span,
    ) {
        match location {
            DataLocation::Storage => {
                let fields = self.analysis.provider.struct_fields(decl);
                let offset: u64 = fields
                    .iter()
                    .take(index)
                    .map(|field| self.analysis.provider.storage_size(*field))
                    .sum();
                if offset > 0 {
                    self.push(offset, span);
                    self.op(Opcode::Add, span);
                }
            }
            _ => {
                // memory structs are word sequences
                let offset = 32 * index as u64;
                if offset > 0 {
                    self.push(offset, span);
                    self.op(Opcode::Add, span);
                }
            }
        }
    }

    fn emit_index_access(&mut self, access: &IndexAccessExpression) {
        let span = access.span;
        let element = self.expr_type(access.id);
        if let Some(addr) = self.emit_index_address(access) {
            self.load_addr(addr, element, span);
        }
    }

    /// Leave the address (slot or byte pointer) of an indexed element on the
    /// stack. Returns the address kind, or `None` on failure.
    fn emit_index_address(&mut self, access: &IndexAccessExpression) -> Option<Addr> {
        let span = access.span;
        let base_ty = self.expr_type(access.base.id());
        let Some(index) = access.index.as_deref() else {
            self.unsupported("index-less access", span);
            return None;
        };

        match self.analysis.provider.get(base_ty).clone() {
            Type::Array {
                base: element,
                length,
                location: DataLocation::Storage,
            } => {
                self.emit_expr(&access.base); // [slot]
                let element_size = self.analysis.provider.storage_size(element);
                match length {
                    Some(_) => {
                        self.emit_expr(index); // [slot, i]
                        self.push(element_size, span);
                        self.op(Opcode::Mul, span);
                        self.op(Opcode::Add, span); // [slot + i*size]
                    }
                    None => {
                        // bounds check against the stored length
                        self.op(Opcode::Dup1, span);
                        self.op(Opcode::Sload, span); // [slot, len]
                        self.emit_expr(index); // [slot, len, i]
                        self.op(Opcode::Dup1, span);
                        self.op(Opcode::Dup3, span);
                        self.op(Opcode::Gt, span); // len > i
                        self.panic_if_zero(span); // [slot, len, i]
                        self.op(Opcode::swap(1), span);
                        self.op(Opcode::Pop, span); // [slot, i]
                        self.op(Opcode::swap(1), span); // [i, slot]
                        self.push(0u8, span);
                        self.op(Opcode::Mstore, span); // [i]
                        self.push(32u8, span);
                        self.push(0u8, span);
                        self.op(Opcode::Keccak256, span); // [i, data]
                        self.op(Opcode::swap(1), span); // [data, i]
                        self.push(element_size, span);
                        self.op(Opcode::Mul, span);
                        self.op(Opcode::Add, span); // [data + i*size]
                    }
                }
                Some(Addr::Storage)
            }
            Type::Array {
                location: DataLocation::Memory,
                ..
            } => {
                self.emit_expr(&access.base); // [ptr]
                self.op(Opcode::Dup1, span);
                self.op(Opcode::Mload, span); // [ptr, len]
                self.emit_expr(index); // [ptr, len, i]
                self.op(Opcode::Dup1, span);
                self.op(Opcode::Dup3, span);
                self.op(Opcode::Gt, span);
                self.panic_if_zero(span); // [ptr, len, i]
                self.op(Opcode::swap(1), span);
                self.op(Opcode::Pop, span); // [ptr, i]
                self.push(32u8, span);
                self.op(Opcode::Mul, span);
                self.push(32u8, span);
                self.op(Opcode::Add, span);
                self.op(Opcode::Add, span); // [ptr + 32 + 32i]
                Some(Addr::Memory)
            }
            Type::Mapping { key, .. } => {
                self.emit_expr(&access.base); // [slot]
                if !self.analysis.provider.get(key).is_value_type() {
                    self.unsupported("reference-typed mapping keys", span);
                    return None;
                }
                self.emit_expr(index); // [slot, key]
                self.push(0u8, span);
                self.op(Opcode::Mstore, span); // [slot]
                self.push(32u8, span);
                self.op(Opcode::Mstore, span); // []
                self.push(64u8, span);
                self.push(0u8, span);
                self.op(Opcode::Keccak256, span); // [hash]
                Some(Addr::Storage)
            }
            Type::Bytes {
                location: DataLocation::Memory,
            } => {
                self.emit_expr(&access.base);
                self.op(Opcode::Dup1, span);
                self.op(Opcode::Mload, span);
                self.emit_expr(index);
                self.op(Opcode::Dup1, span);
                self.op(Opcode::Dup3, span);
                self.op(Opcode::Gt, span);
                self.panic_if_zero(span);
                self.op(Opcode::swap(1), span);
                self.op(Opcode::Pop, span); // [ptr, i]
                self.op(Opcode::Add, span);
                self.push(32u8, span);
                self.op(Opcode::Add, span); // [ptr + 32 + i]
                Some(Addr::MemoryByte)
            }
            Type::Error => None,
            _ => {
                self.unsupported("indexing this container", span);
                None
            }
        }
    }

    /// Replace the address on top of the stack with the value it points at.
    fn load_addr(&mut self, addr: Addr, ty: TypeId, span: Span) {
        match addr {
            Addr::Storage => {
                if self.analysis.provider.get(ty).is_value_type() {
                    self.op(Opcode::Sload, span);
                }
                // reference values keep the slot as a storage pointer
            }
            Addr::Memory => self.op(Opcode::Mload, span),
            // single byte, left-aligned
            Addr::MemoryByte => {
                self.op(Opcode::Mload, span);
                let mask = BigUint::from(0xffu8) << 248u32;
                self.push(mask, span);
                self.op(Opcode::And, span);
            }
        }
    }

    // ========================================================================
    // Stores
    // ========================================================================

    /// Push the destination address (if any) for an lvalue. The value to be
    /// stored is already below it on the stack.
    pub fn emit_dest(&mut self, lhs: &Expression) -> Dest {
        let span = lhs.span();
        match lhs {
            Expression::Identifier(ident) => {
                match self.analysis.resolved.get(&ident.id).cloned() {
                    Some(Target::Variable(decl)) => {
                        let ty = self.local_type(decl);
                        let size = self.stack_size(ty);
                        match self.local_base(decl) {
                            Some(base) => Dest::Local { base, size },
                            None => {
                                self.unsupported("assignment to this variable", span);
                                Dest::Local { base: 1, size: 1 }
                            }
                        }
                    }
                    Some(Target::StateVar(var)) => {
                        let slot = self.storage_slot(var);
                        self.push(slot, span);
                        Dest::Storage
                    }
                    _ => {
                        self.unsupported("assignment to this expression", span);
                        Dest::Local { base: 1, size: 1 }
                    }
                }
            }
            Expression::IndexAccess(access) => match self.emit_index_address(access) {
                Some(Addr::Storage) => Dest::Storage,
                Some(Addr::Memory) => Dest::Memory,
                Some(Addr::MemoryByte) => Dest::MemoryByte,
                None => Dest::Local { base: 1, size: 1 },
            },
            Expression::MemberAccess(access) => {
                match self.analysis.resolved.get(&access.id).cloned() {
                    Some(Target::StructField { decl, index }) => {
                        let base_ty = self.expr_type(access.expr.id());
                        self.emit_expr(&access.expr);
                        let location = self
                            .analysis
                            .provider
                            .get(base_ty)
                            .data_location()
                            .unwrap_or(DataLocation::Memory);
                        self.emit_struct_field_address(decl, index, location, span);
                        if location == DataLocation::Storage {
                            Dest::Storage
                        } else {
                            Dest::Memory
                        }
                    }
                    _ => {
                        self.unsupported("assignment to this member", span);
                        Dest::Local { base: 1, size: 1 }
                    }
                }
            }
            _ => {
                self.unsupported("assignment to this expression", span);
                Dest::Local { base: 1, size: 1 }
            }
        }
    }

    /// Store the value below the pushed address into the destination.
    pub fn store_to(&mut self, dest: Dest, span: Span) {
        match dest {
            Dest::Local { base, size } => self.store_local(base, size, span),
            Dest::Storage => self.op(Opcode::Sstore, span),
            Dest::Memory => self.op(Opcode::Mstore, span),
            Dest::MemoryByte => {
                // [value, addr] with the byte left-aligned in value
                self.op(Opcode::swap(1), span);
                self.push(248u16, span);
                self.op(Opcode::Shr, span);
                self.op(Opcode::swap(1), span);
                self.op(Opcode::Mstore8, span);
            }
        }
    }

    fn emit_assignment(&mut self, assign: &AssignmentExpression) {
        let span = assign.span;
        let lhs_ty = self.expr_type(assign.lhs.id());
        let rhs_ty = self.expr_type(assign.rhs.id());

        // reference-type copies into storage route through the copy
        // routines; the result value is the storage pointer
        if assign.op == AssignOp::Assign {
            let lhs_kind = self.analysis.provider.get(lhs_ty).clone();
            let rhs_kind = self.analysis.provider.get(rhs_ty).clone();
            match (&lhs_kind, &rhs_kind) {
                (
                    Type::Array {
                        location: DataLocation::Storage,
                        ..
                    },
                    Type::Array {
                        location: DataLocation::Memory,
                        ..
                    },
                ) => {
                    self.emit_expr(&assign.rhs); // [ptr]
                    self.emit_expr(&assign.lhs); // [ptr, slot] (pointer read)
                    self.op(Opcode::Dup1, span); // keep the slot as result
                    self.op(Opcode::swap(2), span); // [slot, slot, ptr]
                    self.op(Opcode::swap(1), span); // [slot, ptr, slot]
                    self.call_utility(Utility::ArrayToStorageCopy, 2, 0, span);
                    return;
                }
                (
                    Type::Bytes {
                        location: DataLocation::Storage,
                    }
                    | Type::String {
                        location: DataLocation::Storage,
                    },
                    Type::StringLiteral(_)
                    | Type::Bytes {
                        location: DataLocation::Memory,
                    }
                    | Type::String {
                        location: DataLocation::Memory,
                    },
                ) => {
                    self.emit_expr(&assign.rhs); // [ptr]
                    self.emit_expr(&assign.lhs); // [ptr, slot]
                    self.op(Opcode::Dup1, span);
                    self.op(Opcode::swap(2), span); // [slot, slot, ptr]
                    self.op(Opcode::swap(1), span); // [slot, ptr, slot]
                    self.call_utility(Utility::ByteStringStore, 2, 0, span);
                    return;
                }
                _ => {}
            }
        }

        if let Some(op) = assign.op.binary_op() {
            // compound: read, combine, write
            self.emit_expr(&assign.lhs); // [l]
            self.emit_expr(&assign.rhs); // [l, r]
            let signed = self.is_signed(assign.lhs.id());
            let (opcode, swap) = match (op, signed) {
                (BinaryOp::Add, _) => (Opcode::Add, false),
                (BinaryOp::Mul, _) => (Opcode::Mul, false),
                (BinaryOp::Sub, _) => (Opcode::Sub, true),
                (BinaryOp::Div, false) => (Opcode::Div, true),
                (BinaryOp::Div, true) => (Opcode::Sdiv, true),
                (BinaryOp::Mod, false) => (Opcode::Mod, true),
                (BinaryOp::Mod, true) => (Opcode::Smod, true),
                (BinaryOp::BitAnd, _) => (Opcode::And, false),
                (BinaryOp::BitOr, _) => (Opcode::Or, false),
                (BinaryOp::BitXor, _) => (Opcode::Xor, false),
                (BinaryOp::Shl, _) => (Opcode::Shl, false),
                (BinaryOp::Shr, _) => (Opcode::Shr, false),
                _ => (Opcode::Add, false),
            };
            if swap {
                self.op(Opcode::swap(1), span);
            }
            self.op(opcode, span);
        } else {
            self.emit_expr(&assign.rhs);
        }

        // keep the assigned value as the expression result
        self.op(Opcode::Dup1, span);
        let dest = self.emit_dest(&assign.lhs);
        self.store_to(dest, span);
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn emit_call(&mut self, call: &FunctionCallExpression) {
        let span = call.span;
        match self.analysis.call_targets.get(&call.id).cloned() {
            Some(CallTarget::Function {
                id,
                is_virtual,
                is_super,
            }) => self.emit_internal_call(id, is_virtual, is_super, &call.args, span),
            Some(CallTarget::Builtin(builtin)) => self.emit_builtin(call, builtin),
            Some(CallTarget::TypeCast(target)) => {
                self.emit_expr(&call.args[0]);
                self.emit_cast(self.expr_type(call.args[0].id()), target, span);
            }
            Some(CallTarget::StructConstructor(decl)) => {
                self.emit_struct_constructor(call, decl)
            }
            Some(CallTarget::External { function }) => self.emit_external_call(call, function),
            Some(CallTarget::Bound { function }) => {
                let Expression::MemberAccess(access) = call.callee.as_ref() else {
                    self.unsupported("this bound call shape", span);
                    return;
                };
                self.emit_bound_call(function, &access.expr, &call.args, span);
            }
            Some(CallTarget::ContractCreation(child)) => self.emit_creation(call, child),
            Some(CallTarget::Event(_)) => {
                // events only appear under `emit`, which lowers them itself
                self.unsupported("event call outside emit", span)
            }
            Some(CallTarget::Getter { .. }) => {
                self.unsupported("static call of a getter", span)
            }
            None => self.unsupported("this call", span),
        }
    }

    /// Explicit conversion of the value on top of the stack.
    fn emit_cast(&mut self, from: TypeId, to: TypeId, span: Span) {
        let from_ty = self.analysis.provider.get(from).clone();
        let to_ty = self.analysis.provider.get(to).clone();
        match to_ty {
            Type::Int {
                bits,
                signed: false,
            } if bits < 256 => {
                let mask = (BigUint::one() << u32::from(bits)) - BigUint::one();
                self.push(mask, span);
                self.op(Opcode::And, span);
            }
            Type::Int { bits, signed: true } if bits < 256 => {
                // sign-extend from the target width
                self.push((bits / 8 - 1) as u64, span);
                self.op(Opcode::Signextend, span);
            }
            Type::Address { .. } => {
                if !matches!(from_ty, Type::Contract { .. } | Type::Address { .. }) {
                    let mask = (BigUint::one() << 160u32) - BigUint::one();
                    self.push(mask, span);
                    self.op(Opcode::And, span);
                }
            }
            Type::FixedBytes(width) if width < 32 => {
                if matches!(from_ty, Type::FixedBytes(_)) {
                    let ones = (BigUint::one() << (u32::from(width) * 8)) - BigUint::one();
                    let mask = ones << (256 - u32::from(width) * 8);
                    self.push(mask, span);
                    self.op(Opcode::And, span);
                }
                // integer sources are already right-aligned; the checker
                // only admits exact-width conversions
            }
            _ => {}
        }
    }

    fn emit_builtin(&mut self, call: &FunctionCallExpression, builtin: Builtin) {
        let span = call.span;
        match builtin {
            Builtin::Require | Builtin::Assert => {
                let ok = self.asm.new_label();
                self.emit_expr(&call.args[0]);
                self.push_label(ok, span);
                self.op(Opcode::Jumpi, span);
                if builtin == Builtin::Assert {
                    self.op(Opcode::Invalid, span);
                } else {
                    self.emit_revert_with_message(call.args.get(1), span);
                }
                self.define_label(ok, span);
            }
            Builtin::Revert => {
                self.emit_revert_with_message(call.args.first(), span);
                self.mark_diverged();
            }
            Builtin::Keccak256 => {
                self.emit_expr(&call.args[0]); // [ptr]
                self.op(Opcode::Dup1, span);
                self.op(Opcode::Mload, span); // [ptr, len]
                self.op(Opcode::swap(1), span);
                self.push(32u8, span);
                self.op(Opcode::Add, span); // [len, data]
                self.op(Opcode::Keccak256, span);
            }
            Builtin::Addmod | Builtin::Mulmod => {
                // (a op b) % m pops a from the top
                self.emit_expr(&call.args[2]);
                self.emit_expr(&call.args[1]);
                self.emit_expr(&call.args[0]);
                let opcode = if builtin == Builtin::Addmod {
                    Opcode::Addmod
                } else {
                    Opcode::Mulmod
                };
                self.op(opcode, span);
            }
        }
    }

    /// Revert, optionally ABI-encoding a reason string as `Error(string)`.
    pub fn emit_revert_with_message(&mut self, message: Option<&Expression>, span: Span) {
        let message = if self.strip_revert_strings {
            None
        } else {
            message
        };
        let text = message.and_then(|expr| match expr {
            Expression::Literal(Literal {
                kind: LiteralKind::String(text),
                ..
            }) => Some(text.clone()),
            _ => None,
        });
        match text {
            Some(text) if !text.is_empty() => {
                let payload = text.into_bytes();
                let padded = (payload.len() + 31) / 32 * 32;
                let total = 4 + 32 + 32 + padded;
                self.push(total as u64, span);
                self.call_utility(Utility::Alloc, 1, 1, span); // [ptr]
                // Error(string) selector
                let selector = BigUint::from(0x08c379a0u32) << 224u32;
                self.push(selector, span);
                self.op(Opcode::Dup2, span);
                self.op(Opcode::Mstore, span);
                self.push(0x20u8, span);
                self.op(Opcode::Dup2, span);
                self.push(4u8, span);
                self.op(Opcode::Add, span);
                self.op(Opcode::Mstore, span);
                self.push(payload.len() as u64, span);
                self.op(Opcode::Dup2, span);
                self.push(36u8, span);
                self.op(Opcode::Add, span);
                self.op(Opcode::Mstore, span);
                for (word_index, chunk) in payload.chunks(32).enumerate() {
                    let mut word = [0u8; 32];
                    word[..chunk.len()].copy_from_slice(chunk);
                    self.push(BigUint::from_bytes_be(&word), span);
                    self.op(Opcode::Dup2, span);
                    self.push((68 + 32 * word_index) as u64, span);
                    self.op(Opcode::Add, span);
                    self.op(Opcode::Mstore, span);
                }
                // [ptr] → revert(ptr, total)
                self.push(total as u64, span);
                self.op(Opcode::swap(1), span);
                self.op(Opcode::Revert, span);
            }
            _ => {
                self.push(0u8, span);
                self.push(0u8, span);
                self.op(Opcode::Revert, span);
            }
        }
    }

    fn emit_struct_constructor(&mut self, call: &FunctionCallExpression, decl: NodeId) {
        let span = call.span;
        let field_count = self.analysis.provider.struct_fields(decl).len();
        self.push((32 * field_count) as u64, span);
        self.call_utility(Utility::Alloc, 1, 1, span); // [ptr]
        for (index, arg) in call.args.iter().enumerate() {
            self.emit_expr(arg); // [ptr, v]
            self.op(Opcode::Dup2, span);
            if index > 0 {
                self.push((32 * index) as u64, span);
                self.op(Opcode::Add, span);
            }
            self.op(Opcode::Mstore, span); // [ptr]
        }
    }

    /// External message call with word-encoded value-type arguments.
    fn emit_external_call(&mut self, call: &FunctionCallExpression, function: NodeId) {
        let span = call.span;
        let Some(sig) = self.analysis.functions.get(&function).cloned() else {
            return;
        };
        let Some(signature) = sig.external_signature(&self.analysis.provider) else {
            self.unsupported("external call with non-ABI types", span);
            return;
        };
        for param in sig.params.iter().chain(&sig.returns) {
            if !self.analysis.provider.get(*param).is_value_type() {
                self.unsupported("reference types in external calls", span);
                return;
            }
        }
        let selector = vela_checker::selector(&signature);
        let args = sig.params.len();
        let rets = sig.returns.len();
        let in_size = 4 + 32 * args;
        let out_size = 32 * rets;
        let is_static = matches!(sig.mutability, Mutability::View | Mutability::Pure);

        let Expression::MemberAccess(access) = call.callee.as_ref() else {
            self.unsupported("this external call shape", span);
            return;
        };
        self.emit_expr(&access.expr); // [addr]
        self.push((in_size.max(out_size)) as u64, span);
        self.call_utility(Utility::Alloc, 1, 1, span); // [addr, ptr]

        let selector_word = BigUint::from(u32::from_be_bytes(selector)) << 224u32;
        self.push(selector_word, span);
        self.op(Opcode::Dup2, span);
        self.op(Opcode::Mstore, span); // [addr, ptr]
        for (index, arg) in call.args.iter().enumerate() {
            self.emit_expr(arg); // [addr, ptr, v]
            self.op(Opcode::Dup2, span);
            self.push((4 + 32 * index) as u64, span);
            self.op(Opcode::Add, span);
            self.op(Opcode::Mstore, span); // [addr, ptr]
        }

        // call(gas, addr, [value,] in, insize, out, outsize)
        self.push(out_size as u64, span); // [addr, ptr, outsize]
        self.op(Opcode::Dup2, span); // [.., out=ptr]
        self.push(in_size as u64, span); // [.., insize]
        self.op(Opcode::dup(4), span); // [.., in=ptr]
        if is_static {
            self.op(Opcode::dup(6), span); // [.., addr]
            self.op(Opcode::Gas, span);
            self.op(Opcode::Staticcall, span);
        } else {
            self.push(0u8, span); // value
            self.op(Opcode::dup(7), span); // [.., addr]
            self.op(Opcode::Gas, span);
            self.op(Opcode::Call, span);
        }
        // [addr, ptr, success]
        self.panic_if_zero(span); // [addr, ptr]
        self.op(Opcode::swap(1), span);
        self.op(Opcode::Pop, span); // [ptr]

        for index in 0..rets {
            let depth = (index + 1) as u8;
            self.op(Opcode::dup(depth), span); // ptr
            if index > 0 {
                self.push((32 * index) as u64, span);
                self.op(Opcode::Add, span);
            }
            self.op(Opcode::Mload, span); // [ptr, v0..vi]
        }
        // drop the pointer below the results
        for depth in 1..=rets as u8 {
            self.op(Opcode::swap(depth), span);
        }
        self.op(Opcode::Pop, span); // [v0..]
    }

    /// `new C(args)`: copy the child's creation code into memory, append the
    /// constructor arguments, `CREATE`.
    fn emit_creation(&mut self, call: &FunctionCallExpression, child: NodeId) {
        let span = call.span;
        let Some(&sub) = self.children.get(&child) else {
            self.unsupported("creation of this contract (cyclic 'new'?)", span);
            return;
        };
        let args = call.args.len();
        for arg in &call.args {
            let ty = self.expr_type(arg.id());
            if !self.analysis.provider.get(ty).is_value_type() {
                self.unsupported("reference types in constructor calls", span);
                return;
            }
        }

        self.asm
            .append(vela_asm::Item::new(ItemKind::PushSubSize(sub), span));
        self.set_height(self.height() + 1); // [size]
        self.op(Opcode::Dup1, span);
        self.push((32 * args) as u64, span);
        self.op(Opcode::Add, span); // [size, total]
        self.call_utility(Utility::Alloc, 1, 1, span); // [size, ptr]
        self.op(Opcode::Dup2, span); // [size, ptr, size]
        self.asm
            .append(vela_asm::Item::new(ItemKind::PushSubOffset(sub), span));
        self.set_height(self.height() + 1); // [.., off]
        self.op(Opcode::Dup3, span); // [.., off, ptr]
        self.op(Opcode::Codecopy, span); // [size, ptr]
        for (index, arg) in call.args.iter().enumerate() {
            self.emit_expr(arg); // [size, ptr, v]
            self.op(Opcode::Dup3, span); // size
            self.op(Opcode::Dup3, span); // ptr
            self.op(Opcode::Add, span); // [.., v, ptr+size]
            if index > 0 {
                self.push((32 * index) as u64, span);
                self.op(Opcode::Add, span);
            }
            self.op(Opcode::Mstore, span); // [size, ptr]
        }
        self.op(Opcode::swap(1), span); // [ptr, size]
        self.push((32 * args) as u64, span);
        self.op(Opcode::Add, span); // [ptr, total]
        self.op(Opcode::swap(1), span); // [total, ptr]
        self.push(0u8, span); // value
        self.op(Opcode::Create, span); // [address]
        self.op(Opcode::Dup1, span);
        self.panic_if_zero(span);
    }
}
