//! Phases B and C: reference resolution and type checking.
//!
//! A post-order walk over every function and modifier body. Identifiers
//! resolve against the innermost containing scope outward, then the contract
//! lattice, then the built-in namespace; every expression node's annotation
//! is filled with its inferred type, value category and purity. Overload
//! selection matches argument types against each candidate's parameters
//! under the implicit-conversion rules.

use crate::analysis::{Analysis, Builtin, CallTarget, Category, ExprInfo, Target};
use crate::binder::{Binder, Bindings, MemberKind};
use crate::diagnostics::{Diagnostic, Diagnostics};
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use rustc_hash::{FxHashMap, FxHashSet};
use vela_parser::ast::{self, *};
use vela_parser::Span;
use vela_types::{
    common_type, implicitly_convertible, mobile_type, CallableKind, MagicKind, Type, TypeId,
};

/// Check every function and modifier body of every contract.
pub fn check(
    units: &[SourceUnit],
    analysis: &mut Analysis,
    bindings: &Bindings,
    diagnostics: &mut Diagnostics,
) {
    for (file, unit) in units.iter().enumerate() {
        for contract in unit.contracts() {
            if !analysis.contracts.contains_key(&contract.id) {
                continue;
            }
            let mut checker = Checker {
                analysis: &mut *analysis,
                bindings,
                diagnostics: &mut *diagnostics,
                file,
                contract: contract.id,
                scopes: Vec::new(),
                loop_depth: 0,
                in_modifier: false,
                returns: Vec::new(),
                observed: StateMutability::Pure,
            };
            checker.check_contract(contract);
        }
    }
}

struct LocalVar {
    decl: NodeId,
    span: Span,
}

struct Checker<'a> {
    analysis: &'a mut Analysis,
    bindings: &'a Bindings,
    diagnostics: &'a mut Diagnostics,
    file: usize,
    contract: NodeId,
    scopes: Vec<FxHashMap<String, LocalVar>>,
    loop_depth: usize,
    in_modifier: bool,
    /// Return types of the function being checked
    returns: Vec<TypeId>,
    /// The least restrictive state access observed in the current body
    observed: StateMutability,
}

impl<'a> Checker<'a> {
    fn check_contract(&mut self, contract: &ContractDef) {
        for item in &contract.items {
            match item {
                ContractItem::StateVar(var) => self.check_state_var(var),
                ContractItem::Function(func) => self.check_function(contract, func),
                ContractItem::Modifier(def) => self.check_modifier(def),
                _ => {}
            }
        }
    }

    fn check_state_var(&mut self, var: &StateVarDecl) {
        let Some(info) = self.analysis.state_vars.get(&var.id) else {
            return;
        };
        let declared = info.ty;
        if let Some(init) = &var.initializer {
            let actual = self.check_expr(init);
            self.require_convertible(actual, declared, init.span());
            if var.is_constant && !self.is_constant_expr(init) {
                self.error(
                    "E3031",
                    "initializer of a constant must be a compile-time constant",
                    init.span(),
                    "not constant",
                );
            }
        } else if var.is_constant {
            self.error(
                "E3031",
                "constant state variable must have an initializer",
                var.span,
                "missing initializer",
            );
        }
    }

    fn check_function(&mut self, contract: &ContractDef, func: &FunctionDef) {
        let Some(sig) = self.analysis.functions.get(&func.id).cloned() else {
            return;
        };
        self.returns = sig.returns.clone();
        self.observed = StateMutability::Pure;
        self.scopes.clear();
        self.push_scope();

        for param in func.params.iter().chain(&func.returns) {
            if let Some(name) = &param.name {
                self.define_local(name, param.id);
            }
        }

        // modifier invocations double as base-constructor arguments
        for invocation in &func.invocations {
            self.check_modifier_invocation(invocation);
        }

        if let Some(body) = &func.body {
            self.check_block(body);
        }

        self.pop_scope();

        // mutability legality: a pure function must not read state, a view
        // function must not write it
        if self.observed.restrictiveness() < sig.mutability.restrictiveness()
            && func.body.is_some()
            && !contract.is_library()
        {
            let verb = match self.observed {
                StateMutability::View => "reads contract state",
                _ => "modifies contract state",
            };
            self.error(
                "E3030",
                format!("function declared {} {}", sig.mutability, verb),
                sig.span,
                "mutability too strict",
            );
        }
    }

    fn check_modifier(&mut self, def: &ModifierDef) {
        self.returns = Vec::new();
        self.observed = StateMutability::Pure;
        self.scopes.clear();
        self.push_scope();
        self.in_modifier = true;
        for param in &def.params {
            if let Some(name) = &param.name {
                self.define_local(name, param.id);
            }
        }
        self.check_block(&def.body);
        self.in_modifier = false;
        self.pop_scope();
    }

    fn check_modifier_invocation(&mut self, invocation: &ModifierInvocation) {
        let name = invocation.name.dotted();

        // a base contract name means base-constructor arguments
        if let Some(&base) = self.bindings.global_contracts.get(&name) {
            self.analysis
                .resolved
                .insert(invocation.id, Target::TypeLike(base));
            if let Some(args) = &invocation.args {
                let arg_types: Vec<TypeId> =
                    args.iter().map(|arg| self.check_expr(arg)).collect();
                let ctor_params = self.base_constructor_params(base);
                if let Some(params) = ctor_params {
                    self.check_argument_list(&arg_types, &params, invocation.span);
                }
            }
            return;
        }

        let members = self
            .bindings
            .lookup_member(self.analysis, self.contract, &name);
        let modifier = members
            .iter()
            .find(|decl| decl.kind == MemberKind::Modifier)
            .map(|decl| decl.id);
        match modifier {
            Some(id) => {
                self.analysis
                    .resolved
                    .insert(invocation.id, Target::Modifier(id));
                let params = self
                    .analysis
                    .modifiers
                    .get(&id)
                    .map(|sig| sig.params.clone())
                    .unwrap_or_default();
                let arg_types: Vec<TypeId> = invocation
                    .args
                    .as_deref()
                    .unwrap_or(&[])
                    .iter()
                    .map(|arg| self.check_expr(arg))
                    .collect();
                self.check_argument_list(&arg_types, &params, invocation.span);
            }
            None => self.error(
                "E2003",
                format!("modifier '{}' not found", name),
                invocation.name.span,
                "unknown modifier",
            ),
        }
    }

    fn base_constructor_params(&mut self, base: NodeId) -> Option<Vec<TypeId>> {
        let info = self.analysis.contracts.get(&base)?;
        for func in &info.functions {
            let sig = self.analysis.functions.get(func)?;
            if sig.kind == FunctionKind::Constructor {
                return Some(sig.params.clone());
            }
        }
        Some(Vec::new())
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn check_block(&mut self, block: &Block) {
        self.push_scope();
        for statement in &block.statements {
            self.check_statement(statement);
        }
        self.pop_scope();
    }

    fn check_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Block(block) => self.check_block(block),
            Statement::VariableDecl(decl) => self.check_local_decl(decl),
            Statement::Expression(stmt) => {
                self.check_expr(&stmt.expression);
            }
            Statement::If(stmt) => {
                self.require_bool(&stmt.condition);
                self.check_statement(&stmt.then_branch);
                if let Some(else_branch) = &stmt.else_branch {
                    self.check_statement(else_branch);
                }
            }
            Statement::While(stmt) => {
                self.require_bool(&stmt.condition);
                self.loop_depth += 1;
                self.check_statement(&stmt.body);
                self.loop_depth -= 1;
            }
            Statement::DoWhile(stmt) => {
                self.loop_depth += 1;
                self.check_statement(&stmt.body);
                self.loop_depth -= 1;
                self.require_bool(&stmt.condition);
            }
            Statement::For(stmt) => {
                self.push_scope();
                if let Some(init) = &stmt.init {
                    self.check_statement(init);
                }
                if let Some(condition) = &stmt.condition {
                    self.require_bool(condition);
                }
                if let Some(update) = &stmt.update {
                    self.check_expr(update);
                }
                self.loop_depth += 1;
                self.check_statement(&stmt.body);
                self.loop_depth -= 1;
                self.pop_scope();
            }
            Statement::Break(stmt) => {
                if self.loop_depth == 0 {
                    self.error("E3017", "'break' outside a loop", stmt.span, "not in a loop");
                }
            }
            Statement::Continue(stmt) => {
                if self.loop_depth == 0 {
                    self.error(
                        "E3018",
                        "'continue' outside a loop",
                        stmt.span,
                        "not in a loop",
                    );
                }
            }
            Statement::Return(stmt) => self.check_return(stmt),
            Statement::Emit(stmt) => self.check_emit(stmt),
            Statement::Placeholder(stmt) => {
                if !self.in_modifier {
                    self.error(
                        "E3032",
                        "'_' is only allowed inside a modifier body",
                        stmt.span,
                        "placeholder outside modifier",
                    );
                }
            }
            Statement::Assembly(_) => {
                // opaque; the recorded text flows through to the assembler
                self.observe(StateMutability::NonPayable);
            }
        }
    }

    fn check_local_decl(&mut self, stmt: &VariableDeclStatement) {
        let location = stmt.decl.location.unwrap_or(DataLocation::Memory);
        let ty = Binder::resolve_type(
            self.analysis,
            self.bindings,
            self.diagnostics,
            self.file,
            Some(self.contract),
            &stmt.decl.type_name,
            location,
        );
        self.analysis.locals.insert(stmt.decl.id, ty);
        if let Some(name) = &stmt.decl.name {
            self.define_local(name, stmt.decl.id);
        }
        if let Some(init) = &stmt.initializer {
            let actual = self.check_expr(init);
            self.require_convertible(actual, ty, init.span());
        }
    }

    fn check_return(&mut self, stmt: &ReturnStatement) {
        match (&stmt.value, self.returns.len()) {
            (None, 0) => {}
            (None, _) => {
                // allowed when every return value is named and thus
                // assignable in the body; the emitter reads them off the
                // stack either way
            }
            (Some(value), 0) => {
                self.check_expr(value);
                self.error(
                    "E3019",
                    "function does not return a value",
                    value.span(),
                    "unexpected return value",
                );
            }
            (Some(value), 1) => {
                let actual = self.check_expr(value);
                let expected = self.returns[0];
                self.require_convertible(actual, expected, value.span());
            }
            (Some(value), n) => {
                let actual = self.check_expr(value);
                let expected = self.returns.clone();
                match self.analysis.provider.get(actual).clone() {
                    Type::Tuple(components) if components.len() == n => {
                        for (component, target) in components.iter().zip(&expected) {
                            self.require_convertible(*component, *target, value.span());
                        }
                    }
                    _ => self.error(
                        "E3019",
                        format!("expected {} return values", n),
                        value.span(),
                        "wrong number of return values",
                    ),
                }
            }
        }
    }

    fn check_emit(&mut self, stmt: &EmitStatement) {
        self.observe(StateMutability::NonPayable);
        let Expression::FunctionCall(call) = &stmt.call else {
            return;
        };
        // the callee must name an event of this contract's lattice
        let event = match call.callee.as_ref() {
            Expression::Identifier(ident) => self
                .bindings
                .lookup_member(self.analysis, self.contract, &ident.name)
                .into_iter()
                .find(|decl| decl.kind == MemberKind::Event)
                .map(|decl| decl.id),
            _ => None,
        };
        let Some(event) = event else {
            self.error(
                "E3029",
                "emit requires an event of the current contract",
                call.callee.span(),
                "not an event",
            );
            return;
        };
        self.analysis
            .call_targets
            .insert(call.id, CallTarget::Event(event));
        self.analysis
            .resolved
            .insert(call.callee.id(), Target::Event(event));
        let params = self
            .analysis
            .events
            .get(&event)
            .map(|sig| sig.params.clone())
            .unwrap_or_default();
        let arg_types: Vec<TypeId> = call.args.iter().map(|arg| self.check_expr(arg)).collect();
        self.check_argument_list(&arg_types, &params, call.span);
        let void = self.analysis.provider.tuple(vec![]);
        self.note_expr(call.id, void, Category::RValue, false, false);
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn check_expr(&mut self, expr: &Expression) -> TypeId {
        let ty = match expr {
            Expression::Literal(literal) => self.check_literal(literal),
            Expression::Identifier(ident) => self.check_identifier(ident),
            Expression::ElementaryTypeName(node) => {
                let actual = match node.ty {
                    ElementaryType::Bool => self.analysis.provider.bool_type(),
                    ElementaryType::Address { payable } => self.analysis.provider.address(payable),
                    ElementaryType::Uint(bits) => self.analysis.provider.uint(bits),
                    ElementaryType::Int(bits) => self.analysis.provider.int(bits),
                    ElementaryType::FixedBytes(width) => {
                        self.analysis.provider.fixed_bytes(width)
                    }
                    ElementaryType::Bytes => self.analysis.provider.bytes(DataLocation::Memory),
                    ElementaryType::String => self.analysis.provider.string(DataLocation::Memory),
                };
                let ty = self.analysis.provider.type_type(actual);
                self.note_expr(node.id, ty, Category::RValue, true, true);
                return ty;
            }
            Expression::Tuple(tuple) => self.check_tuple(tuple),
            Expression::Unary(unary) => self.check_unary(unary),
            Expression::Binary(binary) => self.check_binary(binary),
            Expression::Conditional(cond) => self.check_conditional(cond),
            Expression::Assignment(assign) => self.check_assignment(assign),
            Expression::MemberAccess(access) => self.check_member_access(access),
            Expression::IndexAccess(access) => self.check_index_access(access),
            Expression::FunctionCall(call) => self.check_call(call),
            Expression::New(new) => {
                self.error(
                    "E3028",
                    "'new' must be called immediately",
                    new.span,
                    "missing constructor arguments",
                );
                self.error_expr(new.id)
            }
        };
        ty
    }

    fn check_literal(&mut self, literal: &Literal) -> TypeId {
        match &literal.kind {
            LiteralKind::Number(text) => match parse_number(text) {
                Some(value) => {
                    let ty = self.analysis.provider.int_literal(value);
                    self.note_expr(literal.id, ty, Category::RValue, true, true);
                    ty
                }
                None => {
                    self.error(
                        "E3020",
                        format!("'{}' is not a valid integer literal", text),
                        literal.span,
                        "invalid literal",
                    );
                    self.error_expr(literal.id)
                }
            },
            LiteralKind::Bool(_) => {
                let ty = self.analysis.provider.bool_type();
                self.note_expr(literal.id, ty, Category::RValue, true, true);
                ty
            }
            LiteralKind::String(text) => {
                let ty = self.analysis.provider.string_literal(text.clone());
                self.note_expr(literal.id, ty, Category::RValue, true, true);
                ty
            }
        }
    }

    fn check_identifier(&mut self, ident: &IdentifierExpression) -> TypeId {
        // innermost scope outward
        for scope in self.scopes.iter().rev() {
            if let Some(local) = scope.get(&ident.name) {
                let decl = local.decl;
                self.analysis
                    .resolved
                    .insert(ident.id, Target::Variable(decl));
                let ty = self
                    .analysis
                    .locals
                    .get(&decl)
                    .copied()
                    .unwrap_or(self.analysis.error_type);
                self.note_expr(ident.id, ty, Category::LValue, true, false);
                return ty;
            }
        }

        // contract lattice members
        let members = self
            .bindings
            .lookup_member(self.analysis, self.contract, &ident.name);
        if !members.is_empty() {
            // state variable?
            if let Some(var) = members
                .iter()
                .find(|decl| decl.kind == MemberKind::StateVar)
            {
                let id = var.id;
                self.analysis.resolved.insert(ident.id, Target::StateVar(id));
                let (ty, constant) = self
                    .analysis
                    .state_vars
                    .get(&id)
                    .map(|info| (info.ty, info.is_constant))
                    .unwrap_or((self.analysis.error_type, false));
                if !constant {
                    self.observe(StateMutability::View);
                }
                self.note_expr(ident.id, ty, Category::LValue, false, constant);
                return ty;
            }
            // overloadable function set, most-derived first, deduplicated by
            // signature
            let functions = self.function_set(&members);
            if !functions.is_empty() {
                let ty = self.function_set_type(&functions);
                self.analysis
                    .resolved
                    .insert(ident.id, Target::Functions(functions));
                self.note_expr(ident.id, ty, Category::RValue, true, false);
                return ty;
            }
            if let Some(event) = members.iter().find(|decl| decl.kind == MemberKind::Event) {
                self.analysis
                    .resolved
                    .insert(ident.id, Target::Event(event.id));
                return self.error_expr(ident.id);
            }
            if let Some(type_like) = members
                .iter()
                .find(|decl| matches!(decl.kind, MemberKind::Struct | MemberKind::Enum))
            {
                return self.type_like_expr(ident.id, type_like.id, type_like.kind);
            }
        }

        // global contract names
        if let Some(&decl) = self.bindings.global_contracts.get(&ident.name) {
            self.analysis
                .resolved
                .insert(ident.id, Target::TypeLike(decl));
            let (name, is_library) = self
                .analysis
                .contracts
                .get(&decl)
                .map(|info| (info.name.clone(), info.kind == ContractKind::Library))
                .unwrap_or_default();
            let actual = self.analysis.provider.intern(Type::Contract {
                decl,
                name,
                is_library,
            });
            let ty = self.analysis.provider.type_type(actual);
            self.note_expr(ident.id, ty, Category::RValue, true, true);
            return ty;
        }

        // built-ins
        match ident.name.as_str() {
            "this" => {
                let (name, is_library) = self
                    .analysis
                    .contracts
                    .get(&self.contract)
                    .map(|info| (info.name.clone(), info.kind == ContractKind::Library))
                    .unwrap_or_default();
                let ty = self.analysis.provider.intern(Type::Contract {
                    decl: self.contract,
                    name,
                    is_library,
                });
                self.analysis.resolved.insert(ident.id, Target::This);
                self.observe(StateMutability::View);
                self.note_expr(ident.id, ty, Category::RValue, false, false);
                ty
            }
            "super" => {
                self.analysis.resolved.insert(ident.id, Target::Super);
                self.error_expr(ident.id)
            }
            "msg" => self.magic_expr(ident.id, MagicKind::Msg),
            "block" => self.magic_expr(ident.id, MagicKind::Block),
            "tx" => self.magic_expr(ident.id, MagicKind::Tx),
            "require" => self.builtin_expr(ident.id, Builtin::Require),
            "assert" => self.builtin_expr(ident.id, Builtin::Assert),
            "revert" => self.builtin_expr(ident.id, Builtin::Revert),
            "keccak256" => self.builtin_expr(ident.id, Builtin::Keccak256),
            "addmod" => self.builtin_expr(ident.id, Builtin::Addmod),
            "mulmod" => self.builtin_expr(ident.id, Builtin::Mulmod),
            _ => {
                self.error(
                    "E2002",
                    format!("undeclared identifier '{}'", ident.name),
                    ident.span,
                    "not found in this scope",
                );
                self.error_expr(ident.id)
            }
        }
    }

    fn magic_expr(&mut self, id: NodeId, kind: MagicKind) -> TypeId {
        let ty = self.analysis.provider.magic(kind);
        self.observe(StateMutability::View);
        self.note_expr(id, ty, Category::RValue, false, false);
        ty
    }

    fn builtin_expr(&mut self, id: NodeId, builtin: Builtin) -> TypeId {
        self.analysis.resolved.insert(id, Target::Builtin(builtin));
        self.error_expr(id)
    }

    fn type_like_expr(&mut self, id: NodeId, decl: NodeId, kind: MemberKind) -> TypeId {
        self.analysis.resolved.insert(id, Target::TypeLike(decl));
        let actual = match kind {
            MemberKind::Struct => {
                let name = self
                    .analysis
                    .structs
                    .get(&decl)
                    .map(|info| info.name.clone())
                    .unwrap_or_default();
                self.analysis.provider.intern(Type::Struct {
                    decl,
                    name,
                    location: DataLocation::Memory,
                })
            }
            _ => {
                let (name, count) = self
                    .analysis
                    .enums
                    .get(&decl)
                    .map(|info| (info.name.clone(), info.variants.len() as u16))
                    .unwrap_or_default();
                self.analysis.provider.intern(Type::Enum {
                    decl,
                    name,
                    variant_count: count,
                })
            }
        };
        let ty = self.analysis.provider.type_type(actual);
        self.note_expr(id, ty, Category::RValue, true, true);
        ty
    }

    /// Library functions attached to `base` by a `using` directive of this
    /// contract's lattice; the receiver must fit the first parameter.
    /// Annotates the access and returns its type when anything matches.
    fn try_using_for(
        &mut self,
        access: &MemberAccessExpression,
        base: TypeId,
    ) -> Option<TypeId> {
        let member = access.member.name.as_str();
        let linearized = self
            .analysis
            .contracts
            .get(&self.contract)?
            .linearized
            .clone();

        let mut candidates: Vec<NodeId> = Vec::new();
        for contract in linearized {
            let entries = match self.analysis.contracts.get(&contract) {
                Some(info) => info.using_for.clone(),
                None => continue,
            };
            for (library, target) in entries {
                let applies = match target {
                    None => true,
                    Some(bound) => self.using_type_matches(bound, base),
                };
                if !applies {
                    continue;
                }
                for decl in self.bindings.lookup_member(self.analysis, library, member) {
                    if decl.kind != MemberKind::Function {
                        continue;
                    }
                    let receiver_fits = self
                        .analysis
                        .functions
                        .get(&decl.id)
                        .and_then(|sig| sig.params.first().copied())
                        .map(|first| implicitly_convertible(&self.analysis.provider, base, first))
                        .unwrap_or(false);
                    if receiver_fits && !candidates.contains(&decl.id) {
                        candidates.push(decl.id);
                    }
                }
            }
        }
        if candidates.is_empty() {
            return None;
        }

        let ty = self.function_set_type(&candidates);
        self.analysis
            .resolved
            .insert(access.id, Target::BoundFunctions(candidates));
        self.note_expr(access.id, ty, Category::RValue, false, false);
        Some(ty)
    }

    /// `using` binds by type, ignoring the data location of reference types.
    fn using_type_matches(&mut self, bound: TypeId, actual: TypeId) -> bool {
        if bound == actual {
            return true;
        }
        let bound = self.relocate(bound, DataLocation::Memory);
        let actual = self.relocate(actual, DataLocation::Memory);
        bound == actual
    }

    /// Overload selection and classification for a `using`-bound call; the
    /// receiver is the implicit first argument.
    fn check_bound_call(
        &mut self,
        call: &FunctionCallExpression,
        candidates: &[NodeId],
        args: &[TypeId],
    ) -> TypeId {
        let mut matching = Vec::new();
        for candidate in candidates {
            let Some(sig) = self.analysis.functions.get(candidate) else {
                continue;
            };
            if sig.params.len() != args.len() {
                continue;
            }
            let fits = sig
                .params
                .iter()
                .zip(args)
                .all(|(param, arg)| {
                    implicitly_convertible(&self.analysis.provider, *arg, *param)
                });
            if fits {
                matching.push(*candidate);
            }
        }
        let selected = match matching.len() {
            0 => {
                self.error(
                    "E3026",
                    "no matching declaration found for this call",
                    call.span,
                    "no viable overload",
                );
                return self.error_expr(call.id);
            }
            1 => matching[0],
            _ => {
                self.error(
                    "E3027",
                    "call is ambiguous between several matching overloads",
                    call.span,
                    "ambiguous call",
                );
                return self.error_expr(call.id);
            }
        };

        let sig = self
            .analysis
            .functions
            .get(&selected)
            .cloned()
            .expect("selected overload exists");
        let observed = if sig.mutability == StateMutability::Payable {
            StateMutability::NonPayable
        } else {
            sig.mutability
        };
        self.observe(observed);
        self.analysis
            .call_targets
            .insert(call.id, CallTarget::Bound { function: selected });

        let result = match sig.returns.len() {
            0 => self.analysis.provider.tuple(vec![]),
            1 => sig.returns[0],
            _ => self.analysis.provider.tuple(sig.returns.clone()),
        };
        self.note_expr(call.id, result, Category::RValue, false, false);
        result
    }

    /// Deduplicated overload set: most-derived definition per signature.
    fn function_set(&self, members: &[crate::binder::MemberDecl]) -> Vec<NodeId> {
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut set = Vec::new();
        for member in members {
            if member.kind != MemberKind::Function && member.kind != MemberKind::StateVar {
                continue;
            }
            if !self.analysis.functions.contains_key(&member.id) {
                continue;
            }
            let key = Binder::signature_key_for(self.analysis, member.id);
            if seen.insert(key) {
                set.push(member.id);
            }
        }
        set
    }

    fn function_set_type(&mut self, functions: &[NodeId]) -> TypeId {
        if functions.len() == 1 {
            if let Some(sig) = self.analysis.functions.get(&functions[0]).cloned() {
                return self.analysis.provider.function(
                    sig.params,
                    sig.returns,
                    CallableKind::Internal,
                    sig.mutability,
                );
            }
        }
        // the type of an unapplied overload set only matters when misused;
        // calls disambiguate by argument types
        self.analysis.provider.error_type()
    }

    fn check_tuple(&mut self, tuple: &TupleExpression) -> TypeId {
        let mut components = Vec::with_capacity(tuple.components.len());
        let mut lvalue = !tuple.components.is_empty();
        let mut pure = true;
        for component in &tuple.components {
            let ty = self.check_expr(component);
            components.push(ty);
            let info = self.analysis.expr_info.get(&component.id());
            lvalue &= info.map(|i| i.category == Category::LValue).unwrap_or(false);
            pure &= info.map(|i| i.is_pure).unwrap_or(false);
        }
        let ty = self.analysis.provider.tuple(components);
        let category = if lvalue {
            Category::LValue
        } else {
            Category::RValue
        };
        self.note_expr(tuple.id, ty, category, pure, false);
        ty
    }

    fn check_unary(&mut self, unary: &UnaryExpression) -> TypeId {
        let operand = self.check_expr(&unary.operand);
        let operand_ty = self.analysis.provider.get(operand).clone();
        let pure = self.is_pure_expr(&unary.operand);
        match unary.op {
            UnaryOp::Neg => match operand_ty {
                Type::IntLiteral(value) => {
                    let ty = self.analysis.provider.int_literal(-value);
                    self.note_expr(unary.id, ty, Category::RValue, pure, true);
                    ty
                }
                Type::Int { .. } | Type::Error => {
                    self.note_expr(unary.id, operand, Category::RValue, pure, false);
                    operand
                }
                _ => self.operand_error(unary.id, "-", operand, unary.span),
            },
            UnaryOp::Not => {
                if !matches!(operand_ty, Type::Bool | Type::Error) {
                    return self.operand_error(unary.id, "!", operand, unary.span);
                }
                self.note_expr(unary.id, operand, Category::RValue, pure, false);
                operand
            }
            UnaryOp::BitNot => match operand_ty {
                Type::IntLiteral(value) => {
                    // fold ~x = -x - 1 over the literal
                    let ty = self.analysis.provider.int_literal(-value - 1);
                    self.note_expr(unary.id, ty, Category::RValue, pure, true);
                    ty
                }
                Type::Int { .. } | Type::FixedBytes(_) | Type::Error => {
                    self.note_expr(unary.id, operand, Category::RValue, pure, false);
                    operand
                }
                _ => self.operand_error(unary.id, "~", operand, unary.span),
            },
            UnaryOp::Inc | UnaryOp::Dec => {
                self.require_lvalue(&unary.operand);
                let mobile = mobile_type(&mut self.analysis.provider, operand)
                    .unwrap_or(self.analysis.error_type);
                if !matches!(
                    self.analysis.provider.get(mobile),
                    Type::Int { .. } | Type::Error
                ) {
                    return self.operand_error(
                        unary.id,
                        if unary.op == UnaryOp::Inc { "++" } else { "--" },
                        operand,
                        unary.span,
                    );
                }
                self.note_expr(unary.id, mobile, Category::RValue, false, false);
                mobile
            }
        }
    }

    fn check_binary(&mut self, binary: &BinaryExpression) -> TypeId {
        let left = self.check_expr(&binary.left);
        let right = self.check_expr(&binary.right);
        let pure = self.is_pure_expr(&binary.left) && self.is_pure_expr(&binary.right);

        // combination of literal types folds at this stage
        if let (Type::IntLiteral(a), Type::IntLiteral(b)) = (
            self.analysis.provider.get(left).clone(),
            self.analysis.provider.get(right).clone(),
        ) {
            if let Some(folded) = fold_literals(binary.op, &a, &b) {
                let ty = self.analysis.provider.int_literal(folded);
                let result = if binary.op.is_comparison() {
                    self.analysis.provider.bool_type()
                } else {
                    ty
                };
                self.note_expr(binary.id, result, Category::RValue, pure, true);
                return result;
            }
            if binary.op.is_arithmetic() {
                self.error(
                    "E3022",
                    "constant expression cannot be evaluated (division by zero?)",
                    binary.span,
                    "invalid constant arithmetic",
                );
                return self.error_expr(binary.id);
            }
        }

        if binary.op.is_logical() {
            self.require_bool(&binary.left);
            self.require_bool(&binary.right);
            let ty = self.analysis.provider.bool_type();
            self.note_expr(binary.id, ty, Category::RValue, pure, false);
            return ty;
        }

        if binary.op.is_comparison() {
            let common = common_type(&mut self.analysis.provider, left, right);
            let bool_ty = self.analysis.provider.bool_type();
            match common {
                Some(common) => {
                    let ordered = matches!(
                        self.analysis.provider.get(common),
                        Type::Int { .. }
                            | Type::FixedBytes(_)
                            | Type::Address { .. }
                            | Type::Error
                    );
                    if !binary.op.is_equality() && !ordered {
                        self.binary_error(binary, left, right);
                    }
                }
                None => self.binary_error(binary, left, right),
            }
            self.note_expr(binary.id, bool_ty, Category::RValue, pure, false);
            return bool_ty;
        }

        if matches!(binary.op, BinaryOp::Shl | BinaryOp::Shr) {
            // the result keeps the left operand's (mobile) type
            let result = mobile_type(&mut self.analysis.provider, left)
                .unwrap_or(self.analysis.error_type);
            if !matches!(
                self.analysis.provider.get(result),
                Type::Int { .. } | Type::FixedBytes(_) | Type::Error
            ) {
                return self.binary_error_expr(binary, left, right);
            }
            let right_ok = matches!(
                self.analysis.provider.get(right),
                Type::Int { signed: false, .. } | Type::IntLiteral(_) | Type::Error
            );
            if !right_ok {
                self.error(
                    "E3023",
                    "shift amount must be an unsigned integer",
                    binary.right.span(),
                    "invalid shift amount",
                );
            }
            self.note_expr(binary.id, result, Category::RValue, pure, false);
            return result;
        }

        // arithmetic and bitwise: both operands share a common numeric (or
        // fixed-bytes, for bitwise) type
        let common = common_type(&mut self.analysis.provider, left, right);
        let Some(common) = common else {
            return self.binary_error_expr(binary, left, right);
        };
        let valid = match self.analysis.provider.get(common) {
            Type::Int { .. } => true,
            Type::FixedBytes(_) => binary.op.is_bitwise(),
            Type::Error => true,
            _ => false,
        };
        if !valid {
            return self.binary_error_expr(binary, left, right);
        }
        self.note_expr(binary.id, common, Category::RValue, pure, false);
        common
    }

    fn check_conditional(&mut self, cond: &ConditionalExpression) -> TypeId {
        self.require_bool(&cond.condition);
        let true_ty = self.check_expr(&cond.true_expr);
        let false_ty = self.check_expr(&cond.false_expr);
        let pure = self.is_pure_expr(&cond.condition)
            && self.is_pure_expr(&cond.true_expr)
            && self.is_pure_expr(&cond.false_expr);
        match common_type(&mut self.analysis.provider, true_ty, false_ty) {
            Some(common) => {
                self.note_expr(cond.id, common, Category::RValue, pure, false);
                common
            }
            None => {
                let true_name = self.analysis.provider.display(true_ty);
                let false_name = self.analysis.provider.display(false_ty);
                self.error(
                    "E3001",
                    format!(
                        "branches of the conditional have incompatible types {} and {}",
                        true_name, false_name
                    ),
                    cond.span,
                    "no common type",
                );
                self.error_expr(cond.id)
            }
        }
    }

    fn check_assignment(&mut self, assign: &AssignmentExpression) -> TypeId {
        let lhs = self.check_expr(&assign.lhs);
        let rhs = self.check_expr(&assign.rhs);
        self.require_lvalue(&assign.lhs);
        self.observe_write(&assign.lhs);

        if let Some(op) = assign.op.binary_op() {
            // the compound form must also be arithmetically valid
            let valid = match self.analysis.provider.get(lhs) {
                Type::Int { .. } => true,
                Type::FixedBytes(_) => {
                    matches!(
                        op,
                        BinaryOp::BitAnd
                            | BinaryOp::BitOr
                            | BinaryOp::BitXor
                            | BinaryOp::Shl
                            | BinaryOp::Shr
                    )
                }
                Type::Error => true,
                _ => false,
            };
            if !valid {
                let name = self.analysis.provider.display(lhs);
                self.error(
                    "E3023",
                    format!("operator {}= not compatible with type {}", op, name),
                    assign.span,
                    "invalid compound assignment",
                );
            }
        }
        self.require_convertible(rhs, lhs, assign.rhs.span());
        self.note_expr(assign.id, lhs, Category::RValue, false, false);
        lhs
    }

    fn check_member_access(&mut self, access: &MemberAccessExpression) -> TypeId {
        let base = self.check_expr(&access.expr);
        let member = access.member.name.as_str();
        let base_ty = self.analysis.provider.get(base).clone();

        // super.f — resolution happens against the linearised base list
        if matches!(
            self.analysis.resolved.get(&access.expr.id()),
            Some(Target::Super)
        ) {
            let members = self
                .bindings
                .lookup_member(self.analysis, self.contract, member);
            let functions = self.function_set(&members);
            if functions.is_empty() {
                self.error(
                    "E2003",
                    format!("no function '{}' in any base contract", member),
                    access.member.span,
                    "unknown super member",
                );
                return self.error_expr(access.id);
            }
            let ty = self.function_set_type(&functions);
            self.analysis
                .resolved
                .insert(access.id, Target::Functions(functions));
            self.note_expr(access.id, ty, Category::RValue, false, false);
            return ty;
        }

        match base_ty {
            Type::Struct { decl, location, .. } => {
                let field = self
                    .analysis
                    .structs
                    .get(&decl)
                    .and_then(|info| {
                        info.fields
                            .iter()
                            .position(|(name, _)| name == member)
                            .map(|index| (index, info.fields[index].1))
                    });
                match field {
                    Some((index, field_ty)) => {
                        self.analysis
                            .resolved
                            .insert(access.id, Target::StructField { decl, index });
                        let ty = self.relocate(field_ty, location);
                        self.note_expr(access.id, ty, Category::LValue, false, false);
                        ty
                    }
                    None => {
                        if let Some(ty) = self.try_using_for(access, base) {
                            return ty;
                        }
                        let name = self.analysis.provider.display(base);
                        self.error(
                            "E3033",
                            format!("member '{}' not found in {}", member, name),
                            access.member.span,
                            "unknown member",
                        );
                        self.error_expr(access.id)
                    }
                }
            }
            Type::TypeType(actual) => match self.analysis.provider.get(actual).clone() {
                Type::Enum { decl, .. } => {
                    let index = self
                        .analysis
                        .enums
                        .get(&decl)
                        .and_then(|info| info.variants.iter().position(|v| v == member));
                    match index {
                        Some(index) => {
                            self.analysis
                                .resolved
                                .insert(access.id, Target::EnumVariant { decl, index });
                            self.note_expr(access.id, actual, Category::RValue, true, true);
                            actual
                        }
                        None => {
                            self.error(
                                "E3033",
                                format!("enum has no variant '{}'", member),
                                access.member.span,
                                "unknown variant",
                            );
                            self.error_expr(access.id)
                        }
                    }
                }
                Type::Contract {
                    decl, is_library, ..
                } => {
                    // library (or base) members called statically
                    let members = self.bindings.lookup_member(self.analysis, decl, member);
                    let functions = self.function_set(&members);
                    if functions.is_empty() {
                        self.error(
                            "E3033",
                            format!("member '{}' not found", member),
                            access.member.span,
                            "unknown member",
                        );
                        return self.error_expr(access.id);
                    }
                    if !is_library {
                        self.observe(StateMutability::View);
                    }
                    let ty = self.function_set_type(&functions);
                    self.analysis
                        .resolved
                        .insert(access.id, Target::Functions(functions));
                    self.note_expr(access.id, ty, Category::RValue, false, false);
                    ty
                }
                _ => {
                    self.error(
                        "E3033",
                        "type has no members",
                        access.member.span,
                        "unknown member",
                    );
                    self.error_expr(access.id)
                }
            },
            Type::Contract { decl, .. } => {
                // externally callable members of a contract-typed value
                let members = self.bindings.lookup_member(self.analysis, decl, member);
                let functions: Vec<NodeId> = self
                    .function_set(&members)
                    .into_iter()
                    .filter(|id| {
                        self.analysis
                            .functions
                            .get(id)
                            .map(|sig| sig.visibility.is_externally_visible())
                            .unwrap_or(false)
                    })
                    .collect();
                if functions.is_empty() {
                    if let Some(ty) = self.try_using_for(access, base) {
                        return ty;
                    }
                    self.error(
                        "E3033",
                        format!("contract has no externally visible member '{}'", member),
                        access.member.span,
                        "unknown member",
                    );
                    return self.error_expr(access.id);
                }
                let ty = self.function_set_type(&functions);
                self.analysis
                    .resolved
                    .insert(access.id, Target::Functions(functions));
                self.note_expr(access.id, ty, Category::RValue, false, false);
                ty
            }
            Type::Magic(kind) => {
                let resolved = self.magic_member(kind, member);
                match resolved {
                    Some(ty) => {
                        self.analysis.resolved.insert(
                            access.id,
                            Target::MagicMember(kind, member.to_string()),
                        );
                        self.note_expr(access.id, ty, Category::RValue, false, false);
                        ty
                    }
                    None => {
                        self.error(
                            "E3033",
                            format!("'{}' has no member '{}'", kind, member),
                            access.member.span,
                            "unknown member",
                        );
                        self.error_expr(access.id)
                    }
                }
            }
            Type::Array { .. } | Type::Bytes { .. } | Type::String { .. }
                if member == "length" =>
            {
                self.analysis.resolved.insert(access.id, Target::ArrayLength);
                let ty = self.analysis.provider.uint256();
                self.note_expr(access.id, ty, Category::RValue, false, false);
                ty
            }
            Type::Address { .. } if member == "balance" => {
                self.analysis
                    .resolved
                    .insert(access.id, Target::AddressBalance);
                self.observe(StateMutability::View);
                let ty = self.analysis.provider.uint256();
                self.note_expr(access.id, ty, Category::RValue, false, false);
                ty
            }
            Type::Error => self.error_expr(access.id),
            _ => {
                if let Some(ty) = self.try_using_for(access, base) {
                    return ty;
                }
                let name = self.analysis.provider.display(base);
                self.error(
                    "E3033",
                    format!("member '{}' not found in {}", member, name),
                    access.member.span,
                    "unknown member",
                );
                self.error_expr(access.id)
            }
        }
    }

    fn magic_member(&mut self, kind: MagicKind, member: &str) -> Option<TypeId> {
        let provider = &mut self.analysis.provider;
        match (kind, member) {
            (MagicKind::Msg, "sender") => Some(provider.address(true)),
            (MagicKind::Msg, "value") => Some(provider.uint256()),
            (MagicKind::Msg, "sig") => Some(provider.fixed_bytes(4)),
            (MagicKind::Block, "number") => Some(provider.uint256()),
            (MagicKind::Block, "timestamp") => Some(provider.uint256()),
            (MagicKind::Block, "coinbase") => Some(provider.address(true)),
            (MagicKind::Block, "gaslimit") => Some(provider.uint256()),
            (MagicKind::Block, "chainid") => Some(provider.uint256()),
            (MagicKind::Tx, "origin") => Some(provider.address(true)),
            (MagicKind::Tx, "gasprice") => Some(provider.uint256()),
            _ => None,
        }
    }

    fn check_index_access(&mut self, access: &IndexAccessExpression) -> TypeId {
        let base = self.check_expr(&access.base);
        let index_ty = access.index.as_ref().map(|index| self.check_expr(index));
        let base_ty = self.analysis.provider.get(base).clone();

        match base_ty {
            Type::Array {
                base: element,
                location,
                ..
            } => {
                self.require_index_type(index_ty, access);
                let ty = self.relocate(element, location);
                self.note_expr(access.id, ty, Category::LValue, false, false);
                ty
            }
            Type::Mapping { key, value } => {
                if let Some(index_ty) = index_ty {
                    self.require_convertible(
                        index_ty,
                        key,
                        access.index.as_ref().map(|i| i.span()).unwrap_or(access.span),
                    );
                }
                self.note_expr(access.id, value, Category::LValue, false, false);
                value
            }
            Type::Bytes { .. } => {
                self.require_index_type(index_ty, access);
                let ty = self.analysis.provider.fixed_bytes(1);
                self.note_expr(access.id, ty, Category::LValue, false, false);
                ty
            }
            Type::FixedBytes(_) => {
                self.require_index_type(index_ty, access);
                let ty = self.analysis.provider.fixed_bytes(1);
                self.note_expr(access.id, ty, Category::RValue, false, false);
                ty
            }
            Type::Error => self.error_expr(access.id),
            _ => {
                let name = self.analysis.provider.display(base);
                self.error(
                    "E3034",
                    format!("type {} cannot be indexed", name),
                    access.span,
                    "not indexable",
                );
                self.error_expr(access.id)
            }
        }
    }

    fn require_index_type(&mut self, index_ty: Option<TypeId>, access: &IndexAccessExpression) {
        let span = access
            .index
            .as_ref()
            .map(|index| index.span())
            .unwrap_or(access.span);
        match index_ty {
            Some(ty) => {
                let uint256 = self.analysis.provider.uint256();
                self.require_convertible(ty, uint256, span);
            }
            None => self.error("E3034", "index expression expected", span, "missing index"),
        }
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn check_call(&mut self, call: &FunctionCallExpression) -> TypeId {
        // `new C(…)` — creation
        if let Expression::New(new) = call.callee.as_ref() {
            return self.check_creation(call, new);
        }

        let callee_ty = self.check_expr(&call.callee);
        let arg_types: Vec<TypeId> = call.args.iter().map(|arg| self.check_expr(arg)).collect();

        // casts: the callee is a type
        if let Type::TypeType(actual) = self.analysis.provider.get(callee_ty).clone() {
            // struct constructor?
            if let Type::Struct { decl, .. } = self.analysis.provider.get(actual).clone() {
                return self.check_struct_constructor(call, decl, &arg_types);
            }
            return self.check_cast(call, actual, &arg_types);
        }

        // builtins
        if let Some(Target::Builtin(builtin)) =
            self.analysis.resolved.get(&call.callee.id()).cloned()
        {
            return self.check_builtin_call(call, builtin, &arg_types);
        }

        // function sets: internal, super, library or external calls
        if let Some(Target::Functions(candidates)) =
            self.analysis.resolved.get(&call.callee.id()).cloned()
        {
            return self.check_function_set_call(call, &candidates, &arg_types);
        }

        // `using`-bound calls: the receiver is the first argument
        if let Some(Target::BoundFunctions(candidates)) =
            self.analysis.resolved.get(&call.callee.id()).cloned()
        {
            let Expression::MemberAccess(access) = call.callee.as_ref() else {
                return self.error_expr(call.id);
            };
            let mut full_args = vec![self.analysis.type_of(access.expr.id())];
            full_args.extend(arg_types.iter().copied());
            return self.check_bound_call(call, &candidates, &full_args);
        }

        if self.analysis.provider.get(callee_ty).is_error() {
            return self.error_expr(call.id);
        }
        let name = self.analysis.provider.display(callee_ty);
        self.error(
            "E3026",
            format!("type {} is not callable", name),
            call.callee.span(),
            "cannot be called",
        );
        self.error_expr(call.id)
    }

    fn check_creation(&mut self, call: &FunctionCallExpression, new: &NewExpression) -> TypeId {
        let arg_types: Vec<TypeId> = call.args.iter().map(|arg| self.check_expr(arg)).collect();
        match &new.type_name {
            TypeName::UserDefined { path, .. } => {
                let Some(&decl) = self.bindings.global_contracts.get(&path.dotted()) else {
                    self.error(
                        "E2003",
                        format!("identifier '{}' not found", path.dotted()),
                        path.span,
                        "unknown contract",
                    );
                    return self.error_expr(call.id);
                };
                let abstract_target = self
                    .analysis
                    .contracts
                    .get(&decl)
                    .map(|info| info.is_abstract())
                    .unwrap_or(false);
                if abstract_target {
                    self.error(
                        "E3035",
                        format!("cannot instantiate abstract contract '{}'", path.dotted()),
                        new.span,
                        "abstract contract",
                    );
                }
                if let Some(params) = self.base_constructor_params(decl) {
                    self.check_argument_list(&arg_types, &params, call.span);
                }
                self.observe(StateMutability::NonPayable);
                self.analysis
                    .call_targets
                    .insert(call.id, CallTarget::ContractCreation(decl));
                let (name, is_library) = self
                    .analysis
                    .contracts
                    .get(&decl)
                    .map(|info| (info.name.clone(), info.kind == ContractKind::Library))
                    .unwrap_or_default();
                let ty = self.analysis.provider.intern(Type::Contract {
                    decl,
                    name,
                    is_library,
                });
                self.note_expr(call.id, ty, Category::RValue, false, false);
                ty
            }
            other => {
                self.error(
                    "E3028",
                    "only contracts can be created with 'new'",
                    other.span(),
                    "unsupported allocation",
                );
                self.error_expr(call.id)
            }
        }
    }

    fn check_struct_constructor(
        &mut self,
        call: &FunctionCallExpression,
        decl: NodeId,
        args: &[TypeId],
    ) -> TypeId {
        let fields: Vec<TypeId> = self
            .analysis
            .structs
            .get(&decl)
            .map(|info| info.fields.iter().map(|(_, ty)| *ty).collect())
            .unwrap_or_default();
        self.check_argument_list(args, &fields, call.span);
        self.analysis
            .call_targets
            .insert(call.id, CallTarget::StructConstructor(decl));
        let name = self
            .analysis
            .structs
            .get(&decl)
            .map(|info| info.name.clone())
            .unwrap_or_default();
        let ty = self.analysis.provider.intern(Type::Struct {
            decl,
            name,
            location: DataLocation::Memory,
        });
        self.note_expr(call.id, ty, Category::RValue, false, false);
        ty
    }

    fn check_cast(
        &mut self,
        call: &FunctionCallExpression,
        target: TypeId,
        args: &[TypeId],
    ) -> TypeId {
        if args.len() != 1 {
            self.error(
                "E3036",
                "type conversion takes exactly one argument",
                call.span,
                "wrong argument count",
            );
            return self.error_expr(call.id);
        }
        let source = args[0];
        if !self.explicitly_convertible(source, target) {
            let from = self.analysis.provider.display(source);
            let to = self.analysis.provider.display(target);
            self.error(
                "E3036",
                format!("explicit conversion from {} to {} is not allowed", from, to),
                call.span,
                "invalid conversion",
            );
        }
        self.analysis
            .call_targets
            .insert(call.id, CallTarget::TypeCast(target));
        let pure = call.args.first().map(|a| self.is_pure_expr(a)).unwrap_or(true);
        let constant = call
            .args
            .first()
            .and_then(|a| self.analysis.expr_info.get(&a.id()))
            .map(|info| info.is_constant)
            .unwrap_or(false);
        self.note_expr(call.id, target, Category::RValue, pure, constant);
        target
    }

    fn explicitly_convertible(&mut self, from: TypeId, to: TypeId) -> bool {
        if implicitly_convertible(&self.analysis.provider, from, to) {
            return true;
        }
        let from_ty = self.analysis.provider.get(from).clone();
        let to_ty = self.analysis.provider.get(to).clone();
        match (from_ty, to_ty) {
            // any integer width/sign change is explicit
            (Type::Int { .. }, Type::Int { .. }) => true,
            (Type::IntLiteral(_), Type::Int { .. }) => true,
            (Type::IntLiteral(value), Type::Address { .. }) => {
                !value.is_negative() && value.bits() <= 160
            }
            (Type::Int { bits, signed: false }, Type::Address { .. }) => bits == 160,
            (Type::Address { .. }, Type::Int { bits, signed: false }) => bits == 160,
            (Type::Address { .. }, Type::Address { .. }) => true,
            (Type::Address { .. }, Type::Contract { .. }) => true,
            (Type::Contract { .. }, Type::Address { .. }) => true,
            (Type::FixedBytes(a), Type::FixedBytes(_)) => a > 0,
            (Type::FixedBytes(a), Type::Int { bits, signed: false }) => u16::from(a) * 8 == bits,
            (Type::Int { bits, signed: false }, Type::FixedBytes(a)) => u16::from(a) * 8 == bits,
            (Type::Int { .. }, Type::Enum { .. }) => true,
            (Type::IntLiteral(value), Type::Enum { variant_count, .. }) => {
                !value.is_negative() && value < BigInt::from(variant_count)
            }
            (Type::Enum { .. }, Type::Int { .. }) => true,
            (Type::Bytes { .. }, Type::String { .. }) => true,
            (Type::String { .. }, Type::Bytes { .. }) => true,
            _ => false,
        }
    }

    fn check_builtin_call(
        &mut self,
        call: &FunctionCallExpression,
        builtin: Builtin,
        args: &[TypeId],
    ) -> TypeId {
        let bool_ty = self.analysis.provider.bool_type();
        let uint256 = self.analysis.provider.uint256();
        let ok = match builtin {
            Builtin::Require => {
                (args.len() == 1 || args.len() == 2)
                    && implicitly_convertible(&self.analysis.provider, args[0], bool_ty)
            }
            Builtin::Assert => {
                args.len() == 1
                    && implicitly_convertible(&self.analysis.provider, args[0], bool_ty)
            }
            Builtin::Revert => args.len() <= 1,
            Builtin::Keccak256 => args.len() == 1,
            Builtin::Addmod | Builtin::Mulmod => {
                args.len() == 3
                    && args.iter().all(|arg| {
                        implicitly_convertible(&self.analysis.provider, *arg, uint256)
                    })
            }
        };
        if !ok {
            self.error(
                "E3026",
                "no matching declaration found for this call",
                call.span,
                "invalid builtin arguments",
            );
        }
        self.analysis
            .call_targets
            .insert(call.id, CallTarget::Builtin(builtin));
        let result = match builtin {
            Builtin::Keccak256 => self.analysis.provider.fixed_bytes(32),
            Builtin::Addmod | Builtin::Mulmod => uint256,
            _ => self.analysis.provider.tuple(vec![]),
        };
        let pure = call.args.iter().all(|arg| self.is_pure_expr(arg));
        self.note_expr(call.id, result, Category::RValue, pure, false);
        result
    }

    fn check_function_set_call(
        &mut self,
        call: &FunctionCallExpression,
        candidates: &[NodeId],
        args: &[TypeId],
    ) -> TypeId {
        // overload selection under the implicit-conversion rules
        let mut matching = Vec::new();
        for candidate in candidates {
            let Some(sig) = self.analysis.functions.get(candidate) else {
                continue;
            };
            if sig.params.len() != args.len() {
                continue;
            }
            let fits = sig
                .params
                .iter()
                .zip(args)
                .all(|(param, arg)| {
                    implicitly_convertible(&self.analysis.provider, *arg, *param)
                });
            if fits {
                matching.push(*candidate);
            }
        }

        let selected = match matching.len() {
            0 => {
                self.error(
                    "E3026",
                    "no matching declaration found for this call",
                    call.span,
                    "no viable overload",
                );
                return self.error_expr(call.id);
            }
            1 => matching[0],
            _ => {
                // several candidates with the same signature are the same
                // virtual function seen through different paths
                let mut keys: FxHashSet<String> = FxHashSet::default();
                for candidate in &matching {
                    keys.insert(Binder::signature_key_for(self.analysis, *candidate));
                }
                if keys.len() > 1 {
                    self.error(
                        "E3027",
                        "call is ambiguous between several matching overloads",
                        call.span,
                        "ambiguous call",
                    );
                    return self.error_expr(call.id);
                }
                matching[0]
            }
        };

        let sig = self
            .analysis
            .functions
            .get(&selected)
            .cloned()
            .expect("selected overload exists");

        // classify: super call, external call on a value, getter, internal
        let is_super = matches!(
            call.callee.as_ref(),
            Expression::MemberAccess(access)
                if matches!(
                    self.analysis.resolved.get(&access.expr.id()),
                    Some(Target::Super)
                )
        );
        let external = match call.callee.as_ref() {
            Expression::MemberAccess(access) => {
                let base_ty = self.analysis.type_of(access.expr.id());
                matches!(
                    self.analysis.provider.get(base_ty),
                    Type::Contract { is_library: false, .. }
                )
            }
            _ => false,
        };

        if external {
            self.observe(StateMutability::NonPayable);
            self.analysis
                .call_targets
                .insert(call.id, CallTarget::External { function: selected });
        } else if sig.is_getter {
            self.observe(StateMutability::View);
            self.analysis
                .call_targets
                .insert(call.id, CallTarget::Getter { var: selected });
        } else {
            // an internal call to a payable function only costs the caller a
            // state modification
            let observed = if sig.mutability == StateMutability::Payable {
                StateMutability::NonPayable
            } else {
                sig.mutability
            };
            self.observe(observed);
            self.analysis.call_targets.insert(
                call.id,
                CallTarget::Function {
                    id: selected,
                    is_virtual: sig.is_virtual && !is_super,
                    is_super,
                },
            );
        }

        for (arg, param) in call.args.iter().zip(&sig.params) {
            let arg_ty = self.analysis.type_of(arg.id());
            self.require_convertible(arg_ty, *param, arg.span());
        }

        let result = match sig.returns.len() {
            0 => self.analysis.provider.tuple(vec![]),
            1 => sig.returns[0],
            _ => self.analysis.provider.tuple(sig.returns.clone()),
        };
        let pure = sig.mutability == StateMutability::Pure
            && call.args.iter().all(|arg| self.is_pure_expr(arg));
        self.note_expr(call.id, result, Category::RValue, pure, false);
        result
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn define_local(&mut self, name: &Identifier, decl: NodeId) {
        let scope = self.scopes.last_mut().expect("a scope is always open");
        if let Some(existing) = scope.get(&name.name) {
            let existing_span = existing.span;
            let file = self.file;
            self.diagnostics.report(
                Diagnostic::error(
                    "E2001",
                    format!("identifier '{}' already declared", name.name),
                    file,
                    name.span,
                )
                .with_caption("duplicate declaration")
                .with_secondary(file, existing_span, "first declaration here"),
            );
            return;
        }
        // shadowing an outer local is legal but suspicious
        let shadows = self
            .scopes
            .iter()
            .rev()
            .skip(1)
            .any(|outer| outer.contains_key(&name.name));
        if shadows {
            let file = self.file;
            self.diagnostics.report(
                Diagnostic::warning(
                    "W5002",
                    format!("declaration of '{}' shadows an outer declaration", name.name),
                    file,
                    name.span,
                )
                .with_caption("shadowed here"),
            );
        }
        self.scopes.last_mut().expect("scope").insert(
            name.name.clone(),
            LocalVar {
                decl,
                span: name.span,
            },
        );
    }

    fn note_expr(
        &mut self,
        id: NodeId,
        ty: TypeId,
        category: Category,
        is_pure: bool,
        is_constant: bool,
    ) {
        self.analysis.expr_info.insert(
            id,
            ExprInfo {
                ty,
                category,
                is_pure,
                is_constant,
            },
        );
    }

    fn error_expr(&mut self, id: NodeId) -> TypeId {
        let ty = self.analysis.provider.error_type();
        self.note_expr(id, ty, Category::RValue, true, false);
        ty
    }

    fn error(
        &mut self,
        code: &'static str,
        message: impl Into<String>,
        span: Span,
        caption: &str,
    ) {
        let file = self.file;
        self.diagnostics
            .report(Diagnostic::error(code, message, file, span).with_caption(caption));
    }

    fn require_bool(&mut self, expr: &Expression) {
        let ty = self.check_expr(expr);
        let bool_ty = self.analysis.provider.bool_type();
        if !implicitly_convertible(&self.analysis.provider, ty, bool_ty) {
            let name = self.analysis.provider.display(ty);
            self.error(
                "E3001",
                format!("expected bool, found {}", name),
                expr.span(),
                "condition must be boolean",
            );
        }
    }

    fn require_convertible(&mut self, from: TypeId, to: TypeId, span: Span) {
        if !implicitly_convertible(&self.analysis.provider, from, to) {
            let from_name = self.analysis.provider.display(from);
            let to_name = self.analysis.provider.display(to);
            self.error(
                "E3001",
                format!("type {} is not implicitly convertible to {}", from_name, to_name),
                span,
                "incompatible types",
            );
        }
    }

    fn require_lvalue(&mut self, expr: &Expression) {
        let assignable = self
            .analysis
            .expr_info
            .get(&expr.id())
            .map(|info| info.category == Category::LValue)
            .unwrap_or(false);
        if !assignable {
            self.error(
                "E3024",
                "expression has to be an lvalue",
                expr.span(),
                "cannot assign here",
            );
            return;
        }
        // assignment to a constant state variable
        if let Some(Target::StateVar(var)) = self.analysis.resolved.get(&expr.id()) {
            if self
                .analysis
                .state_vars
                .get(var)
                .map(|info| info.is_constant)
                .unwrap_or(false)
            {
                self.error(
                    "E3025",
                    "cannot assign to a constant state variable",
                    expr.span(),
                    "constant",
                );
            }
        }
    }

    fn is_pure_expr(&self, expr: &Expression) -> bool {
        self.analysis
            .expr_info
            .get(&expr.id())
            .map(|info| info.is_pure)
            .unwrap_or(false)
    }

    fn is_constant_expr(&self, expr: &Expression) -> bool {
        self.analysis
            .expr_info
            .get(&expr.id())
            .map(|info| info.is_constant)
            .unwrap_or(false)
    }

    /// Writing through this expression touches storage if its root is a
    /// state variable.
    fn observe_write(&mut self, expr: &Expression) {
        let mut current = expr;
        loop {
            match current {
                Expression::Identifier(ident) => {
                    if matches!(
                        self.analysis.resolved.get(&ident.id),
                        Some(Target::StateVar(_))
                    ) {
                        self.observe(StateMutability::NonPayable);
                    }
                    return;
                }
                Expression::IndexAccess(access) => current = &access.base,
                Expression::MemberAccess(access) => current = &access.expr,
                Expression::Tuple(tuple) => {
                    for component in &tuple.components {
                        self.observe_write(component);
                    }
                    return;
                }
                _ => return,
            }
        }
    }

    /// Record that the body performs at least this kind of state access.
    fn observe(&mut self, level: StateMutability) {
        if level.restrictiveness() < self.observed.restrictiveness() {
            self.observed = level;
        }
    }

    /// Re-intern a type with a different data location (member and index
    /// access inherit the container's location).
    fn relocate(&mut self, ty: TypeId, location: DataLocation) -> TypeId {
        match self.analysis.provider.get(ty).clone() {
            Type::Struct { decl, name, .. } => self.analysis.provider.intern(Type::Struct {
                decl,
                name,
                location,
            }),
            Type::Array { base, length, .. } => {
                let base = self.relocate(base, location);
                self.analysis.provider.array(base, length, location)
            }
            Type::Bytes { .. } => self.analysis.provider.bytes(location),
            Type::String { .. } => self.analysis.provider.string(location),
            _ => ty,
        }
    }

    fn binary_error(&mut self, binary: &BinaryExpression, left: TypeId, right: TypeId) {
        let left_name = self.analysis.provider.display(left);
        let right_name = self.analysis.provider.display(right);
        self.error(
            "E3023",
            format!(
                "operator {} not compatible with types {} and {}",
                binary.op, left_name, right_name
            ),
            binary.span,
            "incompatible operand types",
        );
    }

    fn binary_error_expr(
        &mut self,
        binary: &BinaryExpression,
        left: TypeId,
        right: TypeId,
    ) -> TypeId {
        if !self.analysis.provider.get(left).is_error()
            && !self.analysis.provider.get(right).is_error()
        {
            self.binary_error(binary, left, right);
        }
        self.error_expr(binary.id)
    }

    fn operand_error(&mut self, id: NodeId, op: &str, operand: TypeId, span: Span) -> TypeId {
        if !self.analysis.provider.get(operand).is_error() {
            let name = self.analysis.provider.display(operand);
            self.error(
                "E3023",
                format!("operator {} not compatible with type {}", op, name),
                span,
                "invalid operand type",
            );
        }
        self.error_expr(id)
    }

    fn check_argument_list(&mut self, args: &[TypeId], params: &[TypeId], span: Span) {
        if args.len() != params.len() {
            self.error(
                "E3026",
                format!("expected {} arguments, got {}", params.len(), args.len()),
                span,
                "wrong argument count",
            );
            return;
        }
        for (arg, param) in args.iter().zip(params) {
            if !implicitly_convertible(&self.analysis.provider, *arg, *param) {
                let from = self.analysis.provider.display(*arg);
                let to = self.analysis.provider.display(*param);
                self.error(
                    "E3001",
                    format!("type {} is not implicitly convertible to {}", from, to),
                    span,
                    "argument type mismatch",
                );
            }
        }
    }
}

// ============================================================================
// Literal folding
// ============================================================================

/// Parse a normalised number literal: decimal, hex, scientific, and decimal
/// fractions that fold to an integer.
pub fn parse_number(text: &str) -> Option<BigInt> {
    if let Some(hex) = text.strip_prefix("0x") {
        return BigInt::parse_bytes(hex.as_bytes(), 16);
    }
    let (mantissa_text, exponent) = match text.split_once(['e', 'E']) {
        Some((mantissa, exp)) => (mantissa, exp.parse::<u32>().ok()?),
        None => (text, 0),
    };
    let (integer_part, fraction) = match mantissa_text.split_once('.') {
        Some((integer_part, fraction)) => (integer_part, fraction),
        None => (mantissa_text, ""),
    };
    let digits: String = format!("{}{}", integer_part, fraction);
    let mut value = BigInt::parse_bytes(digits.as_bytes(), 10)?;
    let fraction_len = fraction.len() as u32;
    if exponent >= fraction_len {
        value *= BigInt::from(10u8).pow(exponent - fraction_len);
        Some(value)
    } else {
        // fold e.g. 1.5e1 → 15; a remaining fraction is not an integer
        let divisor = BigInt::from(10u8).pow(fraction_len - exponent);
        if (&value % &divisor).is_zero() {
            Some(value / divisor)
        } else {
            None
        }
    }
}

/// Fold a binary operation over two literal values. `None` means the
/// operation cannot be folded (and is an error for arithmetic).
fn fold_literals(op: ast::BinaryOp, a: &BigInt, b: &BigInt) -> Option<BigInt> {
    use ast::BinaryOp::*;
    let bool_int = |b: bool| BigInt::from(if b { 1 } else { 0 });
    Some(match op {
        Add => a + b,
        Sub => a - b,
        Mul => a * b,
        Div => {
            if b.is_zero() {
                return None;
            }
            a / b
        }
        Mod => {
            if b.is_zero() {
                return None;
            }
            a % b
        }
        Pow => {
            let exp = b.to_u32()?;
            if exp > 512 || a.bits() * u64::from(exp) > 4096 {
                return None;
            }
            a.pow(exp)
        }
        Shl => {
            let shift = b.to_u32()?;
            if shift > 256 {
                return None;
            }
            a << shift
        }
        Shr => {
            let shift = b.to_u32()?;
            if shift > 4096 {
                return None;
            }
            a >> shift
        }
        BitAnd => a & b,
        BitOr => a | b,
        BitXor => a ^ b,
        Eq => bool_int(a == b),
        NotEq => bool_int(a != b),
        Lt => bool_int(a < b),
        Gt => bool_int(a > b),
        LtEq => bool_int(a <= b),
        GtEq => bool_int(a >= b),
        And | Or => return None,
    })
}

/// Syntactic constant evaluation for array lengths, before type checking.
pub(crate) fn eval_constant_u64(expr: &Expression) -> Option<u64> {
    eval_constant(expr)?.to_u64()
}

fn eval_constant(expr: &Expression) -> Option<BigInt> {
    match expr {
        Expression::Literal(literal) => match &literal.kind {
            LiteralKind::Number(text) => parse_number(text),
            _ => None,
        },
        Expression::Binary(binary) => {
            let left = eval_constant(&binary.left)?;
            let right = eval_constant(&binary.right)?;
            fold_literals(binary.op, &left, &right)
        }
        Expression::Unary(unary) if unary.op == UnaryOp::Neg => {
            eval_constant(&unary.operand).map(|value| -value)
        }
        Expression::Tuple(tuple) if tuple.components.len() == 1 => {
            eval_constant(&tuple.components[0])
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("42"), Some(BigInt::from(42)));
        assert_eq!(parse_number("0xff"), Some(BigInt::from(255)));
        assert_eq!(
            parse_number("1e18"),
            Some(BigInt::from(10u64).pow(18))
        );
        assert_eq!(parse_number("1.5e1"), Some(BigInt::from(15)));
        assert_eq!(parse_number("1.5"), None);
    }

    #[test]
    fn test_fold_literals() {
        use ast::BinaryOp::*;
        let two = BigInt::from(2);
        let three = BigInt::from(3);
        assert_eq!(fold_literals(Add, &two, &three), Some(BigInt::from(5)));
        assert_eq!(fold_literals(Pow, &two, &three), Some(BigInt::from(8)));
        assert_eq!(fold_literals(Div, &two, &BigInt::zero()), None);
        assert_eq!(fold_literals(Lt, &two, &three), Some(BigInt::from(1)));
    }
}
