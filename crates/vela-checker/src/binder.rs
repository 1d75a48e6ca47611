//! Phase A: declaration registration.
//!
//! Walks every source unit, assigns declarations to scopes, linearises the
//! inheritance lattice, resolves declared types, synthesises getters for
//! public state variables and computes each contract's external interface.
//! Redeclaration of a non-function name is a declaration error; functions
//! form ordered overload sets.

use crate::analysis::{
    Analysis, ContractInfo, EnumInfo, EventSig, FunctionSig, InterfaceFunction, ModifierSig,
    StateVarInfo, StructInfo, Target,
};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::linearize::linearize;
use crate::selector;
use rustc_hash::FxHashMap;
use vela_parser::ast::*;
use vela_parser::Span;
use vela_types::{CallableKind, Type, TypeId};

/// What kind of member a name refers to inside a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Function,
    Modifier,
    StateVar,
    Struct,
    Enum,
    Event,
}

/// One named member declaration.
#[derive(Debug, Clone, Copy)]
pub struct MemberDecl {
    pub id: NodeId,
    pub kind: MemberKind,
}

/// A name resolved in type position.
#[derive(Debug, Clone, Copy)]
enum TypeDecl {
    Struct(NodeId),
    Enum(NodeId),
    Contract(NodeId),
}

/// Scope tables produced by the binder and consumed by reference
/// resolution: a map from name to an ordered list of declarations.
#[derive(Debug, Default)]
pub struct Bindings {
    /// Top-level contract names; the top-level namespace is flat across
    /// units
    pub global_contracts: FxHashMap<String, NodeId>,
    /// Own members of each contract, by name, in declaration order
    pub members: FxHashMap<NodeId, FxHashMap<String, Vec<MemberDecl>>>,
    /// Source unit index of each contract
    pub files: FxHashMap<NodeId, usize>,
}

impl Bindings {
    /// Look a member up through the flat member table: own members first,
    /// then members inherited from every base. Overloads accumulate; the
    /// checker disambiguates by type.
    pub fn lookup_member(
        &self,
        analysis: &Analysis,
        contract: NodeId,
        name: &str,
    ) -> Vec<MemberDecl> {
        let mut found = Vec::new();
        if let Some(info) = analysis.contracts.get(&contract) {
            for base in &info.linearized {
                if let Some(members) = self.members.get(base) {
                    if let Some(decls) = members.get(name) {
                        found.extend(decls.iter().copied());
                    }
                }
            }
        }
        found
    }
}

/// The binder. Consumes the source units, fills an [`Analysis`].
pub struct Binder<'a> {
    units: &'a [SourceUnit],
    diagnostics: &'a mut Diagnostics,
    analysis: Analysis,
    bindings: Bindings,
}

impl<'a> Binder<'a> {
    pub fn new(units: &'a [SourceUnit], diagnostics: &'a mut Diagnostics) -> Self {
        Self {
            units,
            diagnostics,
            analysis: Analysis::new(),
            bindings: Bindings::default(),
        }
    }

    /// Run every binding sub-phase.
    pub fn bind(mut self) -> (Analysis, Bindings) {
        self.register_contracts();
        self.register_members();
        self.resolve_inheritance();
        self.resolve_struct_types();
        self.resolve_signatures();
        self.assign_storage_layout();
        self.compute_unimplemented();
        self.compute_interfaces();
        (self.analysis, self.bindings)
    }

    fn file_of(&self, contract: NodeId) -> usize {
        self.bindings.files.get(&contract).copied().unwrap_or(0)
    }

    // ========================================================================
    // Registration
    // ========================================================================

    fn register_contracts(&mut self) {
        for (file, unit) in self.units.iter().enumerate() {
            for contract in unit.contracts() {
                if let Some(&existing) = self.bindings.global_contracts.get(&contract.name.name) {
                    let existing_span = self
                        .analysis
                        .contracts
                        .get(&existing)
                        .map(|info| info.span)
                        .unwrap_or(Span::DUMMY);
                    let existing_file = self.file_of(existing);
                    self.diagnostics.report(
                        Diagnostic::error(
                            "E2001",
                            format!("identifier '{}' already declared", contract.name.name),
                            file,
                            contract.name.span,
                        )
                        .with_caption("duplicate declaration")
                        .with_secondary(existing_file, existing_span, "first declaration here"),
                    );
                    continue;
                }
                self.bindings
                    .global_contracts
                    .insert(contract.name.name.clone(), contract.id);
                self.bindings.files.insert(contract.id, file);
                self.analysis.contract_order.push(contract.id);
                self.analysis.contracts.insert(
                    contract.id,
                    ContractInfo {
                        id: contract.id,
                        name: contract.name.name.clone(),
                        kind: contract.kind,
                        declared_abstract: contract.is_abstract,
                        span: contract.name.span,
                        file,
                        direct_bases: Vec::new(),
                        linearized: vec![contract.id],
                        functions: Vec::new(),
                        modifiers: Vec::new(),
                        state_vars: Vec::new(),
                        structs: Vec::new(),
                        enums: Vec::new(),
                        events: Vec::new(),
                        unimplemented: Vec::new(),
                        interface: Vec::new(),
                        layout: FxHashMap::default(),
                        using_for: Vec::new(),
                    },
                );
            }
        }
    }

    fn register_members(&mut self) {
        for (file, unit) in self.units.iter().enumerate() {
            for contract in unit.contracts() {
                if !self.analysis.contracts.contains_key(&contract.id) {
                    continue;
                }
                let mut members: FxHashMap<String, Vec<MemberDecl>> = FxHashMap::default();
                for item in &contract.items {
                    let (name_ident, id, kind) = match item {
                        ContractItem::Function(func) => match &func.name {
                            Some(name) => (name, func.id, MemberKind::Function),
                            // constructors and fallbacks are not named members
                            None => continue,
                        },
                        ContractItem::Modifier(def) => (&def.name, def.id, MemberKind::Modifier),
                        ContractItem::StateVar(var) => (&var.name, var.id, MemberKind::StateVar),
                        ContractItem::Struct(def) => (&def.name, def.id, MemberKind::Struct),
                        ContractItem::Enum(def) => (&def.name, def.id, MemberKind::Enum),
                        ContractItem::Event(def) => (&def.name, def.id, MemberKind::Event),
                        ContractItem::Using(_) => continue,
                    };
                    let entry = members.entry(name_ident.name.clone()).or_default();
                    // only functions (and events) overload
                    let overloadable = kind == MemberKind::Function || kind == MemberKind::Event;
                    if let Some(first) = entry.first() {
                        let clash = !overloadable
                            || !(first.kind == MemberKind::Function
                                || first.kind == MemberKind::Event);
                        if clash {
                            let first_span = self.member_span(contract, first.id);
                            self.diagnostics.report(
                                Diagnostic::error(
                                    "E2001",
                                    format!("identifier '{}' already declared", name_ident.name),
                                    file,
                                    name_ident.span,
                                )
                                .with_caption("duplicate declaration")
                                .with_secondary(file, first_span, "first declaration here"),
                            );
                            continue;
                        }
                    }
                    entry.push(MemberDecl { id, kind });

                    let info = self
                        .analysis
                        .contracts
                        .get_mut(&contract.id)
                        .expect("contract registered");
                    match kind {
                        MemberKind::Function => info.functions.push(id),
                        MemberKind::Modifier => info.modifiers.push(id),
                        MemberKind::StateVar => info.state_vars.push(id),
                        MemberKind::Struct => info.structs.push(id),
                        MemberKind::Enum => info.enums.push(id),
                        MemberKind::Event => info.events.push(id),
                    }
                }
                // constructors, fallback and receive are callable but unnamed
                for func in contract.functions() {
                    if func.name.is_none() {
                        let info = self
                            .analysis
                            .contracts
                            .get_mut(&contract.id)
                            .expect("contract registered");
                        info.functions.push(func.id);
                    }
                }
                self.bindings.members.insert(contract.id, members);
            }
        }
    }

    fn member_span(&self, contract: &ContractDef, id: NodeId) -> Span {
        for item in &contract.items {
            let found = match item {
                ContractItem::Function(func) if func.id == id => {
                    func.name.as_ref().map(|n| n.span)
                }
                ContractItem::Modifier(def) if def.id == id => Some(def.name.span),
                ContractItem::StateVar(var) if var.id == id => Some(var.name.span),
                ContractItem::Struct(def) if def.id == id => Some(def.name.span),
                ContractItem::Enum(def) if def.id == id => Some(def.name.span),
                ContractItem::Event(def) if def.id == id => Some(def.name.span),
                _ => None,
            };
            if let Some(span) = found {
                return span;
            }
        }
        Span::DUMMY
    }

    // ========================================================================
    // Inheritance
    // ========================================================================

    fn resolve_inheritance(&mut self) {
        // Resolve direct bases first.
        for (file, unit) in self.units.iter().enumerate() {
            for contract in unit.contracts() {
                let mut bases = Vec::new();
                for base in &contract.bases {
                    let name = base.name.dotted();
                    match self.bindings.global_contracts.get(&name) {
                        Some(&decl) => bases.push(decl),
                        None => self.diagnostics.report(
                            Diagnostic::error(
                                "E2003",
                                format!("identifier '{}' not found", name),
                                file,
                                base.name.span,
                            )
                            .with_caption("unknown base contract"),
                        ),
                    }
                }
                if let Some(info) = self.analysis.contracts.get_mut(&contract.id) {
                    info.direct_bases = bases;
                }
            }
        }

        // Linearise bottom-up; a memo keyed by contract id caches finished
        // lists, and a visiting set breaks inheritance cycles.
        let order: Vec<NodeId> = self.analysis.contract_order.clone();
        let mut done: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
        for id in order {
            let mut visiting = Vec::new();
            self.linearize_recursive(id, &mut done, &mut visiting);
        }
        for (id, linearized) in done {
            if let Some(info) = self.analysis.contracts.get_mut(&id) {
                info.linearized = linearized;
            }
        }
    }

    fn linearize_recursive(
        &mut self,
        id: NodeId,
        done: &mut FxHashMap<NodeId, Vec<NodeId>>,
        visiting: &mut Vec<NodeId>,
    ) -> Vec<NodeId> {
        if let Some(existing) = done.get(&id) {
            return existing.clone();
        }
        if visiting.contains(&id) {
            let (file, span, name) = self
                .analysis
                .contracts
                .get(&id)
                .map(|info| (info.file, info.span, info.name.clone()))
                .unwrap_or((0, Span::DUMMY, String::new()));
            self.diagnostics.report(
                Diagnostic::error(
                    "E3002",
                    format!("circular inheritance involving '{}'", name),
                    file,
                    span,
                )
                .with_caption("inheritance cycle"),
            );
            done.insert(id, vec![id]);
            return vec![id];
        }
        visiting.push(id);

        let direct: Vec<NodeId> = self
            .analysis
            .contracts
            .get(&id)
            .map(|info| info.direct_bases.clone())
            .unwrap_or_default();
        let base_linearizations: Vec<Vec<NodeId>> = direct
            .iter()
            .map(|base| self.linearize_recursive(*base, done, visiting))
            .collect();

        let result = match linearize(id, &direct, &base_linearizations) {
            Ok(list) => list,
            Err(conflict) => {
                let name_of = |this: &Self, node: NodeId| {
                    this.analysis
                        .contracts
                        .get(&node)
                        .map(|info| info.name.clone())
                        .unwrap_or_default()
                };
                let first = name_of(self, conflict.first);
                let second = name_of(self, conflict.second);
                let (file, span) = self
                    .analysis
                    .contracts
                    .get(&id)
                    .map(|info| (info.file, info.span))
                    .unwrap_or((0, Span::DUMMY));
                self.diagnostics.report(
                    Diagnostic::error(
                        "E3003",
                        format!(
                            "linearization of inheritance graph impossible: the order of '{}' and '{}' cannot be reconciled",
                            first, second
                        ),
                        file,
                        span,
                    )
                    .with_caption("conflicting base order"),
                );
                vec![id]
            }
        };

        visiting.pop();
        done.insert(id, result.clone());
        result
    }

    // ========================================================================
    // Type resolution
    // ========================================================================

    /// Resolve a syntactic type name against a contract's scope.
    ///
    /// `default_location` applies to reference types without an explicit
    /// location (storage for state variables, memory for most everything
    /// else, calldata for external parameters).
    pub(crate) fn resolve_type(
        analysis: &mut Analysis,
        bindings: &Bindings,
        diagnostics: &mut Diagnostics,
        file: usize,
        contract: Option<NodeId>,
        type_name: &TypeName,
        location: DataLocation,
    ) -> TypeId {
        match type_name {
            TypeName::Elementary { ty, .. } => {
                Self::elementary_type(analysis, *ty, location)
            }
            TypeName::UserDefined { id, path } => {
                let target = Self::lookup_type_name(analysis, bindings, contract, path);
                match target {
                    Some(TypeDecl::Struct(decl)) => {
                        analysis.resolved.insert(*id, Target::TypeLike(decl));
                        let name = analysis
                            .structs
                            .get(&decl)
                            .map(|info| info.name.clone())
                            .unwrap_or_else(|| path.last().name.clone());
                        analysis.provider.intern(Type::Struct {
                            decl,
                            name,
                            location,
                        })
                    }
                    Some(TypeDecl::Enum(decl)) => {
                        analysis.resolved.insert(*id, Target::TypeLike(decl));
                        let (name, count) = analysis
                            .enums
                            .get(&decl)
                            .map(|info| (info.name.clone(), info.variants.len() as u16))
                            .unwrap_or_else(|| (path.last().name.clone(), 0));
                        analysis.provider.intern(Type::Enum {
                            decl,
                            name,
                            variant_count: count,
                        })
                    }
                    Some(TypeDecl::Contract(decl)) => {
                        analysis.resolved.insert(*id, Target::TypeLike(decl));
                        let (name, is_library) = analysis
                            .contracts
                            .get(&decl)
                            .map(|info| (info.name.clone(), info.kind == ContractKind::Library))
                            .unwrap_or_else(|| (path.last().name.clone(), false));
                        analysis.provider.intern(Type::Contract {
                            decl,
                            name,
                            is_library,
                        })
                    }
                    None => {
                        diagnostics.report(
                            Diagnostic::error(
                                "E2003",
                                format!("identifier '{}' not found", path.dotted()),
                                file,
                                path.span,
                            )
                            .with_caption("unknown type"),
                        );
                        analysis.provider.error_type()
                    }
                }
            }
            TypeName::Array { base, length, .. } => {
                let base_id = Self::resolve_type(
                    analysis, bindings, diagnostics, file, contract, base, location,
                );
                let len = match length {
                    Some(expr) => match crate::checker::eval_constant_u64(expr) {
                        Some(value) => Some(value),
                        None => {
                            diagnostics.report(
                                Diagnostic::error(
                                    "E3004",
                                    "array length must be a constant integer expression",
                                    file,
                                    expr.span(),
                                )
                                .with_caption("not a compile-time constant"),
                            );
                            Some(0)
                        }
                    },
                    None => None,
                };
                analysis.provider.array(base_id, len, location)
            }
            TypeName::Mapping { key, value, span } => {
                // mappings live in storage, as do their values
                let key_id = Self::resolve_type(
                    analysis,
                    bindings,
                    diagnostics,
                    file,
                    contract,
                    key,
                    DataLocation::Storage,
                );
                if !analysis.provider.get(key_id).is_value_type()
                    && !matches!(
                        analysis.provider.get(key_id),
                        Type::String { .. } | Type::Bytes { .. } | Type::Error
                    )
                {
                    diagnostics.report(
                        Diagnostic::error(
                            "E3005",
                            "mapping key must be a value type, string or bytes",
                            file,
                            *span,
                        )
                        .with_caption("invalid mapping key"),
                    );
                }
                let value_id = Self::resolve_type(
                    analysis,
                    bindings,
                    diagnostics,
                    file,
                    contract,
                    value,
                    DataLocation::Storage,
                );
                analysis.provider.mapping(key_id, value_id)
            }
            TypeName::Function {
                params,
                returns,
                visibility,
                mutability,
                ..
            } => {
                let param_ids: Vec<TypeId> = params
                    .iter()
                    .map(|p| {
                        Self::resolve_type(
                            analysis, bindings, diagnostics, file, contract, p, location,
                        )
                    })
                    .collect();
                let return_ids: Vec<TypeId> = returns
                    .iter()
                    .map(|r| {
                        Self::resolve_type(
                            analysis, bindings, diagnostics, file, contract, r, location,
                        )
                    })
                    .collect();
                let kind = if *visibility == Visibility::External {
                    CallableKind::External
                } else {
                    CallableKind::Internal
                };
                analysis
                    .provider
                    .function(param_ids, return_ids, kind, *mutability)
            }
        }
    }

    fn elementary_type(
        analysis: &mut Analysis,
        ty: ElementaryType,
        location: DataLocation,
    ) -> TypeId {
        match ty {
            ElementaryType::Bool => analysis.provider.bool_type(),
            ElementaryType::Address { payable } => analysis.provider.address(payable),
            ElementaryType::Uint(bits) => analysis.provider.uint(bits),
            ElementaryType::Int(bits) => analysis.provider.int(bits),
            ElementaryType::FixedBytes(width) => analysis.provider.fixed_bytes(width),
            ElementaryType::Bytes => analysis.provider.bytes(location),
            ElementaryType::String => analysis.provider.string(location),
        }
    }

    /// Resolve a possibly dotted type path: own scope outward, then the
    /// global contract namespace; `C.S` names member `S` of contract `C`.
    fn lookup_type_name(
        analysis: &Analysis,
        bindings: &Bindings,
        contract: Option<NodeId>,
        path: &IdentifierPath,
    ) -> Option<TypeDecl> {
        let first = &path.segments[0].name;

        if path.segments.len() == 1 {
            if let Some(current) = contract {
                let found = bindings.lookup_member(analysis, current, first);
                for decl in found {
                    match decl.kind {
                        MemberKind::Struct => return Some(TypeDecl::Struct(decl.id)),
                        MemberKind::Enum => return Some(TypeDecl::Enum(decl.id)),
                        _ => {}
                    }
                }
            }
            return bindings
                .global_contracts
                .get(first)
                .map(|id| TypeDecl::Contract(*id));
        }

        // dotted: the first segment names a contract, the last a type in it
        let container = bindings.global_contracts.get(first)?;
        let found = bindings.lookup_member(analysis, *container, &path.last().name);
        found.into_iter().find_map(|decl| match decl.kind {
            MemberKind::Struct => Some(TypeDecl::Struct(decl.id)),
            MemberKind::Enum => Some(TypeDecl::Enum(decl.id)),
            _ => None,
        })
    }

    // ========================================================================
    // Signatures
    // ========================================================================

    fn resolve_struct_types(&mut self) {
        // Names first so structs can reference one another.
        for unit in self.units.iter() {
            for contract in unit.contracts() {
                for item in &contract.items {
                    match item {
                        ContractItem::Struct(def) => {
                            self.analysis.structs.insert(
                                def.id,
                                StructInfo {
                                    id: def.id,
                                    name: def.name.name.clone(),
                                    fields: Vec::new(),
                                    span: def.name.span,
                                },
                            );
                        }
                        ContractItem::Enum(def) => {
                            self.analysis.enums.insert(
                                def.id,
                                EnumInfo {
                                    id: def.id,
                                    name: def.name.name.clone(),
                                    variants: def
                                        .variants
                                        .iter()
                                        .map(|v| v.name.clone())
                                        .collect(),
                                    span: def.name.span,
                                },
                            );
                        }
                        _ => {}
                    }
                }
            }
        }

        // Field types second.
        for (file, unit) in self.units.iter().enumerate() {
            for contract in unit.contracts() {
                for item in &contract.items {
                    if let ContractItem::Struct(def) = item {
                        let mut fields = Vec::with_capacity(def.fields.len());
                        let mut field_types = Vec::with_capacity(def.fields.len());
                        for field in &def.fields {
                            let ty = Self::resolve_type(
                                &mut self.analysis,
                                &self.bindings,
                                self.diagnostics,
                                file,
                                Some(contract.id),
                                &field.type_name,
                                DataLocation::Storage,
                            );
                            self.analysis.locals.insert(field.id, ty);
                            let name = field
                                .name
                                .as_ref()
                                .map(|n| n.name.clone())
                                .unwrap_or_default();
                            fields.push((name, ty));
                            field_types.push(ty);
                        }
                        self.analysis.provider.register_struct_fields(def.id, field_types);
                        if let Some(info) = self.analysis.structs.get_mut(&def.id) {
                            info.fields = fields;
                        }
                    }
                }
            }
        }

        self.check_struct_recursion();
    }

    /// A struct containing itself by value has infinite size.
    fn check_struct_recursion(&mut self) {
        let struct_ids: Vec<NodeId> = self.analysis.structs.keys().copied().collect();
        for id in struct_ids {
            let mut trail = Vec::new();
            if self.struct_cycle(id, id, &mut trail) {
                let (name, span) = self
                    .analysis
                    .structs
                    .get(&id)
                    .map(|info| (info.name.clone(), info.span))
                    .unwrap_or((String::new(), Span::DUMMY));
                self.diagnostics.report(
                    Diagnostic::error(
                        "E3006",
                        format!("struct '{}' contains itself by value", name),
                        0,
                        span,
                    )
                    .with_caption("recursive struct"),
                );
            }
        }
    }

    fn struct_cycle(&self, needle: NodeId, current: NodeId, trail: &mut Vec<NodeId>) -> bool {
        if trail.contains(&current) {
            return false;
        }
        trail.push(current);
        let Some(info) = self.analysis.structs.get(&current) else {
            return false;
        };
        for (_, field_ty) in &info.fields {
            if let Type::Struct { decl, .. } = self.analysis.provider.get(*field_ty) {
                if *decl == needle || self.struct_cycle(needle, *decl, trail) {
                    return true;
                }
            }
        }
        false
    }

    fn resolve_signatures(&mut self) {
        for (file, unit) in self.units.iter().enumerate() {
            for contract in unit.contracts() {
                if !self.analysis.contracts.contains_key(&contract.id) {
                    continue;
                }
                for item in &contract.items {
                    match item {
                        ContractItem::Function(func) => {
                            self.bind_function(file, contract, func)
                        }
                        ContractItem::Modifier(def) => self.bind_modifier(file, contract, def),
                        ContractItem::Event(def) => self.bind_event(file, contract, def),
                        ContractItem::StateVar(var) => self.bind_state_var(file, contract, var),
                        ContractItem::Using(using) => self.bind_using(file, contract, using),
                        _ => {}
                    }
                }
            }
        }
    }

    fn param_location(func_visibility: Visibility) -> DataLocation {
        if func_visibility == Visibility::External {
            DataLocation::Calldata
        } else {
            DataLocation::Memory
        }
    }

    fn bind_params(
        &mut self,
        file: usize,
        contract: NodeId,
        params: &[VarDecl],
        default_location: DataLocation,
    ) -> (Vec<TypeId>, Vec<String>) {
        let mut types = Vec::with_capacity(params.len());
        let mut names = Vec::with_capacity(params.len());
        for param in params {
            let location = param.location.unwrap_or(default_location);
            let ty = Self::resolve_type(
                &mut self.analysis,
                &self.bindings,
                self.diagnostics,
                file,
                Some(contract),
                &param.type_name,
                location,
            );
            self.analysis.locals.insert(param.id, ty);
            types.push(ty);
            names.push(
                param
                    .name
                    .as_ref()
                    .map(|n| n.name.clone())
                    .unwrap_or_default(),
            );
        }
        (types, names)
    }

    fn bind_function(&mut self, file: usize, contract: &ContractDef, func: &FunctionDef) {
        let location = Self::param_location(func.visibility);
        let (params, param_names) = self.bind_params(file, contract.id, &func.params, location);
        let (returns, return_names) =
            self.bind_params(file, contract.id, &func.returns, DataLocation::Memory);

        let override_bases = self.resolve_override_bases(file, func.overrides.as_ref());

        self.analysis.functions.insert(
            func.id,
            FunctionSig {
                id: func.id,
                contract: contract.id,
                name: func.display_name().to_string(),
                kind: func.kind,
                params,
                returns,
                param_names,
                return_names,
                visibility: func.visibility,
                mutability: func.mutability,
                is_virtual: func.is_virtual
                    || contract.kind == ContractKind::Interface,
                override_bases,
                has_override: func.overrides.is_some(),
                implemented: func.body.is_some(),
                is_getter: false,
                span: func
                    .name
                    .as_ref()
                    .map(|n| n.span)
                    .unwrap_or(func.span),
            },
        );
    }

    fn bind_modifier(&mut self, file: usize, contract: &ContractDef, def: &ModifierDef) {
        let (params, _) =
            self.bind_params(file, contract.id, &def.params, DataLocation::Memory);
        let override_bases = self.resolve_override_bases(file, def.overrides.as_ref());
        self.analysis.modifiers.insert(
            def.id,
            ModifierSig {
                id: def.id,
                contract: contract.id,
                name: def.name.name.clone(),
                params,
                is_virtual: def.is_virtual,
                override_bases,
                has_override: def.overrides.is_some(),
                span: def.name.span,
            },
        );
    }

    fn bind_event(&mut self, file: usize, contract: &ContractDef, def: &EventDef) {
        let mut params = Vec::with_capacity(def.params.len());
        let mut indexed = Vec::with_capacity(def.params.len());
        let mut param_names = Vec::with_capacity(def.params.len());
        for param in &def.params {
            let ty = Self::resolve_type(
                &mut self.analysis,
                &self.bindings,
                self.diagnostics,
                file,
                Some(contract.id),
                &param.type_name,
                DataLocation::Memory,
            );
            self.analysis.locals.insert(param.id, ty);
            params.push(ty);
            indexed.push(param.indexed);
            param_names.push(
                param
                    .name
                    .as_ref()
                    .map(|n| n.name.clone())
                    .unwrap_or_default(),
            );
        }
        self.analysis.events.insert(
            def.id,
            EventSig {
                id: def.id,
                contract: contract.id,
                name: def.name.name.clone(),
                params,
                indexed,
                param_names,
                span: def.name.span,
            },
        );
    }

    fn bind_state_var(&mut self, file: usize, contract: &ContractDef, var: &StateVarDecl) {
        let ty = Self::resolve_type(
            &mut self.analysis,
            &self.bindings,
            self.diagnostics,
            file,
            Some(contract.id),
            &var.type_name,
            DataLocation::Storage,
        );
        self.analysis.state_vars.insert(
            var.id,
            StateVarInfo {
                id: var.id,
                contract: contract.id,
                name: var.name.name.clone(),
                ty,
                visibility: var.visibility,
                is_constant: var.is_constant,
                span: var.name.span,
            },
        );

        // A public state variable materialises a getter at the resolution
        // boundary: an external view function whose parameter chain peels
        // mappings and arrays off the declared type.
        if var.visibility == Visibility::Public {
            let (params, returns) = self.getter_signature(ty);
            let param_names = (0..params.len()).map(|_| String::new()).collect();
            let override_bases = self.resolve_override_bases(file, var.overrides.as_ref());
            self.analysis.functions.insert(
                var.id,
                FunctionSig {
                    id: var.id,
                    contract: contract.id,
                    name: var.name.name.clone(),
                    kind: FunctionKind::Function,
                    params,
                    returns,
                    param_names,
                    return_names: vec![String::new()],
                    visibility: Visibility::External,
                    mutability: StateMutability::View,
                    is_virtual: false,
                    override_bases,
                    has_override: var.overrides.is_some(),
                    implemented: true,
                    is_getter: true,
                    span: var.name.span,
                },
            );
            if let Some(info) = self.analysis.contracts.get_mut(&contract.id) {
                info.functions.push(var.id);
            }
        }
    }

    /// Peel mappings and arrays off a getter's declared type.
    fn getter_signature(&mut self, ty: TypeId) -> (Vec<TypeId>, Vec<TypeId>) {
        let mut params = Vec::new();
        let mut current = ty;
        loop {
            match self.analysis.provider.get(current).clone() {
                Type::Mapping { key, value } => {
                    params.push(key);
                    current = value;
                }
                Type::Array { base, .. } => {
                    let index = self.analysis.provider.uint256();
                    params.push(index);
                    current = base;
                }
                _ => break,
            }
        }
        (params, vec![current])
    }

    /// `using L for T;` attaches `L`'s functions to the member namespace of
    /// `T` (or of every type, for `*`) within this contract and everything
    /// derived from it.
    fn bind_using(&mut self, file: usize, contract: &ContractDef, using: &UsingForDirective) {
        let Some(&library) = self.bindings.global_contracts.get(&using.library.dotted()) else {
            self.diagnostics.report(
                Diagnostic::error(
                    "E2003",
                    format!("identifier '{}' not found", using.library.dotted()),
                    file,
                    using.library.span,
                )
                .with_caption("unknown library"),
            );
            return;
        };
        let is_library = self
            .analysis
            .contracts
            .get(&library)
            .map(|info| info.kind == ContractKind::Library)
            .unwrap_or(false);
        if !is_library {
            self.diagnostics.report(
                Diagnostic::error(
                    "E3037",
                    format!("'{}' is not a library", using.library.dotted()),
                    file,
                    using.library.span,
                )
                .with_caption("'using' requires a library"),
            );
            return;
        }
        let target = using.target.as_ref().map(|type_name| {
            Self::resolve_type(
                &mut self.analysis,
                &self.bindings,
                self.diagnostics,
                file,
                Some(contract.id),
                type_name,
                DataLocation::Storage,
            )
        });
        if let Some(info) = self.analysis.contracts.get_mut(&contract.id) {
            info.using_for.push((library, target));
        }
    }

    fn resolve_override_bases(
        &mut self,
        file: usize,
        overrides: Option<&OverrideSpecifier>,
    ) -> Vec<NodeId> {
        let Some(overrides) = overrides else {
            return Vec::new();
        };
        let mut bases = Vec::new();
        for base in &overrides.bases {
            match self.bindings.global_contracts.get(&base.dotted()) {
                Some(&decl) => bases.push(decl),
                None => self.diagnostics.report(
                    Diagnostic::error(
                        "E2003",
                        format!("identifier '{}' not found", base.dotted()),
                        file,
                        base.span,
                    )
                    .with_caption("unknown contract in override list"),
                ),
            }
        }
        bases
    }

    // ========================================================================
    // Layout, implementation status, interface
    // ========================================================================

    fn assign_storage_layout(&mut self) {
        let order: Vec<NodeId> = self.analysis.contract_order.clone();
        for contract_id in order {
            let linearized = self
                .analysis
                .contracts
                .get(&contract_id)
                .map(|info| info.linearized.clone())
                .unwrap_or_default();
            let mut slot = 0u64;
            let mut layout = FxHashMap::default();
            // base-most first
            for base in linearized.iter().rev() {
                let vars = self
                    .analysis
                    .contracts
                    .get(base)
                    .map(|info| info.state_vars.clone())
                    .unwrap_or_default();
                for var in vars {
                    let Some(info) = self.analysis.state_vars.get(&var) else {
                        continue;
                    };
                    if info.is_constant {
                        continue;
                    }
                    layout.insert(var, slot);
                    slot += self.analysis.provider.storage_size(info.ty);
                }
            }
            if let Some(info) = self.analysis.contracts.get_mut(&contract_id) {
                info.layout = layout;
            }
        }
    }

    fn compute_unimplemented(&mut self) {
        let order: Vec<NodeId> = self.analysis.contract_order.clone();
        for contract_id in order {
            let linearized = self
                .analysis
                .contracts
                .get(&contract_id)
                .map(|info| info.linearized.clone())
                .unwrap_or_default();
            // signature → (declaring callable, implemented anywhere)
            let mut seen: FxHashMap<String, (NodeId, bool)> = FxHashMap::default();
            for base in &linearized {
                let functions = self
                    .analysis
                    .contracts
                    .get(base)
                    .map(|info| info.functions.clone())
                    .unwrap_or_default();
                for func in functions {
                    let Some(sig) = self.analysis.functions.get(&func) else {
                        continue;
                    };
                    if sig.kind != FunctionKind::Function {
                        continue;
                    }
                    let key = self.signature_key(sig.id);
                    let entry = seen.entry(key).or_insert((func, sig.implemented));
                    entry.1 |= sig.implemented;
                }
            }
            let unimplemented: Vec<NodeId> = seen
                .into_iter()
                .filter(|(_, (_, implemented))| !implemented)
                .map(|(_, (id, _))| id)
                .collect();
            if let Some(info) = self.analysis.contracts.get_mut(&contract_id) {
                let mut list = unimplemented;
                list.sort();
                info.unimplemented = list;
            }
        }
    }

    /// Signature key for override/implementation matching: canonical
    /// external names where available, display names otherwise.
    pub(crate) fn signature_key_for(analysis: &Analysis, id: NodeId) -> String {
        let Some(sig) = analysis.functions.get(&id) else {
            return String::new();
        };
        let params: Vec<String> = sig
            .params
            .iter()
            .map(|param| {
                analysis
                    .provider
                    .canonical_name(*param)
                    .unwrap_or_else(|| analysis.provider.display(*param))
            })
            .collect();
        format!("{}({})", sig.name, params.join(","))
    }

    fn signature_key(&self, id: NodeId) -> String {
        Self::signature_key_for(&self.analysis, id)
    }

    fn compute_interfaces(&mut self) {
        let order: Vec<NodeId> = self.analysis.contract_order.clone();
        for contract_id in order {
            let info = self
                .analysis
                .contracts
                .get(&contract_id)
                .expect("contract registered");
            if info.kind == ContractKind::Library {
                continue;
            }
            let file = info.file;
            let linearized = info.linearized.clone();

            // most-derived definition per signature
            let mut by_signature: FxHashMap<String, NodeId> = FxHashMap::default();
            let mut signature_order: Vec<String> = Vec::new();
            for base in &linearized {
                let functions = self
                    .analysis
                    .contracts
                    .get(base)
                    .map(|base_info| base_info.functions.clone())
                    .unwrap_or_default();
                for func in functions {
                    let Some(sig) = self.analysis.functions.get(&func) else {
                        continue;
                    };
                    if sig.kind != FunctionKind::Function
                        || !sig.visibility.is_externally_visible()
                    {
                        continue;
                    }
                    let Some(signature) = sig.external_signature(&self.analysis.provider)
                    else {
                        continue;
                    };
                    if !by_signature.contains_key(&signature) {
                        by_signature.insert(signature.clone(), func);
                        signature_order.push(signature);
                    }
                }
            }

            let mut interface = Vec::with_capacity(signature_order.len());
            let mut by_selector: FxHashMap<[u8; 4], String> = FxHashMap::default();
            for signature in signature_order {
                let callable = by_signature[&signature];
                let sel = selector(&signature);
                if let Some(existing) = by_selector.get(&sel) {
                    let span = self
                        .analysis
                        .functions
                        .get(&callable)
                        .map(|sig| sig.span)
                        .unwrap_or(Span::DUMMY);
                    self.diagnostics.report(
                        Diagnostic::error(
                            "E3007",
                            format!(
                                "function signature hash collision between '{}' and '{}'",
                                signature, existing
                            ),
                            file,
                            span,
                        )
                        .with_caption("selector collision"),
                    );
                    continue;
                }
                by_selector.insert(sel, signature.clone());
                interface.push(InterfaceFunction {
                    selector: sel,
                    signature,
                    callable,
                });
            }
            interface.sort_by_key(|entry| entry.selector);

            if let Some(info) = self.analysis.contracts.get_mut(&contract_id) {
                info.interface = interface;
            }
        }
    }
}
