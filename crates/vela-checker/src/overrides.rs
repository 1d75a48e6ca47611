//! Override legality and ambiguity checking.
//!
//! For each contract two signature-indexed views are built: the callables it
//! declares itself and the ones it inherits. Legality (virtual flags,
//! override lists, visibility and mutability changes) is enforced per
//! same-signature equivalence class. Ambiguity detection works on the
//! undirected graph of override edges collapsed into a super-root: an
//! inherited set of same-signature definitions requires an explicit override
//! iff its cardinality exceeds one and the set minus cut vertices still has
//! more than one element. Cut vertices come from the standard
//! discovery-depth/low-link DFS.

use crate::analysis::{Analysis, FunctionSig};
use crate::binder::{Binder, Bindings, MemberKind};
use crate::diagnostics::{Diagnostic, Diagnostics};
use rustc_hash::{FxHashMap, FxHashSet};
use vela_parser::ast::{FunctionKind, NodeId, Visibility};

/// Run the override checker over every contract.
pub fn check_overrides(analysis: &mut Analysis, bindings: &Bindings, diagnostics: &mut Diagnostics) {
    let order = analysis.contract_order.clone();
    // Record every override edge first; ambiguity detection walks the whole
    // lattice and must not depend on declaration order.
    for contract in &order {
        record_edges(analysis, bindings, *contract);
    }
    for contract in order {
        check_contract(analysis, bindings, diagnostics, contract);
    }
}

fn record_edges(analysis: &mut Analysis, bindings: &Bindings, contract: NodeId) {
    let Some(info) = analysis.contracts.get(&contract) else {
        return;
    };
    let direct_bases = info.direct_bases.clone();
    let own_functions = info.functions.clone();
    let own_modifiers = info.modifiers.clone();

    for func in own_functions {
        let Some(sig) = analysis.functions.get(&func) else {
            continue;
        };
        if sig.kind != FunctionKind::Function {
            continue;
        }
        let key = Binder::signature_key_for(analysis, func);
        let targets = override_targets(analysis, &direct_bases, &key);
        if !targets.is_empty() {
            analysis.overrides.insert(func, targets);
        }
    }

    for modifier in own_modifiers {
        let Some(sig) = analysis.modifiers.get(&modifier).cloned() else {
            continue;
        };
        let mut targets = Vec::new();
        for base in &direct_bases {
            for decl in bindings.lookup_member(analysis, *base, &sig.name) {
                if decl.kind == MemberKind::Modifier && !targets.contains(&decl.id) {
                    targets.push(decl.id);
                }
            }
        }
        if !targets.is_empty() {
            analysis.overrides.insert(modifier, targets);
        }
    }
}

fn check_contract(
    analysis: &mut Analysis,
    bindings: &Bindings,
    diagnostics: &mut Diagnostics,
    contract: NodeId,
) {
    let Some(info) = analysis.contracts.get(&contract) else {
        return;
    };
    let file = info.file;
    let direct_bases = info.direct_bases.clone();
    let own_functions = info.functions.clone();
    let own_modifiers = info.modifiers.clone();

    // Legality of every own definition against what it overrides.
    let mut own_signatures: FxHashSet<String> = FxHashSet::default();
    for func in own_functions {
        let Some(sig) = analysis.functions.get(&func).cloned() else {
            continue;
        };
        if sig.kind != FunctionKind::Function {
            continue;
        }
        let key = Binder::signature_key_for(analysis, func);
        own_signatures.insert(key.clone());

        // a function clashing with an inherited modifier of the same name
        for base in &direct_bases {
            for decl in bindings.lookup_member(analysis, *base, &sig.name) {
                if decl.kind == MemberKind::Modifier {
                    diagnostics.report(
                        Diagnostic::error(
                            "E3013",
                            format!(
                                "'{}' overrides a modifier with a function",
                                sig.name
                            ),
                            file,
                            sig.span,
                        )
                        .with_caption("kind mismatch"),
                    );
                }
            }
        }

        let targets = override_targets(analysis, &direct_bases, &key);
        if targets.is_empty() {
            if sig.has_override && !sig.is_getter {
                diagnostics.report(
                    Diagnostic::error(
                        "E3009",
                        format!("function '{}' overrides nothing", sig.name),
                        file,
                        sig.span,
                    )
                    .with_caption("superfluous override"),
                );
            }
            continue;
        }

        check_legality(analysis, diagnostics, file, &sig, &targets);
        analysis.overrides.insert(func, targets);
    }

    // Modifier overrides: signatures must match exactly.
    for modifier in own_modifiers {
        let Some(sig) = analysis.modifiers.get(&modifier).cloned() else {
            continue;
        };
        let mut targets = Vec::new();
        for base in &direct_bases {
            for decl in bindings.lookup_member(analysis, *base, &sig.name) {
                match decl.kind {
                    MemberKind::Modifier => {
                        if !targets.contains(&decl.id) {
                            targets.push(decl.id);
                        }
                    }
                    MemberKind::Function => {
                        diagnostics.report(
                            Diagnostic::error(
                                "E3013",
                                format!(
                                    "'{}' overrides a function with a modifier",
                                    sig.name
                                ),
                                file,
                                sig.span,
                            )
                            .with_caption("kind mismatch"),
                        );
                    }
                    _ => {}
                }
            }
        }
        if targets.is_empty() {
            continue;
        }
        for target in &targets {
            let Some(base_sig) = analysis.modifiers.get(target) else {
                continue;
            };
            if base_sig.params != sig.params {
                diagnostics.report(
                    Diagnostic::error(
                        "E3016",
                        format!(
                            "override of modifier '{}' changes its parameter list",
                            sig.name
                        ),
                        file,
                        sig.span,
                    )
                    .with_caption("signature must match exactly"),
                );
            }
            if !base_sig.is_virtual {
                diagnostics.report(
                    Diagnostic::error(
                        "E3008",
                        format!("cannot override non-virtual modifier '{}'", sig.name),
                        file,
                        sig.span,
                    )
                    .with_caption("missing 'virtual' on the base modifier"),
                );
            }
        }
        if !sig.has_override {
            diagnostics.report(
                Diagnostic::error(
                    "E3009",
                    format!("overriding modifier '{}' is missing the override specifier", sig.name),
                    file,
                    sig.span,
                )
                .with_caption("add 'override'"),
            );
        }
        analysis.overrides.insert(modifier, targets);
    }

    // Ambiguity of inherited definitions the contract does not redefine.
    check_inherited_ambiguity(analysis, diagnostics, contract, file, &direct_bases, &own_signatures);
}

/// The definition of `signature` seen through each direct base: the first
/// defining contract along that base's linearised list.
fn override_targets(
    analysis: &Analysis,
    direct_bases: &[NodeId],
    signature: &str,
) -> Vec<NodeId> {
    let mut targets = Vec::new();
    for base in direct_bases {
        let Some(base_info) = analysis.contracts.get(base) else {
            continue;
        };
        'path: for ancestor in &base_info.linearized {
            let Some(ancestor_info) = analysis.contracts.get(ancestor) else {
                continue;
            };
            for func in &ancestor_info.functions {
                if Binder::signature_key_for(analysis, *func) == signature {
                    if !targets.contains(func) {
                        targets.push(*func);
                    }
                    break 'path;
                }
            }
        }
    }
    targets
}

fn check_legality(
    analysis: &Analysis,
    diagnostics: &mut Diagnostics,
    file: usize,
    sig: &FunctionSig,
    targets: &[NodeId],
) {
    for target in targets {
        let Some(base_sig) = analysis.functions.get(target) else {
            continue;
        };
        let base_contract = analysis
            .contracts
            .get(&base_sig.contract)
            .map(|info| (info.name.clone(), info.file))
            .unwrap_or_default();

        if !base_sig.is_virtual {
            diagnostics.report(
                Diagnostic::error(
                    "E3008",
                    format!(
                        "cannot override non-virtual function '{}.{}'",
                        base_contract.0, base_sig.name
                    ),
                    file,
                    sig.span,
                )
                .with_caption("overriding here")
                .with_secondary(
                    base_contract.1,
                    base_sig.span,
                    "base function lacks 'virtual'",
                ),
            );
        }

        // Visibility may only relax from external to public.
        let visibility_ok = sig.visibility == base_sig.visibility
            || (base_sig.visibility == Visibility::External
                && sig.visibility == Visibility::Public);
        if !visibility_ok {
            diagnostics.report(
                Diagnostic::error(
                    "E3011",
                    format!(
                        "override of '{}' changes visibility from {} to {}",
                        sig.name, base_sig.visibility, sig.visibility
                    ),
                    file,
                    sig.span,
                )
                .with_caption("only external may become public"),
            );
        }

        // Mutability may only narrow.
        if sig.mutability.restrictiveness() < base_sig.mutability.restrictiveness() {
            diagnostics.report(
                Diagnostic::error(
                    "E3012",
                    format!(
                        "override of '{}' relaxes state mutability from {} to {}",
                        sig.name, base_sig.mutability, sig.mutability
                    ),
                    file,
                    sig.span,
                )
                .with_caption("mutability may only narrow"),
            );
        }

        if sig.returns != base_sig.returns
            && !analysis.same_external_params(&sig.returns, &base_sig.returns)
        {
            diagnostics.report(
                Diagnostic::error(
                    "E3014",
                    format!("override of '{}' changes the return types", sig.name),
                    file,
                    sig.span,
                )
                .with_caption("return types must match"),
            );
        }
    }

    if !sig.has_override {
        diagnostics.report(
            Diagnostic::error(
                "E3009",
                format!(
                    "overriding function '{}' is missing the override specifier",
                    sig.name
                ),
                file,
                sig.span,
            )
            .with_caption("add 'override'"),
        );
    }

    // With several overridden bases the list must name each of them, and
    // nothing else.
    let needed: FxHashSet<NodeId> = targets
        .iter()
        .filter_map(|target| analysis.functions.get(target).map(|s| s.contract))
        .collect();
    if needed.len() > 1 || !sig.override_bases.is_empty() {
        let listed: FxHashSet<NodeId> = sig.override_bases.iter().copied().collect();
        if needed.len() > 1 {
            for missing in needed.difference(&listed) {
                let name = analysis
                    .contracts
                    .get(missing)
                    .map(|info| info.name.clone())
                    .unwrap_or_default();
                diagnostics.report(
                    Diagnostic::error(
                        "E3010",
                        format!(
                            "override list of '{}' is missing contract '{}'",
                            sig.name, name
                        ),
                        file,
                        sig.span,
                    )
                    .with_caption("name every overridden base"),
                );
            }
        }
        for surplus in listed.difference(&needed) {
            let name = analysis
                .contracts
                .get(surplus)
                .map(|info| info.name.clone())
                .unwrap_or_default();
            diagnostics.report(
                Diagnostic::error(
                    "E3010",
                    format!(
                        "override list of '{}' names contract '{}', which does not define it",
                        sig.name, name
                    ),
                    file,
                    sig.span,
                )
                .with_caption("surplus entry in override list"),
            );
        }
    }
}

fn check_inherited_ambiguity(
    analysis: &Analysis,
    diagnostics: &mut Diagnostics,
    contract: NodeId,
    file: usize,
    direct_bases: &[NodeId],
    own_signatures: &FxHashSet<String>,
) {
    if direct_bases.len() < 2 {
        return;
    }
    let Some(info) = analysis.contracts.get(&contract) else {
        return;
    };

    // Every inherited definition per signature, across the whole lattice.
    let mut classes: FxHashMap<String, Vec<NodeId>> = FxHashMap::default();
    let mut class_order: Vec<String> = Vec::new();
    for base in info.linearized.iter().skip(1) {
        let Some(base_info) = analysis.contracts.get(base) else {
            continue;
        };
        for func in &base_info.functions {
            let Some(sig) = analysis.functions.get(func) else {
                continue;
            };
            if sig.kind != FunctionKind::Function {
                continue;
            }
            let key = Binder::signature_key_for(analysis, *func);
            if own_signatures.contains(&key) {
                continue;
            }
            let entry = classes.entry(key.clone()).or_default();
            if entry.is_empty() {
                class_order.push(key);
            }
            if !entry.contains(func) {
                entry.push(*func);
            }
        }
    }

    for key in class_order {
        let defs = &classes[&key];
        if defs.len() <= 1 {
            // a single inherited definition never needs an explicit override
            continue;
        }
        let cut = cut_vertices(analysis, defs);
        let remaining: Vec<NodeId> = defs
            .iter()
            .filter(|def| !cut.contains(def))
            .copied()
            .collect();
        if remaining.len() > 1 {
            let names: Vec<String> = remaining
                .iter()
                .filter_map(|def| analysis.functions.get(def))
                .filter_map(|sig| analysis.contracts.get(&sig.contract))
                .map(|base| base.name.clone())
                .collect();
            let mut diagnostic = Diagnostic::error(
                "E3015",
                format!(
                    "derived contract must override function '{}' inherited from {}",
                    key.split('(').next().unwrap_or(&key),
                    names.join(" and "),
                ),
                file,
                info.span,
            )
            .with_caption("ambiguous inherited definitions");
            for def in &remaining {
                if let Some(sig) = analysis.functions.get(def) {
                    let def_file = analysis
                        .contracts
                        .get(&sig.contract)
                        .map(|c| c.file)
                        .unwrap_or(0);
                    diagnostic =
                        diagnostic.with_secondary(def_file, sig.span, "inherited definition");
                }
            }
            diagnostics.report(diagnostic);
        }
    }
}

/// Cut vertices of the override graph of one signature class.
///
/// Nodes are the inherited definitions plus their override ancestors,
/// collapsed under an artificial super-root that adopts every definition
/// overriding nothing. A non-root node `u` is a cut vertex iff it has a DFS
/// child `v` with `low[v] >= depth[u]`.
fn cut_vertices(analysis: &Analysis, defs: &[NodeId]) -> FxHashSet<NodeId> {
    // collect nodes: definitions plus transitive override targets
    let mut nodes: Vec<NodeId> = Vec::new();
    let mut work: Vec<NodeId> = defs.to_vec();
    while let Some(id) = work.pop() {
        if nodes.contains(&id) {
            continue;
        }
        nodes.push(id);
        if let Some(targets) = analysis.overrides.get(&id) {
            work.extend(targets.iter().copied());
        }
    }
    nodes.sort();

    // index 0 is the super-root
    let index_of = |id: NodeId| nodes.iter().position(|n| *n == id).map(|p| p + 1);
    let count = nodes.len() + 1;
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut connect = |adjacency: &mut Vec<Vec<usize>>, a: usize, b: usize| {
        if !adjacency[a].contains(&b) {
            adjacency[a].push(b);
            adjacency[b].push(a);
        }
    };
    for (position, id) in nodes.iter().enumerate() {
        let node = position + 1;
        match analysis.overrides.get(id) {
            Some(targets) if !targets.is_empty() => {
                for target in targets {
                    if let Some(target_index) = index_of(*target) {
                        connect(&mut adjacency, node, target_index);
                    }
                }
            }
            // overrides nothing: adopt under the super-root
            _ => connect(&mut adjacency, node, 0),
        }
    }

    struct Finder<'g> {
        adjacency: &'g [Vec<usize>],
        depth: Vec<i32>,
        low: Vec<i32>,
        parent: Vec<i32>,
        cut: FxHashSet<usize>,
    }
    impl Finder<'_> {
        fn run(&mut self, u: usize, d: i32) {
            self.depth[u] = d;
            self.low[u] = d;
            for index in 0..self.adjacency[u].len() {
                let v = self.adjacency[u][index];
                if self.depth[v] == -1 {
                    self.parent[v] = u as i32;
                    self.run(v, d + 1);
                    // the root is never a cut vertex here
                    if self.low[v] >= self.depth[u] && self.parent[u] != -1 {
                        self.cut.insert(u);
                    }
                    self.low[u] = self.low[u].min(self.low[v]);
                } else if v as i32 != self.parent[u] {
                    self.low[u] = self.low[u].min(self.depth[v]);
                }
            }
        }
    }

    let mut finder = Finder {
        adjacency: &adjacency,
        depth: vec![-1; count],
        low: vec![-1; count],
        parent: vec![-1; count],
        cut: FxHashSet::default(),
    };
    finder.run(0, 0);

    finder
        .cut
        .into_iter()
        .map(|index| nodes[index - 1])
        .collect()
}
