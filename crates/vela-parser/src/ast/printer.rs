//! AST re-serialisation.
//!
//! Renders a parsed unit back to source text. The output normalises
//! whitespace but preserves structure: parsing the printed text yields a
//! tree that prints identically, which is the round-trip contract the
//! parser tests rely on.

use super::*;
use std::fmt::Write;

/// Render a source unit.
pub fn print_unit(unit: &SourceUnit) -> String {
    let mut out = String::new();
    for item in &unit.items {
        match item {
            SourceItem::Pragma(pragma) => {
                let _ = writeln!(out, "pragma {};", pragma.text);
            }
            SourceItem::Import(import) => match &import.alias {
                Some(alias) => {
                    let _ = writeln!(out, "import \"{}\" as {};", import.path, alias.name);
                }
                None => {
                    let _ = writeln!(out, "import \"{}\";", import.path);
                }
            },
            SourceItem::Contract(contract) => print_contract(&mut out, contract),
        }
    }
    out
}

fn print_contract(out: &mut String, contract: &ContractDef) {
    if contract.is_abstract {
        out.push_str("abstract ");
    }
    let _ = write!(out, "{} {}", contract.kind, contract.name.name);
    if !contract.bases.is_empty() {
        out.push_str(" is ");
        for (position, base) in contract.bases.iter().enumerate() {
            if position > 0 {
                out.push_str(", ");
            }
            out.push_str(&base.name.dotted());
            if let Some(args) = &base.args {
                out.push('(');
                print_expr_list(out, args);
                out.push(')');
            }
        }
    }
    out.push_str(" {\n");
    for item in &contract.items {
        print_contract_item(out, item);
    }
    out.push_str("}\n");
}

fn print_contract_item(out: &mut String, item: &ContractItem) {
    match item {
        ContractItem::StateVar(var) => {
            out.push_str("    ");
            print_type_name(out, &var.type_name);
            match var.visibility {
                Visibility::Internal => {}
                other => {
                    let _ = write!(out, " {}", other);
                }
            }
            if var.is_constant {
                out.push_str(" constant");
            }
            let _ = write!(out, " {}", var.name.name);
            if let Some(init) = &var.initializer {
                out.push_str(" = ");
                print_expression(out, init);
            }
            out.push_str(";\n");
        }
        ContractItem::Function(func) => print_function(out, func),
        ContractItem::Modifier(def) => {
            let _ = write!(out, "    modifier {}", def.name.name);
            if !def.params.is_empty() {
                out.push('(');
                print_params(out, &def.params);
                out.push(')');
            }
            if def.is_virtual {
                out.push_str(" virtual");
            }
            print_override(out, def.overrides.as_ref());
            out.push(' ');
            print_block(out, &def.body, 1);
        }
        ContractItem::Struct(def) => {
            let _ = write!(out, "    struct {} {{\n", def.name.name);
            for field in &def.fields {
                out.push_str("        ");
                print_type_name(out, &field.type_name);
                if let Some(name) = &field.name {
                    let _ = write!(out, " {}", name.name);
                }
                out.push_str(";\n");
            }
            out.push_str("    }\n");
        }
        ContractItem::Enum(def) => {
            let _ = write!(out, "    enum {} {{ ", def.name.name);
            for (position, variant) in def.variants.iter().enumerate() {
                if position > 0 {
                    out.push_str(", ");
                }
                out.push_str(&variant.name);
            }
            out.push_str(" }\n");
        }
        ContractItem::Event(def) => {
            let _ = write!(out, "    event {}(", def.name.name);
            for (position, param) in def.params.iter().enumerate() {
                if position > 0 {
                    out.push_str(", ");
                }
                print_type_name(out, &param.type_name);
                if param.indexed {
                    out.push_str(" indexed");
                }
                if let Some(name) = &param.name {
                    let _ = write!(out, " {}", name.name);
                }
            }
            out.push_str(");\n");
        }
        ContractItem::Using(using) => {
            let _ = write!(out, "    using {} for ", using.library.dotted());
            match &using.target {
                Some(target) => print_type_name(out, target),
                None => out.push('*'),
            }
            out.push_str(";\n");
        }
    }
}

fn print_function(out: &mut String, func: &FunctionDef) {
    out.push_str("    ");
    match func.kind {
        FunctionKind::Function => {
            let name = func.name.as_ref().map(|n| n.name.as_str()).unwrap_or("");
            let _ = write!(out, "function {}", name);
        }
        FunctionKind::Constructor => out.push_str("constructor"),
        FunctionKind::Fallback => out.push_str("fallback"),
        FunctionKind::Receive => out.push_str("receive"),
    }
    out.push('(');
    print_params(out, &func.params);
    out.push(')');
    if func.kind != FunctionKind::Constructor {
        let _ = write!(out, " {}", func.visibility);
    }
    match func.mutability {
        StateMutability::NonPayable => {}
        other => {
            let _ = write!(out, " {}", other);
        }
    }
    if func.is_virtual {
        out.push_str(" virtual");
    }
    print_override(out, func.overrides.as_ref());
    for invocation in &func.invocations {
        let _ = write!(out, " {}", invocation.name.dotted());
        if let Some(args) = &invocation.args {
            out.push('(');
            print_expr_list(out, args);
            out.push(')');
        }
    }
    if !func.returns.is_empty() {
        out.push_str(" returns (");
        print_params(out, &func.returns);
        out.push(')');
    }
    match &func.body {
        Some(body) => {
            out.push(' ');
            print_block(out, body, 1);
        }
        None => out.push_str(";\n"),
    }
}

fn print_override(out: &mut String, overrides: Option<&OverrideSpecifier>) {
    if let Some(spec) = overrides {
        out.push_str(" override");
        if !spec.bases.is_empty() {
            out.push('(');
            for (position, base) in spec.bases.iter().enumerate() {
                if position > 0 {
                    out.push_str(", ");
                }
                out.push_str(&base.dotted());
            }
            out.push(')');
        }
    }
}

fn print_params(out: &mut String, params: &[VarDecl]) {
    for (position, param) in params.iter().enumerate() {
        if position > 0 {
            out.push_str(", ");
        }
        print_type_name(out, &param.type_name);
        if let Some(location) = param.location {
            let _ = write!(out, " {}", location);
        }
        if let Some(name) = &param.name {
            let _ = write!(out, " {}", name.name);
        }
    }
}

fn print_type_name(out: &mut String, type_name: &TypeName) {
    match type_name {
        TypeName::Elementary { ty, .. } => {
            let _ = write!(out, "{}", ty);
        }
        TypeName::UserDefined { path, .. } => out.push_str(&path.dotted()),
        TypeName::Array { base, length, .. } => {
            print_type_name(out, base);
            out.push('[');
            if let Some(length) = length {
                print_expression(out, length);
            }
            out.push(']');
        }
        TypeName::Mapping { key, value, .. } => {
            out.push_str("mapping(");
            print_type_name(out, key);
            out.push_str(" => ");
            print_type_name(out, value);
            out.push(')');
        }
        TypeName::Function {
            params,
            returns,
            visibility,
            mutability,
            ..
        } => {
            out.push_str("function (");
            for (position, param) in params.iter().enumerate() {
                if position > 0 {
                    out.push_str(", ");
                }
                print_type_name(out, param);
            }
            out.push(')');
            let _ = write!(out, " {}", visibility);
            if *mutability != StateMutability::NonPayable {
                let _ = write!(out, " {}", mutability);
            }
            if !returns.is_empty() {
                out.push_str(" returns (");
                for (position, ret) in returns.iter().enumerate() {
                    if position > 0 {
                        out.push_str(", ");
                    }
                    print_type_name(out, ret);
                }
                out.push(')');
            }
        }
    }
}

fn indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str("    ");
    }
}

fn print_block(out: &mut String, block: &Block, level: usize) {
    out.push_str("{\n");
    for statement in &block.statements {
        print_statement(out, statement, level + 1);
    }
    indent(out, level);
    out.push_str("}\n");
}

fn print_statement(out: &mut String, statement: &Statement, level: usize) {
    indent(out, level);
    match statement {
        Statement::Block(block) => print_block(out, block, level),
        Statement::VariableDecl(decl) => {
            print_type_name(out, &decl.decl.type_name);
            if let Some(location) = decl.decl.location {
                let _ = write!(out, " {}", location);
            }
            if let Some(name) = &decl.decl.name {
                let _ = write!(out, " {}", name.name);
            }
            if let Some(init) = &decl.initializer {
                out.push_str(" = ");
                print_expression(out, init);
            }
            out.push_str(";\n");
        }
        Statement::Expression(stmt) => {
            print_expression(out, &stmt.expression);
            out.push_str(";\n");
        }
        Statement::If(stmt) => {
            out.push_str("if (");
            print_expression(out, &stmt.condition);
            out.push_str(") ");
            print_branch(out, &stmt.then_branch, level);
            if let Some(else_branch) = &stmt.else_branch {
                indent(out, level);
                out.push_str("else ");
                print_branch(out, else_branch, level);
            }
        }
        Statement::While(stmt) => {
            out.push_str("while (");
            print_expression(out, &stmt.condition);
            out.push_str(") ");
            print_branch(out, &stmt.body, level);
        }
        Statement::DoWhile(stmt) => {
            out.push_str("do ");
            print_branch(out, &stmt.body, level);
            indent(out, level);
            out.push_str("while (");
            print_expression(out, &stmt.condition);
            out.push_str(");\n");
        }
        Statement::For(stmt) => {
            out.push_str("for (");
            if let Some(init) = &stmt.init {
                print_simple_statement(out, init);
            }
            out.push_str("; ");
            if let Some(condition) = &stmt.condition {
                print_expression(out, condition);
            }
            out.push_str("; ");
            if let Some(update) = &stmt.update {
                print_expression(out, update);
            }
            out.push_str(") ");
            print_branch(out, &stmt.body, level);
        }
        Statement::Break(_) => out.push_str("break;\n"),
        Statement::Continue(_) => out.push_str("continue;\n"),
        Statement::Return(stmt) => {
            out.push_str("return");
            if let Some(value) = &stmt.value {
                out.push(' ');
                print_expression(out, value);
            }
            out.push_str(";\n");
        }
        Statement::Emit(stmt) => {
            out.push_str("emit ");
            print_expression(out, &stmt.call);
            out.push_str(";\n");
        }
        Statement::Placeholder(_) => out.push_str("_;\n"),
        Statement::Assembly(stmt) => {
            let _ = write!(out, "assembly {{ {} }}", stmt.text);
            out.push('\n');
        }
    }
}

/// A `for` initialiser: a statement without its trailing semicolon/newline.
fn print_simple_statement(out: &mut String, statement: &Statement) {
    let mut inner = String::new();
    print_statement(&mut inner, statement, 0);
    out.push_str(inner.trim_end().trim_end_matches(';'));
}

fn print_branch(out: &mut String, statement: &Statement, level: usize) {
    match statement {
        Statement::Block(block) => print_block(out, block, level),
        other => {
            out.push('\n');
            print_statement(out, other, level + 1);
        }
    }
}

fn print_expression(out: &mut String, expr: &Expression) {
    match expr {
        Expression::Assignment(assign) => {
            print_expression(out, &assign.lhs);
            let op = match assign.op {
                AssignOp::Assign => "=",
                AssignOp::Add => "+=",
                AssignOp::Sub => "-=",
                AssignOp::Mul => "*=",
                AssignOp::Div => "/=",
                AssignOp::Mod => "%=",
                AssignOp::BitAnd => "&=",
                AssignOp::BitOr => "|=",
                AssignOp::BitXor => "^=",
                AssignOp::Shl => "<<=",
                AssignOp::Shr => ">>=",
            };
            let _ = write!(out, " {} ", op);
            print_expression(out, &assign.rhs);
        }
        Expression::Conditional(cond) => {
            print_expression(out, &cond.condition);
            out.push_str(" ? ");
            print_expression(out, &cond.true_expr);
            out.push_str(" : ");
            print_expression(out, &cond.false_expr);
        }
        Expression::Binary(binary) => {
            out.push('(');
            print_expression(out, &binary.left);
            let _ = write!(out, " {} ", binary.op);
            print_expression(out, &binary.right);
            out.push(')');
        }
        Expression::Unary(unary) => {
            if unary.prefix {
                let _ = write!(out, "{}", unary.op);
                print_expression(out, &unary.operand);
            } else {
                print_expression(out, &unary.operand);
                let _ = write!(out, "{}", unary.op);
            }
        }
        Expression::FunctionCall(call) => {
            print_expression(out, &call.callee);
            out.push('(');
            print_expr_list(out, &call.args);
            out.push(')');
        }
        Expression::New(new) => {
            out.push_str("new ");
            print_type_name(out, &new.type_name);
        }
        Expression::MemberAccess(access) => {
            print_expression(out, &access.expr);
            let _ = write!(out, ".{}", access.member.name);
        }
        Expression::IndexAccess(access) => {
            print_expression(out, &access.base);
            out.push('[');
            if let Some(index) = &access.index {
                print_expression(out, index);
            }
            out.push(']');
        }
        Expression::Identifier(ident) => out.push_str(&ident.name),
        Expression::Literal(literal) => match &literal.kind {
            LiteralKind::Number(text) => out.push_str(text),
            LiteralKind::Bool(value) => {
                let _ = write!(out, "{}", value);
            }
            LiteralKind::String(text) => {
                let _ = write!(out, "\"{}\"", text.escape_default());
            }
        },
        Expression::Tuple(tuple) => {
            out.push('(');
            print_expr_list(out, &tuple.components);
            out.push(')');
        }
        Expression::ElementaryTypeName(node) => {
            let _ = write!(out, "{}", node.ty);
        }
    }
}

fn print_expr_list(out: &mut String, exprs: &[Expression]) {
    for (position, expr) in exprs.iter().enumerate() {
        if position > 0 {
            out.push_str(", ");
        }
        print_expression(out, expr);
    }
}
