//! Read-only AST walker.
//!
//! A single visitor trait covers every read-only pass: each hook returns a
//! [`Flow`] that either continues into children, skips them, or aborts the
//! whole walk.

use super::*;

/// Control value returned by visitor hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    SkipChildren,
    Abort,
}

/// Visitor over a source unit. Hooks default to [`Flow::Continue`].
pub trait Visitor {
    fn visit_contract(&mut self, _contract: &ContractDef) -> Flow {
        Flow::Continue
    }
    fn visit_function(&mut self, _function: &FunctionDef) -> Flow {
        Flow::Continue
    }
    fn visit_modifier(&mut self, _modifier: &ModifierDef) -> Flow {
        Flow::Continue
    }
    fn visit_state_var(&mut self, _var: &StateVarDecl) -> Flow {
        Flow::Continue
    }
    fn visit_statement(&mut self, _statement: &Statement) -> Flow {
        Flow::Continue
    }
    fn visit_expression(&mut self, _expression: &Expression) -> Flow {
        Flow::Continue
    }
    fn visit_type_name(&mut self, _type_name: &TypeName) -> Flow {
        Flow::Continue
    }
}

macro_rules! flow {
    ($e:expr) => {
        match $e {
            Flow::Continue => {}
            Flow::SkipChildren => return Flow::Continue,
            Flow::Abort => return Flow::Abort,
        }
    };
}

macro_rules! descend {
    ($e:expr) => {
        if $e == Flow::Abort {
            return Flow::Abort;
        }
    };
}

pub fn walk_source_unit<V: Visitor>(visitor: &mut V, unit: &SourceUnit) -> Flow {
    for item in &unit.items {
        if let SourceItem::Contract(contract) = item {
            descend!(walk_contract(visitor, contract));
        }
    }
    Flow::Continue
}

pub fn walk_contract<V: Visitor>(visitor: &mut V, contract: &ContractDef) -> Flow {
    flow!(visitor.visit_contract(contract));
    for base in &contract.bases {
        if let Some(args) = &base.args {
            for arg in args {
                descend!(walk_expression(visitor, arg));
            }
        }
    }
    for item in &contract.items {
        match item {
            ContractItem::StateVar(var) => {
                flow!(visitor.visit_state_var(var));
                descend!(walk_type_name(visitor, &var.type_name));
                if let Some(init) = &var.initializer {
                    descend!(walk_expression(visitor, init));
                }
            }
            ContractItem::Function(func) => descend!(walk_function(visitor, func)),
            ContractItem::Modifier(modifier) => {
                flow!(visitor.visit_modifier(modifier));
                for param in &modifier.params {
                    descend!(walk_type_name(visitor, &param.type_name));
                }
                descend!(walk_block(visitor, &modifier.body));
            }
            ContractItem::Struct(def) => {
                for field in &def.fields {
                    descend!(walk_type_name(visitor, &field.type_name));
                }
            }
            ContractItem::Enum(_) => {}
            ContractItem::Event(def) => {
                for param in &def.params {
                    descend!(walk_type_name(visitor, &param.type_name));
                }
            }
            ContractItem::Using(using) => {
                if let Some(target) = &using.target {
                    descend!(walk_type_name(visitor, target));
                }
            }
        }
    }
    Flow::Continue
}

pub fn walk_function<V: Visitor>(visitor: &mut V, function: &FunctionDef) -> Flow {
    flow!(visitor.visit_function(function));
    for param in function.params.iter().chain(&function.returns) {
        descend!(walk_type_name(visitor, &param.type_name));
    }
    for invocation in &function.invocations {
        if let Some(args) = &invocation.args {
            for arg in args {
                descend!(walk_expression(visitor, arg));
            }
        }
    }
    if let Some(body) = &function.body {
        descend!(walk_block(visitor, body));
    }
    Flow::Continue
}

pub fn walk_block<V: Visitor>(visitor: &mut V, block: &Block) -> Flow {
    for statement in &block.statements {
        descend!(walk_statement(visitor, statement));
    }
    Flow::Continue
}

pub fn walk_statement<V: Visitor>(visitor: &mut V, statement: &Statement) -> Flow {
    flow!(visitor.visit_statement(statement));
    match statement {
        Statement::Block(block) => descend!(walk_block(visitor, block)),
        Statement::VariableDecl(decl) => {
            descend!(walk_type_name(visitor, &decl.decl.type_name));
            if let Some(init) = &decl.initializer {
                descend!(walk_expression(visitor, init));
            }
        }
        Statement::Expression(stmt) => descend!(walk_expression(visitor, &stmt.expression)),
        Statement::If(stmt) => {
            descend!(walk_expression(visitor, &stmt.condition));
            descend!(walk_statement(visitor, &stmt.then_branch));
            if let Some(else_branch) = &stmt.else_branch {
                descend!(walk_statement(visitor, else_branch));
            }
        }
        Statement::While(stmt) => {
            descend!(walk_expression(visitor, &stmt.condition));
            descend!(walk_statement(visitor, &stmt.body));
        }
        Statement::DoWhile(stmt) => {
            descend!(walk_statement(visitor, &stmt.body));
            descend!(walk_expression(visitor, &stmt.condition));
        }
        Statement::For(stmt) => {
            if let Some(init) = &stmt.init {
                descend!(walk_statement(visitor, init));
            }
            if let Some(condition) = &stmt.condition {
                descend!(walk_expression(visitor, condition));
            }
            if let Some(update) = &stmt.update {
                descend!(walk_expression(visitor, update));
            }
            descend!(walk_statement(visitor, &stmt.body));
        }
        Statement::Return(stmt) => {
            if let Some(value) = &stmt.value {
                descend!(walk_expression(visitor, value));
            }
        }
        Statement::Emit(stmt) => descend!(walk_expression(visitor, &stmt.call)),
        Statement::Break(_)
        | Statement::Continue(_)
        | Statement::Placeholder(_)
        | Statement::Assembly(_) => {}
    }
    Flow::Continue
}

pub fn walk_expression<V: Visitor>(visitor: &mut V, expression: &Expression) -> Flow {
    flow!(visitor.visit_expression(expression));
    match expression {
        Expression::Assignment(e) => {
            descend!(walk_expression(visitor, &e.lhs));
            descend!(walk_expression(visitor, &e.rhs));
        }
        Expression::Conditional(e) => {
            descend!(walk_expression(visitor, &e.condition));
            descend!(walk_expression(visitor, &e.true_expr));
            descend!(walk_expression(visitor, &e.false_expr));
        }
        Expression::Binary(e) => {
            descend!(walk_expression(visitor, &e.left));
            descend!(walk_expression(visitor, &e.right));
        }
        Expression::Unary(e) => descend!(walk_expression(visitor, &e.operand)),
        Expression::FunctionCall(e) => {
            descend!(walk_expression(visitor, &e.callee));
            for arg in &e.args {
                descend!(walk_expression(visitor, arg));
            }
        }
        Expression::New(e) => descend!(walk_type_name(visitor, &e.type_name)),
        Expression::MemberAccess(e) => descend!(walk_expression(visitor, &e.expr)),
        Expression::IndexAccess(e) => {
            descend!(walk_expression(visitor, &e.base));
            if let Some(index) = &e.index {
                descend!(walk_expression(visitor, index));
            }
        }
        Expression::Tuple(e) => {
            for component in &e.components {
                descend!(walk_expression(visitor, component));
            }
        }
        Expression::Identifier(_)
        | Expression::Literal(_)
        | Expression::ElementaryTypeName(_) => {}
    }
    Flow::Continue
}

pub fn walk_type_name<V: Visitor>(visitor: &mut V, type_name: &TypeName) -> Flow {
    flow!(visitor.visit_type_name(type_name));
    match type_name {
        TypeName::Array { base, length, .. } => {
            descend!(walk_type_name(visitor, base));
            if let Some(length) = length {
                descend!(walk_expression(visitor, length));
            }
        }
        TypeName::Mapping { key, value, .. } => {
            descend!(walk_type_name(visitor, key));
            descend!(walk_type_name(visitor, value));
        }
        TypeName::Function {
            params, returns, ..
        } => {
            for ty in params.iter().chain(returns) {
                descend!(walk_type_name(visitor, ty));
            }
        }
        TypeName::Elementary { .. } | TypeName::UserDefined { .. } => {}
    }
    Flow::Continue
}
