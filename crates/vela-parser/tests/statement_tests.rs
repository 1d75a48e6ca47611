//! Parser tests for statements, with emphasis on the statement-level
//! type-vs-expression ambiguity.

use vela_parser::ast::*;
use vela_parser::Parser;

/// Parse a function body's statements out of a wrapper contract.
fn parse_body(body: &str) -> Vec<Statement> {
    let source = format!("contract T {{ function f() public {{ {} }} }}", body);
    let unit = Parser::new("test.vela", &source)
        .expect("lexing failed")
        .parse()
        .expect("parsing failed");
    let contract = unit.contracts().next().unwrap();
    let func = contract.functions().next().unwrap();
    func.body.as_ref().unwrap().statements.clone()
}

fn single(body: &str) -> Statement {
    let mut statements = parse_body(body);
    assert_eq!(statements.len(), 1, "expected one statement");
    statements.remove(0)
}

#[test]
fn elementary_declaration() {
    match single("uint x = 1;") {
        Statement::VariableDecl(decl) => {
            assert_eq!(decl.decl.name.as_ref().unwrap().name, "x");
            assert!(decl.initializer.is_some());
        }
        other => panic!("expected declaration, got {:?}", other),
    }
}

#[test]
fn elementary_cast_is_expression() {
    // `uint8(x);` starts with a type keyword but is a cast, not a declaration
    match single("uint8(x);") {
        Statement::Expression(stmt) => {
            assert!(matches!(stmt.expression, Expression::FunctionCall(_)));
        }
        other => panic!("expected expression, got {:?}", other),
    }
}

#[test]
fn user_type_declaration_by_identifier_lookahead() {
    match single("MyStruct memory s;") {
        Statement::VariableDecl(decl) => {
            assert!(matches!(decl.decl.type_name, TypeName::UserDefined { .. }));
            assert_eq!(decl.decl.location, Some(DataLocation::Memory));
        }
        other => panic!("expected declaration, got {:?}", other),
    }
}

#[test]
fn dotted_array_type_declaration() {
    // `Lib.Item[3] memory xs;` — path and indices become a type name
    match single("Lib.Item[3] memory xs;") {
        Statement::VariableDecl(decl) => match &decl.decl.type_name {
            TypeName::Array { base, length, .. } => {
                assert!(length.is_some());
                match base.as_ref() {
                    TypeName::UserDefined { path, .. } => assert_eq!(path.dotted(), "Lib.Item"),
                    other => panic!("expected user type, got {:?}", other),
                }
            }
            other => panic!("expected array type, got {:?}", other),
        },
        other => panic!("expected declaration, got {:?}", other),
    }
}

#[test]
fn indexed_assignment_is_expression() {
    // Same prefix as above, but the `=` makes it an index expression
    match single("items[3] = 5;") {
        Statement::Expression(stmt) => match stmt.expression {
            Expression::Assignment(assign) => {
                assert!(matches!(*assign.lhs, Expression::IndexAccess(_)));
            }
            other => panic!("expected assignment, got {:?}", other),
        },
        other => panic!("expected expression, got {:?}", other),
    }
}

#[test]
fn dotted_call_is_expression() {
    match single("lib.helper(1);") {
        Statement::Expression(stmt) => match stmt.expression {
            Expression::FunctionCall(call) => {
                assert!(matches!(*call.callee, Expression::MemberAccess(_)));
            }
            other => panic!("expected call, got {:?}", other),
        },
        other => panic!("expected expression, got {:?}", other),
    }
}

#[test]
fn empty_brackets_require_declaration() {
    // `T[] x;` is fine, `v[] + 1;` is not
    assert!(matches!(single("T[] memory x;"), Statement::VariableDecl(_)));
    let source = "contract T { function f() public { v[] + 1; } }";
    assert!(Parser::new("t.vela", source).unwrap().parse().is_err());
}

#[test]
fn control_flow_statements() {
    let statements = parse_body(
        "if (a) { b = 1; } else { b = 2; }
         while (a) { a = a - 1; }
         do { x = 1; } while (x < 3);
         for (uint i = 0; i < 10; i++) { s = s + i; }
         break;
         continue;
         return 1 + 2;",
    );
    assert!(matches!(statements[0], Statement::If(_)));
    assert!(matches!(statements[1], Statement::While(_)));
    assert!(matches!(statements[2], Statement::DoWhile(_)));
    assert!(matches!(statements[3], Statement::For(_)));
    assert!(matches!(statements[4], Statement::Break(_)));
    assert!(matches!(statements[5], Statement::Continue(_)));
    assert!(matches!(statements[6], Statement::Return(_)));
}

#[test]
fn for_loop_parts() {
    match single("for (uint i = 0; i < 10; i++) {}") {
        Statement::For(stmt) => {
            assert!(matches!(
                stmt.init.as_deref(),
                Some(Statement::VariableDecl(_))
            ));
            assert!(stmt.condition.is_some());
            assert!(stmt.update.is_some());
        }
        other => panic!("expected for, got {:?}", other),
    }
}

#[test]
fn emit_statement() {
    match single("emit Transfer(a, b, 1);") {
        Statement::Emit(stmt) => assert!(matches!(stmt.call, Expression::FunctionCall(_))),
        other => panic!("expected emit, got {:?}", other),
    }
}

#[test]
fn assembly_block_recorded_verbatim() {
    match single("assembly { let x := add(1, 2) { nested } }") {
        Statement::Assembly(stmt) => {
            assert_eq!(stmt.text, "let x := add(1, 2) { nested }");
        }
        other => panic!("expected assembly, got {:?}", other),
    }
}

#[test]
fn expression_precedence() {
    // 1 + 2 * 3 parses as 1 + (2 * 3)
    match single("x = 1 + 2 * 3;") {
        Statement::Expression(stmt) => match stmt.expression {
            Expression::Assignment(assign) => match *assign.rhs {
                Expression::Binary(add) => {
                    assert_eq!(add.op, BinaryOp::Add);
                    match *add.right {
                        Expression::Binary(mul) => assert_eq!(mul.op, BinaryOp::Mul),
                        other => panic!("expected mul on the right, got {:?}", other),
                    }
                }
                other => panic!("expected add, got {:?}", other),
            },
            other => panic!("expected assignment, got {:?}", other),
        },
        other => panic!("expected expression, got {:?}", other),
    }
}

#[test]
fn power_is_right_associative() {
    match single("x = 2 ** 3 ** 2;") {
        Statement::Expression(stmt) => match stmt.expression {
            Expression::Assignment(assign) => match *assign.rhs {
                Expression::Binary(outer) => {
                    assert_eq!(outer.op, BinaryOp::Pow);
                    assert!(matches!(*outer.left, Expression::Literal(_)));
                    assert!(matches!(*outer.right, Expression::Binary(_)));
                }
                other => panic!("expected pow, got {:?}", other),
            },
            other => panic!("expected assignment, got {:?}", other),
        },
        other => panic!("expected expression, got {:?}", other),
    }
}

#[test]
fn ternary_and_logical() {
    match single("x = a && b ? 1 : 2;") {
        Statement::Expression(stmt) => match stmt.expression {
            Expression::Assignment(assign) => {
                assert!(matches!(*assign.rhs, Expression::Conditional(_)));
            }
            other => panic!("expected assignment, got {:?}", other),
        },
        other => panic!("expected expression, got {:?}", other),
    }
}

#[test]
fn new_expression() {
    match single("c = new Child(1);") {
        Statement::Expression(stmt) => match stmt.expression {
            Expression::Assignment(assign) => match *assign.rhs {
                Expression::FunctionCall(call) => {
                    assert!(matches!(*call.callee, Expression::New(_)));
                }
                other => panic!("expected call of new, got {:?}", other),
            },
            other => panic!("expected assignment, got {:?}", other),
        },
        other => panic!("expected expression, got {:?}", other),
    }
}

#[test]
fn compound_assignment_ops() {
    match single("x += 2;") {
        Statement::Expression(stmt) => match stmt.expression {
            Expression::Assignment(assign) => {
                assert_eq!(assign.op, AssignOp::Add);
                assert_eq!(assign.op.binary_op(), Some(BinaryOp::Add));
            }
            other => panic!("expected assignment, got {:?}", other),
        },
        other => panic!("expected expression, got {:?}", other),
    }
}
