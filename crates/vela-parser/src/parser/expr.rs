//! Expression productions.
//!
//! Binary expressions use precedence climbing; everything the grammar treats
//! as a suffix (member access, calls, indexing, postfix `++`/`--`) is handled
//! by [`parse_postfix_continue`], which the statement parser also uses to
//! continue an expression rebuilt from a speculatively parsed type path.

use super::{types, ParseError, ParseErrorKind, Parser};
use crate::ast::*;
use crate::token::{Span, Token};

/// Parse a full expression (assignment level).
pub fn parse_expression(parser: &mut Parser<'_>) -> Result<Expression, ParseError> {
    let operand = parse_unary(parser)?;
    finish_expression(parser, operand)
}

/// Continue from a unary/postfix-complete operand through the binary,
/// conditional and assignment levels.
pub fn finish_expression(
    parser: &mut Parser<'_>,
    operand: Expression,
) -> Result<Expression, ParseError> {
    let lhs = parse_binary_continue(parser, operand, 1)?;

    // conditional
    let lhs = if parser.check(&Token::Question) {
        parser.advance();
        let true_expr = parse_expression(parser)?;
        parser.expect(Token::Colon)?;
        let false_expr = parse_expression(parser)?;
        let span = lhs.span().to(false_expr.span());
        Expression::Conditional(ConditionalExpression {
            id: parser.node_id(),
            condition: Box::new(lhs),
            true_expr: Box::new(true_expr),
            false_expr: Box::new(false_expr),
            span,
        })
    } else {
        lhs
    };

    // assignment (right associative)
    if let Some(op) = assign_op(parser.current()) {
        parser.advance();
        let rhs = parse_expression(parser)?;
        let span = lhs.span().to(rhs.span());
        return Ok(Expression::Assignment(AssignmentExpression {
            id: parser.node_id(),
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            span,
        }));
    }

    Ok(lhs)
}

fn assign_op(token: &Token) -> Option<AssignOp> {
    Some(match token {
        Token::Assign => AssignOp::Assign,
        Token::PlusAssign => AssignOp::Add,
        Token::MinusAssign => AssignOp::Sub,
        Token::StarAssign => AssignOp::Mul,
        Token::SlashAssign => AssignOp::Div,
        Token::PercentAssign => AssignOp::Mod,
        Token::AmpAssign => AssignOp::BitAnd,
        Token::PipeAssign => AssignOp::BitOr,
        Token::CaretAssign => AssignOp::BitXor,
        Token::ShlAssign => AssignOp::Shl,
        Token::ShrAssign => AssignOp::Shr,
        _ => return None,
    })
}

/// Binding power of a binary operator; higher binds tighter. The bool marks
/// right associativity (only `**`).
fn binary_op(token: &Token) -> Option<(BinaryOp, u8, bool)> {
    Some(match token {
        Token::PipePipe => (BinaryOp::Or, 1, false),
        Token::AmpAmp => (BinaryOp::And, 2, false),
        Token::Eq => (BinaryOp::Eq, 3, false),
        Token::NotEq => (BinaryOp::NotEq, 3, false),
        Token::Lt => (BinaryOp::Lt, 4, false),
        Token::Gt => (BinaryOp::Gt, 4, false),
        Token::LtEq => (BinaryOp::LtEq, 4, false),
        Token::GtEq => (BinaryOp::GtEq, 4, false),
        Token::Pipe => (BinaryOp::BitOr, 5, false),
        Token::Caret => (BinaryOp::BitXor, 6, false),
        Token::Amp => (BinaryOp::BitAnd, 7, false),
        Token::Shl => (BinaryOp::Shl, 8, false),
        Token::Shr => (BinaryOp::Shr, 8, false),
        Token::Plus => (BinaryOp::Add, 9, false),
        Token::Minus => (BinaryOp::Sub, 9, false),
        Token::Star => (BinaryOp::Mul, 10, false),
        Token::Slash => (BinaryOp::Div, 10, false),
        Token::Percent => (BinaryOp::Mod, 10, false),
        Token::StarStar => (BinaryOp::Pow, 11, true),
        _ => return None,
    })
}

/// Precedence climbing over an already-parsed left operand.
fn parse_binary_continue(
    parser: &mut Parser<'_>,
    mut lhs: Expression,
    min_prec: u8,
) -> Result<Expression, ParseError> {
    while let Some((op, prec, right_assoc)) = binary_op(parser.current()) {
        if prec < min_prec {
            break;
        }
        parser.advance();
        let rhs = parse_unary(parser)?;
        let next_min = if right_assoc { prec } else { prec + 1 };
        let rhs = parse_binary_continue(parser, rhs, next_min)?;
        let span = lhs.span().to(rhs.span());
        lhs = Expression::Binary(BinaryExpression {
            id: parser.node_id(),
            op,
            left: Box::new(lhs),
            right: Box::new(rhs),
            span,
        });
    }
    Ok(lhs)
}

/// Prefix operators, then a postfix-complete operand.
fn parse_unary(parser: &mut Parser<'_>) -> Result<Expression, ParseError> {
    let span = parser.current_span();
    let op = match parser.current() {
        Token::Minus => Some(UnaryOp::Neg),
        Token::Bang => Some(UnaryOp::Not),
        Token::Tilde => Some(UnaryOp::BitNot),
        Token::PlusPlus => Some(UnaryOp::Inc),
        Token::MinusMinus => Some(UnaryOp::Dec),
        _ => None,
    };
    if let Some(op) = op {
        parser.advance();
        let operand = parse_unary(parser)?;
        let span = span.to(operand.span());
        return Ok(Expression::Unary(UnaryExpression {
            id: parser.node_id(),
            op,
            prefix: true,
            operand: Box::new(operand),
            span,
        }));
    }

    let primary = parse_primary(parser)?;
    parse_postfix_continue(parser, primary)
}

/// Apply call/member/index/postfix-increment suffixes to `expr`.
pub fn parse_postfix_continue(
    parser: &mut Parser<'_>,
    mut expr: Expression,
) -> Result<Expression, ParseError> {
    loop {
        match parser.current() {
            Token::Dot => {
                parser.advance();
                let member = parser.expect_identifier()?;
                let span = expr.span().to(member.span);
                expr = Expression::MemberAccess(MemberAccessExpression {
                    id: parser.node_id(),
                    expr: Box::new(expr),
                    member,
                    span,
                });
            }
            Token::LParen => {
                let (args, args_span) = parse_call_arguments(parser)?;
                let span = expr.span().to(args_span);
                expr = Expression::FunctionCall(FunctionCallExpression {
                    id: parser.node_id(),
                    callee: Box::new(expr),
                    args,
                    span,
                });
            }
            Token::LBracket => {
                parser.advance();
                if parser.check(&Token::RBracket) {
                    return Err(ParseError {
                        kind: ParseErrorKind::MissingIndexExpression,
                        span: parser.current_span(),
                    });
                }
                let index = parse_expression(parser)?;
                let end = parser.current_span();
                parser.expect(Token::RBracket)?;
                let span = expr.span().to(end);
                expr = Expression::IndexAccess(IndexAccessExpression {
                    id: parser.node_id(),
                    base: Box::new(expr),
                    index: Some(Box::new(index)),
                    span,
                });
            }
            Token::PlusPlus | Token::MinusMinus => {
                let op = if parser.check(&Token::PlusPlus) {
                    UnaryOp::Inc
                } else {
                    UnaryOp::Dec
                };
                let end = parser.current_span();
                parser.advance();
                let span = expr.span().to(end);
                expr = Expression::Unary(UnaryExpression {
                    id: parser.node_id(),
                    op,
                    prefix: false,
                    operand: Box::new(expr),
                    span,
                });
            }
            _ => break,
        }
    }
    Ok(expr)
}

/// `( [expr (, expr)*] )` — returns the arguments and the span of the
/// parenthesised region.
pub fn parse_call_arguments(
    parser: &mut Parser<'_>,
) -> Result<(Vec<Expression>, Span), ParseError> {
    let start = parser.current_span();
    parser.expect(Token::LParen)?;
    let mut args = Vec::new();
    if !parser.check(&Token::RParen) {
        loop {
            args.push(parse_expression(parser)?);
            if !parser.eat(&Token::Comma) {
                break;
            }
        }
    }
    let end = parser.current_span();
    parser.expect(Token::RParen)?;
    Ok((args, start.to(end)))
}

fn parse_primary(parser: &mut Parser<'_>) -> Result<Expression, ParseError> {
    let span = parser.current_span();
    match parser.current().clone() {
        Token::Number(text) => {
            parser.advance();
            Ok(Expression::Literal(Literal {
                id: parser.node_id(),
                kind: LiteralKind::Number(text),
                span,
            }))
        }
        Token::True => {
            parser.advance();
            Ok(Expression::Literal(Literal {
                id: parser.node_id(),
                kind: LiteralKind::Bool(true),
                span,
            }))
        }
        Token::False => {
            parser.advance();
            Ok(Expression::Literal(Literal {
                id: parser.node_id(),
                kind: LiteralKind::Bool(false),
                span,
            }))
        }
        Token::StringLiteral(text) => {
            parser.advance();
            Ok(Expression::Literal(Literal {
                id: parser.node_id(),
                kind: LiteralKind::String(text),
                span,
            }))
        }
        Token::Identifier(name) => {
            parser.advance();
            Ok(Expression::Identifier(IdentifierExpression {
                id: parser.node_id(),
                name,
                span,
            }))
        }
        Token::New => {
            parser.advance();
            let type_name = types::parse_type_name(parser)?;
            let span = span.to(type_name.span());
            Ok(Expression::New(NewExpression {
                id: parser.node_id(),
                type_name,
                span,
            }))
        }
        // An elementary type in expression position is the callee of a cast.
        Token::Bool
        | Token::Address
        | Token::Uint(_)
        | Token::Int(_)
        | Token::FixedBytes(_)
        | Token::Bytes
        | Token::String => {
            let ty = match parser.advance() {
                Token::Bool => ElementaryType::Bool,
                Token::Address => {
                    let payable = parser.eat(&Token::Payable);
                    ElementaryType::Address { payable }
                }
                Token::Uint(bits) => ElementaryType::Uint(bits),
                Token::Int(bits) => ElementaryType::Int(bits),
                Token::FixedBytes(width) => ElementaryType::FixedBytes(width),
                Token::Bytes => ElementaryType::Bytes,
                Token::String => ElementaryType::String,
                _ => unreachable!(),
            };
            Ok(Expression::ElementaryTypeName(ElementaryTypeNameExpression {
                id: parser.node_id(),
                ty,
                span,
            }))
        }
        Token::LParen => {
            parser.advance();
            let mut components = Vec::new();
            if !parser.check(&Token::RParen) {
                loop {
                    components.push(parse_expression(parser)?);
                    if !parser.eat(&Token::Comma) {
                        break;
                    }
                }
            }
            let end = parser.current_span();
            parser.expect(Token::RParen)?;
            // A single parenthesised expression is just that expression; a
            // real tuple keeps the wrapper.
            if components.len() == 1 {
                Ok(components.pop().expect("len checked"))
            } else {
                Ok(Expression::Tuple(TupleExpression {
                    id: parser.node_id(),
                    components,
                    span: span.to(end),
                }))
            }
        }
        _ => Err(parser.unexpected("expression")),
    }
}

/// Rebuild an expression from a speculatively parsed identifier path plus
/// bracketed indices; used by the statement-level type-vs-expression
/// disambiguation. The path is never re-parsed.
pub fn expression_from_path(
    parser: &mut Parser<'_>,
    path: IdentifierPath,
    indices: Vec<(Option<Expression>, Span)>,
) -> Result<Expression, ParseError> {
    let mut segments = path.segments.into_iter();
    let first = segments.next().expect("identifier path is never empty");
    let mut expr = Expression::Identifier(IdentifierExpression {
        id: parser.node_id(),
        name: first.name,
        span: first.span,
    });
    for segment in segments {
        let span = expr.span().to(segment.span);
        expr = Expression::MemberAccess(MemberAccessExpression {
            id: parser.node_id(),
            expr: Box::new(expr),
            member: segment,
            span,
        });
    }
    for (index, index_span) in indices {
        let index = match index {
            Some(index) => index,
            None => {
                return Err(ParseError {
                    kind: ParseErrorKind::MissingIndexExpression,
                    span: index_span,
                })
            }
        };
        let span = expr.span().to(index_span);
        expr = Expression::IndexAccess(IndexAccessExpression {
            id: parser.node_id(),
            base: Box::new(expr),
            index: Some(Box::new(index)),
            span,
        });
    }
    Ok(expr)
}
