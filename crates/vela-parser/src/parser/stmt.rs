//! Statement productions.
//!
//! The interesting contract here is the statement-level ambiguity between a
//! type name and an expression: `Foo.Bar[3] x;` declares a variable while
//! `Foo.Bar[3] = y;` assigns into an array. The parser speculatively
//! accumulates the dotted path and bracketed indices and decides on the token
//! that follows: an identifier or data-location keyword makes it a type name,
//! anything else reinterprets the accumulated structure as an expression.
//! The path is never re-parsed.

use super::{expr, items, types, ParseError, Parser};
use crate::ast::*;
use crate::token::{Span, Token};

/// Parse a `{ … }` block.
pub fn parse_block(parser: &mut Parser<'_>) -> Result<Block, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::LBrace)?;
    let mut statements = Vec::new();
    while !parser.check(&Token::RBrace) {
        if parser.at_eof() {
            return Err(parser.unexpected("'}'"));
        }
        statements.push(parse_statement(parser)?);
    }
    let end = parser.current_span();
    parser.advance();
    Ok(Block {
        id: parser.node_id(),
        statements,
        span: start.to(end),
    })
}

pub fn parse_statement(parser: &mut Parser<'_>) -> Result<Statement, ParseError> {
    match parser.current() {
        Token::LBrace => Ok(Statement::Block(parse_block(parser)?)),
        Token::If => parse_if(parser),
        Token::While => parse_while(parser),
        Token::Do => parse_do_while(parser),
        Token::For => parse_for(parser),
        Token::Break => {
            let span = parser.current_span();
            parser.advance();
            let end = parser.current_span();
            parser.expect(Token::Semicolon)?;
            Ok(Statement::Break(BreakStatement {
                id: parser.node_id(),
                span: span.to(end),
            }))
        }
        Token::Continue => {
            let span = parser.current_span();
            parser.advance();
            let end = parser.current_span();
            parser.expect(Token::Semicolon)?;
            Ok(Statement::Continue(ContinueStatement {
                id: parser.node_id(),
                span: span.to(end),
            }))
        }
        Token::Return => parse_return(parser),
        Token::Emit => parse_emit(parser),
        Token::Assembly => parse_assembly(parser),
        Token::Identifier(name) if name.as_str() == "_" && matches!(parser.peek(), Token::Semicolon) => {
            let span = parser.current_span();
            parser.advance();
            let end = parser.current_span();
            parser.advance();
            Ok(Statement::Placeholder(PlaceholderStatement {
                id: parser.node_id(),
                span: span.to(end),
            }))
        }
        _ => {
            let statement = parse_simple_statement(parser)?;
            parser.expect(Token::Semicolon)?;
            Ok(statement)
        }
    }
}

/// A declaration or expression statement, without the trailing semicolon.
/// Shared with the `for` initialiser.
pub fn parse_simple_statement(parser: &mut Parser<'_>) -> Result<Statement, ParseError> {
    match parser.current() {
        // An elementary type starts a declaration unless it is immediately
        // called, which makes it a cast expression (`uint8(x)`).
        tok if tok.is_elementary_type() && !matches!(parser.peek(), Token::LParen) => {
            let type_name = types::parse_type_name(parser)?;
            finish_variable_declaration(parser, type_name)
        }
        Token::Mapping => {
            let type_name = types::parse_type_name(parser)?;
            finish_variable_declaration(parser, type_name)
        }
        Token::Identifier(name) if name.as_str() != "_" => parse_ambiguous_statement(parser),
        _ => {
            let expression = expr::parse_expression(parser)?;
            let span = expression.span();
            Ok(Statement::Expression(ExpressionStatement {
                id: parser.node_id(),
                expression,
                span,
            }))
        }
    }
}

/// The type-vs-expression lookahead described in the module docs.
fn parse_ambiguous_statement(parser: &mut Parser<'_>) -> Result<Statement, ParseError> {
    let path = parser.parse_identifier_path()?;

    // Accumulate bracketed indices; empty brackets can only be a type.
    let mut indices: Vec<(Option<Expression>, Span)> = Vec::new();
    while parser.check(&Token::LBracket) {
        let start = parser.current_span();
        parser.advance();
        let index = if parser.check(&Token::RBracket) {
            None
        } else {
            Some(expr::parse_expression(parser)?)
        };
        let end = parser.current_span();
        parser.expect(Token::RBracket)?;
        indices.push((index, start.to(end)));
    }

    let is_declaration = matches!(parser.current(), Token::Identifier(_))
        || parser.current().is_data_location();

    if is_declaration {
        let mut type_name = TypeName::UserDefined {
            id: parser.node_id(),
            path,
        };
        for (length, span) in indices {
            let span = type_name.span().to(span);
            type_name = TypeName::Array {
                base: Box::new(type_name),
                length: length.map(Box::new),
                span,
            };
        }
        finish_variable_declaration(parser, type_name)
    } else {
        let rebuilt = expr::expression_from_path(parser, path, indices)?;
        let rebuilt = expr::parse_postfix_continue(parser, rebuilt)?;
        let expression = expr::finish_expression(parser, rebuilt)?;
        let span = expression.span();
        Ok(Statement::Expression(ExpressionStatement {
            id: parser.node_id(),
            expression,
            span,
        }))
    }
}

fn finish_variable_declaration(
    parser: &mut Parser<'_>,
    type_name: TypeName,
) -> Result<Statement, ParseError> {
    let location = items::parse_data_location(parser);
    let name = parser.expect_identifier()?;
    let mut span = type_name.span().to(name.span);
    let decl = VarDecl {
        id: parser.node_id(),
        type_name,
        location,
        name: Some(name),
        span,
    };
    let initializer = if parser.eat(&Token::Assign) {
        let init = expr::parse_expression(parser)?;
        span = span.to(init.span());
        Some(init)
    } else {
        None
    };
    Ok(Statement::VariableDecl(VariableDeclStatement {
        id: parser.node_id(),
        decl,
        initializer,
        span,
    }))
}

fn parse_if(parser: &mut Parser<'_>) -> Result<Statement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::If)?;
    parser.expect(Token::LParen)?;
    let condition = expr::parse_expression(parser)?;
    parser.expect(Token::RParen)?;
    let then_branch = parse_statement(parser)?;
    let (else_branch, end) = if parser.eat(&Token::Else) {
        let else_branch = parse_statement(parser)?;
        let span = else_branch.span();
        (Some(Box::new(else_branch)), span)
    } else {
        (None, then_branch.span())
    };
    Ok(Statement::If(IfStatement {
        id: parser.node_id(),
        condition,
        then_branch: Box::new(then_branch),
        else_branch,
        span: start.to(end),
    }))
}

fn parse_while(parser: &mut Parser<'_>) -> Result<Statement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::While)?;
    parser.expect(Token::LParen)?;
    let condition = expr::parse_expression(parser)?;
    parser.expect(Token::RParen)?;
    let body = parse_statement(parser)?;
    let span = start.to(body.span());
    Ok(Statement::While(WhileStatement {
        id: parser.node_id(),
        condition,
        body: Box::new(body),
        span,
    }))
}

fn parse_do_while(parser: &mut Parser<'_>) -> Result<Statement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Do)?;
    let body = parse_statement(parser)?;
    parser.expect(Token::While)?;
    parser.expect(Token::LParen)?;
    let condition = expr::parse_expression(parser)?;
    parser.expect(Token::RParen)?;
    let end = parser.current_span();
    parser.expect(Token::Semicolon)?;
    Ok(Statement::DoWhile(DoWhileStatement {
        id: parser.node_id(),
        body: Box::new(body),
        condition,
        span: start.to(end),
    }))
}

fn parse_for(parser: &mut Parser<'_>) -> Result<Statement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::For)?;
    parser.expect(Token::LParen)?;

    let init = if parser.check(&Token::Semicolon) {
        None
    } else {
        Some(Box::new(parse_simple_statement(parser)?))
    };
    parser.expect(Token::Semicolon)?;

    let condition = if parser.check(&Token::Semicolon) {
        None
    } else {
        Some(expr::parse_expression(parser)?)
    };
    parser.expect(Token::Semicolon)?;

    let update = if parser.check(&Token::RParen) {
        None
    } else {
        Some(expr::parse_expression(parser)?)
    };
    parser.expect(Token::RParen)?;

    let body = parse_statement(parser)?;
    let span = start.to(body.span());
    Ok(Statement::For(ForStatement {
        id: parser.node_id(),
        init,
        condition,
        update,
        body: Box::new(body),
        span,
    }))
}

fn parse_return(parser: &mut Parser<'_>) -> Result<Statement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Return)?;
    let value = if parser.check(&Token::Semicolon) {
        None
    } else {
        Some(expr::parse_expression(parser)?)
    };
    let end = parser.current_span();
    parser.expect(Token::Semicolon)?;
    Ok(Statement::Return(ReturnStatement {
        id: parser.node_id(),
        value,
        span: start.to(end),
    }))
}

fn parse_emit(parser: &mut Parser<'_>) -> Result<Statement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Emit)?;
    let call = expr::parse_expression(parser)?;
    let end = parser.current_span();
    parser.expect(Token::Semicolon)?;
    if !matches!(call, Expression::FunctionCall(_)) {
        return Err(ParseError {
            kind: super::ParseErrorKind::Unsupported {
                what: "emit without an event call".to_string(),
            },
            span: start.to(end),
        });
    }
    Ok(Statement::Emit(EmitStatement {
        id: parser.node_id(),
        call,
        span: start.to(end),
    }))
}

/// `assembly { … }` — the body is recorded verbatim; its sub-language has
/// its own grammar and is treated as opaque here.
fn parse_assembly(parser: &mut Parser<'_>) -> Result<Statement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Assembly)?;
    let open = parser.current_span();
    parser.expect(Token::LBrace)?;

    let mut depth = 1usize;
    let close;
    loop {
        match parser.current() {
            Token::LBrace => {
                depth += 1;
                parser.advance();
            }
            Token::RBrace => {
                depth -= 1;
                if depth == 0 {
                    close = parser.current_span();
                    parser.advance();
                    break;
                }
                parser.advance();
            }
            Token::Eof => return Err(parser.unexpected("'}'")),
            _ => {
                parser.advance();
            }
        }
    }

    Ok(Statement::Assembly(AssemblyStatement {
        id: parser.node_id(),
        text: parser.slice(open.end, close.start).trim().to_string(),
        span: start.to(close),
    }))
}
