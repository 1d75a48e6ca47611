//! Top-level and contract-level productions.
//!
//! Contract bodies are parsed by leading-token dispatch only: the first token
//! of an item decides the production.

use super::{expr, stmt, types, ParseError, Parser};
use crate::ast::*;
use crate::token::Token;

/// Parse one top-level item: pragma, import or contract-like definition.
pub fn parse_source_item(parser: &mut Parser<'_>) -> Result<SourceItem, ParseError> {
    match parser.current() {
        Token::Pragma => parse_pragma(parser).map(SourceItem::Pragma),
        Token::Import => parse_import(parser).map(SourceItem::Import),
        Token::Abstract | Token::Contract | Token::Library | Token::Interface => {
            parse_contract(parser).map(SourceItem::Contract)
        }
        _ => Err(parser.unexpected("pragma, import, contract, library or interface")),
    }
}

fn parse_pragma(parser: &mut Parser<'_>) -> Result<PragmaDirective, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Pragma)?;
    let text_start = parser.current_span().start;
    let mut text_end = text_start;
    while !parser.check(&Token::Semicolon) {
        if parser.at_eof() {
            return Err(parser.unexpected("';'"));
        }
        text_end = parser.current_span().end;
        parser.advance();
    }
    let semi = parser.current_span();
    parser.advance();
    Ok(PragmaDirective {
        id: parser.node_id(),
        text: parser.slice(text_start, text_end).trim().to_string(),
        span: start.to(semi),
    })
}

fn parse_import(parser: &mut Parser<'_>) -> Result<ImportDirective, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Import)?;
    let path = match parser.current().clone() {
        Token::StringLiteral(path) => {
            parser.advance();
            path
        }
        _ => return Err(parser.unexpected("import path string")),
    };
    let alias = if parser.eat(&Token::As) {
        Some(parser.expect_identifier()?)
    } else {
        None
    };
    let semi = parser.current_span();
    parser.expect(Token::Semicolon)?;
    Ok(ImportDirective {
        id: parser.node_id(),
        path,
        alias,
        span: start.to(semi),
    })
}

fn parse_contract(parser: &mut Parser<'_>) -> Result<ContractDef, ParseError> {
    let start = parser.current_span();
    let is_abstract = parser.eat(&Token::Abstract);
    let kind = match parser.current() {
        Token::Contract => ContractKind::Contract,
        Token::Library => ContractKind::Library,
        Token::Interface => ContractKind::Interface,
        _ => return Err(parser.unexpected("contract, library or interface")),
    };
    parser.advance();
    let name = parser.expect_identifier()?;

    let mut bases = Vec::new();
    if parser.eat(&Token::Is) {
        loop {
            let base_name = parser.parse_identifier_path()?;
            let mut span = base_name.span;
            let args = if parser.check(&Token::LParen) {
                let (args, args_span) = expr::parse_call_arguments(parser)?;
                span = span.to(args_span);
                Some(args)
            } else {
                None
            };
            bases.push(InheritanceSpecifier {
                name: base_name,
                args,
                span,
            });
            if !parser.eat(&Token::Comma) {
                break;
            }
        }
    }

    parser.expect(Token::LBrace)?;
    let mut contract_items = Vec::new();
    while !parser.check(&Token::RBrace) {
        if parser.at_eof() {
            return Err(parser.unexpected("'}'"));
        }
        contract_items.push(parse_contract_item(parser)?);
    }
    let end = parser.current_span();
    parser.advance(); // consume '}'

    Ok(ContractDef {
        id: parser.node_id(),
        kind,
        is_abstract,
        name,
        bases,
        items: contract_items,
        span: start.to(end),
    })
}

fn parse_contract_item(parser: &mut Parser<'_>) -> Result<ContractItem, ParseError> {
    match parser.current() {
        Token::Function | Token::Constructor | Token::Fallback | Token::Receive => {
            parse_function(parser).map(ContractItem::Function)
        }
        Token::Modifier => parse_modifier(parser).map(ContractItem::Modifier),
        Token::Struct => parse_struct(parser).map(ContractItem::Struct),
        Token::Enum => parse_enum(parser).map(ContractItem::Enum),
        Token::Event => parse_event(parser).map(ContractItem::Event),
        Token::Using => parse_using(parser).map(ContractItem::Using),
        _ => parse_state_variable(parser).map(ContractItem::StateVar),
    }
}

fn parse_function(parser: &mut Parser<'_>) -> Result<FunctionDef, ParseError> {
    let start = parser.current_span();
    let kind = match parser.current() {
        Token::Function => FunctionKind::Function,
        Token::Constructor => FunctionKind::Constructor,
        Token::Fallback => FunctionKind::Fallback,
        Token::Receive => FunctionKind::Receive,
        _ => return Err(parser.unexpected("function definition")),
    };
    parser.advance();

    let name = if kind == FunctionKind::Function {
        Some(parser.expect_identifier()?)
    } else {
        None
    };

    let params = parse_parameter_list(parser)?;

    let mut visibility = None;
    let mut mutability = StateMutability::NonPayable;
    let mut is_virtual = false;
    let mut overrides = None;
    let mut invocations = Vec::new();
    let mut returns = Vec::new();

    loop {
        match parser.current() {
            Token::Public | Token::Private | Token::Internal | Token::External => {
                let vis = match parser.current() {
                    Token::Public => Visibility::Public,
                    Token::Private => Visibility::Private,
                    Token::Internal => Visibility::Internal,
                    _ => Visibility::External,
                };
                if visibility.is_some() {
                    return Err(parser.unexpected("a single visibility specifier"));
                }
                visibility = Some(vis);
                parser.advance();
            }
            Token::Pure => {
                mutability = StateMutability::Pure;
                parser.advance();
            }
            Token::View => {
                mutability = StateMutability::View;
                parser.advance();
            }
            Token::Payable => {
                mutability = StateMutability::Payable;
                parser.advance();
            }
            Token::Virtual => {
                is_virtual = true;
                parser.advance();
            }
            Token::Override => {
                overrides = Some(parse_override_specifier(parser)?);
            }
            Token::Returns => {
                parser.advance();
                returns = parse_parameter_list(parser)?;
            }
            Token::Identifier(_) => {
                invocations.push(parse_modifier_invocation(parser)?);
            }
            Token::LBrace | Token::Semicolon => break,
            _ => return Err(parser.unexpected("function attribute, '{' or ';'")),
        }
    }

    let (body, end) = if parser.check(&Token::Semicolon) {
        let semi = parser.current_span();
        parser.advance();
        (None, semi)
    } else {
        let block = stmt::parse_block(parser)?;
        let span = block.span;
        (Some(block), span)
    };

    Ok(FunctionDef {
        id: parser.node_id(),
        kind,
        name,
        params,
        returns,
        visibility: visibility.unwrap_or(Visibility::Public),
        mutability,
        is_virtual,
        overrides,
        invocations,
        body,
        span: start.to(end),
    })
}

/// `(type [location] [name], …)`
pub fn parse_parameter_list(parser: &mut Parser<'_>) -> Result<Vec<VarDecl>, ParseError> {
    parser.expect(Token::LParen)?;
    let mut params = Vec::new();
    if !parser.check(&Token::RParen) {
        loop {
            params.push(parse_var_decl(parser)?);
            if !parser.eat(&Token::Comma) {
                break;
            }
        }
    }
    parser.expect(Token::RParen)?;
    Ok(params)
}

/// A single typed declaration with optional data location and name.
fn parse_var_decl(parser: &mut Parser<'_>) -> Result<VarDecl, ParseError> {
    let type_name = types::parse_type_name(parser)?;
    let mut span = type_name.span();
    let location = parse_data_location(parser);
    let name = if matches!(parser.current(), Token::Identifier(_)) {
        let ident = parser.expect_identifier()?;
        span = span.to(ident.span);
        Some(ident)
    } else {
        None
    };
    Ok(VarDecl {
        id: parser.node_id(),
        type_name,
        location,
        name,
        span,
    })
}

pub fn parse_data_location(parser: &mut Parser<'_>) -> Option<DataLocation> {
    let location = match parser.current() {
        Token::Memory => DataLocation::Memory,
        Token::Storage => DataLocation::Storage,
        Token::Calldata => DataLocation::Calldata,
        _ => return None,
    };
    parser.advance();
    Some(location)
}

fn parse_override_specifier(parser: &mut Parser<'_>) -> Result<OverrideSpecifier, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Override)?;
    let mut bases = Vec::new();
    let mut span = start;
    if parser.check(&Token::LParen) {
        parser.advance();
        if !parser.check(&Token::RParen) {
            loop {
                bases.push(parser.parse_identifier_path()?);
                if !parser.eat(&Token::Comma) {
                    break;
                }
            }
        }
        span = span.to(parser.current_span());
        parser.expect(Token::RParen)?;
    }
    Ok(OverrideSpecifier { bases, span })
}

fn parse_modifier_invocation(parser: &mut Parser<'_>) -> Result<ModifierInvocation, ParseError> {
    let name = parser.parse_identifier_path()?;
    let mut span = name.span;
    let args = if parser.check(&Token::LParen) {
        let (args, args_span) = expr::parse_call_arguments(parser)?;
        span = span.to(args_span);
        Some(args)
    } else {
        None
    };
    Ok(ModifierInvocation {
        id: parser.node_id(),
        name,
        args,
        span,
    })
}

fn parse_modifier(parser: &mut Parser<'_>) -> Result<ModifierDef, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Modifier)?;
    let name = parser.expect_identifier()?;
    let params = if parser.check(&Token::LParen) {
        parse_parameter_list(parser)?
    } else {
        Vec::new()
    };
    let mut is_virtual = false;
    let mut overrides = None;
    loop {
        match parser.current() {
            Token::Virtual => {
                is_virtual = true;
                parser.advance();
            }
            Token::Override => overrides = Some(parse_override_specifier(parser)?),
            _ => break,
        }
    }
    let body = stmt::parse_block(parser)?;
    let span = start.to(body.span);
    Ok(ModifierDef {
        id: parser.node_id(),
        name,
        params,
        is_virtual,
        overrides,
        body,
        span,
    })
}

fn parse_struct(parser: &mut Parser<'_>) -> Result<StructDef, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Struct)?;
    let name = parser.expect_identifier()?;
    parser.expect(Token::LBrace)?;
    let mut fields = Vec::new();
    while !parser.check(&Token::RBrace) {
        if parser.at_eof() {
            return Err(parser.unexpected("'}'"));
        }
        let type_name = types::parse_type_name(parser)?;
        let field_name = parser.expect_identifier()?;
        let span = type_name.span().to(field_name.span);
        parser.expect(Token::Semicolon)?;
        fields.push(VarDecl {
            id: parser.node_id(),
            type_name,
            location: None,
            name: Some(field_name),
            span,
        });
    }
    let end = parser.current_span();
    parser.advance();
    Ok(StructDef {
        id: parser.node_id(),
        name,
        fields,
        span: start.to(end),
    })
}

fn parse_enum(parser: &mut Parser<'_>) -> Result<EnumDef, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Enum)?;
    let name = parser.expect_identifier()?;
    parser.expect(Token::LBrace)?;
    let mut variants = Vec::new();
    if !parser.check(&Token::RBrace) {
        loop {
            variants.push(parser.expect_identifier()?);
            if !parser.eat(&Token::Comma) {
                break;
            }
        }
    }
    let end = parser.current_span();
    parser.expect(Token::RBrace)?;
    Ok(EnumDef {
        id: parser.node_id(),
        name,
        variants,
        span: start.to(end),
    })
}

fn parse_event(parser: &mut Parser<'_>) -> Result<EventDef, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Event)?;
    let name = parser.expect_identifier()?;
    parser.expect(Token::LParen)?;
    let mut params = Vec::new();
    if !parser.check(&Token::RParen) {
        loop {
            let type_name = types::parse_type_name(parser)?;
            let indexed = parser.eat(&Token::Indexed);
            let mut span = type_name.span();
            let param_name = if matches!(parser.current(), Token::Identifier(_)) {
                let ident = parser.expect_identifier()?;
                span = span.to(ident.span);
                Some(ident)
            } else {
                None
            };
            params.push(EventParam {
                id: parser.node_id(),
                type_name,
                indexed,
                name: param_name,
                span,
            });
            if !parser.eat(&Token::Comma) {
                break;
            }
        }
    }
    parser.expect(Token::RParen)?;
    let end = parser.current_span();
    parser.expect(Token::Semicolon)?;
    Ok(EventDef {
        id: parser.node_id(),
        name,
        params,
        span: start.to(end),
    })
}

fn parse_using(parser: &mut Parser<'_>) -> Result<UsingForDirective, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Using)?;
    let library = parser.parse_identifier_path()?;
    parser.expect(Token::For)?;
    let target = if parser.eat(&Token::Star) {
        None
    } else {
        Some(types::parse_type_name(parser)?)
    };
    let end = parser.current_span();
    parser.expect(Token::Semicolon)?;
    Ok(UsingForDirective {
        id: parser.node_id(),
        library,
        target,
        span: start.to(end),
    })
}

/// `type [visibility|constant|override]* name [= initializer] ;`
fn parse_state_variable(parser: &mut Parser<'_>) -> Result<StateVarDecl, ParseError> {
    let start = parser.current_span();
    let type_name = types::parse_type_name(parser)?;

    let mut visibility = Visibility::Internal;
    let mut is_constant = false;
    let mut overrides = None;
    loop {
        match parser.current() {
            Token::Public => {
                visibility = Visibility::Public;
                parser.advance();
            }
            Token::Private => {
                visibility = Visibility::Private;
                parser.advance();
            }
            Token::Internal => {
                visibility = Visibility::Internal;
                parser.advance();
            }
            Token::Constant => {
                is_constant = true;
                parser.advance();
            }
            Token::Override => overrides = Some(parse_override_specifier(parser)?),
            _ => break,
        }
    }

    let name = parser.expect_identifier()?;
    let initializer = if parser.eat(&Token::Assign) {
        Some(expr::parse_expression(parser)?)
    } else {
        None
    };
    let end = parser.current_span();
    parser.expect(Token::Semicolon)?;

    Ok(StateVarDecl {
        id: parser.node_id(),
        type_name,
        visibility,
        is_constant,
        overrides,
        name,
        initializer,
        span: start.to(end),
    })
}
