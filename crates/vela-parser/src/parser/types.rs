//! Type-name productions.

use super::{expr, ParseError, Parser};
use crate::ast::*;
use crate::token::Token;

/// Parse a type name, including array suffixes.
pub fn parse_type_name(parser: &mut Parser<'_>) -> Result<TypeName, ParseError> {
    let base = parse_base_type(parser)?;
    parse_array_suffixes(parser, base)
}

/// Wrap `base` in one `Array` layer per `[…]` suffix.
pub fn parse_array_suffixes(
    parser: &mut Parser<'_>,
    mut base: TypeName,
) -> Result<TypeName, ParseError> {
    while parser.check(&Token::LBracket) {
        let start = base.span();
        parser.advance();
        let length = if parser.check(&Token::RBracket) {
            None
        } else {
            Some(Box::new(expr::parse_expression(parser)?))
        };
        let end = parser.current_span();
        parser.expect(Token::RBracket)?;
        base = TypeName::Array {
            base: Box::new(base),
            length,
            span: start.to(end),
        };
    }
    Ok(base)
}

fn parse_base_type(parser: &mut Parser<'_>) -> Result<TypeName, ParseError> {
    let span = parser.current_span();
    match parser.current().clone() {
        Token::Bool => {
            parser.advance();
            Ok(TypeName::Elementary {
                ty: ElementaryType::Bool,
                span,
            })
        }
        Token::Address => {
            parser.advance();
            let (payable, span) = if parser.check(&Token::Payable) {
                let end = parser.current_span();
                parser.advance();
                (true, span.to(end))
            } else {
                (false, span)
            };
            Ok(TypeName::Elementary {
                ty: ElementaryType::Address { payable },
                span,
            })
        }
        Token::Uint(bits) => {
            parser.advance();
            Ok(TypeName::Elementary {
                ty: ElementaryType::Uint(bits),
                span,
            })
        }
        Token::Int(bits) => {
            parser.advance();
            Ok(TypeName::Elementary {
                ty: ElementaryType::Int(bits),
                span,
            })
        }
        Token::FixedBytes(width) => {
            parser.advance();
            Ok(TypeName::Elementary {
                ty: ElementaryType::FixedBytes(width),
                span,
            })
        }
        Token::Bytes => {
            parser.advance();
            Ok(TypeName::Elementary {
                ty: ElementaryType::Bytes,
                span,
            })
        }
        Token::String => {
            parser.advance();
            Ok(TypeName::Elementary {
                ty: ElementaryType::String,
                span,
            })
        }
        Token::Mapping => parse_mapping_type(parser),
        Token::Function => parse_function_type(parser),
        Token::Identifier(_) => {
            let path = parser.parse_identifier_path()?;
            Ok(TypeName::UserDefined {
                id: parser.node_id(),
                path,
            })
        }
        _ => Err(parser.unexpected("type name")),
    }
}

fn parse_mapping_type(parser: &mut Parser<'_>) -> Result<TypeName, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Mapping)?;
    parser.expect(Token::LParen)?;
    let key = parse_type_name(parser)?;
    parser.expect(Token::Arrow)?;
    let value = parse_type_name(parser)?;
    let end = parser.current_span();
    parser.expect(Token::RParen)?;
    Ok(TypeName::Mapping {
        key: Box::new(key),
        value: Box::new(value),
        span: start.to(end),
    })
}

/// `function (T1, T2) internal view returns (R)`
fn parse_function_type(parser: &mut Parser<'_>) -> Result<TypeName, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Function)?;
    let params = parse_type_list(parser)?;

    let mut visibility = Visibility::Internal;
    let mut mutability = StateMutability::NonPayable;
    let mut end = parser.previous_span();
    loop {
        match parser.current() {
            Token::Internal => {
                visibility = Visibility::Internal;
                end = parser.current_span();
                parser.advance();
            }
            Token::External => {
                visibility = Visibility::External;
                end = parser.current_span();
                parser.advance();
            }
            Token::Pure => {
                mutability = StateMutability::Pure;
                end = parser.current_span();
                parser.advance();
            }
            Token::View => {
                mutability = StateMutability::View;
                end = parser.current_span();
                parser.advance();
            }
            Token::Payable => {
                mutability = StateMutability::Payable;
                end = parser.current_span();
                parser.advance();
            }
            _ => break,
        }
    }

    let returns = if parser.eat(&Token::Returns) {
        let list = parse_type_list(parser)?;
        end = parser.previous_span();
        list
    } else {
        Vec::new()
    };

    Ok(TypeName::Function {
        params,
        returns,
        visibility,
        mutability,
        span: start.to(end),
    })
}

/// A parenthesised, comma-separated list of bare type names.
fn parse_type_list(parser: &mut Parser<'_>) -> Result<Vec<TypeName>, ParseError> {
    parser.expect(Token::LParen)?;
    let mut list = Vec::new();
    if !parser.check(&Token::RParen) {
        loop {
            list.push(parse_type_name(parser)?);
            if !parser.eat(&Token::Comma) {
                break;
            }
        }
    }
    parser.expect(Token::RParen)?;
    Ok(list)
}
