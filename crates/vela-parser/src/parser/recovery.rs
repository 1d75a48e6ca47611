//! Error recovery.
//!
//! After a parse error the parser gives up on the current production and
//! synchronises to the next top-level construct, skipping brace-balanced
//! regions so an error inside a contract body does not cascade.

use super::Parser;
use crate::token::Token;

/// Advance to the next token that can begin a top-level construct.
pub fn sync_to_top_level(parser: &mut Parser<'_>) {
    let mut depth = 0usize;
    while !parser.at_eof() {
        match parser.current() {
            Token::LBrace => {
                depth += 1;
                parser.advance();
            }
            Token::RBrace => {
                parser.advance();
                if depth > 0 {
                    depth -= 1;
                }
                // A closing brace at depth zero ends the broken construct.
                if depth == 0 {
                    return;
                }
            }
            Token::Pragma
            | Token::Import
            | Token::Contract
            | Token::Library
            | Token::Interface
            | Token::Abstract
                if depth == 0 =>
            {
                return;
            }
            _ => {
                parser.advance();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::Parser;

    #[test]
    fn test_recovery_reaches_next_contract() {
        // The first contract is broken; the second must still parse, so two
        // errors never hide each other.
        let source = "contract A { function 1 } contract B {}";
        let err = Parser::new("t.vela", source).unwrap().parse().unwrap_err();
        assert_eq!(err.len(), 1);
    }

    #[test]
    fn test_multiple_errors_reported() {
        let source = "contract A { function 1 } contract B { enum }";
        let err = Parser::new("t.vela", source).unwrap().parse().unwrap_err();
        assert_eq!(err.len(), 2);
    }
}
