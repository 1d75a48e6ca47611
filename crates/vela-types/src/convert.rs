//! Implicit conversion and common-type rules.

use crate::provider::TypeProvider;
use crate::ty::{Type, TypeId};
use num_bigint::BigInt;
use num_traits::Signed;
use vela_parser::ast::DataLocation;

/// Is `from` implicitly convertible to `to`?
pub fn implicitly_convertible(provider: &TypeProvider, from: TypeId, to: TypeId) -> bool {
    if from == to {
        return true;
    }
    let from_ty = provider.get(from);
    let to_ty = provider.get(to);

    // The sentinel converts both ways so a single declaration error does not
    // produce a cascade of type errors.
    if from_ty.is_error() || to_ty.is_error() {
        return true;
    }

    match (from_ty, to_ty) {
        (Type::IntLiteral(value), Type::Int { bits, signed }) => {
            literal_fits(value, *bits, *signed)
        }
        (Type::IntLiteral(value), Type::FixedBytes(width)) => {
            !value.is_negative() && value.bits() <= u64::from(*width) * 8
        }
        (
            Type::Int {
                bits: from_bits,
                signed: from_signed,
            },
            Type::Int {
                bits: to_bits,
                signed: to_signed,
            },
        ) => {
            if from_signed == to_signed {
                from_bits <= to_bits
            } else {
                // unsigned widens into a strictly larger signed type
                !*from_signed && *to_signed && from_bits < to_bits
            }
        }
        (Type::FixedBytes(from_width), Type::FixedBytes(to_width)) => from_width <= to_width,
        (Type::Address { payable: true }, Type::Address { payable: false }) => true,
        (Type::Contract { .. }, Type::Address { payable: false }) => true,
        (Type::StringLiteral(_), Type::String { .. }) => true,
        (Type::StringLiteral(_), Type::Bytes { .. }) => true,
        (Type::StringLiteral(text), Type::FixedBytes(width)) => {
            text.len() <= usize::from(*width)
        }
        (
            Type::Array {
                base: from_base,
                length: from_len,
                ..
            },
            Type::Array {
                base: to_base,
                length: to_len,
                ..
            },
        ) => {
            let length_ok = match (from_len, to_len) {
                (_, None) => true,
                (Some(a), Some(b)) => a == b,
                (None, Some(_)) => false,
            };
            length_ok
                && (from_base == to_base || implicitly_convertible(provider, *from_base, *to_base))
        }
        (Type::Bytes { .. }, Type::Bytes { .. }) => true,
        (Type::String { .. }, Type::String { .. }) => true,
        (
            Type::Struct {
                decl: from_decl, ..
            },
            Type::Struct { decl: to_decl, .. },
        ) => from_decl == to_decl,
        (Type::Tuple(from_components), Type::Tuple(to_components)) => {
            from_components.len() == to_components.len()
                && from_components
                    .iter()
                    .zip(to_components)
                    .all(|(a, b)| implicitly_convertible(provider, *a, *b))
        }
        _ => false,
    }
}

/// Does a literal value fit into `intN`/`uintN`?
fn literal_fits(value: &BigInt, bits: u16, signed: bool) -> bool {
    if signed {
        // two's complement range
        let magnitude_bits = value.bits();
        if value.is_negative() {
            magnitude_bits <= u64::from(bits) - 1
                || (*value == -(BigInt::from(1) << usize::from(bits - 1)))
        } else {
            magnitude_bits <= u64::from(bits) - 1
        }
    } else {
        !value.is_negative() && value.bits() <= u64::from(bits)
    }
}

/// The narrowest integer type that can hold `value`, or `None` if it needs
/// more than 256 bits.
pub fn smallest_int_type(value: &BigInt) -> Option<Type> {
    let signed = value.is_negative();
    let mut bits = 8u16;
    while bits <= 256 {
        if literal_fits(value, bits, signed) {
            return Some(Type::Int { bits, signed });
        }
        bits += 8;
    }
    None
}

/// The type an ephemeral literal materialises as when stored: the narrowest
/// fitting integer for number literals, `string memory` for string literals.
pub fn mobile_type(provider: &mut TypeProvider, id: TypeId) -> Option<TypeId> {
    match provider.get(id).clone() {
        Type::IntLiteral(value) => smallest_int_type(&value).map(|ty| provider.intern(ty)),
        Type::StringLiteral(_) => Some(provider.string(DataLocation::Memory)),
        _ => Some(id),
    }
}

/// The common supertype of two types under implicit conversion, if any.
/// Used for arithmetic operands and equality comparisons.
pub fn common_type(provider: &mut TypeProvider, a: TypeId, b: TypeId) -> Option<TypeId> {
    if a == b {
        // Two equal literal types still need to become storable
        return mobile_type(provider, a);
    }

    // Two distinct literals: the narrowest type fitting both
    if let (Type::IntLiteral(va), Type::IntLiteral(vb)) =
        (provider.get(a).clone(), provider.get(b).clone())
    {
        let ta = smallest_int_type(&va)?;
        let tb = smallest_int_type(&vb)?;
        let ia = provider.intern(ta);
        let ib = provider.intern(tb);
        return common_type(provider, ia, ib);
    }

    if implicitly_convertible(provider, a, b) {
        return mobile_type(provider, b);
    }
    if implicitly_convertible(provider, b, a) {
        return mobile_type(provider, a);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_to_int() {
        let mut provider = TypeProvider::new();
        let lit = provider.int_literal(BigInt::from(300));
        let uint8 = provider.uint(8);
        let uint16 = provider.uint(16);
        assert!(!implicitly_convertible(&provider, lit, uint8));
        assert!(implicitly_convertible(&provider, lit, uint16));
    }

    #[test]
    fn test_negative_literal_needs_signed() {
        let mut provider = TypeProvider::new();
        let lit = provider.int_literal(BigInt::from(-1));
        let uint8 = provider.uint(8);
        let int8 = provider.int(8);
        assert!(!implicitly_convertible(&provider, lit, uint8));
        assert!(implicitly_convertible(&provider, lit, int8));
    }

    #[test]
    fn test_int_widening() {
        let mut provider = TypeProvider::new();
        let uint8 = provider.uint(8);
        let uint256 = provider.uint256();
        let int8 = provider.int(8);
        let int16 = provider.int(16);
        assert!(implicitly_convertible(&provider, uint8, uint256));
        assert!(!implicitly_convertible(&provider, uint256, uint8));
        assert!(!implicitly_convertible(&provider, int8, uint8));
        assert!(implicitly_convertible(&provider, uint8, int16));
        assert!(!implicitly_convertible(&provider, uint8, int8));
    }

    #[test]
    fn test_address_payable_relaxes() {
        let mut provider = TypeProvider::new();
        let payable = provider.address(true);
        let plain = provider.address(false);
        assert!(implicitly_convertible(&provider, payable, plain));
        assert!(!implicitly_convertible(&provider, plain, payable));
    }

    #[test]
    fn test_smallest_int_type() {
        assert_eq!(
            smallest_int_type(&BigInt::from(255)),
            Some(Type::Int {
                bits: 8,
                signed: false
            })
        );
        assert_eq!(
            smallest_int_type(&BigInt::from(256)),
            Some(Type::Int {
                bits: 16,
                signed: false
            })
        );
        assert_eq!(
            smallest_int_type(&BigInt::from(-129)),
            Some(Type::Int {
                bits: 16,
                signed: true
            })
        );
    }

    #[test]
    fn test_common_type_of_literals() {
        let mut provider = TypeProvider::new();
        let a = provider.int_literal(BigInt::from(1));
        let b = provider.int_literal(BigInt::from(70000));
        let common = common_type(&mut provider, a, b).unwrap();
        assert_eq!(
            provider.get(common),
            &Type::Int {
                bits: 24,
                signed: false
            }
        );
    }

    #[test]
    fn test_error_sentinel_converts() {
        let mut provider = TypeProvider::new();
        let error = provider.error_type();
        let uint8 = provider.uint(8);
        assert!(implicitly_convertible(&provider, error, uint8));
        assert!(implicitly_convertible(&provider, uint8, error));
    }

    #[test]
    fn test_string_literal_conversions() {
        let mut provider = TypeProvider::new();
        let lit = provider.string_literal("abc");
        let string_mem = provider.string(DataLocation::Memory);
        let bytes4 = provider.fixed_bytes(4);
        let bytes2 = provider.fixed_bytes(2);
        assert!(implicitly_convertible(&provider, lit, string_mem));
        assert!(implicitly_convertible(&provider, lit, bytes4));
        assert!(!implicitly_convertible(&provider, lit, bytes2));
    }

    #[test]
    fn test_fixed_array_to_dynamic() {
        let mut provider = TypeProvider::new();
        let uint256 = provider.uint256();
        let fixed = provider.array(uint256, Some(3), DataLocation::Memory);
        let dynamic = provider.array(uint256, None, DataLocation::Memory);
        assert!(implicitly_convertible(&provider, fixed, dynamic));
        assert!(!implicitly_convertible(&provider, dynamic, fixed));
    }
}
