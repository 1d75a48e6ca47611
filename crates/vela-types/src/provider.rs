//! The type provider: interning, rendering and size computation.

use crate::ty::{CallableKind, FunctionType, MagicKind, Type, TypeId};
use num_bigint::BigInt;
use rustc_hash::FxHashMap;
use vela_parser::ast::{DataLocation, NodeId, StateMutability};

/// Interns [`Type`] objects and hands out [`TypeId`]s.
///
/// Lives for exactly one compile invocation; deduplication is structural, so
/// interning the same type twice returns the same id.
pub struct TypeProvider {
    types: Vec<Type>,
    lookup: FxHashMap<Type, TypeId>,
    /// Field types of each struct declaration, registered by the resolver.
    /// Needed for canonical ABI names and storage sizes.
    struct_fields: FxHashMap<NodeId, Vec<TypeId>>,
}

impl Default for TypeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeProvider {
    pub fn new() -> Self {
        Self {
            types: Vec::new(),
            lookup: FxHashMap::default(),
            struct_fields: FxHashMap::default(),
        }
    }

    /// Intern a type, returning the id of the canonical instance.
    pub fn intern(&mut self, ty: Type) -> TypeId {
        if let Some(&id) = self.lookup.get(&ty) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty.clone());
        self.lookup.insert(ty, id);
        id
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    // ========================================================================
    // Convenience constructors
    // ========================================================================

    pub fn bool_type(&mut self) -> TypeId {
        self.intern(Type::Bool)
    }

    pub fn uint(&mut self, bits: u16) -> TypeId {
        self.intern(Type::Int {
            bits,
            signed: false,
        })
    }

    pub fn int(&mut self, bits: u16) -> TypeId {
        self.intern(Type::Int { bits, signed: true })
    }

    pub fn uint256(&mut self) -> TypeId {
        self.uint(256)
    }

    pub fn address(&mut self, payable: bool) -> TypeId {
        self.intern(Type::Address { payable })
    }

    pub fn fixed_bytes(&mut self, width: u8) -> TypeId {
        self.intern(Type::FixedBytes(width))
    }

    pub fn int_literal(&mut self, value: BigInt) -> TypeId {
        self.intern(Type::IntLiteral(value))
    }

    pub fn string_literal(&mut self, value: impl Into<String>) -> TypeId {
        self.intern(Type::StringLiteral(value.into()))
    }

    pub fn bytes(&mut self, location: DataLocation) -> TypeId {
        self.intern(Type::Bytes { location })
    }

    pub fn string(&mut self, location: DataLocation) -> TypeId {
        self.intern(Type::String { location })
    }

    pub fn array(&mut self, base: TypeId, length: Option<u64>, location: DataLocation) -> TypeId {
        self.intern(Type::Array {
            base,
            length,
            location,
        })
    }

    pub fn mapping(&mut self, key: TypeId, value: TypeId) -> TypeId {
        self.intern(Type::Mapping { key, value })
    }

    pub fn function(
        &mut self,
        params: Vec<TypeId>,
        returns: Vec<TypeId>,
        kind: CallableKind,
        mutability: StateMutability,
    ) -> TypeId {
        self.intern(Type::Function(FunctionType {
            params,
            returns,
            kind,
            mutability,
        }))
    }

    pub fn tuple(&mut self, components: Vec<TypeId>) -> TypeId {
        self.intern(Type::Tuple(components))
    }

    pub fn type_type(&mut self, actual: TypeId) -> TypeId {
        self.intern(Type::TypeType(actual))
    }

    pub fn magic(&mut self, kind: MagicKind) -> TypeId {
        self.intern(Type::Magic(kind))
    }

    pub fn error_type(&mut self) -> TypeId {
        self.intern(Type::Error)
    }

    // ========================================================================
    // Struct layout registry
    // ========================================================================

    /// Record the field types of a struct declaration. Idempotent.
    pub fn register_struct_fields(&mut self, decl: NodeId, fields: Vec<TypeId>) {
        self.struct_fields.insert(decl, fields);
    }

    pub fn struct_fields(&self, decl: NodeId) -> &[TypeId] {
        self.struct_fields
            .get(&decl)
            .map(|fields| fields.as_slice())
            .unwrap_or(&[])
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Human-readable rendering, used in diagnostics.
    pub fn display(&self, id: TypeId) -> String {
        match self.get(id) {
            Type::Bool => "bool".into(),
            Type::Int { bits, signed: true } => format!("int{}", bits),
            Type::Int {
                bits,
                signed: false,
            } => format!("uint{}", bits),
            Type::FixedBytes(width) => format!("bytes{}", width),
            Type::Address { payable: false } => "address".into(),
            Type::Address { payable: true } => "address payable".into(),
            Type::IntLiteral(value) => format!("int_const {}", value),
            Type::StringLiteral(text) => format!("literal_string \"{}\"", text),
            Type::Contract {
                name, is_library, ..
            } => {
                if *is_library {
                    format!("library {}", name)
                } else {
                    format!("contract {}", name)
                }
            }
            Type::Struct { name, location, .. } => format!("struct {} {}", name, location),
            Type::Enum { name, .. } => format!("enum {}", name),
            Type::Array {
                base,
                length,
                location,
            } => match length {
                Some(len) => format!("{}[{}] {}", self.display(*base), len, location),
                None => format!("{}[] {}", self.display(*base), location),
            },
            Type::Bytes { location } => format!("bytes {}", location),
            Type::String { location } => format!("string {}", location),
            Type::Mapping { key, value } => {
                format!("mapping({} => {})", self.display(*key), self.display(*value))
            }
            Type::Function(func) => {
                let params: Vec<_> = func.params.iter().map(|p| self.display(*p)).collect();
                let returns: Vec<_> = func.returns.iter().map(|r| self.display(*r)).collect();
                let mut out = format!("function ({})", params.join(","));
                if func.kind == CallableKind::External {
                    out.push_str(" external");
                }
                if !returns.is_empty() {
                    out.push_str(&format!(" returns ({})", returns.join(",")));
                }
                out
            }
            Type::Modifier { params } => {
                let params: Vec<_> = params.iter().map(|p| self.display(*p)).collect();
                format!("modifier ({})", params.join(","))
            }
            Type::Tuple(components) => {
                let components: Vec<_> = components.iter().map(|c| self.display(*c)).collect();
                format!("tuple({})", components.join(","))
            }
            Type::TypeType(actual) => format!("type({})", self.display(*actual)),
            Type::Magic(kind) => kind.to_string(),
            Type::Error => "<error>".into(),
        }
    }

    /// Canonical ABI name used in external signatures, or `None` for types
    /// that cannot appear in an external interface.
    pub fn canonical_name(&self, id: TypeId) -> Option<String> {
        match self.get(id) {
            Type::Bool => Some("bool".into()),
            Type::Int { bits, signed: true } => Some(format!("int{}", bits)),
            Type::Int {
                bits,
                signed: false,
            } => Some(format!("uint{}", bits)),
            Type::FixedBytes(width) => Some(format!("bytes{}", width)),
            Type::Address { .. } => Some("address".into()),
            // Contracts appear in interfaces as their address
            Type::Contract {
                is_library: false, ..
            } => Some("address".into()),
            // Enums are their underlying small integer
            Type::Enum { .. } => Some("uint8".into()),
            Type::Array { base, length, .. } => {
                let base = self.canonical_name(*base)?;
                match length {
                    Some(len) => Some(format!("{}[{}]", base, len)),
                    None => Some(format!("{}[]", base)),
                }
            }
            Type::Bytes { .. } => Some("bytes".into()),
            Type::String { .. } => Some("string".into()),
            // Structs are expanded to the tuple of their field types
            Type::Struct { decl, .. } => {
                let fields = self.struct_fields.get(decl)?;
                let names: Option<Vec<_>> =
                    fields.iter().map(|field| self.canonical_name(*field)).collect();
                Some(format!("({})", names?.join(",")))
            }
            _ => None,
        }
    }

    // ========================================================================
    // Sizes
    // ========================================================================

    /// Number of VM words a value of this type occupies on the runtime
    /// stack. External function references carry address and selector.
    pub fn stack_size(&self, id: TypeId) -> u32 {
        match self.get(id) {
            Type::Tuple(components) => components.iter().map(|c| self.stack_size(*c)).sum(),
            Type::Function(func) if func.kind == CallableKind::External => 2,
            Type::Error => 1,
            _ => 1,
        }
    }

    /// Number of storage slots a state variable of this type occupies in
    /// place. Dynamic types use one head slot; their data lives at
    /// `hash(slot)`.
    pub fn storage_size(&self, id: TypeId) -> u64 {
        match self.get(id) {
            Type::Array {
                base,
                length: Some(len),
                ..
            } => len.saturating_mul(self.storage_size(*base)),
            Type::Struct { decl, .. } => self
                .struct_fields
                .get(decl)
                .map(|fields| fields.iter().map(|f| self.storage_size(*f)).sum())
                .unwrap_or(1)
                .max(1),
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_deduplicates() {
        let mut provider = TypeProvider::new();
        let a = provider.uint(256);
        let b = provider.uint(256);
        assert_eq!(a, b);
        let c = provider.uint(8);
        assert_ne!(a, c);
    }

    #[test]
    fn test_display() {
        let mut provider = TypeProvider::new();
        let uint256 = provider.uint256();
        assert_eq!(provider.display(uint256), "uint256");
        let addr = provider.address(true);
        assert_eq!(provider.display(addr), "address payable");
        let arr = provider.array(uint256, None, DataLocation::Memory);
        assert_eq!(provider.display(arr), "uint256[] memory");
    }

    #[test]
    fn test_canonical_names() {
        let mut provider = TypeProvider::new();
        let uint256 = provider.uint256();
        assert_eq!(provider.canonical_name(uint256).unwrap(), "uint256");
        let payable = provider.address(true);
        assert_eq!(provider.canonical_name(payable).unwrap(), "address");
        let arr = provider.array(uint256, Some(4), DataLocation::Calldata);
        assert_eq!(provider.canonical_name(arr).unwrap(), "uint256[4]");
        let mapping = provider.mapping(uint256, uint256);
        assert!(provider.canonical_name(mapping).is_none());
    }

    #[test]
    fn test_struct_canonical_expansion() {
        let mut provider = TypeProvider::new();
        let uint256 = provider.uint256();
        let addr = provider.address(false);
        let decl = NodeId(1);
        provider.register_struct_fields(decl, vec![uint256, addr]);
        let st = provider.intern(Type::Struct {
            decl,
            name: "Pair".into(),
            location: DataLocation::Memory,
        });
        assert_eq!(provider.canonical_name(st).unwrap(), "(uint256,address)");
    }

    #[test]
    fn test_stack_sizes() {
        let mut provider = TypeProvider::new();
        let uint256 = provider.uint256();
        assert_eq!(provider.stack_size(uint256), 1);
        let external_fn = provider.function(
            vec![],
            vec![uint256],
            CallableKind::External,
            StateMutability::View,
        );
        assert_eq!(provider.stack_size(external_fn), 2);
        let tuple = provider.tuple(vec![uint256, external_fn]);
        assert_eq!(provider.stack_size(tuple), 3);
    }

    #[test]
    fn test_storage_sizes() {
        let mut provider = TypeProvider::new();
        let uint256 = provider.uint256();
        let arr = provider.array(uint256, Some(5), DataLocation::Storage);
        assert_eq!(provider.storage_size(arr), 5);
        let dynamic = provider.array(uint256, None, DataLocation::Storage);
        assert_eq!(provider.storage_size(dynamic), 1);
    }
}
