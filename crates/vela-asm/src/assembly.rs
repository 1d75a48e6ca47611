//! Assembly container and byte emission.
//!
//! An [`Assembly`] holds the item stream of one code object plus its
//! sub-assemblies (the runtime code inside the deployment code, generated
//! utilities stay in the parent stream) and data blobs. Layout runs in two
//! passes: offset assignment with fixed-width symbolic immediates, then byte
//! emission where every symbolic push becomes concrete and library
//! placeholders are recorded in the link map.

use crate::item::{
    push_width, to_padded_be, DataId, Item, ItemKind, LabelId, SubId, ADDRESS_WIDTH, LABEL_WIDTH,
};
use crate::opcode::Opcode;
use num_bigint::BigUint;
use rustc_hash::FxHashMap;
use thiserror::Error;
use vela_parser::Span;

/// Assembly errors are internal assertions: the emitter must never produce a
/// stream that fails layout.
#[derive(Debug, Error)]
pub enum AsmError {
    #[error("label {0} defined twice")]
    DuplicateLabel(LabelId),
    #[error("label {0} referenced but never defined")]
    UndefinedLabel(LabelId),
    #[error("push value wider than 32 bytes")]
    ValueTooWide,
    #[error("reference to unknown sub-assembly {0}")]
    UnknownSub(u32),
    #[error("reference to unknown data blob {0}")]
    UnknownData(u32),
}

/// A relocation to patch with a library address before deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRef {
    pub name: String,
    pub offset: usize,
    pub width: usize,
}

/// Final byte sequence plus the link map.
#[derive(Debug, Clone, Default)]
pub struct LinkedBytecode {
    pub bytes: Vec<u8>,
    pub link_refs: Vec<LinkRef>,
}

impl LinkedBytecode {
    /// Patch every placeholder whose name has a binding. Unbound names stay
    /// in the link map for an external linker.
    pub fn link(&mut self, bindings: &FxHashMap<String, [u8; 20]>) {
        self.link_refs.retain(|reference| {
            if let Some(address) = bindings.get(&reference.name) {
                self.bytes[reference.offset..reference.offset + reference.width]
                    .copy_from_slice(address);
                false
            } else {
                true
            }
        });
    }
}

/// One code object under construction.
#[derive(Debug, Clone, Default)]
pub struct Assembly {
    pub items: Vec<Item>,
    subs: Vec<Assembly>,
    data: Vec<Vec<u8>>,
    next_label: u32,
}

impl Assembly {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Stream building
    // ========================================================================

    pub fn new_label(&mut self) -> LabelId {
        let label = LabelId(self.next_label);
        self.next_label += 1;
        label
    }

    pub fn append(&mut self, item: Item) {
        self.items.push(item);
    }

    pub fn op(&mut self, opcode: Opcode, span: Span) {
        self.append(Item::op(opcode).at(span));
    }

    pub fn push_value(&mut self, value: impl Into<BigUint>, span: Span) {
        self.append(Item::push(value).at(span));
    }

    pub fn push_label(&mut self, label: LabelId, span: Span) {
        self.append(Item::push_label(label).at(span));
    }

    pub fn define_label(&mut self, label: LabelId, span: Span) {
        self.append(Item::label(label).at(span));
    }

    /// Register a data blob, returning its id for `PushData` references.
    pub fn new_data(&mut self, bytes: Vec<u8>) -> DataId {
        // Identical blobs share one slot so the code-copy constant strategy
        // stays cheap for repeated values.
        if let Some(pos) = self.data.iter().position(|existing| *existing == bytes) {
            return DataId(pos as u32);
        }
        let id = DataId(self.data.len() as u32);
        self.data.push(bytes);
        id
    }

    /// Attach a finished sub-assembly, returning its id for size/offset
    /// references.
    pub fn add_sub(&mut self, sub: Assembly) -> SubId {
        let id = SubId(self.subs.len() as u32);
        self.subs.push(sub);
        id
    }

    pub fn sub(&self, id: SubId) -> &Assembly {
        &self.subs[id.0 as usize]
    }

    pub fn sub_mut(&mut self, id: SubId) -> &mut Assembly {
        &mut self.subs[id.0 as usize]
    }

    pub fn sub_count(&self) -> usize {
        self.subs.len()
    }

    // ========================================================================
    // Layout and emission
    // ========================================================================

    /// Assemble into bytes plus the link map.
    pub fn assemble(&self) -> Result<LinkedBytecode, AsmError> {
        // Pass 1: provisional offsets for labels; symbolic immediates have a
        // fixed width so the layout is final after one pass.
        let mut offset = 0usize;
        let mut label_offsets: FxHashMap<LabelId, usize> = FxHashMap::default();
        for item in &self.items {
            if let ItemKind::Label(label) = &item.kind {
                if label_offsets.insert(*label, offset).is_some() {
                    return Err(AsmError::DuplicateLabel(*label));
                }
            }
            offset += item.bytes_required();
        }
        let main_size = offset;

        // Sub-assemblies follow the main stream, data blobs follow the subs.
        let mut assembled_subs = Vec::with_capacity(self.subs.len());
        let mut sub_offsets = Vec::with_capacity(self.subs.len());
        let mut sub_end = main_size;
        for sub in &self.subs {
            let assembled = sub.assemble()?;
            sub_offsets.push(sub_end);
            sub_end += assembled.bytes.len();
            assembled_subs.push(assembled);
        }

        let mut data_offsets = Vec::with_capacity(self.data.len());
        let mut data_end = sub_end;
        for blob in &self.data {
            data_offsets.push(data_end);
            data_end += blob.len();
        }
        let program_size = data_end;

        // Pass 2: emission.
        let mut out = LinkedBytecode::default();
        for item in &self.items {
            match &item.kind {
                ItemKind::Op(op) => out.bytes.push(*op as u8),
                ItemKind::Push(value) => {
                    let width = push_width(value);
                    if width > 32 {
                        return Err(AsmError::ValueTooWide);
                    }
                    out.bytes.push(Opcode::push(width as u8) as u8);
                    out.bytes.extend(to_padded_be(value, width));
                }
                ItemKind::PushLabel(label) => {
                    let target = *label_offsets
                        .get(label)
                        .ok_or(AsmError::UndefinedLabel(*label))?;
                    emit_fixed_push(&mut out.bytes, target);
                }
                ItemKind::PushData(data) => {
                    let target = *data_offsets
                        .get(data.0 as usize)
                        .ok_or(AsmError::UnknownData(data.0))?;
                    emit_fixed_push(&mut out.bytes, target);
                }
                ItemKind::PushLibrary(name) => {
                    out.bytes.push(Opcode::push(ADDRESS_WIDTH as u8) as u8);
                    out.link_refs.push(LinkRef {
                        name: name.clone(),
                        offset: out.bytes.len(),
                        width: ADDRESS_WIDTH,
                    });
                    out.bytes.extend(std::iter::repeat(0u8).take(ADDRESS_WIDTH));
                }
                ItemKind::PushSubSize(sub) => {
                    let assembled = assembled_subs
                        .get(sub.0 as usize)
                        .ok_or(AsmError::UnknownSub(sub.0))?;
                    emit_fixed_push(&mut out.bytes, assembled.bytes.len());
                }
                ItemKind::PushSubOffset(sub) => {
                    let target = *sub_offsets
                        .get(sub.0 as usize)
                        .ok_or(AsmError::UnknownSub(sub.0))?;
                    emit_fixed_push(&mut out.bytes, target);
                }
                ItemKind::PushProgramSize => emit_fixed_push(&mut out.bytes, program_size),
                ItemKind::Label(_) => out.bytes.push(Opcode::Jumpdest as u8),
                ItemKind::Verbatim(bytes) => out.bytes.extend_from_slice(bytes),
            }
        }
        debug_assert_eq!(out.bytes.len(), main_size);

        for assembled in assembled_subs {
            let base = out.bytes.len();
            for mut reference in assembled.link_refs {
                reference.offset += base;
                out.link_refs.push(reference);
            }
            out.bytes.extend(assembled.bytes);
        }
        for blob in &self.data {
            out.bytes.extend_from_slice(blob);
        }

        Ok(out)
    }

    /// Textual rendering of the item stream, one item per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for item in &self.items {
            match &item.kind {
                ItemKind::Op(op) => out.push_str(&format!("  {}\n", op)),
                ItemKind::Push(value) => out.push_str(&format!("  PUSH 0x{:x}\n", value)),
                ItemKind::PushLabel(label) => out.push_str(&format!("  PUSH {}\n", label)),
                ItemKind::PushData(data) => out.push_str(&format!("  PUSH data_{}\n", data.0)),
                ItemKind::PushLibrary(name) => {
                    out.push_str(&format!("  PUSHLIB \"{}\"\n", name))
                }
                ItemKind::PushSubSize(sub) => out.push_str(&format!("  PUSH #sub_{}\n", sub.0)),
                ItemKind::PushSubOffset(sub) => {
                    out.push_str(&format!("  PUSH @sub_{}\n", sub.0))
                }
                ItemKind::PushProgramSize => out.push_str("  PUSH #program\n"),
                ItemKind::Label(label) => out.push_str(&format!("{}:\n", label)),
                ItemKind::Verbatim(bytes) => {
                    out.push_str(&format!("  .bytes {}\n", bytes.len()))
                }
            }
        }
        for (index, sub) in self.subs.iter().enumerate() {
            out.push_str(&format!("sub_{}:\n", index));
            for line in sub.render().lines() {
                out.push_str(&format!("  {}\n", line));
            }
        }
        out
    }
}

fn emit_fixed_push(bytes: &mut Vec<u8>, value: usize) {
    bytes.push(Opcode::push(LABEL_WIDTH as u8) as u8);
    bytes.extend(to_padded_be(&BigUint::from(value), LABEL_WIDTH));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_emission() {
        let mut asm = Assembly::new();
        asm.push_value(0x2au8, Span::DUMMY);
        asm.op(Opcode::Pop, Span::DUMMY);
        asm.op(Opcode::Stop, Span::DUMMY);
        let out = asm.assemble().unwrap();
        assert_eq!(out.bytes, vec![0x60, 0x2a, 0x50, 0x00]);
    }

    #[test]
    fn test_label_resolution_points_at_jumpdest() {
        let mut asm = Assembly::new();
        let target = asm.new_label();
        asm.push_label(target, Span::DUMMY);
        asm.op(Opcode::Jump, Span::DUMMY);
        asm.define_label(target, Span::DUMMY);
        asm.op(Opcode::Stop, Span::DUMMY);
        let out = asm.assemble().unwrap();
        // PUSH3 offset, JUMP, JUMPDEST, STOP
        assert_eq!(out.bytes[0], 0x62);
        let offset = usize::from(out.bytes[3]);
        assert_eq!(out.bytes[offset], Opcode::Jumpdest as u8);
    }

    #[test]
    fn test_undefined_label_is_error() {
        let mut asm = Assembly::new();
        let ghost = asm.new_label();
        asm.push_label(ghost, Span::DUMMY);
        assert!(matches!(
            asm.assemble(),
            Err(AsmError::UndefinedLabel(_))
        ));
    }

    #[test]
    fn test_duplicate_label_is_error() {
        let mut asm = Assembly::new();
        let label = asm.new_label();
        asm.define_label(label, Span::DUMMY);
        asm.define_label(label, Span::DUMMY);
        assert!(matches!(asm.assemble(), Err(AsmError::DuplicateLabel(_))));
    }

    #[test]
    fn test_library_placeholder_in_link_map() {
        let mut asm = Assembly::new();
        asm.append(Item::new(
            ItemKind::PushLibrary("math.Safe".into()),
            Span::DUMMY,
        ));
        asm.op(Opcode::Pop, Span::DUMMY);
        let out = asm.assemble().unwrap();
        assert_eq!(out.link_refs.len(), 1);
        let reference = &out.link_refs[0];
        assert_eq!(reference.name, "math.Safe");
        assert_eq!(reference.width, 20);
        assert!(out.bytes[reference.offset..reference.offset + 20]
            .iter()
            .all(|&b| b == 0));
    }

    #[test]
    fn test_linking_patches_placeholder() {
        let mut asm = Assembly::new();
        asm.append(Item::new(
            ItemKind::PushLibrary("Lib".into()),
            Span::DUMMY,
        ));
        let mut out = asm.assemble().unwrap();
        let mut bindings = FxHashMap::default();
        bindings.insert("Lib".to_string(), [0xaau8; 20]);
        out.link(&bindings);
        assert!(out.link_refs.is_empty());
        assert_eq!(&out.bytes[1..21], &[0xaau8; 20][..]);
    }

    #[test]
    fn test_sub_assembly_size_and_offset() {
        let mut runtime = Assembly::new();
        runtime.op(Opcode::Stop, Span::DUMMY);

        let mut deploy = Assembly::new();
        let sub = deploy.add_sub(runtime);
        deploy.append(Item::new(ItemKind::PushSubSize(sub), Span::DUMMY));
        deploy.append(Item::new(ItemKind::PushSubOffset(sub), Span::DUMMY));
        deploy.op(Opcode::Pop, Span::DUMMY);
        deploy.op(Opcode::Pop, Span::DUMMY);

        let out = deploy.assemble().unwrap();
        // main: 4+4+1+1 = 10 bytes, then the 1-byte sub
        assert_eq!(out.bytes.len(), 11);
        // size push = 1
        assert_eq!(out.bytes[3], 1);
        // offset push = 10
        assert_eq!(out.bytes[7], 10);
        assert_eq!(out.bytes[10], Opcode::Stop as u8);
    }

    #[test]
    fn test_data_section() {
        let mut asm = Assembly::new();
        let blob = asm.new_data(vec![0xde, 0xad]);
        let again = asm.new_data(vec![0xde, 0xad]);
        assert_eq!(blob, again);
        asm.append(Item::new(ItemKind::PushData(blob), Span::DUMMY));
        let out = asm.assemble().unwrap();
        // data lands after the 4-byte main stream
        assert_eq!(out.bytes[3], 4);
        assert_eq!(&out.bytes[4..], &[0xde, 0xad]);
    }

    #[test]
    fn test_deterministic_output() {
        let build = || {
            let mut asm = Assembly::new();
            let label = asm.new_label();
            asm.push_label(label, Span::DUMMY);
            asm.op(Opcode::Jump, Span::DUMMY);
            asm.define_label(label, Span::DUMMY);
            asm.push_value(7u8, Span::DUMMY);
            asm.op(Opcode::Stop, Span::DUMMY);
            asm.assemble().unwrap().bytes
        };
        assert_eq!(build(), build());
    }
}
