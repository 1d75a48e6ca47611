//! Low-level utility routines.
//!
//! Named code blocks invoked from many call sites within one compiled
//! contract: requested by name, generated on first reference, appended once
//! after the main walk. They follow the internal calling convention (return
//! label below the arguments, results left on the stack).

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use vela_asm::{Assembly, LabelId, Opcode};
use vela_parser::Span;

/// The utility routines the emitter can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Utility {
    /// `[size] -> [ptr]` — bump-pointer memory allocation
    Alloc,
    /// `[slot] -> [len]` — length of a storage byte string, decoding the
    /// short/long in-slot packing
    BytesStorageLength,
    /// `[ptr, slot] -> []` — copy a memory word array into a dynamic
    /// storage array, zero-filling trailing slots of the old longer array
    ArrayToStorageCopy,
    /// `[ptr, slot] -> []` — store memory bytes into storage; length ≤ 31
    /// packs into the length slot, longer strings keep `length·2+1` in-slot
    /// with data at `hash(slot)`
    ByteStringStore,
    /// jump target that reverts with empty return data
    Panic,
}

/// Table of requested utilities: the first request records the routine and
/// allocates a label, later requests only reuse it.
#[derive(Debug, Default)]
pub struct UtilityTable {
    labels: FxHashMap<Utility, LabelId>,
    pending: VecDeque<Utility>,
    emitted: FxHashSet<Utility>,
}

impl UtilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, asm: &mut Assembly, utility: Utility) -> LabelId {
        if let Some(&label) = self.labels.get(&utility) {
            return label;
        }
        let label = asm.new_label();
        self.labels.insert(utility, label);
        if !self.emitted.contains(&utility) {
            self.pending.push_back(utility);
        }
        label
    }

    pub fn pop(&mut self) -> Option<Utility> {
        let next = self.pending.pop_front()?;
        self.emitted.insert(next);
        Some(next)
    }
}

/// Emit the code of one utility. Called while draining the table after the
/// main walk; a routine may itself request further utilities.
pub fn emit_utility(asm: &mut Assembly, table: &mut UtilityTable, utility: Utility) {
    let entry = table.request(asm, utility);
    match utility {
        Utility::Alloc => emit_alloc(asm, entry),
        Utility::BytesStorageLength => emit_bytes_storage_length(asm, entry),
        Utility::ArrayToStorageCopy => emit_array_to_storage_copy(asm, entry),
        Utility::ByteStringStore => emit_byte_string_store(asm, entry),
        Utility::Panic => emit_panic(asm, entry),
    }
}

const S: Span = Span::DUMMY;

/// `[L, size] -> [ptr]` — the free-memory pointer lives at 0x40.
fn emit_alloc(asm: &mut Assembly, entry: LabelId) {
    asm.define_label(entry, S);
    asm.push_value(0x40u8, S);
    asm.op(Opcode::Mload, S); // [L, size, ptr]
    asm.op(Opcode::Dup1, S); // [L, size, ptr, ptr]
    asm.op(Opcode::swap(2), S); // [L, ptr, ptr, size]
    asm.op(Opcode::Add, S); // [L, ptr, end]
    asm.push_value(0x40u8, S);
    asm.op(Opcode::Mstore, S); // [L, ptr]
    asm.op(Opcode::swap(1), S);
    asm.op(Opcode::Jump, S); // [ptr]
}

/// `[L, slot] -> [len]` — even slot values are short strings carrying
/// `len·2` in the low byte, odd values are long with `len·2+1`.
fn emit_bytes_storage_length(asm: &mut Assembly, entry: LabelId) {
    let long = asm.new_label();
    let done = asm.new_label();
    asm.define_label(entry, S);
    asm.op(Opcode::Sload, S); // [L, v]
    asm.op(Opcode::Dup1, S);
    asm.push_value(1u8, S);
    asm.op(Opcode::And, S); // [L, v, v&1]
    asm.push_label(long, S);
    asm.op(Opcode::Jumpi, S); // [L, v]
    // short: len = (v & 0xff) / 2
    asm.push_value(0xffu8, S);
    asm.op(Opcode::And, S);
    asm.push_value(1u8, S);
    asm.op(Opcode::Shr, S); // [L, len]
    asm.push_label(done, S);
    asm.op(Opcode::Jump, S);
    // long: len = (v - 1) / 2
    asm.define_label(long, S);
    asm.push_value(1u8, S);
    asm.op(Opcode::swap(1), S);
    asm.op(Opcode::Sub, S); // [L, v-1]
    asm.push_value(1u8, S);
    asm.op(Opcode::Shr, S); // [L, len]
    asm.define_label(done, S);
    asm.op(Opcode::swap(1), S);
    asm.op(Opcode::Jump, S); // [len]
}

/// `[L, ptr, slot] -> []` — three source paths exist for array copies; the
/// memory path is the one the emitter routes through this routine, the
/// storage→storage and calldata→storage paths are expanded inline at the
/// assignment site.
fn emit_array_to_storage_copy(asm: &mut Assembly, entry: LabelId) {
    let copy_loop = asm.new_label();
    let copy_end = asm.new_label();
    let zero_loop = asm.new_label();
    let zero_end = asm.new_label();

    asm.define_label(entry, S); // [L, ptr, slot]
    asm.op(Opcode::Dup1, S);
    asm.op(Opcode::Sload, S); // [L, ptr, slot, old]
    asm.op(Opcode::Dup3, S);
    asm.op(Opcode::Mload, S); // [L, ptr, slot, old, new]
    // store the new length
    asm.op(Opcode::Dup1, S);
    asm.op(Opcode::Dup4, S);
    asm.op(Opcode::Sstore, S); // [L, ptr, slot, old, new]
    // data area at hash(slot), scratch space below 0x40
    asm.op(Opcode::Dup3, S);
    asm.push_value(0u8, S);
    asm.op(Opcode::Mstore, S);
    asm.push_value(32u8, S);
    asm.push_value(0u8, S);
    asm.op(Opcode::Keccak256, S); // [L, ptr, slot, old, new, data]
    asm.push_value(0u8, S); // [.., i]

    asm.define_label(copy_loop, S); // [L, ptr, slot, old, new, data, i]
    asm.op(Opcode::Dup1, S);
    asm.op(Opcode::Dup4, S);
    asm.op(Opcode::Gt, S); // new > i
    asm.op(Opcode::Iszero, S);
    asm.push_label(copy_end, S);
    asm.op(Opcode::Jumpi, S); // [.., i]
    // value = mload(ptr + 32 + 32*i)
    asm.op(Opcode::Dup1, S);
    asm.push_value(32u8, S);
    asm.op(Opcode::Mul, S);
    asm.op(Opcode::dup(7), S); // ptr
    asm.op(Opcode::Add, S);
    asm.push_value(32u8, S);
    asm.op(Opcode::Add, S);
    asm.op(Opcode::Mload, S); // [.., i, value]
    // sstore(data + i, value)
    asm.op(Opcode::Dup3, S);
    asm.op(Opcode::Dup3, S);
    asm.op(Opcode::Add, S);
    asm.op(Opcode::Sstore, S); // [.., i]
    asm.push_value(1u8, S);
    asm.op(Opcode::Add, S);
    asm.push_label(copy_loop, S);
    asm.op(Opcode::Jump, S);

    asm.define_label(copy_end, S); // [L, ptr, slot, old, new, data, i]
    asm.define_label(zero_loop, S);
    asm.op(Opcode::Dup1, S);
    asm.op(Opcode::dup(5), S);
    asm.op(Opcode::Gt, S); // old > i
    asm.op(Opcode::Iszero, S);
    asm.push_label(zero_end, S);
    asm.op(Opcode::Jumpi, S); // [.., i]
    asm.push_value(0u8, S);
    asm.op(Opcode::Dup3, S);
    asm.op(Opcode::Dup3, S);
    asm.op(Opcode::Add, S);
    asm.op(Opcode::Sstore, S); // [.., i]
    asm.push_value(1u8, S);
    asm.op(Opcode::Add, S);
    asm.push_label(zero_loop, S);
    asm.op(Opcode::Jump, S);

    asm.define_label(zero_end, S); // [L, ptr, slot, old, new, data, i]
    for _ in 0..6 {
        asm.op(Opcode::Pop, S);
    }
    asm.op(Opcode::Jump, S); // []
}

/// `[L, ptr, slot] -> []` — a previous long encoding leaves its data at
/// `hash(slot)`; those words are zeroed first so a shorter new value cannot
/// expose stale payload.
fn emit_byte_string_store(asm: &mut Assembly, entry: LabelId) {
    let no_old = asm.new_label();
    let wipe_loop = asm.new_label();
    let wipe_end = asm.new_label();
    let store = asm.new_label();
    let long = asm.new_label();
    let copy_loop = asm.new_label();
    let copy_end = asm.new_label();

    asm.define_label(entry, S); // [L, ptr, slot]

    // wipe the data area of a previous long encoding
    asm.op(Opcode::Dup1, S);
    asm.op(Opcode::Sload, S); // [L, ptr, slot, old]
    asm.op(Opcode::Dup1, S);
    asm.push_value(1u8, S);
    asm.op(Opcode::And, S); // odd slot value means long
    asm.op(Opcode::Iszero, S);
    asm.push_label(no_old, S);
    asm.op(Opcode::Jumpi, S); // [L, ptr, slot, old]
    // old word count = ((old - 1) / 2 + 31) / 32
    asm.push_value(1u8, S);
    asm.op(Opcode::swap(1), S);
    asm.op(Opcode::Sub, S); // [.., old-1]
    asm.push_value(1u8, S);
    asm.op(Opcode::Shr, S); // [.., oldlen]
    asm.push_value(31u8, S);
    asm.op(Opcode::Add, S);
    asm.push_value(5u8, S);
    asm.op(Opcode::Shr, S); // [L, ptr, slot, words]
    asm.op(Opcode::Dup2, S);
    asm.push_value(0u8, S);
    asm.op(Opcode::Mstore, S);
    asm.push_value(32u8, S);
    asm.push_value(0u8, S);
    asm.op(Opcode::Keccak256, S); // [L, ptr, slot, words, data]
    asm.push_value(0u8, S); // [.., i]

    asm.define_label(wipe_loop, S); // [L, ptr, slot, words, data, i]
    asm.op(Opcode::Dup1, S);
    asm.op(Opcode::dup(4), S);
    asm.op(Opcode::Gt, S); // words > i
    asm.op(Opcode::Iszero, S);
    asm.push_label(wipe_end, S);
    asm.op(Opcode::Jumpi, S); // [.., i]
    asm.push_value(0u8, S);
    asm.op(Opcode::Dup3, S);
    asm.op(Opcode::Dup3, S);
    asm.op(Opcode::Add, S);
    asm.op(Opcode::Sstore, S); // [.., i]
    asm.push_value(1u8, S);
    asm.op(Opcode::Add, S);
    asm.push_label(wipe_loop, S);
    asm.op(Opcode::Jump, S);

    asm.define_label(wipe_end, S); // [L, ptr, slot, words, data, i]
    asm.op(Opcode::Pop, S);
    asm.op(Opcode::Pop, S);
    asm.op(Opcode::Pop, S); // [L, ptr, slot]
    asm.push_label(store, S);
    asm.op(Opcode::Jump, S);

    asm.define_label(no_old, S); // [L, ptr, slot, old]
    asm.op(Opcode::Pop, S); // [L, ptr, slot]

    asm.define_label(store, S); // [L, ptr, slot]
    asm.op(Opcode::Dup2, S);
    asm.op(Opcode::Mload, S); // [L, ptr, slot, len]
    asm.op(Opcode::Dup1, S);
    asm.push_value(31u8, S);
    asm.op(Opcode::Lt, S); // 31 < len
    asm.push_label(long, S);
    asm.op(Opcode::Jumpi, S); // [L, ptr, slot, len]

    // short: slot value = data left-aligned | len*2
    asm.op(Opcode::Dup1, S);
    asm.push_value(8u8, S);
    asm.op(Opcode::Mul, S);
    asm.push_value(256u16, S);
    asm.op(Opcode::Sub, S); // [.., len, k] with k = 256 - 8*len
    asm.op(Opcode::dup(4), S);
    asm.push_value(32u8, S);
    asm.op(Opcode::Add, S);
    asm.op(Opcode::Mload, S); // [.., len, k, word]
    asm.op(Opcode::Dup2, S);
    asm.op(Opcode::Shr, S);
    asm.op(Opcode::Dup2, S);
    asm.op(Opcode::Shl, S); // [.., len, k, cleaned]
    asm.op(Opcode::swap(1), S);
    asm.op(Opcode::Pop, S); // [.., len, cleaned]
    asm.op(Opcode::swap(1), S);
    asm.push_value(1u8, S);
    asm.op(Opcode::Shl, S); // [.., cleaned, len*2]
    asm.op(Opcode::Or, S); // [L, ptr, slot, value]
    asm.op(Opcode::Dup2, S);
    asm.op(Opcode::Sstore, S); // [L, ptr, slot]
    asm.op(Opcode::Pop, S);
    asm.op(Opcode::Pop, S); // [L]
    asm.op(Opcode::Jump, S);

    // long: slot value = len*2 + 1, data at hash(slot)
    asm.define_label(long, S); // [L, ptr, slot, len]
    asm.op(Opcode::Dup1, S);
    asm.push_value(1u8, S);
    asm.op(Opcode::Shl, S);
    asm.push_value(1u8, S);
    asm.op(Opcode::Or, S); // [.., len, len*2+1]
    asm.op(Opcode::Dup3, S);
    asm.op(Opcode::Sstore, S); // [L, ptr, slot, len]
    asm.op(Opcode::Dup2, S);
    asm.push_value(0u8, S);
    asm.op(Opcode::Mstore, S);
    asm.push_value(32u8, S);
    asm.push_value(0u8, S);
    asm.op(Opcode::Keccak256, S); // [L, ptr, slot, len, data]
    asm.op(Opcode::swap(1), S);
    asm.push_value(31u8, S);
    asm.op(Opcode::Add, S);
    asm.push_value(5u8, S);
    asm.op(Opcode::Shr, S); // [.., data, words]
    asm.push_value(0u8, S); // [.., data, words, i]

    asm.define_label(copy_loop, S);
    asm.op(Opcode::Dup1, S);
    asm.op(Opcode::Dup3, S);
    asm.op(Opcode::Gt, S); // words > i
    asm.op(Opcode::Iszero, S);
    asm.push_label(copy_end, S);
    asm.op(Opcode::Jumpi, S); // [.., i]
    asm.op(Opcode::Dup1, S);
    asm.push_value(32u8, S);
    asm.op(Opcode::Mul, S);
    asm.op(Opcode::dup(6), S); // ptr
    asm.op(Opcode::Add, S);
    asm.push_value(32u8, S);
    asm.op(Opcode::Add, S);
    asm.op(Opcode::Mload, S); // [.., i, value]
    asm.op(Opcode::dup(4), S); // data
    asm.op(Opcode::Dup3, S);
    asm.op(Opcode::Add, S);
    asm.op(Opcode::Sstore, S); // [.., i]
    asm.push_value(1u8, S);
    asm.op(Opcode::Add, S);
    asm.push_label(copy_loop, S);
    asm.op(Opcode::Jump, S);

    asm.define_label(copy_end, S); // [L, ptr, slot, data, words, i]
    for _ in 0..5 {
        asm.op(Opcode::Pop, S);
    }
    asm.op(Opcode::Jump, S);
}

/// A shared jump target that reverts with empty return data.
fn emit_panic(asm: &mut Assembly, entry: LabelId) {
    asm.define_label(entry, S);
    asm.push_value(0u8, S);
    asm.push_value(0u8, S);
    asm.op(Opcode::Revert, S);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_request_schedules_generation() {
        let mut asm = Assembly::new();
        let mut table = UtilityTable::new();
        let first = table.request(&mut asm, Utility::Alloc);
        let again = table.request(&mut asm, Utility::Alloc);
        assert_eq!(first, again);
        assert_eq!(table.pop(), Some(Utility::Alloc));
        assert_eq!(table.pop(), None);
    }

    #[test]
    fn test_each_utility_emitted_once() {
        let mut asm = Assembly::new();
        let mut table = UtilityTable::new();
        table.request(&mut asm, Utility::Alloc);
        table.request(&mut asm, Utility::Panic);
        while let Some(utility) = table.pop() {
            emit_utility(&mut asm, &mut table, utility);
        }
        let labels = asm
            .items
            .iter()
            .filter(|item| matches!(item.kind, vela_asm::ItemKind::Label(_)))
            .count();
        // alloc has one label, panic one
        assert_eq!(labels, 2);
        // draining again yields nothing
        assert_eq!(table.pop(), None);
    }

    #[test]
    fn test_utilities_assemble() {
        let mut asm = Assembly::new();
        let mut table = UtilityTable::new();
        for utility in [
            Utility::Alloc,
            Utility::BytesStorageLength,
            Utility::ArrayToStorageCopy,
            Utility::ByteStringStore,
            Utility::Panic,
        ] {
            table.request(&mut asm, utility);
        }
        while let Some(utility) = table.pop() {
            emit_utility(&mut asm, &mut table, utility);
        }
        let out = asm.assemble().expect("utilities must lay out");
        assert!(!out.bytes.is_empty());
    }
}
