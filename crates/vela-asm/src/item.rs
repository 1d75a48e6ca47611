//! Assembly items: one unit of the instruction stream.

use crate::opcode::Opcode;
use num_bigint::BigUint;
use num_traits::Zero;
use std::fmt;
use vela_parser::Span;

/// Width of a symbolic label/offset immediate. Label pre-layout assumes
/// 3-byte address immediates; the width is fixed so layout is single-pass.
pub const LABEL_WIDTH: usize = 3;

/// Width of a library-address placeholder.
pub const ADDRESS_WIDTH: usize = 20;

/// A symbolic code label, local to one [`crate::Assembly`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tag_{}", self.0)
    }
}

/// Index of a sub-assembly within its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubId(pub u32);

/// Index of a data blob within its assembly's data section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataId(pub u32);

/// The payload of one instruction-stream item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// A plain opcode
    Op(Opcode),
    /// Push of a concrete value
    Push(BigUint),
    /// Push of a label's resolved byte offset
    PushLabel(LabelId),
    /// Push of a data blob's offset in the emitted code
    PushData(DataId),
    /// Push of a library address, left as a zero-filled placeholder in the
    /// link map
    PushLibrary(String),
    /// Push of a sub-assembly's size in bytes
    PushSubSize(SubId),
    /// Push of a sub-assembly's offset in the emitted code
    PushSubOffset(SubId),
    /// Push of the total program size
    PushProgramSize,
    /// Definition of a label; emits a `JUMPDEST`
    Label(LabelId),
    /// Raw bytes emitted in place (e.g. the metadata trailer)
    Verbatim(Vec<u8>),
}

/// One item of the instruction stream, carrying the span of the AST node it
/// was emitted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub kind: ItemKind,
    pub span: Span,
}

impl Item {
    pub fn new(kind: ItemKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn op(opcode: Opcode) -> Self {
        Self::new(ItemKind::Op(opcode), Span::DUMMY)
    }

    pub fn push(value: impl Into<BigUint>) -> Self {
        Self::new(ItemKind::Push(value.into()), Span::DUMMY)
    }

    pub fn push_label(label: LabelId) -> Self {
        Self::new(ItemKind::PushLabel(label), Span::DUMMY)
    }

    pub fn label(label: LabelId) -> Self {
        Self::new(ItemKind::Label(label), Span::DUMMY)
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Number of bytes this item occupies in the emitted code.
    pub fn bytes_required(&self) -> usize {
        match &self.kind {
            ItemKind::Op(_) => 1,
            ItemKind::Push(value) => 1 + push_width(value),
            ItemKind::PushLabel(_)
            | ItemKind::PushData(_)
            | ItemKind::PushSubSize(_)
            | ItemKind::PushSubOffset(_)
            | ItemKind::PushProgramSize => 1 + LABEL_WIDTH,
            ItemKind::PushLibrary(_) => 1 + ADDRESS_WIDTH,
            // JUMPDEST
            ItemKind::Label(_) => 1,
            ItemKind::Verbatim(bytes) => bytes.len(),
        }
    }

    /// Net change of the simulated stack height caused by this item.
    pub fn stack_delta(&self) -> i32 {
        match &self.kind {
            ItemKind::Op(op) => opcode_stack_delta(*op),
            ItemKind::Push(_)
            | ItemKind::PushLabel(_)
            | ItemKind::PushData(_)
            | ItemKind::PushLibrary(_)
            | ItemKind::PushSubSize(_)
            | ItemKind::PushSubOffset(_)
            | ItemKind::PushProgramSize => 1,
            ItemKind::Label(_) | ItemKind::Verbatim(_) => 0,
        }
    }
}

/// Minimal push width for a value; zero still needs one byte.
pub fn push_width(value: &BigUint) -> usize {
    if value.is_zero() {
        1
    } else {
        ((value.bits() + 7) / 8) as usize
    }
}

/// Big-endian bytes of `value`, left-padded to `width`.
pub fn to_padded_be(value: &BigUint, width: usize) -> Vec<u8> {
    let raw = value.to_bytes_be();
    let mut out = vec![0u8; width.saturating_sub(raw.len())];
    out.extend_from_slice(&raw);
    out
}

fn opcode_stack_delta(op: Opcode) -> i32 {
    use Opcode::*;
    match op {
        Stop | Jumpdest | Invalid => 0,
        Add | Mul | Sub | Div | Sdiv | Mod | Smod | Exp | Signextend | Lt | Gt | Slt | Sgt
        | Eq | And | Or | Xor | Byte | Shl | Shr | Sar | Keccak256 => -1,
        Addmod | Mulmod => -2,
        Iszero | Not | Balance | Calldataload | Extcodesize | Blockhash | Mload | Sload => 0,
        ThisAddress | Origin | Caller | Callvalue | Calldatasize | Codesize | Gasprice
        | Returndatasize | Coinbase | Timestamp | Number | Prevrandao | Gaslimit | Chainid
        | Selfbalance | Basefee | Pc | Msize | Gas => 1,
        Pop | Jump | Selfdestruct => -1,
        Mstore | Mstore8 | Sstore | Jumpi => -2,
        Calldatacopy | Codecopy | Returndatacopy => -3,
        Extcodecopy => -4,
        Create => -2,
        Create2 => -3,
        Call | Callcode => -6,
        Delegatecall | Staticcall => -5,
        Return | Revert => -2,
        op if op.is_push() => 1,
        op if (Dup1 as u8..=Dup16 as u8).contains(&(op as u8)) => 1,
        op if (Swap1 as u8..=Swap16 as u8).contains(&(op as u8)) => 0,
        op if (Log0 as u8..=Log4 as u8).contains(&(op as u8)) => {
            -2 - (op as u8 - Log0 as u8) as i32
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_width() {
        assert_eq!(push_width(&BigUint::from(0u8)), 1);
        assert_eq!(push_width(&BigUint::from(0xffu8)), 1);
        assert_eq!(push_width(&BigUint::from(0x100u32)), 2);
        assert_eq!(push_width(&(BigUint::from(1u8) << 255)), 32);
    }

    #[test]
    fn test_bytes_required() {
        assert_eq!(Item::op(Opcode::Add).bytes_required(), 1);
        assert_eq!(Item::push(0x1234u32).bytes_required(), 3);
        assert_eq!(Item::push_label(LabelId(0)).bytes_required(), 1 + LABEL_WIDTH);
        assert_eq!(Item::label(LabelId(0)).bytes_required(), 1);
        let library = Item::new(ItemKind::PushLibrary("Lib".into()), Span::DUMMY);
        assert_eq!(library.bytes_required(), 1 + ADDRESS_WIDTH);
    }

    #[test]
    fn test_to_padded_be() {
        assert_eq!(to_padded_be(&BigUint::from(0x1234u32), 4), vec![0, 0, 0x12, 0x34]);
        assert_eq!(to_padded_be(&BigUint::from(0u8), 2), vec![0, 0]);
    }

    #[test]
    fn test_stack_delta() {
        assert_eq!(Item::op(Opcode::Add).stack_delta(), -1);
        assert_eq!(Item::push(1u8).stack_delta(), 1);
        assert_eq!(Item::op(Opcode::dup(3)).stack_delta(), 1);
        assert_eq!(Item::op(Opcode::swap(2)).stack_delta(), 0);
        assert_eq!(Item::op(Opcode::log(2)).stack_delta(), -4);
        assert_eq!(Item::op(Opcode::Mstore).stack_delta(), -2);
    }
}
