//! Peephole optimisation over the item stream.
//!
//! Runs before layout, so rewrites work on symbolic items. Passes are applied
//! until a fixed point; each individual pass is a local rewrite that never
//! changes observable behaviour:
//!
//! - pushes (and `DUP`s) that feed a `POP` cancel out,
//! - `PUSHk PUSHk op` with a pure operation folds into the result,
//! - `ISZERO ISZERO` in front of `JUMPI` is dropped,
//! - a jump to the immediately following label is deleted,
//! - identical label-delimited code tails are de-duplicated by re-pointing
//!   jumps at the surviving copy.

use crate::item::{Item, ItemKind, LabelId};
use crate::opcode::Opcode;
use num_bigint::BigUint;
use num_traits::{One, Zero};
use rustc_hash::FxHashMap;

/// The peephole optimiser. Stateless; [`Peephole::run`] mutates an item
/// stream in place and reports how many rewrites were applied.
pub struct Peephole;

impl Peephole {
    /// Optimise until a fixed point. Applying `run` to its own output makes
    /// no further changes.
    pub fn run(items: &mut Vec<Item>) -> usize {
        let mut total = 0usize;
        loop {
            let mut changed = 0usize;
            changed += push_pop(items);
            changed += fold_constants(items);
            changed += double_iszero(items);
            changed += jump_to_next(items);
            changed += dedup_tails(items);
            if changed == 0 {
                return total;
            }
            total += changed;
        }
    }
}

fn is_push_like(kind: &ItemKind) -> bool {
    match kind {
        ItemKind::Push(_)
        | ItemKind::PushLabel(_)
        | ItemKind::PushData(_)
        | ItemKind::PushLibrary(_)
        | ItemKind::PushSubSize(_)
        | ItemKind::PushSubOffset(_)
        | ItemKind::PushProgramSize => true,
        ItemKind::Op(op) => {
            (Opcode::Dup1 as u8..=Opcode::Dup16 as u8).contains(&(*op as u8))
        }
        _ => false,
    }
}

/// `PUSH x POP` (and `DUPn POP`) cancels.
fn push_pop(items: &mut Vec<Item>) -> usize {
    let mut removed = 0usize;
    let mut index = 0;
    while index + 1 < items.len() {
        if is_push_like(&items[index].kind)
            && matches!(items[index + 1].kind, ItemKind::Op(Opcode::Pop))
        {
            items.drain(index..index + 2);
            removed += 1;
            index = index.saturating_sub(1);
        } else {
            index += 1;
        }
    }
    removed
}

fn mask256() -> BigUint {
    (BigUint::one() << 256u32) - BigUint::one()
}

/// Apply a pure binary opcode to known operands. `second` was pushed first,
/// `top` is the top of the stack.
fn apply_binary(op: Opcode, second: &BigUint, top: &BigUint) -> Option<BigUint> {
    let mask = mask256();
    let bool_val = |b: bool| if b { BigUint::one() } else { BigUint::zero() };
    let result = match op {
        Opcode::Add => (top + second) & &mask,
        Opcode::Mul => (top * second) & &mask,
        // s[0] - s[1] with wrap-around
        Opcode::Sub => {
            if top >= second {
                top - second
            } else {
                (&mask - second) + top + BigUint::one()
            }
        }
        Opcode::Div => {
            if second.is_zero() {
                BigUint::zero()
            } else {
                top / second
            }
        }
        Opcode::Mod => {
            if second.is_zero() {
                BigUint::zero()
            } else {
                top % second
            }
        }
        Opcode::Exp => top.modpow(second, &(BigUint::one() << 256u32)),
        Opcode::And => top & second,
        Opcode::Or => top | second,
        Opcode::Xor => top ^ second,
        Opcode::Eq => bool_val(top == second),
        Opcode::Lt => bool_val(top < second),
        Opcode::Gt => bool_val(top > second),
        // value s[1] shifted by s[0]
        Opcode::Shl => {
            if top.bits() > 9 {
                BigUint::zero()
            } else {
                (second << top.to_u32_digits().first().copied().unwrap_or(0)) & &mask
            }
        }
        Opcode::Shr => {
            if top.bits() > 9 {
                BigUint::zero()
            } else {
                second >> top.to_u32_digits().first().copied().unwrap_or(0)
            }
        }
        _ => return None,
    };
    Some(result)
}

fn apply_unary(op: Opcode, value: &BigUint) -> Option<BigUint> {
    match op {
        Opcode::Iszero => Some(if value.is_zero() {
            BigUint::one()
        } else {
            BigUint::zero()
        }),
        Opcode::Not => Some(mask256() ^ value),
        _ => None,
    }
}

/// Fold `PUSH a PUSH b op` and `PUSH a op` with pure operations.
fn fold_constants(items: &mut Vec<Item>) -> usize {
    let mut folded = 0usize;
    let mut index = 0;
    while index < items.len() {
        // binary fold
        if index + 2 < items.len() {
            if let (ItemKind::Push(a), ItemKind::Push(b), ItemKind::Op(op)) = (
                &items[index].kind,
                &items[index + 1].kind,
                &items[index + 2].kind,
            ) {
                if op.is_pure() && op.immediate_size() == 0 {
                    if let Some(result) = apply_binary(*op, a, b) {
                        let span = items[index + 2].span;
                        items.splice(
                            index..index + 3,
                            [Item::new(ItemKind::Push(result), span)],
                        );
                        folded += 1;
                        index = index.saturating_sub(2);
                        continue;
                    }
                }
            }
        }
        // unary fold
        if index + 1 < items.len() {
            if let (ItemKind::Push(a), ItemKind::Op(op)) =
                (&items[index].kind, &items[index + 1].kind)
            {
                if let Some(result) = apply_unary(*op, a) {
                    let span = items[index + 1].span;
                    items.splice(index..index + 2, [Item::new(ItemKind::Push(result), span)]);
                    folded += 1;
                    index = index.saturating_sub(2);
                    continue;
                }
            }
        }
        index += 1;
    }
    folded
}

/// `ISZERO ISZERO JUMPI` — the double negation only normalises truthiness,
/// which `JUMPI` does anyway.
fn double_iszero(items: &mut Vec<Item>) -> usize {
    let mut removed = 0usize;
    let mut index = 0;
    while index + 2 < items.len() {
        let pattern = matches!(items[index].kind, ItemKind::Op(Opcode::Iszero))
            && matches!(items[index + 1].kind, ItemKind::Op(Opcode::Iszero))
            && matches!(items[index + 2].kind, ItemKind::Op(Opcode::Jumpi));
        if pattern {
            items.drain(index..index + 2);
            removed += 1;
        } else {
            index += 1;
        }
    }
    removed
}

/// `PUSH tag JUMP tag:` — control falls through anyway.
fn jump_to_next(items: &mut Vec<Item>) -> usize {
    let mut removed = 0usize;
    let mut index = 0;
    while index + 2 < items.len() {
        let pattern = match (
            &items[index].kind,
            &items[index + 1].kind,
            &items[index + 2].kind,
        ) {
            (ItemKind::PushLabel(target), ItemKind::Op(Opcode::Jump), ItemKind::Label(next)) => {
                target == next
            }
            _ => false,
        };
        if pattern {
            items.drain(index..index + 2);
            removed += 1;
        } else {
            index += 1;
        }
    }
    removed
}

/// A label-delimited block with no internal labels, ending in a terminator.
struct Block {
    label: LabelId,
    /// index of the `Label` item
    start: usize,
    /// index one past the terminator
    end: usize,
}

fn collect_blocks(items: &[Item]) -> Vec<Block> {
    let mut blocks = Vec::new();
    for (index, item) in items.iter().enumerate() {
        let label = match &item.kind {
            ItemKind::Label(label) => *label,
            _ => continue,
        };
        // a block at stream start is the entry point; elsewhere, fall-through
        // into the block makes removal unsafe
        if index == 0 {
            continue;
        }
        match &items[index - 1].kind {
            ItemKind::Op(op) if op.is_terminator() => {}
            _ => continue,
        }
        let mut cursor = index + 1;
        let mut end = None;
        while cursor < items.len() {
            match &items[cursor].kind {
                ItemKind::Label(_) => break,
                ItemKind::Op(op) if op.is_terminator() => {
                    end = Some(cursor + 1);
                    break;
                }
                _ => cursor += 1,
            }
        }
        if let Some(end) = end {
            blocks.push(Block {
                label,
                start: index,
                end,
            });
        }
    }
    blocks
}

/// Re-point jumps at the first of two identical tails and drop the copy.
/// One rewrite per invocation; the fixed-point loop finds the rest.
fn dedup_tails(items: &mut Vec<Item>) -> usize {
    let blocks = collect_blocks(items);
    let mut bodies: FxHashMap<Vec<&ItemKind>, &Block> = FxHashMap::default();
    let mut replace: Option<(LabelId, LabelId, usize, usize)> = None;

    for block in &blocks {
        let body: Vec<&ItemKind> = items[block.start + 1..block.end]
            .iter()
            .map(|item| &item.kind)
            .collect();
        if let Some(canonical) = bodies.get(&body) {
            replace = Some((block.label, canonical.label, block.start, block.end));
            break;
        }
        bodies.insert(body, block);
    }

    let Some((from, to, start, end)) = replace else {
        return 0;
    };
    items.drain(start..end);
    for item in items.iter_mut() {
        if item.kind == ItemKind::PushLabel(from) {
            item.kind = ItemKind::PushLabel(to);
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_parser::Span;

    fn push(v: u64) -> Item {
        Item::push(v)
    }

    fn op(o: Opcode) -> Item {
        Item::op(o)
    }

    #[test]
    fn test_push_pop_cancels() {
        let mut items = vec![push(1), op(Opcode::Pop), op(Opcode::Stop)];
        Peephole::run(&mut items);
        assert_eq!(items, vec![op(Opcode::Stop)]);
    }

    #[test]
    fn test_constant_folding_add() {
        let mut items = vec![push(2), push(3), op(Opcode::Add)];
        Peephole::run(&mut items);
        assert_eq!(items, vec![push(5)]);
    }

    #[test]
    fn test_constant_folding_sub_order() {
        // PUSH 2 PUSH 10 SUB computes top - second = 10 - 2
        let mut items = vec![push(2), push(10), op(Opcode::Sub)];
        Peephole::run(&mut items);
        assert_eq!(items, vec![push(8)]);
    }

    #[test]
    fn test_division_by_zero_folds_to_zero() {
        let mut items = vec![push(0), push(10), op(Opcode::Div)];
        Peephole::run(&mut items);
        assert_eq!(items, vec![push(0)]);
    }

    #[test]
    fn test_folding_cascades() {
        // (1 + 2) + 3 collapses completely
        let mut items = vec![push(1), push(2), op(Opcode::Add), push(4), op(Opcode::Mul)];
        Peephole::run(&mut items);
        assert_eq!(items, vec![push(12)]);
    }

    #[test]
    fn test_jump_to_next_removed() {
        let mut items = vec![
            Item::push_label(LabelId(0)),
            op(Opcode::Jump),
            Item::label(LabelId(0)),
            op(Opcode::Stop),
        ];
        Peephole::run(&mut items);
        assert_eq!(items, vec![Item::label(LabelId(0)), op(Opcode::Stop)]);
    }

    #[test]
    fn test_double_iszero_before_jumpi() {
        let mut items = vec![
            op(Opcode::Iszero),
            op(Opcode::Iszero),
            op(Opcode::Jumpi),
        ];
        Peephole::run(&mut items);
        assert_eq!(items, vec![op(Opcode::Jumpi)]);
    }

    #[test]
    fn test_tail_dedup_repoints_jumps() {
        let mut items = vec![
            Item::push_label(LabelId(1)),
            op(Opcode::Jump),
            Item::label(LabelId(0)),
            push(1),
            op(Opcode::Stop),
            Item::label(LabelId(1)),
            push(1),
            op(Opcode::Stop),
        ];
        Peephole::run(&mut items);
        // the second identical block is gone and the re-pointed jump then
        // collapses into plain fall-through
        assert!(items.iter().all(|i| i.kind != ItemKind::Label(LabelId(1))));
        assert_eq!(
            items,
            vec![Item::label(LabelId(0)), push(1), op(Opcode::Stop)]
        );
    }

    #[test]
    fn test_idempotent() {
        let mut items = vec![
            push(1),
            push(2),
            op(Opcode::Add),
            push(9),
            op(Opcode::Pop),
            Item::push_label(LabelId(0)),
            op(Opcode::Jump),
            Item::label(LabelId(0)),
            op(Opcode::Stop),
        ];
        Peephole::run(&mut items);
        let after_first = items.clone();
        let rewrites = Peephole::run(&mut items);
        assert_eq!(rewrites, 0);
        assert_eq!(items, after_first);
    }

    #[test]
    fn test_spans_survive_folding() {
        let span = Span::new(5, 9, 2, 1);
        let mut items = vec![
            push(1),
            push(2),
            Item::op(Opcode::Add).at(span),
        ];
        Peephole::run(&mut items);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].span, span);
    }
}
