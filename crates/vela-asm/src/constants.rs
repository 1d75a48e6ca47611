//! Constant-materialisation strategy selection.
//!
//! For every distinct push immediate wider than one byte, three strategies
//! are costed and the cheapest one wins:
//!
//! 1. **Literal** — plain `PUSHn value`.
//! 2. **Code copy** — the value lives in the data section and is `CODECOPY`d
//!    into scratch memory at run time.
//! 3. **Compute** — the value is rebuilt from narrower pushes and arithmetic
//!    using the decomposition `v = a·2^k + b` (and `NOT v` when the
//!    complement is shorter).
//!
//! The cost model counts run gas weighted by the expected number of runs,
//! creation-time data gas and per-byte code cost.

use crate::assembly::Assembly;
use crate::item::{push_width, Item, ItemKind};
use crate::opcode::Opcode;
use num_bigint::BigUint;
use num_traits::{One, Zero};
use std::collections::BTreeMap;

/// Gas schedule constants consumed by the cost model.
pub mod gas {
    /// Per zero byte of transaction data
    pub const TX_DATA_ZERO: u64 = 4;
    /// Per non-zero byte of transaction data
    pub const TX_DATA_NONZERO: u64 = 68;
    /// Per byte of deployed code
    pub const CREATE_DATA: u64 = 200;
    /// Copy surcharge per word
    pub const COPY: u64 = 3;
    /// Exponentiation surcharge
    pub const EXP: u64 = 10;
    /// Per byte of exponent
    pub const EXP_BYTE: u64 = 50;
}

/// Parameters of the cost model.
#[derive(Debug, Clone, Copy)]
pub struct CostParams {
    /// Costing creation code (data gas per transaction byte) or runtime code
    /// (data gas per deployed byte)?
    pub is_creation: bool,
    /// Expected number of executions, from the optimiser settings
    pub runs: u64,
    /// How many times this constant occurs in the stream
    pub multiplicity: u64,
}

impl CostParams {
    pub fn new(is_creation: bool, runs: u64) -> Self {
        Self {
            is_creation,
            runs,
            multiplicity: 1,
        }
    }

    fn combine(&self, run_gas: u64, repeated_data_gas: u64, unique_data_gas: u64) -> u64 {
        self.multiplicity
            .saturating_mul(self.runs.saturating_mul(run_gas) + repeated_data_gas)
            .saturating_add(unique_data_gas)
    }

    /// Gas charged for placing `data` where this code lives.
    fn data_gas(&self, data: &[u8]) -> u64 {
        if self.is_creation {
            data.iter()
                .map(|&b| {
                    if b == 0 {
                        gas::TX_DATA_ZERO
                    } else {
                        gas::TX_DATA_NONZERO
                    }
                })
                .sum()
        } else {
            gas::CREATE_DATA * data.len() as u64
        }
    }

    fn byte_gas(&self) -> u64 {
        if self.is_creation {
            gas::TX_DATA_NONZERO
        } else {
            gas::CREATE_DATA
        }
    }
}

fn simple_run_gas(items: &[Item]) -> u64 {
    items
        .iter()
        .map(|item| match &item.kind {
            ItemKind::Push(_) => Opcode::Push1.run_gas(),
            ItemKind::Op(op) => op.run_gas(),
            _ => 0,
        })
        .sum()
}

fn bytes_required(items: &[Item]) -> u64 {
    items.iter().map(|item| item.bytes_required() as u64).sum()
}

fn value_bytes_32(value: &BigUint) -> Vec<u8> {
    crate::item::to_padded_be(value, 32)
}

// ============================================================================
// Strategies
// ============================================================================

fn literal_gas(params: &CostParams, value: &BigUint) -> u64 {
    let data = &value.to_bytes_be()[..];
    params.combine(
        Opcode::Push1.run_gas(),
        params.byte_gas() + params.data_gas(data),
        0,
    )
}

/// The copy routine: back up one scratch word, `CODECOPY` the value over it,
/// load it, restore the scratch word. Slot 4 is the data offset placeholder.
fn copy_routine(data: crate::item::DataId) -> Vec<Item> {
    vec![
        Item::push(0u8),
        Item::op(Opcode::Dup1),
        Item::op(Opcode::Mload),
        Item::push(32u8),
        Item::new(ItemKind::PushData(data), vela_parser::Span::DUMMY),
        Item::op(Opcode::Dup4),
        Item::op(Opcode::Codecopy),
        Item::op(Opcode::Dup2),
        Item::op(Opcode::Mload),
        Item::op(Opcode::Swap2),
        Item::op(Opcode::Mstore),
    ]
}

fn codecopy_gas(params: &CostParams, value: &BigUint) -> u64 {
    let routine = copy_routine(crate::item::DataId(0));
    params.combine(
        simple_run_gas(&routine) + gas::COPY,
        bytes_required(&routine) * params.byte_gas(),
        params.data_gas(&value_bytes_32(value)),
    )
}

/// The compute strategy: rebuild the value from narrower pushes.
struct ComputeMethod<'a> {
    params: &'a CostParams,
    max_steps: u32,
}

impl<'a> ComputeMethod<'a> {
    fn new(params: &'a CostParams) -> Self {
        Self {
            params,
            max_steps: 10_000,
        }
    }

    fn gas_needed(&self, routine: &[Item]) -> u64 {
        let exps = routine
            .iter()
            .filter(|item| matches!(item.kind, ItemKind::Op(Opcode::Exp)))
            .count() as u64;
        self.params.combine(
            simple_run_gas(routine) + exps * (gas::EXP + gas::EXP_BYTE),
            bytes_required(routine) * self.params.byte_gas(),
            0,
        )
    }

    fn find_representation(&mut self, value: &BigUint) -> Vec<Item> {
        let mask = (BigUint::one() << 256u32) - BigUint::one();
        if value < &BigUint::from(0x10000u32) {
            // Very small value, not worth computing
            return vec![Item::push(value.clone())];
        }
        let complement = &mask ^ value;
        if push_width(&complement) < push_width(value) {
            let mut routine = self.find_representation(&complement);
            routine.push(Item::op(Opcode::Not));
            return routine;
        }

        // Decompose value into a * 2**k + b where |b| << 2**k; not always
        // better, so the literal stays the baseline.
        let mut routine = vec![Item::push(value.clone())];
        let mut best_gas = self.gas_needed(&routine);

        let mut bits = 255u32;
        while bits > 8 && self.max_steps > 0 {
            // Only bother at byte-string gaps: a run of ones or a carry edge
            let gap: u32 = ((value >> (bits - 8)) & BigUint::from(0x1ffu32))
                .to_u32_digits()
                .first()
                .copied()
                .unwrap_or(0);
            if gap != 0xff && gap != 0x100 {
                bits -= 1;
                continue;
            }

            let power_of_two = BigUint::one() << bits;
            let upper = value >> bits;
            let lower = value & (&power_of_two - BigUint::one());
            // pick the smaller of b and 2^k - b, remembering the sign
            let (lower_abs, negative) = if &power_of_two - &lower < lower {
                (&power_of_two - &lower, true)
            } else {
                (lower.clone(), false)
            };
            if lower_abs >= (&power_of_two >> 8u32) {
                bits -= 1;
                continue;
            }

            let mut candidate = Vec::new();
            if !lower_abs.is_zero() {
                candidate.extend(self.find_representation(&lower_abs));
            }
            candidate.push(Item::push(bits));
            candidate.push(Item::push(2u8));
            candidate.push(Item::op(Opcode::Exp));
            if upper != BigUint::one() && !upper.is_zero() {
                candidate.extend(self.find_representation(&upper));
                candidate.push(Item::op(Opcode::Mul));
            }
            if !lower_abs.is_zero() {
                candidate.push(Item::op(if negative { Opcode::Sub } else { Opcode::Add }));
            }

            self.max_steps = self.max_steps.saturating_sub(1);
            let candidate_gas = self.gas_needed(&candidate);
            if candidate_gas < best_gas {
                best_gas = candidate_gas;
                routine = candidate;
            }
            bits -= 1;
        }
        routine
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Replace expensive push immediates in `assembly` with their cheapest
/// materialisation. Returns the number of distinct values rewritten.
/// Values below 0x100 are always left as literal pushes.
pub fn optimize_constants(assembly: &mut Assembly, is_creation: bool, runs: u64) -> usize {
    // BTreeMap keeps the iteration order value-sorted so two identical runs
    // rewrite in the same order.
    let mut pushes: BTreeMap<BigUint, u64> = BTreeMap::new();
    for item in &assembly.items {
        if let ItemKind::Push(value) = &item.kind {
            *pushes.entry(value.clone()).or_insert(0) += 1;
        }
    }

    let mut replacements: BTreeMap<BigUint, Vec<Item>> = BTreeMap::new();
    for (value, multiplicity) in pushes {
        if value < BigUint::from(0x100u32) {
            continue;
        }
        let params = CostParams {
            is_creation,
            runs,
            multiplicity,
        };

        let literal = literal_gas(&params, &value);
        let copy = codecopy_gas(&params, &value);
        let mut compute_method = ComputeMethod::new(&params);
        let compute_routine = compute_method.find_representation(&value);
        let compute = compute_method.gas_needed(&compute_routine);

        if copy < literal && copy < compute {
            let data = assembly.new_data(value_bytes_32(&value));
            replacements.insert(value, copy_routine(data));
        } else if compute < literal && compute <= copy {
            // A bare push is the literal strategy, not a rewrite
            if compute_routine.len() > 1 {
                replacements.insert(value, compute_routine);
            }
        }
    }

    if replacements.is_empty() {
        return 0;
    }

    let mut rewritten = Vec::with_capacity(assembly.items.len());
    for item in assembly.items.drain(..) {
        match &item.kind {
            ItemKind::Push(value) => {
                if let Some(replacement) = replacements.get(value) {
                    let span = item.span;
                    rewritten.extend(replacement.iter().cloned().map(|r| r.at(span)));
                } else {
                    rewritten.push(item);
                }
            }
            _ => rewritten.push(item),
        }
    }
    assembly.items = rewritten;
    replacements.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_pushes(assembly: &Assembly) -> usize {
        assembly
            .items
            .iter()
            .filter(|item| matches!(item.kind, ItemKind::Push(_)))
            .count()
    }

    #[test]
    fn test_small_values_stay_literal() {
        let mut asm = Assembly::new();
        asm.push_value(0x7fu8, vela_parser::Span::DUMMY);
        asm.push_value(0xffu8, vela_parser::Span::DUMMY);
        let rewritten = optimize_constants(&mut asm, false, 200);
        assert_eq!(rewritten, 0);
        assert_eq!(count_pushes(&asm), 2);
    }

    #[test]
    fn test_power_of_two_computes() {
        // 2^255 costs 32 push bytes as a literal; the EXP form is shorter
        // and wins at a low run count.
        let mut asm = Assembly::new();
        asm.push_value(BigUint::one() << 255u32, vela_parser::Span::DUMMY);
        let rewritten = optimize_constants(&mut asm, false, 1);
        assert_eq!(rewritten, 1);
        assert!(asm
            .items
            .iter()
            .any(|item| matches!(item.kind, ItemKind::Op(Opcode::Exp))));
    }

    #[test]
    fn test_all_ones_uses_not() {
        // !0 is the canonical NOT case
        let value = (BigUint::one() << 256u32) - BigUint::one();
        let mut asm = Assembly::new();
        asm.push_value(value, vela_parser::Span::DUMMY);
        let rewritten = optimize_constants(&mut asm, false, 1);
        assert_eq!(rewritten, 1);
        assert!(asm
            .items
            .iter()
            .any(|item| matches!(item.kind, ItemKind::Op(Opcode::Not))));
    }

    #[test]
    fn test_deterministic() {
        let build = || {
            let mut asm = Assembly::new();
            asm.push_value(BigUint::one() << 200u32, vela_parser::Span::DUMMY);
            asm.push_value((BigUint::one() << 255u32) - BigUint::one(), vela_parser::Span::DUMMY);
            optimize_constants(&mut asm, false, 200);
            asm.items
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_high_run_count_prefers_literal() {
        // With enormous run weight, run gas dominates and the plain push
        // (cheapest to execute) survives.
        let mut asm = Assembly::new();
        asm.push_value(BigUint::one() << 255u32, vela_parser::Span::DUMMY);
        optimize_constants(&mut asm, false, 1_000_000);
        assert_eq!(count_pushes(&asm), 1);
        assert!(asm
            .items
            .iter()
            .all(|item| !matches!(item.kind, ItemKind::Op(Opcode::Exp))));
    }
}
