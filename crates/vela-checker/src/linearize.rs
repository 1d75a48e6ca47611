//! C3 linearisation of the contract inheritance lattice.
//!
//! The result for a contract is an ordered list of its ancestors, most
//! derived first, that extends each direct-base order and contains each
//! ancestor exactly once. The merge works over the linearisations of the
//! direct bases plus the direct-base list itself; failure names the two
//! contracts whose order could not be reconciled.

use vela_parser::ast::NodeId;

/// Result of a failed merge: the two bases whose relative order conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearizeConflict {
    pub first: NodeId,
    pub second: NodeId,
}

/// Merge `contract` with the linearisations of its direct bases.
///
/// `base_linearizations` holds one list per direct base, in declaration
/// order, each list most-derived first. Mirroring the usual convention the
/// merge input also receives the reversed direct-base list so declaration
/// order is respected.
pub fn linearize(
    contract: NodeId,
    direct_bases: &[NodeId],
    base_linearizations: &[Vec<NodeId>],
) -> Result<Vec<NodeId>, LinearizeConflict> {
    debug_assert_eq!(direct_bases.len(), base_linearizations.len());

    // Merge lists: each base's linearisation (most-derived first), in
    // reverse declaration order, plus the direct bases themselves. The
    // reversal makes a later-declared base more derived, matching the
    // "derived overrides earlier" rule of the surface syntax.
    let mut sequences: Vec<Vec<NodeId>> = Vec::new();
    for linearization in base_linearizations.iter().rev() {
        sequences.push(linearization.clone());
    }
    let reversed_bases: Vec<NodeId> = direct_bases.iter().rev().copied().collect();
    if !reversed_bases.is_empty() {
        sequences.push(reversed_bases);
    }

    let mut result = vec![contract];
    loop {
        sequences.retain(|sequence| !sequence.is_empty());
        if sequences.is_empty() {
            return Ok(result);
        }

        // A head is a good candidate if it appears in no tail.
        let mut candidate = None;
        for sequence in &sequences {
            let head = sequence[0];
            let in_tail = sequences
                .iter()
                .any(|other| other.iter().skip(1).any(|id| *id == head));
            if !in_tail {
                candidate = Some(head);
                break;
            }
        }

        match candidate {
            Some(next) => {
                result.push(next);
                for sequence in &mut sequences {
                    sequence.retain(|id| *id != next);
                }
            }
            None => {
                // Every head also appears in some tail; report the first two
                // irreconcilable heads.
                let first = sequences[0][0];
                let second = sequences
                    .iter()
                    .map(|sequence| sequence[0])
                    .find(|head| *head != first)
                    .unwrap_or(first);
                return Err(LinearizeConflict { first, second });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> NodeId {
        NodeId(n)
    }

    #[test]
    fn test_no_bases() {
        let result = linearize(id(1), &[], &[]).unwrap();
        assert_eq!(result, vec![id(1)]);
    }

    #[test]
    fn test_single_chain() {
        // A; B is A; C is B
        let a = linearize(id(1), &[], &[]).unwrap();
        let b = linearize(id(2), &[id(1)], &[a.clone()]).unwrap();
        let c = linearize(id(3), &[id(2)], &[b.clone()]).unwrap();
        assert_eq!(c, vec![id(3), id(2), id(1)]);
    }

    #[test]
    fn test_diamond() {
        // Base; M1 is Base; M2 is Base; D is M1, M2
        let base = linearize(id(1), &[], &[]).unwrap();
        let m1 = linearize(id(2), &[id(1)], &[base.clone()]).unwrap();
        let m2 = linearize(id(3), &[id(1)], &[base.clone()]).unwrap();
        let d = linearize(id(4), &[id(2), id(3)], &[m1, m2]).unwrap();
        // later-declared base is more derived
        assert_eq!(d, vec![id(4), id(3), id(2), id(1)]);
    }

    #[test]
    fn test_each_ancestor_once() {
        let base = linearize(id(1), &[], &[]).unwrap();
        let m1 = linearize(id(2), &[id(1)], &[base.clone()]).unwrap();
        let d = linearize(id(3), &[id(1), id(2)], &[base, m1]).unwrap();
        assert_eq!(d, vec![id(3), id(2), id(1)]);
        let mut deduped = d.clone();
        deduped.dedup();
        assert_eq!(d, deduped);
    }

    #[test]
    fn test_irreconcilable_order() {
        // X is A, B; Y is B, A; Z is X, Y — the A/B order conflicts
        let a = linearize(id(1), &[], &[]).unwrap();
        let b = linearize(id(2), &[], &[]).unwrap();
        let x = linearize(id(3), &[id(1), id(2)], &[a.clone(), b.clone()]).unwrap();
        let y = linearize(id(4), &[id(2), id(1)], &[b, a]).unwrap();
        let conflict = linearize(id(5), &[id(3), id(4)], &[x, y]).unwrap_err();
        assert_ne!(conflict.first, conflict.second);
    }

    #[test]
    fn test_base_before_derived_fails_order() {
        // D is Derived, Base where Derived is Base: putting the base first
        // in `is` still linearises because reversal favours later bases.
        let base = linearize(id(1), &[], &[]).unwrap();
        let derived = linearize(id(2), &[id(1)], &[base.clone()]).unwrap();
        let d = linearize(id(3), &[id(1), id(2)], &[base, derived]).unwrap();
        assert_eq!(d[0], id(3));
        assert_eq!(d[1], id(2));
    }
}
