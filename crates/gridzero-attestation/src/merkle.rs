//! Binary Merkle tree over aggregation statements.
//!
//! ```text
//! leaf(s)    = SHA-256(0x00 || s)
//! node(l, r) = SHA-256(0x01 || l || r)
//! ```
//!
//! A level with an odd number of nodes promotes its last node unchanged,
//! so a path has no sibling at that level. The verifier derives which
//! levels those are from `leaf_index` and `leaf_count`.

use gridzero_types::{AggregationReceipt, MerklePath};
use sha2::{Digest, Sha256};

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

#[must_use]
pub fn leaf_hash(statement: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(statement);
    hasher.finalize().into()
}

fn node_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

fn next_level(level: &[[u8; 32]]) -> Vec<[u8; 32]> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => node_hash(left, right),
            [single] => *single,
            _ => unreachable!("chunks(2) yields one or two items"),
        })
        .collect()
}

/// Root over `statements` in order. The root of an empty tree is all zeros.
#[must_use]
pub fn merkle_root(statements: &[[u8; 32]]) -> [u8; 32] {
    if statements.is_empty() {
        return [0u8; 32];
    }
    let mut level: Vec<[u8; 32]> = statements.iter().map(leaf_hash).collect();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level[0]
}

/// Sibling path for the statement at `index`, or `None` if out of range.
#[must_use]
pub fn merkle_path(statements: &[[u8; 32]], index: usize) -> Option<MerklePath> {
    if index >= statements.len() {
        return None;
    }
    let mut level: Vec<[u8; 32]> = statements.iter().map(leaf_hash).collect();
    let mut idx = index;
    let mut siblings = Vec::new();
    while level.len() > 1 {
        let sibling = idx ^ 1;
        if sibling < level.len() {
            siblings.push(level[sibling]);
        }
        level = next_level(&level);
        idx /= 2;
    }
    Some(MerklePath { siblings })
}

/// Recompute the root from `statement` and the receipt's path, and compare.
#[must_use]
pub fn verify_inclusion(statement: &[u8; 32], receipt: &AggregationReceipt) -> bool {
    if receipt.leaf_count == 0 || receipt.leaf_index >= receipt.leaf_count {
        return false;
    }
    let mut hash = leaf_hash(statement);
    let mut idx = receipt.leaf_index;
    let mut width = receipt.leaf_count;
    let mut siblings = receipt.merkle_path.siblings.iter();
    while width > 1 {
        let promoted = idx == width - 1 && width % 2 == 1;
        if !promoted {
            let Some(sibling) = siblings.next() else {
                return false;
            };
            hash = if idx % 2 == 0 {
                node_hash(&hash, sibling)
            } else {
                node_hash(sibling, &hash)
            };
        }
        idx /= 2;
        width = width.div_ceil(2);
    }
    siblings.next().is_none() && hash == receipt.root
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridzero_types::{AggregationId, DomainId};

    fn statements(n: u8) -> Vec<[u8; 32]> {
        (0..n).map(|i| [i; 32]).collect()
    }

    fn receipt(all: &[[u8; 32]], index: usize) -> AggregationReceipt {
        AggregationReceipt {
            domain_id: DomainId(1),
            aggregation_id: AggregationId(1),
            root: merkle_root(all),
            merkle_path: merkle_path(all, index).unwrap(),
            leaf_index: index as u64,
            leaf_count: all.len() as u64,
            block_hash: [0; 32],
        }
    }

    #[test]
    fn every_leaf_verifies_for_all_sizes() {
        for n in 1..=17u8 {
            let all = statements(n);
            for (i, s) in all.iter().enumerate() {
                assert!(verify_inclusion(s, &receipt(&all, i)), "n={n}, i={i}");
            }
        }
    }

    #[test]
    fn wrong_statement_fails() {
        let all = statements(5);
        assert!(!verify_inclusion(&[9; 32], &receipt(&all, 2)));
    }

    #[test]
    fn wrong_index_fails() {
        let all = statements(6);
        let mut r = receipt(&all, 2);
        r.leaf_index = 3;
        assert!(!verify_inclusion(&all[2], &r));
    }

    #[test]
    fn tampered_sibling_fails() {
        let all = statements(8);
        let mut r = receipt(&all, 5);
        r.merkle_path.siblings[1][0] ^= 0xFF;
        assert!(!verify_inclusion(&all[5], &r));
    }

    #[test]
    fn extra_sibling_fails() {
        let all = statements(4);
        let mut r = receipt(&all, 0);
        r.merkle_path.siblings.push([0; 32]);
        assert!(!verify_inclusion(&all[0], &r));
    }

    #[test]
    fn single_leaf_root_is_leaf_hash() {
        let all = statements(1);
        assert_eq!(merkle_root(&all), leaf_hash(&all[0]));
        assert!(merkle_path(&all, 0).unwrap().siblings.is_empty());
        assert!(merkle_path(&all, 1).is_none());
    }
}
