// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! The Merkle-tree verification object.
//!
//! A proof is a pruned mirror of the real tree: interior nodes keep their
//! structure wherever some descendant is a returned leaf, and every subtree
//! with no returned leaf collapses to its root hash. The two boundary
//! leaves just outside the queried range are always carried, so a verifier
//! can tell an honestly empty range from an omitted element.

use enum_as_inner::EnumAsInner;
use metrics::counter;
use storage::{hash_elem, merge, Element, SetHash};

use crate::codec::{self, CodecError};
use crate::proof::ProofError;
use crate::registry;

/// A node of the pruned mirror.
#[derive(Debug, Clone, PartialEq, Eq, EnumAsInner)]
pub enum VoNode<E> {
    /// An interior node with at least one expanded descendant.
    Inner {
        hash: SetHash,
        left: Box<VoNode<E>>,
        right: Box<VoNode<E>>,
    },
    /// A returned leaf, carried with its element.
    Leaf { elem: E, hash: SetHash },
    /// A subtree with no returned leaf, collapsed to its root hash.
    Collapsed { hash: SetHash },
    /// An absent child slot; only produced by deserialization.
    Empty,
}

/// The verification object for a Merkle-tree range query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MhtProof<E> {
    lbound: E,
    rbound: E,
    root: VoNode<E>,
}

impl<E: Element> MhtProof<E> {
    /// Assemble a proof from parts, e.g. one rebuilt from a transport that
    /// ships bounds and tree separately. Verification decides whether the
    /// parts cohere.
    pub const fn new(lbound: E, rbound: E, root: VoNode<E>) -> Self {
        MhtProof {
            lbound,
            rbound,
            root,
        }
    }

    /// The boundary elements carried by this proof.
    pub const fn bounds(&self) -> (&E, &E) {
        (&self.lbound, &self.rbound)
    }

    /// The carried leaf elements, in order (boundaries included).
    pub fn leaves(&self) -> Vec<E> {
        self.leaf_refs().into_iter().cloned().collect()
    }

    fn leaf_refs(&self) -> Vec<&E> {
        fn walk<'a, E>(node: &'a VoNode<E>, out: &mut Vec<&'a E>) {
            match node {
                VoNode::Inner { left, right, .. } => {
                    walk(left, out);
                    walk(right, out);
                }
                VoNode::Leaf { elem, .. } => out.push(elem),
                VoNode::Collapsed { .. } | VoNode::Empty => {}
            }
        }
        let mut out = Vec::new();
        walk(&self.root, &mut out);
        out
    }

    /// Verify this proof for the range `[lo, hi]` against the published
    /// digest.
    pub fn verify(&self, lo: &E, hi: &E, expected_root: &SetHash) -> Result<(), ProofError> {
        let result = self.verify_inner(lo, hi, expected_root);
        counter!(
            registry::VO_VERIFY,
            "structure" => "mht",
            "success" => if result.is_ok() { "true" } else { "false" }
        )
        .increment(1);
        result
    }

    fn verify_inner(&self, lo: &E, hi: &E, expected_root: &SetHash) -> Result<(), ProofError> {
        let leaves = self.leaf_refs();
        let (Some(first), Some(last)) = (leaves.first(), leaves.last()) else {
            return Err(ProofError::TooFewLeaves);
        };
        if leaves.len() < 2 {
            return Err(ProofError::TooFewLeaves);
        }

        // the boundary leaves bracket the range strictly from the outside
        if *first >= lo {
            return Err(ProofError::MissingLeftBoundary);
        }
        if *last <= hi {
            return Err(ProofError::MissingRightBoundary);
        }
        for elem in leaves.iter().skip(1).take(leaves.len().saturating_sub(2)) {
            if *elem < lo || *elem > hi {
                return Err(ProofError::LeafOutOfRange {
                    elem: format!("{elem:?}"),
                });
            }
        }
        if !leaves.windows(2).all(|w| matches!(w, [a, b] if a < b)) {
            return Err(ProofError::LeavesOutOfOrder);
        }

        let mut consumed = 0usize;
        let computed = recompute(&self.root, &mut consumed, leaves.len())?;
        if computed != *expected_root {
            return Err(ProofError::RootMismatch);
        }
        Ok(())
    }

    /// Insert `elem` into the proof: bisect the leaf list, pair the new
    /// leaf with its left neighbor, and remerge upward. Returns the new
    /// root hash, which a client compares against the server's post-insert
    /// digest.
    pub fn insert(&mut self, elem: E) -> Result<SetHash, ProofError> {
        if elem <= self.lbound || elem >= self.rbound {
            return Err(ProofError::NoInsertionPoint {
                elem: format!("{elem:?}"),
            });
        }
        if self.leaf_refs().iter().any(|e| **e == elem) {
            return Err(ProofError::Duplicate {
                elem: format!("{elem:?}"),
            });
        }
        insert_at(&mut self.root, &elem)?;
        recompute_free(&self.root)
    }

    /// Verify against the pre-insert digest, then insert and hand back the
    /// post-insert digest.
    pub fn verify_insertion(
        &mut self,
        old_root: &SetHash,
        lo: &E,
        hi: &E,
        elem: E,
    ) -> Result<SetHash, ProofError> {
        self.verify(lo, hi, old_root)?;
        self.insert(elem)
    }

    /// Text serialization: boundary elements, then the node tree with
    /// depth-tagged field separators.
    pub fn serialize(&self) -> Result<String, CodecError> {
        Ok(format!(
            "{}<=>{}<=>{}",
            codec::elem_text(&self.lbound)?,
            codec::elem_text(&self.rbound)?,
            serialize_node(&self.root, 0)?
        ))
    }

    /// Inverse of [`MhtProof::serialize`].
    pub fn deserialize(input: &str) -> Result<Self, CodecError> {
        let mut parts = input.splitn(3, "<=>");
        let lbound = parts.next().ok_or(CodecError::UnexpectedEnd)?;
        let rbound = parts.next().ok_or(CodecError::UnexpectedEnd)?;
        let node = parts.next().ok_or(CodecError::UnexpectedEnd)?;
        Ok(MhtProof {
            lbound: E::decode(lbound.as_bytes())?,
            rbound: E::decode(rbound.as_bytes())?,
            root: parse_node(node, 0)?,
        })
    }
}

/// Recompute a subtree hash for verification, counting consumed leaves.
///
/// Leaf hashes are always recomputed from the element; only collapsed
/// branches contribute a stored hash. A collapsed branch is legal only
/// while no leaf has been consumed yet or after every leaf has been: a
/// collapse between leaves is a gap where a stored element was omitted.
fn recompute<E: Element>(
    node: &VoNode<E>,
    consumed: &mut usize,
    total: usize,
) -> Result<SetHash, ProofError> {
    match node {
        VoNode::Inner { left, right, .. } => {
            let left = recompute(left, consumed, total)?;
            let right = recompute(right, consumed, total)?;
            Ok(merge(&left, &right))
        }
        VoNode::Leaf { elem, .. } => {
            *consumed += 1;
            Ok(hash_elem(elem))
        }
        VoNode::Collapsed { hash } => {
            if *consumed == 0 || *consumed == total {
                Ok(hash.clone())
            } else {
                Err(ProofError::OmittedBranch)
            }
        }
        VoNode::Empty => Err(ProofError::EmptyNode),
    }
}

/// Recompute a subtree hash without the omission bookkeeping, for the
/// post-insert root.
fn recompute_free<E: Element>(node: &VoNode<E>) -> Result<SetHash, ProofError> {
    match node {
        VoNode::Inner { left, right, .. } => {
            Ok(merge(&recompute_free(left)?, &recompute_free(right)?))
        }
        VoNode::Leaf { elem, .. } => Ok(hash_elem(elem)),
        VoNode::Collapsed { hash } => Ok(hash.clone()),
        VoNode::Empty => Err(ProofError::EmptyNode),
    }
}

/// True iff the subtree holds a carried leaf below `elem`.
fn has_leaf_below<E: Element>(node: &VoNode<E>, elem: &E) -> bool {
    match node {
        VoNode::Inner { left, right, .. } => {
            has_leaf_below(right, elem) || has_leaf_below(left, elem)
        }
        VoNode::Leaf { elem: e, .. } => e < elem,
        VoNode::Collapsed { .. } | VoNode::Empty => false,
    }
}

/// Descend to the rightmost carried leaf below `elem` and replace it with
/// an inner node pairing it with the new leaf; restore hashes on unwind.
fn insert_at<E: Element>(node: &mut VoNode<E>, elem: &E) -> Result<(), ProofError> {
    match node {
        VoNode::Inner { left, right, hash } => {
            if has_leaf_below(right, elem) {
                insert_at(right, elem)?;
            } else if has_leaf_below(left, elem) {
                insert_at(left, elem)?;
            } else {
                return Err(ProofError::NoInsertionPoint {
                    elem: format!("{elem:?}"),
                });
            }
            *hash = merge(&recompute_free(left)?, &recompute_free(right)?);
            Ok(())
        }
        VoNode::Leaf { elem: e, .. } => {
            let left = VoNode::Leaf {
                elem: e.clone(),
                hash: hash_elem(e),
            };
            let right = VoNode::Leaf {
                elem: elem.clone(),
                hash: hash_elem(elem),
            };
            *node = VoNode::Inner {
                hash: merge(&hash_elem(e), &hash_elem(elem)),
                left: Box::new(left),
                right: Box::new(right),
            };
            Ok(())
        }
        VoNode::Collapsed { .. } => Err(ProofError::DeadBranch),
        VoNode::Empty => Err(ProofError::EmptyNode),
    }
}

fn serialize_node<E: Element>(node: &VoNode<E>, depth: usize) -> Result<String, CodecError> {
    let sep = codec::depth_separator(depth);
    Ok(match node {
        VoNode::Empty => "None".to_owned(),
        VoNode::Collapsed { hash } => codec::encode_hash(hash),
        VoNode::Leaf { elem, hash } => [
            codec::encode_hash(hash),
            "None".to_owned(),
            "None".to_owned(),
            codec::elem_text(elem)?,
        ]
        .join(&sep),
        VoNode::Inner { hash, left, right } => [
            codec::encode_hash(hash),
            serialize_node(left, depth + 1)?,
            serialize_node(right, depth + 1)?,
            "None".to_owned(),
        ]
        .join(&sep),
    })
}

fn parse_node<E: Element>(input: &str, depth: usize) -> Result<VoNode<E>, CodecError> {
    if input == "None" {
        return Ok(VoNode::Empty);
    }
    let sep = codec::depth_separator(depth);
    let fields: Vec<&str> = input.split(sep.as_str()).collect();
    match fields.as_slice() {
        [token] => Ok(VoNode::Collapsed {
            hash: codec::decode_hash(token)?,
        }),
        [hash, left, right, elem] => {
            let hash = codec::decode_hash(hash)?;
            let left = parse_node(left, depth + 1)?;
            let right = parse_node(right, depth + 1)?;
            match (left, right, *elem) {
                (VoNode::Empty, VoNode::Empty, text) if text != "None" => Ok(VoNode::Leaf {
                    elem: E::decode(text.as_bytes())?,
                    hash,
                }),
                (VoNode::Empty, _, _) | (_, VoNode::Empty, _) => {
                    Err(CodecError::UnexpectedToken {
                        token: input.to_owned(),
                    })
                }
                (left, right, "None") => Ok(VoNode::Inner {
                    hash,
                    left: Box::new(left),
                    right: Box::new(right),
                }),
                _ => Err(CodecError::UnexpectedToken {
                    token: input.to_owned(),
                }),
            }
        }
        _ => Err(CodecError::UnexpectedToken {
            token: input.to_owned(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::mht::Mht;

    fn sample() -> (Mht<i64>, MhtProof<i64>) {
        let mht = Mht::new(vec![0, 1, 42, 43, 100]).unwrap();
        let vo = mht.range_query(&2, &50).unwrap();
        (mht, vo)
    }

    #[test]
    fn verify_accepts_honest_proofs() {
        let (mht, vo) = sample();
        vo.verify(&2, &50, &mht.root_hash()).unwrap();
    }

    #[test]
    fn verify_rejects_wrong_root() {
        let (_, vo) = sample();
        assert!(matches!(
            vo.verify(&2, &50, &hash_elem(&0i64)),
            Err(ProofError::RootMismatch)
        ));
    }

    #[test]
    fn verify_rejects_boundaries_inside_range() {
        let (mht, vo) = sample();
        let root = mht.root_hash();
        // widen the range until the boundary leaves fall inside it
        assert!(matches!(
            vo.verify(&1, &50, &root),
            Err(ProofError::MissingLeftBoundary)
        ));
        assert!(matches!(
            vo.verify(&2, &100, &root),
            Err(ProofError::MissingRightBoundary)
        ));
    }

    #[test]
    fn verify_rejects_out_of_range_leaves() {
        let (mht, vo) = sample();
        // a narrower range than the proof was built for leaves 42/43 outside
        assert!(matches!(
            vo.verify(&2, &10, &mht.root_hash()),
            Err(ProofError::LeafOutOfRange { .. })
        ));
    }

    #[test]
    fn omitted_leaf_under_a_valid_hash_is_detected() {
        let (mht, vo) = sample();

        // drop the subtree holding leaves 42 and 43 down to its (still
        // cryptographically correct) hash
        fn collapse_inner_of(node: &mut VoNode<i64>, needle: i64) -> bool {
            if let VoNode::Inner { hash, left, right } = node {
                let holds = |n: &VoNode<i64>| {
                    matches!(n, VoNode::Leaf { elem, .. } if *elem == needle)
                };
                if holds(left) || holds(right) {
                    *node = VoNode::Collapsed { hash: hash.clone() };
                    return true;
                }
                return collapse_inner_of(left, needle) || collapse_inner_of(right, needle);
            }
            false
        }

        let mut tampered = vo.clone();
        let MhtProof { root, .. } = &mut tampered;
        assert!(collapse_inner_of(root, 42));

        assert!(matches!(
            tampered.verify(&2, &50, &mht.root_hash()),
            Err(ProofError::OmittedBranch)
        ));
    }

    #[test]
    fn insert_rejects_bad_positions() {
        let (_, mut vo) = sample();
        assert!(matches!(
            vo.insert(1),
            Err(ProofError::NoInsertionPoint { .. })
        ));
        assert!(matches!(vo.insert(42), Err(ProofError::Duplicate { .. })));
    }

    #[test]
    fn verify_insertion_chains_both_steps() {
        let mut mht = Mht::new(vec![0, 5, 10, 100]).unwrap();
        let old_root = mht.root_hash();
        let mut vo = mht.insert(7).unwrap();
        let new_root = vo.verify_insertion(&old_root, &7, &7, 7).unwrap();
        assert_eq!(new_root, mht.root_hash());
    }

    #[test]
    fn serialization_round_trips() {
        let (_, vo) = sample();
        let text = vo.serialize().unwrap();
        let back = MhtProof::<i64>::deserialize(&text).unwrap();
        assert_eq!(back, vo);
    }

    #[test]
    fn deep_proofs_round_trip() {
        // 1500 leaves push nesting past depth 10, so multi-digit
        // separators are exercised
        let elems: Vec<i64> = (0..1500).collect();
        let mht = Mht::new(elems).unwrap();
        let vo = mht.range_query(&700, &710).unwrap();
        let text = vo.serialize().unwrap();
        let back = MhtProof::<i64>::deserialize(&text).unwrap();
        assert_eq!(back, vo);
        back.verify(&700, &710, &mht.root_hash()).unwrap();
    }

    #[test]
    fn deserialize_rejects_garbage() {
        assert!(MhtProof::<i64>::deserialize("").is_err());
        assert!(MhtProof::<i64>::deserialize("1<=>2").is_err());
        assert!(MhtProof::<i64>::deserialize("1<=>2<=>not-base64!").is_err());
    }
}
