// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! The Merkle hash tree over a sorted element set.
//!
//! Leaves are the stored elements in order, bracketed by two sentinel
//! boundary elements; every legal query range lies strictly between the
//! sentinels. Adjacent siblings merge left-to-right and an odd trailing
//! node is promoted unchanged, so the root is reached when one node
//! remains. The root hash is the digest the owner publishes.

use std::collections::BTreeMap;
use std::io::Write;
use std::ops::Bound::{Excluded, Unbounded};

use metrics::counter;
use storage::{hash_elem, merge, Arena, Element, MhtNode, NodeId, SetHash};
use thiserror::Error;

use crate::registry;

pub mod proof;

use proof::{MhtProof, VoNode};

#[derive(Debug, Error)]
pub enum MhtError {
    #[error("tree requires a non-empty seed")]
    EmptySeed,
    #[error("seed elements must be strictly sorted")]
    UnsortedSeed,
    #[error("batch requires at least one element")]
    EmptyBatch,
    #[error("batch phases run out of order")]
    BatchOutOfOrder,
    #[error("element {elem} is outside the sentinel range")]
    OutOfRange { elem: String },
    #[error("element {elem} is already stored")]
    Duplicate { elem: String },
    #[error("range bounds are inverted")]
    InvertedRange,
    #[error("no stored boundary outside the requested range")]
    MissingBoundary,
    #[error("invalid tree: {reason}")]
    InvalidTree { reason: String },
}

/// The Merkle hash tree.
///
/// Mutation is single-writer: none of the operations here are safe to run
/// concurrently with another mutation, and [`Mht::gestalt_batch_insert`] in
/// particular leaves the tree inconsistent between its internal phases.
#[derive(Debug)]
pub struct Mht<E: Element> {
    arena: Arena<MhtNode<E>>,
    /// Element-to-leaf map; its key order is the stored sorted sequence,
    /// sentinels included.
    leaves: BTreeMap<E, NodeId>,
    root: NodeId,
}

/// State carried between the three batch-insert phases.
///
/// The handles in here are only valid while the tree is untouched by any
/// other mutation; this is why the gestalt batch is documented as unsafe
/// for concurrent access.
#[derive(Debug)]
pub struct BatchSplice<E> {
    /// Sorted span the rebuilt subtree will cover: every element currently
    /// under the anchor, merged with the batch.
    segment: Vec<E>,
    /// The least common ancestor of the span's boundary leaves.
    anchor: NodeId,
    /// Root of the freshly built subtree, set by `batch_node_insert`.
    fresh: Option<NodeId>,
    /// Leaves of the fresh subtree, parallel to `segment`.
    leaf_ids: Vec<NodeId>,
}

impl<E: Element> Mht<E> {
    /// Build a tree from a strictly sorted, non-empty seed that includes
    /// the two boundary sentinels as its first and last elements.
    pub fn new(elems: Vec<E>) -> Result<Self, MhtError> {
        if elems.is_empty() {
            return Err(MhtError::EmptySeed);
        }
        if !elems.windows(2).all(|w| matches!(w, [a, b] if a < b)) {
            return Err(MhtError::UnsortedSeed);
        }

        let mut arena = Arena::new();
        let mut leaves = BTreeMap::new();
        let mut ids = Vec::with_capacity(elems.len());
        for elem in elems {
            let id = arena.alloc(MhtNode::leaf(elem.clone(), hash_elem(&elem)));
            leaves.insert(elem, id);
            ids.push(id);
        }
        let root = build_from_leaves(&mut arena, ids);

        Ok(Mht {
            arena,
            leaves,
            root,
        })
    }

    /// The published digest.
    pub fn root_hash(&self) -> SetHash {
        self.arena[self.root].hash.clone()
    }

    /// Number of stored elements, sentinels included.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// A tree always stores at least its seed, but the conventional pair
    /// keeps clippy and callers honest.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// The stored elements in order, sentinels included.
    pub fn elements(&self) -> impl Iterator<Item = &E> {
        self.leaves.keys()
    }

    /// Membership proof for `elem`: sibling hashes from leaf to root, each
    /// tagged with whether the known node sat on the left of the merge.
    ///
    /// Returns `None` if the element is not stored. A singleton tree
    /// returns `Some` of the empty list, so callers must test against
    /// `None` specifically rather than emptiness.
    pub fn contains(&self, elem: &E) -> Option<Vec<(bool, SetHash)>> {
        let mut current = *self.leaves.get(elem)?;
        let mut path = Vec::new();
        while let Some(parent) = self.arena[current].parent {
            let node = &self.arena[parent];
            match (node.left, node.right) {
                (Some(left), Some(right)) if left == current => {
                    path.push((true, self.arena[right].hash.clone()));
                }
                (Some(left), Some(_)) => {
                    path.push((false, self.arena[left].hash.clone()));
                }
                _ => return None, // unreachable in a valid tree
            }
            current = parent;
        }
        Some(path)
    }

    /// A verification object covering every stored element in `[lo, hi]`
    /// plus the boundary elements immediately outside the range.
    pub fn range_query(&self, lo: &E, hi: &E) -> Result<MhtProof<E>, MhtError> {
        if lo > hi {
            return Err(MhtError::InvertedRange);
        }
        let (lbound, _) = self
            .leaves
            .range(..lo.clone())
            .next_back()
            .ok_or(MhtError::MissingBoundary)?;
        let (rbound, _) = self
            .leaves
            .range((Excluded(hi.clone()), Unbounded))
            .next()
            .ok_or(MhtError::MissingBoundary)?;

        let mut required: Vec<&E> = vec![lbound];
        required.extend(self.leaves.range(lo.clone()..=hi.clone()).map(|(e, _)| e));
        required.push(rbound);

        let root = self.build_vo(self.root, &required);
        counter!(registry::MHT_RANGE_QUERY).increment(1);
        Ok(MhtProof::new(lbound.clone(), rbound.clone(), root))
    }

    fn build_vo(&self, id: NodeId, required: &[&E]) -> VoNode<E> {
        let node = &self.arena[id];
        match (&node.elem, node.left, node.right) {
            (Some(elem), _, _) => {
                if required.binary_search(&elem).is_ok() {
                    VoNode::Leaf {
                        elem: elem.clone(),
                        hash: node.hash.clone(),
                    }
                } else {
                    VoNode::Collapsed {
                        hash: node.hash.clone(),
                    }
                }
            }
            (None, Some(left), Some(right)) => {
                let left = self.build_vo(left, required);
                let right = self.build_vo(right, required);
                if left.is_collapsed() && right.is_collapsed() {
                    VoNode::Collapsed {
                        hash: node.hash.clone(),
                    }
                } else {
                    VoNode::Inner {
                        hash: node.hash.clone(),
                        left: Box::new(left),
                        right: Box::new(right),
                    }
                }
            }
            _ => VoNode::Empty, // unreachable in a valid tree
        }
    }

    /// Insert one element strictly between the sentinels.
    ///
    /// Returns the pre-insert verification object for `[elem, elem]`, which
    /// proves the insertion location was empty: its boundary leaves are the
    /// new element's neighbors and its in-range leaf set is empty. The new
    /// leaf pairs with its left in-order neighbor; hashes update along the
    /// path to the root. Balance is not maintained, so proof depth can
    /// degrade under iterated inserts; use the gestalt batch when that
    /// matters.
    pub fn insert(&mut self, elem: E) -> Result<MhtProof<E>, MhtError> {
        self.check_insertable(&elem)?;
        let vo = self.range_query(&elem, &elem)?;

        let (_, &left_leaf) = self
            .leaves
            .range(..elem.clone())
            .next_back()
            .ok_or(MhtError::MissingBoundary)?;

        let new_leaf = self
            .arena
            .alloc(MhtNode::leaf(elem.clone(), hash_elem(&elem)));
        self.splice_pair(left_leaf, new_leaf);
        self.leaves.insert(elem, new_leaf);

        counter!(registry::MHT_INSERT).increment(1);
        Ok(vo)
    }

    /// Iterated single insert over `elems`, stopping at the first failure.
    pub fn batch_insert(&mut self, elems: impl IntoIterator<Item = E>) -> Result<(), MhtError> {
        for elem in elems {
            self.insert(elem)?;
        }
        Ok(())
    }

    /// Batch phase 1: validate the batch and accumulate the target sorted
    /// segment: everything currently under the least common ancestor of
    /// the batch's boundary leaves, merged with the batch itself.
    pub fn batch_list_insert(&mut self, elems: Vec<E>) -> Result<BatchSplice<E>, MhtError> {
        let mut batch = elems;
        batch.sort();
        if batch.is_empty() {
            return Err(MhtError::EmptyBatch);
        }
        if !batch.windows(2).all(|w| matches!(w, [a, b] if a < b)) {
            return Err(MhtError::UnsortedSeed);
        }
        for elem in &batch {
            self.check_insertable(elem)?;
        }

        let (lo, hi) = match (batch.first(), batch.last()) {
            (Some(lo), Some(hi)) => (lo, hi),
            _ => return Err(MhtError::EmptyBatch),
        };
        let (_, &left_leaf) = self
            .leaves
            .range(..lo.clone())
            .next_back()
            .ok_or(MhtError::MissingBoundary)?;
        let (_, &right_leaf) = self
            .leaves
            .range((Excluded(hi.clone()), Unbounded))
            .next()
            .ok_or(MhtError::MissingBoundary)?;

        let anchor = self.lca(left_leaf, right_leaf);
        let existing = self.subtree_elements(anchor);
        let segment = merge_sorted(existing, batch);

        Ok(BatchSplice {
            segment,
            anchor,
            fresh: None,
            leaf_ids: Vec::new(),
        })
    }

    /// Batch phase 2: build a fresh balanced subtree over the accumulated
    /// segment, using the same construction as [`Mht::new`].
    pub fn batch_node_insert(&mut self, splice: &mut BatchSplice<E>) {
        let mut ids = Vec::with_capacity(splice.segment.len());
        for elem in &splice.segment {
            ids.push(
                self.arena
                    .alloc(MhtNode::leaf(elem.clone(), hash_elem(elem))),
            );
        }
        splice.leaf_ids = ids.clone();
        splice.fresh = Some(build_from_leaves(&mut self.arena, ids));
    }

    /// Batch phase 3: splice the fresh subtree in at the anchor, discard
    /// the old subtree wholesale, and recompute hashes up to the root.
    pub fn batch_update(&mut self, splice: BatchSplice<E>) -> Result<(), MhtError> {
        let fresh = splice.fresh.ok_or(MhtError::BatchOutOfOrder)?;
        if !self.arena.contains(splice.anchor) {
            return Err(MhtError::BatchOutOfOrder);
        }

        let parent = self.arena[splice.anchor].parent;
        self.arena[fresh].parent = parent;
        match parent {
            None => self.root = fresh,
            Some(p) => {
                let node = &mut self.arena[p];
                if node.left == Some(splice.anchor) {
                    node.left = Some(fresh);
                } else {
                    node.right = Some(fresh);
                }
            }
        }

        // the anchor's old leaves vanish with the subtree; their map slots
        // are overwritten below
        self.free_subtree(splice.anchor);
        for (elem, id) in splice.segment.into_iter().zip(splice.leaf_ids) {
            self.leaves.insert(elem, id);
        }

        self.rehash_upward(parent);
        counter!(registry::MHT_BATCH).increment(1);
        Ok(())
    }

    /// The three batch phases run in-line.
    ///
    /// Explicitly not safe for concurrent access: between the phases the
    /// element list and the node structure disagree.
    pub fn gestalt_batch_insert(&mut self, elems: Vec<E>) -> Result<(), MhtError> {
        let mut splice = self.batch_list_insert(elems)?;
        self.batch_node_insert(&mut splice);
        self.batch_update(splice)
    }

    /// Least common ancestor by alternating upward walk: advance one
    /// pointer at a time, swapping which side advances each step, recording
    /// every visited node, until the advancing pointer shows up in the
    /// other side's history.
    fn lca(&self, a: NodeId, b: NodeId) -> NodeId {
        if a == b {
            return a;
        }
        let mut seen_a = vec![a];
        let mut seen_b = vec![b];
        let mut cur_a = a;
        let mut cur_b = b;
        let mut advance_a = true;
        loop {
            if advance_a {
                if let Some(parent) = self.arena[cur_a].parent {
                    cur_a = parent;
                    if seen_b.contains(&cur_a) {
                        return cur_a;
                    }
                    seen_a.push(cur_a);
                }
            } else if let Some(parent) = self.arena[cur_b].parent {
                cur_b = parent;
                if seen_a.contains(&cur_b) {
                    return cur_b;
                }
                seen_b.push(cur_b);
            }
            advance_a = !advance_a;
        }
    }

    /// Pair `new_leaf` with its in-order left neighbor `left_leaf` under a
    /// new inner node, then recompute hashes to the root.
    fn splice_pair(&mut self, left_leaf: NodeId, new_leaf: NodeId) {
        let grandparent = self.arena[left_leaf].parent;
        let pair_hash = merge(&self.arena[left_leaf].hash, &self.arena[new_leaf].hash);
        let pair = self.arena.alloc(MhtNode::inner(pair_hash, left_leaf, new_leaf));
        self.arena[left_leaf].parent = Some(pair);
        self.arena[new_leaf].parent = Some(pair);
        self.arena[pair].parent = grandparent;

        match grandparent {
            None => self.root = pair,
            Some(gp) => {
                let node = &mut self.arena[gp];
                if node.left == Some(left_leaf) {
                    node.left = Some(pair);
                } else {
                    node.right = Some(pair);
                }
            }
        }
        self.rehash_upward(grandparent);
    }

    fn rehash_upward(&mut self, from: Option<NodeId>) {
        let mut current = from;
        while let Some(id) = current {
            if let (Some(left), Some(right)) = (self.arena[id].left, self.arena[id].right) {
                let hash = merge(&self.arena[left].hash, &self.arena[right].hash);
                self.arena[id].hash = hash;
            }
            current = self.arena[id].parent;
        }
    }

    fn subtree_elements(&self, id: NodeId) -> Vec<E> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let node = &self.arena[id];
            match (&node.elem, node.left, node.right) {
                (Some(elem), _, _) => out.push(elem.clone()),
                (None, Some(left), Some(right)) => {
                    // right first so the left subtree pops first
                    stack.push(right);
                    stack.push(left);
                }
                _ => {}
            }
        }
        out
    }

    fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.arena.free(id) {
                stack.extend(node.left);
                stack.extend(node.right);
            }
        }
    }

    fn check_insertable(&self, elem: &E) -> Result<(), MhtError> {
        let (first, last) = match (self.leaves.keys().next(), self.leaves.keys().next_back()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(MhtError::EmptySeed),
        };
        if elem <= first || elem >= last {
            return Err(MhtError::OutOfRange {
                elem: format!("{elem:?}"),
            });
        }
        if self.leaves.contains_key(elem) {
            return Err(MhtError::Duplicate {
                elem: format!("{elem:?}"),
            });
        }
        Ok(())
    }

    /// Structural self-check; fails on the first violation found.
    pub fn valid(&self) -> Result<(), MhtError> {
        if self.arena[self.root].parent.is_some() {
            return Err(MhtError::InvalidTree {
                reason: "root has a parent".to_owned(),
            });
        }

        let mut in_order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = &self.arena[id];
            match (&node.elem, node.left, node.right) {
                (Some(elem), None, None) => {
                    if node.hash != hash_elem(elem) {
                        return Err(MhtError::InvalidTree {
                            reason: format!("leaf hash mismatch at {elem:?}"),
                        });
                    }
                    if self.leaves.get(elem) != Some(&id) {
                        return Err(MhtError::InvalidTree {
                            reason: format!("leaf map disagrees at {elem:?}"),
                        });
                    }
                    in_order.push(elem.clone());
                }
                (None, Some(left), Some(right)) => {
                    if self.arena[left].parent != Some(id)
                        || self.arena[right].parent != Some(id)
                    {
                        return Err(MhtError::InvalidTree {
                            reason: "child parent back-reference mismatch".to_owned(),
                        });
                    }
                    if self.arena[id].hash
                        != merge(&self.arena[left].hash, &self.arena[right].hash)
                    {
                        return Err(MhtError::InvalidTree {
                            reason: "inner hash mismatch".to_owned(),
                        });
                    }
                    stack.push(right);
                    stack.push(left);
                }
                _ => {
                    return Err(MhtError::InvalidTree {
                        reason: "children must be all-or-nothing".to_owned(),
                    });
                }
            }
        }

        if !in_order.iter().eq(self.leaves.keys()) {
            return Err(MhtError::InvalidTree {
                reason: "leaf order disagrees with the element list".to_owned(),
            });
        }
        Ok(())
    }

    /// Write an indented dump of the tree, for debugging.
    pub fn dump(&self, w: &mut impl Write) -> std::io::Result<()> {
        self.dump_node(self.root, 0, w)
    }

    fn dump_node(&self, id: NodeId, depth: usize, w: &mut impl Write) -> std::io::Result<()> {
        let node = &self.arena[id];
        let short = hex::encode(node.hash.as_bytes().get(..4).unwrap_or_default());
        match &node.elem {
            Some(elem) => writeln!(w, "{:indent$}{short} {elem:?}", "", indent = depth * 2)?,
            None => writeln!(w, "{:indent$}{short}", "", indent = depth * 2)?,
        }
        if let (Some(left), Some(right)) = (node.left, node.right) {
            self.dump_node(left, depth + 1, w)?;
            self.dump_node(right, depth + 1, w)?;
        }
        Ok(())
    }
}

/// Pair adjacent siblings left-to-right, promoting an odd trailing node
/// unchanged, until one node remains.
fn build_from_leaves<E: Element>(arena: &mut Arena<MhtNode<E>>, ids: Vec<NodeId>) -> NodeId {
    let mut level = ids;
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            match *pair {
                [left, right] => {
                    let hash = merge(&arena[left].hash, &arena[right].hash);
                    let parent = arena.alloc(MhtNode::inner(hash, left, right));
                    arena[left].parent = Some(parent);
                    arena[right].parent = Some(parent);
                    next.push(parent);
                }
                [odd] => next.push(odd),
                _ => unreachable!("chunks(2) yields one or two nodes"),
            }
        }
        level = next;
    }
    match level.as_slice() {
        [root] => *root,
        _ => unreachable!("pairing terminates at exactly one node"),
    }
}

/// Merge two sorted, mutually disjoint element runs.
fn merge_sorted<E: Element>(a: Vec<E>, b: Vec<E>) -> Vec<E> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let mut a = a.into_iter().peekable();
    let mut b = b.into_iter().peekable();
    loop {
        match (a.peek(), b.peek()) {
            (Some(x), Some(y)) => {
                if x < y {
                    out.extend(a.next());
                } else {
                    out.extend(b.next());
                }
            }
            (Some(_), None) => out.extend(a.next()),
            (None, Some(_)) => out.extend(b.next()),
            (None, None) => break,
        }
    }
    out
}
