// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! The authenticated skip list over a generic ordered key.
//!
//! Every level is a linked list of nodes; each node points right along its
//! level and down to its own element one level below. The bottom level
//! holds every element between the two boundary sentinels, and the top
//! level is always the bare two-sentinel frame. Labels are assigned
//! bottom-up with the commutative hash, so a verifier can refold a proof's
//! labels without knowing where each sibling sat.
//!
//! Promotion heights come from a [`CoinSource`] wired in at construction,
//! which is what makes tower shapes reproducible across machines.

use std::io::Write;

use metrics::counter;
use storage::{commute, elem_label, Arena, Element, Label, NodeId, SkipNode, SkipParent};
use thiserror::Error;

use crate::coin::CoinSource;
use crate::registry;
use crate::trace;
use crate::update::DiffOp;

pub mod proof;

use proof::{SkipChild, SkipProof, SkipVoElem, SkipVoNode};

#[derive(Debug, Error)]
pub enum SkipListError {
    #[error("boundary elements are not strictly ordered")]
    InvalidBounds,
    #[error("element {elem} is outside the sentinel range")]
    OutOfRange { elem: String },
    #[error("element {elem} is already stored")]
    Duplicate { elem: String },
    #[error("range bounds must lie strictly inside the sentinels")]
    InvalidRange,
    #[error("invalid skip list: {reason}")]
    InvalidList { reason: String },
}

/// Everything a client needs to roll its digest forward after an insert:
/// the pre-insert membership query pieces for the new element, plus the
/// splice tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertDiff<E> {
    /// Base-level segment starting at the new element's left neighbor.
    pub base_elems: Vec<E>,
    /// The pre-insert path proof (the part of the membership proof above
    /// the base segment).
    pub proof: Vec<Label>,
    /// The splice token stream, grammar `MEET* (UP (n | MEET)*)?`.
    pub diff: Vec<DiffOp>,
}

/// One promotion performed during an insert, recorded for diff emission.
#[derive(Debug)]
struct Promotion {
    /// Went-right path entries crossed since the previous promotion (for
    /// the first promotion: since the search end).
    lefts: usize,
    /// The new tower node at this level.
    node: NodeId,
}

/// The authenticated skip list.
#[derive(Debug)]
pub struct SkipList<E: Element, C: CoinSource> {
    arena: Arena<SkipNode<E>>,
    root: NodeId,
    lbound: E,
    rbound: E,
    coin: C,
    len: usize,
}

impl<E: Element, C: CoinSource> SkipList<E, C> {
    /// The minimal frame: a two-node bottom level `[lbound, rbound]` under
    /// the sentinel top frame.
    ///
    /// The sentinel towers exist from birth, so every base segment
    /// terminates at a tower node and the proof folds need no special case
    /// for a freshly built list.
    pub fn new(lbound: E, rbound: E, coin: C) -> Result<Self, SkipListError> {
        if lbound >= rbound {
            return Err(SkipListError::InvalidBounds);
        }
        let mut arena = Arena::new();
        let bottom_left = arena.alloc(SkipNode::new(lbound.clone()));
        let bottom_right = arena.alloc(SkipNode::new(rbound.clone()));
        let top_left = arena.alloc(SkipNode::new(lbound.clone()));
        let top_right = arena.alloc(SkipNode::new(rbound.clone()));

        arena[bottom_left].right = Some(bottom_right);
        arena[bottom_left].parent = Some(SkipParent::Above(top_left));
        arena[bottom_left].tower = true;
        arena[bottom_right].parent = Some(SkipParent::Above(top_right));
        arena[bottom_right].tower = true;
        arena[top_left].down = Some(bottom_left);
        arena[top_left].right = Some(top_right);
        arena[top_right].down = Some(bottom_right);
        arena[top_right].parent = Some(SkipParent::Left(top_left));

        let mut list = SkipList {
            arena,
            root: top_left,
            lbound,
            rbound,
            coin,
            len: 2,
        };
        list.relabel(bottom_right);
        list.relabel(bottom_left);
        list.relabel(top_right);
        list.relabel(top_left);
        Ok(list)
    }

    /// Build by inserting `elems` into the two-element frame.
    pub fn from_elems(
        lbound: E,
        rbound: E,
        elems: impl IntoIterator<Item = E>,
        coin: C,
    ) -> Result<Self, SkipListError> {
        let mut list = Self::new(lbound, rbound, coin)?;
        for elem in elems {
            list.insert(elem)?;
        }
        Ok(list)
    }

    /// The published digest: the root's label.
    pub fn root_label(&self) -> Label {
        self.arena[self.root].label.clone()
    }

    /// The boundary sentinels.
    pub const fn bounds(&self) -> (&E, &E) {
        (&self.lbound, &self.rbound)
    }

    /// Number of stored elements, sentinels included.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Never true: the frame always holds its sentinels.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The coin source, for reseed/reprefix control by an embedding.
    pub fn coin_mut(&mut self) -> &mut C {
        &mut self.coin
    }

    /// The stored elements in order, sentinels included.
    pub fn elements(&self) -> impl Iterator<Item = &E> + '_ {
        let mut bottom = self.root;
        while let Some(down) = self.arena[bottom].down {
            bottom = down;
        }
        std::iter::successors(Some(bottom), move |&id| self.arena[id].right)
            .map(move |id| &self.arena[id].elem)
    }

    /// Horizontal-then-down search for the bottom-level predecessor of
    /// `target`. Returns the reversed path of `(node, went_down)` pairs,
    /// search end first.
    ///
    /// The search never steps onto a right sentinel, so even out-of-range
    /// targets produce a well-formed path; sentinel membership itself is
    /// not authenticated.
    fn search(&self, target: &E) -> Vec<(NodeId, bool)> {
        let mut path = Vec::new();
        let mut current = self.root;
        loop {
            match self.arena[current].right {
                Some(right)
                    if self.arena[right].elem <= *target
                        && self.arena[right].right.is_some() =>
                {
                    path.push((current, false));
                    current = right;
                }
                _ => match self.arena[current].down {
                    Some(down) => {
                        path.push((current, true));
                        current = down;
                    }
                    None => {
                        path.push((current, false));
                        break;
                    }
                },
            }
        }
        path.reverse();
        path
    }

    /// The `do_query` pieces for `elem`: the base segment from the search
    /// end through the next tower node, and the path contributions above
    /// it.
    pub fn query(&self, elem: &E) -> (Vec<E>, Vec<Label>) {
        let path = self.search(elem);
        let Some(&(end, _)) = path.first() else {
            return (Vec::new(), Vec::new());
        };

        let mut returned = vec![self.arena[end].elem.clone()];
        let mut cursor = end;
        while let Some(right) = self.arena[cursor].right {
            returned.push(self.arena[right].elem.clone());
            if self.arena[right].tower {
                break;
            }
            cursor = right;
        }

        let mut path_proof = Vec::new();
        for &(node, went_down) in path.iter().skip(1) {
            if went_down {
                // a plateau right neighbor is off the path; its label is
                // folded in here. A tower right neighbor contributes through
                // its own bottom element instead.
                if let Some(right) = self.arena[node].right {
                    if self.arena[right].is_plateau() {
                        path_proof.push(self.arena[right].label.clone());
                    }
                }
            } else {
                // we moved right from this node, so its label's other
                // operand is its own contribution
                match self.arena[node].down {
                    Some(down) => path_proof.push(self.arena[down].label.clone()),
                    None => path_proof.push(elem_label(&self.arena[node].elem)),
                }
            }
        }
        (returned, path_proof)
    }

    /// Membership query with proof.
    ///
    /// The proof folds (with the commutative hash) to the root label for
    /// both positive and negative answers; a negative answer is proven by
    /// the returned segment bracketing the absent element.
    pub fn contains(&self, elem: &E) -> (bool, Vec<Label>) {
        let (returned, path_proof) = self.query(elem);
        let found = returned.first() == Some(elem);
        let mut proof: Vec<Label> = returned.iter().rev().map(elem_label).collect();
        proof.extend(path_proof);
        counter!(registry::SKIP_QUERY).increment(1);
        (found, proof)
    }

    /// Insert `elem` strictly between the sentinels.
    pub fn insert(&mut self, elem: E) -> Result<(), SkipListError> {
        self.insert_inner(elem)?;
        Ok(())
    }

    /// Iterated insert; pairs with the hash-derived coin for tape-free
    /// batch protocols.
    pub fn batch_insert(
        &mut self,
        elems: impl IntoIterator<Item = E>,
    ) -> Result<(), SkipListError> {
        for elem in elems {
            self.insert(elem)?;
        }
        Ok(())
    }

    /// Insert `elem` and emit the proof-diff a client replays to roll its
    /// digest forward.
    pub fn insert_with_diff(&mut self, elem: E) -> Result<InsertDiff<E>, SkipListError> {
        let (base_elems, proof) = self.query(&elem);
        let (base_lefts, promotions) = self.insert_inner(elem)?;

        let mut diff = vec![DiffOp::Meet; base_lefts];
        if !promotions.is_empty() {
            diff.push(DiffOp::Up);
            for (index, promotion) in promotions.iter().enumerate() {
                if index > 0 && promotion.lefts > 0 {
                    let lefts =
                        u32::try_from(promotion.lefts).map_err(|_| SkipListError::InvalidList {
                            reason: "path too long for a diff token".to_owned(),
                        })?;
                    diff.push(DiffOp::Take(lefts));
                }
                // judged against the post-insert structure: a neighbor that
                // stopped being a plateau (the sentinel column grew past it)
                // must not be kept
                if let Some(right) = self.arena[promotion.node].right {
                    if self.arena[right].is_plateau() {
                        diff.push(DiffOp::Meet);
                    }
                }
            }
        }

        Ok(InsertDiff {
            base_elems,
            proof,
            diff,
        })
    }

    /// The structural insert shared by [`SkipList::insert`] and
    /// [`SkipList::insert_with_diff`]. Returns the count of base-level
    /// went-right path entries and the promotions performed.
    fn insert_inner(&mut self, elem: E) -> Result<(usize, Vec<Promotion>), SkipListError> {
        if elem <= self.lbound || elem >= self.rbound {
            return Err(SkipListError::OutOfRange {
                elem: format!("{elem:?}"),
            });
        }

        let path = self.search(&elem);
        let &(end, _) = path.first().ok_or_else(|| SkipListError::InvalidList {
            reason: "empty search path".to_owned(),
        })?;
        if self.arena[end].elem == elem {
            return Err(SkipListError::Duplicate {
                elem: format!("{elem:?}"),
            });
        }

        self.coin.start(&elem.encode());

        // bottom-level splice to the right of the predecessor
        let bottom = self.arena.alloc(SkipNode::new(elem.clone()));
        let old_right = self.arena[end].right;
        self.arena[bottom].right = old_right;
        self.arena[bottom].parent = Some(SkipParent::Left(end));
        self.arena[end].right = Some(bottom);
        if let Some(right) = old_right {
            if self.arena[right].is_plateau() {
                self.arena[right].parent = Some(SkipParent::Left(bottom));
            }
        }

        // promotion along the recorded path
        let steps: Vec<(NodeId, bool)> = path.iter().skip(1).copied().collect();
        let mut cursor = 0usize;
        let mut lefts = 0usize;
        while let Some(&(_, went_down)) = steps.get(cursor) {
            if went_down {
                break;
            }
            lefts += 1;
            cursor += 1;
        }
        let base_lefts = lefts;

        let mut promotions: Vec<Promotion> = Vec::new();
        let mut below = bottom;
        let mut new_levels: Vec<(NodeId, NodeId)> = Vec::new();
        while self.coin.flip() {
            let at = match steps.get(cursor) {
                Some(&(node, _)) => {
                    cursor += 1;
                    node
                }
                None => {
                    let (left, right) = self.push_sentinel_level();
                    new_levels.push((left, right));
                    left
                }
            };
            let promoted = self.promote_above(below, at);
            promotions.push(Promotion {
                lefts,
                node: promoted,
            });
            below = promoted;
            lefts = 0;
            while let Some(&(_, went_down)) = steps.get(cursor) {
                if went_down {
                    break;
                }
                lefts += 1;
                cursor += 1;
            }
        }

        // the top level is always the bare sentinel frame
        if let Some(right) = self.arena[self.root].right {
            if self.arena[right].right.is_some() {
                let (left, right) = self.push_sentinel_level();
                new_levels.push((left, right));
            }
        }

        // relabel the affected set bottom-up: the new bottom node, the
        // search end, then every path node (tower nodes before their left
        // neighbors), then any fresh sentinel levels
        self.relabel(bottom);
        self.relabel(end);
        let mut promo_iter = promotions.iter();
        for &(node, went_down) in &steps {
            if went_down {
                // promotions attach to descent entries in path order; the
                // tower node relabels before its left neighbor
                if let Some(promotion) = promo_iter.next() {
                    self.relabel(promotion.node);
                }
            }
            self.relabel(node);
        }
        for &(left, right) in &new_levels {
            self.relabel(right);
            if let Some(threaded) = self.arena[left].right {
                if threaded != right {
                    self.relabel(threaded);
                }
            }
            self.relabel(left);
        }

        self.len += 1;
        trace!("skip insert height {}", promotions.len());
        counter!(registry::SKIP_INSERT).increment(1);
        Ok((base_lefts, promotions))
    }

    /// Thread a new copy of `below`'s element to the right of `at`, one
    /// level above `below`.
    fn promote_above(&mut self, below: NodeId, at: NodeId) -> NodeId {
        let elem = self.arena[below].elem.clone();
        let promoted = self.arena.alloc(SkipNode::new(elem));
        let old_right = self.arena[at].right;
        self.arena[promoted].right = old_right;
        self.arena[promoted].down = Some(below);
        self.arena[promoted].parent = Some(SkipParent::Left(at));
        self.arena[at].right = Some(promoted);
        if let Some(right) = old_right {
            if self.arena[right].is_plateau() {
                self.arena[right].parent = Some(SkipParent::Left(promoted));
            }
        }
        self.arena[below].parent = Some(SkipParent::Above(promoted));
        self.arena[below].tower = true;
        promoted
    }

    /// Add a fresh sentinel level above the current top; the old top's
    /// sentinels become towers. Returns the new `(left, right)` sentinels;
    /// the left one is the new root.
    fn push_sentinel_level(&mut self) -> (NodeId, NodeId) {
        let old_root = self.root;
        let mut old_right = old_root;
        while let Some(right) = self.arena[old_right].right {
            old_right = right;
        }

        let left = self.arena.alloc(SkipNode::new(self.lbound.clone()));
        let right = self.arena.alloc(SkipNode::new(self.rbound.clone()));
        self.arena[left].down = Some(old_root);
        self.arena[left].right = Some(right);
        self.arena[right].down = Some(old_right);
        self.arena[right].parent = Some(SkipParent::Left(left));
        self.arena[old_root].parent = Some(SkipParent::Above(left));
        self.arena[old_root].tower = true;
        self.arena[old_right].parent = Some(SkipParent::Above(right));
        self.arena[old_right].tower = true;
        self.root = left;
        (left, right)
    }

    /// Recompute one node's label from its right and lower neighbors.
    fn relabel(&mut self, id: NodeId) {
        let label = {
            let node = &self.arena[id];
            match node.right {
                None => Label::empty(),
                Some(right_id) => {
                    let right = &self.arena[right_id];
                    match node.down {
                        None => {
                            let own = elem_label(&node.elem);
                            if right.tower {
                                commute(&own, &elem_label(&right.elem))
                            } else {
                                commute(&own, &right.label)
                            }
                        }
                        Some(down_id) => {
                            let down = &self.arena[down_id].label;
                            if right.tower {
                                down.clone()
                            } else {
                                commute(down, &right.label)
                            }
                        }
                    }
                }
            }
        };
        self.arena[id].label = label;
    }

    /// A verification object covering every stored element in `[lo, hi]`.
    ///
    /// Bounds must lie strictly inside the sentinels; range endpoints at or
    /// beyond the sentinels are not authenticated.
    pub fn range_query(&self, lo: &E, hi: &E) -> Result<SkipProof<E>, SkipListError> {
        if lo > hi || *lo <= self.lbound || *hi >= self.rbound {
            return Err(SkipListError::InvalidRange);
        }
        counter!(registry::SKIP_RANGE_QUERY).increment(1);
        match self.build_vo(self.root, lo, hi) {
            SkipChild::Node(root) => Ok(SkipProof::from_root(*root)),
            _ => Err(SkipListError::InvalidList {
                reason: "range query produced no expanded node".to_owned(),
            }),
        }
    }

    /// Top-down proof construction: keep a branch expanded only while some
    /// base segment under it overlaps the range, otherwise collapse it to
    /// its label.
    fn build_vo(&self, id: NodeId, lo: &E, hi: &E) -> SkipChild<E> {
        let node = &self.arena[id];
        let Some(down) = node.down else {
            // bottom level: the segment runs through the next tower node
            let mut segment = vec![node.elem.clone()];
            let mut cursor = id;
            while let Some(right) = self.arena[cursor].right {
                segment.push(self.arena[right].elem.clone());
                if self.arena[right].tower {
                    break;
                }
                cursor = right;
            }
            let relevant = segment.last().is_some_and(|last| last >= lo)
                && segment.first().is_some_and(|first| first <= hi);
            if relevant {
                return SkipChild::Node(Box::new(SkipVoNode {
                    tower: node.tower,
                    down: SkipChild::None,
                    right: SkipChild::None,
                    elem: SkipVoElem::Segment(segment),
                }));
            }
            return SkipChild::Label(node.label.clone());
        };

        match node.right {
            Some(right) if self.arena[right].is_plateau() => {
                let down_built = self.build_vo(down, lo, hi);
                let right_built = if self.arena[right].elem > *hi {
                    SkipChild::Label(self.arena[right].label.clone())
                } else {
                    self.build_vo(right, lo, hi)
                };
                match (down_built, right_built) {
                    (SkipChild::Label(down_label), SkipChild::Label(right_label)) => {
                        SkipChild::Label(commute(&down_label, &right_label))
                    }
                    (down_built, right_built) => SkipChild::Node(Box::new(SkipVoNode {
                        tower: node.tower,
                        down: down_built,
                        right: right_built,
                        elem: SkipVoElem::Single(node.elem.clone()),
                    })),
                }
            }
            _ => match self.build_vo(down, lo, hi) {
                SkipChild::Node(sub) => SkipChild::Node(Box::new(SkipVoNode {
                    tower: node.tower,
                    down: SkipChild::Node(sub),
                    right: SkipChild::None,
                    elem: SkipVoElem::Single(node.elem.clone()),
                })),
                collapsed => collapsed,
            },
        }
    }

    /// Structural self-check; fails on the first violation found.
    pub fn valid(&self) -> Result<(), SkipListError> {
        let fail = |reason: &str| SkipListError::InvalidList {
            reason: reason.to_owned(),
        };

        if self.arena[self.root].parent.is_some() {
            return Err(fail("root has a parent"));
        }
        if self.arena[self.root].elem != self.lbound {
            return Err(fail("root is not the left sentinel"));
        }
        match self.arena[self.root].right {
            Some(right) => {
                if self.arena[right].elem != self.rbound {
                    return Err(fail("top level right neighbor is not the right sentinel"));
                }
                if self.arena[right].right.is_some() {
                    return Err(fail("top level holds more than the sentinel frame"));
                }
            }
            None => return Err(fail("root has no right sentinel")),
        }

        // walk every level down the left spine
        let mut level_head = Some(self.root);
        let mut bottom_count = 0usize;
        while let Some(head) = level_head {
            let mut cursor = head;
            loop {
                let node = &self.arena[cursor];
                if node.tower != matches!(node.parent, Some(SkipParent::Above(_))) {
                    return Err(fail("tower flag disagrees with the parent tag"));
                }
                match node.parent {
                    Some(SkipParent::Above(above)) => {
                        if self.arena[above].down != Some(cursor) {
                            return Err(fail("above-parent does not point back down"));
                        }
                    }
                    Some(SkipParent::Left(left)) => {
                        if self.arena[left].right != Some(cursor) {
                            return Err(fail("left-parent does not point back right"));
                        }
                    }
                    None => {
                        if cursor != self.root {
                            return Err(fail("only the root may be parentless"));
                        }
                    }
                }
                if let Some(down) = node.down {
                    if self.arena[down].elem != node.elem {
                        return Err(fail("tower changes its element"));
                    }
                }
                if node.down.is_none() {
                    bottom_count += 1;
                }
                if !self.label_matches(cursor) {
                    return Err(fail("stored label disagrees with recomputation"));
                }
                match node.right {
                    Some(right) => {
                        if self.arena[right].elem <= node.elem {
                            return Err(fail("level is not strictly ordered"));
                        }
                        cursor = right;
                    }
                    None => break,
                }
            }
            level_head = self.arena[head].down;
        }

        if bottom_count != self.len {
            return Err(fail("bottom level disagrees with the element count"));
        }
        Ok(())
    }

    fn label_matches(&self, id: NodeId) -> bool {
        let node = &self.arena[id];
        let expected = match node.right {
            None => Label::empty(),
            Some(right_id) => {
                let right = &self.arena[right_id];
                match node.down {
                    None => {
                        let own = elem_label(&node.elem);
                        if right.tower {
                            commute(&own, &elem_label(&right.elem))
                        } else {
                            commute(&own, &right.label)
                        }
                    }
                    Some(down_id) => {
                        let down = &self.arena[down_id].label;
                        if right.tower {
                            down.clone()
                        } else {
                            commute(down, &right.label)
                        }
                    }
                }
            }
        };
        node.label == expected
    }

    /// Write a level-by-level dump, for debugging.
    pub fn dump(&self, w: &mut impl Write) -> std::io::Result<()> {
        let mut level_head = Some(self.root);
        let mut level = 0usize;
        let mut heads = Vec::new();
        while let Some(head) = level_head {
            heads.push(head);
            level_head = self.arena[head].down;
        }
        for head in heads.iter().rev() {
            write!(w, "L{level}:")?;
            let mut cursor = Some(*head);
            while let Some(id) = cursor {
                let node = &self.arena[id];
                let mark = if node.tower { "^" } else { "-" };
                write!(w, " {:?}{mark}", node.elem)?;
                cursor = node.right;
            }
            writeln!(w)?;
            level += 1;
        }
        Ok(())
    }
}
