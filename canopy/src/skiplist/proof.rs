// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! The skip-list verification object.
//!
//! Unlike the skip list itself, the proof is a tree: each node carries the
//! path into its lower level and, when the right neighbor is a plateau
//! node whose subtree matters to the range, a right child. Anything
//! irrelevant collapses to its label. Bottom-level nodes carry a whole
//! base segment, from one tower node through the next, so adjacent
//! segments overlap in exactly their shared tower element.

use enum_as_inner::EnumAsInner;
use metrics::counter;
use storage::{chain, commute, elem_label, Element, Label};

use crate::codec::{self, CodecError, Cursor};
use crate::coin::CoinSource;
use crate::proof::ProofError;
use crate::registry;

/// A child slot of a proof node.
///
/// `None` stands for an edge the skip list drops (a tower right neighbor,
/// or the floor under a base segment); `Label` is a collapsed branch.
#[derive(Debug, Clone, PartialEq, Eq, EnumAsInner)]
pub enum SkipChild<E> {
    None,
    Label(Label),
    Node(Box<SkipVoNode<E>>),
}

/// What a proof node carries: a single element on the upper levels, a
/// base segment on the bottom level.
#[derive(Debug, Clone, PartialEq, Eq, EnumAsInner)]
pub enum SkipVoElem<E> {
    Single(E),
    Segment(Vec<E>),
}

/// One node of the proof tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipVoNode<E> {
    pub(crate) tower: bool,
    pub(crate) down: SkipChild<E>,
    pub(crate) right: SkipChild<E>,
    pub(crate) elem: SkipVoElem<E>,
}

impl<E> SkipVoNode<E> {
    fn head_elem(&self) -> Option<&E> {
        match &self.elem {
            SkipVoElem::Single(elem) => Some(elem),
            SkipVoElem::Segment(seg) => seg.first(),
        }
    }
}

/// The verification object for a skip-list range query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipProof<E>(SkipVoNode<E>);

/// What bubbles up while mirroring an insert: either the structure below
/// is settled, or a new tower node still needs a home one level up.
enum Rise<E> {
    Done,
    Promote(Box<SkipVoNode<E>>),
}

impl<E: Element> SkipProof<E> {
    pub(crate) const fn from_root(root: SkipVoNode<E>) -> Self {
        SkipProof(root)
    }

    /// Recompute the root label from the proof's own structure.
    pub fn root_label(&self) -> Result<Label, ProofError> {
        label_of(&self.0)
    }

    /// Verify this proof for the range `[lo, hi]` against the published
    /// digest. On success, returns exactly the in-range stored elements.
    pub fn verify(&self, lo: &E, hi: &E, expected_root: &Label) -> Result<Vec<E>, ProofError> {
        let result = self.verify_inner(lo, hi, expected_root);
        counter!(
            registry::VO_VERIFY,
            "structure" => "skip",
            "success" => if result.is_ok() { "true" } else { "false" }
        )
        .increment(1);
        result
    }

    fn verify_inner(&self, lo: &E, hi: &E, expected_root: &Label) -> Result<Vec<E>, ProofError> {
        let (label, elems) = verify_node(&self.0, lo, hi)?;
        if label != *expected_root {
            return Err(ProofError::RootMismatch);
        }
        // the contiguous run must reach strictly past both ends of the
        // range, or an edge element could have been dropped
        let (Some(first), Some(last)) = (elems.first(), elems.last()) else {
            return Err(ProofError::BoundaryMissing);
        };
        if first >= lo || last <= hi {
            return Err(ProofError::BoundaryMissing);
        }
        Ok(elems
            .into_iter()
            .filter(|elem| elem >= lo && elem <= hi)
            .collect())
    }

    /// Mirror a skip-list insert against the proof, with the same coin
    /// bits supplied out-of-band. Returns the recomputed root label, which
    /// a client compares against the server's post-insert digest.
    ///
    /// Collapsed branches are opaque: an insertion that would descend
    /// through one is refused rather than guessed at.
    pub fn insert(
        &mut self,
        elem: E,
        coin: &mut impl CoinSource,
    ) -> Result<Label, ProofError> {
        let lbound = self
            .0
            .head_elem()
            .ok_or(ProofError::EmptyNode)?
            .clone();
        if elem <= lbound {
            return Err(ProofError::NoInsertionPoint {
                elem: format!("{elem:?}"),
            });
        }
        coin.start(&elem.encode());

        let rise = descend(&mut self.0, &elem, coin)?;
        match rise {
            Rise::Done => {
                // a tower that topped out at the old top level forces a new
                // sentinel frame above it, and the old top-right sentinel
                // stops being a plateau
                if self.0.right.is_node() {
                    if let SkipChild::Node(threaded) = &mut self.0.right {
                        threaded.right = SkipChild::None;
                    }
                    self.push_cap(&lbound);
                }
            }
            Rise::Promote(mut carried) => {
                let mut old_root = std::mem::replace(
                    &mut self.0,
                    SkipVoNode {
                        tower: false,
                        down: SkipChild::None,
                        right: SkipChild::None,
                        elem: SkipVoElem::Single(lbound.clone()),
                    },
                );
                old_root.tower = true;
                old_root.right = SkipChild::None;
                let mut top = SkipVoNode {
                    tower: false,
                    down: SkipChild::Node(Box::new(old_root)),
                    right: SkipChild::None,
                    elem: SkipVoElem::Single(lbound.clone()),
                };
                loop {
                    carried.tower = true;
                    let mut threaded = SkipVoNode {
                        tower: false,
                        down: SkipChild::Node(carried),
                        right: SkipChild::None,
                        elem: SkipVoElem::Single(elem.clone()),
                    };
                    if coin.flip() {
                        threaded.tower = true;
                        carried = Box::new(threaded);
                        top.tower = true;
                        top = SkipVoNode {
                            tower: false,
                            down: SkipChild::Node(Box::new(top)),
                            right: SkipChild::None,
                            elem: SkipVoElem::Single(lbound.clone()),
                        };
                    } else {
                        top.right = SkipChild::Node(Box::new(threaded));
                        break;
                    }
                }
                self.0 = top;
                self.push_cap(&lbound);
            }
        }
        label_of(&self.0)
    }

    /// Put a fresh sentinel frame above the current root.
    fn push_cap(&mut self, lbound: &E) {
        let mut old_root = std::mem::replace(
            &mut self.0,
            SkipVoNode {
                tower: false,
                down: SkipChild::None,
                right: SkipChild::None,
                elem: SkipVoElem::Single(lbound.clone()),
            },
        );
        old_root.tower = true;
        self.0 = SkipVoNode {
            tower: false,
            down: SkipChild::Node(Box::new(old_root)),
            right: SkipChild::Label(Label::empty()),
            elem: SkipVoElem::Single(lbound.clone()),
        };
    }

    /// Text serialization: parenthesized `(tower,down,right,elem)` tuples,
    /// `{}` for absent children, base-64 labels, `~`-joined base segments.
    pub fn serialize(&self) -> Result<String, CodecError> {
        let mut out = String::new();
        write_node(&self.0, &mut out)?;
        Ok(out)
    }

    /// Inverse of [`SkipProof::serialize`].
    pub fn deserialize(input: &str) -> Result<Self, CodecError> {
        let mut cursor = Cursor::new(input);
        let root = parse_node(&mut cursor)?;
        let rest = cursor.take_until(&[]);
        if !rest.is_empty() {
            return Err(CodecError::UnexpectedToken {
                token: rest.to_owned(),
            });
        }
        Ok(SkipProof(root))
    }
}

/// Recompute a node's label the way the skip list assigns them.
fn label_of<E: Element>(node: &SkipVoNode<E>) -> Result<Label, ProofError> {
    match (&node.down, &node.elem) {
        (SkipChild::None, SkipVoElem::Segment(seg)) => {
            Ok(chain(seg.iter().rev().map(elem_label)))
        }
        (down, SkipVoElem::Single(_)) => {
            let down_label = match down {
                SkipChild::Node(down) => label_of(down)?,
                SkipChild::Label(label) => label.clone(),
                SkipChild::None => return Err(ProofError::EmptyNode),
            };
            match &node.right {
                SkipChild::None => Ok(down_label),
                SkipChild::Label(label) => Ok(commute(&down_label, label)),
                SkipChild::Node(right) => Ok(commute(&down_label, &label_of(right)?)),
            }
        }
        _ => Err(ProofError::EmptyNode),
    }
}

/// The recursive verification walk: returns the subtree's label and the
/// contiguous run of base elements it covers.
fn verify_node<E: Element>(
    node: &SkipVoNode<E>,
    lo: &E,
    hi: &E,
) -> Result<(Label, Vec<E>), ProofError> {
    match (&node.down, &node.right, &node.elem) {
        (SkipChild::None, SkipChild::None, SkipVoElem::Segment(seg)) => {
            if seg.len() < 2 {
                return Err(ProofError::SegmentTooShort);
            }
            if !seg.windows(2).all(|w| matches!(w, [a, b] if a < b)) {
                return Err(ProofError::LeavesOutOfOrder);
            }
            let relevant = seg.last().is_some_and(|last| last >= lo)
                && seg.first().is_some_and(|first| first <= hi);
            if !relevant {
                return Err(ProofError::SegmentOutOfRange);
            }
            Ok((chain(seg.iter().rev().map(elem_label)), seg.clone()))
        }
        (SkipChild::Node(down), right, SkipVoElem::Single(elem)) => {
            if down.head_elem() != Some(elem) {
                return Err(ProofError::ElemMismatch);
            }
            let (down_label, down_elems) = verify_node(down, lo, hi)?;
            match right {
                SkipChild::None => Ok((down_label, down_elems)),
                SkipChild::Label(label) => Ok((commute(&down_label, label), down_elems)),
                SkipChild::Node(right) => {
                    let (right_label, right_elems) = verify_node(right, lo, hi)?;
                    let elems = join_runs(down_elems, right_elems)?;
                    Ok((commute(&down_label, &right_label), elems))
                }
            }
        }
        (SkipChild::Label(down_label), right, SkipVoElem::Single(elem)) => {
            // a collapsed lower level under an in-range element is exactly
            // how a server would hide a stored element
            if elem >= lo && elem <= hi {
                return Err(ProofError::OmittedBranch);
            }
            match right {
                SkipChild::Node(right) => {
                    let (right_label, right_elems) = verify_node(right, lo, hi)?;
                    Ok((commute(down_label, &right_label), right_elems))
                }
                _ => Err(ProofError::CollapsedInterior),
            }
        }
        _ => Err(ProofError::EmptyNode),
    }
}

/// Concatenate two covered runs, trimming the shared tower element.
fn join_runs<E: Element>(mut down: Vec<E>, right: Vec<E>) -> Result<Vec<E>, ProofError> {
    match (down.last(), right.first()) {
        (Some(shared), Some(head)) if shared == head => {
            down.extend(right.into_iter().skip(1));
            Ok(down)
        }
        _ => Err(ProofError::SegmentDiscontinuity),
    }
}

/// Mirror the search descent; a promotion bubbles back up as [`Rise`].
fn descend<E: Element>(
    node: &mut SkipVoNode<E>,
    elem: &E,
    coin: &mut impl CoinSource,
) -> Result<Rise<E>, ProofError> {
    if node.elem.is_segment() {
        return insert_into_segment(node, elem, coin);
    }

    let move_right = match &node.right {
        SkipChild::Node(right) => right.head_elem().is_some_and(|head| head <= elem),
        _ => false,
    };
    if move_right {
        if let SkipChild::Node(right) = &mut node.right {
            return descend(right, elem, coin);
        }
    }

    let rise = match &mut node.down {
        SkipChild::Node(down) => descend(down, elem, coin)?,
        SkipChild::Label(_) => return Err(ProofError::DeadBranch),
        SkipChild::None => return Err(ProofError::EmptyNode),
    };
    match rise {
        Rise::Done => Ok(Rise::Done),
        Rise::Promote(mut carried) => {
            carried.tower = true;
            let stolen = std::mem::replace(&mut node.right, SkipChild::None);
            let mut threaded = SkipVoNode {
                tower: false,
                down: SkipChild::Node(carried),
                right: stolen,
                elem: SkipVoElem::Single(elem.clone()),
            };
            if coin.flip() {
                threaded.tower = true;
                Ok(Rise::Promote(Box::new(threaded)))
            } else {
                node.right = SkipChild::Node(Box::new(threaded));
                Ok(Rise::Done)
            }
        }
    }
}

/// Bottom-level insert: extend the segment, or split it when the coin
/// starts a tower.
fn insert_into_segment<E: Element>(
    node: &mut SkipVoNode<E>,
    elem: &E,
    coin: &mut impl CoinSource,
) -> Result<Rise<E>, ProofError> {
    let SkipVoElem::Segment(seg) = &mut node.elem else {
        return Err(ProofError::EmptyNode);
    };
    match seg.binary_search(elem) {
        Ok(_) => Err(ProofError::Duplicate {
            elem: format!("{elem:?}"),
        }),
        Err(pos) if pos == 0 || pos == seg.len() => {
            // the true insertion point sits in a branch this proof
            // collapsed
            Err(ProofError::DeadBranch)
        }
        Err(pos) => {
            if coin.flip() {
                let tail = seg.split_off(pos);
                seg.push(elem.clone());
                let mut right_seg = vec![elem.clone()];
                right_seg.extend(tail);
                Ok(Rise::Promote(Box::new(SkipVoNode {
                    tower: false,
                    down: SkipChild::None,
                    right: SkipChild::None,
                    elem: SkipVoElem::Segment(right_seg),
                })))
            } else {
                seg.insert(pos, elem.clone());
                Ok(Rise::Done)
            }
        }
    }
}

fn write_node<E: Element>(node: &SkipVoNode<E>, out: &mut String) -> Result<(), CodecError> {
    out.push('(');
    out.push(if node.tower { '1' } else { '0' });
    out.push(',');
    write_child(&node.down, out)?;
    out.push(',');
    write_child(&node.right, out)?;
    out.push(',');
    match &node.elem {
        SkipVoElem::Single(elem) => out.push_str(&codec::elem_text(elem)?),
        SkipVoElem::Segment(seg) => {
            out.push('[');
            for (index, elem) in seg.iter().enumerate() {
                if index > 0 {
                    out.push('~');
                }
                out.push_str(&codec::elem_text(elem)?);
            }
            out.push(']');
        }
    }
    out.push(')');
    Ok(())
}

fn write_child<E: Element>(child: &SkipChild<E>, out: &mut String) -> Result<(), CodecError> {
    match child {
        SkipChild::None => out.push_str("{}"),
        SkipChild::Label(label) => out.push_str(&codec::encode_label(label)),
        SkipChild::Node(node) => write_node(node, out)?,
    }
    Ok(())
}

fn parse_node<E: Element>(cursor: &mut Cursor<'_>) -> Result<SkipVoNode<E>, CodecError> {
    cursor.expect('(')?;
    let tower = match cursor.take_until(&[',']) {
        "1" => true,
        "0" => false,
        other => {
            return Err(CodecError::UnexpectedToken {
                token: other.to_owned(),
            })
        }
    };
    cursor.expect(',')?;
    let down = parse_child(cursor)?;
    cursor.expect(',')?;
    let right = parse_child(cursor)?;
    cursor.expect(',')?;
    let elem = if cursor.peek() == Some('[') {
        cursor.expect('[')?;
        let body = cursor.take_until(&[']']);
        cursor.expect(']')?;
        let seg = body
            .split('~')
            .map(|token| E::decode(token.as_bytes()))
            .collect::<Result<Vec<_>, _>>()?;
        SkipVoElem::Segment(seg)
    } else {
        let token = cursor.take_until(&[')']);
        SkipVoElem::Single(E::decode(token.as_bytes())?)
    };
    cursor.expect(')')?;
    Ok(SkipVoNode {
        tower,
        down,
        right,
        elem,
    })
}

fn parse_child<E: Element>(cursor: &mut Cursor<'_>) -> Result<SkipChild<E>, CodecError> {
    match cursor.peek() {
        Some('(') => Ok(SkipChild::Node(Box::new(parse_node(cursor)?))),
        Some('{') => {
            cursor.expect('{')?;
            cursor.expect('}')?;
            Ok(SkipChild::None)
        }
        Some(_) => {
            let token = cursor.take_until(&[',']);
            Ok(SkipChild::Label(codec::decode_label(token)?))
        }
        None => Err(CodecError::UnexpectedEnd),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::coin::{HashCoin, SeededCoin};
    use crate::skiplist::SkipList;

    fn listing(elems: &[i64], seed: u64) -> SkipList<i64, SeededCoin> {
        SkipList::from_elems(0, 1000, elems.to_vec(), SeededCoin::new(seed)).unwrap()
    }

    #[test]
    fn verify_returns_exactly_the_in_range_elements() {
        for seed in 0..15 {
            let list = listing(&[10, 40, 60, 90, 120, 400, 700], seed);
            let vo = list.range_query(&40, &130).unwrap();
            let got = vo.verify(&40, &130, &list.root_label()).unwrap();
            assert_eq!(got, vec![40, 60, 90, 120], "seed {seed}");
        }
    }

    #[test]
    fn verify_handles_empty_ranges() {
        let list = listing(&[10, 400, 700], 3);
        let vo = list.range_query(&50, &300).unwrap();
        let got = vo.verify(&50, &300, &list.root_label()).unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn verify_rejects_a_wrong_root() {
        let list = listing(&[10, 40, 90], 4);
        let vo = list.range_query(&20, &50).unwrap();
        assert!(matches!(
            vo.verify(&20, &50, &Label::empty()),
            Err(ProofError::RootMismatch)
        ));
    }

    #[test]
    fn verify_rejects_a_range_past_the_sentinels() {
        // no stored element lies strictly outside a range that swallows a
        // sentinel, so the boundary requirement cannot be met
        let list = listing(&[10, 40, 60, 90, 120, 400], 6);
        let vo = list.range_query(&40, &130).unwrap();
        assert!(matches!(
            vo.verify(&-5, &130, &list.root_label()),
            Err(ProofError::BoundaryMissing) | Err(ProofError::SegmentOutOfRange)
        ));
        assert!(matches!(
            vo.verify(&40, &2000, &list.root_label()),
            Err(ProofError::BoundaryMissing) | Err(ProofError::SegmentOutOfRange)
        ));
    }

    #[test]
    fn tampered_segment_is_detected() {
        let list = listing(&[10, 40, 60, 90], 8);
        let vo = list.range_query(&20, &70).unwrap();
        let text = vo.serialize().unwrap();
        let root = list.root_label();

        // drop one in-range element out of a serialized segment
        let tampered = text.replace("~60~", "~");
        if tampered != text {
            let back = SkipProof::<i64>::deserialize(&tampered).unwrap();
            assert!(back.verify(&20, &70, &root).is_err());
        }
    }

    #[test]
    fn serialization_round_trips() {
        for seed in [0u64, 5, 11] {
            let list = listing(&[10, 40, 60, 90, 120, 400, 700], seed);
            let vo = list.range_query(&40, &130).unwrap();
            let text = vo.serialize().unwrap();
            let back = SkipProof::<i64>::deserialize(&text).unwrap();
            assert_eq!(back, vo);
            assert_eq!(back.root_label().unwrap(), list.root_label());
        }
    }

    #[test]
    fn deserialize_rejects_garbage() {
        assert!(SkipProof::<i64>::deserialize("").is_err());
        assert!(SkipProof::<i64>::deserialize("(2,{},{},5)").is_err());
        assert!(SkipProof::<i64>::deserialize("(1,{},{},[1~2~3]) trailing").is_err());
    }

    #[test]
    fn vo_insert_tracks_the_list() {
        // identical hash-derived coin bits on both sides: the mirrored
        // insert must land on the server's post-insert digest
        for elem in [45i64, 75, 110, 55] {
            let mut list: SkipList<i64, HashCoin> =
                SkipList::from_elems(0, 1000, vec![10, 40, 60, 90, 120], HashCoin::new())
                    .unwrap();
            let vo = list.range_query(&40, &130).unwrap();

            let mut mirrored = vo.clone();
            let mut coin = HashCoin::new();
            let predicted = mirrored.insert(elem, &mut coin).unwrap();

            list.insert(elem).unwrap();
            assert_eq!(predicted, list.root_label(), "elem {elem}");
        }
    }

    #[test]
    fn vo_insert_applies_repeatedly() {
        let mut list: SkipList<i64, HashCoin> =
            SkipList::from_elems(0, 1000, vec![10, 40, 90], HashCoin::new()).unwrap();
        let vo = list.range_query(&20, &80).unwrap();
        let mut mirrored = vo.clone();
        let mut coin = HashCoin::new();

        for elem in [50i64, 45, 70] {
            let predicted = mirrored.insert(elem, &mut coin).unwrap();
            list.insert(elem).unwrap();
            assert_eq!(predicted, list.root_label(), "elem {elem}");
        }
    }

    #[test]
    fn vo_insert_refuses_dead_branches() {
        // scripted promotions: only 400 grows a tower, so the proof for
        // [40, 100] collapses everything right of it
        let prefix = [false, false, false, false, true, false, false];
        let list: SkipList<i64, crate::coin::PrefixCoin> = SkipList::from_elems(
            0,
            1000,
            vec![10, 40, 60, 90, 400, 700],
            crate::coin::PrefixCoin::new(prefix),
        )
        .unwrap();
        let vo = list.range_query(&40, &100).unwrap();
        let mut mirrored = vo;
        let mut coin = HashCoin::new();
        // 600 lives in the collapsed branch beyond 400
        assert!(matches!(
            mirrored.insert(600, &mut coin),
            Err(ProofError::DeadBranch)
        ));
    }

    #[test]
    fn vo_insert_rejects_duplicates() {
        let list: SkipList<i64, HashCoin> =
            SkipList::from_elems(0, 1000, vec![10, 40, 90], HashCoin::new()).unwrap();
        let vo = list.range_query(&20, &80).unwrap();
        let mut mirrored = vo;
        let mut coin = HashCoin::new();
        assert!(matches!(
            mirrored.insert(40, &mut coin),
            Err(ProofError::Duplicate { .. })
        ));
    }
}
