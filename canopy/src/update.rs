// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! Client-side replay of a skip-list insert.
//!
//! After `insert_with_diff` the server hands back the elements and path
//! proof of the pre-insert membership query for the new element, plus a
//! short token stream describing where the new tower spliced in. Replaying
//! the stream against the old proof yields a label list whose fold is the
//! *post-insert* root label, so a client can roll its trusted digest
//! forward without ever holding the skip list.

use std::fmt::{self, Display};

use storage::{chain, commute, elem_label, Element, Label};
use thiserror::Error;

/// One token of the proof-diff alphabet.
///
/// The stream grammar is `Meet* (Up (Take(n) | Meet)*)?`: `Meet`s before
/// `Up` skip old-proof entries that sit below the new tower, `Take(n)`
/// absorbs entries into the accumulated left-side label, and `Meet`s after
/// `Up` keep entries for plateau neighbors the new tower passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOp {
    /// Skip one old-proof entry, leaving it in place.
    Meet,
    /// The first promotion: seed the accumulator and splice in the new
    /// tower's bottom label.
    Up,
    /// Absorb the next `n` old-proof entries into the accumulator.
    Take(u32),
}

impl Display for DiffOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffOp::Meet => f.write_str("MEET"),
            DiffOp::Up => f.write_str("UP"),
            DiffOp::Take(n) => write!(f, "{n}"),
        }
    }
}

/// Errors from a malformed proof-diff.
///
/// The emitter only produces well-formed streams; any of these indicates a
/// corrupted or adversarial diff and the client must discard the update.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UpdateError {
    /// The base element list was empty.
    #[error("update requires at least the left neighbor in the base elements")]
    EmptyBase,
    /// A `Take(n)` token appeared before any `Up`.
    #[error("numeric token before UP")]
    TakeBeforeUp,
    /// A second `Up` token appeared.
    #[error("duplicate UP token")]
    DuplicateUp,
    /// A `Take(0)` token appeared; counts are strictly positive.
    #[error("numeric token must be positive")]
    ZeroTake,
    /// A token walked past the end of the old proof.
    #[error("diff walked off the end of the old proof")]
    ProofExhausted,
}

/// Replay `diff` against a pre-insert membership proof for `elem`.
///
/// `base_elems` and `old_proof` are the two halves returned by the
/// pre-insert query: the base-level segment starting at the left neighbor,
/// and the upward path contributions. The returned list folds (with the
/// commutative hash) to the post-insert root label.
pub fn update_query<E: Element>(
    base_elems: &[E],
    old_proof: &[Label],
    diff: &[DiffOp],
    elem: &E,
) -> Result<Vec<Label>, UpdateError> {
    let left_label = elem_label(base_elems.first().ok_or(UpdateError::EmptyBase)?);

    let mut base: Vec<&E> = base_elems.iter().collect();
    base.insert(1, elem);

    let mut proof: Vec<Label> = old_proof.to_vec();
    let mut cursor = 0usize;
    let mut current: Option<Label> = None;

    for op in diff {
        match (op, current.as_mut()) {
            (DiffOp::Meet, _) => {
                // Before UP this skips base-level contributions that will be
                // absorbed at the splice; after UP it keeps the label of a
                // plateau neighbor the new tower passed.
                cursor += 1;
                if cursor > proof.len() {
                    return Err(UpdateError::ProofExhausted);
                }
            }
            (DiffOp::Up, Some(_)) => return Err(UpdateError::DuplicateUp),
            (DiffOp::Up, None) => {
                // Everything consumed so far, seeded with the pairing of the
                // left neighbor and the new element, becomes the label of the
                // chain to the left of the new tower.
                let mut acc = commute(&left_label, &elem_label(elem));
                for label in proof.drain(..cursor) {
                    acc = commute(&acc, &label);
                }
                current = Some(acc);

                // The new tower's bottom label covers the base segment from
                // the new element rightward.
                let tower_bottom = chain(base.iter().skip(1).rev().map(|e| elem_label(*e)));
                proof.insert(0, tower_bottom);
                cursor = 1;
                base.clear();
            }
            (DiffOp::Take(_), None) => return Err(UpdateError::TakeBeforeUp),
            (DiffOp::Take(0), Some(_)) => return Err(UpdateError::ZeroTake),
            (DiffOp::Take(n), Some(acc)) => {
                for _ in 0..*n {
                    if cursor >= proof.len() {
                        return Err(UpdateError::ProofExhausted);
                    }
                    let label = proof.remove(cursor);
                    *acc = commute(acc, &label);
                }
            }
        }
    }

    if let Some(acc) = current {
        proof.insert(cursor, acc);
    }

    let mut updated: Vec<Label> = base.iter().rev().map(|e| elem_label(*e)).collect();
    updated.extend(proof);
    Ok(updated)
}

/// [`update_query`], folded down to the new root label.
pub fn updated_root<E: Element>(
    base_elems: &[E],
    old_proof: &[Label],
    diff: &[DiffOp],
    elem: &E,
) -> Result<Label, UpdateError> {
    Ok(chain(update_query(base_elems, old_proof, diff, elem)?))
}
