// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! The two hash primitives shared by both authenticated structures.
//!
//! [`merge`] is the positional combiner used by the Merkle hash tree; the
//! tree shape fixes operand order. [`commute`] is the commutative combiner
//! used by the skip-list labeling, where the verifier recombines sibling
//! labels without positional information.

use sha2::{Digest, Sha256};

use crate::{Element, Label, SetHash};

/// H(x): collision-resistant hash of a byte string.
pub fn hash(data: impl AsRef<[u8]>) -> SetHash {
    Sha256::digest(data.as_ref()).into()
}

/// H(left ‖ right): the non-commutative Merkle combiner.
pub fn merge(left: &SetHash, right: &SetHash) -> SetHash {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    hasher.finalize().into()
}

/// C(x, y) = H(min(x, y) ‖ max(x, y)): the commutative combiner.
///
/// Operands are compared as raw byte strings.
pub fn commute(x: &Label, y: &Label) -> Label {
    let (lo, hi) = if x.as_bytes() <= y.as_bytes() {
        (x, y)
    } else {
        (y, x)
    };
    let mut hasher = Sha256::new();
    hasher.update(lo.as_bytes());
    hasher.update(hi.as_bytes());
    SetHash::from(hasher.finalize()).into()
}

/// H of an element's canonical encoding.
pub fn hash_elem<E: Element>(elem: &E) -> SetHash {
    hash(elem.encode())
}

/// [`hash_elem`], widened to a label.
pub fn elem_label<E: Element>(elem: &E) -> Label {
    hash_elem(elem).into()
}

/// Left fold of [`commute`] over a label sequence: `reduce(C, labels)`.
///
/// A single label folds to itself; the empty sequence folds to the empty
/// label.
pub fn chain(labels: impl IntoIterator<Item = Label>) -> Label {
    labels
        .into_iter()
        .reduce(|acc, label| commute(&acc, &label))
        .unwrap_or_else(Label::empty)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn hash_matches_sha256_vector() {
        // sha256("abc")
        let expected =
            hex!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
        assert_eq!(hash(b"abc"), SetHash::from(expected));
    }

    #[test]
    fn merge_is_positional() {
        let a = hash(b"a");
        let b = hash(b"b");
        assert_ne!(merge(&a, &b), merge(&b, &a));
    }

    #[test]
    fn commute_is_commutative() {
        let x = Label::from(hash(b"x"));
        let y = Label::from(hash(b"y"));
        assert_eq!(commute(&x, &y), commute(&y, &x));
    }

    #[test]
    fn commute_handles_short_labels() {
        let zero = Label::empty();
        let digest = Label::from(hash(b"x"));
        assert_eq!(commute(&zero, &digest), commute(&digest, &zero));
        assert!(!commute(&zero, &digest).is_empty_label());
    }

    #[test]
    fn chain_folds_left() {
        let a = Label::from(hash(b"a"));
        let b = Label::from(hash(b"b"));
        let c = Label::from(hash(b"c"));
        let folded = chain([a.clone(), b.clone(), c.clone()]);
        assert_eq!(folded, commute(&commute(&a, &b), &c));
        assert_eq!(chain([a.clone()]), a);
        assert_eq!(chain([]), Label::empty());
    }
}
