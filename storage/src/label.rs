// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use std::fmt::{self, Debug};

use smallvec::SmallVec;

use crate::SetHash;

/// The label byte string carried by the skip-list authenticator.
///
/// A label is either a full digest or the one-byte ASCII `"0"` assigned to
/// nodes with no right neighbor. The inline capacity covers both, so labels
/// never hit the heap.
#[derive(PartialEq, Eq, Clone, PartialOrd, Ord, Hash)]
pub struct Label(SmallVec<[u8; 32]>);

/// The label of a node with no right neighbor.
const EMPTY_LABEL: &[u8] = b"0";

impl Label {
    /// The `"0"` label assigned to nodes with no right neighbor.
    pub fn empty() -> Self {
        Label(SmallVec::from_slice(EMPTY_LABEL))
    }

    /// A label from raw bytes, as recovered by deserialization.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Label(SmallVec::from_slice(bytes))
    }

    /// The raw label bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// True iff this is the `"0"` empty label.
    pub fn is_empty_label(&self) -> bool {
        self.0.as_slice() == EMPTY_LABEL
    }
}

impl Default for Label {
    fn default() -> Self {
        Label::empty()
    }
}

impl From<SetHash> for Label {
    fn from(hash: SetHash) -> Self {
        Label(SmallVec::from_slice(hash.as_bytes()))
    }
}

impl From<&SetHash> for Label {
    fn from(hash: &SetHash) -> Self {
        Label(SmallVec::from_slice(hash.as_bytes()))
    }
}

impl AsRef<[u8]> for Label {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        if self.is_empty_label() {
            f.write_str("0")
        } else {
            write!(f, "{}", hex::encode(&self.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_label_is_ascii_zero() {
        assert_eq!(Label::empty().as_bytes(), b"0");
        assert!(Label::empty().is_empty_label());
    }

    #[test]
    fn digest_labels_are_not_empty() {
        let label = Label::from(SetHash::from([0u8; 32]));
        assert!(!label.is_empty_label());
        assert_eq!(label.as_bytes().len(), 32);
    }

    #[test]
    fn ordering_is_bytewise() {
        let a = Label::from_bytes(b"abc");
        let b = Label::from_bytes(b"abd");
        assert!(a < b);
    }
}
