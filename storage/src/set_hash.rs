// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use std::fmt::{self, Debug, Display};

use sha2::digest::Output;
use sha2::Sha256;

/// A hash value committing to an element or a tree node.
/// We use the same type as returned by sha2 here to avoid copies.
#[derive(PartialEq, Eq, Clone, Default, Hash)]
pub struct SetHash(Output<Sha256>);

impl std::ops::Deref for SetHash {
    type Target = Output<Sha256>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for SetHash {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Debug for SetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Display for SetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for SetHash {
    fn from(value: [u8; Self::len()]) -> Self {
        SetHash(value.into())
    }
}

impl From<Output<Sha256>> for SetHash {
    fn from(value: Output<Sha256>) -> Self {
        SetHash(value)
    }
}

impl SetHash {
    /// Return the length of a `SetHash` in bytes.
    pub const fn len() -> usize {
        std::mem::size_of::<SetHash>()
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_is_sha256_width() {
        assert_eq!(SetHash::len(), 32);
        assert_eq!(SetHash::default().as_bytes().len(), 32);
    }

    #[test]
    fn debug_is_hex() {
        let hash = SetHash::from([0xab; 32]);
        assert_eq!(format!("{hash:?}"), "ab".repeat(32));
    }
}
