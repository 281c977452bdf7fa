// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use std::fmt::Debug;

/// Characters reserved by the verification-object text grammar.
///
/// Element encodings must not contain any of these; the integer kind never
/// does, and string elements are checked when decoded.
pub const RESERVED: &[char] = &[',', '(', ')', '~', '<', '>', '{', '}'];

/// Errors from element decoding.
#[derive(Debug, thiserror::Error)]
pub enum ElementError {
    /// The bytes did not parse as a decimal integer.
    #[error("invalid integer encoding")]
    Int(#[from] std::num::ParseIntError),
    /// The bytes were not valid UTF-8.
    #[error("invalid utf-8 in element encoding")]
    Utf8(#[from] std::str::Utf8Error),
    /// The encoding contains a character the wire grammar reserves.
    #[error("reserved character {ch:?} in element encoding")]
    ReservedCharacter {
        /// The offending character.
        ch: char,
    },
}

/// A totally-ordered, byte-serializable key.
///
/// Both authenticated structures treat elements opaquely except for
/// comparison and the canonical encoding, which must be the exact inverse
/// of [`Element::decode`].
pub trait Element: Clone + Ord + Debug {
    /// The canonical byte encoding of this element.
    fn encode(&self) -> Vec<u8>;

    /// Parse an element back from its canonical encoding.
    fn decode(bytes: &[u8]) -> Result<Self, ElementError>
    where
        Self: Sized;
}

impl Element for i64 {
    fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    fn decode(bytes: &[u8]) -> Result<Self, ElementError> {
        Ok(std::str::from_utf8(bytes)?.parse()?)
    }
}

impl Element for String {
    fn encode(&self) -> Vec<u8> {
        self.clone().into_bytes()
    }

    fn decode(bytes: &[u8]) -> Result<Self, ElementError> {
        let s = std::str::from_utf8(bytes)?;
        if let Some(ch) = s.chars().find(|ch| RESERVED.contains(ch)) {
            return Err(ElementError::ReservedCharacter { ch });
        }
        Ok(s.to_owned())
    }
}
