// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! Helpers for the verification-object text grammars.
//!
//! Both proof serializations are line-safe text: raw hashes and labels are
//! base-64 literals, elements appear as their canonical encodings, and
//! structure comes either from depth-tagged separators (Merkle tree) or
//! parenthesized tuples (skip list).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use storage::{Element, ElementError, Label, SetHash};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unexpected token {token:?}")]
    UnexpectedToken { token: String },
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("bad base-64 literal")]
    Base64(#[from] base64::DecodeError),
    #[error("hash literal has wrong length")]
    BadHashLength,
    #[error("element encoding is not valid text")]
    NonTextEncoding,
    #[error("{0}")]
    Element(#[from] ElementError),
}

/// Encode raw bytes as a base-64 literal.
pub fn encode_bytes(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode a base-64 literal.
pub fn decode_bytes(token: &str) -> Result<Vec<u8>, CodecError> {
    Ok(BASE64.decode(token)?)
}

/// Encode a hash as a base-64 literal.
pub fn encode_hash(hash: &SetHash) -> String {
    encode_bytes(hash.as_bytes())
}

/// Decode a base-64 hash literal, enforcing the digest width.
pub fn decode_hash(token: &str) -> Result<SetHash, CodecError> {
    let bytes = decode_bytes(token)?;
    let bytes: [u8; 32] = bytes.try_into().map_err(|_| CodecError::BadHashLength)?;
    Ok(bytes.into())
}

/// Encode a skip-list label as a base-64 literal.
pub fn encode_label(label: &Label) -> String {
    encode_bytes(label.as_bytes())
}

/// Decode a base-64 label literal. Labels are either digest-width or the
/// one-byte empty label, but adversarial input is handed to verification
/// as-is rather than rejected here.
pub fn decode_label(token: &str) -> Result<Label, CodecError> {
    Ok(Label::from_bytes(&decode_bytes(token)?))
}

/// An element's canonical encoding as text.
pub fn elem_text<E: Element>(elem: &E) -> Result<String, CodecError> {
    String::from_utf8(elem.encode()).map_err(|_| CodecError::NonTextEncoding)
}

/// The field separator for a node at nesting depth `depth`.
///
/// Tagging the separator with the depth disambiguates nesting without a
/// grammar lookahead: a node's own fields are joined by `",d,"` while any
/// embedded child uses `",d+1,"`, so splitting on the exact separator never
/// cuts inside a subtree.
pub fn depth_separator(depth: usize) -> String {
    format!(",{depth},")
}

/// A character cursor over a serialized proof.
#[derive(Debug)]
pub struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub const fn new(input: &'a str) -> Self {
        Cursor { input, pos: 0 }
    }

    /// The next character, without consuming it.
    pub fn peek(&self) -> Option<char> {
        self.input.get(self.pos..)?.chars().next()
    }

    /// True iff the whole input has been consumed.
    pub fn is_done(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Consume `expected` or fail.
    pub fn expect(&mut self, expected: char) -> Result<(), CodecError> {
        match self.peek() {
            Some(ch) if ch == expected => {
                self.pos += ch.len_utf8();
                Ok(())
            }
            Some(ch) => Err(CodecError::UnexpectedToken {
                token: ch.to_string(),
            }),
            None => Err(CodecError::UnexpectedEnd),
        }
    }

    /// Consume and return everything up to (not including) the first
    /// occurrence of any of `stops`, or the rest of the input.
    pub fn take_until(&mut self, stops: &[char]) -> &'a str {
        let rest = self.input.get(self.pos..).unwrap_or_default();
        let end = rest.find(stops).unwrap_or(rest.len());
        self.pos += end;
        rest.get(..end).unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use hex_literal::hex;
    use storage::hash;

    use super::*;

    #[test]
    fn hash_literal_round_trip() {
        let h = hash(b"element");
        assert_eq!(decode_hash(&encode_hash(&h)).unwrap(), h);
    }

    #[test]
    fn hash_literal_is_standard_base64() {
        let hash = SetHash::from(hex!(
            "abababababababababababababababababababababababababababababababab"
        ));
        let literal = "q6urq6urq6urq6urq6urq6urq6urq6urq6urq6urq6s=";
        assert_eq!(encode_hash(&hash), literal);
        assert_eq!(decode_hash(literal).unwrap(), hash);
    }

    #[test]
    fn hash_literal_rejects_wrong_width() {
        assert!(matches!(
            decode_hash(&encode_bytes(b"short")),
            Err(CodecError::BadHashLength)
        ));
    }

    #[test]
    fn label_literal_round_trip() {
        let empty = Label::empty();
        assert_eq!(decode_label(&encode_label(&empty)).unwrap(), empty);
    }

    #[test]
    fn cursor_walks_tuples() {
        let mut cursor = Cursor::new("(1,abc,def)");
        cursor.expect('(').unwrap();
        assert_eq!(cursor.take_until(&[',']), "1");
        cursor.expect(',').unwrap();
        assert_eq!(cursor.take_until(&[',']), "abc");
        cursor.expect(',').unwrap();
        assert_eq!(cursor.take_until(&[')']), "def");
        cursor.expect(')').unwrap();
        assert!(cursor.is_done());
    }
}
