// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

#![warn(missing_debug_implementations, rust_2018_idioms)]
#![deny(unsafe_code)]

//! # canopy: authenticated set structures for outsourced verifiable storage
//!
//! A trusted *owner* publishes a totally-ordered collection and a short
//! digest. An untrusted *server* holds the collection and answers
//! membership, non-membership and range queries; every answer ships with a
//! verification object from which a *client* recomputes the digest, and
//! accepts iff it matches the published one. Inserts produce diffs that
//! let a client roll its digest forward without ever holding the
//! collection.
//!
//! Two engines implement this contract:
//!
//! - [`Mht`]: a Merkle hash tree over a sorted set, with range proofs that
//!   carry the boundary elements just outside the range, single and
//!   gestalt batch inserts, and proof-side insertion
//!   ([`MhtProof::insert`]).
//! - [`SkipList`]: an authenticated skip list over any [`storage::Element`]
//!   key, labeled with a commutative hash, with membership proofs that
//!   fold to the root label, tree-shaped range proofs ([`SkipProof`]), and
//!   [`SkipList::insert_with_diff`] + [`update_query`] for client-side
//!   digest updates.
//!
//! ```
//! // owner builds the tree and publishes its digest
//! let mht = canopy::Mht::new(vec![0i64, 5, 10, 100]).unwrap();
//! let digest = mht.root_hash();
//!
//! // server answers a range query; client verifies against the digest
//! let vo = mht.range_query(&3, &12).unwrap();
//! vo.verify(&3, &12, &digest).unwrap();
//! assert_eq!(vo.leaves(), vec![0, 5, 10, 100]);
//! ```
//!
//! The engines are synchronous, CPU-bound and single-writer; embeddings
//! serialize writers and may share frozen snapshots with readers.

pub mod codec;
pub mod coin;
mod logger;
pub mod mht;
pub mod proof;
pub mod registry;
pub mod skiplist;
pub mod update;

pub use codec::CodecError;
pub use coin::{
    CoinSource, FairCoin, HashCoin, PrefixCoin, RecordedCoin, RecordedPrefixCoin, SeededCoin,
};
pub use mht::proof::{MhtProof, VoNode};
pub use mht::{BatchSplice, Mht, MhtError};
pub use proof::ProofError;
pub use skiplist::proof::SkipProof;
pub use skiplist::{InsertDiff, SkipList, SkipListError};
pub use update::{update_query, updated_root, DiffOp, UpdateError};
