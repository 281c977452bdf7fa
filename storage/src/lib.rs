// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

#![warn(missing_debug_implementations, rust_2018_idioms, missing_docs)]
#![deny(unsafe_code)]

//! # canopy-storage holds the base vocabulary of the Canopy structures
//!
//! The Merkle hash tree and the authenticated skip list in the `canopy`
//! crate are built from the pieces here: the [`SetHash`] digest, the
//! skip-list [`Label`], the hash primitives in [`hashops`], the [`Element`]
//! key abstraction, and the two node types addressed through an [`Arena`]
//! of stable [`NodeId`] handles.
//!
//! Nodes never hold owning references to each other. Every tree edge and
//! every parent back-reference is a [`NodeId`], so cycles cost nothing and a
//! discarded subtree is returned to the arena's free list wholesale.

mod arena;
mod element;
pub mod hashops;
mod label;
mod node;
mod set_hash;

pub use arena::{Arena, NodeId};
pub use element::{Element, ElementError, RESERVED};
pub use hashops::{chain, commute, elem_label, hash, hash_elem, merge};
pub use label::Label;
pub use node::{MhtNode, SkipNode, SkipParent};
pub use set_hash::SetHash;
