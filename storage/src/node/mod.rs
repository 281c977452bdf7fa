// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! Node types for the two authenticated structures.

mod mht;
mod skip;

pub use mht::MhtNode;
pub use skip::{SkipNode, SkipParent};
