// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use crate::{Label, NodeId};

/// What points at a skip-list node from the search direction.
///
/// The discriminant is load-bearing: a node whose parent sits above it is a
/// *tower* node (its element continues on the level above); a node whose
/// parent sits to the left is a *plateau* node (it is the top of its tower).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipParent {
    /// The parent is the same element one level up.
    Above(NodeId),
    /// The parent is the left neighbor on the same level.
    Left(NodeId),
}

/// A node of the authenticated skip list.
#[derive(Debug, Clone)]
pub struct SkipNode<E> {
    /// The element; identical all the way down a tower.
    pub elem: E,
    /// The same element one level below; `None` on the bottom level.
    pub down: Option<NodeId>,
    /// The next element on this level; `None` only on right sentinels.
    pub right: Option<NodeId>,
    /// Weak discriminated back-reference; `None` at the root.
    pub parent: Option<SkipParent>,
    /// The authenticating label, maintained bottom-up after every insert.
    pub label: Label,
    /// True iff `parent` is `Above(_)`.
    pub tower: bool,
}

impl<E> SkipNode<E> {
    /// A fresh unlinked node for `elem`.
    pub fn new(elem: E) -> Self {
        SkipNode {
            elem,
            down: None,
            right: None,
            parent: None,
            label: Label::empty(),
            tower: false,
        }
    }

    /// True iff this node is on the bottom level.
    pub const fn is_bottom(&self) -> bool {
        self.down.is_none()
    }

    /// True iff this node is the top of its tower.
    pub const fn is_plateau(&self) -> bool {
        !self.tower
    }
}
