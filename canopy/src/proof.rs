// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! The failure taxonomy shared by both verification objects.

use thiserror::Error;

/// Why a verification object was rejected.
///
/// Any of these is fatal to the individual verification; the caller decides
/// whether to keep talking to the server that produced it.
#[derive(Debug, Error)]
pub enum ProofError {
    #[error("proof carries fewer than two leaves")]
    TooFewLeaves,
    #[error("left boundary leaf is missing or inside the range")]
    MissingLeftBoundary,
    #[error("right boundary leaf is missing or inside the range")]
    MissingRightBoundary,
    #[error("leaf {elem} lies outside the queried range")]
    LeafOutOfRange {
        /// The offending element.
        elem: String,
    },
    #[error("leaves are out of order")]
    LeavesOutOfOrder,
    #[error("collapsed branch hides a required element")]
    OmittedBranch,
    #[error("recomputed digest disagrees with the expected digest")]
    RootMismatch,
    #[error("proof node carries no structure")]
    EmptyNode,
    #[error("no insertion point for {elem}")]
    NoInsertionPoint {
        /// The element that found no predecessor.
        elem: String,
    },
    #[error("element {elem} is already present")]
    Duplicate {
        /// The element that already exists.
        elem: String,
    },
    #[error("insertion would descend through a collapsed branch")]
    DeadBranch,
    #[error("parent element disagrees with its lower level")]
    ElemMismatch,
    #[error("base segment carries fewer than two elements")]
    SegmentTooShort,
    #[error("base segment is irrelevant to the queried range")]
    SegmentOutOfRange,
    #[error("base segments do not share their tower element")]
    SegmentDiscontinuity,
    #[error("interior node collapsed on both sides")]
    CollapsedInterior,
    #[error("returned elements do not cover the range boundaries")]
    BoundaryMissing,
}
