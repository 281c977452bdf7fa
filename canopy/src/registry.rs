// Copyright (C) 2025, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! Canopy layer metric definitions.

/// Number of Merkle-tree inserts.
pub const MHT_INSERT: &str = "canopy.mht.insert";

/// Number of Merkle-tree gestalt batch inserts.
pub const MHT_BATCH: &str = "canopy.mht.batch";

/// Number of Merkle-tree range queries answered.
pub const MHT_RANGE_QUERY: &str = "canopy.mht.range_query";

/// Number of skip-list inserts.
pub const SKIP_INSERT: &str = "canopy.skip.insert";

/// Number of skip-list membership queries answered.
pub const SKIP_QUERY: &str = "canopy.skip.query";

/// Number of skip-list range queries answered.
pub const SKIP_RANGE_QUERY: &str = "canopy.skip.range_query";

/// Number of verification-object verifications, by structure and outcome.
pub const VO_VERIFY: &str = "canopy.vo.verify";

/// Registers all canopy metric descriptions.
pub fn register() {
    use metrics::describe_counter;

    describe_counter!(MHT_INSERT, "Number of Merkle-tree inserts");
    describe_counter!(MHT_BATCH, "Number of Merkle-tree gestalt batch inserts");
    describe_counter!(MHT_RANGE_QUERY, "Number of Merkle-tree range queries");
    describe_counter!(SKIP_INSERT, "Number of skip-list inserts");
    describe_counter!(SKIP_QUERY, "Number of skip-list membership queries");
    describe_counter!(SKIP_RANGE_QUERY, "Number of skip-list range queries");
    describe_counter!(
        VO_VERIFY,
        "Number of verification-object verifications, by structure and outcome"
    );
}
