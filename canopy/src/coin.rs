// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! Sources of skip-list promotion bits.
//!
//! Every insert consults a coin source: while the coin keeps coming up
//! `true` the new element's tower grows one level. The variants here cover
//! the deployment spectrum: fair coins for ordinary servers, recorded and
//! prefix coins for replaying a tower shape across machines, seeded coins
//! for reproducible tests, and the hash-derived coin whose tower heights
//! are a pure function of the element, which is what lets a batch-insert
//! protocol skip shipping coin tapes entirely.

use std::collections::VecDeque;
use std::fmt::Debug;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

/// A source of promotion bits.
///
/// Coins are explicit collaborators wired into each structure rather than
/// process globals; several variants are stateful.
pub trait CoinSource: Debug {
    /// Called once at the start of each insertion with the canonical
    /// encoding of the element being inserted.
    fn start(&mut self, _elem: &[u8]) {}

    /// One promotion bit; `true` keeps the tower growing.
    fn flip(&mut self) -> bool;
}

/// A fair coin backed by an OS-seeded generator.
#[derive(Debug)]
pub struct FairCoin {
    rng: StdRng,
}

impl FairCoin {
    pub fn new() -> Self {
        FairCoin {
            rng: StdRng::from_os_rng(),
        }
    }
}

impl Default for FairCoin {
    fn default() -> Self {
        Self::new()
    }
}

impl CoinSource for FairCoin {
    fn flip(&mut self) -> bool {
        self.rng.random()
    }
}

/// A fair coin that keeps a tape of every bit it produced.
#[derive(Debug)]
pub struct RecordedCoin {
    rng: StdRng,
    tape: Vec<bool>,
}

impl RecordedCoin {
    pub fn new() -> Self {
        RecordedCoin {
            rng: StdRng::from_os_rng(),
            tape: Vec::new(),
        }
    }

    /// Every bit produced so far, oldest first.
    pub fn tape(&self) -> &[bool] {
        &self.tape
    }

    /// Drain the kept tape, e.g. after shipping it to a mirror.
    pub fn take_tape(&mut self) -> Vec<bool> {
        std::mem::take(&mut self.tape)
    }
}

impl Default for RecordedCoin {
    fn default() -> Self {
        Self::new()
    }
}

impl CoinSource for RecordedCoin {
    fn flip(&mut self) -> bool {
        let bit = self.rng.random();
        self.tape.push(bit);
        bit
    }
}

/// A coin that replays a fixed bit prefix, then falls back to a fair coin.
#[derive(Debug)]
pub struct PrefixCoin {
    prefix: VecDeque<bool>,
    rng: StdRng,
}

impl PrefixCoin {
    pub fn new(prefix: impl IntoIterator<Item = bool>) -> Self {
        PrefixCoin {
            prefix: prefix.into_iter().collect(),
            rng: StdRng::from_os_rng(),
        }
    }

    /// Replace the remaining prefix, e.g. on a `REPREFIX` control message.
    pub fn set_prefix(&mut self, prefix: impl IntoIterator<Item = bool>) {
        self.prefix = prefix.into_iter().collect();
    }

    /// Bits of prefix not yet consumed.
    pub fn remaining(&self) -> usize {
        self.prefix.len()
    }
}

impl CoinSource for PrefixCoin {
    fn flip(&mut self) -> bool {
        self.prefix.pop_front().unwrap_or_else(|| self.rng.random())
    }
}

/// A [`PrefixCoin`] that also keeps a tape of every bit it produced.
#[derive(Debug)]
pub struct RecordedPrefixCoin {
    inner: PrefixCoin,
    tape: Vec<bool>,
}

impl RecordedPrefixCoin {
    pub fn new(prefix: impl IntoIterator<Item = bool>) -> Self {
        RecordedPrefixCoin {
            inner: PrefixCoin::new(prefix),
            tape: Vec::new(),
        }
    }

    /// Every bit produced so far, oldest first.
    pub fn tape(&self) -> &[bool] {
        &self.tape
    }

    /// Replace the remaining prefix.
    pub fn set_prefix(&mut self, prefix: impl IntoIterator<Item = bool>) {
        self.inner.set_prefix(prefix);
    }
}

impl CoinSource for RecordedPrefixCoin {
    fn flip(&mut self) -> bool {
        let bit = self.inner.flip();
        self.tape.push(bit);
        bit
    }
}

/// A coin that is deterministic from a 64-bit seed.
///
/// The generator state carries over between flips; callers can re-seed at
/// any point (e.g. on a `RESEED` control message) to restore a known state.
#[derive(Debug)]
pub struct SeededCoin {
    rng: StdRng,
    seed: u64,
}

impl SeededCoin {
    pub fn new(seed: u64) -> Self {
        SeededCoin {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Restore the generator to the start of the stream for `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
        self.seed = seed;
    }

    /// The seed the current stream started from.
    pub const fn seed(&self) -> u64 {
        self.seed
    }
}

impl CoinSource for SeededCoin {
    fn flip(&mut self) -> bool {
        self.rng.random()
    }
}

/// A coin whose bits are derived from the element being promoted.
///
/// Each insertion hashes the element's encoding and then iterates the hash;
/// every flip takes the low bit of the current digest. The same element
/// therefore always gets the same tower height, no matter which replica
/// inserts it.
#[derive(Debug)]
pub struct HashCoin {
    state: [u8; 32],
}

impl HashCoin {
    pub fn new() -> Self {
        HashCoin {
            state: Sha256::digest(b"").into(),
        }
    }
}

impl Default for HashCoin {
    fn default() -> Self {
        Self::new()
    }
}

impl CoinSource for HashCoin {
    fn start(&mut self, elem: &[u8]) {
        self.state = Sha256::digest(elem).into();
    }

    fn flip(&mut self) -> bool {
        let bit = self.state.last().is_some_and(|byte| byte & 1 == 1);
        self.state = Sha256::digest(self.state).into();
        bit
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn seeded_coin_is_reproducible() {
        let mut a = SeededCoin::new(17);
        let mut b = SeededCoin::new(17);
        let bits_a: Vec<bool> = (0..64).map(|_| a.flip()).collect();
        let bits_b: Vec<bool> = (0..64).map(|_| b.flip()).collect();
        assert_eq!(bits_a, bits_b);

        a.reseed(17);
        let replay: Vec<bool> = (0..64).map(|_| a.flip()).collect();
        assert_eq!(bits_a, replay);
    }

    #[test]
    fn prefix_coin_replays_prefix() {
        let mut coin = PrefixCoin::new([true, true, false]);
        assert!(coin.flip());
        assert!(coin.flip());
        assert!(!coin.flip());
        assert_eq!(coin.remaining(), 0);
    }

    #[test]
    fn recorded_coin_keeps_its_tape() {
        let mut coin = RecordedCoin::new();
        let bits: Vec<bool> = (0..16).map(|_| coin.flip()).collect();
        assert_eq!(coin.tape(), bits.as_slice());
        assert_eq!(coin.take_tape(), bits);
        assert!(coin.tape().is_empty());
    }

    #[test]
    fn recorded_prefix_coin_tapes_prefix_bits() {
        let mut coin = RecordedPrefixCoin::new([false, true]);
        assert!(!coin.flip());
        assert!(coin.flip());
        assert_eq!(coin.tape(), &[false, true]);
    }

    #[test]
    fn hash_coin_is_deterministic_per_element() {
        let mut a = HashCoin::new();
        let mut b = HashCoin::new();
        a.start(b"42");
        b.start(b"42");
        let bits_a: Vec<bool> = (0..8).map(|_| a.flip()).collect();
        let bits_b: Vec<bool> = (0..8).map(|_| b.flip()).collect();
        assert_eq!(bits_a, bits_b);

        // restarting resets the stream
        a.start(b"42");
        assert_eq!(a.flip(), bits_a[0]);
    }
}
