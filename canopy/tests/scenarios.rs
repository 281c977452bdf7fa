// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! End-to-end owner/server/client scenarios over both engines.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use canopy::{
    updated_root, HashCoin, Mht, MhtProof, ProofError, SeededCoin, SkipList, SkipProof, VoNode,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use storage::{chain, hash_elem, merge, SetHash};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn fold_audit_path(elem: i64, path: &[(bool, SetHash)]) -> SetHash {
    let mut acc = hash_elem(&elem);
    for (is_left, sibling) in path {
        acc = if *is_left {
            merge(&acc, sibling)
        } else {
            merge(sibling, &acc)
        };
    }
    acc
}

/// Distinct random elements strictly inside `(1, 999)`, sorted.
fn random_elems(rng: &mut StdRng, count: usize) -> Vec<i64> {
    let mut elems = std::collections::BTreeSet::new();
    while elems.len() < count {
        elems.insert(rng.random_range(2..998i64));
    }
    elems.into_iter().collect()
}

#[test]
fn s1_mht_build_and_audit_path() {
    let mht = Mht::new(vec![0i64, 1, 42, 43, 100]).unwrap();
    let h = |v: i64| hash_elem(&v);

    let expected = merge(
        &merge(&merge(&h(0), &h(1)), &merge(&h(42), &h(43))),
        &h(100),
    );
    assert_eq!(mht.root_hash(), expected);

    let path = mht.contains(&42).unwrap();
    // first step pairs 42 with its sibling 43, known node on the left
    assert_eq!(path[0], (true, h(43)));
    assert_eq!(fold_audit_path(42, &path), mht.root_hash());
}

#[test]
fn s2_mht_range_query_carries_boundaries() {
    let mht = Mht::new(vec![0i64, 1, 42, 43, 100]).unwrap();
    let vo = mht.range_query(&2, &50).unwrap();
    assert_eq!(vo.leaves(), vec![1, 42, 43, 100]);
    vo.verify(&2, &50, &mht.root_hash()).unwrap();
}

#[test]
fn s3_mht_insert_proof_bridges_old_and_new_roots() {
    let mut mht = Mht::new(vec![0i64, 5, 10, 100]).unwrap();
    let old_root = mht.root_hash();

    let mut vo = mht.insert(7).unwrap();
    let new_root = mht.root_hash();
    assert_ne!(old_root, new_root);

    // the emptiness proof speaks about the old tree
    vo.verify(&7, &7, &old_root).unwrap();
    assert_eq!(vo.leaves(), vec![5, 10]);
    // inserting into the proof lands on the new digest
    assert_eq!(vo.insert(7).unwrap(), new_root);

    let path = mht.contains(&7).unwrap();
    assert_eq!(fold_audit_path(7, &path), new_root);
}

#[test]
fn s4_hash_coin_towers_are_deterministic() {
    let elems = vec![10i64, 40, 60, 90, 250, 610];
    let a: SkipList<i64, HashCoin> =
        SkipList::from_elems(0, 1000, elems.clone(), HashCoin::new()).unwrap();
    let b: SkipList<i64, HashCoin> =
        SkipList::from_elems(0, 1000, elems, HashCoin::new()).unwrap();
    assert_eq!(a.root_label(), b.root_label());
}

#[test]
fn s5_proof_diff_replay_reaches_the_new_root() {
    let mut list: SkipList<i64, SeededCoin> =
        SkipList::from_elems(0, 100, vec![10, 40, 60, 90], SeededCoin::new(99)).unwrap();

    let diff = list.insert_with_diff(50).unwrap();
    assert_eq!(diff.base_elems.first(), Some(&40));

    let replayed = updated_root(&diff.base_elems, &diff.proof, &diff.diff, &50).unwrap();
    assert_eq!(replayed, list.root_label());
}

#[test]
fn s6_hand_built_vo_with_an_omitted_leaf_is_rejected() {
    let mht = Mht::new(vec![0i64, 1, 42, 43, 100]).unwrap();
    let h = |v: i64| hash_elem(&v);

    // the shape of the real tree for [2, 50], except the subtree holding
    // 42 and 43 is collapsed to its perfectly valid hash
    let tampered = MhtProof::new(
        1i64,
        100,
        VoNode::Inner {
            hash: mht.root_hash(),
            left: Box::new(VoNode::Inner {
                hash: merge(&merge(&h(0), &h(1)), &merge(&h(42), &h(43))),
                left: Box::new(VoNode::Inner {
                    hash: merge(&h(0), &h(1)),
                    left: Box::new(VoNode::Collapsed { hash: h(0) }),
                    right: Box::new(VoNode::Leaf {
                        elem: 1,
                        hash: h(1),
                    }),
                }),
                right: Box::new(VoNode::Collapsed {
                    hash: merge(&h(42), &h(43)),
                }),
            }),
            right: Box::new(VoNode::Leaf {
                elem: 100,
                hash: h(100),
            }),
        },
    );

    assert!(matches!(
        tampered.verify(&2, &50, &mht.root_hash()),
        Err(ProofError::OmittedBranch)
    ));
}

#[test]
fn randomized_mht_invariants() {
    init_logging();
    for seed in 0..8u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut elems = vec![0i64];
        elems.extend(random_elems(&mut rng, 24));
        elems.push(1000);

        let mut mht = Mht::new(elems.clone()).unwrap();
        mht.valid().unwrap();

        // membership proofs for every stored element
        for &elem in &elems {
            let path = mht.contains(&elem).unwrap();
            assert_eq!(fold_audit_path(elem, &path), mht.root_hash());
        }

        // non-members are bracketed by verifiable range proofs
        for _ in 0..8 {
            let probe = rng.random_range(2..998i64);
            if elems.contains(&probe) {
                continue;
            }
            let vo = mht.range_query(&probe, &probe).unwrap();
            vo.verify(&probe, &probe, &mht.root_hash()).unwrap();
            assert!(!vo.leaves().contains(&probe));
        }

        // inserts keep the structure valid and the proofs chained
        for _ in 0..4 {
            let extra = rng.random_range(2..998i64);
            if elems.contains(&extra) {
                continue;
            }
            let old_root = mht.root_hash();
            let mut vo = mht.insert(extra).unwrap();
            elems.push(extra);
            elems.sort_unstable();
            mht.valid().unwrap();
            vo.verify(&extra, &extra, &old_root).unwrap();
            assert_eq!(vo.insert(extra).unwrap(), mht.root_hash());
        }

        assert!(mht.elements().copied().eq(elems.iter().copied()));
    }
}

#[test]
fn randomized_gestalt_batch_agrees_with_sequential() {
    for seed in 20..26u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut base = vec![0i64];
        base.extend(random_elems(&mut rng, 12));
        base.push(1000);

        let batch: Vec<i64> = random_elems(&mut rng, 10)
            .into_iter()
            .filter(|e| !base.contains(e))
            .collect();
        if batch.is_empty() {
            continue;
        }

        let mut gestalt = Mht::new(base.clone()).unwrap();
        let mut sequential = Mht::new(base).unwrap();
        gestalt.gestalt_batch_insert(batch.clone()).unwrap();
        sequential.batch_insert(batch).unwrap();

        gestalt.valid().unwrap();
        assert!(gestalt.elements().eq(sequential.elements()));

        // the rebuilt region still answers verifiable queries
        let vo = gestalt.range_query(&100, &900).unwrap();
        vo.verify(&100, &900, &gestalt.root_hash()).unwrap();
    }
}

#[test]
fn randomized_skip_list_invariants() {
    init_logging();
    for seed in 0..8u64 {
        let mut rng = StdRng::seed_from_u64(seed ^ 0xc0ffee);
        let elems = random_elems(&mut rng, 20);
        let list: SkipList<i64, SeededCoin> =
            SkipList::from_elems(0, 1000, elems.clone(), SeededCoin::new(seed)).unwrap();
        list.valid().unwrap();

        for &elem in &elems {
            let (found, proof) = list.contains(&elem);
            assert!(found);
            assert_eq!(chain(proof), list.root_label());
        }
        for _ in 0..8 {
            let probe = rng.random_range(2..998i64);
            if elems.contains(&probe) {
                continue;
            }
            let (found, proof) = list.contains(&probe);
            assert!(!found);
            assert_eq!(chain(proof), list.root_label());
        }

        // range proofs return exactly the in-range elements
        let lo = rng.random_range(2..500i64);
        let hi = rng.random_range(lo..999i64);
        let vo = list.range_query(&lo, &hi).unwrap();
        let got = vo.verify(&lo, &hi, &list.root_label()).unwrap();
        let expected: Vec<i64> = elems.iter().copied().filter(|e| *e >= lo && *e <= hi).collect();
        assert_eq!(got, expected, "seed {seed} range [{lo}, {hi}]");
    }
}

#[test]
fn randomized_diff_replay() {
    for seed in 0..10u64 {
        let mut rng = StdRng::seed_from_u64(seed ^ 0xd1ff);
        let elems = random_elems(&mut rng, 16);
        let mut list: SkipList<i64, SeededCoin> =
            SkipList::from_elems(0, 1000, elems.clone(), SeededCoin::new(seed)).unwrap();

        for _ in 0..6 {
            let elem = rng.random_range(2..998i64);
            if list.elements().any(|e| *e == elem) {
                continue;
            }
            let old_root = list.root_label();
            let diff = list.insert_with_diff(elem).unwrap();

            // the captured pieces verify against the digest the client
            // already holds
            let mut pre: Vec<storage::Label> =
                diff.base_elems.iter().rev().map(storage::elem_label).collect();
            pre.extend(diff.proof.iter().cloned());
            assert_eq!(chain(pre), old_root);

            let replayed = updated_root(&diff.base_elems, &diff.proof, &diff.diff, &elem).unwrap();
            assert_eq!(replayed, list.root_label(), "seed {seed} elem {elem}");
        }
    }
}

#[test]
fn vo_round_trips_for_both_engines() {
    let mht = Mht::new(vec![0i64, 3, 9, 27, 81, 243, 729, 1000]).unwrap();
    let vo = mht.range_query(&5, &300).unwrap();
    let text = vo.serialize().unwrap();
    assert_eq!(MhtProof::<i64>::deserialize(&text).unwrap(), vo);

    let list: SkipList<i64, SeededCoin> =
        SkipList::from_elems(0, 1000, vec![3, 9, 27, 81, 243, 729], SeededCoin::new(5)).unwrap();
    let vo = list.range_query(&5, &300).unwrap();
    let text = vo.serialize().unwrap();
    assert_eq!(SkipProof::<i64>::deserialize(&text).unwrap(), vo);
}

#[test]
fn string_elements_flow_through_both_engines() {
    let words = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };

    let mht = Mht::new(words(&["a", "cedar", "fir", "oak", "zz"])).unwrap();
    let vo = mht
        .range_query(&"b".to_string(), &"p".to_string())
        .unwrap();
    vo.verify(&"b".to_string(), &"p".to_string(), &mht.root_hash())
        .unwrap();
    assert_eq!(vo.leaves(), words(&["a", "cedar", "fir", "oak", "zz"]));

    let mut list: SkipList<String, SeededCoin> = SkipList::from_elems(
        "a".to_string(),
        "zz".to_string(),
        words(&["cedar", "fir", "oak"]),
        SeededCoin::new(11),
    )
    .unwrap();
    let (found, proof) = list.contains(&"fir".to_string());
    assert!(found);
    assert_eq!(chain(proof), list.root_label());

    let diff = list.insert_with_diff("maple".to_string()).unwrap();
    let replayed =
        updated_root(&diff.base_elems, &diff.proof, &diff.diff, &"maple".to_string()).unwrap();
    assert_eq!(replayed, list.root_label());
}
