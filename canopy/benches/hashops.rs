// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use storage::{chain, commute, hash, merge, Label};

fn bench_hashops(c: &mut Criterion) {
    let left = hash(b"left subtree");
    let right = hash(b"right subtree");

    c.bench_function("hash", |b| {
        b.iter(|| hash(black_box(b"a stored element" as &[u8])))
    });

    c.bench_function("merge", |b| b.iter(|| merge(black_box(&left), black_box(&right))));

    let x = Label::from(&left);
    let y = Label::from(&right);
    c.bench_function("commute", |b| b.iter(|| commute(black_box(&x), black_box(&y))));

    let labels: Vec<Label> = (0..64i64)
        .map(|i| Label::from(hash(i.to_string())))
        .collect();
    c.bench_function("chain64", |b| {
        b.iter(|| chain(black_box(&labels).iter().cloned()))
    });
}

criterion_group!(benches, bench_hashops);
criterion_main!(benches);
