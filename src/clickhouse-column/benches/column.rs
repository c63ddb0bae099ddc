// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use mz_clickhouse_column::{Column, ColumnAppend, ColumnExt, ColumnRead, FixedColumn, StringColumn};

const ROWS: usize = 65_536;

fn encoded(col: &dyn Column) -> Vec<u8> {
    let mut wire = Vec::new();
    col.write_to(&mut wire).expect("write to vec");
    wire
}

fn bench_fixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("FixedColumn<i64>");
    group.throughput(Throughput::Elements(u64::try_from(ROWS).expect("fits")));

    let mut col = FixedColumn::<i64>::new();
    col.append_multi((0..ROWS).map(|i| i64::try_from(i).expect("fits")));
    let wire = encoded(&col);

    group.bench_function("read_raw", |b| {
        let mut decoded = FixedColumn::<i64>::new();
        b.iter(|| {
            decoded.read_raw(ROWS, &mut &wire[..]).expect("valid block");
            black_box(decoded.num_rows());
        })
    });
    group.bench_function("row", |b| {
        b.iter(|| {
            let sum = col.rows().fold(0i64, |acc, v| acc.wrapping_add(v));
            black_box(sum);
        })
    });
    group.bench_function("fill", |b| {
        let mut dst = vec![0; ROWS];
        b.iter(|| {
            col.fill(&mut dst);
            black_box(&dst);
        })
    });
    group.bench_function("fill_bulk", |b| {
        let mut dst = vec![0; ROWS];
        b.iter(|| {
            col.fill_bulk(&mut dst);
            black_box(&dst);
        })
    });

    group.finish();
}

fn bench_string(c: &mut Criterion) {
    let values: Vec<String> = (0..ROWS).map(|i| format!("value-{}", i % 1000)).collect();

    let mut group = c.benchmark_group("String");
    group.throughput(Throughput::Elements(u64::try_from(ROWS).expect("fits")));

    group.bench_function("append", |b| {
        b.iter_with_setup(StringColumn::new, |mut col| {
            col.append_multi(values.iter().map(|v| v.as_bytes()));
            black_box(col.num_rows());
        })
    });
    group.bench_function("append_low_cardinality", |b| {
        b.iter_with_setup(
            || StringColumn::new().low_cardinality(),
            |mut col| {
                col.append_multi(values.iter().map(|v| v.as_bytes()));
                black_box(col.num_rows());
            },
        )
    });

    let mut plain = StringColumn::new();
    plain.append_multi(values.iter().map(|v| v.as_bytes()));
    let plain = encoded(&plain);
    group.bench_function("read_raw", |b| {
        let mut decoded = StringColumn::new();
        b.iter(|| {
            decoded.read_raw(ROWS, &mut &plain[..]).expect("valid block");
            black_box(decoded.num_rows());
        })
    });

    let mut lc = StringColumn::new().low_cardinality();
    lc.append_multi(values.iter().map(|v| v.as_bytes()));
    let lc = encoded(&lc);
    group.bench_function("read_raw_low_cardinality", |b| {
        let mut decoded = StringColumn::new().low_cardinality();
        b.iter(|| {
            decoded.read_raw(ROWS, &mut &lc[..]).expect("valid block");
            black_box(decoded.num_rows());
        })
    });

    group.finish();
}

criterion_group!(benches, bench_fixed, bench_string);
criterion_main!(benches);
