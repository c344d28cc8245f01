// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for the host reference kernels.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tensor_core::{fully_connected, quantize, FcDims, FcQuant, QuantParams};

fn bench_quantize(c: &mut Criterion) {
    let n = 8 * 64 * 128;
    let input: Vec<f32> = (0..n).map(|i| (i % 251) as f32 * 0.01 - 1.25).collect();
    let mut output = vec![0i8; n];
    let params = QuantParams::new(0.02, 0);

    c.bench_function("quantize_1x8x64x128", |b| {
        b.iter(|| quantize(black_box(&input), &mut output, params).unwrap())
    });
}

fn bench_fully_connected(c: &mut Criterion) {
    let dims = FcDims {
        batch: 16,
        in_features: 256,
        out_features: 256,
    };
    let input: Vec<i8> = (0..dims.batch * dims.in_features)
        .map(|i| (i % 17) as i8 - 8)
        .collect();
    let weights: Vec<i8> = (0..dims.out_features * dims.in_features)
        .map(|i| (i % 13) as i8 - 6)
        .collect();
    let mut output = vec![0i8; dims.batch * dims.out_features];
    let quant = FcQuant {
        input_zero_point: 0,
        weight_zero_point: 0,
        output_zero_point: 0,
        multiplier: 1.0 / 512.0,
    };

    c.bench_function("fully_connected_16x256x256", |b| {
        b.iter(|| {
            fully_connected(black_box(&input), &weights, None, &mut output, dims, quant).unwrap()
        })
    });
}

criterion_group!(benches, bench_quantize, bench_fully_connected);
criterion_main!(benches);
