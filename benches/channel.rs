//! Channel benchmarks: creation cost, buffered throughput, rendezvous
//! handoff latency, backpressure, and select overhead.
//!
//! Run with: cargo bench --bench channel

use std::cell::Cell;

use criterion::{Criterion, criterion_group, criterion_main};
use tokio::runtime::Runtime;

use rendezvous::{Select, channel};

const BUFFER_SIZE: usize = 1024;
const TOTAL_MESSAGES: usize = 10_000;

fn bench_create(c: &mut Criterion) {
    c.bench_function("create_buffered", |b| {
        b.iter(|| channel::<i32>(BUFFER_SIZE));
    });
}

fn bench_rendezvous_oneshot(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    c.bench_function("rendezvous_oneshot", |b| {
        b.to_async(&rt).iter(|| async {
            let (tx, rx) = channel::<i32>(0);
            let (sent, received) = tokio::join!(tx.send(1), rx.recv());
            sent.unwrap();
            received.unwrap();
        });
    });
}

fn bench_buffered_throughput(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    c.bench_function("buffered_throughput", |b| {
        b.to_async(&rt).iter(|| async {
            let (tx, rx) = channel::<i32>(BUFFER_SIZE);
            let producer = tokio::spawn(async move {
                for i in 0..TOTAL_MESSAGES {
                    tx.send(i as i32).await.unwrap();
                }
            });
            for _ in 0..TOTAL_MESSAGES {
                rx.recv().await.unwrap();
            }
            producer.await.unwrap();
        });
    });
}

/// Producer outruns a small buffer, forcing repeated park/unpark cycles.
fn bench_backpressure(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    c.bench_function("backpressure_small_buffer", |b| {
        b.to_async(&rt).iter(|| async {
            let (tx, rx) = channel::<i32>(4);
            let producer = tokio::spawn(async move {
                for i in 0..1_000 {
                    tx.send(i).await.unwrap();
                }
            });
            for _ in 0..1_000 {
                rx.recv().await.unwrap();
            }
            producer.await.unwrap();
        });
    });
}

fn bench_select_two_ready(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    c.bench_function("select_first_clause_ready", |b| {
        b.to_async(&rt).iter(|| async {
            let (tx1, rx1) = channel::<i32>(1);
            let (_tx2, rx2) = channel::<i32>(1);
            tx1.try_send(1).unwrap();

            let out1 = Cell::new(None);
            let out2 = Cell::new(None);
            Select::new()
                .recv(&rx1, &out1)
                .recv(&rx2, &out2)
                .choose()
                .await
                .unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_create,
    bench_rendezvous_oneshot,
    bench_buffered_throughput,
    bench_backpressure,
    bench_select_two_ready,
);
criterion_main!(benches);
