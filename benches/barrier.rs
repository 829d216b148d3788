//! Cost of one rendezvous round, against `std::sync::Barrier`.
//!
//! Helper threads loop on the barrier for the exact number of rounds the
//! measuring thread runs, so every round has a full set of participants.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

trait Rendezvous: Send + Sync + 'static {
    fn wait(&self);
}

impl Rendezvous for pingpong_bench::Barrier {
    fn wait(&self) {
        self.arrive_and_wait();
    }
}

impl Rendezvous for std::sync::Barrier {
    fn wait(&self) {
        std::sync::Barrier::wait(self);
    }
}

fn time_rounds<B: Rendezvous>(barrier: Arc<B>, participants: usize, rounds: u64) -> Duration {
    let helpers: Vec<_> = (1..participants)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                for _ in 0..rounds {
                    barrier.wait();
                }
            })
        })
        .collect();

    let start = Instant::now();
    for _ in 0..rounds {
        barrier.wait();
    }
    let elapsed = start.elapsed();

    for helper in helpers {
        helper.join().expect("helper panicked");
    }
    elapsed
}

fn bench_barrier(c: &mut Criterion) {
    let mut group = c.benchmark_group("barrier");

    for participants in [1usize, 2, 3] {
        group.bench_with_input(
            BenchmarkId::new("rendezvous", participants),
            &participants,
            |b, &n| {
                b.iter_custom(|rounds| {
                    let barrier = Arc::new(pingpong_bench::Barrier::new(n).expect("capacity"));
                    time_rounds(barrier, n, rounds)
                })
            },
        );
        group.bench_with_input(
            BenchmarkId::new("std", participants),
            &participants,
            |b, &n| b.iter_custom(|rounds| time_rounds(Arc::new(std::sync::Barrier::new(n)), n, rounds)),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_barrier);
criterion_main!(benches);
