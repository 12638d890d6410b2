//! Performance benchmarks for reviewer assignment.
//!
//! Run with: `cargo bench --bench assignment`
//!
//! ## Performance Targets
//!
//! | Operation | Target | Notes |
//! |-----------|--------|-------|
//! | Initial selection | <1µs | Pure, pool already ordered |
//! | Create pull request | <100µs | In-memory store, one transaction |
//! | Reassign reviewer | <100µs | In-memory store, row lock + swap |

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;

use pr_reviewer::{
    select_initial_reviewers, InMemoryReviewStore, RequestContext, ReviewService, TeamId,
    TeamMember, User, UserId,
};
use uuid::Uuid;

fn uid(n: u128) -> String {
    Uuid::from_u128(n).to_string()
}

fn make_pool(size: u128) -> Vec<User> {
    let team = TeamId::new(Uuid::from_u128(0xFFFF));
    (1..=size)
        .map(|n| User::new(UserId::new(Uuid::from_u128(n)), format!("user-{n}"), team, true))
        .collect()
}

fn seeded_service(rt: &Runtime, team_size: u128) -> ReviewService<InMemoryReviewStore> {
    let service = ReviewService::new(InMemoryReviewStore::new());
    let members: Vec<_> = (1..=team_size)
        .map(|n| TeamMember::new(uid(n), format!("user-{n}"), true))
        .collect();
    rt.block_on(service.create_team_with_members(&RequestContext::background(), "bench", &members))
        .expect("seed team");
    service
}

/// Benchmark pure initial selection.
fn bench_select_initial(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_initial");

    for size in [0u128, 2, 16, 256] {
        let pool = make_pool(size);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("pool", size), &pool, |b, pool| {
            b.iter(|| select_initial_reviewers(black_box(pool), 2))
        });
    }

    group.finish();
}

/// Benchmark pull request creation end to end.
fn bench_create_pull_request(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("create_pull_request");

    for team_size in [3u128, 10, 50] {
        let service = seeded_service(&rt, team_size);
        let next = Arc::new(AtomicU64::new(0x10_0000));

        group.throughput(Throughput::Elements(1));
        group.bench_function(BenchmarkId::new("team", team_size), |b| {
            b.to_async(&rt).iter(|| {
                let service = service.clone();
                let pr_id = uid(next.fetch_add(1, Ordering::Relaxed) as u128);
                async move {
                    service
                        .create_pull_request(&RequestContext::background(), &pr_id, "bench", &uid(1))
                        .await
                        .expect("create")
                }
            })
        });
    }

    group.finish();
}

/// Benchmark reassignment, swapping back and forth between two reviewers.
fn bench_reassign(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let service = seeded_service(&rt, 4);
    let ctx = RequestContext::background();
    rt.block_on(service.create_pull_request(&ctx, &uid(0x500), "bench", &uid(1)))
        .expect("create");

    // Reviewers start as [2, 3]; 4 is free. Each swap frees the outgoing one.
    let outgoing = Arc::new(AtomicU64::new(2));

    c.bench_function("reassign_reviewer", |b| {
        b.to_async(&rt).iter(|| {
            let service = service.clone();
            let outgoing = Arc::clone(&outgoing);
            async move {
                let old = outgoing.load(Ordering::Relaxed) as u128;
                let pr = service
                    .reassign_reviewer(&RequestContext::background(), &uid(0x500), &uid(old))
                    .await
                    .expect("reassign");
                let next = pr.replaced_by.expect("replacement").as_uuid().as_u128();
                // Rotate the longest-serving reviewer out.
                let oldest = pr.reviewers[0].as_uuid().as_u128();
                outgoing.store(oldest as u64, Ordering::Relaxed);
                next
            }
        })
    });
}

criterion_group!(
    benches,
    bench_select_initial,
    bench_create_pull_request,
    bench_reassign,
);
criterion_main!(benches);
