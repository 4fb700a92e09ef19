//! 状态机基准测试
//!
//! 测试状态转换和状态聚合的开销

use chrono::Utc;
use criterion::{criterion_group, criterion_main, Criterion};
use health_vitals::health::{aggregate_status, AvailabilityStatus, CheckState, CheckerResult, FailurePolicy};
use std::collections::BTreeMap;
use std::hint::black_box;
use std::time::Duration;
use tokio::time::Instant;

/// 状态转换基准测试
fn transition_benchmark(c: &mut Criterion) {
    let policy = FailurePolicy {
        max_contiguous_fails: 3,
        max_time_in_error: Duration::from_secs(30),
    };

    c.bench_function("transition_success", |b| {
        let state = CheckState::default();
        b.iter(|| black_box(state.transition(Ok(()), &policy, Instant::now(), Utc::now())));
    });

    c.bench_function("transition_failure_streak", |b| {
        b.iter(|| {
            let mut state = CheckState::default();
            for _ in 0..5 {
                state = state.transition(
                    Err("connection refused".to_string()),
                    &policy,
                    Instant::now(),
                    Utc::now(),
                );
            }
            black_box(state)
        });
    });
}

/// 状态聚合基准测试
fn aggregation_benchmark(c: &mut Criterion) {
    let statuses: Vec<AvailabilityStatus> = (0..64)
        .map(|i| match i % 3 {
            0 => AvailabilityStatus::Up,
            1 => AvailabilityStatus::Unknown,
            _ => AvailabilityStatus::Up,
        })
        .collect();

    c.bench_function("aggregate_64_checks", |b| {
        b.iter(|| black_box(aggregate_status(&statuses)));
    });

    let details: BTreeMap<String, CheckState> = (0..64)
        .map(|i| (format!("service-{i}"), CheckState::default()))
        .collect();
    let result = CheckerResult {
        status: AvailabilityStatus::Up,
        details: Some(details),
    };

    c.bench_function("result_serialization", |b| {
        b.iter(|| black_box(result.to_json().unwrap()));
    });
}

criterion_group!(benches, transition_benchmark, aggregation_benchmark);
criterion_main!(benches);
