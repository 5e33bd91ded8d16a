use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use reservation_engine::config::PolicySettings;
use reservation_engine::models::{
    CancellationPolicy, LifecycleEvent, ReservationStateMachine, ReservationStatus,
};
use reservation_engine::services::{
    intervals_overlap, CancellationEngine, FraudScorer, FraudSignals,
};

fn benchmark_overlap_predicate(c: &mut Criterion) {
    let base = Utc.with_ymd_and_hms(2024, 1, 10, 14, 0, 0).unwrap();
    let stays: Vec<_> = (0..1000)
        .map(|i| {
            let start = base + Duration::days(i % 90);
            (start, start + Duration::days(2))
        })
        .collect();

    c.bench_function("overlap_scan_1000", |b| {
        let probe_start = base + Duration::days(30);
        let probe_end = probe_start + Duration::days(3);
        b.iter(|| {
            let mut conflicts = 0usize;
            for (start, end) in &stays {
                if intervals_overlap(*start, *end, black_box(probe_start), black_box(probe_end)) {
                    conflicts += 1;
                }
            }
            black_box(conflicts)
        });
    });
}

fn benchmark_cancellation_quote(c: &mut Criterion) {
    let engine = CancellationEngine::new(PolicySettings::default());
    let mut group = c.benchmark_group("cancellation_quote");

    for policy in [
        CancellationPolicy::Flexible,
        CancellationPolicy::Moderate,
        CancellationPolicy::Strict,
        CancellationPolicy::NonRefundable,
    ] {
        group.bench_with_input(
            BenchmarkId::new("quote", format!("{:?}", policy)),
            &policy,
            |b, &policy| {
                b.iter(|| {
                    let quote = engine.quote(
                        black_box(policy),
                        black_box(30),
                        black_box(Decimal::from(1000u32)),
                    );
                    black_box(quote)
                });
            },
        );
    }

    group.finish();
}

fn benchmark_fraud_scoring(c: &mut Criterion) {
    let signals = FraudSignals {
        total_reservations: 12,
        cancelled_reservations: 4,
        no_shows: 2,
        denied_payments: 1,
        account_age_days: 3,
        booking_amount: Decimal::from(6000u32),
        hours_until_check_in: 12,
    };

    c.bench_function("fraud_assess", |b| {
        b.iter(|| {
            let assessment =
                FraudScorer::assess(black_box(Uuid::new_v4()), black_box(Uuid::new_v4()), &signals);
            black_box(assessment)
        });
    });
}

fn benchmark_state_machine(c: &mut Criterion) {
    c.bench_function("state_machine_fire", |b| {
        b.iter(|| {
            for (from, event) in [
                (ReservationStatus::Pending, LifecycleEvent::Confirm),
                (ReservationStatus::Confirmed, LifecycleEvent::CheckIn),
                (ReservationStatus::CheckedIn, LifecycleEvent::CheckOut),
                (ReservationStatus::Confirmed, LifecycleEvent::Cancel),
            ] {
                black_box(ReservationStateMachine::target(
                    black_box(from),
                    black_box(event),
                ));
            }
        });
    });
}

criterion_group!(
    benches,
    benchmark_overlap_predicate,
    benchmark_cancellation_quote,
    benchmark_fraud_scoring,
    benchmark_state_machine
);
criterion_main!(benches);
