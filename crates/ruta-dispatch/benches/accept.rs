//! Dispatch hot-path benchmarks
//!
//! - Single uncontended accept (guard + assignment + fee debit)
//! - Contended accept, N workers racing for one trip
//! - Open-trip listing

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use futures::future::join_all;
use rust_decimal_macros::dec;
use tokio::runtime::Runtime;

use ruta_common::{Location, RequesterId, Route, TripId, TripKind, WorkerId};
use ruta_dispatch::{DispatchConfig, Dispatcher, InMemoryKycRegistry, NewTrip};

fn setup() -> (Dispatcher, Arc<InMemoryKycRegistry>) {
    let kyc = Arc::new(InMemoryKycRegistry::new());
    let dispatcher = Dispatcher::in_memory(kyc.clone(), DispatchConfig::default())
        .expect("dispatcher");
    (dispatcher, kyc)
}

async fn funded_worker(dispatcher: &Dispatcher, kyc: &InMemoryKycRegistry) -> WorkerId {
    let worker = WorkerId::new();
    kyc.approve_all(worker, dispatcher.config().kyc.required_for(TripKind::Ride));
    dispatcher
        .ledger()
        .load(worker, dec!(1000000), "bench")
        .await
        .expect("load");
    worker
}

async fn open_trip(dispatcher: &Dispatcher) -> TripId {
    dispatcher
        .create_trip(NewTrip {
            requester_id: RequesterId::new(),
            kind: TripKind::Ride,
            route: Route::new(Location::new(14.6, 121.0), Location::new(14.5, 121.1)),
            base_fare: dec!(120),
            parcel: None,
        })
        .await
        .expect("trip")
        .id
}

fn bench_accept(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("accept");
    group.measurement_time(Duration::from_secs(5));

    let (dispatcher, kyc) = setup();
    let worker = rt.block_on(funded_worker(&dispatcher, &kyc));

    group.bench_function("uncontended", |b| {
        b.to_async(&rt).iter(|| async {
            let trip = open_trip(&dispatcher).await;
            black_box(dispatcher.accept(trip, worker).await.expect("accept"))
        });
    });

    for racers in [2usize, 8, 32] {
        let workers: Vec<_> = rt.block_on(async {
            let mut workers = Vec::with_capacity(racers);
            for _ in 0..racers {
                workers.push(funded_worker(&dispatcher, &kyc).await);
            }
            workers
        });

        group.bench_with_input(BenchmarkId::new("contended", racers), &workers, |b, workers| {
            b.to_async(&rt).iter(|| async {
                let trip = open_trip(&dispatcher).await;
                let attempts = workers.iter().map(|worker| {
                    let dispatcher = dispatcher.clone();
                    let worker = *worker;
                    tokio::spawn(async move { dispatcher.accept(trip, worker).await })
                });
                black_box(join_all(attempts).await)
            });
        });
    }

    group.finish();
}

fn bench_list_available(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("list_available");

    for open in [10usize, 100, 1000] {
        let (dispatcher, kyc) = setup();
        let worker = rt.block_on(async {
            for _ in 0..open {
                open_trip(&dispatcher).await;
            }
            funded_worker(&dispatcher, &kyc).await
        });

        group.bench_with_input(BenchmarkId::new("open_trips", open), &open, |b, _| {
            b.to_async(&rt).iter(|| async {
                black_box(
                    dispatcher
                        .list_available(TripKind::Ride, worker)
                        .await
                        .expect("list"),
                )
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_accept, bench_list_available);
criterion_main!(benches);
