//! Correlator throughput.
//!
//! Measures how fast replies are matched to callers when many calls are
//! in flight and replies arrive in reverse order.
//!
//! Run with: cargo bench --bench correlation
//! Results saved to: target/criterion/

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::json;
use tokio::runtime::Runtime;

use extension_bridge::{BridgeConfig, Correlator, MessageType, TransportResponse};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const IN_FLIGHT: &[usize] = &[1, 64, 1024];

// ============================================================================
// Benchmark: Reverse-Order Replies
// ============================================================================

async fn round_trip(in_flight: usize) {
    let (correlator, mut outbound) = Correlator::channel(&BridgeConfig::new());

    let mut handles = Vec::with_capacity(in_flight);
    let mut ids = Vec::with_capacity(in_flight);
    for _ in 0..in_flight {
        let correlator = correlator.clone();
        handles.push(tokio::spawn(async move {
            correlator.call(MessageType::RpcSend, json!({ "method": "m" })).await
        }));
        if let Some(request) = outbound.recv().await {
            ids.push(request.id);
        }
    }

    for id in ids.into_iter().rev() {
        correlator.handle_response(TransportResponse::success(id, json!(null)));
    }

    for handle in handles {
        let _ = handle.await;
    }
}

fn bench_handle_response(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("handle_response");

    for &count in IN_FLIGHT {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("reverse", count), &count, |b, &count| {
            b.to_async(&rt).iter(|| round_trip(count));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Notification Fan-in
// ============================================================================

fn bench_notifications(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("notifications_1000", |b| {
        b.to_async(&rt).iter(|| async {
            let (correlator, mut outbound) = Correlator::channel(&BridgeConfig::new());

            let subscription = tokio::spawn({
                let correlator = correlator.clone();
                async move { correlator.subscribe(MessageType::RpcSubscribe, json!({})).await }
            });
            let Some(request) = outbound.recv().await else {
                return;
            };

            for n in 0..1000 {
                correlator.handle_response(TransportResponse::notification(request.id.clone(), json!(n)));
            }
            correlator.handle_response(TransportResponse::success(request.id, json!(1)));

            if let Ok(Ok((_, mut notifications))) = subscription.await {
                for _ in 0..1000 {
                    notifications.recv().await;
                }
            }
        });
    });
}

criterion_group!(benches, bench_handle_response, bench_notifications);
criterion_main!(benches);
