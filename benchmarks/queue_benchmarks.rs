use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use queue_broker::{Message, MessageQueue, QueueManager, WaitContext};

/// Benchmark: Single-threaded put into the buffer
fn bench_put_single_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("put_single_thread");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("buffered", |b| {
        b.iter(|| {
            let queue = MessageQueue::new("bench", 0);
            for _ in 0..1000 {
                let _ = queue.put(black_box(Message::new("data")));
            }
        });
    });
    group.finish();
}

/// Benchmark: Put then get through the manager, including queue
/// creation and idle cleanup on every round
fn bench_roundtrip_latency(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("roundtrip_latency");

    group.bench_function("put_then_get", |b| {
        let manager = QueueManager::new(0, 0);
        let ctx = WaitContext::new();
        b.iter(|| {
            rt.block_on(async {
                manager.put("bench", black_box(Message::new("data"))).unwrap();
                let _ = black_box(manager.get("bench", &ctx).await);
            });
        });
    });
    group.finish();
}

/// Benchmark: Direct hand-off to consumers that are already waiting
fn bench_hand_off(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("hand_off");

    for consumers in [1usize, 4, 16].iter() {
        group.throughput(Throughput::Elements(*consumers as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(consumers),
            consumers,
            |b, &consumers| {
                b.iter(|| {
                    rt.block_on(async {
                        let queue = Arc::new(MessageQueue::new("bench", 0));
                        let mut handles = vec![];
                        for _ in 0..consumers {
                            let queue = queue.clone();
                            handles.push(tokio::spawn(async move {
                                let ctx = WaitContext::with_timeout(Duration::from_secs(5));
                                queue.get(&ctx).await
                            }));
                        }

                        // Whatever arrives before a waiter registers is buffered instead.
                        for _ in 0..consumers {
                            let _ = queue.put(Message::new("data"));
                        }
                        for handle in handles {
                            let _ = black_box(handle.await.unwrap());
                        }
                    });
                });
            },
        );
    }
    group.finish();
}

/// Benchmark: Many producers and consumers on one queue
fn bench_producer_consumer(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("producer_consumer");
    group.sample_size(20);

    for pairs in [1usize, 4, 8].iter() {
        group.throughput(Throughput::Elements((*pairs * 1000) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(pairs), pairs, |b, &pairs| {
            b.iter(|| {
                rt.block_on(async {
                    let manager = Arc::new(QueueManager::new(0, 0));
                    let mut handles = vec![];

                    for _ in 0..pairs {
                        let manager = manager.clone();
                        handles.push(tokio::spawn(async move {
                            for _ in 0..1000 {
                                let _ = manager.put("bench", Message::new("data"));
                            }
                        }));

                        let manager = manager.clone();
                        handles.push(tokio::spawn(async move {
                            let ctx = WaitContext::with_timeout(Duration::from_secs(5));
                            for _ in 0..1000 {
                                let _ = black_box(manager.get("bench", &ctx).await);
                            }
                        }));
                    }

                    for handle in handles {
                        handle.await.unwrap();
                    }
                });
            });
        });
    }
    group.finish();
}

/// Benchmark: Spreading puts across many queue names
fn bench_many_queues(c: &mut Criterion) {
    let mut group = c.benchmark_group("many_queues");

    for queues in [10usize, 1000].iter() {
        group.throughput(Throughput::Elements(*queues as u64));
        group.bench_with_input(BenchmarkId::from_parameter(queues), queues, |b, &queues| {
            let names: Vec<String> = (0..queues).map(|i| format!("queue-{}", i)).collect();
            b.iter(|| {
                let manager = QueueManager::new(0, 0);
                for name in &names {
                    let _ = manager.put(name, black_box(Message::new("data")));
                }
                for name in &names {
                    let _ = black_box(manager.try_get(name));
                }
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_put_single_thread,
    bench_roundtrip_latency,
    bench_hand_off,
    bench_producer_consumer,
    bench_many_queues,
);

criterion_main!(benches);
