/// Benchmarks for routing inbound messages, the per-message hot path of every connection.
use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use websocket_session::dispatch::route;
use websocket_session::{CloseCode, Message};

fn bench_route_text(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch/text");

    for size in [16_usize, 1024, 64 * 1024] {
        let text = "a".repeat(size);
        let message = Message::text(text);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &message, |b, message| {
            b.iter(|| route(std::hint::black_box(message.clone())));
        });
    }

    let invalid = Message::Text(Bytes::from(vec![0xff_u8; 1024]));
    group.bench_function("invalid_utf8", |b| {
        b.iter(|| route(std::hint::black_box(invalid.clone())));
    });

    group.finish();
}

fn bench_route_binary(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch/binary");

    for size in [16_usize, 1024, 64 * 1024] {
        let message = Message::binary(vec![0x5a_u8; size]);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &message, |b, message| {
            b.iter(|| route(std::hint::black_box(message.clone())));
        });
    }

    group.finish();
}

fn bench_route_control(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch/control");

    let pong = Message::pong(Bytes::new());
    group.bench_function("pong", |b| {
        b.iter(|| route(std::hint::black_box(pong.clone())));
    });

    let close = Message::close(CloseCode::GoingAway, "server restarting");
    group.bench_function("close", |b| {
        b.iter(|| route(std::hint::black_box(close.clone())));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_route_text,
    bench_route_binary,
    bench_route_control
);
criterion_main!(benches);
