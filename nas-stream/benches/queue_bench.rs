//! Packet Flow Performance Benchmark
//!
//! Measures the per-packet bookkeeping on the controller's hot path:
//! queue enqueue/dispatch/acknowledge, bitrate estimation and MP3 framing.
//!
//! **Goal:** bookkeeping is negligible next to packet duration (~26 ms for MP3)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nas_stream::audio::{FrameParser, PacketParser};
use nas_stream::playback::bitrate::BitrateEstimator;
use nas_stream::playback::queue::PacketQueue;
use nas_stream::playback::{AudioFileType, Packet};

fn mp3_packet() -> Packet {
    Packet::new(vec![0u8; 417], 1152, 1152.0 / 44100.0)
}

fn bench_queue_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_queue");

    for depth in [16usize, 64, 256] {
        group.throughput(Throughput::Elements(depth as u64));
        group.bench_with_input(BenchmarkId::new("enqueue_dispatch_ack", depth), &depth, |b, &depth| {
            let mut queue = PacketQueue::new();
            let template = mp3_packet();

            b.iter(|| {
                for _ in 0..depth {
                    queue.enqueue(template.clone());
                }
                let mut sequences = Vec::with_capacity(depth);
                while let Some(packet) = queue.mark_dispatched() {
                    sequences.push(packet.sequence);
                }
                // Renderer finishes in order
                for sequence in sequences {
                    black_box(queue.acknowledge(sequence));
                }
                black_box(queue.cached_size());
            });
        });
    }

    group.bench_function("drain_256", |b| {
        let template = mp3_packet();
        b.iter(|| {
            let mut queue = PacketQueue::new();
            for _ in 0..128 {
                queue.enqueue(template.clone());
            }
            for _ in 0..128 {
                queue.enqueue(template.clone());
                queue.mark_dispatched();
            }
            black_box(queue.drain());
        });
    });

    group.finish();
}

fn bench_bitrate(c: &mut Criterion) {
    let mut group = c.benchmark_group("bitrate");

    group.bench_function("record_and_estimate", |b| {
        let mut estimator = BitrateEstimator::new(50, 1);
        let duration = 1152.0 / 44100.0;
        let mut size = 417usize;

        b.iter(|| {
            size = if size == 417 { 418 } else { 417 };
            estimator.record(black_box(duration), black_box(size));
            black_box(estimator.estimate());
        });
    });

    group.finish();
}

fn bench_framing(c: &mut Criterion) {
    let mut group = c.benchmark_group("framing");

    let mut frame = vec![0u8; 417];
    frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x44]);
    let chunk: Vec<u8> = (0..100).flat_map(|_| frame.clone()).collect();
    group.throughput(Throughput::Bytes(chunk.len() as u64));

    group.bench_function("mp3_100_frames", |b| {
        let mut parser = FrameParser::new();
        b.iter(|| {
            parser.open(AudioFileType::Mp3).unwrap();
            let events = parser.parse(black_box(&chunk)).unwrap();
            black_box(events.len());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_queue_cycle, bench_bitrate, bench_framing);
criterion_main!(benches);
