//! Flow control benchmark - per-frame accounting cost

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use kaos_flow::{ConnectionParameters, FlowConfig, FlowControlManager, RttStats};
use kaos_shared::SystemClock;
use std::sync::Arc;
use std::time::Duration;

const STREAMS: u32 = 64;
const FRAME_LEN: u64 = 1200;

fn manager() -> FlowControlManager {
    // connection window sized for every stream advancing a frame per iteration
    let config = FlowConfig {
        connection_receive_window: 4 * 1024 * 1024,
        max_connection_receive_window: 8 * 1024 * 1024,
        ..FlowConfig::default()
    };
    let params = Arc::new(ConnectionParameters::new(config).unwrap());
    let rtt = Arc::new(RttStats::new());
    rtt.update(Duration::from_millis(20));
    let mut flow = FlowControlManager::new(params, rtt, Arc::new(SystemClock));
    for id in 1..=STREAMS {
        flow.new_stream(id, true);
    }
    flow
}

fn bench_receive_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("receive");
    group.throughput(Throughput::Elements(STREAMS as u64));

    group.bench_function("frame_read_update", |b| {
        let mut flow = manager();
        let mut offset = 0u64;
        b.iter(|| {
            offset += FRAME_LEN;
            for id in 1..=STREAMS {
                flow.update_highest_received(id, offset).unwrap();
                flow.add_bytes_read(id, FRAME_LEN).unwrap();
            }
            black_box(flow.window_updates());
        });
    });

    group.finish();
}

fn bench_send_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("send");
    group.throughput(Throughput::Elements(STREAMS as u64));

    group.bench_function("window_check_and_send", |b| {
        let mut flow = manager();
        let mut window = 0u64;
        b.iter(|| {
            window += FRAME_LEN;
            flow.update_window(0, window).unwrap();
            for id in 1..=STREAMS {
                flow.update_window(id, window).unwrap();
                let allowed = flow.send_window_size(id).unwrap();
                flow.add_bytes_sent(id, allowed.min(FRAME_LEN / STREAMS as u64))
                    .unwrap();
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_receive_path, bench_send_path);
criterion_main!(benches);
