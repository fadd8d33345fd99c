//! Criterion benchmarks for control-protocol parsing and rendering.
//!
//! Run with:
//! ```bash
//! cargo bench --package p2p-core --bench message_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use p2p_core::{SupplicantEvent, SupplicantMessage};

const DEVICE_FOUND: &str = "<3>P2P-DEVICE-FOUND 4e:74:03:70:e2:c1 \
    p2p_dev_addr=4e:74:03:70:e2:c1 pri_dev_type=8-0050F204-2 name='Aquaris M10' \
    config_methods=0x188 dev_capab=0x5 group_capab=0x0 wfd_dev_info=0x00111c440032 new=1";

const GROUP_STARTED: &str = "<3>P2P-GROUP-STARTED p2p0 GO ssid=\"DIRECT-hB\" freq=2412 \
    passphrase=\"HtP0qYon\" go_dev_addr=4e:74:03:64:95:a7";

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    group.bench_function("device_found", |b| {
        b.iter(|| SupplicantMessage::parse(black_box(DEVICE_FOUND)))
    });
    group.bench_function("group_started", |b| {
        b.iter(|| SupplicantMessage::parse(black_box(GROUP_STARTED)))
    });
    group.bench_function("ok_response", |b| {
        b.iter(|| SupplicantMessage::parse(black_box("OK\n")))
    });
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let message = SupplicantMessage::parse(DEVICE_FOUND);
    c.bench_function("decode/device_found", |b| {
        b.iter(|| SupplicantEvent::decode(black_box(&message)))
    });
}

fn bench_render(c: &mut Criterion) {
    c.bench_function("render/p2p_connect", |b| {
        b.iter(|| {
            SupplicantMessage::request("P2P_CONNECT")
                .arg(black_box("4e:74:03:70:e2:c1"))
                .arg("pbc")
                .to_line()
        })
    });
}

criterion_group!(benches, bench_parse, bench_decode, bench_render);
criterion_main!(benches);
