use criterion::{Criterion, black_box, criterion_group, criterion_main};
use flowsim_core::{FlowMonitor, FlowTuple, PacketRegistry, Protocol, VirtualTime};
use std::net::Ipv4Addr;

const PACKET_SIZE: u32 = 1_400;

fn tuple(dst_port: u16) -> FlowTuple {
    FlowTuple::new(
        Ipv4Addr::new(10, 1, 1, 1),
        Ipv4Addr::new(10, 1, 1, 2),
        49153,
        dst_port,
        Protocol::Udp,
    )
}

fn registry(c: &mut Criterion) {
    let mut registry = PacketRegistry::new();
    let tuple = tuple(9);

    c.bench_function("send_receive", |b| {
        b.iter(|| {
            let id = registry.on_send(black_box(tuple), PACKET_SIZE, VirtualTime::ZERO);
            registry.on_receive(black_box(id)).unwrap()
        })
    });
}

fn monitor(c: &mut Criterion) {
    let mut monitor = FlowMonitor::new();
    let tuples: Vec<_> = (0..64).map(tuple).collect();
    let mut now = VirtualTime::ZERO;
    let mut i = 0;

    c.bench_function("monitor_send_receive", |b| {
        b.iter(|| {
            i = (i + 1) % tuples.len();
            now += VirtualTime::from_micros(10);
            let id = monitor.on_send(black_box(tuples[i]), PACKET_SIZE, now);
            monitor
                .notify_received(black_box(id), now + VirtualTime::from_millis(5))
                .unwrap()
        })
    });

    let mut monitor = FlowMonitor::new();
    for i in 0..100_000u64 {
        monitor.on_send(tuples[(i % 64) as usize], PACKET_SIZE, VirtualTime::from_micros(i));
    }
    c.bench_function("expire_nothing_100k_in_flight", |b| {
        b.iter(|| {
            monitor.expire_older_than(
                black_box(VirtualTime::from_secs(60)),
                VirtualTime::from_secs(1),
            )
        })
    });
}

criterion_group!(benches, registry, monitor);
criterion_main!(benches);
