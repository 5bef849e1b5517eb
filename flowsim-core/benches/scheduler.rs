use criterion::{
    BatchSize, BenchmarkGroup, Criterion, Throughput, black_box, criterion_group, criterion_main,
    measurement::WallTime,
};
use flowsim_core::{Scheduler, VirtualTime};

/// Events already pending when the measured operation runs.
const BACKLOG: u64 = 1_000;

/// A fresh scheduler with [`BACKLOG`] events spread over one second.
fn backlogged() -> Scheduler<u64> {
    let mut scheduler = Scheduler::new();
    for i in 0..BACKLOG {
        let delay = VirtualTime::from_micros((i * 7_919) % 1_000_000);
        scheduler
            .schedule_after(delay, |_, count: &mut u64| *count += 1)
            .unwrap();
    }
    scheduler
}

fn schedule_and_cancel(c: &mut Criterion) {
    c.bench_function("schedule_after", |b| {
        b.iter_batched_ref(
            backlogged,
            |scheduler| {
                scheduler
                    .schedule_after(black_box(VirtualTime::from_millis(1)), |_, count: &mut u64| {
                        *count += 1
                    })
                    .unwrap()
            },
            BatchSize::SmallInput,
        )
    });

    c.bench_function("schedule_then_cancel", |b| {
        b.iter_batched_ref(
            backlogged,
            |scheduler| {
                let handle = scheduler
                    .schedule_after(black_box(VirtualTime::from_millis(1)), |_, count: &mut u64| {
                        *count += 1
                    })
                    .unwrap();
                scheduler.cancel(black_box(handle))
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_run_size(group: &mut BenchmarkGroup<'_, WallTime>, size: u64) {
    group.throughput(Throughput::Elements(size));
    group.bench_function(format!("{size} events"), |b| {
        b.iter(|| {
            let mut scheduler = Scheduler::<u64>::new();
            // spread the events so the heap actually has to order them
            for i in 0..size {
                let delay = VirtualTime::from_micros((i * 7_919) % 1_000);
                scheduler
                    .schedule_after(delay, |_, count: &mut u64| *count += 1)
                    .unwrap();
            }
            let mut count = 0;
            scheduler.run(&mut count).unwrap();
            count
        })
    });
}

fn run(c: &mut Criterion) {
    let mut group = c.benchmark_group("run");

    for size in [1_000, 10_000, 100_000] {
        bench_run_size(&mut group, size);
    }

    group.finish();
}

criterion_group!(benches, schedule_and_cancel, run);
criterion_main!(benches);
