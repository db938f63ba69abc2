use balancer_core::filter::BiquadLpf;
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn bench_accel_lowpass(c: &mut Criterion) {
    c.bench_function("accel_lowpass_tick", |b| {
        let mut f = BiquadLpf::accel_lowpass();
        let mut x = 0.0f32;
        b.iter(|| {
            x += 0.001;
            if x > 0.5 {
                x = -0.5;
            }
            black_box(f.filter(black_box(x)))
        });
    });
}

fn bench_accel_lowpass_step_train(c: &mut Criterion) {
    c.bench_function("accel_lowpass_1500_ticks", |b| {
        b.iter(|| {
            let mut f = BiquadLpf::accel_lowpass();
            let mut acc = 0.0f32;
            for i in 0..1500u32 {
                let x = if i % 2 == 0 { 0.1 } else { -0.1 };
                acc += f.filter(black_box(x));
            }
            black_box(acc)
        });
    });
}

criterion_group!(benches, bench_accel_lowpass, bench_accel_lowpass_step_train);
criterion_main!(benches);
