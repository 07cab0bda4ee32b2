use chrono::{NaiveDate, TimeDelta};
use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use genmon_core::power::{self, PowerSample};

// A month of samples, newest first, with a generator run every few hours
fn synth_log(n: usize, seed: u32) -> Vec<PowerSample> {
    let mut state = seed.max(1);
    let mut next = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        x
    };
    let Some(now) = NaiveDate::from_ymd_opt(2024, 10, 17).and_then(|d| d.and_hms_opt(12, 0, 0))
    else {
        return Vec::new();
    };
    let span = 31 * 24 * 3600i64;
    (0..n)
        .map(|i| {
            let age = i as i64 * span / n as i64;
            let running = (age / 3600) % 7 == 0;
            let kw = if running { 5.0 + f64::from(next() % 100) / 10.0 } else { 0.0 };
            PowerSample::new(now - TimeDelta::seconds(age), kw)
        })
        .collect()
}

pub fn bench_reduce(c: &mut Criterion) {
    let mut g = c.benchmark_group("power_reduce");
    //   BENCH_SAMPLE_SIZE=10 BENCH_MEAS_MS=50 cargo bench -p genmon_core --bench reducer
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE") {
        if let Ok(n) = ss.parse::<usize>() {
            g.sample_size(n.max(1));
        }
    } else {
        g.sample_size(50);
    }
    if let Ok(ms) = std::env::var("BENCH_MEAS_MS")
        && let Ok(ms_u64) = ms.parse::<u64>()
    {
        g.measurement_time(std::time::Duration::from_millis(ms_u64));
    }

    let log = synth_log(50_000, 0x00C0_FFEE);
    let now = log.first().map(|s| s.at).unwrap_or_default();

    for &max in &[100usize, 500, 2000] {
        g.bench_function(format!("reduce_to_{max}"), |b| {
            b.iter_batched(
                || log.clone(),
                |s| {
                    let out = power::reduce_samples(black_box(&s), black_box(now), max);
                    black_box(out);
                },
                BatchSize::SmallInput,
            )
        });
    }
    g.bench_function("energy_kwh", |b| {
        b.iter(|| black_box(power::energy_kwh(black_box(&log))));
    });
    g.finish();
}

criterion_group!(reducer, bench_reduce);
criterion_main!(reducer);
