//! kW history reduction over long logs.
//!
//! Verifies that:
//! - A month of samples never reduces past the requested point count
//! - Peaks survive reduction and keep their value
//! - Short runs stay framed by zero markers after reduction
//! - An all-zero log reduces to nothing

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use genmon_core::power::{self, PowerSample};
use proptest::prelude::*;

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 10, 17)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .unwrap()
}

/// Newest-first samples at the given ages in seconds.
fn trace(mut points: Vec<(i64, f64)>) -> Vec<PowerSample> {
    points.sort_by_key(|(age, _)| *age);
    points
        .into_iter()
        .map(|(age, kw)| PowerSample::new(now() - TimeDelta::seconds(age), kw))
        .collect()
}

const MONTH: i64 = 31 * 24 * 3600;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn month_of_samples_respects_the_limit(
        points in proptest::collection::vec((0..MONTH, prop_oneof![Just(0.0), 0.1f64..22.0]), 1..2000),
        max in 10usize..600,
    ) {
        let samples = trace(points);
        let out = power::reduce_samples(&samples, now(), max);
        prop_assert!(out.len() <= max, "{} > {}", out.len(), max);
    }
}

#[test]
fn dense_month_fits_in_five_hundred_points() {
    // one sample every ~4.5 minutes, running an hour in every six
    let samples: Vec<_> = (0..10_000i64)
        .map(|i| {
            let age = i * MONTH / 10_000;
            let kw = if (age / 3600) % 6 == 0 { 7.5 } else { 0.0 };
            PowerSample::new(now() - TimeDelta::seconds(age), kw)
        })
        .collect();
    let out = power::reduce_samples(&samples, now(), 500);
    assert!(out.len() <= 500);
    assert!(out.iter().any(|s| s.kw > 0.0));
    assert!(out.iter().all(|s| s.kw == 0.0 || s.kw == 7.5));
}

#[test]
fn sparse_runs_are_framed_by_zero_markers() {
    // idle month with a short run every ~37 hours
    let samples: Vec<_> = (0..10_000i64)
        .map(|i| {
            let age = i * MONTH / 10_000;
            let kw = if i % 500 == 250 { 4.2 } else { 0.0 };
            PowerSample::new(now() - TimeDelta::seconds(age), kw)
        })
        .collect();
    let out = power::reduce_samples(&samples, now(), 500);
    assert!(out.len() <= 500);
    assert_eq!(out.iter().filter(|s| s.kw > 0.0).count(), 20);

    let mut i = 0;
    while i < out.len() {
        if out[i].kw == 0.0 {
            i += 1;
            continue;
        }
        let start = i;
        while i < out.len() && out[i].kw > 0.0 {
            i += 1;
        }
        assert!(start > 0 && out[start - 1].kw == 0.0, "run at {start} has no newer marker");
        assert!(i < out.len() && out[i].kw == 0.0, "run at {start} has no older marker");
    }
}

#[test]
fn idle_log_emits_no_peaks() {
    let samples: Vec<_> = (0..1_000i64)
        .map(|i| PowerSample::new(now() - TimeDelta::minutes(i * 30), 0.0))
        .collect();
    let out = power::reduce_samples(&samples, now(), 100);
    assert!(out.iter().all(|s| s.kw == 0.0));
    assert!(out.is_empty());
}
