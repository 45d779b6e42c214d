//! Benchmarks the `Awaiter`'s hot path: building the `pselect` argument set
//! and dispatching a wakeup across a growing number of pending events.
//!
//! Mirrors `hotdrink-rs/benches/criterion.rs`'s `criterion_group!`/
//! `criterion_main!` shape, scaled over pending-event count the same way
//! the teacher's benches scale over component/variable count.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use pendant::event::{Awaiter, Trigger};
use pendant::signal::SignalConfiguration;
use pendant::sys::mock::{MockApi, PselectResponse};
use pendant::sys::SysApi;
use std::rc::Rc;
use std::time::Duration;

fn bench_many_readable_fds(c: &mut Criterion) {
    let mut group = c.benchmark_group("awaiter_readable_fds");
    for count in [1usize, 8, 64, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let api = Rc::new(MockApi::new());
                let handler_config = SignalConfiguration::new(api.clone() as Rc<dyn SysApi>);
                let awaiter = Awaiter::new(api.clone() as Rc<dyn SysApi>, handler_config);

                api.push_response(PselectResponse::readable(0, Duration::from_secs(0)));
                for fd in 0..count as i32 {
                    awaiter
                        .expect(vec![
                            Trigger::Timeout(Duration::from_secs(1)),
                            Trigger::ReadableFd(fd),
                        ])
                        .then(|_| {});
                }
                awaiter.await_events();
            });
        });
    }
    group.finish();
}

fn bench_timeout_only(c: &mut Criterion) {
    let mut group = c.benchmark_group("awaiter_timeouts");
    for count in [1usize, 8, 64, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let api = Rc::new(MockApi::new());
                let handler_config = SignalConfiguration::new(api.clone() as Rc<dyn SysApi>);
                let awaiter = Awaiter::new(api.clone() as Rc<dyn SysApi>, handler_config);

                for _ in 0..count {
                    awaiter
                        .expect(vec![Trigger::Timeout(Duration::from_secs(0))])
                        .then(|_| {});
                }
                awaiter.await_events();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_many_readable_fds, bench_timeout_only);
criterion_main!(benches);
