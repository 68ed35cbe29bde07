//! Performance benchmarks for chain evaluation
//!
//! Run with: cargo bench --package mavtables-filter

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mavtables_core::{MavAddress, MavPacket, MavSubnet};
use mavtables_filter::{Action, ChainSet, Context, Filter, FilterConfig, If, Rule};
use std::sync::Arc;

fn create_test_packet() -> MavPacket {
    MavPacket::builder(76, "COMMAND_LONG")
        .source(MavAddress::new(255, 190))
        .dest(MavAddress::new(1, 1))
        .build()
}

fn bench_subnet_contains(c: &mut Criterion) {
    let mut group = c.benchmark_group("subnet");

    let subnet: MavSubnet = "255.16:128.240".parse().unwrap();
    let address = MavAddress::new(200, 31);

    group.bench_function("contains", |b| {
        b.iter(|| black_box(subnet.contains(black_box(address))));
    });

    group.bench_function("parse", |b| {
        b.iter(|| black_box(black_box("128.0/9").parse::<MavSubnet>()));
    });

    group.finish();
}

/// `rules` non-matching rules followed by one accept.
fn linear_filter(rules: usize) -> Filter {
    let mut chains = ChainSet::new();
    let root = chains.chain("default").unwrap();
    for i in 0..rules {
        let rule = Rule::new(Action::reject())
            .with_condition(If::any().with_source(MavSubnet::exact(MavAddress::new(1, i as u8))));
        chains.append(&root, rule).unwrap();
    }
    chains
        .append(&root, Rule::new(Action::accept().with_priority(1)))
        .unwrap();
    Filter::new(Arc::new(chains), root)
}

fn bench_linear_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("linear_chain");
    let packet = create_test_packet();
    let ctx = Context::new(MavAddress::new(1, 1));

    for rules in [1, 10, 100] {
        let filter = linear_filter(rules);
        group.bench_with_input(BenchmarkId::new("decide", rules), &filter, |b, filter| {
            b.iter(|| black_box(filter.decide(black_box(&packet), &ctx)));
        });
    }

    group.finish();
}

fn bench_nested_calls(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested_calls");
    let packet = create_test_packet();
    let ctx = Context::new(MavAddress::new(1, 1));

    for depth in [1, 8, 31] {
        let mut chains = ChainSet::new();
        let root = chains.chain("default").unwrap();
        let mut current = root.clone();
        for level in 0..depth {
            let next = chains.chain(&format!("level{}", level)).unwrap();
            chains
                .append(&current, Rule::new(Action::call(next.clone())))
                .unwrap();
            current = next;
        }
        chains.append(&current, Rule::new(Action::accept())).unwrap();
        let filter = Filter::new(Arc::new(chains), root);

        group.bench_with_input(BenchmarkId::new("decide", depth), &filter, |b, filter| {
            b.iter(|| black_box(filter.decide(black_box(&packet), &ctx)));
        });
    }

    group.finish();
}

fn bench_example_config(c: &mut Criterion) {
    let filter = FilterConfig::example().into_filter().unwrap();
    let packet = create_test_packet();
    let ctx = Context::new(MavAddress::new(1, 1));

    c.bench_function("example_config_will_accept", |b| {
        b.iter(|| black_box(filter.will_accept(black_box(&packet), &ctx)));
    });
}

criterion_group!(
    benches,
    bench_subnet_contains,
    bench_linear_chain,
    bench_nested_calls,
    bench_example_config,
);
criterion_main!(benches);
