use criterion::{black_box, criterion_group, criterion_main, Criterion};

use resolve::{Comparator, Normalizer, Registry};

fn bench_comparators(c: &mut Criterion) {
    let registry = Registry::new();

    let mut group = c.benchmark_group("comparators");
    group.bench_function("jaro_winkler", |b| {
        let jw = registry.by_name("jarowinkler");
        b.iter(|| jw.compare(black_box("Acme Widgets Incorporated"), black_box("Acme Widget Inc")))
    });
    group.bench_function("name", |b| {
        let name = registry.by_field_type("name");
        b.iter(|| name.compare(black_box("Acme Widgets Incorporated"), black_box("Acme Widget Inc")))
    });
    group.bench_function("address", |b| {
        let address = registry.by_field_type("address");
        b.iter(|| {
            address.compare(
                black_box("123 North Main Street Suite 400"),
                black_box("123 N Main St"),
            )
        })
    });
    group.bench_function("phone", |b| {
        let phone = registry.by_field_type("phone");
        b.iter(|| phone.compare(black_box("(212) 555-7890"), black_box("+1 212 555 7890")))
    });
    group.finish();
}

fn bench_normalizer(c: &mut Criterion) {
    let normalizer = Normalizer::default();

    let mut group = c.benchmark_group("normalizer");
    group.bench_function("name", |b| {
        b.iter(|| normalizer.normalize_name(black_box("Acme Widgets Incorporated")))
    });
    group.bench_function("address", |b| {
        b.iter(|| normalizer.normalize_address(black_box("123 North Main Street Suite 400")))
    });
    group.bench_function("phone", |b| {
        b.iter(|| normalizer.normalize_phone(black_box("(212) 555-7890")))
    });
    group.finish();
}

criterion_group!(benches, bench_comparators, bench_normalizer);
criterion_main!(benches);
