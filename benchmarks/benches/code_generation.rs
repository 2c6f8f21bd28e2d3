use ballot::ElectionConfig;
use ballot::election::CodeGenerator;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashSet;
use std::hint::black_box;
use std::time::Duration;

/// Raw and collision-checked voter code generation
fn bench_code_generation(c: &mut Criterion) {
    let generator = CodeGenerator::new(&ElectionConfig::for_testing()).unwrap();

    let mut group = c.benchmark_group("code_generation");
    group.warm_up_time(Duration::from_millis(100));

    group.bench_function("thread_rng", |b| b.iter(|| black_box(generator.generate())));

    group.bench_function("seeded_rng", |b| {
        let mut rng = StdRng::seed_from_u64(7);
        b.iter(|| black_box(generator.generate_with(&mut rng)))
    });

    // Uniqueness checks against rolls of growing size
    for issued in [1_000usize, 10_000, 100_000].iter() {
        let mut rng = StdRng::seed_from_u64(11);
        let taken: HashSet<_> = (0..*issued)
            .map(|_| generator.generate_with(&mut rng))
            .collect();
        group.bench_with_input(BenchmarkId::new("unique", issued), &taken, |b, taken| {
            b.iter(|| {
                generator
                    .generate_unique(|code| taken.contains(code))
                    .unwrap()
            })
        });
    }

    group.finish();
}

/// Generator pressure on a deliberately small code space
fn bench_small_code_space(c: &mut Criterion) {
    let config = ElectionConfig {
        code_length: 4,
        code_alphabet: "ABCDEFGHJKLMNPQR".to_string(),
        ..ElectionConfig::for_testing()
    };
    let generator = CodeGenerator::new(&config).unwrap();

    let mut group = c.benchmark_group("small_code_space");
    for fill in [10usize, 50, 90].iter() {
        let mut rng = StdRng::seed_from_u64(3);
        let target = 65_536 * fill / 100;
        let mut taken = HashSet::with_capacity(target);
        while taken.len() < target {
            taken.insert(generator.generate_with(&mut rng));
        }
        group.bench_with_input(BenchmarkId::new("percent_full", fill), &taken, |b, taken| {
            b.iter(|| black_box(generator.generate_unique(|code| taken.contains(code))))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_code_generation, bench_small_code_space);

criterion_main!(benches);
