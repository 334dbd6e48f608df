use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use mesh_afc::prelude::*;

fn bench_recompute(c: &mut Criterion) {
    let mut group = c.benchmark_group("afc-recompute");
    group.sample_size(20);

    for &n in &[16usize, 48, 96] {
        let mesh = quad_mesh(n, n, 1.0, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let field: std::collections::BTreeMap<u64, f64> = mesh
            .node_ids()
            .into_iter()
            .map(|id| (id, rng.r#gen::<f64>()))
            .collect();
        let provider = ConstantVelocity::new([1.0, 0.4, 0.0], field);
        let local = mesh.serial();

        for limiter in [FluxLimiterType::VanLeer, FluxLimiterType::Superbee] {
            let mut calc =
                AdvectiveFluxCalculator::new(FluxCalculatorConfig::default().with_limiter(limiter))
                    .unwrap();
            calc.setup(&local, &NoComm).unwrap();
            group.bench_with_input(
                BenchmarkId::new(format!("{limiter:?}"), n * n),
                &n,
                |b, _| b.iter(|| calc.compute(&local, &provider, &NoComm).unwrap()),
            );
        }

        group.bench_with_input(BenchmarkId::new("topology", n * n), &n, |b, _| {
            b.iter(|| {
                CalculatorTopology::build(&local, None, &NoComm, GhostCommTags::default()).unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_recompute);
criterion_main!(benches);
