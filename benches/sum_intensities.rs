use cngender::chip::IntensityTable;
use cngender::probes::ProbeGroupSet;
use cngender::sex::sum_intensities;
use cngender::types::ProbeIndex;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const CHIP_PROBES: usize = 1_000_000;

fn random_chip() -> IntensityTable {
    let mut rng = StdRng::seed_from_u64(0xC41F);
    let dist = Uniform::new(50.0f32, 5_000.0);
    let values = (0..CHIP_PROBES).map(|_| rng.sample(dist)).collect();
    IntensityTable::single_channel("bench", values)
}

fn random_group(size: usize) -> ProbeGroupSet {
    let mut rng = StdRng::seed_from_u64(0x5EED + size as u64);
    let probes = (0..size)
        .map(|_| ProbeIndex(rng.gen_range(0..CHIP_PROBES as u32)))
        .collect();
    ProbeGroupSet::single_channel(probes)
}

fn benchmark_sum_intensities(c: &mut Criterion) {
    let mut chip = random_chip();
    let sizes = [1_000usize, 10_000, 100_000];

    let mut group = c.benchmark_group("sum_intensities");
    for size in sizes {
        let probes = random_group(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &probes, |b, input| {
            b.iter(|| sum_intensities(&mut chip, black_box(input), true));
        });
    }
    group.finish();
}

criterion_group!(sum_intensities_bench, benchmark_sum_intensities);
criterion_main!(sum_intensities_bench);
