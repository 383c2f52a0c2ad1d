//! 📈 How fast does the grouping engine walk a big flat granule list?
//!
//! Worst case for the re-scan design is many groups over a long list, so the bench sweeps
//! the group count at a fixed input size.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use granq::common::Granule;
use granq::grouping::{GroupAndChunk, granule_group};

fn granules(count: usize, groups: usize) -> Vec<Granule> {
    (0..count)
        .map(|n| {
            let mut granule = Granule::new(format!("granule-{n}"));
            granule.collection_id = Some(format!("COLL{}___001", n % groups));
            granule.provider = Some(format!("prov-{}", n % 2));
            granule
        })
        .collect()
}

fn bench_group_and_chunk(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_and_chunk");
    let count = 10_000;
    group.throughput(Throughput::Elements(count as u64));

    for groups in [1, 10, 100] {
        let items = granules(count, groups);
        group.bench_with_input(BenchmarkId::from_parameter(groups), &items, |b, items| {
            b.iter(|| {
                let mut batches = 0usize;
                for g in GroupAndChunk::new(black_box(items), granule_group, 100) {
                    batches += g.chunks.count();
                }
                batches
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_group_and_chunk);
criterion_main!(benches);
