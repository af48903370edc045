use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rollmap_core::SingleProcessFile;
use tempfile::tempdir;

fn bench_reserve_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_process_reservation");

    group.bench_function("reserve_write_commit_64b", |b| {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("bench.bin");
        let file = SingleProcessFile::create(&path, 64 * 1024 * 1024, false).expect("create");
        let payload = vec![0xABu8; 64];
        b.iter(|| {
            let offset = file.write(black_box(&payload)).expect("write");
            black_box(offset);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_reserve_commit);
criterion_main!(benches);
