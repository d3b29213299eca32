use anyhow::Result;

use otley::btree::Otley;
use otley::btree::Property;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;
use serde::{Deserialize, Serialize};

const TEST_DIR: &str = "bench.idx";
const INSERT_DIR: &str = "bench_insert.idx";
const ENTRIES: i32 = 2_000;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
struct Entry {
    id: i32,
    payload: [u8; 16],
}

// Utility function for creating a populated index to benchmark against
async fn create_database(dir: &str, unique: bool) -> Result<Otley<i32, Entry>> {
    let _ = std::fs::remove_dir_all(dir);
    let property = Property::new(dir, "metadata.json", "index.dat", 32, 32, unique)?;
    let db = Otley::try_new(property, |e: &Entry| e.id).await?;

    for id in 0..ENTRIES {
        db.insert(Entry {
            id,
            payload: [7; 16],
        })
        .await?;
    }

    Ok(db)
}

fn otley_insert(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let db = rt
        .block_on(create_database(INSERT_DIR, false))
        .expect("creates database");

    let mut group = c.benchmark_group("insert");
    for size in [64, 256, 1024].iter() {
        group.bench_with_input(BenchmarkId::new("otley insert", size), size, |b, size| {
            b.to_async(tokio::runtime::Runtime::new().expect("build tokio runtime"))
                .iter(|| async {
                    let id = rand::thread_rng().gen_range(0..*size);
                    let _ = db
                        .insert(Entry {
                            id,
                            payload: [9; 16],
                        })
                        .await;
                })
        });
    }
    group.finish();
    drop(db);
    std::fs::remove_dir_all(INSERT_DIR).expect("cleanup");
}

fn otley_search(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let db = rt
        .block_on(create_database(TEST_DIR, true))
        .expect("creates database");

    let mut group = c.benchmark_group("search");
    for size in [64, 256, 1024].iter() {
        group.bench_with_input(BenchmarkId::new("otley search", size), size, |b, size| {
            b.to_async(tokio::runtime::Runtime::new().expect("build tokio runtime"))
                .iter(|| async {
                    let id = rand::thread_rng().gen_range(0..*size);
                    let _ = db.search(&id).await;
                })
        });
    }
    group.finish();
    drop(db);
    std::fs::remove_dir_all(TEST_DIR).expect("cleanup");
}

fn otley_remove(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let db = rt
        .block_on(create_database(TEST_DIR, true))
        .expect("creates database");

    let mut group = c.benchmark_group("remove");
    for size in [64, 256, 1024].iter() {
        group.bench_with_input(BenchmarkId::new("otley remove", size), size, |b, size| {
            b.to_async(tokio::runtime::Runtime::new().expect("build tokio runtime"))
                .iter(|| async {
                    let id = rand::thread_rng().gen_range(0..*size);
                    // Most iterations hit an already removed key; the
                    // descent is the interesting part either way.
                    let _ = db.remove(&id).await;
                })
        });
    }
    group.finish();
    drop(db);
    std::fs::remove_dir_all(TEST_DIR).expect("cleanup");
}

criterion_group!(benches, otley_insert, otley_search, otley_remove);
criterion_main!(benches);
