use criterion::{criterion_group, criterion_main, Criterion};
use std::io::BufReader;

use apfs::container::ApfsContainer;

fn open_appfs() -> Option<BufReader<std::fs::File>> {
    let path = std::path::Path::new("../tests/appfs.raw");
    if !path.exists() {
        return None;
    }
    let file = std::fs::File::open(path).ok()?;
    Some(BufReader::new(file))
}

fn open_volume(reader: BufReader<std::fs::File>) -> apfs::container::VolumeHandle<BufReader<std::fs::File>> {
    let container = ApfsContainer::open(reader, None).unwrap();
    container.volumes().unwrap().into_iter().next().expect("container should have a volume")
}

fn bench_open(c: &mut Criterion) {
    if open_appfs().is_none() {
        eprintln!("Skipping benchmarks - appfs.raw not found");
        return;
    }

    c.bench_function("apfs_open", |b| {
        b.iter(|| {
            let reader = open_appfs().unwrap();
            let _vol = open_volume(reader);
        })
    });
}

fn bench_list_root(c: &mut Criterion) {
    let reader = match open_appfs() {
        Some(r) => r,
        None => return,
    };

    let vol = open_volume(reader);

    c.bench_function("apfs_list_root", |b| {
        b.iter(|| {
            let _entries = vol.list_directory("/", None).unwrap();
        })
    });
}

fn bench_walk_all(c: &mut Criterion) {
    if open_appfs().is_none() {
        return;
    }

    c.bench_function("apfs_walk_all", |b| {
        b.iter(|| {
            let reader = open_appfs().unwrap();
            let vol = open_volume(reader);
            let _entries = vol.walk(None).unwrap();
        })
    });
}

fn bench_stat(c: &mut Criterion) {
    let reader = match open_appfs() {
        Some(r) => r,
        None => return,
    };

    let vol = open_volume(reader);

    // Find a file path to stat
    let walk = vol.walk(None).unwrap();
    let file_path = walk.iter()
        .find(|e| e.entry.kind == apfs::EntryKind::File && e.entry.size > 0)
        .map(|e| e.path.clone());

    if let Some(path) = file_path {
        c.bench_function("apfs_stat", |b| {
            b.iter(|| {
                let _stat = vol.stat(&path, None).unwrap();
            })
        });
    }
}

fn bench_read_small_file(c: &mut Criterion) {
    let reader = match open_appfs() {
        Some(r) => r,
        None => return,
    };

    let vol = open_volume(reader);

    // Find a small file to read
    let walk = vol.walk(None).unwrap();
    let file_path = walk.iter()
        .find(|e| e.entry.kind == apfs::EntryKind::File && e.entry.size > 0 && e.entry.size < 100_000)
        .map(|e| e.path.clone());

    if let Some(path) = file_path {
        c.bench_function("apfs_read_small_file", |b| {
            b.iter(|| {
                let _data = vol.read_file(&path, None).unwrap();
            })
        });
    }
}

criterion_group!(benches, bench_open, bench_list_root, bench_walk_all, bench_stat, bench_read_small_file);
criterion_main!(benches);
