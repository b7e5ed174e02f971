use criterion::{black_box, criterion_group, criterion_main, Criterion};

use uzixfs::{DiskFs, FormatConfig, MemoryBlockDevice, SizeSpec, ROOT_INODE};

fn fresh_fs(blocks: u64) -> DiskFs<MemoryBlockDevice> {
    let config = FormatConfig {
        image_size: SizeSpec::from_blocks(blocks),
        ..Default::default()
    };
    DiskFs::format(MemoryBlockDevice::in_memory(blocks), &config).unwrap()
}

fn benchmark_allocator(c: &mut Criterion) {
    let mut fs = fresh_fs(1440);

    c.bench_function("alloc_free_100_blocks", |b| {
        b.iter(|| {
            let blocks: Vec<_> = (0..100).map(|_| fs.alloc_block().unwrap()).collect();
            for block in blocks {
                fs.free_block(black_box(block)).unwrap();
            }
        });
    });
}

fn benchmark_file_operations(c: &mut Criterion) {
    let mut fs = fresh_fs(4000);
    let ino = fs.create(ROOT_INODE, b"big", 0o644).unwrap();
    let data = vec![0x5Au8; 600 * 512];
    fs.write_file(ino, 0, &data).unwrap();
    let inode = fs.read_inode(ino).unwrap();

    c.bench_function("translate_600_ranks", |b| {
        b.iter(|| {
            for rank in 0..600 {
                black_box(fs.translate_read(&inode, rank).unwrap());
            }
        });
    });

    c.bench_function("read_file_300k", |b| {
        b.iter(|| black_box(fs.read_file(ino).unwrap()));
    });

    c.bench_function("grow_implode_300_blocks", |b| {
        let scratch = fs.create(ROOT_INODE, b"scratch", 0o644).unwrap();
        b.iter(|| {
            fs.grow(scratch, 300 * 512).unwrap();
            fs.implode(scratch).unwrap();
        });
    });
}

criterion_group!(benches, benchmark_allocator, benchmark_file_operations);
criterion_main!(benches);
