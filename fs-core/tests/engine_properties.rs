use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use uzixfs::blockdev::BLOCK_SIZE;
use uzixfs::codec;
use uzixfs::format::{
    mode, FreeCache, DOUBLE_INDIRECT_SLOT, MAX_FILE_BLOCKS, SINGLE_INDIRECT_SLOT,
};
use uzixfs::{
    BlockDevice, BlockNo, DiskFs, FormatConfig, FsError, Inode, MemoryBlockDevice, SizeSpec,
    Timestamp, ROOT_INODE,
};

fn init_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}

fn format(blocks: u64) -> DiskFs<MemoryBlockDevice> {
    init_logging();
    let config = FormatConfig {
        image_size: SizeSpec::from_blocks(blocks),
        inode_size: SizeSpec::from_blocks(25),
        reserved_size: SizeSpec::from_blocks(0),
    };
    DiskFs::format(MemoryBlockDevice::in_memory(blocks), &config).expect("format failed")
}

/// Every block the file references: leaves in rank order, then index blocks
fn file_blocks(fs: &mut DiskFs<MemoryBlockDevice>, ino: u16) -> (Vec<BlockNo>, Vec<BlockNo>) {
    let inode = fs.read_inode(ino).unwrap();
    let leaves = (0..inode.block_count())
        .map(|rank| fs.translate_read(&inode, rank).unwrap())
        .collect();

    let mut indexes = Vec::new();
    if inode.addr[SINGLE_INDIRECT_SLOT] != 0 {
        indexes.push(inode.addr[SINGLE_INDIRECT_SLOT]);
    }
    let top = inode.addr[DOUBLE_INDIRECT_SLOT];
    if top != 0 {
        indexes.push(top);
        let mut block = [0u8; BLOCK_SIZE];
        fs.device().read_block(top as u64, &mut block).unwrap();
        indexes.extend(codec::decode_index(&block).iter().filter(|&&b| b != 0));
    }
    (leaves, indexes)
}

#[test]
fn test_fresh_720_block_image() {
    let mut fs = format(720);

    let st = fs.stat(ROOT_INODE).unwrap();
    assert_ne!(st.mode & mode::IFDIR, 0);
    assert_eq!(st.nlink, 2);
    assert_eq!(st.size, 32);
    assert_eq!(fs.resolve("/").unwrap(), ROOT_INODE);

    let sb = fs.superblock().clone();
    assert_eq!(sb.first_inode_block, 2);
    assert_eq!(sb.free_blocks, 692);
    assert_eq!(sb.free_inodes, 198);
    assert!(fs.validate().is_empty());

    // the block right after the root directory comes out first
    assert_eq!(fs.alloc_block().unwrap(), 28);
}

#[test]
fn test_translation_tier_boundaries() {
    // (blocks, index blocks expected)
    for (blocks, indexes) in [
        (18u32, 0usize),
        (19, 1),
        (273, 1),
        (274, 1),
        (275, 3),
        (530, 3),
        (531, 4),
    ] {
        let mut fs = format(720);
        let ino = fs.create(ROOT_INODE, b"big", 0o644).unwrap();
        let before = fs.superblock().free_blocks;

        fs.grow(ino, (blocks * BLOCK_SIZE as u32) as i32).unwrap();

        let (leaves, index_blocks) = file_blocks(&mut fs, ino);
        assert_eq!(leaves.len(), blocks as usize);
        assert_eq!(index_blocks.len(), indexes, "{} blocks", blocks);
        assert_eq!(
            (before - fs.superblock().free_blocks) as usize,
            blocks as usize + indexes
        );

        let all: HashSet<_> = leaves.iter().chain(index_blocks.iter()).copied().collect();
        assert_eq!(all.len(), blocks as usize + indexes);
        assert!(all.iter().all(|&b| fs.superblock().is_data_block(b)));
    }
}

#[test]
fn test_translation_is_stable_across_growth() {
    let mut fs = format(720);
    let ino = fs.create(ROOT_INODE, b"grower", 0o644).unwrap();
    let probes = [0u32, 17, 18, 273, 274, 529];
    let mut mapped: Vec<(u32, BlockNo)> = Vec::new();

    for blocks in [1u32, 18, 19, 274, 275, 530] {
        fs.grow(ino, (blocks * BLOCK_SIZE as u32) as i32).unwrap();
        let inode = fs.read_inode(ino).unwrap();

        for &(rank, block) in &mapped {
            assert_eq!(fs.translate_read(&inode, rank).unwrap(), block, "rank {} moved", rank);
        }
        for &rank in probes.iter().filter(|&&r| r < blocks) {
            if mapped.iter().all(|&(r, _)| r != rank) {
                let block = fs.translate_read(&inode, rank).unwrap();
                assert!(fs.superblock().is_data_block(block));
                mapped.push((rank, block));
            }
        }
    }
    assert_eq!(mapped.len(), probes.len());

    // the mappings are the ones grow wrote into the inode and index blocks
    let inode = fs.read_inode(ino).unwrap();
    let lookup = |rank: u32| mapped.iter().find(|&&(r, _)| r == rank).map(|&(_, b)| b);
    assert_eq!(lookup(0), Some(inode.addr[0]));
    assert_eq!(lookup(17), Some(inode.addr[17]));

    let mut block = [0u8; BLOCK_SIZE];
    fs.device()
        .read_block(inode.addr[SINGLE_INDIRECT_SLOT] as u64, &mut block)
        .unwrap();
    let single = codec::decode_index(&block);
    assert_eq!(lookup(18), Some(single[0]));
    assert_eq!(lookup(273), Some(single[255]));

    fs.device()
        .read_block(inode.addr[DOUBLE_INDIRECT_SLOT] as u64, &mut block)
        .unwrap();
    let second = codec::index_entry(&block, 0);
    fs.device().read_block(second as u64, &mut block).unwrap();
    let group = codec::decode_index(&block);
    assert_eq!(lookup(274), Some(group[0]));
    assert_eq!(lookup(529), Some(group[255]));
}

#[test]
fn test_rank_past_ceiling_fails() {
    let mut fs = format(720);
    let inode = fs.read_inode(ROOT_INODE).unwrap();
    assert!(matches!(
        fs.translate_read(&inode, MAX_FILE_BLOCKS),
        Err(FsError::OutOfRange(65810))
    ));

    let ino = fs.create(ROOT_INODE, b"huge", 0o644).unwrap();
    let too_long = (MAX_FILE_BLOCKS * BLOCK_SIZE as u32) as i32 + 1;
    assert!(matches!(fs.grow(ino, too_long), Err(FsError::OutOfRange(_))));
    assert_eq!(fs.read_inode(ino).unwrap().size, 0);
}

#[test]
fn test_double_indirect_growth_across_calls() {
    let mut fs = format(2000);
    let ino = fs.create(ROOT_INODE, b"log", 0o644).unwrap();
    let initial = fs.superblock().free_blocks;

    for blocks in [280u32, 531, 800, 1100] {
        fs.grow(ino, (blocks * BLOCK_SIZE as u32) as i32).unwrap();

        let groups = (blocks - 274 + 255) / 256;
        let expected_indexes = 2 + groups as usize;
        let (leaves, indexes) = file_blocks(&mut fs, ino);
        assert_eq!(leaves.len(), blocks as usize);
        assert_eq!(indexes.len(), expected_indexes);

        let distinct: HashSet<_> = leaves.iter().chain(indexes.iter()).copied().collect();
        assert_eq!(distinct.len(), leaves.len() + indexes.len());
        assert!(!distinct.contains(&0));
        assert_eq!(
            (initial - fs.superblock().free_blocks) as usize,
            blocks as usize + expected_indexes
        );
    }

    fs.implode(ino).unwrap();
    assert_eq!(fs.superblock().free_blocks, initial);
}

#[test]
fn test_growth_clamps_on_exhaustion() {
    let mut fs = format(720);
    let ino = fs.create(ROOT_INODE, b"victim", 0o644).unwrap();

    while fs.superblock().free_blocks > 5 {
        fs.alloc_block().unwrap();
    }

    let err = fs.grow(ino, 10 * BLOCK_SIZE as i32).unwrap_err();
    assert!(err.is_no_space());

    let inode = fs.read_inode(ino).unwrap();
    assert_eq!(inode.size, 5 * BLOCK_SIZE as i32);
    assert!(inode.addr[..5].iter().all(|&b| b != 0));
    assert_eq!(inode.addr[5], 0);
    assert_eq!(fs.superblock().free_blocks, 0);
}

#[test]
fn test_directory_zero_entry_stops_listing() {
    let mut fs = format(720);
    let dir = fs.mkdir(ROOT_INODE, b"d", 0o755).unwrap();
    for i in 0..8 {
        fs.create(dir, format!("f{}", i).as_bytes(), 0o644).unwrap();
    }
    assert_eq!(fs.read_dir(dir).unwrap().len(), 10);

    // clear the inode number of the sixth entry
    let block = fs.read_inode(dir).unwrap().addr[0] as u64;
    let mut buf = [0u8; BLOCK_SIZE];
    fs.device().read_block(block, &mut buf).unwrap();
    buf[5 * 16] = 0;
    buf[5 * 16 + 1] = 0;
    fs.device().write_block(block, &buf).unwrap();

    let names: Vec<String> = fs.read_dir(dir).unwrap().iter().map(|e| e.name_lossy()).collect();
    assert_eq!(names, vec![".", "..", "f0", "f1", "f2"]);
    assert_eq!(fs.read_inode(dir).unwrap().size, 160);
}

#[test]
fn test_cache_overflow_writes_one_page() {
    let mut fs = format(720);

    let allocated: Vec<BlockNo> = (0..51).map(|_| fs.alloc_block().unwrap()).collect();
    assert_eq!(allocated, (28..=78).collect::<Vec<u16>>());
    // block 70 carried the page that refilled the cache
    let refilled: Vec<u16> = (79..=120).rev().collect();
    assert_eq!(fs.superblock().free_cache.entries(), &refilled[..]);

    let mut snapshot = FreeCache::new();
    for block in (79..=120u16).rev().chain(28..=35) {
        assert!(snapshot.push(block));
    }

    for &block in &allocated {
        fs.free_block(block).unwrap();
    }

    let sb = fs.superblock().clone();
    assert_eq!(sb.free_blocks, 692);
    assert_eq!(sb.free_cache.len(), 43);
    assert_eq!(sb.free_cache.entries()[0], 36);

    let mut page = [0u8; BLOCK_SIZE];
    fs.device().read_block(36, &mut page).unwrap();
    assert_eq!(page, snapshot.to_page().unwrap());
}

#[test]
fn test_freed_block_comes_back_zeroed() {
    let mut fs = format(720);
    let block = fs.alloc_block().unwrap();
    fs.device().write_block(block as u64, &[0xAA; BLOCK_SIZE]).unwrap();
    fs.free_block(block).unwrap();

    assert_eq!(fs.alloc_block().unwrap(), block);
    let mut buf = [0xFFu8; BLOCK_SIZE];
    fs.device().read_block(block as u64, &mut buf).unwrap();
    assert!(buf.iter().all(|&b| b == 0));
}

#[test]
fn test_random_allocation_is_exclusive_and_conserving() {
    let mut fs = format(720);
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let free_blocks = fs.superblock().free_blocks as usize;
    let free_inodes = fs.superblock().free_inodes as usize;

    let mut blocks: Vec<BlockNo> = Vec::new();
    let mut inodes: Vec<u16> = Vec::new();

    for _ in 0..3000 {
        if rng.gen_bool(0.5) {
            if rng.gen_bool(0.6) || blocks.is_empty() {
                match fs.alloc_block() {
                    Ok(block) => {
                        assert!(!blocks.contains(&block), "block {} handed out twice", block);
                        assert!(fs.superblock().is_data_block(block));
                        blocks.push(block);
                    }
                    Err(e) => assert!(e.is_no_space()),
                }
            } else {
                let block = blocks.swap_remove(rng.gen_range(0..blocks.len()));
                fs.free_block(block).unwrap();
            }
            assert_eq!(fs.superblock().free_blocks as usize, free_blocks - blocks.len());
        } else {
            if rng.gen_bool(0.6) || inodes.is_empty() {
                match fs.alloc_inode() {
                    Ok(ino) => {
                        assert!(!inodes.contains(&ino), "inode {} handed out twice", ino);
                        let record = Inode::new(mode::IFREG | 0o600, 1, Timestamp::default());
                        fs.write_inode(ino, &record).unwrap();
                        inodes.push(ino);
                    }
                    Err(e) => assert!(e.is_no_space()),
                }
            } else {
                let ino = inodes.swap_remove(rng.gen_range(0..inodes.len()));
                fs.free_inode(ino).unwrap();
            }
            assert_eq!(fs.superblock().free_inodes as usize, free_inodes - inodes.len());
        }
    }

    assert!(fs.validate().is_empty());
}
