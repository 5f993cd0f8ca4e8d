//! Memory ceiling for archiving a large tree.

use std::alloc::{GlobalAlloc, Layout, System};
use std::fs;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

use rax_file_repo::{ArchiveOptions, Repository, StorageRoot};
use tempfile::TempDir;

struct CountingAlloc;

static CURRENT: AtomicUsize = AtomicUsize::new(0);
static PEAK: AtomicUsize = AtomicUsize::new(0);

fn record_alloc(size: usize) {
    let now = CURRENT.fetch_add(size, Ordering::SeqCst) + size;
    PEAK.fetch_max(now, Ordering::SeqCst);
}

fn record_dealloc(size: usize) {
    CURRENT.fetch_sub(size, Ordering::SeqCst);
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc_zeroed(layout) };
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { System.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            // Count the new block before releasing the old one, as a moving realloc does.
            record_alloc(new_size);
            record_dealloc(layout.size());
        }
        new_ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        record_dealloc(layout.size());
    }
}

#[global_allocator]
static GLOBAL_ALLOC: CountingAlloc = CountingAlloc;

const DIRS: usize = 100;
const FILES_PER_DIR: usize = 100;
const FILE_SIZE: usize = 4096;
const MEMORY_CEILING: usize = 16 * 1024 * 1024;

/// Incompressible file content (xorshift64).
fn noise(state: &mut u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(FILE_SIZE);
    while bytes.len() < FILE_SIZE {
        *state ^= *state << 13;
        *state ^= *state >> 7;
        *state ^= *state << 17;
        bytes.extend_from_slice(&state.to_le_bytes());
    }
    bytes
}

#[test]
fn archive_of_large_tree_stays_under_memory_ceiling() {
    let temp_dir = TempDir::new().unwrap();
    let root = StorageRoot::open(temp_dir.path()).unwrap();

    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    for d in 0..DIRS {
        let dir = root.path().join(format!("tree/dir{d:03}"));
        fs::create_dir_all(&dir).unwrap();
        for f in 0..FILES_PER_DIR {
            fs::write(dir.join(format!("file{f:03}.bin")), noise(&mut state)).unwrap();
        }
    }
    let total_content = DIRS * FILES_PER_DIR * FILE_SIZE;

    let options = ArchiveOptions {
        compression_level: 1,
        ..ArchiveOptions::default()
    };
    let repo = Repository::new(root, options);

    let baseline = CURRENT.load(Ordering::SeqCst);
    PEAK.store(baseline, Ordering::SeqCst);

    let summary = repo.stream_archive(&["tree"], io::sink()).unwrap();

    let peak_delta = PEAK.load(Ordering::SeqCst).saturating_sub(baseline);
    assert_eq!(summary.entries, DIRS * FILES_PER_DIR);
    assert_eq!(summary.content_bytes, total_content as u64);
    // Buffering the whole archive would exceed the ceiling on its own.
    assert!(summary.bytes_written > MEMORY_CEILING as u64);
    assert!(
        peak_delta < MEMORY_CEILING,
        "archiving {total_content} bytes peaked at {peak_delta} bytes of heap"
    );
}
