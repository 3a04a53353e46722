//! Process-wide tunables: page size and buffer pool capacity.
//!
//! Both default to the values the storage format and buffer pool were
//! designed around, but tests may shrink either before constructing a
//! `Database` to exercise eviction and multi-page behavior cheaply.

use std::sync::atomic::{AtomicUsize, Ordering};

const DEFAULT_PAGE_SIZE: usize = 4096;
const DEFAULT_BUFFER_POOL_PAGES: usize = 50;

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_PAGE_SIZE);
static BUFFER_POOL_PAGES: AtomicUsize = AtomicUsize::new(DEFAULT_BUFFER_POOL_PAGES);

pub fn page_size() -> usize {
    PAGE_SIZE.load(Ordering::SeqCst)
}

/// Test-only: override the page size used by new pages and files.
pub fn set_page_size(size: usize) {
    PAGE_SIZE.store(size, Ordering::SeqCst);
}

pub fn reset_page_size() {
    PAGE_SIZE.store(DEFAULT_PAGE_SIZE, Ordering::SeqCst);
}

pub fn buffer_pool_pages() -> usize {
    BUFFER_POOL_PAGES.load(Ordering::SeqCst)
}

/// Test-only: override the default buffer pool capacity for new pools.
pub fn set_buffer_pool_pages(pages: usize) {
    BUFFER_POOL_PAGES.store(pages, Ordering::SeqCst);
}

pub fn reset_buffer_pool_pages() {
    BUFFER_POOL_PAGES.store(DEFAULT_BUFFER_POOL_PAGES, Ordering::SeqCst);
}
