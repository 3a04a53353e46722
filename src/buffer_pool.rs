//! Bounded page cache enforcing no-steal / force with clock (second
//! chance) eviction. The single gate through which every operator reads
//! and mutates pages.

use crate::config;
use crate::database;
use crate::error::{DbError, Result};
use crate::heap_page::{HeapPage, HeapPageId, Permission};
use crate::lock_manager::{LockManager, LockMode};
use crate::transaction::TransactionId;
use crate::tuple::Tuple;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use log::{error, trace};

struct ClockState {
    ring: Vec<HeapPageId>,
    ref_bits: HashMap<HeapPageId, bool>,
    hand: usize,
}

impl ClockState {
    fn new() -> Self {
        ClockState {
            ring: Vec::new(),
            ref_bits: HashMap::new(),
            hand: 0,
        }
    }

    /// Sets `pid`'s reference bit and parks the hand just past its ring
    /// slot, so the next eviction scan resumes after whatever was most
    /// recently touched rather than re-examining it immediately.
    fn touch(&mut self, pid: HeapPageId) {
        self.ref_bits.insert(pid, true);
        self.park_hand_after(pid);
    }

    fn install(&mut self, pid: HeapPageId) {
        self.ring.push(pid);
        self.ref_bits.insert(pid, true);
        self.park_hand_after(pid);
    }

    fn park_hand_after(&mut self, pid: HeapPageId) {
        if let Some(idx) = self.ring.iter().position(|p| *p == pid) {
            self.hand = (idx + 1) % self.ring.len();
        }
    }

    /// Prunes `pid` from the ring and reference-bit map, the same way
    /// `evict_one` prunes stale entries, so a later re-install never
    /// leaves `pid` appearing twice in the ring.
    fn forget(&mut self, pid: &HeapPageId) {
        if let Some(idx) = self.ring.iter().position(|p| p == pid) {
            self.ring.remove(idx);
            if self.hand > idx {
                self.hand -= 1;
            }
        }
        self.ref_bits.remove(pid);
    }
}

/// Bounded cache of pages kept in memory.
pub struct BufferPool {
    id_to_page: RwLock<HashMap<HeapPageId, Arc<RwLock<HeapPage>>>>,
    clock: Mutex<ClockState>,
    lock_manager: LockManager,
    num_pages: usize,
}

impl BufferPool {
    pub fn new() -> Self {
        BufferPool {
            id_to_page: RwLock::new(HashMap::new()),
            clock: Mutex::new(ClockState::new()),
            lock_manager: LockManager::new(),
            num_pages: config::buffer_pool_pages(),
        }
    }

    pub fn with_capacity(num_pages: usize) -> Self {
        BufferPool {
            id_to_page: RwLock::new(HashMap::new()),
            clock: Mutex::new(ClockState::new()),
            lock_manager: LockManager::new(),
            num_pages,
        }
    }

    /// Retrieves the specified page from cache or disk, acquiring `perm`
    /// through the lock manager first.
    pub fn get_page(
        &self,
        tid: TransactionId,
        pid: HeapPageId,
        perm: Permission,
    ) -> Result<Arc<RwLock<HeapPage>>> {
        self.lock_manager.acquire_lock(tid, pid, LockMode::from(perm))?;

        {
            let id_to_page = self.id_to_page.read().unwrap();
            if let Some(page) = id_to_page.get(&pid) {
                self.clock.lock().unwrap().touch(pid);
                return Ok(Arc::clone(page));
            }
        }

        let db = database::get_global_db();
        let catalog = db.get_catalog();
        let table = catalog
            .get_table_from_id(pid.get_table_id())
            .ok_or_else(|| DbError::exception(format!("unknown table {}", pid.get_table_id())))?;
        let page = table.read_page(&pid)?;
        self.install_page(pid, page)
    }

    /// Installs `page` into the cache under `pid`, evicting first if the
    /// cache is full. Overwrites any existing entry for `pid`.
    fn install_page(&self, pid: HeapPageId, page: HeapPage) -> Result<Arc<RwLock<HeapPage>>> {
        let mut id_to_page = self.id_to_page.write().unwrap();
        if !id_to_page.contains_key(&pid) && id_to_page.len() >= self.num_pages {
            self.evict_one(&mut id_to_page)?;
        }
        let handle = Arc::new(RwLock::new(page));
        id_to_page.insert(pid, Arc::clone(&handle));
        self.clock.lock().unwrap().install(pid);
        Ok(handle)
    }

    /// Clock (second-chance) eviction over a bounded number of hand
    /// advances. Never evicts a dirty page (no-steal).
    fn evict_one(&self, id_to_page: &mut HashMap<HeapPageId, Arc<RwLock<HeapPage>>>) -> Result<()> {
        let mut clock = self.clock.lock().unwrap();
        if clock.ring.is_empty() {
            return Err(DbError::exception("no eviction candidate"));
        }
        let bound = 2 * clock.ring.len();
        let mut attempts = 0;
        while attempts < bound {
            if clock.ring.is_empty() {
                return Err(DbError::exception("no eviction candidate"));
            }
            let i = clock.hand % clock.ring.len();
            let pid = clock.ring[i];

            if !id_to_page.contains_key(&pid) {
                clock.ring.remove(i);
                clock.ref_bits.remove(&pid);
                if clock.hand > i {
                    clock.hand -= 1;
                }
                continue;
            }

            let r = *clock.ref_bits.get(&pid).unwrap_or(&false);
            let dirty = id_to_page
                .get(&pid)
                .map(|p| p.read().unwrap().is_dirty())
                .unwrap_or(false);

            if !r && !dirty {
                id_to_page.remove(&pid);
                clock.ring.remove(i);
                clock.ref_bits.remove(&pid);
                trace!("evicted {:?}", pid);
                return Ok(());
            }
            if !r && dirty {
                clock.hand = i + 1;
                attempts += 1;
                continue;
            }
            // r == true: second chance
            clock.ref_bits.insert(pid, false);
            clock.hand = i + 1;
            attempts += 1;
        }
        Err(DbError::exception(
            "no eviction candidate: all cached pages are dirty",
        ))
    }

    /// Delegates to the table's file, marks every modified page dirty by
    /// `tid`, and installs it into the cache (evicting if necessary).
    pub fn insert_tuple(&self, tid: TransactionId, table_id: usize, tuple: Tuple) -> Result<()> {
        let db = database::get_global_db();
        let catalog = db.get_catalog();
        let table = catalog
            .get_table_from_id(table_id)
            .ok_or_else(|| DbError::exception(format!("unknown table {}", table_id)))?;
        let pages = table.add_tuple(tid, tuple)?;
        for page in pages {
            let pid = page.read().unwrap().get_id();
            self.track_modified_page(pid, page);
        }
        Ok(())
    }

    /// Symmetric with `insert_tuple`; the table is recovered from the
    /// tuple's record id.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<()> {
        let table_id = tuple.get_record_id().get_page_id().get_table_id();
        let db = database::get_global_db();
        let catalog = db.get_catalog();
        let table = catalog
            .get_table_from_id(table_id)
            .ok_or_else(|| DbError::exception(format!("unknown table {}", table_id)))?;
        let pages = table.delete_tuple(tid, tuple)?;
        for page in pages {
            let pid = page.read().unwrap().get_id();
            self.track_modified_page(pid, page);
        }
        Ok(())
    }

    /// Registers a page that a table operation has already fetched and
    /// mutated through the buffer pool (`get_page` put it there), so this
    /// just refreshes its reference bit.
    fn track_modified_page(&self, pid: HeapPageId, _page: Arc<RwLock<HeapPage>>) {
        self.clock.lock().unwrap().touch(pid);
    }

    /// Releases a single lock without flushing. Reserved for advanced
    /// callers that manage flush order themselves.
    pub fn unsafe_release_page(&self, tid: TransactionId, pid: HeapPageId) {
        self.lock_manager.release_lock(pid, tid);
    }

    /// Commits or aborts `tid`: flushes (commit) or reverts (abort) every
    /// page it holds, then releases all of its locks unconditionally.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) {
        let pages = self.lock_manager.pages_locked_by(tid);
        for pid in pages {
            let page = {
                let id_to_page = self.id_to_page.read().unwrap();
                id_to_page.get(&pid).cloned()
            };
            let Some(page) = page else { continue };

            if commit {
                if let Err(e) = self.flush_page_handle(&pid, &page) {
                    error!("failed to flush {:?} on commit: {}", pid, e);
                }
            } else {
                match self.revert_page(&pid) {
                    Ok(fresh) => {
                        let mut id_to_page = self.id_to_page.write().unwrap();
                        id_to_page.insert(pid, Arc::new(RwLock::new(fresh)));
                        self.clock.lock().unwrap().touch(pid);
                    }
                    Err(e) => error!("failed to revert {:?} on abort: {}", pid, e),
                }
            }
        }
        self.lock_manager.release_all(tid);
    }

    fn revert_page(&self, pid: &HeapPageId) -> Result<HeapPage> {
        let db = database::get_global_db();
        let catalog = db.get_catalog();
        let table = catalog
            .get_table_from_id(pid.get_table_id())
            .ok_or_else(|| DbError::exception(format!("unknown table {}", pid.get_table_id())))?;
        table.read_page(pid)
    }

    fn flush_page_handle(&self, pid: &HeapPageId, page: &Arc<RwLock<HeapPage>>) -> Result<()> {
        let dirty = page.read().unwrap().is_dirty();
        if !dirty {
            return Ok(());
        }
        let db = database::get_global_db();
        let catalog = db.get_catalog();
        let table = catalog
            .get_table_from_id(pid.get_table_id())
            .ok_or_else(|| DbError::exception(format!("unknown table {}", pid.get_table_id())))?;
        let mut guard = page.write().unwrap();
        table.write_page(&guard)?;
        guard.mark_clean();
        guard.set_before_image();
        Ok(())
    }

    pub fn flush_page(&self, pid: &HeapPageId) -> Result<()> {
        let page = {
            let id_to_page = self.id_to_page.read().unwrap();
            id_to_page.get(pid).cloned()
        };
        match page {
            Some(page) => self.flush_page_handle(pid, &page),
            None => Ok(()),
        }
    }

    pub fn flush_all_pages(&self) -> Result<()> {
        let pids: Vec<HeapPageId> = self.id_to_page.read().unwrap().keys().copied().collect();
        for pid in pids {
            self.flush_page(&pid)?;
        }
        Ok(())
    }

    pub fn flush_pages(&self, tid: TransactionId) -> Result<()> {
        let pids = self.lock_manager.pages_locked_by(tid);
        for pid in pids {
            self.flush_page(&pid)?;
        }
        Ok(())
    }

    /// Drops `pid` from the cache and clock ring without flushing.
    pub fn discard_page(&self, pid: &HeapPageId) {
        self.id_to_page.write().unwrap().remove(pid);
        self.clock.lock().unwrap().forget(pid);
    }

    pub fn get_num_pages(&self) -> usize {
        self.num_pages
    }

    pub fn num_cached_pages(&self) -> usize {
        self.id_to_page.read().unwrap().len()
    }

    /// Whether `pid` currently has a cached page, independent of any
    /// lock held on it.
    pub fn is_cached(&self, pid: HeapPageId) -> bool {
        self.id_to_page.read().unwrap().contains_key(&pid)
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: HeapPageId) -> bool {
        self.lock_manager.holds_lock(tid, pid)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::TupleDesc;
    use crate::types::Type;
    use tempfile::NamedTempFile;

    fn td() -> TupleDesc {
        TupleDesc::new(vec![Type::IntType], vec!["a".to_string()])
    }

    #[test]
    fn evicting_all_dirty_cache_fails_with_db_exception() {
        let bp = BufferPool::with_capacity(1);
        let f1 = NamedTempFile::new().unwrap();
        let pid1 = HeapPageId::new(1, 0);
        let page1 = HeapPage::new(pid1, vec![0u8; config::page_size()], td()).unwrap();
        bp.install_page(pid1, page1).unwrap();
        {
            let id_to_page = bp.id_to_page.read().unwrap();
            id_to_page
                .get(&pid1)
                .unwrap()
                .write()
                .unwrap()
                .mark_dirty(true, TransactionId::new());
        }
        let pid2 = HeapPageId::new(2, 0);
        let page2 = HeapPage::new(pid2, vec![0u8; config::page_size()], td()).unwrap();
        let mut id_to_page = bp.id_to_page.write().unwrap();
        let result = bp.evict_one(&mut id_to_page);
        assert!(result.is_err());
        drop(id_to_page);
        drop(page2);
        drop(f1);
    }

    #[test]
    fn num_cached_pages_reflects_installs() {
        let bp = BufferPool::with_capacity(2);
        let pid = HeapPageId::new(1, 0);
        let page = HeapPage::new(pid, vec![0u8; config::page_size()], td()).unwrap();
        bp.install_page(pid, page).unwrap();
        assert_eq!(bp.num_cached_pages(), 1);
    }

    #[test]
    fn discard_then_reinstall_does_not_duplicate_ring_entry() {
        let bp = BufferPool::with_capacity(2);
        let pid = HeapPageId::new(1, 0);
        let page = || HeapPage::new(pid, vec![0u8; config::page_size()], td()).unwrap();
        bp.install_page(pid, page()).unwrap();
        bp.discard_page(&pid);
        bp.install_page(pid, page()).unwrap();

        let clock = bp.clock.lock().unwrap();
        assert_eq!(clock.ring.iter().filter(|&&p| p == pid).count(), 1);
    }
}
