use crate::config;
use crate::database;
use crate::error::{DbError, Result};
use crate::heap_page::{HeapPage, HeapPageId, Permission};
use crate::transaction::TransactionId;
use crate::tuple::{Tuple, TupleDesc};

use std::collections::hash_map::DefaultHasher;
use std::fs::{File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use log::debug;

/// A table stored as a contiguous file of page-size chunks on disk. A
/// heap file's identity is the hash of its absolute path.
pub struct HeapFile {
    file: Mutex<File>,
    td: TupleDesc,
    id: usize,
    path: PathBuf,
}

fn hash_path(path: &Path) -> usize {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish() as usize
}

impl HeapFile {
    /// Opens (creating if necessary) the backing file at `path`.
    pub fn new(path: impl AsRef<Path>, td: TupleDesc) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        let absolute = path
            .canonicalize()
            .unwrap_or_else(|_| std::env::current_dir().unwrap_or_default().join(path));
        let id = hash_path(&absolute);
        Ok(HeapFile {
            file: Mutex::new(file),
            td,
            id,
            path: absolute,
        })
    }

    pub fn get_id(&self) -> usize {
        self.id
    }

    pub fn get_path(&self) -> &Path {
        &self.path
    }

    pub fn get_tuple_desc(&self) -> &TupleDesc {
        &self.td
    }

    pub fn num_pages(&self) -> usize {
        let file = self.file.lock().unwrap();
        let page_size = config::page_size();
        let len = file.metadata().map(|m| m.len()).unwrap_or(0) as usize;
        (len + page_size - 1) / page_size
    }

    /// Reads page `pid` from disk. Fails with `DbException` if the page
    /// does not exist yet.
    pub fn read_page(&self, pid: &HeapPageId) -> Result<HeapPage> {
        let page_size = config::page_size();
        let mut file = self.file.lock().unwrap();
        let len = file.metadata()?.len();
        let offset = (pid.get_page_number() * page_size) as u64;
        if offset >= len {
            return Err(DbError::exception(format!(
                "page {} does not exist in table {}",
                pid.get_page_number(),
                pid.get_table_id()
            )));
        }
        file.seek(SeekFrom::Start(offset))?;
        let mut data = vec![0u8; page_size];
        file.read_exact(&mut data)?;
        HeapPage::new(*pid, data, self.td.clone())
    }

    /// Writes `page` to disk, extending the file if its page number is
    /// beyond the current end.
    pub fn write_page(&self, page: &HeapPage) -> Result<()> {
        let page_size = config::page_size();
        let pid = page.get_id();
        let data = page.get_page_data();
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((pid.get_page_number() * page_size) as u64))?;
        file.write_all(&data)?;
        file.flush()?;
        Ok(())
    }

    fn append_empty_page(&self) -> Result<usize> {
        let page_size = config::page_size();
        let page_no = self.num_pages();
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((page_no * page_size) as u64))?;
        file.write_all(&vec![0u8; page_size])?;
        file.flush()?;
        Ok(page_no)
    }

    /// Finds the first page with room (read-lock, then upgrade to a
    /// write-lock to insert) or appends a new page if none have room.
    /// Returns the pages that were modified.
    pub fn add_tuple(
        &self,
        tid: TransactionId,
        tuple: Tuple,
    ) -> Result<Vec<Arc<RwLock<HeapPage>>>> {
        let table_id = self.get_id();
        let db = database::get_global_db();
        let bp = db.get_buffer_pool();

        let mut page_no = 0;
        loop {
            if page_no >= self.num_pages() {
                let new_page_no = self.append_empty_page()?;
                let pid = HeapPageId::new(table_id, new_page_no);
                let page = bp.get_page(tid, pid, Permission::Write)?;
                {
                    let mut page_writer = page.write().unwrap();
                    page_writer.add_tuple(tuple)?;
                    page_writer.mark_dirty(true, tid);
                }
                debug!("table {} grew to {} pages", table_id, new_page_no + 1);
                return Ok(vec![page]);
            }

            let pid = HeapPageId::new(table_id, page_no);
            let page = bp.get_page(tid, pid, Permission::Read)?;
            let has_room = page.read().unwrap().get_num_empty_slots() > 0;
            if has_room {
                let page = bp.get_page(tid, pid, Permission::Write)?;
                {
                    let mut page_writer = page.write().unwrap();
                    page_writer.add_tuple(tuple)?;
                    page_writer.mark_dirty(true, tid);
                }
                return Ok(vec![page]);
            }
            page_no += 1;
        }
    }

    /// Deletes the tuple named by its record id, fetched with a write lock.
    pub fn delete_tuple(
        &self,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<Arc<RwLock<HeapPage>>>> {
        let db = database::get_global_db();
        let bp = db.get_buffer_pool();
        let rid = tuple.get_record_id();
        let pid = rid.get_page_id();
        let page = bp.get_page(tid, pid, Permission::Write)?;
        {
            let mut page_writer = page.write().unwrap();
            page_writer.delete_tuple(tuple)?;
            page_writer.mark_dirty(true, tid);
        }
        Ok(vec![page])
    }

    /// A lazy, restartable, not-thread-safe iterator over every tuple in
    /// the file, routed through the buffer pool with read-lock mode.
    pub fn iterator(&self, tid: TransactionId) -> HeapFileIterator<'_> {
        HeapFileIterator::new(self, tid)
    }
}

pub struct HeapFileIterator<'a> {
    file: &'a HeapFile,
    tid: TransactionId,
    opened: bool,
    page_no: usize,
    current: Option<std::vec::IntoIter<Tuple>>,
    next_tuple: Option<Tuple>,
}

impl<'a> HeapFileIterator<'a> {
    fn new(file: &'a HeapFile, tid: TransactionId) -> Self {
        HeapFileIterator {
            file,
            tid,
            opened: false,
            page_no: 0,
            current: None,
            next_tuple: None,
        }
    }

    pub fn open(&mut self) -> Result<()> {
        self.page_no = 0;
        self.current = None;
        self.next_tuple = None;
        self.opened = true;
        self.advance()
    }

    fn advance(&mut self) -> Result<()> {
        loop {
            if let Some(iter) = self.current.as_mut() {
                if let Some(t) = iter.next() {
                    self.next_tuple = Some(t);
                    return Ok(());
                }
            }
            if self.page_no >= self.file.num_pages() {
                self.next_tuple = None;
                return Ok(());
            }
            let pid = HeapPageId::new(self.file.get_id(), self.page_no);
            let db = database::get_global_db();
            let bp = db.get_buffer_pool();
            let page = bp.get_page(self.tid, pid, Permission::Read)?;
            let tuples: Vec<Tuple> = page.read().unwrap().iter().cloned().collect();
            self.current = Some(tuples.into_iter());
            self.page_no += 1;
        }
    }

    /// Idempotent: repeated calls without an intervening `next` keep
    /// returning the same answer because the next tuple is prefetched.
    pub fn has_next(&self) -> bool {
        self.opened && self.next_tuple.is_some()
    }

    pub fn next(&mut self) -> Result<Option<Tuple>> {
        if !self.opened {
            return Ok(None);
        }
        let t = self.next_tuple.take();
        if t.is_some() {
            self.advance()?;
        }
        Ok(t)
    }

    /// Subsequent `has_next` calls return false until `open`/`rewind`.
    pub fn close(&mut self) {
        self.opened = false;
        self.current = None;
        self.next_tuple = None;
    }

    pub fn rewind(&mut self) -> Result<()> {
        self.close();
        self.open()
    }
}
