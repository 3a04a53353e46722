use crate::config;
use crate::error::{DbError, Result};
use crate::transaction::TransactionId;
use crate::tuple::{RecordId, Tuple, TupleDesc};

#[derive(Debug, PartialEq, Eq, Clone, Hash, Copy)]
pub enum Permission {
    Read,
    Write,
}

/// Representation of page id which just includes table id and page number
#[derive(Debug, PartialEq, Eq, Clone, Hash, Copy)]
pub struct HeapPageId {
    table_id: usize,
    page_number: usize,
}

impl HeapPageId {
    pub fn new(table_id: usize, page_number: usize) -> Self {
        HeapPageId {
            table_id,
            page_number,
        }
    }

    pub fn get_table_id(&self) -> usize {
        self.table_id
    }

    pub fn get_page_number(&self) -> usize {
        self.page_number
    }

    pub fn serialize(&self) -> Vec<usize> {
        vec![self.table_id, self.page_number]
    }
}

/**
 * Representation for a set of bytes of data read from disk.
 * Format is header bytes + tuple bytes. Header bytes indicate
 * whether or not a tuple is present in that slot on the page.
 * The number of bytes for header is equal to ceiling(# tuple slots / 8)
 */
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct HeapPage {
    pid: HeapPageId,
    td: TupleDesc,
    header_size: usize,
    header: Vec<u8>,
    tuples: Vec<Tuple>,
    num_slots: usize,
    before_image: Vec<u8>,
    dirtied_by: Option<TransactionId>,
}

impl HeapPage {
    pub fn num_slots_for(page_size: usize, tuple_size: usize) -> usize {
        (page_size * 8) / (tuple_size * 8 + 1)
    }

    pub fn header_size_for(num_slots: usize) -> usize {
        (num_slots + 7) / 8
    }

    pub fn new(pid: HeapPageId, data: Vec<u8>, td: TupleDesc) -> Result<Self> {
        let page_size = config::page_size();
        if data.len() != page_size {
            return Err(DbError::exception(format!(
                "page data has {} bytes, expected {}",
                data.len(),
                page_size
            )));
        }
        let num_slots = Self::num_slots_for(page_size, td.get_size());
        let header_size = Self::header_size_for(num_slots);
        let header = data[..header_size].to_vec();

        let mut tuples = Vec::with_capacity(num_slots);
        for i in 0..num_slots {
            if Self::get_slot(&header, i) {
                let start = header_size + i * td.get_size();
                let end = start + td.get_size();
                let mut tuple = Tuple::deserialize(&data[start..end], &td)?;
                tuple.set_record_id(RecordId::new(pid, i));
                tuples.push(tuple);
            } else {
                tuples.push(Tuple::new(vec![], &td));
            }
        }

        Ok(HeapPage {
            pid,
            td,
            header_size,
            header,
            tuples,
            num_slots,
            before_image: data,
            dirtied_by: None,
        })
    }

    pub fn get_id(&self) -> HeapPageId {
        self.pid
    }

    /// The page's on-disk contents as of the last read or clean-mark,
    /// used to revert an aborted transaction's writes.
    pub fn get_before_image(&self) -> Result<HeapPage> {
        HeapPage::new(self.pid, self.before_image.clone(), self.td.clone())
    }

    pub fn set_before_image(&mut self) {
        self.before_image = self.get_page_data();
    }

    /// Serializes this page to exactly `page_size` bytes. Empty slots are
    /// zero-filled; the round trip is bit-exact for occupied slots.
    pub fn get_page_data(&self) -> Vec<u8> {
        let mut data = self.header.clone();
        data.resize(self.header_size, 0);
        for i in 0..self.num_slots {
            if Self::get_slot(&self.header, i) {
                data.extend(self.tuples[i].serialize());
            } else {
                data.extend(vec![0; self.td.get_size()]);
            }
        }
        // pad the rest of the page with 0s
        let page_size = config::page_size();
        if data.len() < page_size {
            data.extend(vec![0; page_size - data.len()]);
        }
        data
    }

    fn get_slot(header: &[u8], i: usize) -> bool {
        let idx = i / 8;
        let bit = i % 8;
        if idx >= header.len() {
            return false;
        }
        let byte = header[idx];
        let mask = 1 << bit;
        byte & mask != 0
    }

    fn set_slot(header: &mut [u8], i: usize, value: bool) {
        let idx = i / 8;
        let bit = i % 8;
        let byte = header[idx];
        let mask = 1 << bit;
        if value {
            header[idx] = byte | mask;
        } else {
            header[idx] = byte & !mask;
        }
    }

    /// Inserts `t` into the lowest-indexed empty slot and stamps its
    /// record id to (this page, slot). Fails if the page is full.
    pub fn add_tuple(&mut self, mut t: Tuple) -> Result<()> {
        if t.get_tuple_desc() != &self.td {
            return Err(DbError::exception("tuple descriptor does not match page"));
        }
        for i in 0..self.num_slots {
            if !Self::get_slot(&self.header, i) {
                t.set_record_id(RecordId::new(self.pid, i));
                self.tuples[i] = t;
                Self::set_slot(&mut self.header, i, true);
                return Ok(());
            }
        }
        Err(DbError::exception("no empty slots"))
    }

    /// Deletes the tuple named by `t`'s record id.
    pub fn delete_tuple(&mut self, t: &Tuple) -> Result<()> {
        let rid = t.get_record_id();
        let slot = rid.get_tuple_no();
        if rid.get_page_id() != self.pid {
            return Err(DbError::exception("tuple is not on this page"));
        }
        if slot >= self.num_slots || !Self::get_slot(&self.header, slot) {
            return Err(DbError::exception("slot is already empty"));
        }
        self.tuples[slot] = Tuple::new(vec![], &self.td);
        Self::set_slot(&mut self.header, slot, false);
        Ok(())
    }

    pub fn get_num_empty_slots(&self) -> usize {
        (0..self.num_slots)
            .filter(|&i| !Self::get_slot(&self.header, i))
            .count()
    }

    pub fn slot_occupied(&self, i: usize) -> bool {
        Self::get_slot(&self.header, i)
    }

    pub fn mark_dirty(&mut self, dirty: bool, tid: TransactionId) {
        if dirty {
            self.dirtied_by = Some(tid);
        } else {
            self.dirtied_by = None;
        }
    }

    pub fn mark_clean(&mut self) {
        self.dirtied_by = None;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirtied_by.is_some()
    }

    pub fn dirty_by(&self) -> Option<TransactionId> {
        self.dirtied_by
    }

    /// A fresh, non-restartable iterator over occupied slots in slot
    /// order. Callers obtain a new iterator for each pass.
    pub fn iter(&self) -> HeapPageIterator {
        HeapPageIterator {
            page: self,
            index: 0,
        }
    }

    pub fn get_tuple(&self, i: usize) -> &Tuple {
        &self.tuples[i]
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }
}

pub struct HeapPageIterator<'a> {
    page: &'a HeapPage,
    index: usize,
}

impl<'a> Iterator for HeapPageIterator<'a> {
    type Item = &'a Tuple;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.page.num_slots {
            let i = self.index;
            self.index += 1;
            if HeapPage::get_slot(&self.page.header, i) {
                return Some(&self.page.tuples[i]);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldVal, IntField};

    fn td() -> TupleDesc {
        TupleDesc::new(vec![crate::types::Type::IntType], vec!["a".to_string()])
    }

    #[test]
    fn insert_then_serialize_round_trips() {
        let pid = HeapPageId::new(1, 0);
        let empty = vec![0u8; config::page_size()];
        let mut page = HeapPage::new(pid, empty, td()).unwrap();
        page.add_tuple(Tuple::new(vec![FieldVal::IntField(IntField::new(42))], &td()))
            .unwrap();
        let bytes = page.get_page_data();
        assert_eq!(bytes.len(), config::page_size());
        let page2 = HeapPage::new(pid, bytes, td()).unwrap();
        assert_eq!(page, page2);
        assert_eq!(page2.iter().count(), 1);
    }

    #[test]
    fn delete_requires_matching_page_and_occupied_slot() {
        let pid = HeapPageId::new(1, 0);
        let empty = vec![0u8; config::page_size()];
        let mut page = HeapPage::new(pid, empty, td()).unwrap();
        let t = Tuple::new(vec![FieldVal::IntField(IntField::new(1))], &td());
        page.add_tuple(t).unwrap();
        let stored = page.get_tuple(0).clone();

        let wrong_pid = HeapPageId::new(1, 1);
        let mut other = Tuple::new(vec![FieldVal::IntField(IntField::new(1))], &td());
        other.set_record_id(RecordId::new(wrong_pid, 0));
        assert!(page.delete_tuple(&other).is_err());

        page.delete_tuple(&stored).unwrap();
        assert!(page.delete_tuple(&stored).is_err());
    }

    #[test]
    fn empty_slot_count_tracks_occupancy() {
        let pid = HeapPageId::new(1, 0);
        let empty = vec![0u8; config::page_size()];
        let mut page = HeapPage::new(pid, empty, td()).unwrap();
        let total = page.num_slots();
        page.add_tuple(Tuple::new(vec![FieldVal::IntField(IntField::new(7))], &td()))
            .unwrap();
        assert_eq!(page.get_num_empty_slots(), total - 1);
    }
}
