//! Pull-based query operators. Every operator implements `OpIterator`:
//! `open` primes the first result, `has_next`/`next` drain it lazily,
//! `close` releases any held state, and `rewind` restarts from scratch.
//! None of these are thread-safe — each is meant for use by a single
//! transaction's single thread of control, matching the heap file
//! iterator they are built on.

use std::sync::Arc;

use crate::aggregator::{Aggregator, AggregateOp, IntAggregator, StringAggregator};
use crate::database;
use crate::error::Result;
use crate::fields::{FieldVal, IntField};
use crate::heap_file::HeapFile;
use crate::heap_page::{HeapPageId, Permission};
use crate::predicate::Predicate;
use crate::transaction::TransactionId;
use crate::tuple::{Tuple, TupleDesc};
use crate::types::Type;

pub trait OpIterator {
    fn open(&mut self) -> Result<()>;
    fn has_next(&mut self) -> Result<bool>;
    fn next(&mut self) -> Result<Option<Tuple>>;
    fn close(&mut self);
    fn rewind(&mut self) -> Result<()> {
        self.close();
        self.open()
    }
    fn get_tuple_desc(&self) -> &TupleDesc;
}

/// Leaf operator: every tuple of one table's heap file, fetched a page
/// at a time through the buffer pool under `Permission::Read`.
pub struct SeqScan {
    tid: TransactionId,
    file: Arc<HeapFile>,
    page_no: usize,
    current: Option<std::vec::IntoIter<Tuple>>,
    next_tuple: Option<Tuple>,
    opened: bool,
}

impl SeqScan {
    pub fn new(tid: TransactionId, file: Arc<HeapFile>) -> Self {
        SeqScan {
            tid,
            file,
            page_no: 0,
            current: None,
            next_tuple: None,
            opened: false,
        }
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
}

impl OpIterator for SeqScan {
    fn open(&mut self) -> Result<()> {
        self.page_no = 0;
        self.current = None;
        self.next_tuple = None;
        self.opened = true;
        self.advance()
    }

    fn has_next(&mut self) -> Result<bool> {
        Ok(self.opened && self.next_tuple.is_some())
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        if !self.opened {
            return Ok(None);
        }
        let t = self.next_tuple.take();
        if t.is_some() {
            self.advance()?;
        }
        Ok(t)
    }

    fn close(&mut self) {
        self.opened = false;
        self.current = None;
        self.next_tuple = None;
    }

    fn get_tuple_desc(&self) -> &TupleDesc {
        self.file.get_tuple_desc()
    }
}

/// Passes through only the child's tuples that satisfy `predicate`.
pub struct Filter {
    predicate: Predicate,
    child: Box<dyn OpIterator>,
    next_tuple: Option<Tuple>,
}

impl Filter {
    pub fn new(predicate: Predicate, child: Box<dyn OpIterator>) -> Self {
        Filter {
            predicate,
            child,
            next_tuple: None,
        }
    }

    fn advance(&mut self) -> Result<()> {
        while self.child.has_next()? {
            if let Some(t) = self.child.next()? {
                if self.predicate.filter(&t) {
                    self.next_tuple = Some(t);
                    return Ok(());
                }
            }
        }
        self.next_tuple = None;
        Ok(())
    }
}

impl OpIterator for Filter {
    fn open(&mut self) -> Result<()> {
        self.child.open()?;
        self.advance()
    }

    fn has_next(&mut self) -> Result<bool> {
        Ok(self.next_tuple.is_some())
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        let t = self.next_tuple.take();
        if t.is_some() {
            self.advance()?;
        }
        Ok(t)
    }

    fn close(&mut self) {
        self.child.close();
        self.next_tuple = None;
    }

    fn get_tuple_desc(&self) -> &TupleDesc {
        self.child.get_tuple_desc()
    }
}

/// Nested-loop equi-join on one field from each side. The right child
/// is rewound once per left tuple, so it must be cheap to restart (a
/// `SeqScan` is, since it goes back through the buffer pool cache).
pub struct Join {
    left_field: usize,
    right_field: usize,
    left: Box<dyn OpIterator>,
    right: Box<dyn OpIterator>,
    current_left: Option<Tuple>,
    td: TupleDesc,
    next_tuple: Option<Tuple>,
}

impl Join {
    pub fn new(
        left_field: usize,
        right_field: usize,
        left: Box<dyn OpIterator>,
        right: Box<dyn OpIterator>,
    ) -> Self {
        let td = TupleDesc::combine(left.get_tuple_desc(), right.get_tuple_desc());
        Join {
            left_field,
            right_field,
            left,
            right,
            current_left: None,
            td,
            next_tuple: None,
        }
    }

    fn advance(&mut self) -> Result<()> {
        loop {
            if self.current_left.is_none() {
                if self.left.has_next()? {
                    self.current_left = self.left.next()?;
                    self.right.rewind()?;
                } else {
                    self.next_tuple = None;
                    return Ok(());
                }
            }
            let left_t = self.current_left.clone().unwrap();
            let mut matched = false;
            while self.right.has_next()? {
                let right_t = match self.right.next()? {
                    Some(t) => t,
                    None => break,
                };
                let lv = left_t.get_field(self.left_field);
                let rv = right_t.get_field(self.right_field);
                if lv.is_some() && lv == rv {
                    let fields: Vec<FieldVal> = left_t
                        .get_fields()
                        .into_iter()
                        .chain(right_t.get_fields())
                        .collect();
                    self.next_tuple = Some(Tuple::new(fields, &self.td));
                    matched = true;
                    break;
                }
            }
            if matched {
                return Ok(());
            }
            self.current_left = None;
        }
    }
}

impl OpIterator for Join {
    fn open(&mut self) -> Result<()> {
        self.left.open()?;
        self.right.open()?;
        self.current_left = None;
        self.advance()
    }

    fn has_next(&mut self) -> Result<bool> {
        Ok(self.next_tuple.is_some())
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        let t = self.next_tuple.take();
        if t.is_some() {
            self.advance()?;
        }
        Ok(t)
    }

    fn close(&mut self) {
        self.left.close();
        self.right.close();
        self.current_left = None;
        self.next_tuple = None;
    }

    fn get_tuple_desc(&self) -> &TupleDesc {
        &self.td
    }
}

/// Groups and aggregates the child's tuples. Buffers the full result
/// set at `open` time, since the aggregate can't be produced until
/// every input tuple has been seen.
pub struct Aggregate {
    child: Box<dyn OpIterator>,
    group_field: Option<usize>,
    agg_field: usize,
    op: AggregateOp,
    agg_field_type: Type,
    results: Vec<Tuple>,
    pos: usize,
    td: TupleDesc,
}

impl Aggregate {
    pub fn new(
        child: Box<dyn OpIterator>,
        group_field: Option<usize>,
        agg_field: usize,
        op: AggregateOp,
    ) -> Result<Self> {
        let agg_field_type = child
            .get_tuple_desc()
            .get_field_type(agg_field)
            .copied()
            .ok_or_else(|| crate::error::DbError::exception("aggregate field out of range"))?;
        let td = match group_field {
            Some(_) => TupleDesc::new(
                vec![Type::IntType, Type::IntType],
                vec!["group".to_string(), "aggregate".to_string()],
            ),
            None => TupleDesc::new(vec![Type::IntType], vec!["aggregate".to_string()]),
        };
        Ok(Aggregate {
            child,
            group_field,
            agg_field,
            op,
            agg_field_type,
            results: Vec::new(),
            pos: 0,
            td,
        })
    }
}

impl OpIterator for Aggregate {
    fn open(&mut self) -> Result<()> {
        self.child.open()?;
        let mut aggregator: Box<dyn Aggregator> = match self.agg_field_type {
            Type::IntType => Box::new(IntAggregator::new(self.group_field, self.agg_field, self.op)),
            Type::StringType(_) => {
                Box::new(StringAggregator::new(self.group_field, self.agg_field, self.op)?)
            }
        };
        while self.child.has_next()? {
            if let Some(t) = self.child.next()? {
                aggregator.merge(&t)?;
            }
        }
        self.results = aggregator.iterate();
        self.td = aggregator.get_tuple_desc();
        self.pos = 0;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        Ok(self.pos < self.results.len())
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        if self.pos >= self.results.len() {
            return Ok(None);
        }
        let t = self.results[self.pos].clone();
        self.pos += 1;
        Ok(Some(t))
    }

    fn close(&mut self) {
        self.child.close();
        self.results.clear();
        self.pos = 0;
    }

    fn get_tuple_desc(&self) -> &TupleDesc {
        &self.td
    }
}

fn count_tuple_desc() -> TupleDesc {
    TupleDesc::new(vec![Type::IntType], vec!["count".to_string()])
}

/// Drains the child, inserting every tuple it produces into `table_id`
/// under `tid`, then yields a single tuple holding the insert count.
pub struct Insert {
    tid: TransactionId,
    table_id: usize,
    child: Box<dyn OpIterator>,
    td: TupleDesc,
    result: Option<Tuple>,
    done: bool,
}

impl Insert {
    pub fn new(tid: TransactionId, table_id: usize, child: Box<dyn OpIterator>) -> Self {
        Insert {
            tid,
            table_id,
            child,
            td: count_tuple_desc(),
            result: None,
            done: false,
        }
    }
}

impl OpIterator for Insert {
    fn open(&mut self) -> Result<()> {
        self.child.open()?;
        let db = database::get_global_db();
        let bp = db.get_buffer_pool();
        let mut count = 0i32;
        while self.child.has_next()? {
            if let Some(t) = self.child.next()? {
                bp.insert_tuple(self.tid, self.table_id, t)?;
                count += 1;
            }
        }
        self.result = Some(Tuple::new(
            vec![FieldVal::IntField(IntField::new(count))],
            &self.td,
        ));
        self.done = false;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        Ok(!self.done && self.result.is_some())
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        Ok(self.result.take())
    }

    fn close(&mut self) {
        self.child.close();
        self.done = true;
        self.result = None;
    }

    fn get_tuple_desc(&self) -> &TupleDesc {
        &self.td
    }
}

/// Symmetric with `Insert`: deletes every tuple the child produces,
/// recovering each tuple's table from its own RecordId.
pub struct Delete {
    tid: TransactionId,
    child: Box<dyn OpIterator>,
    td: TupleDesc,
    result: Option<Tuple>,
    done: bool,
}

impl Delete {
    pub fn new(tid: TransactionId, child: Box<dyn OpIterator>) -> Self {
        Delete {
            tid,
            child,
            td: count_tuple_desc(),
            result: None,
            done: false,
        }
    }
}

impl OpIterator for Delete {
    fn open(&mut self) -> Result<()> {
        self.child.open()?;
        let db = database::get_global_db();
        let bp = db.get_buffer_pool();
        let mut count = 0i32;
        while self.child.has_next()? {
            if let Some(t) = self.child.next()? {
                bp.delete_tuple(self.tid, &t)?;
                count += 1;
            }
        }
        self.result = Some(Tuple::new(
            vec![FieldVal::IntField(IntField::new(count))],
            &self.td,
        ));
        self.done = false;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        Ok(!self.done && self.result.is_some())
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        Ok(self.result.take())
    }

    fn close(&mut self) {
        self.child.close();
        self.done = true;
        self.result = None;
    }

    fn get_tuple_desc(&self) -> &TupleDesc {
        &self.td
    }
}
