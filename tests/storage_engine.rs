use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rustic_db::buffer_pool::BufferPool;
use rustic_db::database;
use rustic_db::fields::{FieldVal, IntField};
use rustic_db::heap_file::HeapFile;
use rustic_db::heap_page::{HeapPageId, Permission};
use rustic_db::transaction::TransactionId;
use rustic_db::tuple::{Tuple, TupleDesc};
use rustic_db::types::Type;

// The engine is a process-global singleton (`database::get_global_db`), so
// tests in this binary that touch shared state must not interleave.
static SERIAL: Mutex<()> = Mutex::new(());

fn td() -> TupleDesc {
    TupleDesc::new(vec![Type::IntType], vec!["a".to_string()])
}

fn register_table(name: &str) -> Arc<HeapFile> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(format!("{name}.dat"));
    let file = HeapFile::new(path, td()).unwrap();
    let db = database::get_global_db();
    db.get_catalog().add_table(file, name.to_string());
    std::mem::forget(dir);
    db.get_catalog().get_table_from_name(name).unwrap()
}

fn one_field(v: i32) -> Tuple {
    Tuple::new(vec![FieldVal::IntField(IntField::new(v))], &td())
}

#[test]
fn single_row_round_trip() {
    let _guard = SERIAL.lock().unwrap();
    let table = register_table("single_row_round_trip");
    let db = database::get_global_db();
    let bp = db.get_buffer_pool();

    let t1 = TransactionId::new();
    bp.insert_tuple(t1, table.get_id(), one_field(42)).unwrap();
    bp.transaction_complete(t1, true);

    let t2 = TransactionId::new();
    let mut iter = table.iterator(t2);
    iter.open().unwrap();
    let mut rows = vec![];
    while let Some(t) = iter.next().unwrap() {
        rows.push(t);
    }
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get_field(0).unwrap().clone().into_int().unwrap().get_value(),
        42
    );
    bp.transaction_complete(t2, true);
}

#[test]
fn abort_discards_writes() {
    let _guard = SERIAL.lock().unwrap();
    let table = register_table("abort_discards_writes");
    let db = database::get_global_db();
    let bp = db.get_buffer_pool();

    let t1 = TransactionId::new();
    for v in [1, 2, 3] {
        bp.insert_tuple(t1, table.get_id(), one_field(v)).unwrap();
    }
    bp.transaction_complete(t1, false);

    let t2 = TransactionId::new();
    let mut iter = table.iterator(t2);
    iter.open().unwrap();
    assert!(iter.next().unwrap().is_none());
    bp.transaction_complete(t2, true);
}

#[test]
fn shared_reads_then_blocking_writer() {
    let _guard = SERIAL.lock().unwrap();
    let table = register_table("shared_reads_then_blocking_writer");
    let db = database::get_global_db();
    let bp = db.get_buffer_pool();
    let pid = HeapPageId::new(table.get_id(), 0);

    // Ensure the page exists on disk before concurrent readers touch it.
    let t0 = TransactionId::new();
    bp.insert_tuple(t0, table.get_id(), one_field(0)).unwrap();
    bp.transaction_complete(t0, true);

    let t1 = TransactionId::new();
    let t2 = TransactionId::new();
    bp.get_page(t1, pid, Permission::Read).unwrap();
    bp.get_page(t2, pid, Permission::Read).unwrap();
    assert!(bp.holds_lock(t1, pid));
    assert!(bp.holds_lock(t2, pid));

    let t3 = TransactionId::new();
    let handle = thread::spawn(move || {
        let db = database::get_global_db();
        db.get_buffer_pool().get_page(t3, pid, Permission::Write)
    });

    thread::sleep(Duration::from_millis(50));
    bp.transaction_complete(t1, true);
    bp.transaction_complete(t2, true);

    assert!(handle.join().unwrap().is_ok());
    assert!(bp.holds_lock(t3, pid));
    bp.transaction_complete(t3, true);
}

#[test]
fn deadlock_aborts_exactly_one_survivor_commits() {
    let _guard = SERIAL.lock().unwrap();
    let table_p = register_table("deadlock_p");
    let table_q = register_table("deadlock_q");
    let db = database::get_global_db();
    let bp = db.get_buffer_pool();
    let pid_p = HeapPageId::new(table_p.get_id(), 0);
    let pid_q = HeapPageId::new(table_q.get_id(), 0);

    let t0 = TransactionId::new();
    bp.insert_tuple(t0, table_p.get_id(), one_field(0)).unwrap();
    bp.insert_tuple(t0, table_q.get_id(), one_field(0)).unwrap();
    bp.transaction_complete(t0, true);

    let t1 = TransactionId::new();
    let t2 = TransactionId::new();
    bp.get_page(t1, pid_p, Permission::Write).unwrap();
    bp.get_page(t2, pid_q, Permission::Write).unwrap();

    let handle = thread::spawn(move || {
        let db = database::get_global_db();
        let bp = db.get_buffer_pool();
        let r = bp.get_page(t1, pid_q, Permission::Write);
        if r.is_err() {
            bp.transaction_complete(t1, false);
        }
        r.is_ok()
    });

    thread::sleep(Duration::from_millis(100));
    let r2 = bp.get_page(t2, pid_p, Permission::Write);
    let t2_survived = r2.is_ok();
    if !t2_survived {
        bp.transaction_complete(t2, false);
    }

    let t1_survived = handle.join().unwrap();
    assert_ne!(t1_survived, t2_survived);

    let survivor = if t1_survived { t1 } else { t2 };
    bp.transaction_complete(survivor, true);
}

#[test]
fn clock_eviction_keeps_second_chance_pages() {
    let _guard = SERIAL.lock().unwrap();
    // One tuple per page, so 4 inserts produce 4 distinct pages.
    rustic_db::config::set_page_size(8);
    let table = register_table("clock_eviction");
    let pool = BufferPool::with_capacity(3);
    let tid = TransactionId::new();

    {
        let db = database::get_global_db();
        let gbp = db.get_buffer_pool();
        for i in 0..4 {
            gbp.insert_tuple(tid, table.get_id(), one_field(i)).unwrap();
        }
        gbp.transaction_complete(tid, true);
    }

    let tid = TransactionId::new();
    let pid_a = HeapPageId::new(table.get_id(), 0);
    let pid_b = HeapPageId::new(table.get_id(), 1);
    let pid_c = HeapPageId::new(table.get_id(), 2);
    let pid_d = HeapPageId::new(table.get_id(), 3);

    pool.get_page(tid, pid_a, Permission::Read).unwrap();
    pool.get_page(tid, pid_b, Permission::Read).unwrap();
    pool.get_page(tid, pid_c, Permission::Read).unwrap();
    pool.get_page(tid, pid_a, Permission::Read).unwrap();
    pool.get_page(tid, pid_d, Permission::Read).unwrap();

    // tid holds S locks on all four pages throughout (strict 2PL never
    // releases them), so only cache membership distinguishes the victim:
    // B is the one evicted, per the walkthrough in DESIGN.md.
    assert_eq!(pool.num_cached_pages(), 3);
    assert!(pool.is_cached(pid_a));
    assert!(!pool.is_cached(pid_b));
    assert!(pool.is_cached(pid_c));
    assert!(pool.is_cached(pid_d));

    rustic_db::config::reset_page_size();
}

#[test]
fn no_steal_exhausts_eviction_candidates() {
    let _guard = SERIAL.lock().unwrap();
    rustic_db::config::set_page_size(8);
    let table_a = register_table("no_steal_a");
    let table_b = register_table("no_steal_b");
    let table_c = register_table("no_steal_c");
    let pool = BufferPool::with_capacity(2);

    let t0 = TransactionId::new();
    {
        let db = database::get_global_db();
        let gbp = db.get_buffer_pool();
        gbp.insert_tuple(t0, table_a.get_id(), one_field(0)).unwrap();
        gbp.insert_tuple(t0, table_b.get_id(), one_field(1)).unwrap();
        gbp.insert_tuple(t0, table_c.get_id(), one_field(2)).unwrap();
        gbp.transaction_complete(t0, true);
    }

    let tid = TransactionId::new();
    let pid_a = HeapPageId::new(table_a.get_id(), 0);
    let pid_b = HeapPageId::new(table_b.get_id(), 0);
    let pid_c = HeapPageId::new(table_c.get_id(), 0);

    let page_a = pool.get_page(tid, pid_a, Permission::Write).unwrap();
    page_a.write().unwrap().mark_dirty(true, tid);
    let page_b = pool.get_page(tid, pid_b, Permission::Write).unwrap();
    page_b.write().unwrap().mark_dirty(true, tid);

    // Both cached pages are dirty; a third distinct page has nowhere to land.
    let result = pool.get_page(tid, pid_c, Permission::Read);
    assert!(result.is_err());

    rustic_db::config::reset_page_size();
}
