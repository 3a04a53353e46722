use rustic_db::database;
use rustic_db::error::Result;
use rustic_db::fields::{FieldVal, IntField, StringField};
use rustic_db::logging;
use rustic_db::operator::{Insert, OpIterator, SeqScan};
use rustic_db::transaction::TransactionId;
use rustic_db::tuple::Tuple;

use std::thread;

fn main() -> Result<()> {
    logging::init();
    let db = database::get_global_db();

    let mut schema_file_path = std::env::current_dir().unwrap();
    schema_file_path.push("schemas.txt");
    db.get_catalog()
        .load_schema(schema_file_path.to_str().unwrap())?;

    let catalog = db.get_catalog();
    let table = catalog
        .get_table_from_name("employees")
        .expect("schemas.txt should declare an employees table");
    let table_id = table.get_id();
    let td = table.get_tuple_desc().clone();
    log::info!("table id: {}, schema: {:?}", table_id, td);

    // Insert a few rows concurrently, retrying on deadlock abort.
    let handles: Vec<_> = (0..3)
        .map(|_| {
            let td = td.clone();
            thread::spawn(move || -> Result<()> {
                loop {
                    let tid = TransactionId::new();
                    let db = database::get_global_db();
                    let rows: Vec<Tuple> = (0..3)
                        .map(|i| {
                            Tuple::new(
                                vec![
                                    FieldVal::IntField(IntField::new(i)),
                                    FieldVal::StringField(StringField::new(
                                        format!("Alice_{}", tid.get_tid()),
                                        16,
                                    )),
                                ],
                                &td,
                            )
                        })
                        .collect();
                    let source = Box::new(VecSource::new(rows, td.clone()));
                    let mut insert = Insert::new(tid, table_id, source);
                    let result = insert.open().and_then(|_| insert.next());
                    match result {
                        Ok(_) => {
                            db.get_buffer_pool().transaction_complete(tid, true);
                            return Ok(());
                        }
                        Err(e) if e.is_aborted() => {
                            db.get_buffer_pool().transaction_complete(tid, false);
                            log::warn!("transaction {:?} aborted, retrying", tid);
                            continue;
                        }
                        Err(e) => return Err(e),
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("writer thread panicked")?;
    }

    let tid = TransactionId::new();
    let mut scan = SeqScan::new(tid, table);
    scan.open()?;
    let mut count = 0;
    while scan.has_next()? {
        if let Some(t) = scan.next()? {
            println!("tuple: {}", t);
            count += 1;
        }
    }
    db.get_buffer_pool().transaction_complete(tid, true);
    println!("tuple count: {}", count);

    Ok(())
}

/// A fixed in-memory `OpIterator` feeding pre-built tuples into an
/// `Insert`, standing in for a real parser/planner front end.
struct VecSource {
    rows: Vec<Tuple>,
    pos: usize,
    td: rustic_db::tuple::TupleDesc,
}

impl VecSource {
    fn new(rows: Vec<Tuple>, td: rustic_db::tuple::TupleDesc) -> Self {
        VecSource { rows, pos: 0, td }
    }
}

impl OpIterator for VecSource {
    fn open(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }
    fn has_next(&mut self) -> Result<bool> {
        Ok(self.pos < self.rows.len())
    }
    fn next(&mut self) -> Result<Option<Tuple>> {
        if self.pos >= self.rows.len() {
            return Ok(None);
        }
        let t = self.rows[self.pos].clone();
        self.pos += 1;
        Ok(Some(t))
    }
    fn close(&mut self) {
        self.pos = self.rows.len();
    }
    fn get_tuple_desc(&self) -> &rustic_db::tuple::TupleDesc {
        &self.td
    }
}
