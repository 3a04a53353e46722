use crate::error::{DbError, Result};
use crate::heap_file::HeapFile;
use crate::tuple::TupleDesc;
use crate::types::{Type, DEFAULT_STRING_LEN};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::{Arc, RwLock};

pub struct Catalog {
    // maps table name to table
    tables: RwLock<HashMap<String, Arc<HeapFile>>>,
    // maps table id to table
    table_ids: RwLock<HashMap<usize, Arc<HeapFile>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog {
            tables: RwLock::new(HashMap::new()),
            table_ids: RwLock::new(HashMap::new()),
        }
    }

    pub fn add_table(&self, file: HeapFile, name: String) {
        let mut tables = self.tables.write().unwrap();
        let file_id = file.get_id();
        tables.insert(name.clone(), Arc::new(file));
        let mut table_ids = self.table_ids.write().unwrap();
        table_ids.insert(file_id, Arc::clone(tables.get(&name).unwrap()));
    }

    // Retrieves the table with the specified name
    pub fn get_table_from_name(&self, name: &str) -> Option<Arc<HeapFile>> {
        let tables = self.tables.read().unwrap();
        tables.get(name).map(Arc::clone)
    }

    // Retrieves the table with the specified id
    pub fn get_table_from_id(&self, id: usize) -> Option<Arc<HeapFile>> {
        let table_ids = self.table_ids.read().unwrap();
        table_ids.get(&id).map(Arc::clone)
    }

    // Retrieves the tuple descriptor for the specified table
    pub fn get_tuple_desc(&self, table_id: usize) -> Option<TupleDesc> {
        let table = self.get_table_from_id(table_id);
        table.map(|t| t.get_tuple_desc().clone())
    }

    /// Loads a schema file of lines like `name (a: Int, b: String(32))`
    /// and opens/creates a `data/<name>.dat` heap file for each table.
    /// A bare `String` field defaults to `DEFAULT_STRING_LEN` bytes.
    pub fn load_schema(&self, schema_file_path: &str) -> Result<()> {
        let schema_file = File::open(schema_file_path)?;
        let reader = BufReader::new(schema_file);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let open = line
                .find('(')
                .ok_or_else(|| DbError::exception(format!("malformed schema line: {}", line)))?;
            let table_name = line[..open].to_string().replace(' ', "");
            let fields_str = line[open + 1..].trim_end().trim_end_matches(')');
            let fields: Vec<&str> = fields_str.split(',').collect();

            let mut field_types = vec![];
            let mut field_names = vec![];
            for field in fields.iter() {
                let field: Vec<&str> = field.split(':').collect();
                let field_name = field[0].to_string().replace(' ', "");
                let field_type = field[1].to_string().replace(' ', "");
                let field_type = parse_field_type(&field_type)?;
                field_names.push(field_name);
                field_types.push(field_type);
            }

            std::fs::create_dir_all("data")?;
            let path = format!("data/{}.dat", table_name);
            let heap_file = HeapFile::new(path, TupleDesc::new(field_types, field_names))?;
            self.add_table(heap_file, table_name);
        }
        Ok(())
    }
}

fn parse_field_type(spec: &str) -> Result<Type> {
    if spec == "Int" {
        return Ok(Type::IntType);
    }
    if let Some(len) = spec.strip_prefix("String").and_then(|rest| {
        let rest = rest.trim_start_matches('(').trim_end_matches(')');
        rest.parse::<usize>().ok()
    }) {
        return Ok(Type::StringType(len));
    }
    if spec == "String" {
        return Ok(Type::StringType(DEFAULT_STRING_LEN));
    }
    Err(DbError::exception(format!("invalid field type: {}", spec)))
}
