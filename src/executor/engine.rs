//! Query executor for keystone
//!
//! The engine owns the process-wide state: the data root directory, the
//! current database and its catalog, and the open index handles. It parses
//! and executes statements one at a time in submission order; the only
//! state carried across statements is the current database.
//!
//! Every error is converted into the result envelope at this boundary;
//! nothing escapes `execute` as a panic or an `Err`.

use super::filter;
use crate::catalog::{Catalog, Column, ColumnType, TableSchema};
use crate::error::{Error, Result};
use crate::sql::ast::*;
use crate::sql::parser::Parser;
use crate::storage::btree::BPlusTree;
use crate::storage::field::pad_char;
use crate::storage::heap::{self, Rewrite};
use crate::storage::value::{FieldValue, Record};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What kind of statement produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueryKind {
    CreateDatabase,
    DropDatabase,
    UseDatabase,
    ShowDatabases,
    ShowTables,
    CreateTable,
    DropTable,
    Insert,
    Select,
    Update,
    Delete,
    /// The statement never parsed far enough to tell
    Unknown,
}

impl QueryKind {
    fn of(statement: &Statement) -> Self {
        match statement {
            Statement::CreateDatabase { .. } => QueryKind::CreateDatabase,
            Statement::DropDatabase { .. } => QueryKind::DropDatabase,
            Statement::UseDatabase { .. } => QueryKind::UseDatabase,
            Statement::ShowDatabases => QueryKind::ShowDatabases,
            Statement::ShowTables => QueryKind::ShowTables,
            Statement::CreateTable(_) => QueryKind::CreateTable,
            Statement::DropTable { .. } => QueryKind::DropTable,
            Statement::Insert(_) => QueryKind::Insert,
            Statement::Select(_) => QueryKind::Select,
            Statement::Update(_) => QueryKind::Update,
            Statement::Delete(_) => QueryKind::Delete,
        }
    }
}

/// Result envelope returned for every executed input
#[derive(Debug, Serialize)]
pub struct QueryResult {
    /// Kind of the statement this result belongs to
    pub kind: QueryKind,
    /// Column names of the result rows, in projection order
    pub columns: Vec<String>,
    /// Result rows
    pub rows: Vec<Record>,
    /// Rows found (SELECT) or affected (INSERT/UPDATE/DELETE)
    pub records_found: usize,
    /// Empty iff the statement succeeded
    pub error_message: String,
}

impl QueryResult {
    fn new(kind: QueryKind) -> Self {
        Self {
            kind,
            columns: Vec::new(),
            rows: Vec::new(),
            records_found: 0,
            error_message: String::new(),
        }
    }

    fn with_rows(kind: QueryKind, columns: Vec<String>, rows: Vec<Record>) -> Self {
        let records_found = rows.len();
        Self {
            kind,
            columns,
            rows,
            records_found,
            error_message: String::new(),
        }
    }

    fn error(kind: QueryKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            columns: Vec::new(),
            rows: Vec::new(),
            records_found: 0,
            error_message: message.into(),
        }
    }

    /// True iff the statement succeeded
    pub fn success(&self) -> bool {
        self.error_message.is_empty()
    }
}

/// The database engine: single-threaded, synchronous statement execution
/// against one data root directory.
pub struct Engine {
    /// Directory hosting one subdirectory per database
    data_root: PathBuf,
    /// Currently selected database, set by USE
    current_database: Option<String>,
    /// Catalog of the current database
    catalog: Catalog,
    /// Open index handles by table name, created lazily and dropped when
    /// the database is unmounted
    indexes: HashMap<String, BPlusTree>,
}

impl Engine {
    /// Create an engine rooted at `data_root`, creating the directory if
    /// needed. No database is selected initially.
    pub fn new(data_root: impl AsRef<Path>) -> Result<Self> {
        let data_root = data_root.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_root)?;
        Ok(Self {
            data_root,
            current_database: None,
            catalog: Catalog::new(),
            indexes: HashMap::new(),
        })
    }

    /// Execute one or more `;`-separated statements.
    ///
    /// Statements run in order; execution stops at the first hard error.
    /// The returned envelope reflects the last executed statement (or the
    /// failing one), with `error_message` empty iff it succeeded.
    pub fn execute(&mut self, sql: &str) -> QueryResult {
        let mut parser = match Parser::new(sql) {
            Ok(parser) => parser,
            Err(e) => return QueryResult::error(QueryKind::Unknown, e.to_string()),
        };

        let mut result = QueryResult::new(QueryKind::Unknown);
        loop {
            match parser.parse_statement(&self.catalog) {
                Ok(Some(statement)) => {
                    let kind = QueryKind::of(&statement);
                    debug!(?kind, "executing statement");
                    match self.execute_statement(statement) {
                        Ok(r) => result = r,
                        Err(e) => return QueryResult::error(kind, e.to_string()),
                    }
                }
                Ok(None) => break,
                Err(e) => return QueryResult::error(QueryKind::Unknown, e.to_string()),
            }
        }
        result
    }

    /// Name of the currently selected database
    pub fn current_database(&self) -> Option<&str> {
        self.current_database.as_deref()
    }

    /// All databases under the data root, sorted by name
    pub fn list_databases(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.data_root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Tables of the current database, in creation order
    pub fn list_tables(&self) -> Vec<String> {
        self.catalog.list_tables()
    }

    /// Schema of a table in the current database
    pub fn table_schema(&self, name: &str) -> Result<&TableSchema> {
        self.catalog.get_table_schema(name)
    }

    // ========== Statement dispatch ==========

    fn execute_statement(&mut self, statement: Statement) -> Result<QueryResult> {
        match statement {
            Statement::CreateDatabase { name } => self.execute_create_database(&name),
            Statement::DropDatabase { name } => self.execute_drop_database(&name),
            Statement::UseDatabase { name } => self.execute_use_database(&name),
            Statement::ShowDatabases => self.execute_show_databases(),
            Statement::ShowTables => self.execute_show_tables(),
            Statement::CreateTable(create) => self.execute_create_table(create),
            Statement::DropTable { name } => self.execute_drop_table(&name),
            Statement::Insert(insert) => self.execute_insert(insert),
            Statement::Select(select) => self.execute_select(select),
            Statement::Update(update) => self.execute_update(update),
            Statement::Delete(delete) => self.execute_delete(delete),
        }
    }

    // ========== Databases ==========

    fn execute_create_database(&mut self, name: &str) -> Result<QueryResult> {
        let dir = self.data_root.join(name);
        if dir.exists() {
            return Err(Error::DatabaseAlreadyExists(name.to_string()));
        }
        std::fs::create_dir_all(&dir)?;
        Ok(QueryResult::new(QueryKind::CreateDatabase))
    }

    fn execute_drop_database(&mut self, name: &str) -> Result<QueryResult> {
        let dir = self.data_root.join(name);
        if !dir.is_dir() {
            return Err(Error::DatabaseNotFound(name.to_string()));
        }
        std::fs::remove_dir_all(&dir)?;

        if self.current_database.as_deref() == Some(name) {
            self.current_database = None;
            self.catalog = Catalog::new();
            self.indexes.clear();
        }
        Ok(QueryResult::new(QueryKind::DropDatabase))
    }

    fn execute_use_database(&mut self, name: &str) -> Result<QueryResult> {
        let dir = self.data_root.join(name);
        if !dir.is_dir() {
            return Err(Error::DatabaseNotFound(name.to_string()));
        }

        // leftovers from an interrupted rewrite are garbage by definition
        remove_tmp_files(&dir)?;

        self.indexes.clear();
        self.catalog = Catalog::load(dir.join("catalog.bin"))?;
        self.current_database = Some(name.to_string());
        Ok(QueryResult::new(QueryKind::UseDatabase))
    }

    fn execute_show_databases(&self) -> Result<QueryResult> {
        let rows: Vec<Record> = self
            .list_databases()?
            .into_iter()
            .map(|name| {
                let mut row = Record::new();
                row.insert("database".to_string(), FieldValue::Str(name));
                row
            })
            .collect();
        Ok(QueryResult::with_rows(
            QueryKind::ShowDatabases,
            vec!["database".to_string()],
            rows,
        ))
    }

    fn execute_show_tables(&self) -> Result<QueryResult> {
        let mut names = self.catalog.list_tables();
        names.sort();
        let rows: Vec<Record> = names
            .into_iter()
            .map(|name| {
                let mut row = Record::new();
                row.insert("table".to_string(), FieldValue::Str(name));
                row
            })
            .collect();
        Ok(QueryResult::with_rows(
            QueryKind::ShowTables,
            vec!["table".to_string()],
            rows,
        ))
    }

    // ========== Tables ==========

    fn execute_create_table(&mut self, create: CreateTableStatement) -> Result<QueryResult> {
        let dir = self.database_dir()?;
        if self.catalog.table_exists(&create.table_name) {
            return Err(Error::TableAlreadyExists(create.table_name));
        }

        for (i, column) in create.columns.iter().enumerate() {
            if create.columns[..i].iter().any(|c| c.name == column.name) {
                return Err(Error::DuplicateColumn(
                    column.name.clone(),
                    create.table_name.clone(),
                ));
            }
        }

        if let Some(pk) = &create.primary_key {
            let column = create
                .columns
                .iter()
                .find(|c| &c.name == pk)
                .ok_or_else(|| Error::PrimaryKeyNotFound(pk.clone()))?;
            if column.column_type != ColumnType::Int {
                return Err(Error::PrimaryKeyNotInt(pk.clone()));
            }
        }

        // foreign keys must point at an existing table's primary key
        for fk in &create.foreign_keys {
            if !create.columns.iter().any(|c| c.name == fk.column) {
                return Err(Error::ColumnNotFound(
                    fk.column.clone(),
                    create.table_name.clone(),
                ));
            }
            let parent = self
                .catalog
                .get_table_schema(&fk.references_table)
                .map_err(|_| Error::ReferencedTableNotFound(fk.references_table.clone()))?;
            let parent_pk = parent.primary_key_column();
            if parent_pk.map(|c| c.name.as_str()) != Some(fk.references_column.as_str()) {
                return Err(Error::ReferencedColumnNotKey(
                    fk.references_column.clone(),
                    fk.references_table.clone(),
                ));
            }
        }

        let mut table = TableSchema::new(create.table_name.clone());
        for def in &create.columns {
            let mut column = Column::new(def.name.clone(), def.column_type, def.length);
            column.is_primary_key = create.primary_key.as_deref() == Some(def.name.as_str());
            if let Some(fk) = create.foreign_keys.iter().find(|fk| fk.column == def.name) {
                column =
                    column.references(fk.references_table.clone(), fk.references_column.clone());
            }
            table.columns.push(column);
        }
        table.data_file_path = dir
            .join(format!("{}.dat", create.table_name))
            .display()
            .to_string();
        table.index_file_path = dir
            .join(format!("{}.idx", create.table_name))
            .display()
            .to_string();

        std::fs::File::create(&table.data_file_path)?;
        if table.primary_key_column().is_some() {
            let tree = BPlusTree::open(&table.index_file_path)?;
            self.indexes.insert(table.name.clone(), tree);
        }

        self.catalog.create_table(table)?;
        self.save_catalog()?;
        Ok(QueryResult::new(QueryKind::CreateTable))
    }

    fn execute_drop_table(&mut self, name: &str) -> Result<QueryResult> {
        self.database_dir()?;
        let table = self.catalog.drop_table(name)?;
        self.indexes.remove(name);

        for path in [&table.data_file_path, &table.index_file_path] {
            let path = Path::new(path);
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }

        self.save_catalog()?;
        Ok(QueryResult::new(QueryKind::DropTable))
    }

    // ========== DML ==========

    fn execute_insert(&mut self, insert: InsertStatement) -> Result<QueryResult> {
        self.database_dir()?;
        let schema = self.catalog.get_table_schema(&insert.table_name)?.clone();

        let key = match schema.primary_key_column() {
            Some(pk) => {
                let value = insert
                    .record
                    .get(&pk.name)
                    .ok_or_else(|| Error::MissingPrimaryKey(pk.name.clone()))?;
                let key = value
                    .as_int()
                    .ok_or_else(|| Error::PrimaryKeyNotInt(pk.name.clone()))?;
                Some(key)
            }
            None => None,
        };

        let offset = heap::append_record(&schema, &insert.record)?;
        if let Some(key) = key {
            self.index_handle(&schema)?.insert(key, offset)?;
        }

        let mut result = QueryResult::new(QueryKind::Insert);
        result.records_found = 1;
        Ok(result)
    }

    fn execute_select(&mut self, select: SelectStatement) -> Result<QueryResult> {
        self.database_dir()?;
        if let Some(join) = select.join.clone() {
            return self.execute_join(select, &join);
        }

        let schema = self.catalog.get_table_schema(&select.table_name)?.clone();

        let fast_path_key =
            index_fast_path_key(&schema, &select.conditions, &select.connectives);
        let rows: Vec<Record> = if select.conditions.is_empty() {
            heap::scan(&schema)?
        } else if let Some(key) = fast_path_key {
            let offsets = self.index_handle(&schema)?.search(key)?;
            let mut rows = Vec::new();
            for offset in offsets {
                let record = heap::read_at(&schema, offset)?;
                if filter::matches(&record, &select.conditions, &select.connectives) {
                    rows.push(record);
                }
            }
            rows
        } else {
            heap::scan(&schema)?
                .into_iter()
                .filter(|record| {
                    filter::matches(record, &select.conditions, &select.connectives)
                })
                .collect()
        };

        let columns = projected_columns(&select.projection, &[&schema]);
        let rows = project_rows(rows, &select.projection);

        let mut result = QueryResult::with_rows(QueryKind::Select, columns, rows);
        if result.rows.is_empty() {
            result.error_message = if select.conditions.is_empty() {
                format!("No records found in table '{}'", select.table_name)
            } else {
                format!(
                    "No records match the WHERE conditions in table '{}'",
                    select.table_name
                )
            };
        }
        Ok(result)
    }

    fn execute_join(&mut self, select: SelectStatement, join: &JoinClause) -> Result<QueryResult> {
        let left_schema = self.catalog.get_table_schema(&select.table_name)?.clone();
        let right_schema = self.catalog.get_table_schema(&join.table_name)?.clone();

        let left_rows = heap::scan(&left_schema)?;
        let right_rows = heap::scan(&right_schema)?;

        // nested loop, emitting merged records with table-qualified keys;
        // ties break in file order, left-outer then right-inner
        let mut merged_rows = Vec::new();
        for left in &left_rows {
            for right in &right_rows {
                let mut merged = Record::new();
                for (name, value) in left {
                    merged.insert(format!("{}.{}", left_schema.name, name), value.clone());
                }
                for (name, value) in right {
                    merged.insert(format!("{}.{}", right_schema.name, name), value.clone());
                }

                let joined = match (merged.get(&join.left_column), merged.get(&join.right_column))
                {
                    (Some(l), Some(r)) => l == r,
                    _ => false,
                };
                if joined
                    && filter::matches(&merged, &select.conditions, &select.connectives)
                {
                    merged_rows.push(merged);
                }
            }
        }

        let columns = projected_columns(&select.projection, &[&left_schema, &right_schema]);
        let rows = project_rows(merged_rows, &select.projection);

        let mut result = QueryResult::with_rows(QueryKind::Select, columns, rows);
        if result.rows.is_empty() && !select.conditions.is_empty() {
            result.error_message = "No records match the JOIN conditions".to_string();
        }
        Ok(result)
    }

    fn execute_update(&mut self, update: UpdateStatement) -> Result<QueryResult> {
        self.database_dir()?;
        let schema = self.catalog.get_table_schema(&update.table_name)?.clone();

        // resolve and coerce assignments before touching the file
        let mut assignments = Vec::with_capacity(update.assignments.len());
        for (name, value) in &update.assignments {
            let column = schema
                .column(name)
                .ok_or_else(|| Error::ColumnNotFound(name.clone(), schema.name.clone()))?;
            assignments.push((name.clone(), coerce_assignment(value, column)?));
        }

        let matched = heap::rewrite(&schema, |record| {
            if filter::matches(&record, &update.conditions, &update.connectives) {
                let mut record = record;
                for (name, value) in &assignments {
                    record.insert(name.clone(), value.clone());
                }
                Rewrite::Updated(record)
            } else {
                Rewrite::Unchanged(record)
            }
        })?;

        if matched == 0 {
            return Ok(QueryResult::error(QueryKind::Update, "no record matched"));
        }
        self.rebuild_index(&schema)?;

        let mut result = QueryResult::new(QueryKind::Update);
        result.records_found = matched;
        Ok(result)
    }

    fn execute_delete(&mut self, delete: DeleteStatement) -> Result<QueryResult> {
        self.database_dir()?;
        let schema = self.catalog.get_table_schema(&delete.table_name)?.clone();

        let matched = heap::rewrite(&schema, |record| {
            if filter::matches(&record, &delete.conditions, &delete.connectives) {
                Rewrite::Remove
            } else {
                Rewrite::Unchanged(record)
            }
        })?;

        if matched > 0 {
            self.rebuild_index(&schema)?;
        }

        let mut result = QueryResult::new(QueryKind::Delete);
        result.records_found = matched;
        Ok(result)
    }

    // ========== Helpers ==========

    /// Rebuild the table's index from the rewritten data file and reopen
    /// it lazily on next use.
    fn rebuild_index(&mut self, schema: &TableSchema) -> Result<()> {
        let Some(pk) = schema.primary_key_column() else {
            return Ok(());
        };
        let pk_name = pk.name.clone();

        // drop the open handle before the rename replaces the file
        self.indexes.remove(&schema.name);

        let mut entries = Vec::new();
        for (offset, record) in heap::scan_with_offsets(schema)? {
            if let Some(key) = record.get(&pk_name).and_then(FieldValue::as_int) {
                entries.push((key, offset));
            }
        }
        BPlusTree::rebuild(&schema.index_file_path, entries)
    }

    fn index_handle(&mut self, schema: &TableSchema) -> Result<&mut BPlusTree> {
        if !self.indexes.contains_key(&schema.name) {
            let tree = BPlusTree::open(&schema.index_file_path)?;
            self.indexes.insert(schema.name.clone(), tree);
        }
        Ok(self.indexes.get_mut(&schema.name).unwrap())
    }

    fn database_dir(&self) -> Result<PathBuf> {
        let name = self
            .current_database
            .as_ref()
            .ok_or(Error::NoDatabaseSelected)?;
        Ok(self.data_root.join(name))
    }

    fn save_catalog(&self) -> Result<()> {
        let dir = self.database_dir()?;
        self.catalog.save(dir.join("catalog.bin"))
    }
}

/// The key for the index fast path: the first condition is integer
/// equality on the primary key and the clause is a pure AND chain. An
/// index probe under OR would miss rows matching later disjuncts, so those
/// clauses take the full scan.
fn index_fast_path_key(
    schema: &TableSchema,
    conditions: &[Condition],
    connectives: &[Connective],
) -> Option<i32> {
    let pk = schema.primary_key_column()?;
    let first = conditions.first()?;
    if first.column == pk.name
        && first.op == CompareOp::Eq
        && connectives.iter().all(|c| *c == Connective::And)
    {
        first.value.as_int()
    } else {
        None
    }
}

/// Coerce an assignment literal to its column's type
fn coerce_assignment(value: &FieldValue, column: &Column) -> Result<FieldValue> {
    let mismatch = || Error::TypeMismatch {
        value: value.to_string(),
        column: column.name.clone(),
    };
    match (column.column_type, value) {
        (ColumnType::Int, FieldValue::Int(_))
        | (ColumnType::Float, FieldValue::Float(_))
        | (ColumnType::Bool, FieldValue::Bool(_))
        | (ColumnType::Str, FieldValue::Str(_)) => Ok(value.clone()),
        (ColumnType::Float, FieldValue::Int(n)) => Ok(FieldValue::Float(*n as f32)),
        (ColumnType::Char, FieldValue::Str(s)) | (ColumnType::Char, FieldValue::Char(s)) => {
            Ok(FieldValue::Char(pad_char(s, column.length)))
        }
        _ => Err(mismatch()),
    }
}

/// Result column names for a projection over the given schemas
fn projected_columns(projection: &Projection, schemas: &[&TableSchema]) -> Vec<String> {
    match projection {
        Projection::Columns(columns) => columns.clone(),
        Projection::All => {
            if schemas.len() == 1 {
                schemas[0].column_names()
            } else {
                // joins expose every column under its qualified name
                schemas
                    .iter()
                    .flat_map(|schema| {
                        schema
                            .columns
                            .iter()
                            .map(|c| format!("{}.{}", schema.name, c.name))
                    })
                    .collect()
            }
        }
    }
}

/// Keep only the projected fields of each row. A column reference matches
/// a field by exact name first, then by its unqualified base name; the
/// output key is always the reference as written. Rows left with no fields
/// are dropped.
fn project_rows(rows: Vec<Record>, projection: &Projection) -> Vec<Record> {
    let Projection::Columns(columns) = projection else {
        return rows;
    };

    let mut projected = Vec::with_capacity(rows.len());
    for row in rows {
        let mut out = Record::new();
        for column in columns {
            if let Some(value) = row.get(column) {
                out.insert(column.clone(), value.clone());
                continue;
            }
            if let Some((_, base)) = column.split_once('.') {
                if let Some(value) = row.get(base) {
                    out.insert(column.clone(), value.clone());
                }
            }
        }
        if !out.is_empty() {
            projected.push(out);
        }
    }
    projected
}

fn remove_tmp_files(dir: &Path) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().ends_with(".tmp") && entry.file_type()?.is_file() {
            debug!(file = %entry.path().display(), "removing stale temp file");
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn engine() -> (Engine, TempDir) {
        let dir = tempdir().unwrap();
        let engine = Engine::new(dir.path()).unwrap();
        (engine, dir)
    }

    fn engine_with_db() -> (Engine, TempDir) {
        let (mut engine, dir) = engine();
        assert!(engine.execute("CREATE DATABASE db; USE db;").success());
        (engine, dir)
    }

    fn int(n: i32) -> FieldValue {
        FieldValue::Int(n)
    }

    #[test]
    fn test_database_lifecycle() {
        let (mut engine, _dir) = engine();

        assert!(engine.execute("CREATE DATABASE shop;").success());
        assert!(!engine.execute("CREATE DATABASE shop;").success());

        let result = engine.execute("SHOW DATABASES;");
        assert_eq!(result.records_found, 1);
        assert_eq!(result.rows[0]["database"], FieldValue::Str("shop".into()));

        assert!(engine.execute("USE shop;").success());
        assert_eq!(engine.current_database(), Some("shop"));

        assert!(engine.execute("DROP DATABASE shop;").success());
        assert_eq!(engine.current_database(), None);
        assert!(!engine.execute("USE shop;").success());
    }

    #[test]
    fn test_statements_need_a_database() {
        let (mut engine, _dir) = engine();
        let result = engine.execute("CREATE TABLE t (id INT, PRIMARY KEY(id));");
        assert!(result.error_message.contains("no database selected"));
    }

    #[test]
    fn test_create_table_persists_catalog() {
        let (mut engine, dir) = engine_with_db();

        assert!(engine
            .execute("CREATE TABLE t (id INT, name STRING(10), PRIMARY KEY(id));")
            .success());
        assert!(dir.path().join("db/t.dat").exists());
        assert!(dir.path().join("db/t.idx").exists());
        assert!(dir.path().join("db/catalog.bin").exists());

        // a fresh engine sees the table after USE
        let mut fresh = Engine::new(dir.path()).unwrap();
        assert!(fresh.execute("USE db;").success());
        assert_eq!(fresh.list_tables(), vec!["t".to_string()]);
    }

    #[test]
    fn test_create_table_validations() {
        let (mut engine, _dir) = engine_with_db();

        let result = engine.execute("CREATE TABLE t (id INT, id FLOAT, PRIMARY KEY(id));");
        assert!(result.error_message.contains("duplicate column"));

        let result = engine.execute("CREATE TABLE t (id INT, PRIMARY KEY(nope));");
        assert!(result.error_message.contains("not found"));

        let result = engine.execute("CREATE TABLE t (name STRING(5), PRIMARY KEY(name));");
        assert!(result.error_message.contains("must be INT"));
    }

    #[test]
    fn test_foreign_key_checked_at_create() {
        let (mut engine, _dir) = engine_with_db();
        engine.execute("CREATE TABLE users (id INT, PRIMARY KEY(id));");

        assert!(engine
            .execute(
                "CREATE TABLE orders (oid INT, uid INT, PRIMARY KEY(oid), \
                 FOREIGN KEY (uid) REFERENCES users(id));"
            )
            .success());

        let result = engine.execute(
            "CREATE TABLE bad (x INT, PRIMARY KEY(x), FOREIGN KEY (x) REFERENCES ghosts(id));",
        );
        assert!(result.error_message.contains("referenced table"));

        let result = engine.execute(
            "CREATE TABLE bad (x INT, PRIMARY KEY(x), FOREIGN KEY (x) REFERENCES users(nope));",
        );
        assert!(result
            .error_message
            .contains("not the primary key"));
    }

    #[test]
    fn test_insert_and_select_round_trip() {
        let (mut engine, _dir) = engine_with_db();
        engine.execute("CREATE TABLE t (id INT, name STRING(10), PRIMARY KEY(id));");

        assert!(engine.execute("INSERT INTO t VALUES (1, 'Ann');").success());
        assert!(engine.execute("INSERT INTO t VALUES (2, 'Bo');").success());

        let result = engine.execute("SELECT * FROM t;");
        assert!(result.success());
        assert_eq!(result.records_found, 2);
        assert_eq!(result.columns, vec!["id", "name"]);
        assert_eq!(result.rows[0]["id"], int(1));
        assert_eq!(result.rows[1]["name"], FieldValue::Str("Bo".into()));
    }

    #[test]
    fn test_insert_with_empty_values_fails() {
        let (mut engine, _dir) = engine_with_db();
        engine.execute("CREATE TABLE t (id INT, PRIMARY KEY(id));");
        let result = engine.execute("INSERT INTO t VALUES ();");
        assert!(!result.success());
    }

    #[test]
    fn test_select_point_query_uses_index() {
        let (mut engine, _dir) = engine_with_db();
        engine.execute("CREATE TABLE t (id INT, name STRING(8), PRIMARY KEY(id));");
        for i in 0..20 {
            engine.execute(&format!("INSERT INTO t VALUES ({}, 'row{}');", i, i));
        }

        let result = engine.execute("SELECT * FROM t WHERE id = 7;");
        assert_eq!(result.records_found, 1);
        assert_eq!(result.rows[0]["name"], FieldValue::Str("row7".into()));

        // fast path evaluates the whole condition list
        let result = engine.execute("SELECT * FROM t WHERE id = 7 AND name = 'other';");
        assert_eq!(result.records_found, 0);
    }

    #[test]
    fn test_select_filtered_scan() {
        let (mut engine, _dir) = engine_with_db();
        engine.execute("CREATE TABLE t (id INT, score FLOAT, PRIMARY KEY(id));");
        engine.execute("INSERT INTO t VALUES (1, 0.5);");
        engine.execute("INSERT INTO t VALUES (2, 1.5);");
        engine.execute("INSERT INTO t VALUES (3, 2.5);");

        let result = engine.execute("SELECT id FROM t WHERE score > 1.0;");
        assert_eq!(result.records_found, 2);
        assert_eq!(result.rows[0]["id"], int(2));
        assert_eq!(result.rows[1]["id"], int(3));
    }

    #[test]
    fn test_select_empty_result_has_message() {
        let (mut engine, _dir) = engine_with_db();
        engine.execute("CREATE TABLE t (id INT, PRIMARY KEY(id));");

        let result = engine.execute("SELECT * FROM t;");
        assert!(!result.success());
        assert!(result.error_message.contains("No records found"));

        engine.execute("INSERT INTO t VALUES (1);");
        let result = engine.execute("SELECT * FROM t WHERE id = 9;");
        assert!(result.error_message.contains("WHERE"));
    }

    #[test]
    fn test_update_and_rebuild() {
        let (mut engine, _dir) = engine_with_db();
        engine.execute("CREATE TABLE t (id INT, name STRING(10), PRIMARY KEY(id));");
        engine.execute("INSERT INTO t VALUES (1, 'Ann');");
        engine.execute("INSERT INTO t VALUES (2, 'Bo');");

        let result = engine.execute("UPDATE t SET name = 'Cyn' WHERE id = 2;");
        assert!(result.success());
        assert_eq!(result.records_found, 1);

        // point query through the rebuilt index sees the new value
        let result = engine.execute("SELECT name FROM t WHERE id = 2;");
        assert_eq!(result.rows[0]["name"], FieldValue::Str("Cyn".into()));
    }

    #[test]
    fn test_update_no_match() {
        let (mut engine, _dir) = engine_with_db();
        engine.execute("CREATE TABLE t (id INT, PRIMARY KEY(id));");
        engine.execute("INSERT INTO t VALUES (1);");

        let result = engine.execute("UPDATE t SET id = 9 WHERE id = 42;");
        assert_eq!(result.error_message, "no record matched");
    }

    #[test]
    fn test_update_unknown_column() {
        let (mut engine, _dir) = engine_with_db();
        engine.execute("CREATE TABLE t (id INT, PRIMARY KEY(id));");
        engine.execute("INSERT INTO t VALUES (1);");

        let result = engine.execute("UPDATE t SET ghost = 9 WHERE id = 1;");
        assert!(result.error_message.contains("does not exist"));
    }

    #[test]
    fn test_delete_shrinks_file() {
        let (mut engine, _dir) = engine_with_db();
        engine.execute("CREATE TABLE t (id INT, PRIMARY KEY(id));");
        engine.execute("INSERT INTO t VALUES (1);");
        engine.execute("INSERT INTO t VALUES (2);");

        let result = engine.execute("DELETE FROM t WHERE id = 1;");
        assert!(result.success());
        assert_eq!(result.records_found, 1);

        let schema = engine.table_schema("t").unwrap();
        let size = std::fs::metadata(&schema.data_file_path).unwrap().len();
        assert_eq!(size, schema.record_size() as u64);

        let result = engine.execute("SELECT * FROM t;");
        assert_eq!(result.records_found, 1);
        assert_eq!(result.rows[0]["id"], int(2));
    }

    #[test]
    fn test_delete_no_match_succeeds() {
        let (mut engine, _dir) = engine_with_db();
        engine.execute("CREATE TABLE t (id INT, PRIMARY KEY(id));");
        engine.execute("INSERT INTO t VALUES (1);");

        let result = engine.execute("DELETE FROM t WHERE id = 42;");
        assert!(result.success());
        assert_eq!(result.records_found, 0);
    }

    #[test]
    fn test_drop_table_removes_files() {
        let (mut engine, dir) = engine_with_db();
        engine.execute("CREATE TABLE t (id INT, PRIMARY KEY(id));");
        engine.execute("INSERT INTO t VALUES (1);");

        assert!(engine.execute("DROP TABLE t;").success());
        assert!(!dir.path().join("db/t.dat").exists());
        assert!(!dir.path().join("db/t.idx").exists());
        assert!(!engine.execute("SELECT * FROM t;").success());
    }

    #[test]
    fn test_join() {
        let (mut engine, _dir) = engine_with_db();
        engine.execute("CREATE TABLE users (id INT, name STRING(8), PRIMARY KEY(id));");
        engine.execute("CREATE TABLE orders (oid INT, uid INT, PRIMARY KEY(oid));");
        engine.execute("INSERT INTO users VALUES (1, 'A');");
        engine.execute("INSERT INTO users VALUES (2, 'B');");
        engine.execute("INSERT INTO orders VALUES (10, 1);");
        engine.execute("INSERT INTO orders VALUES (11, 1);");
        engine.execute("INSERT INTO orders VALUES (12, 2);");

        let result = engine.execute(
            "SELECT users.name, orders.oid FROM users JOIN orders ON users.id = orders.uid;",
        );
        assert!(result.success());
        assert_eq!(result.records_found, 3);
        assert_eq!(result.rows[0]["users.name"], FieldValue::Str("A".into()));
        assert_eq!(result.rows[0]["orders.oid"], int(10));
        assert_eq!(result.rows[1]["orders.oid"], int(11));
        assert_eq!(result.rows[2]["users.name"], FieldValue::Str("B".into()));
    }

    #[test]
    fn test_join_with_where() {
        let (mut engine, _dir) = engine_with_db();
        engine.execute("CREATE TABLE users (id INT, name STRING(8), PRIMARY KEY(id));");
        engine.execute("CREATE TABLE orders (oid INT, uid INT, PRIMARY KEY(oid));");
        engine.execute("INSERT INTO users VALUES (1, 'A');");
        engine.execute("INSERT INTO orders VALUES (10, 1);");
        engine.execute("INSERT INTO orders VALUES (11, 1);");

        let result = engine.execute(
            "SELECT orders.oid FROM users JOIN orders ON users.id = orders.uid \
             WHERE orders.oid > 10;",
        );
        assert_eq!(result.records_found, 1);
        assert_eq!(result.rows[0]["orders.oid"], int(11));
    }

    #[test]
    fn test_use_cleans_stale_tmp_files() {
        let (mut engine, dir) = engine_with_db();
        engine.execute("CREATE TABLE t (id INT, PRIMARY KEY(id));");

        let stale = dir.path().join("db/t.dat.tmp");
        std::fs::write(&stale, b"junk").unwrap();

        assert!(engine.execute("USE db;").success());
        assert!(!stale.exists());
    }

    #[test]
    fn test_syntax_error_reports_and_preserves_storage() {
        let (mut engine, _dir) = engine_with_db();
        engine.execute("CREATE TABLE t (id INT, PRIMARY KEY(id));");
        engine.execute("INSERT INTO t VALUES (1);");

        let result = engine.execute("SELECT FROM t;");
        assert!(!result.success());
        assert!(result.error_message.contains("projection"));

        let result = engine.execute("SELECT * FROM t;");
        assert_eq!(result.records_found, 1);
    }

    #[test]
    fn test_execution_stops_at_first_error() {
        let (mut engine, _dir) = engine_with_db();
        engine.execute("CREATE TABLE t (id INT, PRIMARY KEY(id));");

        let result = engine.execute("INSERT INTO ghost VALUES (1); INSERT INTO t VALUES (1);");
        assert!(!result.success());

        // the second statement never ran
        let result = engine.execute("SELECT * FROM t;");
        assert_eq!(result.records_found, 0);
    }
}
