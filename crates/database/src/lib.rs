//! Database glue: catalog plus open tables plus the shared log and lob
//! handlers, and statement execution from SQL text to result chunks.

use catalog::{Catalog, StorageFormat, TableMeta};
use columnar::Chunk;
use common::{Config, DbError, DbResult};
use executor::{build_physical, LoadDataExecutor, SchemaOps};
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use parser::{ColumnDef, SelectStatement, Statement};
use std::sync::Arc;
use storage::{LobFileHandler, Table};
use tracing::{debug, info};
use types::{AttrType, Value};
use wal::LogHandler;

/// What one statement produced: a stream of result chunks or a state line.
#[derive(Debug)]
pub enum ExecutionResult {
    Rows {
        schema: Vec<String>,
        chunks: Vec<Chunk>,
    },
    /// Non-query state text; empty means a bare `SUCCESS`.
    State(String),
}

/// Cheaply cloneable handle onto one open database.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    catalog: Mutex<Catalog>,
    tables: RwLock<HashMap<String, Arc<Table>>>,
    log: Arc<LogHandler>,
    lob: Arc<LobFileHandler>,
}

impl Database {
    /// Open the database directory, loading the catalog and every table.
    /// The lob handler is created eagerly so text spills never race.
    pub fn open(config: Config) -> DbResult<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| DbError::WriteFailed(format!("create data dir: {e}")))?;
        let catalog = Catalog::load(&config.data_dir.join("catalog.json"))?;
        let log = Arc::new(LogHandler::open(config.data_dir.join("redo.log"))?);
        let lob = Arc::new(LobFileHandler::open(config.data_dir.join("lob.data"))?);

        let mut tables = HashMap::new();
        for meta in catalog.tables() {
            let table = Table::open(
                meta.clone(),
                &config.data_dir,
                config.buffer_pool_pages,
                log.clone(),
                lob.clone(),
            )?;
            tables.insert(meta.name.clone(), table);
        }
        info!(tables = tables.len(), "database open");

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                catalog: Mutex::new(catalog),
                tables: RwLock::new(tables),
                log,
                lob,
            }),
        })
    }

    /// Parse and execute one SQL statement.
    pub fn execute_sql(&self, sql: &str) -> DbResult<ExecutionResult> {
        debug!(sql, "execute");
        let mut statements = parser::parse_sql(sql)?;
        if statements.len() != 1 {
            return Err(DbError::InvalidArgument(
                "one statement per message".into(),
            ));
        }
        self.execute_statement(statements.remove(0))
    }

    fn schema_ops(&self) -> Arc<dyn SchemaOps> {
        self.inner.clone()
    }

    fn execute_statement(&self, stmt: Statement) -> DbResult<ExecutionResult> {
        match stmt {
            Statement::CreateTable {
                name,
                columns,
                storage_format,
            } => {
                let format = match storage_format.as_deref() {
                    Some("row") => StorageFormat::Row,
                    Some("pax") | None => StorageFormat::Pax,
                    Some(other) => {
                        return Err(DbError::InvalidArgument(format!(
                            "unknown storage format '{other}'"
                        )))
                    }
                };
                let attrs = columns
                    .iter()
                    .map(resolve_column_type)
                    .collect::<DbResult<Vec<_>>>()?;
                self.inner.create_table(&name, attrs, format)?;
                Ok(ExecutionResult::State(String::new()))
            }
            Statement::DropTable { name } => {
                self.inner.catalog.lock().drop_table(&name)?;
                self.inner.tables.write().remove(&name);
                self.inner.save_catalog()?;
                info!(table = %name, "dropped table");
                Ok(ExecutionResult::State(String::new()))
            }
            Statement::Insert { table, values } => {
                let table = self.inner.find_table(&table)?;
                let coerced = coerce_row(table.meta(), &values)?;
                table.insert_record(&coerced)?;
                table.flush()?;
                self.inner.log.sync()?;
                Ok(ExecutionResult::State(String::new()))
            }
            Statement::Select(query) => self.run_select(&query),
            Statement::CreateMaterializedView { name, query } => {
                let meta = self.inner.table_meta(&query.table)?;
                let plan = planner::plan_materialized_view(&name, &query, &meta)?;
                let mut op = build_physical(plan, &self.schema_ops())?;
                let run = op.open();
                let close = op.close();
                run?;
                close?;
                info!(view = %name, "materialized view created");
                Ok(ExecutionResult::State(String::new()))
            }
            Statement::LoadData {
                file,
                table,
                terminated,
                enclosed,
            } => {
                let table = self.inner.find_table(&table)?;
                let loader = LoadDataExecutor::new(table, &file, terminated, enclosed);
                let report = loader.execute()?;
                self.inner.log.sync()?;
                Ok(ExecutionResult::State(report))
            }
        }
    }

    fn run_select(&self, query: &SelectStatement) -> DbResult<ExecutionResult> {
        let meta = self.inner.table_meta(&query.table)?;
        let plan = planner::plan_select(query, &meta)?;
        let mut op = build_physical(plan, &self.schema_ops())?;

        if let Err(err) = op.open() {
            let _ = op.close();
            return Err(err);
        }
        let schema = op.schema().to_vec();
        let mut chunks = Vec::new();
        let pull = (|| -> DbResult<()> {
            loop {
                let mut chunk = Chunk::new();
                if !op.next(&mut chunk)? {
                    return Ok(());
                }
                if chunk.rows() > 0 {
                    chunks.push(chunk);
                }
            }
        })();
        // Tear the pipeline down even when a pull failed.
        let close = op.close();
        pull?;
        close?;
        Ok(ExecutionResult::Rows { schema, chunks })
    }
}

impl Inner {
    fn table_meta(&self, name: &str) -> DbResult<TableMeta> {
        Ok(self.catalog.lock().table(name)?.clone())
    }

    fn create_table(
        &self,
        name: &str,
        attrs: Vec<(String, AttrType, usize)>,
        format: StorageFormat,
    ) -> DbResult<Arc<Table>> {
        let meta = {
            let mut catalog = self.catalog.lock();
            catalog.create_table(name, attrs, format)?;
            catalog.table(name)?.clone()
        };
        let table = Table::open(
            meta,
            &self.config.data_dir,
            self.config.buffer_pool_pages,
            self.log.clone(),
            self.lob.clone(),
        )?;
        self.tables.write().insert(name.to_string(), table.clone());
        self.save_catalog()?;
        info!(table = %name, format = ?format, "created table");
        Ok(table)
    }

    fn save_catalog(&self) -> DbResult<()> {
        self.catalog
            .lock()
            .save(&self.config.data_dir.join("catalog.json"))
    }
}

impl SchemaOps for Inner {
    fn find_table(&self, name: &str) -> DbResult<Arc<Table>> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::FieldMissing(format!("unknown table '{name}'")))
    }

    fn create_pax_table(
        &self,
        name: &str,
        attrs: Vec<(String, AttrType, usize)>,
    ) -> DbResult<Arc<Table>> {
        if self.catalog.lock().contains(name) {
            return Err(DbError::ViewNameRepeat(name.to_string()));
        }
        self.create_table(name, attrs, StorageFormat::Pax)
    }
}

/// Map a SQL type name onto `(attribute kind, stored width)`.
fn resolve_column_type(column: &ColumnDef) -> DbResult<(String, AttrType, usize)> {
    let ty = column.ty.as_str();
    let (attr_type, declared) = if let Some(inner) = ty
        .strip_prefix("CHAR(")
        .or_else(|| ty.strip_prefix("VARCHAR("))
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let width = inner
            .trim()
            .parse::<usize>()
            .map_err(|_| DbError::InvalidArgument(format!("bad char width: {ty}")))?;
        (AttrType::Chars, width)
    } else {
        let attr_type = match ty {
            "INT" | "INTEGER" => AttrType::Ints,
            "BIGINT" => AttrType::Bigints,
            "FLOAT" | "REAL" => AttrType::Floats,
            "DATE" => AttrType::Dates,
            "TEXT" => AttrType::Texts,
            "BOOLEAN" | "BOOL" => AttrType::Booleans,
            other => {
                return Err(DbError::FieldTypeMismatch(format!(
                    "unsupported column type {other}"
                )))
            }
        };
        (attr_type, 0)
    };
    Ok((
        column.name.clone(),
        attr_type,
        catalog::field_len(attr_type, declared),
    ))
}

/// Coerce literal values toward the table's field types.
fn coerce_row(meta: &TableMeta, values: &[Value]) -> DbResult<Vec<Value>> {
    if values.len() != meta.field_num() {
        return Err(DbError::FieldMissing(format!(
            "table '{}' expects {} values, got {}",
            meta.name,
            meta.field_num(),
            values.len()
        )));
    }
    meta.fields
        .iter()
        .zip(values)
        .map(|(field, value)| {
            if value.attr_type() == field.attr_type {
                Ok(value.clone())
            } else {
                Ok(value.cast_to(field.attr_type)?)
            }
        })
        .collect()
}
