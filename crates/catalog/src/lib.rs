//! Persistent catalog: table schemas, field layout, and storage format.

use ahash::RandomState;
use common::{DbError, DbResult, TableId};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use types::AttrType;

type Map<K, V> = HashMap<K, V, RandomState>;

/// On-disk organization of a table's pages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageFormat {
    /// Records stored contiguously, one slot per record.
    Row,
    /// Records split per column within each page.
    Pax,
}

/// One attribute of a table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub name: String,
    pub attr_type: AttrType,
    /// Stored element width in bytes.
    pub len: usize,
    /// Position of this field's bytes within a record; also the logical
    /// column id chunks carry.
    pub field_id: usize,
}

impl FieldMeta {
    pub fn new(name: impl Into<String>, attr_type: AttrType, len: usize, field_id: usize) -> Self {
        Self {
            name: name.into(),
            attr_type,
            len,
            field_id,
        }
    }
}

/// Schema and layout of one table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableMeta {
    pub id: TableId,
    pub name: String,
    pub fields: Vec<FieldMeta>,
    pub storage_format: StorageFormat,
}

impl TableMeta {
    pub fn field_num(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, index: usize) -> &FieldMeta {
        &self.fields[index]
    }

    pub fn field_by_name(&self, name: &str) -> DbResult<&FieldMeta> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| {
                DbError::FieldMissing(format!("no field '{name}' on table '{}'", self.name))
            })
    }

    /// Total record width: the sum of all field lengths.
    pub fn record_size(&self) -> usize {
        self.fields.iter().map(|f| f.len).sum()
    }

    /// Byte offset of a field within a record.
    pub fn field_offset(&self, index: usize) -> usize {
        self.fields[..index].iter().map(|f| f.len).sum()
    }
}

/// The set of tables, persisted as pretty JSON next to the data files.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Catalog {
    tables: Vec<TableMeta>,
    next_table_id: u64,
    #[serde(skip)]
    #[serde(default)]
    name_index: Map<String, usize>,
    #[serde(skip)]
    #[serde(default)]
    id_index: Map<TableId, usize>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: Vec::new(),
            next_table_id: 1,
            name_index: Map::default(),
            id_index: Map::default(),
        }
    }

    /// Load from disk; a missing file yields an empty catalog.
    pub fn load(path: &Path) -> DbResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = fs::read_to_string(path)
            .map_err(|e| DbError::ReadFailed(format!("read catalog: {e}")))?;
        let mut catalog: Catalog = serde_json::from_str(&data)
            .map_err(|e| DbError::Internal(format!("invalid catalog file: {e}")))?;
        catalog.rebuild_indexes();
        Ok(catalog)
    }

    pub fn save(&self, path: &Path) -> DbResult<()> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| DbError::Internal(format!("serialize catalog: {e}")))?;
        fs::write(path, data).map_err(|e| DbError::WriteFailed(format!("write catalog: {e}")))
    }

    pub fn table(&self, name: &str) -> DbResult<&TableMeta> {
        self.name_index
            .get(name)
            .and_then(|&idx| self.tables.get(idx))
            .ok_or_else(|| DbError::FieldMissing(format!("unknown table '{name}'")))
    }

    pub fn table_by_id(&self, id: TableId) -> DbResult<&TableMeta> {
        self.id_index
            .get(&id)
            .and_then(|&idx| self.tables.get(idx))
            .ok_or_else(|| DbError::FieldMissing(format!("unknown table id {}", id.0)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.name_index.contains_key(name)
    }

    /// Register a table. Field ids are assigned by position.
    pub fn create_table(
        &mut self,
        name: &str,
        attrs: Vec<(String, AttrType, usize)>,
        storage_format: StorageFormat,
    ) -> DbResult<TableId> {
        if self.name_index.contains_key(name) {
            return Err(DbError::InvalidArgument(format!(
                "table '{name}' already exists"
            )));
        }
        if attrs.is_empty() {
            return Err(DbError::InvalidArgument(
                "a table needs at least one field".into(),
            ));
        }
        let fields = attrs
            .into_iter()
            .enumerate()
            .map(|(field_id, (name, attr_type, len))| FieldMeta::new(name, attr_type, len, field_id))
            .collect();
        let id = TableId(self.next_table_id);
        self.next_table_id += 1;
        self.tables.push(TableMeta {
            id,
            name: name.to_string(),
            fields,
            storage_format,
        });
        self.rebuild_indexes();
        Ok(id)
    }

    pub fn drop_table(&mut self, name: &str) -> DbResult<()> {
        let idx = *self
            .name_index
            .get(name)
            .ok_or_else(|| DbError::FieldMissing(format!("unknown table '{name}'")))?;
        self.tables.remove(idx);
        self.rebuild_indexes();
        Ok(())
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableMeta> {
        self.tables.iter()
    }

    fn rebuild_indexes(&mut self) {
        self.name_index.clear();
        self.id_index.clear();
        for (idx, table) in self.tables.iter().enumerate() {
            self.name_index.insert(table.name.clone(), idx);
            self.id_index.insert(table.id, idx);
        }
        if self.next_table_id == 0 {
            self.next_table_id = 1;
        }
    }
}

/// Stored width of an attribute, given the declared length for chars.
pub fn field_len(attr_type: AttrType, declared: usize) -> usize {
    attr_type.fixed_len().unwrap_or(declared)
}
