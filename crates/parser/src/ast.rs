//! Statement AST handed to the planner.

use types::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    CreateTable {
        name: String,
        columns: Vec<ColumnDef>,
        /// `with (storage_format = 'pax' | 'row')`; PAX when absent.
        storage_format: Option<String>,
    },
    DropTable {
        name: String,
    },
    Insert {
        table: String,
        values: Vec<Value>,
    },
    Select(SelectStatement),
    CreateMaterializedView {
        name: String,
        query: SelectStatement,
    },
    LoadData {
        file: String,
        table: String,
        terminated: char,
        enclosed: char,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    /// Uppercased SQL type text, e.g. `INT`, `CHAR(4)`, `TEXT`.
    pub ty: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectStatement {
    pub items: Vec<SelectItem>,
    pub table: String,
    pub selection: Option<ParsedExpr>,
    pub group_by: Vec<String>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<u64>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SelectItem {
    Wildcard,
    Column(String),
    Aggregate {
        /// `count`, `sum`, or `avg`.
        kind: String,
        /// `None` for `count(*)`.
        arg: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum OrderTarget {
    Column(String),
    Aggregate { kind: String, arg: Option<String> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderByItem {
    pub target: OrderTarget,
    pub asc: bool,
}

/// Condition tree of the WHERE clause.
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedExpr {
    Column(String),
    Literal(Value),
    Binary {
        op: BinaryOp,
        left: Box<ParsedExpr>,
        right: Box<ParsedExpr>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
}
