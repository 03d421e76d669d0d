//! SQL text to statement AST, as a thin translation over a generic SQL
//! grammar. `LOAD DATA` uses its own small parser since it is not standard
//! SQL.

mod ast;

pub use ast::*;

use common::{DbError, DbResult};
use sqlparser::ast as sqlast;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;
use types::Value;

/// Parse one or more statements.
pub fn parse_sql(sql: &str) -> DbResult<Vec<Statement>> {
    let trimmed = sql.trim();
    if trimmed.to_ascii_lowercase().starts_with("load data") {
        return Ok(vec![parse_load_data(trimmed)?]);
    }

    let dialect = GenericDialect {};
    let stmts = SqlParser::parse_sql(&dialect, sql)
        .map_err(|e| DbError::InvalidArgument(format!("SQL parse error: {e}")))?;
    stmts.into_iter().map(map_statement).collect()
}

fn map_statement(stmt: sqlast::Statement) -> DbResult<Statement> {
    use sqlast::Statement as SqlStatement;

    match stmt {
        SqlStatement::CreateTable {
            name,
            columns,
            with_options,
            ..
        } => {
            let table = normalize_object_name(&name)?;
            let mapped_columns = columns
                .into_iter()
                .map(|col| ColumnDef {
                    name: col.name.value.to_lowercase(),
                    ty: col.data_type.to_string().to_uppercase(),
                })
                .collect();
            let storage_format = with_options.iter().find_map(|opt| {
                if opt.name.value.eq_ignore_ascii_case("storage_format") {
                    match &opt.value {
                        sqlast::Expr::Value(sqlast::Value::SingleQuotedString(s)) => {
                            Some(s.to_lowercase())
                        }
                        other => Some(other.to_string().to_lowercase()),
                    }
                } else {
                    None
                }
            });
            Ok(Statement::CreateTable {
                name: table,
                columns: mapped_columns,
                storage_format,
            })
        }
        SqlStatement::Drop {
            object_type, names, ..
        } => match object_type {
            sqlast::ObjectType::Table => {
                let name = names
                    .first()
                    .map(normalize_object_name)
                    .transpose()?
                    .ok_or_else(|| DbError::InvalidArgument("DROP needs a table".into()))?;
                Ok(Statement::DropTable { name })
            }
            other => Err(DbError::Unimplemented(format!("DROP {other:?}"))),
        },
        SqlStatement::Insert {
            table_name, source, ..
        } => {
            let table = normalize_object_name(&table_name)?;
            let source =
                source.ok_or_else(|| DbError::InvalidArgument("INSERT without VALUES".into()))?;
            let values = extract_values(*source)?;
            Ok(Statement::Insert { table, values })
        }
        SqlStatement::Query(query) => Ok(Statement::Select(map_select(*query)?)),
        SqlStatement::CreateView {
            name,
            materialized,
            query,
            ..
        } => {
            if !materialized {
                return Err(DbError::Unimplemented("plain views".into()));
            }
            Ok(Statement::CreateMaterializedView {
                name: normalize_object_name(&name)?,
                query: map_select(*query)?,
            })
        }
        other => Err(DbError::Unimplemented(format!(
            "statement {}",
            statement_keyword(&other)
        ))),
    }
}

fn statement_keyword(stmt: &sqlast::Statement) -> String {
    let text = stmt.to_string();
    text.split_whitespace()
        .next()
        .unwrap_or("?")
        .to_uppercase()
}

fn map_select(query: sqlast::Query) -> DbResult<SelectStatement> {
    use sqlast::SetExpr;

    let select = match *query.body {
        SetExpr::Select(select) => select,
        _ => return Err(DbError::Unimplemented("set operations".into())),
    };

    if select.from.len() != 1 {
        return Err(DbError::Unimplemented(
            "exactly one FROM table is supported".into(),
        ));
    }
    if !select.from[0].joins.is_empty() {
        return Err(DbError::Unimplemented("joins".into()));
    }
    let table = match &select.from[0].relation {
        sqlast::TableFactor::Table { name, .. } => normalize_object_name(name)?,
        _ => return Err(DbError::Unimplemented("derived tables".into())),
    };

    let items = select
        .projection
        .into_iter()
        .map(map_select_item)
        .collect::<DbResult<Vec<_>>>()?;

    let selection = select.selection.map(map_condition).transpose()?;

    let group_by = match select.group_by {
        sqlast::GroupByExpr::Expressions(exprs) => exprs
            .into_iter()
            .map(|expr| match expr {
                sqlast::Expr::Identifier(ident) => Ok(ident.value.to_lowercase()),
                other => Err(DbError::Unimplemented(format!(
                    "GROUP BY expression {other}"
                ))),
            })
            .collect::<DbResult<Vec<_>>>()?,
        sqlast::GroupByExpr::All => {
            return Err(DbError::Unimplemented("GROUP BY ALL".into()))
        }
    };

    let order_by = query
        .order_by
        .into_iter()
        .map(map_order_by)
        .collect::<DbResult<Vec<_>>>()?;

    let limit = query
        .limit
        .map(|expr| match expr {
            sqlast::Expr::Value(sqlast::Value::Number(n, _)) => n
                .parse::<u64>()
                .map_err(|_| DbError::InvalidArgument(format!("bad LIMIT: {n}"))),
            other => Err(DbError::InvalidArgument(format!(
                "LIMIT must be an integer, got {other}"
            ))),
        })
        .transpose()?;

    Ok(SelectStatement {
        items,
        table,
        selection,
        group_by,
        order_by,
        limit,
    })
}

fn map_select_item(item: sqlast::SelectItem) -> DbResult<SelectItem> {
    match item {
        sqlast::SelectItem::Wildcard(_) => Ok(SelectItem::Wildcard),
        sqlast::SelectItem::UnnamedExpr(expr) => map_projection_expr(expr),
        sqlast::SelectItem::ExprWithAlias { expr, .. } => map_projection_expr(expr),
        other => Err(DbError::Unimplemented(format!("select item {other}"))),
    }
}

fn map_projection_expr(expr: sqlast::Expr) -> DbResult<SelectItem> {
    match expr {
        sqlast::Expr::Identifier(ident) => Ok(SelectItem::Column(ident.value.to_lowercase())),
        sqlast::Expr::CompoundIdentifier(parts) => parts
            .last()
            .map(|ident| SelectItem::Column(ident.value.to_lowercase()))
            .ok_or_else(|| DbError::InvalidArgument("empty identifier".into())),
        sqlast::Expr::Function(func) => {
            let (kind, arg) = map_aggregate(&func)?;
            Ok(SelectItem::Aggregate { kind, arg })
        }
        other => Err(DbError::Unimplemented(format!("projection {other}"))),
    }
}

fn map_aggregate(func: &sqlast::Function) -> DbResult<(String, Option<String>)> {
    let kind = func
        .name
        .0
        .first()
        .map(|ident| ident.value.to_lowercase())
        .ok_or_else(|| DbError::InvalidArgument("unnamed function".into()))?;
    if !matches!(kind.as_str(), "count" | "sum" | "avg") {
        return Err(DbError::Unimplemented(format!("function {kind}")));
    }
    let arg = match func.args.first() {
        None | Some(sqlast::FunctionArg::Unnamed(sqlast::FunctionArgExpr::Wildcard)) => None,
        Some(sqlast::FunctionArg::Unnamed(sqlast::FunctionArgExpr::Expr(
            sqlast::Expr::Identifier(ident),
        ))) => Some(ident.value.to_lowercase()),
        Some(other) => {
            return Err(DbError::Unimplemented(format!(
                "aggregate argument {other}"
            )))
        }
    };
    Ok((kind, arg))
}

fn map_order_by(expr: sqlast::OrderByExpr) -> DbResult<OrderByItem> {
    let target = match expr.expr {
        sqlast::Expr::Identifier(ident) => OrderTarget::Column(ident.value.to_lowercase()),
        sqlast::Expr::CompoundIdentifier(parts) => parts
            .last()
            .map(|ident| OrderTarget::Column(ident.value.to_lowercase()))
            .ok_or_else(|| DbError::InvalidArgument("empty identifier".into()))?,
        sqlast::Expr::Function(func) => {
            let (kind, arg) = map_aggregate(&func)?;
            OrderTarget::Aggregate { kind, arg }
        }
        other => {
            return Err(DbError::Unimplemented(format!(
                "ORDER BY expression {other}"
            )))
        }
    };
    Ok(OrderByItem {
        target,
        asc: expr.asc.unwrap_or(true),
    })
}

fn map_condition(expr: sqlast::Expr) -> DbResult<ParsedExpr> {
    use sqlast::Expr as SqlExpr;

    match expr {
        SqlExpr::Identifier(ident) => Ok(ParsedExpr::Column(ident.value.to_lowercase())),
        SqlExpr::CompoundIdentifier(parts) => parts
            .last()
            .map(|ident| ParsedExpr::Column(ident.value.to_lowercase()))
            .ok_or_else(|| DbError::InvalidArgument("empty identifier".into())),
        SqlExpr::Value(value) => Ok(ParsedExpr::Literal(map_value(value)?)),
        SqlExpr::Nested(inner) => map_condition(*inner),
        SqlExpr::UnaryOp {
            op: sqlast::UnaryOperator::Minus,
            expr,
        } => match map_condition(*expr)? {
            ParsedExpr::Literal(Value::Int(v)) => Ok(ParsedExpr::Literal(Value::Int(-v))),
            ParsedExpr::Literal(Value::Bigint(v)) => Ok(ParsedExpr::Literal(Value::Bigint(-v))),
            ParsedExpr::Literal(Value::Float(v)) => Ok(ParsedExpr::Literal(Value::Float(-v))),
            other => Err(DbError::InvalidArgument(format!("cannot negate {other:?}"))),
        },
        SqlExpr::BinaryOp { left, op, right } => {
            let op = match op {
                sqlast::BinaryOperator::Eq => BinaryOp::Eq,
                sqlast::BinaryOperator::NotEq => BinaryOp::Ne,
                sqlast::BinaryOperator::Lt => BinaryOp::Lt,
                sqlast::BinaryOperator::LtEq => BinaryOp::Le,
                sqlast::BinaryOperator::Gt => BinaryOp::Gt,
                sqlast::BinaryOperator::GtEq => BinaryOp::Ge,
                sqlast::BinaryOperator::And => BinaryOp::And,
                other => {
                    return Err(DbError::Unimplemented(format!("operator {other}")))
                }
            };
            Ok(ParsedExpr::Binary {
                op,
                left: Box::new(map_condition(*left)?),
                right: Box::new(map_condition(*right)?),
            })
        }
        other => Err(DbError::Unimplemented(format!("condition {other}"))),
    }
}

fn map_value(value: sqlast::Value) -> DbResult<Value> {
    match value {
        sqlast::Value::Number(text, _) => {
            if text.contains('.') {
                text.parse::<f32>()
                    .map(Value::Float)
                    .map_err(|_| DbError::InvalidArgument(format!("bad number: {text}")))
            } else if let Ok(v) = text.parse::<i32>() {
                Ok(Value::Int(v))
            } else {
                text.parse::<i64>()
                    .map(Value::Bigint)
                    .map_err(|_| DbError::InvalidArgument(format!("bad number: {text}")))
            }
        }
        sqlast::Value::SingleQuotedString(s) => Ok(Value::Chars(s)),
        sqlast::Value::Boolean(b) => Ok(Value::Bool(b)),
        other => Err(DbError::Unimplemented(format!("literal {other}"))),
    }
}

fn extract_values(query: sqlast::Query) -> DbResult<Vec<Value>> {
    match *query.body {
        sqlast::SetExpr::Values(values) => {
            let mut rows = values.rows.into_iter();
            let row = rows
                .next()
                .ok_or_else(|| DbError::InvalidArgument("INSERT without a row".into()))?;
            if rows.next().is_some() {
                return Err(DbError::Unimplemented("multi-row INSERT".into()));
            }
            row.into_iter()
                .map(|expr| match map_condition(expr)? {
                    ParsedExpr::Literal(v) => Ok(v),
                    other => Err(DbError::InvalidArgument(format!(
                        "INSERT expects literals, got {other:?}"
                    ))),
                })
                .collect()
        }
        _ => Err(DbError::InvalidArgument("INSERT expects VALUES".into())),
    }
}

fn normalize_object_name(name: &sqlast::ObjectName) -> DbResult<String> {
    name.0
        .first()
        .map(|ident| ident.value.to_lowercase())
        .ok_or_else(|| DbError::InvalidArgument("empty object name".into()))
}

/// `LOAD DATA INFILE '<file>' INTO TABLE <t>
///  [FIELDS TERMINATED BY '<c>' [ENCLOSED BY '<c>']]`
fn parse_load_data(sql: &str) -> DbResult<Statement> {
    let text = sql.trim().trim_end_matches(';');
    let lower = text.to_ascii_lowercase();

    let file = quoted_after(text, &lower, "infile")?
        .ok_or_else(|| DbError::InvalidArgument("LOAD DATA needs INFILE '<path>'".into()))?;
    let table = {
        let at = lower
            .find("into table")
            .ok_or_else(|| DbError::InvalidArgument("LOAD DATA needs INTO TABLE".into()))?;
        text[at + "into table".len()..]
            .split_whitespace()
            .next()
            .map(|s| s.to_lowercase())
            .ok_or_else(|| DbError::InvalidArgument("LOAD DATA needs a table name".into()))?
    };
    let terminated = quoted_after(text, &lower, "terminated by")?
        .and_then(|s| s.chars().next())
        .unwrap_or(',');
    let enclosed = quoted_after(text, &lower, "enclosed by")?
        .and_then(|s| s.chars().next())
        .unwrap_or('"');

    Ok(Statement::LoadData {
        file,
        table,
        terminated,
        enclosed,
    })
}

/// The single-quoted token following `keyword`, if the keyword appears.
fn quoted_after(text: &str, lower: &str, keyword: &str) -> DbResult<Option<String>> {
    let at = match lower.find(keyword) {
        Some(at) => at + keyword.len(),
        None => return Ok(None),
    };
    let rest = text[at..].trim_start();
    if !rest.starts_with('\'') {
        return Err(DbError::InvalidArgument(format!(
            "expected a quoted value after {keyword}"
        )));
    }
    let inner = &rest[1..];
    let end = inner
        .find('\'')
        .ok_or_else(|| DbError::InvalidArgument(format!("unterminated quote after {keyword}")))?;
    Ok(Some(inner[..end].to_string()))
}
