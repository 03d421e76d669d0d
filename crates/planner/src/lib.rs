//! Logical planning: resolve a parsed SELECT against the table schema into
//! a tree of logical operators. Conjunctive predicates are pushed into the
//! scan node.

#[cfg(test)]
mod tests;

use catalog::TableMeta;
use common::{DbError, DbResult};
use expr::{AggregateExpr, AggregateKind, CompOp, Expression};
use parser::{BinaryOp, OrderTarget, ParsedExpr, SelectItem, SelectStatement};
use types::{AttrType, Value};

#[derive(Debug)]
pub enum LogicalPlan {
    TableScan {
        table: String,
        /// Field ids the scan must materialize.
        field_ids: Vec<usize>,
        predicates: Vec<Expression>,
    },
    Project {
        exprs: Vec<Expression>,
        child: Box<LogicalPlan>,
    },
    GroupBy {
        group_exprs: Vec<Expression>,
        aggregates: Vec<AggregateExpr>,
        child: Box<LogicalPlan>,
    },
    OrderBy {
        /// `(key expression, ascending)` pairs.
        keys: Vec<(Expression, bool)>,
        child: Box<LogicalPlan>,
    },
    Limit {
        n: usize,
        child: Box<LogicalPlan>,
    },
    CreateMaterializedView {
        name: String,
        source_table: String,
        child: Box<LogicalPlan>,
    },
}

/// Plan a SELECT over one table.
pub fn plan_select(stmt: &SelectStatement, meta: &TableMeta) -> DbResult<LogicalPlan> {
    let items = expand_wildcard(&stmt.items, meta);

    let mut predicates = Vec::new();
    if let Some(condition) = &stmt.selection {
        collect_conjuncts(condition, meta, &mut predicates)?;
    }

    let mut needed = Vec::new();
    let mut need = |id: usize| {
        if !needed.contains(&id) {
            needed.push(id);
        }
    };
    for item in &items {
        match item {
            SelectItem::Column(name) => need(meta.field_by_name(name)?.field_id),
            SelectItem::Aggregate { arg: Some(name), .. } => {
                need(meta.field_by_name(name)?.field_id)
            }
            _ => {}
        }
    }
    for name in &stmt.group_by {
        need(meta.field_by_name(name)?.field_id);
    }
    for pred in &predicates {
        collect_pred_fields(pred, &mut needed);
    }
    let is_aggregate = !stmt.group_by.is_empty()
        || items
            .iter()
            .any(|item| matches!(item, SelectItem::Aggregate { .. }));
    if !is_aggregate {
        for order in &stmt.order_by {
            if let OrderTarget::Column(name) = &order.target {
                let id = meta.field_by_name(name)?.field_id;
                if !needed.contains(&id) {
                    needed.push(id);
                }
            }
        }
    }
    needed.sort_unstable();

    let scan = LogicalPlan::TableScan {
        table: meta.name.clone(),
        field_ids: needed,
        predicates,
    };

    if is_aggregate {
        plan_aggregate(stmt, &items, meta, scan)
    } else {
        plan_plain(stmt, &items, meta, scan)
    }
}

/// Plan a materialized view definition.
pub fn plan_materialized_view(
    name: &str,
    stmt: &SelectStatement,
    meta: &TableMeta,
) -> DbResult<LogicalPlan> {
    let child = plan_select(stmt, meta)?;
    Ok(LogicalPlan::CreateMaterializedView {
        name: name.to_string(),
        source_table: meta.name.clone(),
        child: Box::new(child),
    })
}

fn expand_wildcard(items: &[SelectItem], meta: &TableMeta) -> Vec<SelectItem> {
    let mut expanded = Vec::new();
    for item in items {
        match item {
            SelectItem::Wildcard => {
                for field in &meta.fields {
                    expanded.push(SelectItem::Column(field.name.clone()));
                }
            }
            other => expanded.push(other.clone()),
        }
    }
    expanded
}

fn field_ref(meta: &TableMeta, name: &str) -> DbResult<Expression> {
    let field = meta.field_by_name(name)?;
    Ok(Expression::column_ref(
        field.field_id as i32,
        field.attr_type,
        field.len,
        &field.name,
    ))
}

fn plan_plain(
    stmt: &SelectStatement,
    items: &[SelectItem],
    meta: &TableMeta,
    scan: LogicalPlan,
) -> DbResult<LogicalPlan> {
    let mut plan = scan;

    if !stmt.order_by.is_empty() {
        let keys = stmt
            .order_by
            .iter()
            .map(|order| match &order.target {
                OrderTarget::Column(name) => Ok((field_ref(meta, name)?, order.asc)),
                OrderTarget::Aggregate { .. } => Err(DbError::InvalidArgument(
                    "aggregate ORDER BY needs GROUP BY".into(),
                )),
            })
            .collect::<DbResult<Vec<_>>>()?;
        plan = LogicalPlan::OrderBy {
            keys,
            child: Box::new(plan),
        };
    }

    if let Some(n) = stmt.limit {
        plan = LogicalPlan::Limit {
            n: n as usize,
            child: Box::new(plan),
        };
    }

    // Projection last, so a limit sits directly on the sort and the
    // bounded-heap variant can take over.
    let exprs = items
        .iter()
        .map(|item| match item {
            SelectItem::Column(name) => field_ref(meta, name),
            _ => Err(DbError::Internal("aggregate leaked into plain plan".into())),
        })
        .collect::<DbResult<Vec<_>>>()?;
    Ok(LogicalPlan::Project {
        exprs,
        child: Box::new(plan),
    })
}

fn aggregate_kind(kind: &str) -> DbResult<AggregateKind> {
    match kind {
        "count" => Ok(AggregateKind::Count),
        "sum" => Ok(AggregateKind::Sum),
        "avg" => Ok(AggregateKind::Avg),
        other => Err(DbError::Unimplemented(format!("aggregate {other}"))),
    }
}

fn plan_aggregate(
    stmt: &SelectStatement,
    items: &[SelectItem],
    meta: &TableMeta,
    scan: LogicalPlan,
) -> DbResult<LogicalPlan> {
    // Non-aggregate select items are the group keys and must lead the list
    // in group-by order; aggregates follow.
    let mut group_exprs = Vec::new();
    let mut group_names = Vec::new();
    let mut aggregates = Vec::new();
    for item in items {
        match item {
            SelectItem::Column(name) => {
                if !aggregates.is_empty() {
                    return Err(DbError::InvalidArgument(
                        "group columns must precede aggregates in the select list".into(),
                    ));
                }
                if !stmt.group_by.contains(name) {
                    return Err(DbError::InvalidArgument(format!(
                        "column '{name}' is selected but not grouped"
                    )));
                }
                group_names.push(name.clone());
                group_exprs.push(field_ref(meta, name)?);
            }
            SelectItem::Aggregate { kind, arg } => {
                let kind = aggregate_kind(kind)?;
                let (child, label) = match arg {
                    Some(name) => (field_ref(meta, name)?, format!("{kind}({name})")),
                    None => (Expression::Literal(Value::Int(1)), format!("{kind}(*)")),
                };
                aggregates.push(AggregateExpr {
                    kind,
                    child: Box::new(child),
                    name: label,
                });
            }
            SelectItem::Wildcard => unreachable!("wildcards expand before planning"),
        }
    }
    for name in &stmt.group_by {
        if !group_names.contains(name) {
            return Err(DbError::InvalidArgument(format!(
                "grouped column '{name}' missing from the select list"
            )));
        }
    }
    if aggregates.is_empty() {
        return Err(DbError::InvalidArgument(
            "GROUP BY without an aggregate".into(),
        ));
    }

    let group_width = group_exprs.len();
    let mut plan = LogicalPlan::GroupBy {
        group_exprs: group_exprs.clone(),
        aggregates: aggregates.clone(),
        child: Box::new(scan),
    };

    if !stmt.order_by.is_empty() {
        let keys = stmt
            .order_by
            .iter()
            .map(|order| {
                let expr = match &order.target {
                    OrderTarget::Column(name) => {
                        let pos = group_names
                            .iter()
                            .position(|g| g == name)
                            .ok_or_else(|| {
                                DbError::InvalidArgument(format!(
                                    "ORDER BY column '{name}' is not a group key"
                                ))
                            })?;
                        let source = &group_exprs[pos];
                        Expression::column_ref(
                            pos as i32,
                            source.value_type(),
                            source.value_length(),
                            name,
                        )
                    }
                    OrderTarget::Aggregate { kind, arg } => {
                        let kind = aggregate_kind(kind)?;
                        let pos = aggregates
                            .iter()
                            .position(|agg| {
                                agg.kind == kind
                                    && match (arg, &*agg.child) {
                                        (None, Expression::Literal(_)) => true,
                                        (Some(name), Expression::ColumnRef(c)) => {
                                            &c.name == name
                                        }
                                        _ => false,
                                    }
                            })
                            .ok_or_else(|| {
                                DbError::InvalidArgument(
                                    "ORDER BY aggregate is not in the select list".into(),
                                )
                            })?;
                        let agg = &aggregates[pos];
                        Expression::column_ref(
                            (group_width + pos) as i32,
                            agg.value_type(),
                            agg.value_length(),
                            &agg.name,
                        )
                    }
                };
                Ok((expr, order.asc))
            })
            .collect::<DbResult<Vec<_>>>()?;
        plan = LogicalPlan::OrderBy {
            keys,
            child: Box::new(plan),
        };
    }

    if let Some(n) = stmt.limit {
        plan = LogicalPlan::Limit {
            n: n as usize,
            child: Box::new(plan),
        };
    }
    Ok(plan)
}

/// Split an AND tree into scan predicates.
fn collect_conjuncts(
    condition: &ParsedExpr,
    meta: &TableMeta,
    out: &mut Vec<Expression>,
) -> DbResult<()> {
    match condition {
        ParsedExpr::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => {
            collect_conjuncts(left, meta, out)?;
            collect_conjuncts(right, meta, out)?;
            Ok(())
        }
        ParsedExpr::Binary { op, left, right } => {
            let op = match op {
                BinaryOp::Eq => CompOp::Eq,
                BinaryOp::Ne => CompOp::Ne,
                BinaryOp::Lt => CompOp::Lt,
                BinaryOp::Le => CompOp::Le,
                BinaryOp::Gt => CompOp::Gt,
                BinaryOp::Ge => CompOp::Ge,
                BinaryOp::And => unreachable!(),
            };
            let (left, right) = resolve_operands(left, right, meta)?;
            out.push(Expression::Comparison {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
            Ok(())
        }
        other => Err(DbError::InvalidArgument(format!(
            "WHERE expects comparisons, got {other:?}"
        ))),
    }
}

fn resolve_operands(
    left: &ParsedExpr,
    right: &ParsedExpr,
    meta: &TableMeta,
) -> DbResult<(Expression, Expression)> {
    let mut resolve = |side: &ParsedExpr, other: &ParsedExpr| -> DbResult<Expression> {
        match side {
            ParsedExpr::Column(name) => field_ref(meta, name),
            ParsedExpr::Literal(value) => {
                // Implicit promotion toward the column the literal meets.
                let target = match other {
                    ParsedExpr::Column(name) => Some(meta.field_by_name(name)?.attr_type),
                    _ => None,
                };
                Ok(Expression::Literal(coerce_literal(value, target)?))
            }
            ParsedExpr::Binary { .. } => Err(DbError::InvalidArgument(
                "nested conditions are not comparable values".into(),
            )),
        }
    };
    Ok((resolve(left, right)?, resolve(right, left)?))
}

/// Promote a literal toward a field type when the cast is cheap enough.
fn coerce_literal(value: &Value, target: Option<AttrType>) -> DbResult<Value> {
    let target = match target {
        Some(t) if t != value.attr_type() => t,
        _ => return Ok(value.clone()),
    };
    if Value::cast_cost(value.attr_type(), target) == i32::MAX {
        // Numeric widening is handled at comparison time.
        return Ok(value.clone());
    }
    Ok(value.cast_to(target)?)
}

fn collect_pred_fields(expr: &Expression, needed: &mut Vec<usize>) {
    match expr {
        Expression::ColumnRef(c) => {
            let id = c.column_id as usize;
            if !needed.contains(&id) {
                needed.push(id);
            }
        }
        Expression::Comparison { left, right, .. }
        | Expression::Arithmetic { left, right, .. } => {
            collect_pred_fields(left, needed);
            collect_pred_fields(right, needed);
        }
        _ => {}
    }
}
