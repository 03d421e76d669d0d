//! Physical plan construction, including the fusion of
//! `GroupBy + OrderBy(count desc) + Limit` into the top-N-by-count
//! operator.

use crate::{
    CreateMaterializedViewVec, GroupByVec, LimitVec, OrderByLimitVec, OrderByVec,
    PhysicalOperator, ProjectVec, SchemaOps, SortKey, TableScanVec, TopCountVec,
};
use common::DbResult;
use expr::Expression;
use planner::LogicalPlan;
use std::sync::Arc;
use tracing::debug;

/// Lower a logical plan into its operator tree.
pub fn build_physical(
    plan: LogicalPlan,
    schema_ops: &Arc<dyn SchemaOps>,
) -> DbResult<Box<dyn PhysicalOperator>> {
    if let Some(op) = try_fuse_top_count(&plan, schema_ops)? {
        debug!("fused group-by / order-by-count / limit");
        return Ok(op);
    }

    match plan {
        LogicalPlan::TableScan {
            table,
            field_ids,
            predicates,
        } => {
            let table = schema_ops.find_table(&table)?;
            Ok(Box::new(TableScanVec::new(table, field_ids, predicates)))
        }
        LogicalPlan::Project { exprs, child } => {
            let child = build_physical(*child, schema_ops)?;
            Ok(Box::new(ProjectVec::new(child, exprs)))
        }
        LogicalPlan::GroupBy {
            group_exprs,
            aggregates,
            child,
        } => {
            let child = build_physical(*child, schema_ops)?;
            Ok(Box::new(GroupByVec::new(child, group_exprs, aggregates)?))
        }
        LogicalPlan::OrderBy { keys, child } => {
            let child = build_physical(*child, schema_ops)?;
            Ok(Box::new(OrderByVec::new(child, sort_keys(keys))))
        }
        LogicalPlan::Limit { n, child } => match *child {
            // Sort plus limit becomes the bounded-heap top-K.
            LogicalPlan::OrderBy { keys, child } => {
                let child = build_physical(*child, schema_ops)?;
                Ok(Box::new(OrderByLimitVec::new(child, sort_keys(keys), n)))
            }
            other => {
                let child = build_physical(other, schema_ops)?;
                Ok(Box::new(LimitVec::new(child, n)))
            }
        },
        LogicalPlan::CreateMaterializedView {
            name,
            source_table,
            child,
        } => {
            let child = build_physical(*child, schema_ops)?;
            Ok(Box::new(CreateMaterializedViewVec::new(
                schema_ops.clone(),
                name,
                source_table,
                child,
            )))
        }
    }
}

fn sort_keys(keys: Vec<(Expression, bool)>) -> Vec<SortKey> {
    keys.into_iter()
        .map(|(expr, asc)| SortKey { expr, asc })
        .collect()
}

/// Recognize `Limit(OrderBy(GroupBy))` where the single sort key is the
/// count aggregate, descending.
fn try_fuse_top_count(
    plan: &LogicalPlan,
    schema_ops: &Arc<dyn SchemaOps>,
) -> DbResult<Option<Box<dyn PhysicalOperator>>> {
    let (n, order) = match plan {
        LogicalPlan::Limit { n, child } => (*n, &**child),
        _ => return Ok(None),
    };
    let (keys, group) = match order {
        LogicalPlan::OrderBy { keys, child } => (keys, &**child),
        _ => return Ok(None),
    };
    let (group_exprs, aggregates, scan) = match group {
        LogicalPlan::GroupBy {
            group_exprs,
            aggregates,
            child,
        } => (group_exprs, aggregates, &**child),
        _ => return Ok(None),
    };
    let key = match keys.as_slice() {
        [(expr, false)] => expr,
        _ => return Ok(None),
    };
    let count_id = match key {
        Expression::ColumnRef(c) => c.column_id as usize,
        _ => return Ok(None),
    };
    if count_id < group_exprs.len() {
        return Ok(None);
    }
    let agg_pos = count_id - group_exprs.len();
    match aggregates.get(agg_pos) {
        Some(agg) if agg.kind == expr::AggregateKind::Count => {}
        _ => return Ok(None),
    }

    let child = match scan {
        LogicalPlan::TableScan {
            table,
            field_ids,
            predicates,
        } => {
            let table = schema_ops.find_table(table)?;
            Box::new(TableScanVec::new(
                table,
                field_ids.clone(),
                predicates.clone(),
            )) as Box<dyn PhysicalOperator>
        }
        _ => return Ok(None),
    };
    TopCountVec::try_new(child, group_exprs.clone(), aggregates.clone(), n)
        .map(|op| op.map(|op| Box::new(op) as Box<dyn PhysicalOperator>))
}
