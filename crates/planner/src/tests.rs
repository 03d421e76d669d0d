use super::*;
use catalog::{FieldMeta, StorageFormat, TableMeta};
use common::TableId;
use parser::{parse_sql, Statement};

fn orders_meta() -> TableMeta {
    TableMeta {
        id: TableId(1),
        name: "orders".into(),
        fields: vec![
            FieldMeta::new("id", AttrType::Ints, 4, 0),
            FieldMeta::new("total", AttrType::Bigints, 8, 1),
            FieldMeta::new("tag", AttrType::Chars, 4, 2),
            FieldMeta::new("day", AttrType::Dates, 4, 3),
        ],
        storage_format: StorageFormat::Pax,
    }
}

fn plan(sql: &str) -> LogicalPlan {
    let stmt = parse_sql(sql).unwrap().remove(0);
    match stmt {
        Statement::Select(query) => plan_select(&query, &orders_meta()).unwrap(),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn predicates_push_into_the_scan() {
    let plan = plan("SELECT id FROM orders WHERE id > 3 AND tag = 'hot'");
    let scan = match plan {
        LogicalPlan::Project { child, .. } => *child,
        other => panic!("expected project on top, got {other:?}"),
    };
    match scan {
        LogicalPlan::TableScan {
            table, predicates, ..
        } => {
            assert_eq!(table, "orders");
            assert_eq!(predicates.len(), 2);
        }
        other => panic!("expected scan, got {other:?}"),
    }
}

#[test]
fn date_literals_coerce_against_date_fields() {
    let plan = plan("SELECT id FROM orders WHERE day = '2024-02-29'");
    let scan = match plan {
        LogicalPlan::Project { child, .. } => *child,
        other => panic!("unexpected: {other:?}"),
    };
    let predicates = match scan {
        LogicalPlan::TableScan { predicates, .. } => predicates,
        other => panic!("unexpected: {other:?}"),
    };
    match &predicates[0] {
        Expression::Comparison { right, .. } => match &**right {
            Expression::Literal(Value::Date(20240229)) => {}
            other => panic!("literal not coerced: {other:?}"),
        },
        other => panic!("unexpected predicate: {other:?}"),
    }
}

#[test]
fn aggregate_plan_shape() {
    let plan = plan(
        "SELECT tag, count(*) FROM orders GROUP BY tag ORDER BY count(*) DESC LIMIT 2",
    );
    let order_by = match plan {
        LogicalPlan::Limit { n, child } => {
            assert_eq!(n, 2);
            *child
        }
        other => panic!("expected limit on top, got {other:?}"),
    };
    let group_by = match order_by {
        LogicalPlan::OrderBy { keys, child } => {
            assert_eq!(keys.len(), 1);
            assert!(!keys[0].1, "count(*) key must be descending");
            match &keys[0].0 {
                Expression::ColumnRef(c) => assert_eq!(c.column_id, 1),
                other => panic!("unexpected key: {other:?}"),
            }
            *child
        }
        other => panic!("expected order by, got {other:?}"),
    };
    match group_by {
        LogicalPlan::GroupBy {
            group_exprs,
            aggregates,
            ..
        } => {
            assert_eq!(group_exprs.len(), 1);
            assert_eq!(aggregates.len(), 1);
            assert_eq!(aggregates[0].kind, AggregateKind::Count);
        }
        other => panic!("expected group by, got {other:?}"),
    }
}

#[test]
fn scan_reads_only_needed_fields() {
    let plan = plan("SELECT id FROM orders WHERE total > 10");
    let scan = match plan {
        LogicalPlan::Project { child, .. } => *child,
        other => panic!("unexpected: {other:?}"),
    };
    match scan {
        LogicalPlan::TableScan { field_ids, .. } => {
            assert_eq!(field_ids, vec![0, 1]);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn selected_column_must_be_grouped() {
    let stmt = parse_sql("SELECT id, count(*) FROM orders GROUP BY tag")
        .unwrap()
        .remove(0);
    let query = match stmt {
        Statement::Select(query) => query,
        other => panic!("unexpected: {other:?}"),
    };
    assert!(plan_select(&query, &orders_meta()).is_err());
}

#[test]
fn wildcard_expands_to_all_fields() {
    let plan = plan("SELECT * FROM orders");
    match plan {
        LogicalPlan::Project { exprs, .. } => assert_eq!(exprs.len(), 4),
        other => panic!("unexpected: {other:?}"),
    }
}
