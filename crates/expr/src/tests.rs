use super::*;
use columnar::{Chunk, Column};
use types::{AttrType, Value};

fn int_chunk(id: i32, values: &[i32]) -> Chunk {
    let mut chunk = Chunk::new();
    let mut col = Column::new(AttrType::Ints, 4);
    for v in values {
        col.append_value(&Value::Int(*v)).unwrap();
    }
    chunk.add_column(col, id);
    chunk
}

fn col_ref(id: i32) -> Expression {
    Expression::column_ref(id, AttrType::Ints, 4, "v")
}

#[test]
fn comparison_clears_mask_bits() {
    let chunk = int_chunk(0, &[10, 20, 30, 40, 50]);
    let pred = Expression::Comparison {
        op: CompOp::Gt,
        left: Box::new(col_ref(0)),
        right: Box::new(Expression::Literal(Value::Int(25))),
    };
    let mut select = vec![1u8; 5];
    pred.eval(&chunk, &mut select).unwrap();
    assert_eq!(select, vec![0, 0, 1, 1, 1]);
}

#[test]
fn predicates_and_by_sharing_the_mask() {
    let chunk = int_chunk(0, &[10, 20, 30, 40, 50]);
    let ge20 = Expression::Comparison {
        op: CompOp::Ge,
        left: Box::new(col_ref(0)),
        right: Box::new(Expression::Literal(Value::Int(20))),
    };
    let lt50 = Expression::Comparison {
        op: CompOp::Lt,
        left: Box::new(col_ref(0)),
        right: Box::new(Expression::Literal(Value::Int(50))),
    };
    let mut select = vec![1u8; 5];
    ge20.eval(&chunk, &mut select).unwrap();
    lt50.eval(&chunk, &mut select).unwrap();
    assert_eq!(select, vec![0, 1, 1, 1, 0]);
}

#[test]
fn column_ref_materializes_as_view() {
    let chunk = int_chunk(3, &[7, 8]);
    let mut out = Column::default();
    col_ref(3).get_column(&chunk, &mut out).unwrap();
    assert_eq!(out.mode(), columnar::ColumnMode::Referenced);
    assert_eq!(out.get_value(1), Value::Int(8));
}

#[test]
fn literal_materializes_as_constant() {
    let chunk = int_chunk(0, &[1, 2, 3]);
    let mut out = Column::default();
    Expression::Literal(Value::Int(9))
        .get_column(&chunk, &mut out)
        .unwrap();
    assert_eq!(out.mode(), columnar::ColumnMode::Constant);
    assert_eq!(out.count(), 3);
    assert_eq!(out.get_value(2), Value::Int(9));
}

#[test]
fn arithmetic_widens_types() {
    let chunk = int_chunk(0, &[3, 4]);
    let expr = Expression::Arithmetic {
        op: ArithOp::Mul,
        left: Box::new(col_ref(0)),
        right: Box::new(Expression::Literal(Value::Bigint(1_000_000_000_000))),
    };
    assert_eq!(expr.value_type(), AttrType::Bigints);
    let mut out = Column::default();
    expr.get_column(&chunk, &mut out).unwrap();
    assert_eq!(out.get_value(0), Value::Bigint(3_000_000_000_000));
}

#[test]
fn sum_state_update_column_matches_reference() {
    let mut col = Column::new(AttrType::Ints, 4);
    let values = [5, -3, 17, i32::MAX, 1];
    for v in values {
        col.append_value(&Value::Int(v)).unwrap();
    }
    let mut state = AggState::create(AggregateKind::Sum, AttrType::Ints).unwrap();
    state.update_column(&col).unwrap();
    let expected = simd::sum_i32_scalar(&values);
    match state {
        AggState::SumInt(s) => assert_eq!(s.value, expected),
        _ => panic!("wrong state"),
    }
}

#[test]
fn count_state_counts_rows_and_scalars() {
    let mut state = AggState::create(AggregateKind::Count, AttrType::Ints).unwrap();
    state.update_value(&Value::Int(99)).unwrap();
    let mut col = Column::new(AttrType::Ints, 4);
    for v in 0..7 {
        col.append_value(&Value::Int(v)).unwrap();
    }
    state.update_column(&col).unwrap();
    assert_eq!(state.count_value(), 8);
}

#[test]
fn avg_state_finalizes_as_float() {
    let mut state = AggState::create(AggregateKind::Avg, AttrType::Ints).unwrap();
    for v in [1, 2, 3, 4] {
        state.update_value(&Value::Int(v)).unwrap();
    }
    let mut out = Column::new(AttrType::Floats, 4);
    state.finalize_into(&mut out).unwrap();
    assert_eq!(out.get_value(0), Value::Float(2.5));
}

#[test]
fn sum_finalize_keeps_child_type() {
    let mut state = AggState::create(AggregateKind::Sum, AttrType::Bigints).unwrap();
    state.update_value(&Value::Bigint(1 << 40)).unwrap();
    state.update_value(&Value::Bigint(5)).unwrap();
    let mut out = Column::new(AttrType::Bigints, 8);
    state.finalize_into(&mut out).unwrap();
    assert_eq!(out.get_value(0), Value::Bigint((1 << 40) + 5));
}

#[test]
fn aggregate_expr_output_types() {
    let count = AggregateExpr {
        kind: AggregateKind::Count,
        child: Box::new(Expression::Literal(Value::Int(1))),
        name: "count(*)".into(),
    };
    assert_eq!(count.value_type(), AttrType::Bigints);
    let avg = AggregateExpr {
        kind: AggregateKind::Avg,
        child: Box::new(col_ref(0)),
        name: "avg(v)".into(),
    };
    assert_eq!(avg.value_type(), AttrType::Floats);
    let sum = AggregateExpr {
        kind: AggregateKind::Sum,
        child: Box::new(col_ref(0)),
        name: "sum(v)".into(),
    };
    assert_eq!(sum.value_type(), AttrType::Ints);
}

#[test]
fn comparison_across_numeric_types() {
    let chunk = int_chunk(0, &[10, 20]);
    let pred = Expression::Comparison {
        op: CompOp::Lt,
        left: Box::new(col_ref(0)),
        right: Box::new(Expression::Literal(Value::Float(15.5))),
    };
    let mut select = vec![1u8; 2];
    pred.eval(&chunk, &mut select).unwrap();
    assert_eq!(select, vec![1, 0]);
}
