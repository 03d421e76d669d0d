use super::*;
use proptest::prelude::*;
use std::cmp::Ordering::{Equal, Greater, Less};

#[test]
fn compare_within_type() {
    assert_eq!(Value::Int(1).compare(&Value::Int(2)), Some(Less));
    assert_eq!(
        Value::Chars("a".into()).compare(&Value::Chars("a".into())),
        Some(Equal)
    );
    assert_eq!(Value::Bool(true).compare(&Value::Bool(false)), Some(Greater));
    assert_eq!(
        Value::Date(20240131).compare(&Value::Date(20240201)),
        Some(Less)
    );
}

#[test]
fn compare_widens_numerics() {
    assert_eq!(Value::Int(3).compare(&Value::Float(2.5)), Some(Greater));
    assert_eq!(Value::Bigint(7).compare(&Value::Int(7)), Some(Equal));
    assert_eq!(Value::Float(1.5).compare(&Value::Bigint(2)), Some(Less));
}

#[test]
fn compare_rejects_unrelated_kinds() {
    assert_eq!(Value::Int(1).compare(&Value::Bool(true)), None);
    assert_eq!(Value::Vector(vec![1.0]).compare(&Value::Int(1)), None);
}

#[test]
fn date_parse_format_round_trip() {
    let parsed = type_instance(AttrType::Dates)
        .set_value_from_str("2024-02-29")
        .unwrap();
    assert_eq!(parsed, Value::Date(20240229));
    assert_eq!(parsed.to_string(), "2024-02-29");
}

#[test]
fn date_parse_rejects_garbage() {
    let err = type_instance(AttrType::Dates)
        .set_value_from_str("yesterday")
        .unwrap_err();
    assert!(matches!(err, TypeError::Invalid(_)));
}

#[test]
fn text_to_date_cast_is_free_but_checked() {
    assert_eq!(Value::cast_cost(AttrType::Texts, AttrType::Dates), 0);
    assert_eq!(
        Value::Texts("2024-06-01".into()).cast_to(AttrType::Dates),
        Ok(Value::Date(20240601))
    );
    let err = Value::Texts("not-a-date".into())
        .cast_to(AttrType::Dates)
        .unwrap_err();
    assert!(matches!(err, TypeError::Invalid(_)));
}

#[test]
fn text_to_chars_costs_fifty() {
    assert_eq!(Value::cast_cost(AttrType::Texts, AttrType::Chars), 50);
}

#[test]
fn int_promotions() {
    assert_eq!(Value::Int(5).cast_to(AttrType::Bigints), Ok(Value::Bigint(5)));
    assert_eq!(Value::Int(5).cast_to(AttrType::Floats), Ok(Value::Float(5.0)));
    assert!(Value::cast_cost(AttrType::Ints, AttrType::Bigints) < Value::cast_cost(AttrType::Ints, AttrType::Floats));
}

#[test]
fn arithmetic_follows_types() {
    assert_eq!(
        Value::Int(2).add(&Value::Int(3)),
        Ok(Value::Int(5))
    );
    assert_eq!(
        Value::Bigint(1 << 40).add(&Value::Int(1)),
        Ok(Value::Bigint((1 << 40) + 1))
    );
    assert_eq!(
        Value::Float(1.5).multiply(&Value::Int(2)),
        Ok(Value::Float(3.0))
    );
    assert!(Value::Int(1).divide(&Value::Int(0)).is_err());
}

#[test]
fn integer_sum_wraps() {
    assert_eq!(
        Value::Int(i32::MAX).add(&Value::Int(1)),
        Ok(Value::Int(i32::MIN))
    );
}

#[test]
fn float_formatting_trims_trailing_zero() {
    assert_eq!(Value::Float(1.0).to_string(), "1");
    assert_eq!(Value::Float(2.5).to_string(), "2.5");
}

#[test]
fn parse_rejects_mismatched_fields() {
    assert!(matches!(
        type_instance(AttrType::Ints).set_value_from_str("abc"),
        Err(TypeError::Mismatch(_))
    ));
    assert!(matches!(
        type_instance(AttrType::Bigints).set_value_from_str("1.5"),
        Err(TypeError::Mismatch(_))
    ));
}

#[test]
fn vector_parse_and_format() {
    let v = type_instance(AttrType::Vectors)
        .set_value_from_str("[1, 2.5, 3]")
        .unwrap();
    assert_eq!(v, Value::Vector(vec![1.0, 2.5, 3.0]));
    assert_eq!(v.to_string(), "[1,2.5,3]");
}

#[test]
fn serde_round_trip() {
    let vals = vec![
        Value::Int(-42),
        Value::Chars("ada".into()),
        Value::Date(20240229),
        Value::Bigint(1 << 40),
    ];
    let json = serde_json::to_string(&vals).unwrap();
    let back: Vec<Value> = serde_json::from_str(&json).unwrap();
    assert_eq!(vals, back);
}

proptest! {
    #[test]
    fn order_is_antisymmetric(i in any::<i64>(), j in any::<i64>()) {
        let a = Value::Bigint(i);
        let b = Value::Bigint(j);
        let ord1 = a.compare(&b);
        let ord2 = b.compare(&a);
        match (ord1, ord2) {
            (Some(o1), Some(o2)) => prop_assert_eq!(o1, o2.reverse()),
            _ => prop_assert!(false, "bigints must compare"),
        }
    }

    #[test]
    fn date_round_trips(y in 1i32..9999, m in 1i32..=12, d in 1i32..=28) {
        let packed = date_from_parts(y, m, d);
        let text = Value::Date(packed).to_string();
        let back = type_instance(AttrType::Dates).set_value_from_str(&text).unwrap();
        prop_assert_eq!(back, Value::Date(packed));
    }

    #[test]
    fn chars_compare_matches_std(a in ".*", b in ".*") {
        let va = Value::Chars(a.clone());
        let vb = Value::Chars(b.clone());
        prop_assert_eq!(va.compare(&vb), Some(a.cmp(&b)));
    }
}
