//! Whole-pipeline tests: SQL text in, result chunks out.

use common::Config;
use database::{Database, ExecutionResult};
use types::Value;

fn open_db(dir: &tempfile::TempDir) -> Database {
    let config = Config::builder().data_dir(dir.path().to_path_buf()).build();
    Database::open(config).unwrap()
}

fn rows_of(result: ExecutionResult) -> Vec<Vec<Value>> {
    match result {
        ExecutionResult::Rows { chunks, .. } => {
            let mut rows = Vec::new();
            for chunk in &chunks {
                for row in 0..chunk.rows() {
                    rows.push(
                        (0..chunk.column_num())
                            .map(|pos| chunk.get_value(pos, row))
                            .collect(),
                    );
                }
            }
            rows
        }
        ExecutionResult::State(state) => panic!("expected rows, got state {state:?}"),
    }
}

fn exec(db: &Database, sql: &str) -> ExecutionResult {
    db.execute_sql(sql).unwrap()
}

#[test]
fn create_insert_select_where() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    exec(
        &db,
        "CREATE TABLE orders (id INT, total BIGINT, tag CHAR(4), day DATE)",
    );
    for (id, total, tag, day) in [
        (1, 100i64, "hot", "2024-01-01"),
        (2, 250, "cold", "2024-01-02"),
        (3, 75, "hot", "2024-02-29"),
    ] {
        exec(
            &db,
            &format!("INSERT INTO orders VALUES ({id}, {total}, '{tag}', '{day}')"),
        );
    }

    let rows = rows_of(exec(
        &db,
        "SELECT id, total FROM orders WHERE tag = 'hot' AND total >= 75",
    ));
    assert_eq!(
        rows,
        vec![
            vec![Value::Int(1), Value::Bigint(100)],
            vec![Value::Int(3), Value::Bigint(75)],
        ]
    );

    let rows = rows_of(exec(&db, "SELECT id FROM orders WHERE day = '2024-02-29'"));
    assert_eq!(rows, vec![vec![Value::Int(3)]]);
}

#[test]
fn group_order_limit_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    exec(&db, "CREATE TABLE kv (k INT, v INT)");
    let keys = [1, 2, 1, 2, 1, 3, 3, 2, 1, 2];
    let values = [10, 20, 30, 40, 50, 60, 70, 80, 90, 100];
    for (k, v) in keys.iter().zip(&values) {
        exec(&db, &format!("INSERT INTO kv VALUES ({k}, {v})"));
    }

    let mut rows = rows_of(exec(&db, "SELECT k, sum(v) FROM kv GROUP BY k"));
    rows.sort_by_key(|r| r[0].as_int().unwrap());
    assert_eq!(
        rows,
        vec![
            vec![Value::Int(1), Value::Int(180)],
            vec![Value::Int(2), Value::Int(240)],
            vec![Value::Int(3), Value::Int(130)],
        ]
    );

    let rows = rows_of(exec(&db, "SELECT v FROM kv ORDER BY v DESC LIMIT 3"));
    assert_eq!(
        rows,
        vec![
            vec![Value::Int(100)],
            vec![Value::Int(90)],
            vec![Value::Int(80)],
        ]
    );
}

#[test]
fn top_n_by_count_over_sql() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    exec(&db, "CREATE TABLE events (tag TEXT, pad INT)");
    for tag in ["a", "b", "a", "c", "a", "b"] {
        exec(&db, &format!("INSERT INTO events VALUES ('{tag}', 0)"));
    }

    let rows = rows_of(exec(
        &db,
        "SELECT tag, count(*) FROM events GROUP BY tag ORDER BY count(*) DESC LIMIT 2",
    ));
    assert_eq!(
        rows,
        vec![
            vec![Value::Texts("a".into()), Value::Bigint(3)],
            vec![Value::Texts("b".into()), Value::Bigint(2)],
        ]
    );
}

#[test]
fn order_by_is_stable_across_directions() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    exec(&db, "CREATE TABLE t (a INT, b CHAR(4))");
    for (a, b) in [(2, "x"), (1, "y"), (2, "w"), (1, "z")] {
        exec(&db, &format!("INSERT INTO t VALUES ({a}, '{b}')"));
    }

    let rows = rows_of(exec(&db, "SELECT a, b FROM t ORDER BY a ASC, b DESC"));
    assert_eq!(
        rows,
        vec![
            vec![Value::Int(1), Value::Chars("z".into())],
            vec![Value::Int(1), Value::Chars("y".into())],
            vec![Value::Int(2), Value::Chars("x".into())],
            vec![Value::Int(2), Value::Chars("w".into())],
        ]
    );
}

#[test]
fn materialized_view_pipes_into_a_new_table() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    exec(&db, "CREATE TABLE src (id INT, v INT)");
    for id in 1..=5 {
        exec(&db, &format!("INSERT INTO src VALUES ({id}, {})", id * 10));
    }

    exec(
        &db,
        "CREATE MATERIALIZED VIEW big AS SELECT id, v FROM src WHERE v > 20",
    );
    let mut rows = rows_of(exec(&db, "SELECT id, v FROM big"));
    rows.sort_by_key(|r| r[0].as_int().unwrap());
    assert_eq!(
        rows,
        vec![
            vec![Value::Int(3), Value::Int(30)],
            vec![Value::Int(4), Value::Int(40)],
            vec![Value::Int(5), Value::Int(50)],
        ]
    );

    // The name is now taken.
    let err = db
        .execute_sql("CREATE MATERIALIZED VIEW big AS SELECT id FROM src")
        .unwrap_err();
    assert_eq!(err.code_name(), "SCHEMA_MATERIALIZED_VIEW_NAME_REPEAT");
}

#[test]
fn load_data_into_pax_table() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    exec(&db, "CREATE TABLE people (id INT, name CHAR(8), note TEXT)");

    let csv = "1,ada,\"likes, commas\"\n2,grace,plain\nbad,line,here\n";
    let path = dir.path().join("people.csv");
    std::fs::write(&path, csv).unwrap();

    let state = match exec(
        &db,
        &format!("LOAD DATA INFILE '{}' INTO TABLE people", path.display()),
    ) {
        ExecutionResult::State(state) => state,
        _ => panic!("expected a state string"),
    };
    assert!(state.contains("Line:3"));
    assert!(state.ends_with("SUCCESS"));

    let mut rows = rows_of(exec(&db, "SELECT id, name, note FROM people"));
    rows.sort_by_key(|r| r[0].as_int().unwrap());
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][2], Value::Texts("likes, commas".into()));
}

#[test]
fn row_format_tables_work_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    exec(
        &db,
        "CREATE TABLE legacy (id INT, name CHAR(8)) WITH (storage_format = 'row')",
    );
    exec(&db, "INSERT INTO legacy VALUES (1, 'ada')");
    exec(&db, "INSERT INTO legacy VALUES (2, 'grace')");

    let rows = rows_of(exec(&db, "SELECT id, name FROM legacy WHERE id = 2"));
    assert_eq!(rows, vec![vec![Value::Int(2), Value::Chars("grace".into())]]);
}

#[test]
fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = open_db(&dir);
        exec(&db, "CREATE TABLE t (v INT)");
        exec(&db, "INSERT INTO t VALUES (42)");
    }
    let db = open_db(&dir);
    let rows = rows_of(exec(&db, "SELECT v FROM t"));
    assert_eq!(rows, vec![vec![Value::Int(42)]]);
}

#[test]
fn errors_carry_stable_codes() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    let err = db.execute_sql("SELECT x FROM missing").unwrap_err();
    assert_eq!(err.code_name(), "SCHEMA_FIELD_MISSING");

    exec(&db, "CREATE TABLE t (d DATE)");
    let err = db
        .execute_sql("INSERT INTO t VALUES ('not-a-date')")
        .unwrap_err();
    assert_eq!(err.code_name(), "INVALID_ARGUMENT");
}
