use super::*;

#[test]
fn code_names_are_stable() {
    let cases: Vec<(DbError, &str)> = vec![
        (DbError::InvalidArgument("x".into()), "INVALID_ARGUMENT"),
        (DbError::Unimplemented("x".into()), "UNIMPLEMENTED"),
        (DbError::Internal("x".into()), "INTERNAL"),
        (
            DbError::FieldTypeMismatch("x".into()),
            "SCHEMA_FIELD_TYPE_MISMATCH",
        ),
        (DbError::FieldMissing("x".into()), "SCHEMA_FIELD_MISSING"),
        (DbError::OutOfCapacity, "RECORD_NOMEM"),
        (
            DbError::RecordNotExist(Rid::new(1, 2)),
            "RECORD_NOT_EXIST",
        ),
        (DbError::InvalidRid(Rid::new(1, 2)), "RECORD_INVALID_RID"),
        (DbError::ReadFailed("x".into()), "IOERR_READ"),
        (DbError::WriteFailed("x".into()), "IOERR_WRITE"),
        (DbError::CloseFailed("x".into()), "IOERR_CLOSE"),
        (DbError::TooLong("x".into()), "IOERR_TOO_LONG"),
        (DbError::FileNotExist("x".into()), "FILE_NOT_EXIST"),
        (
            DbError::ViewNameRepeat("v".into()),
            "SCHEMA_MATERIALIZED_VIEW_NAME_REPEAT",
        ),
    ];
    for (err, expected) in cases {
        assert_eq!(err.code_name(), expected);
    }
}

#[test]
fn type_errors_map_to_codes() {
    let invalid: DbError = types::TypeError::Invalid("bad date".into()).into();
    assert_eq!(invalid.code_name(), "INVALID_ARGUMENT");
    let mismatch: DbError = types::TypeError::Mismatch("not an int".into()).into();
    assert_eq!(mismatch.code_name(), "SCHEMA_FIELD_TYPE_MISMATCH");
}

#[test]
fn rid_display() {
    assert_eq!(Rid::new(7, 3).to_string(), "7:3");
}

#[test]
fn config_defaults() {
    let config = Config::default();
    assert_eq!(config.chunk_rows, 1024);
    assert_eq!(config.buffer_pool_pages, 256);
}
