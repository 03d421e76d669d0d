use super::*;
use buffer::{BufferPool, PAGE_SIZE};
use catalog::{StorageFormat, TableMeta};
use columnar::{Chunk, Column};
use common::{bitmap, Rid, TableId};
use std::sync::Arc;
use types::{AttrType, Value};
use wal::LogHandler;

struct Fixture {
    _dir: tempfile::TempDir,
    pool: Arc<BufferPool>,
    log: Arc<LogHandler>,
    lob: Arc<LobFileHandler>,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let pool = Arc::new(BufferPool::open(dir.path().join("t.data"), 16).unwrap());
    let log = Arc::new(LogHandler::open(dir.path().join("t.log")).unwrap());
    let lob = Arc::new(LobFileHandler::open(dir.path().join("t.lob")).unwrap());
    Fixture {
        _dir: dir,
        pool,
        log,
        lob,
    }
}

fn meta_int_int_char4() -> TableMeta {
    TableMeta {
        id: TableId(1),
        name: "t".into(),
        fields: vec![
            catalog::FieldMeta::new("a", AttrType::Ints, 4, 0),
            catalog::FieldMeta::new("b", AttrType::Ints, 4, 1),
            catalog::FieldMeta::new("c", AttrType::Chars, 4, 2),
        ],
        storage_format: StorageFormat::Pax,
    }
}

fn record_int_int_char4(a: i32, b: i32, c: &[u8; 4]) -> Vec<u8> {
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&a.to_le_bytes());
    data.extend_from_slice(&b.to_le_bytes());
    data.extend_from_slice(c);
    data
}

#[test]
fn pax_page_record_round_trip() {
    let fx = fixture();
    let meta = meta_int_int_char4();
    let page = fx.pool.allocate_page().unwrap();
    let mut handler = PaxPageHandler::new(fx.pool.clone(), fx.log.clone(), fx.lob.clone());
    handler.attach(page, AccessMode::ReadWrite).unwrap();
    handler.init_empty(meta.record_size(), &meta).unwrap();

    let rows = [
        record_int_int_char4(1, 10, b"aaaa"),
        record_int_int_char4(2, 20, b"bbbb"),
        record_int_int_char4(3, 30, b"cccc"),
    ];
    for (slot, row) in rows.iter().enumerate() {
        let rid = handler.insert_record(row).unwrap();
        assert_eq!(rid, Rid::new(page, slot as u32));
    }
    assert_eq!(handler.header().unwrap().record_num, 3);

    for (slot, row) in rows.iter().enumerate() {
        let record = handler.get_record(&Rid::new(page, slot as u32)).unwrap();
        assert_eq!(&record.data, row);
    }
}

#[test]
fn pax_header_layout_invariants() {
    let fx = fixture();
    let meta = meta_int_int_char4();
    let page = fx.pool.allocate_page().unwrap();
    let mut handler = PaxPageHandler::new(fx.pool.clone(), fx.log.clone(), fx.lob.clone());
    handler.attach(page, AccessMode::ReadWrite).unwrap();
    handler.init_empty(meta.record_size(), &meta).unwrap();

    let header = handler.header().unwrap();
    assert_eq!(header.record_real_size, 12);
    assert_eq!(header.record_size, 16);
    assert_eq!(header.column_num, 3);
    assert!(header.record_capacity > 0);
    assert!(
        header.data_offset as usize
            + header.record_capacity as usize * header.record_size as usize
            <= PAGE_SIZE
    );
    assert_eq!(header.data_offset % 8, 0);
}

#[test]
fn record_count_tracks_bitmap_population() {
    let fx = fixture();
    let meta = meta_int_int_char4();
    let page = fx.pool.allocate_page().unwrap();
    let mut handler = PaxPageHandler::new(fx.pool.clone(), fx.log.clone(), fx.lob.clone());
    handler.attach(page, AccessMode::ReadWrite).unwrap();
    handler.init_empty(meta.record_size(), &meta).unwrap();

    for i in 0..10 {
        handler
            .insert_record(&record_int_int_char4(i, i, b"xxxx"))
            .unwrap();
    }
    handler.delete_record(&Rid::new(page, 4)).unwrap();
    handler.delete_record(&Rid::new(page, 7)).unwrap();

    let header = handler.header().unwrap();
    let frame = fx.pool.fetch_page(page).unwrap();
    let set = {
        let data = frame.data();
        let capacity = header.record_capacity as usize;
        bitmap::count_ones(
            &data[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + bitmap::bytes_for(capacity)],
            capacity,
        )
    };
    fx.pool.unpin_page(&frame);
    assert_eq!(set, header.record_num as usize);
    assert_eq!(set, 8);

    // Deleted slots are invalid until reused.
    assert!(matches!(
        handler.get_record(&Rid::new(page, 4)),
        Err(common::DbError::RecordNotExist(_))
    ));
    // The lowest clear slot is taken first on reinsert.
    let rid = handler
        .insert_record(&record_int_int_char4(99, 99, b"yyyy"))
        .unwrap();
    assert_eq!(rid.slot_num, 4);
}

#[test]
fn page_full_is_reported() {
    let fx = fixture();
    let meta = meta_int_int_char4();
    let page = fx.pool.allocate_page().unwrap();
    let mut handler = PaxPageHandler::new(fx.pool.clone(), fx.log.clone(), fx.lob.clone());
    handler.attach(page, AccessMode::ReadWrite).unwrap();
    handler.init_empty(meta.record_size(), &meta).unwrap();

    let capacity = handler.header().unwrap().record_capacity;
    for i in 0..capacity {
        handler
            .insert_record(&record_int_int_char4(i, i, b"zzzz"))
            .unwrap();
    }
    assert!(handler.is_full().unwrap());
    assert!(matches!(
        handler.insert_record(&record_int_int_char4(0, 0, b"full")),
        Err(common::DbError::OutOfCapacity)
    ));
}

fn scan_all(fx: &Fixture, meta: &TableMeta) -> Vec<Vec<Value>> {
    let mut scanner = ChunkFileScanner::open(
        fx.pool.clone(),
        fx.log.clone(),
        fx.lob.clone(),
        meta.clone(),
    );
    let mut rows = Vec::new();
    let mut chunk = Chunk::new();
    for field in &meta.fields {
        chunk.add_column(
            Column::new(field.attr_type, field.len),
            field.field_id as i32,
        );
    }
    loop {
        chunk.reset_data();
        if !scanner.next_chunk(&mut chunk).unwrap() {
            break;
        }
        for row in 0..chunk.rows() {
            rows.push(
                (0..chunk.column_num())
                    .map(|c| chunk.get_value(c, row))
                    .collect(),
            );
        }
    }
    rows
}

#[test]
fn chunk_insert_scan_round_trip_spans_pages() {
    let fx = fixture();
    let meta = meta_int_int_char4();
    let handler =
        RecordFileHandler::open(fx.pool.clone(), fx.log.clone(), fx.lob.clone(), meta.clone())
            .unwrap();

    let total = 1024usize;
    let mut chunk = Chunk::new();
    let mut a = Column::new(AttrType::Ints, 4);
    let mut b = Column::new(AttrType::Ints, 4);
    let mut c = Column::new(AttrType::Chars, 4);
    for i in 0..total {
        a.append_value(&Value::Int(i as i32)).unwrap();
        b.append_value(&Value::Int((i * 2) as i32)).unwrap();
        c.append_value(&Value::Chars(format!("c{:03}", i % 999))).unwrap();
    }
    chunk.add_column(a, 0);
    chunk.add_column(b, 1);
    chunk.add_column(c, 2);
    handler.insert_chunk(&chunk).unwrap();

    // More rows than one page holds, so several pages were written.
    assert!(fx.pool.page_count() > 1);

    let mut rows = scan_all(&fx, &meta);
    rows.sort_by_key(|r| r[0].as_int().unwrap());
    assert_eq!(rows.len(), total);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row[0], Value::Int(i as i32));
        assert_eq!(row[1], Value::Int((i * 2) as i32));
    }
}

#[test]
fn text_columns_round_trip_through_lob() {
    let fx = fixture();
    let meta = TableMeta {
        id: TableId(2),
        name: "notes".into(),
        fields: vec![
            catalog::FieldMeta::new("id", AttrType::Ints, 4, 0),
            catalog::FieldMeta::new("body", AttrType::Texts, 16, 1),
        ],
        storage_format: StorageFormat::Pax,
    };
    let handler =
        RecordFileHandler::open(fx.pool.clone(), fx.log.clone(), fx.lob.clone(), meta.clone())
            .unwrap();

    let long = "a body long enough to spill out of the inline descriptor";
    let mut chunk = Chunk::new();
    let mut ids = Column::new(AttrType::Ints, 4);
    let mut bodies = Column::new(AttrType::Texts, 16);
    ids.append_value(&Value::Int(1)).unwrap();
    ids.append_value(&Value::Int(2)).unwrap();
    bodies.append_value(&Value::Texts("tiny".into())).unwrap();
    bodies.append_value(&Value::Texts(long.into())).unwrap();
    chunk.add_column(ids, 0);
    chunk.add_column(bodies, 1);
    handler.insert_chunk(&chunk).unwrap();

    let mut rows = scan_all(&fx, &meta);
    rows.sort_by_key(|r| r[0].as_int().unwrap());
    assert_eq!(rows[0][1], Value::Texts("tiny".into()));
    assert_eq!(rows[1][1], Value::Texts(long.into()));
}

#[test]
fn row_table_insert_and_scan() {
    let fx = fixture();
    let meta = TableMeta {
        id: TableId(3),
        name: "people".into(),
        fields: vec![
            catalog::FieldMeta::new("id", AttrType::Ints, 4, 0),
            catalog::FieldMeta::new("name", AttrType::Chars, 8, 1),
        ],
        storage_format: StorageFormat::Row,
    };
    let handler =
        RecordFileHandler::open(fx.pool.clone(), fx.log.clone(), fx.lob.clone(), meta.clone())
            .unwrap();
    for (id, name) in [(1, "ada"), (2, "grace"), (3, "edsger")] {
        let mut record = vec![0u8; meta.record_size()];
        record[0..4].copy_from_slice(&(id as i32).to_le_bytes());
        record[4..4 + name.len()].copy_from_slice(name.as_bytes());
        handler.insert_record(&record).unwrap();
    }

    let rows = scan_all(&fx, &meta);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1][1], Value::Chars("grace".into()));
}

#[test]
fn free_set_reuses_pages_after_delete() {
    let fx = fixture();
    let meta = meta_int_int_char4();
    let handler =
        RecordFileHandler::open(fx.pool.clone(), fx.log.clone(), fx.lob.clone(), meta.clone())
            .unwrap();

    let mut rids = Vec::new();
    for i in 0..20 {
        rids.push(
            handler
                .insert_record(&record_int_int_char4(i, i, b"pppp"))
                .unwrap(),
        );
    }
    let pages_before = fx.pool.page_count();
    handler.delete_record(&rids[5]).unwrap();
    let rid = handler
        .insert_record(&record_int_int_char4(100, 100, b"qqqq"))
        .unwrap();
    // The hole was refilled instead of extending the file.
    assert_eq!(rid, rids[5]);
    assert_eq!(fx.pool.page_count(), pages_before);
}
