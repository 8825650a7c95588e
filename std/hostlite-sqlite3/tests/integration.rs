///
/// # Integration Tests for hostlite-sqlite3
///
/// End-to-end workflows over real database files: create/insert/select,
/// invalid SQL, handle lifecycle after close, integer width and text
/// encoding contracts, lock contention, and statement reset.
///

use std::path::PathBuf;

use hostlite_sqlite3::{
    BridgeConfig, CodecConfig, Connection, Error, IntegerWidth, Row, Step, TextEncoding, Value,
};
use tempfile::TempDir;

fn temp_db(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

fn expect_row(step: Step) -> Row {
    match step {
        Step::Row(Some(row)) => row,
        other => panic!("expected a row, got {:?}", other),
    }
}

fn config_with(codec: CodecConfig) -> BridgeConfig {
    BridgeConfig { codec, ..BridgeConfig::default() }
}

#[test]
fn test_create_insert_select_workflow() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let conn = Connection::open(temp_db(&dir, "test.db")).expect("Failed to open database");

    let create = conn.prepare("CREATE TABLE t(a INTEGER, b TEXT)").unwrap();
    assert_eq!(create.step().unwrap(), Step::Done);

    let insert = conn.prepare("INSERT INTO t VALUES (?, ?)").unwrap();
    insert.bind_int(1, 42).unwrap();
    insert.bind_text(2, "hi").unwrap();
    assert_eq!(insert.step().unwrap(), Step::Done);

    let select = conn.prepare("SELECT a, b FROM t").unwrap();
    let row = expect_row(select.step().unwrap());
    assert_eq!(&*row.names, &["a".to_string(), "b".to_string()]);
    assert_eq!(row.values, vec![Value::Integer(42), Value::Text("hi".to_string())]);
    assert_eq!(select.step().unwrap(), Step::Done);

    conn.close().unwrap();
}

#[test]
fn test_invalid_sql_yields_diagnostic() {
    let conn = Connection::open_memory().unwrap();
    let err = conn.prepare("SELEKT * FROM t").unwrap_err();
    match &err {
        Error::Sqlite { code, message, .. } => {
            assert_eq!(*code, 1);
            assert!(!message.is_empty());
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(!err.to_string().is_empty());
}

#[test]
fn test_operations_after_close_fail_with_handle_error() {
    let dir = TempDir::new().unwrap();
    let conn = Connection::open(temp_db(&dir, "closed.db")).unwrap();
    conn.execute("CREATE TABLE t(a)").unwrap();
    let select = conn.prepare("SELECT a FROM t").unwrap();
    let insert = conn.prepare("INSERT INTO t VALUES (?)").unwrap();

    conn.close().unwrap();

    assert!(matches!(conn.close(), Err(Error::InvalidHandle { .. })));
    assert!(matches!(conn.prepare("SELECT 1"), Err(Error::InvalidHandle { .. })));
    assert!(matches!(conn.last_insert_rowid(), Err(Error::InvalidHandle { .. })));
    assert!(matches!(select.step(), Err(Error::InvalidHandle { .. })));
    assert!(matches!(insert.bind_blob(1, b"x"), Err(Error::InvalidHandle { .. })));
    assert!(matches!(insert.reset(), Err(Error::InvalidHandle { .. })));
}

#[test]
fn test_narrow_integers_wrap() {
    let conn = Connection::open_memory().unwrap();
    let stmt = conn.prepare("SELECT ?, ?").unwrap();
    stmt.bind_int(1, i32::MIN).unwrap();
    stmt.bind_int64(2, (1i64 << 40) + 7).unwrap();
    let row = expect_row(stmt.step().unwrap());
    assert_eq!(row.values, vec![Value::Integer(i32::MIN as i64), Value::Integer(7)]);
}

#[test]
fn test_wide_integers_round_trip() {
    let config = config_with(CodecConfig { integers: IntegerWidth::Wide, ..CodecConfig::default() });
    let dir = TempDir::new().unwrap();
    let conn = Connection::open_with(temp_db(&dir, "wide.db"), &config).unwrap();
    conn.execute("CREATE TABLE n(v INTEGER)").unwrap();

    let insert = conn.prepare("INSERT INTO n VALUES (?)").unwrap();
    insert.bind_int64(1, (1i64 << 40) + 7).unwrap();
    assert_eq!(insert.step().unwrap(), Step::Done);

    let select = conn.prepare("SELECT v FROM n").unwrap();
    let row = expect_row(select.step().unwrap());
    assert_eq!(row.get("v"), Some(&Value::Integer(1_099_511_627_783)));
}

#[test]
fn test_latin1_text_contract() {
    let config = config_with(CodecConfig { text: TextEncoding::Latin1, ..CodecConfig::default() });
    let conn = Connection::open_with(":memory:", &config).unwrap();
    let stmt = conn.prepare("SELECT ?, length(CAST(?1 AS BLOB))").unwrap();
    stmt.bind_text(1, "café").unwrap();
    let row = expect_row(stmt.step().unwrap());
    assert_eq!(row.values, vec![Value::Text("café".to_string()), Value::Integer(4)]);

    let other = conn.prepare("SELECT ?").unwrap();
    assert!(matches!(other.bind_text(1, "猫"), Err(Error::Unencodable { ch: '猫' })));
}

#[test]
fn test_blob_is_independent_copy() {
    let conn = Connection::open_memory().unwrap();
    let stmt = conn.prepare("SELECT ?").unwrap();
    let mut buffer = vec![0xde, 0xad, 0xbe, 0xef];
    stmt.bind_blob(1, &buffer).unwrap();
    buffer.clear();
    buffer.extend_from_slice(b"mutated");

    let row = expect_row(stmt.step().unwrap());
    assert_eq!(row.values[0].as_blob(), Some(&[0xde, 0xad, 0xbe, 0xef][..]));
}

#[test]
fn test_dynamic_types_change_per_row() {
    let conn = Connection::open_memory().unwrap();
    conn.execute("CREATE TABLE d(v)").unwrap();
    conn.execute("INSERT INTO d VALUES (1), ('two'), (3.5), (NULL), (x'04')").unwrap();

    let select = conn.prepare("SELECT v FROM d ORDER BY rowid").unwrap();
    let mut seen = Vec::new();
    loop {
        match select.step().unwrap() {
            Step::Row(Some(mut row)) => seen.push(row.values.remove(0)),
            Step::Done => break,
            other => panic!("unexpected step {:?}", other),
        }
    }
    assert_eq!(
        seen,
        vec![
            Value::Integer(1),
            Value::Text("two".to_string()),
            Value::Float(3.5),
            Value::Null,
            Value::Blob(vec![4]),
        ]
    );
}

#[test]
fn test_busy_is_surfaced_then_recovers() {
    let dir = TempDir::new().unwrap();
    let path = temp_db(&dir, "shared.db");
    let writer = Connection::open(&path).unwrap();
    writer.execute("CREATE TABLE t(a)").unwrap();
    writer.execute("INSERT INTO t VALUES (1)").unwrap();

    let reader = Connection::open(&path).unwrap();
    let select = reader.prepare("SELECT a FROM t").unwrap();

    writer.execute("BEGIN EXCLUSIVE").unwrap();
    assert_eq!(select.step().unwrap(), Step::Busy);
    assert_eq!(select.step().unwrap(), Step::Busy);
    writer.execute("COMMIT").unwrap();

    let row = expect_row(select.step().unwrap());
    assert_eq!(row.values, vec![Value::Integer(1)]);
    assert_eq!(select.step().unwrap(), Step::Done);
}

#[test]
fn test_reset_replays_pass_with_bindings() {
    let conn = Connection::open_memory().unwrap();
    conn.execute("CREATE TABLE t(a INTEGER)").unwrap();
    conn.execute("INSERT INTO t VALUES (1), (2), (3)").unwrap();

    let stmt = conn.prepare("SELECT a FROM t WHERE a >= ? ORDER BY a").unwrap();
    stmt.bind_int(1, 2).unwrap();
    let collect = |stmt: &hostlite_sqlite3::Statement| {
        let mut out = Vec::new();
        while let Step::Row(Some(row)) = stmt.step().unwrap() {
            out.push(row.values[0].clone());
        }
        out
    };
    assert_eq!(collect(&stmt), vec![Value::Integer(2), Value::Integer(3)]);
    assert_eq!(stmt.step().unwrap(), Step::Done);

    stmt.reset().unwrap();
    assert_eq!(collect(&stmt), vec![Value::Integer(2), Value::Integer(3)]);
}

#[test]
fn test_constraint_violation_is_engine_error() {
    let conn = Connection::open_memory().unwrap();
    conn.execute("CREATE TABLE u(k TEXT UNIQUE)").unwrap();
    conn.execute("INSERT INTO u VALUES ('a')").unwrap();

    let dup = conn.prepare("INSERT INTO u VALUES ('a')").unwrap();
    let err = dup.step().unwrap_err();
    assert!(matches!(err, Error::Sqlite { code: 19, .. }));
    assert!(!err.to_string().is_empty());
    // Failed passes stay failed until reset.
    assert!(matches!(dup.step(), Err(Error::Sqlite { code: 19, .. })));
}

#[test]
fn test_dropping_connection_finalizes_statements() {
    let dir = TempDir::new().unwrap();
    let conn = Connection::open(temp_db(&dir, "drop.db")).unwrap();
    let stmt = conn.prepare("SELECT 1").unwrap();
    drop(conn);
    assert!(!stmt.is_live());
    assert!(matches!(stmt.step(), Err(Error::InvalidHandle { .. })));
}

#[test]
fn test_config_file_drives_open() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("hostlite.toml");
    std::fs::write(&config_path, "[open]\nread_only = true\n").unwrap();
    let config = BridgeConfig::load(&config_path).unwrap();

    let missing = Connection::open_with(temp_db(&dir, "absent.db"), &config).unwrap_err();
    assert!(matches!(missing, Error::Sqlite { code: 14, .. }));

    let db = temp_db(&dir, "present.db");
    Connection::open(&db).unwrap().execute("CREATE TABLE t(a)").unwrap();
    let ro = Connection::open_with(&db, &config).unwrap();
    assert!(matches!(ro.execute("INSERT INTO t VALUES (1)"), Err(Error::Sqlite { code: 8, .. })));
}

#[test]
fn test_error_detail_belongs_to_its_own_call() {
    let conn = Connection::open_memory().unwrap();
    conn.execute("CREATE TABLE u(k INTEGER UNIQUE)").unwrap();
    conn.execute("INSERT INTO u VALUES (1)").unwrap();
    let dup = conn.prepare("INSERT INTO u VALUES (1)").unwrap();

    std::thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..2000 {
                assert!(matches!(dup.step(), Err(Error::Sqlite { code: 19, .. })));
                dup.reset().unwrap();
            }
        });
        for _ in 0..2000 {
            match conn.prepare("SELEKT 1") {
                Err(Error::Sqlite { detail: Some(detail), .. }) => {
                    assert!(detail.contains("SELEKT"), "detail from another call: {}", detail);
                }
                other => panic!("unexpected prepare result: {:?}", other.map(|s| s.handle())),
            }
        }
    });
}

#[test]
fn test_only_first_statement_is_compiled() {
    let conn = Connection::open_memory().unwrap();
    conn.execute("CREATE TABLE a(x); CREATE TABLE b(y)").unwrap();
    assert!(conn.prepare("SELECT x FROM a").is_ok());
    assert!(matches!(conn.prepare("SELECT y FROM b"), Err(Error::Sqlite { code: 1, .. })));
}
