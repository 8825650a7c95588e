///
/// C ABI for the host runtime.
///
/// Handles are i64 values issued by the registries (see `registry`). Strings
/// and byte buffers arrive as `HostString`/`HostBytes` and are copied or
/// borrowed only for the duration of the call; results are returned as
/// freshly allocated host objects owned by the caller.
///
/// Error handling follows the host's last-error pattern:
/// - On success: return the value (or 0 for status-only calls)
/// - On failure: record the error with `set_last_error`, return -1 or null
///
/// `hostlite_sqlite_step` returns one of the `STEP_*` codes. On `STEP_ROW`
/// it writes column names and values to the out-pointers as `HostList`s,
/// or writes null to both when the statement has no columns.
///

use std::ptr;

use hostlite_core::{
    bytes_from_host, host_bytes, host_list, host_string, set_last_error, HostBytes, HostList,
    HostString, Term,
};
use tracing::trace;

use crate::codec::{self, Value};
use crate::config::BridgeConfig;
use crate::connection::{
    close_handle, open_handle, prepare_handle, release_statement, with_connection, with_statement,
};
use crate::cursor::{Cursor, Row, Step};
use crate::error::{Error, Result};
use crate::registry::Handle;

pub const STEP_ROW: i64 = 0;
pub const STEP_DONE: i64 = 1;
pub const STEP_BUSY: i64 = 2;
pub const STEP_ERROR: i64 = -1;

fn throw_db_error(err: &Error) {
    set_last_error(err.kind_id(), err.code(), err.to_string());
}

fn finish(result: Result<i64>) -> i64 {
    match result {
        Ok(value) => value,
        Err(e) => {
            throw_db_error(&e);
            -1
        }
    }
}

fn finish_unit(result: Result<()>) -> i64 {
    finish(result.map(|()| 0))
}

fn param_index(index: i64) -> usize {
    // Negative indexes become 0, which the engine rejects as out of range.
    usize::try_from(index).unwrap_or(0)
}

unsafe fn text_from_host<'a>(s: *const HostString) -> Result<&'a str> {
    if s.is_null() {
        return Ok("");
    }
    std::str::from_utf8(unsafe { (*s).as_bytes() })
        .map_err(|e| Error::InvalidArgument(format!("string is not valid UTF-8: {}", e)))
}

pub fn value_to_term(value: &Value) -> Term {
    match value {
        Value::Null => Term::NIL,
        Value::Integer(i) => Term::int(*i),
        Value::Float(f) => Term::float(*f),
        Value::Text(s) => Term::string(host_string(s)),
        Value::Blob(b) => Term::bytes(host_bytes(b)),
    }
}

fn row_to_lists(row: &Row) -> (*mut HostList, *mut HostList) {
    let names = host_list(row.names.iter().map(|n| Term::string(host_string(n))).collect());
    let values = host_list(row.values.iter().map(value_to_term).collect());
    (names, values)
}

/// Open or create a database file. Returns a connection handle or -1.
/// A path that is not valid UTF-8 is rejected rather than rewritten.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlite_sqlite_open(path: *const HostString) -> i64 {
    let result = unsafe { text_from_host(path) }
        .and_then(|path| open_handle(path, &BridgeConfig::default()))
        .map(Handle::to_raw);
    finish(result)
}

/// Open with a TOML configuration document (see `config`).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlite_sqlite_open_with_config(
    path: *const HostString,
    config: *const HostString,
) -> i64 {
    let result = unsafe { text_from_host(config) }
        .and_then(BridgeConfig::from_toml_str)
        .and_then(|config| open_handle(unsafe { text_from_host(path) }?, &config))
        .map(Handle::to_raw);
    finish(result)
}

#[unsafe(no_mangle)]
pub extern "C" fn hostlite_sqlite_open_memory() -> i64 {
    finish(open_handle(":memory:", &BridgeConfig::default()).map(Handle::to_raw))
}

/// Close a connection and finalize its statements. Returns 0 or -1.
#[unsafe(no_mangle)]
pub extern "C" fn hostlite_sqlite_close(conn: i64) -> i64 {
    finish_unit(close_handle(Handle::from_raw(conn)))
}

/// Compile `sql` against `conn`. Returns a statement handle or -1.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlite_sqlite_prepare(conn: i64, sql: *const HostString) -> i64 {
    let result = unsafe { text_from_host(sql) }
        .and_then(|sql| prepare_handle(Handle::from_raw(conn), sql))
        .map(Handle::to_raw);
    finish(result)
}

/// Advance a statement. See `STEP_*`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlite_sqlite_step(
    stmt: i64,
    out_names: *mut *mut HostList,
    out_values: *mut *mut HostList,
) -> i64 {
    unsafe {
        write_out(out_names, ptr::null_mut());
        write_out(out_values, ptr::null_mut());
    }
    match with_statement(Handle::from_raw(stmt), Cursor::step) {
        Ok(Step::Row(Some(row))) => {
            if !out_names.is_null() || !out_values.is_null() {
                let (names, values) = row_to_lists(&row);
                unsafe {
                    deliver(out_names, names);
                    deliver(out_values, values);
                }
            }
            STEP_ROW
        }
        Ok(Step::Row(None)) => STEP_ROW,
        Ok(Step::Done) => STEP_DONE,
        Ok(Step::Busy) => STEP_BUSY,
        Err(e) => {
            trace!(stmt, error = %e, "step failed");
            throw_db_error(&e);
            STEP_ERROR
        }
    }
}

unsafe fn write_out(out: *mut *mut HostList, list: *mut HostList) {
    if !out.is_null() {
        unsafe { out.write(list) };
    }
}

/// Hand `list` to the caller, or free it if the caller passed no slot.
unsafe fn deliver(out: *mut *mut HostList, list: *mut HostList) {
    unsafe {
        if out.is_null() {
            hostlite_core::hostlite_list_decref(list);
        } else {
            out.write(list);
        }
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlite_sqlite_bind_text(stmt: i64, index: i64, text: *const HostString) -> i64 {
    let result = unsafe { text_from_host(text) }.and_then(|text| {
        with_statement(Handle::from_raw(stmt), |c| {
            codec::bind_text(c.raw(), param_index(index), text, c.codec().text)
        })
    });
    finish_unit(result)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlite_sqlite_bind_blob(stmt: i64, index: i64, bytes: *const HostBytes) -> i64 {
    let bytes = unsafe { bytes_from_host(bytes) };
    finish_unit(with_statement(Handle::from_raw(stmt), |c| {
        codec::bind_blob(c.raw(), param_index(index), bytes)
    }))
}

#[unsafe(no_mangle)]
pub extern "C" fn hostlite_sqlite_bind_int(stmt: i64, index: i64, value: i32) -> i64 {
    finish_unit(with_statement(Handle::from_raw(stmt), |c| {
        codec::bind_int(c.raw(), param_index(index), value)
    }))
}

#[unsafe(no_mangle)]
pub extern "C" fn hostlite_sqlite_bind_int64(stmt: i64, index: i64, value: i64) -> i64 {
    finish_unit(with_statement(Handle::from_raw(stmt), |c| {
        codec::bind_int64(c.raw(), param_index(index), value)
    }))
}

#[unsafe(no_mangle)]
pub extern "C" fn hostlite_sqlite_bind_float(stmt: i64, index: i64, value: f64) -> i64 {
    finish_unit(with_statement(Handle::from_raw(stmt), |c| {
        codec::bind_float(c.raw(), param_index(index), value)
    }))
}

#[unsafe(no_mangle)]
pub extern "C" fn hostlite_sqlite_bind_null(stmt: i64, index: i64) -> i64 {
    finish_unit(with_statement(Handle::from_raw(stmt), |c| {
        codec::bind_null(c.raw(), param_index(index))
    }))
}

#[unsafe(no_mangle)]
pub extern "C" fn hostlite_sqlite_reset(stmt: i64) -> i64 {
    finish_unit(with_statement(Handle::from_raw(stmt), |c| {
        c.reset();
        Ok(())
    }))
}

#[unsafe(no_mangle)]
pub extern "C" fn hostlite_sqlite_clear_bindings(stmt: i64) -> i64 {
    finish_unit(with_statement(Handle::from_raw(stmt), Cursor::clear_bindings))
}

#[unsafe(no_mangle)]
pub extern "C" fn hostlite_sqlite_column_count(stmt: i64) -> i64 {
    finish(with_statement(Handle::from_raw(stmt), |c| Ok(c.raw().column_count() as i64)))
}

#[unsafe(no_mangle)]
pub extern "C" fn hostlite_sqlite_changes(conn: i64) -> i64 {
    finish(with_connection(Handle::from_raw(conn), |raw| Ok(raw.changes())))
}

/// Rowid of the most recent insert. -1 is both a legal rowid and the
/// failure sentinel, so callers clear the error slot first and consult
/// `hostlite_error_check` afterwards.
#[unsafe(no_mangle)]
pub extern "C" fn hostlite_sqlite_last_insert_rowid(conn: i64) -> i64 {
    finish(with_connection(Handle::from_raw(conn), |raw| Ok(raw.last_insert_rowid())))
}

/// Finalizer for connection references collected by the host.
/// Already-closed handles are accepted silently.
#[unsafe(no_mangle)]
pub extern "C" fn hostlite_sqlite_release_connection(conn: i64) -> i64 {
    match close_handle(Handle::from_raw(conn)) {
        Err(e) if e.is_invalid_handle() => 0,
        result => finish_unit(result),
    }
}

/// Finalizer for statement references collected by the host.
/// Already-finalized handles are accepted silently.
#[unsafe(no_mangle)]
pub extern "C" fn hostlite_sqlite_release_statement(stmt: i64) -> i64 {
    match release_statement(Handle::from_raw(stmt)) {
        Err(e) if e.is_invalid_handle() => 0,
        result => finish_unit(result),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostlite_core::{
        hostlite_error_check, hostlite_error_clear, hostlite_list_decref, hostlite_string_decref,
        hostlite_string_new, last_error, string_from_host, ERROR_KIND_ARGUMENT_ERROR,
        ERROR_KIND_DB_ERROR, ERROR_KIND_INVALID_HANDLE,
    };

    fn with_host_string<R>(s: &str, f: impl FnOnce(*const HostString) -> R) -> R {
        let hs = host_string(s);
        let result = f(hs);
        unsafe { hostlite_string_decref(hs) };
        result
    }

    fn prepare(conn: i64, sql: &str) -> i64 {
        with_host_string(sql, |sql| unsafe { hostlite_sqlite_prepare(conn, sql) })
    }

    fn step(stmt: i64) -> (i64, *mut HostList, *mut HostList) {
        let mut names = ptr::null_mut();
        let mut values = ptr::null_mut();
        let code = unsafe { hostlite_sqlite_step(stmt, &mut names, &mut values) };
        (code, names, values)
    }

    #[test]
    fn test_round_trip_through_host_values() {
        let conn = hostlite_sqlite_open_memory();
        assert!(conn > 0);
        let create = prepare(conn, "CREATE TABLE t(a INTEGER, b TEXT, c BLOB, d REAL)");
        assert_eq!(step(create).0, STEP_DONE);

        let insert = prepare(conn, "INSERT INTO t VALUES (?, ?, ?, ?)");
        assert_eq!(hostlite_sqlite_bind_int(insert, 1, 42), 0);
        with_host_string("hi", |s| assert_eq!(unsafe { hostlite_sqlite_bind_text(insert, 2, s) }, 0));
        let blob = host_bytes(&[0, 1, 2]);
        assert_eq!(unsafe { hostlite_sqlite_bind_blob(insert, 3, blob) }, 0);
        unsafe { hostlite_core::hostlite_bytes_decref(blob) };
        assert_eq!(hostlite_sqlite_bind_float(insert, 4, 0.5), 0);
        let (code, names, values) = step(insert);
        assert_eq!(code, STEP_DONE);
        assert!(names.is_null() && values.is_null());
        assert_eq!(hostlite_sqlite_changes(conn), 1);
        assert_eq!(hostlite_sqlite_last_insert_rowid(conn), 1);

        let select = prepare(conn, "SELECT a, b, c, d FROM t");
        assert_eq!(hostlite_sqlite_column_count(select), 4);
        let (code, names, values) = step(select);
        assert_eq!(code, STEP_ROW);
        unsafe {
            let names_slice = (*names).as_slice();
            let got: Vec<String> = names_slice
                .iter()
                .map(|t| string_from_host(t.as_string().unwrap()))
                .collect();
            assert_eq!(got, vec!["a", "b", "c", "d"]);

            let row = (*values).as_slice();
            assert_eq!(row[0].as_int(), Some(42));
            assert_eq!(string_from_host(row[1].as_string().unwrap()), "hi");
            assert_eq!((*row[2].as_bytes().unwrap()).as_slice(), &[0, 1, 2]);
            assert_eq!(row[3].as_float(), Some(0.5));

            hostlite_list_decref(names);
            hostlite_list_decref(values);
        }
        assert_eq!(step(select).0, STEP_DONE);
        assert_eq!(step(select).0, STEP_DONE);

        assert_eq!(hostlite_sqlite_close(conn), 0);
    }

    #[test]
    fn test_invalid_sql_sets_db_error() {
        hostlite_error_clear();
        let conn = hostlite_sqlite_open_memory();
        assert_eq!(prepare(conn, "SELEKT * FROM t"), -1);
        let err = last_error().unwrap();
        assert_eq!(err.kind, ERROR_KIND_DB_ERROR);
        assert_eq!(err.code, 1);
        assert!(!err.message.is_empty());
        hostlite_error_clear();
        hostlite_sqlite_release_connection(conn);
    }

    #[test]
    fn test_use_after_close_sets_invalid_handle() {
        let conn = hostlite_sqlite_open_memory();
        let stmt = prepare(conn, "SELECT 1");
        assert_eq!(hostlite_sqlite_close(conn), 0);

        hostlite_error_clear();
        assert_eq!(step(stmt).0, STEP_ERROR);
        assert_eq!(last_error().unwrap().kind, ERROR_KIND_INVALID_HANDLE);
        assert_eq!(hostlite_sqlite_close(conn), -1);
        assert_eq!(prepare(conn, "SELECT 1"), -1);
        assert_eq!(hostlite_sqlite_bind_int(stmt, 1, 1), -1);
        hostlite_error_clear();

        // Finalizers running after an explicit close are harmless.
        assert_eq!(hostlite_sqlite_release_statement(stmt), 0);
        assert_eq!(hostlite_sqlite_release_connection(conn), 0);
    }

    #[test]
    fn test_step_without_out_slots() {
        let conn = hostlite_sqlite_open_memory();
        let stmt = prepare(conn, "SELECT 'dropped'");
        let code = unsafe { hostlite_sqlite_step(stmt, ptr::null_mut(), ptr::null_mut()) };
        assert_eq!(code, STEP_ROW);
        assert_eq!(hostlite_sqlite_release_statement(stmt), 0);
        assert_eq!(hostlite_sqlite_release_connection(conn), 0);
    }

    #[test]
    fn test_open_with_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.db");
        let conn = with_host_string(path.to_str().unwrap(), |p| {
            with_host_string("[codec]\nintegers = \"wide\"\n", |c| unsafe {
                hostlite_sqlite_open_with_config(p, c)
            })
        });
        assert!(conn > 0);
        let stmt = prepare(conn, "SELECT ?");
        assert_eq!(hostlite_sqlite_bind_int64(stmt, 1, 1 << 40), 0);
        let (code, names, values) = step(stmt);
        assert_eq!(code, STEP_ROW);
        unsafe {
            assert_eq!((*values).as_slice()[0].as_int(), Some(1 << 40));
            hostlite_list_decref(names);
            hostlite_list_decref(values);
        }
        assert_eq!(hostlite_sqlite_close(conn), 0);

        hostlite_error_clear();
        let bad = with_host_string(":memory:", |p| {
            with_host_string("[codec]\ntext = \"ebcdic\"\n", |c| unsafe {
                hostlite_sqlite_open_with_config(p, c)
            })
        });
        assert_eq!(bad, -1);
        assert_eq!(last_error().unwrap().kind, hostlite_core::ERROR_KIND_CONFIG_ERROR);
        hostlite_error_clear();
    }

    #[test]
    fn test_negative_index_is_range_error() {
        let conn = hostlite_sqlite_open_memory();
        let stmt = prepare(conn, "SELECT ?");
        hostlite_error_clear();
        assert_eq!(hostlite_sqlite_bind_null(stmt, -3), -1);
        assert_eq!(last_error().unwrap().code, rusqlite::ffi::SQLITE_RANGE as i64);
        hostlite_error_clear();
        hostlite_sqlite_close(conn);
    }

    #[test]
    fn test_open_rejects_non_utf8_path() {
        let raw = b"bad\xff.db";
        let path = unsafe { hostlite_string_new(raw.as_ptr(), raw.len()) };
        hostlite_error_clear();
        assert_eq!(unsafe { hostlite_sqlite_open(path) }, -1);
        assert_eq!(last_error().unwrap().kind, ERROR_KIND_ARGUMENT_ERROR);

        hostlite_error_clear();
        let conn = with_host_string("", |c| unsafe { hostlite_sqlite_open_with_config(path, c) });
        assert_eq!(conn, -1);
        assert_eq!(last_error().unwrap().kind, ERROR_KIND_ARGUMENT_ERROR);
        hostlite_error_clear();
        unsafe { hostlite_string_decref(path) };
    }

    #[test]
    fn test_negative_rowid_is_not_a_failure() {
        let conn = hostlite_sqlite_open_memory();
        let create = prepare(conn, "CREATE TABLE t(a)");
        assert_eq!(step(create).0, STEP_DONE);
        let insert = prepare(conn, "INSERT INTO t(rowid, a) VALUES (-1, 'x')");
        assert_eq!(step(insert).0, STEP_DONE);

        hostlite_error_clear();
        assert_eq!(hostlite_sqlite_last_insert_rowid(conn), -1);
        assert_eq!(hostlite_error_check(), 0);

        assert_eq!(hostlite_sqlite_close(conn), 0);
        assert_eq!(hostlite_sqlite_last_insert_rowid(conn), -1);
        assert_eq!(hostlite_error_check(), 1);
        hostlite_error_clear();
    }
}
