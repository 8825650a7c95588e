///
/// Owned wrappers around the engine's C handles.
///
/// `RawConnection` owns one `sqlite3*` and `RawStatement` owns one
/// `sqlite3_stmt*`. Dropping either releases the native object. These are
/// the only types in the crate that hold engine pointers; everything above
/// them goes through the registry.
///
/// Connections are closed with `sqlite3_close_v2`: if a statement compiled
/// against the connection is still alive somewhere (for instance mid-step on
/// another thread) the engine defers the real close until that statement is
/// finalized, rather than failing or freeing memory under it.
///

use std::ffi::{c_char, c_int, CStr, CString};
use std::ptr;

use rusqlite::ffi;
use tracing::warn;

use crate::error::{Error, Result};

/// Canonical engine text for a status code
pub fn errstr(code: c_int) -> String {
    unsafe {
        let msg = ffi::sqlite3_errstr(code);
        if msg.is_null() {
            return format!("unknown error {}", code);
        }
        CStr::from_ptr(msg).to_string_lossy().into_owned()
    }
}

/// Build an engine error from a status code, without connection detail
pub fn status_error(code: c_int) -> Error {
    Error::Sqlite { code, message: errstr(code), detail: None }
}

pub struct RawConnection {
    db: *mut ffi::sqlite3,
}

// The bundled engine is built serialized (SQLITE_THREADSAFE=1), and every
// RawConnection sits behind a mutex in the connection registry.
unsafe impl Send for RawConnection {}

impl RawConnection {
    pub fn open(path: &str, flags: c_int) -> Result<Self> {
        let c_path = CString::new(path)
            .map_err(|_| Error::InvalidArgument("database path contains a NUL byte".to_string()))?;
        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let code = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };
        if code == ffi::SQLITE_OK {
            return Ok(Self { db });
        }
        // The engine may allocate a handle even when open fails.
        let detail = unsafe { errmsg(db) };
        unsafe { ffi::sqlite3_close_v2(db) };
        Err(Error::Sqlite { code, message: errstr(code), detail })
    }

    pub fn set_busy_timeout(&self, ms: u32) -> Result<()> {
        let ms = c_int::try_from(ms).unwrap_or(c_int::MAX);
        let code = unsafe { ffi::sqlite3_busy_timeout(self.db, ms) };
        self.check(code)
    }

    /// Compile the first statement in `sql`; trailing statements are not
    /// compiled. The byte length is passed explicitly, so `sql` need not be
    /// NUL-terminated. Returns `None` when the text holds no statement
    /// (only whitespace or comments).
    pub fn prepare(&self, sql: &str) -> Result<Option<RawStatement>> {
        let len = c_int::try_from(sql.len()).map_err(|_| status_error(ffi::SQLITE_TOOBIG))?;
        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        let code = unsafe {
            ffi::sqlite3_prepare_v2(
                self.db,
                sql.as_ptr() as *const c_char,
                len,
                &mut stmt,
                ptr::null_mut(),
            )
        };
        self.check(code)?;
        if stmt.is_null() {
            Ok(None)
        } else {
            Ok(Some(RawStatement { stmt }))
        }
    }

    pub fn changes(&self) -> i64 {
        unsafe { ffi::sqlite3_changes(self.db) as i64 }
    }

    pub fn last_insert_rowid(&self) -> i64 {
        unsafe { ffi::sqlite3_last_insert_rowid(self.db) }
    }

    /// Translate a status code returned by a call on this connection.
    /// Must be called before the next engine call on the same connection,
    /// and under the same lock, so the detail message belongs to this failure.
    pub fn check(&self, code: c_int) -> Result<()> {
        if code == ffi::SQLITE_OK {
            return Ok(());
        }
        Err(Error::Sqlite {
            code,
            message: errstr(code),
            detail: unsafe { errmsg(self.db) },
        })
    }

    /// Close explicitly, surfacing the engine status. The handle is released
    /// either way; a failed close is not retried on drop.
    pub fn close(mut self) -> Result<()> {
        let db = std::mem::replace(&mut self.db, ptr::null_mut());
        let code = unsafe { ffi::sqlite3_close_v2(db) };
        if code == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(status_error(code))
        }
    }
}

impl Drop for RawConnection {
    fn drop(&mut self) {
        if self.db.is_null() {
            return;
        }
        let code = unsafe { ffi::sqlite3_close_v2(self.db) };
        if code != ffi::SQLITE_OK {
            warn!(code, message = %errstr(code), "failed to close connection in finalizer");
        }
        self.db = ptr::null_mut();
    }
}

unsafe fn errmsg(db: *mut ffi::sqlite3) -> Option<String> {
    if db.is_null() {
        return None;
    }
    unsafe {
        let msg = ffi::sqlite3_errmsg(db);
        if msg.is_null() {
            return None;
        }
        Some(CStr::from_ptr(msg).to_string_lossy().into_owned())
    }
}

pub struct RawStatement {
    stmt: *mut ffi::sqlite3_stmt,
}

// Owned by exactly one registry entry, always accessed under its mutex.
unsafe impl Send for RawStatement {}

impl RawStatement {
    pub fn as_ptr(&self) -> *mut ffi::sqlite3_stmt {
        self.stmt
    }

    /// Raw `sqlite3_step` status
    pub fn step(&self) -> c_int {
        unsafe { ffi::sqlite3_step(self.stmt) }
    }

    pub fn reset(&self) -> c_int {
        unsafe { ffi::sqlite3_reset(self.stmt) }
    }

    pub fn clear_bindings(&self) -> c_int {
        unsafe { ffi::sqlite3_clear_bindings(self.stmt) }
    }

    pub fn column_count(&self) -> usize {
        let n = unsafe { ffi::sqlite3_column_count(self.stmt) };
        usize::try_from(n).unwrap_or(0)
    }

    pub fn column_name(&self, column: usize) -> String {
        unsafe {
            let name = ffi::sqlite3_column_name(self.stmt, column as c_int);
            if name.is_null() {
                return String::new();
            }
            CStr::from_ptr(name).to_string_lossy().into_owned()
        }
    }

    pub fn parameter_count(&self) -> usize {
        let n = unsafe { ffi::sqlite3_bind_parameter_count(self.stmt) };
        usize::try_from(n).unwrap_or(0)
    }

    pub fn sql(&self) -> String {
        unsafe {
            let sql = ffi::sqlite3_sql(self.stmt);
            if sql.is_null() {
                return String::new();
            }
            CStr::from_ptr(sql).to_string_lossy().into_owned()
        }
    }
}

impl Drop for RawStatement {
    fn drop(&mut self) {
        // The return value repeats the last step error, if any; nothing
        // is leaked either way.
        unsafe { ffi::sqlite3_finalize(self.stmt) };
    }
}
