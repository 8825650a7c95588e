///
/// Connection manager and the process-wide handle registries.
///
/// Two registries back every handle the crate gives out:
/// - CONNECTIONS: Handle → connection entry (native connection + codec + children)
/// - STATEMENTS:  Handle → parent connection handle + statement cursor
///
/// Entries are `Arc<Mutex<_>>`. A call resolves the handle under the registry
/// lock, clones the `Arc`, releases the registry, and then locks the entry
/// for the duration of the native call. A statement call also holds its
/// parent connection entry, since every statement shares the parent's native
/// connection and its error message slot. Calls on one connection and its
/// statements are therefore serialized, while calls on different connections
/// run in parallel.
///
/// Lock order: connection entry → STATEMENTS registry → cursor. A cursor
/// is never held while acquiring another lock.
///
/// Closing a connection finalizes every statement compiled against it first,
/// so those statement handles fail with `InvalidHandle` instead of stepping
/// against a closed connection.
///

use std::path::Path;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use rusqlite::ffi;
use tracing::{debug, warn};

use crate::codec::{self, Value};
use crate::config::{BridgeConfig, CodecConfig};
use crate::cursor::{Cursor, Step};
use crate::error::{Error, HandleKind, Result};
use crate::raw::{status_error, RawConnection};
use crate::registry::{Handle, Registry};

type Shared<T> = Arc<Mutex<T>>;

struct ConnectionEntry {
    raw: Option<RawConnection>,
    codec: CodecConfig,
    statements: Vec<Handle>,
}

struct StatementEntry {
    parent: Handle,
    cursor: Shared<Cursor>,
}

static CONNECTIONS: LazyLock<Mutex<Registry<Shared<ConnectionEntry>>>> =
    LazyLock::new(|| Mutex::new(Registry::new(HandleKind::Connection)));

static STATEMENTS: LazyLock<Mutex<Registry<StatementEntry>>> =
    LazyLock::new(|| Mutex::new(Registry::new(HandleKind::Statement)));

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn invalid_connection(handle: Handle) -> Error {
    Error::InvalidHandle {
        kind: HandleKind::Connection,
        handle: handle.to_raw(),
    }
}

fn resolve_connection(handle: Handle) -> Result<Shared<ConnectionEntry>> {
    lock(&CONNECTIONS).resolve(handle).map(Arc::clone)
}

pub(crate) fn open_handle(path: &str, config: &BridgeConfig) -> Result<Handle> {
    let raw = RawConnection::open(path, config.open.flags())?;
    if let Some(ms) = config.open.busy_timeout_ms {
        raw.set_busy_timeout(ms)?;
    }
    let entry = ConnectionEntry {
        raw: Some(raw),
        codec: config.codec,
        statements: Vec::new(),
    };
    let handle = lock(&CONNECTIONS).register(Arc::new(Mutex::new(entry)))?;
    debug!(path, handle = handle.to_raw(), "opened connection");
    Ok(handle)
}

pub(crate) fn close_handle(handle: Handle) -> Result<()> {
    let shared = lock(&CONNECTIONS).finalize(handle)?;
    let (raw, statements) = {
        let mut entry = lock(&shared);
        (entry.raw.take(), std::mem::take(&mut entry.statements))
    };

    let finalized: Vec<_> = {
        let mut registry = lock(&STATEMENTS);
        statements.iter().filter_map(|h| registry.finalize(*h).ok()).collect()
    };
    let orphaned = finalized.len();
    drop(finalized);

    let result = match raw {
        Some(raw) => raw.close(),
        None => Ok(()),
    };
    debug!(handle = handle.to_raw(), orphaned, ok = result.is_ok(), "closed connection");
    result
}

pub(crate) fn with_connection<R>(handle: Handle, f: impl FnOnce(&RawConnection) -> Result<R>) -> Result<R> {
    let shared = resolve_connection(handle)?;
    let entry = lock(&shared);
    match entry.raw.as_ref() {
        Some(raw) => f(raw),
        None => Err(invalid_connection(handle)),
    }
}

pub(crate) fn prepare_handle(conn: Handle, sql: &str) -> Result<Handle> {
    let shared = resolve_connection(conn)?;
    let mut entry = lock(&shared);
    let raw = entry.raw.as_ref().ok_or_else(|| invalid_connection(conn))?;
    let stmt = raw.prepare(sql)?.ok_or(Error::EmptyStatement)?;
    let cursor = Arc::new(Mutex::new(Cursor::new(stmt, entry.codec)));
    let handle = lock(&STATEMENTS).register(StatementEntry { parent: conn, cursor })?;
    entry.statements.push(handle);
    debug!(conn = conn.to_raw(), stmt = handle.to_raw(), sql, "prepared statement");
    Ok(handle)
}

fn invalid_statement(handle: Handle) -> Error {
    Error::InvalidHandle {
        kind: HandleKind::Statement,
        handle: handle.to_raw(),
    }
}

/// Run `f` on the statement's cursor with the parent connection entry held.
pub(crate) fn with_statement<R>(handle: Handle, f: impl FnOnce(&mut Cursor) -> Result<R>) -> Result<R> {
    let parent = lock(&STATEMENTS).resolve(handle)?.parent;
    let conn = resolve_connection(parent).map_err(|_| invalid_statement(handle))?;
    let entry = lock(&conn);
    if entry.raw.is_none() {
        return Err(invalid_statement(handle));
    }
    // Re-resolve under the connection lock: a close or finalize may have
    // raced the lookup above.
    let shared = lock(&STATEMENTS).resolve(handle).map(|s| Arc::clone(&s.cursor))?;
    let mut cursor = lock(&shared);
    f(&mut cursor)
}

pub(crate) fn release_statement(handle: Handle) -> Result<()> {
    let StatementEntry { parent, cursor } = lock(&STATEMENTS).finalize(handle)?;
    // Finalizing touches the parent's native connection, so the last cursor
    // reference is dropped under its lock.
    match resolve_connection(parent) {
        Ok(conn) => {
            let mut entry = lock(&conn);
            entry.statements.retain(|h| *h != handle);
            drop(cursor);
        }
        Err(_) => drop(cursor),
    }
    Ok(())
}

fn is_connection_live(handle: Handle) -> bool {
    lock(&CONNECTIONS).contains(handle)
}

fn is_statement_live(handle: Handle) -> bool {
    lock(&STATEMENTS).contains(handle)
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| Error::InvalidArgument(format!("database path is not valid UTF-8: {}", path.display())))
}

/// An open database connection.
///
/// Dropping the value closes the connection (and finalizes its statements)
/// if `close` was not called. Any use after `close` fails with
/// `Error::InvalidHandle`.
#[derive(Debug)]
pub struct Connection {
    handle: Handle,
}

impl Connection {
    /// Open or create the database file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, &BridgeConfig::default())
    }

    pub fn open_with(path: impl AsRef<Path>, config: &BridgeConfig) -> Result<Self> {
        let handle = open_handle(path_str(path.as_ref())?, config)?;
        Ok(Self { handle })
    }

    pub fn open_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn is_open(&self) -> bool {
        is_connection_live(self.handle)
    }

    pub fn close(&self) -> Result<()> {
        close_handle(self.handle)
    }

    /// Compile the first statement of `sql`. Any SQL after the first
    /// statement is ignored, not compiled.
    pub fn prepare(&self, sql: &str) -> Result<Statement> {
        let handle = prepare_handle(self.handle, sql)?;
        Ok(Statement { handle })
    }

    /// Prepare `sql`, run it to completion, and return the number of rows
    /// it changed. Rows it yields are discarded; `Busy` is an error here.
    /// Like `prepare`, only the first statement of `sql` runs.
    pub fn execute(&self, sql: &str) -> Result<i64> {
        let stmt = self.prepare(sql)?;
        loop {
            match stmt.step()? {
                Step::Row(_) => continue,
                Step::Done => break,
                Step::Busy => return Err(status_error(ffi::SQLITE_BUSY)),
            }
        }
        stmt.finalize()?;
        self.changes()
    }

    /// Rows changed by the most recent completed statement
    pub fn changes(&self) -> Result<i64> {
        with_connection(self.handle, |raw| Ok(raw.changes()))
    }

    pub fn last_insert_rowid(&self) -> Result<i64> {
        with_connection(self.handle, |raw| Ok(raw.last_insert_rowid()))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        match close_handle(self.handle) {
            Ok(()) => {}
            Err(e) if e.is_invalid_handle() => {}
            Err(e) => warn!(handle = self.handle.to_raw(), error = %e, "close on drop failed"),
        }
    }
}

/// A compiled statement and its cursor.
///
/// Independent of the `Connection` value it came from, but finalized when
/// that connection closes. Dropping the value finalizes the statement.
#[derive(Debug)]
pub struct Statement {
    handle: Handle,
}

impl Statement {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn is_live(&self) -> bool {
        is_statement_live(self.handle)
    }

    /// Advance one row
    pub fn step(&self) -> Result<Step> {
        with_statement(self.handle, Cursor::step)
    }

    /// Start a new pass over the statement, keeping bound parameters
    pub fn reset(&self) -> Result<()> {
        with_statement(self.handle, |cursor| {
            cursor.reset();
            Ok(())
        })
    }

    pub fn clear_bindings(&self) -> Result<()> {
        with_statement(self.handle, Cursor::clear_bindings)
    }

    pub fn bind_text(&self, index: usize, text: &str) -> Result<()> {
        with_statement(self.handle, |c| codec::bind_text(c.raw(), index, text, c.codec().text))
    }

    pub fn bind_blob(&self, index: usize, bytes: &[u8]) -> Result<()> {
        with_statement(self.handle, |c| codec::bind_blob(c.raw(), index, bytes))
    }

    pub fn bind_int(&self, index: usize, value: i32) -> Result<()> {
        with_statement(self.handle, |c| codec::bind_int(c.raw(), index, value))
    }

    pub fn bind_int64(&self, index: usize, value: i64) -> Result<()> {
        with_statement(self.handle, |c| codec::bind_int64(c.raw(), index, value))
    }

    pub fn bind_float(&self, index: usize, value: f64) -> Result<()> {
        with_statement(self.handle, |c| codec::bind_float(c.raw(), index, value))
    }

    pub fn bind_null(&self, index: usize) -> Result<()> {
        with_statement(self.handle, |c| codec::bind_null(c.raw(), index))
    }

    pub fn bind(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        with_statement(self.handle, |c| codec::bind_value(c.raw(), index, &value, c.codec()))
    }

    pub fn parameter_count(&self) -> Result<usize> {
        with_statement(self.handle, |c| Ok(c.raw().parameter_count()))
    }

    pub fn column_count(&self) -> Result<usize> {
        with_statement(self.handle, |c| Ok(c.raw().column_count()))
    }

    pub fn column_names(&self) -> Result<Vec<String>> {
        with_statement(self.handle, |c| {
            Ok((0..c.raw().column_count()).map(|i| c.raw().column_name(i)).collect())
        })
    }

    pub fn sql(&self) -> Result<String> {
        with_statement(self.handle, |c| Ok(c.raw().sql()))
    }

    /// Release the compiled statement now instead of on drop
    pub fn finalize(&self) -> Result<()> {
        release_statement(self.handle)
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        let _ = release_statement(self.handle);
    }
}
