///
/// hostlite SQLite3 Bridge
///
/// Connects the host runtime's value model to an embedded SQLite engine
/// (bundled through rusqlite). The layer is synchronous: every call runs on
/// the caller's thread and returns when the engine does.
///
/// Architecture:
/// - `raw`: owned wrappers over the engine's connection and statement
///   pointers; the only place native pointers live.
/// - `registry`: generation-checked slot arena mapping opaque handles to
///   native resources. Stale handles fail with `Error::InvalidHandle`.
/// - `codec`: cell decoding by dynamic type tag, and copy-semantics binding.
/// - `cursor`: per-statement step state machine (Ready/Row/Done/Failed).
/// - `connection`: the process-wide registries plus the safe `Connection`
///   and `Statement` types, whose `Drop` acts as the finalizer.
/// - `ffi`: `extern "C"` entry points over `hostlite-core` values, reporting
///   failures through the last-error slot.
///
/// Functions:
/// - Connection: open, open_with, open_memory, close, prepare, execute,
///   changes, last_insert_rowid
/// - Statement: step, bind_text, bind_blob, bind_int, bind_int64,
///   bind_float, bind_null, reset, clear_bindings, finalize
///
/// `Step::Busy` is returned as-is; retry policy belongs to the caller.
///

pub mod codec;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod error;
pub mod ffi;
pub mod raw;
pub mod registry;

pub use codec::Value;
pub use config::{BridgeConfig, CodecConfig, IntegerWidth, OpenConfig, TextEncoding};
pub use connection::{Connection, Statement};
pub use cursor::{CursorState, Row, Step};
pub use error::{Error, HandleKind, Result};
pub use registry::Handle;
